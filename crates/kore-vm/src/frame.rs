//! Call frames
//!
//! Each frame owns a contiguous window of the flat register file. Frames
//! are explicit VM state (not host-stack recursion), so a fault can walk
//! them to build a trace.

/// One activation record
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    /// Function index of the executing function
    pub func: u16,
    /// First register of this frame's window in the flat register file
    pub window: usize,
    /// Number of registers the window spans
    pub window_len: usize,
    /// Word index of the `call` instruction in the caller's code, used to
    /// locate the packed return-register list when this frame returns.
    /// Zero for the entry frame, which has no call site.
    pub call_site: usize,
    /// Number of return values the call site expects
    pub ret_count: u8,
}

impl CallFrame {
    /// The entry function's frame: window at the base, no call site
    pub fn entry(func: u16, window_len: usize) -> Self {
        Self {
            func,
            window: 0,
            window_len,
            call_site: 0,
            ret_count: 0,
        }
    }
}
