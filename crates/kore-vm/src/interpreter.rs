//! Bytecode interpreter
//!
//! A register machine over a single flat register file. Each call frame
//! owns a contiguous window of that file; `call` copies arguments into the
//! callee's window and `ret` copies results back into the registers the
//! call site named. Any runtime violation faults the machine permanently.

use crate::builtins;
use crate::error::{FaultKind, VmError, VmResult};
use crate::frame::CallFrame;
use crate::value::Value;
use kore_bytecode::word;
use kore_bytecode::{builtin, CompiledObject, Constant, Module, Opcode, RegCursor};
use rustc_hash::FxHashMap;

/// Frame-depth ceiling
pub const MAX_CALL_DEPTH: usize = 1024;

/// Default register-file ceiling across all live frames
pub const MAX_REGISTER_FILE: usize = 1 << 20;

/// Ceiling on the global-slot count a module may declare
pub const MAX_GLOBALS: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VmState {
    #[default]
    Idle,
    Running,
    /// Stopped normally: `halt` executed or the entry function returned
    Halted,
    /// Stopped by a fault; the machine will not dispatch again
    Faulted,
}

/// The virtual machine
#[derive(Debug)]
pub struct Vm {
    regs: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Vec<Value>,
    state: VmState,
    output: Vec<String>,
    /// Register-file ceiling; reservations past it fault the machine
    capacity: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a register out of a frame's window
fn reg<'a>(regs: &'a [Value], frame: &CallFrame, index: u8) -> Result<&'a Value, FaultKind> {
    if (index as usize) < frame.window_len {
        Ok(&regs[frame.window + index as usize])
    } else {
        Err(FaultKind::BadRegister(index))
    }
}

/// Write a register in a frame's window
fn set_reg(
    regs: &mut [Value],
    frame: &CallFrame,
    index: u8,
    value: Value,
) -> Result<(), FaultKind> {
    if (index as usize) < frame.window_len {
        regs[frame.window + index as usize] = value;
        Ok(())
    } else {
        Err(FaultKind::BadRegister(index))
    }
}

fn i32_of(value: &Value) -> Result<i32, FaultKind> {
    match value {
        Value::I32(v) => Ok(*v),
        other => Err(FaultKind::TypeMismatch {
            expected: "i32",
            found: other.type_name(),
        }),
    }
}

fn i64_of(value: &Value) -> Result<i64, FaultKind> {
    match value {
        Value::I64(v) => Ok(*v),
        other => Err(FaultKind::TypeMismatch {
            expected: "i64",
            found: other.type_name(),
        }),
    }
}

fn f32_of(value: &Value) -> Result<f32, FaultKind> {
    match value {
        Value::F32(v) => Ok(*v),
        other => Err(FaultKind::TypeMismatch {
            expected: "f32",
            found: other.type_name(),
        }),
    }
}

fn f64_of(value: &Value) -> Result<f64, FaultKind> {
    match value {
        Value::F64(v) => Ok(*v),
        other => Err(FaultKind::TypeMismatch {
            expected: "f64",
            found: other.type_name(),
        }),
    }
}

fn bool_of(value: &Value) -> Result<bool, FaultKind> {
    match value {
        Value::Bool(v) => Ok(*v),
        other => Err(FaultKind::TypeMismatch {
            expected: "bool",
            found: other.type_name(),
        }),
    }
}

/// Materialize a load's constant, checking the tag against the opcode
fn const_value(op: Opcode, constant: Constant) -> Result<Value, FaultKind> {
    let found = match constant {
        Constant::Bool(_) => "bool",
        Constant::I32(_) => "i32",
        Constant::I64(_) => "i64",
        Constant::F32(_) => "f32",
        Constant::F64(_) => "f64",
    };
    match (op, constant) {
        (Opcode::LoadBool, Constant::Bool(v)) => Ok(Value::Bool(v)),
        (Opcode::LoadI32, Constant::I32(v)) => Ok(Value::I32(v)),
        (Opcode::LoadI64, Constant::I64(v)) => Ok(Value::I64(v)),
        (Opcode::LoadF32, Constant::F32(v)) => Ok(Value::F32(v)),
        (Opcode::LoadF64, Constant::F64(v)) => Ok(Value::F64(v)),
        (Opcode::LoadBool, _) => Err(FaultKind::TypeMismatch {
            expected: "bool",
            found,
        }),
        (Opcode::LoadI32, _) => Err(FaultKind::TypeMismatch {
            expected: "i32",
            found,
        }),
        (Opcode::LoadI64, _) => Err(FaultKind::TypeMismatch {
            expected: "i64",
            found,
        }),
        (Opcode::LoadF32, _) => Err(FaultKind::TypeMismatch {
            expected: "f32",
            found,
        }),
        _ => Err(FaultKind::TypeMismatch {
            expected: "f64",
            found,
        }),
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_capacity(MAX_REGISTER_FILE)
    }

    /// A machine whose register file is capped at `capacity` slots instead
    /// of the default [`MAX_REGISTER_FILE`]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            regs: Vec::new(),
            frames: Vec::new(),
            globals: Vec::new(),
            state: VmState::default(),
            output: Vec::new(),
            capacity,
        }
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    /// Lines the `print` builtin produced, in emission order
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn global(&self, slot: usize) -> Option<&Value> {
        self.globals.get(slot)
    }

    /// Execute a module from its entry function until it halts or faults.
    ///
    /// Resets all machine state first, so a `Vm` can run several modules
    /// in sequence (globals do not carry over).
    pub fn run(&mut self, module: &Module) -> VmResult<()> {
        let entry = module.entry().ok_or(VmError::NoEntryFunction)?;

        let mut objects: FxHashMap<u16, &CompiledObject> = FxHashMap::default();
        for object in module.objects() {
            objects.insert(object.index as u16, object);
        }

        self.regs.clear();
        self.frames.clear();
        self.output.clear();
        self.globals.clear();
        self.frames.push(CallFrame::entry(
            entry.index as u16,
            entry.max_registers as usize,
        ));
        self.state = VmState::Running;

        let mut object = entry;
        let mut pc = 0usize; // word index into object.code

        macro_rules! fault {
            ($kind:expr) => {
                return Err(self.fault($kind, object, pc, &objects))
            };
        }
        macro_rules! vm_try {
            ($expr:expr) => {
                match $expr {
                    Ok(v) => v,
                    Err(kind) => fault!(kind),
                }
            };
        }
        macro_rules! binop {
            ($frame:expr, $w:expr, $conv:ident, $apply:expr) => {{
                let lhs = vm_try!($conv(vm_try!(reg(&self.regs, &$frame, word::reg_b($w)))));
                let rhs = vm_try!($conv(vm_try!(reg(&self.regs, &$frame, word::reg_c($w)))));
                let out = vm_try!($apply(lhs, rhs));
                vm_try!(set_reg(&mut self.regs, &$frame, word::reg_a($w), out));
            }};
        }

        // The entry window and global table are sized from wire fields, so
        // cap them the same way `call` caps frame growth.
        let needed = entry.max_registers as usize;
        if needed > self.capacity {
            fault!(FaultKind::RegisterOverflow { needed });
        }
        let globals = module.globals as usize;
        if globals > MAX_GLOBALS {
            fault!(FaultKind::GlobalOverflow { needed: globals });
        }
        self.globals = vec![Value::Unit; globals];
        self.regs.resize(needed, Value::Unit);

        loop {
            let frame = *self.frames.last().expect("at least the entry frame");
            let Some(&w) = object.code.get(pc) else {
                fault!(FaultKind::TruncatedCode);
            };
            let byte = word::opcode_byte(w);
            let Some(op) = Opcode::from_u8(byte) else {
                fault!(FaultKind::UnknownOpcode(byte));
            };

            match op {
                Opcode::Nop => {}
                Opcode::Halt => {
                    self.state = VmState::Halted;
                    return Ok(());
                }
                Opcode::Move => {
                    let v = vm_try!(reg(&self.regs, &frame, word::reg_b(w))).clone();
                    vm_try!(set_reg(&mut self.regs, &frame, word::reg_a(w), v));
                }
                Opcode::Destroy => {
                    vm_try!(set_reg(
                        &mut self.regs,
                        &frame,
                        word::reg_a(w),
                        Value::Unit
                    ));
                }

                Opcode::LoadBool
                | Opcode::LoadI32
                | Opcode::LoadI64
                | Opcode::LoadF32
                | Opcode::LoadF64 => {
                    let index = word::value16(w);
                    let Some(constant) = module.constants.get(index) else {
                        fault!(FaultKind::BadConstantIndex(index));
                    };
                    let value = vm_try!(const_value(op, constant));
                    vm_try!(set_reg(&mut self.regs, &frame, word::reg_a(w), value));
                }

                Opcode::LoadGlobal => {
                    let slot = word::value16(w);
                    let Some(value) = self.globals.get(slot as usize).cloned() else {
                        fault!(FaultKind::BadGlobalSlot(slot));
                    };
                    vm_try!(set_reg(&mut self.regs, &frame, word::reg_a(w), value));
                }
                Opcode::StoreGlobal => {
                    let slot = word::value16(w) as usize;
                    let value = vm_try!(reg(&self.regs, &frame, word::reg_a(w))).clone();
                    if slot >= self.globals.len() {
                        fault!(FaultKind::BadGlobalSlot(slot as u16));
                    }
                    self.globals[slot] = value;
                }

                Opcode::AddI32 => binop!(frame, w, i32_of, |a: i32, b: i32| Ok::<_, FaultKind>(
                    Value::I32(a.wrapping_add(b))
                )),
                Opcode::SubI32 => binop!(frame, w, i32_of, |a: i32, b: i32| Ok::<_, FaultKind>(
                    Value::I32(a.wrapping_sub(b))
                )),
                Opcode::MulI32 => binop!(frame, w, i32_of, |a: i32, b: i32| Ok::<_, FaultKind>(
                    Value::I32(a.wrapping_mul(b))
                )),
                Opcode::DivI32 => binop!(frame, w, i32_of, |a: i32, b: i32| if b == 0 {
                    Err(FaultKind::DivisionByZero)
                } else {
                    Ok(Value::I32(a.wrapping_div(b)))
                }),
                Opcode::ModI32 => binop!(frame, w, i32_of, |a: i32, b: i32| if b == 0 {
                    Err(FaultKind::DivisionByZero)
                } else {
                    Ok(Value::I32(a.wrapping_rem(b)))
                }),

                Opcode::AddI64 => binop!(frame, w, i64_of, |a: i64, b: i64| Ok::<_, FaultKind>(
                    Value::I64(a.wrapping_add(b))
                )),
                Opcode::SubI64 => binop!(frame, w, i64_of, |a: i64, b: i64| Ok::<_, FaultKind>(
                    Value::I64(a.wrapping_sub(b))
                )),
                Opcode::MulI64 => binop!(frame, w, i64_of, |a: i64, b: i64| Ok::<_, FaultKind>(
                    Value::I64(a.wrapping_mul(b))
                )),
                Opcode::DivI64 => binop!(frame, w, i64_of, |a: i64, b: i64| if b == 0 {
                    Err(FaultKind::DivisionByZero)
                } else {
                    Ok(Value::I64(a.wrapping_div(b)))
                }),
                Opcode::ModI64 => binop!(frame, w, i64_of, |a: i64, b: i64| if b == 0 {
                    Err(FaultKind::DivisionByZero)
                } else {
                    Ok(Value::I64(a.wrapping_rem(b)))
                }),

                Opcode::AddF32 => binop!(frame, w, f32_of, |a: f32, b: f32| Ok::<_, FaultKind>(
                    Value::F32(a + b)
                )),
                Opcode::SubF32 => binop!(frame, w, f32_of, |a: f32, b: f32| Ok::<_, FaultKind>(
                    Value::F32(a - b)
                )),
                Opcode::MulF32 => binop!(frame, w, f32_of, |a: f32, b: f32| Ok::<_, FaultKind>(
                    Value::F32(a * b)
                )),
                Opcode::DivF32 => binop!(frame, w, f32_of, |a: f32, b: f32| Ok::<_, FaultKind>(
                    Value::F32(a / b)
                )),

                Opcode::AddF64 => binop!(frame, w, f64_of, |a: f64, b: f64| Ok::<_, FaultKind>(
                    Value::F64(a + b)
                )),
                Opcode::SubF64 => binop!(frame, w, f64_of, |a: f64, b: f64| Ok::<_, FaultKind>(
                    Value::F64(a - b)
                )),
                Opcode::MulF64 => binop!(frame, w, f64_of, |a: f64, b: f64| Ok::<_, FaultKind>(
                    Value::F64(a * b)
                )),
                Opcode::DivF64 => binop!(frame, w, f64_of, |a: f64, b: f64| Ok::<_, FaultKind>(
                    Value::F64(a / b)
                )),

                Opcode::LtI32 => binop!(frame, w, i32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a < b))),
                Opcode::GtI32 => binop!(frame, w, i32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a > b))),
                Opcode::LeI32 => binop!(frame, w, i32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a <= b))),
                Opcode::GeI32 => binop!(frame, w, i32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a >= b))),
                Opcode::EqI32 => binop!(frame, w, i32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a == b))),
                Opcode::NeI32 => binop!(frame, w, i32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a != b))),

                Opcode::LtI64 => binop!(frame, w, i64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a < b))),
                Opcode::GtI64 => binop!(frame, w, i64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a > b))),
                Opcode::LeI64 => binop!(frame, w, i64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a <= b))),
                Opcode::GeI64 => binop!(frame, w, i64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a >= b))),
                Opcode::EqI64 => binop!(frame, w, i64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a == b))),
                Opcode::NeI64 => binop!(frame, w, i64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a != b))),

                Opcode::LtF32 => binop!(frame, w, f32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a < b))),
                Opcode::GtF32 => binop!(frame, w, f32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a > b))),
                Opcode::LeF32 => binop!(frame, w, f32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a <= b))),
                Opcode::GeF32 => binop!(frame, w, f32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a >= b))),
                Opcode::EqF32 => binop!(frame, w, f32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a == b))),
                Opcode::NeF32 => binop!(frame, w, f32_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a != b))),

                Opcode::LtF64 => binop!(frame, w, f64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a < b))),
                Opcode::GtF64 => binop!(frame, w, f64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a > b))),
                Opcode::LeF64 => binop!(frame, w, f64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a <= b))),
                Opcode::GeF64 => binop!(frame, w, f64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a >= b))),
                Opcode::EqF64 => binop!(frame, w, f64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a == b))),
                Opcode::NeF64 => binop!(frame, w, f64_of, |a, b| Ok::<_, FaultKind>(Value::Bool(a != b))),

                Opcode::AllocArray => {
                    let len = vm_try!(i32_of(vm_try!(reg(&self.regs, &frame, word::reg_b(w)))));
                    if len < 0 {
                        fault!(FaultKind::NegativeArrayLength(len));
                    }
                    let array = Value::array(vec![Value::Unit; len as usize]);
                    vm_try!(set_reg(&mut self.regs, &frame, word::reg_a(w), array));
                }

                Opcode::Jmp => {
                    pc = vm_try!(jump_target(object, pc, w));
                    continue;
                }
                Opcode::JmpIf => {
                    let cond = vm_try!(bool_of(vm_try!(reg(&self.regs, &frame, word::reg_a(w)))));
                    if cond {
                        pc = vm_try!(jump_target(object, pc, w));
                        continue;
                    }
                }

                Opcode::Call => {
                    let index = word::reg_a(w) as u16;
                    let argc = word::reg_b(w) as usize;
                    let retc = word::reg_c(w);
                    let tail_len = word::packed_words(argc + retc as usize);
                    let Some(tail) = object.code.get(pc + 1..pc + 1 + tail_len) else {
                        fault!(FaultKind::TruncatedCode);
                    };

                    let mut cursor = RegCursor::new(tail);
                    let mut args = Vec::with_capacity(argc);
                    for _ in 0..argc {
                        let Some(src) = cursor.next() else {
                            fault!(FaultKind::TruncatedCode);
                        };
                        args.push(vm_try!(reg(&self.regs, &frame, src)).clone());
                    }

                    if builtin::is_builtin(index) {
                        let result = vm_try!(builtins::dispatch(index, &args, &mut self.output));
                        if retc > 0 {
                            let Some(value) = result else {
                                fault!(FaultKind::ReturnMismatch {
                                    expected: retc,
                                    got: 0
                                });
                            };
                            if retc > 1 {
                                fault!(FaultKind::ReturnMismatch {
                                    expected: retc,
                                    got: 1
                                });
                            }
                            let Some(dest) = cursor.next() else {
                                fault!(FaultKind::TruncatedCode);
                            };
                            vm_try!(set_reg(&mut self.regs, &frame, dest, value));
                        }
                        pc += 1 + tail_len;
                        continue;
                    }

                    let Some(&callee) = objects.get(&index) else {
                        fault!(FaultKind::UnknownFunction(index));
                    };
                    if self.frames.len() >= MAX_CALL_DEPTH {
                        fault!(FaultKind::StackOverflow);
                    }
                    let window = self.regs.len();
                    let window_len = callee.max_registers as usize;
                    if window + window_len > self.capacity {
                        fault!(FaultKind::RegisterOverflow {
                            needed: window + window_len
                        });
                    }
                    self.regs.resize(window + window_len, Value::Unit);
                    let callee_frame = CallFrame {
                        func: index,
                        window,
                        window_len,
                        call_site: pc,
                        ret_count: retc,
                    };
                    for (i, value) in args.into_iter().enumerate() {
                        vm_try!(set_reg(&mut self.regs, &callee_frame, i as u8, value));
                    }
                    self.frames.push(callee_frame);
                    object = callee;
                    pc = 0;
                    continue;
                }

                Opcode::Ret => {
                    let count = word::reg_a(w) as usize;
                    let tail_len = word::packed_words(count);
                    let Some(tail) = object.code.get(pc + 1..pc + 1 + tail_len) else {
                        fault!(FaultKind::TruncatedCode);
                    };
                    let mut cursor = RegCursor::new(tail);
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        let Some(src) = cursor.next() else {
                            fault!(FaultKind::TruncatedCode);
                        };
                        values.push(vm_try!(reg(&self.regs, &frame, src)).clone());
                    }

                    let popped = self.frames.pop().expect("returning frame exists");
                    if self.frames.is_empty() {
                        // The entry function returned: normal shutdown
                        self.regs.truncate(popped.window);
                        self.state = VmState::Halted;
                        return Ok(());
                    }

                    if (count as u8) < popped.ret_count {
                        self.frames.push(popped);
                        fault!(FaultKind::ReturnMismatch {
                            expected: popped.ret_count,
                            got: count as u8
                        });
                    }

                    let caller_frame = *self.frames.last().expect("caller frame exists");
                    let Some(&caller) = objects.get(&caller_frame.func) else {
                        self.frames.push(popped);
                        fault!(FaultKind::UnknownFunction(caller_frame.func));
                    };

                    // Re-read the call site to find where results go
                    let call_word = caller.code[popped.call_site];
                    let argc = word::reg_b(call_word) as usize;
                    let retc = word::reg_c(call_word) as usize;
                    let call_tail_len = word::packed_words(argc + retc);
                    let call_tail =
                        &caller.code[popped.call_site + 1..popped.call_site + 1 + call_tail_len];
                    let mut ret_cursor = RegCursor::new(call_tail);
                    for _ in 0..argc {
                        ret_cursor.next();
                    }

                    self.regs.truncate(popped.window);
                    for value in values.into_iter().take(retc) {
                        let Some(dest) = ret_cursor.next() else {
                            self.frames.push(popped);
                            fault!(FaultKind::TruncatedCode);
                        };
                        vm_try!(set_reg(&mut self.regs, &caller_frame, dest, value));
                    }

                    object = caller;
                    pc = popped.call_site + 1 + call_tail_len;
                    continue;
                }
            }
            pc += 1;
        }
    }

    /// Stop the machine permanently and package the fault with a trace
    fn fault(
        &mut self,
        kind: FaultKind,
        object: &CompiledObject,
        pc: usize,
        objects: &FxHashMap<u16, &CompiledObject>,
    ) -> VmError {
        self.state = VmState::Faulted;
        let mut trace = Vec::with_capacity(self.frames.len());
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            let name = objects
                .get(&frame.func)
                .map(|o| o.name.as_str())
                .unwrap_or("<unknown>");
            if depth == 0 {
                trace.push(name.to_owned());
            } else {
                trace.push(format!(
                    "{} (called from pc {:#06x})",
                    name,
                    frame.call_site * 4
                ));
            }
        }
        VmError::Fault {
            fault: kind,
            function: object.name.clone(),
            pc: pc * 4,
            trace,
        }
    }
}

/// Resolve a jump word's signed byte displacement (relative to the jump
/// word itself) into a word index
fn jump_target(object: &CompiledObject, pc: usize, w: u32) -> Result<usize, FaultKind> {
    let disp = word::value16(w) as i16 as i64;
    let target = pc as i64 * 4 + disp;
    if target < 0 || target % 4 != 0 || target as usize >= object.code.len() * 4 {
        return Err(FaultKind::BadJumpTarget(target));
    }
    Ok(target as usize / 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kore_bytecode::word::{pack_op, pack_reg, pack_reg_value, pack_three, pack_two};
    use kore_bytecode::SourceSpan;

    fn object(name: &str, index: u32, max_registers: u32, code: Vec<u32>) -> CompiledObject {
        CompiledObject {
            name: name.into(),
            span: SourceSpan::default(),
            index,
            max_registers,
            code,
        }
    }

    fn module_with(objects: Vec<CompiledObject>) -> Module {
        let mut module = Module::new(0, "test.kore");
        for obj in objects {
            module.add_object(obj);
        }
        module
    }

    fn fault_kind(err: VmError) -> FaultKind {
        match err {
            VmError::Fault { fault, .. } => fault,
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic_and_globals() {
        let mut module = module_with(vec![]);
        module.globals = 1;
        let one = module.constants.insert(Constant::I32(1));
        let two = module.constants.insert(Constant::I32(2));
        module.add_object(object(
            "main",
            0,
            3,
            vec![
                pack_reg_value(Opcode::LoadI32, 0, one),
                pack_reg_value(Opcode::LoadI32, 1, two),
                pack_three(Opcode::AddI32, 2, 0, 1),
                pack_reg_value(Opcode::StoreGlobal, 2, 0),
                pack_op(Opcode::Halt),
            ],
        ));

        let mut vm = Vm::new();
        vm.run(&module).unwrap();
        assert_eq!(vm.state(), VmState::Halted);
        assert_eq!(vm.global(0), Some(&Value::I32(3)));
    }

    #[test]
    fn entry_return_halts_the_machine() {
        let module = module_with(vec![object(
            "main",
            0,
            1,
            vec![pack_reg(Opcode::Ret, 0)],
        )]);
        let mut vm = Vm::new();
        vm.run(&module).unwrap();
        assert_eq!(vm.state(), VmState::Halted);
    }

    #[test]
    fn oversized_entry_window_faults() {
        let module = module_with(vec![object(
            "main",
            0,
            (MAX_REGISTER_FILE + 1) as u32,
            vec![pack_op(Opcode::Halt)],
        )]);
        let mut vm = Vm::new();
        let err = vm.run(&module).unwrap_err();
        assert_eq!(vm.state(), VmState::Faulted);
        assert_eq!(
            fault_kind(err),
            FaultKind::RegisterOverflow {
                needed: MAX_REGISTER_FILE + 1
            }
        );
    }

    #[test]
    fn oversized_global_table_faults() {
        let mut module = module_with(vec![object("main", 0, 1, vec![pack_op(Opcode::Halt)])]);
        module.globals = (MAX_GLOBALS + 1) as u32;
        let mut vm = Vm::new();
        let err = vm.run(&module).unwrap_err();
        assert_eq!(vm.state(), VmState::Faulted);
        assert_eq!(
            fault_kind(err),
            FaultKind::GlobalOverflow {
                needed: MAX_GLOBALS + 1
            }
        );
    }

    #[test]
    fn with_capacity_caps_the_register_file() {
        let module = module_with(vec![object("main", 0, 8, vec![pack_op(Opcode::Halt)])]);
        let mut vm = Vm::with_capacity(4);
        let err = vm.run(&module).unwrap_err();
        assert_eq!(fault_kind(err), FaultKind::RegisterOverflow { needed: 8 });

        // The same program runs under the default cap
        let mut vm = Vm::new();
        vm.run(&module).unwrap();
        assert_eq!(vm.state(), VmState::Halted);
    }

    #[test]
    fn conditional_jump_takes_the_branch() {
        // load true; jmpif +8 (skip the store of 1); store 2; halt
        let mut module = module_with(vec![]);
        module.globals = 1;
        let t = module.constants.insert(Constant::Bool(true));
        let one = module.constants.insert(Constant::I32(1));
        let two = module.constants.insert(Constant::I32(2));
        module.add_object(object(
            "main",
            0,
            2,
            vec![
                pack_reg_value(Opcode::LoadBool, 0, t),
                pack_reg_value(Opcode::JmpIf, 0, 12), // to word 4
                pack_reg_value(Opcode::LoadI32, 1, one),
                pack_reg_value(Opcode::StoreGlobal, 1, 0),
                pack_reg_value(Opcode::LoadI32, 1, two),
                pack_reg_value(Opcode::StoreGlobal, 1, 0),
                pack_op(Opcode::Halt),
            ],
        ));

        let mut vm = Vm::new();
        vm.run(&module).unwrap();
        assert_eq!(vm.global(0), Some(&Value::I32(2)));
    }

    fn pack_jmp(disp: i16) -> u32 {
        kore_bytecode::word::pack_value(Opcode::Jmp, disp as u16)
    }

    #[test]
    fn backward_jump_executes() {
        // One trip around a flag-guarded loop: the second pass through the
        // head sees the flag set and exits via the forward jmpif.
        let mut module = module_with(vec![]);
        module.globals = 1;
        let f = module.constants.insert(Constant::Bool(false));
        let t = module.constants.insert(Constant::Bool(true));
        module.add_object(object(
            "main",
            0,
            2,
            vec![
                pack_reg_value(Opcode::LoadBool, 0, f), // 0: flag = false
                pack_reg_value(Opcode::StoreGlobal, 0, 0),
                pack_reg_value(Opcode::LoadGlobal, 1, 0), // 2: loop head (byte 8)
                pack_reg_value(Opcode::JmpIf, 1, 16),     // 3 (byte 12) -> halt (byte 28)
                pack_reg_value(Opcode::LoadBool, 0, t),
                pack_reg_value(Opcode::StoreGlobal, 0, 0),
                pack_jmp(-16), // 6 (byte 24) -> loop head (byte 8)
                pack_op(Opcode::Halt),
            ],
        ));

        let mut vm = Vm::new();
        vm.run(&module).unwrap();
        assert_eq!(vm.state(), VmState::Halted);
        assert_eq!(vm.global(0), Some(&Value::Bool(true)));
    }

    #[test]
    fn call_and_return_copy_across_windows() {
        // main: load 20 into r0, call double(r0) -> r1, store r1, halt
        // double: add r1 = r0 + r0, ret r1
        let mut module = module_with(vec![]);
        module.globals = 1;
        let twenty = module.constants.insert(Constant::I64(20));
        let mut call_tail = kore_bytecode::RegPacker::new();
        call_tail.push(0); // arg r0
        call_tail.push(1); // ret r1
        let mut code = vec![
            pack_reg_value(Opcode::LoadI64, 0, twenty),
            pack_three(Opcode::Call, 1, 1, 1),
        ];
        code.extend(call_tail.into_words());
        code.push(pack_reg_value(Opcode::StoreGlobal, 1, 0));
        code.push(pack_op(Opcode::Halt));
        module.add_object(object("main", 0, 2, code));

        let mut ret_tail = kore_bytecode::RegPacker::new();
        ret_tail.push(1);
        let mut double_code = vec![
            pack_three(Opcode::AddI64, 1, 0, 0),
            pack_reg(Opcode::Ret, 1),
        ];
        double_code.extend(ret_tail.into_words());
        module.add_object(object("double", 1, 2, double_code));

        let mut vm = Vm::new();
        vm.run(&module).unwrap();
        assert_eq!(vm.global(0), Some(&Value::I64(40)));
        assert_eq!(vm.state(), VmState::Halted);
    }

    #[test]
    fn unknown_function_faults_with_trace() {
        let mut tail = kore_bytecode::RegPacker::new();
        tail.push(0);
        let mut code = vec![pack_three(Opcode::Call, 9, 1, 0)];
        code.extend(tail.into_words());
        code.push(pack_op(Opcode::Halt));
        let module = module_with(vec![object("main", 0, 1, code)]);

        let mut vm = Vm::new();
        let err = vm.run(&module).unwrap_err();
        assert_eq!(vm.state(), VmState::Faulted);
        assert_eq!(fault_kind(err), FaultKind::UnknownFunction(9));
    }

    #[test]
    fn division_by_zero_faults() {
        let mut module = module_with(vec![]);
        let one = module.constants.insert(Constant::I32(1));
        let zero = module.constants.insert(Constant::I32(0));
        module.add_object(object(
            "main",
            0,
            3,
            vec![
                pack_reg_value(Opcode::LoadI32, 0, one),
                pack_reg_value(Opcode::LoadI32, 1, zero),
                pack_three(Opcode::DivI32, 2, 0, 1),
                pack_op(Opcode::Halt),
            ],
        ));
        let mut vm = Vm::new();
        let err = vm.run(&module).unwrap_err();
        assert_eq!(fault_kind(err), FaultKind::DivisionByZero);
    }

    #[test]
    fn type_mismatch_faults() {
        let mut module = module_with(vec![]);
        let one = module.constants.insert(Constant::I32(1));
        module.add_object(object(
            "main",
            0,
            2,
            vec![
                pack_reg_value(Opcode::LoadI32, 0, one),
                pack_reg_value(Opcode::JmpIf, 0, 4), // i32 used as condition
                pack_op(Opcode::Halt),
            ],
        ));
        let mut vm = Vm::new();
        let err = vm.run(&module).unwrap_err();
        assert_eq!(
            fault_kind(err),
            FaultKind::TypeMismatch {
                expected: "bool",
                found: "i32"
            }
        );
    }

    #[test]
    fn register_outside_window_faults() {
        let module = module_with(vec![object(
            "main",
            0,
            1,
            vec![pack_two(Opcode::Move, 0, 5), pack_op(Opcode::Halt)],
        )]);
        let mut vm = Vm::new();
        let err = vm.run(&module).unwrap_err();
        assert_eq!(fault_kind(err), FaultKind::BadRegister(5));
    }

    #[test]
    fn missing_entry_is_an_error() {
        let module = module_with(vec![object("helper", 1, 1, vec![pack_op(Opcode::Halt)])]);
        let mut vm = Vm::new();
        assert!(matches!(
            vm.run(&module).unwrap_err(),
            VmError::NoEntryFunction
        ));
    }

    #[test]
    fn builtin_print_collects_output() {
        let mut module = module_with(vec![]);
        let seven = module.constants.insert(Constant::I32(7));
        let mut tail = kore_bytecode::RegPacker::new();
        tail.push(0);
        let mut code = vec![
            pack_reg_value(Opcode::LoadI32, 0, seven),
            pack_three(Opcode::Call, builtin::PRINT as u8, 1, 0),
        ];
        code.extend(tail.into_words());
        code.push(pack_op(Opcode::Halt));
        module.add_object(object("main", 0, 1, code));

        let mut vm = Vm::new();
        vm.run(&module).unwrap();
        assert_eq!(vm.output(), ["7"]);
    }
}
