//! Fetch/decode/dispatch loop and the host entry point.

use super::{Activation, Interpreter};
use crate::error::{Fault, InterpreterError};
use crate::value::Value;

use kpl_asm::{Instruction, Opcode};

use tracing::debug;

impl Interpreter {
    /// Runs `function` with an explicit `self` and arguments, to
    /// completion or until a fault unwinds the stacks.
    ///
    /// The returned value owns one heap reference; the host keeps it as a
    /// root or gives it back with [`crate::heap::Heap::release`].
    pub fn execute(
        &mut self,
        function: Value,
        self_value: Value,
        args: &[Value],
    ) -> Result<Value, InterpreterError> {
        if !function.is_function() {
            return Err(InterpreterError::Fault(Fault::BadValueOperation(
                "execute a non-function value",
            )));
        }

        debug!(args = args.len(), "interpreter entry");

        match self.run_function(function, self_value, args) {
            Ok(value) => {
                self.fault_instruction = None;
                Ok(value)
            }
            Err(fault) => match self.fault_instruction.take() {
                Some(instruction) => Err(InterpreterError::FaultInstruction {
                    fault,
                    instruction,
                }),
                None => Err(InterpreterError::Fault(fault)),
            },
        }
    }

    /// Steps the innermost activation until a `RETURN` unwinds into the
    /// native sentinel below it.
    pub(crate) fn dispatch(&mut self, mut act: Activation) -> Result<Value, Fault> {
        loop {
            let Some(instruction) = act.chunk.instruction(act.pc) else {
                // Running off the end of the code behaves like `RETURN 0`.
                match self.ret(&mut act, Value::Null)? {
                    Some(value) => return Ok(value),
                    None => continue,
                }
            };
            act.pc += 1;

            match self.step(&mut act, instruction) {
                Ok(None) => {}
                Ok(Some(value)) => return Ok(value),
                Err(fault) => {
                    self.fault_instruction.get_or_insert(instruction);
                    return Err(fault);
                }
            }
        }
    }

    /// Executes one instruction; `Some` carries the value of a `RETURN`
    /// that unwound into the native sentinel.
    fn step(
        &mut self,
        act: &mut Activation,
        instruction: Instruction,
    ) -> Result<Option<Value>, Fault> {
        let (a, b, c) = (instruction.a(), instruction.b(), instruction.c());
        let (kb, kc) = (instruction.kb(), instruction.kc());

        // An unassigned opcode id executes as NOP.
        let Some(opcode) = instruction.opcode() else {
            return Ok(None);
        };

        match opcode {
            Opcode::NOP => {}

            Opcode::MOVE => {
                let value = self.reg(act, b);
                self.store_reg_copy(act, a, value);
            }

            Opcode::LOAD_K => {
                let value = self.constant_value(&act.chunk, instruction.bx() as usize)?;
                self.store_reg_copy(act, a, value);
            }

            Opcode::LOAD_BOOL => {
                self.store_reg(act, a, Value::Boolean(b != 0));
                if c != 0 {
                    act.pc += 1;
                }
            }

            Opcode::LOAD_NULL => {
                for r in a..=b {
                    self.store_reg(act, r, Value::Null);
                }
            }

            Opcode::LOAD_INT => {
                self.store_reg(act, a, Value::Integer(instruction.sbx() as i64));
            }

            Opcode::GET_GLOBAL => {
                let name = self.rk(act, b, kb)?;
                let key = self.name_bytes(name);
                let value = self.globals.get(&key);
                self.store_reg_copy(act, a, value);
            }

            Opcode::GET_LOCAL => {
                let locals = self.function_locals(act);
                let name = self.rk(act, b, kb)?;
                let key = self.name_bytes(name);
                let value = self.heap.property(locals, &key);
                self.store_reg_copy(act, a, value);
            }

            Opcode::GET_PROP => {
                let target = self.rk(act, b, kb)?;
                let name = self.rk(act, c, kc)?;
                let key = self.name_bytes(name);
                let value = self.heap.property(target, &key);
                self.store_reg_copy(act, a, value);
            }

            Opcode::SET_GLOBAL => {
                let name = self.rk(act, b, kb)?;
                let key = self.name_bytes(name);
                let value = self.rk(act, c, kc)?;
                self.globals.set(&mut self.heap, &key, value);
            }

            Opcode::SET_LOCAL => {
                let locals = self.function_locals(act);
                let name = self.rk(act, b, kb)?;
                let key = self.name_bytes(name);
                let value = self.rk(act, c, kc)?;
                self.set_property(locals, &key, value);
            }

            Opcode::SET_PROP => {
                let target = self.reg(act, a);
                let name = self.rk(act, b, kb)?;
                let key = self.name_bytes(name);
                let value = self.rk(act, c, kc)?;
                self.set_property(target, &key, value);
            }

            Opcode::NEW_ARRAY => {
                let length = self.rk(act, b, kb)?;
                let length = usize::try_from(self.heap.to_integer(length)?).unwrap_or(0);
                let value = self.heap.make_array(length)?;
                self.store_reg(act, a, value);
            }

            Opcode::NEW_LIST => {
                let value = self.heap.make_list()?;
                self.store_reg(act, a, value);
            }

            Opcode::NEW_OBJECT => {
                let value = if c != 0 {
                    let class = self.rk(act, b, kb)?;
                    self.heap.make_object_with_class(class)?
                } else {
                    self.heap.make_object()?
                };
                self.store_reg(act, a, value);
            }

            Opcode::SET_AL => {
                let target = self.reg(act, a);
                match target {
                    Value::Array(handle) => {
                        for (slot, r) in (b..=c).enumerate() {
                            let value = self.reg(act, r);
                            self.heap.array_store(handle, slot as i64, value)?;
                        }
                    }
                    Value::List(handle) => {
                        for r in b..=c {
                            let value = self.reg(act, r);
                            self.heap.list_push_back(handle, value);
                        }
                    }
                    _ => {}
                }
            }

            Opcode::SELF => {
                let this = self.registers.get(act.base);
                self.store_reg_copy(act, a, this);
            }

            Opcode::ADD => self.binary(act, a, b, kb, c, kc, Self::op_add)?,
            Opcode::SUB => self.binary(act, a, b, kb, c, kc, Self::op_sub)?,
            Opcode::MUL => self.binary(act, a, b, kb, c, kc, Self::op_mul)?,
            Opcode::DIV => self.binary(act, a, b, kb, c, kc, Self::op_div)?,
            Opcode::IDIV => self.binary(act, a, b, kb, c, kc, Self::op_idiv)?,
            Opcode::MOD => self.binary(act, a, b, kb, c, kc, Self::op_mod)?,

            Opcode::EQ => {
                let (left, right) = (self.rk(act, b, kb)?, self.rk(act, c, kc)?);
                if self.values_equal(left, right)? {
                    act.pc += 1;
                }
            }

            Opcode::NE => {
                let (left, right) = (self.rk(act, b, kb)?, self.rk(act, c, kc)?);
                if self.values_not_equal(left, right)? {
                    act.pc += 1;
                }
            }

            Opcode::GR => self.compare(act, b, kb, c, kc, Self::op_gr)?,
            Opcode::LS => self.compare(act, b, kb, c, kc, Self::op_ls)?,
            Opcode::GE => self.compare(act, b, kb, c, kc, Self::op_ge)?,
            Opcode::LE => self.compare(act, b, kb, c, kc, Self::op_le)?,

            Opcode::SHL => self.binary(act, a, b, kb, c, kc, Self::op_shl)?,
            Opcode::SHR => self.binary(act, a, b, kb, c, kc, Self::op_shr)?,
            Opcode::BAND => self.binary(act, a, b, kb, c, kc, Self::op_band)?,
            Opcode::BOR => self.binary(act, a, b, kb, c, kc, Self::op_bor)?,
            Opcode::XOR => self.binary(act, a, b, kb, c, kc, Self::op_xor)?,

            Opcode::BNOT => {
                let value = self.rk(act, b, kb)?;
                let result = self.op_bnot(value)?;
                self.store_reg(act, a, result);
            }

            Opcode::NOT => {
                let value = self.rk(act, b, kb)?;
                let result = self.op_not(value);
                self.store_reg(act, a, result);
            }

            Opcode::NEG => {
                let value = self.rk(act, b, kb)?;
                let result = self.op_neg(value)?;
                self.store_reg(act, a, result);
            }

            Opcode::LEN => {
                let value = self.rk(act, b, kb)?;
                let result = self.op_len(value)?;
                self.store_reg(act, a, result);
            }

            Opcode::IN => self.binary(act, a, b, kb, c, kc, Self::op_in)?,

            Opcode::INSTANCEOF => {
                let (left, right) = (self.rk(act, b, kb)?, self.rk(act, c, kc)?);
                let result = self.op_instanceof(left, right);
                self.store_reg(act, a, result);
            }

            Opcode::GET => {
                let (target, index) = (self.rk(act, b, kb)?, self.rk(act, c, kc)?);
                let result = self.subscript_get(target, index)?;
                self.store_reg(act, a, result);
            }

            Opcode::SET => {
                let target = self.reg(act, a);
                let (index, value) = (self.rk(act, b, kb)?, self.rk(act, c, kc)?);
                self.subscript_set(target, index, value)?;
            }

            Opcode::JP => {
                act.pc = instruction.ax() as usize;
            }

            Opcode::TEST => {
                let value = self.rk(act, b, kb)?;
                if self.heap.truthy(value) == (c != 0) {
                    act.pc += 1;
                }
            }

            Opcode::TEST_SET => {
                let value = self.rk(act, b, kb)?;
                if self.heap.truthy(value) == (c != 0) {
                    act.pc += 1;
                } else {
                    self.store_reg_copy(act, a, value);
                }
            }

            Opcode::CALL => self.call(act, a, b)?,

            Opcode::INVOKE => self.invoke(act, a, b, kb, c)?,

            Opcode::RETURN => {
                let value = if a != 0 {
                    let value = self.rk(act, b, kb)?;
                    self.heap.retain(value);
                    value
                } else {
                    Value::Null
                };

                return self.ret(act, value);
            }
        }

        Ok(None)
    }

    fn binary(
        &mut self,
        act: &Activation,
        a: u8,
        b: u8,
        kb: bool,
        c: u8,
        kc: bool,
        apply: fn(&mut Self, Value, Value) -> Result<Value, Fault>,
    ) -> Result<(), Fault> {
        let (left, right) = (self.rk(act, b, kb)?, self.rk(act, c, kc)?);
        let result = apply(self, left, right)?;
        self.store_reg(act, a, result);
        Ok(())
    }

    /// Compare opcodes write no register: a true predicate skips the next
    /// instruction.
    fn compare(
        &mut self,
        act: &mut Activation,
        b: u8,
        kb: bool,
        c: u8,
        kc: bool,
        apply: fn(&mut Self, Value, Value) -> Result<Value, Fault>,
    ) -> Result<(), Fault> {
        let (left, right) = (self.rk(act, b, kb)?, self.rk(act, c, kc)?);
        let result = apply(self, left, right)?;
        let truthy = self.heap.truthy(result);
        self.heap.release(result);

        if truthy {
            act.pc += 1;
        }
        Ok(())
    }
}
