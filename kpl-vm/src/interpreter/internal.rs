use super::{Activation, Interpreter};
use crate::chunk::{Chunk, Constant};
use crate::error::Fault;
use crate::value::Value;

use std::sync::Arc;

impl Interpreter {
    /// Reads register file slot `r` of the running activation.
    pub(crate) fn reg(&self, act: &Activation, r: u8) -> Value {
        self.registers.get(act.base + 1 + r as usize)
    }

    /// Writes an owned value into file slot `r`, releasing the previous
    /// occupant.
    pub(crate) fn store_reg(&mut self, act: &Activation, r: u8, value: Value) {
        self.registers
            .store(&mut self.heap, act.base + 1 + r as usize, value);
    }

    /// Writes a borrowed value into file slot `r`, retaining it.
    pub(crate) fn store_reg_copy(&mut self, act: &Activation, r: u8, value: Value) {
        self.registers
            .store_copy(&mut self.heap, act.base + 1 + r as usize, value);
    }

    /// Resolves an `RK` operand: the constant at `index` when `is_constant`
    /// is set, the register file slot otherwise.
    pub(crate) fn rk(
        &mut self,
        act: &Activation,
        index: u8,
        is_constant: bool,
    ) -> Result<Value, Fault> {
        if is_constant {
            self.constant_value(&act.chunk, index as usize)
        } else {
            Ok(self.reg(act, index))
        }
    }

    /// Materializes a chunk constant.
    ///
    /// String constants allocate once per chunk and index; the cache owns
    /// the resulting value and roots it during collection.
    pub(crate) fn constant_value(
        &mut self,
        chunk: &Arc<Chunk>,
        index: usize,
    ) -> Result<Value, Fault> {
        let Some(constant) = chunk.constant(index) else {
            return Ok(Value::Null);
        };

        match constant {
            Constant::Null => Ok(Value::Null),
            Constant::Integer(i) => Ok(Value::Integer(*i)),
            Constant::Float(f) => Ok(Value::Float(*f)),
            Constant::Boolean(b) => Ok(Value::Boolean(*b)),
            Constant::String(bytes) => {
                let key = (Arc::as_ptr(chunk) as usize, index);
                if let Some(&cached) = self.constants.get(&key) {
                    return Ok(cached);
                }

                let value = self.heap.make_string(bytes.clone())?;
                self.constants.insert(key, value);
                Ok(value)
            }
        }
    }

    /// Key bytes for property and global lookups: strings verbatim, any
    /// other value through its textual rendering.
    pub(crate) fn name_bytes(&self, value: Value) -> Vec<u8> {
        match value {
            Value::String(handle) => self.heap.string(handle).as_bytes().to_vec(),
            other => self.heap.stringify(other).into_bytes(),
        }
    }

    /// The `locals` binding of the running function.
    pub(crate) fn function_locals(&self, act: &Activation) -> Value {
        match act.function {
            Value::Function(handle) => self.heap.function(handle).locals(),
            _ => Value::Null,
        }
    }

    /// Stores a property on any value: objects update their own entry,
    /// userdata forwards to the host, every other tag ignores the write.
    pub(crate) fn set_property(&mut self, target: Value, name: &[u8], value: Value) {
        match target {
            Value::Object(handle) => self.heap.object_insert(handle, name, value),
            Value::Userdata(handle) => self.heap.userdata_mut(handle).set_property(name, value),
            _ => {}
        }
    }

    /// Deletes a property: objects drop their own entry, userdata forwards
    /// to the host, every other tag ignores the delete.
    pub fn delete_property(&mut self, target: Value, name: &[u8]) {
        match target {
            Value::Object(handle) => self.heap.object_remove(handle, name),
            Value::Userdata(handle) => self.heap.userdata_mut(handle).del_property(name),
            _ => {}
        }
    }
}
