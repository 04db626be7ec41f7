//! Register file windows over one contiguous value stack.
//!
//! Each activation owns a window: slot 0 holds `self` and the register
//! file follows, so user operand `r` addresses window slot `r + 1`. The
//! chunk's register count names the highest addressable id, giving the
//! file `register_count + 1` slots. Windows of nested calls overlap: a
//! callee's window starts at the caller's register holding the callable,
//! which places the arguments in the callee's file without copying.

use crate::consts::REGISTER_STACK_CAPACITY;
use crate::error::Fault;
use crate::heap::Heap;
use crate::value::Value;

/// Fixed-capacity contiguous stack of registers.
#[derive(Debug)]
pub struct RegisterStack {
    values: Vec<Value>,
}

impl Default for RegisterStack {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterStack {
    /// Creates a register stack with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(REGISTER_STACK_CAPACITY)
    }

    /// Creates a register stack holding at most `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: vec![Value::Null; capacity],
        }
    }

    /// Value capacity.
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Every slot, including closed ones (which hold `Null`).
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Reads an absolute slot.
    pub fn get(&self, index: usize) -> Value {
        self.values[index]
    }

    /// Writes an absolute slot, taking ownership of `value`'s reference
    /// and releasing the replaced one.
    pub fn store(&mut self, heap: &mut Heap, index: usize, value: Value) {
        let old = std::mem::replace(&mut self.values[index], value);
        heap.release(old);
    }

    /// Writes a borrowed value into an absolute slot, retaining it.
    pub fn store_copy(&mut self, heap: &mut Heap, index: usize, value: Value) {
        heap.retain(value);
        self.store(heap, index, value);
    }

    /// Opens the window `base..base + 1 + file_size`: writes `self` into
    /// slot 0 and clears every file slot past the `argc` arguments already
    /// in place. Fails when the window would not fit.
    pub fn open(
        &mut self,
        heap: &mut Heap,
        base: usize,
        file_size: usize,
        self_value: Value,
        argc: usize,
    ) -> Result<usize, Fault> {
        let top = base + 1 + file_size;
        if top > self.values.len() {
            return Err(Fault::StackOverflow);
        }

        // `self` may live in the slot it is being written to; retain
        // before releasing the previous occupant.
        self.store_copy(heap, base, self_value);

        for index in base + 1 + argc.min(file_size)..top {
            self.store(heap, index, Value::Null);
        }

        Ok(top)
    }

    /// Copies up to `cap` caller-provided values into the file of the
    /// window at `base`, retaining each.
    pub fn push_args(&mut self, heap: &mut Heap, base: usize, args: &[Value], cap: usize) {
        for (slot, &value) in args.iter().take(cap).enumerate() {
            self.store_copy(heap, base + 1 + slot, value);
        }
    }

    /// Closes the window `base..top`, releasing every slot.
    pub fn close(&mut self, heap: &mut Heap, base: usize, top: usize) {
        for index in base..top {
            self.store(heap, index, Value::Null);
        }
    }
}
