//! Call and return plumbing.
//!
//! In-VM calls of bytecode functions trampoline inside the dispatch loop:
//! the callee's window is based at the caller's register holding the
//! callable, which leaves the arguments in place. Calls that originate
//! from the host, or dispatch through an object's `__call__`, re-enter
//! the interpreter recursively behind a native sentinel frame.

use super::{Activation, Interpreter};
use crate::call::CallFrame;
use crate::error::Fault;
use crate::object::special;
use crate::value::Value;

use std::sync::Arc;

use tracing::trace;

impl Interpreter {
    /// Runs a bytecode function to completion behind a native sentinel
    /// frame; the returned value owns one reference.
    pub(crate) fn run_function(
        &mut self,
        function: Value,
        self_value: Value,
        args: &[Value],
    ) -> Result<Value, Fault> {
        let Value::Function(handle) = function else {
            return Err(Fault::BadValueOperation("call a non-callable value"));
        };

        let chunk = Arc::clone(self.heap.function(handle).chunk());
        // register_count names the highest addressable register id, so the
        // file spans one more slot.
        let file_size = chunk.register_count() as usize + 1;
        let base = self.frames.last().map(|frame| frame.top()).unwrap_or(0);

        self.frames.push(CallFrame::native(base))?;

        let top = match self
            .registers
            .open(&mut self.heap, base, file_size, self_value, 0)
        {
            Ok(top) => top,
            Err(fault) => {
                self.frames.pop();
                return Err(fault);
            }
        };
        self.registers
            .push_args(&mut self.heap, base, args, file_size);

        self.heap.retain(function);
        if let Err(fault) = self
            .frames
            .push(CallFrame::new(function, base, top, 0))
        {
            self.heap.release(function);
            self.registers.close(&mut self.heap, base, top);
            self.frames.pop();
            return Err(fault);
        }

        trace!(base, args = args.len(), "function entry");

        let activation = Activation {
            function,
            chunk,
            base,
            pc: 0,
        };

        match self.dispatch(activation) {
            Ok(value) => {
                let native = self.frames.pop();
                debug_assert!(matches!(native, Some(frame) if frame.is_native()));
                Ok(value)
            }
            Err(fault) => {
                self.unwind();
                Err(fault)
            }
        }
    }

    /// Calls any callable value with an explicit `self`; arguments are
    /// borrowed, the result is owned.
    pub(crate) fn call_value(
        &mut self,
        callable: Value,
        self_value: Value,
        args: &[Value],
    ) -> Result<Value, Fault> {
        match callable {
            Value::Function(_) => self.run_function(callable, self_value, args),
            Value::Object(_) | Value::Userdata(_) => {
                self.invoke_special(callable, special::CALL, args)
            }
            _ => Err(Fault::BadValueOperation("call a non-callable value")),
        }
    }

    /// Resolves a special property on `receiver` and calls it with the
    /// receiver as `self`. Missing properties are a fault: operator
    /// dispatch has no further fallback.
    pub(crate) fn invoke_special(
        &mut self,
        receiver: Value,
        name: &'static str,
        args: &[Value],
    ) -> Result<Value, Fault> {
        let method = self.heap.property(receiver, name.as_bytes());
        if method.is_null() {
            return Err(Fault::BadProperty(name));
        }

        self.call_value(method, receiver, args)
    }

    /// `CALL A B`: bytecode functions continue in the same dispatch loop,
    /// object and userdata callables recurse through `__call__`.
    pub(crate) fn call(&mut self, act: &mut Activation, a: u8, argc: u8) -> Result<(), Fault> {
        let callable = self.reg(act, a);
        match callable {
            Value::Function(_) => self.enter(act, a, callable, Value::Null, argc),
            Value::Object(_) | Value::Userdata(_) => {
                let args = self.collect_args(act, a, argc);
                let result = self.call_value(callable, Value::Null, &args)?;
                self.store_reg(act, a, result);
                Ok(())
            }
            _ => Err(Fault::BadValueOperation("call a non-callable value")),
        }
    }

    /// `INVOKE A KB C`: resolves the property and calls it with `R(A)` as
    /// `self`.
    pub(crate) fn invoke(
        &mut self,
        act: &mut Activation,
        a: u8,
        name_index: u8,
        name_is_constant: bool,
        argc: u8,
    ) -> Result<(), Fault> {
        let receiver = self.reg(act, a);
        let name_value = self.rk(act, name_index, name_is_constant)?;
        let name = self.name_bytes(name_value);

        let method = self.heap.property(receiver, &name);
        match method {
            Value::Function(_) => self.enter(act, a, method, receiver, argc),
            Value::Null => Err(Fault::BadValueOperation("invoke a missing property")),
            other => {
                let args = self.collect_args(act, a, argc);
                let result = self.call_value(other, receiver, &args)?;
                self.store_reg(act, a, result);
                Ok(())
            }
        }
    }

    /// Opens the callee's window at the caller's slot `A` and switches the
    /// activation; the caller's saved pc lands in the new frame.
    fn enter(
        &mut self,
        act: &mut Activation,
        a: u8,
        callee: Value,
        self_value: Value,
        argc: u8,
    ) -> Result<(), Fault> {
        let Value::Function(handle) = callee else {
            return Err(Fault::BadValueOperation("call a non-callable value"));
        };

        let chunk = Arc::clone(self.heap.function(handle).chunk());
        let file_size = chunk.register_count() as usize + 1;
        let base = act.base + 1 + a as usize;

        // The frame owns the callee for the activation's lifetime; the
        // slot it currently occupies is about to become the `self` slot.
        self.heap.retain(callee);

        let top = match self.registers.open(
            &mut self.heap,
            base,
            file_size,
            self_value,
            argc as usize,
        ) {
            Ok(top) => top,
            Err(fault) => {
                self.heap.release(callee);
                return Err(fault);
            }
        };

        if let Err(fault) = self
            .frames
            .push(CallFrame::new(callee, base, top, act.pc))
        {
            self.heap.release(callee);
            // Give back the slots the window claimed beyond the caller's
            // own; the caller's region is closed by the unwind.
            let caller_top = self.frames.last().map(|frame| frame.top()).unwrap_or(base);
            self.registers
                .close(&mut self.heap, caller_top.max(base), top);
            return Err(fault);
        }

        trace!(base, args = argc, "call");

        act.function = callee;
        act.chunk = chunk;
        act.base = base;
        act.pc = 0;
        Ok(())
    }

    /// `RETURN`: closes the callee window and either halts (native
    /// caller) or lands the owned return value in the caller's
    /// destination register.
    pub(crate) fn ret(
        &mut self,
        act: &mut Activation,
        value: Value,
    ) -> Result<Option<Value>, Fault> {
        let Some(frame) = self.frames.pop() else {
            unreachable!("return without an active frame");
        };
        debug_assert!(!frame.is_native());

        self.registers.close(&mut self.heap, frame.base(), frame.top());
        self.heap.release(frame.function());

        let Some(caller) = self.frames.last().copied() else {
            unreachable!("native sentinel below every activation");
        };

        trace!(base = frame.base(), "return");

        if caller.is_native() {
            return Ok(Some(value));
        }

        act.pc = frame.return_pc();
        act.base = caller.base();
        act.function = caller.function();
        act.chunk = match caller.function() {
            Value::Function(handle) => Arc::clone(self.heap.function(handle).chunk()),
            _ => unreachable!("caller frame holds a non-function"),
        };

        // The destination is the slot the callee was based at.
        self.registers.store(&mut self.heap, frame.base(), value);
        Ok(None)
    }

    /// Pops frames down to and including the nearest native sentinel,
    /// closing their windows and releasing their function references.
    pub(crate) fn unwind(&mut self) {
        while let Some(frame) = self.frames.pop() {
            if frame.is_native() {
                break;
            }

            self.registers
                .close(&mut self.heap, frame.base(), frame.top());
            self.heap.release(frame.function());
        }
    }

    fn collect_args(&self, act: &Activation, a: u8, argc: u8) -> Vec<Value> {
        (0..argc as usize)
            .map(|i| self.registers.get(act.base + 2 + a as usize + i))
            .collect()
    }
}
