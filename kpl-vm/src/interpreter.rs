//! [`Interpreter`] implementation

use crate::call::CallStack;
use crate::chunk::Chunk;
use crate::globals::Globals;
use crate::heap::Heap;
use crate::registers::RegisterStack;
use crate::value::Value;

use kpl_asm::Instruction;

use std::collections::HashMap;
use std::sync::Arc;

mod constructors;
mod executors;
mod flow;
mod internal;
mod ops;

/// One virtual machine instance.
///
/// The interpreter owns exactly one heap, one globals registry, one call
/// stack, and one register stack; execution is single-threaded and
/// cooperative. Values are meaningful only within the instance that
/// created them.
#[derive(Debug)]
pub struct Interpreter {
    heap: Heap,
    globals: Globals,
    frames: CallStack,
    registers: RegisterStack,
    /// Chunk constants materialized on first use, keyed by chunk address
    /// and constant index. The cache owns one reference per value and is
    /// part of the collection roots.
    constants: HashMap<(usize, usize), Value>,
    fault_instruction: Option<Instruction>,
}

/// Execution state of the innermost activation, mirrored out of the call
/// stack while the dispatch loop runs.
#[derive(Debug)]
pub(crate) struct Activation {
    pub(crate) function: Value,
    pub(crate) chunk: Arc<Chunk>,
    pub(crate) base: usize,
    pub(crate) pc: usize,
}

impl Interpreter {
    /// The heap of this instance.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutable access to the heap, for host bridging.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// The globals registry.
    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// The register stack.
    pub fn registers(&self) -> &RegisterStack {
        &self.registers
    }

    /// Number of active call frames.
    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    /// Reads a global binding; `Null` when absent.
    pub fn global(&self, name: &[u8]) -> Value {
        self.globals.get(name)
    }

    /// Binds a global to a borrowed value, retaining it.
    pub fn set_global(&mut self, name: &[u8], value: Value) {
        self.globals.set(&mut self.heap, name, value);
    }

    /// Removes a global binding; no-op when absent.
    pub fn delete_global(&mut self, name: &[u8]) {
        self.globals.delete(&mut self.heap, name);
    }

    /// Reclaims every heap object unreachable from the instance's roots
    /// (registers, globals, call frames, and materialized constants),
    /// regardless of refcount. This also collects cyclic garbage the
    /// refcount sweep cannot.
    ///
    /// Values held only by the host are not roots: bind them to a global
    /// before collecting.
    pub fn collect(&mut self) {
        let roots: Vec<Value> = self
            .registers
            .values()
            .iter()
            .copied()
            .chain(self.globals.values())
            .chain(self.frames.iter().map(|frame| frame.function()))
            .chain(self.constants.values().copied())
            .filter(|value| value.handle().is_some())
            .collect();

        self.heap.collect(roots);
    }
}
