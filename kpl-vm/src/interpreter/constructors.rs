//! Exposed constructors API for the [`Interpreter`]

use super::Interpreter;
use crate::call::CallStack;
use crate::globals::Globals;
use crate::heap::Heap;
use crate::registers::RegisterStack;

use std::collections::HashMap;

impl Interpreter {
    /// Creates an instance with the default heap and stack capacities.
    pub fn new() -> Self {
        Self::with_heap(Heap::new())
    }

    /// Creates an instance over a pre-sized heap.
    pub fn with_heap(heap: Heap) -> Self {
        Self {
            heap,
            globals: Globals::new(),
            frames: CallStack::new(),
            registers: RegisterStack::new(),
            constants: HashMap::new(),
            fault_instruction: None,
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
