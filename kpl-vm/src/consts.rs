//! VM parameters

/// Frame capacity of the call stack.
pub const CALL_STACK_CAPACITY: usize = 32 * 1024;

/// Value capacity of the register stack.
pub const REGISTER_STACK_CAPACITY: usize = 64 * 1024;

/// Initial and minimum heap arena capacity, in bytes.
pub const HEAP_MIN_CAPACITY: usize = 32 * 1024;

/// Heap arena capacity ceiling, in bytes.
pub const HEAP_MAX_CAPACITY: usize = 8 * 1024 * 1024;

/// Cap on a single arena growth step, in bytes.
pub const HEAP_MAX_GROWTH: usize = 512 * 1024 * 1024;

/// Growth attempts one allocation may spend after collecting.
pub const HEAP_GROWTH_ATTEMPTS: usize = 2;
