//! Tagged value model.
//!
//! A [`Value`] is a plain `Copy` discriminant over the primitive variants
//! and handles into the heap. The tag is fixed at construction; assignment
//! replaces tag and payload wholesale. Reference counting is explicit:
//! every storage site (register, global, object field, native root) routes
//! its writes through [`crate::heap::Heap::retain`] and
//! [`crate::heap::Heap::release`] so that each stored handle contributes
//! exactly one unit to its target's refcount.

use core::fmt;

/// Opaque handle to a heap slot.
///
/// Handles stay valid across compaction and arena growth; only the byte
/// offsets recorded in the headers move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub(crate) u32);

impl Handle {
    /// Slot index of the handle.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A dynamically-typed KPL value.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum Value {
    /// The null singleton.
    #[default]
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit IEEE 754 float.
    Float(f64),
    /// Boolean singleton pair.
    Boolean(bool),
    /// Handle to an immutable byte string.
    String(Handle),
    /// Handle to a fixed-length array.
    Array(Handle),
    /// Handle to a double-ended list.
    List(Handle),
    /// Handle to a property map with optional class and parents.
    Object(Handle),
    /// Handle to a function closing over a chunk and its locals.
    Function(Handle),
    /// Handle to an opaque host object.
    Userdata(Handle),
}

impl Value {
    /// Whether the value is the null singleton.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the value is an object handle.
    pub const fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Whether the value is a function handle.
    pub const fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// The heap handle carried by the value, if its variant is
    /// heap-managed.
    pub const fn handle(&self) -> Option<Handle> {
        match self {
            Self::String(h)
            | Self::Array(h)
            | Self::List(h)
            | Self::Object(h)
            | Self::Function(h)
            | Self::Userdata(h) => Some(*h),
            _ => None,
        }
    }

    /// Name of the value's data type.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::List(_) => "list",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
            Self::Userdata(_) => "userdata",
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}
