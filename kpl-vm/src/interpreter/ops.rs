//! Operator semantics.
//!
//! One function per operator, matching on both operand tags. Results are
//! owned: freshly allocated values carry the reference `alloc` handed out,
//! borrowed container elements are retained before they are returned, so
//! the dispatch loop can always transfer the result into its destination
//! register. Objects and userdata dispatch through their special
//! properties; a missing special property is a [`Fault::BadProperty`].

use super::Interpreter;
use crate::error::Fault;
use crate::object::special;
use crate::value::{Handle, Value};

use std::cmp::Ordering;

impl Interpreter {
    pub(crate) fn op_add(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_add(b))),
            (Value::Integer(a), Value::Float(b)) => Ok(Value::Float(a as f64 + b)),
            (Value::Float(a), Value::Integer(b)) => Ok(Value::Float(a + b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::String(a), Value::String(b)) => {
                let mut bytes = self.heap.string(a).as_bytes().to_vec();
                bytes.extend_from_slice(self.heap.string(b).as_bytes());
                self.heap.make_string(bytes)
            }
            (Value::Array(a), Value::Array(b)) => {
                let mut items = self.heap.array(a).as_slice().to_vec();
                items.extend_from_slice(self.heap.array(b).as_slice());
                self.heap.make_array_from(items)
            }
            (Value::Array(a), Value::List(b)) => {
                let mut items = self.heap.array(a).as_slice().to_vec();
                items.extend(self.heap.list(b).iter());
                self.heap.make_array_from(items)
            }
            (Value::List(a), Value::Array(b)) => {
                let mut items: Vec<Value> = self.heap.list(a).iter().collect();
                items.extend_from_slice(self.heap.array(b).as_slice());
                self.heap.make_list_from(items)
            }
            (Value::List(a), Value::List(b)) => {
                let mut items: Vec<Value> = self.heap.list(a).iter().collect();
                items.extend(self.heap.list(b).iter());
                self.heap.make_list_from(items)
            }
            (Value::Object(_) | Value::Userdata(_), _) => {
                self.invoke_special(left, special::ADD, &[right])
            }
            _ => Err(Fault::BadValueOperation("add")),
        }
    }

    pub(crate) fn op_sub(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_sub(b))),
            (Value::Integer(a), Value::Float(b)) => Ok(Value::Float(a as f64 - b)),
            (Value::Float(a), Value::Integer(b)) => Ok(Value::Float(a - b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
            (Value::Object(_) | Value::Userdata(_), _) => {
                self.invoke_special(left, special::SUB, &[right])
            }
            _ => Err(Fault::BadValueOperation("sub")),
        }
    }

    pub(crate) fn op_mul(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_mul(b))),
            (Value::Integer(a), Value::Float(b)) => Ok(Value::Float(a as f64 * b)),
            (Value::Float(a), Value::Integer(b)) => Ok(Value::Float(a * b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
            (Value::String(s), Value::Integer(n)) => self.string_repeat(s, n),
            (Value::String(s), Value::Float(n)) => self.string_repeat(s, n as i64),
            (Value::Object(_) | Value::Userdata(_), _) => {
                self.invoke_special(left, special::MUL, &[right])
            }
            _ => Err(Fault::BadValueOperation("mul")),
        }
    }

    /// `div` always produces a float.
    pub(crate) fn op_div(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Float(a as f64 / b as f64)),
            (Value::Integer(a), Value::Float(b)) => Ok(Value::Float(a as f64 / b)),
            (Value::Float(a), Value::Integer(b)) => Ok(Value::Float(a / b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
            (Value::Object(_) | Value::Userdata(_), _) => {
                self.invoke_special(left, special::DIV, &[right])
            }
            _ => Err(Fault::BadValueOperation("div")),
        }
    }

    /// `idiv` truncates toward zero and always produces an integer.
    pub(crate) fn op_idiv(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        match (left, right) {
            (Value::Integer(_), Value::Integer(0)) => {
                Err(Fault::BadValueOperation("integer division by zero"))
            }
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_div(b))),
            (Value::Integer(a), Value::Float(b)) => Ok(Value::Integer((a as f64 / b) as i64)),
            (Value::Float(a), Value::Integer(b)) => Ok(Value::Integer((a / b as f64) as i64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Integer((a / b) as i64)),
            (Value::Object(_) | Value::Userdata(_), _) => {
                self.invoke_special(left, special::IDIV, &[right])
            }
            _ => Err(Fault::BadValueOperation("idiv")),
        }
    }

    /// `mod` coerces floats to integers on both sides.
    pub(crate) fn op_mod(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        match (left, right) {
            (Value::Object(_) | Value::Userdata(_), _) => {
                self.invoke_special(left, special::MOD, &[right])
            }
            _ => match (as_integer(left), as_integer(right)) {
                (Some(_), Some(0)) => Err(Fault::BadValueOperation("modulo by zero")),
                (Some(a), Some(b)) => Ok(Value::Integer(a.wrapping_rem(b))),
                _ => Err(Fault::BadValueOperation("mod")),
            },
        }
    }

    pub(crate) fn op_shl(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        self.bitwise(left, right, "shl", special::SHL, |a, b| {
            a.wrapping_shl(b as u32)
        })
    }

    pub(crate) fn op_shr(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        self.bitwise(left, right, "shr", special::SHR, |a, b| {
            a.wrapping_shr(b as u32)
        })
    }

    pub(crate) fn op_band(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        self.bitwise(left, right, "band", special::BAND, |a, b| a & b)
    }

    pub(crate) fn op_bor(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        self.bitwise(left, right, "bor", special::BOR, |a, b| a | b)
    }

    pub(crate) fn op_xor(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        self.bitwise(left, right, "xor", special::XOR, |a, b| a ^ b)
    }

    fn bitwise(
        &mut self,
        left: Value,
        right: Value,
        name: &'static str,
        special_name: &'static str,
        apply: fn(i64, i64) -> i64,
    ) -> Result<Value, Fault> {
        match left {
            Value::Object(_) | Value::Userdata(_) => {
                self.invoke_special(left, special_name, &[right])
            }
            _ => match (as_integer(left), as_integer(right)) {
                (Some(a), Some(b)) => Ok(Value::Integer(apply(a, b))),
                _ => Err(Fault::BadValueOperation(name)),
            },
        }
    }

    /// Value equality; total over every tag pairing.
    pub(crate) fn values_equal(&mut self, left: Value, right: Value) -> Result<bool, Fault> {
        match (left, right) {
            (Value::Null, Value::Null) => Ok(true),
            (Value::Integer(a), Value::Integer(b)) => Ok(a == b),
            (Value::Integer(a), Value::Float(b)) => Ok(a as f64 == b),
            (Value::Float(a), Value::Integer(b)) => Ok(a == b as f64),
            (Value::Float(a), Value::Float(b)) => Ok(a == b),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a == b),
            (Value::String(a), Value::String(b)) => Ok(self.heap.string(a) == self.heap.string(b)),
            (Value::Array(a), Value::Array(b)) => {
                if self.heap.array(a).len() != self.heap.array(b).len() {
                    return Ok(false);
                }
                let lhs = self.heap.array(a).as_slice().to_vec();
                let rhs = self.heap.array(b).as_slice().to_vec();
                self.elements_equal(lhs, rhs)
            }
            (Value::List(a), Value::List(b)) => {
                if self.heap.list(a).len() != self.heap.list(b).len() {
                    return Ok(false);
                }
                let lhs: Vec<Value> = self.heap.list(a).iter().collect();
                let rhs: Vec<Value> = self.heap.list(b).iter().collect();
                self.elements_equal(lhs, rhs)
            }
            (Value::Object(_), Value::Object(_)) | (Value::Userdata(_), Value::Userdata(_)) => {
                let probe = self.heap.property(left, special::EQ.as_bytes());
                if probe.is_null() {
                    return Ok(left == right);
                }
                let result = self.call_value(probe, left, &[right])?;
                let truthy = self.heap.truthy(result);
                self.heap.release(result);
                Ok(truthy)
            }
            (Value::Function(a), Value::Function(b)) => Ok(a == b),
            _ => Ok(false),
        }
    }

    /// Value inequality: probes `__ne__` before falling back to the
    /// negation of equality.
    pub(crate) fn values_not_equal(&mut self, left: Value, right: Value) -> Result<bool, Fault> {
        if let (Value::Object(_), Value::Object(_)) | (Value::Userdata(_), Value::Userdata(_)) =
            (left, right)
        {
            let probe = self.heap.property(left, special::NE.as_bytes());
            if !probe.is_null() {
                let result = self.call_value(probe, left, &[right])?;
                let truthy = self.heap.truthy(result);
                self.heap.release(result);
                return Ok(truthy);
            }
        }

        Ok(!self.values_equal(left, right)?)
    }

    fn elements_equal(&mut self, lhs: Vec<Value>, rhs: Vec<Value>) -> Result<bool, Fault> {
        for (l, r) in lhs.into_iter().zip(rhs) {
            if !self.values_equal(l, r)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn op_gr(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        self.ordered(left, right, "gr", special::GR, |o| o == Ordering::Greater)
    }

    pub(crate) fn op_ls(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        self.ordered(left, right, "ls", special::LS, |o| o == Ordering::Less)
    }

    pub(crate) fn op_ge(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        self.ordered(left, right, "ge", special::GE, |o| o != Ordering::Less)
    }

    pub(crate) fn op_le(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        self.ordered(left, right, "le", special::LE, |o| o != Ordering::Greater)
    }

    fn ordered(
        &mut self,
        left: Value,
        right: Value,
        name: &'static str,
        special_name: &'static str,
        test: fn(Ordering) -> bool,
    ) -> Result<Value, Fault> {
        let ordering = match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(&b)),
            (Value::Integer(a), Value::Float(b)) => (a as f64).partial_cmp(&b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(&b),
            (Value::String(a), Value::String(b)) => {
                Some(self.heap.string(a).cmp(self.heap.string(b)))
            }
            (Value::Object(_) | Value::Userdata(_), _) => {
                return self.invoke_special(left, special_name, &[right]);
            }
            _ => return Err(Fault::BadValueOperation(name)),
        };

        // An incomparable pair (NaN) fails every ordering predicate.
        Ok(Value::Boolean(ordering.is_some_and(test)))
    }

    /// `right in left`: substring for strings, element membership for
    /// arrays and lists.
    pub(crate) fn op_in(&mut self, left: Value, right: Value) -> Result<Value, Fault> {
        match left {
            Value::String(h) => {
                let found = match right {
                    Value::String(needle) => contains_subslice(
                        self.heap.string(h).as_bytes(),
                        self.heap.string(needle).as_bytes(),
                    ),
                    _ => false,
                };
                Ok(Value::Boolean(found))
            }
            Value::Array(h) => {
                let items = self.heap.array(h).as_slice().to_vec();
                self.contains_value(items, right)
            }
            Value::List(h) => {
                let items: Vec<Value> = self.heap.list(h).iter().collect();
                self.contains_value(items, right)
            }
            Value::Object(_) | Value::Userdata(_) => {
                self.invoke_special(left, special::IN, &[right])
            }
            _ => Err(Fault::BadValueOperation("in")),
        }
    }

    fn contains_value(&mut self, items: Vec<Value>, needle: Value) -> Result<Value, Fault> {
        for item in items {
            if self.values_equal(item, needle)? {
                return Ok(Value::Boolean(true));
            }
        }
        Ok(Value::Boolean(false))
    }

    /// `left instanceof right`: the direct class equals the target, or any
    /// parent does, recursively.
    pub(crate) fn op_instanceof(&self, left: Value, right: Value) -> Value {
        Value::Boolean(self.is_instance_of(left, right))
    }

    pub(crate) fn is_instance_of(&self, value: Value, target: Value) -> bool {
        let Value::Object(handle) = value else {
            return false;
        };

        let class = self.heap.object(handle).class();
        (!class.is_null() && class == target) || self.parents_contain(handle, target)
    }

    fn parents_contain(&self, handle: Handle, target: Value) -> bool {
        self.heap.object(handle).parents().iter().any(|&parent| {
            parent == target
                || match parent {
                    Value::Object(parent) => self.parents_contain(parent, target),
                    _ => false,
                }
        })
    }

    pub(crate) fn op_len(&mut self, value: Value) -> Result<Value, Fault> {
        match value {
            Value::String(h) => Ok(Value::Integer(self.heap.string(h).len() as i64)),
            Value::Array(h) => Ok(Value::Integer(self.heap.array(h).len() as i64)),
            Value::List(h) => Ok(Value::Integer(self.heap.list(h).len() as i64)),
            Value::Object(_) | Value::Userdata(_) => {
                self.invoke_special(value, special::LEN, &[])
            }
            _ => Err(Fault::BadValueOperation("length")),
        }
    }

    /// Logical negation; total over every tag.
    pub(crate) fn op_not(&mut self, value: Value) -> Value {
        Value::Boolean(!self.heap.truthy(value))
    }

    pub(crate) fn op_bnot(&mut self, value: Value) -> Result<Value, Fault> {
        match value {
            Value::Integer(i) => Ok(Value::Integer(!i)),
            Value::Object(_) | Value::Userdata(_) => {
                self.invoke_special(value, special::BNOT, &[])
            }
            _ => Err(Fault::BadValueOperation("bnot")),
        }
    }

    pub(crate) fn op_neg(&mut self, value: Value) -> Result<Value, Fault> {
        match value {
            Value::Integer(i) => Ok(Value::Integer(i.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Object(_) | Value::Userdata(_) => {
                self.invoke_special(value, special::NEG, &[])
            }
            _ => Err(Fault::BadValueOperation("neg")),
        }
    }

    pub(crate) fn subscript_get(&mut self, target: Value, index: Value) -> Result<Value, Fault> {
        match target {
            Value::String(h) => {
                let at = self.heap.to_integer(index)?;
                let len = self.heap.string(h).len();
                let slot = usize::try_from(at)
                    .ok()
                    .filter(|&i| i < len)
                    .ok_or(Fault::IndexOutOfRange { index: at, len })?;

                let byte = self.heap.string(h).as_bytes()[slot];
                self.heap.make_string(vec![byte])
            }
            Value::Array(h) => {
                let at = self.heap.to_integer(index)?;
                let len = self.heap.array(h).len();
                let element = usize::try_from(at)
                    .ok()
                    .and_then(|i| self.heap.array(h).get(i))
                    .ok_or(Fault::IndexOutOfRange { index: at, len })?;

                self.heap.retain(element);
                Ok(element)
            }
            Value::List(h) => {
                let at = self.heap.to_integer(index)?;
                let len = self.heap.list(h).len();
                let element = usize::try_from(at)
                    .ok()
                    .and_then(|i| self.heap.list(h).get(i))
                    .ok_or(Fault::IndexOutOfRange { index: at, len })?;

                self.heap.retain(element);
                Ok(element)
            }
            Value::Object(_) | Value::Userdata(_) => {
                self.invoke_special(target, special::GET, &[index])
            }
            _ => Err(Fault::BadValueOperation("subscript")),
        }
    }

    pub(crate) fn subscript_set(
        &mut self,
        target: Value,
        index: Value,
        value: Value,
    ) -> Result<(), Fault> {
        match target {
            Value::Array(h) => {
                let at = self.heap.to_integer(index)?;
                self.heap.array_store(h, at, value)
            }
            Value::List(h) => {
                let at = self.heap.to_integer(index)?;
                self.heap.list_store(h, at, value)
            }
            Value::Object(_) | Value::Userdata(_) => {
                let result = self.invoke_special(target, special::SET, &[index, value])?;
                self.heap.release(result);
                Ok(())
            }
            _ => Err(Fault::BadValueOperation("subscript assignment")),
        }
    }

    fn string_repeat(&mut self, handle: Handle, times: i64) -> Result<Value, Fault> {
        let bytes = if times <= 0 {
            Vec::new()
        } else {
            self.heap.string(handle).as_bytes().repeat(times as usize)
        };
        self.heap.make_string(bytes)
    }
}

fn as_integer(value: Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(i),
        Value::Float(f) => Some(f as i64),
        _ => None,
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}
