//! Reference-counted, compacting heap.
//!
//! The heap hands out [`Handle`]s to slot-addressed objects while keeping
//! byte-level accounting of a logical arena: every allocation charges a
//! header plus its payload size against a bump offset, and headers form a
//! doubly-linked live list in allocation order. Handles stay valid across
//! compaction and growth; the compactor only rewrites the byte offsets
//! recorded in the headers.
//!
//! Ownership convention: `alloc` and every `make_*` constructor return a
//! value owning one reference. Storage sites take their own reference via
//! [`Heap::retain`] and give it back via [`Heap::release`]; the store
//! helpers on this type (`array_store`, `object_insert`, ...) do that
//! bookkeeping themselves.

use crate::chunk::Chunk;
use crate::consts::*;
use crate::error::Fault;
use crate::object::{HeapObject, Userdata, VmArray, VmFunction, VmList, VmObject, VmString};
use crate::value::{Handle, Value};

use itertools::Itertools;

use std::mem;
use std::sync::Arc;

use tracing::{debug, trace};

const HEADER_SIZE: usize = mem::size_of::<Header>();

/// Accounting header of one live allocation.
#[derive(Debug, Clone, Copy)]
struct Header {
    /// Charged bytes, header included.
    size: usize,
    prev: Option<Handle>,
    next: Option<Handle>,
    refs: u32,
}

#[derive(Debug)]
struct Entry {
    header: Header,
    /// Byte position of the header within the arena.
    offset: usize,
    payload: HeapObject,
}

#[derive(Debug)]
enum Slot {
    Occupied(Entry),
    Vacant { next_free: Option<u32> },
}

/// The managed heap of one interpreter instance.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    head: Option<Handle>,
    tail: Option<Handle>,
    offset: usize,
    capacity: usize,
    max_capacity: usize,
    live: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Creates a heap with the default capacity bounds.
    pub fn new() -> Self {
        Self::with_capacity(HEAP_MIN_CAPACITY, HEAP_MAX_CAPACITY)
    }

    /// Creates a heap with explicit initial and maximum arena capacities.
    pub fn with_capacity(min_capacity: usize, max_capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            head: None,
            tail: None,
            offset: 0,
            capacity: min_capacity,
            max_capacity: max_capacity.max(min_capacity),
            live: 0,
        }
    }

    /// Current bump offset, in bytes.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Current arena capacity, in bytes.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live objects.
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Whether the heap holds no live objects.
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Reference count of a live object.
    pub fn refs(&self, handle: Handle) -> u32 {
        self.entry(handle).header.refs
    }

    /// Whether the handle still names a live object.
    pub fn contains(&self, handle: Handle) -> bool {
        matches!(
            self.slots.get(handle.index()),
            Some(Slot::Occupied(_))
        )
    }

    /// Allocates a payload, returning a value that owns one reference.
    ///
    /// Fails with [`Fault::OutOfMemory`] only if a sweep followed by up to
    /// two capacity growth steps cannot make room.
    pub fn alloc(&mut self, payload: HeapObject) -> Result<Handle, Fault> {
        let size = HEADER_SIZE + payload.byte_size();

        if !self.fits(size) {
            self.gc();

            let mut attempts = 0;
            while !self.fits(size) && attempts < HEAP_GROWTH_ATTEMPTS && self.grow() {
                attempts += 1;
            }

            if !self.fits(size) {
                return Err(Fault::OutOfMemory);
            }
        }

        let offset = self.offset;
        self.offset += size;

        let entry = Entry {
            header: Header {
                size,
                prev: self.tail,
                next: None,
                refs: 1,
            },
            offset,
            payload,
        };

        let handle = match self.free_head {
            Some(index) => {
                let next_free = match &self.slots[index as usize] {
                    Slot::Vacant { next_free } => *next_free,
                    Slot::Occupied(_) => unreachable!("free list points at a live slot"),
                };
                self.free_head = next_free;
                self.slots[index as usize] = Slot::Occupied(entry);
                Handle(index)
            }
            None => {
                self.slots.push(Slot::Occupied(entry));
                Handle((self.slots.len() - 1) as u32)
            }
        };

        match self.tail {
            Some(tail) => self.entry_mut(tail).header.next = Some(handle),
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        self.live += 1;

        trace!(%handle, size, offset, "heap alloc");
        Ok(handle)
    }

    /// Explicitly destroys an object: unlinks its header and runs its
    /// destructor, releasing contained values.
    ///
    /// The byte range stays charged until the next compacting pass.
    pub fn free(&mut self, value: Value) {
        let Some(handle) = value.handle() else {
            debug_assert!(false, "attempt to free a non-heap value");
            return;
        };

        self.unlink(handle);
        let payload = self.vacate(handle);
        self.run_destructor(payload);
        trace!(%handle, "heap free");
    }

    /// Takes one reference on a heap-managed value; no-op for primitives.
    ///
    /// Saturates at `u32::MAX`; a saturated object can no longer be
    /// reclaimed by the sweep.
    pub fn retain(&mut self, value: Value) {
        if let Some(handle) = value.handle() {
            let refs = &mut self.entry_mut(handle).header.refs;
            *refs = refs.saturating_add(1);
        }
    }

    /// Gives back one reference on a heap-managed value; no-op for
    /// primitives. Floors at zero.
    pub fn release(&mut self, value: Value) {
        let Some(handle) = value.handle() else {
            return;
        };

        // Destructor cascades during a sweep may release objects already
        // reclaimed earlier in the same pass.
        if let Some(Slot::Occupied(entry)) = self.slots.get_mut(handle.index()) {
            entry.header.refs = entry.header.refs.saturating_sub(1);
        }
    }

    /// Compacting sweep: walks the live list in order, slides every
    /// referenced object leftward to the next packed offset, and destroys
    /// every object whose refcount reached zero. Afterwards the bump
    /// offset sits just past the last survivor.
    pub fn gc(&mut self) {
        let mut cursor = 0;
        let mut reclaimed = 0usize;
        let mut walker = self.head;

        while let Some(handle) = walker {
            let entry = self.entry(handle);
            walker = entry.header.next;

            if entry.header.refs == 0 {
                self.unlink(handle);
                let payload = self.vacate(handle);
                self.run_destructor(payload);
                reclaimed += 1;
            } else {
                let entry = self.entry_mut(handle);
                entry.offset = cursor;
                cursor += entry.header.size;
            }
        }

        self.offset = cursor;
        if reclaimed > 0 {
            debug!(reclaimed, offset = cursor, "heap swept");
        }
    }

    /// Mark-from-roots compaction: keeps every object transitively
    /// reachable from `roots` and reclaims everything else regardless of
    /// refcount, which also collects cyclic garbage the sweep cannot.
    pub fn collect<I>(&mut self, roots: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let mut marked = vec![false; self.slots.len()];
        let mut pending: Vec<Handle> = roots.into_iter().filter_map(|v| v.handle()).collect();

        while let Some(handle) = pending.pop() {
            if marked[handle.index()] {
                continue;
            }
            marked[handle.index()] = true;

            for value in self.entry(handle).payload.contained_values() {
                if let Some(child) = value.handle() {
                    if !marked[child.index()] {
                        pending.push(child);
                    }
                }
            }
        }

        let mut cursor = 0;
        let mut reclaimed = 0usize;
        let mut walker = self.head;

        while let Some(handle) = walker {
            walker = self.entry(handle).header.next;

            if marked[handle.index()] {
                let entry = self.entry_mut(handle);
                entry.offset = cursor;
                cursor += entry.header.size;
            } else {
                self.unlink(handle);
                let payload = self.vacate(handle);
                self.run_destructor(payload);
                reclaimed += 1;
            }
        }

        self.offset = cursor;
        debug!(reclaimed, offset = cursor, "heap collected");
    }

    fn fits(&self, size: usize) -> bool {
        self.offset.saturating_add(size) <= self.capacity
    }

    fn grow(&mut self) -> bool {
        if self.capacity >= self.max_capacity {
            return false;
        }

        let step = self.capacity.min(HEAP_MAX_GROWTH);
        let capacity = self.capacity.saturating_add(step).min(self.max_capacity);
        debug!(from = self.capacity, to = capacity, "heap grown");
        self.capacity = capacity;

        true
    }

    fn run_destructor(&mut self, payload: HeapObject) {
        for value in payload.contained_values() {
            self.release(value);
        }
        self.live -= 1;
    }

    fn unlink(&mut self, handle: Handle) {
        let Header { prev, next, .. } = self.entry(handle).header;

        match prev {
            Some(prev) => self.entry_mut(prev).header.next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.entry_mut(next).header.prev = prev,
            None => self.tail = prev,
        }
    }

    fn vacate(&mut self, handle: Handle) -> HeapObject {
        let slot = mem::replace(
            &mut self.slots[handle.index()],
            Slot::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = Some(handle.0);

        match slot {
            Slot::Occupied(entry) => entry.payload,
            Slot::Vacant { .. } => unreachable!("vacating a vacant heap slot"),
        }
    }

    fn entry(&self, handle: Handle) -> &Entry {
        match &self.slots[handle.index()] {
            Slot::Occupied(entry) => entry,
            Slot::Vacant { .. } => panic!("dangling heap handle {handle}"),
        }
    }

    fn entry_mut(&mut self, handle: Handle) -> &mut Entry {
        match &mut self.slots[handle.index()] {
            Slot::Occupied(entry) => entry,
            Slot::Vacant { .. } => panic!("dangling heap handle {handle}"),
        }
    }
}

/* CONSTRUCTORS */

impl Heap {
    /// Allocates a string object.
    pub fn make_string(&mut self, bytes: impl Into<Box<[u8]>>) -> Result<Value, Fault> {
        let handle = self.alloc(HeapObject::String(VmString::new(bytes)))?;
        Ok(Value::String(handle))
    }

    /// Allocates an array of `len` null elements.
    pub fn make_array(&mut self, len: usize) -> Result<Value, Fault> {
        let handle = self.alloc(HeapObject::Array(VmArray::new(len)))?;
        Ok(Value::Array(handle))
    }

    /// Allocates an array holding `items`, retaining each of them.
    pub fn make_array_from(&mut self, items: Vec<Value>) -> Result<Value, Fault> {
        let stored = items.clone();
        let handle = self.alloc(HeapObject::Array(VmArray::from(items)))?;
        for value in stored {
            self.retain(value);
        }
        Ok(Value::Array(handle))
    }

    /// Allocates an empty list.
    pub fn make_list(&mut self) -> Result<Value, Fault> {
        let handle = self.alloc(HeapObject::List(VmList::new()))?;
        Ok(Value::List(handle))
    }

    /// Allocates a list holding `items`, retaining each of them.
    pub fn make_list_from(&mut self, items: Vec<Value>) -> Result<Value, Fault> {
        let stored = items.clone();
        let handle = self.alloc(HeapObject::List(items.into_iter().collect()))?;
        for value in stored {
            self.retain(value);
        }
        Ok(Value::List(handle))
    }

    /// Allocates an object without class or parents.
    pub fn make_object(&mut self) -> Result<Value, Fault> {
        let handle = self.alloc(HeapObject::Object(VmObject::new()))?;
        Ok(Value::Object(handle))
    }

    /// Allocates an object delegating lookups to `class`, retaining it.
    pub fn make_object_with_class(&mut self, class: Value) -> Result<Value, Fault> {
        let handle = self.alloc(HeapObject::Object(VmObject::with_class(class)))?;
        self.retain(class);
        Ok(Value::Object(handle))
    }

    /// Allocates an object delegating lookups to `parents`, retaining each
    /// of them.
    pub fn make_object_with_parents(&mut self, parents: Vec<Value>) -> Result<Value, Fault> {
        let stored = parents.clone();
        let handle = self.alloc(HeapObject::Object(VmObject::with_parents(parents)))?;
        for value in stored {
            self.retain(value);
        }
        Ok(Value::Object(handle))
    }

    /// Allocates a function over `chunk`, retaining its `locals` binding.
    pub fn make_function(&mut self, chunk: Arc<Chunk>, locals: Value) -> Result<Value, Fault> {
        let handle = self.alloc(HeapObject::Function(VmFunction::new(chunk, locals)))?;
        self.retain(locals);
        Ok(Value::Function(handle))
    }

    /// Allocates a userdata wrapper around a host object.
    pub fn make_userdata(&mut self, data: Box<dyn Userdata>) -> Result<Value, Fault> {
        let handle = self.alloc(HeapObject::Userdata(data))?;
        Ok(Value::Userdata(handle))
    }
}

/* TYPED ACCESS */

impl Heap {
    /// The string behind `handle`.
    pub fn string(&self, handle: Handle) -> &VmString {
        match &self.entry(handle).payload {
            HeapObject::String(string) => string,
            other => panic!("expected string, found {other:?}"),
        }
    }

    /// The array behind `handle`.
    pub fn array(&self, handle: Handle) -> &VmArray {
        match &self.entry(handle).payload {
            HeapObject::Array(array) => array,
            other => panic!("expected array, found {other:?}"),
        }
    }

    /// The list behind `handle`.
    pub fn list(&self, handle: Handle) -> &VmList {
        match &self.entry(handle).payload {
            HeapObject::List(list) => list,
            other => panic!("expected list, found {other:?}"),
        }
    }

    /// The object behind `handle`.
    pub fn object(&self, handle: Handle) -> &VmObject {
        match &self.entry(handle).payload {
            HeapObject::Object(object) => object,
            other => panic!("expected object, found {other:?}"),
        }
    }

    /// The function behind `handle`.
    pub fn function(&self, handle: Handle) -> &VmFunction {
        match &self.entry(handle).payload {
            HeapObject::Function(function) => function,
            other => panic!("expected function, found {other:?}"),
        }
    }

    /// The userdata behind `handle`.
    pub fn userdata(&self, handle: Handle) -> &dyn Userdata {
        match &self.entry(handle).payload {
            HeapObject::Userdata(data) => &**data,
            other => panic!("expected userdata, found {other:?}"),
        }
    }

    /// Mutable access to the userdata behind `handle`.
    pub fn userdata_mut(&mut self, handle: Handle) -> &mut dyn Userdata {
        match &mut self.entry_mut(handle).payload {
            HeapObject::Userdata(data) => &mut **data,
            other => panic!("expected userdata, found {other:?}"),
        }
    }

    fn array_payload_mut(&mut self, handle: Handle) -> &mut VmArray {
        match &mut self.entry_mut(handle).payload {
            HeapObject::Array(array) => array,
            other => panic!("expected array, found {other:?}"),
        }
    }

    fn list_payload_mut(&mut self, handle: Handle) -> &mut VmList {
        match &mut self.entry_mut(handle).payload {
            HeapObject::List(list) => list,
            other => panic!("expected list, found {other:?}"),
        }
    }

    fn object_payload_mut(&mut self, handle: Handle) -> &mut VmObject {
        match &mut self.entry_mut(handle).payload {
            HeapObject::Object(object) => object,
            other => panic!("expected object, found {other:?}"),
        }
    }
}

/* REFCOUNT-AWARE STORES */

impl Heap {
    /// Stores `value` at `index` of an array, retaining it and releasing
    /// the replaced element.
    pub fn array_store(&mut self, handle: Handle, index: i64, value: Value) -> Result<(), Fault> {
        let len = self.array(handle).len();
        let at = usize::try_from(index).ok().filter(|&at| at < len);
        let Some(at) = at else {
            return Err(Fault::IndexOutOfRange { index, len });
        };

        self.retain(value);
        let old = match self.array_payload_mut(handle).slot_mut(at) {
            Some(slot) => mem::replace(slot, value),
            None => unreachable!("bounds checked above"),
        };
        self.release(old);
        Ok(())
    }

    /// Stores `value` at `index` of a list, retaining it and releasing the
    /// replaced element.
    pub fn list_store(&mut self, handle: Handle, index: i64, value: Value) -> Result<(), Fault> {
        let len = self.list(handle).len();
        let at = usize::try_from(index).ok().filter(|&at| at < len);
        let Some(at) = at else {
            return Err(Fault::IndexOutOfRange { index, len });
        };

        self.retain(value);
        let old = match self.list_payload_mut(handle).slot_mut(at) {
            Some(slot) => mem::replace(slot, value),
            None => unreachable!("bounds checked above"),
        };
        self.release(old);
        Ok(())
    }

    /// Appends `value` to the back of a list, retaining it.
    pub fn list_push_back(&mut self, handle: Handle, value: Value) {
        self.retain(value);
        self.list_payload_mut(handle).push_back(value);
    }

    /// Appends `value` to the front of a list, retaining it.
    pub fn list_push_front(&mut self, handle: Handle, value: Value) {
        self.retain(value);
        self.list_payload_mut(handle).push_front(value);
    }

    /// Removes the back element; the caller receives ownership of the
    /// element's reference.
    pub fn list_pop_back(&mut self, handle: Handle) -> Option<Value> {
        self.list_payload_mut(handle).pop_back()
    }

    /// Removes the front element; the caller receives ownership of the
    /// element's reference.
    pub fn list_pop_front(&mut self, handle: Handle) -> Option<Value> {
        self.list_payload_mut(handle).pop_front()
    }

    /// Removes every element of a list, releasing each of them.
    pub fn list_clear(&mut self, handle: Handle) {
        let items = self.list_payload_mut(handle).take_all();
        for value in items {
            self.release(value);
        }
    }

    /// Stores an own property of an object, retaining the value and
    /// releasing a replaced one.
    pub fn object_insert(&mut self, handle: Handle, name: &[u8], value: Value) {
        self.retain(value);
        if let Some(old) = self.object_payload_mut(handle).insert(name, value) {
            self.release(old);
        }
    }

    /// Deletes an own property of an object, releasing its value; no-op
    /// when absent.
    pub fn object_remove(&mut self, handle: Handle, name: &[u8]) {
        if let Some(old) = self.object_payload_mut(handle).remove(name) {
            self.release(old);
        }
    }
}

/* VALUE QUERIES */

impl Heap {
    /// Property lookup on any value: objects delegate through class and
    /// parents, userdata asks the host, every other tag yields `Null`.
    pub fn property(&self, value: Value, name: &[u8]) -> Value {
        match value {
            Value::Object(handle) => self.object_property(handle, name),
            Value::Userdata(handle) => self.userdata(handle).get_property(name),
            _ => Value::Null,
        }
    }

    fn object_property(&self, handle: Handle, name: &[u8]) -> Value {
        let object = self.object(handle);

        if let Some(hit) = object.own(name) {
            return hit;
        }

        if !object.class().is_null() {
            return self.property(object.class(), name);
        }

        for &parent in object.parents() {
            let hit = self.property(parent, name);
            if !hit.is_null() {
                return hit;
            }
        }

        Value::Null
    }

    /// Truthiness of a value; total.
    pub fn truthy(&self, value: Value) -> bool {
        match value {
            Value::Null => false,
            Value::Integer(i) => i != 0,
            Value::Float(f) => f != 0.0,
            Value::Boolean(b) => b,
            Value::String(h) => !self.string(h).is_empty(),
            Value::Array(h) => !self.array(h).is_empty(),
            Value::List(h) => !self.list(h).is_empty(),
            Value::Object(h) => !self.object(h).is_empty(),
            Value::Function(_) | Value::Userdata(_) => true,
        }
    }

    /// Textual rendering of a value; total.
    pub fn stringify(&self, value: Value) -> String {
        match value {
            Value::Null => "null".into(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_float(f),
            Value::Boolean(true) => "true".into(),
            Value::Boolean(false) => "false".into(),
            Value::String(h) => String::from_utf8_lossy(self.string(h).as_bytes()).into_owned(),
            Value::Array(h) => {
                let items = self.array(h).as_slice();
                format!("[{}]", items.iter().map(|&v| self.stringify(v)).join(", "))
            }
            Value::List(h) => {
                let list = self.list(h);
                format!("[{}]", list.iter().map(|v| self.stringify(v)).join(", "))
            }
            Value::Object(h) => {
                let object = self.object(h);
                format!(
                    "{{{}}}",
                    object
                        .iter()
                        .map(|(name, v)| format!(
                            "{}:{}",
                            String::from_utf8_lossy(name),
                            self.stringify(v)
                        ))
                        .join(", ")
                )
            }
            Value::Function(h) => format!("function@{h}"),
            Value::Userdata(h) => format!("userdata@{h}"),
        }
    }

    /// Integer coercion of a value.
    ///
    /// Strings parse as decimal integers and fail with
    /// [`Fault::BadValueOperation`] when malformed; containers coerce to
    /// zero.
    pub fn to_integer(&self, value: Value) -> Result<i64, Fault> {
        match value {
            Value::Null => Ok(0),
            Value::Integer(i) => Ok(i),
            Value::Float(f) => Ok(f as i64),
            Value::Boolean(b) => Ok(b as i64),
            Value::String(h) => std::str::from_utf8(self.string(h).as_bytes())
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(Fault::BadValueOperation("malformed integer string")),
            _ => Ok(0),
        }
    }
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_advances_the_bump_offset() {
        let mut heap = Heap::new();
        assert_eq!(0, heap.offset());

        let a = heap.make_string(*b"a").unwrap();
        let first = heap.offset();
        assert!(first > HEADER_SIZE);

        let b = heap.make_string(*b"b").unwrap();
        assert_eq!(2 * first, heap.offset());
        assert_eq!(2, heap.len());

        assert_eq!(1, heap.refs(a.handle().unwrap()));
        assert_eq!(1, heap.refs(b.handle().unwrap()));
    }

    #[test]
    fn gc_on_an_empty_heap_is_a_noop() {
        let mut heap = Heap::new();
        heap.gc();
        assert_eq!(0, heap.offset());
        assert!(heap.is_empty());
    }

    #[test]
    fn sweep_compacts_survivors_leftward() {
        let mut heap = Heap::new();

        let a = heap.make_string(*b"keep").unwrap();
        let one = heap.offset();
        let b = heap.make_string(*b"drop").unwrap();
        let c = heap.make_string(*b"keep too").unwrap();
        assert_eq!(3 * one, heap.offset());

        heap.release(b);
        heap.gc();

        assert_eq!(2 * one, heap.offset());
        assert_eq!(2, heap.len());
        assert!(heap.contains(a.handle().unwrap()));
        assert!(!heap.contains(b.handle().unwrap()));
        assert_eq!(b"keep too", heap.string(c.handle().unwrap()).as_bytes());
    }

    #[test]
    fn free_unlinks_but_keeps_the_byte_range_until_gc() {
        let mut heap = Heap::new();

        let a = heap.make_string(*b"x").unwrap();
        let b = heap.make_string(*b"y").unwrap();
        let after = heap.offset();

        heap.free(a);
        assert_eq!(after, heap.offset());
        assert_eq!(1, heap.len());

        heap.gc();
        assert_eq!(after / 2, heap.offset());
        assert!(heap.contains(b.handle().unwrap()));
    }

    #[test]
    fn destructors_release_contained_values() {
        let mut heap = Heap::new();

        let s = heap.make_string(*b"elem").unwrap();
        let array = heap.make_array_from(vec![s]).unwrap();
        assert_eq!(2, heap.refs(s.handle().unwrap()));

        heap.free(array);
        assert_eq!(1, heap.refs(s.handle().unwrap()));

        heap.release(s);
        heap.gc();
        assert!(heap.is_empty());
        assert_eq!(0, heap.offset());
    }

    #[test]
    fn refcounts_saturate_at_the_top_and_floor_at_zero() {
        let mut heap = Heap::new();
        let s = heap.make_string(*b"pinned").unwrap();
        let handle = s.handle().unwrap();

        heap.entry_mut(handle).header.refs = u32::MAX - 1;
        heap.retain(s);
        assert_eq!(u32::MAX, heap.refs(handle));
        heap.retain(s);
        assert_eq!(u32::MAX, heap.refs(handle));

        heap.entry_mut(handle).header.refs = 0;
        heap.release(s);
        assert_eq!(0, heap.refs(handle));
    }

    #[test]
    fn collect_reclaims_cycles_the_sweep_cannot() {
        let mut heap = Heap::new();

        let a = heap.make_object().unwrap();
        let b = heap.make_object().unwrap();
        heap.object_insert(a.handle().unwrap(), b"peer", b);
        heap.object_insert(b.handle().unwrap(), b"peer", a);

        // Drop the external references; the cycle keeps both refcounts
        // above zero.
        heap.release(a);
        heap.release(b);
        heap.gc();
        assert_eq!(2, heap.len());

        heap.collect(std::iter::empty());
        assert!(heap.is_empty());
        assert_eq!(0, heap.offset());
    }

    #[test]
    fn collect_keeps_everything_reachable_from_roots() {
        let mut heap = Heap::new();

        let s = heap.make_string(*b"deep").unwrap();
        let list = heap.make_list_from(vec![s]).unwrap();
        heap.release(s);
        let root = heap.make_array_from(vec![list]).unwrap();
        heap.release(list);

        let garbage = heap.make_string(*b"garbage").unwrap();
        heap.release(garbage);

        heap.collect([root]);
        assert_eq!(3, heap.len());
        assert!(heap.contains(s.handle().unwrap()));
        assert!(!heap.contains(garbage.handle().unwrap()));
    }

    #[test]
    fn alloc_grows_the_arena_and_eventually_fails() {
        let entry = HEADER_SIZE + mem::size_of::<VmString>();
        let mut heap = Heap::with_capacity(entry, 3 * entry);
        let mut kept = Vec::new();

        loop {
            match heap.make_string(*b"x") {
                Ok(value) => kept.push(value),
                Err(fault) => {
                    assert_eq!(Fault::OutOfMemory, fault);
                    break;
                }
            }
        }

        assert_eq!(3, kept.len());
        assert_eq!(3 * entry, heap.capacity());

        // Releasing one makes room again through the sweep inside alloc.
        heap.release(kept.pop().unwrap());
        assert!(heap.make_string(*b"x").is_ok());
    }

    #[test]
    fn property_lookup_prefers_own_then_class_then_parents() {
        let mut heap = Heap::new();

        let class = heap.make_object().unwrap();
        heap.object_insert(class.handle().unwrap(), b"from_class", Value::Integer(1));

        let parent = heap.make_object().unwrap();
        heap.object_insert(parent.handle().unwrap(), b"from_parent", Value::Integer(2));

        let classed = heap.make_object_with_class(class).unwrap();
        heap.object_insert(classed.handle().unwrap(), b"own", Value::Integer(3));
        assert_eq!(Value::Integer(3), heap.property(classed, b"own"));
        assert_eq!(Value::Integer(1), heap.property(classed, b"from_class"));
        // A set class short-circuits parent lookup entirely.
        assert_eq!(Value::Null, heap.property(classed, b"from_parent"));

        let child = heap.make_object_with_parents(vec![parent]).unwrap();
        assert_eq!(Value::Integer(2), heap.property(child, b"from_parent"));
        assert_eq!(Value::Null, heap.property(child, b"absent"));
    }

    #[test]
    fn stringify_renders_every_tag() {
        let mut heap = Heap::new();

        assert_eq!("null", heap.stringify(Value::Null));
        assert_eq!("42", heap.stringify(Value::Integer(42)));
        assert_eq!("2.5", heap.stringify(Value::Float(2.5)));
        assert_eq!("2.0", heap.stringify(Value::Float(2.0)));
        assert_eq!("true", heap.stringify(Value::Boolean(true)));

        let s = heap.make_string(*b"text").unwrap();
        assert_eq!("text", heap.stringify(s));

        let array = heap
            .make_array_from(vec![Value::Integer(1), Value::Null])
            .unwrap();
        assert_eq!("[1, null]", heap.stringify(array));

        let empty = heap.make_object().unwrap();
        assert_eq!("{}", heap.stringify(empty));
    }

    #[test]
    fn to_integer_parses_strings_and_rejects_malformed_ones() {
        let mut heap = Heap::new();

        assert_eq!(Ok(0), heap.to_integer(Value::Null));
        assert_eq!(Ok(1), heap.to_integer(Value::Boolean(true)));
        assert_eq!(Ok(-3), heap.to_integer(Value::Float(-3.7)));

        let number = heap.make_string(*b"-17").unwrap();
        assert_eq!(Ok(-17), heap.to_integer(number));

        let junk = heap.make_string(*b"12ab").unwrap();
        assert_eq!(
            Err(Fault::BadValueOperation("malformed integer string")),
            heap.to_integer(junk)
        );
    }
}
