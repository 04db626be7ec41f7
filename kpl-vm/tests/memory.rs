use kpl_vm::prelude::*;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use std::sync::Arc;

fn op(opcode: Opcode) -> Instruction {
    Instruction::new(opcode)
}

#[test]
fn compacting_sweep_reclaims_released_strings() {
    let mut heap = Heap::new();

    let list = heap.make_list().unwrap();
    let list_handle = list.handle().unwrap();
    let after_list = heap.offset();

    for i in 0..1000 {
        let payload = format!("string {i}").into_bytes();
        let string = heap.make_string(payload).unwrap();
        heap.list_push_back(list_handle, string);
        heap.release(string);
    }

    assert_eq!(1001, heap.len());
    assert!(heap.offset() > after_list);

    heap.list_clear(list_handle);
    heap.gc();

    // Only the list survives, compacted back to the front of the arena.
    assert_eq!(1, heap.len());
    assert_eq!(after_list, heap.offset());
    assert!(heap.list(list_handle).is_empty());
}

#[test]
fn arena_exhaustion_surfaces_as_an_out_of_memory_fault() {
    let mut vm = Interpreter::with_heap(Heap::with_capacity(1024, 4096));

    // Endlessly append fresh lists to a rooted list.
    let chunk = Chunk::builder()
        .register_count(1)
        .code([
            op(Opcode::NEW_LIST).with_a(0),
            op(Opcode::NEW_LIST).with_a(1),
            op(Opcode::SET_AL).with_a(0).with_b(1).with_c(1),
            op(Opcode::JP).with_ax(1),
        ])
        .build();

    let function = vm
        .heap_mut()
        .make_function(chunk, Value::Null)
        .unwrap();
    let result = vm.execute(function, Value::Null, &[]);

    assert_eq!(Fault::OutOfMemory, result.unwrap_err().fault());
    assert_eq!(0, vm.call_depth());
    assert_eq!(4096, vm.heap().capacity());
}

#[test]
fn collection_at_termination_keeps_only_rooted_values() {
    let chunk = Chunk::builder()
        .constant("a")
        .constant("b")
        .constant("keep")
        .register_count(3)
        .code([
            op(Opcode::LOAD_K).with_a(0).with_bx(0),
            op(Opcode::LOAD_K).with_a(1).with_bx(1),
            op(Opcode::ADD).with_a(2).with_b(0).with_c(1),
            op(Opcode::ADD).with_a(3).with_b(2).with_c(2),
            op(Opcode::SET_GLOBAL).with_b_const(2).with_c(2),
            op(Opcode::RETURN),
        ])
        .build();

    let mut vm = Interpreter::new();
    let function = vm
        .heap_mut()
        .make_function(Arc::clone(&chunk), Value::Null)
        .unwrap();
    let result = vm.execute(function, Value::Null, &[]).unwrap();
    assert_eq!(Value::Null, result);

    vm.heap_mut().release(function);
    vm.collect();

    // Survivors: the materialized constants "a", "b", "keep", and the
    // global binding "ab". The entry function and the discarded "abab"
    // intermediate are unreachable and go away.
    assert_eq!(4, vm.heap().len());
    assert_eq!("ab", vm.heap().stringify(vm.global(b"keep")));

    vm.delete_global(b"keep");
    vm.collect();
    assert_eq!(3, vm.heap().len());
}

#[test]
fn cyclic_objects_survive_the_sweep_but_not_collection() {
    let mut vm = Interpreter::new();

    let a = vm.heap_mut().make_object().unwrap();
    let b = vm.heap_mut().make_object().unwrap();
    vm.heap_mut().object_insert(a.handle().unwrap(), b"peer", b);
    vm.heap_mut().object_insert(b.handle().unwrap(), b"peer", a);
    vm.heap_mut().release(a);
    vm.heap_mut().release(b);

    vm.heap_mut().gc();
    assert_eq!(2, vm.heap().len());

    vm.collect();
    assert!(vm.heap().is_empty());
}

#[test]
fn empty_arrays_compare_equal() {
    let chunk = Chunk::builder()
        .constant(0i64)
        .register_count(2)
        .code([
            op(Opcode::NEW_ARRAY).with_a(0).with_b_const(0),
            op(Opcode::NEW_ARRAY).with_a(1).with_b_const(0),
            op(Opcode::EQ).with_b(0).with_c(1),
            op(Opcode::JP).with_ax(5),
            op(Opcode::LOAD_BOOL).with_a(2).with_b(1).with_c(1),
            op(Opcode::LOAD_BOOL).with_a(2).with_b(0),
            op(Opcode::RETURN).with_a(1).with_b(2),
        ])
        .build();

    let mut vm = Interpreter::new();
    let function = vm
        .heap_mut()
        .make_function(chunk, Value::Null)
        .unwrap();
    let result = vm.execute(function, Value::Null, &[]);
    assert_eq!(Value::Boolean(true), result.unwrap());
}

#[test]
fn random_churn_leaves_a_consistent_heap() {
    let mut rng = StdRng::seed_from_u64(2322);
    let mut heap = Heap::new();

    let keep = heap.make_list().unwrap();
    let keep_handle = keep.handle().unwrap();

    for round in 0..2000u32 {
        let value = if rng.gen_bool(0.5) {
            heap.make_string(format!("round {round}").into_bytes()).unwrap()
        } else {
            heap.make_array(rng.gen_range(0..4)).unwrap()
        };

        if rng.gen_bool(0.3) {
            heap.list_push_back(keep_handle, value);
        }
        heap.release(value);

        if rng.gen_bool(0.1) {
            if let Some(popped) = heap.list_pop_front(keep_handle) {
                heap.release(popped);
            }
        }
        if round % 512 == 0 {
            heap.gc();
        }
    }

    heap.gc();
    assert_eq!(1 + heap.list(keep_handle).len(), heap.len());

    heap.list_clear(keep_handle);
    heap.release(keep);
    heap.gc();
    assert!(heap.is_empty());
    assert_eq!(0, heap.offset());
}

#[test]
fn chunk_storage_is_reclaimed_with_the_chunk() {
    let chunk = Chunk::builder()
        .constant("payload")
        .constant(5i64)
        .register_count(3)
        .code([op(Opcode::NOP), op(Opcode::RETURN)])
        .build();

    let weak = Arc::downgrade(&chunk);
    drop(chunk);
    assert!(weak.upgrade().is_none());
}
