// Memory limit and allocator failures
use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use super::{new_vm, run};
use crate::gc::allocator::{Allocator, SystemAllocator};
use crate::lua_value::LuaValue;
use crate::lua_vm::{LuaError, LuaVM, SafeOption};

/// Refuses every new block
struct RefusingAllocator;

unsafe impl Allocator for RefusingAllocator {
    fn reallocate(
        &mut self,
        _ptr: Option<NonNull<u8>>,
        _old_size: usize,
        _new_size: usize,
    ) -> Option<NonNull<u8>> {
        None
    }
}

/// System allocator that refuses new blocks while `refusing` is set
#[derive(Default)]
struct GatedAllocator {
    refusing: Rc<Cell<bool>>,
}

unsafe impl Allocator for GatedAllocator {
    fn reallocate(
        &mut self,
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        if new_size > 0 && self.refusing.get() {
            return None;
        }
        SystemAllocator.reallocate(ptr, old_size, new_size)
    }
}

fn limited_vm(headroom: usize) -> Box<LuaVM> {
    let mut vm = new_vm();
    vm.option.max_memory_limit = vm.gc_count_bytes() + headroom;
    vm
}

#[test]
fn test_memory_limit_raises_memory_error() {
    let mut vm = limited_vm(16 * 1024);
    let result = vm.execute_string("local t = {} for i = 1, 1000000 do t[i] = {} end");
    assert_eq!(result.err(), Some(LuaError::MemoryError));
    assert_eq!(vm.error_message(), "not enough memory");
    assert_eq!(vm.call_depth(), 0);
}

#[test]
fn test_pcall_catches_memory_error() {
    let mut vm = limited_vm(16 * 1024);
    let results = run(
        &mut vm,
        r#"
        return pcall(function()
            local t = {}
            for i = 1, 1000000 do t[i] = {} end
        end)
        "#,
    );
    assert_eq!(results[0], LuaValue::Boolean(false));
    assert_eq!(results[1].as_str(), Some("not enough memory"));

    // the garbage is gone after a cycle and the VM keeps working
    vm.full_gc().expect("collects");
    let results = run(&mut vm, "local t = { 1, 2, 3 } return #t");
    assert_eq!(results[0], LuaValue::Integer(3));
}

#[test]
fn test_string_rep_checks_limit() {
    let mut vm = limited_vm(16 * 1024);
    let result = vm.execute_string("return string.rep('x', 1 << 40)");
    assert_eq!(result.err(), Some(LuaError::MemoryError));
    let mut vm = new_vm();
    let message = match vm.execute_string("return string.rep('xx', math.maxinteger)") {
        Err(_) => vm.error_message(),
        Ok(_) => String::new(),
    };
    assert!(message.contains("resulting string too large"), "{}", message);
}

#[test]
fn test_refusing_allocator() {
    let mut vm = LuaVM::new(SafeOption::default(), Box::new(RefusingAllocator));
    assert_eq!(vm.open_libs(), Err(LuaError::MemoryError));
    assert_eq!(vm.error_message(), "not enough memory");
}

#[test]
fn test_every_object_kind_takes_a_block() {
    let allocator = GatedAllocator::default();
    let refusing = Rc::clone(&allocator.refusing);
    let mut vm = LuaVM::new(SafeOption::default(), Box::new(allocator));
    vm.open_libs().expect("standard libraries load");
    let chunk = vm.compile("local t = {} return #t").expect("compiles");
    let func = vm.load_proto(chunk.clone()).expect("loads");
    let objects = vm.object_count();

    refusing.set(true);
    assert_eq!(vm.create_table(0, 0).err(), Some(LuaError::MemoryError));
    assert_eq!(vm.create_userdata(5u64).err(), Some(LuaError::MemoryError));
    assert_eq!(vm.load_proto(chunk).err(), Some(LuaError::MemoryError));
    let result = vm.pcall_with_handler(func.clone(), Vec::new(), None);
    assert_eq!(result.err(), Some(LuaError::MemoryError));
    assert_eq!(vm.error_message(), "not enough memory");
    assert_eq!(vm.call_depth(), 0);
    assert_eq!(vm.object_count(), objects);

    refusing.set(false);
    let results = vm.pcall_with_handler(func, Vec::new(), None).expect("runs");
    assert_eq!(results[0], LuaValue::Integer(0));
    let results = run(&mut vm, "return 1 + 1");
    assert_eq!(results[0], LuaValue::Integer(2));
}

#[test]
fn test_oversized_alignment_is_rejected() {
    #[repr(align(64))]
    struct Wide(#[allow(dead_code)] u8);

    let mut vm = new_vm();
    assert!(vm.create_userdata(Wide(1)).is_err());
    assert!(vm.error_message().contains("alignment"));
}
