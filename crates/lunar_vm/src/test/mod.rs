// Test module organization
mod test_basic;
mod test_gc_metamethods;
mod test_limits;
mod test_math;
mod test_syntax;
mod test_table;
mod test_xpcall_debug;

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::gc::allocator::SystemAllocator;
use crate::lua_value::LuaValue;
use crate::lua_vm::{LuaVM, SafeOption};

/// VM with the standard libraries loaded
pub(crate) fn new_vm() -> Box<LuaVM> {
    new_vm_with(SafeOption::default())
}

pub(crate) fn new_vm_with(option: SafeOption) -> Box<LuaVM> {
    let mut vm = LuaVM::new(option, Box::new(SystemAllocator));
    vm.open_libs().expect("standard libraries load");
    vm
}

/// Run `source`, panicking with the error message on failure
pub(crate) fn run(vm: &mut LuaVM, source: &str) -> Vec<LuaValue> {
    match vm.execute_string(source) {
        Ok(values) => values,
        Err(e) => panic!("{}: {}", e, vm.error_message()),
    }
}

/// Run `source`, expecting a failure; returns its message
pub(crate) fn run_err(vm: &mut LuaVM, source: &str) -> String {
    match vm.execute_string(source) {
        Ok(values) => panic!("expected an error, got {:?}", values),
        Err(_) => vm.error_message(),
    }
}

/// `print` sink shared with the test
#[derive(Clone, Default)]
pub(crate) struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl SharedOutput {
    pub(crate) fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
