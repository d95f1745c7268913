mod test_compile;
mod test_engine;
mod test_invoker;
mod test_registry;

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::ptr::NonNull;
use std::rc::Rc;

use lunar_vm::{Allocator, SystemAllocator, UdValue, UserDataTrait};

use crate::Engine;

/// Engine with the standard library installed
pub(crate) fn new_engine() -> Engine {
    let mut engine = Engine::create();
    engine.bootstrap().expect("standard library installs");
    engine
}

/// Engine over `allocator`, bootstrapped
pub(crate) fn engine_with(allocator: impl Allocator + 'static) -> Engine {
    let mut engine = Engine::create_with_allocator(allocator);
    engine.bootstrap().expect("standard library installs");
    engine
}

/// Compile and invoke `source`, panicking with the report on failure
pub(crate) fn run(engine: &mut Engine, source: &str, expected: usize) -> Vec<lunar_vm::LuaValue> {
    let chunk = engine.compile(source).expect("compiles");
    match engine.invoke(&chunk, Vec::new(), expected) {
        Ok(values) => values,
        Err(report) => panic!("{}", report),
    }
}

/// Delegates to the system allocator and tracks live blocks
#[derive(Clone, Default)]
pub(crate) struct CountingAllocator {
    pub(crate) live: Rc<Cell<isize>>,
    pub(crate) allocations: Rc<Cell<usize>>,
}

unsafe impl Allocator for CountingAllocator {
    fn reallocate(
        &mut self,
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let result = SystemAllocator.reallocate(ptr, old_size, new_size);
        match (ptr.is_some(), new_size) {
            (true, 0) => self.live.set(self.live.get() - 1),
            (false, n) if n > 0 && result.is_some() => {
                self.live.set(self.live.get() + 1);
                self.allocations.set(self.allocations.get() + 1);
            }
            _ => {}
        }
        result
    }
}

/// System allocator that refuses new blocks while `refusing` is set
#[derive(Clone, Default)]
pub(crate) struct RefusingAllocator {
    pub(crate) refusing: Rc<Cell<bool>>,
}

unsafe impl Allocator for RefusingAllocator {
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

/// Plain two-field struct
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Point {
    pub(crate) x: i32,
    pub(crate) y: i32,
}

impl UserDataTrait for Point {
    fn type_name(&self) -> &'static str {
        "Point"
    }

    fn get_field(&self, key: &str) -> Option<UdValue> {
        match key {
            "x" => Some(self.x.into()),
            "y" => Some(self.y.into()),
            _ => None,
        }
    }

}

/// Object that counts its drops
#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) value: i64,
    pub(crate) drops: Rc<Cell<usize>>,
}

impl Tracked {
    pub(crate) fn new(value: i64, drops: &Rc<Cell<usize>>) -> Self {
        Tracked {
            value,
            drops: Rc::clone(drops),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

impl UserDataTrait for Tracked {
    fn type_name(&self) -> &'static str {
        "Tracked"
    }

    fn get_field(&self, key: &str) -> Option<UdValue> {
        match key {
            "value" => Some(self.value.into()),
            _ => None,
        }
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
