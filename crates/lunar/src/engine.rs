// Engine lifecycle
// Owns the runtime instance from `create` to `destroy`. Teardown runs every
// pending finalizer and returns every allocator block, whether it happens
// through `destroy` or by dropping the engine.

use std::io::Write;

use lunar_vm::{Allocator, FromLua, GcStats, IntoLua, LuaValue, LuaVM, SafeOption, SystemAllocator};
use tracing::{debug, warn};

use crate::error::{BridgeError, FailureKind, FailureReport};

/// One embedded runtime instance
pub struct Engine {
    pub(crate) vm: Box<LuaVM>,
}

impl Engine {
    /// Engine over the platform allocator with default limits
    pub fn create() -> Self {
        Self::create_with_options(SafeOption::default(), SystemAllocator)
    }

    /// Engine whose runtime-owned native storage comes from `allocator`
    pub fn create_with_allocator(allocator: impl Allocator + 'static) -> Self {
        Self::create_with_options(SafeOption::default(), allocator)
    }

    pub fn create_with_options(options: SafeOption, allocator: impl Allocator + 'static) -> Self {
        debug!(
            max_call_depth = options.max_call_depth,
            max_memory_limit = options.max_memory_limit,
            "engine created"
        );
        Engine {
            vm: LuaVM::new(options, Box::new(allocator)),
        }
    }

    /// Install the standard library with the collector paused, then resume
    /// it; a cycle may run right after
    pub fn bootstrap(&mut self) -> Result<(), FailureReport> {
        self.vm.gc_stop();
        let opened = self.vm.open_libs();
        self.vm.gc_restart();
        if let Err(status) = opened {
            return Err(self.take_failure(status));
        }
        if let Err(status) = self.vm.check_gc() {
            return Err(self.take_failure(status));
        }
        debug!(live_bytes = self.vm.gc_count_bytes(), "standard library installed");
        Ok(())
    }

    /// Tear the runtime down: every pending finalizer runs, every object is
    /// freed. Returns the collector statistics of the whole run.
    pub fn destroy(mut self) -> GcStats {
        self.vm.close();
        let stats = self.vm.gc_stats();
        debug!(
            collections = stats.collections,
            finalizers_run = stats.finalizers_run,
            "engine destroyed"
        );
        stats
    }

    // ===== Collector =====

    /// Run a full cycle now. Returns the number of objects freed.
    pub fn collect_garbage(&mut self) -> Result<usize, FailureReport> {
        match self.vm.full_gc() {
            Ok(freed) => Ok(freed),
            Err(status) => {
                let report = self.take_failure(status);
                warn!(error = %report.message, "finalizer failed during collection");
                Err(report)
            }
        }
    }

    pub fn gc_stats(&self) -> GcStats {
        self.vm.gc_stats()
    }

    /// Live objects across all arenas
    pub fn object_count(&self) -> usize {
        self.vm.object_count()
    }

    // ===== Globals and values =====

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        self.vm.set_global(name, value);
    }

    pub fn get_global(&self, name: &str) -> LuaValue {
        self.vm.get_global(name)
    }

    /// Convert a host value into a runtime value
    pub fn to_value<T: IntoLua>(&mut self, value: T) -> Result<LuaValue, BridgeError> {
        match value.into_lua(&mut self.vm) {
            Ok(value) => Ok(value),
            Err(_) => {
                let message = self.vm.error_message();
                self.vm.clear_error();
                Err(BridgeError::Conversion(message))
            }
        }
    }

    /// Convert a runtime value (e.g. an invoke result) into a host value
    pub fn from_value<T: FromLua>(&self, value: LuaValue) -> Result<T, BridgeError> {
        T::from_lua(value, &self.vm).map_err(BridgeError::Conversion)
    }

    /// Text form of `value` as `tostring` would produce it, without
    /// calling metamethods
    pub fn display(&self, value: &LuaValue) -> String {
        self.vm.tostring_raw(value).to_string()
    }

    /// Replace the sink that `print` writes to
    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.vm.set_output(output);
    }

    /// Direct access to the runtime for operations the bridge does not wrap
    pub fn vm(&mut self) -> &mut LuaVM {
        &mut self.vm
    }

    // ===== Working stack =====

    /// Values waiting on the working stack
    pub fn pending(&self) -> usize {
        self.vm.stack_len()
    }

    /// Push a plain value; it becomes the next argument of `invoke` / `call`.
    /// A value whose object was collected is refused.
    pub fn push_value(&mut self, value: LuaValue) -> Result<(), BridgeError> {
        if !self.vm.is_live(&value) {
            return Err(BridgeError::Stale {
                type_name: value.type_name(),
            });
        }
        self.vm.stack_push(value);
        Ok(())
    }

    /// Pop the top of the working stack
    pub fn pop(&mut self) -> Option<LuaValue> {
        self.vm.stack_pop()
    }

    /// Drop everything on the working stack
    pub fn clear_pending(&mut self) {
        self.vm.stack_truncate(0);
    }

    /// Turn the status of a failed runtime operation into a report and
    /// reset the error slot
    pub(crate) fn take_failure(&mut self, status: lunar_vm::LuaError) -> FailureReport {
        let message = self.vm.error_message();
        self.vm.clear_error();
        FailureReport::new(FailureKind::from_status(status), message)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::create()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("objects", &self.vm.object_count())
            .field("pending", &self.vm.stack_len())
            .field("closed", &self.vm.is_closed())
            .finish()
    }
}
