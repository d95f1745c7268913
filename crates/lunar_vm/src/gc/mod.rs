// Garbage collector: stop-the-world mark & sweep over the object pool.
//
// A cycle runs only at a safe point, where every live value the host can
// still reach is in the root set (globals, registry, working stack, error
// object, pending finalizer queue). Objects whose metatable carries `__gc`
// are flagged when the metatable is attached; once such an object becomes
// unreachable it is resurrected for one cycle, queued in `tobefnz`, and its
// flag cleared, so its finalizer runs exactly once and a later cycle frees it.
//
// Triggering is debt based (as in lgc.c): after each cycle the threshold is
// set to `pause`% of the estimated live bytes, never below the configured
// minimum, and allocation since then is charged against it.

pub mod allocator;
mod gc_id;
mod object_pool;

pub use gc_id::*;
pub use object_pool::{ObjectPool, Released};

use crate::lua_value::LuaValue;
use crate::lua_vm::SafeOption;

/// Collector statistics, readable by hosts for diagnostics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    pub collections: usize,
    pub objects_freed: usize,
    pub finalizers_run: usize,
    pub live_bytes: usize,
}

/// What the VM must do after a cycle: return freed blocks to its allocator
/// and call finalizers. Kept apart from the collector so it never needs the VM.
#[derive(Default)]
pub struct GcActions {
    pub released: Released,
    pub freed: usize,
}

pub struct GC {
    pub(crate) total_bytes: usize,
    pub(crate) threshold: usize,
    pause: usize,
    min_threshold: usize,
    stopped: bool,
    /// A script asked for a full cycle while a call was running
    pub(crate) pending_full: bool,
    pub(crate) in_collection: bool,
    /// Objects whose finalizer is due, in the order they were found
    pub(crate) tobefnz: Vec<GcRef>,
    pub(crate) stats: GcStats,
}

impl GC {
    pub fn new(option: &SafeOption) -> Self {
        GC {
            total_bytes: 0,
            threshold: option.gc_min_threshold,
            pause: option.gc_pause.max(100),
            min_threshold: option.gc_min_threshold,
            stopped: false,
            pending_full: false,
            in_collection: false,
            tobefnz: Vec::new(),
            stats: GcStats::default(),
        }
    }

    /// Charge a new allocation against the debt
    #[inline]
    pub fn track_size(&mut self, bytes: usize) {
        self.total_bytes = self.total_bytes.saturating_add(bytes);
    }

    #[inline]
    pub fn should_collect(&self) -> bool {
        !self.stopped && !self.in_collection && self.total_bytes >= self.threshold
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn restart(&mut self) {
        self.stopped = false;
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        !self.stopped
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Mark, separate unreachable finalizable objects, resurrect them and
    /// sweep everything else that stayed white.
    pub(crate) fn full_cycle<'a>(
        &mut self,
        pool: &mut ObjectPool,
        roots: impl IntoIterator<Item = &'a LuaValue>,
    ) -> GcActions {
        pool.clear_marks();

        let mut gray = Vec::new();
        for root in roots {
            if let Some(object) = root.gc_ref()
                && pool.mark(object)
            {
                gray.push(object);
            }
        }
        for &object in &self.tobefnz {
            if pool.mark(object) {
                gray.push(object);
            }
        }
        Self::propagate(pool, gray);

        let doomed = pool.separate_finalizable(false);
        if !doomed.is_empty() {
            let mut gray = Vec::new();
            for &object in &doomed {
                if pool.mark(object) {
                    gray.push(object);
                }
            }
            Self::propagate(pool, gray);
            self.tobefnz.extend(doomed);
        }

        let mut actions = GcActions::default();
        actions.freed = pool.sweep(&mut actions.released);

        self.total_bytes = pool.estimate_bytes();
        self.set_threshold();
        self.stats.collections += 1;
        self.stats.objects_freed += actions.freed;
        self.stats.live_bytes = self.total_bytes;
        actions
    }

    fn set_threshold(&mut self) {
        let target = self.total_bytes / 100 * self.pause;
        self.threshold = target.max(self.min_threshold);
    }

    /// Blacken gray objects until none remain
    fn propagate(pool: &mut ObjectPool, mut gray: Vec<GcRef>) {
        let mut children = Vec::new();
        while let Some(object) = gray.pop() {
            match object {
                GcRef::Table(id) => {
                    if let Some(table) = pool.get_table(id) {
                        table.for_each_value(|v| {
                            if let Some(child) = v.gc_ref() {
                                children.push(child);
                            }
                        });
                        if let Some(mt) = table.metatable {
                            children.push(GcRef::Table(mt));
                        }
                    }
                }
                GcRef::Function(id) => {
                    if let Some(func) = pool.get_function(id) {
                        for cell in &func.upvalues {
                            if let Some(child) = cell.borrow().gc_ref() {
                                children.push(child);
                            }
                        }
                    }
                }
                GcRef::Userdata(id) => {
                    if let Some(mt) = pool.get_userdata(id).and_then(|ud| ud.metatable) {
                        children.push(GcRef::Table(mt));
                    }
                }
            }
            for child in children.drain(..) {
                if pool.mark(child) {
                    gray.push(child);
                }
            }
        }
    }
}
