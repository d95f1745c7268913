// Object pool - one generational arena per collectable kind.
// Mark and finalization bits live on the slot, never on the object, so the
// collector can flip them without touching object layouts. The slot also
// owns the allocator block charged for the object, if it has one.

use crate::gc::allocator::Block;
use crate::gc::gc_id::{FunctionId, GcId, GcRef, TableId, UserdataId};
use crate::lua_value::{LuaFunction, LuaTable, LuaUserdata};

struct Slot<T> {
    generation: u32,
    marked: bool,
    /// Set when a metatable with `__gc` was attached; cleared right before
    /// the finalizer is scheduled so it can never run twice.
    finalize: bool,
    value: Option<T>,
    header: Option<Block>,
}

pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub(crate) fn insert(&mut self, value: T, header: Option<Block>) -> GcId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.marked = false;
            slot.finalize = false;
            slot.value = Some(value);
            slot.header = header;
            return GcId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            marked: false,
            finalize: false,
            value: Some(value),
            header,
        });
        GcId::new(index, 0)
    }

    #[inline]
    fn slot(&self, id: GcId) -> Option<&Slot<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.value.is_some())
    }

    #[inline]
    fn slot_mut(&mut self, id: GcId) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.value.is_some())
    }

    #[inline]
    pub fn get(&self, id: GcId) -> Option<&T> {
        self.slot(id).and_then(|slot| slot.value.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, id: GcId) -> Option<&mut T> {
        self.slot_mut(id).and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, id: GcId) -> bool {
        self.slot(id).is_some()
    }

    /// Remove the object at `index`, bumping the generation so old ids go stale
    fn remove_index(&mut self, index: usize) -> Option<(T, Option<Block>)> {
        let slot = &mut self.slots[index];
        let value = slot.value.take()?;
        let header = slot.header.take();
        slot.generation = slot.generation.wrapping_add(1);
        slot.marked = false;
        slot.finalize = false;
        self.free.push(index as u32);
        self.live -= 1;
        Some((value, header))
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns true when the object was white (not yet marked)
    fn mark(&mut self, id: GcId) -> bool {
        match self.slot_mut(id) {
            Some(slot) if !slot.marked => {
                slot.marked = true;
                true
            }
            _ => false,
        }
    }

    fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.marked = false;
        }
    }

    fn set_finalize(&mut self, id: GcId, finalize: bool) {
        if let Some(slot) = self.slot_mut(id) {
            slot.finalize = finalize;
        }
    }

    /// Ids of every live object still flagged for finalization; with
    /// `only_unmarked` restricted to those the mark phase did not reach.
    /// The flag is cleared on every returned object.
    fn take_finalizable(&mut self, only_unmarked: bool) -> Vec<GcId> {
        let mut ids = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.is_some() && slot.finalize && !(only_unmarked && slot.marked) {
                slot.finalize = false;
                ids.push(GcId::new(index as u32, slot.generation));
            }
        }
        ids
    }

    /// Remove every unmarked object, handing each to `release`
    fn sweep(&mut self, mut release: impl FnMut(T, Option<Block>)) -> usize {
        let mut freed = 0;
        for index in 0..self.slots.len() {
            let slot = &self.slots[index];
            if slot.value.is_some()
                && !slot.marked
                && let Some((value, header)) = self.remove_index(index)
            {
                release(value, header);
                freed += 1;
            }
        }
        freed
    }

    fn drain_all(&mut self, mut release: impl FnMut(T, Option<Block>)) {
        for index in 0..self.slots.len() {
            if let Some((value, header)) = self.remove_index(index) {
                release(value, header);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.value.as_ref())
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage for every collectable object of one VM
#[derive(Default)]
pub struct ObjectPool {
    pub(crate) tables: Arena<LuaTable>,
    pub(crate) functions: Arena<LuaFunction>,
    pub(crate) userdata: Arena<LuaUserdata>,
}

impl ObjectPool {
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Creation ============

    pub(crate) fn create_table(&mut self, table: LuaTable, header: Option<Block>) -> TableId {
        TableId(self.tables.insert(table, header))
    }

    pub(crate) fn create_function(
        &mut self,
        closure: LuaFunction,
        header: Option<Block>,
    ) -> FunctionId {
        FunctionId(self.functions.insert(closure, header))
    }

    /// Userdata carry their own block, so the slot holds no header
    pub(crate) fn create_userdata(&mut self, userdata: LuaUserdata) -> UserdataId {
        UserdataId(self.userdata.insert(userdata, None))
    }

    // ============ Access ============

    #[inline]
    pub fn get_table(&self, id: TableId) -> Option<&LuaTable> {
        self.tables.get(id.0)
    }

    #[inline]
    pub fn get_table_mut(&mut self, id: TableId) -> Option<&mut LuaTable> {
        self.tables.get_mut(id.0)
    }

    #[inline]
    pub fn get_function(&self, id: FunctionId) -> Option<&LuaFunction> {
        self.functions.get(id.0)
    }

    #[inline]
    pub fn get_userdata(&self, id: UserdataId) -> Option<&LuaUserdata> {
        self.userdata.get(id.0)
    }

    #[inline]
    pub fn get_userdata_mut(&mut self, id: UserdataId) -> Option<&mut LuaUserdata> {
        self.userdata.get_mut(id.0)
    }

    pub fn contains(&self, object: GcRef) -> bool {
        match object {
            GcRef::Table(id) => self.tables.contains(id.0),
            GcRef::Function(id) => self.functions.contains(id.0),
            GcRef::Userdata(id) => self.userdata.contains(id.0),
        }
    }

    pub fn object_count(&self) -> usize {
        self.tables.len() + self.functions.len() + self.userdata.len()
    }

    // ============ Collector support ============

    pub(crate) fn mark(&mut self, object: GcRef) -> bool {
        match object {
            GcRef::Table(id) => self.tables.mark(id.0),
            GcRef::Function(id) => self.functions.mark(id.0),
            GcRef::Userdata(id) => self.userdata.mark(id.0),
        }
    }

    pub(crate) fn clear_marks(&mut self) {
        self.tables.clear_marks();
        self.functions.clear_marks();
        self.userdata.clear_marks();
    }

    pub(crate) fn set_finalize(&mut self, object: GcRef, finalize: bool) {
        match object {
            GcRef::Table(id) => self.tables.set_finalize(id.0, finalize),
            GcRef::Function(id) => self.functions.set_finalize(id.0, finalize),
            GcRef::Userdata(id) => self.userdata.set_finalize(id.0, finalize),
        }
    }

    /// Like `separatetobefnz`: pull objects flagged for finalization out of
    /// the finalizer set (unreachable ones only unless `all`).
    pub(crate) fn separate_finalizable(&mut self, all: bool) -> Vec<GcRef> {
        let only_unmarked = !all;
        let mut objects: Vec<GcRef> = self
            .tables
            .take_finalizable(only_unmarked)
            .into_iter()
            .map(|id| GcRef::Table(TableId(id)))
            .collect();
        objects.extend(
            self.userdata
                .take_finalizable(only_unmarked)
                .into_iter()
                .map(|id| GcRef::Userdata(UserdataId(id))),
        );
        objects
    }

    /// Free every unmarked object. Blocks and userdata are handed back so
    /// their storage can be returned to the allocator.
    pub(crate) fn sweep(&mut self, released: &mut Released) -> usize {
        let mut freed = self.tables.sweep(|_, header| released.keep_header(header));
        freed += self.functions.sweep(|_, header| released.keep_header(header));
        freed += self.userdata.sweep(|ud, _| released.userdata.push(ud));
        freed
    }

    pub(crate) fn drain_all(&mut self, released: &mut Released) {
        self.tables.drain_all(|_, header| released.keep_header(header));
        self.functions.drain_all(|_, header| released.keep_header(header));
        self.userdata.drain_all(|ud, _| released.userdata.push(ud));
    }

    /// Estimated bytes held by every live object
    pub(crate) fn estimate_bytes(&self) -> usize {
        self.tables.iter().map(LuaTable::estimate_size).sum::<usize>()
            + self.functions.iter().map(LuaFunction::estimate_size).sum::<usize>()
            + self.userdata.iter().map(LuaUserdata::estimate_size).sum::<usize>()
    }
}

/// Storage freed by a sweep, still owed to the allocator
#[derive(Default)]
pub struct Released {
    pub(crate) headers: Vec<Block>,
    pub(crate) userdata: Vec<LuaUserdata>,
}

impl Released {
    fn keep_header(&mut self, header: Option<Block>) {
        self.headers.extend(header);
    }

    /// Number of allocator blocks held
    pub fn blocks(&self) -> usize {
        self.headers.len() + self.userdata.len()
    }
}
