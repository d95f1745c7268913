/// Lua reference mechanism (similar to luaL_ref/luaL_unref in C API)
///
/// Values are stored in the registry table under integer keys so they stay
/// reachable across collections and can be handed to the host as plain ids.
use crate::lua_vm::lua_limits::FIRST_REF;

/// A reference ID in the registry.
/// Similar to Lua's luaL_ref return value.
pub type RefId = i32;

/// Reference to nil (no storage needed), as in Lua's C API
pub const LUA_REFNIL: RefId = -1;

/// Internal state for managing references in the registry
pub(crate) struct RefManager {
    /// Next never-used reference ID
    next_ref_id: RefId,

    /// Free list of released reference IDs (for reuse)
    free_list: Vec<RefId>,
}

impl RefManager {
    pub fn new() -> Self {
        RefManager {
            next_ref_id: FIRST_REF,
            free_list: Vec::new(),
        }
    }

    /// Allocate a new reference ID, preferring the most recently released one
    pub fn alloc_ref_id(&mut self) -> Option<RefId> {
        if let Some(ref_id) = self.free_list.pop() {
            return Some(ref_id);
        }
        let ref_id = self.next_ref_id;
        self.next_ref_id = self.next_ref_id.checked_add(1)?;
        Some(ref_id)
    }

    /// Free a reference ID (add to free list for reuse).
    /// Callers check that the id is live first, so it is never listed twice.
    pub fn free_ref_id(&mut self, ref_id: RefId) {
        if ref_id >= FIRST_REF {
            self.free_list.push(ref_id);
        }
    }

    /// Could `ref_id` have been handed out by this manager
    #[inline]
    pub fn in_range(&self, ref_id: RefId) -> bool {
        ref_id >= FIRST_REF && ref_id < self.next_ref_id
    }
}
