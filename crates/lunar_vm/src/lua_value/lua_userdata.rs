// Full userdata: a native payload stored in a block obtained from the VM's
// allocator. The payload is written in place (not boxed), so the runtime
// owns the object itself. Dropping the payload and returning the block are
// separate steps: `__gc` may drop the payload early, the block is only
// released when the collector frees the userdata.

use std::any::TypeId;
use std::mem::{align_of, needs_drop, size_of};

use crate::gc::TableId;
use crate::gc::allocator::{Allocator, Block};
use crate::lua_vm::lua_limits::MAX_ALIGN;

/// Why a payload could not be placed into runtime storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserdataAllocError {
    /// The allocator refused the block
    OutOfMemory,
    /// The type needs more alignment than allocator blocks guarantee
    Alignment { required: usize },
}

/// Drop the `T` stored at `ptr`
unsafe fn drop_payload<T>(ptr: *mut u8) {
    // SAFETY: caller guarantees `ptr` holds a live, initialized `T`.
    unsafe { std::ptr::drop_in_place(ptr as *mut T) }
}

pub struct LuaUserdata {
    block: Block,
    type_id: TypeId,
    type_name: &'static str,
    drop_fn: Option<unsafe fn(*mut u8)>,
    live: bool,
    pub(crate) metatable: Option<TableId>,
}

impl LuaUserdata {
    /// Move `value` into a fresh block from `allocator`
    pub(crate) fn new<T: 'static>(
        value: T,
        allocator: &mut dyn Allocator,
    ) -> Result<Self, UserdataAllocError> {
        if align_of::<T>() > MAX_ALIGN {
            return Err(UserdataAllocError::Alignment {
                required: align_of::<T>(),
            });
        }
        let block = Block::acquire(allocator, size_of::<T>())
            .ok_or(UserdataAllocError::OutOfMemory)?;
        // SAFETY: the block is at least `size_of::<T>()` bytes, aligned to
        // MAX_ALIGN >= align_of::<T>(), and exclusively ours.
        unsafe { std::ptr::write(block.as_ptr() as *mut T, value) };

        Ok(LuaUserdata {
            block,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            drop_fn: if needs_drop::<T>() {
                Some(drop_payload::<T>)
            } else {
                None
            },
            live: true,
            metatable: None,
        })
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.live
    }

    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    #[inline]
    pub fn metatable(&self) -> Option<TableId> {
        self.metatable
    }

    /// Borrow the payload as `T`; `None` on a type mismatch or after the
    /// payload was finalized
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        if self.live && self.is::<T>() {
            // SAFETY: type checked above and the payload is still initialized.
            Some(unsafe { &*(self.block.as_ptr() as *const T) })
        } else {
            None
        }
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        if self.live && self.is::<T>() {
            // SAFETY: as in `downcast_ref`; `&mut self` guarantees uniqueness.
            Some(unsafe { &mut *(self.block.as_ptr() as *mut T) })
        } else {
            None
        }
    }

    /// Run the payload's destructor in place. Returns false when it already
    /// ran, so the destructor executes at most once.
    pub(crate) fn drop_payload(&mut self) -> bool {
        if !self.live {
            return false;
        }
        self.live = false;
        if let Some(drop_fn) = self.drop_fn {
            // SAFETY: `live` was set, so the payload is initialized, and it
            // is never touched again after this call.
            unsafe { drop_fn(self.block.as_ptr()) };
        }
        true
    }

    /// Drop the payload if still live and give the block back
    pub(crate) fn release(mut self, allocator: &mut dyn Allocator) {
        self.drop_payload();
        self.block.release(allocator);
    }

    pub fn estimate_size(&self) -> usize {
        size_of::<LuaUserdata>() + self.block.size()
    }
}

impl std::fmt::Debug for LuaUserdata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Userdata<{}>({:p})", self.type_name, self.block.as_ptr())
    }
}
