//! Pluggable block allocator for runtime-owned storage.
//!
//! Every collectable object takes a block from the VM's allocator when it is
//! created: tables and closures a header block, userdata the block their
//! payload lives in. A host that installs its own strategy therefore sees
//! (and can refuse) every object a script creates. The contract follows the
//! classic `lua_Alloc` shape: one reallocate-or-free entry point.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::lua_vm::lua_limits::MAX_ALIGN;

/// Reallocate-or-free strategy.
///
/// * `ptr == None`, `new_size > 0`: allocate a fresh block.
/// * `ptr == Some`, `new_size > 0`: resize the block, keeping the first
///   `min(old_size, new_size)` bytes.
/// * `new_size == 0`: free `ptr` (if any) and return `None`.
///
/// Returning `None` for a non-zero request signals allocation failure; the VM
/// reports it as a memory error and leaves its state untouched.
///
/// # Safety
/// Implementors must return blocks that are valid for reads and writes of
/// `new_size` bytes, aligned to [`MAX_ALIGN`], and not aliased by any other
/// live block. `old_size` is always the size the block was last given.
pub unsafe trait Allocator {
    fn reallocate(
        &mut self,
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>>;
}

/// Default strategy: the platform allocator through `std::alloc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

unsafe impl Allocator for SystemAllocator {
    fn reallocate(
        &mut self,
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        match (ptr, new_size) {
            (None, 0) => None,
            (Some(ptr), 0) => {
                let layout = Layout::from_size_align(old_size, MAX_ALIGN).ok()?;
                // SAFETY: the block was produced by this allocator with `layout`.
                unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
                None
            }
            (None, size) => {
                let layout = Layout::from_size_align(size, MAX_ALIGN).ok()?;
                // SAFETY: `size` is non-zero.
                NonNull::new(unsafe { alloc::alloc(layout) })
            }
            (Some(ptr), size) => {
                let layout = Layout::from_size_align(old_size, MAX_ALIGN).ok()?;
                // SAFETY: the block was produced by this allocator with `layout`
                // and `size` is non-zero.
                NonNull::new(unsafe { alloc::realloc(ptr.as_ptr(), layout, size) })
            }
        }
    }
}

/// A live block obtained from an [`Allocator`]. Not freed on drop: the owner
/// hands it back with [`Block::release`] to the allocator it came from.
#[derive(Debug)]
pub(crate) struct Block {
    ptr: NonNull<u8>,
    size: usize,
}

impl Block {
    /// Fresh block of `size` bytes (at least one); `None` when refused
    pub(crate) fn acquire(allocator: &mut dyn Allocator, size: usize) -> Option<Block> {
        let size = size.max(1);
        let ptr = allocator.reallocate(None, 0, size)?;
        Some(Block { ptr, size })
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn release(self, allocator: &mut dyn Allocator) {
        allocator.reallocate(Some(self.ptr), self.size, 0);
    }
}
