// ============ Object IDs ============
// An id is a slot index plus the generation of that slot. Slots are reused
// after a sweep; the generation bump makes every id handed out before the
// sweep detectably stale instead of silently aliasing the new occupant.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GcId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl GcId {
    #[inline(always)]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        GcId { index, generation }
    }

    /// Stable per-object number used by `tostring` ("table: 0x...")
    #[inline]
    pub fn addr(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }
}

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        #[repr(transparent)]
        pub struct $name(pub(crate) GcId);

        impl $name {
            #[inline(always)]
            pub fn gc_id(self) -> GcId {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:014x}", self.0.addr())
            }
        }
    };
}

typed_id!(TableId);
typed_id!(FunctionId);
typed_id!(UserdataId);

/// Object type tags
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcType {
    Table = 0,
    Function = 1,
    Userdata = 2,
}

/// A reference to any collectable object, used by the mark phase worklist
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GcRef {
    Table(TableId),
    Function(FunctionId),
    Userdata(UserdataId),
}

impl GcRef {
    #[inline]
    pub fn gc_type(self) -> GcType {
        match self {
            GcRef::Table(_) => GcType::Table,
            GcRef::Function(_) => GcType::Function,
            GcRef::Userdata(_) => GcType::Userdata,
        }
    }
}
