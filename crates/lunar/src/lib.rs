// Host bridge for an embedded lunar_vm runtime
// One `Engine` owns one runtime instance. Hosts compile chunks, push native
// values under an ownership mode, run code in protected mode and keep
// runtime values alive through registry identities.

#[cfg(test)]
mod test;

mod bridge;
mod chunk;
mod engine;
mod error;
mod invoker;
mod registry;

pub use bridge::{
    BehaviorDescriptor, Capabilities, ExclusiveOwned, NativeHandle, OwnershipMode, PushNative,
    SharedOwned, StructCopy, ValueCopy,
};
pub use chunk::Chunk;
pub use engine::Engine;
pub use error::{
    BridgeError, CompileError, Error, FailureKind, FailureReport, RegistryError, Result,
};
pub use registry::Identity;

pub use lunar_vm::{
    Allocator, ChunkReader, FromLua, GcStats, IntoLua, LuaValue, SafeOption, SystemAllocator,
    UdValue, UserDataTrait,
};
