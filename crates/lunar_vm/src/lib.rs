// Lua Runtime
// A compact Lua 5.4 subset: streaming compiler, tree-walking interpreter
// and a mark & sweep collector with `__gc` finalizers

#[cfg(test)]
mod test;

pub mod compiler;
pub mod gc;
pub mod lib_registry;
pub mod lua_value;
pub mod lua_vm;
pub mod stdlib;

pub use compiler::parser::{ChunkReader, StringReader};
pub use gc::allocator::{Allocator, SystemAllocator};
pub use gc::{GcStats, TableId, UserdataId};
pub use lib_registry::LibraryRegistry;
pub use lua_value::{
    CFunction, Chunk, FromLua, IntoLua, LuaString, LuaTable, LuaValue, LuaValueKind, UdValue,
    UserDataTrait,
};
pub use lua_vm::{
    CallContext, CallName, LUA_REFNIL, LuaError, LuaResult, LuaVM, RefId, SafeOption,
};
