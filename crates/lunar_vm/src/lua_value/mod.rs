// Lua value representation
// Scalars and strings inline, every collectable object accessed via ID
mod lua_convert;
mod lua_function;
mod lua_table;
mod lua_userdata;
mod lua_value;
pub mod userdata_trait;

pub use lua_convert::{FromLua, IntoLua};
pub use lua_function::{Chunk, LuaFunction, UpvalueCell, UpvalueDesc};
pub use lua_table::{LuaTable, TableKeyError};
pub use lua_userdata::{LuaUserdata, UserdataAllocError};
pub use lua_value::{CFunction, LuaString, LuaValue, LuaValueKind, float_to_integer, fmt_float};
pub use userdata_trait::{UdValue, UserDataTrait};
