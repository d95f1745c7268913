mod lua_operator_kind;
mod lua_token_kind;
pub(crate) mod lua_tokenize;
mod reader;

pub use lua_operator_kind::*;
pub use lua_token_kind::{LuaTokenKind, keyword_kind};
pub use reader::{ChunkReader, Reader, StringReader};
