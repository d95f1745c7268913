/// Lightweight error enum - only 1 byte!
/// The error object itself lives in `vm.error_object`, so `LuaResult` stays small
/// on the hot paths of the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaError {
    /// Runtime error - error object stored in vm.error_object
    RuntimeError,
    /// Compile error - diagnostic stored in vm.error_object
    CompileError,
    /// Allocation refused by the allocator or the memory limit
    MemoryError,
    /// The message handler of a protected call raised an error itself
    ErrorInHandler,
    /// A `__gc` metamethod raised during a collection cycle
    GcMetamethod,
}

impl LuaError {
    /// Matches the status codes of the reference implementation (LUA_ERRRUN etc.)
    pub fn status_code(self) -> i32 {
        match self {
            LuaError::RuntimeError => 2,
            LuaError::CompileError => 3,
            LuaError::MemoryError => 4,
            LuaError::ErrorInHandler => 5,
            LuaError::GcMetamethod => 6,
        }
    }
}

impl std::fmt::Display for LuaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LuaError::RuntimeError => write!(f, "Runtime Error"),
            LuaError::CompileError => write!(f, "Compile Error"),
            LuaError::MemoryError => write!(f, "Memory Error"),
            LuaError::ErrorInHandler => write!(f, "Error In Error Handling"),
            LuaError::GcMetamethod => write!(f, "Error In __gc Metamethod"),
        }
    }
}

impl std::error::Error for LuaError {}
