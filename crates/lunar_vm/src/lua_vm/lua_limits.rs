//! Centralized VM limits and configuration constants.
//!
//! Mirrors the reference `luaconf.h` / `llimits.h` design: every magic number
//! that controls VM behavior is collected here.

// ===== Calls =====

/// Default maximum function call nesting depth.
/// Kept low because every Lua call also nests several Rust frames in the
/// tree-walking interpreter.
pub const MAX_CALL_DEPTH: usize = 200;

/// Extra call depth granted to message handlers so a handler can still run
/// after a stack overflow.
pub const EXTRA_CI: usize = 10;

/// Frames printed from the top of the stack before a traceback elides.
pub const TRACEBACK_LEVELS1: usize = 10;

/// Frames printed from the bottom of the stack after the elision.
pub const TRACEBACK_LEVELS2: usize = 11;

// ===== Compiler =====

/// Maximum parser recursion depth (prevents stack overflow in the parser).
pub const MAXCCALLS: usize = 200;

/// Unary operator priority in the expression parser.
pub const UNARY_PRIORITY: u8 = 12;

/// Maximum length of a source name in error messages.
pub const MAX_SRC_LEN: usize = 59;

// ===== Metamethods =====

/// Maximum depth for __index / __newindex metamethod chains.
pub const MAXTAGLOOP: usize = 2000;

// ===== Registry =====

/// Registry slot holding the global table.
pub const LUA_RIDX_GLOBALS: i64 = 1;

/// First integer key handed out by `registry_ref`.
pub const FIRST_REF: i32 = 2;

// ===== GC Defaults =====

/// Default GC pause (percentage): wait until the estimated heap is 2x the size
/// measured after the last collection.
pub const DEFAULT_GC_PAUSE: usize = 200;

/// Smallest estimated heap size that schedules a collection.
pub const DEFAULT_GC_MIN_THRESHOLD: usize = 64 * 1024;

/// Alignment guaranteed by every `Allocator` block.
pub const MAX_ALIGN: usize = 16;

/// Bound on finalizer passes during teardown; finalizers that keep creating
/// finalizable objects are cut off after this many rounds.
pub const MAX_CLOSE_PASSES: usize = 16;
