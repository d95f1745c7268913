// Lua Virtual Machine
// Owns the object pool, collector, registry and call stack of one runtime
// instance. Code runs on a tree-walking interpreter (see `execute`); the
// methods here form the embedding API used by hosts and native functions.
mod call_context;
pub mod call_info;
mod execute;
mod lua_error;
pub mod lua_limits;
mod lua_ref;
mod safe_option;

use std::io::Write;
use std::mem::size_of;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::compiler::parser::{ChunkReader, StringReader};
use crate::gc::allocator::{Allocator, Block};
use crate::gc::{GC, GcRef, GcStats, ObjectPool, Released, TableId, UserdataId};
use crate::lua_value::{
    Chunk, LuaFunction, LuaString, LuaTable, LuaUserdata, LuaValue, UpvalueCell,
    UserdataAllocError,
};
pub use call_context::CallContext;
pub use call_info::{CallInfo, CallKind, CallName};
pub use lua_error::LuaError;
use lua_limits::{EXTRA_CI, LUA_RIDX_GLOBALS, MAX_CLOSE_PASSES, TRACEBACK_LEVELS1, TRACEBACK_LEVELS2};
pub(crate) use lua_ref::RefManager;
pub use lua_ref::{LUA_REFNIL, RefId};
pub use safe_option::SafeOption;

pub type LuaResult<T> = Result<T, LuaError>;

pub struct LuaVM {
    // Global environment table (_G points to this)
    pub(crate) global: TableId,

    // Registry table (like Lua's LUA_REGISTRYINDEX)
    // Holds references, named metatables and the globals under LUA_RIDX_GLOBALS
    pub(crate) registry: TableId,

    pub(crate) object_pool: ObjectPool,

    pub(crate) gc: GC,

    /// Source of every object header and userdata block
    allocator: Box<dyn Allocator>,

    /// Shared metatable of all strings (its __index is the string library)
    pub(crate) string_metatable: Option<TableId>,

    ref_manager: RefManager,

    pub(crate) call_stack: Vec<CallInfo>,

    /// Values the host keeps alive between calls: pushed handles, call
    /// arguments and results. A collector root like the registry.
    working_stack: Vec<LuaValue>,

    /// Results of the last host call, rooted until the next one starts
    last_results: Vec<LuaValue>,

    // ===== Lightweight Error Storage =====
    // The error value lives here instead of in Result<T, LuaError>,
    // which keeps LuaResult at one byte of error payload.
    pub(crate) error_object: LuaValue,

    pub(crate) option: SafeOption,

    /// Extra call depth granted while a message handler runs
    handler_depth: usize,

    /// Sink for `print`
    output: Box<dyn Write>,

    closed: bool,
}

impl LuaVM {
    pub fn new(option: SafeOption, mut allocator: Box<dyn Allocator>) -> Box<Self> {
        let mut object_pool = ObjectPool::new();
        // a refusing allocator still gets a VM; its first allocation fails
        let header = Block::acquire(&mut *allocator, size_of::<LuaTable>());
        let registry = object_pool.create_table(LuaTable::new(2, 4), header);
        let header = Block::acquire(&mut *allocator, size_of::<LuaTable>());
        let global = object_pool.create_table(LuaTable::new(0, 32), header);
        if let Some(table) = object_pool.get_table_mut(registry) {
            table.set_int(LUA_RIDX_GLOBALS, LuaValue::Table(global));
        }

        let mut gc = GC::new(&option);
        gc.track_size(object_pool.estimate_bytes());

        Box::new(LuaVM {
            global,
            registry,
            object_pool,
            gc,
            allocator,
            string_metatable: None,
            ref_manager: RefManager::new(),
            call_stack: Vec::with_capacity(16),
            working_stack: Vec::new(),
            last_results: Vec::new(),
            error_object: LuaValue::Nil,
            option,
            handler_depth: 0,
            output: Box::new(std::io::stdout()),
            closed: false,
        })
    }

    #[inline]
    pub fn option(&self) -> &SafeOption {
        &self.option
    }

    /// Replace the sink `print` writes to
    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    pub(crate) fn write_output(&mut self, text: &str) -> LuaResult<()> {
        let written = self
            .output
            .write_all(text.as_bytes())
            .and_then(|_| self.output.flush());
        match written {
            Ok(()) => Ok(()),
            Err(e) => Err(self.rt_error(format!("cannot write output ({})", e))),
        }
    }

    /// Install the standard libraries
    pub fn open_libs(&mut self) -> LuaResult<()> {
        crate::lib_registry::create_standard_registry().load_all(self)
    }

    // ===== Compilation =====

    /// Compile a chunk pulled from `reader`
    pub fn compile_chunk(
        &mut self,
        reader: &mut dyn ChunkReader,
        chunk_name: &str,
    ) -> LuaResult<Rc<Chunk>> {
        match crate::compiler::compile_chunk(reader, chunk_name) {
            Ok(chunk) => Ok(Rc::new(chunk)),
            Err(message) => Err(self.compile_error(message)),
        }
    }

    /// Compile source text; the text itself names the chunk
    pub fn compile(&mut self, source: &str) -> LuaResult<Rc<Chunk>> {
        self.compile_with_name(source, source)
    }

    pub fn compile_with_name(&mut self, source: &str, chunk_name: &str) -> LuaResult<Rc<Chunk>> {
        let mut reader = StringReader::new(source);
        self.compile_chunk(&mut reader, chunk_name)
    }

    /// Turn a compiled main chunk into a callable function value
    pub fn load_proto(&mut self, chunk: Rc<Chunk>) -> LuaResult<LuaValue> {
        self.create_function(chunk, Vec::new())
    }

    /// Compile and run `source` as a main chunk, returning its results.
    /// Collects afterwards if a cycle is due.
    pub fn execute_string(&mut self, source: &str) -> LuaResult<Vec<LuaValue>> {
        let chunk = self.compile(source)?;
        let func = self.load_proto(chunk)?;
        let base = self.working_stack.len();
        let results = self.pcall_with_handler(func, Vec::new(), None)?;
        self.working_stack.extend(results);
        let collected = self.check_gc();
        let results = self.stack_split_off(base);
        collected.map(|_| results)
    }

    // ===== Object creation =====

    /// Charge `bytes` against the memory limit
    fn charge(&mut self, bytes: usize) -> LuaResult<()> {
        if self.gc.total_bytes.saturating_add(bytes) > self.option.max_memory_limit {
            return Err(self.memory_error());
        }
        self.gc.track_size(bytes);
        Ok(())
    }

    /// Header block for a new table or closure
    fn object_header(&mut self, size: usize) -> LuaResult<Block> {
        match Block::acquire(&mut *self.allocator, size) {
            Some(block) => Ok(block),
            None => Err(self.memory_error()),
        }
    }

    pub fn create_table(&mut self, array_size: usize, hash_size: usize) -> LuaResult<LuaValue> {
        let table = LuaTable::new(array_size, hash_size);
        self.charge(table.estimate_size())?;
        let header = self.object_header(size_of::<LuaTable>())?;
        Ok(LuaValue::Table(self.object_pool.create_table(table, Some(header))))
    }

    pub(crate) fn create_function(
        &mut self,
        chunk: Rc<Chunk>,
        upvalues: Vec<UpvalueCell>,
    ) -> LuaResult<LuaValue> {
        let function = LuaFunction::new(chunk, upvalues);
        self.charge(function.estimate_size())?;
        let header = self.object_header(size_of::<LuaFunction>())?;
        Ok(LuaValue::Function(self.object_pool.create_function(function, Some(header))))
    }

    /// Move `value` into a block from the VM allocator
    pub fn create_userdata<T: 'static>(&mut self, value: T) -> LuaResult<UserdataId> {
        let size = size_of::<LuaUserdata>() + size_of::<T>();
        self.charge(size)?;
        match LuaUserdata::new(value, &mut *self.allocator) {
            Ok(userdata) => Ok(self.object_pool.create_userdata(userdata)),
            Err(UserdataAllocError::OutOfMemory) => Err(self.memory_error()),
            Err(UserdataAllocError::Alignment { required }) => Err(self.error(format!(
                "userdata alignment {} exceeds the allocator guarantee",
                required
            ))),
        }
    }

    // ===== Tables =====

    #[inline]
    pub fn get_table(&self, id: TableId) -> Option<&LuaTable> {
        self.object_pool.get_table(id)
    }

    #[inline]
    pub fn get_table_mut(&mut self, id: TableId) -> Option<&mut LuaTable> {
        self.object_pool.get_table_mut(id)
    }

    /// Raw read (no metamethods); nil for non-tables
    pub fn table_get_raw(&self, table: &LuaValue, key: &LuaValue) -> LuaValue {
        table
            .as_table_id()
            .and_then(|id| self.object_pool.get_table(id))
            .map(|t| t.raw_get(key))
            .unwrap_or_default()
    }

    pub(crate) fn table_get_str(&self, id: TableId, key: &str) -> LuaValue {
        self.object_pool
            .get_table(id)
            .map(|t| t.get_str(key))
            .unwrap_or_default()
    }

    /// Raw write (no metamethods)
    pub fn table_set_raw(&mut self, id: TableId, key: &LuaValue, value: LuaValue) -> LuaResult<()> {
        let result = match self.object_pool.get_table_mut(id) {
            Some(table) => table.raw_set(key, value),
            None => return Err(self.error("attempt to use a collected table")),
        };
        result.map_err(|e| self.rt_error(e.message()))
    }

    pub fn get_global(&self, name: &str) -> LuaValue {
        self.table_get_str(self.global, name)
    }

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        if let Some(table) = self.object_pool.get_table_mut(self.global) {
            table.set_str(name, value);
        }
    }

    #[inline]
    pub fn globals(&self) -> TableId {
        self.global
    }

    // ===== Metatables =====

    pub fn get_metatable(&self, value: &LuaValue) -> Option<TableId> {
        match value {
            LuaValue::Table(id) => self.object_pool.get_table(*id)?.metatable(),
            LuaValue::Userdata(id) => self.object_pool.get_userdata(*id)?.metatable(),
            LuaValue::String(_) => self.string_metatable,
            _ => None,
        }
    }

    /// Metamethod `event` of `value`, nil when absent
    pub fn metamethod(&self, value: &LuaValue, event: &str) -> LuaValue {
        match self.get_metatable(value) {
            Some(mt) => self.table_get_str(mt, event),
            None => LuaValue::Nil,
        }
    }

    /// Attach (or with `None` remove) the metatable of a table or userdata.
    /// A metatable carrying `__gc` at this point flags the object for finalization.
    pub fn set_metatable(&mut self, value: &LuaValue, metatable: Option<TableId>) -> LuaResult<()> {
        let finalize = metatable.is_some_and(|mt| !self.table_get_str(mt, "__gc").is_nil());
        let object = match value {
            LuaValue::Table(id) => {
                if let Some(table) = self.object_pool.get_table_mut(*id) {
                    table.metatable = metatable;
                }
                GcRef::Table(*id)
            }
            LuaValue::Userdata(id) => {
                if let Some(userdata) = self.object_pool.get_userdata_mut(*id) {
                    userdata.metatable = metatable;
                }
                GcRef::Userdata(*id)
            }
            _ => {
                let message = format!("cannot set the metatable of a {} value", value.type_name());
                return Err(self.error(message));
            }
        };
        self.object_pool.set_finalize(object, finalize);
        Ok(())
    }

    pub fn set_userdata_metatable(&mut self, id: UserdataId, metatable: Option<TableId>) -> LuaResult<()> {
        self.set_metatable(&LuaValue::Userdata(id), metatable)
    }

    pub fn set_string_metatable(&mut self, metatable: Option<TableId>) {
        self.string_metatable = metatable;
    }

    /// Like luaL_newmetatable: the metatable registered under `key`,
    /// created on first use with `name` as its `__name`. The flag reports
    /// creation.
    pub fn new_metatable(&mut self, key: &str, name: &str) -> LuaResult<(TableId, bool)> {
        if let Some(id) = self.registry_get_field(key).as_table_id() {
            return Ok((id, false));
        }
        let value = self.create_table(0, 4)?;
        let Some(id) = value.as_table_id() else {
            return Err(self.error("metatable creation failed"));
        };
        if let Some(table) = self.object_pool.get_table_mut(id) {
            table.set_str("__name", LuaValue::string(name));
        }
        self.registry_set_field(key, value);
        Ok((id, true))
    }

    /// Type name honoring a string `__name` in the metatable (luaL_typeerror)
    pub fn type_name_meta(&self, value: &LuaValue) -> String {
        match self.metamethod(value, "__name") {
            LuaValue::String(name) => name.to_string(),
            _ => value.type_name().to_string(),
        }
    }

    // ===== Userdata =====

    #[inline]
    pub fn get_userdata(&self, id: UserdataId) -> Option<&LuaUserdata> {
        self.object_pool.get_userdata(id)
    }

    /// Typed view of a userdata payload; `None` on a type mismatch, a stale
    /// id or after the payload was finalized
    pub fn userdata_ref<T: 'static>(&self, id: UserdataId) -> Option<&T> {
        self.object_pool.get_userdata(id)?.downcast_ref::<T>()
    }

    pub fn userdata_mut<T: 'static>(&mut self, id: UserdataId) -> Option<&mut T> {
        self.object_pool.get_userdata_mut(id)?.downcast_mut::<T>()
    }

    /// Run the payload destructor now; the block stays until the collector
    /// frees the userdata. Returns false if it already ran.
    pub fn finalize_userdata(&mut self, id: UserdataId) -> bool {
        self.object_pool
            .get_userdata_mut(id)
            .is_some_and(|ud| ud.drop_payload())
    }

    // ===== Registry =====

    pub fn registry_get_field(&self, name: &str) -> LuaValue {
        self.table_get_str(self.registry, name)
    }

    pub fn registry_set_field(&mut self, name: &str, value: LuaValue) {
        if let Some(table) = self.object_pool.get_table_mut(self.registry) {
            table.set_str(name, value);
        }
    }

    /// Store `value` under a fresh or recycled reference (luaL_ref).
    /// Nil is never stored and yields LUA_REFNIL; a collected object is
    /// refused.
    pub fn registry_ref(&mut self, value: LuaValue) -> LuaResult<RefId> {
        if value.is_nil() {
            return Ok(LUA_REFNIL);
        }
        self.check_live(&value)?;
        let Some(ref_id) = self.ref_manager.alloc_ref_id() else {
            return Err(self.error("too many references"));
        };
        if let Some(table) = self.object_pool.get_table_mut(self.registry) {
            table.set_int(ref_id as i64, value);
        }
        Ok(ref_id)
    }

    /// Value behind a live reference; `None` for unknown or released ids
    /// and for entries whose object no longer exists
    pub fn registry_get(&self, ref_id: RefId) -> Option<LuaValue> {
        if ref_id == LUA_REFNIL {
            return Some(LuaValue::Nil);
        }
        if !self.ref_manager.in_range(ref_id) {
            return None;
        }
        let value = self
            .object_pool
            .get_table(self.registry)?
            .get_int(ref_id as i64);
        (!value.is_nil() && self.is_live(&value)).then_some(value)
    }

    /// Release a reference (luaL_unref). False for unknown or released ids;
    /// releasing LUA_REFNIL is a no-op.
    pub fn registry_unref(&mut self, ref_id: RefId) -> bool {
        if ref_id == LUA_REFNIL {
            return true;
        }
        let stored = self.ref_manager.in_range(ref_id)
            && self
                .object_pool
                .get_table(self.registry)
                .is_some_and(|t| !t.get_int(ref_id as i64).is_nil());
        if !stored {
            return false;
        }
        if let Some(table) = self.object_pool.get_table_mut(self.registry) {
            table.set_int(ref_id as i64, LuaValue::Nil);
        }
        self.ref_manager.free_ref_id(ref_id);
        true
    }

    // ===== Liveness =====

    /// False for a table, function or userdata whose object was freed;
    /// its id may not be used again
    pub fn is_live(&self, value: &LuaValue) -> bool {
        value
            .gc_ref()
            .is_none_or(|object| self.object_pool.contains(object))
    }

    /// Error for a value whose object was freed
    pub fn check_live(&mut self, value: &LuaValue) -> LuaResult<()> {
        if self.is_live(value) {
            return Ok(());
        }
        let message = format!("attempt to use a collected {} value", value.type_name());
        Err(self.error(message))
    }

    // ===== Working stack =====

    pub fn stack_push(&mut self, value: LuaValue) {
        self.working_stack.push(value);
    }

    pub fn stack_pop(&mut self) -> Option<LuaValue> {
        self.working_stack.pop()
    }

    pub fn stack_top(&self) -> Option<&LuaValue> {
        self.working_stack.last()
    }

    pub fn stack_get(&self, index: usize) -> Option<&LuaValue> {
        self.working_stack.get(index)
    }

    #[inline]
    pub fn stack_len(&self) -> usize {
        self.working_stack.len()
    }

    pub fn stack_truncate(&mut self, len: usize) {
        self.working_stack.truncate(len);
    }

    /// Remove and return everything from `base` up
    pub fn stack_split_off(&mut self, base: usize) -> Vec<LuaValue> {
        let base = base.min(self.working_stack.len());
        self.working_stack.split_off(base)
    }

    /// Keep `results` alive until the next call replaces them
    pub fn set_last_results(&mut self, results: &[LuaValue]) {
        self.last_results.clear();
        self.last_results.extend_from_slice(results);
    }

    pub fn clear_last_results(&mut self) {
        self.last_results.clear();
    }

    // ===== Calls =====

    /// Call `func` in protected mode. On failure the error object is left in
    /// the VM, the call stack is restored, and for runtime errors `handler`
    /// (if any) has already been applied to the error object with the stack
    /// of the failing call still intact.
    pub fn pcall_with_handler(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
        handler: Option<LuaValue>,
    ) -> LuaResult<Vec<LuaValue>> {
        let base = self.call_stack.len();
        let result = match self.call_function(func, args) {
            Ok(values) => return Ok(values),
            Err(LuaError::RuntimeError) => match handler {
                Some(handler) => Err(self.apply_handler(handler)),
                None => Err(LuaError::RuntimeError),
            },
            Err(e) => Err(e),
        };
        self.call_stack.truncate(base);
        result
    }

    /// Run the message handler on the current error object
    fn apply_handler(&mut self, handler: LuaValue) -> LuaError {
        let error = std::mem::take(&mut self.error_object);
        self.handler_depth += EXTRA_CI;
        let handled = self.call_function(handler, vec![error]);
        self.handler_depth -= EXTRA_CI;
        match handled {
            Ok(values) => {
                self.error_object = values.into_iter().next().unwrap_or_default();
                LuaError::RuntimeError
            }
            Err(_) => {
                let inner = self.error_message();
                self.error_object =
                    LuaValue::string_owned(format!("error in error handling: {}", inner));
                LuaError::ErrorInHandler
            }
        }
    }

    /// pcall semantics: (true, results) or (false, error object)
    pub fn protected_call(&mut self, func: LuaValue, args: Vec<LuaValue>) -> (bool, Vec<LuaValue>) {
        match self.pcall_with_handler(func, args, None) {
            Ok(values) => (true, values),
            Err(_) => (false, vec![self.take_error_object()]),
        }
    }

    /// xpcall semantics
    pub fn protected_call_with_handler(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
        handler: LuaValue,
    ) -> (bool, Vec<LuaValue>) {
        match self.pcall_with_handler(func, args, Some(handler)) {
            Ok(values) => (true, values),
            Err(_) => (false, vec![self.take_error_object()]),
        }
    }

    /// Current call nesting
    #[inline]
    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub(crate) fn current_call_name(&self) -> Option<CallName> {
        self.call_stack.last().and_then(|ci| ci.name.clone())
    }

    #[inline]
    pub(crate) fn set_line(&mut self, line: u32) {
        if let Some(ci) = self.call_stack.last_mut() {
            ci.current_line = line;
        }
    }

    /// `source:line:` of the function `level` frames down (luaL_where);
    /// `None` for native frames
    pub fn where_(&self, level: usize) -> Option<String> {
        let index = self.call_stack.len().checked_sub(level + 1)?;
        self.call_stack[index].location()
    }

    /// Stack traceback starting `level` frames below the top (luaL_traceback)
    pub fn traceback(&self, message: Option<&str>, level: usize) -> String {
        let mut trace = String::new();
        if let Some(message) = message {
            trace.push_str(message);
            trace.push('\n');
        }
        trace.push_str("stack traceback:");

        let frames: Vec<&CallInfo> = self.call_stack.iter().rev().skip(level).collect();
        let total = frames.len();
        let elide = total > TRACEBACK_LEVELS1 + TRACEBACK_LEVELS2;
        for (i, ci) in frames.iter().enumerate() {
            if elide && i == TRACEBACK_LEVELS1 {
                let skipped = total - TRACEBACK_LEVELS1 - TRACEBACK_LEVELS2;
                trace.push_str(&format!("\n\t...\t(skipping {} levels)", skipped));
            }
            if elide && i >= TRACEBACK_LEVELS1 && i < total - TRACEBACK_LEVELS2 {
                continue;
            }
            trace.push_str("\n\t");
            trace.push_str(&ci.describe());
        }
        trace
    }

    // ===== Lightweight Error Handling API =====

    /// Set runtime error and return lightweight error enum
    pub fn error(&mut self, message: impl Into<String>) -> LuaError {
        self.error_object = LuaValue::string_owned(message.into());
        LuaError::RuntimeError
    }

    /// Raise an arbitrary value as the error object
    pub fn error_with_object(&mut self, object: LuaValue) -> LuaError {
        self.error_object = object;
        LuaError::RuntimeError
    }

    /// Runtime error positioned at the running Lua function (luaG_runerror)
    pub fn rt_error(&mut self, message: impl Into<String>) -> LuaError {
        let message = message.into();
        match self.where_(0) {
            Some(location) => self.error(format!("{} {}", location, message)),
            None => self.error(message),
        }
    }

    #[inline]
    pub fn compile_error(&mut self, message: impl Into<String>) -> LuaError {
        self.error_object = LuaValue::string_owned(message.into());
        LuaError::CompileError
    }

    pub fn memory_error(&mut self) -> LuaError {
        self.error_object = LuaValue::string("not enough memory");
        LuaError::MemoryError
    }

    #[inline]
    pub fn error_object(&self) -> &LuaValue {
        &self.error_object
    }

    pub fn take_error_object(&mut self) -> LuaValue {
        std::mem::take(&mut self.error_object)
    }

    /// Printable form of the error object
    pub fn error_message(&self) -> String {
        match self.error_object.to_str_coerce() {
            Some(s) => s.to_string(),
            None => format!("(error object is a {} value)", self.error_object.type_name()),
        }
    }

    pub fn clear_error(&mut self) {
        self.error_object = LuaValue::Nil;
    }

    // ===== Garbage collection =====

    pub fn gc_stop(&mut self) {
        self.gc.stop();
    }

    pub fn gc_restart(&mut self) {
        self.gc.restart();
    }

    pub fn gc_is_running(&self) -> bool {
        self.gc.is_running()
    }

    pub fn gc_stats(&self) -> GcStats {
        let mut stats = self.gc.stats();
        stats.live_bytes = self.gc.total_bytes;
        stats
    }

    /// Estimated heap size in bytes
    pub fn gc_count_bytes(&self) -> usize {
        self.gc.total_bytes
    }

    /// Live objects across all arenas
    pub fn object_count(&self) -> usize {
        self.object_pool.object_count()
    }

    /// Collect if the debt is due or a script asked for it. Only acts at a
    /// safe point (no call running); returns whether a cycle ran.
    pub fn check_gc(&mut self) -> LuaResult<bool> {
        if !self.call_stack.is_empty() || self.gc.in_collection {
            return Ok(false);
        }
        if self.gc.pending_full || self.gc.should_collect() {
            self.full_gc()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Full mark & sweep followed by the due finalizers. Inside a running
    /// call the cycle is deferred to the next safe point. Returns the
    /// number of objects freed; a raising finalizer yields GcMetamethod
    /// after every other due finalizer ran.
    pub fn full_gc(&mut self) -> LuaResult<usize> {
        if !self.call_stack.is_empty() || self.gc.in_collection {
            self.gc.pending_full = true;
            return Ok(0);
        }
        self.gc.pending_full = false;
        self.gc.in_collection = true;

        let fixed = [
            LuaValue::Table(self.global),
            LuaValue::Table(self.registry),
            self.error_object.clone(),
            self.string_metatable.map_or(LuaValue::Nil, LuaValue::Table),
        ];
        let actions = self
            .gc
            .full_cycle(
                &mut self.object_pool,
                fixed
                    .iter()
                    .chain(self.working_stack.iter())
                    .chain(self.last_results.iter()),
            );
        self.release_blocks(actions.released);
        debug!(
            freed = actions.freed,
            live_bytes = self.gc.total_bytes,
            pending_finalizers = self.gc.tobefnz.len(),
            "collection cycle finished"
        );

        let result = self.run_finalizers();
        self.gc.in_collection = false;
        result.map(|_| actions.freed)
    }

    /// Call `__gc` on every queued object. Errors do not stop the queue;
    /// the first one is reported.
    fn run_finalizers(&mut self) -> LuaResult<()> {
        let mut first_error: Option<String> = None;
        while !self.gc.tobefnz.is_empty() {
            let pending = std::mem::take(&mut self.gc.tobefnz);
            for object in pending {
                let value = match object {
                    GcRef::Table(id) => LuaValue::Table(id),
                    GcRef::Function(id) => LuaValue::Function(id),
                    GcRef::Userdata(id) => LuaValue::Userdata(id),
                };
                let finalizer = self.metamethod(&value, "__gc");
                if finalizer.is_nil() {
                    continue;
                }
                self.gc.stats.finalizers_run += 1;
                let base = self.call_stack.len();
                let saved_error = std::mem::take(&mut self.error_object);
                let result =
                    self.call_named(finalizer, vec![value], Some(CallName::Metamethod("__gc")));
                if result.is_err() {
                    self.call_stack.truncate(base);
                    if first_error.is_none() {
                        first_error = Some(self.error_message());
                    }
                }
                self.error_object = saved_error;
            }
        }
        match first_error {
            Some(message) => {
                self.error_object =
                    LuaValue::string_owned(format!("error in __gc metamethod ({})", message));
                Err(LuaError::GcMetamethod)
            }
            None => Ok(()),
        }
    }

    // ===== Conversions =====

    /// `tostring` semantics, honoring `__tostring` and `__name`
    pub fn tostring(&mut self, value: &LuaValue) -> LuaResult<LuaString> {
        let handler = self.metamethod(value, "__tostring");
        if !handler.is_nil() {
            let result = self.call_metamethod(handler, vec![value.clone()], "__tostring")?;
            return match result.to_str_coerce() {
                Some(s) => Ok(s),
                None => Err(self.rt_error("'__tostring' must return a string")),
            };
        }
        Ok(self.tostring_raw(value))
    }

    /// Conversion without calling metamethods
    pub fn tostring_raw(&self, value: &LuaValue) -> LuaString {
        if let Some(s) = value.to_str_coerce() {
            return s;
        }
        let text = match value {
            LuaValue::Nil => "nil".to_string(),
            LuaValue::Boolean(b) => b.to_string(),
            LuaValue::Table(id) => format!("{}: {}", self.type_name_meta(value), id),
            LuaValue::Function(id) => format!("function: {}", id),
            LuaValue::CFunction(f) => format!("function: builtin: 0x{:014x}", *f as usize),
            LuaValue::Userdata(id) => format!("{}: {}", self.type_name_meta(value), id),
            _ => value.type_name().to_string(),
        };
        Rc::from(text)
    }

    // ===== Teardown =====

    /// Run every pending finalizer (reachable or not) and free all objects,
    /// returning every block to the allocator. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.call_stack.clear();
        self.gc.in_collection = true;

        for _ in 0..MAX_CLOSE_PASSES {
            let due = self.object_pool.separate_finalizable(true);
            self.gc.tobefnz.extend(due);
            if self.gc.tobefnz.is_empty() {
                break;
            }
            if self.run_finalizers().is_err() {
                warn!(error = %self.error_message(), "finalizer failed during close");
            }
        }

        let mut released = Released::default();
        self.object_pool.drain_all(&mut released);
        let blocks = released.blocks();
        self.release_blocks(released);
        self.working_stack.clear();
        self.last_results.clear();
        self.error_object = LuaValue::Nil;
        self.gc.total_bytes = 0;
        debug!(
            blocks_released = blocks,
            finalizers_run = self.gc.stats.finalizers_run,
            "vm closed"
        );
    }

    /// Hand swept storage back to the allocator
    fn release_blocks(&mut self, released: Released) {
        for header in released.headers {
            header.release(&mut *self.allocator);
        }
        for userdata in released.userdata {
            userdata.release(&mut *self.allocator);
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for LuaVM {
    fn drop(&mut self) {
        self.close();
    }
}
