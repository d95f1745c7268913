use std::cell::RefCell;
use std::mem::size_of;
use std::rc::Rc;

use crate::compiler::ast::Block;
use crate::lua_value::LuaValue;

/// Shared variable captured by one or more closures
pub type UpvalueCell = Rc<RefCell<LuaValue>>;

/// Upvalue descriptor
#[derive(Debug, Clone)]
pub struct UpvalueDesc {
    pub name: Rc<str>,
    pub is_local: bool, // true if captures parent local slot, false if captures parent upvalue
    pub index: usize,   // slot in the parent frame or index in the parent's upvalues
}

/// Compiled function prototype: the resolved syntax tree plus the metadata
/// the interpreter and tracebacks need.
#[derive(Debug)]
pub struct Chunk {
    pub body: Block,
    pub param_count: usize,
    pub is_vararg: bool,
    /// Names of every local slot, parameters first
    pub locals: Vec<Rc<str>>,
    /// Slots that some nested closure captures; these live in cells
    pub captured: Vec<bool>,
    pub upvalue_descs: Vec<UpvalueDesc>,
    pub source_name: Rc<str>,
    pub linedefined: u32, // 0 for the main chunk
}

impl Chunk {
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.locals.len()
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.linedefined == 0
    }
}

pub struct LuaFunction {
    pub chunk: Rc<Chunk>,
    pub upvalues: Vec<UpvalueCell>,
}

impl LuaFunction {
    pub fn new(chunk: Rc<Chunk>, upvalues: Vec<UpvalueCell>) -> Self {
        LuaFunction { chunk, upvalues }
    }

    pub fn estimate_size(&self) -> usize {
        size_of::<LuaFunction>()
            + self.upvalues.len() * (size_of::<UpvalueCell>() + size_of::<RefCell<LuaValue>>())
    }
}
