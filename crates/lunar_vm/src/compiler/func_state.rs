// Per-function parsing state, after FuncState/BlockCnt in lparser.h.
// Every local gets its own frame slot (slots are never reused), which keeps
// closure capture simple: a captured slot holds a shared cell that the
// interpreter re-creates each time the declaration executes.

use std::rc::Rc;

use crate::lua_value::UpvalueDesc;

/// Result of resolving a name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Local(usize),
    Upvalue(usize),
    Global,
}

/// Active local variable
#[derive(Debug, Clone)]
pub struct VarDesc {
    pub name: Rc<str>,
    pub slot: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockCnt {
    /// Active locals when the block was entered
    pub nactvar: usize,
    pub is_loop: bool,
}

pub struct FuncState {
    pub actvar: Vec<VarDesc>,
    pub blocks: Vec<BlockCnt>,
    pub locals: Vec<Rc<str>>,
    pub captured: Vec<bool>,
    pub upvalues: Vec<UpvalueDesc>,
    pub param_count: usize,
    pub is_vararg: bool,
    pub linedefined: u32,
}

impl FuncState {
    pub fn new(linedefined: u32) -> Self {
        FuncState {
            actvar: Vec::new(),
            blocks: Vec::new(),
            locals: Vec::new(),
            captured: Vec::new(),
            upvalues: Vec::new(),
            param_count: 0,
            is_vararg: false,
            linedefined,
        }
    }

    /// Reserve a slot for a new local; it becomes visible on `activate`
    pub fn new_local(&mut self, name: Rc<str>) -> usize {
        let slot = self.locals.len();
        self.locals.push(name);
        self.captured.push(false);
        slot
    }

    pub fn activate(&mut self, slot: usize) {
        let name = self.locals[slot].clone();
        self.actvar.push(VarDesc { name, slot });
    }

    pub fn enter_block(&mut self, is_loop: bool) {
        self.blocks.push(BlockCnt {
            nactvar: self.actvar.len(),
            is_loop,
        });
    }

    pub fn leave_block(&mut self) {
        if let Some(block) = self.blocks.pop() {
            self.actvar.truncate(block.nactvar);
        }
    }

    pub fn inside_loop(&self) -> bool {
        self.blocks.iter().any(|b| b.is_loop)
    }

    /// Innermost active local with this name
    pub fn find_local(&self, name: &str) -> Option<usize> {
        self.actvar
            .iter()
            .rev()
            .find(|v| &*v.name == name)
            .map(|v| v.slot)
    }

    pub fn find_upvalue(&self, name: &str) -> Option<usize> {
        self.upvalues.iter().position(|u| &*u.name == name)
    }

    pub fn add_upvalue(&mut self, name: Rc<str>, is_local: bool, index: usize) -> usize {
        self.upvalues.push(UpvalueDesc {
            name,
            is_local,
            index,
        });
        self.upvalues.len() - 1
    }
}

/// Resolve `name` against the function stack, innermost last (singlevaraux).
/// Locals found in an enclosing function are marked captured and threaded
/// through every intermediate function as upvalues.
pub fn resolve_var(states: &mut [FuncState], name: &Rc<str>) -> VarKind {
    let Some((current, outer)) = states.split_last_mut() else {
        return VarKind::Global;
    };
    if let Some(slot) = current.find_local(name) {
        return VarKind::Local(slot);
    }
    if let Some(idx) = current.find_upvalue(name) {
        return VarKind::Upvalue(idx);
    }
    match resolve_var(outer, name) {
        VarKind::Local(slot) => {
            if let Some(parent) = outer.last_mut() {
                parent.captured[slot] = true;
            }
            VarKind::Upvalue(current.add_upvalue(name.clone(), true, slot))
        }
        VarKind::Upvalue(idx) => VarKind::Upvalue(current.add_upvalue(name.clone(), false, idx)),
        VarKind::Global => VarKind::Global,
    }
}
