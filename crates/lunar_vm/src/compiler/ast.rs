// Resolved syntax tree executed by the interpreter.
// Names are already bound: locals to frame slots, captured variables to
// upvalue indices, everything else to a global name.

use std::rc::Rc;

use crate::compiler::parser::{BinaryOperator, UnaryOperator};
use crate::lua_value::Chunk;

pub type Block = Vec<Stat>;

#[derive(Debug)]
pub struct Stat {
    pub kind: StatKind,
    pub line: u32,
}

#[derive(Debug)]
pub enum StatKind {
    /// Function call used as a statement; results are discarded
    Call(Expr),
    /// `local a, b = e1, e2`
    Local { slots: Vec<usize>, exprs: Vec<Expr> },
    /// `t.x, y = e1, e2`; targets are Local/Upvalue/Global/Index expressions
    Assign { targets: Vec<Expr>, exprs: Vec<Expr> },
    /// `local function f` binds its slot before the closure is created
    LocalFunction { slot: usize, func: Rc<Chunk> },
    Do(Block),
    While { cond: Expr, body: Block },
    Repeat { body: Block, cond: Expr },
    If { branches: Vec<(Expr, Block)>, else_block: Option<Block> },
    NumericFor {
        slot: usize,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    GenericFor { slots: Vec<usize>, exprs: Vec<Expr>, body: Block },
    Return(Vec<Expr>),
    Break,
}

#[derive(Debug)]
pub enum Expr {
    Nil,
    True,
    False,
    Vararg,
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Local(usize),
    Upvalue(usize),
    Global(Rc<str>),
    Index {
        obj: Box<Expr>,
        key: Box<Expr>,
        line: u32,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        line: u32,
    },
    /// `obj:name(args)`
    Method {
        obj: Box<Expr>,
        name: Rc<str>,
        args: Vec<Expr>,
        line: u32,
    },
    Function(Rc<Chunk>),
    Binary {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        line: u32,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
        line: u32,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Table {
        items: Vec<TableItem>,
        line: u32,
    },
    /// Parenthesized expression: truncates multiple results to one
    Paren(Box<Expr>),
}

#[derive(Debug)]
pub enum TableItem {
    Positional(Expr),
    Keyed(Expr, Expr),
}

impl Expr {
    /// Calls and `...` may produce any number of values
    pub fn is_multi(&self) -> bool {
        matches!(self, Expr::Call { .. } | Expr::Method { .. } | Expr::Vararg)
    }
}
