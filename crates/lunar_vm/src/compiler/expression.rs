// Expression parsing (expr/subexpr/suffixedexp rules of lparser.c)

use crate::compiler::ast::{Expr, TableItem};
use crate::compiler::parser::lua_tokenize::TokenValue;
use crate::compiler::parser::{
    BinaryOperator, LuaTokenKind, UNARY_PRIORITY, UnaryOperator, to_binary_operator,
    to_unary_operator,
};
use crate::compiler::{LuaParser, ParseResult};

impl LuaParser<'_> {
    pub(crate) fn expr(&mut self) -> ParseResult<Expr> {
        self.subexpr(0)
    }

    pub(crate) fn explist(&mut self) -> ParseResult<Vec<Expr>> {
        let mut exprs = vec![self.expr()?];
        while self.test_next(LuaTokenKind::TkComma)? {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    /// subexpr -> (simpleexp | unop subexpr) { binop subexpr }
    /// where `binop` is any binary operator with a priority higher than `limit`
    fn subexpr(&mut self, limit: u8) -> ParseResult<Expr> {
        self.enter_level()?;
        let mut lhs = match to_unary_operator(self.token()) {
            Some(op) => {
                let line = self.line();
                self.next()?;
                let operand = self.subexpr(UNARY_PRIORITY)?;
                fold_unary(op, operand, line)
            }
            None => self.simpleexp()?,
        };

        while let Some(op) = to_binary_operator(self.token()) {
            let priority = op.get_priority();
            if priority.left <= limit {
                break;
            }
            let line = self.line();
            self.next()?;
            let rhs = self.subexpr(priority.right)?;
            lhs = match op {
                BinaryOperator::OpAnd => Expr::And(Box::new(lhs), Box::new(rhs)),
                BinaryOperator::OpOr => Expr::Or(Box::new(lhs), Box::new(rhs)),
                _ => Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    line,
                },
            };
        }
        self.leave_level();
        Ok(lhs)
    }

    /// simpleexp -> FLT | INT | STRING | NIL | TRUE | FALSE | ... |
    ///              constructor | FUNCTION body | suffixedexp
    fn simpleexp(&mut self) -> ParseResult<Expr> {
        let expr = match self.token() {
            LuaTokenKind::TkInt | LuaTokenKind::TkFloat | LuaTokenKind::TkString => {
                let token = self.next()?;
                match token.value {
                    TokenValue::Int(i) => Expr::Integer(i),
                    TokenValue::Float(f) => Expr::Float(f),
                    TokenValue::Str(s) => Expr::String(s),
                    _ => Expr::Nil,
                }
            }
            LuaTokenKind::TkNil => {
                self.next()?;
                Expr::Nil
            }
            LuaTokenKind::TkTrue => {
                self.next()?;
                Expr::True
            }
            LuaTokenKind::TkFalse => {
                self.next()?;
                Expr::False
            }
            LuaTokenKind::TkDots => {
                if !self.fs().is_vararg {
                    return Err(self.error("cannot use '...' outside a vararg function"));
                }
                self.next()?;
                Expr::Vararg
            }
            LuaTokenKind::TkLeftBrace => self.constructor()?,
            LuaTokenKind::TkFunction => {
                let line = self.line();
                self.next()?;
                Expr::Function(self.body(false, line)?)
            }
            _ => return self.suffixedexp(),
        };
        Ok(expr)
    }

    /// primaryexp -> NAME | '(' expr ')'
    fn primaryexp(&mut self) -> ParseResult<Expr> {
        match self.token() {
            LuaTokenKind::TkName => {
                let name = self.str_checkname()?;
                Ok(self.singlevar(name))
            }
            LuaTokenKind::TkLeftParen => {
                let line = self.line();
                self.next()?;
                let inner = self.expr()?;
                self.check_match(LuaTokenKind::TkRightParen, LuaTokenKind::TkLeftParen, line)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            _ => Err(self.error("unexpected symbol")),
        }
    }

    /// suffixedexp -> primaryexp { '.' NAME | '[' exp ']' | ':' NAME funcargs | funcargs }
    pub(crate) fn suffixedexp(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primaryexp()?;
        loop {
            let line = self.line();
            match self.token() {
                LuaTokenKind::TkDot => {
                    self.next()?;
                    let key = self.str_checkname()?;
                    expr = Expr::Index {
                        obj: Box::new(expr),
                        key: Box::new(Expr::String(key)),
                        line,
                    };
                }
                LuaTokenKind::TkLeftBracket => {
                    self.next()?;
                    let key = self.expr()?;
                    self.check_next(LuaTokenKind::TkRightBracket)?;
                    expr = Expr::Index {
                        obj: Box::new(expr),
                        key: Box::new(key),
                        line,
                    };
                }
                LuaTokenKind::TkColon => {
                    self.next()?;
                    let name = self.str_checkname()?;
                    let args = self.funcargs(line)?;
                    expr = Expr::Method {
                        obj: Box::new(expr),
                        name,
                        args,
                        line,
                    };
                }
                LuaTokenKind::TkLeftParen | LuaTokenKind::TkString | LuaTokenKind::TkLeftBrace => {
                    let args = self.funcargs(line)?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        line,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn funcargs(&mut self, line: u32) -> ParseResult<Vec<Expr>> {
        match self.token() {
            LuaTokenKind::TkLeftParen => {
                self.next()?;
                let args = if self.token() == LuaTokenKind::TkRightParen {
                    Vec::new()
                } else {
                    self.explist()?
                };
                self.check_match(LuaTokenKind::TkRightParen, LuaTokenKind::TkLeftParen, line)?;
                Ok(args)
            }
            LuaTokenKind::TkLeftBrace => Ok(vec![self.constructor()?]),
            LuaTokenKind::TkString => {
                let token = self.next()?;
                match token.value {
                    TokenValue::Str(s) => Ok(vec![Expr::String(s)]),
                    _ => Ok(vec![Expr::Nil]),
                }
            }
            _ => Err(self.error("function arguments expected")),
        }
    }

    /// constructor -> '{' [ field { sep field } [sep] ] '}'
    fn constructor(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        self.check_next(LuaTokenKind::TkLeftBrace)?;
        let mut items = Vec::new();
        loop {
            if self.token() == LuaTokenKind::TkRightBrace {
                break;
            }
            let item = match self.token() {
                LuaTokenKind::TkName if self.peek()? == LuaTokenKind::TkAssign => {
                    let name = self.str_checkname()?;
                    self.next()?;
                    TableItem::Keyed(Expr::String(name), self.expr()?)
                }
                LuaTokenKind::TkLeftBracket => {
                    self.next()?;
                    let key = self.expr()?;
                    self.check_next(LuaTokenKind::TkRightBracket)?;
                    self.check_next(LuaTokenKind::TkAssign)?;
                    TableItem::Keyed(key, self.expr()?)
                }
                _ => TableItem::Positional(self.expr()?),
            };
            items.push(item);
            if !self.test_next(LuaTokenKind::TkComma)?
                && !self.test_next(LuaTokenKind::TkSemicolon)?
            {
                break;
            }
        }
        self.check_match(LuaTokenKind::TkRightBrace, LuaTokenKind::TkLeftBrace, line)?;
        Ok(Expr::Table { items, line })
    }
}

/// Negative numeric literals become constants directly
fn fold_unary(op: UnaryOperator, operand: Expr, line: u32) -> Expr {
    match (op, &operand) {
        (UnaryOperator::OpUnm, Expr::Integer(i)) => Expr::Integer(i.wrapping_neg()),
        (UnaryOperator::OpUnm, Expr::Float(f)) => Expr::Float(-f),
        _ => Expr::Unary {
            op,
            operand: Box::new(operand),
            line,
        },
    }
}
