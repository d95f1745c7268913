// Statement parsing (statement/block rules of lparser.c)

use std::rc::Rc;

use crate::compiler::ast::{Block, Expr, Stat, StatKind};
use crate::compiler::func_state::FuncState;
use crate::compiler::parser::LuaTokenKind;
use crate::compiler::{LuaParser, ParseResult};
use crate::lua_value::Chunk;

impl LuaParser<'_> {
    /// Statements up to a block terminator; `return` must come last
    pub(crate) fn statlist(&mut self) -> ParseResult<Block> {
        let mut stats = Vec::new();
        while !self.token().is_block_follow(true) {
            if self.token() == LuaTokenKind::TkReturn {
                stats.push(self.retstat()?);
                break;
            }
            if let Some(stat) = self.statement()? {
                stats.push(stat);
            }
        }
        Ok(stats)
    }

    /// A nested block with its own scope
    pub(crate) fn block(&mut self, is_loop: bool) -> ParseResult<Block> {
        self.fs().enter_block(is_loop);
        let body = self.statlist();
        self.fs().leave_block();
        body
    }

    fn statement(&mut self) -> ParseResult<Option<Stat>> {
        let line = self.line();
        self.enter_level()?;
        let kind = match self.token() {
            LuaTokenKind::TkSemicolon => {
                self.next()?;
                None
            }
            LuaTokenKind::TkIf => Some(self.ifstat(line)?),
            LuaTokenKind::TkWhile => Some(self.whilestat(line)?),
            LuaTokenKind::TkDo => {
                self.next()?;
                let body = self.block(false)?;
                self.check_match(LuaTokenKind::TkEnd, LuaTokenKind::TkDo, line)?;
                Some(StatKind::Do(body))
            }
            LuaTokenKind::TkFor => Some(self.forstat(line)?),
            LuaTokenKind::TkRepeat => Some(self.repeatstat(line)?),
            LuaTokenKind::TkFunction => Some(self.funcstat(line)?),
            LuaTokenKind::TkLocal => {
                self.next()?;
                if self.test_next(LuaTokenKind::TkFunction)? {
                    Some(self.localfunc(line)?)
                } else {
                    Some(self.localstat()?)
                }
            }
            LuaTokenKind::TkBreak => {
                if !self.fs().inside_loop() {
                    return Err(self.error(&format!("break outside a loop at line {}", line)));
                }
                self.next()?;
                Some(StatKind::Break)
            }
            LuaTokenKind::TkGoto | LuaTokenKind::TkDbColon => {
                return Err(self.error("goto statements and labels are not supported"));
            }
            _ => Some(self.exprstat()?),
        };
        self.leave_level();
        Ok(kind.map(|kind| Stat { kind, line }))
    }

    fn ifstat(&mut self, line: u32) -> ParseResult<StatKind> {
        let mut branches = Vec::new();
        let mut else_block = None;

        // IF cond THEN block {ELSEIF cond THEN block} [ELSE block] END
        self.next()?;
        loop {
            let cond = self.expr()?;
            self.check_next(LuaTokenKind::TkThen)?;
            let body = self.block(false)?;
            branches.push((cond, body));
            match self.token() {
                LuaTokenKind::TkElseIf => {
                    self.next()?;
                }
                LuaTokenKind::TkElse => {
                    self.next()?;
                    else_block = Some(self.block(false)?);
                    break;
                }
                _ => break,
            }
        }
        self.check_match(LuaTokenKind::TkEnd, LuaTokenKind::TkIf, line)?;
        Ok(StatKind::If {
            branches,
            else_block,
        })
    }

    fn whilestat(&mut self, line: u32) -> ParseResult<StatKind> {
        self.next()?;
        let cond = self.expr()?;
        self.check_next(LuaTokenKind::TkDo)?;
        let body = self.block(true)?;
        self.check_match(LuaTokenKind::TkEnd, LuaTokenKind::TkWhile, line)?;
        Ok(StatKind::While { cond, body })
    }

    fn repeatstat(&mut self, line: u32) -> ParseResult<StatKind> {
        self.next()?;
        // the condition sees the body's locals
        self.fs().enter_block(true);
        let body = self.statlist();
        let result = body.and_then(|body| {
            self.check_match(LuaTokenKind::TkUntil, LuaTokenKind::TkRepeat, line)?;
            let cond = self.expr()?;
            Ok(StatKind::Repeat { body, cond })
        });
        self.fs().leave_block();
        result
    }

    fn forstat(&mut self, line: u32) -> ParseResult<StatKind> {
        self.next()?;
        let name = self.str_checkname()?;
        let stat = match self.token() {
            LuaTokenKind::TkAssign => self.fornum(name)?,
            LuaTokenKind::TkComma | LuaTokenKind::TkIn => self.forlist(name)?,
            _ => return Err(self.error("'=' or 'in' expected")),
        };
        self.check_match(LuaTokenKind::TkEnd, LuaTokenKind::TkFor, line)?;
        Ok(stat)
    }

    fn fornum(&mut self, name: Rc<str>) -> ParseResult<StatKind> {
        self.next()?;
        let start = self.expr()?;
        self.check_next(LuaTokenKind::TkComma)?;
        let limit = self.expr()?;
        let step = if self.test_next(LuaTokenKind::TkComma)? {
            Some(self.expr()?)
        } else {
            None
        };
        self.check_next(LuaTokenKind::TkDo)?;

        self.fs().enter_block(true);
        let slot = self.fs().new_local(name);
        self.fs().activate(slot);
        let body = self.statlist();
        self.fs().leave_block();

        Ok(StatKind::NumericFor {
            slot,
            start,
            limit,
            step,
            body: body?,
        })
    }

    fn forlist(&mut self, first: Rc<str>) -> ParseResult<StatKind> {
        let mut names = vec![first];
        while self.test_next(LuaTokenKind::TkComma)? {
            names.push(self.str_checkname()?);
        }
        self.check_next(LuaTokenKind::TkIn)?;
        let exprs = self.explist()?;
        self.check_next(LuaTokenKind::TkDo)?;

        self.fs().enter_block(true);
        let slots: Vec<usize> = names
            .into_iter()
            .map(|name| {
                let slot = self.fs().new_local(name);
                self.fs().activate(slot);
                slot
            })
            .collect();
        let body = self.statlist();
        self.fs().leave_block();

        Ok(StatKind::GenericFor {
            slots,
            exprs,
            body: body?,
        })
    }

    /// funcname: NAME {'.' NAME} [':' NAME]
    fn funcstat(&mut self, line: u32) -> ParseResult<StatKind> {
        self.next()?;
        let name = self.str_checkname()?;
        let mut target = self.singlevar(name);
        let mut is_method = false;
        loop {
            let key_line = self.line();
            match self.token() {
                LuaTokenKind::TkDot | LuaTokenKind::TkColon => {
                    is_method = self.token() == LuaTokenKind::TkColon;
                    self.next()?;
                    let key = self.str_checkname()?;
                    target = Expr::Index {
                        obj: Box::new(target),
                        key: Box::new(Expr::String(key)),
                        line: key_line,
                    };
                    if is_method {
                        break;
                    }
                }
                _ => break,
            }
        }
        let func = self.body(is_method, line)?;
        Ok(StatKind::Assign {
            targets: vec![target],
            exprs: vec![Expr::Function(func)],
        })
    }

    fn localfunc(&mut self, line: u32) -> ParseResult<StatKind> {
        let name = self.str_checkname()?;
        let slot = self.fs().new_local(name);
        // visible inside its own body for recursion
        self.fs().activate(slot);
        let func = self.body(false, line)?;
        Ok(StatKind::LocalFunction { slot, func })
    }

    /// LOCAL NAME attrib { ',' NAME attrib } ['=' explist]
    fn localstat(&mut self) -> ParseResult<StatKind> {
        let mut slots = Vec::new();
        loop {
            let name = self.str_checkname()?;
            if self.test_next(LuaTokenKind::TkLt)? {
                let attrib = self.str_checkname()?;
                if &*attrib != "const" {
                    return Err(self.error(&format!("unknown attribute '{}'", attrib)));
                }
                self.check_next(LuaTokenKind::TkGt)?;
            }
            slots.push(self.fs().new_local(name));
            if !self.test_next(LuaTokenKind::TkComma)? {
                break;
            }
        }
        let exprs = if self.test_next(LuaTokenKind::TkAssign)? {
            self.explist()?
        } else {
            Vec::new()
        };
        for &slot in &slots {
            self.fs().activate(slot);
        }
        Ok(StatKind::Local { slots, exprs })
    }

    /// func | assignment
    fn exprstat(&mut self) -> ParseResult<StatKind> {
        let first = self.suffixedexp()?;
        if matches!(self.token(), LuaTokenKind::TkAssign | LuaTokenKind::TkComma) {
            let mut targets = vec![first];
            while self.test_next(LuaTokenKind::TkComma)? {
                targets.push(self.suffixedexp()?);
            }
            for target in &targets {
                if !matches!(
                    target,
                    Expr::Local(_) | Expr::Upvalue(_) | Expr::Global(_) | Expr::Index { .. }
                ) {
                    return Err(self.error("syntax error"));
                }
            }
            self.check_next(LuaTokenKind::TkAssign)?;
            let exprs = self.explist()?;
            return Ok(StatKind::Assign { targets, exprs });
        }
        if !matches!(first, Expr::Call { .. } | Expr::Method { .. }) {
            return Err(self.error("syntax error"));
        }
        Ok(StatKind::Call(first))
    }

    fn retstat(&mut self) -> ParseResult<Stat> {
        let line = self.line();
        self.next()?;
        let exprs = if self.token().is_block_follow(true) || self.token() == LuaTokenKind::TkSemicolon
        {
            Vec::new()
        } else {
            self.explist()?
        };
        self.test_next(LuaTokenKind::TkSemicolon)?;
        if !self.token().is_block_follow(true) {
            return Err(self.error("'<eof>' expected"));
        }
        Ok(Stat {
            kind: StatKind::Return(exprs),
            line,
        })
    }

    /// Function body: parameters and statements up to `end`
    pub(crate) fn body(&mut self, is_method: bool, line: u32) -> ParseResult<Rc<Chunk>> {
        self.fs.push(FuncState::new(line));
        if is_method {
            let slot = self.fs().new_local(Rc::from("self"));
            self.fs().activate(slot);
        }

        self.check_next(LuaTokenKind::TkLeftParen)?;
        if self.token() != LuaTokenKind::TkRightParen {
            loop {
                match self.token() {
                    LuaTokenKind::TkName => {
                        let name = self.str_checkname()?;
                        let slot = self.fs().new_local(name);
                        self.fs().activate(slot);
                    }
                    LuaTokenKind::TkDots => {
                        self.next()?;
                        self.fs().is_vararg = true;
                        break;
                    }
                    _ => return Err(self.error("<name> expected")),
                }
                if !self.test_next(LuaTokenKind::TkComma)? {
                    break;
                }
            }
        }
        let param_count = self.fs().actvar.len();
        self.fs().param_count = param_count;
        self.check_next(LuaTokenKind::TkRightParen)?;

        let body = self.statlist()?;
        self.check_match(LuaTokenKind::TkEnd, LuaTokenKind::TkFunction, line)?;
        Ok(Rc::new(self.close_func(body)))
    }
}
