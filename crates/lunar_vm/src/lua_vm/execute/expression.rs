// Expression evaluation

use std::rc::Rc;

use crate::compiler::ast::{Expr, TableItem};
use crate::compiler::parser::{BinaryOperator, UnaryOperator};
use crate::lua_value::{Chunk, LuaValue};
use crate::lua_vm::call_info::CallName;
use crate::lua_vm::execute::Frame;
use crate::lua_vm::execute::metamethod::var_suffix;
use crate::lua_vm::{LuaResult, LuaVM};

impl LuaVM {
    /// Evaluate to exactly one value
    pub(super) fn eval(&mut self, frame: &mut Frame, expr: &Expr) -> LuaResult<LuaValue> {
        let value = match expr {
            Expr::Nil => LuaValue::Nil,
            Expr::True => LuaValue::Boolean(true),
            Expr::False => LuaValue::Boolean(false),
            Expr::Integer(i) => LuaValue::Integer(*i),
            Expr::Float(f) => LuaValue::Float(*f),
            Expr::String(s) => LuaValue::String(s.clone()),
            Expr::Vararg => frame.varargs.first().cloned().unwrap_or_default(),
            Expr::Local(slot) => frame.get(*slot),
            Expr::Upvalue(index) => frame.upvalue(*index),
            Expr::Global(name) => {
                let globals = LuaValue::Table(self.global);
                self.try_index(&globals, &LuaValue::String(name.clone()))?
                    .unwrap_or_default()
            }
            Expr::Index { obj, key, line } => {
                let o = self.eval(frame, obj)?;
                let k = self.eval(frame, key)?;
                self.set_line(*line);
                match self.try_index(&o, &k)? {
                    Some(value) => value,
                    None => {
                        let info = self.var_info(frame, obj);
                        let message = format!(
                            "attempt to index a {} value{}",
                            self.type_name_meta(&o),
                            var_suffix(info)
                        );
                        return Err(self.rt_error(message));
                    }
                }
            }
            Expr::Call { .. } | Expr::Method { .. } => {
                self.eval_multi(frame, expr)?.into_iter().next().unwrap_or_default()
            }
            Expr::Function(chunk) => self.make_closure(frame, chunk)?,
            Expr::Binary { op, lhs, rhs, line } => {
                let a = self.eval(frame, lhs)?;
                let b = self.eval(frame, rhs)?;
                self.set_line(*line);
                self.eval_binary(frame, *op, a, b, lhs, rhs)?
            }
            Expr::Unary { op, operand, line } => {
                let v = self.eval(frame, operand)?;
                self.set_line(*line);
                self.eval_unary(frame, *op, v, operand)?
            }
            Expr::And(lhs, rhs) => {
                let v = self.eval(frame, lhs)?;
                if v.is_truthy() { self.eval(frame, rhs)? } else { v }
            }
            Expr::Or(lhs, rhs) => {
                let v = self.eval(frame, lhs)?;
                if v.is_truthy() { v } else { self.eval(frame, rhs)? }
            }
            Expr::Table { items, line } => self.eval_table(frame, items, *line)?,
            Expr::Paren(inner) => self.eval(frame, inner)?,
        };
        Ok(value)
    }

    /// Evaluate an expression that may yield several values
    pub(super) fn eval_multi(&mut self, frame: &mut Frame, expr: &Expr) -> LuaResult<Vec<LuaValue>> {
        match expr {
            Expr::Vararg => Ok(frame.varargs.clone()),
            Expr::Call { func, args, line } => {
                let f = self.eval(frame, func)?;
                let args = self.eval_list(frame, args, None)?;
                self.set_line(*line);
                let name = self.var_info(frame, func);
                self.call_named(f, args, name)
            }
            Expr::Method {
                obj,
                name,
                args,
                line,
            } => {
                let o = self.eval(frame, obj)?;
                self.set_line(*line);
                let method = match self.try_index(&o, &LuaValue::String(name.clone()))? {
                    Some(method) => method,
                    None => {
                        let info = self.var_info(frame, obj);
                        let message = format!(
                            "attempt to index a {} value{}",
                            self.type_name_meta(&o),
                            var_suffix(info)
                        );
                        return Err(self.rt_error(message));
                    }
                };
                let mut call_args = Vec::with_capacity(args.len() + 1);
                call_args.push(o);
                call_args.extend(self.eval_list(frame, args, None)?);
                self.set_line(*line);
                self.call_named(method, call_args, Some(CallName::Method(name.clone())))
            }
            _ => Ok(vec![self.eval(frame, expr)?]),
        }
    }

    /// Evaluate an expression list; only the last expression expands.
    /// With `want`, the result is padded or truncated to that length.
    pub(super) fn eval_list(
        &mut self,
        frame: &mut Frame,
        exprs: &[Expr],
        want: Option<usize>,
    ) -> LuaResult<Vec<LuaValue>> {
        let mut values = Vec::with_capacity(want.unwrap_or(exprs.len()));
        if let Some((last, init)) = exprs.split_last() {
            for expr in init {
                values.push(self.eval(frame, expr)?);
            }
            if last.is_multi() {
                values.extend(self.eval_multi(frame, last)?);
            } else {
                values.push(self.eval(frame, last)?);
            }
        }
        if let Some(n) = want {
            values.resize(n, LuaValue::Nil);
        }
        Ok(values)
    }

    fn eval_binary(
        &mut self,
        frame: &Frame,
        op: BinaryOperator,
        a: LuaValue,
        b: LuaValue,
        lhs: &Expr,
        rhs: &Expr,
    ) -> LuaResult<LuaValue> {
        let result = match op {
            BinaryOperator::OpEq => Some(LuaValue::Boolean(self.values_equal(&a, &b)?)),
            BinaryOperator::OpNe => Some(LuaValue::Boolean(!self.values_equal(&a, &b)?)),
            BinaryOperator::OpLt | BinaryOperator::OpLe | BinaryOperator::OpGt | BinaryOperator::OpGe => {
                let or_equal = matches!(op, BinaryOperator::OpLe | BinaryOperator::OpGe);
                let ordered = if matches!(op, BinaryOperator::OpLt | BinaryOperator::OpLe) {
                    self.try_less(&a, &b, or_equal)?
                } else {
                    self.try_less(&b, &a, or_equal)?
                };
                match ordered {
                    Some(result) => return Ok(LuaValue::Boolean(result)),
                    None => return Err(self.compare_error(&a, &b)),
                }
            }
            BinaryOperator::OpConcat => self.try_concat(&a, &b)?,
            BinaryOperator::OpAnd => Some(if a.is_truthy() { b.clone() } else { a.clone() }),
            BinaryOperator::OpOr => Some(if a.is_truthy() { a.clone() } else { b.clone() }),
            _ => self.try_arith(op, &a, &b)?,
        };
        match result {
            Some(value) => Ok(value),
            None => {
                let info_a = self.var_info(frame, lhs);
                let info_b = self.var_info(frame, rhs);
                Err(self.op_error(op, &a, &b, info_a, info_b))
            }
        }
    }

    fn eval_unary(
        &mut self,
        frame: &Frame,
        op: UnaryOperator,
        v: LuaValue,
        operand: &Expr,
    ) -> LuaResult<LuaValue> {
        let result = match op {
            UnaryOperator::OpNot => return Ok(LuaValue::Boolean(!v.is_truthy())),
            UnaryOperator::OpLen => {
                if let Some(len) = self.try_len(&v)? {
                    return Ok(len);
                }
                let info = self.var_info(frame, operand);
                let message = format!(
                    "attempt to get length of a {} value{}",
                    self.type_name_meta(&v),
                    var_suffix(info)
                );
                return Err(self.rt_error(message));
            }
            UnaryOperator::OpUnm => (self.try_unm(&v)?, BinaryOperator::OpSub),
            UnaryOperator::OpBNot => (self.try_bnot(&v)?, BinaryOperator::OpBXor),
        };
        match result {
            (Some(value), _) => Ok(value),
            (None, op) => {
                let info = self.var_info(frame, operand);
                Err(self.op_error(op, &v, &v, info.clone(), info))
            }
        }
    }

    fn eval_table(&mut self, frame: &mut Frame, items: &[TableItem], line: u32) -> LuaResult<LuaValue> {
        let positional = items
            .iter()
            .filter(|item| matches!(item, TableItem::Positional(_)))
            .count();
        let table = self.create_table(positional, items.len() - positional)?;
        let Some(id) = table.as_table_id() else {
            return Ok(table);
        };

        let mut index = 1i64;
        for (i, item) in items.iter().enumerate() {
            match item {
                TableItem::Positional(expr) if i + 1 == items.len() && expr.is_multi() => {
                    let values = self.eval_multi(frame, expr)?;
                    if let Some(t) = self.get_table_mut(id) {
                        for value in values {
                            t.set_int(index, value);
                            index += 1;
                        }
                    }
                }
                TableItem::Positional(expr) => {
                    let value = self.eval(frame, expr)?;
                    if let Some(t) = self.get_table_mut(id) {
                        t.set_int(index, value);
                    }
                    index += 1;
                }
                TableItem::Keyed(key, value) => {
                    let k = self.eval(frame, key)?;
                    let v = self.eval(frame, value)?;
                    self.set_line(line);
                    self.table_set_raw(id, &k, v)?;
                }
            }
        }
        Ok(table)
    }

    /// Closure over the current frame (OP_CLOSURE)
    pub(super) fn make_closure(&mut self, frame: &mut Frame, chunk: &Rc<Chunk>) -> LuaResult<LuaValue> {
        let upvalues = chunk
            .upvalue_descs
            .iter()
            .map(|desc| {
                if desc.is_local {
                    frame.cell(desc.index)
                } else {
                    frame.upvalues[desc.index].clone()
                }
            })
            .collect();
        self.create_function(chunk.clone(), upvalues)
    }

    /// Variable description of `expr` for error messages (varinfo)
    pub(super) fn var_info(&self, frame: &Frame, expr: &Expr) -> Option<CallName> {
        match expr {
            Expr::Global(name) => Some(CallName::Global(name.clone())),
            Expr::Local(slot) => frame.chunk.locals.get(*slot).cloned().map(CallName::Local),
            Expr::Upvalue(index) => frame
                .chunk
                .upvalue_descs
                .get(*index)
                .map(|desc| CallName::Upvalue(desc.name.clone())),
            Expr::Index { key, .. } => match key.as_ref() {
                Expr::String(name) => Some(CallName::Field(name.clone())),
                _ => None,
            },
            Expr::Method { name, .. } => Some(CallName::Method(name.clone())),
            _ => None,
        }
    }
}
