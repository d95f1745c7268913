// Tree-walking interpreter over the resolved syntax tree.
//
// Each Lua call gets a `Frame` holding one register per local slot. Slots
// that a nested closure captures hold a shared cell instead of a plain
// value; declaring such a local always creates a fresh cell, so every loop
// iteration gets its own variable.

mod arithmetic;
mod call;
mod expression;
pub(crate) mod metamethod;

use std::cell::RefCell;
use std::rc::Rc;

use crate::compiler::ast::{Block, Expr, Stat, StatKind};
use crate::lua_value::{Chunk, LuaValue, UpvalueCell, float_to_integer};
use crate::lua_vm::call_info::CallName;
use crate::lua_vm::execute::metamethod::var_suffix;
use crate::lua_vm::{LuaResult, LuaVM};

enum Register {
    Value(LuaValue),
    Cell(UpvalueCell),
}

/// Activation record of a running Lua function
pub(crate) struct Frame {
    chunk: Rc<Chunk>,
    registers: Vec<Register>,
    varargs: Vec<LuaValue>,
    upvalues: Vec<UpvalueCell>,
}

impl Frame {
    pub(crate) fn new(chunk: Rc<Chunk>, upvalues: Vec<UpvalueCell>, mut args: Vec<LuaValue>) -> Self {
        let varargs = if chunk.is_vararg && args.len() > chunk.param_count {
            args.split_off(chunk.param_count)
        } else {
            Vec::new()
        };
        let mut registers = Vec::with_capacity(chunk.slot_count());
        registers.resize_with(chunk.slot_count(), || Register::Value(LuaValue::Nil));
        let mut frame = Frame {
            chunk,
            registers,
            varargs,
            upvalues,
        };
        let mut args = args.into_iter();
        for slot in 0..frame.chunk.param_count {
            let value = args.next().unwrap_or_default();
            frame.declare(slot, value);
        }
        frame
    }

    /// Bring a local into scope with its initial value
    fn declare(&mut self, slot: usize, value: LuaValue) {
        self.registers[slot] = if self.chunk.captured[slot] {
            Register::Cell(Rc::new(RefCell::new(value)))
        } else {
            Register::Value(value)
        };
    }

    fn get(&self, slot: usize) -> LuaValue {
        match &self.registers[slot] {
            Register::Value(v) => v.clone(),
            Register::Cell(cell) => cell.borrow().clone(),
        }
    }

    fn set(&mut self, slot: usize, value: LuaValue) {
        match &mut self.registers[slot] {
            Register::Value(v) => *v = value,
            Register::Cell(cell) => *cell.borrow_mut() = value,
        }
    }

    /// Shared cell for `slot`, for a closure capturing it
    fn cell(&mut self, slot: usize) -> UpvalueCell {
        let register = &mut self.registers[slot];
        let cell = match register {
            Register::Cell(cell) => return cell.clone(),
            Register::Value(v) => Rc::new(RefCell::new(std::mem::take(v))),
        };
        *register = Register::Cell(cell.clone());
        cell
    }

    fn upvalue(&self, index: usize) -> LuaValue {
        self.upvalues[index].borrow().clone()
    }

    fn set_upvalue(&mut self, index: usize, value: LuaValue) {
        *self.upvalues[index].borrow_mut() = value;
    }
}

/// How a block finished
enum Flow {
    Normal,
    Break,
    Return(Vec<LuaValue>),
}

/// Resolved assignment target
enum Target {
    Local(usize),
    Upvalue(usize),
    Global(Rc<str>),
    Index {
        obj: LuaValue,
        key: LuaValue,
        info: Option<CallName>,
        line: u32,
    },
}

impl LuaVM {
    /// Run a function body to completion and collect its return values
    pub(crate) fn execute_body(&mut self, frame: &mut Frame) -> LuaResult<Vec<LuaValue>> {
        let chunk = frame.chunk.clone();
        match self.exec_block(frame, &chunk.body)? {
            Flow::Return(values) => Ok(values),
            Flow::Normal | Flow::Break => Ok(Vec::new()),
        }
    }

    fn exec_block(&mut self, frame: &mut Frame, block: &Block) -> LuaResult<Flow> {
        for stat in block {
            match self.exec_stat(frame, stat)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    /// Body of a loop; `None` to keep iterating
    fn exec_loop_body(&mut self, frame: &mut Frame, body: &Block) -> LuaResult<Option<Flow>> {
        match self.exec_block(frame, body)? {
            Flow::Normal => Ok(None),
            Flow::Break => Ok(Some(Flow::Normal)),
            flow @ Flow::Return(_) => Ok(Some(flow)),
        }
    }

    fn exec_stat(&mut self, frame: &mut Frame, stat: &Stat) -> LuaResult<Flow> {
        self.set_line(stat.line);
        match &stat.kind {
            StatKind::Call(expr) => {
                self.eval_multi(frame, expr)?;
            }
            StatKind::Local { slots, exprs } => {
                let values = self.eval_list(frame, exprs, Some(slots.len()))?;
                for (&slot, value) in slots.iter().zip(values) {
                    frame.declare(slot, value);
                }
            }
            StatKind::Assign { targets, exprs } => self.exec_assign(frame, targets, exprs)?,
            StatKind::LocalFunction { slot, func } => {
                frame.declare(*slot, LuaValue::Nil);
                let closure = self.make_closure(frame, func)?;
                frame.set(*slot, closure);
            }
            StatKind::Do(body) => return self.exec_block(frame, body),
            StatKind::While { cond, body } => {
                while self.eval(frame, cond)?.is_truthy() {
                    if let Some(flow) = self.exec_loop_body(frame, body)? {
                        return Ok(flow);
                    }
                }
            }
            StatKind::Repeat { body, cond } => loop {
                if let Some(flow) = self.exec_loop_body(frame, body)? {
                    return Ok(flow);
                }
                if self.eval(frame, cond)?.is_truthy() {
                    break;
                }
            },
            StatKind::If {
                branches,
                else_block,
            } => {
                for (cond, body) in branches {
                    if self.eval(frame, cond)?.is_truthy() {
                        return self.exec_block(frame, body);
                    }
                }
                if let Some(body) = else_block {
                    return self.exec_block(frame, body);
                }
            }
            StatKind::NumericFor {
                slot,
                start,
                limit,
                step,
                body,
            } => {
                let start = self.eval(frame, start)?;
                let limit = self.eval(frame, limit)?;
                let step = match step {
                    Some(step) => self.eval(frame, step)?,
                    None => LuaValue::Integer(1),
                };
                self.set_line(stat.line);
                return self.exec_numeric_for(frame, *slot, start, limit, step, body);
            }
            StatKind::GenericFor { slots, exprs, body } => {
                let mut state = self.eval_list(frame, exprs, Some(3))?.into_iter();
                let iterator = state.next().unwrap_or_default();
                let invariant = state.next().unwrap_or_default();
                let mut control = state.next().unwrap_or_default();
                loop {
                    self.set_line(stat.line);
                    let results = self.call_named(
                        iterator.clone(),
                        vec![invariant.clone(), control.clone()],
                        Some(CallName::ForIterator),
                    )?;
                    let first = results.first().cloned().unwrap_or_default();
                    if first.is_nil() {
                        break;
                    }
                    control = first;
                    let mut results = results.into_iter();
                    for &slot in slots {
                        frame.declare(slot, results.next().unwrap_or_default());
                    }
                    if let Some(flow) = self.exec_loop_body(frame, body)? {
                        return Ok(flow);
                    }
                }
            }
            StatKind::Return(exprs) => {
                let values = self.eval_list(frame, exprs, None)?;
                return Ok(Flow::Return(values));
            }
            StatKind::Break => return Ok(Flow::Break),
        }
        Ok(Flow::Normal)
    }

    fn exec_assign(&mut self, frame: &mut Frame, targets: &[Expr], exprs: &[Expr]) -> LuaResult<()> {
        let mut resolved = Vec::with_capacity(targets.len());
        for target in targets {
            resolved.push(match target {
                Expr::Local(slot) => Target::Local(*slot),
                Expr::Upvalue(index) => Target::Upvalue(*index),
                Expr::Global(name) => Target::Global(name.clone()),
                Expr::Index { obj, key, line } => Target::Index {
                    info: self.var_info(frame, obj),
                    obj: self.eval(frame, obj)?,
                    key: self.eval(frame, key)?,
                    line: *line,
                },
                _ => return Err(self.rt_error("cannot assign to this expression")),
            });
        }

        let values = self.eval_list(frame, exprs, Some(targets.len()))?;
        for (target, value) in resolved.into_iter().zip(values) {
            match target {
                Target::Local(slot) => frame.set(slot, value),
                Target::Upvalue(index) => frame.set_upvalue(index, value),
                Target::Global(name) => {
                    let globals = LuaValue::Table(self.global);
                    self.try_set_index(&globals, &LuaValue::String(name), value)?;
                }
                Target::Index {
                    obj,
                    key,
                    info,
                    line,
                } => {
                    self.set_line(line);
                    if !self.try_set_index(&obj, &key, value)? {
                        let message = format!(
                            "attempt to index a {} value{}",
                            self.type_name_meta(&obj),
                            var_suffix(info)
                        );
                        return Err(self.rt_error(message));
                    }
                }
            }
        }
        Ok(())
    }

    /// `for v = start, limit, step` (forprep/forloop in lvm.c)
    fn exec_numeric_for(
        &mut self,
        frame: &mut Frame,
        slot: usize,
        start: LuaValue,
        limit: LuaValue,
        step: LuaValue,
        body: &Block,
    ) -> LuaResult<Flow> {
        if let (LuaValue::Integer(init), LuaValue::Integer(step)) = (&start, &step) {
            let (init, step) = (*init, *step);
            if step == 0 {
                return Err(self.rt_error("'for' step is zero"));
            }
            let Some(limit) = self.for_limit(&limit, init, step)? else {
                return Ok(Flow::Normal);
            };
            // iteration count as an unsigned value, so it cannot overflow
            let mut count = if step > 0 {
                (limit as u64).wrapping_sub(init as u64) / step as u64
            } else {
                (init as u64).wrapping_sub(limit as u64) / ((-(step + 1)) as u64 + 1)
            };
            let mut index = init;
            loop {
                frame.declare(slot, LuaValue::Integer(index));
                if let Some(flow) = self.exec_loop_body(frame, body)? {
                    return Ok(flow);
                }
                if count == 0 {
                    return Ok(Flow::Normal);
                }
                count -= 1;
                index = index.wrapping_add(step);
            }
        }

        let Some(init) = start.as_number() else {
            return Err(self.rt_error("'for' initial value must be a number"));
        };
        let Some(limit) = limit.as_number() else {
            return Err(self.rt_error("'for' limit must be a number"));
        };
        let Some(step) = step.as_number() else {
            return Err(self.rt_error("'for' step must be a number"));
        };
        if step == 0.0 {
            return Err(self.rt_error("'for' step is zero"));
        }
        let mut index = init;
        while if step > 0.0 { index <= limit } else { index >= limit } {
            frame.declare(slot, LuaValue::Float(index));
            if let Some(flow) = self.exec_loop_body(frame, body)? {
                return Ok(flow);
            }
            index += step;
        }
        Ok(Flow::Normal)
    }

    /// Integer loop limit (forlimit); `None` when the loop must not run
    fn for_limit(&mut self, limit: &LuaValue, init: i64, step: i64) -> LuaResult<Option<i64>> {
        let limit = match limit {
            LuaValue::Integer(i) => *i,
            LuaValue::Float(f) => {
                let f = if step < 0 { f.ceil() } else { f.floor() };
                match float_to_integer(f) {
                    Some(i) => i,
                    None if f.is_nan() => return Ok(None),
                    None if f > 0.0 => {
                        if step < 0 {
                            return Ok(None);
                        }
                        i64::MAX
                    }
                    None => {
                        if step > 0 {
                            return Ok(None);
                        }
                        i64::MIN
                    }
                }
            }
            _ => return Err(self.rt_error("'for' limit must be a number")),
        };
        let skip = if step > 0 { init > limit } else { init < limit };
        Ok(if skip { None } else { Some(limit) })
    }
}
