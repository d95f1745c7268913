// Function calls: Lua closures, native functions and `__call` (ldo.c).
//
// A failing call leaves its CallInfo on the stack so a message handler can
// still walk the frames; whoever catches the error truncates the stack.

use std::rc::Rc;

use crate::lua_value::{CFunction, Chunk, LuaValue, UpvalueCell};
use crate::lua_vm::call_info::{CallInfo, CallName};
use crate::lua_vm::execute::Frame;
use crate::lua_vm::execute::metamethod::var_suffix;
use crate::lua_vm::lua_limits::MAXTAGLOOP;
use crate::lua_vm::{CallContext, LuaResult, LuaVM};

impl LuaVM {
    /// Call any callable value and collect all of its results
    pub fn call_function(&mut self, func: LuaValue, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
        self.call_named(func, args, None)
    }

    /// Call with the name the call site used, for tracebacks and errors
    pub(crate) fn call_named(
        &mut self,
        func: LuaValue,
        mut args: Vec<LuaValue>,
        name: Option<CallName>,
    ) -> LuaResult<Vec<LuaValue>> {
        if self.call_stack.len() >= self.option.max_call_depth + self.handler_depth {
            return Err(self.rt_error("stack overflow"));
        }

        let mut func = func;
        for _ in 0..MAXTAGLOOP {
            match &func {
                LuaValue::Function(id) => {
                    let Some(closure) = self.object_pool.get_function(*id) else {
                        return Err(self.rt_error("attempt to call a collected function"));
                    };
                    let chunk = closure.chunk.clone();
                    let upvalues = closure.upvalues.clone();
                    return self.call_lua(chunk, upvalues, args, name);
                }
                LuaValue::CFunction(f) => {
                    let f = *f;
                    return self.call_native(f, args, name);
                }
                _ => {
                    let handler = self.metamethod(&func, "__call");
                    if handler.is_nil() {
                        let message = format!(
                            "attempt to call a {} value{}",
                            self.type_name_meta(&func),
                            var_suffix(name)
                        );
                        return Err(self.rt_error(message));
                    }
                    args.insert(0, func);
                    func = handler;
                }
            }
        }
        Err(self.rt_error("'__call' chain too long; possible loop"))
    }

    fn call_lua(
        &mut self,
        chunk: Rc<Chunk>,
        upvalues: Vec<UpvalueCell>,
        args: Vec<LuaValue>,
        name: Option<CallName>,
    ) -> LuaResult<Vec<LuaValue>> {
        self.call_stack.push(CallInfo::lua(chunk.clone(), name));
        let mut frame = Frame::new(chunk, upvalues, args);
        let results = self.execute_body(&mut frame)?;
        self.call_stack.pop();
        Ok(results)
    }

    fn call_native(
        &mut self,
        f: CFunction,
        args: Vec<LuaValue>,
        name: Option<CallName>,
    ) -> LuaResult<Vec<LuaValue>> {
        self.call_stack.push(CallInfo::native(name));
        let mut ctx = CallContext::new(self, args);
        let count = f(&mut ctx)?;
        let results = ctx.into_results(count);
        self.call_stack.pop();
        Ok(results)
    }
}
