// Protected invocation
//
// Calls run under a message handler that turns string errors into
// "message + stack traceback", converts other values through `__tostring`
// and replaces everything else with a placeholder. The working stack is the
// argument area: values pushed since the last call become its leading
// arguments, and on any failure the stack is left empty. Results stay
// rooted until the next call starts, so they survive pushes and explicit
// collections in between.

use lunar_vm::{CallContext, LuaError, LuaResult, LuaValue};
use tracing::{debug, trace, warn};

use crate::chunk::Chunk;
use crate::engine::Engine;
use crate::error::{FailureKind, FailureReport};

/// Message handler installed for every protected call
pub(crate) fn message_handler(l: &mut CallContext) -> LuaResult<usize> {
    let error = l.arg(1);
    let text = match &error {
        LuaValue::String(_) | LuaValue::Integer(_) | LuaValue::Float(_) => {
            let message = error.to_str_coerce().unwrap_or_default();
            // level 1 skips this handler's own frame
            l.vm().traceback(Some(&*message), 1)
        }
        _ if !l.vm().metamethod(&error, "__tostring").is_nil() => l.to_string(&error)?.to_string(),
        _ => "(no error message)".to_string(),
    };
    l.push_value(LuaValue::string_owned(text))?;
    Ok(1)
}

impl Engine {
    /// Run `chunk` with the pending values followed by `args`, returning
    /// exactly `expected` results (padded with nil or truncated)
    pub fn invoke(
        &mut self,
        chunk: &Chunk,
        args: Vec<LuaValue>,
        expected: usize,
    ) -> Result<Vec<LuaValue>, FailureReport> {
        let func = self.load(chunk)?;
        self.protected_call(func, args, expected)
    }

    /// Like `invoke`, but the results stay on the working stack (rooted)
    /// for `reference_top` or `pop`. Returns how many were left there.
    pub fn invoke_keep(
        &mut self,
        chunk: &Chunk,
        args: Vec<LuaValue>,
        expected: usize,
    ) -> Result<usize, FailureReport> {
        let results = self.invoke(chunk, args, expected)?;
        for value in results {
            self.vm.stack_push(value);
        }
        Ok(expected)
    }

    /// Call a function value, e.g. one recovered from the registry
    pub fn call(
        &mut self,
        func: &LuaValue,
        args: Vec<LuaValue>,
        expected: usize,
    ) -> Result<Vec<LuaValue>, FailureReport> {
        self.protected_call(func.clone(), args, expected)
    }

    /// Compile and run `source` in one step
    pub fn execute(&mut self, source: &str, expected: usize) -> crate::error::Result<Vec<LuaValue>> {
        let chunk = self.compile(source)?;
        Ok(self.invoke(&chunk, Vec::new(), expected)?)
    }

    /// Instantiate `chunk` as a function value
    pub fn load(&mut self, chunk: &Chunk) -> Result<LuaValue, FailureReport> {
        match self.vm.load_proto(chunk.proto.clone()) {
            Ok(func) => Ok(func),
            Err(status) => {
                self.vm.stack_truncate(0);
                Err(self.take_failure(status))
            }
        }
    }

    fn protected_call(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
        expected: usize,
    ) -> Result<Vec<LuaValue>, FailureReport> {
        // root the callee and every argument across the pre-call safe point
        let mut frame = self.vm.stack_split_off(0);
        frame.extend(args);
        let dead = std::iter::once(&func)
            .chain(&frame)
            .find(|v| !self.vm.is_live(v))
            .cloned();
        if let Some(dead) = dead
            && let Err(status) = self.vm.check_live(&dead)
        {
            return Err(self.fail(status));
        }
        self.vm.stack_push(func);
        for value in frame {
            self.vm.stack_push(value);
        }
        self.vm.clear_last_results();
        if let Err(status) = self.vm.check_gc() {
            return Err(self.fail(status));
        }

        let mut frame = self.vm.stack_split_off(0);
        let func = frame.remove(0);
        trace!(args = frame.len(), expected, "protected call");
        let handler = LuaValue::CFunction(message_handler);
        let results = match self.vm.pcall_with_handler(func, frame, Some(handler)) {
            Ok(results) => results,
            Err(status) => return Err(self.fail(status)),
        };

        // results stay rooted while a due cycle runs
        for value in results {
            self.vm.stack_push(value);
        }
        if let Err(status) = self.vm.check_gc() {
            return Err(self.fail(status));
        }
        let mut results = self.vm.stack_split_off(0);
        results.resize(expected, LuaValue::Nil);
        self.vm.set_last_results(&results);
        Ok(results)
    }

    fn fail(&mut self, status: LuaError) -> FailureReport {
        self.vm.stack_truncate(0);
        let report = self.take_failure(status);
        debug!(kind = %report.kind, message = %report.message, "protected call failed");
        if report.kind == FailureKind::Collector {
            warn!(error = %report.message, "finalizer failed during collection");
        }
        report
    }
}
