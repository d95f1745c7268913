//! Native call context - what a Rust function sees when Lua calls it.
//!
//! Replaces the shared value stack of the C API: arguments come in as an
//! explicit vector, results are pushed onto a separate one, and the VM is
//! reachable for everything else (tables, globals, metatables, errors).

use crate::gc::TableId;
use crate::lua_value::{LuaString, LuaValue, LuaValueKind};
use crate::lua_vm::call_info::CallName;
use crate::lua_vm::{LuaError, LuaResult, LuaVM};

pub struct CallContext<'a> {
    pub(crate) vm: &'a mut LuaVM,
    args: Vec<LuaValue>,
    results: Vec<LuaValue>,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(vm: &'a mut LuaVM, args: Vec<LuaValue>) -> Self {
        CallContext {
            vm,
            args,
            results: Vec::new(),
        }
    }

    /// Last `count` pushed values, in push order
    pub(crate) fn into_results(mut self, count: usize) -> Vec<LuaValue> {
        let start = self.results.len().saturating_sub(count);
        self.results.split_off(start)
    }

    #[inline]
    pub fn vm(&mut self) -> &mut LuaVM {
        self.vm
    }

    // ===== Arguments =====

    /// 1-based argument, `None` when absent
    #[inline]
    pub fn get_arg(&self, index: usize) -> Option<LuaValue> {
        index.checked_sub(1).and_then(|i| self.args.get(i)).cloned()
    }

    /// 1-based argument, nil when absent
    #[inline]
    pub fn arg(&self, index: usize) -> LuaValue {
        self.get_arg(index).unwrap_or_default()
    }

    #[inline]
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    #[inline]
    pub fn get_args(&self) -> &[LuaValue] {
        &self.args
    }

    /// Move the arguments out, e.g. to forward them to another call
    pub fn take_args(&mut self) -> Vec<LuaValue> {
        std::mem::take(&mut self.args)
    }

    // ===== Results =====

    #[inline]
    pub fn push_value(&mut self, value: LuaValue) -> LuaResult<()> {
        self.results.push(value);
        Ok(())
    }

    pub fn push_values(&mut self, values: impl IntoIterator<Item = LuaValue>) -> usize {
        let before = self.results.len();
        self.results.extend(values);
        self.results.len() - before
    }

    // ===== Errors =====

    /// Error with the position of the calling Lua code (luaL_error)
    pub fn error(&mut self, message: impl Into<String>) -> LuaError {
        let message = message.into();
        let located = match self.vm.where_(1) {
            Some(location) => format!("{} {}", location, message),
            None => message,
        };
        self.vm.error(located)
    }

    /// `bad argument #n to 'name' (msg)` (luaL_argerror)
    pub fn arg_error(&mut self, index: usize, message: &str) -> LuaError {
        let name = self.vm.current_call_name();
        let mut index = index;
        if let Some(CallName::Method(method)) = &name {
            index -= 1;
            if index == 0 {
                return self.error(format!("calling '{}' on bad self ({})", method, message));
            }
        }
        let fname = name.as_ref().map_or("?", |n| n.name()).to_string();
        self.error(format!("bad argument #{} to '{}' ({})", index, fname, message))
    }

    /// `<expected> expected, got <type>` (luaL_typeerror)
    pub fn type_error(&mut self, index: usize, expected: &str) -> LuaError {
        let got = match self.get_arg(index) {
            None => "no value".to_string(),
            Some(value) => self.vm.type_name_meta(&value),
        };
        self.arg_error(index, &format!("{} expected, got {}", expected, got))
    }

    // ===== Checked accessors (luaL_check*) =====

    pub fn check_any(&mut self, index: usize) -> LuaResult<LuaValue> {
        match self.get_arg(index) {
            Some(value) => Ok(value),
            None => Err(self.arg_error(index, "value expected")),
        }
    }

    /// Number argument keeping its integer/float subtype; numeric strings convert
    pub fn check_number(&mut self, index: usize) -> LuaResult<LuaValue> {
        match self.arg(index).to_number() {
            Some(n) => Ok(n),
            None => Err(self.type_error(index, "number")),
        }
    }

    pub fn check_float(&mut self, index: usize) -> LuaResult<f64> {
        let n = self.check_number(index)?;
        Ok(n.to_float().unwrap_or(f64::NAN))
    }

    pub fn check_integer(&mut self, index: usize) -> LuaResult<i64> {
        let value = self.arg(index);
        if let Some(i) = value.to_integer() {
            return Ok(i);
        }
        if value.to_number().is_some() {
            Err(self.arg_error(index, "number has no integer representation"))
        } else {
            Err(self.type_error(index, "number"))
        }
    }

    pub fn opt_integer(&mut self, index: usize, default: i64) -> LuaResult<i64> {
        if self.arg(index).is_nil() {
            Ok(default)
        } else {
            self.check_integer(index)
        }
    }

    /// String argument; numbers are converted (lua_tolstring)
    pub fn check_string(&mut self, index: usize) -> LuaResult<LuaString> {
        match self.arg(index).to_str_coerce() {
            Some(s) => Ok(s),
            None => Err(self.type_error(index, "string")),
        }
    }

    pub fn check_table(&mut self, index: usize) -> LuaResult<TableId> {
        match self.arg(index).as_table_id() {
            Some(id) => Ok(id),
            None => Err(self.type_error(index, "table")),
        }
    }

    /// Argument must be of `kind` (luaL_checktype)
    pub fn check_kind(&mut self, index: usize, kind: LuaValueKind, expected: &str) -> LuaResult<()> {
        if self.get_arg(index).is_some_and(|v| v.kind() == kind) {
            Ok(())
        } else {
            Err(self.type_error(index, expected))
        }
    }

    // ===== Delegated to the VM =====

    pub fn call(&mut self, func: LuaValue, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
        self.vm.call_function(func, args)
    }

    pub fn to_string(&mut self, value: &LuaValue) -> LuaResult<LuaString> {
        self.vm.tostring(value)
    }

    pub fn create_table(&mut self, narr: usize, nrec: usize) -> LuaResult<LuaValue> {
        self.vm.create_table(narr, nrec)
    }
}
