// Operations that fall back to metamethods (ltm.c / lvm.c).
//
// The `try_*` functions return `Ok(None)` when the operands are invalid and
// no metamethod applies, leaving the error message to the caller, which
// knows the variable names involved.

use crate::compiler::parser::BinaryOperator;
use crate::lua_value::LuaValue;
use crate::lua_vm::call_info::CallName;
use crate::lua_vm::execute::arithmetic::{self, ArithError};
use crate::lua_vm::lua_limits::MAXTAGLOOP;
use crate::lua_vm::{LuaResult, LuaVM};

/// ` (global 'x')` suffix for error messages
pub(crate) fn var_suffix(info: Option<CallName>) -> String {
    match info {
        Some(name) => format!(" ({})", name.describe()),
        None => String::new(),
    }
}

impl LuaVM {
    /// Call a metamethod and keep its first result
    pub(crate) fn call_metamethod(
        &mut self,
        handler: LuaValue,
        args: Vec<LuaValue>,
        event: &'static str,
    ) -> LuaResult<LuaValue> {
        let results = self.call_named(handler, args, Some(CallName::Metamethod(event)))?;
        Ok(results.into_iter().next().unwrap_or_default())
    }

    /// Binary metamethod of either operand, first operand first
    fn binary_metamethod(&self, a: &LuaValue, b: &LuaValue, event: &str) -> LuaValue {
        let handler = self.metamethod(a, event);
        if handler.is_nil() {
            self.metamethod(b, event)
        } else {
            handler
        }
    }

    // ===== Arithmetic =====

    pub(crate) fn try_arith(
        &mut self,
        op: BinaryOperator,
        a: &LuaValue,
        b: &LuaValue,
    ) -> LuaResult<Option<LuaValue>> {
        match arithmetic::arith(op, a, b) {
            Ok(v) => Ok(Some(v)),
            Err(ArithError::DivByZero(message)) => Err(self.rt_error(message)),
            Err(_) => {
                let event = op.event();
                let handler = self.binary_metamethod(a, b, event);
                if handler.is_nil() {
                    return Ok(None);
                }
                self.call_metamethod(handler, vec![a.clone(), b.clone()], event)
                    .map(Some)
            }
        }
    }

    pub(crate) fn try_unm(&mut self, v: &LuaValue) -> LuaResult<Option<LuaValue>> {
        if let Ok(result) = arithmetic::unm(v) {
            return Ok(Some(result));
        }
        let handler = self.metamethod(v, "__unm");
        if handler.is_nil() {
            return Ok(None);
        }
        self.call_metamethod(handler, vec![v.clone(), v.clone()], "__unm")
            .map(Some)
    }

    pub(crate) fn try_bnot(&mut self, v: &LuaValue) -> LuaResult<Option<LuaValue>> {
        if let Ok(result) = arithmetic::bnot(v) {
            return Ok(Some(result));
        }
        let handler = self.metamethod(v, "__bnot");
        if handler.is_nil() {
            return Ok(None);
        }
        self.call_metamethod(handler, vec![v.clone(), v.clone()], "__bnot")
            .map(Some)
    }

    /// Error for an operator whose operands were rejected (luaG_opinterror)
    pub(crate) fn op_error(
        &mut self,
        op: BinaryOperator,
        a: &LuaValue,
        b: &LuaValue,
        info_a: Option<CallName>,
        info_b: Option<CallName>,
    ) -> crate::lua_vm::LuaError {
        if op == BinaryOperator::OpConcat {
            let a_ok = matches!(
                a,
                LuaValue::String(_) | LuaValue::Integer(_) | LuaValue::Float(_)
            );
            let (bad, info) = if a_ok { (b, info_b) } else { (a, info_a) };
            let message = format!(
                "attempt to concatenate a {} value{}",
                self.type_name_meta(bad),
                var_suffix(info)
            );
            return self.rt_error(message);
        }

        if op.is_bitwise() && a.to_number().is_some() && b.to_number().is_some() {
            return self.rt_error("number has no integer representation");
        }
        let what = if op.is_bitwise() {
            "perform bitwise operation on"
        } else {
            "perform arithmetic on"
        };
        let (bad, info) = if a.to_number().is_none() {
            (a, info_a)
        } else {
            (b, info_b)
        };
        let message = format!(
            "attempt to {} a {} value{}",
            what,
            self.type_name_meta(bad),
            var_suffix(info)
        );
        self.rt_error(message)
    }

    // ===== Concatenation =====

    pub(crate) fn try_concat(&mut self, a: &LuaValue, b: &LuaValue) -> LuaResult<Option<LuaValue>> {
        if let (Some(x), Some(y)) = (a.to_str_coerce(), b.to_str_coerce()) {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(&x);
            s.push_str(&y);
            return Ok(Some(LuaValue::string_owned(s)));
        }
        let handler = self.binary_metamethod(a, b, "__concat");
        if handler.is_nil() {
            return Ok(None);
        }
        self.call_metamethod(handler, vec![a.clone(), b.clone()], "__concat")
            .map(Some)
    }

    // ===== Comparison =====

    /// `==` with `__eq` for tables and userdata
    pub fn values_equal(&mut self, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
        if a.raw_equal(b) {
            return Ok(true);
        }
        let comparable = matches!(
            (a, b),
            (LuaValue::Table(_), LuaValue::Table(_)) | (LuaValue::Userdata(_), LuaValue::Userdata(_))
        );
        if !comparable {
            return Ok(false);
        }
        let handler = self.binary_metamethod(a, b, "__eq");
        if handler.is_nil() {
            return Ok(false);
        }
        let result = self.call_metamethod(handler, vec![a.clone(), b.clone()], "__eq")?;
        Ok(result.is_truthy())
    }

    /// `a < b` (or `a <= b` with `or_equal`) with `__lt` / `__le`
    pub(crate) fn try_less(
        &mut self,
        a: &LuaValue,
        b: &LuaValue,
        or_equal: bool,
    ) -> LuaResult<Option<bool>> {
        let raw = if or_equal {
            arithmetic::less_equal(a, b)
        } else {
            arithmetic::less_than(a, b)
        };
        if raw.is_some() {
            return Ok(raw);
        }
        let event = if or_equal { "__le" } else { "__lt" };
        let handler = self.binary_metamethod(a, b, event);
        if handler.is_nil() {
            return Ok(None);
        }
        let result = self.call_metamethod(handler, vec![a.clone(), b.clone()], event)?;
        Ok(Some(result.is_truthy()))
    }

    pub(crate) fn compare_error(&mut self, a: &LuaValue, b: &LuaValue) -> crate::lua_vm::LuaError {
        let t1 = self.type_name_meta(a);
        let t2 = self.type_name_meta(b);
        if t1 == t2 {
            self.rt_error(format!("attempt to compare two {} values", t1))
        } else {
            self.rt_error(format!("attempt to compare {} with {}", t1, t2))
        }
    }

    // ===== Length =====

    pub(crate) fn try_len(&mut self, v: &LuaValue) -> LuaResult<Option<LuaValue>> {
        if let LuaValue::String(s) = v {
            return Ok(Some(LuaValue::Integer(s.len() as i64)));
        }
        let handler = self.metamethod(v, "__len");
        if !handler.is_nil() {
            return self
                .call_metamethod(handler, vec![v.clone()], "__len")
                .map(Some);
        }
        match v.as_table_id().and_then(|id| self.object_pool.get_table(id)) {
            Some(table) => Ok(Some(LuaValue::Integer(table.len() as i64))),
            None => Ok(None),
        }
    }

    // ===== Indexing =====

    /// `obj[key]` following `__index` chains (luaV_finishget).
    /// `None` when `obj` itself cannot be indexed.
    pub(crate) fn try_index(&mut self, obj: &LuaValue, key: &LuaValue) -> LuaResult<Option<LuaValue>> {
        let mut current = obj.clone();
        for depth in 0..MAXTAGLOOP {
            let handler = match &current {
                LuaValue::Table(id) => {
                    let Some(table) = self.object_pool.get_table(*id) else {
                        return Ok(Some(LuaValue::Nil));
                    };
                    let value = table.raw_get(key);
                    if !value.is_nil() {
                        return Ok(Some(value));
                    }
                    let handler = match table.metatable() {
                        Some(mt) => self.table_get_str(mt, "__index"),
                        None => LuaValue::Nil,
                    };
                    if handler.is_nil() {
                        return Ok(Some(LuaValue::Nil));
                    }
                    handler
                }
                _ => {
                    let handler = self.metamethod(&current, "__index");
                    if handler.is_nil() {
                        if depth == 0 {
                            return Ok(None);
                        }
                        let message =
                            format!("attempt to index a {} value", self.type_name_meta(&current));
                        return Err(self.rt_error(message));
                    }
                    handler
                }
            };
            if handler.is_function() {
                return self
                    .call_metamethod(handler, vec![current, key.clone()], "__index")
                    .map(Some);
            }
            current = handler;
        }
        Err(self.rt_error("'__index' chain too long; possible loop"))
    }

    /// `obj[key]` for native code; indexing a non-indexable value is an error
    pub fn index_value(&mut self, obj: &LuaValue, key: &LuaValue) -> LuaResult<LuaValue> {
        match self.try_index(obj, key)? {
            Some(value) => Ok(value),
            None => {
                let message = format!("attempt to index a {} value", self.type_name_meta(obj));
                Err(self.rt_error(message))
            }
        }
    }

    /// `obj[key] = value` following `__newindex` chains (luaV_finishset).
    /// False when `obj` itself cannot be indexed.
    pub(crate) fn try_set_index(
        &mut self,
        obj: &LuaValue,
        key: &LuaValue,
        value: LuaValue,
    ) -> LuaResult<bool> {
        let mut current = obj.clone();
        for depth in 0..MAXTAGLOOP {
            let handler = match &current {
                LuaValue::Table(id) => {
                    let id = *id;
                    let handler = match self.object_pool.get_table(id) {
                        Some(table) if table.raw_get(key).is_nil() => match table.metatable() {
                            Some(mt) => self.table_get_str(mt, "__newindex"),
                            None => LuaValue::Nil,
                        },
                        _ => LuaValue::Nil,
                    };
                    if handler.is_nil() {
                        self.table_set_raw(id, key, value)?;
                        return Ok(true);
                    }
                    handler
                }
                _ => {
                    let handler = self.metamethod(&current, "__newindex");
                    if handler.is_nil() {
                        if depth == 0 {
                            return Ok(false);
                        }
                        let message =
                            format!("attempt to index a {} value", self.type_name_meta(&current));
                        return Err(self.rt_error(message));
                    }
                    handler
                }
            };
            if handler.is_function() {
                self.call_metamethod(handler, vec![current, key.clone(), value], "__newindex")?;
                return Ok(true);
            }
            current = handler;
        }
        Err(self.rt_error("'__newindex' chain too long; possible loop"))
    }

    /// `obj[key] = value` for native code
    pub fn set_index(&mut self, obj: &LuaValue, key: &LuaValue, value: LuaValue) -> LuaResult<()> {
        if self.try_set_index(obj, key, value)? {
            Ok(())
        } else {
            let message = format!("attempt to index a {} value", self.type_name_meta(obj));
            Err(self.rt_error(message))
        }
    }
}
