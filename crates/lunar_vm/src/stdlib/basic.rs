// Basic library (_G global functions)
// Implements: print, type, tostring, tonumber, error, assert, pcall, xpcall,
// select, rawget, rawset, rawequal, rawlen, setmetatable, getmetatable,
// pairs, ipairs, next, collectgarbage, _G, _VERSION

use crate::compiler::str_to_number;
use crate::lib_registry::LibraryModule;
use crate::lua_value::{LuaValue, LuaValueKind};
use crate::lua_vm::{CallContext, CallName, LuaResult};

pub fn create_basic_lib() -> LibraryModule {
    crate::lib_module!("_G", {
        "print" => lua_print,
        "type" => lua_type,
        "tostring" => lua_tostring,
        "tonumber" => lua_tonumber,
        "error" => lua_error,
        "assert" => lua_assert,
        "pcall" => lua_pcall,
        "xpcall" => lua_xpcall,
        "select" => lua_select,
        "rawget" => lua_rawget,
        "rawset" => lua_rawset,
        "rawequal" => lua_rawequal,
        "rawlen" => lua_rawlen,
        "setmetatable" => lua_setmetatable,
        "getmetatable" => lua_getmetatable,
        "pairs" => lua_pairs,
        "ipairs" => lua_ipairs,
        "next" => lua_next,
        "collectgarbage" => lua_collectgarbage,
    })
    .with_value("_G", |vm| Ok(LuaValue::Table(vm.globals())))
    .with_value("_VERSION", |_vm| Ok(LuaValue::string("Lua 5.4")))
}

/// print(...) - Write the arguments, tab separated, to the VM output
fn lua_print(l: &mut CallContext) -> LuaResult<usize> {
    let mut line = String::new();
    for (i, value) in l.take_args().iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        line.push_str(&l.to_string(value)?);
    }
    line.push('\n');
    l.vm.write_output(&line)?;
    Ok(0)
}

fn lua_type(l: &mut CallContext) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    l.push_value(LuaValue::string(value.type_name()))?;
    Ok(1)
}

fn lua_tostring(l: &mut CallContext) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    let s = l.to_string(&value)?;
    l.push_value(LuaValue::String(s))?;
    Ok(1)
}

/// tonumber(e [, base])
fn lua_tonumber(l: &mut CallContext) -> LuaResult<usize> {
    if l.arg(2).is_nil() {
        let value = l.check_any(1)?;
        let result = match &value {
            LuaValue::Integer(_) | LuaValue::Float(_) => value.clone(),
            LuaValue::String(s) => str_to_number(s).unwrap_or_default(),
            _ => LuaValue::Nil,
        };
        l.push_value(result)?;
        return Ok(1);
    }

    let base = l.check_integer(2)?;
    l.check_kind(1, LuaValueKind::String, "string")?;
    if !(2..=36).contains(&base) {
        return Err(l.arg_error(2, "base out of range"));
    }
    let text = l.check_string(1)?;
    let result = parse_in_base(&text, base as u32).map_or(LuaValue::Nil, LuaValue::Integer);
    l.push_value(result)?;
    Ok(1)
}

/// Integer numeral in `base`; wraps around on overflow (luaL_tonumber)
fn parse_in_base(text: &str, base: u32) -> Option<i64> {
    let text = text.trim_matches(|c: char| c.is_ascii_whitespace());
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() {
        return None;
    }
    let mut n: i64 = 0;
    for c in digits.chars() {
        let digit = c.to_digit(base)?;
        n = n.wrapping_mul(base as i64).wrapping_add(digit as i64);
    }
    Some(if negative { n.wrapping_neg() } else { n })
}

/// error(message [, level])
fn lua_error(l: &mut CallContext) -> LuaResult<usize> {
    let level = l.opt_integer(2, 1)?;
    let value = l.arg(1);
    if let LuaValue::String(message) = &value
        && level > 0
        && let Some(location) = l.vm.where_(level as usize)
    {
        let located = format!("{} {}", location, message);
        return Err(l.vm.error(located));
    }
    Err(l.vm.error_with_object(value))
}

fn lua_assert(l: &mut CallContext) -> LuaResult<usize> {
    let condition = l.check_any(1)?;
    if condition.is_truthy() {
        let args = l.take_args();
        return Ok(l.push_values(args));
    }
    match l.get_arg(2) {
        Some(message) => Err(l.vm.error_with_object(message)),
        None => Err(l.error("assertion failed!")),
    }
}

/// pcall(f, ...) - Catch every error raised by `f`
fn lua_pcall(l: &mut CallContext) -> LuaResult<usize> {
    l.check_any(1)?;
    let mut args = l.take_args();
    let func = args.remove(0);
    let base = l.vm.call_stack.len();
    match l.vm.call_function(func, args) {
        Ok(results) => {
            l.push_value(LuaValue::Boolean(true))?;
            Ok(1 + l.push_values(results))
        }
        Err(_) => {
            l.vm.call_stack.truncate(base);
            let error = l.vm.take_error_object();
            l.push_value(LuaValue::Boolean(false))?;
            l.push_value(error)?;
            Ok(2)
        }
    }
}

/// xpcall(f, msgh, ...) - Like pcall, with `msgh` applied to runtime errors
fn lua_xpcall(l: &mut CallContext) -> LuaResult<usize> {
    l.check_kind(2, LuaValueKind::Function, "function")?;
    let mut args = l.take_args();
    let func = args.remove(0);
    let handler = args.remove(0);
    match l.vm.pcall_with_handler(func, args, Some(handler)) {
        Ok(results) => {
            l.push_value(LuaValue::Boolean(true))?;
            Ok(1 + l.push_values(results))
        }
        Err(_) => {
            let error = l.vm.take_error_object();
            l.push_value(LuaValue::Boolean(false))?;
            l.push_value(error)?;
            Ok(2)
        }
    }
}

fn lua_select(l: &mut CallContext) -> LuaResult<usize> {
    let top = l.arg_count() as i64;
    if let LuaValue::String(s) = l.arg(1)
        && &*s == "#"
    {
        l.push_value(LuaValue::Integer(top - 1))?;
        return Ok(1);
    }
    let mut n = l.check_integer(1)?;
    if n < 0 {
        n += top;
    } else if n > top {
        n = top;
    }
    if n < 1 {
        return Err(l.arg_error(1, "index out of range"));
    }
    let args = l.take_args();
    Ok(l.push_values(args.into_iter().skip(n as usize)))
}

fn lua_rawget(l: &mut CallContext) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let key = l.check_any(2)?;
    let value = l.vm.table_get_raw(&LuaValue::Table(table), &key);
    l.push_value(value)?;
    Ok(1)
}

fn lua_rawset(l: &mut CallContext) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let key = l.check_any(2)?;
    let value = l.check_any(3)?;
    l.vm.table_set_raw(table, &key, value)?;
    l.push_value(LuaValue::Table(table))?;
    Ok(1)
}

fn lua_rawequal(l: &mut CallContext) -> LuaResult<usize> {
    let a = l.check_any(1)?;
    let b = l.check_any(2)?;
    l.push_value(LuaValue::Boolean(a.raw_equal(&b)))?;
    Ok(1)
}

fn lua_rawlen(l: &mut CallContext) -> LuaResult<usize> {
    let len = match l.arg(1) {
        LuaValue::String(s) => s.len(),
        LuaValue::Table(id) => l.vm.get_table(id).map_or(0, |t| t.len()),
        _ => return Err(l.arg_error(1, "table or string expected")),
    };
    l.push_value(LuaValue::Integer(len as i64))?;
    Ok(1)
}

fn lua_setmetatable(l: &mut CallContext) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let metatable = match l.arg(2) {
        LuaValue::Nil => None,
        LuaValue::Table(id) => Some(id),
        _ => return Err(l.type_error(2, "nil or table")),
    };
    let target = LuaValue::Table(table);
    if !l.vm.metamethod(&target, "__metatable").is_nil() {
        return Err(l.error("cannot change a protected metatable"));
    }
    l.vm.set_metatable(&target, metatable)?;
    l.push_value(target)?;
    Ok(1)
}

fn lua_getmetatable(l: &mut CallContext) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    let result = match l.vm.get_metatable(&value) {
        None => LuaValue::Nil,
        Some(mt) => {
            let protected = l.vm.table_get_str(mt, "__metatable");
            if protected.is_nil() {
                LuaValue::Table(mt)
            } else {
                protected
            }
        }
    };
    l.push_value(result)?;
    Ok(1)
}

/// pairs(t) - `__pairs` if present, otherwise next, t, nil
fn lua_pairs(l: &mut CallContext) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    let handler = l.vm.metamethod(&value, "__pairs");
    if !handler.is_nil() {
        let results = l
            .vm
            .call_named(handler, vec![value], Some(CallName::Metamethod("__pairs")))?;
        let mut results = results.into_iter();
        let triple = [
            results.next().unwrap_or_default(),
            results.next().unwrap_or_default(),
            results.next().unwrap_or_default(),
        ];
        return Ok(l.push_values(triple));
    }
    if value.as_table_id().is_none() {
        return Err(l.type_error(1, "table"));
    }
    l.push_value(LuaValue::cfunction(lua_next))?;
    l.push_value(value)?;
    l.push_value(LuaValue::Nil)?;
    Ok(3)
}

fn ipairs_aux(l: &mut CallContext) -> LuaResult<usize> {
    let i = l.check_integer(2)?.wrapping_add(1);
    let table = l.arg(1);
    let value = l.vm.index_value(&table, &LuaValue::Integer(i))?;
    if value.is_nil() {
        l.push_value(LuaValue::Nil)?;
        return Ok(1);
    }
    l.push_value(LuaValue::Integer(i))?;
    l.push_value(value)?;
    Ok(2)
}

fn lua_ipairs(l: &mut CallContext) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    l.push_value(LuaValue::cfunction(ipairs_aux))?;
    l.push_value(value)?;
    l.push_value(LuaValue::Integer(0))?;
    Ok(3)
}

fn lua_next(l: &mut CallContext) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let key = l.arg(2);
    let entry = match l.vm.get_table(table) {
        Some(t) => t.next(&key),
        None => Ok(None),
    };
    match entry {
        Ok(Some((k, v))) => {
            l.push_value(k)?;
            l.push_value(v)?;
            Ok(2)
        }
        Ok(None) => {
            l.push_value(LuaValue::Nil)?;
            Ok(1)
        }
        Err(()) => Err(l.error("invalid key to 'next'")),
    }
}

/// collectgarbage([opt]) - A full cycle requested from a script runs at
/// the next point where no call is active
fn lua_collectgarbage(l: &mut CallContext) -> LuaResult<usize> {
    let option = match l.arg(1) {
        LuaValue::Nil => "collect".into(),
        _ => l.check_string(1)?,
    };
    let result = match &*option {
        "collect" => {
            l.vm.full_gc()?;
            LuaValue::Integer(0)
        }
        "step" => {
            l.vm.full_gc()?;
            LuaValue::Boolean(true)
        }
        "count" => LuaValue::Float(l.vm.gc_count_bytes() as f64 / 1024.0),
        "stop" => {
            l.vm.gc_stop();
            LuaValue::Integer(0)
        }
        "restart" => {
            l.vm.gc_restart();
            LuaValue::Integer(0)
        }
        "isrunning" => LuaValue::Boolean(l.vm.gc_is_running()),
        other => {
            let message = format!("invalid option '{}'", other);
            return Err(l.arg_error(1, &message));
        }
    };
    l.push_value(result)?;
    Ok(1)
}
