// String library
// Implements: format, len, lower, rep, reverse, sub, upper
// Strings are byte-indexed; a slice that splits a UTF-8 sequence is
// repaired with replacement characters.

mod string_format;

use crate::lib_registry::LibraryModule;
use crate::lua_value::LuaValue;
use crate::lua_vm::{CallContext, LuaResult};

pub fn create_string_lib() -> LibraryModule {
    crate::lib_module!("string", {
        "format" => string_format::string_format,
        "len" => string_len,
        "lower" => string_lower,
        "rep" => string_rep,
        "reverse" => string_reverse,
        "sub" => string_sub,
        "upper" => string_upper,
    })
}

fn string_len(l: &mut CallContext) -> LuaResult<usize> {
    let s = l.check_string(1)?;
    l.push_value(LuaValue::Integer(s.len() as i64))?;
    Ok(1)
}

/// Start position: negative counts from the end, clipped to 1 (posrelatI)
fn start_pos(pos: i64, len: usize) -> usize {
    let len = len as i64;
    if pos > 0 {
        pos as usize
    } else if pos == 0 || pos < -len {
        1
    } else {
        (len + pos + 1) as usize
    }
}

/// End position: negative counts from the end, clipped to the length (getendpos)
fn end_pos(pos: i64, len: usize) -> usize {
    let len = len as i64;
    if pos > len {
        len as usize
    } else if pos >= 0 {
        pos as usize
    } else if pos < -len {
        0
    } else {
        (len + pos + 1) as usize
    }
}

/// string.sub(s [, i [, j]])
fn string_sub(l: &mut CallContext) -> LuaResult<usize> {
    let s = l.check_string(1)?;
    let i = l.opt_integer(2, 1)?;
    let j = l.opt_integer(3, -1)?;
    let start = start_pos(i, s.len());
    let end = end_pos(j, s.len());
    let result = if start > end {
        LuaValue::string("")
    } else {
        let bytes = &s.as_bytes()[start - 1..end];
        LuaValue::string_owned(String::from_utf8_lossy(bytes).into_owned())
    };
    l.push_value(result)?;
    Ok(1)
}

fn string_upper(l: &mut CallContext) -> LuaResult<usize> {
    let s = l.check_string(1)?;
    l.push_value(LuaValue::string_owned(s.to_ascii_uppercase()))?;
    Ok(1)
}

fn string_lower(l: &mut CallContext) -> LuaResult<usize> {
    let s = l.check_string(1)?;
    l.push_value(LuaValue::string_owned(s.to_ascii_lowercase()))?;
    Ok(1)
}

/// string.rep(s, n [, sep])
fn string_rep(l: &mut CallContext) -> LuaResult<usize> {
    let s = l.check_string(1)?;
    let n = l.check_integer(2)?;
    let sep = match l.arg(3) {
        LuaValue::Nil => "".into(),
        _ => l.check_string(3)?,
    };
    if n <= 0 {
        l.push_value(LuaValue::string(""))?;
        return Ok(1);
    }

    let n = n as u64;
    let total = (s.len() as u64)
        .checked_add(sep.len() as u64)
        .and_then(|unit| unit.checked_mul(n))
        .filter(|&total| total <= isize::MAX as u64);
    let Some(total) = total else {
        return Err(l.error("resulting string too large"));
    };
    if total as usize > l.vm.option().max_memory_limit {
        return Err(l.vm.memory_error());
    }

    let mut result = String::with_capacity(total as usize);
    for i in 0..n {
        if i > 0 {
            result.push_str(&sep);
        }
        result.push_str(&s);
    }
    l.push_value(LuaValue::string_owned(result))?;
    Ok(1)
}

fn string_reverse(l: &mut CallContext) -> LuaResult<usize> {
    let s = l.check_string(1)?;
    l.push_value(LuaValue::string_owned(s.chars().rev().collect()))?;
    Ok(1)
}
