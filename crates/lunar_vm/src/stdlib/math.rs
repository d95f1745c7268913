// Math library
// Implements: abs, ceil, floor, fmod, max, min, sqrt, tointeger, type,
// pi, huge, maxinteger, mininteger

use crate::lib_registry::LibraryModule;
use crate::lua_value::{LuaValue, float_to_integer};
use crate::lua_vm::{CallContext, LuaResult};

pub fn create_math_lib() -> LibraryModule {
    crate::lib_module!("math", {
        "abs" => math_abs,
        "ceil" => math_ceil,
        "floor" => math_floor,
        "fmod" => math_fmod,
        "max" => math_max,
        "min" => math_min,
        "sqrt" => math_sqrt,
        "tointeger" => math_tointeger,
        "type" => math_type,
    })
    .with_value("pi", |_vm| Ok(LuaValue::float(std::f64::consts::PI)))
    .with_value("huge", |_vm| Ok(LuaValue::float(f64::INFINITY)))
    .with_value("maxinteger", |_vm| Ok(LuaValue::integer(i64::MAX)))
    .with_value("mininteger", |_vm| Ok(LuaValue::integer(i64::MIN)))
}

fn math_abs(l: &mut CallContext) -> LuaResult<usize> {
    let result = match l.check_number(1)? {
        LuaValue::Integer(i) => LuaValue::Integer(i.wrapping_abs()),
        n => LuaValue::Float(n.to_float().unwrap_or(f64::NAN).abs()),
    };
    l.push_value(result)?;
    Ok(1)
}

/// Float rounded by `round`, as an integer when it fits
fn push_rounded(l: &mut CallContext, round: fn(f64) -> f64) -> LuaResult<usize> {
    let result = match l.check_number(1)? {
        LuaValue::Integer(i) => LuaValue::Integer(i),
        n => {
            let f = round(n.to_float().unwrap_or(f64::NAN));
            float_to_integer(f).map_or(LuaValue::Float(f), LuaValue::Integer)
        }
    };
    l.push_value(result)?;
    Ok(1)
}

fn math_ceil(l: &mut CallContext) -> LuaResult<usize> {
    push_rounded(l, f64::ceil)
}

fn math_floor(l: &mut CallContext) -> LuaResult<usize> {
    push_rounded(l, f64::floor)
}

fn math_fmod(l: &mut CallContext) -> LuaResult<usize> {
    let a = l.check_number(1)?;
    let b = l.check_number(2)?;
    let result = match (a, b) {
        (LuaValue::Integer(_), LuaValue::Integer(0)) => {
            return Err(l.arg_error(2, "zero"));
        }
        // C fmod truncates toward zero, unlike `%`
        (LuaValue::Integer(x), LuaValue::Integer(y)) => LuaValue::Integer(x.wrapping_rem(y)),
        (a, b) => {
            let x = a.to_float().unwrap_or(f64::NAN);
            let y = b.to_float().unwrap_or(f64::NAN);
            LuaValue::Float(x % y)
        }
    };
    l.push_value(result)?;
    Ok(1)
}

/// Shared body of max/min: keeps the winning argument, integer or float
fn extremum(l: &mut CallContext, want_max: bool) -> LuaResult<usize> {
    let mut best = l.check_number(1)?;
    for i in 2..=l.arg_count() {
        let candidate = l.check_number(i)?;
        let wins = if want_max {
            number_less(&best, &candidate)
        } else {
            number_less(&candidate, &best)
        };
        if wins {
            best = candidate;
        }
    }
    l.push_value(best)?;
    Ok(1)
}

fn number_less(a: &LuaValue, b: &LuaValue) -> bool {
    match (a, b) {
        (LuaValue::Integer(x), LuaValue::Integer(y)) => x < y,
        _ => a.to_float().unwrap_or(f64::NAN) < b.to_float().unwrap_or(f64::NAN),
    }
}

fn math_max(l: &mut CallContext) -> LuaResult<usize> {
    extremum(l, true)
}

fn math_min(l: &mut CallContext) -> LuaResult<usize> {
    extremum(l, false)
}

fn math_sqrt(l: &mut CallContext) -> LuaResult<usize> {
    let x = l.check_float(1)?;
    l.push_value(LuaValue::Float(x.sqrt()))?;
    Ok(1)
}

fn math_tointeger(l: &mut CallContext) -> LuaResult<usize> {
    let result = match l.check_any(1)? {
        LuaValue::Integer(i) => LuaValue::Integer(i),
        LuaValue::Float(f) => float_to_integer(f).map_or(LuaValue::Nil, LuaValue::Integer),
        LuaValue::String(s) => match crate::compiler::str_to_number(&s) {
            Some(LuaValue::Integer(i)) => LuaValue::Integer(i),
            Some(LuaValue::Float(f)) => float_to_integer(f).map_or(LuaValue::Nil, LuaValue::Integer),
            _ => LuaValue::Nil,
        },
        _ => LuaValue::Nil,
    };
    l.push_value(result)?;
    Ok(1)
}

fn math_type(l: &mut CallContext) -> LuaResult<usize> {
    let result = match l.check_any(1)? {
        LuaValue::Integer(_) => LuaValue::string("integer"),
        LuaValue::Float(_) => LuaValue::string("float"),
        _ => LuaValue::Nil,
    };
    l.push_value(result)?;
    Ok(1)
}
