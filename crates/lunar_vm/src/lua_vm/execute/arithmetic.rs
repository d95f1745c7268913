// Raw arithmetic, bitwise and ordering on values (no metamethods).
// Integers wrap; `/` and `^` always produce floats; `//` and `%` round
// toward minus infinity. Numeric strings are coerced (lvm.c luaO_arith).

use crate::compiler::parser::BinaryOperator;
use crate::lua_value::{LuaValue, float_to_integer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithError {
    /// An operand is not a number (nor a numeric string)
    NotNumber,
    /// Bitwise operand is a float without an exact integer value
    NoIntegerRep,
    /// Integer `//` or `%` by zero
    DivByZero(&'static str),
}

pub(crate) fn arith(op: BinaryOperator, a: &LuaValue, b: &LuaValue) -> Result<LuaValue, ArithError> {
    if op.is_bitwise() {
        let x = to_integer_strict(a)?;
        let y = to_integer_strict(b)?;
        return Ok(LuaValue::Integer(int_bitwise(op, x, y)));
    }
    let (Some(x), Some(y)) = (a.to_number(), b.to_number()) else {
        return Err(ArithError::NotNumber);
    };
    match (x, y) {
        (LuaValue::Integer(i), LuaValue::Integer(j)) => int_arith(op, i, j),
        (x, y) => {
            let f = x.as_number().unwrap_or(f64::NAN);
            let g = y.as_number().unwrap_or(f64::NAN);
            Ok(LuaValue::Float(float_arith(op, f, g)))
        }
    }
}

pub(crate) fn unm(v: &LuaValue) -> Result<LuaValue, ArithError> {
    match v.to_number() {
        Some(LuaValue::Integer(i)) => Ok(LuaValue::Integer(i.wrapping_neg())),
        Some(LuaValue::Float(f)) => Ok(LuaValue::Float(-f)),
        _ => Err(ArithError::NotNumber),
    }
}

pub(crate) fn bnot(v: &LuaValue) -> Result<LuaValue, ArithError> {
    to_integer_strict(v).map(|i| LuaValue::Integer(!i))
}

fn to_integer_strict(v: &LuaValue) -> Result<i64, ArithError> {
    match v.to_number() {
        Some(LuaValue::Integer(i)) => Ok(i),
        Some(LuaValue::Float(f)) => float_to_integer(f).ok_or(ArithError::NoIntegerRep),
        _ => Err(ArithError::NotNumber),
    }
}

fn int_arith(op: BinaryOperator, i: i64, j: i64) -> Result<LuaValue, ArithError> {
    Ok(match op {
        BinaryOperator::OpAdd => LuaValue::Integer(i.wrapping_add(j)),
        BinaryOperator::OpSub => LuaValue::Integer(i.wrapping_sub(j)),
        BinaryOperator::OpMul => LuaValue::Integer(i.wrapping_mul(j)),
        BinaryOperator::OpDiv => LuaValue::Float(i as f64 / j as f64),
        BinaryOperator::OpPow => LuaValue::Float((i as f64).powf(j as f64)),
        BinaryOperator::OpIDiv => {
            if j == 0 {
                return Err(ArithError::DivByZero("attempt to perform 'n//0'"));
            }
            LuaValue::Integer(floor_div(i, j))
        }
        BinaryOperator::OpMod => {
            if j == 0 {
                return Err(ArithError::DivByZero("attempt to perform 'n%0'"));
            }
            LuaValue::Integer(int_mod(i, j))
        }
        _ => return Err(ArithError::NotNumber),
    })
}

/// Floor division (luaV_idiv)
pub(crate) fn floor_div(i: i64, j: i64) -> i64 {
    if j == -1 {
        return i.wrapping_neg();
    }
    let q = i / j;
    if i % j != 0 && (i ^ j) < 0 { q - 1 } else { q }
}

/// Modulo with the sign of the divisor (luaV_mod)
pub(crate) fn int_mod(i: i64, j: i64) -> i64 {
    if j == -1 {
        return 0;
    }
    let r = i % j;
    if r != 0 && (r ^ j) < 0 { r + j } else { r }
}

/// Float modulo (luai_nummod)
pub(crate) fn float_mod(a: f64, b: f64) -> f64 {
    let m = a % b;
    if (m > 0.0 && b < 0.0) || (m < 0.0 && b > 0.0 && b != m) {
        m + b
    } else {
        m
    }
}

fn float_arith(op: BinaryOperator, a: f64, b: f64) -> f64 {
    match op {
        BinaryOperator::OpAdd => a + b,
        BinaryOperator::OpSub => a - b,
        BinaryOperator::OpMul => a * b,
        BinaryOperator::OpDiv => a / b,
        BinaryOperator::OpPow => a.powf(b),
        BinaryOperator::OpIDiv => (a / b).floor(),
        BinaryOperator::OpMod => float_mod(a, b),
        _ => f64::NAN,
    }
}

fn int_bitwise(op: BinaryOperator, x: i64, y: i64) -> i64 {
    match op {
        BinaryOperator::OpBAnd => x & y,
        BinaryOperator::OpBOr => x | y,
        BinaryOperator::OpBXor => x ^ y,
        BinaryOperator::OpShl => shift_left(x, y),
        BinaryOperator::OpShr => shift_left(x, y.wrapping_neg()),
        _ => 0,
    }
}

/// Logical shift; negative counts shift right (luaV_shiftl)
pub(crate) fn shift_left(x: i64, y: i64) -> i64 {
    if y <= -64 || y >= 64 {
        0
    } else if y >= 0 {
        ((x as u64) << y) as i64
    } else {
        ((x as u64) >> -y) as i64
    }
}

// ============ Ordering ============

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// `a < b` for numbers and strings; `None` when a metamethod is needed
pub(crate) fn less_than(a: &LuaValue, b: &LuaValue) -> Option<bool> {
    match (a, b) {
        (LuaValue::Integer(i), LuaValue::Integer(j)) => Some(i < j),
        (LuaValue::Float(f), LuaValue::Float(g)) => Some(f < g),
        (LuaValue::Integer(i), LuaValue::Float(f)) => Some(int_lt_float(*i, *f)),
        (LuaValue::Float(f), LuaValue::Integer(i)) => Some(float_lt_int(*f, *i)),
        (LuaValue::String(s), LuaValue::String(t)) => Some(s.as_bytes() < t.as_bytes()),
        _ => None,
    }
}

/// `a <= b` for numbers and strings
pub(crate) fn less_equal(a: &LuaValue, b: &LuaValue) -> Option<bool> {
    match (a, b) {
        (LuaValue::Integer(i), LuaValue::Integer(j)) => Some(i <= j),
        (LuaValue::Float(f), LuaValue::Float(g)) => Some(f <= g),
        (LuaValue::Integer(i), LuaValue::Float(f)) => Some(int_le_float(*i, *f)),
        (LuaValue::Float(f), LuaValue::Integer(i)) => Some(float_le_int(*f, *i)),
        (LuaValue::String(s), LuaValue::String(t)) => Some(s.as_bytes() <= t.as_bytes()),
        _ => None,
    }
}

// i < f  <=>  i < ceil(f)
fn int_lt_float(i: i64, f: f64) -> bool {
    if f.is_nan() {
        false
    } else if f >= TWO_POW_63 {
        true
    } else if f > -TWO_POW_63 {
        i < f.ceil() as i64
    } else {
        false
    }
}

// i <= f  <=>  i <= floor(f)
fn int_le_float(i: i64, f: f64) -> bool {
    if f.is_nan() {
        false
    } else if f >= TWO_POW_63 {
        true
    } else if f >= -TWO_POW_63 {
        i <= f.floor() as i64
    } else {
        false
    }
}

// f < i  <=>  floor(f) < i
fn float_lt_int(f: f64, i: i64) -> bool {
    if f.is_nan() {
        false
    } else if f >= TWO_POW_63 {
        false
    } else if f >= -TWO_POW_63 {
        (f.floor() as i64) < i
    } else {
        true
    }
}

// f <= i  <=>  ceil(f) <= i
fn float_le_int(f: f64, i: i64) -> bool {
    if f.is_nan() {
        false
    } else if f >= TWO_POW_63 {
        false
    } else if f > -TWO_POW_63 {
        (f.ceil() as i64) <= i
    } else {
        true
    }
}
