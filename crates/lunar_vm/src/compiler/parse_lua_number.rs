// Numeral conversion shared by the lexer and `tonumber`/string coercion.
// Decimal integers that overflow become floats; hexadecimal integers wrap
// around modulo 2^64 (so 0xFFFFFFFFFFFFFFFF == -1).

use crate::lua_value::LuaValue;

/// Convert a string to a number the way Lua's `lua_stringtonumber` does:
/// surrounding whitespace and a leading sign are accepted
pub fn str_to_number(s: &str) -> Option<LuaValue> {
    let s = s.trim_matches(|c: char| c.is_ascii_whitespace());
    let (negative, body) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let value = parse_numeral(body)?;
    if !negative {
        return Some(value);
    }
    Some(match value {
        LuaValue::Integer(i) => LuaValue::Integer(i.wrapping_neg()),
        LuaValue::Float(f) => LuaValue::Float(-f),
        other => other,
    })
}

/// Convert an unsigned numeral (as scanned by the lexer)
pub fn parse_numeral(text: &str) -> Option<LuaValue> {
    if text.is_empty() {
        return None;
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return parse_hex(hex);
    }

    let bytes = text.as_bytes();
    if !bytes[0].is_ascii_digit() && bytes[0] != b'.' {
        return None;
    }
    let is_float = bytes.iter().any(|b| matches!(b, b'.' | b'e' | b'E'));
    if !bytes
        .iter()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }

    if !is_float {
        return match text.parse::<i64>() {
            Ok(i) => Some(LuaValue::Integer(i)),
            Err(_) => text.parse::<f64>().ok().map(LuaValue::Float),
        };
    }
    text.parse::<f64>().ok().map(LuaValue::Float)
}

fn parse_hex(text: &str) -> Option<LuaValue> {
    let (mantissa, exponent) = match text.find(['p', 'P']) {
        Some(pos) => (&text[..pos], Some(&text[pos + 1..])),
        None => (text, None),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (mantissa, None),
    };
    if int_part.is_empty() && frac_part.is_none_or(str::is_empty) {
        return None;
    }

    if frac_part.is_none() && exponent.is_none() {
        let mut value: u64 = 0;
        for c in int_part.chars() {
            let digit = c.to_digit(16)? as u64;
            value = value.wrapping_mul(16).wrapping_add(digit);
        }
        return Some(LuaValue::Integer(value as i64));
    }

    let mut value = 0.0f64;
    for c in int_part.chars() {
        value = value * 16.0 + c.to_digit(16)? as f64;
    }
    let mut scale = 0i32;
    for c in frac_part.unwrap_or("").chars() {
        value = value * 16.0 + c.to_digit(16)? as f64;
        scale -= 4;
    }
    if let Some(exp) = exponent {
        scale += exp.parse::<i32>().ok()?;
    }
    Some(LuaValue::Float(value * 2f64.powi(scale)))
}
