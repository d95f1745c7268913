// string.format: C printf-style directives
// Supported: %d %i %u %c %x %X %o %e %E %f %F %g %G %a %A %s %q %%
// with flags `-+ #0`, a width and a precision of at most two digits each.

use std::fmt::Write as FmtWrite;

use crate::lua_value::LuaValue;
use crate::lua_vm::{CallContext, LuaResult};

/// Parsed `%[flags][width][.precision]` prefix
#[derive(Debug, Default, Clone, Copy)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
}

/// string.format(formatstring, ...) - Format with various specifiers
pub fn string_format(l: &mut CallContext) -> LuaResult<usize> {
    let format = l.check_string(1)?;
    let mut result = String::with_capacity(format.len() + format.len() / 2);
    let mut arg = 1;
    let mut chars = format.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        if ch != '%' {
            result.push(ch);
            continue;
        }
        if let Some((_, '%')) = chars.peek() {
            chars.next();
            result.push('%');
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&(_, c)) = chars.peek() {
            match c {
                '-' => spec.left = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '#' => spec.alt = true,
                '0' => spec.zero = true,
                _ => break,
            }
            chars.next();
        }
        let width_digits = take_digits(&mut chars);
        let precision_digits = match chars.peek() {
            Some((_, '.')) => {
                chars.next();
                Some(take_digits(&mut chars))
            }
            _ => None,
        };
        let Some((end, conversion)) = chars.next() else {
            return Err(l.error("invalid conversion '%' to 'format'"));
        };
        let directive = &format[start..end + conversion.len_utf8()];
        let too_long = width_digits.len() > 2
            || precision_digits.as_ref().is_some_and(|p| p.len() > 2);
        if too_long {
            return Err(l.error(format!("invalid conversion '{}' to 'format'", directive)));
        }
        spec.width = width_digits.parse().unwrap_or(0);
        spec.precision = precision_digits.map(|p| p.parse().unwrap_or(0));

        arg += 1;
        if l.get_arg(arg).is_none() {
            return Err(l.arg_error(arg, "no value"));
        }
        match conversion {
            'd' | 'i' => {
                let n = l.check_integer(arg)?;
                format_integer(&mut result, &spec, n);
            }
            'u' => {
                let n = l.check_integer(arg)?;
                format_unsigned(&mut result, &spec, &(n as u64).to_string(), "");
            }
            'c' => {
                let n = l.check_integer(arg)?;
                let c = char::from(n as u8).to_string();
                pad(&mut result, &spec, &c, false);
            }
            'x' | 'X' | 'o' => {
                let n = l.check_integer(arg)? as u64;
                let (digits, prefix) = match conversion {
                    'x' => (format!("{:x}", n), "0x"),
                    'X' => (format!("{:X}", n), "0X"),
                    _ => (format!("{:o}", n), "0"),
                };
                let prefix = if spec.alt && n != 0 { prefix } else { "" };
                format_unsigned(&mut result, &spec, &digits, prefix);
            }
            'e' | 'E' | 'f' | 'F' | 'g' | 'G' | 'a' | 'A' => {
                let f = l.check_float(arg)?;
                format_float(&mut result, &spec, f, conversion);
            }
            's' => {
                let value = l.arg(arg);
                let s = l.to_string(&value)?;
                let s: String = match spec.precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s.to_string(),
                };
                pad(&mut result, &spec, &s, false);
            }
            'q' => {
                if spec.width > 0 || spec.precision.is_some() || spec.left || spec.zero {
                    return Err(l.error("specifier '%q' cannot have modifiers"));
                }
                let value = l.arg(arg);
                if !format_quoted(&mut result, &value) {
                    return Err(l.arg_error(arg, "value has no literal form"));
                }
            }
            _ => {
                return Err(l.error(format!("invalid conversion '{}' to 'format'", directive)));
            }
        }
    }

    l.push_value(LuaValue::string_owned(result))?;
    Ok(1)
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> String {
    let mut digits = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

/// Pad `body` to the field width. With zero padding the zeros go after
/// any sign or radix prefix.
fn pad(buf: &mut String, spec: &Spec, body: &str, numeric: bool) {
    let len = body.chars().count();
    if len >= spec.width {
        buf.push_str(body);
        return;
    }
    let fill = spec.width - len;
    if spec.left {
        buf.push_str(body);
        buf.extend(std::iter::repeat_n(' ', fill));
    } else if spec.zero && numeric {
        let split = sign_prefix_len(body);
        buf.push_str(&body[..split]);
        buf.extend(std::iter::repeat_n('0', fill));
        buf.push_str(&body[split..]);
    } else {
        buf.extend(std::iter::repeat_n(' ', fill));
        buf.push_str(body);
    }
}

fn sign_prefix_len(body: &str) -> usize {
    let mut len = 0;
    if body.starts_with(['+', '-', ' ']) {
        len = 1;
    }
    let rest = &body[len..];
    if rest.starts_with("0x") || rest.starts_with("0X") {
        len += 2;
    }
    len
}

fn sign_of(spec: &Spec, negative: bool) -> &'static str {
    if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

fn format_integer(buf: &mut String, spec: &Spec, n: i64) {
    let mut digits = n.unsigned_abs().to_string();
    if let Some(p) = spec.precision {
        if p == 0 && n == 0 {
            digits.clear();
        }
        while digits.len() < p {
            digits.insert(0, '0');
        }
    }
    let body = format!("{}{}", sign_of(spec, n < 0), digits);
    pad(buf, spec, &body, spec.precision.is_none());
}

fn format_unsigned(buf: &mut String, spec: &Spec, digits: &str, prefix: &str) {
    let mut digits = digits.to_string();
    if let Some(p) = spec.precision {
        while digits.len() < p {
            digits.insert(0, '0');
        }
    }
    let body = format!("{}{}", prefix, digits);
    pad(buf, spec, &body, spec.precision.is_none());
}

fn format_float(buf: &mut String, spec: &Spec, f: f64, conversion: char) {
    let upper = conversion.is_ascii_uppercase();
    let sign = sign_of(spec, f.is_sign_negative() && !f.is_nan());
    if !f.is_finite() {
        let text = if f.is_nan() { "nan" } else { "inf" };
        let text = if upper { text.to_uppercase() } else { text.to_string() };
        let plain = Spec { zero: false, ..*spec };
        pad(buf, &plain, &format!("{}{}", sign, text), false);
        return;
    }

    let magnitude = f.abs();
    let precision = spec.precision;
    let body = match conversion.to_ascii_lowercase() {
        'f' => format!("{:.*}", precision.unwrap_or(6), magnitude),
        'e' => format_exp(magnitude, precision.unwrap_or(6), upper),
        'g' => format_general(magnitude, precision.unwrap_or(6), spec.alt, upper),
        _ => format_hex_float(magnitude, upper),
    };
    let body = if spec.alt && !body.contains('.') && matches!(conversion, 'f' | 'F') {
        format!("{}.", body)
    } else {
        body
    };
    pad(buf, spec, &format!("{}{}", sign, body), true);
}

/// `%e` with a C-style exponent (sign and at least two digits)
fn format_exp(f: f64, precision: usize, upper: bool) -> String {
    let text = format!("{:.*e}", precision, f);
    let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}{}{}{:02}", mantissa, e, sign, exponent.abs())
}

/// `%g`: `%e` or `%f` depending on the exponent, trailing zeros removed
fn format_general(f: f64, precision: usize, alt: bool, upper: bool) -> String {
    let p = precision.max(1);
    let exp_form = format_exp(f, p - 1, upper);
    let exponent: i32 = exp_form
        .rsplit(['e', 'E'])
        .next()
        .and_then(|e| e.parse().ok())
        .unwrap_or(0);

    if exponent < -4 || exponent >= p as i32 {
        if alt {
            return exp_form;
        }
        let split = exp_form.find(['e', 'E']).unwrap_or(exp_form.len());
        let (mantissa, tail) = exp_form.split_at(split);
        format!("{}{}", strip_zeros(mantissa), tail)
    } else {
        let decimals = (p as i32 - 1 - exponent).max(0) as usize;
        let fixed = format!("{:.*}", decimals, f);
        if alt { fixed } else { strip_zeros(&fixed).to_string() }
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// `%a`: hexadecimal floating point of a non-negative finite value
fn format_hex_float(f: f64, upper: bool) -> String {
    let text = if f == 0.0 {
        "0x0p+0".to_string()
    } else {
        let bits = f.to_bits();
        let raw_exp = ((bits >> 52) & 0x7ff) as i32;
        let mantissa = bits & ((1u64 << 52) - 1);
        let (lead, exp) = if raw_exp == 0 { (0, -1022) } else { (1, raw_exp - 1023) };
        let mut digits = format!("{:013x}", mantissa);
        while digits.ends_with('0') {
            digits.pop();
        }
        if digits.is_empty() {
            format!("0x{}p{:+}", lead, exp)
        } else {
            format!("0x{}.{}p{:+}", lead, digits, exp)
        }
    };
    if upper { text.to_uppercase() } else { text }
}

/// `%q`: a literal that reads back as the same value
fn format_quoted(buf: &mut String, value: &LuaValue) -> bool {
    match value {
        LuaValue::String(s) => {
            buf.push('"');
            let mut chars = s.chars().peekable();
            while let Some(c) = chars.next() {
                match c {
                    '"' | '\\' | '\n' => {
                        buf.push('\\');
                        buf.push(c);
                    }
                    c if c.is_ascii_control() => {
                        if chars.peek().is_some_and(|n| n.is_ascii_digit()) {
                            let _ = write!(buf, "\\{:03}", c as u32);
                        } else {
                            let _ = write!(buf, "\\{}", c as u32);
                        }
                    }
                    c => buf.push(c),
                }
            }
            buf.push('"');
            true
        }
        LuaValue::Integer(i) => {
            if *i == i64::MIN {
                buf.push_str("0x8000000000000000");
            } else {
                let _ = write!(buf, "{}", i);
            }
            true
        }
        LuaValue::Float(f) => {
            if f.is_nan() {
                buf.push_str("(0/0)");
            } else if f.is_infinite() {
                buf.push_str(if *f > 0.0 { "1e9999" } else { "-1e9999" });
            } else {
                let sign = if f.is_sign_negative() { "-" } else { "" };
                let _ = write!(buf, "{}{}", sign, format_hex_float(f.abs(), false));
            }
            true
        }
        LuaValue::Boolean(b) => {
            let _ = write!(buf, "{}", b);
            true
        }
        LuaValue::Nil => {
            buf.push_str("nil");
            true
        }
        _ => false,
    }
}
