// Lua value representation.
// Scalars and strings are stored inline (strings are immutable and shared
// through `Rc<str>`, so they can never form cycles and need no tracing);
// tables, closures and userdata are referenced by generational arena ids.

use std::fmt;
use std::rc::Rc;

use crate::gc::{FunctionId, GcRef, TableId, UserdataId};
use crate::lua_vm::{CallContext, LuaResult};

/// Immutable, shared Lua string
pub type LuaString = Rc<str>;

/// Native function callable from Lua. Arguments and results travel through
/// the explicit [`CallContext`]; the return value is the number of results
/// pushed.
pub type CFunction = fn(&mut CallContext) -> LuaResult<usize>;

#[derive(Clone, Default)]
pub enum LuaValue {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(LuaString),
    Table(TableId),
    Function(FunctionId),
    CFunction(CFunction),
    Userdata(UserdataId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaValueKind {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    Userdata,
}

impl LuaValue {
    // ============ Constructors ============

    #[inline(always)]
    pub fn nil() -> Self {
        LuaValue::Nil
    }

    #[inline(always)]
    pub fn boolean(b: bool) -> Self {
        LuaValue::Boolean(b)
    }

    #[inline(always)]
    pub fn integer(i: i64) -> Self {
        LuaValue::Integer(i)
    }

    #[inline(always)]
    pub fn float(f: f64) -> Self {
        LuaValue::Float(f)
    }

    #[inline]
    pub fn string(s: &str) -> Self {
        LuaValue::String(Rc::from(s))
    }

    #[inline]
    pub fn string_owned(s: String) -> Self {
        LuaValue::String(Rc::from(s))
    }

    #[inline(always)]
    pub fn cfunction(f: CFunction) -> Self {
        LuaValue::CFunction(f)
    }

    // ============ Type checks ============

    pub fn kind(&self) -> LuaValueKind {
        match self {
            LuaValue::Nil => LuaValueKind::Nil,
            LuaValue::Boolean(_) => LuaValueKind::Boolean,
            LuaValue::Integer(_) | LuaValue::Float(_) => LuaValueKind::Number,
            LuaValue::String(_) => LuaValueKind::String,
            LuaValue::Table(_) => LuaValueKind::Table,
            LuaValue::Function(_) | LuaValue::CFunction(_) => LuaValueKind::Function,
            LuaValue::Userdata(_) => LuaValueKind::Userdata,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            LuaValueKind::Nil => "nil",
            LuaValueKind::Boolean => "boolean",
            LuaValueKind::Number => "number",
            LuaValueKind::String => "string",
            LuaValueKind::Table => "table",
            LuaValueKind::Function => "function",
            LuaValueKind::Userdata => "userdata",
        }
    }

    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    /// Lua truthiness: only nil and false are falsy
    #[inline(always)]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Boolean(false))
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self, LuaValue::Function(_) | LuaValue::CFunction(_))
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, LuaValue::Integer(_) | LuaValue::Float(_))
    }

    // ============ Accessors ============

    #[inline]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            LuaValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer subtype only; see `to_integer` for Lua's conversions
    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            LuaValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            LuaValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Either number subtype as f64
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LuaValue::Integer(i) => Some(*i as f64),
            LuaValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LuaValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_table_id(&self) -> Option<TableId> {
        match self {
            LuaValue::Table(id) => Some(*id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_function_id(&self) -> Option<FunctionId> {
        match self {
            LuaValue::Function(id) => Some(*id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_userdata_id(&self) -> Option<UserdataId> {
        match self {
            LuaValue::Userdata(id) => Some(*id),
            _ => None,
        }
    }

    pub fn gc_ref(&self) -> Option<GcRef> {
        match self {
            LuaValue::Table(id) => Some(GcRef::Table(*id)),
            LuaValue::Function(id) => Some(GcRef::Function(*id)),
            LuaValue::Userdata(id) => Some(GcRef::Userdata(*id)),
            _ => None,
        }
    }

    // ============ Conversions ============

    /// Number conversion with string coercion (`tonumber` without base)
    pub fn to_number(&self) -> Option<LuaValue> {
        match self {
            LuaValue::Integer(_) | LuaValue::Float(_) => Some(self.clone()),
            LuaValue::String(s) => crate::compiler::str_to_number(s),
            _ => None,
        }
    }

    /// Integer conversion: floats with an exact integer value and numeric
    /// strings convert, anything else does not
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            LuaValue::Integer(i) => Some(*i),
            LuaValue::Float(f) => float_to_integer(*f),
            LuaValue::String(_) => self.to_number().and_then(|n| n.to_integer()),
            _ => None,
        }
    }

    /// Float conversion with string coercion
    pub fn to_float(&self) -> Option<f64> {
        self.to_number().and_then(|n| n.as_number())
    }

    /// String form used by concatenation: strings and numbers only
    pub fn to_str_coerce(&self) -> Option<LuaString> {
        match self {
            LuaValue::String(s) => Some(s.clone()),
            LuaValue::Integer(i) => Some(Rc::from(itoa::Buffer::new().format(*i))),
            LuaValue::Float(f) => Some(Rc::from(fmt_float(*f))),
            _ => None,
        }
    }

    /// Primitive equality (`rawequal`): numbers compare by value across
    /// subtypes, strings by content, objects by identity
    pub fn raw_equal(&self, other: &LuaValue) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Integer(a), LuaValue::Integer(b)) => a == b,
            (LuaValue::Float(a), LuaValue::Float(b)) => a == b,
            (LuaValue::Integer(i), LuaValue::Float(f)) | (LuaValue::Float(f), LuaValue::Integer(i)) => {
                float_to_integer(*f) == Some(*i)
            }
            (LuaValue::String(a), LuaValue::String(b)) => a == b,
            (LuaValue::Table(a), LuaValue::Table(b)) => a == b,
            (LuaValue::Function(a), LuaValue::Function(b)) => a == b,
            (LuaValue::CFunction(a), LuaValue::CFunction(b)) => *a as usize == *b as usize,
            (LuaValue::Userdata(a), LuaValue::Userdata(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for LuaValue {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equal(other)
    }
}

impl fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Boolean(b) => write!(f, "{}", b),
            LuaValue::Integer(i) => write!(f, "{}", i),
            LuaValue::Float(n) => write!(f, "{}", fmt_float(*n)),
            LuaValue::String(s) => write!(f, "{:?}", s),
            LuaValue::Table(id) => write!(f, "table: {}", id),
            LuaValue::Function(id) => write!(f, "function: {}", id),
            LuaValue::CFunction(func) => write!(f, "function: builtin: {:#x}", *func as usize),
            LuaValue::Userdata(id) => write!(f, "userdata: {}", id),
        }
    }
}

impl From<bool> for LuaValue {
    fn from(b: bool) -> Self {
        LuaValue::Boolean(b)
    }
}

impl From<i64> for LuaValue {
    fn from(i: i64) -> Self {
        LuaValue::Integer(i)
    }
}

impl From<f64> for LuaValue {
    fn from(f: f64) -> Self {
        LuaValue::Float(f)
    }
}

impl From<&str> for LuaValue {
    fn from(s: &str) -> Self {
        LuaValue::string(s)
    }
}

impl From<String> for LuaValue {
    fn from(s: String) -> Self {
        LuaValue::string_owned(s)
    }
}

/// Exact float → integer conversion (no rounding)
pub fn float_to_integer(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything >= it overflows i64
    if f.floor() == f && f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0 {
        Some(f as i64)
    } else {
        None
    }
}

/// Format a float the way `%.14g` does, keeping a trailing ".0" on values
/// that would otherwise read as integers
pub fn fmt_float(f: f64) -> String {
    if f.is_nan() {
        return if f.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let sci = format!("{:.13e}", f);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if !(-4..14).contains(&exponent) {
        let mantissa = trim_fraction_zeros(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
    }

    let decimals = (13 - exponent).max(0) as usize;
    let mut fixed = trim_fraction_zeros(&format!("{:.*}", decimals, f)).to_string();
    if !fixed.contains('.') {
        fixed.push_str(".0");
    }
    fixed
}

fn trim_fraction_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
