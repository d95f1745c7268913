//! Field access for native types exposed to scripts.
//!
//! Scripts read fields of a userdata through its metatable's `__index`. A
//! native type opts in by implementing [`UserDataTrait`] by hand; the trait
//! speaks [`UdValue`], a small owned value type that needs no VM access, so
//! implementations stay plain Rust.

use crate::lua_value::LuaValue;

/// Owned field value exchanged between native objects and the VM
#[derive(Debug, Clone, PartialEq)]
pub enum UdValue {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Str(String),
}

impl UdValue {
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            UdValue::Integer(i) => Some(*i),
            UdValue::Number(n) => crate::lua_value::float_to_integer(*n),
            _ => None,
        }
    }

    pub fn to_number(&self) -> Option<f64> {
        match self {
            UdValue::Integer(i) => Some(*i as f64),
            UdValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_str(&self) -> Option<&str> {
        match self {
            UdValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Lua truthiness
    pub fn to_bool(&self) -> bool {
        !matches!(self, UdValue::Nil | UdValue::Boolean(false))
    }

    pub fn into_lua_value(self) -> LuaValue {
        match self {
            UdValue::Nil => LuaValue::Nil,
            UdValue::Boolean(b) => LuaValue::Boolean(b),
            UdValue::Integer(i) => LuaValue::Integer(i),
            UdValue::Number(n) => LuaValue::Float(n),
            UdValue::Str(s) => LuaValue::string_owned(s),
        }
    }
}

macro_rules! udvalue_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for UdValue {
            fn from(v: $t) -> Self {
                UdValue::Integer(v as i64)
            }
        })*
    };
}

udvalue_from_int!(i8, i16, i32, i64, u8, u16, u32, isize);

impl From<f32> for UdValue {
    fn from(v: f32) -> Self {
        UdValue::Number(v as f64)
    }
}

impl From<f64> for UdValue {
    fn from(v: f64) -> Self {
        UdValue::Number(v)
    }
}

impl From<bool> for UdValue {
    fn from(v: bool) -> Self {
        UdValue::Boolean(v)
    }
}

impl From<&str> for UdValue {
    fn from(v: &str) -> Self {
        UdValue::Str(v.to_owned())
    }
}

impl From<String> for UdValue {
    fn from(v: String) -> Self {
        UdValue::Str(v)
    }
}

impl<T: Into<UdValue>> From<Option<T>> for UdValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => UdValue::Nil,
        }
    }
}

/// A native type whose fields scripts can read.
///
/// ```ignore
/// struct Point { x: f64, y: f64 }
///
/// impl UserDataTrait for Point {
///     fn type_name(&self) -> &'static str { "Point" }
///     fn get_field(&self, key: &str) -> Option<UdValue> {
///         match key {
///             "x" => Some(self.x.into()),
///             "y" => Some(self.y.into()),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait UserDataTrait: 'static {
    /// Name scripts see as the metatable `__name` and in messages
    fn type_name(&self) -> &'static str;

    /// Value of field `key`; `None` for unknown names (read as nil)
    fn get_field(&self, key: &str) -> Option<UdValue>;
}
