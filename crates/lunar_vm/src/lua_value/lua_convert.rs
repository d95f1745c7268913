//! `FromLua` / `IntoLua` — conversion between Rust types and `LuaValue`.
//!
//! # Built-in impls
//! - `()`, `bool`, `i8`..`i64`, `u8`..`u32`, `f32`, `f64`
//! - `String`, `&str`
//! - `Option<T>` where `T: FromLua` / `T: IntoLua`
//! - `LuaValue` (identity)
//!
//! Hosts implement these for their own types to pass them as invoke
//! arguments, receive them as results, or store them as copied values.

use crate::lua_value::LuaValue;
use crate::lua_vm::{LuaResult, LuaVM};

/// Convert a `LuaValue` into a Rust type.
/// Returns `Err(message)` on a type mismatch.
pub trait FromLua: Sized {
    fn from_lua(value: LuaValue, vm: &LuaVM) -> Result<Self, String>;
}

/// Convert a Rust value into a `LuaValue`.
pub trait IntoLua {
    fn into_lua(self, vm: &mut LuaVM) -> LuaResult<LuaValue>;
}

// ==================== Identity: LuaValue ====================

impl FromLua for LuaValue {
    #[inline]
    fn from_lua(value: LuaValue, _vm: &LuaVM) -> Result<Self, String> {
        Ok(value)
    }
}

impl IntoLua for LuaValue {
    #[inline]
    fn into_lua(self, _vm: &mut LuaVM) -> LuaResult<LuaValue> {
        Ok(self)
    }
}

// ==================== Unit ====================

impl FromLua for () {
    #[inline]
    fn from_lua(_value: LuaValue, _vm: &LuaVM) -> Result<Self, String> {
        Ok(())
    }
}

impl IntoLua for () {
    #[inline]
    fn into_lua(self, _vm: &mut LuaVM) -> LuaResult<LuaValue> {
        Ok(LuaValue::Nil)
    }
}

// ==================== Boolean ====================

impl FromLua for bool {
    #[inline]
    fn from_lua(value: LuaValue, _vm: &LuaVM) -> Result<Self, String> {
        Ok(value.is_truthy())
    }
}

impl IntoLua for bool {
    #[inline]
    fn into_lua(self, _vm: &mut LuaVM) -> LuaResult<LuaValue> {
        Ok(LuaValue::boolean(self))
    }
}

// ==================== Integers ====================

macro_rules! impl_integer {
    ($($t:ty),*) => {
        $(
            impl FromLua for $t {
                fn from_lua(value: LuaValue, _vm: &LuaVM) -> Result<Self, String> {
                    let i = value.to_integer().ok_or_else(|| {
                        format!("expected integer, got {}", value.type_name())
                    })?;
                    <$t>::try_from(i).map_err(|_| {
                        format!("integer {} out of range for {}", i, stringify!($t))
                    })
                }
            }

            impl IntoLua for $t {
                #[inline]
                fn into_lua(self, _vm: &mut LuaVM) -> LuaResult<LuaValue> {
                    Ok(LuaValue::integer(self as i64))
                }
            }
        )*
    };
}

impl_integer!(i8, i16, i32, i64, u8, u16, u32, isize);

// ==================== Floats ====================

impl FromLua for f64 {
    fn from_lua(value: LuaValue, _vm: &LuaVM) -> Result<Self, String> {
        value
            .to_float()
            .ok_or_else(|| format!("expected number, got {}", value.type_name()))
    }
}

impl IntoLua for f64 {
    #[inline]
    fn into_lua(self, _vm: &mut LuaVM) -> LuaResult<LuaValue> {
        Ok(LuaValue::float(self))
    }
}

impl FromLua for f32 {
    fn from_lua(value: LuaValue, vm: &LuaVM) -> Result<Self, String> {
        f64::from_lua(value, vm).map(|f| f as f32)
    }
}

impl IntoLua for f32 {
    #[inline]
    fn into_lua(self, _vm: &mut LuaVM) -> LuaResult<LuaValue> {
        Ok(LuaValue::float(self as f64))
    }
}

// ==================== Strings ====================

impl FromLua for String {
    fn from_lua(value: LuaValue, _vm: &LuaVM) -> Result<Self, String> {
        value
            .to_str_coerce()
            .map(|s| s.to_string())
            .ok_or_else(|| format!("expected string, got {}", value.type_name()))
    }
}

impl IntoLua for String {
    #[inline]
    fn into_lua(self, _vm: &mut LuaVM) -> LuaResult<LuaValue> {
        Ok(LuaValue::string_owned(self))
    }
}

impl IntoLua for &str {
    #[inline]
    fn into_lua(self, _vm: &mut LuaVM) -> LuaResult<LuaValue> {
        Ok(LuaValue::string(self))
    }
}

// ==================== Option ====================

impl<T: FromLua> FromLua for Option<T> {
    fn from_lua(value: LuaValue, vm: &LuaVM) -> Result<Self, String> {
        if value.is_nil() {
            Ok(None)
        } else {
            T::from_lua(value, vm).map(Some)
        }
    }
}

impl<T: IntoLua> IntoLua for Option<T> {
    fn into_lua(self, vm: &mut LuaVM) -> LuaResult<LuaValue> {
        match self {
            Some(v) => v.into_lua(vm),
            None => Ok(LuaValue::Nil),
        }
    }
}
