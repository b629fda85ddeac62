//! Converter registry - bidirectional native <-> host value conversion
//!
//! Design: the registry is the set of `ToHost` / `FromHost` impls, so
//! dispatch is resolved at compile time. Any type joins by implementing
//! the traits; composite impls delegate to their element converters and
//! add no failure modes of their own.
//!
//! - `scalar.rs` - numbers, booleans, strings, markers, raw handles
//! - `composite.rs` - options, sequences, sets, maps, tuples, variants
//! - `json.rs` - `serde_json::Value`
//! - `dict.rs` - property helpers built on the traits

mod composite;
pub mod dict;
mod json;
mod scalar;

#[cfg(test)]
mod tests;

pub use composite::{Either, MapKey};
pub use scalar::{Null, Undefined, Utf16String};

use crate::abi::{AbiResult, Value, ValueType};
use crate::context::Env;
use crate::invoke::CallFlags;

/// Native -> host conversion.
pub trait ToHost {
    fn to_host(&self, env: &Env) -> AbiResult<Value>;
}

/// Host -> native conversion; `None` on type mismatch.
pub trait FromHost: Sized {
    /// Type name reported in conversion errors.
    const NAME: &'static str;

    /// Whether a missing trailing argument converts via [`FromHost::absent`].
    const OPTIONAL: bool = false;

    fn from_host(env: &Env, value: Value) -> Option<Self>;

    /// Conversion of a call argument under the callable's flags.
    fn from_argument(env: &Env, value: Value, flags: CallFlags) -> Option<Self> {
        let _ = flags;
        Self::from_host(env, value)
    }

    /// Value used when the caller did not supply this argument.
    fn absent() -> Option<Self> {
        None
    }
}

impl<T: ToHost + ?Sized> ToHost for &T {
    #[inline]
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        (**self).to_host(env)
    }
}

/// Convert, producing `undefined` if the host refuses the value.
pub fn to_host_value<T: ToHost + ?Sized>(env: &Env, value: &T) -> Value {
    value.to_host(env).unwrap_or_else(|_| env.host().get_undefined())
}

#[inline]
pub(crate) fn type_of(env: &Env, value: Value) -> Option<ValueType> {
    env.host().type_of(value).ok()
}

/// `undefined` or `null`.
pub fn is_nullish(env: &Env, value: Value) -> bool {
    matches!(
        type_of(env, value),
        Some(ValueType::Undefined | ValueType::Null)
    )
}

/// Human-readable type of a host value, as used in error messages.
///
/// Objects report their `constructor.name` when it is a string.
pub fn type_name_of(env: &Env, value: Value) -> String {
    let host = env.host();
    let name = match type_of(env, value) {
        Some(ValueType::Undefined) => "undefined",
        Some(ValueType::Null) => "null",
        Some(ValueType::Boolean) => "Boolean",
        Some(ValueType::Number) => "Number",
        Some(ValueType::String) => "String",
        Some(ValueType::Symbol) => "Symbol",
        Some(ValueType::Function) => "Function",
        Some(ValueType::External) => "External",
        Some(ValueType::BigInt) => "BigInt",
        Some(ValueType::Object) => {
            if host.is_array(value).unwrap_or(false) {
                return "Array".to_string();
            }
            let constructor_name = host
                .get_named_property(value, "constructor")
                .and_then(|ctor| host.get_named_property(ctor, "name"))
                .and_then(|name| host.value_string_utf8(name));
            return match constructor_name {
                Ok(name) if !name.is_empty() => name,
                _ => "Object".to_string(),
            };
        }
        None => "Object",
    };
    name.to_string()
}
