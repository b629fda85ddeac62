//! Scalar converters: numbers, booleans, strings, markers, raw handles

use num_traits::{Bounded, NumCast};

use super::{is_nullish, FromHost, ToHost};
use crate::abi::{AbiResult, Value};
use crate::context::Env;
use crate::persistent::Reference;

// ============================================================================
// Numbers
// ============================================================================

/// Read a finite number, or `None`.
fn finite_number(env: &Env, value: Value) -> Option<f64> {
    let number = env.host().value_double(value).ok()?;
    number.is_finite().then_some(number)
}

/// Read a number, truncate toward zero, reject values outside `T`'s range.
fn integer_from_host<T: NumCast>(env: &Env, value: Value) -> Option<T> {
    <T as NumCast>::from(finite_number(env, value)?.trunc())
}

/// Read through the host's int64 reader, which saturates at the `i64` range.
fn int64_from_host<T: NumCast>(env: &Env, value: Value) -> Option<T> {
    finite_number(env, value)?;
    <T as NumCast>::from(env.host().value_int64(value).ok()?)
}

/// Truncate and saturate at the top of the `u64` range; negatives are rejected.
fn uint64_from_host<T: NumCast + Bounded>(env: &Env, value: Value) -> Option<T> {
    let number = finite_number(env, value)?.trunc();
    if number >= u64::MAX as f64 {
        return Some(T::max_value());
    }
    <T as NumCast>::from(number)
}

macro_rules! impl_integer {
    ($create:ident as $wide:ty, $read:ident => $($ty:ty),+) => {$(
        impl ToHost for $ty {
            #[inline]
            fn to_host(&self, env: &Env) -> AbiResult<Value> {
                env.host().$create(*self as $wide)
            }
        }

        impl FromHost for $ty {
            const NAME: &'static str = "Integer";

            #[inline]
            fn from_host(env: &Env, value: Value) -> Option<Self> {
                $read(env, value)
            }
        }
    )+};
}

impl_integer!(create_int32 as i32, integer_from_host => i8, i16, i32);
impl_integer!(create_uint32 as u32, integer_from_host => u8, u16, u32);
impl_integer!(create_int64 as i64, int64_from_host => i64, isize);
// Above 2^53 the host number loses precision, as it would for any script value.
impl_integer!(create_double as f64, uint64_from_host => u64, usize);

impl ToHost for f64 {
    #[inline]
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        env.host().create_double(*self)
    }
}

impl FromHost for f64 {
    const NAME: &'static str = "Number";

    #[inline]
    fn from_host(env: &Env, value: Value) -> Option<Self> {
        env.host().value_double(value).ok()
    }
}

impl ToHost for f32 {
    #[inline]
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        env.host().create_double(<f64 as From<f32>>::from(*self))
    }
}

impl FromHost for f32 {
    const NAME: &'static str = "Number";

    #[inline]
    fn from_host(env: &Env, value: Value) -> Option<Self> {
        env.host().value_double(value).ok().map(|n| n as f32)
    }
}

// ============================================================================
// Booleans and strings
// ============================================================================

impl ToHost for bool {
    #[inline]
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        Ok(env.host().get_boolean(*self))
    }
}

impl FromHost for bool {
    const NAME: &'static str = "Boolean";

    #[inline]
    fn from_host(env: &Env, value: Value) -> Option<Self> {
        env.host().value_bool(value).ok()
    }
}

impl ToHost for str {
    #[inline]
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        env.host().create_string_utf8(self)
    }
}

impl ToHost for String {
    #[inline]
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        env.host().create_string_utf8(self)
    }
}

impl FromHost for String {
    const NAME: &'static str = "String";

    #[inline]
    fn from_host(env: &Env, value: Value) -> Option<Self> {
        env.host().value_string_utf8(value).ok()
    }
}

/// A string kept as UTF-16 code units, unpaired surrogates included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Utf16String(pub Vec<u16>);

impl From<&str> for Utf16String {
    fn from(value: &str) -> Self {
        Self(value.encode_utf16().collect())
    }
}

impl Utf16String {
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }
}

impl ToHost for Utf16String {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        env.host().create_string_utf16(&self.0)
    }
}

impl FromHost for Utf16String {
    const NAME: &'static str = "String";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        env.host().value_string_utf16(value).ok().map(Self)
    }
}

// ============================================================================
// Markers
// ============================================================================

/// Converts to `undefined`; reading accepts any value and discards it.
impl ToHost for () {
    #[inline]
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        Ok(env.host().get_undefined())
    }
}

impl FromHost for () {
    const NAME: &'static str = "undefined";

    #[inline]
    fn from_host(_env: &Env, _value: Value) -> Option<Self> {
        Some(())
    }
}

/// The host's `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Null;

impl ToHost for Null {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        Ok(env.host().get_null())
    }
}

impl FromHost for Null {
    const NAME: &'static str = "null";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        is_nullish(env, value).then_some(Null)
    }
}

/// The host's `undefined`; in an `Either` it lets the variant accept a
/// missing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Undefined;

impl ToHost for Undefined {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        Ok(env.host().get_undefined())
    }
}

impl FromHost for Undefined {
    const NAME: &'static str = "undefined";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        is_nullish(env, value).then_some(Undefined)
    }
}

// ============================================================================
// Raw handles
// ============================================================================

impl ToHost for Value {
    #[inline]
    fn to_host(&self, _env: &Env) -> AbiResult<Value> {
        Ok(*self)
    }
}

impl FromHost for Value {
    const NAME: &'static str = "Value";

    #[inline]
    fn from_host(_env: &Env, value: Value) -> Option<Self> {
        Some(value)
    }
}

impl ToHost for Reference {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        Ok(self.value().unwrap_or_else(|| env.host().get_undefined()))
    }
}

/// Reads into a strong reference, so the value outlives the current scope.
impl FromHost for Reference {
    const NAME: &'static str = "Value";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        Reference::strong(env.host_ref(), value).ok()
    }
}
