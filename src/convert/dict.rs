//! Property helpers over the converter traits
//!
//! All helpers return `false` rather than erroring when `object` is not an
//! object or function, since the host rejects property access on those.

use super::{type_of, FromHost, ToHost};
use crate::abi::{Value, ValueType};
use crate::context::Env;

fn is_object(env: &Env, value: Value) -> bool {
    matches!(
        type_of(env, value),
        Some(ValueType::Object | ValueType::Function)
    )
}

/// `object[key] = value`.
pub fn set<K, V>(env: &Env, object: Value, key: &K, value: &V) -> bool
where
    K: ToHost + ?Sized,
    V: ToHost + ?Sized,
{
    if !is_object(env, object) {
        return false;
    }
    let key = env.to_host(key);
    let value = env.to_host(value);
    env.host().set_property(object, key, value).is_ok()
}

/// Read `object[key]`; `None` if the key is missing or does not convert.
pub fn get<K, V>(env: &Env, object: Value, key: &K) -> Option<V>
where
    K: ToHost + ?Sized,
    V: FromHost,
{
    if !is_object(env, object) {
        return None;
    }
    let host = env.host();
    let key = env.to_host(key);
    // Checked first so a missing key never reads as `undefined`.
    if !host.has_property(object, key).ok()? {
        return None;
    }
    let value = host.get_property(object, key).ok()?;
    V::from_host(env, value)
}

/// `delete object[key]`.
pub fn delete<K: ToHost + ?Sized>(env: &Env, object: Value, key: &K) -> bool {
    if !is_object(env, object) {
        return false;
    }
    let key = env.to_host(key);
    env.host().delete_property(object, key).unwrap_or(false)
}

/// Like [`get`], but a missing key succeeds and leaves `out` untouched.
pub fn read_option<K, V>(env: &Env, object: Value, key: &K, out: &mut V) -> bool
where
    K: ToHost + ?Sized,
    V: FromHost,
{
    if !is_object(env, object) {
        return false;
    }
    let host = env.host();
    let key = env.to_host(key);
    match host.has_property(object, key) {
        Ok(true) => {}
        _ => return true,
    }
    let Ok(value) = host.get_property(object, key) else {
        return false;
    };
    match V::from_host(env, value) {
        Some(converted) => {
            *out = converted;
            true
        }
        None => false,
    }
}
