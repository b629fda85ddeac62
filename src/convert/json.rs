//! `serde_json::Value` converter
//!
//! Maps JSON structurally: objects to plain objects, arrays to arrays.
//! Host values with no JSON shape (functions, externals, symbols) fail to
//! read; `undefined` reads as `null`.

use serde_json::{Map, Number, Value as Json};

use super::{type_of, FromHost, ToHost};
use crate::abi::{AbiResult, Status, Value, ValueType};
use crate::context::Env;

/// Nesting beyond this is treated as a cycle.
const MAX_DEPTH: usize = 128;

impl ToHost for Json {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        json_to_host(env, self, 0)
    }
}

impl FromHost for Json {
    const NAME: &'static str = "Value";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        json_from_host(env, value, 0)
    }
}

fn json_to_host(env: &Env, json: &Json, depth: usize) -> AbiResult<Value> {
    if depth > MAX_DEPTH {
        return Err(Status::InvalidArg);
    }
    let host = env.host();
    match json {
        Json::Null => Ok(host.get_null()),
        Json::Bool(b) => Ok(host.get_boolean(*b)),
        Json::Number(n) => host.create_double(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => host.create_string_utf8(s),
        Json::Array(items) => {
            let array = host.create_array(items.len() as u32)?;
            for (index, item) in items.iter().enumerate() {
                let element = json_to_host(env, item, depth + 1)?;
                host.set_element(array, index as u32, element)?;
            }
            Ok(array)
        }
        Json::Object(entries) => {
            let object = host.create_object()?;
            for (key, item) in entries {
                let element = json_to_host(env, item, depth + 1)?;
                host.set_named_property(object, key, element)?;
            }
            Ok(object)
        }
    }
}

fn json_from_host(env: &Env, value: Value, depth: usize) -> Option<Json> {
    if depth > MAX_DEPTH {
        return None;
    }
    let host = env.host();
    match type_of(env, value)? {
        ValueType::Undefined | ValueType::Null => Some(Json::Null),
        ValueType::Boolean => host.value_bool(value).ok().map(Json::Bool),
        ValueType::Number => {
            let n = host.value_double(value).ok()?;
            if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                Some(Json::Number(Number::from(n as i64)))
            } else {
                Some(Number::from_f64(n).map_or(Json::Null, Json::Number))
            }
        }
        ValueType::String => host.value_string_utf8(value).ok().map(Json::String),
        ValueType::Object if host.is_array(value).ok()? => {
            let length = host.array_length(value).ok()?;
            let mut items = Vec::with_capacity(length as usize);
            for index in 0..length {
                let element = host.get_element(value, index).ok()?;
                items.push(json_from_host(env, element, depth + 1)?);
            }
            Some(Json::Array(items))
        }
        ValueType::Object => {
            let names = host.property_names(value).ok()?;
            let count = host.array_length(names).ok()?;
            let mut entries = Map::new();
            for index in 0..count {
                let name = host.get_element(names, index).ok()?;
                let name = host.value_string_utf8(name).ok()?;
                let element = host.get_named_property(value, &name).ok()?;
                entries.insert(name, json_from_host(env, element, depth + 1)?);
            }
            Some(Json::Object(entries))
        }
        ValueType::Symbol | ValueType::Function | ValueType::External | ValueType::BigInt => None,
    }
}
