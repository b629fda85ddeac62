//! Composite converters
//!
//! Each impl only sequences its element converters: a composite read fails
//! exactly when some element read fails.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use super::{is_nullish, type_of, FromHost, ToHost};
use crate::abi::{AbiResult, Value, ValueType};
use crate::context::Env;
use crate::invoke::CallFlags;

// ============================================================================
// Option
// ============================================================================

impl<T: ToHost> ToHost for Option<T> {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        match self {
            Some(value) => value.to_host(env),
            None => Ok(env.host().get_undefined()),
        }
    }
}

/// `undefined` and `null` read as `None`; a missing argument does too.
impl<T: FromHost> FromHost for Option<T> {
    const NAME: &'static str = T::NAME;
    const OPTIONAL: bool = true;

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        if is_nullish(env, value) {
            return Some(None);
        }
        T::from_host(env, value).map(Some)
    }

    fn from_argument(env: &Env, value: Value, flags: CallFlags) -> Option<Self> {
        if is_nullish(env, value) {
            return Some(None);
        }
        T::from_argument(env, value, flags).map(Some)
    }

    fn absent() -> Option<Self> {
        Some(None)
    }
}

// ============================================================================
// Sequences and sets
// ============================================================================

fn sequence_to_host<'a, T, I>(env: &Env, length: usize, items: I) -> AbiResult<Value>
where
    T: ToHost + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let host = env.host();
    let array = host.create_array(length as u32)?;
    for (index, item) in items.into_iter().enumerate() {
        let element = item.to_host(env)?;
        host.set_element(array, index as u32, element)?;
    }
    Ok(array)
}

/// Visit every element of a host array in order, stopping at the first
/// element that fails to convert.
fn iterate_array<T: FromHost>(env: &Env, value: Value, mut visit: impl FnMut(T)) -> Option<()> {
    let host = env.host();
    if !host.is_array(value).ok()? {
        return None;
    }
    let length = host.array_length(value).ok()?;
    for index in 0..length {
        let element = host.get_element(value, index).ok()?;
        visit(T::from_host(env, element)?);
    }
    Some(())
}

impl<T: ToHost> ToHost for [T] {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        sequence_to_host(env, self.len(), self)
    }
}

impl<T: ToHost> ToHost for Vec<T> {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        sequence_to_host(env, self.len(), self)
    }
}

impl<T: FromHost> FromHost for Vec<T> {
    const NAME: &'static str = "Array";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        let mut result = Vec::new();
        iterate_array(env, value, |item| result.push(item))?;
        Some(result)
    }
}

impl<T: ToHost> ToHost for BTreeSet<T> {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        sequence_to_host(env, self.len(), self)
    }
}

impl<T: FromHost + Ord> FromHost for BTreeSet<T> {
    const NAME: &'static str = "Array";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        let mut result = BTreeSet::new();
        iterate_array(env, value, |item| {
            result.insert(item);
        })?;
        Some(result)
    }
}

impl<T: ToHost> ToHost for HashSet<T> {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        sequence_to_host(env, self.len(), self)
    }
}

impl<T: FromHost + Eq + Hash> FromHost for HashSet<T> {
    const NAME: &'static str = "Array";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        let mut result = HashSet::new();
        iterate_array(env, value, |item| {
            result.insert(item);
        })?;
        Some(result)
    }
}

// ============================================================================
// Maps
// ============================================================================

/// A map key; host objects are keyed by strings.
pub trait MapKey: Sized {
    fn to_key(&self) -> String;

    fn from_key(key: &str) -> Option<Self>;
}

impl MapKey for String {
    fn to_key(&self) -> String {
        self.clone()
    }

    fn from_key(key: &str) -> Option<Self> {
        Some(key.to_string())
    }
}

macro_rules! impl_map_key {
    ($($ty:ty),+) => {$(
        impl MapKey for $ty {
            fn to_key(&self) -> String {
                self.to_string()
            }

            fn from_key(key: &str) -> Option<Self> {
                key.parse().ok()
            }
        }
    )+};
}

impl_map_key!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, bool, char);

fn map_to_host<'a, K, V, I>(env: &Env, entries: I) -> AbiResult<Value>
where
    K: MapKey + 'a,
    V: ToHost + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    let host = env.host();
    let object = host.create_object()?;
    for (key, value) in entries {
        let value = value.to_host(env)?;
        host.set_named_property(object, &key.to_key(), value)?;
    }
    Ok(object)
}

/// Visit own enumerable properties of a plain (non-array) object.
fn iterate_object<K: MapKey, V: FromHost>(
    env: &Env,
    object: Value,
    mut visit: impl FnMut(K, V),
) -> Option<()> {
    let host = env.host();
    if type_of(env, object)? != ValueType::Object || host.is_array(object).ok()? {
        return None;
    }
    let names = host.property_names(object).ok()?;
    let count = host.array_length(names).ok()?;
    for index in 0..count {
        let name = host.get_element(names, index).ok()?;
        let name = host.value_string_utf8(name).ok()?;
        let value = host.get_named_property(object, &name).ok()?;
        visit(K::from_key(&name)?, V::from_host(env, value)?);
    }
    Some(())
}

impl<K: MapKey, V: ToHost, S> ToHost for HashMap<K, V, S> {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        map_to_host(env, self.iter())
    }
}

impl<K, V, S> FromHost for HashMap<K, V, S>
where
    K: MapKey + Eq + Hash,
    V: FromHost,
    S: std::hash::BuildHasher + Default,
{
    const NAME: &'static str = "Object";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        let mut result = HashMap::default();
        iterate_object(env, value, |key, value| {
            result.insert(key, value);
        })?;
        Some(result)
    }
}

impl<K: MapKey, V: ToHost> ToHost for BTreeMap<K, V> {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        map_to_host(env, self.iter())
    }
}

impl<K: MapKey + Ord, V: FromHost> FromHost for BTreeMap<K, V> {
    const NAME: &'static str = "Object";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        let mut result = BTreeMap::new();
        iterate_object(env, value, |key, value| {
            result.insert(key, value);
        })?;
        Some(result)
    }
}

// ============================================================================
// Tuples
// ============================================================================

macro_rules! impl_tuple {
    ($len:expr => $($name:ident : $index:tt),+) => {
        impl<$($name: ToHost),+> ToHost for ($($name,)+) {
            fn to_host(&self, env: &Env) -> AbiResult<Value> {
                let host = env.host();
                let array = host.create_array($len)?;
                $(
                    let element = self.$index.to_host(env)?;
                    host.set_element(array, $index, element)?;
                )+
                Ok(array)
            }
        }

        impl<$($name: FromHost),+> FromHost for ($($name,)+) {
            const NAME: &'static str = "Tuple";

            fn from_host(env: &Env, value: Value) -> Option<Self> {
                let host = env.host();
                if !host.is_array(value).ok()? || host.array_length(value).ok()? != $len {
                    return None;
                }
                Some(($(
                    $name::from_host(env, host.get_element(value, $index).ok()?)?,
                )+))
            }
        }
    };
}

impl_tuple!(1 => A: 0);
impl_tuple!(2 => A: 0, B: 1);
impl_tuple!(3 => A: 0, B: 1, C: 2);
impl_tuple!(4 => A: 0, B: 1, C: 2, D: 3);
impl_tuple!(5 => A: 0, B: 1, C: 2, D: 3, E: 4);
impl_tuple!(6 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

// ============================================================================
// Variants
// ============================================================================

/// One of two alternatives; reads try `Left` first.
///
/// Nest for more alternatives: `Either<A, Either<B, C>>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L: ToHost, R: ToHost> ToHost for Either<L, R> {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        match self {
            Either::Left(value) => value.to_host(env),
            Either::Right(value) => value.to_host(env),
        }
    }
}

impl<L: FromHost, R: FromHost> FromHost for Either<L, R> {
    const NAME: &'static str = "Variant";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        L::from_host(env, value)
            .map(Either::Left)
            .or_else(|| R::from_host(env, value).map(Either::Right))
    }
}
