use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use serde_json::json;

use super::*;
use crate::abi::Host;
use crate::sim::SimHost;

fn setup() -> (Rc<SimHost>, Env) {
    let sim = SimHost::new();
    let env = Env::new(sim.host_ref());
    (sim, env)
}

#[test]
fn test_integers_truncate_and_check_range() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    assert_eq!(env.from_host::<i32>(env.to_host(&-7.9)), Some(-7));
    assert_eq!(env.from_host::<u8>(env.to_host(&255)), Some(255));
    assert_eq!(env.from_host::<u8>(env.to_host(&256)), None);
    assert_eq!(env.from_host::<u32>(env.to_host(&-1)), None);
    assert_eq!(env.from_host::<i64>(env.to_host(&f64::NAN)), None);
    assert_eq!(env.from_host::<i64>(env.to_host(&f64::INFINITY)), None);
    assert_eq!(env.from_host::<i32>(env.to_host("12")), None);
}

#[test]
fn test_wide_integers_saturate() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    assert_eq!(env.from_host::<i64>(env.to_host(&i64::MAX)), Some(i64::MAX));
    assert_eq!(env.from_host::<i64>(env.to_host(&i64::MIN)), Some(i64::MIN));
    assert_eq!(env.from_host::<i64>(env.to_host(&1e30)), Some(i64::MAX));
    assert_eq!(env.from_host::<i64>(env.to_host(&-1e30)), Some(i64::MIN));
    assert_eq!(env.from_host::<i64>(env.to_host(&-2.5)), Some(-2));
    assert_eq!(env.from_host::<i64>(env.to_host(&(1i64 << 53))), Some(1 << 53));

    assert_eq!(env.from_host::<u64>(env.to_host(&u64::MAX)), Some(u64::MAX));
    assert_eq!(env.from_host::<u64>(env.to_host(&1e30)), Some(u64::MAX));
    assert_eq!(env.from_host::<u64>(env.to_host(&0u64)), Some(0));
    assert_eq!(env.from_host::<u64>(env.to_host(&-1)), None);
    assert_eq!(env.from_host::<u64>(env.to_host(&f64::INFINITY)), None);
    assert_eq!(env.from_host::<usize>(env.to_host(&42usize)), Some(42));
    assert_eq!(env.from_host::<i64>(env.to_host("7")), None);
}

#[test]
fn test_env_for_host_shares_the_installed_context() {
    let (sim, env) = setup();
    let again = Env::for_host(&sim.host_ref());
    assert!(std::ptr::eq(env.context(), again.context()));

    let _scope = again.handle_scope();
    assert_eq!(again.from_host::<f32>(again.to_host(&1.25f32)), Some(1.25));
}

#[test]
fn test_numbers_and_booleans() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    assert_eq!(env.from_host::<f64>(env.to_host(&3.14)), Some(3.14));
    assert_eq!(env.from_host::<f32>(env.to_host(&0.5f32)), Some(0.5));
    assert_eq!(env.from_host::<bool>(env.to_host(&true)), Some(true));
    assert_eq!(env.from_host::<bool>(env.to_host(&1)), None);
    assert_eq!(env.from_host::<f64>(env.to_host(&true)), None);
}

#[test]
fn test_strings() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    assert_eq!(env.from_host::<String>(env.to_host("abc")).as_deref(), Some("abc"));
    assert_eq!(env.from_host::<String>(env.to_host(&42)), None);

    let wide = Utf16String::from("héllo");
    let back: Utf16String = env.from_host(env.to_host(&wide)).unwrap();
    assert_eq!(back.to_string_lossy(), "héllo");
}

#[test]
fn test_markers() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();
    let host = env.host();

    assert_eq!(host.type_of(env.to_host(&())).unwrap(), ValueType::Undefined);
    assert_eq!(host.type_of(env.to_host(&Null)).unwrap(), ValueType::Null);
    assert_eq!(host.type_of(env.to_host(&Undefined)).unwrap(), ValueType::Undefined);

    assert!(env.from_host::<Null>(env.undefined()).is_some());
    assert!(env.from_host::<Undefined>(env.null()).is_some());
    assert!(env.from_host::<Null>(env.to_host(&0)).is_none());
    assert!(env.from_host::<()>(env.to_host("anything")).is_some());
}

#[test]
fn test_option_reads_nullish_as_none() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    assert_eq!(env.from_host::<Option<i32>>(env.undefined()), Some(None));
    assert_eq!(env.from_host::<Option<i32>>(env.null()), Some(None));
    assert_eq!(env.from_host::<Option<i32>>(env.to_host(&5)), Some(Some(5)));
    // Present but mismatched is a failure, not `None`.
    assert_eq!(env.from_host::<Option<i32>>(env.to_host("5")), None);

    let none: Option<i32> = None;
    assert!(is_nullish(&env, env.to_host(&none)));
    assert_eq!(<Option<i32> as FromHost>::absent(), Some(None));
    assert_eq!(<i32 as FromHost>::absent(), None);
}

#[test]
fn test_sequences() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    let array = env.to_host(&vec![1, 2, 3]);
    assert_eq!(env.from_host::<Vec<i32>>(array), Some(vec![1, 2, 3]));
    assert_eq!(env.host().array_length(array).unwrap(), 3);

    let slice: &[&str] = &["a", "b"];
    let strings: Vec<String> = env.from_host(env.to_host(slice)).unwrap();
    assert_eq!(strings, vec!["a", "b"]);

    let mixed = env.to_host(&(1, "two"));
    assert_eq!(env.from_host::<Vec<i32>>(mixed), None);

    let set: BTreeSet<u32> = env.from_host(env.to_host(&vec![3, 1, 3])).unwrap();
    assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![1, 3]);

    let object = env.host().create_object().unwrap();
    assert_eq!(env.from_host::<Vec<i32>>(object), None);
}

#[test]
fn test_maps() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    let mut map = HashMap::new();
    map.insert("a".to_string(), 1);
    let object = env.to_host(&map);
    assert_eq!(env.from_host::<HashMap<String, i32>>(object), Some(map));

    let mut numbered = BTreeMap::new();
    numbered.insert(10u32, true);
    numbered.insert(2u32, false);
    let back: BTreeMap<u32, bool> = env.from_host(env.to_host(&numbered)).unwrap();
    assert_eq!(back, numbered);

    // Arrays are not maps, and keys must parse.
    assert_eq!(env.from_host::<HashMap<String, i32>>(env.to_host(&vec![1])), None);
    let words = env.to_host(&map_of("x", 1));
    assert_eq!(env.from_host::<BTreeMap<u32, i32>>(words), None);
}

fn map_of(key: &str, value: i32) -> BTreeMap<String, i32> {
    let mut map = BTreeMap::new();
    map.insert(key.to_string(), value);
    map
}

#[test]
fn test_tuples_require_exact_length() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    let tuple = env.to_host(&(1, true, "x"));
    let back: (i32, bool, String) = env.from_host(tuple).unwrap();
    assert_eq!(back, (1, true, "x".to_string()));

    assert_eq!(env.from_host::<(i32, bool)>(tuple), None);
    assert_eq!(env.from_host::<(i32, i32, i32)>(tuple), None);
}

#[test]
fn test_either_tries_left_first() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    let number = env.to_host(&7);
    assert_eq!(env.from_host::<Either<i32, f64>>(number), Some(Either::Left(7)));
    assert_eq!(
        env.from_host::<Either<String, f64>>(number),
        Some(Either::Right(7.0))
    );
    assert_eq!(env.from_host::<Either<String, bool>>(number), None);

    let value: Either<i32, String> = Either::Right("r".to_string());
    assert_eq!(env.from_host::<String>(env.to_host(&value)).as_deref(), Some("r"));
}

#[test]
fn test_json_values() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    let document = json!({"name": "hostbind", "tags": ["a", "b"], "size": 3, "ratio": 0.25, "none": null});
    let value = env.to_host(&document);
    assert_eq!(env.from_host::<serde_json::Value>(value), Some(document));

    assert_eq!(
        env.from_host::<serde_json::Value>(env.undefined()),
        Some(serde_json::Value::Null)
    );
    let function = env
        .function("noop", || ())
        .unwrap();
    assert_eq!(env.from_host::<serde_json::Value>(function), None);
}

#[test]
fn test_type_names() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    assert_eq!(type_name_of(&env, env.undefined()), "undefined");
    assert_eq!(type_name_of(&env, env.to_host(&1)), "Number");
    assert_eq!(type_name_of(&env, env.to_host("s")), "String");
    assert_eq!(type_name_of(&env, env.to_host(&vec![1])), "Array");
    assert_eq!(type_name_of(&env, env.host().create_object().unwrap()), "Object");
}

#[test]
fn test_dict_helpers() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();
    let object = env.host().create_object().unwrap();

    assert!(dict::set(&env, object, "port", &8080));
    assert_eq!(dict::get::<_, u16>(&env, object, "port"), Some(8080));
    assert_eq!(dict::get::<_, String>(&env, object, "port"), None);
    assert_eq!(dict::get::<_, u16>(&env, object, "missing"), None);

    let mut port = 0u16;
    assert!(dict::read_option(&env, object, "port", &mut port));
    assert_eq!(port, 8080);

    let mut host_name = "localhost".to_string();
    assert!(dict::read_option(&env, object, "host", &mut host_name));
    assert_eq!(host_name, "localhost");

    let mut wrong = String::new();
    assert!(!dict::read_option(&env, object, "port", &mut wrong));

    assert!(dict::delete(&env, object, "port"));
    assert_eq!(dict::get::<_, u16>(&env, object, "port"), None);

    let number = env.to_host(&1);
    assert!(!dict::set(&env, number, "x", &1));
    assert!(!dict::read_option(&env, number, "x", &mut port));
}

#[test]
fn test_failed_conversion_yields_undefined() {
    let (_sim, env) = setup();
    let _scope = env.handle_scope();

    let deep = (0..200).fold(json!(0), |inner, _| json!([inner]));
    let value = env.to_host(&deep);
    assert!(is_nullish(&env, value));
}
