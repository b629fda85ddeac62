//! Values survive a trip into the host and back

use std::collections::BTreeMap;
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::json;

use hostbind::sim::SimHost;
use hostbind::{Env, FromHost, ToHost};

fn setup() -> (Rc<SimHost>, Env) {
    let sim = SimHost::new();
    let env = Env::new(sim.host_ref());
    (sim, env)
}

fn round_trip<T: ToHost + FromHost>(env: &Env, value: &T) -> Option<T> {
    let _scope = env.handle_scope();
    env.from_host(env.to_host(value))
}

#[test]
fn test_common_values() {
    let (_sim, env) = setup();

    assert_eq!(round_trip(&env, &"abc".to_string()).as_deref(), Some("abc"));
    assert_eq!(round_trip(&env, &42i32), Some(42));
    assert_eq!(round_trip(&env, &i64::MAX), Some(i64::MAX));
    assert_eq!(round_trip(&env, &i64::MIN), Some(i64::MIN));
    assert_eq!(round_trip(&env, &u64::MAX), Some(u64::MAX));
    assert_eq!(round_trip(&env, &3.14f64), Some(3.14));
    assert_eq!(round_trip(&env, &vec![1u32, 2, 3]), Some(vec![1, 2, 3]));
    assert_eq!(
        round_trip(&env, &(1i32, true, "x".to_string())),
        Some((1, true, "x".to_string()))
    );

    let document = json!({"a": 1});
    assert_eq!(round_trip(&env, &document), Some(document));
}

#[test]
fn test_nested_containers() {
    let (_sim, env) = setup();

    let mut inventory: BTreeMap<String, Vec<Option<u16>>> = BTreeMap::new();
    inventory.insert("bolts".to_string(), vec![Some(4), None, Some(12)]);
    inventory.insert("nuts".to_string(), Vec::new());
    assert_eq!(round_trip(&env, &inventory), Some(inventory.clone()));
}

#[test]
fn test_handles_do_not_accumulate() {
    let (sim, env) = setup();
    for n in 0..100 {
        assert_eq!(round_trip(&env, &vec![n; 8]), Some(vec![n; 8]));
    }
    sim.gc();
    assert_eq!(sim.handle_scope_depth(), 0);
    assert_eq!(sim.pending_finalizers(), 0);
}

proptest! {
    #[test]
    fn prop_strings_round_trip(text in ".*") {
        let (_sim, env) = setup();
        prop_assert_eq!(round_trip(&env, &text), Some(text.clone()));
    }

    #[test]
    fn prop_i32_round_trip(n in any::<i32>()) {
        let (_sim, env) = setup();
        prop_assert_eq!(round_trip(&env, &n), Some(n));
    }

    #[test]
    fn prop_finite_doubles_round_trip(x in proptest::num::f64::NORMAL | proptest::num::f64::ZERO) {
        let (_sim, env) = setup();
        prop_assert_eq!(round_trip(&env, &x), Some(x));
    }

    #[test]
    fn prop_safe_i64_round_trip(n in -(1i64 << 53)..=(1i64 << 53)) {
        let (_sim, env) = setup();
        prop_assert_eq!(round_trip(&env, &n), Some(n));
    }

    #[test]
    fn prop_i64_reads_the_nearest_host_number(n in any::<i64>()) {
        let (_sim, env) = setup();
        prop_assert_eq!(round_trip(&env, &n), Some(n as f64 as i64));
    }

    #[test]
    fn prop_u64_reads_the_nearest_host_number(n in any::<u64>()) {
        let (_sim, env) = setup();
        prop_assert_eq!(round_trip(&env, &n), Some(n as f64 as u64));
    }

    #[test]
    fn prop_u8_rejects_out_of_range(n in 256i64..=i64::from(u32::MAX)) {
        let (_sim, env) = setup();
        let _scope = env.handle_scope();
        prop_assert_eq!(env.from_host::<u8>(env.to_host(&n)), None);
    }

    #[test]
    fn prop_maps_round_trip(map in proptest::collection::btree_map("[a-z]{1,8}", any::<bool>(), 0..16)) {
        let (_sim, env) = setup();
        prop_assert_eq!(round_trip(&env, &map), Some(map.clone()));
    }
}
