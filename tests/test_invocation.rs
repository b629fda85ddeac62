//! Calls in both directions through the public API

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ptr::NonNull;
use std::rc::Rc;

use hostbind::abi::CallFrame;
use hostbind::convert::dict;
use hostbind::sim::SimHost;
use hostbind::{
    BindError, CallFlags, ClassBuilder, Config, Env, Host, HostFunction, NativeClass,
    NativeFunction, Value,
};

fn setup() -> (Rc<SimHost>, Env) {
    let sim = SimHost::new();
    let env = Env::new(sim.host_ref());
    (sim, env)
}

/// Native listeners registry fed from script code.
#[derive(Default)]
struct Emitter {
    listeners: RefCell<BTreeMap<String, Vec<HostFunction<(String,), bool>>>>,
}

impl Emitter {
    fn emit(&self, event: &str, payload: &str) -> Vec<Result<bool, BindError>> {
        let listeners = self.listeners.borrow().get(event).cloned().unwrap_or_default();
        listeners
            .iter()
            .map(|listener| listener.call((payload.to_string(),)))
            .collect()
    }
}

fn install_emitter(env: &Env, emitter: &Rc<Emitter>) -> Value {
    let exports = env.host().create_object().unwrap();

    let target = emitter.clone();
    let on = NativeFunction::new("on", move |event: String, listener: HostFunction<(String,), bool>| {
        target
            .listeners
            .borrow_mut()
            .entry(event)
            .or_default()
            .push(listener);
    });
    let target = emitter.clone();
    let count = NativeFunction::new("listenerCount", move |event: String| {
        target.listeners.borrow().get(&event).map_or(0, Vec::len) as u32
    });

    assert!(dict::set(env, exports, "on", &on));
    assert!(dict::set(env, exports, "listenerCount", &count));
    exports
}

fn listener(sim: &SimHost, prefix: &'static str) -> Value {
    sim.script_function("listener", move |host: &SimHost, frame: &CallFrame| {
        let payload = host.value_string_utf8(*frame.args.first()?).ok()?;
        Some(host.get_boolean(payload.starts_with(prefix)))
    })
    .unwrap()
}

#[test]
fn test_stored_listeners_are_called_later() {
    let (sim, env) = setup();
    let emitter = Rc::new(Emitter::default());

    {
        let _scope = env.handle_scope();
        let exports = install_emitter(&env, &emitter);
        let event = env.to_host("message");
        sim.call_method(exports, "on", &[event, listener(&sim, "hi")])
            .unwrap();
        sim.call_method(exports, "on", &[event, listener(&sim, "bye")])
            .unwrap();

        let count = sim.call_method(exports, "listenerCount", &[event]).unwrap();
        assert_eq!(env.from_host::<u32>(count), Some(2));
    }

    // Strong handles keep the listeners alive across collections.
    sim.gc();
    let _scope = env.handle_scope();
    assert_eq!(emitter.emit("message", "hi there"), vec![Ok(true), Ok(false)]);
    assert!(emitter.emit("other", "hi").is_empty());
    assert_eq!(sim.callback_scope_depth(), 0);
}

#[test]
fn test_listener_with_wrong_return_type() {
    let (sim, env) = setup();
    let emitter = Rc::new(Emitter::default());
    let _scope = env.handle_scope();
    let exports = install_emitter(&env, &emitter);

    let echo = sim
        .script_function("echo", |_host: &SimHost, frame: &CallFrame| frame.args.first().copied())
        .unwrap();
    sim.call_method(exports, "on", &[env.to_host("message"), echo])
        .unwrap();

    assert_eq!(
        emitter.emit("message", "x"),
        vec![Err(BindError::ReturnMismatch {
            expected: "Boolean".to_string(),
            actual: "String".to_string(),
        })]
    );
}

#[test]
fn test_registration_rejects_non_functions() {
    let (sim, env) = setup();
    let emitter = Rc::new(Emitter::default());
    let _scope = env.handle_scope();
    let exports = install_emitter(&env, &emitter);

    let err = sim
        .call_method(exports, "on", &[env.to_host("message"), env.to_host(&5)])
        .unwrap_err();
    assert_eq!(err.name, "TypeError");
    assert_eq!(
        err.message,
        "Error processing argument at index 1, conversion failure from Number to Function."
    );
    assert!(emitter.listeners.borrow().is_empty());
}

#[test]
fn test_weak_listener_does_not_keep_function_alive() {
    let (sim, env) = setup();
    let stored: Rc<RefCell<Vec<HostFunction<()>>>> = Rc::default();

    {
        let _scope = env.handle_scope();
        let target = stored.clone();
        let subscribe = env
            .function_with_flags(
                "subscribe",
                CallFlags::FUNCTION_ARGUMENT_IS_WEAK,
                move |callback: HostFunction<()>| target.borrow_mut().push(callback),
            )
            .unwrap();
        let callback = sim
            .script_function("tick", |host: &SimHost, _frame: &CallFrame| Some(host.get_undefined()))
            .unwrap();
        sim.call(subscribe, env.undefined(), &[callback]).unwrap();
    }

    sim.gc();
    let _scope = env.handle_scope();
    let callbacks = stored.borrow();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].call(()), Err(BindError::CallableCollected));
}

#[test]
fn test_exception_from_listener_reaches_the_host() {
    let sim = SimHost::new();
    let env = Env::with_config(sim.host_ref(), Config::default());
    let _scope = env.handle_scope();

    let failing = sim
        .script_function("failing", |host: &SimHost, _frame: &CallFrame| {
            let _ = host.throw_error(hostbind::abi::ErrorKind::TypeError, "listener broke");
            None
        })
        .unwrap();
    let f: HostFunction<(String,), bool> = env.from_host(failing).unwrap();

    let result = f.call(("payload".to_string(),));
    assert_eq!(
        result,
        Err(BindError::UncaughtException("TypeError: listener broke".to_string()))
    );
    assert_eq!(sim.uncaught_exceptions(), vec!["TypeError: listener broke".to_string()]);

    // The channel left nothing pending, so calls keep working.
    let again: HostFunction<(String,), bool> = env.from_host(listener(&sim, "p")).unwrap();
    assert_eq!(again.call(("payload".to_string(),)), Ok(true));
}

#[test]
fn test_native_functions_round_trip_through_the_host() {
    let (sim, env) = setup();
    let _scope = env.handle_scope();

    let join = NativeFunction::new("join", |parts: Vec<String>, separator: Option<String>| {
        parts.join(separator.as_deref().unwrap_or(","))
    });
    let value = env.to_host(&join);
    let back: HostFunction<(Vec<&str>, Option<&str>), String> = env.from_host(value).unwrap();

    assert_eq!(back.call((vec!["a", "b"], None)), Ok("a,b".to_string()));
    assert_eq!(back.call((vec!["a", "b"], Some(" + "))), Ok("a + b".to_string()));

    let direct = sim
        .call(value, env.undefined(), &[env.to_host(&vec!["x"])])
        .unwrap();
    assert_eq!(env.from_host::<String>(direct).as_deref(), Some("x"));
}

struct Tally {
    count: u32,
}

impl NativeClass for Tally {
    const NAME: &'static str = "Tally";

    fn define(class: &mut ClassBuilder<Self>) {
        class
            .method("bump", |tally: &mut Tally| {
                tally.count += 1;
                tally.count
            })
            .method("run", |tally: &mut Tally, callback: HostFunction<(), String>| {
                tally.count += 10;
                let reply = callback.call(()).unwrap_or_else(|err| err.to_string());
                tally.count += 10;
                reply
            });
    }
}

/// Script callback calling `bump` on `target` and reporting the outcome.
fn bump_from_script(sim: &SimHost, target: Value) -> Value {
    sim.script_function("bumpFromScript", move |host: &SimHost, _frame: &CallFrame| {
        let reply = match host.call_method(target, "bump", &[]) {
            Ok(count) => format!("bumped to {}", host.value_double(count).ok()?),
            Err(err) => format!("{}: {}", err.name, err.message),
        };
        host.create_string_utf8(&reply).ok()
    })
    .unwrap()
}

#[test]
fn test_reentrant_call_on_the_same_object_is_rejected() {
    let (sim, env) = setup();
    let mut tally = Tally { count: 0 };
    let _scope = env.handle_scope();
    let object = env.wrap(NonNull::from(&mut tally)).unwrap();

    let reply = sim
        .call_method(object, "run", &[bump_from_script(&sim, object)])
        .unwrap();
    assert_eq!(
        env.from_host::<String>(reply).as_deref(),
        Some("Error: Tally object is already in use")
    );
    assert_eq!(tally.count, 20);

    // The receiver is free again once the outer call returned.
    let count = sim.call_method(object, "bump", &[]).unwrap();
    assert_eq!(env.from_host::<u32>(count), Some(21));
    assert_eq!(sim.callback_scope_depth(), 0);
}

#[test]
fn test_reentrant_call_on_another_object_proceeds() {
    let (sim, env) = setup();
    let mut outer = Tally { count: 0 };
    let mut inner = Tally { count: 5 };
    let _scope = env.handle_scope();
    let outer_object = env.wrap(NonNull::from(&mut outer)).unwrap();
    let inner_object = env.wrap(NonNull::from(&mut inner)).unwrap();

    let reply = sim
        .call_method(outer_object, "run", &[bump_from_script(&sim, inner_object)])
        .unwrap();
    assert_eq!(env.from_host::<String>(reply).as_deref(), Some("bumped to 6"));
    assert_eq!(outer.count, 20);
    assert_eq!(inner.count, 6);
}
