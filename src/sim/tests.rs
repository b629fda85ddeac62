use std::cell::Cell;
use std::rc::Rc;

use super::*;

fn with_scope<R>(sim: &SimHost, f: impl FnOnce() -> R) -> R {
    let scope = sim.open_handle_scope().unwrap();
    let result = f();
    sim.close_handle_scope(scope).unwrap();
    result
}

thread_local! {
    static ORDER: std::cell::RefCell<Vec<&'static str>> = std::cell::RefCell::new(Vec::new());
}

fn record_wrap(_host: &HostRef, _data: RawPtr, _hint: RawPtr) {
    ORDER.with(|order| order.borrow_mut().push("wrap"));
}

fn record_added(_host: &HostRef, _data: RawPtr, _hint: RawPtr) {
    ORDER.with(|order| order.borrow_mut().push("added"));
}

fn count_finalizer(_host: &HostRef, data: RawPtr, _hint: RawPtr) {
    // SAFETY: tests pass a pointer to a `Cell<u32>` that outlives the host.
    let counter = unsafe { &*(data as *const Cell<u32>) };
    counter.set(counter.get() + 1);
}

#[test]
fn test_scalars_round_trip_through_handles() {
    let sim = SimHost::new();
    let _ = with_scope(&sim, || {
        let n = sim.create_double(2.5).unwrap();
        let s = sim.create_string_utf8("text").unwrap();
        assert_eq!(sim.type_of(n).unwrap(), ValueType::Number);
        assert_eq!(sim.value_double(n).unwrap(), 2.5);
        assert_eq!(sim.value_string_utf8(s).unwrap(), "text");
        assert_eq!(sim.value_int32(n).unwrap(), 2);
        assert_eq!(sim.value_double(s), Err(Status::NumberExpected));
    });
    assert_eq!(sim.handle_scope_depth(), 0);
}

#[test]
#[should_panic(expected = "value handle used outside its scope")]
fn test_stale_handle_is_fatal() {
    let sim = SimHost::new();
    let stale = with_scope(&sim, || sim.create_int32(1).unwrap());
    let _scope = sim.open_handle_scope().unwrap();
    sim.create_int32(2).unwrap();
    let _ = sim.value_int32(stale);
}

#[test]
fn test_scopes_close_in_order() {
    let sim = SimHost::new();
    let outer = sim.open_handle_scope().unwrap();
    let inner = sim.open_handle_scope().unwrap();
    assert_eq!(sim.close_handle_scope(outer), Err(Status::HandleScopeMismatch));
    sim.close_handle_scope(inner).unwrap();
    sim.close_handle_scope(outer).unwrap();

    let callback = sim.open_callback_scope().unwrap();
    assert_eq!(sim.callback_scope_depth(), 1);
    sim.close_callback_scope(callback).unwrap();
    assert_eq!(sim.close_callback_scope(callback), Err(Status::CallbackScopeMismatch));
}

#[test]
fn test_weak_reference_empties_before_finalizers_run() {
    let sim = SimHost::new();
    let finalized = Cell::new(0u32);

    let weak = with_scope(&sim, || {
        let object = sim.create_object().unwrap();
        let data = &finalized as *const Cell<u32> as RawPtr;
        sim.add_finalizer(object, data, count_finalizer, ptr::null_mut())
            .unwrap();
        sim.create_reference(object, 0).unwrap()
    });

    assert_eq!(sim.collect_garbage(), 1);
    assert_eq!(sim.pending_finalizers(), 1);
    let _scope = sim.open_handle_scope().unwrap();
    assert_eq!(sim.reference_value(weak).unwrap(), None);
    assert_eq!(finalized.get(), 0);

    assert_eq!(sim.run_finalizers(), 1);
    assert_eq!(finalized.get(), 1);
    assert_eq!(sim.stats().finalizers_run, 1);
    sim.delete_reference(weak).unwrap();
}

#[test]
fn test_strong_reference_roots_object() {
    let sim = SimHost::new();
    let finalized = Cell::new(0u32);

    let strong = with_scope(&sim, || {
        let object = sim.create_object().unwrap();
        let data = &finalized as *const Cell<u32> as RawPtr;
        sim.add_finalizer(object, data, count_finalizer, ptr::null_mut())
            .unwrap();
        sim.create_reference(object, 1).unwrap()
    });

    sim.gc();
    assert_eq!(finalized.get(), 0);

    assert_eq!(sim.reference_unref(strong).unwrap(), 0);
    assert_eq!(sim.reference_unref(strong), Err(Status::GenericFailure));
    sim.gc();
    assert_eq!(finalized.get(), 1);
    sim.delete_reference(strong).unwrap();
    assert_eq!(sim.reference_count(), 0);
}

#[test]
fn test_wrap_finalizer_runs_before_added_finalizers() {
    let sim = SimHost::new();
    ORDER.with(|order| order.borrow_mut().clear());

    with_scope(&sim, || {
        let object = sim.create_object().unwrap();
        sim.add_finalizer(object, ptr::null_mut(), record_added, ptr::null_mut())
            .unwrap();
        sim.wrap(object, ptr::null_mut(), record_wrap, ptr::null_mut())
            .unwrap();
        assert_eq!(
            sim.wrap(object, ptr::null_mut(), record_wrap, ptr::null_mut()),
            Err(Status::InvalidArg)
        );
    });

    sim.gc();
    ORDER.with(|order| assert_eq!(*order.borrow(), vec!["wrap", "added"]));
}

#[test]
fn test_classes_and_prototype_chain() {
    let sim = SimHost::new();
    let _scope = sim.open_handle_scope().unwrap();

    fn empty(_host: &HostRef, _frame: &CallFrame) -> Option<Value> {
        None
    }

    let base = sim.define_class("Base", empty, ptr::null_mut()).unwrap();
    let derived = sim.define_class("Derived", empty, ptr::null_mut()).unwrap();
    let base_proto = sim.get_named_property(base, "prototype").unwrap();
    let derived_proto = sim.get_named_property(derived, "prototype").unwrap();

    let instance = sim.construct(derived, &[]).unwrap();
    assert!(sim.instance_of(instance, derived).unwrap());
    assert!(!sim.instance_of(instance, base).unwrap());

    let global = sim.global().unwrap();
    let object = sim.get_named_property(global, "Object").unwrap();
    sim.call_method(object, "setPrototypeOf", &[derived_proto, base_proto])
        .unwrap();
    assert!(sim.instance_of(instance, base).unwrap());

    // `prototype` is fixed, `constructor` is hidden.
    let other = sim.create_object().unwrap();
    sim.set_named_property(derived, "prototype", other).unwrap();
    let still = sim.get_named_property(derived, "prototype").unwrap();
    assert!(sim.strict_equals(still, derived_proto).unwrap());
    let names = sim.property_names(derived_proto).unwrap();
    assert_eq!(sim.array_length(names).unwrap(), 0);
}

#[test]
fn test_set_prototype_of_rejects_primitives() {
    let sim = SimHost::new();
    let _scope = sim.open_handle_scope().unwrap();
    let global = sim.global().unwrap();
    let object = sim.get_named_property(global, "Object").unwrap();

    let target = sim.create_object().unwrap();
    let number = sim.create_int32(3).unwrap();
    let err = sim
        .call_method(object, "setPrototypeOf", &[target, number])
        .unwrap_err();
    assert_eq!(err.name, "TypeError");
}

#[test]
fn test_accessors_call_through_receiver() {
    let sim = SimHost::new();
    let _scope = sim.open_handle_scope().unwrap();

    let getter = sim
        .script_function("get", |host: &SimHost, frame: &CallFrame| {
            host.get_named_property(frame.this, "_hidden").ok()
        })
        .unwrap();
    let setter = sim
        .script_function("set", |host: &SimHost, frame: &CallFrame| {
            let value = *frame.args.first()?;
            host.set_named_property(frame.this, "_hidden", value).ok()?;
            None
        })
        .unwrap();

    let object = sim.create_object().unwrap();
    sim.define_property(
        object,
        &PropertyDescriptor {
            name: "value",
            value: None,
            getter: Some(getter),
            setter: Some(setter),
            attributes: PropertyAttributes {
                writable: false,
                enumerable: true,
                configurable: false,
            },
        },
    )
    .unwrap();

    let seven = sim.create_int32(7).unwrap();
    sim.set_named_property(object, "value", seven).unwrap();
    let read = sim.get_named_property(object, "value").unwrap();
    assert_eq!(sim.value_int32(read).unwrap(), 7);

    let key = sim.create_string_utf8("value").unwrap();
    assert!(!sim.delete_property(object, key).unwrap());
}

#[test]
fn test_thrown_errors_block_calls_until_cleared() {
    let sim = SimHost::new();
    let _scope = sim.open_handle_scope().unwrap();
    let noop = sim
        .script_function("noop", |host: &SimHost, _frame: &CallFrame| {
            Some(host.get_undefined())
        })
        .unwrap();

    sim.throw_error(ErrorKind::RangeError, "first").unwrap();
    sim.throw_error(ErrorKind::Error, "second").unwrap();
    let undefined = sim.get_undefined();
    assert_eq!(
        sim.call_function(undefined, noop, &[]),
        Err(Status::PendingException)
    );

    let error = sim.take_error().unwrap();
    assert_eq!(
        error,
        SimError {
            name: "RangeError".to_string(),
            message: "first".to_string(),
        }
    );
    assert!(sim.call(noop, undefined, &[]).is_ok());
}

#[test]
fn test_fatal_exception_is_recorded() {
    let sim = SimHost::new();
    let _scope = sim.open_handle_scope().unwrap();

    sim.throw_error(ErrorKind::TypeError, "bad").unwrap();
    let error = sim.get_and_clear_last_exception().unwrap();
    sim.fatal_exception(error).unwrap();
    assert_eq!(sim.uncaught_exceptions(), vec!["TypeError: bad".to_string()]);
    assert!(!sim.is_exception_pending());
}

#[test]
fn test_shutdown_finalizes_rooted_objects_and_drops_instance_data() {
    let sim = SimHost::new();
    let finalized = Cell::new(0u32);
    let data: Rc<dyn Any> = Rc::new(5u8);
    sim.set_instance_data(Some(data.clone()));

    let _strong = with_scope(&sim, || {
        let object = sim.create_object().unwrap();
        let counter = &finalized as *const Cell<u32> as RawPtr;
        sim.add_finalizer(object, counter, count_finalizer, ptr::null_mut())
            .unwrap();
        sim.create_reference(object, 1).unwrap()
    });

    sim.shutdown();
    assert_eq!(finalized.get(), 1);
    assert!(sim.instance_data().is_none());
    assert_eq!(Rc::strong_count(&data), 1);
}

#[test]
fn test_externals_and_arrays() {
    let sim = SimHost::new();
    let _scope = sim.open_handle_scope().unwrap();

    let mut payload = 9u32;
    let raw = &mut payload as *mut u32 as RawPtr;
    let external = sim.create_external(raw).unwrap();
    assert_eq!(sim.type_of(external).unwrap(), ValueType::External);
    assert_eq!(sim.value_external(external).unwrap(), raw);

    let array = sim.create_array(1).unwrap();
    let value = sim.create_int32(4).unwrap();
    sim.set_element(array, 2, value).unwrap();
    assert_eq!(sim.array_length(array).unwrap(), 3);
    let hole = sim.get_element(array, 1).unwrap();
    assert_eq!(sim.type_of(hole).unwrap(), ValueType::Undefined);
    assert!(sim.is_array(array).unwrap());
}
