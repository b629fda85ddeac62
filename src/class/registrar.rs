//! Per-runtime constructors and the construct trampoline
//!
//! Two construction paths share one host constructor:
//! - script: `new T(...)` runs the user constructor and hands the boxed
//!   result to the host
//! - native: `new T(<sentinel>)` returns a bare instance, which the caller
//!   then attaches an existing pointer to
//!
//! The sentinel is an external value holding the address of a private
//! static; script code cannot produce it.

use std::any::TypeId;
use std::marker::PhantomData;
use std::ptr;
use std::rc::Rc;

use crate::abi::{AbiResult, CallFrame, ErrorKind, HostRef, RawPtr, Value};
use crate::context::Env;
use crate::convert::ToHost;
use crate::invoke::Arguments;
use crate::lifetime::{attach_wrapper, create_instance};
use crate::logging::{log_class_defined, warn};

use super::property::define_members;
use super::{ClassBuilder, NativeClass, TypeDescriptor};

static CONSTRUCTOR_KEY: u8 = 0;

/// Payload of the native-construction sentinel.
pub(crate) fn constructor_key() -> RawPtr {
    ptr::addr_of!(CONSTRUCTOR_KEY) as RawPtr
}

fn is_sentinel(env: &Env, frame: &CallFrame) -> bool {
    match frame.args.as_slice() {
        [only] => env.host().value_external(*only).ok() == Some(constructor_key()),
        _ => false,
    }
}

/// The descriptor of `T`, built on first use in this runtime instance.
pub(crate) fn descriptor<T: NativeClass>(env: &Env) -> Rc<TypeDescriptor> {
    let type_id = TypeId::of::<T>();
    let known = env.context().descriptors.borrow().get(&type_id).cloned();
    if let Some(descriptor) = known {
        return descriptor;
    }

    // `define` may itself look up other descriptors.
    let mut builder = ClassBuilder::<T>::new();
    T::define(&mut builder);
    let descriptor = Rc::new(builder.build());

    env.context()
        .descriptors
        .borrow_mut()
        .entry(type_id)
        .or_insert(descriptor)
        .clone()
}

/// Convert a pointer of dynamic type `dynamic` to a pointer to `T`, walking
/// parent links.
pub(crate) fn upcast<T: NativeClass>(env: &Env, dynamic: TypeId, native: RawPtr) -> Option<RawPtr> {
    let target = TypeId::of::<T>();
    let mut native = native;
    let mut current = env.context().descriptors.borrow().get(&dynamic).cloned()?;

    while current.type_id != target {
        let link = current.parent.as_ref()?;
        native = (link.upcast)(native);
        let parent = (link.describe)(env);
        debug_assert_eq!(parent.type_id, link.type_id);
        current = parent;
    }
    Some(native)
}

impl Env {
    /// The host constructor of `T`, defined once per runtime instance.
    pub fn constructor_for<T: NativeClass>(&self) -> AbiResult<Value> {
        let descriptor = descriptor::<T>(self);
        materialize(self, &descriptor)
    }

    /// Whether `value` is an instance of `T`'s class or of a subclass.
    pub fn instance_of<T: NativeClass>(&self, value: Value) -> bool {
        self.constructor_for::<T>()
            .and_then(|constructor| self.host().instance_of(value, constructor))
            .unwrap_or(false)
    }
}

fn memoized(env: &Env, type_id: TypeId) -> AbiResult<Option<Value>> {
    let reference = env.context().constructors.borrow().get(&type_id).copied();
    match reference {
        Some(reference) => env.host().reference_value(reference),
        None => Ok(None),
    }
}

fn materialize(env: &Env, descriptor: &Rc<TypeDescriptor>) -> AbiResult<Value> {
    if let Some(constructor) = memoized(env, descriptor.type_id)? {
        return Ok(constructor);
    }

    // Parents first so the chain can be linked right away.
    let parent = match &descriptor.parent {
        Some(link) => Some((link.materialize)(env)?),
        None => None,
    };

    let host = env.host();
    let data = Rc::into_raw(descriptor.clone()) as RawPtr;
    let constructor = match host.define_class(descriptor.name, construct_trampoline, data) {
        Ok(constructor) => constructor,
        Err(status) => {
            // SAFETY: `data` came from `Rc::into_raw` above and was never shared.
            drop(unsafe { Rc::from_raw(data as *const TypeDescriptor) });
            return Err(status);
        }
    };
    if let Err(status) = host.add_finalizer(constructor, data, release_descriptor, ptr::null_mut()) {
        warn!(event = "descriptor_leaked", class = descriptor.name, "could not attach descriptor finalizer");
        return Err(status);
    }

    define_members(env, constructor, &descriptor.members)?;
    if let Some(parent) = parent {
        link_prototypes(env, constructor, parent)?;
    }

    let reference = host.create_reference(constructor, 1)?;
    let replaced = env
        .context()
        .constructors
        .borrow_mut()
        .insert(descriptor.type_id, reference);
    if let Some(stale) = replaced {
        let _ = host.delete_reference(stale);
    }

    env.context().record(|stats| stats.constructors_defined += 1);
    log_class_defined(descriptor.name, descriptor.parent_name());
    Ok(constructor)
}

/// `Object.setPrototypeOf(Child.prototype, Parent.prototype)`, then
/// `Object.setPrototypeOf(Child, Parent)`.
fn link_prototypes(env: &Env, child: Value, parent: Value) -> AbiResult<()> {
    let host = env.host();
    let global = host.global()?;
    let object = host.get_named_property(global, "Object")?;
    let set_prototype_of = host.get_named_property(object, "setPrototypeOf")?;

    let child_prototype = host.get_named_property(child, "prototype")?;
    let parent_prototype = host.get_named_property(parent, "prototype")?;
    host.call_function(object, set_prototype_of, &[child_prototype, parent_prototype])?;
    host.call_function(object, set_prototype_of, &[child, parent])?;
    Ok(())
}

fn release_descriptor(_host: &HostRef, data: RawPtr, _hint: RawPtr) {
    // SAFETY: paired with `Rc::into_raw` in `materialize`; runs once.
    drop(unsafe { Rc::from_raw(data as *const TypeDescriptor) });
}

fn construct_trampoline(host: &HostRef, frame: &CallFrame) -> Option<Value> {
    // SAFETY: `data` is the descriptor registered in `materialize`; it is
    // released only after the constructor is collected.
    let descriptor = unsafe { &*(frame.data as *const TypeDescriptor) };
    let env = Env::for_host(host);
    let throw = |kind: ErrorKind, message: &str| {
        let _ = env.host().throw_error(kind, message);
        None
    };

    let construct_call = frame.is_construct_call();
    if !construct_call && !descriptor.allow_function_call {
        return throw(ErrorKind::TypeError, "Constructor must be called with new.");
    }
    if construct_call && is_sentinel(&env, frame) {
        return None;
    }

    let Some(constructor) = &descriptor.constructor else {
        return throw(ErrorKind::Error, "There is no constructor defined.");
    };
    let mut args = Arguments::new(&env, frame);
    let Some(native) = (constructor.build)(&mut args, &constructor.descriptor) else {
        if env.host().is_exception_pending() {
            return None;
        }
        return throw(ErrorKind::Error, "Unable to invoke constructor.");
    };

    let object = if construct_call {
        frame.this
    } else {
        let instance = memoized(&env, descriptor.type_id)
            .ok()
            .flatten()
            .map(|constructor| create_instance(&env, constructor));
        match instance {
            Some(Ok(object)) => object,
            _ => {
                (descriptor.capabilities.destruct)(native);
                return throw(ErrorKind::Error, "Unable to invoke constructor.");
            }
        }
    };

    if attach_wrapper(&env, descriptor, object, native, true).is_err() {
        return throw(ErrorKind::Error, "Unable to wrap native object.");
    }
    if construct_call {
        None
    } else {
        Some(object)
    }
}

/// `T`'s constructor as a value, e.g. to export a class.
pub struct Constructor<T>(PhantomData<fn() -> T>);

impl<T> Constructor<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Constructor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NativeClass> ToHost for Constructor<T> {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        env.constructor_for::<T>()
    }
}
