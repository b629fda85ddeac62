//! Host functions backed by native callables, and native handles to host
//! functions

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::rc::Rc;

use crate::abi::{AbiResult, CallFrame, HostRef, RawPtr, Status, Value, ValueType};
use crate::class::NativeClass;
use crate::context::Env;
use crate::convert::{dict, type_name_of, type_of, FromHost, ToHost};
use crate::error::{BindError, BindResult};
use crate::logging::{log_uncaught_exception, warn};
use crate::persistent::Reference;
use crate::scope::CallbackScope;

use super::arguments::Arguments;
use super::callable::{
    Callable, CallbackHolder, FromArguments, IntoHostArgs, IntoHostReturn, MethodCallable,
};
use super::descriptor::{CallFlags, CallableDescriptor};

// ============================================================================
// Native -> host function
// ============================================================================

/// Register `holder` with the host as a function named `name`.
///
/// The holder is released by a finalizer on the function object, so it
/// lives exactly as long as the host keeps the function.
pub fn create_function(env: &Env, name: &str, holder: Rc<CallbackHolder>) -> AbiResult<Value> {
    let host = env.host();
    let data = Rc::into_raw(holder) as RawPtr;

    let function = match host.create_function(name, dispatch_callback, data) {
        Ok(function) => function,
        Err(status) => {
            // SAFETY: `data` came from `Rc::into_raw` above and was never shared.
            drop(unsafe { Rc::from_raw(data as *const CallbackHolder) });
            return Err(status);
        }
    };

    if let Err(status) = host.add_finalizer(function, data, release_holder, ptr::null_mut()) {
        // The function may still be called, so the holder must outlive it.
        warn!(event = "holder_leaked", name = name, "could not attach holder finalizer");
        return Err(status);
    }
    Ok(function)
}

fn dispatch_callback(host: &HostRef, frame: &CallFrame) -> Option<Value> {
    // SAFETY: `data` is the holder registered in `create_function`; it is
    // released only after the function object is collected.
    let holder = unsafe { &*(frame.data as *const CallbackHolder) };
    let env = Env::for_host(host);
    let mut args = Arguments::new(&env, frame);
    holder.call(&mut args)
}

fn release_holder(_host: &HostRef, data: RawPtr, _hint: RawPtr) {
    // SAFETY: paired with `Rc::into_raw` in `create_function`; runs once.
    drop(unsafe { Rc::from_raw(data as *const CallbackHolder) });
}

/// A native callable that becomes a fresh host function on each conversion.
#[derive(Clone)]
pub struct NativeFunction {
    name: Cow<'static, str>,
    holder: Rc<CallbackHolder>,
}

impl NativeFunction {
    pub fn new<Args, F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        Args: FromArguments + 'static,
        F: Callable<Args>,
        F::Output: IntoHostReturn,
    {
        Self::with_flags(name, CallFlags::NONE, f)
    }

    pub fn with_flags<Args, F>(name: impl Into<Cow<'static, str>>, flags: CallFlags, f: F) -> Self
    where
        Args: FromArguments + 'static,
        F: Callable<Args>,
        F::Output: IntoHostReturn,
    {
        Self {
            name: name.into(),
            holder: Rc::new(CallbackHolder::function(f, flags)),
        }
    }

    /// A function whose receiver is unwrapped as `T`.
    pub fn method<T, Args, F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        T: NativeClass,
        Args: FromArguments + 'static,
        F: MethodCallable<T, Args>,
        F::Output: IntoHostReturn,
    {
        Self {
            name: name.into(),
            holder: Rc::new(CallbackHolder::method(f, CallFlags::NONE)),
        }
    }

    /// A function that reads its arguments itself.
    pub fn raw<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(&mut Arguments<'_>) -> Option<Value> + 'static,
    {
        Self {
            name: name.into(),
            holder: Rc::new(CallbackHolder::raw(f)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &CallableDescriptor {
        self.holder.descriptor()
    }
}

impl ToHost for NativeFunction {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        create_function(env, &self.name, self.holder.clone())
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("descriptor", self.holder.descriptor())
            .finish()
    }
}

impl Env {
    /// A host function calling `f` with converted arguments.
    pub fn function<Args, F>(&self, name: &str, f: F) -> AbiResult<Value>
    where
        Args: FromArguments + 'static,
        F: Callable<Args>,
        F::Output: IntoHostReturn,
    {
        self.function_with_flags(name, CallFlags::NONE, f)
    }

    pub fn function_with_flags<Args, F>(&self, name: &str, flags: CallFlags, f: F) -> AbiResult<Value>
    where
        Args: FromArguments + 'static,
        F: Callable<Args>,
        F::Output: IntoHostReturn,
    {
        create_function(self, name, Rc::new(CallbackHolder::function(f, flags)))
    }

    /// A host function whose receiver is unwrapped as `T`.
    pub fn method<T, Args, F>(&self, name: &str, f: F) -> AbiResult<Value>
    where
        T: NativeClass,
        Args: FromArguments + 'static,
        F: MethodCallable<T, Args>,
        F::Output: IntoHostReturn,
    {
        create_function(self, name, Rc::new(CallbackHolder::method(f, CallFlags::NONE)))
    }
}

// ============================================================================
// Host -> native function handle
// ============================================================================

/// A host function held by native code, called with `A` and returning `R`.
///
/// Held strongly unless it arrived as an argument of a callable flagged
/// `FUNCTION_ARGUMENT_IS_WEAK`; a weak handle does not keep the function
/// alive and reports [`BindError::CallableCollected`] once it is gone.
pub struct HostFunction<A, R = ()> {
    env: Env,
    reference: Reference,
    _signature: PhantomData<fn(A) -> R>,
}

impl<A, R> HostFunction<A, R> {
    fn from_reference(env: &Env, reference: Reference) -> Self {
        Self {
            env: env.clone(),
            reference,
            _signature: PhantomData,
        }
    }

    pub fn is_weak(&self) -> bool {
        self.reference.is_weak()
    }

    /// Whether the function can still be called.
    pub fn is_alive(&self) -> bool {
        !self.reference.is_empty()
    }

    /// Stop keeping the function alive.
    pub fn make_weak(&mut self) {
        self.reference.make_weak();
    }
}

impl<A: IntoHostArgs, R: FromHost> HostFunction<A, R> {
    /// Call with an `undefined` receiver.
    ///
    /// A throwing callee is reported through the host's uncaught-exception
    /// channel (when enabled) and returned as `UncaughtException`.
    pub fn call(&self, args: A) -> BindResult<R> {
        let host = self.env.host();
        if host.is_exception_pending() {
            host.fatal_error(
                "HostFunction::call",
                "calling into the host while an exception is pending",
            );
        }

        let _scope = CallbackScope::new(host);
        let Some(function) = self.reference.value() else {
            return Err(BindError::CallableCollected);
        };
        let argv = args.into_host_args(&self.env)?;
        let receiver = host.get_undefined();

        match host.call_function(receiver, function, &argv) {
            Ok(result) => R::from_host(&self.env, result).ok_or_else(|| BindError::ReturnMismatch {
                expected: R::NAME.to_string(),
                actual: type_name_of(&self.env, result),
            }),
            Err(Status::PendingException) => {
                let exception = host.get_and_clear_last_exception();
                let message = exception
                    .map(|e| describe_exception(&self.env, e))
                    .unwrap_or_default();
                log_uncaught_exception(&message);
                if self.env.config().fatal_callback_exceptions {
                    if let Some(exception) = exception {
                        host.fatal_exception(exception)?;
                    }
                }
                Err(BindError::UncaughtException(message))
            }
            Err(status) => Err(status.into()),
        }
    }
}

/// `"Name: message"` for error objects, the string form otherwise.
fn describe_exception(env: &Env, exception: Value) -> String {
    if type_of(env, exception) == Some(ValueType::Object) {
        let name: Option<String> = dict::get(env, exception, "name");
        let message: Option<String> = dict::get(env, exception, "message");
        if let Some(message) = message {
            return format!("{}: {}", name.as_deref().unwrap_or("Error"), message);
        }
    }
    String::from_host(env, exception).unwrap_or_else(|| type_name_of(env, exception))
}

impl<A, R> Clone for HostFunction<A, R> {
    fn clone(&self) -> Self {
        Self::from_reference(&self.env, self.reference.clone())
    }
}

impl<A, R> FromHost for HostFunction<A, R> {
    const NAME: &'static str = "Function";

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        if type_of(env, value)? != ValueType::Function {
            return None;
        }
        let reference = Reference::strong(env.host_ref(), value).ok()?;
        Some(Self::from_reference(env, reference))
    }

    fn from_argument(env: &Env, value: Value, flags: CallFlags) -> Option<Self> {
        if !flags.contains(CallFlags::FUNCTION_ARGUMENT_IS_WEAK) {
            return Self::from_host(env, value);
        }
        if type_of(env, value)? != ValueType::Function {
            return None;
        }
        let reference = Reference::weak(env.host_ref(), value).ok()?;
        Some(Self::from_reference(env, reference))
    }
}

impl<A, R> ToHost for HostFunction<A, R> {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        Ok(self.reference.value().unwrap_or_else(|| env.host().get_undefined()))
    }
}

impl<A, R> fmt::Debug for HostFunction<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("reference", &self.reference)
            .finish()
    }
}
