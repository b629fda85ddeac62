//! Native callables and the argument pipeline
//!
//! A callable's parameter list is turned into a [`CallableDescriptor`] when
//! the [`CallbackHolder`] is built. At call time each slot is extracted in
//! order by position; the first failing slot aborts the call and is
//! reported with its index and both type names.

use std::fmt::Display;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};

use smallvec::{smallvec, SmallVec};

use crate::abi::{AbiResult, ErrorKind, Value};
use crate::class::{NativeClass, Ptr};
use crate::context::Env;
use crate::convert::{FromHost, ToHost};
use crate::error::ConversionError;
use crate::logging::{log_conversion_failure, log_native_panic, log_receiver_in_use};

use super::arguments::Arguments;
use super::descriptor::{CallFlags, CallableDescriptor, ParamSpec};

// ============================================================================
// Argument lists
// ============================================================================

/// A parameter list that can be pulled out of [`Arguments`].
pub trait FromArguments: Sized {
    fn specs() -> SmallVec<[ParamSpec; 6]>;

    /// Extract every slot, starting at descriptor position `offset`.
    fn extract(
        args: &mut Arguments<'_>,
        descriptor: &CallableDescriptor,
        offset: usize,
    ) -> Result<Self, ConversionError>;
}

/// A native closure callable with the argument tuple `Args`.
pub trait Callable<Args>: 'static {
    type Output;

    fn invoke_with(&self, args: Args) -> Self::Output;
}

/// A native closure taking `&mut T` followed by the argument tuple `Args`.
pub trait MethodCallable<T, Args>: 'static {
    type Output;

    fn invoke_on(&self, this: &mut T, args: Args) -> Self::Output;
}

/// Arguments passed from native code into a host function.
pub trait IntoHostArgs {
    fn into_host_args(&self, env: &Env) -> AbiResult<SmallVec<[Value; 8]>>;
}

macro_rules! impl_arity {
    ($($name:ident),*) => {
        impl<$($name: FromHost),*> FromArguments for ($($name,)*) {
            fn specs() -> SmallVec<[ParamSpec; 6]> {
                smallvec![$(ParamSpec::of::<$name>()),*]
            }

            #[allow(non_snake_case, unused_assignments, unused_mut, unused_variables)]
            fn extract(
                args: &mut Arguments<'_>,
                descriptor: &CallableDescriptor,
                offset: usize,
            ) -> Result<Self, ConversionError> {
                let mut position = offset;
                $(
                    let $name = args.extract::<$name>(descriptor, position)?;
                    position += 1;
                )*
                Ok(($($name,)*))
            }
        }

        impl<Func, Ret, $($name),*> Callable<($($name,)*)> for Func
        where
            Func: Fn($($name),*) -> Ret + 'static,
        {
            type Output = Ret;

            #[allow(non_snake_case)]
            #[inline]
            fn invoke_with(&self, ($($name,)*): ($($name,)*)) -> Ret {
                self($($name),*)
            }
        }

        impl<Func, This, Ret, $($name),*> MethodCallable<This, ($($name,)*)> for Func
        where
            Func: Fn(&mut This, $($name),*) -> Ret + 'static,
        {
            type Output = Ret;

            #[allow(non_snake_case)]
            #[inline]
            fn invoke_on(&self, this: &mut This, ($($name,)*): ($($name,)*)) -> Ret {
                self(this, $($name),*)
            }
        }

        impl<$($name: ToHost),*> IntoHostArgs for ($($name,)*) {
            #[allow(non_snake_case, unused_variables)]
            fn into_host_args(&self, env: &Env) -> AbiResult<SmallVec<[Value; 8]>> {
                let ($($name,)*) = self;
                Ok(smallvec![$($name.to_host(env)?),*])
            }
        }
    };
}

impl_arity!();
impl_arity!(A);
impl_arity!(A, B);
impl_arity!(A, B, C);
impl_arity!(A, B, C, D);
impl_arity!(A, B, C, D, E);
impl_arity!(A, B, C, D, E, F);
impl_arity!(A, B, C, D, E, F, G);
impl_arity!(A, B, C, D, E, F, G, H);

// ============================================================================
// Return values
// ============================================================================

/// Conversion of a native return value into the call's result.
///
/// `None` means an exception is now pending.
pub trait IntoHostReturn {
    fn into_host_return(self, env: &Env) -> Option<Value>;
}

impl<T: ToHost> IntoHostReturn for T {
    #[inline]
    fn into_host_return(self, env: &Env) -> Option<Value> {
        Some(env.to_host(&self))
    }
}

/// A boxed native object handed over to the host.
pub struct Owned<T>(pub Box<T>);

impl<T> Owned<T> {
    pub fn new(value: T) -> Self {
        Self(Box::new(value))
    }
}

impl<T: NativeClass> IntoHostReturn for Owned<T> {
    fn into_host_return(self, env: &Env) -> Option<Value> {
        match env.wrap_owned(self.0) {
            Ok(value) => Some(value),
            Err(_) => {
                let _ = env
                    .host()
                    .throw_error(ErrorKind::Error, "Unable to wrap native object.");
                None
            }
        }
    }
}

/// `Err` becomes a host `Error` carrying the message.
impl<T: IntoHostReturn, E: Display> IntoHostReturn for Result<T, E> {
    fn into_host_return(self, env: &Env) -> Option<Value> {
        match self {
            Ok(value) => value.into_host_return(env),
            Err(err) => {
                let _ = env.host().throw_error(ErrorKind::Error, &err.to_string());
                None
            }
        }
    }
}

// ============================================================================
// Holder
// ============================================================================

type Invoke = Box<dyn Fn(&mut Arguments<'_>, &CallableDescriptor) -> Option<Value>>;

/// A type-erased native callable plus its descriptor.
pub struct CallbackHolder {
    descriptor: CallableDescriptor,
    invoke: Invoke,
}

impl CallbackHolder {
    /// Wrap a free function or closure.
    pub fn function<Args, F>(f: F, flags: CallFlags) -> Self
    where
        Args: FromArguments + 'static,
        F: Callable<Args>,
        F::Output: IntoHostReturn,
    {
        let descriptor = CallableDescriptor::new(Args::specs(), flags);
        let invoke: Invoke = Box::new(
            move |args: &mut Arguments<'_>, descriptor: &CallableDescriptor| {
                match Args::extract(args, descriptor, 0) {
                    Ok(params) => run_native(args.env(), || f.invoke_with(params)),
                    Err(err) => throw_conversion_failure(args.env(), &err),
                }
            },
        );
        Self { descriptor, invoke }
    }

    /// Wrap a method; the receiver is unwrapped as `T`.
    pub fn method<T, Args, F>(f: F, flags: CallFlags) -> Self
    where
        T: NativeClass,
        Args: FromArguments + 'static,
        F: MethodCallable<T, Args>,
        F::Output: IntoHostReturn,
    {
        let mut params: SmallVec<[ParamSpec; 6]> = smallvec![ParamSpec::of::<Ptr<T>>()];
        params.extend(Args::specs());
        let descriptor = CallableDescriptor::new(params, flags | CallFlags::HOLDER_IS_FIRST_ARGUMENT);

        let invoke: Invoke = Box::new(
            move |args: &mut Arguments<'_>, descriptor: &CallableDescriptor| {
                let extracted = args
                    .extract::<Ptr<T>>(descriptor, 0)
                    .and_then(|this| Ok((this, Args::extract(args, descriptor, 1)?)));
                let (this, params) = match extracted {
                    Ok(extracted) => extracted,
                    Err(err) => return throw_conversion_failure(args.env(), &err),
                };
                let env = args.env();
                let Some(_loan) = env
                    .context_rc()
                    .lend(this.as_ptr() as usize, mem::size_of::<T>())
                else {
                    return throw_receiver_in_use(env, T::NAME);
                };
                run_native(env, || {
                    // SAFETY: the receiver keeps the wrapped object alive for
                    // the whole call, and the loan excludes every other method
                    // call on the same memory until it returns.
                    let this = unsafe { &mut *this.as_ptr() };
                    f.invoke_on(this, params)
                })
            },
        );
        Self { descriptor, invoke }
    }

    /// Hand the unparsed arguments to `f`.
    pub fn raw<F>(f: F) -> Self
    where
        F: Fn(&mut Arguments<'_>) -> Option<Value> + 'static,
    {
        let invoke: Invoke = Box::new(
            move |args: &mut Arguments<'_>, _descriptor: &CallableDescriptor| {
                let env = args.env();
                run_native(env, || RawReturn(f(args)))
            },
        );
        Self {
            descriptor: CallableDescriptor::new(SmallVec::new(), CallFlags::NONE),
            invoke,
        }
    }

    pub fn descriptor(&self) -> &CallableDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn call(&self, args: &mut Arguments<'_>) -> Option<Value> {
        (self.invoke)(args, &self.descriptor)
    }
}

/// Result of a raw callable, already a handle.
struct RawReturn(Option<Value>);

impl IntoHostReturn for RawReturn {
    fn into_host_return(self, _env: &Env) -> Option<Value> {
        self.0
    }
}

/// Throw a conversion failure as a host `TypeError`.
pub(crate) fn throw_conversion_failure(env: &Env, err: &ConversionError) -> Option<Value> {
    let message = err.to_string();
    log_conversion_failure(&message);
    env.context().record(|stats| stats.conversion_failures += 1);
    let _ = env.host().throw_error(ErrorKind::TypeError, &message);
    None
}

/// Throw an `Error` for a method re-entering an object already in use.
fn throw_receiver_in_use(env: &Env, type_name: &str) -> Option<Value> {
    log_receiver_in_use(type_name);
    let _ = env
        .host()
        .throw_error(ErrorKind::Error, &format!("{type_name} object is already in use"));
    None
}

/// Run native code at the invocation boundary and convert its result.
pub(crate) fn run_native<R, F>(env: &Env, f: F) -> Option<Value>
where
    R: IntoHostReturn,
    F: FnOnce() -> R,
{
    guard_panics(env, f)?.into_host_return(env)
}

/// Run native code so that no panic crosses into the host.
///
/// With `catch_panics` on, a panic becomes a pending host `Error` and the
/// result is `None`.
pub(crate) fn guard_panics<R>(env: &Env, f: impl FnOnce() -> R) -> Option<R> {
    if !env.config().catch_panics {
        return Some(f());
    }
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => Some(result),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log_native_panic(&message);
            env.context().record(|stats| stats.native_panics += 1);
            let _ = env
                .host()
                .throw_error(ErrorKind::Error, &format!("native panic: {message}"));
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
