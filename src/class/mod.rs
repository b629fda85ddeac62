//! Class/inheritance registrar
//!
//! A native type becomes a host class by implementing [`NativeClass`].
//! `define` fills a [`ClassBuilder`]; the result is a type-erased
//! [`TypeDescriptor`] kept per runtime instance, and turned into a host
//! constructor the first time `Env::constructor_for::<T>()` needs it.

mod property;
mod registrar;


pub use property::{ACCESSOR_ATTRIBUTES, METHOD_ATTRIBUTES, VALUE_ATTRIBUTES};
pub use registrar::Constructor;

pub(crate) use registrar::{constructor_key, descriptor, upcast};

use std::any::TypeId;
use std::convert::Infallible;
use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::abi::{AbiResult, ErrorKind, RawPtr, Value};
use crate::context::Env;
use crate::convert::{FromHost, ToHost};
use crate::invoke::{
    guard_panics, throw_conversion_failure, Arguments, Callable, CallableDescriptor,
    CallbackHolder, CallFlags, FromArguments, IntoHostReturn, MethodCallable,
};
use crate::lifetime::Capabilities;

use property::Member;

/// A native type exposed to the host as a class.
///
/// ```ignore
/// struct Counter { hits: u32 }
///
/// impl NativeClass for Counter {
///     const NAME: &'static str = "Counter";
///
///     fn define(class: &mut ClassBuilder<Self>) {
///         class
///             .constructor(|start: u32| Counter { hits: start })
///             .method("hit", |c: &mut Counter| { c.hits += 1; c.hits })
///             .getter("hits", |c: &Counter| c.hits);
///     }
/// }
/// ```
pub trait NativeClass: Sized + 'static {
    const NAME: &'static str;

    fn define(_class: &mut ClassBuilder<Self>) {}
}

pub(crate) type Construct = Box<dyn Fn(&mut Arguments<'_>, &CallableDescriptor) -> Option<RawPtr>>;

/// A user constructor: its parameter list and the boxed-result builder.
pub(crate) struct ConstructorFn {
    pub(crate) descriptor: CallableDescriptor,
    pub(crate) build: Construct,
}

/// Link from a type to its single parent class.
pub(crate) struct ParentLink {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) describe: fn(&Env) -> Rc<TypeDescriptor>,
    pub(crate) materialize: fn(&Env) -> AbiResult<Value>,
    /// Child pointer -> parent pointer.
    pub(crate) upcast: Rc<dyn Fn(RawPtr) -> RawPtr>,
}

/// Type-erased class definition, one node of the inheritance graph.
pub struct TypeDescriptor {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) parent: Option<ParentLink>,
    pub(crate) constructor: Option<ConstructorFn>,
    pub(crate) members: Vec<Member>,
    pub(crate) capabilities: Capabilities,
    pub(crate) allow_function_call: bool,
}

impl TypeDescriptor {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn parent_name(&self) -> Option<&'static str> {
        self.parent.as_ref().map(|link| link.name)
    }

    pub fn has_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.members.iter().map(Member::name)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("parent", &self.parent_name())
            .field("constructor", &self.has_constructor())
            .field("members", &self.members.len())
            .field("capabilities", &self.capabilities)
            .field("allow_function_call", &self.allow_function_call)
            .finish()
    }
}

/// Collects the definition of `T`'s class.
pub struct ClassBuilder<T> {
    parent: Option<ParentLink>,
    constructor: Option<ConstructorFn>,
    members: Vec<Member>,
    capabilities: Capabilities,
    allow_function_call: bool,
    _type: PhantomData<fn() -> T>,
}

impl<T: NativeClass> ClassBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            parent: None,
            constructor: None,
            members: Vec::new(),
            capabilities: Capabilities::new::<T>(),
            allow_function_call: false,
            _type: PhantomData,
        }
    }

    pub(crate) fn build(self) -> TypeDescriptor {
        TypeDescriptor {
            type_id: TypeId::of::<T>(),
            name: T::NAME,
            parent: self.parent,
            constructor: self.constructor,
            members: self.members,
            capabilities: self.capabilities,
            allow_function_call: self.allow_function_call,
        }
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// Script construction: `new T(...args)` runs `f` and hands the result
    /// to the host.
    pub fn constructor<Args, F>(&mut self, f: F) -> &mut Self
    where
        Args: FromArguments + 'static,
        F: Callable<Args, Output = T>,
    {
        self.try_constructor(move |args: Args| Ok::<T, Infallible>(f.invoke_with(args)))
    }

    /// Like [`constructor`](Self::constructor); `Err` throws its message.
    pub fn try_constructor<Args, F, E>(&mut self, f: F) -> &mut Self
    where
        Args: FromArguments + 'static,
        F: Fn(Args) -> Result<T, E> + 'static,
        E: Display,
    {
        let descriptor = CallableDescriptor::new(Args::specs(), CallFlags::NONE);
        let build: Construct = Box::new(
            move |args: &mut Arguments<'_>, descriptor: &CallableDescriptor| {
                let env = args.env();
                let params = match Args::extract(args, descriptor, 0) {
                    Ok(params) => params,
                    Err(err) => {
                        throw_conversion_failure(env, &err);
                        return None;
                    }
                };
                match guard_panics(env, || f(params))? {
                    Ok(native) => Some(Box::into_raw(Box::new(native)) as RawPtr),
                    Err(err) => {
                        let _ = env.host().throw_error(ErrorKind::Error, &err.to_string());
                        None
                    }
                }
            },
        );
        self.constructor = Some(ConstructorFn { descriptor, build });
        self
    }

    /// Allow `T(...)` without `new`; it then behaves like `new T(...)`.
    pub fn allow_function_call(&mut self, allow: bool) -> &mut Self {
        self.allow_function_call = allow;
        self
    }

    /// Single inheritance from `P`; `upcast` locates the `P` inside a `T`.
    pub fn inherit<P: NativeClass>(&mut self, upcast: fn(&mut T) -> &mut P) -> &mut Self {
        self.parent = Some(ParentLink {
            type_id: TypeId::of::<P>(),
            name: P::NAME,
            describe: descriptor::<P>,
            materialize: Env::constructor_for::<P>,
            upcast: Rc::new(move |ptr: RawPtr| {
                // SAFETY: only applied to pointers of a live `T`.
                let child = unsafe { &mut *(ptr as *mut T) };
                upcast(child) as *mut P as RawPtr
            }),
        });
        self
    }

    // ------------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------------

    /// A prototype method receiving the unwrapped instance.
    pub fn method<Args, F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        Args: FromArguments + 'static,
        F: MethodCallable<T, Args>,
        F::Output: IntoHostReturn,
    {
        self.method_with_flags(name, CallFlags::NONE, f)
    }

    pub fn method_with_flags<Args, F>(&mut self, name: &'static str, flags: CallFlags, f: F) -> &mut Self
    where
        Args: FromArguments + 'static,
        F: MethodCallable<T, Args>,
        F::Output: IntoHostReturn,
    {
        self.members.push(Member::Method {
            name,
            holder: Rc::new(CallbackHolder::method(f, flags)),
            is_static: false,
        });
        self
    }

    /// A function on the constructor itself.
    pub fn static_method<Args, F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        Args: FromArguments + 'static,
        F: Callable<Args>,
        F::Output: IntoHostReturn,
    {
        self.members.push(Member::Method {
            name,
            holder: Rc::new(CallbackHolder::function(f, CallFlags::NONE)),
            is_static: true,
        });
        self
    }

    /// A read-only accessor.
    pub fn getter<R, G>(&mut self, name: &'static str, get: G) -> &mut Self
    where
        R: IntoHostReturn + 'static,
        G: Fn(&T) -> R + 'static,
    {
        let getter = CallbackHolder::method::<T, (), _>(move |this: &mut T| get(this), CallFlags::NONE);
        self.members.push(Member::Accessor {
            name,
            getter: Rc::new(getter),
            setter: None,
        });
        self
    }

    /// A read/write accessor.
    pub fn property<R, V, G, S>(&mut self, name: &'static str, get: G, set: S) -> &mut Self
    where
        R: IntoHostReturn + 'static,
        V: FromHost + 'static,
        G: Fn(&T) -> R + 'static,
        S: Fn(&mut T, V) + 'static,
    {
        let getter = CallbackHolder::method::<T, (), _>(move |this: &mut T| get(this), CallFlags::NONE);
        let setter = CallbackHolder::method::<T, (V,), _>(
            move |this: &mut T, value: V| set(this, value),
            CallFlags::NONE,
        );
        self.members.push(Member::Accessor {
            name,
            getter: Rc::new(getter),
            setter: Some(Rc::new(setter)),
        });
        self
    }

    /// A read/write accessor over a field.
    pub fn field<F>(&mut self, name: &'static str, access: fn(&mut T) -> &mut F) -> &mut Self
    where
        F: ToHost + FromHost + Clone + 'static,
    {
        let getter =
            CallbackHolder::method::<T, (), _>(move |this: &mut T| access(this).clone(), CallFlags::NONE);
        let setter = CallbackHolder::method::<T, (F,), _>(
            move |this: &mut T, value: F| *access(this) = value,
            CallFlags::NONE,
        );
        self.members.push(Member::Accessor {
            name,
            getter: Rc::new(getter),
            setter: Some(Rc::new(setter)),
        });
        self
    }

    /// A constant on the constructor.
    pub fn value<V: ToHost + 'static>(&mut self, name: &'static str, value: V) -> &mut Self {
        self.members.push(Member::Value {
            name,
            make: Rc::new(move |env: &Env| value.to_host(env)),
        });
        self
    }

    // ------------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------------

    /// Whether wrapping the same pointer again may reuse the host object.
    pub fn cacheable(&mut self, cacheable: bool) -> &mut Self {
        self.capabilities.cacheable = cacheable;
        self
    }

    /// Native pointer -> data attached to the host object.
    pub fn on_wrap(&mut self, f: impl Fn(*mut T) -> RawPtr + 'static) -> &mut Self {
        self.capabilities.wrap = Rc::new(move |ptr: RawPtr| f(ptr as *mut T));
        self
    }

    /// Attached data -> native pointer.
    pub fn on_unwrap(&mut self, f: impl Fn(RawPtr) -> *mut T + 'static) -> &mut Self {
        self.capabilities.unwrap = Rc::new(move |data: RawPtr| f(data) as RawPtr);
        self
    }

    /// Runs on the attached data when the host object is finalized.
    pub fn on_finalize(&mut self, f: impl Fn(RawPtr) + 'static) -> &mut Self {
        self.capabilities.finalize = Rc::new(f);
        self
    }

    /// Replaces dropping host-owned objects.
    pub fn on_destruct(&mut self, f: impl Fn(Box<T>) + 'static) -> &mut Self {
        self.capabilities.destruct = Rc::new(move |ptr: RawPtr| {
            // SAFETY: `destruct` only sees pointers the host owns, which all
            // came from `Box::<T>::into_raw`.
            f(unsafe { Box::from_raw(ptr as *mut T) })
        });
        self
    }
}

// ============================================================================
// Native object pointers as values
// ============================================================================

/// A borrowed pointer to a wrapped `T`.
///
/// As an argument it unwraps the host object (or anything inheriting from
/// `T`); as a return value it wraps without transferring ownership.
pub struct Ptr<T>(NonNull<T>);

impl<T> Ptr<T> {
    pub fn new(ptr: NonNull<T>) -> Self {
        Self(ptr)
    }

    pub fn from_ref(native: &mut T) -> Self {
        Self(NonNull::from(native))
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.0.as_ptr()
    }

    pub fn as_non_null(&self) -> NonNull<T> {
        self.0
    }

    /// # Safety
    ///
    /// The host object wrapping the pointer must still be alive and no other
    /// reference to the object may be active.
    pub unsafe fn as_mut<'a>(&self) -> &'a mut T {
        &mut *self.0.as_ptr()
    }
}

impl<T> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ptr<T> {}

impl<T> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ptr").field(&self.0).finish()
    }
}

impl<T: NativeClass> FromHost for Ptr<T> {
    const NAME: &'static str = T::NAME;

    fn from_host(env: &Env, value: Value) -> Option<Self> {
        env.unwrap::<T>(value).map(Ptr)
    }
}

impl<T: NativeClass> ToHost for Ptr<T> {
    fn to_host(&self, env: &Env) -> AbiResult<Value> {
        env.wrap(self.0)
    }
}
