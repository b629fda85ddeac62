//! Embedding ABI - the C-level surface of the host runtime as a Rust trait
//!
//! Everything the bridge needs from the host goes through [`Host`]. Handles
//! are plain `Copy` tokens; the host owns all storage behind them.
//!
//! Architecture:
//! - [`Value`] - scope-bound, non-owning handle to a host value
//! - [`RefId`] / [`ScopeId`] - counted references and scope tokens
//! - [`Status`] - ABI status codes
//! - [`Host`] - the operations, grouped as scalar / object / identity /
//!   reference / scope / error / instance-data

use std::any::Any;
use std::ffi::c_void;
use std::rc::Rc;

use smallvec::SmallVec;
use thiserror::Error;

/// Opaque pointer passed through the host untouched.
pub type RawPtr = *mut c_void;

/// Shared handle to a host instance.
pub type HostRef = Rc<dyn Host>;

/// Result type for ABI calls.
pub type AbiResult<T> = Result<T, Status>;

/// Fixed-signature trampoline invoked by the host for native functions.
///
/// Returning `None` yields `undefined` to the caller.
pub type HostCallback = fn(host: &HostRef, frame: &CallFrame) -> Option<Value>;

/// Invoked by the host after an object became unreachable.
pub type FinalizeCallback = fn(host: &HostRef, data: RawPtr, hint: RawPtr);

/// Handle to a host value, valid while the scope that produced it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value {
    index: u32,
    stamp: u32,
}

impl Value {
    /// Build a handle from host-specific slot data.
    #[inline]
    pub const fn from_raw(index: u32, stamp: u32) -> Self {
        Self { index, stamp }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn stamp(self) -> u32 {
        self.stamp
    }
}

/// Counted reference token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefId(pub u32);

/// Handle or callback scope token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Result of `typeof` on a host value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Object,
    Function,
    External,
    BigInt,
}

/// Constructor used for a thrown error object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
        }
    }
}

/// ABI status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Status {
    #[error("invalid argument")]
    InvalidArg,
    #[error("object expected")]
    ObjectExpected,
    #[error("string expected")]
    StringExpected,
    #[error("number expected")]
    NumberExpected,
    #[error("boolean expected")]
    BooleanExpected,
    #[error("array expected")]
    ArrayExpected,
    #[error("function expected")]
    FunctionExpected,
    #[error("external expected")]
    ExternalExpected,
    #[error("an exception is pending")]
    PendingException,
    #[error("handle scope mismatch")]
    HandleScopeMismatch,
    #[error("callback scope mismatch")]
    CallbackScopeMismatch,
    #[error("generic failure")]
    GenericFailure,
}

/// Attributes of a defined property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyAttributes {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Attributes of a property created by plain assignment.
    pub const DEFAULT_JS: Self = Self {
        writable: true,
        enumerable: true,
        configurable: true,
    };
}

/// Data or accessor property definition.
///
/// `getter` and `setter` are host function values; when either is present
/// the property is an accessor and `value` is ignored.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDescriptor<'a> {
    pub name: &'a str,
    pub value: Option<Value>,
    pub getter: Option<Value>,
    pub setter: Option<Value>,
    pub attributes: PropertyAttributes,
}

/// Arguments of one host -> native call.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub this: Value,
    pub args: SmallVec<[Value; 8]>,
    pub data: RawPtr,
    /// Present only for construct calls.
    pub new_target: Option<Value>,
}

impl CallFrame {
    #[inline]
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    #[inline]
    pub fn is_construct_call(&self) -> bool {
        self.new_target.is_some()
    }
}

/// The host runtime's embedding interface.
///
/// All methods take `&self`: a host is single-threaded and may be re-entered
/// from inside any callback it invokes.
pub trait Host {
    // ========================================================================
    // Scalars
    // ========================================================================

    fn get_undefined(&self) -> Value;

    fn get_null(&self) -> Value;

    fn get_boolean(&self, value: bool) -> Value;

    fn create_int32(&self, value: i32) -> AbiResult<Value>;

    fn create_uint32(&self, value: u32) -> AbiResult<Value>;

    fn create_int64(&self, value: i64) -> AbiResult<Value>;

    fn create_double(&self, value: f64) -> AbiResult<Value>;

    fn create_string_utf8(&self, value: &str) -> AbiResult<Value>;

    fn create_string_utf16(&self, value: &[u16]) -> AbiResult<Value>;

    fn type_of(&self, value: Value) -> AbiResult<ValueType>;

    fn value_bool(&self, value: Value) -> AbiResult<bool>;

    fn value_int32(&self, value: Value) -> AbiResult<i32>;

    fn value_uint32(&self, value: Value) -> AbiResult<u32>;

    fn value_int64(&self, value: Value) -> AbiResult<i64>;

    fn value_double(&self, value: Value) -> AbiResult<f64>;

    fn value_string_utf8(&self, value: Value) -> AbiResult<String>;

    fn value_string_utf16(&self, value: Value) -> AbiResult<Vec<u16>>;

    fn strict_equals(&self, lhs: Value, rhs: Value) -> AbiResult<bool>;

    // ========================================================================
    // Objects
    // ========================================================================

    fn global(&self) -> AbiResult<Value>;

    fn create_object(&self) -> AbiResult<Value>;

    fn create_array(&self, length: u32) -> AbiResult<Value>;

    fn is_array(&self, value: Value) -> AbiResult<bool>;

    fn array_length(&self, array: Value) -> AbiResult<u32>;

    fn get_element(&self, object: Value, index: u32) -> AbiResult<Value>;

    fn set_element(&self, object: Value, index: u32, value: Value) -> AbiResult<()>;

    fn get_property(&self, object: Value, key: Value) -> AbiResult<Value>;

    fn set_property(&self, object: Value, key: Value, value: Value) -> AbiResult<()>;

    fn has_property(&self, object: Value, key: Value) -> AbiResult<bool>;

    fn delete_property(&self, object: Value, key: Value) -> AbiResult<bool>;

    fn get_named_property(&self, object: Value, name: &str) -> AbiResult<Value>;

    fn set_named_property(&self, object: Value, name: &str, value: Value) -> AbiResult<()>;

    /// Own enumerable string keys, as an array.
    fn property_names(&self, object: Value) -> AbiResult<Value>;

    fn define_property(&self, object: Value, descriptor: &PropertyDescriptor<'_>) -> AbiResult<()>;

    // ========================================================================
    // Functions
    // ========================================================================

    fn create_function(&self, name: &str, callback: HostCallback, data: RawPtr) -> AbiResult<Value>;

    /// Create a constructor function carrying a fresh `prototype` object.
    fn define_class(&self, name: &str, constructor: HostCallback, data: RawPtr) -> AbiResult<Value>;

    fn call_function(&self, receiver: Value, function: Value, args: &[Value]) -> AbiResult<Value>;

    fn new_instance(&self, constructor: Value, args: &[Value]) -> AbiResult<Value>;

    /// Run `finalize(data, hint)` once `object` has been collected.
    fn add_finalizer(
        &self,
        object: Value,
        data: RawPtr,
        finalize: FinalizeCallback,
        hint: RawPtr,
    ) -> AbiResult<()>;

    // ========================================================================
    // Identity
    // ========================================================================

    fn create_external(&self, data: RawPtr) -> AbiResult<Value>;

    fn value_external(&self, value: Value) -> AbiResult<RawPtr>;

    /// Attach `native` to `object`; `finalize` runs only after unreachability.
    fn wrap(
        &self,
        object: Value,
        native: RawPtr,
        finalize: FinalizeCallback,
        hint: RawPtr,
    ) -> AbiResult<()>;

    fn unwrap(&self, object: Value) -> AbiResult<RawPtr>;

    fn instance_of(&self, object: Value, constructor: Value) -> AbiResult<bool>;

    // ========================================================================
    // References
    // ========================================================================

    /// A count of zero creates a weak reference.
    fn create_reference(&self, value: Value, initial_count: u32) -> AbiResult<RefId>;

    fn delete_reference(&self, reference: RefId) -> AbiResult<()>;

    fn reference_ref(&self, reference: RefId) -> AbiResult<u32>;

    fn reference_unref(&self, reference: RefId) -> AbiResult<u32>;

    /// `None` once a weak target has become unreachable.
    fn reference_value(&self, reference: RefId) -> AbiResult<Option<Value>>;

    // ========================================================================
    // Scopes
    // ========================================================================

    fn open_handle_scope(&self) -> AbiResult<ScopeId>;

    fn close_handle_scope(&self, scope: ScopeId) -> AbiResult<()>;

    fn open_callback_scope(&self) -> AbiResult<ScopeId>;

    fn close_callback_scope(&self, scope: ScopeId) -> AbiResult<()>;

    // ========================================================================
    // Errors
    // ========================================================================

    fn throw_error(&self, kind: ErrorKind, message: &str) -> AbiResult<()>;

    fn throw_value(&self, value: Value) -> AbiResult<()>;

    fn is_exception_pending(&self) -> bool;

    fn get_and_clear_last_exception(&self) -> Option<Value>;

    /// Hand an exception to the host's uncaught-exception channel.
    fn fatal_exception(&self, error: Value) -> AbiResult<()>;

    fn fatal_error(&self, location: &str, message: &str) -> !;

    // ========================================================================
    // Instance data
    // ========================================================================

    fn instance_data(&self) -> Option<Rc<dyn Any>>;

    fn set_instance_data(&self, data: Option<Rc<dyn Any>>);
}
