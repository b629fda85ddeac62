//! Object lifetime bridge
//!
//! Attaches native pointers to host objects and keeps the
//! (type, pointer) -> host object table consistent with the host's
//! two-phase collector.
//!
//! States of one (type, pointer):
//! - `Unwrapped` - not in the table
//! - `WrappedCached` / `WrappedUncached` - newest host object alive
//! - `PendingFinalize` - the collector declared the newest host object
//!   unreachable; its weak handle reads empty but its finalizer has not run
//!
//! The table counts host objects per key rather than tracking presence:
//! a finalizer of an older generation may run after the pointer has been
//! wrapped again, and must only drop its own share of the entry.

mod capability;
mod table;


pub use capability::{Capabilities, FinalizeFn, WrapFn};
pub use table::{WrapEntry, WrapKey, WrapperTable};

use std::ptr::{self, NonNull};
use std::rc::{Rc, Weak};

use crate::abi::{AbiResult, HostRef, RawPtr, Value, ValueType};
use crate::class::{self, NativeClass, TypeDescriptor};
use crate::context::{Env, RuntimeContext};
use crate::logging::{log_cache_hit, log_finalize, log_wrap};

/// Observable state of a (type, pointer) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperState {
    Unwrapped,
    WrappedCached,
    WrappedUncached,
    PendingFinalize,
}

/// Marks host wrap data produced by this crate.
const RECORD_TAG: u64 = 0x6b69_5f77_7261_7070;

/// Data attached to every wrapped host object.
#[repr(C)]
pub(crate) struct WrapRecord {
    tag: u64,
    key: WrapKey,
    type_name: &'static str,
    /// Result of the type's `wrap` capability.
    data: RawPtr,
    native: RawPtr,
    owned: bool,
    capabilities: Capabilities,
    context: Weak<RuntimeContext>,
}

/// Host finalizer of wrapped objects.
///
/// Order is fixed: release the table entry, then `finalize`, then
/// `destruct` for host-owned objects.
fn finalize_wrapper(host: &HostRef, data: RawPtr, _hint: RawPtr) {
    // SAFETY: `data` is the record boxed in `attach_wrapper`; the host runs
    // this finalizer exactly once.
    let record = unsafe { Box::from_raw(data as *mut WrapRecord) };

    let mut remaining = 0;
    if let Some(context) = record.context.upgrade().filter(|c| !c.is_torn_down()) {
        let released = context.wrappers.borrow_mut().release(&record.key);
        remaining = context.wrappers.borrow().count(&record.key);
        context.record(|stats| stats.wrappers_finalized += 1);
        if let Some(weak) = released {
            let _ = host.delete_reference(weak);
        }
    }
    log_finalize(record.type_name, record.key.address, remaining, record.owned);

    (record.capabilities.finalize)(record.data);
    if record.owned {
        (record.capabilities.destruct)(record.native);
    }
}

/// Attach `native` to `object` and track it.
///
/// On failure the native side is released as the finalizer would have:
/// `finalize`, then `destruct` when `owned`.
pub(crate) fn attach_wrapper(
    env: &Env,
    descriptor: &TypeDescriptor,
    object: Value,
    native: RawPtr,
    owned: bool,
) -> AbiResult<()> {
    let host = env.host();
    let capabilities = &descriptor.capabilities;
    let data = (capabilities.wrap)(native);
    let release = || {
        (capabilities.finalize)(data);
        if owned {
            (capabilities.destruct)(native);
        }
    };

    let weak = match host.create_reference(object, 0) {
        Ok(weak) => weak,
        Err(status) => {
            release();
            return Err(status);
        }
    };

    let key = WrapKey {
        type_id: descriptor.type_id,
        address: native as usize,
    };
    let cached = capabilities.cacheable && env.config().cache_wrappers;
    let record = Box::new(WrapRecord {
        tag: RECORD_TAG,
        key,
        type_name: descriptor.name,
        data,
        native,
        owned,
        capabilities: capabilities.clone(),
        context: Rc::downgrade(env.context_rc()),
    });
    let record = Box::into_raw(record) as RawPtr;

    if let Err(status) = host.wrap(object, record, finalize_wrapper, ptr::null_mut()) {
        // SAFETY: the host rejected the record, so it is still ours.
        drop(unsafe { Box::from_raw(record as *mut WrapRecord) });
        let _ = host.delete_reference(weak);
        release();
        return Err(status);
    }

    let context = env.context();
    let replaced = context.wrappers.borrow_mut().add(key, weak, cached);
    if let Some(old) = replaced {
        let _ = host.delete_reference(old);
    }
    context.record(|stats| stats.wrappers_created += 1);
    log_wrap(descriptor.name, key.address, cached, context.wrappers.borrow().count(&key));
    Ok(())
}

/// `new T(<sentinel>)`: a bare instance of `T`'s class, no user constructor.
pub(crate) fn create_instance(env: &Env, constructor: Value) -> AbiResult<Value> {
    let host = env.host();
    let sentinel = host.create_external(class::constructor_key())?;
    host.new_instance(constructor, &[sentinel])
}

impl Env {
    /// Expose a pointer native code keeps owning.
    ///
    /// Returns the live host object already wrapping `ptr` when `T` is
    /// cacheable; the host never destructs `ptr`.
    pub fn wrap<T: NativeClass>(&self, ptr: NonNull<T>) -> AbiResult<Value> {
        self.wrap_pointer(ptr.as_ptr(), false)
    }

    /// Expose a native object owned by the host from now on.
    pub fn wrap_owned<T: NativeClass>(&self, native: Box<T>) -> AbiResult<Value> {
        self.wrap_pointer(Box::into_raw(native), true)
    }

    fn wrap_pointer<T: NativeClass>(&self, native: *mut T, owned: bool) -> AbiResult<Value> {
        let descriptor = class::descriptor::<T>(self);
        let capabilities = &descriptor.capabilities;
        let key = WrapKey::of(native as *const T);

        if !owned && capabilities.cacheable && self.config().cache_wrappers {
            let cached = self.context().wrappers.borrow().lookup(&key);
            if let Some(Ok(Some(object))) = cached.map(|weak| self.host().reference_value(weak)) {
                self.context().record(|stats| stats.cache_hits += 1);
                log_cache_hit(descriptor.name, key.address);
                return Ok(object);
            }
        }

        let object = match self
            .constructor_for::<T>()
            .and_then(|constructor| create_instance(self, constructor))
        {
            Ok(object) => object,
            Err(status) => {
                if owned {
                    (capabilities.destruct)(native as RawPtr);
                }
                return Err(status);
            }
        };

        attach_wrapper(self, &descriptor, object, native as RawPtr, owned)?;
        Ok(object)
    }

    /// The native object behind `value`, seen as `T`.
    ///
    /// `None` unless `value` wraps a `T` or a type inheriting from `T`.
    pub fn unwrap<T: NativeClass>(&self, value: Value) -> Option<NonNull<T>> {
        let host = self.host();
        if host.type_of(value).ok()? != ValueType::Object {
            return None;
        }
        let data = host.unwrap(value).ok()?;
        if data.is_null() {
            return None;
        }
        // SAFETY: every record starts with its tag; foreign wrap data is
        // rejected before being read as a record.
        if unsafe { (data as *const u64).read_unaligned() } != RECORD_TAG {
            return None;
        }
        let record = unsafe { &*(data as *const WrapRecord) };
        debug_assert_eq!(record.tag, RECORD_TAG);

        if self.config().check_instance_type {
            let constructor = self.constructor_for::<T>().ok()?;
            if !host.instance_of(value, constructor).ok()? {
                return None;
            }
        }

        let native = (record.capabilities.unwrap)(record.data);
        let native = class::upcast::<T>(self, record.key.type_id, native)?;
        NonNull::new(native as *mut T)
    }

    pub fn wrapper_state<T: 'static>(&self, ptr: *const T) -> WrapperState {
        let key = WrapKey::of(ptr);
        let Some(entry) = self.context().wrappers.borrow().get(&key) else {
            return WrapperState::Unwrapped;
        };
        let _scope = self.handle_scope();
        match self.host().reference_value(entry.weak) {
            Ok(Some(_)) if entry.cached => WrapperState::WrappedCached,
            Ok(Some(_)) => WrapperState::WrappedUncached,
            _ => WrapperState::PendingFinalize,
        }
    }

    /// Host objects created for `ptr` whose finalizer has not run yet.
    pub fn wrapper_count<T: 'static>(&self, ptr: *const T) -> u32 {
        self.context().wrappers.borrow().count(&WrapKey::of(ptr))
    }
}
