//! Per-type capability record

use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::abi::RawPtr;

pub type WrapFn = Rc<dyn Fn(RawPtr) -> RawPtr>;
pub type FinalizeFn = Rc<dyn Fn(RawPtr)>;

/// How the bridge attaches, reads back and releases one native type.
///
/// Every registered type has one; fields a type does not override keep
/// their defaults.
#[derive(Clone)]
pub struct Capabilities {
    /// Native pointer -> data attached to the host object (default: identity).
    pub wrap: WrapFn,
    /// Attached data -> native pointer (default: identity).
    pub unwrap: WrapFn,
    /// Runs on the attached data when the host object is finalized
    /// (default: nothing).
    pub finalize: FinalizeFn,
    /// Runs on the native pointer of host-owned objects after `finalize`
    /// (default: drop the `Box<T>`).
    pub destruct: FinalizeFn,
    /// Whether host objects may be reused for the same pointer.
    ///
    /// Off by default for zero-sized types: all their boxes share one
    /// dangling address, so the pointer does not identify an object.
    pub cacheable: bool,
}

impl Capabilities {
    pub fn new<T: 'static>() -> Self {
        Self {
            wrap: Rc::new(|ptr| ptr),
            unwrap: Rc::new(|ptr| ptr),
            finalize: Rc::new(|_| {}),
            destruct: Rc::new(|ptr| {
                // SAFETY: only called for pointers produced by `Box::<T>::into_raw`.
                drop(unsafe { Box::from_raw(ptr as *mut T) });
            }),
            cacheable: mem::size_of::<T>() != 0,
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("cacheable", &self.cacheable)
            .finish_non_exhaustive()
    }
}
