//! RAII scope guards
//!
//! Every handle the bridge creates outside a host-initiated call must live
//! inside a `HandleScope`; re-entering the host from native code outside
//! any call additionally needs a `CallbackScope`.

use crate::abi::{Host, ScopeId};

/// Bounded handle scope; handles created inside die when it drops.
pub struct HandleScope<'h> {
    host: &'h dyn Host,
    id: ScopeId,
}

impl<'h> HandleScope<'h> {
    pub fn new(host: &'h dyn Host) -> Self {
        match host.open_handle_scope() {
            Ok(id) => Self { host, id },
            Err(status) => host.fatal_error("HandleScope::new", &status.to_string()),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }
}

impl Drop for HandleScope<'_> {
    fn drop(&mut self) {
        if let Err(status) = self.host.close_handle_scope(self.id) {
            if !std::thread::panicking() {
                self.host.fatal_error("HandleScope::drop", &status.to_string());
            }
        }
    }
}

/// Execution scope for calling into the host from outside a host call.
pub struct CallbackScope<'h> {
    host: &'h dyn Host,
    id: ScopeId,
    _handles: HandleScope<'h>,
}

impl<'h> CallbackScope<'h> {
    pub fn new(host: &'h dyn Host) -> Self {
        let handles = HandleScope::new(host);
        match host.open_callback_scope() {
            Ok(id) => Self {
                host,
                id,
                _handles: handles,
            },
            Err(status) => host.fatal_error("CallbackScope::new", &status.to_string()),
        }
    }
}

impl Drop for CallbackScope<'_> {
    fn drop(&mut self) {
        // Closed before `_handles`, which drops after this body.
        if let Err(status) = self.host.close_callback_scope(self.id) {
            if !std::thread::panicking() {
                self.host.fatal_error("CallbackScope::drop", &status.to_string());
            }
        }
    }
}
