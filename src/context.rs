//! Per-runtime-instance state and the `Env` handle
//!
//! A `RuntimeContext` is created the first time an `Env` is built for a host
//! and lives in the host's instance-data slot until the host drops it.
//! `Env` pairs the host with its context and is what every bridge
//! operation takes.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use crate::abi::{Host, HostRef, RefId, Value};
use crate::class::TypeDescriptor;
use crate::config::{BridgeConfig, Config};
use crate::convert::{to_host_value, FromHost, ToHost};
use crate::lifetime::WrapperTable;
use crate::logging::{log_context_created, log_context_teardown};
use crate::scope::HandleScope;

/// Counters for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub wrappers_created: usize,
    pub cache_hits: usize,
    pub wrappers_finalized: usize,
    pub constructors_defined: usize,
    pub conversion_failures: usize,
    pub native_panics: usize,
}

/// Bridge state owned by one host instance.
pub struct RuntimeContext {
    config: Config,
    pub(crate) wrappers: RefCell<WrapperTable>,
    /// Strong references to memoized constructors.
    pub(crate) constructors: RefCell<HashMap<TypeId, RefId>>,
    pub(crate) descriptors: RefCell<HashMap<TypeId, Rc<TypeDescriptor>>>,
    stats: Cell<BridgeStats>,
    torn_down: Cell<bool>,
    /// Native memory currently lent to running methods as `&mut`.
    lent: RefCell<Vec<Range<usize>>>,
}

impl RuntimeContext {
    fn new(config: Config) -> Self {
        Self {
            config,
            wrappers: RefCell::new(WrapperTable::default()),
            constructors: RefCell::new(HashMap::new()),
            descriptors: RefCell::new(HashMap::new()),
            stats: Cell::new(BridgeStats::default()),
            torn_down: Cell::new(false),
            lent: RefCell::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats.get()
    }

    /// Set once `Env::teardown` ran; late finalizers then skip the cache.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }

    pub(crate) fn record(&self, f: impl FnOnce(&mut BridgeStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// Lend the `size` bytes at `address` until the loan drops.
    ///
    /// `None` while any overlapping memory is already lent, which is the
    /// case when a method re-enters another method on the same object.
    pub(crate) fn lend(self: &Rc<Self>, address: usize, size: usize) -> Option<Loan> {
        let range = address..address.saturating_add(size.max(1));
        let mut lent = self.lent.borrow_mut();
        if lent
            .iter()
            .any(|held| held.start < range.end && range.start < held.end)
        {
            return None;
        }
        lent.push(range.clone());
        Some(Loan {
            context: self.clone(),
            range,
        })
    }
}

/// Exclusive access to a native object for the duration of one call.
pub(crate) struct Loan {
    context: Rc<RuntimeContext>,
    range: Range<usize>,
}

impl Drop for Loan {
    fn drop(&mut self) {
        let mut lent = self.context.lent.borrow_mut();
        if let Some(index) = lent.iter().rposition(|held| *held == self.range) {
            lent.swap_remove(index);
        }
    }
}

/// A host paired with its bridge state.
#[derive(Clone)]
pub struct Env {
    host: HostRef,
    context: Rc<RuntimeContext>,
}

impl Env {
    /// Bind to `host`, installing a default context on first use.
    pub fn new(host: HostRef) -> Self {
        Self::for_host(&host)
    }

    /// Bind to `host`; `config` applies only if no context exists yet.
    pub fn with_config(host: HostRef, config: Config) -> Self {
        match Self::existing(&host) {
            Some(env) => env,
            None => Self::install(host, config),
        }
    }

    pub fn for_host(host: &HostRef) -> Self {
        match Self::existing(host) {
            Some(env) => env,
            None => Self::install(host.clone(), Config::default()),
        }
    }

    /// Bind only if a context was already installed.
    pub fn existing(host: &HostRef) -> Option<Self> {
        let context = host.instance_data()?.downcast::<RuntimeContext>().ok()?;
        Some(Self {
            host: host.clone(),
            context,
        })
    }

    fn install(host: HostRef, config: Config) -> Self {
        let context = Rc::new(RuntimeContext::new(config));
        host.set_instance_data(Some(context.clone() as Rc<dyn Any>));
        log_context_created(context.config.bridge.cache_wrappers);
        Self { host, context }
    }

    #[inline]
    pub fn host(&self) -> &dyn Host {
        &*self.host
    }

    #[inline]
    pub fn host_ref(&self) -> &HostRef {
        &self.host
    }

    #[inline]
    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    #[inline]
    pub(crate) fn context_rc(&self) -> &Rc<RuntimeContext> {
        &self.context
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.context.config.bridge
    }

    pub fn stats(&self) -> BridgeStats {
        self.context.stats()
    }

    /// Open a handle scope closed when the guard drops.
    pub fn handle_scope(&self) -> HandleScope<'_> {
        HandleScope::new(self.host())
    }

    pub fn undefined(&self) -> Value {
        self.host.get_undefined()
    }

    pub fn null(&self) -> Value {
        self.host.get_null()
    }

    /// Convert a native value; yields `undefined` if conversion fails.
    pub fn to_host<T: ToHost + ?Sized>(&self, value: &T) -> Value {
        to_host_value(self, value)
    }

    pub fn from_host<T: FromHost>(&self, value: Value) -> Option<T> {
        T::from_host(self, value)
    }

    /// Release memoized constructors and detach the context from the host.
    ///
    /// Wrappers still alive keep their native objects until the host
    /// finalizes them; their finalizers then skip the cache.
    pub fn teardown(self) {
        self.context.torn_down.set(true);
        let constructors: Vec<RefId> = self
            .context
            .constructors
            .borrow_mut()
            .drain()
            .map(|(_, id)| id)
            .collect();
        for id in constructors {
            let _ = self.host.delete_reference(id);
        }
        let weak_refs = self.context.wrappers.borrow_mut().drain();
        let live = weak_refs.len();
        for id in weak_refs {
            let _ = self.host.delete_reference(id);
        }
        self.context.descriptors.borrow_mut().clear();
        self.host.set_instance_data(None);
        log_context_teardown(live);
    }
}
