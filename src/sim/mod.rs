//! In-process reference host
//!
//! `SimHost` implements the embedding ABI with the behaviors the bridge
//! depends on:
//! 1. Scoped, stamped value handles (a stale handle is a fatal error)
//! 2. Counted strong/weak references
//! 3. A two-phase collector: `collect_garbage` makes unreachable objects
//!    read empty through weak references, `run_finalizers` later runs
//!    their finalizers and frees them
//! 4. Prototype chains, accessors, `new` semantics, pending exceptions
//!
//! Used by the test-suite and benchmarks; it is not a script engine.

mod builtins;
mod gc;
mod handles;
mod heap;

#[cfg(test)]
mod tests;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ptr;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::abi::{
    AbiResult, CallFrame, ErrorKind, FinalizeCallback, Host, HostCallback, HostRef,
    PropertyAttributes, PropertyDescriptor, RawPtr, RefId, ScopeId, Status, Value, ValueType,
};
use crate::logging::{debug, info, trace};

use handles::{CallbackScopes, HandleStack, RefTable};
use heap::{
    Finalizer, FunctionObject, Heap, HeapObject, ObjId, ObjKind, ObjState, PropValue, Property,
    Slot,
};

/// Mutable host state, borrowed only for the duration of one primitive.
pub(crate) struct State {
    heap: Heap,
    handles: HandleStack,
    refs: RefTable,
    callback_scopes: CallbackScopes,
    exception: Option<Slot>,
    global: ObjId,
}

/// An error object thrown inside the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimError {
    pub name: String,
    pub message: String,
}

/// Counters for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub collections: usize,
    pub finalizers_run: usize,
    pub objects_freed: usize,
}

type ScriptFn = Box<dyn Fn(&CallFrame) -> Option<Value>>;

pub struct SimHost {
    this: Weak<SimHost>,
    state: RefCell<State>,
    pending: RefCell<VecDeque<ObjId>>,
    instance_data: RefCell<Option<Rc<dyn Any>>>,
    uncaught: RefCell<Vec<String>>,
    stats: Cell<SimStats>,
}

impl SimHost {
    pub fn new() -> Rc<SimHost> {
        let mut heap = Heap::default();
        let global = heap.alloc(HeapObject::new(ObjKind::Plain, None));

        let host = Rc::new_cyclic(|this| SimHost {
            this: this.clone(),
            state: RefCell::new(State {
                heap,
                handles: HandleStack::default(),
                refs: RefTable::default(),
                callback_scopes: CallbackScopes::default(),
                exception: None,
                global,
            }),
            pending: RefCell::new(VecDeque::new()),
            instance_data: RefCell::new(None),
            uncaught: RefCell::new(Vec::new()),
            stats: Cell::new(SimStats::default()),
        });

        if let Err(status) = builtins::install(&host) {
            host.fatal_error("SimHost::new", &format!("installing builtins failed: {status}"));
        }
        info!(event = "sim_host_created", "Reference host created");
        host
    }

    /// This host as a trait object.
    pub fn host_ref(&self) -> HostRef {
        match self.this.upgrade() {
            Some(host) => host,
            None => self.fatal_error("SimHost::host_ref", "host is being dropped"),
        }
    }

    // ========================================================================
    // Collector driver
    // ========================================================================

    /// Mark phase: returns the number of objects newly awaiting finalization.
    pub fn collect_garbage(&self) -> usize {
        let outcome = gc::collect(&mut self.state.borrow_mut());
        let queued = outcome.queued.len();
        self.pending.borrow_mut().extend(outcome.queued);
        self.update_stats(|stats| {
            stats.collections += 1;
            stats.objects_freed += outcome.freed;
        });
        queued
    }

    /// Run one queued finalizer batch; `false` when the queue is empty.
    pub fn run_next_finalizer(&self) -> bool {
        let Some(id) = self.pending.borrow_mut().pop_front() else {
            return false;
        };

        let finalizers: Vec<Finalizer> = {
            let mut state = self.state.borrow_mut();
            match state.heap.get_mut(id) {
                Some(object) => object
                    .wrapped
                    .take()
                    .into_iter()
                    .chain(object.finalizers.drain(..))
                    .collect(),
                None => Vec::new(),
            }
        };

        let host = self.host_ref();
        let scope = self.state.borrow_mut().handles.open();
        for finalizer in &finalizers {
            (finalizer.callback)(&host, finalizer.data, finalizer.hint);
        }
        if self.state.borrow_mut().handles.close(scope).is_err() {
            self.fatal_error("SimHost::run_next_finalizer", "finalizer left a handle scope open");
        }

        self.state.borrow_mut().heap.free(id);
        self.update_stats(|stats| {
            stats.finalizers_run += finalizers.len();
            stats.objects_freed += 1;
        });
        trace!(event = "finalized", index = id.index, callbacks = finalizers.len());
        true
    }

    /// Drain the finalizer queue; returns how many objects were finalized.
    pub fn run_finalizers(&self) -> usize {
        let mut count = 0;
        while self.run_next_finalizer() {
            count += 1;
        }
        count
    }

    /// Full collection: mark, then finalize.
    pub fn gc(&self) -> usize {
        self.collect_garbage();
        self.run_finalizers()
    }

    /// Finalize every remaining finalizable object, then drop instance data.
    pub fn shutdown(&self) {
        loop {
            let doomed: Vec<ObjId> = {
                let mut state = self.state.borrow_mut();
                let ids: Vec<ObjId> = state
                    .heap
                    .ids()
                    .filter(|id| {
                        state
                            .heap
                            .get(*id)
                            .map_or(false, |obj| obj.state == ObjState::Live && obj.is_finalizable())
                    })
                    .collect();
                for id in &ids {
                    if let Some(object) = state.heap.get_mut(*id) {
                        object.state = ObjState::Dead;
                    }
                }
                ids
            };
            if doomed.is_empty() && self.pending.borrow().is_empty() {
                break;
            }
            self.pending.borrow_mut().extend(doomed);
            self.run_finalizers();
        }

        let data = self.instance_data.borrow_mut().take();
        drop(data);
        info!(event = "sim_host_shutdown", stats = ?self.stats(), "Reference host shut down");
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn stats(&self) -> SimStats {
        self.stats.get()
    }

    pub fn live_objects(&self) -> usize {
        self.state.borrow().heap.live_count()
    }

    pub fn pending_finalizers(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn reference_count(&self) -> usize {
        self.state.borrow().refs.len()
    }

    pub fn handle_scope_depth(&self) -> usize {
        self.state.borrow().handles.depth()
    }

    pub fn callback_scope_depth(&self) -> usize {
        self.state.borrow().callback_scopes.depth()
    }

    /// Messages handed to the fatal-exception channel so far.
    pub fn uncaught_exceptions(&self) -> Vec<String> {
        self.uncaught.borrow().clone()
    }

    /// Clear and return the pending exception.
    pub fn take_error(&self) -> Option<SimError> {
        let slot = self.state.borrow_mut().exception.take()?;
        Some(self.error_of(&slot))
    }

    // ========================================================================
    // Script helpers
    // ========================================================================

    /// A host function backed by a Rust closure, freed with the function.
    pub fn script_function<F>(&self, name: &str, f: F) -> AbiResult<Value>
    where
        F: Fn(&SimHost, &CallFrame) -> Option<Value> + 'static,
    {
        let this = self.this.clone();
        let script: ScriptFn = Box::new(move |frame| {
            let host = this.upgrade()?;
            f(&host, frame)
        });
        let data = Box::into_raw(Box::new(script)) as RawPtr;

        let function = self.create_function(name, script_trampoline, data)?;
        self.add_finalizer(function, data, drop_script, ptr::null_mut())?;
        Ok(function)
    }

    /// Call `function`, turning a thrown exception into `Err`.
    pub fn call(&self, function: Value, receiver: Value, args: &[Value]) -> Result<Value, SimError> {
        self.call_function(receiver, function, args)
            .map_err(|status| self.error_or(status))
    }

    /// `new constructor(...args)`, turning a thrown exception into `Err`.
    pub fn construct(&self, constructor: Value, args: &[Value]) -> Result<Value, SimError> {
        self.new_instance(constructor, args)
            .map_err(|status| self.error_or(status))
    }

    /// Call the method `name` found on `object`.
    pub fn call_method(&self, object: Value, name: &str, args: &[Value]) -> Result<Value, SimError> {
        let method = self
            .get_named_property(object, name)
            .map_err(|status| self.error_or(status))?;
        self.call(method, object, args)
    }

    /// `Object.setPrototypeOf(object, proto)`.
    pub fn set_prototype(&self, object: Value, proto: Value) -> AbiResult<()> {
        let target = self.object_id(object)?;
        let proto = match self.resolve(proto) {
            Slot::Object(id) => Some(id),
            Slot::Null => None,
            _ => return Err(Status::ObjectExpected),
        };
        let mut state = self.state.borrow_mut();
        let object = state.heap.get_mut(target).ok_or(Status::InvalidArg)?;
        object.proto = proto;
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn update_stats(&self, f: impl FnOnce(&mut SimStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn resolve(&self, value: Value) -> Slot {
        let slot = self.state.borrow().handles.resolve(value).cloned();
        match slot {
            Some(slot) => slot,
            None => self.fatal_error("SimHost::resolve", "value handle used outside its scope"),
        }
    }

    #[inline]
    fn push(&self, slot: Slot) -> Value {
        self.state.borrow_mut().handles.push(slot)
    }

    fn object_id(&self, value: Value) -> AbiResult<ObjId> {
        self.resolve(value).as_object().ok_or(Status::ObjectExpected)
    }

    fn alloc(&self, kind: ObjKind, proto: Option<ObjId>) -> ObjId {
        self.state.borrow_mut().heap.alloc(HeapObject::new(kind, proto))
    }

    fn key_of(&self, key: Value) -> AbiResult<Rc<str>> {
        match self.resolve(key) {
            Slot::String(s) => Ok(s),
            Slot::Number(n) if n.fract() == 0.0 && n >= 0.0 => Ok(Rc::from(format!("{}", n as u64))),
            _ => Err(Status::InvalidArg),
        }
    }

    fn error_of(&self, slot: &Slot) -> SimError {
        match slot {
            Slot::Object(id) => {
                let state = self.state.borrow();
                let text = |key: &str| match state.heap.lookup(*id, key).map(|p| &p.value) {
                    Some(PropValue::Data(Slot::String(s))) => Some(s.to_string()),
                    _ => None,
                };
                SimError {
                    name: text("name").unwrap_or_else(|| "Error".to_string()),
                    message: text("message").unwrap_or_default(),
                }
            }
            Slot::String(s) => SimError {
                name: "Error".to_string(),
                message: s.to_string(),
            },
            other => SimError {
                name: "Error".to_string(),
                message: format!("{other:?}"),
            },
        }
    }

    fn error_or(&self, status: Status) -> SimError {
        self.take_error().unwrap_or_else(|| SimError {
            name: "Error".to_string(),
            message: status.to_string(),
        })
    }

    fn function_of(&self, function: Value) -> AbiResult<FunctionObject> {
        let id = self.object_id(function).map_err(|_| Status::FunctionExpected)?;
        let state = self.state.borrow();
        match state.heap.get(id).map(|obj| &obj.kind) {
            Some(ObjKind::Function(f)) => Ok(f.clone()),
            _ => Err(Status::FunctionExpected),
        }
    }

    fn prototype_of_constructor(&self, constructor: ObjId) -> Option<ObjId> {
        let state = self.state.borrow();
        match state.heap.get(constructor)?.own_property("prototype")?.value {
            PropValue::Data(Slot::Object(id)) => Some(id),
            _ => None,
        }
    }

    fn new_function(&self, name: &str, callback: HostCallback, data: RawPtr) -> ObjId {
        let name: Rc<str> = Rc::from(name);
        let id = self.alloc(
            ObjKind::Function(FunctionObject {
                name: name.clone(),
                callback,
                data,
            }),
            None,
        );
        let mut state = self.state.borrow_mut();
        if let Some(object) = state.heap.get_mut(id) {
            object.properties.push(Property {
                key: Rc::from("name"),
                value: PropValue::Data(Slot::String(name)),
                attributes: PropertyAttributes {
                    writable: false,
                    enumerable: false,
                    configurable: true,
                },
            });
        }
        id
    }

    /// Run a native callback inside its own handle scope.
    fn invoke(
        &self,
        callback: HostCallback,
        data: RawPtr,
        this: Slot,
        args: Vec<Slot>,
        new_target: Option<Slot>,
    ) -> AbiResult<Value> {
        let host = self.host_ref();

        let (scope, frame) = {
            let mut state = self.state.borrow_mut();
            let scope = state.handles.open();
            let frame = CallFrame {
                this: state.handles.push(this),
                args: args
                    .into_iter()
                    .map(|slot| state.handles.push(slot))
                    .collect::<SmallVec<[Value; 8]>>(),
                data,
                new_target: new_target.map(|slot| state.handles.push(slot)),
            };
            (scope, frame)
        };

        let returned = callback(&host, &frame);
        let result = returned.map_or(Slot::Undefined, |value| self.resolve(value));

        if self.state.borrow_mut().handles.close(scope).is_err() {
            self.fatal_error("SimHost::invoke", "callback left a handle scope open");
        }
        let value = self.push(result);

        if self.is_exception_pending() {
            Err(Status::PendingException)
        } else {
            Ok(value)
        }
    }

    fn read_property(&self, object: ObjId, receiver: Value, key: &str) -> AbiResult<Value> {
        enum Found {
            Slot(Slot),
            Getter(Option<ObjId>),
        }

        let found = {
            let state = self.state.borrow();
            let target = state.heap.get(object).ok_or(Status::InvalidArg)?;
            match &target.kind {
                ObjKind::Array(elements) if key == "length" => {
                    Found::Slot(Slot::Number(elements.len() as f64))
                }
                ObjKind::Array(elements) if key.parse::<u32>().is_ok() => {
                    let index = key.parse::<usize>().unwrap_or(usize::MAX);
                    Found::Slot(elements.get(index).cloned().unwrap_or(Slot::Undefined))
                }
                _ => match state.heap.lookup(object, key).map(|p| &p.value) {
                    Some(PropValue::Data(slot)) => Found::Slot(slot.clone()),
                    Some(PropValue::Accessor { getter, .. }) => Found::Getter(*getter),
                    None => Found::Slot(Slot::Undefined),
                },
            }
        };

        match found {
            Found::Slot(slot) => Ok(self.push(slot)),
            Found::Getter(None) => Ok(self.get_undefined()),
            Found::Getter(Some(getter)) => {
                let getter = self.push(Slot::Object(getter));
                self.call_function(receiver, getter, &[])
            }
        }
    }

    fn write_property(&self, object: ObjId, receiver: Value, key: Rc<str>, value: Slot) -> AbiResult<()> {
        enum Plan {
            Done,
            Setter(Option<ObjId>),
            Append,
        }

        let plan = {
            let mut state = self.state.borrow_mut();
            let is_index = key.parse::<u32>().ok();
            let target = state.heap.get_mut(object).ok_or(Status::InvalidArg)?;

            if let (ObjKind::Array(elements), Some(index)) = (&mut target.kind, is_index) {
                let index = index as usize;
                if elements.len() <= index {
                    elements.resize(index + 1, Slot::Undefined);
                }
                elements[index] = value.clone();
                Plan::Done
            } else if let Some(property) = target.own_property_mut(&key) {
                match &mut property.value {
                    PropValue::Data(slot) => {
                        if property.attributes.writable {
                            *slot = value.clone();
                        }
                        Plan::Done
                    }
                    PropValue::Accessor { setter, .. } => Plan::Setter(*setter),
                }
            } else {
                match state.heap.lookup(object, &key) {
                    Some(Property {
                        value: PropValue::Accessor { setter, .. },
                        ..
                    }) => Plan::Setter(*setter),
                    Some(property) if !property.attributes.writable => Plan::Done,
                    _ => Plan::Append,
                }
            }
        };

        match plan {
            Plan::Done | Plan::Setter(None) => Ok(()),
            Plan::Setter(Some(setter)) => {
                let setter = self.push(Slot::Object(setter));
                let value = self.push(value);
                self.call_function(receiver, setter, &[value]).map(|_| ())
            }
            Plan::Append => {
                let mut state = self.state.borrow_mut();
                let target = state.heap.get_mut(object).ok_or(Status::InvalidArg)?;
                target.properties.push(Property {
                    key,
                    value: PropValue::Data(value),
                    attributes: PropertyAttributes::DEFAULT_JS,
                });
                Ok(())
            }
        }
    }
}

fn script_trampoline(_host: &HostRef, frame: &CallFrame) -> Option<Value> {
    // SAFETY: data was produced by `script_function` and lives until the
    // function object is finalized.
    let script = unsafe { &*(frame.data as *const ScriptFn) };
    script(frame)
}

fn drop_script(_host: &HostRef, data: RawPtr, _hint: RawPtr) {
    // SAFETY: paired with `Box::into_raw` in `script_function`; runs once.
    drop(unsafe { Box::from_raw(data as *mut ScriptFn) });
}

impl Host for SimHost {
    fn get_undefined(&self) -> Value {
        self.push(Slot::Undefined)
    }

    fn get_null(&self) -> Value {
        self.push(Slot::Null)
    }

    fn get_boolean(&self, value: bool) -> Value {
        self.push(Slot::Bool(value))
    }

    fn create_int32(&self, value: i32) -> AbiResult<Value> {
        Ok(self.push(Slot::Number(value as f64)))
    }

    fn create_uint32(&self, value: u32) -> AbiResult<Value> {
        Ok(self.push(Slot::Number(value as f64)))
    }

    fn create_int64(&self, value: i64) -> AbiResult<Value> {
        Ok(self.push(Slot::Number(value as f64)))
    }

    fn create_double(&self, value: f64) -> AbiResult<Value> {
        Ok(self.push(Slot::Number(value)))
    }

    fn create_string_utf8(&self, value: &str) -> AbiResult<Value> {
        Ok(self.push(Slot::String(Rc::from(value))))
    }

    fn create_string_utf16(&self, value: &[u16]) -> AbiResult<Value> {
        let text = String::from_utf16_lossy(value);
        Ok(self.push(Slot::String(Rc::from(text))))
    }

    fn type_of(&self, value: Value) -> AbiResult<ValueType> {
        Ok(match self.resolve(value) {
            Slot::Undefined => ValueType::Undefined,
            Slot::Null => ValueType::Null,
            Slot::Bool(_) => ValueType::Boolean,
            Slot::Number(_) => ValueType::Number,
            Slot::String(_) => ValueType::String,
            Slot::Object(id) => match self.state.borrow().heap.get(id).map(|obj| &obj.kind) {
                Some(ObjKind::Function(_)) => ValueType::Function,
                Some(ObjKind::External(_)) => ValueType::External,
                Some(_) => ValueType::Object,
                None => return Err(Status::InvalidArg),
            },
        })
    }

    fn value_bool(&self, value: Value) -> AbiResult<bool> {
        match self.resolve(value) {
            Slot::Bool(b) => Ok(b),
            _ => Err(Status::BooleanExpected),
        }
    }

    fn value_int32(&self, value: Value) -> AbiResult<i32> {
        Ok(self.value_uint32(value)? as i32)
    }

    fn value_uint32(&self, value: Value) -> AbiResult<u32> {
        match self.resolve(value) {
            Slot::Number(n) if n.is_finite() => Ok((n.trunc().rem_euclid(4_294_967_296.0)) as u32),
            Slot::Number(_) => Ok(0),
            _ => Err(Status::NumberExpected),
        }
    }

    fn value_int64(&self, value: Value) -> AbiResult<i64> {
        match self.resolve(value) {
            Slot::Number(n) if n.is_finite() => Ok(n as i64),
            Slot::Number(_) => Ok(0),
            _ => Err(Status::NumberExpected),
        }
    }

    fn value_double(&self, value: Value) -> AbiResult<f64> {
        match self.resolve(value) {
            Slot::Number(n) => Ok(n),
            _ => Err(Status::NumberExpected),
        }
    }

    fn value_string_utf8(&self, value: Value) -> AbiResult<String> {
        match self.resolve(value) {
            Slot::String(s) => Ok(s.to_string()),
            _ => Err(Status::StringExpected),
        }
    }

    fn value_string_utf16(&self, value: Value) -> AbiResult<Vec<u16>> {
        match self.resolve(value) {
            Slot::String(s) => Ok(s.encode_utf16().collect()),
            _ => Err(Status::StringExpected),
        }
    }

    fn strict_equals(&self, lhs: Value, rhs: Value) -> AbiResult<bool> {
        Ok(match (self.resolve(lhs), self.resolve(rhs)) {
            (Slot::Number(a), Slot::Number(b)) => a == b,
            (a, b) => a == b,
        })
    }

    fn global(&self) -> AbiResult<Value> {
        let global = self.state.borrow().global;
        Ok(self.push(Slot::Object(global)))
    }

    fn create_object(&self) -> AbiResult<Value> {
        let id = self.alloc(ObjKind::Plain, None);
        Ok(self.push(Slot::Object(id)))
    }

    fn create_array(&self, length: u32) -> AbiResult<Value> {
        let id = self.alloc(ObjKind::Array(vec![Slot::Undefined; length as usize]), None);
        Ok(self.push(Slot::Object(id)))
    }

    fn is_array(&self, value: Value) -> AbiResult<bool> {
        let Slot::Object(id) = self.resolve(value) else {
            return Ok(false);
        };
        let state = self.state.borrow();
        Ok(matches!(state.heap.get(id).map(|obj| &obj.kind), Some(ObjKind::Array(_))))
    }

    fn array_length(&self, array: Value) -> AbiResult<u32> {
        let id = self.object_id(array).map_err(|_| Status::ArrayExpected)?;
        let state = self.state.borrow();
        match state.heap.get(id).map(|obj| &obj.kind) {
            Some(ObjKind::Array(elements)) => Ok(elements.len() as u32),
            _ => Err(Status::ArrayExpected),
        }
    }

    fn get_element(&self, object: Value, index: u32) -> AbiResult<Value> {
        let id = self.object_id(object)?;
        self.read_property(id, object, &index.to_string())
    }

    fn set_element(&self, object: Value, index: u32, value: Value) -> AbiResult<()> {
        let id = self.object_id(object)?;
        let slot = self.resolve(value);
        self.write_property(id, object, Rc::from(index.to_string()), slot)
    }

    fn get_property(&self, object: Value, key: Value) -> AbiResult<Value> {
        let id = self.object_id(object)?;
        let key = self.key_of(key)?;
        self.read_property(id, object, &key)
    }

    fn set_property(&self, object: Value, key: Value, value: Value) -> AbiResult<()> {
        let id = self.object_id(object)?;
        let key = self.key_of(key)?;
        let slot = self.resolve(value);
        self.write_property(id, object, key, slot)
    }

    fn has_property(&self, object: Value, key: Value) -> AbiResult<bool> {
        let id = self.object_id(object)?;
        let key = self.key_of(key)?;
        let state = self.state.borrow();
        if let Some(ObjKind::Array(elements)) = state.heap.get(id).map(|obj| &obj.kind) {
            if let Ok(index) = key.parse::<usize>() {
                return Ok(index < elements.len());
            }
        }
        Ok(state.heap.lookup(id, &key).is_some())
    }

    fn delete_property(&self, object: Value, key: Value) -> AbiResult<bool> {
        let id = self.object_id(object)?;
        let key = self.key_of(key)?;
        let mut state = self.state.borrow_mut();
        let target = state.heap.get_mut(id).ok_or(Status::InvalidArg)?;
        match target.properties.iter().position(|p| *p.key == *key) {
            Some(position) if target.properties[position].attributes.configurable => {
                target.properties.remove(position);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(true),
        }
    }

    fn get_named_property(&self, object: Value, name: &str) -> AbiResult<Value> {
        let id = self.object_id(object)?;
        self.read_property(id, object, name)
    }

    fn set_named_property(&self, object: Value, name: &str, value: Value) -> AbiResult<()> {
        let id = self.object_id(object)?;
        let slot = self.resolve(value);
        self.write_property(id, object, Rc::from(name), slot)
    }

    fn property_names(&self, object: Value) -> AbiResult<Value> {
        let id = self.object_id(object)?;
        let names: Vec<Slot> = {
            let state = self.state.borrow();
            let target = state.heap.get(id).ok_or(Status::InvalidArg)?;
            let indices = match &target.kind {
                ObjKind::Array(elements) => (0..elements.len())
                    .map(|i| Slot::String(Rc::from(i.to_string())))
                    .collect(),
                _ => Vec::new(),
            };
            indices
                .into_iter()
                .chain(
                    target
                        .properties
                        .iter()
                        .filter(|p| p.attributes.enumerable)
                        .map(|p| Slot::String(p.key.clone())),
                )
                .collect()
        };
        let array = self.alloc(ObjKind::Array(names), None);
        Ok(self.push(Slot::Object(array)))
    }

    fn define_property(&self, object: Value, descriptor: &PropertyDescriptor<'_>) -> AbiResult<()> {
        let id = self.object_id(object)?;
        let accessor = |value: Option<Value>| -> AbiResult<Option<ObjId>> {
            value.map(|v| self.object_id(v)).transpose()
        };

        let value = if descriptor.getter.is_some() || descriptor.setter.is_some() {
            PropValue::Accessor {
                getter: accessor(descriptor.getter)?,
                setter: accessor(descriptor.setter)?,
            }
        } else {
            PropValue::Data(descriptor.value.map_or(Slot::Undefined, |v| self.resolve(v)))
        };

        let mut state = self.state.borrow_mut();
        let target = state.heap.get_mut(id).ok_or(Status::InvalidArg)?;
        let property = Property {
            key: Rc::from(descriptor.name),
            value,
            attributes: descriptor.attributes,
        };
        match target.own_property_mut(descriptor.name) {
            Some(existing) if !existing.attributes.configurable => Err(Status::InvalidArg),
            Some(existing) => {
                *existing = property;
                Ok(())
            }
            None => {
                target.properties.push(property);
                Ok(())
            }
        }
    }

    fn create_function(&self, name: &str, callback: HostCallback, data: RawPtr) -> AbiResult<Value> {
        let id = self.new_function(name, callback, data);
        Ok(self.push(Slot::Object(id)))
    }

    fn define_class(&self, name: &str, constructor: HostCallback, data: RawPtr) -> AbiResult<Value> {
        let ctor = self.new_function(name, constructor, data);
        let proto = self.alloc(ObjKind::Plain, None);

        let mut state = self.state.borrow_mut();
        if let Some(object) = state.heap.get_mut(proto) {
            object.properties.push(Property {
                key: Rc::from("constructor"),
                value: PropValue::Data(Slot::Object(ctor)),
                attributes: PropertyAttributes {
                    writable: true,
                    enumerable: false,
                    configurable: true,
                },
            });
        }
        if let Some(object) = state.heap.get_mut(ctor) {
            object.properties.push(Property {
                key: Rc::from("prototype"),
                value: PropValue::Data(Slot::Object(proto)),
                attributes: PropertyAttributes {
                    writable: false,
                    enumerable: false,
                    configurable: false,
                },
            });
        }
        Ok(state.handles.push(Slot::Object(ctor)))
    }

    fn call_function(&self, receiver: Value, function: Value, args: &[Value]) -> AbiResult<Value> {
        if self.is_exception_pending() {
            return Err(Status::PendingException);
        }
        let target = self.function_of(function)?;
        let this = self.resolve(receiver);
        let args = args.iter().map(|v| self.resolve(*v)).collect();
        self.invoke(target.callback, target.data, this, args, None)
    }

    fn new_instance(&self, constructor: Value, args: &[Value]) -> AbiResult<Value> {
        if self.is_exception_pending() {
            return Err(Status::PendingException);
        }
        let target = self.function_of(constructor)?;
        let ctor_slot = self.resolve(constructor);
        let proto = ctor_slot
            .as_object()
            .and_then(|id| self.prototype_of_constructor(id));

        let instance = Slot::Object(self.alloc(ObjKind::Plain, proto));
        let args = args.iter().map(|v| self.resolve(*v)).collect();
        let result = self.invoke(target.callback, target.data, instance.clone(), args, Some(ctor_slot))?;

        match self.resolve(result) {
            Slot::Object(_) => Ok(result),
            _ => Ok(self.push(instance)),
        }
    }

    fn add_finalizer(
        &self,
        object: Value,
        data: RawPtr,
        finalize: FinalizeCallback,
        hint: RawPtr,
    ) -> AbiResult<()> {
        let id = self.object_id(object)?;
        let mut state = self.state.borrow_mut();
        let target = state.heap.get_mut(id).ok_or(Status::InvalidArg)?;
        target.finalizers.push(Finalizer {
            data,
            callback: finalize,
            hint,
        });
        Ok(())
    }

    fn create_external(&self, data: RawPtr) -> AbiResult<Value> {
        let id = self.alloc(ObjKind::External(data), None);
        Ok(self.push(Slot::Object(id)))
    }

    fn value_external(&self, value: Value) -> AbiResult<RawPtr> {
        let id = self.object_id(value).map_err(|_| Status::ExternalExpected)?;
        let state = self.state.borrow();
        match state.heap.get(id).map(|obj| &obj.kind) {
            Some(ObjKind::External(data)) => Ok(*data),
            _ => Err(Status::ExternalExpected),
        }
    }

    fn wrap(
        &self,
        object: Value,
        native: RawPtr,
        finalize: FinalizeCallback,
        hint: RawPtr,
    ) -> AbiResult<()> {
        let id = self.object_id(object)?;
        let mut state = self.state.borrow_mut();
        let target = state.heap.get_mut(id).ok_or(Status::InvalidArg)?;
        if target.wrapped.is_some() {
            return Err(Status::InvalidArg);
        }
        target.wrapped = Some(Finalizer {
            data: native,
            callback: finalize,
            hint,
        });
        Ok(())
    }

    fn unwrap(&self, object: Value) -> AbiResult<RawPtr> {
        let id = self.object_id(object)?;
        let state = self.state.borrow();
        state
            .heap
            .get(id)
            .and_then(|obj| obj.wrapped.as_ref())
            .map(|wrapped| wrapped.data)
            .ok_or(Status::InvalidArg)
    }

    fn instance_of(&self, object: Value, constructor: Value) -> AbiResult<bool> {
        let ctor = self.function_of(constructor).and(self.object_id(constructor))?;
        let Slot::Object(id) = self.resolve(object) else {
            return Ok(false);
        };
        let Some(proto) = self.prototype_of_constructor(ctor) else {
            return Ok(false);
        };
        Ok(self.state.borrow().heap.has_in_chain(id, proto))
    }

    fn create_reference(&self, value: Value, initial_count: u32) -> AbiResult<RefId> {
        let target = self.resolve(value);
        let id = self.state.borrow_mut().refs.create(target, initial_count);
        trace!(event = "reference_created", id = id.0, count = initial_count);
        Ok(id)
    }

    fn delete_reference(&self, reference: RefId) -> AbiResult<()> {
        self.state.borrow_mut().refs.delete(reference)
    }

    fn reference_ref(&self, reference: RefId) -> AbiResult<u32> {
        let mut state = self.state.borrow_mut();
        let entry = state.refs.get_mut(reference)?;
        entry.count += 1;
        Ok(entry.count)
    }

    fn reference_unref(&self, reference: RefId) -> AbiResult<u32> {
        let mut state = self.state.borrow_mut();
        let entry = state.refs.get_mut(reference)?;
        if entry.count == 0 {
            return Err(Status::GenericFailure);
        }
        entry.count -= 1;
        Ok(entry.count)
    }

    fn reference_value(&self, reference: RefId) -> AbiResult<Option<Value>> {
        let mut state = self.state.borrow_mut();
        let target = state.refs.get(reference)?.target.clone();
        if let Slot::Object(id) = target {
            if !state.heap.is_live(id) {
                return Ok(None);
            }
        }
        Ok(Some(state.handles.push(target)))
    }

    fn open_handle_scope(&self) -> AbiResult<ScopeId> {
        Ok(self.state.borrow_mut().handles.open())
    }

    fn close_handle_scope(&self, scope: ScopeId) -> AbiResult<()> {
        self.state.borrow_mut().handles.close(scope)
    }

    fn open_callback_scope(&self) -> AbiResult<ScopeId> {
        Ok(self.state.borrow_mut().callback_scopes.open())
    }

    fn close_callback_scope(&self, scope: ScopeId) -> AbiResult<()> {
        self.state.borrow_mut().callback_scopes.close(scope)
    }

    fn throw_error(&self, kind: ErrorKind, message: &str) -> AbiResult<()> {
        if self.is_exception_pending() {
            return Ok(());
        }
        let mut error = HeapObject::new(ObjKind::Plain, None);
        for (key, text) in [("name", kind.name()), ("message", message)] {
            error.properties.push(Property {
                key: Rc::from(key),
                value: PropValue::Data(Slot::String(Rc::from(text))),
                attributes: PropertyAttributes {
                    writable: true,
                    enumerable: false,
                    configurable: true,
                },
            });
        }

        let mut state = self.state.borrow_mut();
        let id = state.heap.alloc(error);
        state.exception = Some(Slot::Object(id));
        debug!(event = "throw", kind = kind.name(), message = message);
        Ok(())
    }

    fn throw_value(&self, value: Value) -> AbiResult<()> {
        let slot = self.resolve(value);
        let mut state = self.state.borrow_mut();
        if state.exception.is_none() {
            state.exception = Some(slot);
        }
        Ok(())
    }

    fn is_exception_pending(&self) -> bool {
        self.state.borrow().exception.is_some()
    }

    fn get_and_clear_last_exception(&self) -> Option<Value> {
        let slot = self.state.borrow_mut().exception.take()?;
        Some(self.push(slot))
    }

    fn fatal_exception(&self, error: Value) -> AbiResult<()> {
        let error = self.error_of(&self.resolve(error));
        self.uncaught
            .borrow_mut()
            .push(format!("{}: {}", error.name, error.message));
        Ok(())
    }

    fn fatal_error(&self, location: &str, message: &str) -> ! {
        panic!("FATAL ERROR: {location} {message}");
    }

    fn instance_data(&self) -> Option<Rc<dyn Any>> {
        self.instance_data.borrow().clone()
    }

    fn set_instance_data(&self, data: Option<Rc<dyn Any>>) {
        let previous = std::mem::replace(&mut *self.instance_data.borrow_mut(), data);
        drop(previous);
    }
}
