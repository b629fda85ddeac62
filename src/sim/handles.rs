//! Handle stack and reference table of the reference host
//!
//! Handles are stamped with the epoch current at push time; closing a scope
//! bumps the epoch, so a handle that outlived its scope no longer resolves.

use crate::abi::{RefId, ScopeId, Status, Value};

use super::heap::{ObjId, Slot};

#[derive(Debug, Clone, Copy)]
struct ScopeFrame {
    id: u32,
    base: usize,
}

#[derive(Default)]
pub(crate) struct HandleStack {
    slots: Vec<(Slot, u32)>,
    scopes: Vec<ScopeFrame>,
    epoch: u32,
    next_scope: u32,
}

impl HandleStack {
    #[inline]
    pub fn push(&mut self, slot: Slot) -> Value {
        let index = self.slots.len() as u32;
        self.slots.push((slot, self.epoch));
        Value::from_raw(index, self.epoch)
    }

    #[inline]
    pub fn resolve(&self, value: Value) -> Option<&Slot> {
        self.slots
            .get(value.index() as usize)
            .filter(|(_, stamp)| *stamp == value.stamp())
            .map(|(slot, _)| slot)
    }

    pub fn open(&mut self) -> ScopeId {
        self.next_scope += 1;
        self.scopes.push(ScopeFrame {
            id: self.next_scope,
            base: self.slots.len(),
        });
        ScopeId(self.next_scope)
    }

    /// Close the innermost scope; scopes must close in LIFO order.
    pub fn close(&mut self, scope: ScopeId) -> Result<(), Status> {
        match self.scopes.last() {
            Some(frame) if frame.id == scope.0 => {
                let base = frame.base;
                self.scopes.pop();
                self.slots.truncate(base);
                self.epoch = self.epoch.wrapping_add(1);
                Ok(())
            }
            _ => Err(Status::HandleScopeMismatch),
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Objects held by any live handle.
    pub fn roots(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.slots.iter().filter_map(|(slot, _)| slot.as_object())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RefEntry {
    pub target: Slot,
    pub count: u32,
}

#[derive(Default)]
pub(crate) struct RefTable {
    entries: Vec<Option<RefEntry>>,
    free: Vec<u32>,
    live: usize,
}

impl RefTable {
    pub fn create(&mut self, target: Slot, count: u32) -> RefId {
        self.live += 1;
        let entry = Some(RefEntry { target, count });
        if let Some(index) = self.free.pop() {
            self.entries[index as usize] = entry;
            return RefId(index);
        }
        self.entries.push(entry);
        RefId(self.entries.len() as u32 - 1)
    }

    pub fn delete(&mut self, id: RefId) -> Result<(), Status> {
        let entry = self
            .entries
            .get_mut(id.0 as usize)
            .ok_or(Status::InvalidArg)?;
        if entry.take().is_none() {
            return Err(Status::InvalidArg);
        }
        self.free.push(id.0);
        self.live -= 1;
        Ok(())
    }

    pub fn get(&self, id: RefId) -> Result<&RefEntry, Status> {
        self.entries
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(Status::InvalidArg)
    }

    pub fn get_mut(&mut self, id: RefId) -> Result<&mut RefEntry, Status> {
        self.entries
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(Status::InvalidArg)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// Targets of strong references.
    pub fn roots(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.entries
            .iter()
            .flatten()
            .filter(|entry| entry.count > 0)
            .filter_map(|entry| entry.target.as_object())
    }
}

#[derive(Default)]
pub(crate) struct CallbackScopes {
    open: Vec<u32>,
    next: u32,
}

impl CallbackScopes {
    pub fn open(&mut self) -> ScopeId {
        self.next += 1;
        self.open.push(self.next);
        ScopeId(self.next)
    }

    pub fn close(&mut self, scope: ScopeId) -> Result<(), Status> {
        match self.open.last() {
            Some(&id) if id == scope.0 => {
                self.open.pop();
                Ok(())
            }
            _ => Err(Status::CallbackScopeMismatch),
        }
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }
}
