//! Object storage for the reference host
//!
//! Objects live in a slot vector with per-slot generations, so a stale
//! `ObjId` never aliases a newer object that reused the slot.

use std::rc::Rc;

use crate::abi::{FinalizeCallback, HostCallback, PropertyAttributes, RawPtr};

/// Generation-tagged object index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ObjId {
    pub index: u32,
    pub generation: u32,
}

/// A stored host value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjId),
}

impl Slot {
    #[inline]
    pub fn as_object(&self) -> Option<ObjId> {
        match self {
            Slot::Object(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Finalizer {
    pub data: RawPtr,
    pub callback: FinalizeCallback,
    pub hint: RawPtr,
}

#[derive(Debug, Clone)]
pub(crate) struct FunctionObject {
    pub name: Rc<str>,
    pub callback: HostCallback,
    pub data: RawPtr,
}

#[derive(Debug, Clone)]
pub(crate) enum ObjKind {
    Plain,
    Array(Vec<Slot>),
    Function(FunctionObject),
    External(RawPtr),
}

#[derive(Debug, Clone)]
pub(crate) enum PropValue {
    Data(Slot),
    Accessor {
        getter: Option<ObjId>,
        setter: Option<ObjId>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Property {
    pub key: Rc<str>,
    pub value: PropValue,
    pub attributes: PropertyAttributes,
}

/// Collector view of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObjState {
    Live,
    /// Unreachable; finalizers queued but not yet run.
    Dead,
}

#[derive(Debug)]
pub(crate) struct HeapObject {
    pub kind: ObjKind,
    pub proto: Option<ObjId>,
    pub properties: Vec<Property>,
    /// Native data attached through `wrap`, finalized first.
    pub wrapped: Option<Finalizer>,
    pub finalizers: Vec<Finalizer>,
    pub state: ObjState,
}

impl HeapObject {
    pub fn new(kind: ObjKind, proto: Option<ObjId>) -> Self {
        Self {
            kind,
            proto,
            properties: Vec::new(),
            wrapped: None,
            finalizers: Vec::new(),
            state: ObjState::Live,
        }
    }

    #[inline]
    pub fn is_finalizable(&self) -> bool {
        self.wrapped.is_some() || !self.finalizers.is_empty()
    }

    pub fn own_property(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| &*p.key == key)
    }

    pub fn own_property_mut(&mut self, key: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| &*p.key == key)
    }

    /// Outgoing edges, for marking.
    pub fn for_each_child(&self, mut visit: impl FnMut(ObjId)) {
        if let Some(proto) = self.proto {
            visit(proto);
        }
        if let ObjKind::Array(elements) = &self.kind {
            elements.iter().filter_map(Slot::as_object).for_each(&mut visit);
        }
        for property in &self.properties {
            match &property.value {
                PropValue::Data(slot) => {
                    if let Some(id) = slot.as_object() {
                        visit(id);
                    }
                }
                PropValue::Accessor { getter, setter } => {
                    getter.iter().chain(setter.iter()).copied().for_each(&mut visit);
                }
            }
        }
    }
}

struct Entry {
    generation: u32,
    object: Option<HeapObject>,
}

/// Slot-vector heap
#[derive(Default)]
pub(crate) struct Heap {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl Heap {
    pub fn alloc(&mut self, object: HeapObject) -> ObjId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.object = Some(object);
            return ObjId {
                index,
                generation: entry.generation,
            };
        }

        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            object: Some(object),
        });
        ObjId {
            index,
            generation: 0,
        }
    }

    /// Release the slot; the next occupant gets a new generation.
    pub fn free(&mut self, id: ObjId) -> Option<HeapObject> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let object = entry.object.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(object)
    }

    #[inline]
    pub fn get(&self, id: ObjId) -> Option<&HeapObject> {
        self.entries
            .get(id.index as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.object.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, id: ObjId) -> Option<&mut HeapObject> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.object.as_mut())
    }

    /// Allocated and not yet declared unreachable.
    #[inline]
    pub fn is_live(&self, id: ObjId) -> bool {
        self.get(id).map_or(false, |obj| obj.state == ObjState::Live)
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Ids of every allocated object.
    pub fn ids(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            entry.object.as_ref().map(|_| ObjId {
                index: index as u32,
                generation: entry.generation,
            })
        })
    }

    /// Find a property on the object or its prototype chain.
    pub fn lookup(&self, id: ObjId, key: &str) -> Option<&Property> {
        let mut current = Some(id);
        // Guard against prototype cycles.
        let mut depth = 0;
        while let Some(cur) = current {
            let object = self.get(cur)?;
            if let Some(property) = object.own_property(key) {
                return Some(property);
            }
            current = object.proto;
            depth += 1;
            if depth > 1024 {
                return None;
            }
        }
        None
    }

    /// Whether `proto` appears on the prototype chain of `id`.
    pub fn has_in_chain(&self, id: ObjId, proto: ObjId) -> bool {
        let mut current = self.get(id).and_then(|obj| obj.proto);
        let mut depth = 0;
        while let Some(cur) = current {
            if cur == proto {
                return true;
            }
            current = self.get(cur).and_then(|obj| obj.proto);
            depth += 1;
            if depth > 1024 {
                return false;
            }
        }
        false
    }
}
