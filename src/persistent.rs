//! Counted host references with RAII release
//!
//! A strong `Reference` keeps its target reachable; a weak one reads empty
//! once the collector declares the target unreachable. Cloning a strong
//! reference shares the host reference and bumps its count; cloning a weak
//! one creates an independent weak reference.

use std::fmt;

use crate::abi::{AbiResult, HostRef, RefId, Value};
use crate::logging::trace;
use crate::scope::HandleScope;

pub struct Reference {
    host: HostRef,
    id: Option<RefId>,
    weak: bool,
}

impl Reference {
    pub fn strong(host: &HostRef, value: Value) -> AbiResult<Self> {
        let id = host.create_reference(value, 1)?;
        Ok(Self {
            host: host.clone(),
            id: Some(id),
            weak: false,
        })
    }

    pub fn weak(host: &HostRef, value: Value) -> AbiResult<Self> {
        let id = host.create_reference(value, 0)?;
        Ok(Self {
            host: host.clone(),
            id: Some(id),
            weak: true,
        })
    }

    /// A reference to nothing; `value()` always reads `None`.
    pub fn empty(host: &HostRef) -> Self {
        Self {
            host: host.clone(),
            id: None,
            weak: true,
        }
    }

    /// Read the target into the current handle scope.
    pub fn value(&self) -> Option<Value> {
        let id = self.id?;
        self.host.reference_value(id).ok().flatten()
    }

    /// Whether the target is gone; leaves no handle behind.
    pub fn is_empty(&self) -> bool {
        let _scope = HandleScope::new(&*self.host);
        self.value().is_none()
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    pub fn id(&self) -> Option<RefId> {
        self.id
    }

    /// Stop pinning the target.
    pub fn make_weak(&mut self) {
        let Some(id) = self.id else {
            self.weak = true;
            return;
        };
        if self.weak {
            return;
        }

        match self.host.reference_unref(id) {
            Ok(0) => {
                self.weak = true;
            }
            _ => {
                // Shared with other strong clones: detach into a fresh weak one.
                let _scope = HandleScope::new(&*self.host);
                let value = self.host.reference_value(id).ok().flatten();
                self.id = value.and_then(|v| self.host.create_reference(v, 0).ok());
                self.weak = true;
            }
        }
    }

    /// Pin the target again; `false` if it was already collected.
    pub fn make_strong(&mut self) -> bool {
        let Some(id) = self.id else {
            return false;
        };
        if !self.weak {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        match self.host.reference_ref(id) {
            Ok(_) => {
                self.weak = false;
                true
            }
            Err(_) => false,
        }
    }
}

impl Clone for Reference {
    fn clone(&self) -> Self {
        match (self.id, self.weak) {
            (Some(id), false) if self.host.reference_ref(id).is_ok() => Self {
                host: self.host.clone(),
                id: Some(id),
                weak: false,
            },
            (Some(_), _) => {
                let _scope = HandleScope::new(&*self.host);
                let id = self
                    .value()
                    .and_then(|v| self.host.create_reference(v, 0).ok());
                Self {
                    host: self.host.clone(),
                    id,
                    weak: true,
                }
            }
            (None, _) => Self::empty(&self.host),
        }
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if !self.weak {
            match self.host.reference_unref(id) {
                Ok(0) => {}
                // Other strong clones still share it.
                _ => return,
            }
        }
        if self.host.delete_reference(id).is_err() {
            trace!(event = "reference_leak", id = id.0, "failed to delete reference");
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("id", &self.id)
            .field("weak", &self.weak)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Host;
    use crate::sim::SimHost;

    #[test]
    fn test_strong_reference_survives_collection() {
        let sim = SimHost::new();
        let host = sim.host_ref();

        let reference = {
            let _scope = crate::scope::HandleScope::new(&*host);
            let object = host.create_object().unwrap();
            Reference::strong(&host, object).unwrap()
        };

        sim.gc();
        assert!(!reference.is_empty());
    }

    #[test]
    fn test_make_weak_releases_target() {
        let sim = SimHost::new();
        let host = sim.host_ref();

        let mut reference = {
            let _scope = crate::scope::HandleScope::new(&*host);
            let object = host.create_object().unwrap();
            Reference::strong(&host, object).unwrap()
        };
        reference.make_weak();
        assert!(reference.is_weak());

        sim.gc();
        assert!(reference.is_empty());
        assert!(!reference.make_strong());
    }

    #[test]
    fn test_strong_clone_shares_count() {
        let sim = SimHost::new();
        let host = sim.host_ref();

        let first = {
            let _scope = crate::scope::HandleScope::new(&*host);
            let object = host.create_object().unwrap();
            Reference::strong(&host, object).unwrap()
        };
        let mut second = first.clone();
        assert_eq!(first.id(), second.id());

        // Detaching the clone must not release the original.
        second.make_weak();
        assert_ne!(first.id(), second.id());
        drop(first);

        sim.gc();
        assert!(second.is_empty());
        assert_eq!(sim.reference_count(), 1);
    }

    #[test]
    fn test_drop_deletes_references() {
        let sim = SimHost::new();
        let host = sim.host_ref();
        let baseline = sim.reference_count();

        {
            let _scope = crate::scope::HandleScope::new(&*host);
            let object = host.create_object().unwrap();
            let strong = Reference::strong(&host, object).unwrap();
            let _weak = Reference::weak(&host, object).unwrap();
            let _clone = strong.clone();
            assert_eq!(sim.reference_count(), baseline + 2);
        }

        assert_eq!(sim.reference_count(), baseline);
    }
}
