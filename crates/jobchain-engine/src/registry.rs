use crate::errors::RegistryError;
use crate::traverser::Traverser;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, PoisonError, RwLock};

/// Active traversers keyed by request id, at most one per request.
#[derive(Default)]
pub struct TraverserRegistry {
    traversers: RwLock<HashMap<String, Arc<Traverser>>>,
}

impl TraverserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, request_id: &str, traverser: Arc<Traverser>) -> Result<(), RegistryError> {
        let mut traversers = self
            .traversers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match traversers.entry(request_id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyExists(request_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(traverser);
                Ok(())
            }
        }
    }

    pub fn get(&self, request_id: &str) -> Result<Arc<Traverser>, RegistryError> {
        self.traversers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(request_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(request_id.to_string()))
    }

    /// Removes the traverser for `request_id`, if any.
    pub fn remove(&self, request_id: &str) {
        self.traversers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(request_id);
    }

    /// Registered request ids, sorted.
    pub fn request_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .traversers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.traversers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
