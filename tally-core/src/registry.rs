use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::sequence::Sequence;
use crate::{Result, TallyError};

/// Holds the active sequences keyed by id.
///
/// Share one registry (behind an `Arc`) between every schema of an application, since
/// different models may reference the same sequence id.
#[derive(Default)]
pub struct SequenceRegistry {
    sequences: RwLock<HashMap<String, Arc<Sequence>>>,
}

impl SequenceRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a sequence under its id.
    ///
    /// Returns `Ok(true)` when registered. When the id is taken, an exclusive sequence fails
    /// with [`TallyError::DuplicateSequence`] while a non-exclusive one is tolerated: the first
    /// registration stays active and `Ok(false)` is returned.
    pub fn register(&self, sequence: Arc<Sequence>) -> Result<bool> {
        let id = sequence.id();

        let mut w = self.sequences.write();
        if w.contains_key(id) {
            if sequence.definition().exclusive {
                return Err(TallyError::DuplicateSequence(id.to_string()));
            }
            debug!("sequence '{}' is already registered, keep the first one", id);
            return Ok(false);
        }

        w.insert(id.to_string(), Clone::clone(&sequence));
        info!("register sequence '{}' ok", id);

        Ok(true)
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<Sequence>> {
        self.get(id)
            .ok_or_else(|| TallyError::UnknownSequence(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<Arc<Sequence>> {
        let r = self.sequences.read();
        r.get(id).cloned()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.sequences.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sequences.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.read().is_empty()
    }
}
