use std::fmt::{Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::{MemoryBackend, MemoryCounterStore};

use crate::reference::ReferenceValue;
use crate::Result;

mod memory;

/// The unique key of a counter record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CounterKey {
    pub id: String,
    pub reference_value: ReferenceValue,
}

impl CounterKey {
    pub fn new<S>(id: S, reference_value: ReferenceValue) -> Self
    where
        S: Into<String>,
    {
        Self {
            id: id.into(),
            reference_value,
        }
    }
}

impl Display for CounterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", &self.id, &self.reference_value)
    }
}

/// A persisted counter: `{ id, reference_value, seq }`, `seq` being the last issued value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub id: String,
    pub reference_value: ReferenceValue,
    pub seq: i64,
}

impl CounterRecord {
    pub fn key(&self) -> CounterKey {
        CounterKey::new(Clone::clone(&self.id), Clone::clone(&self.reference_value))
    }
}

/// Result of an insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    /// true if this call inserted the record.
    pub created: bool,
    pub record: CounterRecord,
}

/// Selects the records touched by a bulk update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterFilter {
    /// Every partition of a sequence.
    Sequence(String),
    /// Exactly one record.
    Key(CounterKey),
}

impl CounterFilter {
    pub fn matches(&self, key: &CounterKey) -> bool {
        match self {
            CounterFilter::Sequence(id) => &key.id == id,
            CounterFilter::Key(k) => k == key,
        }
    }
}

/// A collection of counter records with a unique index on `(id, reference_value)`.
///
/// Every mutation must be atomic on the storage side, callers never read-modify-write.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Insert `{ key, seq: seed }` unless a record with the same key exists, reporting whether
    /// this call performed the insert.
    ///
    /// Implementations backed by a real database return [`crate::TallyError::DuplicateKey`] when
    /// a concurrent insert of the same key wins the unique index.
    async fn upsert_no_match(&self, key: &CounterKey, seed: i64) -> Result<Upserted>;

    /// Add `amount` to the `seq` of an existing record and return the updated record.
    /// Never inserts: returns `None` when no record matches.
    async fn atomic_increment(&self, key: &CounterKey, amount: i64) -> Result<Option<CounterRecord>>;

    /// Set `seq` on every matching record, returns the number of records touched.
    async fn bulk_set_seq(&self, filter: &CounterFilter, seq: i64) -> Result<u64>;

    async fn find(&self, key: &CounterKey) -> Result<Option<CounterRecord>>;
}

/// Provides the counter collection behind a collection name.
pub trait CounterBackend: Send + Sync + 'static {
    fn collection(&self, name: &str) -> Arc<dyn CounterStore>;
}
