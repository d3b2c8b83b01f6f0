use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::{Result, TallyError};

use super::{CounterBackend, CounterFilter, CounterKey, CounterRecord, CounterStore, Upserted};

/// An in-process counter collection.
///
/// The unique index is the map key and every primitive runs under the write lock, which
/// gives the same guarantees as a single document database collection.
#[derive(Default)]
pub struct MemoryCounterStore {
    inner: RwLock<HashMap<CounterKey, i64, ahash::RandomState>>,
}

impl MemoryCounterStore {
    /// Restore a collection from persisted records.
    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = CounterRecord>,
    {
        let mut inner: HashMap<CounterKey, i64, ahash::RandomState> = Default::default();
        for next in records {
            let key = next.key();
            if inner.contains_key(&key) {
                return Err(TallyError::DuplicateKey(key.id));
            }
            inner.insert(key, next.seq);
        }
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Export all records, ordered by key.
    pub fn records(&self) -> Vec<CounterRecord> {
        let r = self.inner.read();
        let mut records = r
            .iter()
            .map(|(k, seq)| CounterRecord {
                id: Clone::clone(&k.id),
                reference_value: Clone::clone(&k.reference_value),
                seq: *seq,
            })
            .collect::<Vec<_>>();
        records.sort_by(|a, b| {
            a.id.cmp(&b.id)
                .then_with(|| a.reference_value.cmp(&b.reference_value))
        });
        records
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn upsert_no_match(&self, key: &CounterKey, seed: i64) -> Result<Upserted> {
        let mut w = self.inner.write();
        let (created, seq) = match w.get(key) {
            Some(seq) => (false, *seq),
            None => {
                w.insert(Clone::clone(key), seed);
                (true, seed)
            }
        };
        Ok(Upserted {
            created,
            record: CounterRecord {
                id: Clone::clone(&key.id),
                reference_value: Clone::clone(&key.reference_value),
                seq,
            },
        })
    }

    async fn atomic_increment(&self, key: &CounterKey, amount: i64) -> Result<Option<CounterRecord>> {
        let mut w = self.inner.write();
        match w.get_mut(key) {
            None => Ok(None),
            Some(seq) => {
                *seq = seq
                    .checked_add(amount)
                    .ok_or_else(|| TallyError::Storage(anyhow!("counter '{}' overflow", key)))?;
                Ok(Some(CounterRecord {
                    id: Clone::clone(&key.id),
                    reference_value: Clone::clone(&key.reference_value),
                    seq: *seq,
                }))
            }
        }
    }

    async fn bulk_set_seq(&self, filter: &CounterFilter, seq: i64) -> Result<u64> {
        let mut w = self.inner.write();
        let mut cnt = 0u64;
        for (k, v) in w.iter_mut() {
            if filter.matches(k) {
                *v = seq;
                cnt += 1;
            }
        }
        Ok(cnt)
    }

    async fn find(&self, key: &CounterKey) -> Result<Option<CounterRecord>> {
        let r = self.inner.read();
        Ok(r.get(key).map(|seq| CounterRecord {
            id: Clone::clone(&key.id),
            reference_value: Clone::clone(&key.reference_value),
            seq: *seq,
        }))
    }
}

/// Hands out one [`MemoryCounterStore`] per collection name.
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Arc<MemoryCounterStore>>>,
}

impl MemoryBackend {
    pub fn store(&self, name: &str) -> Arc<MemoryCounterStore> {
        if let Some(exist) = self.collections.read().get(name) {
            return Clone::clone(exist);
        }

        let mut w = self.collections.write();
        let store = w.entry(name.to_string()).or_default();
        Clone::clone(store)
    }
}

impl CounterBackend for MemoryBackend {
    fn collection(&self, name: &str) -> Arc<dyn CounterStore> {
        self.store(name)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::reference::ReferenceValue;

    use super::*;

    fn init() {
        pretty_env_logger::try_init_timed().ok();
    }

    fn key(id: &str, city: &str) -> CounterKey {
        CounterKey::new(id, ReferenceValue::derive(&json!({ "city": city }), ["city"]))
    }

    #[tokio::test]
    async fn test_upsert_no_match() -> anyhow::Result<()> {
        init();

        let store = MemoryCounterStore::default();
        let k = key("inhabitant", "Paris");

        let first = store.upsert_no_match(&k, 1).await?;
        assert!(first.created);
        assert_eq!(1, first.record.seq);

        store.atomic_increment(&k, 1).await?;

        let second = store.upsert_no_match(&k, 1).await?;
        assert!(!second.created);
        assert_eq!(2, second.record.seq);
        assert_eq!(1, store.len());

        Ok(())
    }

    #[tokio::test]
    async fn test_atomic_increment() -> anyhow::Result<()> {
        init();

        let store = MemoryCounterStore::default();
        let k = key("inhabitant", "Paris");

        assert_eq!(None, store.atomic_increment(&k, 1).await?);
        assert!(store.is_empty());

        store.upsert_no_match(&k, 10).await?;
        let r = store.atomic_increment(&k, 5).await?;
        assert_eq!(Some(15), r.map(|it| it.seq));

        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_set_seq() -> anyhow::Result<()> {
        init();

        let store = MemoryCounterStore::default();
        let paris = key("inhabitant", "Paris");
        let lyon = key("inhabitant", "Lyon");
        let other = key("other", "Paris");
        for k in [&paris, &lyon, &other] {
            store.upsert_no_match(k, 5).await?;
        }

        let n = store
            .bulk_set_seq(&CounterFilter::Sequence("inhabitant".into()), 0)
            .await?;
        assert_eq!(2, n);
        assert_eq!(Some(0), store.find(&lyon).await?.map(|it| it.seq));
        assert_eq!(Some(5), store.find(&other).await?.map(|it| it.seq));

        let n = store
            .bulk_set_seq(&CounterFilter::Key(Clone::clone(&other)), 9)
            .await?;
        assert_eq!(1, n);
        assert_eq!(Some(9), store.find(&other).await?.map(|it| it.seq));
        assert_eq!(Some(0), store.find(&paris).await?.map(|it| it.seq));

        Ok(())
    }

    #[tokio::test]
    async fn test_records() -> anyhow::Result<()> {
        init();

        let store = MemoryCounterStore::default();
        store.upsert_no_match(&key("a", "Paris"), 3).await?;
        store.upsert_no_match(&CounterKey::new("b", ReferenceValue::none()), 7).await?;

        let records = store.records();
        let s = serde_json::to_string(&records)?;
        info!("records: {}", &s);
        assert_eq!(
            r#"[{"id":"a","reference_value":{"city":"Paris"},"seq":3},{"id":"b","reference_value":null,"seq":7}]"#,
            &s
        );

        let restored = MemoryCounterStore::from_records(records.clone())?;
        assert_eq!(records, restored.records());

        let mut dup = records.clone();
        dup.push(Clone::clone(&records[0]));
        assert!(matches!(
            MemoryCounterStore::from_records(dup),
            Err(TallyError::DuplicateKey(_))
        ));

        Ok(())
    }

    #[test]
    fn test_backend() {
        init();

        let backend = MemoryBackend::default();
        let a = backend.store("counters");
        let b = backend.store("counters");
        let c = backend.store("other_counters");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
