use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use smallvec::SmallVec;
use tally_etc::{RetryOptions, SequenceOptions};

use crate::reference::ReferenceValue;
use crate::store::{CounterFilter, CounterKey, CounterStore};
use crate::{Result, TallyError};

/// Whether the allocation runs concurrently with the sibling hooks, or has to complete
/// before the lifecycle continues.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum HookMode {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Debug, Clone)]
pub struct SequenceDefinition {
    pub id: String,
    pub inc_field: String,
    /// Sorted and deduplicated, empty means a single global counter.
    pub reference_fields: SmallVec<[String; 4]>,
    pub start_seq: i64,
    pub inc_amount: i64,
    pub hooks_enabled: bool,
    pub mode: HookMode,
    pub exclusive: bool,
    pub collection_name: String,
}

impl SequenceDefinition {
    /// The value written by a reset, the next allocation issues `start_seq` again.
    /// Definitions built from options never saturate here.
    #[inline]
    pub fn reset_seq(&self) -> i64 {
        self.start_seq.saturating_sub(self.inc_amount)
    }
}

impl TryFrom<SequenceOptions> for SequenceDefinition {
    type Error = TallyError;

    fn try_from(value: SequenceOptions) -> std::result::Result<Self, Self::Error> {
        use garde::Validate;

        if let Err(e) = value.validate() {
            return Err(TallyError::InvalidConfig(e.to_string().into()));
        }

        let SequenceOptions {
            inc_field,
            id,
            reference_fields,
            disable_hooks,
            collection_name,
            exclusive,
            parallel_hooks,
            start_seq,
            inc_amount,
        } = value;

        if start_seq.checked_sub(inc_amount).is_none() {
            let msg = format!(
                "start_seq {} is too small for inc_amount {}",
                start_seq, inc_amount
            );
            return Err(TallyError::InvalidConfig(msg.into()));
        }

        let id = match (id, &reference_fields) {
            (Some(id), _) if !id.is_empty() => id,
            (_, Some(_)) => {
                return Err(TallyError::InvalidConfig(
                    "cannot use reference fields without specifying an id".into(),
                ))
            }
            _ => Clone::clone(&inc_field),
        };

        let mut reference_fields: SmallVec<[String; 4]> = reference_fields
            .map(|it| it.into_vec())
            .unwrap_or_default()
            .into_iter()
            .collect();
        if reference_fields.iter().any(|it| tally_util::split_path(it).is_empty()) {
            return Err(TallyError::InvalidConfig(
                "reference fields cannot be empty".into(),
            ));
        }
        reference_fields.sort();
        reference_fields.dedup();

        Ok(Self {
            id,
            inc_field,
            reference_fields,
            start_seq,
            inc_amount,
            hooks_enabled: !disable_hooks,
            mode: if parallel_hooks {
                HookMode::Parallel
            } else {
                HookMode::Sequential
            },
            exclusive,
            collection_name,
        })
    }
}

/// Bounds the retry of the increment phase.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::from_millis(1),
        }
    }
}

impl TryFrom<&RetryOptions> for RetryPolicy {
    type Error = TallyError;

    fn try_from(value: &RetryOptions) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            attempts: value.attempts,
            backoff: value.backoff()?,
        })
    }
}

/// Outcome of the ensure-and-seed phase.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Seeding {
    /// This call inserted the counter, the value to issue is `start_seq`.
    Created(i64),
    /// The counter was already there.
    Existing,
    /// A concurrent allocator won the insert.
    Raced,
}

/// An active sequence: a definition bound to its counter collection.
pub struct Sequence {
    def: SequenceDefinition,
    store: Arc<dyn CounterStore>,
    retry: RetryPolicy,
}

impl Sequence {
    pub fn new(def: SequenceDefinition, store: Arc<dyn CounterStore>, retry: RetryPolicy) -> Self {
        Self { def, store, retry }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.def.id
    }

    #[inline]
    pub fn definition(&self) -> &SequenceDefinition {
        &self.def
    }

    pub fn reference_of(&self, doc: &Value) -> ReferenceValue {
        if self.def.reference_fields.is_empty() {
            return ReferenceValue::none();
        }
        ReferenceValue::derive(doc, self.def.reference_fields.iter().map(|it| it.as_str()))
    }

    pub fn key_of(&self, doc: &Value) -> CounterKey {
        CounterKey::new(Clone::clone(&self.def.id), self.reference_of(doc))
    }

    pub(crate) async fn seed(&self, key: &CounterKey) -> Result<Seeding> {
        match self.store.upsert_no_match(key, self.def.start_seq).await {
            Ok(upserted) if upserted.created => Ok(Seeding::Created(upserted.record.seq)),
            Ok(_) => Ok(Seeding::Existing),
            Err(TallyError::DuplicateKey(_)) => {
                debug!("counter {} is being created concurrently", key);
                Ok(Seeding::Raced)
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn increment(&self, key: &CounterKey) -> Result<i64> {
        let mut attempt = 0u32;
        loop {
            if let Some(record) = self.store.atomic_increment(key, self.def.inc_amount).await? {
                return Ok(record.seq);
            }

            if attempt >= self.retry.attempts {
                return Err(TallyError::CounterNotFound(Clone::clone(&self.def.id)));
            }
            attempt += 1;

            debug!(
                "counter {} is not visible yet, retry #{} in {:?}",
                key, attempt, self.retry.backoff
            );

            if self.retry.backoff.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.retry.backoff).await;
            }
        }
    }

    /// Allocate the next value of a counter.
    ///
    /// The first allocation of a brand-new counter issues `start_seq` without incrementing,
    /// every other one increments the existing record by `inc_amount`.
    pub async fn allocate_key(&self, key: &CounterKey) -> Result<i64> {
        match self.seed(key).await? {
            Seeding::Created(seq) => Ok(seq),
            Seeding::Existing | Seeding::Raced => self.increment(key).await,
        }
    }

    /// Allocate the next value for the reference derived from the document.
    pub async fn allocate(&self, doc: &Value) -> Result<i64> {
        let key = self.key_of(doc);
        self.allocate_key(&key).await
    }

    /// Reset counters so that the next allocation issues `start_seq` again.
    ///
    /// Without a reference document every partition of the sequence is reset.
    pub async fn reset(&self, reference: Option<&Value>) -> Result<u64> {
        let filter = match reference {
            None => CounterFilter::Sequence(Clone::clone(&self.def.id)),
            Some(doc) => CounterFilter::Key(self.key_of(doc)),
        };
        let n = self.store.bulk_set_seq(&filter, self.def.reset_seq()).await?;
        info!("reset sequence '{}' ok: {} counters", &self.def.id, n);
        Ok(n)
    }
}
