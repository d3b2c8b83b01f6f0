use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use tally_etc::{Config, SequenceOptions};

use crate::document::{Document, DocumentHook, FieldKind, HookContext, Schema, UpsertDraft};
use crate::registry::SequenceRegistry;
use crate::sequence::{HookMode, RetryPolicy, Sequence, SequenceDefinition};
use crate::store::{CounterBackend, CounterKey};
use crate::{Result, TallyError};

/// Allocates the next value of a sequence into every inserted document.
pub struct SequenceHook {
    sequence: Arc<Sequence>,
}

impl SequenceHook {
    pub fn new(sequence: Arc<Sequence>) -> Self {
        Self { sequence }
    }

    #[inline]
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    async fn allocate(&self, key: &CounterKey) -> Result<i64> {
        self.sequence.allocate_key(key).await.inspect_err(|e| {
            error!("cannot allocate next value of counter {}: {}", key, e);
        })
    }
}

#[async_trait]
impl DocumentHook for SequenceHook {
    async fn before_insert(&self, ctx: &HookContext, doc: &mut Document) -> Result<()> {
        if doc.is_new() {
            let def = self.sequence.definition();
            let key = self.sequence.key_of(doc.value());

            match def.mode {
                HookMode::Sequential => {
                    let seq = self.allocate(&key).await?;
                    doc.set(&def.inc_field, seq)?;
                }
                HookMode::Parallel => {
                    // the rest of the chain runs meanwhile, the write waits for both
                    let (allocated, rest) = futures::join!(self.allocate(&key), async {
                        match ctx.next() {
                            None => Ok(()),
                            Some(next) => next.before_insert(ctx, &mut *doc).await,
                        }
                    });
                    let seq = allocated?;
                    rest?;
                    return doc.set(&def.inc_field, seq);
                }
            }
        }

        match ctx.next() {
            None => Ok(()),
            Some(next) => next.before_insert(ctx, doc).await,
        }
    }

    async fn before_upsert_insert(&self, ctx: &HookContext, draft: &mut UpsertDraft) -> Result<()> {
        let def = self.sequence.definition();
        let key = self.sequence.key_of(&draft.document()?);

        match def.mode {
            HookMode::Sequential => {
                let seq = self.allocate(&key).await?;
                draft.set_on_insert(&def.inc_field, seq);
                match ctx.next() {
                    None => Ok(()),
                    Some(next) => next.before_upsert_insert(ctx, draft).await,
                }
            }
            HookMode::Parallel => {
                let (allocated, rest) = futures::join!(self.allocate(&key), async {
                    match ctx.next() {
                        None => Ok(()),
                        Some(next) => next.before_upsert_insert(ctx, &mut *draft).await,
                    }
                });
                let seq = allocated?;
                rest?;
                draft.set_on_insert(&def.inc_field, seq);
                Ok(())
            }
        }
    }
}

/// Attaches sequences to schemas.
///
/// Every sequence attached through the same instance shares its registry, so the ids stay
/// unique across all the models of an application.
pub struct AutoIncrement {
    registry: Arc<SequenceRegistry>,
    backend: Arc<dyn CounterBackend>,
    retry: RetryPolicy,
    sequences: HashMap<String, Vec<SequenceOptions>>,
}

impl AutoIncrement {
    pub fn new(registry: Arc<SequenceRegistry>, backend: Arc<dyn CounterBackend>) -> Self {
        Self {
            registry,
            backend,
            retry: Default::default(),
            sequences: Default::default(),
        }
    }

    /// Create from a loaded configuration, see [`AutoIncrement::attach_model`].
    pub fn from_config(
        config: &Config,
        registry: Arc<SequenceRegistry>,
        backend: Arc<dyn CounterBackend>,
    ) -> Result<Self> {
        let retry = RetryPolicy::try_from(&config.retry)?;
        let sequences = config
            .sequences
            .iter()
            .map(|(k, v)| (Clone::clone(k), Clone::clone(v)))
            .collect();
        Ok(Self {
            registry,
            backend,
            retry,
            sequences,
        })
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn registry(&self) -> &Arc<SequenceRegistry> {
        &self.registry
    }

    /// Attach a sequence to a schema.
    ///
    /// Declares the increment field as a number, registers the sequence and, unless hooks are
    /// disabled, installs a [`SequenceHook`]. Fails without touching the schema when the options
    /// are invalid, the increment field has another kind, or the id is already taken by an
    /// exclusive sequence.
    pub fn attach(&self, schema: &Schema, options: SequenceOptions) -> Result<Arc<Sequence>> {
        let def = SequenceDefinition::try_from(options)?;

        let declared = schema.path(&def.inc_field);
        if let Some(kind) = declared {
            if kind != FieldKind::Number {
                return Err(TallyError::IncompatibleField {
                    field: Clone::clone(&def.inc_field).into(),
                    found: kind.to_string().into(),
                });
            }
        }

        let store = self.backend.collection(&def.collection_name);
        let sequence = Arc::new(Sequence::new(def, store, self.retry));
        self.registry.register(Clone::clone(&sequence))?;

        let def = sequence.definition();
        if declared.is_none() {
            schema.add(Clone::clone(&def.inc_field), FieldKind::Number);
        }
        if def.hooks_enabled {
            schema.hook(SequenceHook::new(Clone::clone(&sequence)));
        }

        info!(
            "attach sequence '{}' ok: inc_field={}, reference_fields={:?}, hooks={}, mode={}",
            &def.id,
            &def.inc_field,
            &def.reference_fields[..],
            def.hooks_enabled,
            def.mode
        );

        Ok(sequence)
    }

    /// Attach every sequence configured for a model.
    pub fn attach_model(&self, model: &str, schema: &Schema) -> Result<Vec<Arc<Sequence>>> {
        let mut attached = vec![];
        if let Some(sequences) = self.sequences.get(model) {
            for next in sequences {
                attached.push(self.attach(schema, Clone::clone(next))?);
            }
        }
        Ok(attached)
    }
}
