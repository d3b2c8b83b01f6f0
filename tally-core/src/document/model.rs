use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::registry::SequenceRegistry;
use crate::Result;

use super::{Document, HookContext, Schema, UpsertDraft};

/// Documents of one model, keyed by a storage key.
#[derive(Default)]
struct Collection {
    seq: AtomicU64,
    docs: RwLock<BTreeMap<u64, Value>>,
}

impl Collection {
    fn insert(&self, value: Value) -> u64 {
        let key = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut w = self.docs.write();
        w.insert(key, value);
        key
    }

    fn replace(&self, key: u64, value: Value) -> bool {
        let mut w = self.docs.write();
        match w.get_mut(&key) {
            None => false,
            Some(exist) => {
                *exist = value;
                true
            }
        }
    }

    fn find_one(&self, filter: &Map<String, Value>) -> Option<(u64, Value)> {
        let r = self.docs.read();
        r.iter()
            .find(|(_, doc)| UpsertDraft::matches(filter, doc))
            .map(|(k, doc)| (*k, Clone::clone(doc)))
    }

    fn update_one(
        &self,
        filter: &Map<String, Value>,
        update: &Map<String, Value>,
    ) -> Result<Option<(u64, Value)>> {
        let mut w = self.docs.write();
        Self::apply(&mut w, filter, update)
    }

    /// Insert the draft unless a matching document showed up in the meantime, in which case
    /// only the update is applied.
    fn upsert(&self, draft: &UpsertDraft) -> Result<(u64, Value)> {
        let inserted = draft.document()?;

        let mut w = self.docs.write();
        if let Some(updated) = Self::apply(&mut w, draft.filter(), draft.update())? {
            return Ok(updated);
        }

        let key = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        w.insert(key, Clone::clone(&inserted));
        Ok((key, inserted))
    }

    fn apply(
        docs: &mut BTreeMap<u64, Value>,
        filter: &Map<String, Value>,
        update: &Map<String, Value>,
    ) -> Result<Option<(u64, Value)>> {
        let found = docs
            .iter_mut()
            .find(|(_, doc)| UpsertDraft::matches(filter, doc));
        match found {
            None => Ok(None),
            Some((key, doc)) => {
                let mut next = Clone::clone(doc);
                for (path, value) in update {
                    tally_util::set_path(&mut next, path, Clone::clone(value))?;
                }
                *doc = Clone::clone(&next);
                Ok(Some((*key, next)))
            }
        }
    }
}

/// Persists documents of one schema, running the schema interceptors on inserts.
pub struct Model {
    name: String,
    schema: Arc<Schema>,
    registry: Arc<SequenceRegistry>,
    collection: Collection,
}

impl Model {
    pub fn new<S>(name: S, schema: Arc<Schema>, registry: Arc<SequenceRegistry>) -> Self
    where
        S: Into<String>,
    {
        Self {
            name: name.into(),
            schema,
            registry,
            collection: Default::default(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Save a document: new documents go through the before-insert hooks and are inserted,
    /// persisted ones are replaced.
    ///
    /// The document is left untouched when a hook fails.
    pub async fn save(&self, doc: &mut Document) -> Result<()> {
        if let Some(key) = doc.key() {
            if !self.collection.replace(key, Clone::clone(doc.value())) {
                return Err(anyhow!("document #{} not found in '{}'", key, &self.name).into());
            }
            return Ok(());
        }

        let mut draft = Clone::clone(doc);
        let ctx = HookContext::new(self.schema.hooks());
        if let Some(first) = ctx.first() {
            if let Err(e) = first.before_insert(&ctx, &mut draft).await {
                error!("cannot insert document into '{}': {}", &self.name, e);
                return Err(e);
            }
        }

        draft.key = Some(self.collection.insert(Clone::clone(draft.value())));
        *doc = draft;

        Ok(())
    }

    pub async fn create(&self, value: Value) -> Result<Document> {
        let mut doc = Document::new(value);
        self.save(&mut doc).await?;
        Ok(doc)
    }

    /// Update the first document matching `filter`, or insert one.
    ///
    /// Only the insert path runs the before-upsert-insert hooks.
    pub async fn upsert(&self, filter: Value, update: Value) -> Result<Document> {
        let mut draft = UpsertDraft::new(filter, update)?;

        if let Some((key, value)) = self.collection.update_one(draft.filter(), draft.update())? {
            return Ok(Document::persisted(key, value));
        }

        let ctx = HookContext::new(self.schema.hooks());
        if let Some(first) = ctx.first() {
            if let Err(e) = first.before_upsert_insert(&ctx, &mut draft).await {
                error!("cannot upsert document into '{}': {}", &self.name, e);
                return Err(e);
            }
        }

        let (key, value) = self.collection.upsert(&draft)?;
        Ok(Document::persisted(key, value))
    }

    pub fn find_one(&self, filter: &Value) -> Option<Document> {
        let filter = match filter {
            Value::Object(m) => m,
            _ => return None,
        };
        self.collection
            .find_one(filter)
            .map(|(key, value)| Document::persisted(key, value))
    }

    pub fn find_by_key(&self, key: u64) -> Option<Document> {
        let r = self.collection.docs.read();
        r.get(&key)
            .map(|value| Document::persisted(key, Clone::clone(value)))
    }

    pub fn count(&self) -> usize {
        self.collection.docs.read().len()
    }

    /// Allocate the next value of a registered sequence into the document, then save it.
    ///
    /// Meant for sequences attached with hooks disabled. On failure the document is unchanged
    /// and nothing is persisted.
    pub async fn set_next(&self, id: &str, doc: &mut Document) -> Result<()> {
        let sequence = self.registry.lookup(id)?;
        let seq = sequence.allocate(doc.value()).await?;

        let mut draft = Clone::clone(doc);
        draft.set(&sequence.definition().inc_field, seq)?;
        self.save(&mut draft).await?;
        *doc = draft;

        Ok(())
    }

    /// Reset the counters of a registered sequence, see [`crate::Sequence::reset`].
    pub async fn counter_reset(&self, id: &str, reference: Option<&Value>) -> Result<u64> {
        let sequence = self.registry.lookup(id)?;
        sequence.reset(reference).await
    }
}
