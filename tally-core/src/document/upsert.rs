use serde_json::{Map, Value};

use crate::Result;

/// An upsert which matched no document: the insert it is about to perform.
///
/// `filter` and `update` map dotted paths to values. The inserted document is built from the
/// equality filter, then the update, then the fields set only on insert.
#[derive(Debug, Clone, Default)]
pub struct UpsertDraft {
    filter: Map<String, Value>,
    update: Map<String, Value>,
    set_on_insert: Map<String, Value>,
}

impl UpsertDraft {
    pub fn new(filter: Value, update: Value) -> Result<Self> {
        Ok(Self {
            filter: into_object("filter", filter)?,
            update: into_object("update", update)?,
            set_on_insert: Default::default(),
        })
    }

    #[inline]
    pub fn filter(&self) -> &Map<String, Value> {
        &self.filter
    }

    #[inline]
    pub fn update(&self) -> &Map<String, Value> {
        &self.update
    }

    /// Set a field applied only if the upsert ends up inserting.
    pub fn set_on_insert<V>(&mut self, path: &str, value: V)
    where
        V: Into<Value>,
    {
        self.set_on_insert.insert(path.to_string(), value.into());
    }

    pub fn get_on_insert(&self, path: &str) -> Option<&Value> {
        self.set_on_insert.get(path)
    }

    /// The document this upsert would insert.
    pub fn document(&self) -> Result<Value> {
        let mut doc = Value::Object(Map::new());
        for (path, value) in self
            .filter
            .iter()
            .chain(self.update.iter())
            .chain(self.set_on_insert.iter())
        {
            tally_util::set_path(&mut doc, path, Clone::clone(value))?;
        }
        Ok(doc)
    }

    pub(crate) fn matches(filter: &Map<String, Value>, doc: &Value) -> bool {
        filter
            .iter()
            .all(|(path, expect)| tally_util::resolve_path(doc, path) == Some(expect))
    }
}

fn into_object(what: &str, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(m) => Ok(m),
        other => Err(anyhow!("upsert {} must be an object, found {}", what, other).into()),
    }
}
