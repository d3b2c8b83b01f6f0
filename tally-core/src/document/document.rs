use serde_json::{Map, Value};

use crate::Result;

/// A json document, new until a model persists it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub(crate) key: Option<u64>,
    value: Value,
}

impl Document {
    pub fn new(value: Value) -> Self {
        Self { key: None, value }
    }

    pub(crate) fn persisted(key: u64, value: Value) -> Self {
        Self {
            key: Some(key),
            value,
        }
    }

    /// The storage key, assigned on first save.
    #[inline]
    pub fn key(&self) -> Option<u64> {
        self.key
    }

    #[inline]
    pub fn is_new(&self) -> bool {
        self.key.is_none()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        tally_util::resolve_path(&self.value, path)
    }

    pub fn set<V>(&mut self, path: &str, value: V) -> Result<()>
    where
        V: Into<Value>,
    {
        tally_util::set_path(&mut self.value, path, value.into())?;
        Ok(())
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new(Value::Object(Map::new()))
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Document::new(value)
    }
}
