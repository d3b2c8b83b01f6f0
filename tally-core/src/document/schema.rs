use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::DocumentHook;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FieldKind {
    Number,
    String,
    Boolean,
    Object,
    Array,
    Mixed,
}

/// Declared fields and registered interceptors of a model.
#[derive(Default)]
pub struct Schema {
    fields: RwLock<BTreeMap<String, FieldKind>>,
    hooks: RwLock<Vec<Arc<dyn DocumentHook>>>,
}

impl Schema {
    pub fn new() -> Self {
        Default::default()
    }

    #[inline]
    pub fn field<S>(self, path: S, kind: FieldKind) -> Self
    where
        S: Into<String>,
    {
        self.add(path, kind);
        self
    }

    /// Returns the kind of a declared field.
    pub fn path(&self, path: &str) -> Option<FieldKind> {
        self.fields.read().get(path).copied()
    }

    pub fn add<S>(&self, path: S, kind: FieldKind)
    where
        S: Into<String>,
    {
        let mut w = self.fields.write();
        w.insert(path.into(), kind);
    }

    /// Register a before-insert interceptor, hooks run in registration order.
    #[inline]
    pub fn hook<H>(&self, hook: H)
    where
        H: DocumentHook,
    {
        self.hook_arc(Arc::new(hook))
    }

    pub fn hook_arc(&self, hook: Arc<dyn DocumentHook>) {
        let mut w = self.hooks.write();
        w.push(hook);
    }

    pub(crate) fn hooks(&self) -> Vec<Arc<dyn DocumentHook>> {
        Clone::clone(&*self.hooks.read())
    }
}
