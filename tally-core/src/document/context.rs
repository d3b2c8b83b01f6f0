use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::Result;

use super::{Document, UpsertDraft};

/// Carries the chain of interceptors of one lifecycle event.
pub struct HookContext {
    hooks: (AtomicUsize, Vec<Arc<dyn DocumentHook>>),
}

impl HookContext {
    pub(crate) fn new(hooks: Vec<Arc<dyn DocumentHook>>) -> Self {
        Self {
            hooks: (AtomicUsize::new(1), hooks),
        }
    }

    pub(crate) fn first(&self) -> Option<&dyn DocumentHook> {
        self.hooks.1.first().map(|it| it.as_ref())
    }

    /// Returns the next hook.
    pub fn next(&self) -> Option<&dyn DocumentHook> {
        let seq = self.hooks.0.fetch_add(1, Ordering::SeqCst);
        self.hooks.1.get(seq).map(|it| it.as_ref())
    }
}

/// An interceptor running before a document is written.
///
/// Each handler is in charge of continuing the chain through [`HookContext::next`]; returning
/// an error aborts the event and nothing is persisted.
#[async_trait::async_trait]
pub trait DocumentHook: Send + Sync + 'static {
    /// Called when a new document is about to be inserted.
    async fn before_insert(&self, ctx: &HookContext, doc: &mut Document) -> Result<()> {
        match ctx.next() {
            None => Ok(()),
            Some(next) => next.before_insert(ctx, doc).await,
        }
    }

    /// Called when an upsert matched nothing and is about to insert.
    async fn before_upsert_insert(&self, ctx: &HookContext, draft: &mut UpsertDraft) -> Result<()> {
        match ctx.next() {
            None => Ok(()),
            Some(next) => next.before_upsert_insert(ctx, draft).await,
        }
    }
}
