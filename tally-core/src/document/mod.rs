//! The document-framework capabilities the sequences rely on: documents, schemas with
//! before-insert interceptors, and a model persisting documents into a collection.

pub use context::{DocumentHook, HookContext};
pub use document::Document;
pub use model::Model;
pub use schema::{FieldKind, Schema};
pub use upsert::UpsertDraft;

mod context;
mod document;
mod model;
mod schema;
mod upsert;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::registry::SequenceRegistry;
    use crate::Result;

    use super::*;

    fn init() {
        pretty_env_logger::try_init_timed().ok();
    }

    struct Trace {
        id: u64,
        seen: Arc<Mutex<Vec<u64>>>,
    }

    #[async_trait]
    impl DocumentHook for Trace {
        async fn before_insert(&self, ctx: &HookContext, doc: &mut Document) -> Result<()> {
            self.seen.lock().push(self.id);
            doc.set("trace", self.id)?;
            match ctx.next() {
                None => Ok(()),
                Some(next) => next.before_insert(ctx, doc).await,
            }
        }
    }

    #[tokio::test]
    async fn test_hooks() -> anyhow::Result<()> {
        init();

        let seen = Arc::new(Mutex::new(vec![]));

        let schema = Arc::new(Schema::new().field("name", FieldKind::String));
        for id in 1..=3 {
            schema.hook(Trace {
                id,
                seen: Clone::clone(&seen),
            });
        }

        let model = Model::new("hooks", schema, Arc::new(SequenceRegistry::new()));
        let doc = model.create(json!({"name": "foo"})).await?;

        assert_eq!(vec![1, 2, 3], *seen.lock());
        assert_eq!(Some(&json!(3)), doc.get("trace"));

        Ok(())
    }
}
