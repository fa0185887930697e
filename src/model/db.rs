//! Database handle

use std::sync::Arc;

use super::entity::Model;
use crate::adapter::Adapter;
use crate::error::DbResult;

/// Owns the adapter that registered models are bound to
#[derive(Clone)]
pub struct Db {
    adapter: Arc<dyn Adapter>,
}

impl Db {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    /// The adapter shared by every registered model
    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Bind `model` to this database and provision its collection.
    ///
    /// Registering the same model twice is allowed; binding a model that is
    /// already bound to another database fails with `InvalidArgument`.
    pub async fn register(&self, model: &Model) -> DbResult<()> {
        model.bind(Arc::clone(&self.adapter))?;
        self.adapter.ensure_collection(model.collection()).await
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("backend", &self.adapter.backend_name())
            .finish()
    }
}
