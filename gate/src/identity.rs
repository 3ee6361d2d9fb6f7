use crate::store::{INSTALL_ID_KEY, StateStore};
use std::sync::Arc;
use uuid::Uuid;

/// Hands out the per-install identifier, generating and persisting it on
/// first use.
pub struct IdentityProvider {
    store: Arc<dyn StateStore>,
}

impl IdentityProvider {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        IdentityProvider { store }
    }

    pub fn get_or_create_id(&self) -> String {
        match self.store.get(INSTALL_ID_KEY) {
            Ok(Some(id)) if !id.is_empty() => return id,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "Could not read install id, generating a new one");
            }
        }

        // Hyphenated UUIDs are always rendered lowercase
        let id = Uuid::new_v4().hyphenated().to_string();
        match self.store.set(INSTALL_ID_KEY, &id) {
            Ok(()) => tracing::info!(install_id = %id, "Persisted new install id"),
            Err(err) => {
                tracing::warn!(error = %err, "Could not persist install id, using it for this run only")
            }
        }
        id
    }
}
