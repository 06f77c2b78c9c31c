use crate::store::MessageStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Writes through this store are announced on the change feed.
    pub store: Arc<dyn MessageStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }
}
