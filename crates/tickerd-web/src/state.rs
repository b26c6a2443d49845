//! Shared handler state.

use std::sync::Arc;

use tickerd_core::envfile::EnvStore;
use tickerd_core::gateway::Gateway;
use tickerd_core::store::TaskStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TaskStore>,
    pub gateway: Gateway,
    pub env: EnvStore,
}

impl AppState {
    pub fn new(store: Arc<TaskStore>, env: EnvStore) -> Self {
        let gateway = Gateway::new(Arc::clone(&store));
        Self {
            store,
            gateway,
            env,
        }
    }
}
