use std::sync::Arc;

use ecosure_assistants::AssistantsApi;

use crate::config::ServerConfig;
use crate::relay::Relay;

/// Application state shared across all API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub assistants: Arc<dyn AssistantsApi>,
}

impl AppState {
    pub fn new(config: ServerConfig, assistants: Arc<dyn AssistantsApi>) -> Self {
        Self {
            config: Arc::new(config),
            assistants,
        }
    }

    pub fn relay(&self) -> Relay {
        Relay::new(self.assistants.clone(), self.config.clone())
    }
}
