use std::sync::Arc;

use common::config::Settings;
use common::Dispatcher;

/// Application state shared across all handlers
#[derive(Clone, Debug)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<Settings>,
}

impl AppState {
    /// Create a new AppState instance
    pub fn new(dispatcher: Arc<Dispatcher>, config: Settings) -> Self {
        Self {
            dispatcher,
            config: Arc::new(config),
        }
    }
}
