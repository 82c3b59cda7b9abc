use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::strategy::Engine;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
