pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod strategy;

pub use adapters::{CycleStore, ExchangeClient, RestExchange, SimulatedExchange};
pub use config::{AppConfig, DualEntryConfig, DualEntryPatch};
pub use domain::{Cycle, CycleOutcome, CycleState, Side};
pub use error::{DuetError, Result};
pub use strategy::{Engine, StatusSnapshot};
