pub mod aggregator;
pub mod engine;
pub mod executor;
pub mod machine;
pub mod modifiers;
pub mod scheduler;
pub mod volatility;

pub use aggregator::{Analytics, StatusSnapshot};
pub use engine::Engine;
pub use executor::OrderExecutor;
pub use machine::CycleDriver;
pub use scheduler::{next_window_start, SchedulerDecision, SkipReason, WindowScheduler};
pub use volatility::VolatilityTracker;
