mod config;
mod cycles;
mod status;
mod system;

pub use config::{get_config, patch_config};
pub use cycles::{get_cycle, list_cycles};
pub use status::{get_status, health};
pub use system::{kill_system, start_system, stop_system};
