pub mod cycle;
pub mod market;
pub mod order;
pub mod state;

pub use cycle::*;
pub use market::*;
pub use order::*;
pub use state::*;
