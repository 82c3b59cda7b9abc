pub mod exchange;
pub mod sim;
pub mod store;

pub use exchange::{ExchangeClient, RestExchange};
pub use sim::SimulatedExchange;
pub use store::CycleStore;
