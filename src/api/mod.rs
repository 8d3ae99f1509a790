pub mod bitmex;
pub mod gateway;

pub use bitmex::BitMexClient;
pub use gateway::ExchangeGateway;
