// Live trading: candle feed, position state machine, order sizing
pub mod candle_feed;
pub mod position_machine;
pub mod sizing;

pub use candle_feed::{CandleFeed, PollingCandleFeed};
pub use position_machine::PositionStateMachine;
pub use sizing::QuantityResolver;
