// Decision-engine side of the bridge: handshake, line protocol, connection
pub mod connector;
pub mod handshake;
pub mod protocol;

pub use connector::EngineConnector;
pub use handshake::{parse_connection_port, read_connection_port};
pub use protocol::{convert_price, Directive, Request};
