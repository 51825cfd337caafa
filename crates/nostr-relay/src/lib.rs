pub mod connection;
pub mod error;
pub mod filter;
pub mod message;
pub mod pool;

pub use connection::{RelayConfig, RelayConnection, RelayConnectionState};
pub use error::{Error, Result};
pub use filter::Filter;
pub use message::{ClientMessage, RelayMessage};
pub use pool::{EventHandler, PoolConfig, RelayPool};
