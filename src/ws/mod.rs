pub(crate) mod message_types;
mod transport;
mod ws_manager;

pub use message_types::{EnginePacket, OpenHandshake, ServerEvent, SocketPacket};
pub use transport::TransportKind;
pub use ws_manager::{ConnectionConfig, ConnectionManager, ConnectionStats, ConnectionStatus};
