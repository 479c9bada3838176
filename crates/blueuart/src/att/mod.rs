//! Attribute Protocol (ATT)
//!
//! One [`AttEngine`] per stack handles both roles: it answers requests from
//! the local attribute table and collects the responses to our own requests.
//! PDUs travel on the fixed L2CAP channel 0x0004.

pub mod client;
pub mod constants;
pub mod database;
pub mod engine;
pub mod error;
pub mod notifications;
pub mod pdu;
pub mod server;
pub mod types;


pub use self::database::{Attribute, AttributeDatabase, AttributeKind, LocalCharacteristic};
pub use self::engine::{AttEngine, ConnectionData, PendingRequest};
pub use self::error::{AttError, AttErrorCode, AttResult};
pub use self::notifications::{Notification, NotificationQueue, NotificationReceiver};
pub use self::pdu::AttPacket;
pub use self::types::{CharacteristicRecord, DescriptorRecord, ServiceRecord};
