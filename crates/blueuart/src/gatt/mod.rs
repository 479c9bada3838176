//! GATT: local services served to peers, and discovery of a peer's services

pub mod client;
pub mod error;
pub mod server;
pub mod types;


pub use client::{DeviceCharacteristic, DeviceService};
pub use error::GattError;
pub use server::{Characteristic, CharacteristicHandles, ServiceHandles};
pub use types::{CharacteristicConfig, CharacteristicProperties, Service, WriteHandler};
