//! blueuart - A Bluetooth Low Energy host stack for controllers on a serial port
//!
//! The controller speaks HCI over a UART (a u-blox NINA module, or any plain
//! HCI firmware). On top of that this crate runs L2CAP connection parameter
//! signaling, ATT in both roles, GATT client and server, and GAP scanning,
//! connecting and advertising. Everything is driven by polling; there are no
//! interrupts and no async runtime.
//!
//! ```no_run
//! use blueuart::{Adapter, StackConfig, UartConfig};
//!
//! # fn main() -> blueuart::Result<()> {
//! let adapter = Adapter::open_uart(&UartConfig::default(), StackConfig::default())?;
//! adapter.enable()?;
//! adapter.scan(|adapter, result| {
//!     println!("{} {} {:?}", result.address, result.rssi, result.local_name());
//!     let _ = adapter.stop_scan();
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod att;
pub mod config;
pub mod error;
pub mod gap;
pub mod gatt;
pub mod hci;
pub mod l2cap;
pub mod stack;
pub mod uuid;

#[cfg(test)]
mod testing;

// Re-export common types for convenience
pub use adapter::{Adapter, Device};
pub use config::{ControllerProfile, StackConfig};
pub use error::{Error, HciError, Result};
pub use gap::{
    Address, Advertisement, AdvertisementOptions, ConnectionParams, MacAddress, ManufacturerDataElement,
    ScanResult, ServiceDataElement,
};
pub use gatt::{
    Characteristic, CharacteristicConfig, CharacteristicProperties, DeviceCharacteristic, DeviceService,
    GattError, Service,
};
pub use hci::{Transport, UartConfig, UartTransport};
pub use uuid::Uuid;
