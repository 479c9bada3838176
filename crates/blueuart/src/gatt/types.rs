//! Common types for GATT operations

use crate::uuid::Uuid;
use std::fmt;

bitflags::bitflags! {
    /// Characteristic properties as defined in the Bluetooth specification
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CharacteristicProperties: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
    }
}

impl CharacteristicProperties {
    pub fn can_read(&self) -> bool {
        self.contains(Self::READ)
    }

    pub fn can_write(&self) -> bool {
        self.contains(Self::WRITE)
    }

    pub fn can_write_without_response(&self) -> bool {
        self.contains(Self::WRITE_WITHOUT_RESPONSE)
    }

    /// Notify or indicate, i.e. the characteristic carries a CCCD
    pub fn can_subscribe(&self) -> bool {
        self.intersects(Self::NOTIFY | Self::INDICATE)
    }
}

/// Called with `(connection, offset, value)` when a peer writes a local value
pub type WriteHandler = Box<dyn FnMut(u16, usize, &[u8]) + Send>;

/// A characteristic to register with [`Service`]
pub struct CharacteristicConfig {
    pub uuid: Uuid,
    pub value: Vec<u8>,
    pub flags: CharacteristicProperties,
    pub write_event: Option<WriteHandler>,
}

impl CharacteristicConfig {
    pub fn new(uuid: impl Into<Uuid>, flags: CharacteristicProperties, value: impl Into<Vec<u8>>) -> Self {
        Self {
            uuid: uuid.into(),
            value: value.into(),
            flags,
            write_event: None,
        }
    }

    pub fn with_write_event<F>(mut self, handler: F) -> Self
    where
        F: FnMut(u16, usize, &[u8]) + Send + 'static,
    {
        self.write_event = Some(Box::new(handler));
        self
    }
}

impl fmt::Debug for CharacteristicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharacteristicConfig")
            .field("uuid", &self.uuid)
            .field("value", &hex::encode(&self.value))
            .field("flags", &self.flags)
            .field("write_event", &self.write_event.is_some())
            .finish()
    }
}

/// A local GATT service, consumed by `Adapter::add_service`
#[derive(Debug)]
pub struct Service {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicConfig>,
}

impl Service {
    pub fn new(uuid: impl Into<Uuid>) -> Self {
        Self {
            uuid: uuid.into(),
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: CharacteristicConfig) -> Self {
        self.characteristics.push(characteristic);
        self
    }
}
