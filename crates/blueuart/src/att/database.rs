//! Local attribute table for the ATT server
//!
//! Handles are handed out in increasing order starting at 1 and never reused.
//! Services and characteristics are kept as handle ranges next to the flat
//! attribute map so discovery scans can walk them in handle order.

use super::types::{CharacteristicRecord, ServiceRecord};
use crate::gatt::{CharacteristicProperties, WriteHandler};
use crate::uuid::Uuid;
use std::collections::BTreeMap;
use std::fmt;

/// What an attribute declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Service,
    Characteristic,
    CharacteristicValue,
    Descriptor,
}

/// An attribute in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub handle: u16,
    pub kind: AttributeKind,
    /// Handle of the owning declaration; a service points at itself
    pub parent: u16,
    /// Attribute type, e.g. 0x2800 for a service declaration
    pub uuid: Uuid,
    pub permissions: CharacteristicProperties,
    /// Declaration value. Characteristic values and CCCDs live on
    /// [`LocalCharacteristic`].
    pub value: Vec<u8>,
}

/// Server-side state of one characteristic
pub struct LocalCharacteristic {
    pub record: CharacteristicRecord,
    pub service_handle: u16,
    pub cccd_handle: Option<u16>,
    pub value: Vec<u8>,
    pub cccd: u16,
    pub(crate) write_handler: Option<WriteHandler>,
}

impl fmt::Debug for LocalCharacteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCharacteristic")
            .field("record", &self.record)
            .field("service_handle", &self.service_handle)
            .field("cccd_handle", &self.cccd_handle)
            .field("value", &hex::encode(&self.value))
            .field("cccd", &self.cccd)
            .finish()
    }
}

/// Attribute database
#[derive(Debug, Default)]
pub struct AttributeDatabase {
    attributes: BTreeMap<u16, Attribute>,
    services: Vec<ServiceRecord>,
    characteristics: BTreeMap<u16, LocalCharacteristic>,
    last_handle: u16,
}

impl AttributeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last handle allocated, 0 when empty
    pub fn last_handle(&self) -> u16 {
        self.last_handle
    }

    /// Handles still free
    pub fn free_handles(&self) -> usize {
        (u16::MAX - self.last_handle) as usize
    }

    /// Allocate the next handle for a new attribute; `None` once 0xFFFF is used
    pub fn add_attribute(
        &mut self,
        kind: AttributeKind,
        parent: Option<u16>,
        uuid: Uuid,
        permissions: CharacteristicProperties,
        value: Vec<u8>,
    ) -> Option<u16> {
        let handle = self.last_handle.checked_add(1)?;
        self.last_handle = handle;
        self.attributes.insert(
            handle,
            Attribute {
                handle,
                kind,
                parent: parent.unwrap_or(handle),
                uuid,
                permissions,
                value,
            },
        );
        Some(handle)
    }

    /// Replace the stored value of a declaration attribute
    pub fn set_declaration_value(&mut self, handle: u16, value: Vec<u8>) {
        if let Some(attribute) = self.attributes.get_mut(&handle) {
            attribute.value = value;
        }
    }

    pub fn add_service(&mut self, service: ServiceRecord) {
        self.services.push(service);
    }

    pub fn add_characteristic(&mut self, characteristic: LocalCharacteristic) {
        self.characteristics
            .insert(characteristic.record.value_handle, characteristic);
    }

    pub fn attribute(&self, handle: u16) -> Option<&Attribute> {
        self.attributes.get(&handle)
    }

    /// Attributes with `start <= handle <= end`, in handle order
    pub fn attributes_in(&self, start: u16, end: u16) -> impl Iterator<Item = &Attribute> {
        self.attributes
            .range(start..)
            .take_while(move |(handle, _)| **handle <= end)
            .map(|(_, attribute)| attribute)
    }

    /// Services whose declaration falls within `start..=end`, in handle order
    pub fn services_in(&self, start: u16, end: u16) -> impl Iterator<Item = &ServiceRecord> {
        self.services
            .iter()
            .filter(move |s| s.start_handle >= start && s.start_handle <= end)
    }

    /// Characteristics whose declaration falls within `start..=end`
    pub fn characteristics_in(&self, start: u16, end: u16) -> impl Iterator<Item = &LocalCharacteristic> {
        self.characteristics
            .values()
            .filter(move |c| c.record.declaration_handle >= start && c.record.declaration_handle <= end)
    }

    pub fn services(&self) -> &[ServiceRecord] {
        &self.services
    }

    pub fn characteristic(&self, value_handle: u16) -> Option<&LocalCharacteristic> {
        self.characteristics.get(&value_handle)
    }

    pub fn characteristic_mut(&mut self, value_handle: u16) -> Option<&mut LocalCharacteristic> {
        self.characteristics.get_mut(&value_handle)
    }

    /// The characteristic owning a value or descriptor attribute
    pub fn owner_of_mut(&mut self, handle: u16) -> Option<&mut LocalCharacteristic> {
        let attribute = self.attributes.get(&handle)?;
        let value_handle = match attribute.kind {
            AttributeKind::CharacteristicValue => handle,
            // Descriptors point at the declaration; the value follows it
            AttributeKind::Descriptor => attribute.parent.checked_add(1)?,
            _ => return None,
        };
        self.characteristics.get_mut(&value_handle)
    }
}
