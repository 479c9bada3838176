//! Attribute records exchanged by discovery
//!
//! The same records describe the local table (server role) and the results of
//! a remote discovery (client role). Each knows its own entry layout in a
//! Read By Group Type or Read By Type response.

use crate::gatt::CharacteristicProperties;
use crate::uuid::Uuid;

/// A primary service and its handle range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceRecord {
    pub start_handle: u16,
    pub end_handle: u16,
    pub uuid: Uuid,
}

impl ServiceRecord {
    /// Parse one attribute data entry: start, end, 2 or 16 byte UUID
    pub fn from_group_entry(entry: &[u8]) -> Option<Self> {
        if entry.len() < 6 {
            return None;
        }
        Some(Self {
            start_handle: u16::from_le_bytes([entry[0], entry[1]]),
            end_handle: u16::from_le_bytes([entry[2], entry[3]]),
            uuid: Uuid::try_from_slice_le(&entry[4..])?,
        })
    }

    pub fn to_group_entry(&self) -> Vec<u8> {
        let mut entry = Vec::with_capacity(20);
        entry.extend_from_slice(&self.start_handle.to_le_bytes());
        entry.extend_from_slice(&self.end_handle.to_le_bytes());
        entry.extend_from_slice(&self.uuid.to_att_bytes());
        entry
    }
}

/// A characteristic declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicRecord {
    pub declaration_handle: u16,
    pub properties: CharacteristicProperties,
    pub value_handle: u16,
    pub uuid: Uuid,
}

impl CharacteristicRecord {
    /// Parse one entry: declaration handle, properties, value handle, UUID
    pub fn from_type_entry(entry: &[u8]) -> Option<Self> {
        if entry.len() < 7 {
            return None;
        }
        Some(Self {
            declaration_handle: u16::from_le_bytes([entry[0], entry[1]]),
            properties: CharacteristicProperties::from_bits_truncate(entry[2]),
            value_handle: u16::from_le_bytes([entry[3], entry[4]]),
            uuid: Uuid::try_from_slice_le(&entry[5..])?,
        })
    }

    pub fn to_type_entry(&self) -> Vec<u8> {
        let mut entry = Vec::with_capacity(2 + self.declaration_value().len());
        entry.extend_from_slice(&self.declaration_handle.to_le_bytes());
        entry.extend_from_slice(&self.declaration_value());
        entry
    }

    /// Value of the declaration attribute: properties, value handle, UUID
    pub fn declaration_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(19);
        value.push(self.properties.bits());
        value.extend_from_slice(&self.value_handle.to_le_bytes());
        value.extend_from_slice(&self.uuid.to_att_bytes());
        value
    }
}

/// A handle and attribute type pair from Find Information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRecord {
    pub handle: u16,
    pub uuid: Uuid,
}
