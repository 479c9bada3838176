//! 128-bit Bluetooth UUIDs
//!
//! A `Uuid` is always the full 128-bit value. Short 16- and 32-bit UUIDs are
//! embedded into the Bluetooth base UUID `00000000-0000-1000-8000-00805F9B34FB`
//! with the SIG formula `value * 2^96 + BASE`, so comparing two UUIDs always
//! compares the full form.

use std::fmt;

/// A Bluetooth UUID, stored little-endian as it travels on the wire
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Uuid {
    bytes: [u8; 16],
}

/// Base UUID in little-endian order
const BASE_UUID_BYTES: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Little-endian position of the 32-bit slot within the base UUID (bits 96..128)
const BASE_OFFSET: usize = 12;

impl Uuid {
    pub const fn from_bytes_le(bytes: [u8; 16]) -> Self {
        Uuid { bytes }
    }

    /// Creates a UUID from its canonical (big-endian) byte order
    pub fn from_bytes_be(mut bytes: [u8; 16]) -> Self {
        bytes.reverse();
        Uuid { bytes }
    }

    /// Embeds a SIG-assigned 16-bit UUID into the base UUID
    pub const fn from_u16(uuid16: u16) -> Self {
        Self::from_u32(uuid16 as u32)
    }

    /// Embeds a 32-bit UUID into the base UUID
    pub const fn from_u32(uuid32: u32) -> Self {
        let mut bytes = BASE_UUID_BYTES;
        bytes[BASE_OFFSET] = uuid32 as u8;
        bytes[BASE_OFFSET + 1] = (uuid32 >> 8) as u8;
        bytes[BASE_OFFSET + 2] = (uuid32 >> 16) as u8;
        bytes[BASE_OFFSET + 3] = (uuid32 >> 24) as u8;
        Uuid { bytes }
    }

    /// Reads a little-endian UUID of 2, 4 or 16 bytes
    pub fn try_from_slice_le(slice: &[u8]) -> Option<Self> {
        match slice.len() {
            2 => Some(Uuid::from_u16(u16::from_le_bytes([slice[0], slice[1]]))),
            4 => Some(Uuid::from_u32(u32::from_le_bytes([
                slice[0], slice[1], slice[2], slice[3],
            ]))),
            16 => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(slice);
                Some(Uuid::from_bytes_le(bytes))
            }
            _ => None,
        }
    }

    pub const fn as_bytes_le(&self) -> &[u8; 16] {
        &self.bytes
    }

    pub fn as_bytes_be(&self) -> [u8; 16] {
        let mut bytes = self.bytes;
        bytes.reverse();
        bytes
    }

    fn is_sig_assigned(&self) -> bool {
        self.bytes[0..BASE_OFFSET] == BASE_UUID_BYTES[0..BASE_OFFSET]
    }

    /// The 16-bit short form, if this UUID has one
    pub fn as_u16(&self) -> Option<u16> {
        match self.as_u32() {
            Some(v) if v <= u16::MAX as u32 => Some(v as u16),
            _ => None,
        }
    }

    /// The 32-bit short form, if this UUID is derived from the base UUID
    pub fn as_u32(&self) -> Option<u32> {
        if self.is_sig_assigned() {
            Some(u32::from_le_bytes([
                self.bytes[BASE_OFFSET],
                self.bytes[BASE_OFFSET + 1],
                self.bytes[BASE_OFFSET + 2],
                self.bytes[BASE_OFFSET + 3],
            ]))
        } else {
            None
        }
    }

    pub fn is_16bit(&self) -> bool {
        self.as_u16().is_some()
    }

    /// True for base-derived UUIDs that need the full 32-bit slot
    pub fn is_32bit(&self) -> bool {
        self.as_u32().is_some() && !self.is_16bit()
    }

    /// Shortest little-endian wire form used in ATT PDUs: 2 bytes or 16 bytes
    pub fn to_att_bytes(&self) -> Vec<u8> {
        match self.as_u16() {
            Some(short) => short.to_le_bytes().to_vec(),
            None => self.bytes.to_vec(),
        }
    }
}

impl From<u16> for Uuid {
    fn from(uuid16: u16) -> Self {
        Uuid::from_u16(uuid16)
    }
}

impl From<u32> for Uuid {
    fn from(uuid32: u32) -> Self {
        Uuid::from_u32(uuid32)
    }
}

impl PartialEq<u16> for Uuid {
    fn eq(&self, other: &u16) -> bool {
        self.as_u16() == Some(*other)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.as_bytes_be();
        write!(
            f,
            "{}-{}-{}-{}-{}",
            hex::encode(&b[0..4]),
            hex::encode(&b[4..6]),
            hex::encode(&b[6..8]),
            hex::encode(&b[8..10]),
            hex::encode(&b[10..16])
        )
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.as_u16(), self.as_u32()) {
            (Some(short), _) => write!(f, "Uuid(0x{:04X})", short),
            (None, Some(long)) => write!(f, "Uuid(0x{:08X})", long),
            _ => write!(f, "Uuid({})", self),
        }
    }
}

// GATT attribute types
pub const GATT_PRIMARY_SERVICE: u16 = 0x2800;
pub const GATT_SECONDARY_SERVICE: u16 = 0x2801;
pub const GATT_CHARACTERISTIC: u16 = 0x2803;
pub const GATT_CLIENT_CHARACTERISTIC_CONFIG: u16 = 0x2902;

// Services
pub const SERVICE_GENERIC_ACCESS: Uuid = Uuid::from_u16(0x1800);
pub const SERVICE_GENERIC_ATTRIBUTE: Uuid = Uuid::from_u16(0x1801);
pub const SERVICE_HEART_RATE: Uuid = Uuid::from_u16(0x180D);
pub const SERVICE_BATTERY: Uuid = Uuid::from_u16(0x180F);

// Characteristics
pub const CHARACTERISTIC_DEVICE_NAME: Uuid = Uuid::from_u16(0x2A00);
pub const CHARACTERISTIC_APPEARANCE: Uuid = Uuid::from_u16(0x2A01);
pub const CHARACTERISTIC_SERVICE_CHANGED: Uuid = Uuid::from_u16(0x2A05);
pub const CHARACTERISTIC_BATTERY_LEVEL: Uuid = Uuid::from_u16(0x2A19);
pub const CHARACTERISTIC_HEART_RATE_MEASUREMENT: Uuid = Uuid::from_u16(0x2A37);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_uuid_embeds_into_base() {
        let uuid = Uuid::from_u16(0x180D);
        assert_eq!(uuid.to_string(), "0000180d-0000-1000-8000-00805f9b34fb");
        assert_eq!(uuid.as_u16(), Some(0x180D));
        assert!(uuid.is_16bit());
        assert!(!uuid.is_32bit());
    }

    #[test]
    fn test_equality_uses_full_form() {
        let mut be = [0u8; 16];
        be.copy_from_slice(&Uuid::from_u16(0x2A37).as_bytes_be());
        assert_eq!(Uuid::from_bytes_be(be), Uuid::from_u16(0x2A37));

        // Same low 16 bits, different base
        be[15] ^= 0x01;
        let other = Uuid::from_bytes_be(be);
        assert_ne!(other, Uuid::from_u16(0x2A37));
        assert_eq!(other.as_u16(), None);
    }

    #[test]
    fn test_32bit_uuid() {
        let uuid = Uuid::from_u32(0x0240FCD2);
        assert!(uuid.is_32bit());
        assert_eq!(uuid.as_u16(), None);
        assert_eq!(uuid.as_u32(), Some(0x0240FCD2));
        assert_eq!(Uuid::try_from_slice_le(&[0xD2, 0xFC, 0x40, 0x02]), Some(uuid));
    }

    #[test]
    fn test_att_bytes() {
        assert_eq!(Uuid::from_u16(0x2800).to_att_bytes(), vec![0x00, 0x28]);
        let custom = Uuid::from_bytes_le([7u8; 16]);
        assert_eq!(custom.to_att_bytes().len(), 16);
    }
}
