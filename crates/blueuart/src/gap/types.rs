use crate::gap::constants::*;
use rand::Rng;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
    PublicIdentity,
    RandomIdentity,
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            PUBLIC_DEVICE_ADDRESS => AddressType::Public,
            RANDOM_DEVICE_ADDRESS => AddressType::Random,
            PUBLIC_IDENTITY_ADDRESS => AddressType::PublicIdentity,
            RANDOM_IDENTITY_ADDRESS => AddressType::RandomIdentity,
            _ => AddressType::Public,
        }
    }
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => PUBLIC_DEVICE_ADDRESS,
            AddressType::Random => RANDOM_DEVICE_ADDRESS,
            AddressType::PublicIdentity => PUBLIC_IDENTITY_ADDRESS,
            AddressType::RandomIdentity => RANDOM_IDENTITY_ADDRESS,
        }
    }
}

/// A 48-bit device address, least significant byte first as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress {
    pub mac: [u8; 6],
}

impl MacAddress {
    pub fn new(mac: [u8; 6]) -> Self {
        Self { mac }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(slice.get(..6)?);
        Some(Self { mac })
    }

    /// A static random address: two most significant bits set
    pub fn random_static() -> Self {
        let mut mac: [u8; 6] = rand::thread_rng().gen();
        mac[5] |= 0xC0;
        Self { mac }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mac
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.mac[5], self.mac[4], self.mac[3], self.mac[2], self.mac[1], self.mac[0]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError(pub String);

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address: {}", self.0)
    }
}

impl std::error::Error for ParseAddressError {}

impl FromStr for MacAddress {
    type Err = ParseAddressError;

    /// Parses `AA:BB:CC:DD:EE:FF`, most significant byte first
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(ParseAddressError(s.to_string()));
        }

        let mut mac = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseAddressError(s.to_string()));
            }
            mac[5 - i] = u8::from_str_radix(part, 16).map_err(|_| ParseAddressError(s.to_string()))?;
        }
        Ok(Self { mac })
    }
}

/// A peer address and whether it is random
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address {
    pub mac: MacAddress,
    pub is_random: bool,
}

impl Address {
    pub fn new(mac: MacAddress, is_random: bool) -> Self {
        Self { mac, is_random }
    }

    /// From an HCI address type byte and wire-order address
    pub fn from_hci(address_type: u8, address: [u8; 6]) -> Self {
        Self {
            mac: MacAddress::new(address),
            is_random: address_type == RANDOM_DEVICE_ADDRESS,
        }
    }

    pub fn address_type(&self) -> AddressType {
        if self.is_random {
            AddressType::Random
        } else {
            AddressType::Public
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.mac.fmt(f)
    }
}

/// Parameters for `Adapter::connect`. Zero fields take the stack defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParams {
    pub scan_interval: u16,
    pub scan_window: u16,
    pub min_interval: u16,
    pub max_interval: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            scan_interval: LE_CONN_SCAN_INTERVAL,
            scan_window: LE_CONN_SCAN_WINDOW,
            min_interval: LE_CONN_INTERVAL_MIN,
            max_interval: LE_CONN_INTERVAL_MAX,
            latency: LE_CONN_LATENCY,
            supervision_timeout: LE_SUPERVISION_TIMEOUT,
        }
    }
}

impl ConnectionParams {
    /// Replace zero fields with the defaults
    pub fn or_defaults(self) -> Self {
        let defaults = Self::default();
        let pick = |value: u16, default: u16| if value == 0 { default } else { value };
        Self {
            scan_interval: pick(self.scan_interval, defaults.scan_interval),
            scan_window: pick(self.scan_window, defaults.scan_window),
            min_interval: pick(self.min_interval, defaults.min_interval),
            max_interval: pick(self.max_interval, defaults.max_interval),
            latency: self.latency,
            supervision_timeout: pick(self.supervision_timeout, defaults.supervision_timeout),
        }
    }
}
