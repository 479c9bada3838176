//! Error types for the blueuart library
//!
//! `HciError` covers the transport and HCI framing layer. `Error` is what the
//! public API returns; it wraps the per-layer errors and adds the local policy
//! violations that are rejected before anything reaches the wire.

use crate::att::AttError;
use crate::gatt::GattError;
use crate::l2cap::L2capError;
use thiserror::Error;

/// Errors raised by the HCI engine and the transport below it
#[derive(Error, Debug)]
pub enum HciError {
    #[error("Transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("HCI command 0x{opcode:04x} timed out")]
    Timeout { opcode: u16 },

    #[error("Flow control: CTS never released")]
    FlowControlTimeout,

    #[error("Invalid HCI packet")]
    InvalidPacket,

    #[error("Unknown HCI packet type 0x{0:02x}")]
    UnknownPacket(u8),

    #[error("HCI command 0x{opcode:04x} failed with status 0x{status:02x}")]
    CommandFailed { opcode: u16, status: u8 },

    #[error("Invalid parameter length: {0}")]
    InvalidParamLength(usize),
}

/// Errors returned by the public API
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Hci(#[from] HciError),

    #[error(transparent)]
    Att(#[from] AttError),

    #[error(transparent)]
    Gatt(#[from] GattError),

    #[error(transparent)]
    L2cap(#[from] L2capError),

    #[error("bluetooth: already scanning")]
    AlreadyScanning,

    #[error("bluetooth: not scanning")]
    NotScanning,

    #[error("bluetooth: could not connect")]
    Connect,

    #[error("bluetooth: no connection with handle 0x{0:04x}")]
    NotConnected(u16),

    #[error("bluetooth: advertisement packet too big")]
    AdvertisementTooLarge,

    #[error("bluetooth: advertisement not configured")]
    NotConfigured,
}

impl Error {
    /// True for failures that leave the link usable and may be retried
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Hci(HciError::Timeout { .. }) | Error::Att(AttError::Timeout) | Error::Connect
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
