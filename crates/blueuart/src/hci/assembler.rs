//! Byte-by-byte reassembly of H4 framed packets

use crate::error::HciError;
use crate::hci::constants::*;

/// A complete packet, without its indicator byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPacket {
    Acl(Vec<u8>),
    Event(Vec<u8>),
}

/// Accumulates transport bytes until a full ACL or event packet is present
///
/// Any error leaves the assembler empty; the next byte starts a new packet.
#[derive(Debug)]
pub struct PacketAssembler {
    buf: [u8; HCI_BUFFER_SIZE],
    len: usize,
}

impl Default for PacketAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketAssembler {
    pub fn new() -> Self {
        Self {
            buf: [0u8; HCI_BUFFER_SIZE],
            len: 0,
        }
    }

    /// Bytes held for the packet in progress
    pub fn pending(&self) -> usize {
        self.len
    }

    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// Feed one byte. Returns a packet once its declared length is satisfied.
    pub fn push(&mut self, byte: u8) -> Result<Option<RawPacket>, HciError> {
        self.buf[self.len] = byte;
        let i = self.len;
        self.len += 1;

        let result = self.check(i);
        match &result {
            Ok(Some(_)) | Err(_) => self.reset(),
            Ok(None) if self.len == HCI_BUFFER_SIZE => {
                self.reset();
                return Err(HciError::InvalidPacket);
            }
            Ok(None) => {}
        }
        result
    }

    fn check(&self, i: usize) -> Result<Option<RawPacket>, HciError> {
        match self.buf[0] {
            HCI_ACL_PKT => {
                if i < HCI_ACL_LEN_POS {
                    return Ok(None);
                }
                let pktlen = u16::from_le_bytes([self.buf[3], self.buf[4]]) as usize;
                if 1 + HCI_ACL_HEADER_LEN + pktlen > HCI_BUFFER_SIZE {
                    return Err(HciError::InvalidPacket);
                }
                if i >= HCI_ACL_LEN_POS + pktlen {
                    return Ok(Some(RawPacket::Acl(
                        self.buf[1..1 + HCI_ACL_LEN_POS + pktlen].to_vec(),
                    )));
                }
                Ok(None)
            }

            HCI_EVENT_PKT => {
                if i < HCI_EVT_LEN_POS {
                    return Ok(None);
                }
                let pktlen = self.buf[HCI_EVT_LEN_POS] as usize;
                if 1 + HCI_EVT_LEN_POS + pktlen > HCI_BUFFER_SIZE {
                    return Err(HciError::InvalidPacket);
                }
                if i >= HCI_EVT_LEN_POS + pktlen {
                    return Ok(Some(RawPacket::Event(
                        self.buf[1..1 + HCI_EVT_LEN_POS + pktlen].to_vec(),
                    )));
                }
                Ok(None)
            }

            other => Err(HciError::UnknownPacket(other)),
        }
    }
}
