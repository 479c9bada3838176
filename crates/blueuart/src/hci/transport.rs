//! Byte stream between the host and the controller
//!
//! The HCI engine only needs a buffered-byte count, a single byte read and a
//! bulk write. Optional software flow control drives two GPIO lines.

use crate::error::HciError;

/// Write attempts spent waiting on CTS before failing
pub const FLOW_CONTROL_WRITE_ATTEMPTS: usize = 200;

/// A duplex byte channel to the controller
pub trait Transport {
    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> Result<usize, HciError>;

    /// Read one byte. Only called when `bytes_available` is non-zero.
    fn read_byte(&mut self) -> Result<u8, HciError>;

    /// Write all of `data`
    fn write(&mut self, data: &[u8]) -> Result<usize, HciError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn bytes_available(&mut self) -> Result<usize, HciError> {
        (**self).bytes_available()
    }

    fn read_byte(&mut self) -> Result<u8, HciError> {
        (**self).read_byte()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, HciError> {
        (**self).write(data)
    }
}

/// Software RTS/CTS lines
///
/// RTS is driven low by the host while it drains the receive buffer and high
/// again afterwards. CTS high means the controller cannot accept data.
pub trait FlowControl: Send {
    fn set_rts(&mut self, high: bool);

    fn cts_asserted(&mut self) -> bool;
}

/// Holds RTS low for as long as it lives
pub(crate) struct RtsGuard<'a> {
    flow: Option<&'a mut (dyn FlowControl + 'static)>,
}

impl<'a> RtsGuard<'a> {
    pub(crate) fn new(flow: Option<&'a mut (dyn FlowControl + 'static)>) -> Self {
        let mut guard = Self { flow };
        if let Some(flow) = guard.flow.as_deref_mut() {
            flow.set_rts(false);
        }
        guard
    }
}

impl Drop for RtsGuard<'_> {
    fn drop(&mut self) {
        if let Some(flow) = self.flow.as_deref_mut() {
            flow.set_rts(true);
        }
    }
}

/// Poll CTS until the controller is ready, bounded by `FLOW_CONTROL_WRITE_ATTEMPTS`
pub(crate) fn wait_for_cts(flow: &mut dyn FlowControl) -> Result<(), HciError> {
    let mut retries = FLOW_CONTROL_WRITE_ATTEMPTS;
    while flow.cts_asserted() {
        retries -= 1;
        if retries == 0 {
            return Err(HciError::FlowControlTimeout);
        }
    }
    Ok(())
}
