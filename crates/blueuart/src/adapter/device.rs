use super::Adapter;
use crate::error::{Error, Result};
use crate::gap::{Address, ConnectionParams};

/// A connected peer, as returned by [`Adapter::connect`]
#[derive(Clone)]
pub struct Device {
    adapter: Adapter,
    handle: u16,
    address: Address,
}

impl Device {
    pub(crate) fn new(adapter: Adapter, handle: u16, address: Address) -> Self {
        Self {
            adapter,
            handle,
            address,
        }
    }

    /// HCI connection handle
    pub fn handle(&self) -> u16 {
        self.handle
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn is_connected(&self) -> bool {
        self.adapter
            .with_stack(|stack| Ok(stack.connection(self.handle).is_some_and(|c| c.is_connected())))
            .unwrap_or(false)
    }

    /// The MTU currently in effect, without negotiating
    pub fn mtu(&self) -> Result<u16> {
        self.adapter
            .with_stack(|stack| stack.att().mtu(self.handle).ok_or(Error::NotConnected(self.handle)))
    }

    /// Drop the link. Notification callbacks for it are removed.
    pub fn disconnect(&self) -> Result<()> {
        self.adapter.with_stack(|stack| stack.disconnect(self.handle))?;
        self.adapter.drop_registrations(self.handle);
        Ok(())
    }

    /// Ask the controller for new connection timing
    pub fn request_connection_params(&self, params: ConnectionParams) -> Result<()> {
        self.adapter
            .with_stack(|stack| stack.update_connection(self.handle, params))
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("handle", &self.handle)
            .field("address", &self.address)
            .finish()
    }
}
