//! Link state kept by the stack for every live connection handle

use crate::gap::Address;
use crate::hci::constants::HCI_ROLE_PERIPHERAL;
use crate::hci::LeConnectionComplete;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Central,
    Peripheral,
}

impl From<u8> for Role {
    fn from(role: u8) -> Self {
        if role == HCI_ROLE_PERIPHERAL {
            Role::Peripheral
        } else {
            Role::Central
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Disconnect sent, waiting for Disconnection Complete
    Disconnecting,
}

/// One LE link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub handle: u16,
    pub role: Role,
    pub state: ConnectionState,
    pub address: Address,
    /// Connection interval in 1.25 ms units
    pub interval: u16,
    pub latency: u16,
    /// Supervision timeout in 10 ms units
    pub supervision_timeout: u16,
}

impl Connection {
    pub fn from_complete(event: &LeConnectionComplete) -> Self {
        Self {
            handle: event.handle,
            role: Role::from(event.role),
            state: ConnectionState::Connected,
            address: Address::from_hci(event.peer_address_type, event.peer_address),
            interval: event.interval,
            latency: event.latency,
            supervision_timeout: event.supervision_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Connection lifecycle changes, drained by the adapter after each poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    Connected { handle: u16, address: Address },
    Disconnected { handle: u16, address: Address, reason: u8 },
}
