//! Host Controller Interface over a UART
//!
//! The transport moves bytes, the assembler cuts them into packets, and the
//! engine frames commands, tracks completions and hands everything else up.

pub mod assembler;
pub mod constants;
pub mod engine;
pub mod packet;
pub mod transport;
pub mod uart;

#[cfg(test)]
mod tests;

pub use assembler::{PacketAssembler, RawPacket};
pub use engine::{CommandResult, Hci, Incoming};
pub use packet::{
    AclData, DisconnectionComplete, Event, HciCommand, HciEvent, LeAdvertisingReport,
    LeConnectionComplete, LeConnectionUpdateComplete, RemoteConnParamRequest,
};
pub use transport::{FlowControl, Transport};
pub use uart::{UartConfig, UartTransport};
