//! HCI engine
//!
//! Owns the transport, frames outgoing commands and ACL data, and turns the
//! incoming byte stream into packets. Command completions and packet credits
//! are absorbed here; everything else is handed to the caller to dispatch.

use crate::error::HciError;
use crate::hci::assembler::{PacketAssembler, RawPacket};
use crate::hci::packet::{AclData, Event, HciCommand, HciEvent};
use crate::hci::transport::{wait_for_cts, FlowControl, RtsGuard, Transport};
use log::{debug, trace, warn};
use std::collections::HashMap;

/// Outcome of a command, from Command Complete or Command Status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub opcode: u16,
    pub status: u8,
    /// Command Complete return parameters, status byte included
    pub return_parameters: Vec<u8>,
}

impl CommandResult {
    /// Fail on a non-zero status
    pub fn check(self) -> Result<Self, HciError> {
        if self.status != 0 {
            return Err(HciError::CommandFailed {
                opcode: self.opcode,
                status: self.status,
            });
        }
        Ok(self)
    }

    /// Return parameters after the status byte
    pub fn data(&self) -> &[u8] {
        self.return_parameters.get(1..).unwrap_or_default()
    }
}

/// A packet that needs dispatching above the HCI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Event(Event),
    Acl(AclData),
}

/// Host side of the HCI link
pub struct Hci<T: Transport> {
    transport: T,
    flow_control: Option<Box<dyn FlowControl>>,
    assembler: PacketAssembler,
    completions: HashMap<u16, CommandResult>,
    pending_packets: u16,
    max_packets: u16,
}

impl<T: Transport> Hci<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            flow_control: None,
            assembler: PacketAssembler::new(),
            completions: HashMap::new(),
            pending_packets: 0,
            max_packets: 0,
        }
    }

    /// Enable software RTS/CTS flow control
    pub fn set_flow_control(&mut self, flow: Box<dyn FlowControl>) {
        self.flow_control = Some(flow);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Discard anything the controller sent before the host was ready
    pub fn start(&mut self) -> Result<(), HciError> {
        let _rts = RtsGuard::new(self.flow_control.as_deref_mut());
        let mut dropped = 0usize;
        while self.transport.bytes_available()? > 0 {
            self.transport.read_byte()?;
            dropped += 1;
        }
        self.assembler.reset();
        if dropped > 0 {
            debug!("hci: discarded {} stale bytes", dropped);
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, HciError> {
        if let Some(flow) = self.flow_control.as_deref_mut() {
            wait_for_cts(flow)?;
        }
        self.transport.write(data)
    }

    /// Write a command and forget any stale completion for its opcode.
    /// Returns the opcode to wait on.
    pub fn write_command(&mut self, command: &HciCommand) -> Result<u16, HciError> {
        let opcode = command.opcode();
        let packet = command.to_packet();
        trace!("hci: send command 0x{:04x} {}", opcode, hex::encode(&packet[4..]));

        self.completions.remove(&opcode);
        self.write(&packet)?;
        Ok(opcode)
    }

    /// Write a command whose completion nobody waits for
    pub fn send_without_response(&mut self, command: &HciCommand) -> Result<(), HciError> {
        let opcode = self.write_command(command)?;
        debug!("hci: sent 0x{:04x} without waiting", opcode);
        Ok(())
    }

    /// Frame an L2CAP payload for `channel_id` and send it on `handle`
    pub fn send_acl(&mut self, handle: u16, channel_id: u16, payload: &[u8]) -> Result<(), HciError> {
        let packet = AclData {
            handle,
            flags: 0,
            channel_id,
            payload: payload.to_vec(),
        }
        .to_packet();
        trace!("hci: send acl handle={} cid={} {}", handle, channel_id, hex::encode(payload));

        self.write(&packet)?;
        self.pending_packets = self.pending_packets.saturating_add(1);
        Ok(())
    }

    /// Take the recorded completion for `opcode`, if it has arrived
    pub fn take_completion(&mut self, opcode: u16) -> Option<CommandResult> {
        self.completions.remove(&opcode)
    }

    pub fn has_completion(&self, opcode: u16) -> bool {
        self.completions.contains_key(&opcode)
    }

    /// ACL packets sent and not yet reported complete by the controller
    pub fn pending_packets(&self) -> u16 {
        self.pending_packets
    }

    pub fn max_packets(&self) -> u16 {
        self.max_packets
    }

    pub fn set_max_packets(&mut self, max_packets: u16) {
        self.max_packets = max_packets;
    }

    /// Drain available bytes until one packet is complete.
    ///
    /// Returns `Ok(None)` when the transport ran dry, when the packet was
    /// handled here, or when it was malformed. Only transport faults are errors.
    pub fn poll(&mut self) -> Result<Option<Incoming>, HciError> {
        let raw = {
            let _rts = RtsGuard::new(self.flow_control.as_deref_mut());
            let mut found = None;
            while self.transport.bytes_available()? > 0 {
                let byte = self.transport.read_byte()?;
                match self.assembler.push(byte) {
                    Ok(Some(raw)) => {
                        found = Some(raw);
                        break;
                    }
                    Ok(None) => {}
                    Err(err) => warn!("hci: {}, reassembly reset", err),
                }
            }
            found
        };

        match raw {
            Some(raw) => Ok(self.dispatch(raw)),
            None => Ok(None),
        }
    }

    fn dispatch(&mut self, raw: RawPacket) -> Option<Incoming> {
        match raw {
            RawPacket::Acl(data) => {
                trace!("hci: acl data {}", hex::encode(&data));
                match AclData::parse(&data) {
                    Ok(acl) => Some(Incoming::Acl(acl)),
                    Err(err) => {
                        warn!("hci: dropping acl data: {}", err);
                        None
                    }
                }
            }
            RawPacket::Event(data) => {
                trace!("hci: event data {}", hex::encode(&data));
                let event = match HciEvent::parse(&data).map(|e| Event::parse(&e)) {
                    Some(Ok(event)) => event,
                    _ => {
                        warn!("hci: dropping malformed event {}", hex::encode(&data));
                        return None;
                    }
                };
                self.absorb(event)
            }
        }
    }

    fn absorb(&mut self, event: Event) -> Option<Incoming> {
        match event {
            Event::CommandComplete {
                opcode,
                return_parameters,
            } => {
                let status = return_parameters.first().copied().unwrap_or(0);
                debug!("hci: command complete 0x{:04x} status 0x{:02x}", opcode, status);
                self.completions.insert(
                    opcode,
                    CommandResult {
                        opcode,
                        status,
                        return_parameters,
                    },
                );
                None
            }
            Event::CommandStatus { status, opcode } => {
                debug!("hci: command status 0x{:04x} status 0x{:02x}", opcode, status);
                self.completions.insert(
                    opcode,
                    CommandResult {
                        opcode,
                        status,
                        return_parameters: vec![status],
                    },
                );
                None
            }
            Event::NumberOfCompletedPackets(entries) => {
                let done: u16 = entries.iter().fold(0u16, |acc, (_, n)| acc.saturating_add(*n));
                self.pending_packets = self.pending_packets.saturating_sub(done);
                trace!("hci: {} packets completed, {} pending", done, self.pending_packets);
                None
            }
            other => Some(Incoming::Event(other)),
        }
    }
}
