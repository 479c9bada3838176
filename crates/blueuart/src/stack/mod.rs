//! The cooperative protocol stack
//!
//! [`Stack`] owns the HCI engine, the ATT engine and the L2CAP signaling
//! state, and drives all of them from [`Stack::poll`]. Every blocking
//! operation (HCI commands, ATT requests, connecting) is a loop around `poll`
//! bounded by a timeout from [`StackConfig`].
//!
//! Handlers that run while a packet is dispatched never wait for anything:
//! replies are written immediately and follow-up HCI commands are sent
//! without waiting for their completion, so a dispatch can never clobber the
//! completion an outer `send_command` is waiting for.

mod commands;
pub mod connection;

#[cfg(test)]
mod tests;

pub use connection::{Connection, ConnectionState, Role, StackEvent};

use crate::att::AttEngine;
use crate::config::StackConfig;
use crate::error::Result;
use crate::gap::AdvertisementOptions;
use crate::gap::constants::{LE_MAX_CE_LENGTH, LE_MIN_CE_LENGTH};
use crate::hci::packet::{
    DisconnectionComplete, LeConnectionComplete, LeConnectionUpdateComplete, RemoteConnParamRequest,
};
use crate::hci::{AclData, Event, Hci, HciCommand, Incoming, LeAdvertisingReport, Transport};
use crate::l2cap::constants::{L2CAP_CID_ATT, L2CAP_CID_LE_SIGNALING};
use crate::l2cap::{L2capSignaling, SignalingAction};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, VecDeque};

// Connection event length bounds sent with a Remote Connection Parameter
// Request Reply
const REMOTE_PARAM_MIN_CE_LENGTH: u16 = 0x000F;
const REMOTE_PARAM_MAX_CE_LENGTH: u16 = 0x0FFF;

pub struct Stack<T: Transport> {
    pub(crate) hci: Hci<T>,
    pub(crate) att: AttEngine,
    pub(crate) l2cap: L2capSignaling,
    pub(crate) config: StackConfig,
    pub(crate) connections: BTreeMap<u16, Connection>,
    /// Advertising was requested; re-enabled after a peer disconnects
    pub(crate) advertising: bool,
    pub(crate) scanning: bool,
    pub(crate) advertisement: Option<AdvertisementOptions>,
    /// Generic Access and Generic Attribute services are registered
    pub(crate) gap_services: bool,
    /// Latest advertising report, overwritten by the next one
    pub(crate) adv_report: Option<LeAdvertisingReport>,
    pub(crate) events: VecDeque<StackEvent>,
}

impl<T: Transport> Stack<T> {
    pub fn new(transport: T, config: StackConfig) -> Self {
        Self {
            hci: Hci::new(transport),
            att: AttEngine::new(config.profile.max_mtu),
            l2cap: L2capSignaling::new(config.profile.l2cap_signaling),
            config,
            connections: BTreeMap::new(),
            advertising: false,
            scanning: false,
            advertisement: None,
            gap_services: false,
            adv_report: None,
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn hci(&self) -> &Hci<T> {
        &self.hci
    }

    pub fn hci_mut(&mut self) -> &mut Hci<T> {
        &mut self.hci
    }

    pub fn att(&self) -> &AttEngine {
        &self.att
    }

    pub fn att_mut(&mut self) -> &mut AttEngine {
        &mut self.att
    }

    pub fn l2cap_mut(&mut self) -> &mut L2capSignaling {
        &mut self.l2cap
    }

    pub fn connection(&self, handle: u16) -> Option<&Connection> {
        self.connections.get(&handle)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Take the advertising report received since the last call
    pub fn take_adv_report(&mut self) -> Option<LeAdvertisingReport> {
        self.adv_report.take()
    }

    /// Drain connection lifecycle events
    pub fn take_events(&mut self) -> Vec<StackEvent> {
        self.events.drain(..).collect()
    }

    /// One non-blocking step: read at most one packet and dispatch it.
    ///
    /// Returns true if a packet reached the layers above HCI. Only transport
    /// faults and failed writes are errors; malformed input is logged and
    /// dropped.
    pub fn poll(&mut self) -> Result<bool> {
        match self.hci.poll()? {
            Some(Incoming::Acl(acl)) => {
                self.handle_acl(acl)?;
                Ok(true)
            }
            Some(Incoming::Event(event)) => {
                self.handle_event(event)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn handle_acl(&mut self, acl: AclData) -> Result<()> {
        match acl.channel_id {
            L2CAP_CID_ATT => match self.att.handle_data(acl.handle, &acl.payload) {
                Ok(Some(response)) => self.hci.send_acl(acl.handle, L2CAP_CID_ATT, &response)?,
                Ok(None) => {}
                Err(err) => warn!("att: dropping pdu on 0x{:04x}: {}", acl.handle, err),
            },

            L2CAP_CID_LE_SIGNALING => match self.l2cap.handle_data(acl.handle, &acl.payload) {
                Ok(SignalingAction::None) => {}
                Ok(SignalingAction::Reply(reply)) => {
                    self.hci.send_acl(acl.handle, L2CAP_CID_LE_SIGNALING, &reply)?;
                }
                Ok(SignalingAction::Accept { reply, params }) => {
                    self.hci.send_acl(acl.handle, L2CAP_CID_LE_SIGNALING, &reply)?;
                    self.hci.send_without_response(&HciCommand::LeConnectionUpdate {
                        handle: acl.handle,
                        min_interval: params.conn_interval_min,
                        max_interval: params.conn_interval_max,
                        latency: params.conn_latency,
                        supervision_timeout: params.supervision_timeout,
                        min_ce_length: LE_MIN_CE_LENGTH,
                        max_ce_length: LE_MAX_CE_LENGTH,
                    })?;
                }
                Err(err) => warn!("l2cap: dropping signaling frame on 0x{:04x}: {}", acl.handle, err),
            },

            cid => debug!("l2cap: no handler for channel 0x{:04x}", cid),
        }
        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::DisconnectionComplete(event) => self.on_disconnection(event)?,
            Event::LeConnectionComplete(event) => self.on_connection(event)?,
            Event::LeAdvertisingReport(report) => {
                if self.scanning {
                    self.adv_report = Some(report);
                }
            }
            Event::LeConnectionUpdateComplete(event) => self.on_connection_update(event),
            Event::LeRemoteConnParamRequest(request) => self.on_remote_param_request(request)?,
            Event::EncryptionChange { handle, enabled, .. } => {
                debug!("hci: encryption {} on 0x{:04x}", enabled, handle);
            }
            Event::HardwareError(code) => error!("hci: controller hardware error 0x{:02x}", code),
            other => debug!("hci: ignoring event {:?}", other),
        }
        Ok(())
    }

    fn on_disconnection(&mut self, event: DisconnectionComplete) -> Result<()> {
        if event.status != 0 {
            warn!("hci: disconnection of 0x{:04x} failed: 0x{:02x}", event.handle, event.status);
            return Ok(());
        }

        self.att.remove_connection(event.handle);
        self.l2cap.remove_connection(event.handle);
        if let Some(connection) = self.connections.remove(&event.handle) {
            info!(
                "disconnected {} (0x{:04x}), reason 0x{:02x}",
                connection.address, event.handle, event.reason
            );
            self.events.push_back(StackEvent::Disconnected {
                handle: event.handle,
                address: connection.address,
                reason: event.reason,
            });
        }

        if self.advertising {
            debug!("gap: resuming advertising");
            self.hci
                .send_without_response(&HciCommand::LeSetAdvertiseEnable { enable: true })?;
        }
        Ok(())
    }

    fn on_connection(&mut self, event: LeConnectionComplete) -> Result<()> {
        if event.status != 0 {
            debug!("hci: connection attempt failed: 0x{:02x}", event.status);
            return Ok(());
        }

        let connection = Connection::from_complete(&event);
        info!(
            "connected {} (0x{:04x}) as {:?}",
            connection.address, connection.handle, connection.role
        );

        self.att.add_connection(event.handle);
        if let Some(request) =
            self.l2cap
                .add_connection(event.handle, event.role, event.interval, event.supervision_timeout)
        {
            self.hci.send_acl(event.handle, L2CAP_CID_LE_SIGNALING, &request)?;
        }

        // The controller stops advertising on a peripheral link; keep the
        // host in step until the link goes away
        if connection.role == Role::Peripheral && self.advertising {
            self.hci
                .send_without_response(&HciCommand::LeSetAdvertiseEnable { enable: false })?;
        }

        self.events.push_back(StackEvent::Connected {
            handle: connection.handle,
            address: connection.address,
        });
        self.connections.insert(connection.handle, connection);
        Ok(())
    }

    fn on_connection_update(&mut self, event: LeConnectionUpdateComplete) {
        if event.status != 0 {
            debug!("hci: connection update on 0x{:04x} failed: 0x{:02x}", event.handle, event.status);
            return;
        }
        if let Some(connection) = self.connections.get_mut(&event.handle) {
            connection.interval = event.interval;
            connection.latency = event.latency;
            connection.supervision_timeout = event.supervision_timeout;
            debug!(
                "hci: 0x{:04x} interval {} latency {} timeout {}",
                event.handle, event.interval, event.latency, event.supervision_timeout
            );
        }
    }

    fn on_remote_param_request(&mut self, request: RemoteConnParamRequest) -> Result<()> {
        debug!("hci: peer asks for new parameters on 0x{:04x}", request.handle);
        self.hci
            .send_without_response(&HciCommand::LeRemoteConnParamReqReply {
                handle: request.handle,
                min_interval: request.min_interval,
                max_interval: request.max_interval,
                latency: request.latency,
                timeout: request.timeout,
                min_ce_length: REMOTE_PARAM_MIN_CE_LENGTH,
                max_ce_length: REMOTE_PARAM_MAX_CE_LENGTH,
            })?;
        Ok(())
    }
}
