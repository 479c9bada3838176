//! Blocking HCI procedures: commands, enable, scanning, connecting and
//! advertising

use super::connection::{ConnectionState, Role};
use super::Stack;
use crate::error::{Error, HciError, Result};
use crate::gap::constants::*;
use crate::gap::{Address, AdvertisementOptions, AdvertisementPayload, ConnectionParams, MacAddress};
use crate::gatt::{CharacteristicConfig, CharacteristicProperties, Service};
use crate::hci::constants::{HCI_LE_MIN_PACKET_LEN, HCI_OE_USER_ENDED_CONNECTION, L2CAP_HEADER_LEN};
use crate::hci::{CommandResult, HciCommand, Transport};
use crate::uuid::{
    CHARACTERISTIC_APPEARANCE, CHARACTERISTIC_DEVICE_NAME, CHARACTERISTIC_SERVICE_CHANGED, SERVICE_GENERIC_ACCESS,
    SERVICE_GENERIC_ATTRIBUTE,
};
use log::{debug, info, warn};
use std::thread;
use std::time::Instant;

impl<T: Transport> Stack<T> {
    /// Send a command and poll until its Command Complete or Command Status
    /// arrives. A non-zero status is `CommandFailed`.
    pub fn send_command(&mut self, command: HciCommand) -> Result<CommandResult> {
        let opcode = self.hci.write_command(&command)?;
        let started = Instant::now();

        loop {
            if let Some(result) = self.hci.take_completion(opcode) {
                return Ok(result.check()?);
            }
            if started.elapsed() >= self.config.command_timeout {
                warn!("hci: command 0x{:04x} timed out", opcode);
                return Err(HciError::Timeout { opcode }.into());
            }

            let busy = self.poll()?;
            if !busy && !self.hci.has_completion(opcode) {
                thread::sleep(self.config.poll_sleep());
            }
        }
    }

    /// Reset the controller and unmask the events the stack handles
    pub fn enable(&mut self) -> Result<()> {
        self.hci.start()?;
        self.send_command(HciCommand::Reset)?;
        thread::sleep(self.config.reset_settle);

        self.send_command(HciCommand::SetEventMask {
            event_mask: self.config.event_mask,
        })?;
        self.send_command(HciCommand::LeSetEventMask {
            event_mask: self.config.le_event_mask,
        })?;

        if self.config.profile.read_buffer_size {
            let result = self.send_command(HciCommand::LeReadBufferSize)?;
            let data = result.data();
            if data.len() < 3 {
                return Err(HciError::InvalidParamLength(data.len()).into());
            }
            let packet_len = u16::from_le_bytes([data[0], data[1]]).max(HCI_LE_MIN_PACKET_LEN);
            self.hci.set_max_packets(data[2] as u16);
            self.att.set_max_mtu(packet_len - L2CAP_HEADER_LEN as u16);
            debug!("hci: le buffer {} bytes x {}", packet_len, data[2]);
        }

        info!("controller enabled");
        Ok(())
    }

    /// The controller's public address
    pub fn read_bd_addr(&mut self) -> Result<MacAddress> {
        let result = self.send_command(HciCommand::ReadBdAddr)?;
        let data = result.data();
        MacAddress::from_slice(data).ok_or_else(|| HciError::InvalidParamLength(data.len()).into())
    }

    pub fn set_random_address(&mut self, address: MacAddress) -> Result<()> {
        self.send_command(HciCommand::LeSetRandomAddress { address: address.mac })?;
        Ok(())
    }

    /// Start passive scanning with duplicates reported
    pub fn start_scan(&mut self) -> Result<()> {
        if self.scanning {
            return Err(Error::AlreadyScanning);
        }

        self.send_command(HciCommand::LeSetScanEnable {
            enable: false,
            filter_duplicates: true,
        })?;
        self.send_command(HciCommand::LeSetScanParameters {
            scan_type: LE_SCAN_PASSIVE,
            scan_interval: LE_SCAN_INTERVAL,
            scan_window: LE_SCAN_WINDOW,
            own_address_type: PUBLIC_DEVICE_ADDRESS,
            filter_policy: 0x00,
        })?;

        self.adv_report = None;
        self.scanning = true;
        if let Err(err) = self.send_command(HciCommand::LeSetScanEnable {
            enable: true,
            filter_duplicates: false,
        }) {
            self.scanning = false;
            return Err(err);
        }
        debug!("gap: scanning");
        Ok(())
    }

    pub fn stop_scan(&mut self) -> Result<()> {
        if !self.scanning {
            return Err(Error::NotScanning);
        }

        self.send_command(HciCommand::LeSetScanEnable {
            enable: false,
            filter_duplicates: false,
        })?;
        self.scanning = false;
        self.adv_report = None;
        debug!("gap: scan stopped");
        Ok(())
    }

    /// Create a connection to `address` and wait for it to complete.
    ///
    /// After `connect_timeout` the attempt is cancelled and `Error::Connect`
    /// returned. Returns the connection handle.
    pub fn connect(&mut self, address: Address, params: ConnectionParams) -> Result<u16> {
        let params = params.or_defaults();
        self.send_command(HciCommand::LeCreateConnection {
            scan_interval: params.scan_interval,
            scan_window: params.scan_window,
            initiator_filter: 0x00,
            peer_address_type: u8::from(address.address_type()),
            peer_address: address.mac.mac,
            own_address_type: PUBLIC_DEVICE_ADDRESS,
            min_interval: params.min_interval,
            max_interval: params.max_interval,
            latency: params.latency,
            supervision_timeout: params.supervision_timeout,
            min_ce_length: LE_MIN_CE_LENGTH,
            max_ce_length: LE_MAX_CE_LENGTH,
        })?;
        debug!("gap: connecting to {}", address);

        let started = Instant::now();
        loop {
            let busy = self.poll()?;

            let found = self
                .connections
                .values()
                .find(|c| c.role == Role::Central && c.address.mac == address.mac)
                .map(|c| c.handle);
            if let Some(handle) = found {
                return Ok(handle);
            }

            if started.elapsed() >= self.config.connect_timeout {
                break;
            }
            if !busy {
                thread::sleep(self.config.poll_sleep());
            }
        }

        warn!("gap: connection to {} timed out, cancelling", address);
        self.send_command(HciCommand::LeCreateConnectionCancel)?;
        Err(Error::Connect)
    }

    /// Ask the controller to drop the link. The connection stays known until
    /// Disconnection Complete arrives.
    pub fn disconnect(&mut self, handle: u16) -> Result<()> {
        if !self.connections.contains_key(&handle) {
            return Err(Error::NotConnected(handle));
        }

        self.send_command(HciCommand::Disconnect {
            handle,
            reason: HCI_OE_USER_ENDED_CONNECTION,
        })?;
        if let Some(connection) = self.connections.get_mut(&handle) {
            connection.state = ConnectionState::Disconnecting;
        }
        Ok(())
    }

    /// Apply new timing to a link with LE Connection Update
    pub fn update_connection(&mut self, handle: u16, params: ConnectionParams) -> Result<()> {
        if !self.connections.contains_key(&handle) {
            return Err(Error::NotConnected(handle));
        }
        let params = params.or_defaults();
        self.send_command(HciCommand::LeConnectionUpdate {
            handle,
            min_interval: params.min_interval,
            max_interval: params.max_interval,
            latency: params.latency,
            supervision_timeout: params.supervision_timeout,
            min_ce_length: LE_MIN_CE_LENGTH,
            max_ce_length: LE_MAX_CE_LENGTH,
        })?;
        Ok(())
    }

    /// Validate and store the advertisement, registering the Generic Access
    /// and Generic Attribute services the first time round
    pub fn configure_advertising(&mut self, mut options: AdvertisementOptions) -> Result<()> {
        if options.local_name.is_empty() {
            options.local_name = DEFAULT_LOCAL_NAME.to_string();
        }
        AdvertisementPayload::from_options(&options)?;

        if !self.gap_services {
            self.add_service(
                Service::new(SERVICE_GENERIC_ACCESS)
                    .with_characteristic(CharacteristicConfig::new(
                        CHARACTERISTIC_DEVICE_NAME,
                        CharacteristicProperties::READ,
                        options.local_name.as_bytes(),
                    ))
                    .with_characteristic(CharacteristicConfig::new(
                        CHARACTERISTIC_APPEARANCE,
                        CharacteristicProperties::READ,
                        vec![0, 0],
                    )),
            )?;
            self.add_service(Service::new(SERVICE_GENERIC_ATTRIBUTE).with_characteristic(
                CharacteristicConfig::new(
                    CHARACTERISTIC_SERVICE_CHANGED,
                    CharacteristicProperties::INDICATE,
                    Vec::new(),
                ),
            ))?;
            self.gap_services = true;
        }

        self.advertisement = Some(options);
        Ok(())
    }

    /// Program parameters, advertising data and scan response, then enable
    pub fn start_advertising(&mut self) -> Result<()> {
        let options = self.advertisement.clone().ok_or(Error::NotConfigured)?;
        let payload = AdvertisementPayload::from_options(&options)?;
        let scan_response = AdvertisementPayload::scan_response(&options.local_name);

        let interval = if options.interval == 0 {
            ADV_DEFAULT_INTERVAL
        } else {
            options.interval
        };
        self.send_command(HciCommand::LeSetAdvertisingParameters {
            min_interval: interval,
            max_interval: interval,
            advertising_type: ADV_IND,
            own_address_type: PUBLIC_DEVICE_ADDRESS,
            direct_address_type: PUBLIC_DEVICE_ADDRESS,
            direct_address: [0; 6],
            channel_map: ADV_CHANNEL_ALL,
            filter_policy: ADV_FILTER_NONE,
        })?;
        self.send_command(HciCommand::LeSetAdvertisingData {
            data: payload.as_bytes().to_vec(),
        })?;
        self.send_command(HciCommand::LeSetScanResponseData {
            data: scan_response.as_bytes().to_vec(),
        })?;
        self.send_command(HciCommand::LeSetAdvertiseEnable { enable: true })?;

        self.advertising = true;
        info!("advertising as {:?}", options.local_name);
        Ok(())
    }

    pub fn stop_advertising(&mut self) -> Result<()> {
        self.send_command(HciCommand::LeSetAdvertiseEnable { enable: false })?;
        self.advertising = false;
        Ok(())
    }
}
