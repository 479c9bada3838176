//! GATT client: discovering and using a peer's services
//!
//! Discovery enumerates everything the peer has and filters afterwards, so a
//! requested UUID that is missing is an error rather than a short result.
//! Each discovery holds the stack for its whole exchange.

use super::error::GattError;
use super::types::CharacteristicProperties;
use crate::adapter::Device;
use crate::att::constants::{CCCD_INDICATE, CCCD_NOTIFY};
use crate::att::{AttError, AttErrorCode, CharacteristicRecord, ServiceRecord};
use crate::error::{Error, Result};
use crate::hci::Transport;
use crate::stack::Stack;
use crate::uuid::{Uuid, GATT_CHARACTERISTIC, GATT_PRIMARY_SERVICE};
use log::debug;

const HANDLE_MIN: u16 = 0x0001;
const HANDLE_MAX: u16 = 0xFFFF;

/// The peer has nothing more in the requested range
fn is_end_of_range(err: &Error) -> bool {
    matches!(
        err,
        Error::Att(AttError::Protocol {
            code: AttErrorCode::AttributeNotFound,
            ..
        })
    )
}

/// Pick the first match for every requested UUID, in request order
fn select<R: Copy>(found: &[R], uuids: &[Uuid], uuid_of: impl Fn(&R) -> Uuid, missing: GattError) -> Result<Vec<R>> {
    if uuids.is_empty() {
        return Ok(found.to_vec());
    }
    uuids
        .iter()
        .map(|uuid| {
            found
                .iter()
                .find(|record| uuid_of(record) == *uuid)
                .copied()
                .ok_or(Error::Gatt(missing))
        })
        .collect()
}

impl<T: Transport> Stack<T> {
    /// Enumerate the peer's primary services, then keep those in `uuids`
    pub fn discover_services(&mut self, connection: u16, uuids: &[Uuid]) -> Result<Vec<ServiceRecord>> {
        let mut found: Vec<ServiceRecord> = Vec::new();
        let mut start = HANDLE_MIN;

        loop {
            let batch =
                match self.read_by_group_type(connection, start, HANDLE_MAX, Uuid::from_u16(GATT_PRIMARY_SERVICE)) {
                    Ok(batch) => batch,
                    Err(err) if is_end_of_range(&err) => break,
                    Err(err) => return Err(err),
                };
            let Some(last) = batch.last().map(|s| s.end_handle) else {
                break;
            };
            found.extend(batch);

            if last == HANDLE_MAX || last < start {
                break;
            }
            start = last + 1;
        }

        debug!("gatt: 0x{:04x} has {} services", connection, found.len());
        select(&found, uuids, |s| s.uuid, GattError::ServiceNotFound)
    }

    /// Enumerate the characteristics inside `service`, then keep those in
    /// `uuids`. The lowest handle wins when a UUID repeats.
    pub fn discover_characteristics(
        &mut self,
        connection: u16,
        service: &ServiceRecord,
        uuids: &[Uuid],
    ) -> Result<Vec<CharacteristicRecord>> {
        let mut found: Vec<CharacteristicRecord> = Vec::new();
        let mut start = service.start_handle;

        while start <= service.end_handle {
            let batch = match self.read_by_type(
                connection,
                start,
                service.end_handle,
                Uuid::from_u16(GATT_CHARACTERISTIC),
            ) {
                Ok(batch) => batch,
                Err(err) if is_end_of_range(&err) => break,
                Err(err) => return Err(err),
            };
            let Some(last) = batch.last().map(|c| c.value_handle) else {
                break;
            };
            found.extend(batch);

            if last == HANDLE_MAX || last < start {
                break;
            }
            start = last + 1;
        }

        found.sort_by_key(|c| c.declaration_handle);
        select(&found, uuids, |c| c.uuid, GattError::CharacteristicNotFound)
    }
}

/// A service discovered on a peer
#[derive(Clone)]
pub struct DeviceService {
    device: Device,
    record: ServiceRecord,
}

impl DeviceService {
    pub fn uuid(&self) -> Uuid {
        self.record.uuid
    }

    pub fn start_handle(&self) -> u16 {
        self.record.start_handle
    }

    pub fn end_handle(&self) -> u16 {
        self.record.end_handle
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Characteristics of this service, all of them when `uuids` is empty
    pub fn discover_characteristics(&self, uuids: &[Uuid]) -> Result<Vec<DeviceCharacteristic>> {
        let connection = self.device.handle();
        let records = self
            .device
            .adapter()
            .with_stack(|stack| stack.discover_characteristics(connection, &self.record, uuids))?;

        Ok(records
            .into_iter()
            .map(|record| DeviceCharacteristic {
                device: self.device.clone(),
                record,
            })
            .collect())
    }
}

impl std::fmt::Debug for DeviceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceService")
            .field("connection", &self.device.handle())
            .field("record", &self.record)
            .finish()
    }
}

/// A characteristic discovered on a peer
#[derive(Clone)]
pub struct DeviceCharacteristic {
    device: Device,
    record: CharacteristicRecord,
}

impl DeviceCharacteristic {
    pub fn uuid(&self) -> Uuid {
        self.record.uuid
    }

    pub fn value_handle(&self) -> u16 {
        self.record.value_handle
    }

    /// The CCCD is assumed to follow the value directly
    pub fn cccd_handle(&self) -> Option<u16> {
        if self.record.properties.can_subscribe() {
            self.record.value_handle.checked_add(1)
        } else {
            None
        }
    }

    pub fn properties(&self) -> CharacteristicProperties {
        self.record.properties
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        if !self.record.properties.can_read() {
            return Err(GattError::NoRead.into());
        }

        let (connection, handle) = (self.device.handle(), self.record.value_handle);
        let value = self
            .device
            .adapter()
            .with_stack(|stack| stack.read(connection, handle))?;
        if value.is_empty() {
            return Err(GattError::ReadFailed.into());
        }
        Ok(value)
    }

    /// Write Request; returns once the peer acknowledged it
    pub fn write(&self, value: &[u8]) -> Result<usize> {
        if !self.record.properties.can_write() {
            return Err(GattError::NoWrite.into());
        }

        let (connection, handle) = (self.device.handle(), self.record.value_handle);
        self.device
            .adapter()
            .with_stack(|stack| stack.write_request(connection, handle, value))?;
        Ok(value.len())
    }

    pub fn write_without_response(&self, value: &[u8]) -> Result<usize> {
        if !self.record.properties.can_write_without_response() {
            return Err(GattError::NoWriteWithoutResponse.into());
        }

        let (connection, handle) = (self.device.handle(), self.record.value_handle);
        self.device
            .adapter()
            .with_stack(|stack| stack.write_command(connection, handle, value))?;
        Ok(value.len())
    }

    /// Subscribe with `callback`, or unsubscribe with `None`.
    ///
    /// Registering again replaces the previous callback. The callback runs on
    /// whichever thread polls the adapter, without the stack locked.
    pub fn enable_notifications<F>(&self, callback: Option<F>) -> Result<()>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let cccd_handle = self.cccd_handle().ok_or(GattError::NoNotify)?;
        let bits = match &callback {
            None => 0,
            Some(_) if self.record.properties.contains(CharacteristicProperties::NOTIFY) => CCCD_NOTIFY,
            Some(_) => CCCD_INDICATE,
        };

        let connection = self.device.handle();
        let adapter = self.device.adapter();
        adapter.with_stack(|stack| stack.write_request(connection, cccd_handle, &bits.to_le_bytes()))?;

        let handler = callback.map(|f| Box::new(f) as crate::adapter::NotificationHandler);
        let subscribed = handler.is_some();
        adapter.register_notification(connection, self.record.value_handle, handler);
        if subscribed {
            adapter.start_background_poller();
        }
        Ok(())
    }

    pub fn disable_notifications(&self) -> Result<()> {
        self.enable_notifications(None::<fn(&[u8])>)
    }

    /// Negotiate the MTU for this connection and return it
    pub fn get_mtu(&self) -> Result<u16> {
        let connection = self.device.handle();
        self.device
            .adapter()
            .with_stack(|stack| stack.exchange_mtu(connection))
    }
}

impl std::fmt::Debug for DeviceCharacteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCharacteristic")
            .field("connection", &self.device.handle())
            .field("record", &self.record)
            .finish()
    }
}

impl Device {
    /// Primary services of the peer, all of them when `uuids` is empty.
    /// Results follow the order of `uuids`.
    pub fn discover_services(&self, uuids: &[Uuid]) -> Result<Vec<DeviceService>> {
        let connection = self.handle();
        let records = self
            .adapter()
            .with_stack(|stack| stack.discover_services(connection, uuids))?;

        Ok(records
            .into_iter()
            .map(|record| DeviceService {
                device: self.clone(),
                record,
            })
            .collect())
    }
}
