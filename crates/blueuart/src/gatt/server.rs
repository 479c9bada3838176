//! GATT server: registering local services and updating their values
//!
//! A service is laid out as one contiguous handle range: the service
//! declaration, then for each characteristic its declaration, its value and,
//! when it can notify or indicate, a CCCD.

use super::error::GattError;
use super::types::{CharacteristicProperties, Service};
use crate::adapter::Adapter;
use crate::att::database::{AttributeDatabase, AttributeKind, LocalCharacteristic};
use crate::att::types::{CharacteristicRecord, ServiceRecord};
use crate::error::Result;
use crate::hci::Transport;
use crate::l2cap::constants::L2CAP_CID_ATT;
use crate::stack::Stack;
use crate::uuid::{Uuid, GATT_CHARACTERISTIC, GATT_CLIENT_CHARACTERISTIC_CONFIG, GATT_PRIMARY_SERVICE};
use log::debug;

/// Handles allocated for one registered characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicHandles {
    pub declaration: u16,
    pub value: u16,
    pub cccd: Option<u16>,
}

/// Handles allocated for one registered service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandles {
    pub start: u16,
    pub end: u16,
    pub characteristics: Vec<CharacteristicHandles>,
}

fn handles_needed(service: &Service) -> usize {
    1 + service
        .characteristics
        .iter()
        .map(|c| if c.flags.can_subscribe() { 3 } else { 2 })
        .sum::<usize>()
}

impl AttributeDatabase {
    /// Allocate handles for `service` and store its characteristics.
    ///
    /// Nothing is allocated when the service does not fit below 0xFFFF.
    pub fn register_service(&mut self, service: Service) -> std::result::Result<ServiceHandles, GattError> {
        if handles_needed(&service) > self.free_handles() {
            return Err(GattError::HandlesExhausted);
        }

        let start = self
            .add_attribute(
                AttributeKind::Service,
                None,
                Uuid::from_u16(GATT_PRIMARY_SERVICE),
                CharacteristicProperties::READ,
                service.uuid.to_att_bytes(),
            )
            .ok_or(GattError::HandlesExhausted)?;
        let mut end = start;
        let mut characteristics = Vec::with_capacity(service.characteristics.len());

        for config in service.characteristics {
            let declaration = self
                .add_attribute(
                    AttributeKind::Characteristic,
                    Some(start),
                    Uuid::from_u16(GATT_CHARACTERISTIC),
                    CharacteristicProperties::READ,
                    Vec::new(),
                )
                .ok_or(GattError::HandlesExhausted)?;

            let value_permissions = config.flags
                & (CharacteristicProperties::READ
                    | CharacteristicProperties::WRITE
                    | CharacteristicProperties::WRITE_WITHOUT_RESPONSE);
            let value = self
                .add_attribute(
                    AttributeKind::CharacteristicValue,
                    Some(declaration),
                    config.uuid,
                    value_permissions,
                    Vec::new(),
                )
                .ok_or(GattError::HandlesExhausted)?;
            end = value;

            let cccd = if config.flags.can_subscribe() {
                let handle = self
                    .add_attribute(
                        AttributeKind::Descriptor,
                        Some(declaration),
                        Uuid::from_u16(GATT_CLIENT_CHARACTERISTIC_CONFIG),
                        CharacteristicProperties::READ | CharacteristicProperties::WRITE,
                        Vec::new(),
                    )
                    .ok_or(GattError::HandlesExhausted)?;
                end = handle;
                Some(handle)
            } else {
                None
            };

            let record = CharacteristicRecord {
                declaration_handle: declaration,
                properties: config.flags,
                value_handle: value,
                uuid: config.uuid,
            };
            self.set_declaration_value(declaration, record.declaration_value());
            debug!("gatt: added characteristic {:?} at {}/{}", config.uuid, declaration, value);

            self.add_characteristic(LocalCharacteristic {
                record,
                service_handle: start,
                cccd_handle: cccd,
                value: config.value,
                cccd: 0,
                write_handler: config.write_event,
            });
            characteristics.push(CharacteristicHandles {
                declaration,
                value,
                cccd,
            });
        }

        debug!("gatt: added service {:?} at {}..={}", service.uuid, start, end);
        self.add_service(ServiceRecord {
            start_handle: start,
            end_handle: end,
            uuid: service.uuid,
        });

        Ok(ServiceHandles {
            start,
            end,
            characteristics,
        })
    }
}

impl<T: Transport> Stack<T> {
    pub fn add_service(&mut self, service: Service) -> Result<ServiceHandles> {
        Ok(self.att.database_mut().register_service(service)?)
    }

    /// Replace a local value and notify every subscribed peer
    pub fn set_local_value(&mut self, value_handle: u16, value: &[u8]) -> Result<usize> {
        let characteristic = self
            .att
            .database_mut()
            .characteristic_mut(value_handle)
            .ok_or(GattError::CharacteristicNotFound)?;

        let properties = characteristic.record.properties;
        if !(properties.can_write() || properties.can_write_without_response() || properties.can_subscribe()) {
            return Err(GattError::NoWrite.into());
        }
        characteristic.value = value.to_vec();

        for (connection, pdu) in self.att.notification_pdus(value_handle) {
            debug!("gatt: notifying 0x{:04x} on 0x{:04x}", value_handle, connection);
            self.hci.send_acl(connection, L2CAP_CID_ATT, &pdu)?;
        }
        Ok(value.len())
    }

    pub fn local_value(&self, value_handle: u16) -> Result<Vec<u8>> {
        let characteristic = self
            .att
            .database()
            .characteristic(value_handle)
            .ok_or(GattError::CharacteristicNotFound)?;
        Ok(characteristic.value.clone())
    }
}

/// A characteristic registered with [`Adapter::add_service`]
#[derive(Clone)]
pub struct Characteristic {
    adapter: Adapter,
    handles: CharacteristicHandles,
}

impl Characteristic {
    pub(crate) fn new(adapter: Adapter, handles: CharacteristicHandles) -> Self {
        Self { adapter, handles }
    }

    pub fn value_handle(&self) -> u16 {
        self.handles.value
    }

    pub fn handles(&self) -> CharacteristicHandles {
        self.handles
    }

    /// Replace the value. Peers that enabled notifications receive it.
    pub fn write(&self, value: &[u8]) -> Result<usize> {
        self.adapter.with_stack(|stack| stack.set_local_value(self.handles.value, value))
    }

    /// Current value, including writes made by peers
    pub fn value(&self) -> Result<Vec<u8>> {
        self.adapter.with_stack(|stack| stack.local_value(self.handles.value))
    }
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic").field("handles", &self.handles).finish()
    }
}
