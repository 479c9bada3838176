//! Advertising payloads
//!
//! An advertising or scan response payload is a sequence of AD structures,
//! each `[length][type][data]` where the length covers type and data. The
//! payload is limited to 31 bytes.

use crate::adapter::Adapter;
use crate::error::{Error, Result};
use crate::gap::constants::*;
use crate::hci::constants::HCI_MAX_ADV_DATA_LEN;
use crate::uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerDataElement {
    pub company_id: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDataElement {
    pub uuid: Uuid,
    pub data: Vec<u8>,
}

/// What to advertise
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementOptions {
    /// Empty means no name element
    pub local_name: String,
    pub service_uuids: Vec<Uuid>,
    /// Advertising interval in 0.625 ms units; not part of the payload
    pub interval: u16,
    pub manufacturer_data: Vec<ManufacturerDataElement>,
    pub service_data: Vec<ServiceDataElement>,
}

/// Convert milliseconds to an advertising interval
pub fn advertise_interval_ms(ms: u32) -> u16 {
    (u64::from(ms) * 1000 / 625).min(u64::from(u16::MAX)) as u16
}

/// Wire form of a UUID inside an AD structure: 2, 4 or 16 bytes
fn uuid_bytes(uuid: &Uuid) -> Vec<u8> {
    match (uuid.as_u16(), uuid.as_u32()) {
        (Some(short), _) => short.to_le_bytes().to_vec(),
        (None, Some(long)) => long.to_le_bytes().to_vec(),
        _ => uuid.as_bytes_le().to_vec(),
    }
}

/// An encoded advertising payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementPayload {
    data: Vec<u8>,
}

impl AdvertisementPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one AD structure
    pub fn add_element(&mut self, ad_type: u8, data: &[u8]) -> Result<()> {
        if self.data.len() + 2 + data.len() > HCI_MAX_ADV_DATA_LEN {
            return Err(Error::AdvertisementTooLarge);
        }
        self.data.push(data.len() as u8 + 1);
        self.data.push(ad_type);
        self.data.extend_from_slice(data);
        Ok(())
    }

    /// Flags, local name, service UUIDs, manufacturer data and service data
    pub fn from_options(options: &AdvertisementOptions) -> Result<Self> {
        let mut payload = Self::new();
        payload.add_element(ADV_TYPE_FLAGS, &[ADV_FLAGS_LE_GENERAL])?;

        if !options.local_name.is_empty() {
            payload.add_element(ADV_TYPE_COMPLETE_LOCAL_NAME, options.local_name.as_bytes())?;
        }

        for uuid in &options.service_uuids {
            let bytes = uuid_bytes(uuid);
            let ad_type = match bytes.len() {
                2 => ADV_TYPE_16BIT_SERVICE_UUID_COMPLETE,
                4 => ADV_TYPE_32BIT_SERVICE_UUID_COMPLETE,
                _ => ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE,
            };
            payload.add_element(ad_type, &bytes)?;
        }

        for element in &options.manufacturer_data {
            let mut data = element.company_id.to_le_bytes().to_vec();
            data.extend_from_slice(&element.data);
            payload.add_element(ADV_TYPE_MANUFACTURER_SPECIFIC, &data)?;
        }

        for element in &options.service_data {
            let mut data = uuid_bytes(&element.uuid);
            let ad_type = match data.len() {
                2 => ADV_TYPE_SERVICE_DATA_16BIT,
                4 => ADV_TYPE_SERVICE_DATA_32BIT,
                _ => ADV_TYPE_SERVICE_DATA_128BIT,
            };
            data.extend_from_slice(&element.data);
            payload.add_element(ad_type, &data)?;
        }

        Ok(payload)
    }

    /// Scan response carrying the local name, shortened past 29 bytes
    pub fn scan_response(local_name: &str) -> Self {
        let name = local_name.as_bytes();
        let (ad_type, name) = if name.len() > MAX_SCAN_RESPONSE_NAME {
            (ADV_TYPE_SHORT_LOCAL_NAME, &name[..MAX_SCAN_RESPONSE_NAME])
        } else {
            (ADV_TYPE_COMPLETE_LOCAL_NAME, name)
        };

        let mut data = Vec::with_capacity(2 + name.len());
        if !name.is_empty() {
            data.push(name.len() as u8 + 1);
            data.push(ad_type);
            data.extend_from_slice(name);
        }
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Iterate over the `(type, data)` AD structures of a payload.
///
/// Stops at a zero length or a structure running past the end.
pub fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    std::iter::from_fn(move || {
        let length = *data.get(i)? as usize;
        if length == 0 || i + 1 + length > data.len() {
            return None;
        }
        let ad_type = data[i + 1];
        let body = &data[i + 2..i + 1 + length];
        i += 1 + length;
        Some((ad_type, body))
    })
}

/// Fields decoded from a received advertisement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementFields {
    pub local_name: String,
    pub service_uuids: Vec<Uuid>,
    pub manufacturer_data: Vec<ManufacturerDataElement>,
    pub service_data: Vec<ServiceDataElement>,
}

impl AdvertisementFields {
    pub fn parse(data: &[u8]) -> Self {
        let mut fields = Self::default();
        for (ad_type, body) in ad_structures(data) {
            match ad_type {
                ADV_TYPE_SHORT_LOCAL_NAME | ADV_TYPE_COMPLETE_LOCAL_NAME => {
                    fields.local_name = String::from_utf8_lossy(body).into_owned();
                }
                ADV_TYPE_16BIT_SERVICE_UUID_PARTIAL | ADV_TYPE_16BIT_SERVICE_UUID_COMPLETE => {
                    fields
                        .service_uuids
                        .extend(body.chunks_exact(2).filter_map(Uuid::try_from_slice_le));
                }
                ADV_TYPE_32BIT_SERVICE_UUID_PARTIAL | ADV_TYPE_32BIT_SERVICE_UUID_COMPLETE => {
                    fields
                        .service_uuids
                        .extend(body.chunks_exact(4).filter_map(Uuid::try_from_slice_le));
                }
                ADV_TYPE_128BIT_SERVICE_UUID_PARTIAL | ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE => {
                    fields
                        .service_uuids
                        .extend(body.chunks_exact(16).filter_map(Uuid::try_from_slice_le));
                }
                ADV_TYPE_MANUFACTURER_SPECIFIC if body.len() >= 2 => {
                    fields.manufacturer_data.push(ManufacturerDataElement {
                        company_id: u16::from_le_bytes([body[0], body[1]]),
                        data: body[2..].to_vec(),
                    });
                }
                ADV_TYPE_SERVICE_DATA_16BIT | ADV_TYPE_SERVICE_DATA_32BIT | ADV_TYPE_SERVICE_DATA_128BIT => {
                    let uuid_len = match ad_type {
                        ADV_TYPE_SERVICE_DATA_16BIT => 2,
                        ADV_TYPE_SERVICE_DATA_32BIT => 4,
                        _ => 16,
                    };
                    if let Some(uuid) = body.get(..uuid_len).and_then(Uuid::try_from_slice_le) {
                        fields.service_data.push(ServiceDataElement {
                            uuid,
                            data: body[uuid_len..].to_vec(),
                        });
                    }
                }
                _ => {}
            }
        }
        fields
    }

    pub fn has_service_uuid(&self, uuid: &Uuid) -> bool {
        self.service_uuids.contains(uuid)
    }
}

/// The adapter's advertising set
#[derive(Clone)]
pub struct Advertisement {
    adapter: Adapter,
}

impl Advertisement {
    pub(crate) fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Store the options and register the Generic Access and Generic
    /// Attribute services. Fails if the payload does not fit.
    pub fn configure(&self, options: AdvertisementOptions) -> Result<()> {
        self.adapter.with_stack(|stack| stack.configure_advertising(options))
    }

    /// Start advertising and the background poller that serves connections
    pub fn start(&self) -> Result<()> {
        self.adapter.with_stack(|stack| stack.start_advertising())?;
        self.adapter.start_background_poller();
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.adapter.with_stack(|stack| stack.stop_advertising())
    }
}
