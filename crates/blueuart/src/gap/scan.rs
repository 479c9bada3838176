//! Scan results
use crate::gap::advertising::AdvertisementFields;
use crate::gap::types::Address;
use crate::hci::LeAdvertisingReport;

/// One advertising report, decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub address: Address,
    pub rssi: i16,
    pub payload: AdvertisementFields,
}

impl ScanResult {
    pub fn from_report(report: &LeAdvertisingReport) -> Self {
        Self {
            address: Address::from_hci(report.address_type, report.address),
            rssi: report.rssi as i16,
            payload: AdvertisementFields::parse(&report.data),
        }
    }

    /// The advertised local name, if any
    pub fn local_name(&self) -> Option<&str> {
        if self.payload.local_name.is_empty() {
            None
        } else {
            Some(&self.payload.local_name)
        }
    }
}
