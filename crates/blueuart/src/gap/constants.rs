// Address types
pub const PUBLIC_DEVICE_ADDRESS: u8 = 0x00;
pub const RANDOM_DEVICE_ADDRESS: u8 = 0x01;
pub const PUBLIC_IDENTITY_ADDRESS: u8 = 0x02;
pub const RANDOM_IDENTITY_ADDRESS: u8 = 0x03;

// LE scan parameters: passive, every 80 ms for 30 ms
pub const LE_SCAN_PASSIVE: u8 = 0x00;
pub const LE_SCAN_INTERVAL: u16 = 0x0080;
pub const LE_SCAN_WINDOW: u16 = 0x0030;

// LE connection parameters used when the caller leaves them at zero
pub const LE_CONN_SCAN_INTERVAL: u16 = 0x0060; // 60 ms
pub const LE_CONN_SCAN_WINDOW: u16 = 0x0030; // 30 ms
pub const LE_CONN_INTERVAL_MIN: u16 = 0x0006; // 7.5 ms
pub const LE_CONN_INTERVAL_MAX: u16 = 0x000C; // 15 ms
pub const LE_CONN_LATENCY: u16 = 0x0000;
pub const LE_SUPERVISION_TIMEOUT: u16 = 0x00C8; // 2 s
pub const LE_MIN_CE_LENGTH: u16 = 0x0004;
pub const LE_MAX_CE_LENGTH: u16 = 0x0006;

// Advertising parameters
pub const ADV_IND: u8 = 0x00;
pub const ADV_CHANNEL_ALL: u8 = 0x07;
pub const ADV_FILTER_NONE: u8 = 0x00;
/// 100 ms in 0.625 ms units, used when no interval is configured
pub const ADV_DEFAULT_INTERVAL: u16 = 0x00A0;

/// General discoverable, BR/EDR not supported
pub const ADV_FLAGS_LE_GENERAL: u8 = 0x06;

/// Local name advertised when none is configured
pub const DEFAULT_LOCAL_NAME: &str = "blueuart";

/// Longest name that fits a scan response element
pub const MAX_SCAN_RESPONSE_NAME: usize = 29;

// Advertising Data Types
pub const ADV_TYPE_FLAGS: u8 = 0x01;
pub const ADV_TYPE_16BIT_SERVICE_UUID_PARTIAL: u8 = 0x02;
pub const ADV_TYPE_16BIT_SERVICE_UUID_COMPLETE: u8 = 0x03;
pub const ADV_TYPE_32BIT_SERVICE_UUID_PARTIAL: u8 = 0x04;
pub const ADV_TYPE_32BIT_SERVICE_UUID_COMPLETE: u8 = 0x05;
pub const ADV_TYPE_128BIT_SERVICE_UUID_PARTIAL: u8 = 0x06;
pub const ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE: u8 = 0x07;
pub const ADV_TYPE_SHORT_LOCAL_NAME: u8 = 0x08;
pub const ADV_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
pub const ADV_TYPE_TX_POWER_LEVEL: u8 = 0x0A;
pub const ADV_TYPE_SERVICE_DATA_16BIT: u8 = 0x16;
pub const ADV_TYPE_APPEARANCE: u8 = 0x19;
pub const ADV_TYPE_SERVICE_DATA_32BIT: u8 = 0x20;
pub const ADV_TYPE_SERVICE_DATA_128BIT: u8 = 0x21;
pub const ADV_TYPE_MANUFACTURER_SPECIFIC: u8 = 0xFF;
