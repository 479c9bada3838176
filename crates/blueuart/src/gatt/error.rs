//! GATT errors
use thiserror::Error;

/// Local failures of the GATT layer, raised before or after the wire exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GattError {
    #[error("bluetooth: service not found")]
    ServiceNotFound,

    #[error("bluetooth: characteristic not found")]
    CharacteristicNotFound,

    #[error("bluetooth: read not permitted")]
    NoRead,

    #[error("bluetooth: write not permitted")]
    NoWrite,

    #[error("bluetooth: write without response not permitted")]
    NoWriteWithoutResponse,

    #[error("bluetooth: notify/indicate not permitted")]
    NoNotify,

    #[error("bluetooth: read failed")]
    ReadFailed,

    #[error("bluetooth: attribute handles exhausted")]
    HandlesExhausted,
}
