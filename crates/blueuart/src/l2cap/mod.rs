//! L2CAP for LE links
//!
//! ACL frames are routed by fixed channel: ATT on 0x0004 and LE signaling on
//! 0x0005. Signaling only covers the connection parameter update procedure.

pub mod constants;
pub mod signaling;
pub mod types;
#[cfg(test)]
mod tests;

pub use self::signaling::{
    AcceptAll, ConnectionParameterPolicy, L2capSignaling, RejectInvalid, SignalingAction, SignalingMessage,
};
pub use self::types::*;
