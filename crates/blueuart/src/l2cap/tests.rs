//! Tests for the L2CAP signaling channel

use super::constants::*;
use super::signaling::*;
use super::types::*;
use crate::hci::constants::{HCI_ROLE_CENTRAL, HCI_ROLE_PERIPHERAL};

fn update_request(identifier: u8, min: u16, max: u16, latency: u16, timeout: u16) -> Vec<u8> {
    SignalingMessage::ConnectionParameterUpdateRequest {
        identifier,
        params: ConnectionParameterUpdate {
            conn_interval_min: min,
            conn_interval_max: max,
            conn_latency: latency,
            supervision_timeout: timeout,
        },
    }
    .serialize()
}

#[test]
fn test_update_request_layout() {
    let data = update_request(0x01, 0x0018, 0x0028, 0x0000, 0x01F4);
    assert_eq!(
        data,
        vec![0x12, 0x01, 0x08, 0x00, 0x18, 0x00, 0x28, 0x00, 0x00, 0x00, 0xF4, 0x01]
    );

    let parsed = SignalingMessage::parse(&data).unwrap();
    assert_eq!(parsed.code(), L2CAP_CONNECTION_PARAMETER_UPDATE_REQUEST);
    assert_eq!(parsed.identifier(), 0x01);
}

#[test]
fn test_peripheral_link_requests_parameters() {
    let mut signaling = L2capSignaling::new(true);
    let request = signaling
        .add_connection(0x0040, HCI_ROLE_PERIPHERAL, 0x0018, 0x01F4)
        .unwrap();
    assert_eq!(
        request,
        vec![0x12, 0x01, 0x08, 0x00, 0x18, 0x00, 0x18, 0x00, 0x00, 0x00, 0xF4, 0x01]
    );

    // A new link starts its own identifier sequence
    signaling.remove_connection(0x0040);
    let request = signaling.add_connection(0x0041, HCI_ROLE_PERIPHERAL, 0x0018, 0x01F4).unwrap();
    assert_eq!(request[1], 0x01);
}

#[test]
fn test_central_or_disabled_sends_nothing() {
    let mut signaling = L2capSignaling::new(true);
    assert!(signaling.add_connection(0x0040, HCI_ROLE_CENTRAL, 0x0018, 0x01F4).is_none());

    let mut signaling = L2capSignaling::new(false);
    assert!(!signaling.is_enabled());
    assert!(signaling.add_connection(0x0040, HCI_ROLE_PERIPHERAL, 0x0018, 0x01F4).is_none());
}

#[test]
fn test_request_accepted() {
    let mut signaling = L2capSignaling::new(true);
    signaling.add_connection(0x0040, HCI_ROLE_CENTRAL, 0x0018, 0x01F4);

    let action = signaling
        .handle_data(0x0040, &update_request(0x07, 0x0010, 0x0020, 0, 0x0100))
        .unwrap();
    assert_eq!(
        action,
        SignalingAction::Accept {
            reply: vec![0x13, 0x07, 0x02, 0x00, 0x00, 0x00],
            params: ConnectionParameterUpdate {
                conn_interval_min: 0x0010,
                conn_interval_max: 0x0020,
                conn_latency: 0,
                supervision_timeout: 0x0100,
            },
        }
    );
}

#[test]
fn test_request_rejected_by_policy() {
    let mut signaling = L2capSignaling::new(true);
    signaling.set_policy(Box::new(RejectInvalid));
    signaling.add_connection(0x0040, HCI_ROLE_CENTRAL, 0x0018, 0x01F4);

    // Interval below the LE minimum
    let action = signaling
        .handle_data(0x0040, &update_request(0x03, 0x0001, 0x0002, 0, 0x0100))
        .unwrap();
    assert_eq!(action, SignalingAction::Reply(vec![0x13, 0x03, 0x02, 0x00, 0x01, 0x00]));
}

#[test]
fn test_response_and_unknown_commands() {
    let mut signaling = L2capSignaling::new(true);
    signaling.add_connection(0x0040, HCI_ROLE_CENTRAL, 0x0018, 0x01F4);

    let response = SignalingMessage::ConnectionParameterUpdateResponse {
        identifier: 1,
        result: L2CAP_CONN_PARAM_ACCEPTED,
    }
    .serialize();
    assert_eq!(signaling.handle_data(0x0040, &response).unwrap(), SignalingAction::None);

    // Echo request is not an LE signaling command
    let action = signaling.handle_data(0x0040, &[0x08, 0x05, 0x00, 0x00]).unwrap();
    assert_eq!(action, SignalingAction::Reply(vec![0x01, 0x05, 0x02, 0x00, 0x00, 0x00]));
}

#[test]
fn test_malformed_and_unknown_connection() {
    let mut signaling = L2capSignaling::new(true);
    assert!(matches!(
        signaling.handle_data(0x0040, &update_request(1, 6, 6, 0, 10)),
        Err(L2capError::UnknownConnection(0x0040))
    ));

    signaling.add_connection(0x0040, HCI_ROLE_CENTRAL, 0x0018, 0x01F4);
    assert!(signaling.handle_data(0x0040, &[0x12, 0x01]).is_err());
    assert!(signaling.handle_data(0x0040, &[0x12, 0x01, 0x08, 0x00, 0x10]).is_err());
}

#[test]
fn test_parameter_validation() {
    let valid = ConnectionParameterUpdate {
        conn_interval_min: 0x0006,
        conn_interval_max: 0x000C,
        conn_latency: 0,
        supervision_timeout: 0x00C8,
    };
    assert!(valid.validate());

    // Timeout too short for the interval and latency
    let invalid = ConnectionParameterUpdate {
        conn_interval_max: 0x0C80,
        conn_latency: 10,
        ..valid
    };
    assert!(!invalid.validate());
}
