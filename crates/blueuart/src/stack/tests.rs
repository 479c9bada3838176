//! Stack tests against the simulated controller

use super::*;
use crate::config::ControllerProfile;
use crate::att::AttError;
use crate::error::{Error, HciError};
use crate::gap::{Address, AdvertisementOptions, ConnectionParams};
use crate::gatt::{CharacteristicConfig, CharacteristicProperties, Service};
use crate::hci::constants::*;
use crate::l2cap::constants::{L2CAP_CID_ATT, L2CAP_CID_LE_SIGNALING};
use crate::testing::*;
use crate::uuid::Uuid;

fn stack() -> (Stack<MockTransport>, MockTransport) {
    let mock = MockTransport::new();
    (Stack::new(mock.clone(), test_config()), mock)
}

fn poll_until<F>(stack: &mut Stack<MockTransport>, mut done: F)
where
    F: FnMut(&Stack<MockTransport>) -> bool,
{
    for _ in 0..100 {
        if done(stack) {
            return;
        }
        stack.poll().unwrap();
    }
    panic!("condition not reached");
}

fn drain(stack: &mut Stack<MockTransport>) {
    while stack.poll().unwrap() {}
}

#[test]
fn test_enable_sequence() {
    let (mut stack, mock) = stack();
    mock.queue(&[0x04, 0x0E]); // stale half packet
    stack.enable().unwrap();

    assert_eq!(
        mock.commands(),
        vec![
            opcode(OGF_HOST_CTL, OCF_RESET),
            opcode(OGF_HOST_CTL, OCF_SET_EVENT_MASK),
            opcode(OGF_LE, OCF_LE_SET_EVENT_MASK),
        ]
    );
    assert_eq!(
        mock.last_command(opcode(OGF_LE, OCF_LE_SET_EVENT_MASK)).unwrap(),
        vec![0xFF, 0x03, 0, 0, 0, 0, 0, 0]
    );
}

#[test]
fn test_enable_reads_buffer_size() {
    let mock = MockTransport::new();
    let mut config = test_config();
    config.profile = ControllerProfile {
        read_buffer_size: true,
        ..ControllerProfile::generic_hci()
    };
    mock.set_return(opcode(OGF_LE, OCF_LE_READ_BUFFER_SIZE), &[0x40, 0x00, 0x08]);
    let mut stack = Stack::new(mock.clone(), config.clone());
    stack.enable().unwrap();
    assert_eq!(stack.att().max_mtu(), 60);
    assert_eq!(stack.hci().max_packets(), 8);

    // Short packets are raised to the LE minimum
    let mock = MockTransport::new();
    mock.set_return(opcode(OGF_LE, OCF_LE_READ_BUFFER_SIZE), &[0x10, 0x00, 0x04]);
    let mut stack = Stack::new(mock, config);
    stack.enable().unwrap();
    assert_eq!(stack.att().max_mtu(), 23);
}

#[test]
fn test_command_timeout() {
    let (mut stack, mock) = stack();
    mock.silence(opcode(OGF_HOST_CTL, OCF_RESET));

    let err = stack.enable().unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(err, Error::Hci(HciError::Timeout { opcode: 0x0C03 })));
}

#[test]
fn test_command_failure_status() {
    let (mut stack, mock) = stack();
    let reset = opcode(OGF_HOST_CTL, OCF_RESET);
    mock.silence(reset);
    mock.queue(&command_complete(reset, 0x0C, &[]));

    let err = stack.send_command(crate::hci::HciCommand::Reset).unwrap_err();
    assert!(matches!(
        err,
        Error::Hci(HciError::CommandFailed {
            opcode: 0x0C03,
            status: 0x0C
        })
    ));
}

#[test]
fn test_read_bd_addr() {
    let (mut stack, mock) = stack();
    mock.set_return(opcode(OGF_INFO_PARAM, OCF_READ_BD_ADDR), &PEER);

    let address = stack.read_bd_addr().unwrap();
    assert_eq!(address.mac, PEER);
    assert_eq!(address.to_string(), "11:22:33:44:55:66");
}

#[test]
fn test_connect() {
    let (mut stack, mock) = stack();
    let handle = stack
        .connect(Address::from_hci(0x00, PEER), ConnectionParams::default())
        .unwrap();
    assert_eq!(handle, 0x0040);

    let connection = stack.connection(handle).unwrap();
    assert_eq!(connection.role, Role::Central);
    assert_eq!(connection.interval, 0x0018);
    assert!(connection.is_connected());
    assert_eq!(
        stack.take_events(),
        vec![StackEvent::Connected {
            handle,
            address: Address::from_hci(0x00, PEER)
        }]
    );

    // Default parameters with CE length 4..6
    let params = mock.last_command(opcode(OGF_LE, OCF_LE_CREATE_CONNECTION)).unwrap();
    assert_eq!(&params[0..5], &[0x60, 0x00, 0x30, 0x00, 0x00]);
    assert_eq!(&params[13..], &[0x06, 0, 0x0C, 0, 0, 0, 0xC8, 0, 0x04, 0, 0x06, 0]);

    // A central link never asks for parameters
    assert!(mock.sent_on(L2CAP_CID_LE_SIGNALING).is_empty());
}

#[test]
fn test_connect_timeout_cancels() {
    let (mut stack, mock) = stack();
    mock.state().accept_connections = false;

    let err = stack
        .connect(Address::from_hci(0x01, PEER), ConnectionParams::default())
        .unwrap_err();
    assert!(matches!(err, Error::Connect));
    assert_eq!(
        mock.commands(),
        vec![
            opcode(OGF_LE, OCF_LE_CREATE_CONNECTION),
            opcode(OGF_LE, OCF_LE_CREATE_CONNECTION_CANCEL),
        ]
    );
    // The random address type went out with the request
    let params = mock.last_command(opcode(OGF_LE, OCF_LE_CREATE_CONNECTION)).unwrap();
    assert_eq!(params[5], 0x01);
}

#[test]
fn test_disconnect() {
    let (mut stack, mock) = stack();
    assert!(matches!(stack.disconnect(0x0040), Err(Error::NotConnected(0x0040))));

    let handle = stack
        .connect(Address::from_hci(0x00, PEER), ConnectionParams::default())
        .unwrap();
    stack.take_events();
    stack.disconnect(handle).unwrap();
    assert_eq!(
        mock.last_command(opcode(OGF_LINK_CTL, OCF_DISCONNECT)).unwrap(),
        vec![0x40, 0x00, 0x13]
    );

    poll_until(&mut stack, |s| s.connection(handle).is_none());
    assert!(stack.att().connection(handle).is_none());
    assert_eq!(
        stack.take_events(),
        vec![StackEvent::Disconnected {
            handle,
            address: Address::from_hci(0x00, PEER),
            reason: 0x16
        }]
    );
}

#[test]
fn test_advertising_lifecycle() {
    let (mut stack, mock) = stack();
    assert!(matches!(stack.start_advertising(), Err(Error::NotConfigured)));

    stack
        .configure_advertising(AdvertisementOptions {
            local_name: "hr".into(),
            service_uuids: vec![Uuid::from_u16(0x180D)],
            ..AdvertisementOptions::default()
        })
        .unwrap();
    stack.start_advertising().unwrap();
    assert!(stack.is_advertising());

    assert_eq!(
        mock.last_command(opcode(OGF_LE, OCF_LE_SET_ADVERTISING_PARAMETERS)).unwrap(),
        vec![0xA0, 0x00, 0xA0, 0x00, 0x00, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0x07, 0x00]
    );
    let data = mock.last_command(opcode(OGF_LE, OCF_LE_SET_ADVERTISING_DATA)).unwrap();
    assert_eq!(data.len(), 32);
    assert_eq!(
        &data[..12],
        &[11, 0x02, 0x01, 0x06, 0x03, 0x09, b'h', b'r', 0x03, 0x03, 0x0D, 0x18]
    );
    let response = mock.last_command(opcode(OGF_LE, OCF_LE_SET_SCAN_RESPONSE_DATA)).unwrap();
    assert_eq!(&response[..5], &[4, 0x03, 0x09, b'h', b'r']);
    assert_eq!(
        mock.last_command(opcode(OGF_LE, OCF_LE_SET_ADVERTISE_ENABLE)).unwrap(),
        vec![0x01]
    );

    stack.stop_advertising().unwrap();
    assert!(!stack.is_advertising());
    assert_eq!(
        mock.last_command(opcode(OGF_LE, OCF_LE_SET_ADVERTISE_ENABLE)).unwrap(),
        vec![0x00]
    );
}

#[test]
fn test_configure_registers_gap_services_once() {
    let (mut stack, _mock) = stack();
    stack.configure_advertising(AdvertisementOptions::default()).unwrap();
    stack
        .configure_advertising(AdvertisementOptions {
            local_name: "second".into(),
            ..AdvertisementOptions::default()
        })
        .unwrap();

    let services = stack.att().database().services().to_vec();
    assert_eq!(services.len(), 2);
    assert_eq!(services[0].uuid, Uuid::from_u16(0x1800));
    assert_eq!((services[0].start_handle, services[0].end_handle), (1, 5));
    assert_eq!(services[1].uuid, Uuid::from_u16(0x1801));
    assert_eq!((services[1].start_handle, services[1].end_handle), (6, 9));

    // The device name falls back to the default
    assert_eq!(stack.local_value(3).unwrap(), b"blueuart".to_vec());
}

#[test]
fn test_configure_rejects_oversized_payload() {
    let (mut stack, _mock) = stack();
    let err = stack
        .configure_advertising(AdvertisementOptions {
            local_name: "a name that is far too long to advertise".into(),
            ..AdvertisementOptions::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::AdvertisementTooLarge));
    assert!(stack.att().database().services().is_empty());
}

#[test]
fn test_peripheral_connection_pauses_advertising() {
    let (mut stack, mock) = stack();
    stack.configure_advertising(AdvertisementOptions::default()).unwrap();
    stack.start_advertising().unwrap();
    mock.clear_written();

    mock.connect_peer(0x0041, HCI_ROLE_PERIPHERAL, PEER);
    poll_until(&mut stack, |s| s.connection(0x0041).is_some());

    assert_eq!(stack.connection(0x0041).unwrap().role, Role::Peripheral);
    assert_eq!(
        mock.last_command(opcode(OGF_LE, OCF_LE_SET_ADVERTISE_ENABLE)).unwrap(),
        vec![0x00]
    );
    // Parameters requested with the link's own interval and timeout
    assert_eq!(
        mock.sent_on(L2CAP_CID_LE_SIGNALING),
        vec![(
            0x0041,
            vec![0x12, 0x01, 0x08, 0x00, 0x18, 0x00, 0x18, 0x00, 0x00, 0x00, 0xC8, 0x00]
        )]
    );

    mock.clear_written();
    mock.disconnect_peer(0x0041, 0x13);
    poll_until(&mut stack, |s| s.connection(0x0041).is_none());
    assert_eq!(
        mock.last_command(opcode(OGF_LE, OCF_LE_SET_ADVERTISE_ENABLE)).unwrap(),
        vec![0x01]
    );
    assert!(stack.is_advertising());
}

#[test]
fn test_generic_profile_skips_signaling() {
    let mock = MockTransport::new();
    let mut config = test_config();
    config.profile = ControllerProfile::generic_hci();
    let mut stack = Stack::new(mock.clone(), config);

    mock.connect_peer(0x0041, HCI_ROLE_PERIPHERAL, PEER);
    poll_until(&mut stack, |s| s.connection(0x0041).is_some());
    assert!(mock.sent_on(L2CAP_CID_LE_SIGNALING).is_empty());
}

#[test]
fn test_parameter_update_request_applied() {
    let (mut stack, mock) = stack();
    mock.connect_peer(0x0040, HCI_ROLE_CENTRAL, PEER);
    poll_until(&mut stack, |s| s.connection(0x0040).is_some());

    mock.queue(&acl_frame(
        0x0040,
        L2CAP_CID_LE_SIGNALING,
        &[0x12, 0x07, 0x08, 0x00, 0x18, 0x00, 0x28, 0x00, 0x00, 0x00, 0xF4, 0x01],
    ));
    drain(&mut stack);

    assert_eq!(
        mock.sent_on(L2CAP_CID_LE_SIGNALING),
        vec![(0x0040, vec![0x13, 0x07, 0x02, 0x00, 0x00, 0x00])]
    );
    assert_eq!(
        mock.last_command(opcode(OGF_LE, OCF_LE_CONNECTION_UPDATE)).unwrap(),
        vec![0x40, 0x00, 0x18, 0x00, 0x28, 0x00, 0x00, 0x00, 0xF4, 0x01, 0x04, 0x00, 0x06, 0x00]
    );
}

#[test]
fn test_remote_parameter_request_and_update() {
    let (mut stack, mock) = stack();
    mock.connect_peer(0x0040, HCI_ROLE_CENTRAL, PEER);
    poll_until(&mut stack, |s| s.connection(0x0040).is_some());

    mock.queue(&event(
        EVT_LE_META_EVENT,
        vec![EVT_LE_REMOTE_CONN_PARAM_REQ, 0x40, 0x00, 0x10, 0x00, 0x20, 0x00, 0x02, 0x00, 0x90, 0x01],
    ));
    drain(&mut stack);
    assert_eq!(
        mock.last_command(opcode(OGF_LE, OCF_LE_REMOTE_CONN_PARAM_REQ_REPLY)).unwrap(),
        vec![0x40, 0x00, 0x10, 0x00, 0x20, 0x00, 0x02, 0x00, 0x90, 0x01, 0x0F, 0x00, 0xFF, 0x0F]
    );

    mock.queue(&event(
        EVT_LE_META_EVENT,
        vec![EVT_LE_CONN_UPDATE_COMPLETE, 0x00, 0x40, 0x00, 0x20, 0x00, 0x02, 0x00, 0x90, 0x01],
    ));
    drain(&mut stack);
    let connection = stack.connection(0x0040).unwrap();
    assert_eq!(
        (connection.interval, connection.latency, connection.supervision_timeout),
        (0x0020, 0x0002, 0x0190)
    );
}

#[test]
fn test_peer_requests_are_served() {
    let (mut stack, mock) = stack();
    stack
        .add_service(Service::new(0x180Du16).with_characteristic(CharacteristicConfig::new(
            0x2A37u16,
            CharacteristicProperties::READ | CharacteristicProperties::WRITE,
            vec![0, 75],
        )))
        .unwrap();
    mock.connect_peer(0x0041, HCI_ROLE_PERIPHERAL, PEER);
    poll_until(&mut stack, |s| s.connection(0x0041).is_some());

    mock.clear_written();
    mock.send_att(0x0041, &[0x10, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28]);
    mock.send_att(0x0041, &[0x0A, 0x03, 0x00]);
    drain(&mut stack);

    assert_eq!(
        mock.sent_on(L2CAP_CID_ATT),
        vec![
            (0x0041, vec![0x11, 0x06, 0x01, 0x00, 0x03, 0x00, 0x0D, 0x18]),
            (0x0041, vec![0x0B, 0x00, 75]),
        ]
    );
}

#[test]
fn test_scan_state() {
    let (mut stack, mock) = stack();
    assert!(matches!(stack.stop_scan(), Err(Error::NotScanning)));

    // Reports outside a scan are ignored
    mock.queue(&advertising_report(0x00, PEER, &[0x02, 0x01, 0x06], -60));
    drain(&mut stack);
    assert!(stack.take_adv_report().is_none());

    stack.start_scan().unwrap();
    assert!(matches!(stack.start_scan(), Err(Error::AlreadyScanning)));
    assert_eq!(
        mock.last_command(opcode(OGF_LE, OCF_LE_SET_SCAN_PARAMETERS)).unwrap(),
        vec![0x00, 0x80, 0x00, 0x30, 0x00, 0x00, 0x00]
    );
    assert_eq!(
        mock.last_command(opcode(OGF_LE, OCF_LE_SET_SCAN_ENABLE)).unwrap(),
        vec![0x01, 0x00]
    );

    mock.queue(&advertising_report(0x01, PEER, &[0x02, 0x01, 0x06], -60));
    drain(&mut stack);
    let report = stack.take_adv_report().unwrap();
    assert_eq!(report.address, PEER);
    assert_eq!(report.rssi, -60);

    stack.stop_scan().unwrap();
    assert!(!stack.is_scanning());
}

#[test]
fn test_full_mtu_write_is_answered() {
    let (mut stack, mock) = stack();
    stack
        .add_service(Service::new(0xFFE0u16).with_characteristic(CharacteristicConfig::new(
            0xFFE1u16,
            CharacteristicProperties::WRITE,
            vec![0x00],
        )))
        .unwrap();
    mock.connect_peer(0x0041, HCI_ROLE_PERIPHERAL, PEER);
    poll_until(&mut stack, |s| s.connection(0x0041).is_some());

    mock.clear_written();
    mock.send_att(0x0041, &[0x02, 0x00, 0x02]);
    drain(&mut stack);
    assert_eq!(mock.sent_on(L2CAP_CID_ATT), vec![(0x0041, vec![0x03, 0xF8, 0x00])]);

    // 3 bytes of header plus 245 of value fill the 248-byte MTU
    let mut write = vec![0x12, 0x03, 0x00];
    write.extend(std::iter::repeat(0xA5).take(245));
    mock.send_att(0x0041, &write);
    drain(&mut stack);

    assert_eq!(mock.sent_on(L2CAP_CID_ATT).last(), Some(&(0x0041, vec![0x13])));
    assert_eq!(stack.att().database().characteristic(0x0003).unwrap().value.len(), 245);
}

#[test]
fn test_att_request_times_out() {
    let (mut stack, mock) = stack();
    mock.state()
        .remote
        .database_mut()
        .register_service(Service::new(0x180Du16))
        .unwrap();
    let handle = stack
        .connect(Address::from_hci(0x00, PEER), ConnectionParams::default())
        .unwrap();

    mock.state().drop_att = true;
    assert!(matches!(stack.read(handle, 0x0003), Err(Error::Att(AttError::Timeout))));
    assert_eq!(stack.att().connection(handle).unwrap().pending.opcode, None);

    // The answer to the abandoned read shows up ahead of the next response
    mock.state().drop_att = false;
    mock.send_att(handle, &[0x0B, 0x01, 0x02]);
    let services = stack
        .read_by_group_type(handle, 0x0001, 0xFFFF, Uuid::from_u16(0x2800))
        .unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].uuid, Uuid::from_u16(0x180D));
}
