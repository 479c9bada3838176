//! Unit tests for HCI packet parsing, reassembly and the engine

use super::assembler::*;
use super::constants::*;
use super::engine::*;
use super::packet::*;
use super::transport::*;
use crate::error::HciError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Feeds queued bytes to the engine and records what it writes
#[derive(Default)]
struct ScriptedTransport {
    rx: VecDeque<u8>,
    tx: Vec<Vec<u8>>,
}

impl ScriptedTransport {
    fn queue(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }
}

impl Transport for ScriptedTransport {
    fn bytes_available(&mut self) -> Result<usize, HciError> {
        Ok(self.rx.len())
    }

    fn read_byte(&mut self) -> Result<u8, HciError> {
        self.rx.pop_front().ok_or(HciError::InvalidPacket)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, HciError> {
        self.tx.push(data.to_vec());
        Ok(data.len())
    }
}

struct StuckCts {
    rts_changes: Arc<AtomicUsize>,
}

impl FlowControl for StuckCts {
    fn set_rts(&mut self, _high: bool) {
        self.rts_changes.fetch_add(1, Ordering::SeqCst);
    }

    fn cts_asserted(&mut self) -> bool {
        true
    }
}

fn command_complete(opcode: u16, status: u8, data: &[u8]) -> Vec<u8> {
    let mut params = vec![1];
    params.extend_from_slice(&opcode.to_le_bytes());
    params.push(status);
    params.extend_from_slice(data);
    HciEvent {
        event_code: EVT_CMD_COMPLETE,
        parameters: params,
    }
    .to_packet()
}

#[test]
fn test_hci_command_serialization() {
    let packet = HciCommand::Reset.to_packet();
    assert_eq!(packet, vec![HCI_COMMAND_PKT, 0x03, 0x0C, 0x00]);

    let packet = HciCommand::LeSetScanParameters {
        scan_type: 0x00,
        scan_interval: 0x0080,
        scan_window: 0x0030,
        own_address_type: 0x00,
        filter_policy: 0x00,
    }
    .to_packet();
    assert_eq!(
        packet,
        vec![HCI_COMMAND_PKT, 0x0B, 0x20, 7, 0x00, 0x80, 0x00, 0x30, 0x00, 0x00, 0x00]
    );

    let packet = HciCommand::Disconnect {
        handle: 0x0040,
        reason: HCI_OE_USER_ENDED_CONNECTION,
    }
    .to_packet();
    assert_eq!(packet, vec![HCI_COMMAND_PKT, 0x06, 0x04, 3, 0x40, 0x00, 0x13]);

    let packet = HciCommand::LeSetScanEnable {
        enable: true,
        filter_duplicates: false,
    }
    .to_packet();
    assert_eq!(packet, vec![HCI_COMMAND_PKT, 0x0C, 0x20, 2, 1, 0]);
}

#[test]
fn test_create_connection_layout() {
    let packet = HciCommand::LeCreateConnection {
        scan_interval: 0x0060,
        scan_window: 0x0030,
        initiator_filter: 0,
        peer_address_type: 1,
        peer_address: [0x66, 0x55, 0x44, 0x33, 0x22, 0x11],
        own_address_type: 0,
        min_interval: 0x0006,
        max_interval: 0x000c,
        latency: 0,
        supervision_timeout: 0x00c8,
        min_ce_length: 0x0004,
        max_ce_length: 0x0006,
    }
    .to_packet();

    assert_eq!(u16::from_le_bytes([packet[1], packet[2]]), 0x200D);
    assert_eq!(packet[3], 25);
    assert_eq!(packet.len(), 4 + 25);
    assert_eq!(&packet[4..8], &[0x60, 0x00, 0x30, 0x00]);
    assert_eq!(packet[9], 1);
    assert_eq!(&packet[10..16], &[0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
    assert_eq!(&packet[17..19], &[0x06, 0x00]);
    assert_eq!(&packet[23..25], &[0xc8, 0x00]);
    assert_eq!(&packet[27..29], &[0x06, 0x00]);
}

#[test]
fn test_advertising_data_is_padded() {
    let packet = HciCommand::LeSetAdvertisingData {
        data: vec![0x02, 0x01, 0x06],
    }
    .to_packet();

    assert_eq!(u16::from_le_bytes([packet[1], packet[2]]), 0x2008);
    assert_eq!(packet[3], 32);
    assert_eq!(packet[4], 3);
    assert_eq!(&packet[5..8], &[0x02, 0x01, 0x06]);
    assert!(packet[8..].iter().all(|b| *b == 0));
}

#[test]
fn test_connection_update_commands() {
    let update = HciCommand::LeConnectionUpdate {
        handle: 0x0001,
        min_interval: 0x0010,
        max_interval: 0x0020,
        latency: 0,
        supervision_timeout: 0x0100,
        min_ce_length: 4,
        max_ce_length: 6,
    };
    assert_eq!(update.opcode(), 0x2013);
    let packet = update.to_packet();
    assert_eq!(packet[3], 14);
    assert_eq!(&packet[4..6], &[0x01, 0x00]);
    assert_eq!(&packet[12..14], &[0x00, 0x01]);

    let reply = HciCommand::LeRemoteConnParamReqReply {
        handle: 0x0001,
        min_interval: 0x0010,
        max_interval: 0x0020,
        latency: 0,
        timeout: 0x0100,
        min_ce_length: 4,
        max_ce_length: 6,
    };
    assert_eq!(reply.opcode(), 0x2020);
    assert_eq!(HciCommand::LeCreateConnectionCancel.opcode(), 0x200E);
}

#[test]
fn test_event_parsing() {
    let raw = [0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00];
    let event = HciEvent::parse(&raw).unwrap();
    assert_eq!(event.event_code, EVT_CMD_COMPLETE);
    assert_eq!(event.parameters.len(), 4);

    match Event::parse(&event).unwrap() {
        Event::CommandComplete {
            opcode,
            return_parameters,
        } => {
            assert_eq!(opcode, 0x0C03);
            assert_eq!(return_parameters, vec![0x00]);
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Declared length longer than the data
    assert!(HciEvent::parse(&[0x0E, 0x04, 0x01]).is_none());
}

#[test]
fn test_command_status_parsing() {
    let event = HciEvent {
        event_code: EVT_CMD_STATUS,
        parameters: vec![0x0C, 0x01, 0x0D, 0x20],
    };
    assert_eq!(
        Event::parse(&event).unwrap(),
        Event::CommandStatus {
            status: 0x0C,
            opcode: 0x200D
        }
    );
}

#[test]
fn test_connection_complete_offsets() {
    let mut params = vec![EVT_LE_CONN_COMPLETE, 0x00, 0x40, 0x00, HCI_ROLE_PERIPHERAL, 0x01];
    params.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    params.extend_from_slice(&0x0018u16.to_le_bytes());
    params.extend_from_slice(&0x0002u16.to_le_bytes());
    params.extend_from_slice(&0x01F4u16.to_le_bytes());
    params.push(0x00);
    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameters: params,
    };

    match Event::parse(&event).unwrap() {
        Event::LeConnectionComplete(complete) => {
            assert_eq!(complete.status, 0);
            assert_eq!(complete.handle, 0x0040);
            assert_eq!(complete.role, HCI_ROLE_PERIPHERAL);
            assert_eq!(complete.peer_address_type, 1);
            assert_eq!(complete.peer_address, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
            assert_eq!(complete.interval, 0x0018);
            assert_eq!(complete.latency, 0x0002);
            assert_eq!(complete.supervision_timeout, 0x01F4);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_enhanced_connection_complete_offsets() {
    let mut params = vec![EVT_LE_ENHANCED_CONN_COMPLETE, 0x00, 0x01, 0x00, HCI_ROLE_CENTRAL, 0x00];
    params.extend_from_slice(&[0xAA; 6]);
    params.extend_from_slice(&[0u8; 12]);
    params.extend_from_slice(&0x0028u16.to_le_bytes());
    params.extend_from_slice(&0x0000u16.to_le_bytes());
    params.extend_from_slice(&0x0190u16.to_le_bytes());
    params.push(0x00);
    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameters: params,
    };

    match Event::parse(&event).unwrap() {
        Event::LeConnectionComplete(complete) => {
            assert_eq!(complete.handle, 0x0001);
            assert_eq!(complete.interval, 0x0028);
            assert_eq!(complete.supervision_timeout, 0x0190);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_advertising_report_parsing() {
    let data = [0x02, 0x01, 0x06, 0x04, 0x09, b'a', b'b', b'c'];
    let mut params = vec![EVT_LE_ADVERTISING_REPORT, 1, 0x00, 0x01];
    params.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    params.push(data.len() as u8);
    params.extend_from_slice(&data);
    params.push(0xC4);
    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameters: params,
    };

    match Event::parse(&event).unwrap() {
        Event::LeAdvertisingReport(report) => {
            assert_eq!(report.num_reports, 1);
            assert_eq!(report.address_type, 1);
            assert_eq!(report.address, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
            assert_eq!(report.data, data.to_vec());
            assert_eq!(report.rssi, -60);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_advertising_report_too_long() {
    let mut params = vec![EVT_LE_ADVERTISING_REPORT, 1, 0x00, 0x00];
    params.extend_from_slice(&[0u8; 6]);
    params.push(32);
    params.extend_from_slice(&[0u8; 33]);
    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameters: params,
    };
    assert!(matches!(Event::parse(&event), Err(HciError::InvalidPacket)));
}

#[test]
fn test_update_and_param_request_parsing() {
    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameters: vec![EVT_LE_CONN_UPDATE_COMPLETE, 0x00, 0x40, 0x00, 0x10, 0x00, 0x01, 0x00, 0x00, 0x02],
    };
    assert_eq!(
        Event::parse(&event).unwrap(),
        Event::LeConnectionUpdateComplete(LeConnectionUpdateComplete {
            status: 0,
            handle: 0x0040,
            interval: 0x0010,
            latency: 0x0001,
            supervision_timeout: 0x0200,
        })
    );

    let event = HciEvent {
        event_code: EVT_LE_META_EVENT,
        parameters: vec![EVT_LE_REMOTE_CONN_PARAM_REQ, 0x40, 0x00, 0x06, 0x00, 0x0c, 0x00, 0x00, 0x00, 0xc8, 0x00],
    };
    assert_eq!(
        Event::parse(&event).unwrap(),
        Event::LeRemoteConnParamRequest(RemoteConnParamRequest {
            handle: 0x0040,
            min_interval: 0x0006,
            max_interval: 0x000c,
            latency: 0,
            timeout: 0x00c8,
        })
    );
}

#[test]
fn test_completed_packets_parsing() {
    let event = HciEvent {
        event_code: EVT_NUM_COMP_PKTS,
        parameters: vec![2, 0x40, 0x00, 0x02, 0x00, 0x41, 0x00, 0x01, 0x00],
    };
    assert_eq!(
        Event::parse(&event).unwrap(),
        Event::NumberOfCompletedPackets(vec![(0x0040, 2), (0x0041, 1)])
    );
}

#[test]
fn test_acl_framing() {
    let acl = AclData {
        handle: 0x0040,
        flags: 0x02,
        channel_id: 0x0004,
        payload: vec![0x0A, 0x03, 0x00],
    };
    let packet = acl.to_packet();
    assert_eq!(
        packet,
        vec![HCI_ACL_PKT, 0x40, 0x20, 0x07, 0x00, 0x03, 0x00, 0x04, 0x00, 0x0A, 0x03, 0x00]
    );
    assert_eq!(AclData::parse(&packet[1..]).unwrap(), acl);
}

#[test]
fn test_acl_fragment_rejected() {
    // L2CAP length claims more than the ACL packet carries
    let data = [0x40, 0x20, 0x05, 0x00, 0x09, 0x00, 0x04, 0x00, 0x0A];
    assert!(matches!(AclData::parse(&data), Err(HciError::InvalidPacket)));
    assert!(matches!(AclData::parse(&[0x40, 0x20]), Err(HciError::InvalidPacket)));

    // A continuation whose first bytes happen to look like an L2CAP header
    let data = [0x40, 0x10, 0x05, 0x00, 0x01, 0x00, 0x04, 0x00, 0x0A];
    assert!(matches!(AclData::parse(&data), Err(HciError::InvalidPacket)));
    let data = [0x40, 0x20, 0x05, 0x00, 0x01, 0x00, 0x04, 0x00, 0x0A];
    assert_eq!(AclData::parse(&data).unwrap().payload, vec![0x0A]);
}

#[test]
fn test_assembler_event_split_across_pushes() {
    let mut assembler = PacketAssembler::new();
    let bytes = command_complete(0x0C03, 0, &[]);

    for byte in &bytes[..bytes.len() - 1] {
        assert_eq!(assembler.push(*byte).unwrap(), None);
    }
    assert_eq!(assembler.pending(), bytes.len() - 1);

    let raw = assembler.push(bytes[bytes.len() - 1]).unwrap();
    assert_eq!(raw, Some(RawPacket::Event(bytes[1..].to_vec())));
    assert_eq!(assembler.pending(), 0);
}

#[test]
fn test_assembler_acl_packet() {
    let mut assembler = PacketAssembler::new();
    let packet = AclData {
        handle: 0x0001,
        flags: 0x02,
        channel_id: 0x0004,
        payload: vec![0x02, 0xF7, 0x00],
    }
    .to_packet();

    let mut result = None;
    for byte in &packet {
        result = assembler.push(*byte).unwrap();
    }
    assert_eq!(result, Some(RawPacket::Acl(packet[1..].to_vec())));
}

#[test]
fn test_assembler_unknown_type_resets() {
    let mut assembler = PacketAssembler::new();
    assert!(matches!(assembler.push(0x07), Err(HciError::UnknownPacket(0x07))));
    assert_eq!(assembler.pending(), 0);

    // The next packet still reassembles
    let bytes = command_complete(0x0C03, 0, &[]);
    let mut result = None;
    for byte in &bytes {
        result = assembler.push(*byte).unwrap();
    }
    assert!(matches!(result, Some(RawPacket::Event(_))));
}

#[test]
fn test_assembler_oversize_acl_resets() {
    let mut assembler = PacketAssembler::new();
    for byte in [HCI_ACL_PKT, 0x40, 0x20, 0xFF] {
        assert_eq!(assembler.push(byte).unwrap(), None);
    }
    assert!(matches!(assembler.push(0x01), Err(HciError::InvalidPacket)));
    assert_eq!(assembler.pending(), 0);
}

#[test]
fn test_engine_records_completion() {
    let mut transport = ScriptedTransport::default();
    transport.queue(&command_complete(0x2002, 0, &[0x1B, 0x00, 0x04]));
    let mut hci = Hci::new(transport);

    let opcode = hci.write_command(&HciCommand::LeReadBufferSize).unwrap();
    assert_eq!(opcode, 0x2002);
    assert_eq!(hci.transport().tx.len(), 1);

    assert_eq!(hci.poll().unwrap(), None);
    let result = hci.take_completion(0x2002).unwrap().check().unwrap();
    assert_eq!(result.data(), &[0x1B, 0x00, 0x04]);
    assert!(hci.take_completion(0x2002).is_none());
}

#[test]
fn test_engine_failed_status() {
    let mut transport = ScriptedTransport::default();
    transport.queue(&command_complete(0x0C03, 0x12, &[]));
    let mut hci = Hci::new(transport);

    hci.poll().unwrap();
    let err = hci.take_completion(0x0C03).unwrap().check().unwrap_err();
    assert!(matches!(
        err,
        HciError::CommandFailed {
            opcode: 0x0C03,
            status: 0x12
        }
    ));
}

#[test]
fn test_engine_stale_completion_discarded() {
    let mut transport = ScriptedTransport::default();
    transport.queue(&command_complete(0x0C03, 0, &[]));
    let mut hci = Hci::new(transport);
    hci.poll().unwrap();

    hci.write_command(&HciCommand::Reset).unwrap();
    assert!(hci.take_completion(0x0C03).is_none());
}

#[test]
fn test_engine_passes_acl_up() {
    let mut transport = ScriptedTransport::default();
    let acl = AclData {
        handle: 0x0040,
        flags: 0x02,
        channel_id: 0x0004,
        payload: vec![0x1B, 0x03, 0x00, 0x48],
    };
    transport.queue(&acl.to_packet());
    let mut hci = Hci::new(transport);

    assert_eq!(hci.poll().unwrap(), Some(Incoming::Acl(acl)));
    assert_eq!(hci.poll().unwrap(), None);
}

#[test]
fn test_engine_packet_credits() {
    let mut hci = Hci::new(ScriptedTransport::default());
    hci.send_acl(0x0040, 0x0004, &[0x12, 0x03, 0x00, 0x01]).unwrap();
    hci.send_acl(0x0040, 0x0004, &[0x12, 0x03, 0x00, 0x02]).unwrap();
    assert_eq!(hci.pending_packets(), 2);

    let event = HciEvent {
        event_code: EVT_NUM_COMP_PKTS,
        parameters: vec![1, 0x40, 0x00, 0x05, 0x00],
    };
    hci.transport_mut().queue(&event.to_packet());
    assert_eq!(hci.poll().unwrap(), None);
    assert_eq!(hci.pending_packets(), 0);
}

#[test]
fn test_engine_start_drains_stale_bytes() {
    let mut transport = ScriptedTransport::default();
    transport.queue(&[0x04, 0x0E, 0x04, 0x01]);
    let mut hci = Hci::new(transport);

    hci.start().unwrap();
    assert_eq!(hci.transport().rx.len(), 0);

    hci.transport_mut().queue(&command_complete(0x0C03, 0, &[]));
    hci.poll().unwrap();
    assert!(hci.take_completion(0x0C03).is_some());
}

#[test]
fn test_flow_control_timeout() {
    let rts_changes = Arc::new(AtomicUsize::new(0));
    let mut hci = Hci::new(ScriptedTransport::default());
    hci.set_flow_control(Box::new(StuckCts {
        rts_changes: rts_changes.clone(),
    }));

    let err = hci.write_command(&HciCommand::Reset).unwrap_err();
    assert!(matches!(err, HciError::FlowControlTimeout));
    assert!(hci.transport().tx.is_empty());

    // Polling lowers and raises RTS once
    hci.poll().unwrap();
    assert_eq!(rts_changes.load(Ordering::SeqCst), 2);
}
