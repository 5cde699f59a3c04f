//! IBC events decoded from Cardano block results.

use serde::{Deserialize, Serialize};

use crate::gateway::BlockEvent;

/// Packet data carried by packet events.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketInfo {
    /// The packet sequence.
    pub sequence: u64,
    /// The sending port.
    pub source_port: String,
    /// The sending channel.
    pub source_channel: String,
    /// The receiving port.
    pub destination_port: String,
    /// The receiving channel.
    pub destination_channel: String,
    /// The opaque packet data.
    pub data: Vec<u8>,
    /// The timeout height in `{revision}-{height}` form; `0-0` means no
    /// height timeout.
    pub timeout_height: String,
    /// The timeout timestamp in nanoseconds; zero means no timestamp
    /// timeout.
    pub timeout_timestamp: u64,
    /// The written acknowledgement, for `write_acknowledgement` events.
    pub ack: Option<Vec<u8>>,
}

/// Connection handshake data carried by connection events.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// The connection identifier.
    pub connection_id: String,
    /// The client the connection belongs to.
    pub client_id: String,
    /// The counterparty connection identifier.
    pub counterparty_connection_id: String,
    /// The counterparty client identifier.
    pub counterparty_client_id: String,
}

/// Channel handshake data carried by channel events.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelInfo {
    /// The channel identifier.
    pub channel_id: String,
    /// The port the channel is bound to.
    pub port_id: String,
    /// The counterparty channel identifier.
    pub counterparty_channel_id: String,
    /// The counterparty port identifier.
    pub counterparty_port_id: String,
    /// The connection the channel travels over.
    pub connection_id: String,
    /// The channel version string.
    pub version: String,
}

/// An IBC event the relayer is interested in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CardanoIbcEvent {
    /// A packet was sent from the Cardano chain.
    SendPacket(PacketInfo),
    /// A packet was received on the Cardano chain.
    RecvPacket(PacketInfo),
    /// An acknowledgement was written on the Cardano chain.
    WriteAcknowledgement(PacketInfo),
    /// A connection handshake was initiated.
    ConnectionOpenInit(ConnectionInfo),
    /// A connection handshake was answered.
    ConnectionOpenTry(ConnectionInfo),
    /// A connection handshake was acknowledged.
    ConnectionOpenAck(ConnectionInfo),
    /// A connection handshake was confirmed.
    ConnectionOpenConfirm(ConnectionInfo),
    /// A channel handshake was initiated.
    ChannelOpenInit(ChannelInfo),
    /// A channel handshake was answered.
    ChannelOpenTry(ChannelInfo),
    /// A channel handshake was acknowledged.
    ChannelOpenAck(ChannelInfo),
    /// A channel handshake was confirmed.
    ChannelOpenConfirm(ChannelInfo),
}

/// An event together with the height it was emitted at.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IbcEventWithHeight {
    /// The decoded event.
    pub event: CardanoIbcEvent,
    /// The height of the block containing the event.
    pub height: u64,
}

fn parse_packet_info(event: &BlockEvent) -> Option<PacketInfo> {
    let data = match event.attribute("packet_data_hex") {
        Some(data_hex) => decode_hex(data_hex)?,
        None => event
            .attribute("packet_data")
            .map(|data| data.as_bytes().to_vec())
            .unwrap_or_default(),
    };
    let ack = match event.attribute("packet_ack_hex") {
        Some(ack_hex) => Some(decode_hex(ack_hex)?),
        None => event
            .attribute("packet_ack")
            .map(|ack| ack.as_bytes().to_vec()),
    };

    Some(PacketInfo {
        sequence: event.attribute("packet_sequence")?.parse().ok()?,
        source_port: event.attribute("packet_src_port")?.to_string(),
        source_channel: event.attribute("packet_src_channel")?.to_string(),
        destination_port: event.attribute("packet_dst_port")?.to_string(),
        destination_channel: event.attribute("packet_dst_channel")?.to_string(),
        data,
        timeout_height: event
            .attribute("packet_timeout_height")
            .unwrap_or("0-0")
            .to_string(),
        timeout_timestamp: event
            .attribute("packet_timeout_timestamp")
            .and_then(|timestamp| timestamp.parse().ok())
            .unwrap_or_default(),
        ack,
    })
}

fn parse_connection_info(event: &BlockEvent) -> Option<ConnectionInfo> {
    Some(ConnectionInfo {
        connection_id: event.attribute("connection_id")?.to_string(),
        client_id: event.attribute("client_id").unwrap_or_default().to_string(),
        counterparty_connection_id: event
            .attribute("counterparty_connection_id")
            .unwrap_or_default()
            .to_string(),
        counterparty_client_id: event
            .attribute("counterparty_client_id")
            .unwrap_or_default()
            .to_string(),
    })
}

fn parse_channel_info(event: &BlockEvent) -> Option<ChannelInfo> {
    Some(ChannelInfo {
        channel_id: event.attribute("channel_id")?.to_string(),
        port_id: event.attribute("port_id")?.to_string(),
        counterparty_channel_id: event
            .attribute("counterparty_channel_id")
            .unwrap_or_default()
            .to_string(),
        counterparty_port_id: event
            .attribute("counterparty_port_id")
            .unwrap_or_default()
            .to_string(),
        connection_id: event
            .attribute("connection_id")
            .unwrap_or_default()
            .to_string(),
        version: event.attribute("version").unwrap_or_default().to_string(),
    })
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    hex::decode(value).ok()
}

/// Decodes one block event into an IBC event, when it is one the relayer
/// handles.
#[must_use]
pub fn parse_ibc_event(event: &BlockEvent) -> Option<CardanoIbcEvent> {
    match event.kind.as_str() {
        "send_packet" => parse_packet_info(event).map(CardanoIbcEvent::SendPacket),
        "recv_packet" => parse_packet_info(event).map(CardanoIbcEvent::RecvPacket),
        "write_acknowledgement" => {
            parse_packet_info(event).map(CardanoIbcEvent::WriteAcknowledgement)
        }
        "connection_open_init" => {
            parse_connection_info(event).map(CardanoIbcEvent::ConnectionOpenInit)
        }
        "connection_open_try" => {
            parse_connection_info(event).map(CardanoIbcEvent::ConnectionOpenTry)
        }
        "connection_open_ack" => {
            parse_connection_info(event).map(CardanoIbcEvent::ConnectionOpenAck)
        }
        "connection_open_confirm" => {
            parse_connection_info(event).map(CardanoIbcEvent::ConnectionOpenConfirm)
        }
        "channel_open_init" => parse_channel_info(event).map(CardanoIbcEvent::ChannelOpenInit),
        "channel_open_try" => parse_channel_info(event).map(CardanoIbcEvent::ChannelOpenTry),
        "channel_open_ack" => parse_channel_info(event).map(CardanoIbcEvent::ChannelOpenAck),
        "channel_open_confirm" => {
            parse_channel_info(event).map(CardanoIbcEvent::ChannelOpenConfirm)
        }
        _ => None,
    }
}

/// Decodes the IBC events of one transaction, preserving event order.
#[must_use]
pub fn parse_ibc_events_from_tx(events: &[BlockEvent], height: u64) -> Vec<IbcEventWithHeight> {
    events
        .iter()
        .filter_map(parse_ibc_event)
        .map(|event| IbcEventWithHeight { event, height })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_ibc_event, parse_ibc_events_from_tx, CardanoIbcEvent};
    use crate::gateway::{BlockEvent, EventAttribute};

    fn attribute(key: &str, value: &str) -> EventAttribute {
        EventAttribute {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn send_packet_event(sequence: u64) -> BlockEvent {
        BlockEvent {
            kind: "send_packet".to_string(),
            attributes: vec![
                attribute("packet_sequence", &sequence.to_string()),
                attribute("packet_src_port", "transfer"),
                attribute("packet_src_channel", "channel-0"),
                attribute("packet_dst_port", "transfer"),
                attribute("packet_dst_channel", "channel-14"),
                attribute("packet_data_hex", "010203"),
                attribute("packet_timeout_height", "0-400000"),
                attribute("packet_timeout_timestamp", "1707126294000000000"),
            ],
        }
    }

    #[test]
    fn test_parse_send_packet() {
        let event = parse_ibc_event(&send_packet_event(7)).unwrap();
        let CardanoIbcEvent::SendPacket(packet) = event else {
            panic!("expected a send packet event");
        };

        assert_eq!(packet.sequence, 7);
        assert_eq!(packet.source_channel, "channel-0");
        assert_eq!(packet.destination_channel, "channel-14");
        assert_eq!(packet.data, vec![0x01, 0x02, 0x03]);
        assert_eq!(packet.timeout_height, "0-400000");
        assert_eq!(packet.timeout_timestamp, 1_707_126_294_000_000_000);
        assert!(packet.ack.is_none());
    }

    #[test]
    fn test_parse_connection_and_channel_events() {
        let event = BlockEvent {
            kind: "connection_open_ack".to_string(),
            attributes: vec![
                attribute("connection_id", "connection-0"),
                attribute("client_id", "ibc_client-1"),
                attribute("counterparty_connection_id", "connection-9"),
                attribute("counterparty_client_id", "07-tendermint-3"),
            ],
        };
        let CardanoIbcEvent::ConnectionOpenAck(connection) = parse_ibc_event(&event).unwrap()
        else {
            panic!("expected a connection event");
        };
        assert_eq!(connection.connection_id, "connection-0");
        assert_eq!(connection.counterparty_client_id, "07-tendermint-3");

        let event = BlockEvent {
            kind: "channel_open_init".to_string(),
            attributes: vec![
                attribute("channel_id", "channel-0"),
                attribute("port_id", "transfer"),
                attribute("connection_id", "connection-0"),
                attribute("version", "ics20-1"),
            ],
        };
        let CardanoIbcEvent::ChannelOpenInit(channel) = parse_ibc_event(&event).unwrap() else {
            panic!("expected a channel event");
        };
        assert_eq!(channel.channel_id, "channel-0");
        assert_eq!(channel.connection_id, "connection-0");
    }

    #[test]
    fn test_unknown_and_malformed_events_are_skipped() {
        let unknown = BlockEvent {
            kind: "coin_spent".to_string(),
            attributes: vec![],
        };
        assert!(parse_ibc_event(&unknown).is_none());

        let malformed = BlockEvent {
            kind: "send_packet".to_string(),
            attributes: vec![attribute("packet_sequence", "not-a-number")],
        };
        assert!(parse_ibc_event(&malformed).is_none());
    }

    #[test]
    fn test_tx_event_order_is_preserved() {
        let events = vec![
            send_packet_event(1),
            BlockEvent {
                kind: "coin_spent".to_string(),
                attributes: vec![],
            },
            send_packet_event(2),
        ];

        let parsed = parse_ibc_events_from_tx(&events, 42);
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|event| event.height == 42));

        let sequences: Vec<u64> = parsed
            .iter()
            .map(|event| match &event.event {
                CardanoIbcEvent::SendPacket(packet) => packet.sequence,
                _ => panic!("expected send packet events"),
            })
            .collect();
        assert_eq!(sequences, vec![1, 2]);
    }
}
