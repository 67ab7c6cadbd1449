//! Connection lifecycle payloads.

use super::{DisconnectReason, RejectReason, WireRecord};
use crate::codec::FixedString;

wire_record! {
    /// CONNECT - client hello. 33 bytes.
    pub struct ClientConnect {
        /// Client build version, must equal [`crate::CLIENT_VERSION`].
        pub client_version: u8,
        /// Requested display name.
        pub player_name: FixedString<32>,
    }
}

wire_record! {
    /// DISCONNECT - graceful leave. 5 bytes.
    pub struct ClientDisconnect {
        /// Leaving player.
        pub player_id: u32,
        /// Why.
        pub reason: DisconnectReason,
    }
}

wire_record! {
    /// PING - latency probe. 8 bytes.
    pub struct ClientPing {
        /// Sender.
        pub player_id: u32,
        /// Client clock in milliseconds, echoed back in PONG.
        pub client_timestamp: u32,
    }
}

wire_record! {
    /// UDP_HANDSHAKE - binds the datagram endpoint it arrives from. 8 bytes.
    pub struct ClientUdpHandshake {
        /// Player id assigned in ACCEPT.
        pub player_id: u32,
        /// Session id from GAME_START.
        pub session_id: u32,
    }
}

wire_record! {
    /// ACCEPT - connection granted. 8 bytes.
    pub struct ServerAccept {
        /// Player id for every later request.
        pub assigned_player_id: u32,
        /// Server simulation rate in Hz.
        pub server_tick_rate: u8,
        /// Players per match.
        pub max_players: u8,
        /// Default map.
        pub map_id: u16,
    }
}

wire_record! {
    /// REJECT - connection refused. 65 bytes.
    pub struct ServerReject {
        /// Reason code.
        pub reason_code: RejectReason,
        /// Human-readable reason.
        pub reason_message: FixedString<64>,
    }
}

wire_record! {
    /// PONG - reply to PING. 8 bytes.
    pub struct ServerPong {
        /// Echo of the client timestamp.
        pub client_timestamp: u32,
        /// Server clock in milliseconds.
        pub server_timestamp: u32,
    }
}

wire_record! {
    /// PLAYER_JOINED - a peer entered the caller's session. 36 bytes.
    pub struct ServerPlayerJoined {
        /// Joining player.
        pub player_id: u32,
        /// Their display name.
        pub player_name: FixedString<32>,
    }
}

wire_record! {
    /// PLAYER_LEFT - a peer left the caller's session. 5 bytes.
    pub struct ServerPlayerLeft {
        /// Leaving player.
        pub player_id: u32,
        /// Why.
        pub reason: DisconnectReason,
    }
}

fixed_payload! {
    ClientConnect => Connect,
    ClientDisconnect => Disconnect,
    ClientPing => Ping,
    ClientUdpHandshake => UdpHandshake,
    ServerAccept => Accept,
    ServerReject => Reject,
    ServerPong => Pong,
    ServerPlayerJoined => PlayerJoined,
    ServerPlayerLeft => PlayerLeft,
}

const _: () = assert!(<ClientConnect as WireRecord>::SIZE == 33);
const _: () = assert!(<ClientDisconnect as WireRecord>::SIZE == 5);
const _: () = assert!(<ClientPing as WireRecord>::SIZE == 8);
const _: () = assert!(<ClientUdpHandshake as WireRecord>::SIZE == 8);
const _: () = assert!(<ServerAccept as WireRecord>::SIZE == 8);
const _: () = assert!(<ServerReject as WireRecord>::SIZE == 65);
const _: () = assert!(<ServerPong as WireRecord>::SIZE == 8);
const _: () = assert!(<ServerPlayerJoined as WireRecord>::SIZE == 36);
const _: () = assert!(<ServerPlayerLeft as WireRecord>::SIZE == 5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::payload::Payload;

    #[test]
    fn test_connect_alice() {
        let connect = ClientConnect {
            client_version: 1,
            player_name: FixedString::new("Alice"),
        };
        let bytes = connect.to_bytes();
        assert_eq!(bytes.len(), 33);
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..6], b"Alice");
        assert!(bytes[6..].iter().all(|&b| b == 0));

        let decoded = ClientConnect::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, connect);
        assert_eq!(decoded.client_version, 1);
        assert_eq!(decoded.player_name.as_str(), "Alice");
    }

    #[test]
    fn test_connect_name_boundaries() {
        for name in ["", "12345678901234567890123456789012"] {
            let connect = ClientConnect {
                client_version: 1,
                player_name: FixedString::new(name),
            };
            let decoded = ClientConnect::from_bytes(&connect.to_bytes()).unwrap();
            assert_eq!(decoded.player_name.as_str(), name);
        }
    }

    #[test]
    fn test_accept_field_order() {
        let accept = ServerAccept {
            assigned_player_id: 0x0102_0304,
            server_tick_rate: 60,
            max_players: 4,
            map_id: 0x0A0B,
        };
        assert_eq!(accept.to_bytes(), vec![1, 2, 3, 4, 60, 4, 0x0A, 0x0B]);
    }

    #[test]
    fn test_invalid_reason_rejected() {
        let err = ClientDisconnect::from_bytes(&[0, 0, 0, 1, 9]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidField {
                field: "reason",
                value: 9
            }
        );
    }

    #[test]
    fn test_wrong_size_rejected() {
        let err = ClientPing::from_bytes(&[0; 7]).unwrap_err();
        assert!(matches!(err, ProtocolError::SizeMismatch { expected: 8, actual: 7, .. }));
    }

    #[test]
    fn test_reject_round_trip() {
        let reject = ServerReject {
            reason_code: RejectReason::VersionMismatch,
            reason_message: FixedString::new("Protocol version mismatch"),
        };
        assert_eq!(ServerReject::from_bytes(&reject.to_bytes()).unwrap(), reject);
    }
}
