//! Admin payloads.

use super::{AdminCommandKind, PasswordHash, WireRecord};
use crate::codec::FixedString;

wire_record! {
    /// ADMIN_AUTH. 96 bytes.
    pub struct ClientAdminAuth {
        /// Admin login.
        pub username: FixedString<32>,
        /// Password hash compared against the configured one.
        pub password_hash: PasswordHash,
    }
}

wire_record! {
    /// ADMIN_COMMAND. 69 bytes.
    pub struct ClientAdminCommand {
        /// Verb.
        pub command: AdminCommandKind,
        /// Target player, 0 when unused.
        pub target_player_id: u32,
        /// Free-form argument (kick reason, broadcast text).
        pub argument: FixedString<64>,
    }
}

wire_record! {
    /// ADMIN_AUTH_RESULT. 65 bytes.
    pub struct AdminAuthResult {
        /// 1 on success.
        pub success: u8,
        /// Detail.
        pub message: FixedString<64>,
    }
}

wire_record! {
    /// ADMIN_COMMAND_RESULT. 65 bytes.
    pub struct AdminCommandResult {
        /// 1 on success.
        pub success: u8,
        /// Detail.
        pub message: FixedString<64>,
    }
}

wire_record! {
    /// ADMIN_NOTIFICATION. 64 bytes.
    pub struct AdminNotification {
        /// Text.
        pub message: FixedString<64>,
    }
}

wire_record! {
    /// KICK_NOTIFICATION. 64 bytes.
    pub struct KickNotification {
        /// Reason shown to the kicked player.
        pub reason: FixedString<64>,
    }
}

fixed_payload! {
    ClientAdminAuth => AdminAuth,
    ClientAdminCommand => AdminCommand,
    AdminAuthResult => AdminAuthResult,
    AdminCommandResult => AdminCommandResult,
    AdminNotification => AdminNotification,
    KickNotification => KickNotification,
}

const _: () = assert!(<ClientAdminAuth as WireRecord>::SIZE == 96);
const _: () = assert!(<ClientAdminCommand as WireRecord>::SIZE == 69);
const _: () = assert!(<AdminAuthResult as WireRecord>::SIZE == 65);
const _: () = assert!(<AdminCommandResult as WireRecord>::SIZE == 65);
const _: () = assert!(<AdminNotification as WireRecord>::SIZE == 64);
const _: () = assert!(<KickNotification as WireRecord>::SIZE == 64);
