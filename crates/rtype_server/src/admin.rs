//! Admin login and command authorization.
//!
//! Admin support is off unless a password hash is configured. A player
//! becomes an admin for the life of its connection after a successful
//! ADMIN_AUTH.

use std::collections::HashSet;

use rtype_protocol::{
    AdminAuthResult, AdminCommandKind, ClientAdminAuth, ClientAdminCommand, FixedString, PasswordHash,
};

use crate::error::ProtocolStateError;

/// What an authorized command asks the server to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminAction {
    /// Notify `target` with `reason`, then disconnect it.
    Kick {
        /// Player to remove.
        target: u32,
        /// Text for KICK_NOTIFICATION.
        reason: FixedString<64>,
    },
    /// Send `message` to every connected player.
    Broadcast {
        /// Text for ADMIN_NOTIFICATION.
        message: FixedString<64>,
    },
}

/// Tracks which players are authenticated admins.
#[derive(Debug, Clone, Default)]
pub struct AdminService {
    password_hash: Option<PasswordHash>,
    admins: HashSet<u32>,
}

impl AdminService {
    /// Creates the service; `None` disables admin login.
    #[must_use]
    pub fn new(password_hash: Option<&str>) -> Self {
        Self {
            password_hash: password_hash.map(PasswordHash::new),
            admins: HashSet::new(),
        }
    }

    /// True when a password hash is configured.
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.password_hash.is_some()
    }

    /// True if `player_id` has authenticated.
    #[must_use]
    pub fn is_admin(&self, player_id: u32) -> bool {
        self.admins.contains(&player_id)
    }

    /// Checks an ADMIN_AUTH request and answers it.
    pub fn authenticate(&mut self, player_id: u32, request: &ClientAdminAuth) -> AdminAuthResult {
        let accepted = self
            .password_hash
            .as_ref()
            .is_some_and(|hash| !hash.is_empty() && hash == &request.password_hash);

        let message = if accepted {
            self.admins.insert(player_id);
            tracing::info!(
                "Player {} authenticated as admin '{}'",
                player_id,
                request.username.as_str()
            );
            "authenticated"
        } else if self.is_enabled() {
            tracing::warn!("Player {} failed admin authentication", player_id);
            "invalid credentials"
        } else {
            "admin access disabled"
        };

        AdminAuthResult {
            success: u8::from(accepted),
            message: FixedString::new(message),
        }
    }

    /// Authorizes an ADMIN_COMMAND.
    pub fn authorize(&self, player_id: u32, command: &ClientAdminCommand) -> Result<AdminAction, ProtocolStateError> {
        if !self.is_admin(player_id) {
            return Err(ProtocolStateError::NotAdmin(player_id));
        }
        Ok(match command.command {
            AdminCommandKind::Kick => AdminAction::Kick {
                target: command.target_player_id,
                reason: command.argument,
            },
            AdminCommandKind::Broadcast => AdminAction::Broadcast {
                message: command.argument,
            },
        })
    }

    /// Forgets a player's admin rights, e.g. on disconnect.
    pub fn revoke(&mut self, player_id: u32) {
        self.admins.remove(&player_id);
    }
}
