//! # Player Connection Management
//!
//! Track connected players and the two channels each one talks on.
//!
//! ## Design
//!
//! - A player exists from CONNECT/ACCEPT until disconnect
//! - Indexed by reliable connection, by player id and by bound datagram endpoint
//! - The unreliable endpoint is bound only by a handshake naming the player's
//!   current session

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::error::ProtocolStateError;

/// Transport-assigned identifier of a reliable connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Where a connected player currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Membership {
    /// Connected, not waiting for anything.
    #[default]
    Idle,
    /// Waiting in a quick-match lobby.
    Lobby(u32),
    /// Waiting in a custom room.
    Room(u32),
    /// Playing in a game session.
    Session(u32),
}

/// One connected player.
#[derive(Clone, Debug)]
pub struct PlayerConnection {
    /// Assigned player id.
    pub player_id: u32,
    /// Reliable connection.
    pub connection: ConnectionId,
    /// Datagram endpoint, bound after UDP_HANDSHAKE.
    pub unreliable_peer: Option<SocketAddr>,
    /// Display name.
    pub name: String,
    /// Ship skin.
    pub skin_id: u8,
    /// Lobby, room or session membership.
    pub membership: Membership,
}

impl PlayerConnection {
    /// Current session, if playing.
    #[inline]
    #[must_use]
    pub const fn session_id(&self) -> Option<u32> {
        match self.membership {
            Membership::Session(id) => Some(id),
            _ => None,
        }
    }

    /// Current room, if waiting in one.
    #[inline]
    #[must_use]
    pub const fn room_id(&self) -> Option<u32> {
        match self.membership {
            Membership::Room(id) => Some(id),
            _ => None,
        }
    }
}

/// All connected players.
#[derive(Debug)]
pub struct ConnectionRegistry {
    players: HashMap<u32, PlayerConnection>,
    by_connection: HashMap<ConnectionId, u32>,
    by_datagram: HashMap<SocketAddr, u32>,
    next_player_id: u32,
    max_clients: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry admitting up to `max_clients` players.
    #[must_use]
    pub fn new(max_clients: usize) -> Self {
        Self {
            players: HashMap::with_capacity(max_clients),
            by_connection: HashMap::with_capacity(max_clients),
            by_datagram: HashMap::with_capacity(max_clients),
            next_player_id: 1,
            max_clients,
        }
    }

    /// Connected player count.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// True when nobody is connected.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// True when no further player can be accepted.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_clients
    }

    /// Registers a player for `connection`, returning the new id.
    ///
    /// Returns `None` when the registry is full.
    pub fn register(&mut self, connection: ConnectionId, name: &str) -> Option<u32> {
        if self.is_full() {
            return None;
        }
        let player_id = self.next_player_id;
        self.next_player_id = self.next_player_id.wrapping_add(1).max(1);

        self.players.insert(
            player_id,
            PlayerConnection {
                player_id,
                connection,
                unreliable_peer: None,
                name: name.to_string(),
                skin_id: 0,
                membership: Membership::Idle,
            },
        );
        self.by_connection.insert(connection, player_id);
        Some(player_id)
    }

    /// Removes the player behind `connection`.
    pub fn remove_by_connection(&mut self, connection: ConnectionId) -> Option<PlayerConnection> {
        let player_id = self.by_connection.remove(&connection)?;
        let player = self.players.remove(&player_id)?;
        if let Some(peer) = player.unreliable_peer {
            self.by_datagram.remove(&peer);
        }
        Some(player)
    }

    /// Player by id.
    #[must_use]
    pub fn get(&self, player_id: u32) -> Option<&PlayerConnection> {
        self.players.get(&player_id)
    }

    /// Player by id, mutable.
    pub fn get_mut(&mut self, player_id: u32) -> Option<&mut PlayerConnection> {
        self.players.get_mut(&player_id)
    }

    /// Player id behind a reliable connection.
    #[must_use]
    pub fn player_for_connection(&self, connection: ConnectionId) -> Option<u32> {
        self.by_connection.get(&connection).copied()
    }

    /// Player id bound to a datagram endpoint.
    #[must_use]
    pub fn player_for_datagram(&self, peer: SocketAddr) -> Option<u32> {
        self.by_datagram.get(&peer).copied()
    }

    /// Reliable connection of a player.
    #[must_use]
    pub fn connection_of(&self, player_id: u32) -> Option<ConnectionId> {
        self.players.get(&player_id).map(|p| p.connection)
    }

    /// Reliable connections of `players`, skipping anyone no longer connected.
    #[must_use]
    pub fn connections_of(&self, players: &[u32]) -> Vec<ConnectionId> {
        players
            .iter()
            .filter_map(|id| self.connection_of(*id))
            .collect()
    }

    /// Reliable connections of `players` that have a bound datagram endpoint.
    #[must_use]
    pub fn unreliable_connections_of(&self, players: &[u32]) -> Vec<ConnectionId> {
        players
            .iter()
            .filter_map(|id| self.players.get(id))
            .filter(|p| p.unreliable_peer.is_some())
            .map(|p| p.connection)
            .collect()
    }

    /// Every connected player's connection.
    #[must_use]
    pub fn all_connections(&self) -> Vec<ConnectionId> {
        self.players.values().map(|p| p.connection).collect()
    }

    /// Binds `peer` as the datagram endpoint of `player_id`.
    ///
    /// Fails unless the player is currently in `session_id`.
    pub fn bind_unreliable(
        &mut self,
        player_id: u32,
        session_id: u32,
        peer: SocketAddr,
    ) -> Result<ConnectionId, ProtocolStateError> {
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(ProtocolStateError::UnknownPlayer)?;
        if player.session_id() != Some(session_id) {
            return Err(ProtocolStateError::NotInSession { player_id, session_id });
        }
        if let Some(old) = player.unreliable_peer.replace(peer) {
            self.by_datagram.remove(&old);
        }
        self.by_datagram.insert(peer, player_id);
        Ok(player.connection)
    }

    /// Drops the datagram binding of `player_id`, e.g. when its match ends.
    pub fn unbind_unreliable(&mut self, player_id: u32) {
        if let Some(peer) = self.players.get_mut(&player_id).and_then(|p| p.unreliable_peer.take()) {
            self.by_datagram.remove(&peer);
        }
    }

    /// Sets the membership of every listed player.
    pub fn set_membership(&mut self, players: &[u32], membership: Membership) {
        for id in players {
            if let Some(player) = self.players.get_mut(id) {
                player.membership = membership;
            }
        }
    }

    /// Display name of a player, empty if unknown.
    #[must_use]
    pub fn name_of(&self, player_id: u32) -> &str {
        self.players.get(&player_id).map_or("", |p| p.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_registration_lifecycle() {
        let mut registry = ConnectionRegistry::new(2);
        let a = registry.register(ConnectionId(10), "Alice").unwrap();
        let b = registry.register(ConnectionId(11), "Bob").unwrap();
        assert_eq!((a, b), (1, 2));
        assert!(registry.is_full());
        assert!(registry.register(ConnectionId(12), "Carol").is_none());

        assert_eq!(registry.player_for_connection(ConnectionId(11)), Some(2));
        assert_eq!(registry.name_of(1), "Alice");

        let removed = registry.remove_by_connection(ConnectionId(10)).unwrap();
        assert_eq!(removed.player_id, 1);
        assert!(!registry.is_full());
        assert!(registry.get(1).is_none());
    }

    #[test]
    fn test_bind_requires_session() {
        let mut registry = ConnectionRegistry::new(4);
        let id = registry.register(ConnectionId(1), "Alice").unwrap();

        assert_eq!(
            registry.bind_unreliable(id, 7, addr(5000)),
            Err(ProtocolStateError::NotInSession { player_id: id, session_id: 7 })
        );

        registry.set_membership(&[id], Membership::Session(7));
        assert_eq!(registry.bind_unreliable(id, 7, addr(5000)), Ok(ConnectionId(1)));
        assert_eq!(registry.player_for_datagram(addr(5000)), Some(id));
        assert_eq!(registry.unreliable_connections_of(&[id]), vec![ConnectionId(1)]);

        // Rebinding moves the index.
        registry.bind_unreliable(id, 7, addr(5001)).unwrap();
        assert_eq!(registry.player_for_datagram(addr(5000)), None);
        assert_eq!(registry.player_for_datagram(addr(5001)), Some(id));

        registry.remove_by_connection(ConnectionId(1));
        assert_eq!(registry.player_for_datagram(addr(5001)), None);
    }

    #[test]
    fn test_unknown_player_bind() {
        let mut registry = ConnectionRegistry::new(1);
        assert_eq!(
            registry.bind_unreliable(99, 1, addr(1)),
            Err(ProtocolStateError::UnknownPlayer)
        );
    }
}
