//! Room registry and matchmaking queue (components G and H).
//!
//! A room holds exactly two seats, Gold and Red, plus the `Game` they are
//! playing. This is a much smaller concurrency surface than the teacher's
//! "broadcaster fans out to N subscribers of one game" pattern — every
//! room has precisely the two sockets bound to its seats, so this module
//! addresses peers directly instead of through a pub/sub actor.

use rand::Rng;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use crate::game::{Game, GameError};

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ROOM_CODE_LEN: usize = 5;

fn random_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// A socket bound to a specific guest identity, in a specific seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConnection {
    pub socket_id: String,
    pub player_id: Uuid,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Gold,
    Red,
}

/// A room in play (or waiting for a second player). `disconnect_deadline`
/// is an advisory unix timestamp after which an empty room becomes
/// eligible for garbage collection — it never forces a forfeit.
#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub gold: Option<PlayerConnection>,
    pub red: Option<PlayerConnection>,
    pub game: Game,
    pub created_at: i64,
    pub disconnect_deadline: Option<i64>,
}

impl Room {
    pub fn is_full(&self) -> bool {
        self.gold.is_some() && self.red.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.gold.is_none() && self.red.is_none()
    }

    pub fn seat(&self, role: Role) -> Option<&PlayerConnection> {
        match role {
            Role::Gold => self.gold.as_ref(),
            Role::Red => self.red.as_ref(),
        }
    }

    pub fn opponent_of(&self, role: Role) -> Option<&PlayerConnection> {
        match role {
            Role::Gold => self.red.as_ref(),
            Role::Red => self.gold.as_ref(),
        }
    }
}

/// Registry of all live rooms, keyed by room code.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub fn create(&mut self, gold: PlayerConnection, match_length: u32, created_at: i64) -> String {
        let mut id = random_room_code();
        while self.rooms.contains_key(&id) {
            id = random_room_code();
        }
        let room = Room {
            id: id.clone(),
            gold: Some(gold),
            red: None,
            game: Game::new(match_length, created_at),
            created_at,
            disconnect_deadline: None,
        };
        self.rooms.insert(id.clone(), room);
        id
    }

    pub fn join(&mut self, room_id: &str, red: PlayerConnection) -> Result<(), GameError> {
        let room = self.rooms.get_mut(room_id).ok_or_else(|| GameError::NotFound("room not found".into()))?;
        if room.is_full() {
            return Err(GameError::Validation("room is full".into()));
        }
        if let Some(gold) = &room.gold {
            if gold.player_id == red.player_id {
                return Err(GameError::Validation("cannot join your own room".into()));
            }
        }
        room.red = Some(red);
        Ok(())
    }

    pub fn find_by_socket_id(&self, socket_id: &str) -> Option<&Room> {
        self.rooms.values().find(|r| {
            r.gold.as_ref().is_some_and(|c| c.socket_id == socket_id)
                || r.red.as_ref().is_some_and(|c| c.socket_id == socket_id)
        })
    }

    pub fn role_of(&self, room_id: &str, socket_id: &str) -> Option<Role> {
        let room = self.rooms.get(room_id)?;
        if room.gold.as_ref().is_some_and(|c| c.socket_id == socket_id) {
            Some(Role::Gold)
        } else if room.red.as_ref().is_some_and(|c| c.socket_id == socket_id) {
            Some(Role::Red)
        } else {
            None
        }
    }

    pub fn role_of_player(&self, room_id: &str, player_id: Uuid) -> Option<Role> {
        let room = self.rooms.get(room_id)?;
        if room.gold.as_ref().is_some_and(|c| c.player_id == player_id) {
            Some(Role::Gold)
        } else if room.red.as_ref().is_some_and(|c| c.player_id == player_id) {
            Some(Role::Red)
        } else {
            None
        }
    }

    /// Clears the leaving socket's seat; deletes the room entirely once
    /// both seats are empty.
    pub fn leave(&mut self, room_id: &str, socket_id: &str) {
        let Some(room) = self.rooms.get_mut(room_id) else { return };
        if room.gold.as_ref().is_some_and(|c| c.socket_id == socket_id) {
            room.gold = None;
        }
        if room.red.as_ref().is_some_and(|c| c.socket_id == socket_id) {
            room.red = None;
        }
        if room.is_empty() {
            self.rooms.remove(room_id);
        }
    }

    /// Rebinds a reconnecting player's seat to their new socket without
    /// changing which seat (Gold/Red) they occupy.
    pub fn rebind(&mut self, room_id: &str, player_id: Uuid, new_socket_id: String) -> Result<Role, GameError> {
        let room = self.rooms.get_mut(room_id).ok_or_else(|| GameError::NotFound("room not found".into()))?;
        if let Some(gold) = &mut room.gold {
            if gold.player_id == player_id {
                gold.socket_id = new_socket_id;
                room.disconnect_deadline = None;
                return Ok(Role::Gold);
            }
        }
        if let Some(red) = &mut room.red {
            if red.player_id == player_id {
                red.socket_id = new_socket_id;
                room.disconnect_deadline = None;
                return Ok(Role::Red);
            }
        }
        Err(GameError::Authz("player is not seated in this room".into()))
    }

    pub fn waiting_rooms(&self) -> Vec<&Room> {
        self.rooms.values().filter(|r| !r.is_full() && !r.is_empty()).collect()
    }

    pub fn remove(&mut self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    /// Marks a room as having a disconnected seat, due for cleanup after
    /// `deadline`. Never forfeits the game — a reconnect via `rebind`
    /// clears the deadline again.
    pub fn mark_disconnected(&mut self, room_id: &str, deadline: i64) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.disconnect_deadline = Some(deadline);
        }
    }

    /// Removes rooms whose disconnect grace period has elapsed. Intended
    /// to be called periodically; returns the ids removed.
    pub fn sweep_expired(&mut self, now: i64) -> Vec<String> {
        let expired: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, r)| r.disconnect_deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.rooms.remove(id);
        }
        expired
    }
}

/// FIFO matchmaking queue for `quick-match`.
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    queue: VecDeque<PlayerConnection>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, conn: PlayerConnection) {
        if !self.queue.iter().any(|c| c.player_id == conn.player_id) {
            self.queue.push_back(conn);
        }
    }

    pub fn leave_by_player_id(&mut self, player_id: Uuid) {
        self.queue.retain(|c| c.player_id != player_id);
    }

    pub fn leave_by_socket_id(&mut self, socket_id: &str) {
        self.queue.retain(|c| c.socket_id != socket_id);
    }

    /// Pops the two longest-waiting players, if at least two are queued.
    pub fn try_match(&mut self) -> Option<(PlayerConnection, PlayerConnection)> {
        if self.queue.len() < 2 {
            return None;
        }
        let a = self.queue.pop_front().unwrap();
        let b = self.queue.pop_front().unwrap();
        Some((a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(name: &str) -> PlayerConnection {
        PlayerConnection { socket_id: format!("sock-{name}"), player_id: Uuid::new_v4(), display_name: name.into() }
    }

    #[test]
    fn create_then_join_fills_both_seats() {
        let mut registry = RoomRegistry::new();
        let gold = conn("gold");
        let room_id = registry.create(gold.clone(), 1, 0);
        registry.join(&room_id, conn("red")).unwrap();
        assert!(registry.get(&room_id).unwrap().is_full());
    }

    #[test]
    fn join_own_room_is_rejected() {
        let mut registry = RoomRegistry::new();
        let gold = conn("gold");
        let room_id = registry.create(gold.clone(), 1, 0);
        let err = registry.join(&room_id, gold).unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[test]
    fn leave_empties_room_and_removes_it() {
        let mut registry = RoomRegistry::new();
        let gold = conn("gold");
        let room_id = registry.create(gold.clone(), 1, 0);
        registry.leave(&room_id, &gold.socket_id);
        assert!(registry.get(&room_id).is_none());
    }

    #[test]
    fn rebind_preserves_role_across_new_socket() {
        let mut registry = RoomRegistry::new();
        let gold = conn("gold");
        let player_id = gold.player_id;
        let room_id = registry.create(gold, 1, 0);
        let role = registry.rebind(&room_id, player_id, "sock-new".into()).unwrap();
        assert_eq!(role, Role::Gold);
        assert_eq!(registry.get(&room_id).unwrap().gold.as_ref().unwrap().socket_id, "sock-new");
    }

    #[test]
    fn matchmaking_queue_is_fifo() {
        let mut queue = MatchmakingQueue::new();
        queue.join(conn("a"));
        queue.join(conn("b"));
        let (first, second) = queue.try_match().unwrap();
        assert_eq!(first.display_name, "a");
        assert_eq!(second.display_name, "b");
    }
}
