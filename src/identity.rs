//! Guest identity store: guest creation, token lookup, and username
//! claiming with uniqueness enforcement.

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::game::GameError;
use crate::storage::Storage;

/// A player's durable identity, independent of any particular socket
/// connection. Persists across reconnects keyed by `token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guest {
    pub id: Uuid,
    pub display_name: String,
    pub username: Option<String>,
    pub token: String,
    pub created_at: i64,
}

fn random_token() -> String {
    rand::rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect()
}

fn random_guest_name() -> String {
    let suffix: String = rand::rng().sample_iter(&Alphanumeric).take(4).map(char::from).collect();
    format!("Guest-{}", suffix.to_uppercase())
}

/// In-memory guest registry, backed by `Storage` for persistence across
/// restarts. Mirrors the manager-plus-storage shape used elsewhere in this
/// crate: the map is the hot path, storage is the durability layer.
#[derive(Debug, Default)]
pub struct IdentityStore {
    by_id: HashMap<Uuid, Guest>,
    by_token: HashMap<String, Uuid>,
    by_username: HashMap<String, Uuid>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the in-memory indexes from whatever guests `Storage` has
    /// recorded on disk. Call once at startup.
    pub fn restore(&mut self, storage: &Storage) -> Result<(), GameError> {
        for guest in storage.load_all_guests().map_err(GameError::Internal)? {
            self.index(guest);
        }
        Ok(())
    }

    fn index(&mut self, guest: Guest) {
        self.by_token.insert(guest.token.clone(), guest.id);
        if let Some(username) = &guest.username {
            self.by_username.insert(username.to_lowercase(), guest.id);
        }
        self.by_id.insert(guest.id, guest);
    }

    pub fn create_guest(&mut self, storage: &Storage, created_at: i64) -> Result<Guest, GameError> {
        let guest = Guest {
            id: Uuid::new_v4(),
            display_name: random_guest_name(),
            username: None,
            token: random_token(),
            created_at,
        };
        storage.save_guest(&guest).map_err(GameError::Internal)?;
        self.index(guest.clone());
        Ok(guest)
    }

    pub fn lookup_by_token(&self, token: &str) -> Option<Guest> {
        self.by_token.get(token).and_then(|id| self.by_id.get(id)).cloned()
    }

    pub fn lookup_by_id(&self, id: Uuid) -> Option<Guest> {
        self.by_id.get(&id).cloned()
    }

    /// Claims `requested` as this guest's username, enforcing a 3–20
    /// character printable name and global uniqueness.
    pub fn claim_username(
        &mut self,
        storage: &Storage,
        id: Uuid,
        requested: &str,
    ) -> Result<Guest, GameError> {
        let trimmed = requested.trim();
        if trimmed.chars().count() < 3 || trimmed.chars().count() > 20 {
            return Err(GameError::Validation("username must be 3-20 characters".into()));
        }
        if !trimmed.chars().all(|c| c.is_ascii_graphic()) {
            return Err(GameError::Validation("username must be printable ASCII".into()));
        }

        let key = trimmed.to_lowercase();
        if let Some(&holder) = self.by_username.get(&key) {
            if holder != id {
                return Err(GameError::Validation("username already taken".into()));
            }
        }

        let guest = self.by_id.get_mut(&id).ok_or_else(|| GameError::NotFound("guest not found".into()))?;
        if let Some(old) = &guest.username {
            self.by_username.remove(&old.to_lowercase());
        }
        guest.username = Some(trimmed.to_string());
        let updated = guest.clone();

        self.by_username.insert(key, id);
        storage.save_guest(&updated).map_err(GameError::Internal)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (IdentityStore, Storage) {
        let dir = tempdir().unwrap();
        (IdentityStore::new(), Storage::new(dir.keep()).unwrap())
    }

    #[test]
    fn create_guest_assigns_token_and_display_name() {
        let (mut ids, storage) = store();
        let guest = ids.create_guest(&storage, 0).unwrap();
        assert!(guest.display_name.starts_with("Guest-"));
        assert_eq!(ids.lookup_by_token(&guest.token).unwrap().id, guest.id);
    }

    #[test]
    fn claim_username_rejects_duplicates() {
        let (mut ids, storage) = store();
        let a = ids.create_guest(&storage, 0).unwrap();
        let b = ids.create_guest(&storage, 0).unwrap();
        ids.claim_username(&storage, a.id, "Nardy").unwrap();
        let err = ids.claim_username(&storage, b.id, "nardy").unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[test]
    fn claim_username_rejects_too_short() {
        let (mut ids, storage) = store();
        let a = ids.create_guest(&storage, 0).unwrap();
        let err = ids.claim_username(&storage, a.id, "ab").unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }
}
