//! Persistent storage for guests and completed matches.
//!
//! # Storage strategy
//!
//! Unlike a binary archive format tuned for a single record type, this
//! service persists two independent streams:
//!
//! - **Guests** (component F): one small JSON file per guest under
//!   `guests/`, written atomically (temp file + rename) exactly like the
//!   teacher's active-game saves, since guests are mutated in place
//!   (username claims) and looked up individually.
//! - **Matches** (component J): an append-only `matches.jsonl`, one JSON
//!   object per line per completed match. Matches are never updated after
//!   being written, so a plain append is both simpler and cheaper than a
//!   rewrite-whole-file approach.
//!
//! Both map onto the relational shape `guests(...)` / `matches(...)`
//! described by the wire protocol; this is the "or equivalent" file-backed
//! implementation of that schema.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::identity::Guest;
use crate::types::{Color, WinType};

/// A completed match, written once at `GAME_OVER` and never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: Uuid,
    pub gold_player_id: Uuid,
    pub red_player_id: Uuid,
    pub winner_id: Option<Uuid>,
    pub win_type: Option<WinType>,
    pub points_won: Option<u32>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Default, Serialize)]
pub struct StorageStats {
    pub guest_count: usize,
    pub match_count: usize,
}

/// A single row of the read-only roster projection (component K).
#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub username: String,
    pub created_at: i64,
    pub wins: u32,
    pub losses: u32,
}

pub fn unix_timestamp() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

#[derive(Debug, Clone)]
pub struct Storage {
    guests_dir: PathBuf,
    matches_path: PathBuf,
}

impl Storage {
    pub fn new(base_dir: impl AsRef<Path>) -> io::Result<Self> {
        let base_dir = base_dir.as_ref();
        let guests_dir = base_dir.join("guests");
        fs::create_dir_all(&guests_dir)?;

        let matches_path = base_dir.join("matches.jsonl");
        if !matches_path.exists() {
            fs::write(&matches_path, b"")?;
        }

        Ok(Storage { guests_dir, matches_path })
    }

    fn guest_path(&self, id: Uuid) -> PathBuf {
        self.guests_dir.join(format!("{id}.json"))
    }

    /// Writes a guest atomically: serialize to a temp file, then rename
    /// over the real path so a crash never leaves a half-written guest.
    pub fn save_guest(&self, guest: &Guest) -> Result<(), String> {
        let data = serde_json::to_vec_pretty(guest).map_err(|e| format!("failed to serialize guest: {e}"))?;
        let path = self.guest_path(guest.id);
        let temp_path = self.guests_dir.join(format!("{}.json.tmp", guest.id));

        fs::write(&temp_path, &data).map_err(|e| format!("failed to write temp file: {e}"))?;
        fs::rename(&temp_path, &path).map_err(|e| format!("failed to rename temp file: {e}"))?;
        Ok(())
    }

    pub fn load_all_guests(&self) -> Result<Vec<Guest>, String> {
        let entries = fs::read_dir(&self.guests_dir).map_err(|e| format!("failed to read guests dir: {e}"))?;
        let mut guests = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("failed to read dir entry: {e}"))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = fs::read_to_string(&path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
            let guest: Guest = serde_json::from_str(&data).map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
            guests.push(guest);
        }
        Ok(guests)
    }

    /// Appends one match record as a single JSON line. Best-effort: a
    /// write failure here must never prevent the `game-over` broadcast
    /// that already happened; callers log and move on.
    pub fn append_match(&self, record: &MatchRecord) -> Result<(), String> {
        let mut line = serde_json::to_string(record).map_err(|e| format!("failed to serialize match: {e}"))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.matches_path)
            .map_err(|e| format!("failed to open matches log: {e}"))?;
        file.write_all(line.as_bytes()).map_err(|e| format!("failed to append match: {e}"))?;
        Ok(())
    }

    pub fn load_all_matches(&self) -> Result<Vec<MatchRecord>, String> {
        let data = fs::read_to_string(&self.matches_path).map_err(|e| format!("failed to read matches log: {e}"))?;
        data.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| format!("failed to parse match line: {e}")))
            .collect()
    }

    pub fn stats(&self) -> Result<StorageStats, String> {
        Ok(StorageStats {
            guest_count: self.load_all_guests()?.len(),
            match_count: self.load_all_matches()?.len(),
        })
    }
}

/// Builds the read-only roster projection: one row per guest with a
/// claimed username, joined against their win/loss record in `matches`.
pub fn roster(guests: &[Guest], matches: &[MatchRecord]) -> Vec<RosterEntry> {
    let mut entries: Vec<RosterEntry> = guests
        .iter()
        .filter_map(|g| {
            let username = g.username.clone()?;
            let (wins, losses) = matches.iter().fold((0u32, 0u32), |(w, l), m| {
                let played_gold = m.gold_player_id == g.id;
                let played_red = m.red_player_id == g.id;
                if !played_gold && !played_red {
                    return (w, l);
                }
                let winner_color = match m.winner_id {
                    Some(id) if id == m.gold_player_id => Some(Color::Gold),
                    Some(id) if id == m.red_player_id => Some(Color::Red),
                    _ => None,
                };
                match winner_color {
                    Some(Color::Gold) if played_gold => (w + 1, l),
                    Some(Color::Red) if played_red => (w + 1, l),
                    Some(_) => (w, l + 1),
                    None => (w, l),
                }
            });
            Some(RosterEntry { username, created_at: g.created_at, wins, losses })
        })
        .collect();

    entries.sort_by(|a, b| b.wins.cmp(&a.wins).then(a.username.cmp(&b.username)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest(id: Uuid, username: Option<&str>) -> Guest {
        Guest {
            id,
            display_name: "Guest-TEST".into(),
            username: username.map(str::to_string),
            token: "tok".into(),
            created_at: 0,
        }
    }

    fn store() -> Storage {
        let dir = tempfile::tempdir().unwrap();
        Storage::new(dir.keep()).unwrap()
    }

    #[test]
    fn save_and_load_guest_round_trips() {
        let storage = store();
        let g = guest(Uuid::new_v4(), Some("nardy"));
        storage.save_guest(&g).unwrap();
        let loaded = storage.load_all_guests().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].username.as_deref(), Some("nardy"));
    }

    #[test]
    fn append_match_is_additive() {
        let storage = store();
        let record = MatchRecord {
            id: Uuid::new_v4(),
            gold_player_id: Uuid::new_v4(),
            red_player_id: Uuid::new_v4(),
            winner_id: None,
            win_type: None,
            points_won: None,
            created_at: 0,
            completed_at: None,
        };
        storage.append_match(&record).unwrap();
        storage.append_match(&record).unwrap();
        assert_eq!(storage.load_all_matches().unwrap().len(), 2);
    }

    #[test]
    fn roster_counts_wins_and_losses_for_both_seats() {
        let gold = Uuid::new_v4();
        let red = Uuid::new_v4();
        let guests = vec![guest(gold, Some("alice")), guest(red, Some("bob"))];
        let matches = vec![MatchRecord {
            id: Uuid::new_v4(),
            gold_player_id: gold,
            red_player_id: red,
            winner_id: Some(gold),
            win_type: Some(WinType::YaMon),
            points_won: Some(1),
            created_at: 0,
            completed_at: Some(1),
        }];
        let rows = roster(&guests, &matches);
        let alice = rows.iter().find(|r| r.username == "alice").unwrap();
        let bob = rows.iter().find(|r| r.username == "bob").unwrap();
        assert_eq!((alice.wins, alice.losses), (1, 0));
        assert_eq!((bob.wins, bob.losses), (0, 1));
    }
}
