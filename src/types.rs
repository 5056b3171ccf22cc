//! Core types for the bearoff backgammon engine.
//!
//! This module defines the fundamental data structures used throughout the
//! rules engine: board representation, dice, the doubling cube, match
//! score, phases, and the wire-facing DTOs exchanged with clients.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// The two sides of a backgammon match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Gold,
    Red,
}

impl Color {
    /// Returns the opposing side.
    pub fn opponent(self) -> Color {
        match self {
            Color::Gold => Color::Red,
            Color::Red => Color::Gold,
        }
    }

    /// Direction of travel along point indices: +1 for Gold, -1 for Red.
    pub fn direction(self) -> i8 {
        match self {
            Color::Gold => 1,
            Color::Red => -1,
        }
    }

    /// Home board range (inclusive) this side bears off from.
    pub fn home_range(self) -> std::ops::RangeInclusive<u8> {
        match self {
            Color::Gold => 18..=23,
            Color::Red => 0..=5,
        }
    }

    /// Index an entering piece lands on from the bar with the given die.
    pub fn bar_entry_index(self, die: u8) -> u8 {
        match self {
            Color::Gold => die - 1,
            Color::Red => 24 - die,
        }
    }

    /// The die value that would bear a piece at `index` off exactly.
    pub fn exact_bear_off_die(self, index: u8) -> u8 {
        match self {
            Color::Gold => 24 - index,
            Color::Red => index + 1,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Gold => write!(f, "gold"),
            Color::Red => write!(f, "red"),
        }
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// A single occupied point: owner plus checker count. `count` is always
/// >= 1 when present; empty points are represented as `None` in `Board::points`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointStack {
    pub owner: Color,
    pub count: u8,
}

/// The 24-point backgammon board plus bar and borne-off counters for both
/// sides. Invariant: for each side, the sum of owned point counts, the bar
/// count, and the borne-off count equals 15.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    pub points: [Option<PointStack>; 24],
    pub bar: [u8; 2],
    pub borne_off: [u8; 2],
}

fn side_index(color: Color) -> usize {
    match color {
        Color::Gold => 0,
        Color::Red => 1,
    }
}

impl Board {
    /// The canonical backgammon starting position.
    pub fn starting_position() -> Board {
        let mut points: [Option<PointStack>; 24] = [None; 24];
        points[0] = Some(PointStack { owner: Color::Gold, count: 2 });
        points[5] = Some(PointStack { owner: Color::Red, count: 5 });
        points[7] = Some(PointStack { owner: Color::Red, count: 3 });
        points[11] = Some(PointStack { owner: Color::Gold, count: 5 });
        points[12] = Some(PointStack { owner: Color::Red, count: 5 });
        points[16] = Some(PointStack { owner: Color::Gold, count: 3 });
        points[18] = Some(PointStack { owner: Color::Gold, count: 5 });
        points[23] = Some(PointStack { owner: Color::Red, count: 2 });

        Board {
            points,
            bar: [0, 0],
            borne_off: [0, 0],
        }
    }

    pub fn bar_count(&self, color: Color) -> u8 {
        self.bar[side_index(color)]
    }

    pub fn borne_off_count(&self, color: Color) -> u8 {
        self.borne_off[side_index(color)]
    }

    pub fn pip_count(&self, color: Color) -> u32 {
        let mut total: u32 = 0;
        for idx in 0..24u8 {
            if let Some(stack) = self.points[idx as usize] {
                if stack.owner == color {
                    let distance = match color {
                        Color::Gold => 24 - idx,
                        Color::Red => idx + 1,
                    };
                    total += distance as u32 * stack.count as u32;
                }
            }
        }
        total += self.bar_count(color) as u32 * 25;
        total
    }

    /// True when every checker the side has still in play is on their home
    /// board and none is on the bar — the precondition for bearing off.
    pub fn all_home(&self, color: Color) -> bool {
        if self.bar_count(color) > 0 {
            return false;
        }
        let home = color.home_range();
        for idx in 0..24u8 {
            if let Some(stack) = self.points[idx as usize] {
                if stack.owner == color && !home.contains(&idx) {
                    return false;
                }
            }
        }
        true
    }

    /// The farthest-from-home point still occupied by `color` within their
    /// home board, if any. Used by the overshoot bear-off rule.
    pub fn farthest_home_point(&self, color: Color) -> Option<u8> {
        let home = color.home_range();
        match color {
            Color::Gold => home
                .filter(|&idx| matches!(self.points[idx as usize], Some(s) if s.owner == color))
                .min(),
            Color::Red => home
                .filter(|&idx| matches!(self.points[idx as usize], Some(s) if s.owner == color))
                .max(),
        }
    }

    /// Checks the sum-of-fifteen invariant for both sides.
    pub fn checker_counts_valid(&self) -> bool {
        for &color in &[Color::Gold, Color::Red] {
            let mut total = self.bar_count(color) as u32 + self.borne_off_count(color) as u32;
            for p in self.points.iter() {
                if let Some(stack) = p {
                    if stack.owner == color {
                        total += stack.count as u32;
                    }
                }
            }
            if total != 15 {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Dice
// ---------------------------------------------------------------------------

/// The pair rolled this turn and the multiset of die values still available
/// to play. Doubles quadruple `remaining` to four copies of the rolled value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dice {
    pub values: (u8, u8),
    pub remaining: Vec<u8>,
}

impl Dice {
    pub fn new(v1: u8, v2: u8) -> Dice {
        let remaining = if v1 == v2 {
            vec![v1, v1, v1, v1]
        } else {
            vec![v1, v2]
        };
        Dice { values: (v1, v2), remaining }
    }

    pub fn is_doubles(&self) -> bool {
        self.values.0 == self.values.1
    }

    /// Removes the first occurrence of `die` from `remaining`, if present.
    pub fn consume(&mut self, die: u8) -> bool {
        if let Some(pos) = self.remaining.iter().position(|&d| d == die) {
            self.remaining.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn has_legal_play_left(&self) -> bool {
        !self.remaining.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Doubling cube
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoublingCube {
    pub value: u32,
    pub owner: Option<Color>,
}

impl Default for DoublingCube {
    fn default() -> Self {
        DoublingCube { value: 1, owner: None }
    }
}

// ---------------------------------------------------------------------------
// Match score
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScore {
    pub gold_points: u32,
    pub red_points: u32,
    pub match_length: u32,
    pub is_crawford: bool,
}

impl MatchScore {
    pub fn new(match_length: u32) -> Self {
        MatchScore {
            gold_points: 0,
            red_points: 0,
            match_length,
            is_crawford: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    OpeningRoll,
    Rolling,
    Moving,
    Doubling,
    GameOver,
}

// ---------------------------------------------------------------------------
// Win type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinType {
    YaMon,
    BigYaMon,
    MassiveYaMon,
}

impl WinType {
    pub fn multiplier(self) -> u32 {
        match self {
            WinType::YaMon => 1,
            WinType::BigYaMon => 2,
            WinType::MassiveYaMon => 3,
        }
    }
}

impl fmt::Display for WinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WinType::YaMon => write!(f, "ya_mon"),
            WinType::BigYaMon => write!(f, "big_ya_mon"),
            WinType::MassiveYaMon => write!(f, "massive_ya_mon"),
        }
    }
}

// ---------------------------------------------------------------------------
// Move
// ---------------------------------------------------------------------------

/// An endpoint of a move: a point index, the bar (entry source), or off
/// (bear-off destination).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    Point(u8),
    Named(EndpointTag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointTag {
    Bar,
    Off,
}

impl Endpoint {
    pub fn as_point(self) -> Option<u8> {
        match self {
            Endpoint::Point(p) => Some(p),
            Endpoint::Named(_) => None,
        }
    }

    pub fn is_bar(self) -> bool {
        matches!(self, Endpoint::Named(EndpointTag::Bar))
    }

    pub fn is_off(self) -> bool {
        matches!(self, Endpoint::Named(EndpointTag::Off))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Point(p) => write!(f, "{p}"),
            Endpoint::Named(EndpointTag::Bar) => write!(f, "bar"),
            Endpoint::Named(EndpointTag::Off) => write!(f, "off"),
        }
    }
}

/// A single atomic move, uniquely determined by its endpoints; the die
/// consumed is derived rather than carried on the struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: Endpoint,
    pub to: Endpoint,
}

impl Move {
    pub fn new(from: Endpoint, to: Endpoint) -> Move {
        Move { from, to }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

// ---------------------------------------------------------------------------
// Game state aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub board: Board,
    pub current_player: Color,
    pub phase: Phase,
    pub dice: Option<Dice>,
    pub cube: DoublingCube,
    pub score: MatchScore,
    pub winner: Option<Color>,
    pub win_type: Option<WinType>,
}

impl GameState {
    pub fn new(match_length: u32) -> GameState {
        GameState {
            board: Board::starting_position(),
            current_player: Color::Gold,
            phase: Phase::OpeningRoll,
            dice: None,
            cube: DoublingCube::default(),
            score: MatchScore::new(match_length),
            winner: None,
            win_type: None,
        }
    }

    pub fn is_over(&self) -> bool {
        self.phase == Phase::GameOver
    }
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

/// The full game-state snapshot sent to clients on every broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStateJson {
    pub board: Board,
    #[serde(rename = "currentPlayer")]
    pub current_player: Color,
    pub phase: Phase,
    pub dice: Option<DiceJson>,
    pub cube: DoublingCube,
    pub score: MatchScoreJson,
    pub winner: Option<Color>,
    #[serde(rename = "winType")]
    pub win_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiceJson {
    pub values: (u8, u8),
    pub remaining: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchScoreJson {
    #[serde(rename = "goldPoints")]
    pub gold_points: u32,
    #[serde(rename = "redPoints")]
    pub red_points: u32,
    #[serde(rename = "matchLength")]
    pub match_length: u32,
    #[serde(rename = "isCrawford")]
    pub is_crawford: bool,
}

impl From<&GameState> for GameStateJson {
    fn from(state: &GameState) -> Self {
        GameStateJson {
            board: state.board.clone(),
            current_player: state.current_player,
            phase: state.phase,
            dice: state.dice.as_ref().map(|d| DiceJson {
                values: d.values,
                remaining: d.remaining.clone(),
            }),
            cube: state.cube,
            score: MatchScoreJson {
                gold_points: state.score.gold_points,
                red_points: state.score.red_points,
                match_length: state.score.match_length,
                is_crawford: state.score.is_crawford,
            },
            winner: state.winner,
            win_type: state.win_type.map(|w| w.to_string()),
        }
    }
}

/// A move as submitted by a client over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveJson {
    pub from: Endpoint,
    pub to: Endpoint,
}

impl From<MoveJson> for Move {
    fn from(m: MoveJson) -> Self {
        Move { from: m.from, to: m.to }
    }
}

impl From<Move> for MoveJson {
    fn from(m: Move) -> Self {
        MoveJson { from: m.from, to: m.to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_position_has_fifteen_per_side() {
        let board = Board::starting_position();
        assert!(board.checker_counts_valid());
    }

    #[test]
    fn starting_position_layout_matches_spec() {
        let board = Board::starting_position();
        assert_eq!(board.points[0], Some(PointStack { owner: Color::Gold, count: 2 }));
        assert_eq!(board.points[5], Some(PointStack { owner: Color::Red, count: 5 }));
        assert_eq!(board.points[23], Some(PointStack { owner: Color::Red, count: 2 }));
        assert_eq!(board.points[1], None);
    }

    #[test]
    fn doubles_quadruple_remaining() {
        let dice = Dice::new(3, 3);
        assert_eq!(dice.remaining, vec![3, 3, 3, 3]);
        assert!(dice.is_doubles());
    }

    #[test]
    fn non_doubles_give_two_values() {
        let dice = Dice::new(4, 1);
        assert_eq!(dice.remaining, vec![4, 1]);
        assert!(!dice.is_doubles());
    }

    #[test]
    fn bar_entry_indices() {
        assert_eq!(Color::Gold.bar_entry_index(3), 2);
        assert_eq!(Color::Red.bar_entry_index(3), 21);
    }

    #[test]
    fn win_type_multipliers() {
        assert_eq!(WinType::YaMon.multiplier(), 1);
        assert_eq!(WinType::BigYaMon.multiplier(), 2);
        assert_eq!(WinType::MassiveYaMon.multiplier(), 3);
    }

    #[test]
    fn move_endpoint_serialization_round_trips_bar_and_off() {
        let m = Move::new(Endpoint::Named(EndpointTag::Bar), Endpoint::Point(2));
        let json = serde_json::to_string(&MoveJson::from(m)).unwrap();
        assert_eq!(json, r#"{"from":"bar","to":2}"#);
        let back: MoveJson = serde_json::from_str(&json).unwrap();
        assert_eq!(Move::from(back), m);
    }
}
