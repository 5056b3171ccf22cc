//! Game lifecycle: phase transitions, the doubling cube, and win
//! classification, layered on top of the pure board/move primitives in
//! `movegen`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::movegen;
use crate::types::*;

/// Typed error kinds surfaced to the dispatcher, matching the five
/// authorization/phase/validation/not-found/internal error surfaces.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("not authorized: {0}")]
    Authz(String),
    #[error("wrong phase: {0}")]
    Phase(String),
    #[error("invalid: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

fn roll_die() -> u8 {
    rand::rng().random_range(1..=6)
}

/// Outcome of a `roll-dice` event, used by the dispatcher to decide what to
/// broadcast.
#[derive(Debug, Clone)]
pub enum RollOutcome {
    /// Opening roll tied; still in `OPENING_ROLL`.
    OpeningTied { gold_die: u8, red_die: u8 },
    /// Opening roll resolved; `first_player` now has `dice` to play.
    OpeningResolved {
        gold_die: u8,
        red_die: u8,
        first_player: Color,
        turn_ended: bool,
    },
    /// A normal turn roll. `turn_ended` is true when the roller had no
    /// legal move and the turn was auto-advanced.
    Normal { dice: (u8, u8), turn_ended: bool },
}

/// Outcome of a `make-move` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Continue,
    TurnEnded,
    GameOver { winner: Color, win_type: WinType, points: u32 },
}

/// Outcome of a `respond-double` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoubleOutcome {
    Accepted,
    Declined { winner: Color, win_type: WinType, points: u32 },
}

/// A single in-progress (or finished) backgammon game, owned by a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: Uuid,
    pub state: GameState,
    pub created_at: i64,
}

impl Game {
    pub fn new(match_length: u32, created_at: i64) -> Game {
        Game {
            id: Uuid::new_v4(),
            state: GameState::new(match_length),
            created_at,
        }
    }

    pub fn is_over(&self) -> bool {
        self.state.is_over()
    }

    fn require_phase(&self, expected: Phase) -> Result<(), GameError> {
        if self.state.phase == expected {
            Ok(())
        } else {
            Err(GameError::Phase(format!(
                "expected phase {:?}, got {:?}",
                expected, self.state.phase
            )))
        }
    }

    fn require_mover(&self, actor: Color) -> Result<(), GameError> {
        if self.state.current_player == actor {
            Ok(())
        } else {
            Err(GameError::Authz(format!("it is not {actor}'s turn")))
        }
    }

    /// `roll-dice` while `phase == OPENING_ROLL`. Either side may trigger
    /// this; the server rolls one die per side and decides who moves
    /// first.
    pub fn roll_opening(&mut self, forced: Option<(u8, u8)>) -> Result<RollOutcome, GameError> {
        self.require_phase(Phase::OpeningRoll)?;

        let (gold_die, red_die) = forced.unwrap_or_else(|| (roll_die(), roll_die()));
        if gold_die == red_die {
            return Ok(RollOutcome::OpeningTied { gold_die, red_die });
        }

        let first_player = if gold_die > red_die { Color::Gold } else { Color::Red };
        self.state.current_player = first_player;
        self.state.dice = Some(Dice::new(gold_die, red_die));
        let turn_ended = self.enter_moving_or_auto_end();

        Ok(RollOutcome::OpeningResolved { gold_die, red_die, first_player, turn_ended })
    }

    /// `roll-dice` while `phase == ROLLING`.
    pub fn roll_dice(&mut self, actor: Color, forced: Option<(u8, u8)>) -> Result<RollOutcome, GameError> {
        self.require_phase(Phase::Rolling)?;
        self.require_mover(actor)?;

        let (v1, v2) = forced.unwrap_or_else(|| (roll_die(), roll_die()));
        self.state.dice = Some(Dice::new(v1, v2));
        let turn_ended = self.enter_moving_or_auto_end();

        Ok(RollOutcome::Normal { dice: (v1, v2), turn_ended })
    }

    /// Transitions into `MOVING` if the roller has a legal move, otherwise
    /// ends the turn immediately. Returns whether the turn was auto-ended.
    fn enter_moving_or_auto_end(&mut self) -> bool {
        let remaining = self.state.dice.as_ref().map(|d| d.remaining.clone()).unwrap_or_default();
        let moves = movegen::legal_moves(&self.state.board, self.state.current_player, &remaining);
        if moves.is_empty() {
            self.advance_turn();
            true
        } else {
            self.state.phase = Phase::Moving;
            false
        }
    }

    /// `make-move`.
    pub fn make_move(&mut self, actor: Color, mv: Move) -> Result<MoveOutcome, GameError> {
        self.require_phase(Phase::Moving)?;
        self.require_mover(actor)?;

        let remaining = self
            .state
            .dice
            .as_ref()
            .ok_or_else(|| GameError::Internal("moving phase without dice".into()))?
            .remaining
            .clone();

        let constrained = movegen::constrained_moves(&self.state.board, actor, &remaining);
        if !constrained.contains(&mv) {
            return Err(GameError::Validation(format!("{mv} is not a legal move here")));
        }

        let die = movegen::consumed_die(&self.state.board, actor, mv, &remaining)
            .ok_or_else(|| GameError::Internal("move passed validation but resolved no die".into()))?;

        let new_board = movegen::apply_move(&self.state.board, actor, mv);
        self.state.board = new_board;
        self.state.dice.as_mut().unwrap().consume(die);

        if let Some((winner, win_type)) = self.check_winner() {
            let points = win_type.multiplier() * self.state.cube.value;
            self.state.phase = Phase::GameOver;
            self.state.winner = Some(winner);
            self.state.win_type = Some(win_type);
            return Ok(MoveOutcome::GameOver { winner, win_type, points });
        }

        let remaining = self.state.dice.as_ref().unwrap().remaining.clone();
        let further = movegen::legal_moves(&self.state.board, actor, &remaining);
        if further.is_empty() {
            self.advance_turn();
            Ok(MoveOutcome::TurnEnded)
        } else {
            Ok(MoveOutcome::Continue)
        }
    }

    /// `end-turn`, the explicit client-driven equivalent of the
    /// auto-advance in `make_move`/`roll_dice`. Only valid when the mover
    /// genuinely has no playable dice left.
    pub fn end_turn(&mut self, actor: Color) -> Result<(), GameError> {
        self.require_phase(Phase::Moving)?;
        self.require_mover(actor)?;

        let remaining = self.state.dice.as_ref().map(|d| d.remaining.clone()).unwrap_or_default();
        let moves = movegen::legal_moves(&self.state.board, actor, &remaining);
        if !moves.is_empty() {
            return Err(GameError::Validation("dice remain that can still be played".into()));
        }

        self.advance_turn();
        Ok(())
    }

    fn advance_turn(&mut self) {
        self.state.current_player = self.state.current_player.opponent();
        self.state.phase = Phase::Rolling;
        self.state.dice = None;
    }

    fn check_winner(&self) -> Option<(Color, WinType)> {
        for &side in &[Color::Gold, Color::Red] {
            if self.state.board.borne_off_count(side) == 15 {
                let loser = side.opponent();
                let win_type = if self.state.board.borne_off_count(loser) > 0 {
                    WinType::YaMon
                } else if self.state.board.bar_count(loser) > 0 {
                    WinType::MassiveYaMon
                } else {
                    let loser_in_winner_home = (0..24u8).any(|idx| {
                        side.home_range().contains(&idx)
                            && matches!(self.state.board.points[idx as usize], Some(s) if s.owner == loser)
                    });
                    if loser_in_winner_home { WinType::MassiveYaMon } else { WinType::BigYaMon }
                };
                return Some((side, win_type));
            }
        }
        None
    }

    /// `offer-double`.
    pub fn offer_double(&mut self, actor: Color) -> Result<(), GameError> {
        self.require_phase(Phase::Rolling)?;
        self.require_mover(actor)?;

        if !self.can_offer_double(actor) {
            if self.state.score.is_crawford {
                return Err(GameError::Phase("doubling is disabled during the Crawford game".into()));
            }
            return Err(GameError::Authz("the opponent owns the cube".into()));
        }

        self.state.phase = Phase::Doubling;
        Ok(())
    }

    /// `respond-double`. `actor` must be the opponent of the offering
    /// player (who is still `current_player`).
    pub fn respond_double(&mut self, actor: Color, accept: bool) -> Result<DoubleOutcome, GameError> {
        self.require_phase(Phase::Doubling)?;
        let mover = self.state.current_player;
        if actor != mover.opponent() {
            return Err(GameError::Authz("only the offered-to player may respond".into()));
        }

        if accept {
            self.state.cube.value *= 2;
            self.state.cube.owner = Some(actor);
            self.state.phase = Phase::Rolling;
            Ok(DoubleOutcome::Accepted)
        } else {
            let points = self.state.cube.value;
            self.state.phase = Phase::GameOver;
            self.state.winner = Some(mover);
            self.state.win_type = Some(WinType::YaMon);
            Ok(DoubleOutcome::Declined { winner: mover, win_type: WinType::YaMon, points })
        }
    }

    pub fn can_offer_double(&self, actor: Color) -> bool {
        self.state.phase == Phase::Rolling
            && self.state.current_player == actor
            && !self.state.score.is_crawford
            && self.state.cube.owner.is_none_or(|o| o == actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> i64 {
        0
    }

    #[test]
    fn doubles_expand_to_four_moves_available() {
        let mut game = Game::new(1, now());
        game.state.phase = Phase::OpeningRoll;
        game.roll_opening(Some((2, 5))).unwrap();
        assert_eq!(game.state.dice.as_ref().unwrap().remaining.len(), 2);

        game.advance_turn();
        game.roll_dice(game.state.current_player, Some((3, 3))).unwrap();
        assert_eq!(game.state.dice.as_ref().unwrap().remaining, vec![3, 3, 3, 3]);
    }

    #[test]
    fn hit_sends_blot_to_bar_through_make_move() {
        let mut game = Game::new(1, now());
        game.state.board.points[4] = Some(PointStack { owner: Color::Red, count: 1 });
        game.state.phase = Phase::Moving;
        game.state.current_player = Color::Gold;
        game.state.dice = Some(Dice::new(4, 1));

        let outcome = game
            .make_move(Color::Gold, Move::new(Endpoint::Point(0), Endpoint::Point(4)))
            .unwrap();
        assert_eq!(outcome, MoveOutcome::Continue);
        assert_eq!(game.state.board.bar_count(Color::Red), 1);
    }

    #[test]
    fn bar_entry_is_forced_when_on_bar() {
        let mut game = Game::new(1, now());
        game.state.board.points[0] = Some(PointStack { owner: Color::Gold, count: 1 });
        game.state.board.bar[0] = 1;
        game.state.phase = Phase::Moving;
        game.state.current_player = Color::Gold;
        game.state.dice = Some(Dice::new(3, 1));

        let err = game
            .make_move(Color::Gold, Move::new(Endpoint::Point(11), Endpoint::Point(14)))
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[test]
    fn no_legal_moves_auto_ends_turn() {
        let mut game = Game::new(1, now());
        game.state.board.bar[0] = 2;
        game.state.board.points[0] = None;
        game.state.board.points[4] = Some(PointStack { owner: Color::Red, count: 2 });
        game.state.board.points[5] = Some(PointStack { owner: Color::Red, count: 7 });
        game.state.phase = Phase::Rolling;
        game.state.current_player = Color::Gold;

        let outcome = game.roll_dice(Color::Gold, Some((6, 5))).unwrap();
        assert!(matches!(outcome, RollOutcome::Normal { turn_ended: true, .. }));
        assert_eq!(game.state.phase, Phase::Rolling);
        assert_eq!(game.state.current_player, Color::Red);
    }

    #[test]
    fn gammon_when_loser_has_borne_off_nothing() {
        let mut game = Game::new(1, now());
        game.state.board.points = [None; 24];
        game.state.board.borne_off[0] = 14;
        game.state.board.points[23] = Some(PointStack { owner: Color::Gold, count: 1 });
        game.state.board.points[3] = Some(PointStack { owner: Color::Red, count: 15 });
        game.state.phase = Phase::Moving;
        game.state.current_player = Color::Gold;
        game.state.dice = Some(Dice::new(1, 2));

        let outcome = game
            .make_move(Color::Gold, Move::new(Endpoint::Point(23), Endpoint::Named(EndpointTag::Off)))
            .unwrap();
        assert_eq!(
            outcome,
            MoveOutcome::GameOver { winner: Color::Gold, win_type: WinType::BigYaMon, points: 2 }
        );
    }

    #[test]
    fn backgammon_when_loser_has_checker_in_winner_home() {
        let mut game = Game::new(1, now());
        game.state.board.points = [None; 24];
        game.state.board.borne_off[0] = 14;
        game.state.board.points[23] = Some(PointStack { owner: Color::Gold, count: 1 });
        game.state.board.points[20] = Some(PointStack { owner: Color::Red, count: 1 });
        game.state.board.points[3] = Some(PointStack { owner: Color::Red, count: 14 });
        game.state.phase = Phase::Moving;
        game.state.current_player = Color::Gold;
        game.state.dice = Some(Dice::new(1, 2));

        let outcome = game
            .make_move(Color::Gold, Move::new(Endpoint::Point(23), Endpoint::Named(EndpointTag::Off)))
            .unwrap();
        assert_eq!(
            outcome,
            MoveOutcome::GameOver { winner: Color::Gold, win_type: WinType::MassiveYaMon, points: 3 }
        );
    }

    #[test]
    fn decline_keeps_pre_proposal_cube_value() {
        let mut game = Game::new(1, now());
        game.state.phase = Phase::Rolling;
        game.state.current_player = Color::Gold;
        game.state.cube = DoublingCube { value: 2, owner: Some(Color::Gold) };

        game.offer_double(Color::Gold).unwrap();
        let outcome = game.respond_double(Color::Red, false).unwrap();
        assert_eq!(
            outcome,
            DoubleOutcome::Declined { winner: Color::Gold, win_type: WinType::YaMon, points: 2 }
        );
        assert_eq!(game.state.cube.value, 2);
    }

    #[test]
    fn accept_double_transfers_ownership_to_responder() {
        let mut game = Game::new(1, now());
        game.state.phase = Phase::Rolling;
        game.state.current_player = Color::Gold;

        game.offer_double(Color::Gold).unwrap();
        let outcome = game.respond_double(Color::Red, true).unwrap();
        assert_eq!(outcome, DoubleOutcome::Accepted);
        assert_eq!(game.state.cube.value, 2);
        assert_eq!(game.state.cube.owner, Some(Color::Red));
        assert_eq!(game.state.phase, Phase::Rolling);
    }
}
