//! Move generation and turn enumeration for the bearoff rules engine.
//!
//! This module implements:
//!
//! - Atomic legal move generation (bar entry, point-to-point, bear off with
//!   the farthest-piece overshoot rule)
//! - The "use as many dice as possible, and the higher die if only one can
//!   be played" constraint that narrows legal moves down to the moves a
//!   player is actually allowed to choose from
//! - Pure move application
//! - Depth-first turn-sequence enumeration, bounded by `remaining.len() <= 4`

use crate::types::*;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Atomic move generation
// ---------------------------------------------------------------------------

/// Unique die values present in `remaining`, in no particular order.
fn unique_dice(remaining: &[u8]) -> Vec<u8> {
    let mut seen = Vec::new();
    for &d in remaining {
        if !seen.contains(&d) {
            seen.push(d);
        }
    }
    seen
}

fn landing_is_legal(board: &Board, mover: Color, target: u8) -> bool {
    match board.points[target as usize] {
        None => true,
        Some(stack) => stack.owner == mover || stack.count == 1,
    }
}

/// All atomic moves playable right now with some die in `remaining`,
/// ignoring the "maximize dice played" constraint (see `constrained_moves`).
pub fn legal_moves(board: &Board, mover: Color, remaining: &[u8]) -> Vec<Move> {
    let mut moves = Vec::new();
    let dice = unique_dice(remaining);

    if board.bar_count(mover) > 0 {
        for &d in &dice {
            let target = mover.bar_entry_index(d);
            if landing_is_legal(board, mover, target) {
                moves.push(Move::new(Endpoint::Named(EndpointTag::Bar), Endpoint::Point(target)));
            }
        }
        return moves;
    }

    let all_home = board.all_home(mover);
    let farthest = board.farthest_home_point(mover);

    for idx in 0..24u8 {
        let Some(stack) = board.points[idx as usize] else { continue };
        if stack.owner != mover {
            continue;
        }
        for &d in &dice {
            let target = idx as i16 + d as i16 * mover.direction() as i16;
            if (0..24).contains(&target) {
                let target = target as u8;
                if landing_is_legal(board, mover, target) {
                    moves.push(Move::new(Endpoint::Point(idx), Endpoint::Point(target)));
                }
                continue;
            }
            if !all_home {
                continue;
            }
            let exact = mover.exact_bear_off_die(idx);
            if d == exact {
                moves.push(Move::new(Endpoint::Point(idx), Endpoint::Named(EndpointTag::Off)));
            } else if d > exact && farthest == Some(idx) {
                moves.push(Move::new(Endpoint::Point(idx), Endpoint::Named(EndpointTag::Off)));
            }
        }
    }

    moves.sort_by_key(|m| (point_key(m.from), point_key(m.to)));
    moves.dedup();
    moves
}

fn point_key(e: Endpoint) -> i16 {
    match e {
        Endpoint::Point(p) => p as i16,
        Endpoint::Named(EndpointTag::Bar) => -1,
        Endpoint::Named(EndpointTag::Off) => 24,
    }
}

/// The die value a move consumes, resolved against what's actually left in
/// `remaining`. Returns `None` if the move isn't playable with any of them.
pub fn consumed_die(board: &Board, mover: Color, mv: Move, remaining: &[u8]) -> Option<u8> {
    match (mv.from, mv.to) {
        (Endpoint::Named(EndpointTag::Bar), Endpoint::Point(to)) => {
            let die = mover.bar_entry_index_inverse(to)?;
            remaining.contains(&die).then_some(die)
        }
        (Endpoint::Point(from), Endpoint::Point(to)) => {
            let die = (to as i16 - from as i16).unsigned_abs() as u8;
            remaining.contains(&die).then_some(die)
        }
        (Endpoint::Point(from), Endpoint::Named(EndpointTag::Off)) => {
            let exact = mover.exact_bear_off_die(from);
            if remaining.contains(&exact) {
                return Some(exact);
            }
            if board.farthest_home_point(mover) != Some(from) {
                return None;
            }
            remaining.iter().copied().filter(|&d| d > exact).min()
        }
        _ => None,
    }
}

/// Applies a move to a board, returning a new board. Pure: never mutates
/// its input. Callers are responsible for removing the consumed die from
/// `remaining` via `consumed_die`.
pub fn apply_move(board: &Board, mover: Color, mv: Move) -> Board {
    let mut next = board.clone();

    match mv.from {
        Endpoint::Named(EndpointTag::Bar) => {
            let side = match mover {
                Color::Gold => 0,
                Color::Red => 1,
            };
            next.bar[side] -= 1;
        }
        Endpoint::Point(from) => {
            let stack = next.points[from as usize].expect("move source must be occupied");
            if stack.count == 1 {
                next.points[from as usize] = None;
            } else {
                next.points[from as usize] = Some(PointStack { count: stack.count - 1, ..stack });
            }
        }
        Endpoint::Named(EndpointTag::Off) => unreachable!("off is never a move source"),
    }

    match mv.to {
        Endpoint::Named(EndpointTag::Off) => {
            let side = match mover {
                Color::Gold => 0,
                Color::Red => 1,
            };
            next.borne_off[side] += 1;
        }
        Endpoint::Point(to) => {
            match next.points[to as usize] {
                Some(stack) if stack.owner != mover => {
                    // hit: sole opponent checker goes to the opponent's bar.
                    let opp_side = match mover.opponent() {
                        Color::Gold => 0,
                        Color::Red => 1,
                    };
                    next.bar[opp_side] += 1;
                    next.points[to as usize] = Some(PointStack { owner: mover, count: 1 });
                }
                Some(stack) => {
                    next.points[to as usize] = Some(PointStack { count: stack.count + 1, ..stack });
                }
                None => {
                    next.points[to as usize] = Some(PointStack { owner: mover, count: 1 });
                }
            }
        }
        Endpoint::Named(EndpointTag::Bar) => unreachable!("bar is never a move destination"),
    }

    next
}

// ---------------------------------------------------------------------------
// Turn-sequence enumeration and the maximize-dice constraint
// ---------------------------------------------------------------------------

type Memo = HashMap<(Board, Vec<u8>), usize>;

fn max_sequence_len(board: &Board, mover: Color, remaining: &[u8], memo: &mut Memo) -> usize {
    let mut sorted = remaining.to_vec();
    sorted.sort_unstable();
    let key = (board.clone(), sorted.clone());
    if let Some(&cached) = memo.get(&key) {
        return cached;
    }

    let moves = legal_moves(board, mover, &sorted);
    let best = moves
        .iter()
        .map(|&mv| {
            let die = consumed_die(board, mover, mv, &sorted).expect("generated move must resolve a die");
            let next_board = apply_move(board, mover, mv);
            let mut next_remaining = sorted.clone();
            let pos = next_remaining.iter().position(|&d| d == die).unwrap();
            next_remaining.remove(pos);
            1 + max_sequence_len(&next_board, mover, &next_remaining, memo)
        })
        .max()
        .unwrap_or(0);

    memo.insert(key, best);
    best
}

/// The subset of `legal_moves` the player is actually allowed to choose
/// from this step: moves that can begin a turn sequence of maximal total
/// length, with ties broken in favor of the higher die when only one die
/// could ever be played.
pub fn constrained_moves(board: &Board, mover: Color, remaining: &[u8]) -> Vec<Move> {
    let candidates = legal_moves(board, mover, remaining);
    if candidates.is_empty() {
        return candidates;
    }

    let mut memo = Memo::new();
    let max_len = max_sequence_len(board, mover, remaining, &mut memo);

    let mut winners: Vec<Move> = candidates
        .into_iter()
        .filter(|&mv| {
            let die = consumed_die(board, mover, mv, remaining).unwrap();
            let next_board = apply_move(board, mover, mv);
            let mut next_remaining = remaining.to_vec();
            let pos = next_remaining.iter().position(|&d| d == die).unwrap();
            next_remaining.remove(pos);
            1 + max_sequence_len(&next_board, mover, &next_remaining, &mut memo) == max_len
        })
        .collect();

    if max_len == 1 {
        let unique = unique_dice(remaining);
        if unique.len() == 2 {
            let higher = *unique.iter().max().unwrap();
            winners.retain(|&mv| consumed_die(board, mover, mv, remaining) == Some(higher));
        }
    }

    winners
}

impl Color {
    /// Inverse of `bar_entry_index`: the die that would have entered a
    /// checker from the bar onto `index`, if any.
    fn bar_entry_index_inverse(self, index: u8) -> Option<u8> {
        let die = match self {
            Color::Gold => index as i16 + 1,
            Color::Red => 24 - index as i16,
        };
        (1..=6).contains(&die).then_some(die as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_position_has_no_bar_priority() {
        let board = Board::starting_position();
        let moves = legal_moves(&board, Color::Gold, &[6, 5]);
        assert!(moves.iter().all(|m| !m.from.is_bar()));
    }

    #[test]
    fn bar_checkers_force_bar_only_moves() {
        let mut board = Board::starting_position();
        board.points[0] = Some(PointStack { owner: Color::Gold, count: 1 });
        board.bar[0] = 1;
        let moves = legal_moves(&board, Color::Gold, &[3, 1]);
        assert!(!moves.is_empty());
        assert!(moves.iter().all(|m| m.from.is_bar()));
    }

    #[test]
    fn hit_sends_lone_blot_to_bar() {
        let mut board = Board::starting_position();
        board.points[4] = Some(PointStack { owner: Color::Red, count: 1 });
        let mv = Move::new(Endpoint::Point(0), Endpoint::Point(4));
        let next = apply_move(&board, Color::Gold, mv);
        assert_eq!(next.points[4], Some(PointStack { owner: Color::Gold, count: 1 }));
        assert_eq!(next.bar_count(Color::Red), 1);
    }

    #[test]
    fn no_legal_moves_when_blocked() {
        let mut board = Board::starting_position();
        board.bar[0] = 2;
        board.points[0] = None;
        board.points[4] = Some(PointStack { owner: Color::Red, count: 2 });
        board.points[5] = Some(PointStack { owner: Color::Red, count: 7 });
        let moves = legal_moves(&board, Color::Gold, &[6, 5]);
        assert!(moves.is_empty());
    }

    #[test]
    fn constrained_moves_is_subset_of_legal_moves() {
        let board = Board::starting_position();
        let legal = legal_moves(&board, Color::Gold, &[6, 5]);
        let constrained = constrained_moves(&board, Color::Gold, &[6, 5]);
        for mv in &constrained {
            assert!(legal.contains(mv));
        }
    }

    #[test]
    fn bear_off_overshoot_requires_farthest_piece() {
        let mut board = Board::starting_position();
        board.points = [None; 24];
        board.points[18] = Some(PointStack { owner: Color::Gold, count: 1 });
        board.points[20] = Some(PointStack { owner: Color::Gold, count: 1 });
        board.borne_off[0] = 13;
        let moves = legal_moves(&board, Color::Gold, &[6]);
        assert!(moves.contains(&Move::new(Endpoint::Point(18), Endpoint::Named(EndpointTag::Off))));
        assert!(!moves.contains(&Move::new(Endpoint::Point(20), Endpoint::Named(EndpointTag::Off))));
    }

    #[test]
    fn apply_is_pure() {
        let board = Board::starting_position();
        let before = board.clone();
        let mv = Move::new(Endpoint::Point(0), Endpoint::Point(4));
        let _ = apply_move(&board, Color::Gold, mv);
        assert_eq!(board, before);
    }
}
