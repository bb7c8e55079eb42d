#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Movement and conflict resolution for the Gridball engine.
//!
//! Resolution happens on a transient copy of the board, never on the field
//! itself: every gridded unit becomes a candidate placement, proposed moves
//! override the stay-in-place default, and conflicts are settled by
//! repairing candidates until no two units claim the same cell. Only then
//! is the settled plan handed back for the field to commit in one pass.
//! Conflicts settled here produce mutations — bumps, attacks, pickups,
//! handoffs — that the caller feeds into the next substep's pipeline.

use std::collections::{BTreeMap, BTreeSet};

use gridball_core::{Direction, EngineError, GridPos, Mutation, ProposedMove, Tag, UnitId};
use gridball_field::FieldView;

/// How strongly a unit's claim on a contested cell ranks.
///
/// Lower is better. A unit wins a cell only when it holds the single best
/// level among all remaining claimants; any tie bounces everyone back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VictoryLevel {
    /// The unit already occupies the cell and is not moving.
    Stationary,
    /// The unit carries the bossy tag.
    Bossy,
    /// An open-handed carrier moving against a ball holder.
    Handoff,
    /// The unit carries the ball.
    BallHolder,
    /// The unit moves with less horizontal drift than its rival.
    Vertical,
    /// The unit moves purely sideways.
    Horizontal,
    /// Any other mover.
    Bounce,
}

/// Settled movement plan produced by [`resolve`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    /// Final cell for every unit that was gridded when resolution started.
    pub placements: Vec<(UnitId, GridPos)>,
    /// Committed relocations keyed by unit, old position first.
    pub movements: BTreeMap<UnitId, (GridPos, GridPos)>,
    /// Mutations produced while settling conflicts, committed relocations
    /// last.
    pub mutations: Vec<Mutation>,
}

/// Resolves a batch of proposed moves against the current board.
///
/// Later proposals for the same unit override earlier ones, so an injected
/// shove supersedes the unit's own behavior. Every proposal must depart
/// from the cell its unit actually occupies.
pub fn resolve(
    view: &FieldView<'_>,
    proposals: &[ProposedMove],
) -> Result<Resolution, EngineError> {
    let mut board = TransientField::build(*view, proposals)?;
    board.fix_bounds();
    board.resolve_swaps()?;
    board.resolve_contests()?;
    Ok(board.commit())
}

/// A unit's candidate placement while resolution is in flight.
#[derive(Clone, Copy, Debug)]
struct TransientUnit {
    unit: UnitId,
    from: GridPos,
    to: GridPos,
    attempted: Option<Direction>,
}

impl TransientUnit {
    const fn is_change(&self) -> bool {
        self.from.column() != self.to.column() || self.from.row() != self.to.row()
    }
}

struct TransientField<'a> {
    view: FieldView<'a>,
    candidates: BTreeMap<UnitId, TransientUnit>,
    mutations: Vec<Mutation>,
}

impl<'a> TransientField<'a> {
    fn build(view: FieldView<'a>, proposals: &[ProposedMove]) -> Result<Self, EngineError> {
        let mut candidates: BTreeMap<UnitId, TransientUnit> = BTreeMap::new();
        for id in view.on_field_ids() {
            let Some(from) = view.position_of(id) else {
                continue;
            };
            let _ = candidates.insert(
                id,
                TransientUnit {
                    unit: id,
                    from,
                    to: from,
                    attempted: None,
                },
            );
        }
        for proposal in proposals {
            let seated = view.position_of(proposal.unit).ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "movement proposed for off-grid unit {:?}",
                    proposal.unit
                ))
            })?;
            if seated != proposal.from {
                return Err(EngineError::InvariantViolation(format!(
                    "movement for unit {:?} departs {:?} but the unit occupies {:?}",
                    proposal.unit, proposal.from, seated
                )));
            }
            let _ = candidates.insert(
                proposal.unit,
                TransientUnit {
                    unit: proposal.unit,
                    from: seated,
                    to: proposal.to,
                    attempted: Some(proposal.attempted),
                },
            );
        }
        Ok(Self {
            view,
            candidates,
            mutations: Vec::new(),
        })
    }

    /// Resets every candidate pointing off the grid back to its source,
    /// recording a bump.
    fn fix_bounds(&mut self) {
        let strays: Vec<UnitId> = self
            .candidates
            .values()
            .filter(|candidate| !self.view.params().contains(candidate.to))
            .map(|candidate| candidate.unit)
            .collect();
        for id in strays {
            self.bounce(id);
        }
    }

    /// Settles pairs of units attempting to trade places.
    ///
    /// A swap can never commit: enemies strike or bump, a carrier crossing
    /// an item absorbs it, and everything else bounces.
    fn resolve_swaps(&mut self) -> Result<(), EngineError> {
        let mut origin_of: BTreeMap<GridPos, UnitId> = BTreeMap::new();
        for candidate in self.candidates.values().filter(|c| c.is_change()) {
            let _ = origin_of.insert(candidate.from, candidate.unit);
        }
        let mut pairs: Vec<(UnitId, UnitId)> = Vec::new();
        for candidate in self.candidates.values() {
            if !candidate.is_change() {
                continue;
            }
            let Some(&partner) = origin_of.get(&candidate.to) else {
                continue;
            };
            if partner <= candidate.unit {
                continue;
            }
            let Some(other) = self.candidates.get(&partner) else {
                continue;
            };
            if other.to == candidate.from {
                pairs.push((candidate.unit, partner));
            }
        }

        for (a, b) in pairs {
            let unit_a = self.view.unit(a).ok_or(EngineError::UnknownUnit(a))?;
            let unit_b = self.view.unit(b).ok_or(EngineError::UnknownUnit(b))?;
            if unit_a.owner().is_opposed_to(&unit_b.owner()) {
                if unit_a.can_attack(unit_b) {
                    self.mutations.push(Mutation::UnitAttacks {
                        attacker: a,
                        receiver: b,
                    });
                    self.stall(a);
                } else {
                    self.bounce(a);
                }
                if unit_b.can_attack(unit_a) {
                    self.mutations.push(Mutation::UnitAttacks {
                        attacker: b,
                        receiver: a,
                    });
                    self.stall(b);
                } else {
                    self.bounce(b);
                }
            } else if unit_a.can_pick_up(unit_b) && !unit_b.can_pick_up(unit_a) {
                self.mutations.push(Mutation::UnitPicksUp {
                    carrier: a,
                    item: b,
                });
                self.stall(a);
                self.bounce(b);
            } else if unit_b.can_pick_up(unit_a) && !unit_a.can_pick_up(unit_b) {
                self.mutations.push(Mutation::UnitPicksUp {
                    carrier: b,
                    item: a,
                });
                self.stall(b);
                self.bounce(a);
            } else {
                self.bounce(a);
                self.bounce(b);
            }
        }
        Ok(())
    }

    /// Repairs contested cells until every cell has at most one claimant.
    ///
    /// Bouncing a loser back to its source can contest that cell in turn,
    /// so the repair loops to a fixpoint. Every round resets at least one
    /// mover, which bounds the loop by the candidate count.
    fn resolve_contests(&mut self) -> Result<(), EngineError> {
        let mut rounds = 0usize;
        loop {
            let contested = self.contested_cells();
            if contested.is_empty() {
                return Ok(());
            }
            rounds += 1;
            if rounds > self.candidates.len() + 1 {
                return Err(EngineError::InvariantViolation(
                    "contested-cell resolution did not converge".into(),
                ));
            }
            for cell in contested {
                self.settle_cell(cell)?;
            }
        }
    }

    fn contested_cells(&self) -> Vec<GridPos> {
        let mut counts: BTreeMap<GridPos, usize> = BTreeMap::new();
        for candidate in self.candidates.values() {
            *counts.entry(candidate.to).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .filter(|(_, claimants)| *claimants >= 2)
            .map(|(cell, _)| cell)
            .collect()
    }

    fn settle_cell(&mut self, cell: GridPos) -> Result<(), EngineError> {
        let claimants: Vec<UnitId> = self
            .candidates
            .values()
            .filter(|candidate| candidate.to == cell)
            .map(|candidate| candidate.unit)
            .collect();
        if claimants.len() < 2 {
            return Ok(());
        }

        // Pairs of movers that can strike each other fight instead of
        // contesting; both stay put without a bump.
        let mut fighting: BTreeSet<UnitId> = BTreeSet::new();
        for (index, &a) in claimants.iter().enumerate() {
            for &b in &claimants[index + 1..] {
                let both_moving = self.is_moving(a) && self.is_moving(b);
                if !both_moving {
                    continue;
                }
                let unit_a = self.view.unit(a).ok_or(EngineError::UnknownUnit(a))?;
                let unit_b = self.view.unit(b).ok_or(EngineError::UnknownUnit(b))?;
                if unit_a.can_attack(unit_b) && unit_b.can_attack(unit_a) {
                    self.mutations.push(Mutation::UnitAttacks {
                        attacker: a,
                        receiver: b,
                    });
                    self.mutations.push(Mutation::UnitAttacks {
                        attacker: b,
                        receiver: a,
                    });
                    let _ = fighting.insert(a);
                    let _ = fighting.insert(b);
                }
            }
        }
        for &id in &fighting {
            self.stall(id);
        }

        let voters: Vec<UnitId> = claimants
            .iter()
            .copied()
            .filter(|id| !fighting.contains(id))
            .collect();
        if voters.len() < 2 {
            return Ok(());
        }

        let mut levels: BTreeMap<UnitId, VictoryLevel> = BTreeMap::new();
        for &contender in &voters {
            let mut best = VictoryLevel::Bounce;
            for &rival in voters.iter().filter(|&&rival| rival != contender) {
                best = best.min(self.victory_level(contender, rival)?);
            }
            let _ = levels.insert(contender, best);
        }
        let Some(best_level) = levels.values().min().copied() else {
            return Ok(());
        };
        let winners: Vec<UnitId> = levels
            .iter()
            .filter(|(_, level)| **level == best_level)
            .map(|(id, _)| *id)
            .collect();
        if winners.len() != 1 {
            for &id in &voters {
                self.bounce(id);
            }
            return Ok(());
        }
        let winner = winners[0];
        let losers: Vec<UnitId> = voters.iter().copied().filter(|&id| id != winner).collect();

        if best_level == VictoryLevel::Handoff {
            for &loser in &losers {
                if let Some(item) = self.ball_item_of(loser) {
                    self.mutations.push(Mutation::UnitHandsOff {
                        taker: winner,
                        giver: loser,
                        item,
                    });
                }
            }
        }

        // The winner scoops the losers only when they form a single
        // second-place group it can absorb whole; a split group or one
        // unpickable loser bounces them all.
        let winner_unit = self
            .view
            .unit(winner)
            .ok_or(EngineError::UnknownUnit(winner))?;
        let one_group = losers
            .iter()
            .filter_map(|loser| levels.get(loser))
            .collect::<BTreeSet<_>>()
            .len()
            == 1;
        let absorbs = one_group
            && losers.iter().all(|&loser| {
                self.view
                    .unit(loser)
                    .is_some_and(|unit| winner_unit.can_pick_up(unit))
            });
        if absorbs {
            for &loser in &losers {
                self.mutations.push(Mutation::UnitPicksUp {
                    carrier: winner,
                    item: loser,
                });
                self.stall(loser);
            }
        } else {
            for &loser in &losers {
                self.bounce(loser);
            }
        }
        Ok(())
    }

    /// Ranks one claimant's hold on a cell against a single rival.
    ///
    /// A claimant's overall level is the best it scores against each rival
    /// in turn.
    fn victory_level(&self, a: UnitId, b: UnitId) -> Result<VictoryLevel, EngineError> {
        let ours = self
            .candidates
            .get(&a)
            .ok_or(EngineError::UnknownUnit(a))?;
        let theirs = self
            .candidates
            .get(&b)
            .ok_or(EngineError::UnknownUnit(b))?;
        let unit = self.view.unit(a).ok_or(EngineError::UnknownUnit(a))?;

        if !ours.is_change() {
            return Ok(VictoryLevel::Stationary);
        }
        if unit.has_tag(Tag::Bossy) {
            return Ok(VictoryLevel::Bossy);
        }
        let holds_ball = self.view.unit_holds_ball(a);
        if unit.has_tag(Tag::Carrier)
            && !holds_ball
            && !unit.has_tag(Tag::Butterfingers)
            && self.view.unit_holds_ball(b)
        {
            return Ok(VictoryLevel::Handoff);
        }
        if holds_ball {
            return Ok(VictoryLevel::BallHolder);
        }
        let our_drift = (ours.to.column() - ours.from.column()).abs();
        let their_drift = (theirs.to.column() - theirs.from.column()).abs();
        if our_drift < their_drift {
            Ok(VictoryLevel::Vertical)
        } else if ours.to.row() == ours.from.row() {
            Ok(VictoryLevel::Horizontal)
        } else {
            Ok(VictoryLevel::Bounce)
        }
    }

    fn ball_item_of(&self, holder: UnitId) -> Option<UnitId> {
        let unit = self.view.unit(holder)?;
        unit.inventory().iter().copied().find(|&item| {
            self.view
                .unit(item)
                .is_some_and(|carried| carried.has_tag(Tag::TheBall))
        })
    }

    fn is_moving(&self, id: UnitId) -> bool {
        self.candidates
            .get(&id)
            .is_some_and(TransientUnit::is_change)
    }

    /// Resets a candidate to its source without a bump.
    fn stall(&mut self, id: UnitId) {
        if let Some(candidate) = self.candidates.get_mut(&id) {
            candidate.to = candidate.from;
        }
    }

    /// Resets a candidate to its source, recording the rejected attempt.
    fn bounce(&mut self, id: UnitId) {
        let rejected = match self.candidates.get_mut(&id) {
            Some(candidate) if candidate.is_change() => {
                let attempted = candidate.attempted;
                candidate.to = candidate.from;
                attempted
            }
            _ => None,
        };
        if let Some(direction) = rejected {
            self.mutations.push(Mutation::UnitBumps {
                unit: id,
                direction,
            });
        }
    }

    fn commit(self) -> Resolution {
        let TransientField {
            view: _,
            candidates,
            mut mutations,
        } = self;
        let mut placements: Vec<(UnitId, GridPos)> = Vec::new();
        let mut movements: BTreeMap<UnitId, (GridPos, GridPos)> = BTreeMap::new();
        for candidate in candidates.values() {
            placements.push((candidate.unit, candidate.to));
            if candidate.is_change() {
                let _ = movements.insert(candidate.unit, (candidate.from, candidate.to));
                mutations.push(Mutation::UnitMoves {
                    unit: candidate.unit,
                    from: candidate.from,
                    to: candidate.to,
                });
            }
        }
        Resolution {
            placements,
            movements,
            mutations,
        }
    }
}
