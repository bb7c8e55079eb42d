#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! The multi-pass mutation pipeline of the Gridball engine.
//!
//! Every pending [`Mutation`] in a substep batch runs through four ordered
//! passes: *prepare* may veto the instruction, *pass 1* applies the
//! primary state change, *pass 2* performs secondary bookkeeping, and
//! *pass 3* applies effects that need the pass-1 results of the other
//! mutations in the batch — an item is only inserted into its new
//! carrier's inventory after pass 1 has already pulled it off the field.
//! After the passes, unit reactions and resultant mutations are expanded;
//! both become the pending batch of the next substep. The ordering is
//! enforced here by explicit per-pass dispatch tables, not by the
//! mutations themselves.

use std::collections::{BTreeMap, BTreeSet};

use gridball_core::{EngineError, GridPos, Mutation, ProposedMove, ReactionEffect, UnitId};
use gridball_field::Field;

/// Result of running one substep batch through the pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineOutput {
    /// Mutations that survived prepare and were applied, in order.
    pub applied: Vec<Mutation>,
    /// Reaction- and resultant-produced mutations for the next substep.
    pub follow_ups: Vec<Mutation>,
}

/// The `EarlyMutate` hook: movement candidates a batch injects before
/// movement resolution runs this substep.
///
/// Only pushes participate; a shoved unit gets a proposed relocation in
/// the push direction.
#[must_use]
pub fn early_moves(field: &Field, batch: &[Mutation]) -> Vec<ProposedMove> {
    let mut moves = Vec::new();
    for mutation in batch {
        let Mutation::UnitPushes {
            pushed, direction, ..
        } = mutation
        else {
            continue;
        };
        let Some(from) = field.position_of(*pushed) else {
            continue;
        };
        let to = from.offset(direction.vector());
        moves.push(ProposedMove {
            unit: *pushed,
            from,
            to,
            attempted: *direction,
            succeeded: field.params().contains(to),
        });
    }
    moves
}

/// Runs a batch through prepare and the three mutation passes, then
/// expands reactions and resultant mutations.
pub fn run_batch(field: &mut Field, batch: Vec<Mutation>) -> Result<PipelineOutput, EngineError> {
    let mut accepted: Vec<Mutation> = Vec::new();
    let mut veto_state = VetoState::default();
    for mutation in batch {
        if prepare(field, &mutation, &mut veto_state) {
            accepted.push(mutation);
        }
    }

    let mut died_at: BTreeMap<UnitId, Option<GridPos>> = BTreeMap::new();
    for mutation in &accepted {
        pass1(field, mutation, &mut died_at)?;
    }
    for mutation in &accepted {
        pass2(field, mutation, &died_at)?;
    }
    for mutation in &accepted {
        pass3(field, mutation)?;
    }

    let mut follow_ups = reactions(field, &accepted);
    follow_ups.extend(resultants(field, &accepted));
    Ok(PipelineOutput {
        applied: accepted,
        follow_ups,
    })
}

/// Within-batch bookkeeping used by the prepare pass to drop duplicates.
#[derive(Debug, Default)]
struct VetoState {
    deaths: BTreeSet<UnitId>,
    claimed_items: BTreeSet<UnitId>,
}

fn prepare(field: &Field, mutation: &Mutation, state: &mut VetoState) -> bool {
    let alive = |id: &UnitId| field.unit(*id).is_some() && !field.is_buried(*id);
    match mutation {
        Mutation::UnitDies { unit } => {
            if !alive(unit) || state.deaths.contains(unit) {
                return false;
            }
            let _ = state.deaths.insert(*unit);
            true
        }
        Mutation::UnitTakesDamage { unit, .. } | Mutation::UnitChanged { unit, .. } => alive(unit),
        Mutation::UnitMoves { unit, .. } | Mutation::UnitBumps { unit, .. } => alive(unit),
        Mutation::UnitAttacks { attacker, receiver } => alive(attacker) && alive(receiver),
        Mutation::UnitPushes { pusher, pushed, .. } => alive(pusher) && alive(pushed),
        Mutation::UnitPicksUp { carrier, item } => {
            if !alive(carrier) || !alive(item) || state.claimed_items.contains(item) {
                return false;
            }
            let (Some(holder), Some(carried)) = (field.unit(*carrier), field.unit(*item)) else {
                return false;
            };
            if !holder.can_pick_up(carried)
                || field.position_of(*carrier).is_none()
                || field.position_of(*item).is_none()
            {
                return false;
            }
            let _ = state.claimed_items.insert(*item);
            true
        }
        Mutation::UnitHandsOff { taker, giver, item } => {
            if !alive(taker) || !alive(giver) || state.claimed_items.contains(item) {
                return false;
            }
            let Some(giving) = field.unit(*giver) else {
                return false;
            };
            if !giving.inventory().contains(item) || field.position_of(*taker).is_none() {
                return false;
            }
            let _ = state.claimed_items.insert(*item);
            true
        }
        Mutation::UnitThrowsItem {
            thrower,
            item,
            target,
        } => {
            if !alive(thrower) || state.claimed_items.contains(item) {
                return false;
            }
            let Some(throwing) = field.unit(*thrower) else {
                return false;
            };
            if !throwing.inventory().contains(item) || !field.params().contains(*target) {
                return false;
            }
            let landing_legal = match field.occupant(*target) {
                None => true,
                Some(occupant_id) => match (field.unit(occupant_id), field.unit(*item)) {
                    (Some(occupant), Some(carried)) => occupant.can_pick_up(carried),
                    _ => false,
                },
            };
            if !landing_legal {
                return false;
            }
            let _ = state.claimed_items.insert(*item);
            true
        }
    }
}

fn pass1(
    field: &mut Field,
    mutation: &Mutation,
    died_at: &mut BTreeMap<UnitId, Option<GridPos>>,
) -> Result<(), EngineError> {
    match mutation {
        Mutation::UnitTakesDamage { unit, amount } => {
            if let Some(target) = field.unit_mut(*unit) {
                target.apply_damage(*amount);
            }
            Ok(())
        }
        Mutation::UnitDies { unit } => {
            let vacated = field.bury(*unit)?;
            let _ = died_at.insert(*unit, vacated);
            Ok(())
        }
        Mutation::UnitPicksUp { item, .. } => {
            let _ = field.lift(*item)?;
            Ok(())
        }
        Mutation::UnitHandsOff { giver, item, .. } => field.release_from(*giver, *item),
        Mutation::UnitThrowsItem { thrower, item, .. } => field.release_from(*thrower, *item),
        Mutation::UnitChanged { unit, modifier } => {
            if let Some(target) = field.unit_mut(*unit) {
                target.add_modifier(modifier.clone());
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn pass2(
    field: &mut Field,
    mutation: &Mutation,
    died_at: &BTreeMap<UnitId, Option<GridPos>>,
) -> Result<(), EngineError> {
    match mutation {
        Mutation::UnitDies { unit } => {
            // A dead carrier drops its first item onto the cell it vacated;
            // later items stay nested in the graveyard.
            let Some(Some(vacated)) = died_at.get(unit) else {
                return Ok(());
            };
            let Some(item) = field.unit(*unit).and_then(|dead| dead.first_item()) else {
                return Ok(());
            };
            field.release_from(*unit, item)?;
            field.drop_at(item, *vacated)
        }
        _ => Ok(()),
    }
}

fn pass3(field: &mut Field, mutation: &Mutation) -> Result<(), EngineError> {
    match mutation {
        Mutation::UnitPicksUp { carrier, item } => field.absorb_into(*carrier, *item),
        Mutation::UnitHandsOff { taker, item, .. } => field.absorb_into(*taker, *item),
        Mutation::UnitThrowsItem { item, target, .. } => match field.occupant(*target) {
            Some(occupant) => field.absorb_into(occupant, *item),
            None => field.drop_at(*item, *target),
        },
        _ => Ok(()),
    }
}

fn reactions(field: &Field, applied: &[Mutation]) -> Vec<Mutation> {
    let mut produced = Vec::new();
    for id in field.on_field_ids() {
        let Some(unit) = field.unit(id) else {
            continue;
        };
        for reaction in unit.reactions() {
            for mutation in applied {
                if mutation.topic() != reaction.topic() || mutation.subject() != id {
                    continue;
                }
                match reaction.effect() {
                    ReactionEffect::AddModifier(modifier) => {
                        produced.push(Mutation::UnitChanged {
                            unit: id,
                            modifier: modifier.clone(),
                        });
                    }
                }
            }
        }
    }
    produced
}

fn resultants(field: &Field, applied: &[Mutation]) -> Vec<Mutation> {
    let mut produced = Vec::new();
    for mutation in applied {
        match mutation {
            Mutation::UnitAttacks { attacker, receiver } => {
                let power = field.unit(*attacker).map_or(0, |unit| unit.power());
                produced.push(Mutation::UnitTakesDamage {
                    unit: *receiver,
                    amount: power,
                });
            }
            Mutation::UnitTakesDamage { unit, .. } => {
                let dead = field.unit(*unit).is_some_and(|target| target.is_dead());
                if dead && !field.is_buried(*unit) {
                    produced.push(Mutation::UnitDies { unit: *unit });
                }
            }
            _ => {}
        }
    }
    produced
}
