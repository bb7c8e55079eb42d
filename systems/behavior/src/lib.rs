#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure behavior evaluation for the Gridball engine.
//!
//! Behaviors are re-evaluated against the current field state each time
//! they run and never mutate the field directly: evaluation yields an
//! [`Outcome`] describing the intended effect, which the stepper feeds
//! into movement resolution or the mutation pipeline. Anything that breaks
//! during evaluation is contained here and surfaced as
//! [`Outcome::Faulted`] so a single misbehaving unit can never abort the
//! step.

use gridball_core::{
    BehaviorKind, Direction, GridPos, Mutation, Outcome, ProposedMove, UnitId,
    CHASE_FALLBACK_OPTION,
};
use gridball_field::{FieldView, Unit};

/// Evaluates one behavior for one unit against a read-only field view.
#[must_use]
pub fn evaluate(unit: UnitId, kind: &BehaviorKind, view: &FieldView<'_>) -> Outcome {
    match try_evaluate(unit, kind, view) {
        Ok(outcome) => outcome,
        Err(reason) => Outcome::Faulted(reason),
    }
}

fn try_evaluate(
    unit: UnitId,
    kind: &BehaviorKind,
    view: &FieldView<'_>,
) -> Result<Outcome, String> {
    match kind {
        BehaviorKind::Translate(direction) => translate(unit, *direction, view),
        BehaviorKind::ChaseBall { allowed, fallback } => {
            chase_ball(unit, allowed, *fallback, view)
        }
        BehaviorKind::Crabwalk => crabwalk(unit, view),
        BehaviorKind::ApplyModifier(modifier) => Ok(Outcome::Mutated(Mutation::UnitChanged {
            unit,
            modifier: modifier.clone(),
        })),
        BehaviorKind::AutoThrowBall => auto_throw(unit, view),
        BehaviorKind::DoNothing => Ok(Outcome::Idle),
    }
}

/// Applies the unit's folded rotation and flip modifiers to a program
/// direction.
#[must_use]
pub fn transformed_direction(unit: &Unit, direction: Direction) -> Direction {
    let rotated = direction.rotated(unit.rotation());
    if unit.flip() {
        rotated.mirrored()
    } else {
        rotated
    }
}

fn translate(
    unit_id: UnitId,
    direction: Direction,
    view: &FieldView<'_>,
) -> Result<Outcome, String> {
    let (unit, from) = gridded_unit(unit_id, view)?;
    let attempted = transformed_direction(unit, direction);
    let to = from.offset(attempted.vector());
    let succeeded = view.params().contains(to);
    Ok(Outcome::Moved(ProposedMove {
        unit: unit_id,
        from,
        to,
        attempted,
        succeeded,
    }))
}

fn chase_ball(
    unit_id: UnitId,
    allowed: &[Direction],
    fallback: Direction,
    view: &FieldView<'_>,
) -> Result<Outcome, String> {
    let (unit, from) = gridded_unit(unit_id, view)?;
    let ball = view
        .ball_position()
        .ok_or_else(|| format!("unit {unit_id:?} chases a ball that is not in play"))?;

    let staying = from.squared_distance(ball);
    let mut best: Option<(i64, Direction)> = None;
    for direction in allowed {
        let landing = from.offset(transformed_direction(unit, *direction).vector());
        if !view.params().contains(landing) {
            continue;
        }
        let distance = landing.squared_distance(ball);
        let better = match best {
            None => true,
            Some((best_distance, _)) => distance < best_distance,
        };
        if better {
            best = Some((distance, *direction));
        }
    }

    let chosen = match best {
        Some((distance, direction)) if distance <= staying => direction,
        _ => unit
            .option(CHASE_FALLBACK_OPTION)
            .and_then(|value| u8::try_from(value).ok())
            .map_or(fallback, Direction::from_index),
    };
    translate(unit_id, chosen, view)
}

fn crabwalk(unit_id: UnitId, view: &FieldView<'_>) -> Result<Outcome, String> {
    let (unit, from) = gridded_unit(unit_id, view)?;
    let ball = view
        .ball_position()
        .ok_or_else(|| format!("unit {unit_id:?} crabwalks toward a ball that is not in play"))?;

    let left = transformed_direction(unit, Direction::West);
    let right = transformed_direction(unit, Direction::East);
    let mut laterals: Vec<(i64, Direction, GridPos)> = Vec::new();
    for direction in [left, right] {
        let landing = from.offset(direction.vector());
        if view.params().contains(landing) {
            laterals.push((landing.squared_distance(ball), direction, landing));
        }
    }

    let Some((_, attempted, to)) = laterals.into_iter().min_by_key(|(distance, _, _)| *distance)
    else {
        return Ok(Outcome::Idle);
    };
    Ok(Outcome::Moved(ProposedMove {
        unit: unit_id,
        from,
        to,
        attempted,
        succeeded: true,
    }))
}

fn auto_throw(unit_id: UnitId, view: &FieldView<'_>) -> Result<Outcome, String> {
    let (unit, from) = gridded_unit(unit_id, view)?;
    let Some(item) = unit.first_item() else {
        return Ok(Outcome::Failed(format!(
            "unit {unit_id:?} has nothing to throw"
        )));
    };

    let mut target: Option<(i64, UnitId, GridPos)> = None;
    for other_id in view.on_field_ids() {
        if other_id == unit_id {
            continue;
        }
        let Some(other) = view.unit(other_id) else {
            continue;
        };
        if other.owner() != unit.owner() {
            continue;
        }
        let Some(pos) = view.position_of(other_id) else {
            continue;
        };
        let distance = from.squared_distance(pos);
        let farther = match target {
            None => true,
            Some((best, _, _)) => distance > best,
        };
        if farther {
            target = Some((distance, other_id, pos));
        }
    }

    match target {
        Some((_, _, cell)) => Ok(Outcome::Mutated(Mutation::UnitThrowsItem {
            thrower: unit_id,
            item,
            target: cell,
        })),
        None => Ok(Outcome::Failed(format!(
            "unit {unit_id:?} has no teammate to throw to"
        ))),
    }
}

fn gridded_unit<'a>(
    unit_id: UnitId,
    view: &FieldView<'a>,
) -> Result<(&'a Unit, GridPos), String> {
    let unit = view
        .unit(unit_id)
        .ok_or_else(|| format!("unknown unit {unit_id:?}"))?;
    let from = view
        .position_of(unit_id)
        .ok_or_else(|| format!("unit {unit_id:?} acted while off the field"))?;
    Ok((unit, from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridball_core::{
        Behavior, FieldParams, Modifier, Owner, PlayerId, Rotation, Tag,
    };
    use gridball_field::{Field, UnitTemplate};

    fn params() -> FieldParams {
        FieldParams::new(7, 7, GridPos::new(3, 3), 1, 1)
    }

    fn runner() -> UnitTemplate {
        UnitTemplate::new(
            "runner",
            3,
            1,
            Vec::new(),
            vec![Behavior::new(BehaviorKind::DoNothing)],
        )
    }

    fn carrier() -> UnitTemplate {
        UnitTemplate::new(
            "carrier",
            3,
            1,
            vec![Tag::Carrier],
            vec![Behavior::new(BehaviorKind::DoNothing)],
        )
    }

    fn ball() -> UnitTemplate {
        UnitTemplate::new(
            "ball",
            1,
            0,
            vec![Tag::Item, Tag::TheBall],
            vec![Behavior::new(BehaviorKind::DoNothing)],
        )
    }

    fn expect_move(outcome: Outcome) -> ProposedMove {
        match outcome {
            Outcome::Moved(proposed) => proposed,
            other => panic!("expected a movement, got {other:?}"),
        }
    }

    #[test]
    fn translate_applies_rotation_and_flip() {
        let mut field = Field::new(params());
        let id = field
            .spawn(&runner(), Owner::Player(PlayerId::new(0)), GridPos::new(3, 3))
            .expect("spawn");
        {
            let unit = field.unit_mut(id).expect("unit");
            unit.add_modifier(Modifier::Rotation(Rotation::new(2)));
            unit.add_modifier(Modifier::Flip);
        }

        // North rotated two eighth turns is east, mirrored back to west.
        let proposed = expect_move(evaluate(
            id,
            &BehaviorKind::Translate(Direction::North),
            &field.view(),
        ));
        assert_eq!(proposed.attempted, Direction::West);
        assert_eq!(proposed.to, GridPos::new(2, 3));
        assert!(proposed.succeeded);
    }

    #[test]
    fn translate_out_of_bounds_fails_but_keeps_the_vector() {
        let mut field = Field::new(params());
        let id = field
            .spawn(&runner(), Owner::Player(PlayerId::new(0)), GridPos::new(0, 0))
            .expect("spawn");

        let proposed = expect_move(evaluate(
            id,
            &BehaviorKind::Translate(Direction::North),
            &field.view(),
        ));
        assert!(!proposed.succeeded);
        assert_eq!(proposed.attempted, Direction::North);
        assert_eq!(proposed.to, GridPos::new(0, -1));
    }

    #[test]
    fn chase_ball_picks_the_closing_direction() {
        let mut field = Field::new(params());
        let id = field
            .spawn(&runner(), Owner::Player(PlayerId::new(0)), GridPos::new(1, 3))
            .expect("runner");
        let _ = field
            .spawn(&ball(), Owner::Neutral, GridPos::new(5, 3))
            .expect("ball");

        let proposed = expect_move(evaluate(
            id,
            &BehaviorKind::ChaseBall {
                allowed: vec![Direction::North, Direction::East, Direction::South],
                fallback: Direction::South,
            },
            &field.view(),
        ));
        assert_eq!(proposed.attempted, Direction::East);
        assert_eq!(proposed.to, GridPos::new(2, 3));
    }

    #[test]
    fn chase_ball_falls_back_when_every_option_is_worse() {
        let mut field = Field::new(params());
        let id = field
            .spawn(&runner(), Owner::Player(PlayerId::new(0)), GridPos::new(3, 3))
            .expect("runner");
        // Ball directly south; the only allowed direction moves away.
        let _ball = field
            .spawn(&ball(), Owner::Neutral, GridPos::new(3, 4))
            .expect("ball");

        let proposed = expect_move(evaluate(
            id,
            &BehaviorKind::ChaseBall {
                allowed: vec![Direction::North],
                fallback: Direction::West,
            },
            &field.view(),
        ));
        assert_eq!(proposed.attempted, Direction::West);
    }

    #[test]
    fn chase_ball_fallback_is_overridable_per_unit() {
        let mut field = Field::new(params());
        let id = field
            .spawn(&runner(), Owner::Player(PlayerId::new(0)), GridPos::new(3, 3))
            .expect("runner");
        let _ = field
            .spawn(&ball(), Owner::Neutral, GridPos::new(3, 4))
            .expect("ball");
        field
            .unit_mut(id)
            .expect("unit")
            .add_modifier(Modifier::Setting {
                key: CHASE_FALLBACK_OPTION.into(),
                value: i32::from(Direction::East.index()),
            });

        let proposed = expect_move(evaluate(
            id,
            &BehaviorKind::ChaseBall {
                allowed: vec![Direction::North],
                fallback: Direction::West,
            },
            &field.view(),
        ));
        assert_eq!(proposed.attempted, Direction::East);
    }

    #[test]
    fn chase_ball_without_a_ball_is_a_fault() {
        let mut field = Field::new(params());
        let id = field
            .spawn(&runner(), Owner::Player(PlayerId::new(0)), GridPos::new(3, 3))
            .expect("runner");

        let outcome = evaluate(
            id,
            &BehaviorKind::ChaseBall {
                allowed: vec![Direction::North],
                fallback: Direction::South,
            },
            &field.view(),
        );
        assert!(matches!(outcome, Outcome::Faulted(_)));
    }

    #[test]
    fn crabwalk_steps_toward_the_nearer_side() {
        let mut field = Field::new(params());
        let id = field
            .spawn(&runner(), Owner::Player(PlayerId::new(0)), GridPos::new(3, 3))
            .expect("runner");
        let _ = field
            .spawn(&ball(), Owner::Neutral, GridPos::new(6, 3))
            .expect("ball");

        let proposed = expect_move(evaluate(id, &BehaviorKind::Crabwalk, &field.view()));
        assert_eq!(proposed.attempted, Direction::East);
        assert_eq!(proposed.to, GridPos::new(4, 3));
    }

    #[test]
    fn crabwalk_with_no_lateral_room_does_nothing() {
        let field_params = FieldParams::new(1, 7, GridPos::new(0, 3), 1, 1);
        let mut field = Field::new(field_params);
        let id = field
            .spawn(&runner(), Owner::Player(PlayerId::new(0)), GridPos::new(0, 0))
            .expect("runner");
        let _ = field
            .spawn(&ball(), Owner::Neutral, GridPos::new(0, 3))
            .expect("ball");

        assert_eq!(
            evaluate(id, &BehaviorKind::Crabwalk, &field.view()),
            Outcome::Idle
        );
    }

    #[test]
    fn auto_throw_targets_the_farthest_teammate() {
        let mut field = Field::new(params());
        let owner = Owner::Player(PlayerId::new(0));
        let thrower = field
            .spawn(&carrier(), owner, GridPos::new(0, 0))
            .expect("thrower");
        let _near = field
            .spawn(&runner(), owner, GridPos::new(1, 1))
            .expect("near");
        let far = field
            .spawn(&runner(), owner, GridPos::new(6, 6))
            .expect("far");
        let _rival = field
            .spawn(&runner(), Owner::Player(PlayerId::new(1)), GridPos::new(6, 0))
            .expect("rival");
        let ball_id = field
            .spawn(&ball(), Owner::Neutral, GridPos::new(3, 3))
            .expect("ball");
        let _ = field.lift(ball_id).expect("lift");
        field.absorb_into(thrower, ball_id).expect("absorb");

        let outcome = evaluate(thrower, &BehaviorKind::AutoThrowBall, &field.view());
        assert_eq!(
            outcome,
            Outcome::Mutated(Mutation::UnitThrowsItem {
                thrower,
                item: ball_id,
                target: field.position_of(far).expect("far position"),
            })
        );
    }

    #[test]
    fn auto_throw_with_empty_hands_fails() {
        let mut field = Field::new(params());
        let thrower = field
            .spawn(&carrier(), Owner::Player(PlayerId::new(0)), GridPos::new(0, 0))
            .expect("thrower");

        let outcome = evaluate(thrower, &BehaviorKind::AutoThrowBall, &field.view());
        assert!(matches!(outcome, Outcome::Failed(_)));
    }
}
