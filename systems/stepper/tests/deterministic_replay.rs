//! Replays a scripted play twice from identical setups and checks that the
//! engine produced bit-identical reports and final state.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use gridball_core::{
    Behavior, BehaviorKind, Direction, FieldParams, GridPos, Modifier, Owner, PlayerId, Rotation,
    StepReport, Tag,
};
use gridball_field::{query, Field, UnitTemplate};
use gridball_system_stepper::PlayStepper;

fn home() -> Owner {
    Owner::Player(PlayerId::new(0))
}

fn away() -> Owner {
    Owner::Player(PlayerId::new(1))
}

/// A small but busy board: two strikers racing for the ball, a head-on
/// brawl, a pusher, a crabwalking defender, and a chained rotation.
fn scripted_field() -> Field {
    let params = FieldParams::new(9, 11, GridPos::new(4, 5), 2, 2);
    let mut field = Field::new(params);

    let striker_home = UnitTemplate::new(
        "striker",
        3,
        1,
        vec![Tag::Carrier],
        vec![Behavior::new(BehaviorKind::ChaseBall {
            allowed: vec![
                Direction::North,
                Direction::NorthEast,
                Direction::NorthWest,
            ],
            fallback: Direction::North,
        })],
    );
    let striker_away = UnitTemplate::new(
        "striker",
        3,
        1,
        vec![Tag::Carrier],
        vec![Behavior::new(BehaviorKind::ChaseBall {
            allowed: vec![
                Direction::South,
                Direction::SouthEast,
                Direction::SouthWest,
            ],
            fallback: Direction::South,
        })],
    );
    let brawler = |direction| {
        UnitTemplate::new(
            "brawler",
            3,
            2,
            Vec::new(),
            vec![Behavior::new(BehaviorKind::Translate(direction))],
        )
    };
    let pusher = UnitTemplate::new(
        "pusher",
        3,
        1,
        vec![Tag::Pusher],
        vec![
            Behavior::new(BehaviorKind::Translate(Direction::East)),
            Behavior::new(BehaviorKind::DoNothing),
        ],
    );
    let defender = UnitTemplate::new(
        "defender",
        4,
        1,
        vec![Tag::Defender],
        vec![Behavior::new(BehaviorKind::Crabwalk)],
    );
    let spinner = UnitTemplate::new(
        "spinner",
        3,
        1,
        Vec::new(),
        vec![
            Behavior::new(BehaviorKind::ApplyModifier(Modifier::Rotation(
                Rotation::new(2),
            )))
            .then(Behavior::new(BehaviorKind::Translate(Direction::North))),
            Behavior::new(BehaviorKind::Translate(Direction::North)),
        ],
    );
    let ball = UnitTemplate::new(
        "ball",
        1,
        0,
        vec![Tag::Item, Tag::TheBall],
        vec![Behavior::new(BehaviorKind::DoNothing)],
    );

    let _ = field
        .spawn(&striker_home, home(), GridPos::new(4, 9))
        .expect("home striker");
    let _ = field
        .spawn(&striker_away, away(), GridPos::new(4, 1))
        .expect("away striker");
    let _ = field
        .spawn(&brawler(Direction::North), home(), GridPos::new(2, 8))
        .expect("home brawler");
    let _ = field
        .spawn(&brawler(Direction::South), away(), GridPos::new(2, 2))
        .expect("away brawler");
    let _ = field
        .spawn(&pusher, home(), GridPos::new(0, 5))
        .expect("pusher");
    let _ = field
        .spawn(&defender, away(), GridPos::new(6, 2))
        .expect("defender");
    let _ = field
        .spawn(&spinner, home(), GridPos::new(7, 9))
        .expect("spinner");
    let _ = field
        .spawn(&ball, Owner::Neutral, field.params().ball_spawn())
        .expect("ball");
    field
}

fn run_play(steps: u32) -> (Vec<StepReport>, u64) {
    let mut stepper = PlayStepper::new(scripted_field());
    let mut reports = Vec::new();
    for _ in 0..steps {
        reports.push(stepper.step().expect("step"));
    }

    let mut hasher = DefaultHasher::new();
    query::unit_snapshots(&stepper.field()).hash(&mut hasher);
    format!("{reports:?}").hash(&mut hasher);
    (reports, hasher.finish())
}

#[test]
fn identical_setups_replay_identically() {
    let (first_reports, first_print) = run_play(20);
    let (second_reports, second_print) = run_play(20);
    assert_eq!(first_reports, second_reports);
    assert_eq!(first_print, second_print);
}

#[test]
fn scripted_play_conserves_units_and_terminates() {
    let mut stepper = PlayStepper::new(scripted_field());
    let before = stepper.field().census().total();

    let reports = stepper.step_to_finish().expect("run to finish");
    assert!(stepper.is_finished());
    assert!(!reports.is_empty());
    assert_eq!(stepper.field().census().total(), before);
}
