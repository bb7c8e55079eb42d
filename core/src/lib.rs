#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Gridball play-resolution engine.
//!
//! This crate defines the data surface that connects the authoritative
//! field, the pure behavior and resolution systems, and the play stepper.
//! Behaviors describe intended effects as [`Outcome`] values, the mutation
//! pipeline consumes and applies [`Mutation`] values, and every step is
//! reported back to the host through [`StepReport`]. All cross-references
//! between simulation objects travel as identifiers, never as live
//! references, so queued instructions survive being carried across
//! multiple pipeline passes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier assigned to a unit for the lifetime of a play.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UnitId(u32);

impl UnitId {
    /// Creates a new unit identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to a player.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PlayerId(u32);

impl PlayerId {
    /// Creates a new player identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Ownership attributed to a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// The unit belongs to the identified player.
    Player(PlayerId),
    /// The unit belongs to no player, e.g. the ball.
    Neutral,
}

impl Owner {
    /// Reports whether two owners are opposing players.
    ///
    /// Neutral units oppose nobody.
    #[must_use]
    pub fn is_opposed_to(&self, other: &Owner) -> bool {
        match (self, other) {
            (Owner::Player(mine), Owner::Player(theirs)) => mine != theirs,
            _ => false,
        }
    }
}

/// Side of the field a player defends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerRole {
    /// Rows at the southern (high-index) edge of the field.
    Home,
    /// Rows at the northern (low-index) edge of the field.
    Away,
}

/// Location of a single grid cell expressed as column and row coordinates.
///
/// Coordinates are signed so that a proposed relocation may temporarily
/// point off the grid before the bounds fix-up resets it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GridPos {
    column: i32,
    row: i32,
}

impl GridPos {
    /// Creates a new grid position.
    #[must_use]
    pub const fn new(column: i32, row: i32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> i32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> i32 {
        self.row
    }

    /// Returns the position displaced by the provided vector.
    #[must_use]
    pub const fn offset(&self, vector: Vector) -> Self {
        Self {
            column: self.column + vector.dx(),
            row: self.row + vector.dy(),
        }
    }

    /// Vector pointing from this position to the other.
    #[must_use]
    pub const fn delta(&self, other: GridPos) -> Vector {
        Vector::new(other.column - self.column, other.row - self.row)
    }

    /// Squared Euclidean distance between two cells.
    #[must_use]
    pub fn squared_distance(&self, other: GridPos) -> i64 {
        let dx = i64::from(other.column - self.column);
        let dy = i64::from(other.row - self.row);
        dx * dx + dy * dy
    }
}

/// Displacement between two grid cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vector {
    dx: i32,
    dy: i32,
}

impl Vector {
    /// Creates a new displacement vector.
    #[must_use]
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    /// Horizontal component, positive toward increasing columns.
    #[must_use]
    pub const fn dx(&self) -> i32 {
        self.dx
    }

    /// Vertical component, positive toward increasing rows.
    #[must_use]
    pub const fn dy(&self) -> i32 {
        self.dy
    }

    /// Reports whether the vector is the zero displacement.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// The eight compass directions a unit may face or move toward.
///
/// North points toward decreasing row indices; variants are ordered
/// clockwise so that rotation is index arithmetic modulo eight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Toward decreasing rows.
    North,
    /// Diagonally toward increasing columns and decreasing rows.
    NorthEast,
    /// Toward increasing columns.
    East,
    /// Diagonally toward increasing columns and rows.
    SouthEast,
    /// Toward increasing rows.
    South,
    /// Diagonally toward decreasing columns and increasing rows.
    SouthWest,
    /// Toward decreasing columns.
    West,
    /// Diagonally toward decreasing columns and rows.
    NorthWest,
}

/// All eight directions in clockwise order starting at north.
pub const ALL_DIRECTIONS: [Direction; 8] = [
    Direction::North,
    Direction::NorthEast,
    Direction::East,
    Direction::SouthEast,
    Direction::South,
    Direction::SouthWest,
    Direction::West,
    Direction::NorthWest,
];

impl Direction {
    /// Clockwise index of the direction, north being zero.
    #[must_use]
    pub const fn index(&self) -> u8 {
        match self {
            Direction::North => 0,
            Direction::NorthEast => 1,
            Direction::East => 2,
            Direction::SouthEast => 3,
            Direction::South => 4,
            Direction::SouthWest => 5,
            Direction::West => 6,
            Direction::NorthWest => 7,
        }
    }

    /// Direction at the provided clockwise index, reduced modulo eight.
    #[must_use]
    pub const fn from_index(index: u8) -> Self {
        ALL_DIRECTIONS[(index % 8) as usize]
    }

    /// Unit displacement produced by one step in this direction.
    #[must_use]
    pub const fn vector(&self) -> Vector {
        match self {
            Direction::North => Vector::new(0, -1),
            Direction::NorthEast => Vector::new(1, -1),
            Direction::East => Vector::new(1, 0),
            Direction::SouthEast => Vector::new(1, 1),
            Direction::South => Vector::new(0, 1),
            Direction::SouthWest => Vector::new(-1, 1),
            Direction::West => Vector::new(-1, 0),
            Direction::NorthWest => Vector::new(-1, -1),
        }
    }

    /// Direction rotated clockwise by the provided number of eighth turns.
    #[must_use]
    pub const fn rotated(&self, rotation: Rotation) -> Self {
        Self::from_index(self.index() + rotation.get())
    }

    /// Direction mirrored across the vertical axis.
    #[must_use]
    pub const fn mirrored(&self) -> Self {
        match self {
            Direction::North => Direction::North,
            Direction::NorthEast => Direction::NorthWest,
            Direction::East => Direction::West,
            Direction::SouthEast => Direction::SouthWest,
            Direction::South => Direction::South,
            Direction::SouthWest => Direction::SouthEast,
            Direction::West => Direction::East,
            Direction::NorthWest => Direction::NorthEast,
        }
    }

    /// Nearest direction for an arbitrary displacement, by component signs.
    ///
    /// Returns `None` for the zero vector.
    #[must_use]
    pub const fn from_vector(vector: Vector) -> Option<Self> {
        match (vector.dx().signum(), vector.dy().signum()) {
            (0, -1) => Some(Direction::North),
            (1, -1) => Some(Direction::NorthEast),
            (1, 0) => Some(Direction::East),
            (1, 1) => Some(Direction::SouthEast),
            (0, 1) => Some(Direction::South),
            (-1, 1) => Some(Direction::SouthWest),
            (-1, 0) => Some(Direction::West),
            (-1, -1) => Some(Direction::NorthWest),
            _ => None,
        }
    }
}

/// Clockwise rotation measured in eighth turns.
///
/// Rotations compose additively modulo eight, so stacking modifiers folds
/// to a single rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rotation(u8);

impl Rotation {
    /// The identity rotation.
    pub const IDENTITY: Rotation = Rotation(0);
    /// A half turn, four eighth turns.
    pub const HALF_TURN: Rotation = Rotation(4);

    /// Creates a rotation from a number of eighth turns, reduced modulo
    /// eight.
    #[must_use]
    pub const fn new(eighth_turns: u8) -> Self {
        Self(eighth_turns % 8)
    }

    /// Number of eighth turns, in `0..8`.
    #[must_use]
    pub const fn get(&self) -> u8 {
        self.0
    }

    /// Sum of two rotations, reduced modulo eight.
    #[must_use]
    pub const fn compose(&self, other: Rotation) -> Self {
        Self::new(self.0 + other.0)
    }

    /// The rotation that undoes this one.
    #[must_use]
    pub const fn inverse(&self) -> Self {
        Self::new(8 - self.0)
    }

    /// Reports whether the rotation leaves a direction unchanged.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.0 == 0
    }
}

/// Descriptive tags that gate unit interactions.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Tag {
    /// The unit may pick up items and carry them in its inventory.
    Carrier,
    /// The unit is an item and may be carried.
    Item,
    /// The unit is the ball, a special neutral item.
    TheBall,
    /// The unit shoves the occupant of the cell it moves into.
    Pusher,
    /// The unit claims contested cells ahead of ordinary movers.
    Bossy,
    /// The unit never initiates attacks.
    Defender,
    /// The unit cannot force a handoff from a ball holder.
    Butterfingers,
}

/// Option key read by the chase-ball behavior to override its fallback
/// direction; the value is a clockwise direction index.
pub const CHASE_FALLBACK_OPTION: &str = "chase_fallback";

/// A stacked alteration applied to a unit.
///
/// Each kind defines how multiple instances compose when the stack is
/// folded: rotations sum modulo eight, flips cancel pairwise, and settings
/// keep the most recent value per key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modifier {
    /// Rotates the unit's facing by eighth turns.
    Rotation(Rotation),
    /// Mirrors the unit's movement across the vertical axis.
    Flip,
    /// Marker that negates any rotation added while it is present.
    InvertRotation,
    /// Arbitrary per-unit integer option.
    Setting {
        /// Name of the option.
        key: String,
        /// Value stored under the key.
        value: i32,
    },
}

/// A unit's programmed action for one step.
///
/// The optional successor chains a follow-up behavior that runs in a later
/// substep of the same step, against the field state left behind by the
/// earlier substep's movement resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Behavior {
    kind: BehaviorKind,
    then: Option<Box<Behavior>>,
}

impl Behavior {
    /// Creates a behavior with no successor.
    #[must_use]
    pub const fn new(kind: BehaviorKind) -> Self {
        Self { kind, then: None }
    }

    /// Binds a successor behavior to run after this one resolves.
    #[must_use]
    pub fn then(mut self, next: Behavior) -> Self {
        self.then = Some(Box::new(next));
        self
    }

    /// The program step this behavior performs.
    #[must_use]
    pub const fn kind(&self) -> &BehaviorKind {
        &self.kind
    }

    /// The chained follow-up behavior, if any.
    #[must_use]
    pub fn successor(&self) -> Option<&Behavior> {
        self.then.as_deref()
    }
}

/// Catalogue of program steps a unit may perform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BehaviorKind {
    /// Step one cell in the direction, transformed by the unit's rotation
    /// and flip modifiers. Out of bounds is a failure, not an error.
    Translate(Direction),
    /// Step toward the ball, restricted to the allowed directions.
    ChaseBall {
        /// Directions the unit may choose between.
        allowed: Vec<Direction>,
        /// Direction used when every allowed option is worse than staying.
        fallback: Direction,
    },
    /// Step sideways toward whichever lateral cell is nearer the ball.
    Crabwalk,
    /// Attach a modifier to the unit.
    ApplyModifier(Modifier),
    /// Throw the held item toward the farthest same-owner unit.
    AutoThrowBall,
    /// Do nothing this step.
    DoNothing,
}

/// A unit's fixed-size rotating action program.
///
/// Popping past the last behavior refills the cycle from the start, so a
/// unit never runs out of actions unless its program was empty to begin
/// with — which is a configuration error surfaced by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionProgram {
    behaviors: Vec<Behavior>,
    cursor: usize,
}

impl ActionProgram {
    /// Creates a program cycling through the provided behaviors in order.
    #[must_use]
    pub const fn new(behaviors: Vec<Behavior>) -> Self {
        Self {
            behaviors,
            cursor: 0,
        }
    }

    /// Removes and returns the head of the cycle, wrapping at the end.
    ///
    /// Returns `None` when the program holds no behaviors at all.
    pub fn pop(&mut self) -> Option<Behavior> {
        let behavior = self.behaviors.get(self.cursor)?.clone();
        self.cursor = (self.cursor + 1) % self.behaviors.len();
        Some(behavior)
    }

    /// Number of behaviors in one full cycle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    /// Reports whether the program holds no behaviors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

/// A proposed relocation of a unit, not yet committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedMove {
    /// Unit attempting to relocate.
    pub unit: UnitId,
    /// Cell the unit currently occupies.
    pub from: GridPos,
    /// Cell the unit intends to occupy, possibly off-grid.
    pub to: GridPos,
    /// Direction of the attempted step, after modifier transforms.
    pub attempted: Direction,
    /// Whether the attempt stayed within the field bounds.
    pub succeeded: bool,
}

impl ProposedMove {
    /// Reports whether the proposal relocates the unit at all.
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

/// Result of evaluating a behavior against the current field state.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The behavior proposes a relocation.
    Moved(ProposedMove),
    /// The behavior requests a board effect.
    Mutated(Mutation),
    /// The behavior succeeded with no effect.
    Idle,
    /// The attempted effect was legal to try but cannot happen.
    Failed(String),
    /// Evaluation itself broke; the stepper logs this and treats the unit
    /// as having done nothing.
    Faulted(String),
}

/// A typed, multi-pass board effect.
///
/// Mutations reference all involved units by identifier so an instance can
/// be queued across substeps without borrowing the arena.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// A unit's committed relocation, recorded by movement resolution.
    UnitMoves {
        /// Unit that moved.
        unit: UnitId,
        /// Cell vacated.
        from: GridPos,
        /// Cell now occupied.
        to: GridPos,
    },
    /// A unit's movement was rejected; the attempted direction is kept for
    /// reporting.
    UnitBumps {
        /// Unit whose movement was rejected.
        unit: UnitId,
        /// Direction the unit attempted to move in.
        direction: Direction,
    },
    /// One unit strikes another.
    UnitAttacks {
        /// Unit dealing the blow.
        attacker: UnitId,
        /// Unit receiving the blow.
        receiver: UnitId,
    },
    /// A unit suffers damage.
    UnitTakesDamage {
        /// Unit damaged.
        unit: UnitId,
        /// Amount of damage dealt.
        amount: i32,
    },
    /// A unit leaves the field for the graveyard.
    UnitDies {
        /// Unit that died.
        unit: UnitId,
    },
    /// A carrier absorbs an item into its inventory.
    UnitPicksUp {
        /// Unit doing the carrying.
        carrier: UnitId,
        /// Item absorbed.
        item: UnitId,
    },
    /// A carrier wrests an item from another unit's inventory.
    UnitHandsOff {
        /// Unit taking possession.
        taker: UnitId,
        /// Unit losing possession.
        giver: UnitId,
        /// Item changing hands.
        item: UnitId,
    },
    /// A unit throws a held item toward a target cell.
    UnitThrowsItem {
        /// Unit releasing the item.
        thrower: UnitId,
        /// Item thrown.
        item: UnitId,
        /// Cell the item is aimed at.
        target: GridPos,
    },
    /// A modifier is attached to a unit.
    UnitChanged {
        /// Unit altered.
        unit: UnitId,
        /// Modifier attached.
        modifier: Modifier,
    },
    /// A unit shoves another, injecting a movement for the shoved unit
    /// before resolution runs.
    UnitPushes {
        /// Unit doing the shoving.
        pusher: UnitId,
        /// Unit displaced.
        pushed: UnitId,
        /// Direction of the shove.
        direction: Direction,
    },
}

impl Mutation {
    /// The mutation's runtime kind, used for reaction matching.
    #[must_use]
    pub const fn topic(&self) -> MutationTopic {
        match self {
            Mutation::UnitMoves { .. } => MutationTopic::Moves,
            Mutation::UnitBumps { .. } => MutationTopic::Bumps,
            Mutation::UnitAttacks { .. } => MutationTopic::Attacks,
            Mutation::UnitTakesDamage { .. } => MutationTopic::TakesDamage,
            Mutation::UnitDies { .. } => MutationTopic::Dies,
            Mutation::UnitPicksUp { .. } => MutationTopic::PicksUp,
            Mutation::UnitHandsOff { .. } => MutationTopic::HandsOff,
            Mutation::UnitThrowsItem { .. } => MutationTopic::ThrowsItem,
            Mutation::UnitChanged { .. } => MutationTopic::Changed,
            Mutation::UnitPushes { .. } => MutationTopic::Pushes,
        }
    }

    /// The unit the mutation is keyed to.
    #[must_use]
    pub const fn subject(&self) -> UnitId {
        match self {
            Mutation::UnitMoves { unit, .. }
            | Mutation::UnitBumps { unit, .. }
            | Mutation::UnitTakesDamage { unit, .. }
            | Mutation::UnitDies { unit }
            | Mutation::UnitChanged { unit, .. } => *unit,
            Mutation::UnitAttacks { attacker, .. } => *attacker,
            Mutation::UnitPicksUp { carrier, .. } => *carrier,
            Mutation::UnitHandsOff { taker, .. } => *taker,
            Mutation::UnitThrowsItem { thrower, .. } => *thrower,
            Mutation::UnitPushes { pusher, .. } => *pusher,
        }
    }
}

/// Discriminant of a [`Mutation`], matched by unit reactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationTopic {
    /// Matches [`Mutation::UnitMoves`].
    Moves,
    /// Matches [`Mutation::UnitBumps`].
    Bumps,
    /// Matches [`Mutation::UnitAttacks`].
    Attacks,
    /// Matches [`Mutation::UnitTakesDamage`].
    TakesDamage,
    /// Matches [`Mutation::UnitDies`].
    Dies,
    /// Matches [`Mutation::UnitPicksUp`].
    PicksUp,
    /// Matches [`Mutation::UnitHandsOff`].
    HandsOff,
    /// Matches [`Mutation::UnitThrowsItem`].
    ThrowsItem,
    /// Matches [`Mutation::UnitChanged`].
    Changed,
    /// Matches [`Mutation::UnitPushes`].
    Pushes,
}

/// A unit's registered response to mutations it is the subject of.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    topic: MutationTopic,
    effect: ReactionEffect,
}

impl Reaction {
    /// Creates a reaction that fires on mutations of the provided topic.
    #[must_use]
    pub const fn new(topic: MutationTopic, effect: ReactionEffect) -> Self {
        Self { topic, effect }
    }

    /// Topic the reaction listens for.
    #[must_use]
    pub const fn topic(&self) -> MutationTopic {
        self.topic
    }

    /// Effect emitted when the reaction fires.
    #[must_use]
    pub const fn effect(&self) -> &ReactionEffect {
        &self.effect
    }
}

/// Follow-up effect produced by a fired reaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReactionEffect {
    /// Attach a modifier to the reacting unit.
    AddModifier(Modifier),
}

/// One iteration of the mutation/movement fixpoint loop within a step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubstepReport {
    /// Mutations applied by the pipeline this substep, in application
    /// order.
    pub mutations: Vec<Mutation>,
    /// Committed relocations keyed by unit, old position first.
    pub movements: BTreeMap<UnitId, (GridPos, GridPos)>,
}

impl SubstepReport {
    /// Reports whether the substep changed nothing.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.mutations.is_empty() && self.movements.is_empty()
    }
}

/// One discrete tick of the play, composed of one or more substeps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Ordered substep reports.
    pub substeps: Vec<SubstepReport>,
}

impl StepReport {
    /// Reports whether the whole step changed nothing.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.substeps.iter().all(SubstepReport::is_quiet)
    }
}

/// Field bounds, ball spawn, and the row bands assigned to each role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldParams {
    columns: i32,
    rows: i32,
    ball_spawn: GridPos,
    home_depth: i32,
    away_depth: i32,
}

impl FieldParams {
    /// Creates field parameters.
    ///
    /// The away player's rows are the first `away_depth` rows, the home
    /// player's rows the last `home_depth`.
    #[must_use]
    pub const fn new(
        columns: i32,
        rows: i32,
        ball_spawn: GridPos,
        home_depth: i32,
        away_depth: i32,
    ) -> Self {
        Self {
            columns,
            rows,
            ball_spawn,
            home_depth,
            away_depth,
        }
    }

    /// Number of columns in the grid.
    #[must_use]
    pub const fn columns(&self) -> i32 {
        self.columns
    }

    /// Number of rows in the grid.
    #[must_use]
    pub const fn rows(&self) -> i32 {
        self.rows
    }

    /// Cell the ball spawns at when the play is built.
    #[must_use]
    pub const fn ball_spawn(&self) -> GridPos {
        self.ball_spawn
    }

    /// Reports whether the position lies within the field bounds.
    #[must_use]
    pub const fn contains(&self, pos: GridPos) -> bool {
        pos.column() >= 0 && pos.column() < self.columns && pos.row() >= 0 && pos.row() < self.rows
    }

    /// Role whose band contains the provided row, if any.
    #[must_use]
    pub const fn role_of_row(&self, row: i32) -> Option<PlayerRole> {
        if row >= 0 && row < self.away_depth {
            Some(PlayerRole::Away)
        } else if row >= self.rows - self.home_depth && row < self.rows {
            Some(PlayerRole::Home)
        } else {
            None
        }
    }
}

/// Errors raised by the play-resolution engine.
///
/// Gameplay-level impossibilities are represented as [`Outcome::Failed`]
/// or vetoed mutations, never as these errors; an error here means either
/// the host supplied an illegal input or the engine's own invariants broke.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A unit was asked to act with an empty action program.
    #[error("unit {0:?} has an empty action program")]
    EmptyProgram(UnitId),
    /// An identifier did not resolve to a unit in the arena.
    #[error("unknown unit {0:?}")]
    UnknownUnit(UnitId),
    /// The host referenced a cell outside the field bounds.
    #[error("position {0:?} is outside the field bounds")]
    OutOfBounds(GridPos),
    /// The host placed a unit onto an occupied cell.
    #[error("cell {0:?} is already occupied")]
    CellOccupied(GridPos),
    /// The engine's own bookkeeping became inconsistent; the play cannot
    /// continue.
    #[error("engine invariant violated: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::DeserializeOwned;

    #[test]
    fn direction_rotation_wraps_clockwise() {
        assert_eq!(
            Direction::North.rotated(Rotation::new(2)),
            Direction::East
        );
        assert_eq!(
            Direction::West.rotated(Rotation::new(3)),
            Direction::NorthEast
        );
        assert_eq!(
            Direction::South.rotated(Rotation::HALF_TURN),
            Direction::North
        );
    }

    #[test]
    fn mirroring_flips_horizontal_components() {
        assert_eq!(Direction::East.mirrored(), Direction::West);
        assert_eq!(Direction::NorthEast.mirrored(), Direction::NorthWest);
        assert_eq!(Direction::South.mirrored(), Direction::South);
    }

    #[test]
    fn rotation_composition_is_modular() {
        let five = Rotation::new(5);
        let four = Rotation::new(4);
        assert_eq!(five.compose(four), Rotation::new(1));
        assert_eq!(five.compose(five.inverse()), Rotation::IDENTITY);
        assert!(Rotation::new(8).is_identity());
    }

    #[test]
    fn direction_from_vector_uses_component_signs() {
        assert_eq!(
            Direction::from_vector(Vector::new(3, 0)),
            Some(Direction::East)
        );
        assert_eq!(
            Direction::from_vector(Vector::new(-2, 5)),
            Some(Direction::SouthWest)
        );
        assert_eq!(Direction::from_vector(Vector::new(0, 0)), None);
    }

    #[test]
    fn squared_distance_matches_expectation() {
        let origin = GridPos::new(1, 1);
        let destination = GridPos::new(4, 3);
        assert_eq!(origin.squared_distance(destination), 13);
        assert_eq!(destination.squared_distance(origin), 13);
    }

    #[test]
    fn field_params_assign_role_bands() {
        let params = FieldParams::new(5, 8, GridPos::new(2, 4), 2, 2);
        assert_eq!(params.role_of_row(0), Some(PlayerRole::Away));
        assert_eq!(params.role_of_row(1), Some(PlayerRole::Away));
        assert_eq!(params.role_of_row(4), None);
        assert_eq!(params.role_of_row(6), Some(PlayerRole::Home));
        assert_eq!(params.role_of_row(7), Some(PlayerRole::Home));
        assert!(params.contains(GridPos::new(0, 0)));
        assert!(!params.contains(GridPos::new(5, 0)));
        assert!(!params.contains(GridPos::new(-1, 3)));
    }

    #[test]
    fn mutation_subject_and_topic_agree() {
        let mutation = Mutation::UnitHandsOff {
            taker: UnitId::new(3),
            giver: UnitId::new(4),
            item: UnitId::new(5),
        };
        assert_eq!(mutation.topic(), MutationTopic::HandsOff);
        assert_eq!(mutation.subject(), UnitId::new(3));
    }

    fn assert_round_trip<T>(value: &T)
    where
        T: serde::Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let bytes = bincode::serialize(value).expect("serialize");
        let restored: T = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(&restored, value);
    }

    #[test]
    fn mutation_round_trips_through_bincode() {
        assert_round_trip(&Mutation::UnitThrowsItem {
            thrower: UnitId::new(1),
            item: UnitId::new(2),
            target: GridPos::new(3, 4),
        });
        assert_round_trip(&Mutation::UnitChanged {
            unit: UnitId::new(9),
            modifier: Modifier::Rotation(Rotation::HALF_TURN),
        });
    }

    #[test]
    fn step_report_round_trips_through_bincode() {
        let mut movements = BTreeMap::new();
        let _ = movements.insert(
            UnitId::new(7),
            (GridPos::new(1, 1), GridPos::new(1, 2)),
        );
        let report = StepReport {
            substeps: vec![SubstepReport {
                mutations: vec![Mutation::UnitBumps {
                    unit: UnitId::new(2),
                    direction: Direction::SouthWest,
                }],
                movements,
            }],
        };
        assert!(!report.is_quiet());
        assert_round_trip(&report);
    }

    #[test]
    fn action_program_cycles_and_refills() {
        let mut program = ActionProgram::new(vec![
            Behavior::new(BehaviorKind::Translate(Direction::North)),
            Behavior::new(BehaviorKind::DoNothing),
        ]);
        assert_eq!(program.len(), 2);
        assert_eq!(
            program.pop().expect("first").kind(),
            &BehaviorKind::Translate(Direction::North)
        );
        assert_eq!(program.pop().expect("second").kind(), &BehaviorKind::DoNothing);
        assert_eq!(
            program.pop().expect("wrapped").kind(),
            &BehaviorKind::Translate(Direction::North)
        );

        let mut empty = ActionProgram::new(Vec::new());
        assert!(empty.is_empty());
        assert!(empty.pop().is_none());
    }

    #[test]
    fn behavior_chaining_preserves_order() {
        let program = Behavior::new(BehaviorKind::Translate(Direction::North))
            .then(Behavior::new(BehaviorKind::ApplyModifier(Modifier::Flip)));
        assert_eq!(
            program.kind(),
            &BehaviorKind::Translate(Direction::North)
        );
        let successor = program.successor().expect("successor");
        assert_eq!(
            successor.kind(),
            &BehaviorKind::ApplyModifier(Modifier::Flip)
        );
        assert!(successor.successor().is_none());
    }
}
