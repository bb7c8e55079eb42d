#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative play state for the Gridball engine.
//!
//! The [`Field`] owns an arena of [`Unit`] values keyed by [`UnitId`], a
//! dense occupancy grid, and the graveyard. Every cross-reference between
//! units — inventory membership, the carrier back-reference, grid
//! occupancy — is stored as an identifier and resolved through the arena
//! at use time. Systems that should only observe mid-substep state receive
//! a [`FieldView`] instead of the field itself.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use gridball_core::{
    ActionProgram, Behavior, EngineError, FieldParams, GridPos, Modifier, Owner, Reaction,
    Rotation, Tag, UnitId,
};

/// Immutable description a unit is instantiated from.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitTemplate {
    name: String,
    max_health: i32,
    power: i32,
    tags: Vec<Tag>,
    program: Vec<Behavior>,
}

impl UnitTemplate {
    /// Creates a template with the provided stats, tags, and program.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        max_health: i32,
        power: i32,
        tags: Vec<Tag>,
        program: Vec<Behavior>,
    ) -> Self {
        Self {
            name: name.into(),
            max_health,
            power,
            tags,
            program,
        }
    }

    /// Display name of the template.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Mutable simulation entity living in the field arena.
#[derive(Clone, Debug)]
pub struct Unit {
    id: UnitId,
    owner: Owner,
    name: String,
    max_health: i32,
    power: i32,
    damage_taken: i32,
    modifiers: Vec<Modifier>,
    program: ActionProgram,
    tags: BTreeSet<Tag>,
    inventory: Vec<UnitId>,
    carried_by: Option<UnitId>,
    reactions: Vec<Reaction>,
    position: Option<GridPos>,
}

impl Unit {
    fn from_template(id: UnitId, owner: Owner, template: &UnitTemplate) -> Self {
        Self {
            id,
            owner,
            name: template.name.clone(),
            max_health: template.max_health,
            power: template.power,
            damage_taken: 0,
            modifiers: Vec::new(),
            program: ActionProgram::new(template.program.clone()),
            tags: template.tags.iter().copied().collect(),
            inventory: Vec::new(),
            carried_by: None,
            reactions: Vec::new(),
            position: None,
        }
    }

    /// Identifier of the unit.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// Owner of the unit.
    #[must_use]
    pub const fn owner(&self) -> Owner {
        self.owner
    }

    /// Display name inherited from the template.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base attack power.
    #[must_use]
    pub const fn power(&self) -> i32 {
        self.power
    }

    /// Maximum health from the template.
    #[must_use]
    pub const fn max_health(&self) -> i32 {
        self.max_health
    }

    /// Health remaining after accumulated damage.
    #[must_use]
    pub const fn current_health(&self) -> i32 {
        self.max_health - self.damage_taken
    }

    /// Reports whether accumulated damage has exhausted the unit's health.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current_health() <= 0
    }

    /// Records damage dealt to the unit.
    pub fn apply_damage(&mut self, amount: i32) {
        self.damage_taken += amount;
    }

    /// Removes and returns the head of the action cycle.
    ///
    /// An empty program is a configuration error, not a gameplay failure.
    pub fn pop_action(&mut self) -> Result<Behavior, EngineError> {
        self.program
            .pop()
            .ok_or(EngineError::EmptyProgram(self.id))
    }

    /// Appends a modifier, letting it recompute itself against the
    /// modifiers already present.
    ///
    /// A rotation added while an odd number of inversion markers is
    /// stacked is negated before insertion.
    pub fn add_modifier(&mut self, modifier: Modifier) {
        let inversions = self
            .modifiers
            .iter()
            .filter(|m| matches!(m, Modifier::InvertRotation))
            .count();
        let recomputed = match modifier {
            Modifier::Rotation(rotation) if inversions % 2 == 1 => {
                Modifier::Rotation(rotation.inverse())
            }
            other => other,
        };
        self.modifiers.push(recomputed);
    }

    /// Registers a reaction fired when a matching mutation names this unit
    /// as its subject.
    pub fn add_reaction(&mut self, reaction: Reaction) {
        self.reactions.push(reaction);
    }

    /// Folds all rotation modifiers in insertion order.
    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.modifiers
            .iter()
            .fold(Rotation::IDENTITY, |acc, modifier| match modifier {
                Modifier::Rotation(rotation) => acc.compose(*rotation),
                _ => acc,
            })
    }

    /// Folds all flip modifiers; an even count cancels out.
    #[must_use]
    pub fn flip(&self) -> bool {
        self.modifiers
            .iter()
            .filter(|m| matches!(m, Modifier::Flip))
            .count()
            % 2
            == 1
    }

    /// Most recent setting stored under the provided key, if any.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<i32> {
        self.modifiers.iter().rev().find_map(|modifier| match modifier {
            Modifier::Setting { key: k, value } if k == key => Some(*value),
            _ => None,
        })
    }

    /// Reports whether the unit carries the provided tag.
    #[must_use]
    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    /// Tags describing the unit.
    #[must_use]
    pub const fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    /// Identifiers of the units this unit carries, in pickup order.
    #[must_use]
    pub fn inventory(&self) -> &[UnitId] {
        &self.inventory
    }

    /// First carried item, if any.
    #[must_use]
    pub fn first_item(&self) -> Option<UnitId> {
        self.inventory.first().copied()
    }

    /// Identifier of the unit carrying this one, if nested.
    #[must_use]
    pub const fn carried_by(&self) -> Option<UnitId> {
        self.carried_by
    }

    /// Reactions registered on the unit.
    #[must_use]
    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    /// Reports whether this unit may strike the other.
    ///
    /// Requires the other unit to belong to a different, non-neutral
    /// owner; defenders never initiate, and neither the ball nor items are
    /// legal targets.
    #[must_use]
    pub fn can_attack(&self, other: &Unit) -> bool {
        matches!(other.owner, Owner::Player(_))
            && other.owner != self.owner
            && !self.has_tag(Tag::Defender)
            && !other.has_tag(Tag::TheBall)
            && !other.has_tag(Tag::Item)
    }

    /// Reports whether this unit may absorb the other into its inventory.
    ///
    /// A unit that itself carries something can no longer be picked up.
    #[must_use]
    pub fn can_pick_up(&self, other: &Unit) -> bool {
        self.has_tag(Tag::Carrier) && other.has_tag(Tag::Item) && other.inventory.is_empty()
    }
}

/// Tally of where every arena unit currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Census {
    /// Units occupying a grid cell.
    pub on_field: usize,
    /// Units nested inside another unit's inventory.
    pub nested: usize,
    /// Units in the graveyard.
    pub buried: usize,
}

impl Census {
    /// Total number of units accounted for.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.on_field + self.nested + self.buried
    }
}

/// Authoritative play state: unit arena, occupancy grid, and graveyard.
#[derive(Clone, Debug)]
pub struct Field {
    params: FieldParams,
    units: BTreeMap<UnitId, Unit>,
    grid: OccupancyGrid,
    graveyard: Vec<UnitId>,
    next_id: u32,
}

impl Field {
    /// Creates an empty field with the provided parameters.
    #[must_use]
    pub fn new(params: FieldParams) -> Self {
        Self {
            params,
            units: BTreeMap::new(),
            grid: OccupancyGrid::new(params.columns(), params.rows()),
            graveyard: Vec::new(),
            next_id: 0,
        }
    }

    /// Field bounds and role bands.
    #[must_use]
    pub const fn params(&self) -> &FieldParams {
        &self.params
    }

    /// Captures a read-only view of the field.
    #[must_use]
    pub const fn view(&self) -> FieldView<'_> {
        FieldView { field: self }
    }

    /// Instantiates a template onto the grid, allocating a fresh
    /// identifier.
    pub fn spawn(
        &mut self,
        template: &UnitTemplate,
        owner: Owner,
        at: GridPos,
    ) -> Result<UnitId, EngineError> {
        if !self.params.contains(at) {
            return Err(EngineError::OutOfBounds(at));
        }
        if self.grid.occupant(at).is_some() {
            return Err(EngineError::CellOccupied(at));
        }

        let id = UnitId::new(self.next_id);
        self.next_id += 1;
        let mut unit = Unit::from_template(id, owner, template);
        unit.position = Some(at);
        self.grid.occupy(id, at);
        let _ = self.units.insert(id, unit);
        Ok(id)
    }

    /// Resolves an identifier to its unit, dead or alive.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Resolves an identifier to its unit for mutation.
    #[must_use]
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    /// Unit occupying the provided cell, if any.
    #[must_use]
    pub fn occupant(&self, pos: GridPos) -> Option<UnitId> {
        self.grid.occupant(pos)
    }

    /// Grid position of the unit, `None` when nested or buried.
    #[must_use]
    pub fn position_of(&self, id: UnitId) -> Option<GridPos> {
        self.units.get(&id).and_then(|unit| unit.position)
    }

    /// Identifiers of every gridded unit, in ascending order.
    #[must_use]
    pub fn on_field_ids(&self) -> Vec<UnitId> {
        self.units
            .values()
            .filter(|unit| unit.position.is_some())
            .map(Unit::id)
            .collect()
    }

    /// Units that have died this play, in death order.
    #[must_use]
    pub fn graveyard(&self) -> &[UnitId] {
        &self.graveyard
    }

    /// Reports whether the unit has been moved to the graveyard.
    #[must_use]
    pub fn is_buried(&self, id: UnitId) -> bool {
        self.graveyard.contains(&id)
    }

    /// Moves a unit off the grid (or out of its carrier) into the
    /// graveyard.
    ///
    /// Returns the cell the unit vacated when it was gridded.
    pub fn bury(&mut self, id: UnitId) -> Result<Option<GridPos>, EngineError> {
        if self.is_buried(id) {
            return Err(EngineError::InvariantViolation(format!(
                "unit {id:?} buried twice"
            )));
        }
        let carrier = {
            let unit = self.units.get(&id).ok_or(EngineError::UnknownUnit(id))?;
            unit.carried_by
        };
        if let Some(holder) = carrier {
            self.release_from(holder, id)?;
        }

        let unit = self.units.get_mut(&id).ok_or(EngineError::UnknownUnit(id))?;
        let vacated = unit.position.take();
        if let Some(pos) = vacated {
            self.grid.vacate(pos);
        }
        self.graveyard.push(id);
        Ok(vacated)
    }

    /// Removes a gridded unit from its cell without burying it, e.g. just
    /// before it is absorbed into an inventory.
    pub fn lift(&mut self, id: UnitId) -> Result<GridPos, EngineError> {
        let unit = self.units.get_mut(&id).ok_or(EngineError::UnknownUnit(id))?;
        let pos = unit.position.take().ok_or_else(|| {
            EngineError::InvariantViolation(format!("unit {id:?} lifted while off the grid"))
        })?;
        self.grid.vacate(pos);
        Ok(pos)
    }

    /// Places a live, off-grid unit onto an empty cell.
    pub fn drop_at(&mut self, id: UnitId, pos: GridPos) -> Result<(), EngineError> {
        if !self.params.contains(pos) {
            return Err(EngineError::OutOfBounds(pos));
        }
        if self.grid.occupant(pos).is_some() {
            return Err(EngineError::CellOccupied(pos));
        }
        let unit = self.units.get_mut(&id).ok_or(EngineError::UnknownUnit(id))?;
        if unit.position.is_some() {
            return Err(EngineError::InvariantViolation(format!(
                "unit {id:?} dropped while still gridded"
            )));
        }
        if unit.carried_by.is_some() {
            return Err(EngineError::InvariantViolation(format!(
                "unit {id:?} dropped while still carried"
            )));
        }
        unit.position = Some(pos);
        self.grid.occupy(id, pos);
        Ok(())
    }

    /// Inserts an off-grid item into a carrier's inventory and records the
    /// back-reference.
    pub fn absorb_into(&mut self, carrier: UnitId, item: UnitId) -> Result<(), EngineError> {
        {
            let unit = self
                .units
                .get(&item)
                .ok_or(EngineError::UnknownUnit(item))?;
            if unit.position.is_some() || unit.carried_by.is_some() {
                return Err(EngineError::InvariantViolation(format!(
                    "unit {item:?} absorbed while still placed"
                )));
            }
        }
        {
            let holder = self
                .units
                .get_mut(&carrier)
                .ok_or(EngineError::UnknownUnit(carrier))?;
            holder.inventory.push(item);
        }
        if let Some(unit) = self.units.get_mut(&item) {
            unit.carried_by = Some(carrier);
        }
        Ok(())
    }

    /// Removes an item from a holder's inventory and clears the
    /// back-reference.
    pub fn release_from(&mut self, holder: UnitId, item: UnitId) -> Result<(), EngineError> {
        {
            let unit = self
                .units
                .get_mut(&holder)
                .ok_or(EngineError::UnknownUnit(holder))?;
            let index = unit.inventory.iter().position(|id| *id == item).ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "unit {holder:?} does not carry {item:?}"
                ))
            })?;
            let _ = unit.inventory.remove(index);
        }
        if let Some(unit) = self.units.get_mut(&item) {
            unit.carried_by = None;
        }
        Ok(())
    }

    /// Reports whether the unit's inventory contains the ball.
    #[must_use]
    pub fn unit_holds_ball(&self, id: UnitId) -> bool {
        self.units.get(&id).is_some_and(|unit| {
            unit.inventory.iter().any(|item| {
                self.units
                    .get(item)
                    .is_some_and(|carried| carried.has_tag(Tag::TheBall))
            })
        })
    }

    /// Cell the ball currently occupies, following the carrier when the
    /// ball is nested.
    #[must_use]
    pub fn ball_position(&self) -> Option<GridPos> {
        let ball = self
            .units
            .values()
            .find(|unit| unit.has_tag(Tag::TheBall))?;
        if let Some(pos) = ball.position {
            return Some(pos);
        }
        let carrier = ball.carried_by?;
        self.position_of(carrier)
    }

    /// Clears the grid and re-places every provided unit at its resolved
    /// position, the commit stage of movement resolution.
    pub fn reseat(&mut self, placements: &[(UnitId, GridPos)]) -> Result<(), EngineError> {
        let mut seen: BTreeSet<GridPos> = BTreeSet::new();
        for (id, pos) in placements {
            if !self.params.contains(*pos) {
                return Err(EngineError::OutOfBounds(*pos));
            }
            if !seen.insert(*pos) {
                return Err(EngineError::InvariantViolation(format!(
                    "two units committed to cell {pos:?}"
                )));
            }
            if !self.units.contains_key(id) {
                return Err(EngineError::UnknownUnit(*id));
            }
        }

        self.grid.clear();
        for unit in self.units.values_mut() {
            if unit.position.is_some() {
                unit.position = None;
            }
        }
        for (id, pos) in placements {
            if let Some(unit) = self.units.get_mut(id) {
                unit.position = Some(*pos);
            }
            self.grid.occupy(*id, *pos);
        }
        Ok(())
    }

    /// Tally of unit whereabouts, used to check conservation.
    #[must_use]
    pub fn census(&self) -> Census {
        let on_field = self
            .units
            .values()
            .filter(|unit| unit.position.is_some())
            .count();
        let nested = self
            .units
            .values()
            .filter(|unit| unit.carried_by.is_some())
            .count();
        Census {
            on_field,
            nested,
            buried: self.graveyard.len(),
        }
    }
}

/// Read-only wrapper preventing mutation by components that should only
/// observe mid-substep state.
#[derive(Clone, Copy, Debug)]
pub struct FieldView<'a> {
    field: &'a Field,
}

impl<'a> FieldView<'a> {
    /// Field bounds and role bands.
    #[must_use]
    pub const fn params(&self) -> &FieldParams {
        self.field.params()
    }

    /// Resolves an identifier to its unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&'a Unit> {
        self.field.unit(id)
    }

    /// Unit occupying the provided cell, if any.
    #[must_use]
    pub fn occupant(&self, pos: GridPos) -> Option<UnitId> {
        self.field.occupant(pos)
    }

    /// Grid position of the unit, `None` when nested or buried.
    #[must_use]
    pub fn position_of(&self, id: UnitId) -> Option<GridPos> {
        self.field.position_of(id)
    }

    /// Identifiers of every gridded unit, in ascending order.
    #[must_use]
    pub fn on_field_ids(&self) -> Vec<UnitId> {
        self.field.on_field_ids()
    }

    /// Cell the ball currently occupies, following its carrier.
    #[must_use]
    pub fn ball_position(&self) -> Option<GridPos> {
        self.field.ball_position()
    }

    /// Reports whether the unit's inventory contains the ball.
    #[must_use]
    pub fn unit_holds_ball(&self, id: UnitId) -> bool {
        self.field.unit_holds_ball(id)
    }

    /// Units that have died this play, in death order.
    #[must_use]
    pub fn graveyard(&self) -> &'a [UnitId] {
        self.field.graveyard()
    }

    /// Tally of unit whereabouts.
    #[must_use]
    pub fn census(&self) -> Census {
        self.field.census()
    }
}

/// Query helpers that flatten the field into plain snapshots.
pub mod query {
    use super::{FieldView, Unit};
    use gridball_core::{GridPos, Owner, Tag, UnitId};

    /// Immutable representation of a single unit's state.
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct UnitSnapshot {
        /// Identifier of the unit.
        pub id: UnitId,
        /// Owner of the unit.
        pub owner: Owner,
        /// Grid position, `None` when nested or buried.
        pub position: Option<GridPos>,
        /// Health remaining.
        pub health: i32,
        /// Identifiers carried in the unit's inventory.
        pub carrying: Vec<UnitId>,
        /// Tags describing the unit.
        pub tags: Vec<Tag>,
    }

    /// Captures snapshots of every arena unit in deterministic order.
    #[must_use]
    pub fn unit_snapshots(view: &FieldView<'_>) -> Vec<UnitSnapshot> {
        let mut ids: Vec<UnitId> = view.on_field_ids();
        ids.extend(view.graveyard().iter().copied());
        let mut snapshots: Vec<UnitSnapshot> = Vec::new();
        let mut seen: Vec<UnitId> = Vec::new();
        let mut queue: Vec<UnitId> = ids;
        while let Some(id) = queue.pop() {
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            if let Some(unit) = view.unit(id) {
                queue.extend(unit.inventory().iter().copied());
                snapshots.push(snapshot_of(unit, view));
            }
        }
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }

    fn snapshot_of(unit: &Unit, view: &FieldView<'_>) -> UnitSnapshot {
        UnitSnapshot {
            id: unit.id(),
            owner: unit.owner(),
            position: view.position_of(unit.id()),
            health: unit.current_health(),
            carrying: unit.inventory().to_vec(),
            tags: unit.tags().iter().copied().collect(),
        }
    }
}

#[derive(Clone, Debug)]
struct OccupancyGrid {
    columns: i32,
    rows: i32,
    cells: Vec<Option<UnitId>>,
}

impl OccupancyGrid {
    fn new(columns: i32, rows: i32) -> Self {
        let capacity = usize::try_from(columns.max(0)).unwrap_or(0)
            * usize::try_from(rows.max(0)).unwrap_or(0);
        Self {
            columns,
            rows,
            cells: vec![None; capacity],
        }
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        if pos.column() < 0 || pos.column() >= self.columns || pos.row() < 0 || pos.row() >= self.rows
        {
            return None;
        }
        let row = usize::try_from(pos.row()).ok()?;
        let column = usize::try_from(pos.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        Some(row * width + column)
    }

    fn occupant(&self, pos: GridPos) -> Option<UnitId> {
        self.index(pos)
            .and_then(|index| self.cells.get(index).copied().flatten())
    }

    fn occupy(&mut self, id: UnitId, pos: GridPos) {
        if let Some(index) = self.index(pos) {
            if let Some(slot) = self.cells.get_mut(index) {
                *slot = Some(id);
            }
        }
    }

    fn vacate(&mut self, pos: GridPos) {
        if let Some(index) = self.index(pos) {
            if let Some(slot) = self.cells.get_mut(index) {
                *slot = None;
            }
        }
    }

    fn clear(&mut self) {
        self.cells.fill(None);
    }
}
