#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! The play stepper: the outer loop that drives a Gridball play.
//!
//! Each call to [`PlayStepper::step`] pops one behavior from every gridded
//! unit's program, evaluates the batch against a read-only view, and then
//! loops substeps to a fixpoint: pending mutations run through the
//! pipeline, proposed moves run through resolution, and everything either
//! side produced — follow-ups, bumps, attacks, chained behaviors — feeds
//! the next substep. The loop ends when nothing is left to apply, so every
//! consequence of a step lands inside that same step's report.
//!
//! Finishing is host-driven: the stepper flags quiescent steps through
//! [`PlayStepper::can_end`] but keeps stepping until [`PlayStepper::finish`]
//! is called or the step cap trips.

use gridball_core::{
    Behavior, EngineError, Mutation, Outcome, ProposedMove, StepReport, SubstepReport, Tag,
    UnitId,
};
use gridball_field::{Field, FieldView};
use gridball_system_mutation::{early_moves, run_batch};
use gridball_system_resolve::resolve;

/// Steps after which a play is forcibly finished.
pub const STEP_CAP: u32 = 100;

/// Substeps after which the within-step fixpoint is declared divergent.
const SUBSTEP_CAP: usize = 100;

/// Drives a play on an owned field, one step at a time.
#[derive(Debug)]
pub struct PlayStepper {
    field: Field,
    finished: bool,
    steps_taken: u32,
    quiescent: bool,
}

impl PlayStepper {
    /// Wraps a fully set-up field into a stepper at step zero.
    #[must_use]
    pub const fn new(field: Field) -> Self {
        Self {
            field,
            finished: false,
            steps_taken: 0,
            quiescent: false,
        }
    }

    /// Read-only view of the current play state.
    #[must_use]
    pub const fn field(&self) -> FieldView<'_> {
        self.field.view()
    }

    /// Number of steps executed so far.
    #[must_use]
    pub const fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    /// Reports whether the play has been finished.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reports whether the most recent step changed nothing, the signal
    /// the host watches to decide when to call [`PlayStepper::finish`].
    #[must_use]
    pub const fn can_end(&self) -> bool {
        self.quiescent
    }

    /// Marks the play finished; subsequent steps report nothing.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Consumes the stepper, returning the final play state.
    #[must_use]
    pub fn into_field(self) -> Field {
        self.field
    }

    /// Executes one step of the play.
    ///
    /// A finished play returns an empty report. Reaching the step cap
    /// finishes the play after the report is produced.
    pub fn step(&mut self) -> Result<StepReport, EngineError> {
        if self.finished {
            return Ok(StepReport::default());
        }

        let mut proposals: Vec<ProposedMove> = Vec::new();
        let mut pending: Vec<Mutation> = Vec::new();
        let mut chained: Vec<(UnitId, Behavior)> = Vec::new();

        // Pop every actor's behavior first, then evaluate the whole batch
        // against one consistent view of the field.
        let actors = self.field.on_field_ids();
        let mut popped: Vec<(UnitId, Behavior)> = Vec::with_capacity(actors.len());
        for id in actors {
            let unit = self
                .field
                .unit_mut(id)
                .ok_or(EngineError::UnknownUnit(id))?;
            popped.push((id, unit.pop_action()?));
        }
        {
            let view = self.field.view();
            for (id, behavior) in &popped {
                collect(*id, behavior, &view, &mut proposals, &mut pending, &mut chained);
            }
            pending.extend(push_mutations(&view, &proposals));
        }

        let mut report = StepReport::default();
        let mut substeps = 0usize;
        while !(proposals.is_empty() && pending.is_empty() && chained.is_empty()) {
            substeps += 1;
            if substeps > SUBSTEP_CAP {
                return Err(EngineError::InvariantViolation(
                    "substep fixpoint did not converge".into(),
                ));
            }

            let batch = std::mem::take(&mut pending);
            let mut moves = std::mem::take(&mut proposals);
            moves.extend(early_moves(&self.field, &batch));

            let output = run_batch(&mut self.field, batch)?;
            // The pipeline may have buried or nested a mover; its proposal
            // no longer departs from a cell it occupies.
            moves.retain(|proposal| {
                self.field.position_of(proposal.unit) == Some(proposal.from)
            });
            let resolution = resolve(&self.field.view(), &moves)?;
            self.field.reseat(&resolution.placements)?;

            pending.extend(output.follow_ups);
            pending.extend(resolution.mutations.iter().cloned());

            // Chained behaviors see the field as the earlier substep left
            // it; units that left the grid forfeit their successors.
            let followers = std::mem::take(&mut chained);
            {
                let view = self.field.view();
                for (id, behavior) in &followers {
                    if view.position_of(*id).is_none() {
                        continue;
                    }
                    collect(*id, behavior, &view, &mut proposals, &mut pending, &mut chained);
                }
            }

            report.substeps.push(SubstepReport {
                mutations: output.applied,
                movements: resolution.movements,
            });
        }

        self.quiescent = report.is_quiet();
        self.steps_taken += 1;
        if self.steps_taken >= STEP_CAP {
            self.finished = true;
        }
        Ok(report)
    }

    /// Steps until the play goes quiescent or hits the step cap, finishing
    /// it either way.
    pub fn step_to_finish(&mut self) -> Result<Vec<StepReport>, EngineError> {
        let mut reports = Vec::new();
        while !self.finished {
            reports.push(self.step()?);
            if self.quiescent {
                self.finish();
            }
        }
        Ok(reports)
    }
}

/// Sorts one evaluated outcome into the substep's work queues.
fn collect(
    unit: UnitId,
    behavior: &Behavior,
    view: &FieldView<'_>,
    proposals: &mut Vec<ProposedMove>,
    pending: &mut Vec<Mutation>,
    chained: &mut Vec<(UnitId, Behavior)>,
) {
    match gridball_system_behavior::evaluate(unit, behavior.kind(), view) {
        Outcome::Moved(proposal) => proposals.push(proposal),
        Outcome::Mutated(mutation) => pending.push(mutation),
        Outcome::Idle | Outcome::Failed(_) => {}
        Outcome::Faulted(reason) => {
            tracing::warn!(unit = unit.get(), %reason, "behavior evaluation faulted");
            return;
        }
    }
    if let Some(next) = behavior.successor() {
        chained.push((unit, next.clone()));
    }
}

/// Queues a shove for every pusher stepping onto an occupied cell.
fn push_mutations(view: &FieldView<'_>, proposals: &[ProposedMove]) -> Vec<Mutation> {
    let mut pushes = Vec::new();
    for proposal in proposals {
        if !proposal.succeeded {
            continue;
        }
        let Some(pusher) = view.unit(proposal.unit) else {
            continue;
        };
        if !pusher.has_tag(Tag::Pusher) {
            continue;
        }
        let Some(occupant) = view.occupant(proposal.to) else {
            continue;
        };
        if occupant == proposal.unit {
            continue;
        }
        pushes.push(Mutation::UnitPushes {
            pusher: proposal.unit,
            pushed: occupant,
            direction: proposal.attempted,
        });
    }
    pushes
}
