//! Oscillation detection for the active-set loop.
//!
//! A degenerate working-set sequence can add and remove the same constraint
//! forever. The handler keeps a short history of working-set operations and
//! counts add/remove flips of the same constraint; past the configured
//! budget it widens that constraint's bounds slightly and asks the solver to
//! stop after the current iteration.

use std::collections::VecDeque;

use crate::objective::Objective;
use crate::problem::{ConstraintId, OperationType, TerminationStatus};

/// Operations remembered for flip detection.
const HISTORY_LEN: usize = 8;

pub(crate) struct CyclingHandler {
    max_counter: usize,
    relax_step: f64,
    counter: usize,
    history: VecDeque<(OperationType, ConstraintId)>,
}

impl CyclingHandler {
    pub(crate) fn new() -> Self {
        Self {
            max_counter: 50,
            relax_step: 1e-8,
            counter: 0,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub(crate) fn set_max_counter(&mut self, max_counter: usize) {
        self.max_counter = max_counter;
    }

    pub(crate) fn set_relax_step(&mut self, relax_step: f64) {
        self.relax_step = relax_step;
    }

    pub(crate) fn counter(&self) -> usize {
        self.counter
    }

    pub(crate) fn reset(&mut self) {
        self.counter = 0;
        self.history.clear();
    }

    /// Record a working-set operation.
    ///
    /// Returns the termination status to adopt when the repetition budget is
    /// exhausted; the oscillating constraint's bounds have been relaxed by
    /// then.
    pub(crate) fn update(
        &mut self,
        op: OperationType,
        id: ConstraintId,
        objectives: &mut [Objective],
        n_iteration: usize,
    ) -> Option<TerminationStatus> {
        let flip = self
            .history
            .iter()
            .any(|(prev_op, prev_id)| *prev_op != op && prev_id.same_constraint(&id));

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back((op, id));

        if !flip {
            return None;
        }
        self.counter += 1;
        if self.counter < self.max_counter {
            return None;
        }

        log::debug!(
            "cycling on objective {} row {} detected at iteration {}; relaxing bounds by {}",
            id.obj,
            id.row,
            n_iteration,
            self.relax_step
        );
        objectives[id.obj].relax_bounds(id.row, self.relax_step);
        Some(TerminationStatus::SolvedCyclingHandling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{ActivationStatus, ObjectiveKind};
    use nalgebra::dmatrix;

    fn one_row_objective() -> Vec<Objective> {
        let mut obj = Objective::new(ObjectiveKind::General, 1, 1);
        obj.set_data_general(&dmatrix![1.0, 0.0, 1.0]).unwrap();
        vec![obj]
    }

    fn id() -> ConstraintId {
        ConstraintId { obj: 0, row: 0, status: ActivationStatus::ActiveUb }
    }

    #[test]
    fn counts_add_remove_flips() {
        let mut objectives = one_row_objective();
        let mut handler = CyclingHandler::new();
        handler.set_max_counter(3);

        for it in 0..4 {
            assert_eq!(
                handler.update(OperationType::Add, id(), &mut objectives, 2 * it),
                None
            );
            let status =
                handler.update(OperationType::Remove, id(), &mut objectives, 2 * it + 1);
            if handler.counter() >= 3 {
                assert_eq!(status, Some(TerminationStatus::SolvedCyclingHandling));
                break;
            }
            assert_eq!(status, None);
        }
        assert!(handler.counter() >= 3);
    }

    #[test]
    fn distinct_constraints_do_not_count() {
        let mut objectives = one_row_objective();
        let mut handler = CyclingHandler::new();
        handler.set_max_counter(1);

        let other = ConstraintId { obj: 0, row: 1, status: ActivationStatus::ActiveLb };
        assert_eq!(
            handler.update(OperationType::Add, id(), &mut objectives, 0),
            None
        );
        assert_eq!(
            handler.update(OperationType::Remove, other, &mut objectives, 1),
            None
        );
        assert_eq!(handler.counter(), 0);
    }

    #[test]
    fn relaxation_widens_bounds() {
        let mut objectives = one_row_objective();
        let mut handler = CyclingHandler::new();
        handler.set_max_counter(1);
        handler.set_relax_step(0.5);

        handler.update(OperationType::Add, id(), &mut objectives, 0);
        let status = handler.update(OperationType::Remove, id(), &mut objectives, 1);
        assert_eq!(status, Some(TerminationStatus::SolvedCyclingHandling));
        let (lb, ub) = objectives[0].bounds(0);
        assert_eq!(lb, -0.5);
        assert_eq!(ub, 1.5);
    }
}
