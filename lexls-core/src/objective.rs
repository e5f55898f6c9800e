//! One priority level: row data, working set, residual bookkeeping.
//!
//! The row storage is a tagged variant so that simple bounds never pay for a
//! dense coefficient matrix; the working-set machinery is shared.

use nalgebra::{DMatrix, DVector};

use crate::error::{LexError, LexResult};
use crate::lexlse::LexLse;
use crate::problem::{ActivationStatus, ObjectiveKind, BOUND_EQ_TOL};

/// Row data of one priority level.
enum ObjectiveData {
    /// `l <= A x <= u`
    General {
        a: DMatrix<f64>,
        lb: DVector<f64>,
        ub: DVector<f64>,
    },
    /// `l <= x[var] <= u`, one distinct variable per row
    Bounds {
        var: Vec<usize>,
        lb: DVector<f64>,
        ub: DVector<f64>,
    },
}

/// One objective of the hierarchy.
///
/// Besides the residual `v` and its step `dv`, the objective tracks the raw
/// row values `ax = A x` (resp. `x[var]`) and their step `dax`; the blocking
/// test runs on those so that it also catches rows that are already violated
/// at the current iterate.
pub(crate) struct Objective {
    data: ObjectiveData,
    n_var: usize,
    dim: usize,
    ctr_type: Vec<ActivationStatus>,
    /// Working set in insertion order; removals shift later entries up.
    active: Vec<usize>,
    v: DVector<f64>,
    dv: DVector<f64>,
    ax: DVector<f64>,
    dax: DVector<f64>,
    /// Damping factor forwarded to the equality solver (general rows only).
    mu: f64,
    /// User-supplied initial residual, consumed by `phase1`.
    v0: Option<DVector<f64>>,
}

impl Objective {
    pub(crate) fn new(kind: ObjectiveKind, dim: usize, n_var: usize) -> Self {
        let data = match kind {
            ObjectiveKind::General => ObjectiveData::General {
                a: DMatrix::zeros(dim, n_var),
                lb: DVector::zeros(dim),
                ub: DVector::zeros(dim),
            },
            ObjectiveKind::SimpleBounds => ObjectiveData::Bounds {
                var: vec![0; dim],
                lb: DVector::zeros(dim),
                ub: DVector::zeros(dim),
            },
        };
        Self {
            data,
            n_var,
            dim,
            ctr_type: vec![ActivationStatus::Inactive; dim],
            active: Vec::with_capacity(dim),
            v: DVector::zeros(dim),
            dv: DVector::zeros(dim),
            ax: DVector::zeros(dim),
            dax: DVector::zeros(dim),
            mu: 0.0,
            v0: None,
        }
    }

    pub(crate) fn dim(&self) -> usize {
        self.dim
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn is_active(&self, row: usize) -> bool {
        self.ctr_type[row].is_active()
    }

    pub(crate) fn ctr_type(&self, row: usize) -> ActivationStatus {
        self.ctr_type[row]
    }

    /// Row index of the `k`-th working-set entry.
    pub(crate) fn active_row(&self, k: usize) -> usize {
        self.active[k]
    }

    /// Activation side of the `k`-th working-set entry.
    pub(crate) fn active_type(&self, k: usize) -> ActivationStatus {
        self.ctr_type[self.active[k]]
    }

    pub(crate) fn v(&self) -> &DVector<f64> {
        &self.v
    }

    pub(crate) fn dv(&self) -> &DVector<f64> {
        &self.dv
    }

    pub(crate) fn regularization(&self) -> f64 {
        self.mu
    }

    pub(crate) fn set_regularization(&mut self, mu: f64) -> LexResult<()> {
        if !(mu >= 0.0) {
            return Err(LexError::InvalidInput(format!(
                "regularization factor must be non-negative, got {mu}"
            )));
        }
        if matches!(self.data, ObjectiveData::Bounds { .. }) {
            log::warn!("regularization of a simple-bounds objective is ignored");
            return Ok(());
        }
        self.mu = mu;
        Ok(())
    }

    pub(crate) fn set_v0(&mut self, v0: &DVector<f64>) -> LexResult<()> {
        if v0.len() != self.dim {
            return Err(LexError::InvalidInput(format!(
                "initial residual has length {}, expected {}",
                v0.len(),
                self.dim
            )));
        }
        self.v0 = Some(v0.clone());
        Ok(())
    }

    /// Set the rows of a general objective from `[A | l | u]`.
    ///
    /// Rows whose bounds coincide are activated as equalities; the previous
    /// working set is discarded.
    pub(crate) fn set_data_general(&mut self, data: &DMatrix<f64>) -> LexResult<()> {
        let (dim, n_var) = (self.dim, self.n_var);
        match &mut self.data {
            ObjectiveData::General { a, lb, ub } => {
                if data.nrows() != dim || data.ncols() != n_var + 2 {
                    return Err(LexError::InvalidInput(format!(
                        "data has shape {}x{}, expected {}x{}",
                        data.nrows(),
                        data.ncols(),
                        dim,
                        n_var + 2
                    )));
                }
                for i in 0..dim {
                    let (bl, bu) = (data[(i, n_var)], data[(i, n_var + 1)]);
                    if (bl - bu).abs() >= BOUND_EQ_TOL && bl > bu {
                        return Err(LexError::InvalidInput(format!(
                            "row {i}: lower bound {bl} exceeds upper bound {bu}"
                        )));
                    }
                }
                for i in 0..dim {
                    for j in 0..n_var {
                        a[(i, j)] = data[(i, j)];
                    }
                    lb[i] = data[(i, n_var)];
                    ub[i] = data[(i, n_var + 1)];
                }
            }
            ObjectiveData::Bounds { .. } => {
                return Err(LexError::InvalidInput(
                    "objective holds simple bounds; use the bounds setter".into(),
                ))
            }
        }
        self.reset_working_set();
        self.auto_activate_equalities();
        Ok(())
    }

    /// Set the rows of a simple-bounds objective from `var_index` and `[l | u]`.
    pub(crate) fn set_data_bounds(
        &mut self,
        var_index: &[usize],
        data: &DMatrix<f64>,
    ) -> LexResult<()> {
        let (dim, n_var) = (self.dim, self.n_var);
        match &mut self.data {
            ObjectiveData::Bounds { var, lb, ub } => {
                if data.nrows() != dim || data.ncols() != 2 {
                    return Err(LexError::InvalidInput(format!(
                        "data has shape {}x{}, expected {}x2",
                        data.nrows(),
                        data.ncols(),
                        dim
                    )));
                }
                if var_index.len() != dim {
                    return Err(LexError::InvalidInput(format!(
                        "variable index has length {}, expected {}",
                        var_index.len(),
                        dim
                    )));
                }
                for (k, &j) in var_index.iter().enumerate() {
                    if j >= n_var {
                        return Err(LexError::InvalidInput(format!(
                            "row {k}: variable index {j} out of range (n = {n_var})"
                        )));
                    }
                    if var_index[..k].contains(&j) {
                        return Err(LexError::InvalidInput(format!(
                            "variable index {j} appears more than once"
                        )));
                    }
                }
                for i in 0..dim {
                    let (bl, bu) = (data[(i, 0)], data[(i, 1)]);
                    if (bl - bu).abs() >= BOUND_EQ_TOL && bl > bu {
                        return Err(LexError::InvalidInput(format!(
                            "row {i}: lower bound {bl} exceeds upper bound {bu}"
                        )));
                    }
                }
                var.copy_from_slice(var_index);
                for i in 0..dim {
                    lb[i] = data[(i, 0)];
                    ub[i] = data[(i, 1)];
                }
            }
            ObjectiveData::General { .. } => {
                return Err(LexError::InvalidInput(
                    "objective holds general rows; use the general setter".into(),
                ))
            }
        }
        self.reset_working_set();
        self.auto_activate_equalities();
        Ok(())
    }

    fn reset_working_set(&mut self) {
        self.active.clear();
        self.ctr_type.fill(ActivationStatus::Inactive);
    }

    fn auto_activate_equalities(&mut self) {
        for row in 0..self.dim {
            let (bl, bu) = self.bounds(row);
            if (bl - bu).abs() < BOUND_EQ_TOL {
                // cannot fail: the working set was just cleared
                let _ = self.activate(row, ActivationStatus::ActiveEq);
            }
        }
    }

    pub(crate) fn bounds(&self, row: usize) -> (f64, f64) {
        match &self.data {
            ObjectiveData::General { lb, ub, .. } => (lb[row], ub[row]),
            ObjectiveData::Bounds { lb, ub, .. } => (lb[row], ub[row]),
        }
    }

    /// Active target of a working-set row: `l` for LB/EQ, `u` for UB.
    fn target(&self, row: usize) -> f64 {
        let (bl, bu) = self.bounds(row);
        match self.ctr_type[row] {
            ActivationStatus::ActiveUb => bu,
            _ => bl,
        }
    }

    pub(crate) fn activate(&mut self, row: usize, status: ActivationStatus) -> LexResult<()> {
        if row >= self.dim {
            return Err(LexError::InvalidInput(format!(
                "row {row} out of range (dim = {})",
                self.dim
            )));
        }
        if !status.is_active() {
            return Err(LexError::InvalidInput(
                "cannot activate a row as inactive".into(),
            ));
        }
        if self.is_active(row) {
            return Err(LexError::InvalidInput(format!(
                "row {row} is already in the working set"
            )));
        }
        self.ctr_type[row] = status;
        self.active.push(row);
        // switch the row to active bookkeeping: v is its residual from now on
        let c = self.target(row);
        self.v[row] = self.ax[row] - c;
        self.dv[row] = self.dax[row];
        Ok(())
    }

    pub(crate) fn deactivate(&mut self, active_idx: usize) -> LexResult<usize> {
        if active_idx >= self.active.len() {
            return Err(LexError::InvalidInput(format!(
                "working-set index {active_idx} out of range (count = {})",
                self.active.len()
            )));
        }
        let row = self.active.remove(active_idx);
        self.ctr_type[row] = ActivationStatus::Inactive;
        self.v[row] = 0.0;
        self.dv[row] = -self.dax[row];
        Ok(row)
    }

    fn compute_ax(&mut self, x: &DVector<f64>) {
        match &self.data {
            ObjectiveData::General { a, .. } => self.ax.gemv(1.0, a, x, 0.0),
            ObjectiveData::Bounds { var, .. } => {
                for (i, &k) in var.iter().enumerate() {
                    self.ax[i] = x[k];
                }
            }
        }
    }

    /// Initialize the residual from the iterate produced by phase 1.
    pub(crate) fn phase1(&mut self, x: &DVector<f64>) {
        self.compute_ax(x);
        self.v.fill(0.0);
        for k in 0..self.active.len() {
            let row = self.active[k];
            let c = self.target(row);
            self.v[row] = self.ax[row] - c;
        }
        if let Some(v0) = &self.v0 {
            for &row in &self.active {
                self.v[row] = v0[row];
            }
        }
    }

    /// Form the residual step for a trial direction `dx`.
    ///
    /// Active rows get the residual change `A dx`; inactive rows get its
    /// negation, so that `v + dv` measures the prospective residual of a row
    /// were it activated during this step.
    pub(crate) fn form_step(&mut self, dx: &DVector<f64>) {
        match &self.data {
            ObjectiveData::General { a, .. } => self.dax.gemv(1.0, a, dx, 0.0),
            ObjectiveData::Bounds { var, .. } => {
                for (i, &k) in var.iter().enumerate() {
                    self.dax[i] = dx[k];
                }
            }
        }
        for row in 0..self.dim {
            self.dv[row] = if self.ctr_type[row].is_active() {
                self.dax[row]
            } else {
                -self.dax[row]
            };
        }
    }

    /// Advance the residual bookkeeping by `alpha` along the current step.
    pub(crate) fn step(&mut self, alpha: f64) {
        self.v.axpy(alpha, &self.dv, 1.0);
        self.ax.axpy(alpha, &self.dax, 1.0);
    }

    /// Tighten `alpha` over this objective's inactive rows.
    ///
    /// Returns `true` when this objective produced the tightest step so far;
    /// `ctr_index`/`ctr_side` then identify the blocking row and the bound it
    /// hits. A row already violated beyond `tol_feas` blocks at `alpha = 0`,
    /// which activates it before the next factorization. Ties go to the
    /// first-encountered row (strict improvement only).
    pub(crate) fn check_blocking(
        &self,
        ctr_index: &mut usize,
        ctr_side: &mut ActivationStatus,
        alpha: &mut f64,
        tol_feas: f64,
    ) -> bool {
        let mut tightened = false;
        for row in 0..self.dim {
            if self.is_active(row) {
                continue;
            }
            let (bl, bu) = self.bounds(row);
            let val = self.ax[row];
            let dval = self.dax[row];
            let prospective = val + *alpha * dval;
            if prospective > bu + tol_feas {
                let a = if dval > 0.0 { ((bu - val) / dval).max(0.0) } else { 0.0 };
                if a < *alpha {
                    *alpha = a;
                    *ctr_index = row;
                    *ctr_side = ActivationStatus::ActiveUb;
                    tightened = true;
                }
            } else if prospective < bl - tol_feas {
                let a = if dval < 0.0 { ((bl - val) / dval).max(0.0) } else { 0.0 };
                if a < *alpha {
                    *alpha = a;
                    *ctr_index = row;
                    *ctr_side = ActivationStatus::ActiveLb;
                    tightened = true;
                }
            }
        }
        tightened
    }

    /// Append the working set to the stacked equality system.
    ///
    /// `level` is the objective's level inside the equality solver; `None`
    /// routes the rows of a top-priority simple-bounds objective into the
    /// fixed-variables slot.
    pub(crate) fn form_lexlse(&self, lexlse: &mut LexLse, level: Option<usize>) {
        match (&self.data, level) {
            (ObjectiveData::Bounds { var, .. }, None) => {
                for k in 0..self.active.len() {
                    let row = self.active[k];
                    lexlse.fix_variable(var[row], self.target(row), self.ctr_type[row]);
                }
            }
            (ObjectiveData::General { a, .. }, Some(level)) => {
                for k in 0..self.active.len() {
                    let row = self.active[k];
                    lexlse.push_row(level, &a.row(row), self.target(row), self.ctr_type[row]);
                }
                lexlse.set_reg_factor(level, self.mu);
            }
            (ObjectiveData::Bounds { var, .. }, Some(level)) => {
                for k in 0..self.active.len() {
                    let row = self.active[k];
                    lexlse.push_unit_row(level, var[row], self.target(row), self.ctr_type[row]);
                }
                lexlse.set_reg_factor(level, 0.0);
            }
            (ObjectiveData::General { .. }, None) => {
                debug_assert!(false, "general rows cannot fix variables");
            }
        }
    }

    /// Widen the bounds of one row; used by the cycling handler.
    pub(crate) fn relax_bounds(&mut self, row: usize, step: f64) {
        match &mut self.data {
            ObjectiveData::General { lb, ub, .. } | ObjectiveData::Bounds { lb, ub, .. } => {
                lb[row] -= step;
                ub[row] += step;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dmatrix;

    fn box_objective() -> Objective {
        // l <= I x <= u on two variables
        let mut obj = Objective::new(ObjectiveKind::General, 2, 2);
        let data = dmatrix![1.0, 0.0, -1.0, 1.0;
                            0.0, 1.0, -2.0, 2.0];
        obj.set_data_general(&data).unwrap();
        obj
    }

    #[test]
    fn rejects_inverted_bounds() {
        let mut obj = Objective::new(ObjectiveKind::General, 1, 2);
        let data = dmatrix![1.0, 0.0, 2.0, 1.0];
        assert!(matches!(
            obj.set_data_general(&data),
            Err(LexError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_duplicate_bound_indices() {
        let mut obj = Objective::new(ObjectiveKind::SimpleBounds, 2, 3);
        let data = dmatrix![0.0, 1.0; 0.0, 1.0];
        assert!(matches!(
            obj.set_data_bounds(&[1, 1], &data),
            Err(LexError::InvalidInput(_))
        ));
    }

    #[test]
    fn coincident_bounds_become_equalities() {
        let mut obj = Objective::new(ObjectiveKind::General, 2, 2);
        let data = dmatrix![1.0, 0.0, 3.0, 3.0;
                            0.0, 1.0, -1.0, 1.0];
        obj.set_data_general(&data).unwrap();
        assert_eq!(obj.ctr_type(0), ActivationStatus::ActiveEq);
        assert_eq!(obj.ctr_type(1), ActivationStatus::Inactive);
        assert_eq!(obj.active_count(), 1);
    }

    #[test]
    fn working_set_preserves_insertion_order() {
        let mut obj = box_objective();
        obj.activate(1, ActivationStatus::ActiveUb).unwrap();
        obj.activate(0, ActivationStatus::ActiveLb).unwrap();
        assert_eq!(obj.active_row(0), 1);
        assert_eq!(obj.active_row(1), 0);
        assert!(obj.activate(1, ActivationStatus::ActiveLb).is_err());

        let row = obj.deactivate(0).unwrap();
        assert_eq!(row, 1);
        assert_eq!(obj.active_count(), 1);
        assert_eq!(obj.active_row(0), 0);
        assert!(!obj.is_active(1));
    }

    #[test]
    fn residual_follows_steps() {
        let mut obj = box_objective();
        obj.activate(0, ActivationStatus::ActiveUb).unwrap();
        let x = DVector::from_vec(vec![0.0, 0.0]);
        obj.phase1(&x);
        // active row 0 at its upper bound 1: v = 0 - 1
        assert_eq!(obj.v()[0], -1.0);
        assert_eq!(obj.v()[1], 0.0);

        let dx = DVector::from_vec(vec![1.0, 0.5]);
        obj.form_step(&dx);
        obj.step(1.0);
        assert!((obj.v()[0] - 0.0).abs() < 1e-15);
        // inactive rows accumulate the negated drift
        assert!((obj.v()[1] + 0.5).abs() < 1e-15);
        assert!((obj.ax[1] - 0.5).abs() < 1e-15);
    }

    #[test]
    fn blocking_picks_tightest_row() {
        let mut obj = box_objective();
        let x = DVector::from_vec(vec![0.0, 0.0]);
        obj.phase1(&x);
        // step pushing row 0 past u = 1 at alpha = 0.5 and row 1 past
        // u = 2 at alpha = 1 exactly (not blocking within tolerance)
        let dx = DVector::from_vec(vec![2.0, 2.0]);
        obj.form_step(&dx);

        let mut row = usize::MAX;
        let mut side = ActivationStatus::Inactive;
        let mut alpha = 1.0;
        assert!(obj.check_blocking(&mut row, &mut side, &mut alpha, 1e-13));
        assert_eq!(row, 0);
        assert_eq!(side, ActivationStatus::ActiveUb);
        assert!((alpha - 0.5).abs() < 1e-15);
    }

    #[test]
    fn violated_row_blocks_at_zero() {
        let mut obj = box_objective();
        let x = DVector::from_vec(vec![3.0, 0.0]);
        obj.phase1(&x);
        let dx = DVector::zeros(2);
        obj.form_step(&dx);

        let mut row = usize::MAX;
        let mut side = ActivationStatus::Inactive;
        let mut alpha = 1.0;
        assert!(obj.check_blocking(&mut row, &mut side, &mut alpha, 1e-13));
        assert_eq!(row, 0);
        assert_eq!(side, ActivationStatus::ActiveUb);
        assert_eq!(alpha, 0.0);
    }
}
