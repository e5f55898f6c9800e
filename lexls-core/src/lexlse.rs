//! Lexicographic equality solver.
//!
//! Solves a stack of equality systems `{(B_j, d_j)}` in strict priority
//! order: `x` minimizes `||B_0 x - d_0||` first, then `||B_1 x - d_1||`
//! among those minimizers, and so on. Each level is triangularized by
//! Householder reflections with column pivoting against the subspace left
//! free by the levels above it; columns whose pivot falls below the
//! linear-dependence tolerance are deferred downward. The same factorization
//! backs the objective-sensitivity computation that produces signed Lagrange
//! multipliers for the active-set loop.
//!
//! The stacked `[B | d]` workspace is allocated once for the largest
//! expected row count and refilled on every outer iteration.

use nalgebra::linalg::{Cholesky, QR};
use nalgebra::storage::Storage;
use nalgebra::{DMatrix, DVector, Dyn, Matrix, U1};

use crate::error::{LexError, LexResult};
use crate::problem::{ActivationStatus, RegularizationKind};

/// Active constraint nominated for removal by the sensitivity scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemovalCandidate {
    /// Working-set entry `active_idx` of the given solver level
    Level { level: usize, active_idx: usize },

    /// Entry `active_idx` of the fixed-variables slot
    Fixed { active_idx: usize },
}

pub(crate) struct LexLse {
    n_var: usize,
    n_levels: usize,

    // shape of the current stack
    obj_dim: Vec<usize>,
    first_row: Vec<usize>,
    fill: Vec<usize>,
    n_rows: usize,

    /// Stacked `[B | d]`, one row per active constraint.
    coef: DMatrix<f64>,
    row_type: Vec<ActivationStatus>,

    // fixed variables, eliminated before any level is factored
    fixed_var: Vec<usize>,
    fixed_val: Vec<f64>,
    fixed_type: Vec<ActivationStatus>,
    is_fixed: Vec<bool>,

    // regularization
    reg: RegularizationKind,
    reg_factor: Vec<f64>,
    reg_var_factor: f64,
    max_cg_iter: usize,

    tol_pivot: f64,

    // factorization state
    rank: Vec<usize>,
    factorized: bool,
    x: DVector<f64>,
    x_work: DVector<f64>,

    // per-level scratch
    proj: DMatrix<f64>,
    rhs: DVector<f64>,
    perm: Vec<usize>,
    hh: DVector<f64>,

    // sensitivity scratch
    lambda_ws: DVector<f64>,
    vk: DVector<f64>,
    rhs_n: DVector<f64>,
}

impl LexLse {
    /// `dims_max` holds the largest possible row count of each level; all
    /// workspace is sized from it here and never reallocated.
    pub(crate) fn new(n_var: usize, dims_max: &[usize]) -> Self {
        let n_levels = dims_max.len();
        let max_rows: usize = dims_max.iter().sum();
        let max_dim: usize = dims_max.iter().copied().max().unwrap_or(0);
        Self {
            n_var,
            n_levels,
            obj_dim: vec![0; n_levels],
            first_row: vec![0; n_levels],
            fill: vec![0; n_levels],
            n_rows: 0,
            coef: DMatrix::zeros(max_rows, n_var + 1),
            row_type: vec![ActivationStatus::Inactive; max_rows],
            fixed_var: Vec::with_capacity(n_var),
            fixed_val: Vec::with_capacity(n_var),
            fixed_type: Vec::with_capacity(n_var),
            is_fixed: vec![false; n_var],
            reg: RegularizationKind::None,
            reg_factor: vec![0.0; n_levels],
            reg_var_factor: 1.0,
            max_cg_iter: 10,
            tol_pivot: 1e-12,
            rank: vec![0; n_levels],
            factorized: false,
            x: DVector::zeros(n_var),
            x_work: DVector::zeros(n_var),
            proj: DMatrix::zeros(max_dim, n_var),
            rhs: DVector::zeros(max_dim),
            perm: vec![0; n_var],
            hh: DVector::zeros(max_dim.max(n_var).max(1)),
            lambda_ws: DVector::zeros(n_var + max_rows),
            vk: DVector::zeros(max_dim),
            rhs_n: DVector::zeros(n_var),
        }
    }

    pub(crate) fn set_parameters(
        &mut self,
        tol_pivot: f64,
        reg: RegularizationKind,
        max_cg_iter: usize,
        reg_var_factor: f64,
    ) {
        self.tol_pivot = tol_pivot;
        self.reg = reg;
        self.max_cg_iter = max_cg_iter;
        self.reg_var_factor = reg_var_factor;
    }

    pub(crate) fn n_levels(&self) -> usize {
        self.n_levels
    }

    pub(crate) fn dim(&self, level: usize) -> usize {
        self.obj_dim[level]
    }

    pub(crate) fn rank(&self, level: usize) -> usize {
        self.rank[level]
    }

    pub(crate) fn fixed_count(&self) -> usize {
        self.fixed_var.len()
    }

    /// Total row count of the current stack, fixed variables excluded.
    pub(crate) fn total_dim(&self) -> usize {
        self.n_rows
    }

    pub(crate) fn x(&self) -> &DVector<f64> {
        &self.x
    }

    /// Multipliers written by the last `objective_sensitivity` call, ordered
    /// `[fixed rows; level 0 rows; ...; level k rows]`.
    pub(crate) fn workspace(&self) -> &DVector<f64> {
        &self.lambda_ws
    }

    /// Drop the previous stack; row content is overwritten by the pushes.
    pub(crate) fn reset(&mut self) {
        self.fixed_var.clear();
        self.fixed_val.clear();
        self.fixed_type.clear();
        self.is_fixed.fill(false);
        self.fill.fill(0);
        self.factorized = false;
    }

    pub(crate) fn set_obj_dims(&mut self, dims: &[usize]) {
        debug_assert_eq!(dims.len(), self.n_levels);
        let mut cursor = 0;
        for (level, &d) in dims.iter().enumerate() {
            self.obj_dim[level] = d;
            self.first_row[level] = cursor;
            cursor += d;
        }
        self.n_rows = cursor;
        debug_assert!(cursor <= self.coef.nrows());
    }

    pub(crate) fn set_reg_factor(&mut self, level: usize, mu: f64) {
        self.reg_factor[level] = mu;
    }

    pub(crate) fn fix_variable(&mut self, var: usize, val: f64, side: ActivationStatus) {
        debug_assert!(!self.is_fixed[var], "variable fixed twice");
        self.is_fixed[var] = true;
        self.fixed_var.push(var);
        self.fixed_val.push(val);
        self.fixed_type.push(side);
    }

    pub(crate) fn push_row<S>(
        &mut self,
        level: usize,
        coeffs: &Matrix<f64, U1, Dyn, S>,
        rhs: f64,
        side: ActivationStatus,
    ) where
        S: Storage<f64, U1, Dyn>,
    {
        debug_assert_eq!(coeffs.len(), self.n_var);
        let r = self.first_row[level] + self.fill[level];
        for j in 0..self.n_var {
            self.coef[(r, j)] = coeffs[j];
        }
        self.coef[(r, self.n_var)] = rhs;
        self.row_type[r] = side;
        self.fill[level] += 1;
    }

    /// Append `x[var] = rhs` as a regular row of `level`; used by
    /// simple-bounds objectives that are not the top priority.
    pub(crate) fn push_unit_row(
        &mut self,
        level: usize,
        var: usize,
        rhs: f64,
        side: ActivationStatus,
    ) {
        let r = self.first_row[level] + self.fill[level];
        for j in 0..self.n_var {
            self.coef[(r, j)] = 0.0;
        }
        self.coef[(r, var)] = 1.0;
        self.coef[(r, self.n_var)] = rhs;
        self.row_type[r] = side;
        self.fill[level] += 1;
    }

    fn effective_regularization(&self, level: usize) -> f64 {
        self.reg_factor[level] * self.reg_var_factor.powi(level as i32)
    }

    /// Factor the stack level by level and accumulate the solution.
    pub(crate) fn factorize(&mut self) -> LexResult<()> {
        debug_assert!(self
            .fill
            .iter()
            .zip(self.obj_dim.iter())
            .all(|(f, d)| f == d));

        let n = self.n_var;
        self.x_work.fill(0.0);
        for (i, &k) in self.fixed_var.iter().enumerate() {
            self.x_work[k] = self.fixed_val[i];
        }

        // orthonormal basis of the free subspace, shrunk at every level
        let mut free = n - self.fixed_var.len();
        let mut z = DMatrix::zeros(n, free);
        {
            let mut c = 0;
            for j in 0..n {
                if !self.is_fixed[j] {
                    z[(j, c)] = 1.0;
                    c += 1;
                }
            }
        }

        for level in 0..self.n_levels {
            let p = self.obj_dim[level];
            self.rank[level] = 0;
            if p == 0 || free == 0 {
                continue;
            }
            let r0 = self.first_row[level];

            // rhs = d - B x_work
            for i in 0..p {
                let mut s = self.coef[(r0 + i, n)];
                for j in 0..n {
                    s -= self.coef[(r0 + i, j)] * self.x_work[j];
                }
                self.rhs[i] = s;
            }

            // proj = B Z, the level seen through the remaining freedom
            {
                let b = self.coef.view((r0, 0), (p, n));
                let mut m = self.proj.view_mut((0, 0), (p, free));
                m.gemm(1.0, &b, &z, 0.0);
            }

            let mu = self.effective_regularization(level);
            let reg_active = self.reg != RegularizationKind::None && mu > 0.0;
            let saved = if reg_active {
                Some((
                    self.proj.view((0, 0), (p, free)).into_owned(),
                    DVector::from_fn(p, |i, _| self.rhs[i]),
                ))
            } else {
                None
            };

            let k = self.householder_factor(p, free)?;
            self.rank[level] = k;

            let mut zl = DVector::zeros(free);
            if let Some((m0, r0v)) = &saved {
                if !self.solve_damped(m0, r0v, mu, &mut zl) {
                    self.back_substitute(k, &mut zl);
                }
            } else if k > 0 {
                self.back_substitute(k, &mut zl);
            }
            self.x_work.gemv(1.0, &z, &zl, 1.0);

            if k == free {
                free = 0;
                z = DMatrix::zeros(n, 0);
            } else if k > 0 {
                let nmat = self.nullspace_basis(k, free);
                let q = QR::new(nmat).q();
                z = &z * &q;
                free -= k;
            }
        }

        if self.x_work.iter().any(|v| !v.is_finite()) {
            return Err(LexError::Singular(
                "factorization produced non-finite values".into(),
            ));
        }
        self.factorized = true;
        Ok(())
    }

    /// Finalize the solution computed by `factorize`.
    pub(crate) fn solve(&mut self) {
        debug_assert!(self.factorized, "solve before factorize");
        self.x.copy_from(&self.x_work);
    }

    /// Householder triangularization with column pivoting of
    /// `proj[0..p, 0..f]`, applied to `rhs[0..p]` as well. Returns the rank;
    /// a column whose remaining norm is at most the pivot tolerance is left
    /// for lower levels.
    fn householder_factor(&mut self, p: usize, f: usize) -> LexResult<usize> {
        for j in 0..f {
            self.perm[j] = j;
        }
        let kmax = p.min(f);
        let mut k = 0;
        for j in 0..kmax {
            let mut best = j;
            let mut best_norm = 0.0f64;
            for c in j..f {
                let mut s = 0.0;
                for i in j..p {
                    s += self.proj[(i, c)] * self.proj[(i, c)];
                }
                if !s.is_finite() {
                    return Err(LexError::Singular(
                        "non-finite column norm during factorization".into(),
                    ));
                }
                let nrm = s.sqrt();
                if nrm > best_norm {
                    best_norm = nrm;
                    best = c;
                }
            }
            if best_norm <= self.tol_pivot {
                break;
            }
            if best != j {
                self.proj.swap_columns(j, best);
                self.perm.swap(j, best);
            }

            let alpha = if self.proj[(j, j)] >= 0.0 {
                -best_norm
            } else {
                best_norm
            };
            self.hh[j] = self.proj[(j, j)] - alpha;
            for i in (j + 1)..p {
                self.hh[i] = self.proj[(i, j)];
            }
            let vtv: f64 = (j..p).map(|i| self.hh[i] * self.hh[i]).sum();
            if vtv > 0.0 {
                let beta = 2.0 / vtv;
                for c in (j + 1)..f {
                    let dot: f64 = (j..p).map(|i| self.hh[i] * self.proj[(i, c)]).sum();
                    let s = beta * dot;
                    for i in j..p {
                        self.proj[(i, c)] -= s * self.hh[i];
                    }
                }
                let dot: f64 = (j..p).map(|i| self.hh[i] * self.rhs[i]).sum();
                let s = beta * dot;
                for i in j..p {
                    self.rhs[i] -= s * self.hh[i];
                }
            }
            self.proj[(j, j)] = alpha;
            for i in (j + 1)..p {
                self.proj[(i, j)] = 0.0;
            }
            k += 1;
        }
        Ok(k)
    }

    /// Basic solution of the triangularized level: deferred columns stay
    /// zero so lower levels inherit their freedom.
    fn back_substitute(&mut self, k: usize, zl: &mut DVector<f64>) {
        for i in (0..k).rev() {
            let mut s = self.rhs[i];
            for c in (i + 1)..k {
                s -= self.proj[(i, c)] * self.hh[c];
            }
            self.hh[i] = s / self.proj[(i, i)];
        }
        zl.fill(0.0);
        for i in 0..k {
            zl[self.perm[i]] = self.hh[i];
        }
    }

    /// Nullspace basis `[-R11^{-1} R12; I]` of the factored level, rows
    /// unpermuted; orthonormalized by the caller.
    fn nullspace_basis(&mut self, k: usize, f: usize) -> DMatrix<f64> {
        let mut nmat = DMatrix::zeros(f, f - k);
        for c in 0..(f - k) {
            for i in (0..k).rev() {
                let mut s = self.proj[(i, k + c)];
                for t in (i + 1)..k {
                    s -= self.proj[(i, t)] * self.hh[t];
                }
                self.hh[i] = s / self.proj[(i, i)];
            }
            for i in 0..k {
                nmat[(self.perm[i], c)] = -self.hh[i];
            }
            nmat[(self.perm[k + c], c)] = 1.0;
        }
        nmat
    }

    /// Damped least squares `min ||m0 z - r0||^2 + mu ||z||^2`, either
    /// through the damped normal equations or by conjugate gradients.
    /// Returns `false` when the direct factorization fails and the caller
    /// should fall back to the undamped basic solution.
    fn solve_damped(
        &self,
        m0: &DMatrix<f64>,
        r0: &DVector<f64>,
        mu: f64,
        zl: &mut DVector<f64>,
    ) -> bool {
        let f = m0.ncols();
        let mut atr = DVector::zeros(f);
        atr.gemv_tr(1.0, m0, r0, 0.0);

        match self.reg {
            RegularizationKind::Tikhonov => {
                let mut g = m0.transpose() * m0;
                for i in 0..f {
                    g[(i, i)] += mu;
                }
                match Cholesky::new(g) {
                    Some(ch) => {
                        zl.copy_from(&ch.solve(&atr));
                        true
                    }
                    None => false,
                }
            }
            RegularizationKind::TikhonovCg => {
                // CG on (m0' m0 + mu I) z = m0' r0; started from zero the
                // iterates stay in range(m0'), so deferred directions keep
                // their freedom for lower levels.
                zl.fill(0.0);
                let tol = 1e-12 * (1.0 + atr.norm());
                let mut r = atr.clone();
                let mut pdir = r.clone();
                let mut tmp = DVector::zeros(m0.nrows());
                let mut ap = DVector::zeros(f);
                let mut rs_old = r.dot(&r);
                for _ in 0..self.max_cg_iter {
                    if rs_old.sqrt() <= tol {
                        break;
                    }
                    tmp.gemv(1.0, m0, &pdir, 0.0);
                    ap.gemv_tr(1.0, m0, &tmp, 0.0);
                    ap.axpy(mu, &pdir, 1.0);
                    let denom = pdir.dot(&ap);
                    if denom <= 0.0 {
                        break;
                    }
                    let step = rs_old / denom;
                    zl.axpy(step, &pdir, 1.0);
                    r.axpy(-step, &ap, 1.0);
                    let rs_new = r.dot(&r);
                    pdir *= rs_new / rs_old;
                    pdir += &r;
                    rs_old = rs_new;
                }
                true
            }
            RegularizationKind::None => false,
        }
    }

    /// Signed Lagrange multipliers of the given level's subproblem.
    ///
    /// Solves the stationarity system over the fixed variables and all rows
    /// of higher levels in the minimum-norm least-squares sense; the level's
    /// own rows carry their residual as multiplier. The multipliers land in
    /// the workspace vector; the returned candidate, if any, is the
    /// most-wrong-signed active constraint whose release opens a descent
    /// direction.
    pub(crate) fn objective_sensitivity(
        &mut self,
        level: usize,
        tol_wrong: f64,
        tol_correct: f64,
    ) -> LexResult<Option<RemovalCandidate>> {
        let n = self.n_var;
        let p = self.obj_dim[level];
        let r0 = self.first_row[level];
        let nf = self.fixed_var.len();
        let m_prior = nf + r0;

        // level residual and the stationarity right-hand side -B_k' v_k
        for i in 0..p {
            let mut s = -self.coef[(r0 + i, n)];
            for j in 0..n {
                s += self.coef[(r0 + i, j)] * self.x[j];
            }
            self.vk[i] = s;
        }
        for j in 0..n {
            let mut s = 0.0;
            for i in 0..p {
                s += self.coef[(r0 + i, j)] * self.vk[i];
            }
            self.rhs_n[j] = -s;
        }

        if m_prior > 0 {
            let mut m = DMatrix::zeros(n, m_prior);
            for i in 0..nf {
                m[(self.fixed_var[i], i)] = 1.0;
            }
            for r in 0..r0 {
                for j in 0..n {
                    m[(j, nf + r)] = self.coef[(r, j)];
                }
            }
            let svd = m.svd(true, true);
            let y = svd
                .solve(&self.rhs_n, self.tol_pivot)
                .map_err(|e| LexError::Singular(e.to_string()))?;
            for i in 0..m_prior {
                self.lambda_ws[i] = y[i];
            }
        }
        for i in 0..p {
            self.lambda_ws[m_prior + i] = self.vk[i];
        }

        // wrong-sign scan: LB should carry a non-positive multiplier, UB a
        // non-negative one; the most-negative normalized value wins
        let mut best_score = -tol_wrong;
        let mut best = None;
        let mut consider = |score: f64, lambda: f64, cand: RemovalCandidate| {
            if score < best_score && lambda.abs() > tol_correct {
                best_score = score;
                best = Some(cand);
            }
        };
        for i in 0..nf {
            let lambda = self.lambda_ws[i];
            match self.fixed_type[i] {
                ActivationStatus::ActiveLb => {
                    consider(-lambda, lambda, RemovalCandidate::Fixed { active_idx: i })
                }
                ActivationStatus::ActiveUb => {
                    consider(lambda, lambda, RemovalCandidate::Fixed { active_idx: i })
                }
                _ => {}
            }
        }
        for l in 0..=level {
            for i in 0..self.obj_dim[l] {
                let stacked = self.first_row[l] + i;
                let lambda = self.lambda_ws[nf + stacked];
                let cand = RemovalCandidate::Level { level: l, active_idx: i };
                match self.row_type[stacked] {
                    ActivationStatus::ActiveLb => consider(-lambda, lambda, cand),
                    ActivationStatus::ActiveUb => consider(lambda, lambda, cand),
                    _ => {}
                }
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::RowDVector;

    fn push_general(lse: &mut LexLse, level: usize, a: &[f64], d: f64, side: ActivationStatus) {
        let row = RowDVector::from_row_slice(a);
        lse.push_row(level, &row, d, side);
    }

    #[test]
    fn single_level_exact_solve() {
        let mut lse = LexLse::new(2, &[2]);
        lse.reset();
        lse.set_obj_dims(&[2]);
        push_general(&mut lse, 0, &[1.0, 0.0], 1.0, ActivationStatus::ActiveEq);
        push_general(&mut lse, 0, &[0.0, 1.0], 2.0, ActivationStatus::ActiveEq);
        lse.factorize().unwrap();
        lse.solve();
        assert!((lse.x()[0] - 1.0).abs() < 1e-12);
        assert!((lse.x()[1] - 2.0).abs() < 1e-12);
        assert_eq!(lse.rank(0), 2);
    }

    #[test]
    fn rank_deficient_level_defers_freedom() {
        // level 0 only constrains x1 + x2; level 1 picks x1 = 0
        let mut lse = LexLse::new(2, &[2, 1]);
        lse.reset();
        lse.set_obj_dims(&[2, 1]);
        push_general(&mut lse, 0, &[1.0, 1.0], 1.0, ActivationStatus::ActiveEq);
        push_general(&mut lse, 0, &[2.0, 2.0], 2.0, ActivationStatus::ActiveEq);
        push_general(&mut lse, 1, &[1.0, 0.0], 0.0, ActivationStatus::ActiveEq);
        lse.factorize().unwrap();
        lse.solve();
        assert_eq!(lse.rank(0), 1);
        assert!((lse.x()[0] - 0.0).abs() < 1e-10);
        assert!((lse.x()[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn conflicting_second_level_is_least_squares() {
        // level 0 pins x0; level 1 wants x0 + x1 = 4 and x0 - x1 = 0
        let mut lse = LexLse::new(2, &[1, 2]);
        lse.reset();
        lse.set_obj_dims(&[1, 2]);
        push_general(&mut lse, 0, &[1.0, 0.0], 1.0, ActivationStatus::ActiveEq);
        push_general(&mut lse, 1, &[1.0, 1.0], 4.0, ActivationStatus::ActiveEq);
        push_general(&mut lse, 1, &[1.0, -1.0], 0.0, ActivationStatus::ActiveEq);
        lse.factorize().unwrap();
        lse.solve();
        // with x0 = 1 fixed by level 0: min (1+t-4)^2 + (1-t)^2 -> t = 2
        assert!((lse.x()[0] - 1.0).abs() < 1e-10);
        assert!((lse.x()[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn fixed_variables_are_eliminated() {
        let mut lse = LexLse::new(3, &[1]);
        lse.reset();
        lse.fix_variable(0, 2.0, ActivationStatus::ActiveEq);
        lse.set_obj_dims(&[1]);
        // x0 + x1 + x2 = 2 with x0 fixed at 2: least-norm free part
        push_general(&mut lse, 0, &[1.0, 1.0, 1.0], 2.0, ActivationStatus::ActiveEq);
        lse.factorize().unwrap();
        lse.solve();
        assert_eq!(lse.fixed_count(), 1);
        assert!((lse.x()[0] - 2.0).abs() < 1e-12);
        assert!((lse.x()[1] + lse.x()[2]).abs() < 1e-10);
    }

    #[test]
    fn sensitivity_flags_wrong_signed_upper_bound() {
        // x held at its upper bound 1 while the next level pulls it to 0:
        // the multiplier on the bound is negative, so releasing it helps
        let mut lse = LexLse::new(1, &[1, 1]);
        lse.reset();
        lse.set_obj_dims(&[1, 1]);
        push_general(&mut lse, 0, &[1.0], 1.0, ActivationStatus::ActiveUb);
        push_general(&mut lse, 1, &[1.0], 0.0, ActivationStatus::ActiveEq);
        lse.factorize().unwrap();
        lse.solve();
        let cand = lse.objective_sensitivity(1, 1e-8, 1e-12).unwrap();
        assert_eq!(
            cand,
            Some(RemovalCandidate::Level { level: 0, active_idx: 0 })
        );
    }

    #[test]
    fn sensitivity_accepts_correctly_signed_bound() {
        // same geometry but the pull is outward: multiplier positive, no
        // removal candidate
        let mut lse = LexLse::new(1, &[1, 1]);
        lse.reset();
        lse.set_obj_dims(&[1, 1]);
        push_general(&mut lse, 0, &[1.0], 1.0, ActivationStatus::ActiveUb);
        push_general(&mut lse, 1, &[1.0], 2.0, ActivationStatus::ActiveEq);
        lse.factorize().unwrap();
        lse.solve();
        let cand = lse.objective_sensitivity(1, 1e-8, 1e-12).unwrap();
        assert_eq!(cand, None);
    }

    #[test]
    fn sensitivity_reaches_fixed_variables() {
        // top-priority bound fixes x = 1; the level below wants x = 0
        let mut lse = LexLse::new(1, &[1]);
        lse.reset();
        lse.fix_variable(0, 1.0, ActivationStatus::ActiveUb);
        lse.set_obj_dims(&[1]);
        push_general(&mut lse, 0, &[1.0], 0.0, ActivationStatus::ActiveEq);
        lse.factorize().unwrap();
        lse.solve();
        let cand = lse.objective_sensitivity(0, 1e-8, 1e-12).unwrap();
        assert_eq!(cand, Some(RemovalCandidate::Fixed { active_idx: 0 }));
    }

    #[test]
    fn tikhonov_damping_shrinks_the_step() {
        let mut lse = LexLse::new(1, &[1]);
        lse.set_parameters(1e-12, RegularizationKind::Tikhonov, 10, 1.0);
        lse.reset();
        lse.set_obj_dims(&[1]);
        push_general(&mut lse, 0, &[1.0], 1.0, ActivationStatus::ActiveEq);
        lse.set_reg_factor(0, 1.0);
        lse.factorize().unwrap();
        lse.solve();
        // damped solution of x = 1 with mu = 1 is 1/2
        assert!((lse.x()[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn cg_matches_direct_damping() {
        let mut direct = LexLse::new(2, &[2]);
        direct.set_parameters(1e-12, RegularizationKind::Tikhonov, 50, 1.0);
        let mut cg = LexLse::new(2, &[2]);
        cg.set_parameters(1e-12, RegularizationKind::TikhonovCg, 50, 1.0);
        for lse in [&mut direct, &mut cg] {
            lse.reset();
            lse.set_obj_dims(&[2]);
            push_general(lse, 0, &[1.0, 2.0], 1.0, ActivationStatus::ActiveEq);
            push_general(lse, 0, &[3.0, 1.0], 2.0, ActivationStatus::ActiveEq);
            lse.set_reg_factor(0, 0.1);
            lse.factorize().unwrap();
            lse.solve();
        }
        assert!((direct.x()[0] - cg.x()[0]).abs() < 1e-8);
        assert!((direct.x()[1] - cg.x()[1]).abs() < 1e-8);
    }
}
