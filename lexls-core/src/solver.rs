//! Primal active-set loop over the lexicographic equality solver.
//!
//! [`LexLsi`] owns the objectives, one [`LexLse`] instance sized for the
//! largest possible working set, and the cycling handler. Every iteration
//! assembles the active rows, factorizes, forms a trial step, clips it at
//! the first blocking constraint (adding it to the working set) or, when the
//! full step goes through, releases the most wrong-signed active constraint
//! found by the sensitivity scan. The loop stops at a lexicographic KKT
//! point, on a cycling relaxation, or when the factorization budget runs
//! out.

use std::io::Write as _;

use nalgebra::{DMatrix, DVector};

use crate::cycling::CyclingHandler;
use crate::error::{LexError, LexResult};
use crate::lexlse::{LexLse, RemovalCandidate};
use crate::objective::Objective;
use crate::problem::{
    ActivationStatus, ConstraintId, ObjectiveKind, OperationType, SolverSettings,
    TerminationStatus,
};

/// Lexicographic least-squares solver with inequality constraints.
pub struct LexLsi {
    n_var: usize,
    n_obj: usize,
    /// 1 when the top priority is a simple-bounds objective: its rows become
    /// fixed variables and the equality solver has one level less.
    n_obj_offset: usize,

    objectives: Vec<Objective>,
    lexlse: LexLse,
    cycling: CyclingHandler,
    settings: SolverSettings,

    x: DVector<f64>,
    dx: DVector<f64>,
    /// Active-row counts per objective, rebuilt before each assembly.
    n_active: Vec<usize>,

    status: TerminationStatus,
    n_iterations: usize,
    n_activations: usize,
    n_deactivations: usize,
    n_factorizations: usize,
    step_length: f64,
    x0_is_specified: bool,
}

impl LexLsi {
    /// Create a solver for `n_var` variables and one objective per entry of
    /// `obj_dims`/`obj_kinds` (priority 0 first). All storage is sized here.
    pub fn new(
        n_var: usize,
        obj_dims: &[usize],
        obj_kinds: &[ObjectiveKind],
    ) -> LexResult<Self> {
        if n_var == 0 {
            return Err(LexError::InvalidInput("no decision variables".into()));
        }
        if obj_dims.is_empty() || obj_dims.len() != obj_kinds.len() {
            return Err(LexError::InvalidInput(format!(
                "{} objective dimensions for {} objective kinds",
                obj_dims.len(),
                obj_kinds.len()
            )));
        }
        let n_obj = obj_dims.len();
        let n_obj_offset = usize::from(obj_kinds[0] == ObjectiveKind::SimpleBounds);

        let objectives = obj_dims
            .iter()
            .zip(obj_kinds.iter())
            .map(|(&dim, &kind)| Objective::new(kind, dim, n_var))
            .collect();

        let mut solver = Self {
            n_var,
            n_obj,
            n_obj_offset,
            objectives,
            lexlse: LexLse::new(n_var, &obj_dims[n_obj_offset..]),
            cycling: CyclingHandler::new(),
            settings: SolverSettings::default(),
            x: DVector::zeros(n_var),
            dx: DVector::zeros(n_var),
            n_active: vec![0; n_obj],
            status: TerminationStatus::Unknown,
            n_iterations: 0,
            n_activations: 0,
            n_deactivations: 0,
            n_factorizations: 0,
            step_length: 0.0,
            x0_is_specified: false,
        };
        let defaults = solver.settings.clone();
        solver.set_parameters(defaults);
        Ok(solver)
    }

    /// Install settings and forward the relevant ones to the equality solver
    /// and the cycling handler.
    pub fn set_parameters(&mut self, settings: SolverSettings) {
        self.lexlse.set_parameters(
            settings.tol_linear_dependence,
            settings.regularization,
            settings.max_cg_iterations,
            settings.variable_regularization_factor,
        );
        if settings.cycling_handling_enabled {
            self.cycling.set_max_counter(settings.cycling_max_counter);
            self.cycling.set_relax_step(settings.cycling_relax_step);
        }
        self.settings = settings;
    }

    fn check_obj(&self, obj: usize) -> LexResult<()> {
        if obj >= self.n_obj {
            return Err(LexError::InvalidInput(format!(
                "objective index {obj} out of range (m = {})",
                self.n_obj
            )));
        }
        Ok(())
    }

    /// Set the rows of a general objective from `[A | l | u]`
    /// (`p x (n + 2)`). Rows with coinciding bounds become equality rows.
    pub fn set_data_general(&mut self, obj: usize, data: &DMatrix<f64>) -> LexResult<()> {
        self.check_obj(obj)?;
        self.objectives[obj].set_data_general(data)
    }

    /// Set the rows of a simple-bounds objective from the bounded variable
    /// indices and `[l | u]` (`p x 2`).
    pub fn set_data_bounds(
        &mut self,
        obj: usize,
        var_index: &[usize],
        data: &DMatrix<f64>,
    ) -> LexResult<()> {
        self.check_obj(obj)?;
        self.objectives[obj].set_data_bounds(var_index, data)
    }

    /// Set the damping factor of a general objective.
    pub fn set_regularization_factor(&mut self, obj: usize, mu: f64) -> LexResult<()> {
        self.check_obj(obj)?;
        self.objectives[obj].set_regularization(mu)
    }

    /// Provide a starting iterate; phase 1 will keep it instead of solving
    /// for one, and the first iteration only screens it for violations.
    pub fn set_x0(&mut self, x0: &DVector<f64>) -> LexResult<()> {
        if x0.len() != self.n_var {
            return Err(LexError::InvalidInput(format!(
                "x0 has length {}, expected {}",
                x0.len(),
                self.n_var
            )));
        }
        self.x.copy_from(x0);
        self.x0_is_specified = true;
        Ok(())
    }

    /// Provide an initial residual for one objective, consumed by phase 1.
    pub fn set_v0(&mut self, obj: usize, v0: &DVector<f64>) -> LexResult<()> {
        self.check_obj(obj)?;
        self.objectives[obj].set_v0(v0)
    }

    /// Seed the initial working set with one row active at its lower or
    /// upper bound. Equality activation is chosen internally at data-set
    /// time and cannot be requested here. Activating an already-active row
    /// is a no-op.
    pub fn activate_initial(
        &mut self,
        obj: usize,
        row: usize,
        status: ActivationStatus,
    ) -> LexResult<()> {
        self.check_obj(obj)?;
        if !matches!(
            status,
            ActivationStatus::ActiveLb | ActivationStatus::ActiveUb
        ) {
            log::warn!("initial working set entries must be lower or upper activations");
            return Err(LexError::InvalidInput(
                "only lower or upper activation can be requested".into(),
            ));
        }
        if self.objectives[obj].is_active(row) {
            return Ok(());
        }
        self.objectives[obj].activate(row, status)
    }

    /// Run the active-set iteration to termination.
    pub fn solve(&mut self) -> LexResult<TerminationStatus> {
        self.n_iterations = 0;
        self.n_activations = 0;
        self.n_deactivations = 0;
        self.n_factorizations = 0;
        self.step_length = 0.0;
        self.status = TerminationStatus::Unknown;
        self.cycling.reset();

        self.phase1()?;
        self.trace(OperationType::Undefined, true);

        loop {
            let operation = self.verify_working_set()?;
            self.trace(operation, false);

            match self.status {
                TerminationStatus::Solved | TerminationStatus::SolvedCyclingHandling => break,
                _ => {
                    if self.n_factorizations >= self.settings.max_factorizations {
                        self.status = TerminationStatus::MaxFactorizationsExceeded;
                        break;
                    }
                }
            }
        }
        Ok(self.status)
    }

    /// Compute the initial pair `(x, v)`.
    fn phase1(&mut self) -> LexResult<()> {
        let active_constraints_exist =
            self.objectives.iter().any(|obj| obj.active_count() > 0);

        if active_constraints_exist {
            self.form_lexlse();
            if !self.x0_is_specified {
                self.lexlse.factorize()?;
                self.lexlse.solve();
                self.x.copy_from(self.lexlse.x());
                self.n_factorizations += 1;
            }
        } else if !self.x0_is_specified {
            // nothing pins x yet; any nonzero point breaks degeneracy
            self.x.fill(0.01);
        }

        for obj in &mut self.objectives {
            obj.phase1(&self.x);
        }
        self.dx.fill(0.0);
        for obj in &mut self.objectives {
            obj.form_step(&self.dx);
        }
        Ok(())
    }

    /// Stack the working set into the equality solver.
    fn form_lexlse(&mut self) {
        self.lexlse.reset();
        for (i, obj) in self.objectives.iter().enumerate() {
            self.n_active[i] = obj.active_count();
        }
        self.lexlse
            .set_obj_dims(&self.n_active[self.n_obj_offset..]);
        for (i, obj) in self.objectives.iter().enumerate() {
            let level = if i < self.n_obj_offset {
                None
            } else {
                Some(i - self.n_obj_offset)
            };
            obj.form_lexlse(&mut self.lexlse, level);
        }
    }

    /// Step toward the working-set optimum of the last factorization.
    fn form_step(&mut self) {
        self.dx.copy_from(self.lexlse.x());
        self.dx -= &self.x;
        for obj in &mut self.objectives {
            obj.form_step(&self.dx);
        }
    }

    /// One iteration of the active-set method.
    fn verify_working_set(&mut self) -> LexResult<OperationType> {
        let mut operation = OperationType::Undefined;
        let mut normal_iteration = true;

        if self.n_iterations != 0 {
            self.form_lexlse();
            self.lexlse.factorize()?;
            self.lexlse.solve();
            self.form_step();
            self.n_factorizations += 1;
        } else if self.x0_is_specified {
            // the user's iterate is only screened for violations here; the
            // first factorization happens next iteration
            normal_iteration = false;
        }

        let mut alpha = 1.0;
        let mut blk_obj = 0usize;
        let mut blk_row = 0usize;
        let mut blk_side = ActivationStatus::Inactive;
        for (i, obj) in self.objectives.iter().enumerate() {
            if obj.check_blocking(
                &mut blk_row,
                &mut blk_side,
                &mut alpha,
                self.settings.tol_feasibility,
            ) {
                blk_obj = i;
            }
        }

        let mut touched = None;
        if alpha < 1.0 {
            operation = OperationType::Add;
            touched = Some(ConstraintId { obj: blk_obj, row: blk_row, status: blk_side });
            self.objectives[blk_obj].activate(blk_row, blk_side)?;
            self.n_activations += 1;
            log::debug!(
                "iteration {}: add objective {} row {} ({}) at alpha = {:.3e}",
                self.n_iterations,
                blk_obj,
                blk_row,
                blk_side,
                alpha
            );
        } else if normal_iteration {
            if let Some((obj, active_idx)) = self.find_removal()? {
                operation = OperationType::Remove;
                touched = Some(ConstraintId {
                    obj,
                    row: self.objectives[obj].active_row(active_idx),
                    status: self.objectives[obj].active_type(active_idx),
                });
                self.objectives[obj].deactivate(active_idx)?;
                self.n_deactivations += 1;
                log::debug!(
                    "iteration {}: remove objective {} working-set entry {}",
                    self.n_iterations,
                    obj,
                    active_idx
                );
            } else {
                self.status = TerminationStatus::Solved;
            }
        }

        self.step_length = if operation == OperationType::Add {
            alpha
        } else {
            -1.0
        };

        if alpha > 0.0 {
            self.x.axpy(alpha, &self.dx, 1.0);
            for obj in &mut self.objectives {
                obj.step(alpha);
            }
        }

        if self.settings.cycling_handling_enabled && operation != OperationType::Undefined {
            let id = touched.expect("working-set change without identifier");
            if let Some(status) =
                self.cycling
                    .update(operation, id, &mut self.objectives, self.n_iterations)
            {
                self.status = status;
            }
        }

        self.n_iterations += 1;
        Ok(operation)
    }

    /// First level (top to bottom) whose sensitivity exposes a descent
    /// direction; maps the candidate back to an objective index.
    fn find_removal(&mut self) -> LexResult<Option<(usize, usize)>> {
        for level in 0..self.lexlse.n_levels() {
            let candidate = self.lexlse.objective_sensitivity(
                level,
                self.settings.tol_wrong_sign_lambda,
                self.settings.tol_correct_sign_lambda,
            )?;
            if let Some(candidate) = candidate {
                return Ok(Some(match candidate {
                    RemovalCandidate::Fixed { active_idx } => (0, active_idx),
                    RemovalCandidate::Level { level, active_idx } => {
                        (level + self.n_obj_offset, active_idx)
                    }
                }));
            }
        }
        Ok(None)
    }

    // ---------------------------------------------------------------------
    // results and counters
    // ---------------------------------------------------------------------

    /// Current iterate. Aliases internal storage; copy it out before the
    /// next `solve`.
    pub fn x(&self) -> &DVector<f64> {
        &self.x
    }

    /// Residual of one objective.
    pub fn v(&self, obj: usize) -> &DVector<f64> {
        self.objectives[obj].v()
    }

    /// Residual step of one objective from the last iteration.
    pub fn dv(&self, obj: usize) -> &DVector<f64> {
        self.objectives[obj].dv()
    }

    /// Lagrange multipliers of all active constraints, one column per
    /// objective, rows in working-set order (fixed variables first). Built
    /// by value on demand.
    pub fn lambda(&mut self) -> LexResult<DMatrix<f64>> {
        let n_active_ctr = self.lexlse.fixed_count() + self.lexlse.total_dim();
        let mut lambda = DMatrix::zeros(n_active_ctr, self.n_obj);

        let mut meaningful = self.lexlse.fixed_count();
        for level in 0..self.lexlse.n_levels() {
            self.lexlse.objective_sensitivity(
                level,
                self.settings.tol_wrong_sign_lambda,
                self.settings.tol_correct_sign_lambda,
            )?;
            meaningful += self.lexlse.dim(level);
            let ws = self.lexlse.workspace();
            for i in 0..meaningful {
                lambda[(i, self.n_obj_offset + level)] = ws[i];
            }
        }
        Ok(lambda)
    }

    pub fn status(&self) -> TerminationStatus {
        self.status
    }

    /// Step length of the most recent iteration (`-1` when no constraint
    /// was added).
    pub fn step_length(&self) -> f64 {
        self.step_length
    }

    pub fn iterations_count(&self) -> usize {
        self.n_iterations
    }

    pub fn factorizations_count(&self) -> usize {
        self.n_factorizations
    }

    pub fn activations_count(&self) -> usize {
        self.n_activations
    }

    pub fn deactivations_count(&self) -> usize {
        self.n_deactivations
    }

    pub fn cycling_counter(&self) -> usize {
        self.cycling.counter()
    }

    /// Total size of the working set across all objectives.
    pub fn active_ctr_count(&self) -> usize {
        self.objectives.iter().map(|obj| obj.active_count()).sum()
    }

    /// Activation state of every row of one objective.
    pub fn active_ctr(&self, obj: usize) -> Vec<ActivationStatus> {
        let o = &self.objectives[obj];
        let mut types = vec![ActivationStatus::Inactive; o.dim()];
        for k in 0..o.active_count() {
            types[o.active_row(k)] = o.active_type(k);
        }
        types
    }

    pub fn objectives_count(&self) -> usize {
        self.n_obj
    }

    pub fn obj_dim(&self, obj: usize) -> usize {
        self.objectives[obj].dim()
    }

    /// Append one line to the optional trace sink.
    fn trace(&self, operation: OperationType, clear: bool) {
        let Some(path) = &self.settings.output_file_name else {
            return;
        };
        let mut line = String::new();
        if clear {
            line.push_str("# lexls solve trace\n");
        }
        use std::fmt::Write as _;
        let _ = writeln!(
            line,
            "iteration {} operation {} step_length {} status {} factorizations {} x {:?}",
            self.n_iterations,
            operation,
            self.step_length,
            self.status,
            self.n_factorizations,
            self.x.as_slice()
        );

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(!clear)
            .truncate(clear)
            .write(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(err) = result {
            log::warn!("trace write to {path} failed: {err}");
        }
    }
}
