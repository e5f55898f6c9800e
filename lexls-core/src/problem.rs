//! Problem vocabulary and solver settings.
//!
//! This module defines the enums shared by the objectives, the equality
//! solver and the active-set loop, together with the user-facing
//! [`SolverSettings`].

use std::fmt;

/// Bounds closer than this are collapsed into an equality row at data-set
/// time. Absolute, independent of the runtime tolerances.
pub(crate) const BOUND_EQ_TOL: f64 = 1e-14;

/// Kind of one priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveKind {
    /// Rows `l <= a'x <= u` with a dense coefficient row `a`.
    General,

    /// Rows `l <= x[k] <= u`, one distinct variable per row.
    SimpleBounds,
}

/// Activation state of one constraint row.
///
/// `ActiveEq` is assigned internally when a row's bounds coincide; users
/// cannot request it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStatus {
    /// Not in the working set
    Inactive,

    /// In the working set at its lower bound
    ActiveLb,

    /// In the working set at its upper bound
    ActiveUb,

    /// Equality row (`l == u`), permanently in the working set
    ActiveEq,
}

impl ActivationStatus {
    /// Whether the row is in the working set.
    pub fn is_active(self) -> bool {
        self != ActivationStatus::Inactive
    }
}

impl fmt::Display for ActivationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationStatus::Inactive => write!(f, "inactive"),
            ActivationStatus::ActiveLb => write!(f, "lower"),
            ActivationStatus::ActiveUb => write!(f, "upper"),
            ActivationStatus::ActiveEq => write!(f, "equality"),
        }
    }
}

/// Working-set operation performed during one active-set iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    /// No working-set change this iteration
    Undefined,

    /// A blocking constraint was activated
    Add,

    /// A wrong-signed constraint was deactivated
    Remove,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Undefined => write!(f, "none"),
            OperationType::Add => write!(f, "add"),
            OperationType::Remove => write!(f, "remove"),
        }
    }
}

/// Reason the active-set loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStatus {
    /// `solve()` has not reached a terminal state
    Unknown,

    /// A lexicographic KKT point was found
    Solved,

    /// The cycling handler relaxed an oscillating constraint and stopped
    /// the iteration
    SolvedCyclingHandling,

    /// The factorization budget was exhausted
    MaxFactorizationsExceeded,
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationStatus::Unknown => write!(f, "Unknown"),
            TerminationStatus::Solved => write!(f, "Solved"),
            TerminationStatus::SolvedCyclingHandling => write!(f, "SolvedCyclingHandling"),
            TerminationStatus::MaxFactorizationsExceeded => {
                write!(f, "MaxFactorizationsExceeded")
            }
        }
    }
}

/// Per-level damping applied inside the equality solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegularizationKind {
    /// No damping; rank-deficient directions are deferred untouched
    #[default]
    None,

    /// Damped least squares through the factored normal equations
    Tikhonov,

    /// Damped least squares via conjugate gradients, capped by
    /// `max_cg_iterations`
    TikhonovCg,
}

/// Identifies one constraint row of one objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintId {
    /// Objective (priority level) index
    pub obj: usize,

    /// Row index within the objective
    pub row: usize,

    /// Side the row was active on when the identifier was taken
    pub status: ActivationStatus,
}

impl ConstraintId {
    /// Same objective and row, regardless of the activation side.
    pub(crate) fn same_constraint(&self, other: &ConstraintId) -> bool {
        self.obj == other.obj && self.row == other.row
    }
}

/// Solver settings.
///
/// The defaults are usable as-is; individual fields can be tightened for
/// ill-conditioned hierarchies.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Pivot-acceptance threshold in the equality solver; a column whose
    /// remaining norm is below this is deferred to lower priority levels
    pub tol_linear_dependence: f64,

    /// Slack allowed in the blocking-constraint test
    pub tol_feasibility: f64,

    /// Threshold beyond which a multiplier counts as wrong-signed
    pub tol_wrong_sign_lambda: f64,

    /// Exclusion band around zero for borderline multipliers
    pub tol_correct_sign_lambda: f64,

    /// Hard cap on the number of factorizations per `solve()`
    pub max_factorizations: usize,

    /// Per-level damping strategy
    pub regularization: RegularizationKind,

    /// Iteration cap for the conjugate-gradient damped solve
    pub max_cg_iterations: usize,

    /// Geometric per-level scaling of the damping factor
    pub variable_regularization_factor: f64,

    /// Enables oscillation detection and bound relaxation
    pub cycling_handling_enabled: bool,

    /// Repetitions tolerated before the cycling handler intervenes
    pub cycling_max_counter: usize,

    /// Amount by which an oscillating constraint's bounds are widened
    pub cycling_relax_step: f64,

    /// Optional per-iteration trace sink (append-only text file)
    pub output_file_name: Option<String>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        // Allow an environment override for the factorization budget; handy
        // when bisecting non-terminating working-set sequences.
        let max_factorizations = std::env::var("LEXLS_MAX_FACTORIZATIONS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(200);

        Self {
            tol_linear_dependence: 1e-12,
            tol_feasibility: 1e-13,
            tol_wrong_sign_lambda: 1e-8,
            tol_correct_sign_lambda: 1e-12,
            max_factorizations,
            regularization: RegularizationKind::None,
            max_cg_iterations: 10,
            variable_regularization_factor: 1.0,
            cycling_handling_enabled: false,
            cycling_max_counter: 50,
            cycling_relax_step: 1e-8,
            output_file_name: None,
        }
    }
}
