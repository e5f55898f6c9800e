//! lexls: lexicographic least-squares with inequality constraints.
//!
//! Solves prioritized stacks of linear objectives: the solution minimizes
//! the residual of objective 0 in the least-squares sense, then — among all
//! such minimizers — the residual of objective 1, and so on. Each objective
//! is a set of two-sided inequality rows `l <= A x <= u` (rows with `l = u`
//! become equalities) or simple variable bounds. Inequalities are handled by
//! a primal active-set method on top of a rank-revealing lexicographic QR
//! factorization with optional Tikhonov damping.
//!
//! # Example
//!
//! ```
//! use lexls_core::{LexLsi, ObjectiveKind, TerminationStatus};
//! use nalgebra::dmatrix;
//!
//! // keep x inside the unit box, then pull it toward (2, 2)
//! let mut solver = LexLsi::new(
//!     2,
//!     &[2, 2],
//!     &[ObjectiveKind::General, ObjectiveKind::General],
//! )?;
//! solver.set_data_general(0, &dmatrix![1.0, 0.0, 0.0, 1.0;
//!                                      0.0, 1.0, 0.0, 1.0])?;
//! solver.set_data_general(1, &dmatrix![1.0, 0.0, 2.0, 2.0;
//!                                      0.0, 1.0, 2.0, 2.0])?;
//!
//! let status = solver.solve()?;
//! assert_eq!(status, TerminationStatus::Solved);
//! assert!((solver.x()[0] - 1.0).abs() < 1e-10);
//! assert!((solver.x()[1] - 1.0).abs() < 1e-10);
//! # Ok::<(), lexls_core::LexError>(())
//! ```

#![warn(clippy::all)]

mod cycling;
mod lexlse;
mod objective;

pub mod error;
pub mod problem;
pub mod solver;

pub use error::{LexError, LexResult};
pub use problem::{
    ActivationStatus, ConstraintId, ObjectiveKind, OperationType, RegularizationKind,
    SolverSettings, TerminationStatus,
};
pub use solver::LexLsi;
