use crate::{complex::FormKind, solver::SolverFailure, solver::SolverStatus};

/// Error in building, combining or solving with forms and operators.
///
/// Shape and precondition errors are detected before any numeric work
/// and leave no partial state behind.
/// Numeric failures additionally leave the solver that produced them
/// in a [`Failed`][SolverStatus::Failed] state.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum DecError {
    /// A form or operator of one kind was given where another was expected.
    #[error("expected a {expected}, got a {found}")]
    KindMismatch {
        /// The kind required by the operation.
        expected: FormKind,
        /// The kind that was actually given.
        found: FormKind,
    },
    /// The number of values doesn't match the index space,
    /// typically because the complex was modified
    /// after a form or operator was built from it.
    #[error("expected {expected} values, got {found}")]
    SizeMismatch {
        /// The size required by the operation.
        expected: usize,
        /// The size that was actually given.
        found: usize,
    },
    /// A dimension outside `0..=DIM` (or outside the valid range of an operator).
    #[error("no {dim}-cells in this role in a {mesh_dim}-dimensional complex")]
    InvalidDimension {
        /// The requested dimension.
        dim: usize,
        /// The dimension of the complex.
        mesh_dim: usize,
    },
    /// A cell was inserted into a complex that already indexes it.
    #[error("cell {coords:?} is already indexed")]
    DuplicateCell {
        /// Khalimsky coordinates of the cell.
        coords: Vec<i32>,
    },
    /// Cell measures must be finite and non-zero.
    #[error("invalid cell measure {0}")]
    InvalidMeasure(f64),
    /// Solvers only accept operators mapping a form space to itself.
    #[error("operator from {input} to {output} is not square")]
    NotSquare {
        /// Input kind of the operator.
        input: FormKind,
        /// Output kind of the operator.
        output: FormKind,
    },
    /// `solve` was called without a successful `compute`, or after a failure.
    #[error("solver is not ready (status: {status})")]
    SolverNotReady {
        /// Status of the solver at the time of the call.
        status: SolverStatus,
    },
    /// The numeric backend failed.
    #[error("solver failed: {0}")]
    Solver(#[from] SolverFailure),
}
