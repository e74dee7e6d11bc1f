//! Discrete exterior calculus on cubical complexes of digital domains.
//!
//! A [`CubicalComplex`] is built from the cells of a digital (voxel) set.
//! Values are attached to its cells as [`Form`]s,
//! tagged with a dimension and a [`Primality`].
//! The complex builds sparse [`LinearOperator`]s between forms,
//! most importantly the exterior derivative [`d`][CubicalComplex::d]
//! and the Hodge star [`star`][CubicalComplex::star],
//! which can be chained with [`compose`] and [`combine`]
//! and inverted with a [`Solver`].
//!
//! # Cells and duality
//!
//! Cells are addressed with Khalimsky coordinates (see [`khalimsky`]),
//! where a digital point `p` is the top-dimensional cell `2p + 1`.
//! Every primal `k`-cell doubles as the dual `DIM - k`-cell
//! and shares its index, so dual forms need no separate mesh.
//!
//! # Operators
//!
//! Operators carry the kind of form they accept and produce,
//! and every combination is checked:
//!
//! ```
//! use cubical_dec::{complex::grid_complex, compose, Dual, Primal, DecError};
//!
//! let complex = grid_complex([3, 3]);
//! let d0 = complex.d(0, Primal)?;
//! let star1 = complex.star(1, Primal)?;
//! // star after d is fine
//! let star_d = compose(&star1, &d0)?;
//! assert_eq!(star_d.output(), cubical_dec::FormKind::dual(1));
//! // d after d on the dual side is not
//! assert!(matches!(
//!     compose(&complex.d(0, Dual)?, &d0),
//!     Err(DecError::KindMismatch { .. })
//! ));
//! # Ok::<(), DecError>(())
//! ```
//!
//! Common derived operators are available directly,
//! e.g. [`codifferential`][CubicalComplex::codifferential]
//! and the 0-form [`laplacian`][CubicalComplex::laplacian].
//!
//! # Logging
//!
//! Operator construction and solver progress are logged
//! through the [`log`](https://docs.rs/log) facade.
//! No logger is installed by this crate.

#![warn(missing_docs)]

pub mod khalimsky;
#[doc(inline)]
pub use khalimsky::{Cell, SignedCell};

pub mod complex;
#[doc(inline)]
pub use complex::{
    CellIndex, CubicalComplex, FormKind, Primality,
    Primality::{Dual, Primal},
    Subset,
};

pub mod form;
#[doc(inline)]
pub use form::Form;

pub mod operator;
#[doc(inline)]
pub use operator::{combine, compose, LinearOperator};

pub mod solver;
#[doc(inline)]
pub use solver::{Solver, SolverConfig, SolverFailure, SolverStatus, SolverStrategy};

pub mod flat_sharp;
#[doc(inline)]
pub use flat_sharp::VectorField;

mod error;
pub use error::DecError;

// nalgebra re-export for convenience

pub use nalgebra as na;
