//! Linear solvers for operators mapping a form space to itself.
//!
//! A [`Solver`] is created for one [`SolverStrategy`],
//! prepared for an operator with [`compute`][Solver::compute]
//! and then used for any number of [`solve`][Solver::solve] calls.
//! Numeric failures are reported both as errors
//! and through the solver's [`status`][Solver::status].

mod iterative;
mod sparse;

use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{complex::FormKind, DecError, Form, LinearOperator};

/// Numerical method used by a [`Solver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SolverStrategy {
    /// Sparse Cholesky factorization. Requires a symmetric positive definite operator.
    Cholesky,
    /// Sparse `L D L^T` factorization of a symmetric operator.
    /// Handles indefinite operators as long as no pivot vanishes.
    Ldlt,
    /// Sparse LU factorization with threshold partial pivoting.
    Lu,
    /// Sparse rank-revealing QR factorization by Givens rotations.
    /// Rank-deficient systems get a least-squares basic solution.
    Qr,
    /// Jacobi-preconditioned conjugate gradient.
    /// Requires a symmetric positive definite operator.
    ConjugateGradient,
    /// Jacobi-preconditioned BiCGSTAB for general operators.
    BiCgStab,
}

impl SolverStrategy {
    /// Every available strategy.
    pub const ALL: [SolverStrategy; 6] = [
        SolverStrategy::Cholesky,
        SolverStrategy::Ldlt,
        SolverStrategy::Lu,
        SolverStrategy::Qr,
        SolverStrategy::ConjugateGradient,
        SolverStrategy::BiCgStab,
    ];

    /// Whether the strategy iterates instead of factorizing.
    #[inline]
    pub fn is_iterative(self) -> bool {
        matches!(self, Self::ConjugateGradient | Self::BiCgStab)
    }

    /// Whether the strategy only works on symmetric operators.
    #[inline]
    pub fn requires_symmetry(self) -> bool {
        matches!(self, Self::Cholesky | Self::Ldlt | Self::ConjugateGradient)
    }
}

impl std::fmt::Display for SolverStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cholesky => "Cholesky",
            Self::Ldlt => "LDLT",
            Self::Lu => "LU",
            Self::Qr => "QR",
            Self::ConjugateGradient => "conjugate gradient",
            Self::BiCgStab => "BiCGSTAB",
        };
        f.pad(name)
    }
}

/// Parameters of a [`Solver`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverConfig {
    /// Relative residual `|Ax - b| / |b|` at which iterative strategies stop.
    pub tolerance: f64,
    /// Iteration limit for iterative strategies.
    /// `None` means ten times the system size.
    pub max_iterations: Option<usize>,
    /// Magnitude below which pivots of the QR factor count as zero.
    /// `None` means `20 (m + n) eps` times the largest column norm.
    pub rank_tolerance: Option<f64>,
    /// Largest entry of `A - A^T`, relative to the largest entry of `A`,
    /// accepted by strategies that require a symmetric operator.
    pub symmetry_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: None,
            rank_tolerance: None,
            symmetry_tolerance: 1e-10,
        }
    }
}

/// Lifecycle state of a [`Solver`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SolverStatus {
    /// No operator has been prepared.
    Uninitialized,
    /// An operator has been prepared and no solve has been run yet.
    Prepared,
    /// The last solve succeeded.
    Solved {
        /// Iterations taken; always zero for direct strategies.
        iterations: usize,
        /// Relative residual `|Ax - b| / |b|` of the returned solution.
        residual: f64,
    },
    /// Preparation or the last solve failed.
    /// The solver must be recomputed before it can be used again.
    Failed(SolverFailure),
}

impl std::fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Prepared => write!(f, "prepared"),
            Self::Solved {
                iterations,
                residual,
            } => write!(
                f,
                "solved in {iterations} iterations, relative residual {residual:e}"
            ),
            Self::Failed(failure) => write!(f, "failed: {failure}"),
        }
    }
}

/// Numeric failure of a solver backend.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq)]
pub enum SolverFailure {
    /// Cholesky factorization found a non-positive pivot.
    #[error("operator is not positive definite")]
    NotPositiveDefinite,
    /// A factorization found a zero pivot.
    #[error("operator is singular")]
    Singular,
    /// The strategy requires a symmetric operator.
    #[error("operator is not symmetric (relative asymmetry {asymmetry:e})")]
    NotSymmetric {
        /// Largest entry of `A - A^T` relative to the largest entry of `A`.
        asymmetry: f64,
    },
    /// An iterative method ran out of iterations.
    #[error("no convergence in {iterations} iterations (relative residual {residual:e})")]
    IterationLimit {
        /// Number of iterations run.
        iterations: usize,
        /// Relative residual at the last iteration.
        residual: f64,
    },
    /// An iterative method hit a vanishing inner product.
    #[error("numerical breakdown after {iterations} iterations")]
    Breakdown {
        /// Number of iterations completed before the breakdown.
        iterations: usize,
    },
}

/// Prepared representation of an operator.
enum Backend {
    /// A system with no unknowns.
    Empty,
    Cholesky(nas::factorization::CscCholesky<f64>),
    Ldlt(sparse::SparseLdlt),
    Lu(sparse::SparseLu),
    Qr(sparse::SparseQr),
    Iterative(iterative::Preconditioned),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Cholesky(_) => write!(f, "Cholesky"),
            Self::Ldlt(_) => write!(f, "Ldlt"),
            Self::Lu(_) => write!(f, "Lu"),
            Self::Qr(qr) => write!(f, "Qr {{ rank: {} }}", qr.rank()),
            Self::Iterative(_) => write!(f, "Iterative"),
        }
    }
}

/// The operator a solver was prepared for.
#[derive(Debug)]
struct Prepared {
    kind: FormKind,
    mat: nas::CsrMatrix<f64>,
    backend: Backend,
}

/// Solves `A x = b` for a square operator `A` and forms `b`.
///
/// ```
/// # use cubical_dec::{complex::grid_complex, Dual, Solver, SolverStrategy, combine};
/// let complex = grid_complex([4, 4]);
/// let lap = complex.laplacian(Dual)?;
/// let op = combine(&lap, &complex.identity(0, Dual)?, 1., 0.01)?;
///
/// let mut solver = Solver::new(SolverStrategy::Cholesky);
/// solver.compute(&op)?;
/// let mut rhs = complex.new_zero_form(0, Dual)?;
/// rhs[5] = 1.;
/// let x = solver.solve(&rhs)?;
/// assert_eq!(x.len(), 16);
/// assert!(solver.is_valid());
/// # Ok::<(), cubical_dec::DecError>(())
/// ```
#[derive(Debug)]
pub struct Solver {
    strategy: SolverStrategy,
    config: SolverConfig,
    status: SolverStatus,
    prepared: Option<Prepared>,
}

impl Solver {
    /// Create a solver with the default configuration.
    pub fn new(strategy: SolverStrategy) -> Self {
        Self::with_config(strategy, SolverConfig::default())
    }

    /// Create a solver with the given configuration.
    pub fn with_config(strategy: SolverStrategy, config: SolverConfig) -> Self {
        Self {
            strategy,
            config,
            status: SolverStatus::Uninitialized,
            prepared: None,
        }
    }

    /// The strategy this solver uses.
    #[inline]
    pub fn strategy(&self) -> SolverStrategy {
        self.strategy
    }

    /// The configuration this solver uses.
    #[inline]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The current lifecycle state.
    #[inline]
    pub fn status(&self) -> SolverStatus {
        self.status
    }

    /// Whether the solver is prepared and hasn't failed since.
    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(
            self.status,
            SolverStatus::Prepared | SolverStatus::Solved { .. }
        )
    }

    /// Prepare the solver for an operator.
    ///
    /// Any previously prepared state is discarded first.
    /// A non-square operator is rejected without touching the solver.
    /// A factorization failure leaves the solver in the
    /// [`Failed`][SolverStatus::Failed] state;
    /// `compute` may be called again with another operator.
    pub fn compute(&mut self, op: &LinearOperator) -> Result<(), DecError> {
        if !op.is_square() {
            return Err(DecError::NotSquare {
                input: op.input(),
                output: op.output(),
            });
        }
        self.prepared = None;
        let mat = op.matrix();
        log::debug!(
            "preparing {} solver for {}x{} operator on {}",
            self.strategy,
            mat.nrows(),
            mat.ncols(),
            op.input()
        );

        match self.prepare(mat) {
            Ok(backend) => {
                self.prepared = Some(Prepared {
                    kind: op.input(),
                    mat: mat.clone(),
                    backend,
                });
                self.status = SolverStatus::Prepared;
                Ok(())
            }
            Err(failure) => {
                log::warn!("{} preparation failed: {failure}", self.strategy);
                self.status = SolverStatus::Failed(failure);
                Err(failure.into())
            }
        }
    }

    fn prepare(&self, mat: &nas::CsrMatrix<f64>) -> Result<Backend, SolverFailure> {
        let n = mat.nrows();
        if n == 0 {
            return Ok(Backend::Empty);
        }
        if self.strategy.requires_symmetry() {
            let asymmetry = relative_asymmetry(mat);
            if asymmetry > self.config.symmetry_tolerance {
                return Err(SolverFailure::NotSymmetric { asymmetry });
            }
        }
        let backend = match self.strategy {
            SolverStrategy::Cholesky => {
                let csc = nas::CscMatrix::from(mat);
                nas::factorization::CscCholesky::factor(&csc)
                    .map(Backend::Cholesky)
                    .map_err(|_| SolverFailure::NotPositiveDefinite)?
            }
            SolverStrategy::Ldlt => {
                let ldlt = sparse::SparseLdlt::factor(mat)?;
                log::debug!("LDLT factor has {} entries", ldlt.nnz());
                Backend::Ldlt(ldlt)
            }
            SolverStrategy::Lu => {
                let lu = sparse::SparseLu::factor(mat)?;
                log::debug!("LU factors have {} entries", lu.nnz());
                Backend::Lu(lu)
            }
            SolverStrategy::Qr => {
                let tolerance = self
                    .config
                    .rank_tolerance
                    .unwrap_or_else(|| sparse::SparseQr::default_tolerance(mat));
                let qr = sparse::SparseQr::factor(mat, tolerance);
                log::debug!("QR factor has {} entries", qr.nnz());
                if qr.rank() < n {
                    log::debug!("QR found rank {} for a system of size {n}", qr.rank());
                }
                Backend::Qr(qr)
            }
            SolverStrategy::ConjugateGradient | SolverStrategy::BiCgStab => {
                Backend::Iterative(iterative::Preconditioned::new(mat.clone()))
            }
        };
        Ok(backend)
    }

    /// Solve the prepared system for a right-hand side.
    ///
    /// The right-hand side must be of the operator's kind and size.
    /// On success, returns a form of the same kind
    /// and updates the status with the iteration count and residual.
    pub fn solve(&mut self, rhs: &Form) -> Result<Form, DecError> {
        let prepared = match (&self.prepared, self.status) {
            (Some(prepared), SolverStatus::Prepared | SolverStatus::Solved { .. }) => prepared,
            _ => {
                return Err(DecError::SolverNotReady {
                    status: self.status,
                })
            }
        };
        if rhs.kind() != prepared.kind {
            return Err(DecError::KindMismatch {
                expected: prepared.kind,
                found: rhs.kind(),
            });
        }
        if rhs.len() != prepared.mat.nrows() {
            return Err(DecError::SizeMismatch {
                expected: prepared.mat.nrows(),
                found: rhs.len(),
            });
        }

        let b = rhs.values();
        match self.solve_values(prepared, b) {
            Ok((x, iterations)) => {
                let b_norm = b.norm();
                let residual_norm = (&prepared.mat * &x - b).norm();
                let residual = if b_norm > 0. {
                    residual_norm / b_norm
                } else {
                    residual_norm
                };
                log::debug!(
                    "{} solve finished in {iterations} iterations, relative residual {residual:e}",
                    self.strategy
                );
                self.status = SolverStatus::Solved {
                    iterations,
                    residual,
                };
                Ok(Form::from_values(prepared.kind, x))
            }
            Err(failure) => {
                log::warn!("{} solve failed: {failure}", self.strategy);
                self.status = SolverStatus::Failed(failure);
                Err(failure.into())
            }
        }
    }

    fn solve_values(
        &self,
        prepared: &Prepared,
        b: &na::DVector<f64>,
    ) -> Result<(na::DVector<f64>, usize), SolverFailure> {
        let n = b.len();
        let x = match &prepared.backend {
            Backend::Empty => na::DVector::zeros(0),
            Backend::Cholesky(chol) => {
                let b_mat = na::DMatrix::from_column_slice(n, 1, b.as_slice());
                let x = chol.solve(&b_mat);
                x.column(0).into_owned()
            }
            Backend::Ldlt(ldlt) => ldlt.solve(b),
            Backend::Lu(lu) => lu.solve(b),
            Backend::Qr(qr) => qr.solve(&prepared.mat, b),
            Backend::Iterative(system) => {
                let max_iterations = self.config.max_iterations.unwrap_or(10 * n);
                let convergence = match self.strategy {
                    SolverStrategy::BiCgStab => {
                        system.bicgstab(b, self.config.tolerance, max_iterations)
                    }
                    _ => system.conjugate_gradient(b, self.config.tolerance, max_iterations),
                }?;
                return Ok((convergence.solution, convergence.iterations));
            }
        };
        Ok((x, 0))
    }
}

/// Largest entry of `A - A^T` relative to the largest entry of `A`.
fn relative_asymmetry(mat: &nas::CsrMatrix<f64>) -> f64 {
    let largest = |m: &nas::CsrMatrix<f64>| m.values().iter().fold(0., |acc: f64, v| acc.max(v.abs()));
    let scale = largest(mat);
    if scale == 0. {
        return 0.;
    }
    largest(&(mat - &mat.transpose())) / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        combine,
        complex::{grid_complex, ring_complex, shell_complex, CubicalComplex},
        compose,
        khalimsky::Cell,
        Dual, Primal, Primality,
    };
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    /// `L + shift * I` on dual 0-forms.
    fn shifted_laplacian<const DIM: usize>(complex: &CubicalComplex<DIM>, shift: f64) -> LinearOperator {
        combine(
            &complex.laplacian(Dual).unwrap(),
            &complex.identity(0, Dual).unwrap(),
            1.,
            shift,
        )
        .unwrap()
    }

    fn dense_operator(values: &[f64], n: usize) -> LinearOperator {
        let dense = na::DMatrix::from_row_slice(n, n, values);
        let kind = FormKind::primal(0);
        LinearOperator::new(kind, kind, nas::CsrMatrix::from(&dense))
    }

    fn form(values: &[f64]) -> Form {
        Form::from_values(FormKind::primal(0), na::DVector::from_column_slice(values))
    }

    #[test]
    fn spd_direct_solve_reproduces_rhs() {
        let complex = grid_complex([5, 4]);
        let op = shifted_laplacian(&complex, 1.);
        let mut rhs = complex.new_zero_form(0, Dual).unwrap();
        for (i, v) in rhs.values_mut().iter_mut().enumerate() {
            *v = 1. + (i as f64).cos();
        }

        let mut solver = Solver::new(SolverStrategy::Cholesky);
        assert_eq!(solver.status(), SolverStatus::Uninitialized);
        solver.compute(&op).unwrap();
        assert_eq!(solver.status(), SolverStatus::Prepared);

        let x = solver.solve(&rhs).unwrap();
        assert_eq!(x.kind(), FormKind::dual(0));
        let ax = op.apply(&x).unwrap();
        let err = ax.checked_sub(&rhs).unwrap().norm();
        assert!(err <= 1e-8 * rhs.norm(), "residual {err}");
        match solver.status() {
            SolverStatus::Solved {
                iterations,
                residual,
            } => {
                assert_eq!(iterations, 0);
                assert!(residual <= 1e-8);
            }
            other => panic!("unexpected status {other}"),
        }

        // the factorization is reused
        let x2 = solver.solve(&rhs.scale(2.)).unwrap();
        for (a, b) in x2.values().iter().zip(x.values().iter()) {
            assert_relative_eq!(*a, 2. * b, epsilon = 1e-12);
        }
    }

    /// Regularized Laplacian against a Dirac impulse on a 10x10 domain.
    #[test]
    fn all_strategies_agree() {
        let complex = grid_complex([10, 10]);
        let op = shifted_laplacian(&complex, 0.01);
        let mut dirac = complex.new_zero_form(0, Dual).unwrap();
        let center = complex.index_of(&Cell::spel([2, 5])).unwrap();
        dirac[center] = 1.;

        let solutions: Vec<Form> = SolverStrategy::ALL
            .iter()
            .map(|&strategy| {
                let mut solver = Solver::new(strategy);
                solver.compute(&op).unwrap();
                let x = solver.solve(&dirac).unwrap();
                assert!(solver.is_valid(), "{strategy}: {}", solver.status());
                if strategy.is_iterative() {
                    assert!(matches!(
                        solver.status(),
                        SolverStatus::Solved { iterations, .. } if iterations > 0
                    ));
                }
                x
            })
            .collect();

        let reference = &solutions[0];
        let scale = reference.max().unwrap();
        assert!(scale > 0.);
        // the impulse spreads out with a peak at its source
        let peak = reference
            .values()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(center));
        for (strategy, solution) in SolverStrategy::ALL.iter().zip(&solutions) {
            let diff = solution.checked_sub(reference).unwrap();
            assert!(
                diff.values().amax() <= 1e-6 * scale,
                "{strategy} disagrees by {}",
                diff.values().amax()
            );
        }
    }

    #[test]
    fn cholesky_rejects_indefinite_operators() {
        let op = dense_operator(&[1., 2., 2., 1.], 2);
        let rhs = form(&[1., 0.]);

        let mut cholesky = Solver::new(SolverStrategy::Cholesky);
        assert_eq!(
            cholesky.compute(&op),
            Err(DecError::Solver(SolverFailure::NotPositiveDefinite))
        );
        assert_eq!(
            cholesky.status(),
            SolverStatus::Failed(SolverFailure::NotPositiveDefinite)
        );
        assert!(!cholesky.is_valid());
        assert!(matches!(
            cholesky.solve(&rhs),
            Err(DecError::SolverNotReady { .. })
        ));

        // exact solution of [[1, 2], [2, 1]] x = [1, 0]
        let expected = [-1. / 3., 2. / 3.];
        for strategy in [SolverStrategy::Ldlt, SolverStrategy::Lu, SolverStrategy::Qr] {
            let mut solver = Solver::new(strategy);
            solver.compute(&op).unwrap();
            let x = solver.solve(&rhs).unwrap();
            for (xi, ei) in x.values().iter().zip(expected) {
                assert_relative_eq!(*xi, ei, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn singular_operators_are_detected() {
        let op = dense_operator(&[1., 2., 2., 4.], 2);
        for strategy in [SolverStrategy::Ldlt, SolverStrategy::Lu] {
            let mut solver = Solver::new(strategy);
            assert_eq!(
                solver.compute(&op),
                Err(DecError::Solver(SolverFailure::Singular)),
                "{strategy}"
            );
        }

        // QR gives a solution of the consistent rank-deficient system
        let mut qr = Solver::new(SolverStrategy::Qr);
        qr.compute(&op).unwrap();
        let rhs = form(&[1., 2.]);
        let x = qr.solve(&rhs).unwrap();
        let ax = op.apply(&x).unwrap();
        assert_abs_diff_eq!(ax[0], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(ax[1], 2., epsilon = 1e-12);
    }

    #[test]
    fn failed_compute_can_be_retried() {
        let complex = grid_complex([3, 3]);
        let negated = shifted_laplacian(&complex, 1.).scale(-1.);
        let mut solver = Solver::new(SolverStrategy::Cholesky);
        assert!(solver.compute(&negated).is_err());
        assert!(!solver.is_valid());

        solver.compute(&shifted_laplacian(&complex, 1.)).unwrap();
        assert!(solver.is_valid());
        let mut rhs = complex.new_zero_form(0, Dual).unwrap();
        rhs[0] = 1.;
        assert!(solver.solve(&rhs).is_ok());
    }

    #[test]
    fn iterative_failures_are_reported() {
        let complex = grid_complex([10, 10]);
        let op = shifted_laplacian(&complex, 0.01);
        let mut rhs = complex.new_zero_form(0, Dual).unwrap();
        rhs[42] = 1.;

        let config = SolverConfig {
            max_iterations: Some(1),
            ..Default::default()
        };
        for strategy in [SolverStrategy::ConjugateGradient, SolverStrategy::BiCgStab] {
            let mut solver = Solver::with_config(strategy, config);
            solver.compute(&op).unwrap();
            let result = solver.solve(&rhs);
            assert!(
                matches!(
                    result,
                    Err(DecError::Solver(SolverFailure::IterationLimit { iterations: 1, .. }))
                ),
                "{strategy}: {result:?}"
            );
            assert!(matches!(
                solver.status(),
                SolverStatus::Failed(SolverFailure::IterationLimit { .. })
            ));
            // failure is terminal until the next compute
            assert!(matches!(
                solver.solve(&rhs),
                Err(DecError::SolverNotReady { .. })
            ));
        }

        // an indefinite diagonal makes the preconditioned curvature vanish
        let mut cg = Solver::new(SolverStrategy::ConjugateGradient);
        cg.compute(&dense_operator(&[1., 0., 0., -1.], 2)).unwrap();
        assert_eq!(
            cg.solve(&form(&[1., 1.])),
            Err(DecError::Solver(SolverFailure::Breakdown { iterations: 0 }))
        );
    }

    #[test]
    fn preconditions_are_checked() {
        let complex = grid_complex([3, 2]);
        let mut solver = Solver::new(SolverStrategy::Lu);
        let rhs = complex.new_zero_form(0, Primal).unwrap();
        assert_eq!(
            solver.solve(&rhs),
            Err(DecError::SolverNotReady {
                status: SolverStatus::Uninitialized
            })
        );

        let d0 = complex.d(0, Primal).unwrap();
        assert_eq!(
            solver.compute(&d0),
            Err(DecError::NotSquare {
                input: FormKind::primal(0),
                output: FormKind::primal(1),
            })
        );
        assert_eq!(solver.status(), SolverStatus::Uninitialized);

        solver.compute(&shifted_laplacian(&complex, 1.)).unwrap();
        assert!(matches!(
            solver.solve(&rhs),
            Err(DecError::KindMismatch { .. })
        ));
        let too_long = grid_complex([4, 2]).new_zero_form(0, Dual).unwrap();
        assert!(matches!(
            solver.solve(&too_long),
            Err(DecError::SizeMismatch { expected: 6, found: 8 })
        ));
        // shape errors don't invalidate the solver
        assert!(solver.is_valid());
    }

    #[test]
    fn empty_systems_solve_trivially() {
        let complex = CubicalComplex::<2>::new();
        let op = complex.identity(0, Primal).unwrap();
        let rhs = complex.new_zero_form(0, Primal).unwrap();
        for strategy in SolverStrategy::ALL {
            let mut solver = Solver::new(strategy);
            solver.compute(&op).unwrap();
            assert!(solver.solve(&rhs).unwrap().is_empty());
        }
    }

    /// Relative size of the harmonic part of a sampled field's 1-form,
    /// left over after removing its curl-free and divergence-free parts.
    fn harmonic_fraction<const DIM: usize>(
        complex: &CubicalComplex<DIM>,
        primality: Primality,
        field: impl FnMut(na::SVector<f64, DIM>) -> na::SVector<f64, DIM>,
    ) -> f64 {
        let omega = complex
            .flat(&complex.sample_vector_field(primality, field))
            .unwrap();

        let d0 = complex.d(0, primality).unwrap();
        let d1 = complex.d(1, primality).unwrap();
        let delta1 = complex.codifferential(1, primality).unwrap();
        let delta2 = complex.codifferential(2, primality).unwrap();

        let solve = |op: &LinearOperator, rhs: &Form| {
            let mut solver = Solver::new(SolverStrategy::Qr);
            solver.compute(op).unwrap();
            solver.solve(rhs).unwrap()
        };

        // curl-free part d0 x with delta1 d0 x = delta1 omega
        let x = solve(
            &compose(&delta1, &d0).unwrap(),
            &delta1.apply(&omega).unwrap(),
        );
        // divergence-free part delta2 y with d1 delta2 y = d1 omega
        let y = solve(&compose(&d1, &delta2).unwrap(), &d1.apply(&omega).unwrap());

        let curl_free = d0.apply(&x).unwrap();
        let div_free = delta2.apply(&y).unwrap();
        let harmonic = omega
            .checked_sub(&curl_free)
            .unwrap()
            .checked_sub(&div_free)
            .unwrap();
        harmonic.norm() / omega.norm()
    }

    #[test]
    fn helmholtz_harmonic_part_detects_holes() {
        let waves = |p: na::Vector2<f64>| {
            na::Vector2::new(
                (-0.5 * p.x + 0.3 * p.y).cos(),
                (0.4 * p.x + 0.8 * p.y).cos(),
            )
        };
        let solid = grid_complex([6, 6]);
        let ring = ring_complex(6, 2..4);
        for primality in [Primal, Dual] {
            let without_hole = harmonic_fraction(&solid, primality, waves);
            let with_hole = harmonic_fraction(&ring, primality, waves);
            assert!(
                without_hole < 1e-8,
                "{primality} harmonic part without hole: {without_hole}"
            );
            assert!(
                with_hole > 1e-2,
                "{primality} harmonic part with hole: {with_hole}"
            );
        }
    }

    #[test]
    fn helmholtz_on_closed_surfaces() {
        let block = |hole: bool| {
            (0..2)
                .flat_map(|z| (0..3).flat_map(move |y| (0..3).map(move |x| [x, y, z])))
                .filter(move |&[x, y, _]| !(hole && x == 1 && y == 1))
        };
        let sphere = shell_complex(block(false)).unwrap();
        let torus = shell_complex(block(true)).unwrap();
        assert_eq!(sphere.size(2, Primal), 42);
        assert_eq!(torus.size(2, Primal), 48);
        assert!(torus.cell_index(2, Primal).unwrap().is_flipped(1));

        let field = |p: na::Vector3<f64>| {
            let c = p - na::Vector3::new(1.5, 1.5, 1.);
            na::Vector3::new(
                -c.y - (-0.3 * p.x + 0.6 * p.y + 0.8 * p.z).cos(),
                c.x + (0.8 * p.x + 0.3 * p.y - 0.4 * p.z).sin(),
                -(0.5 * p.z).cos(),
            )
        };
        let without_hole = harmonic_fraction(&sphere, Primal, field);
        let with_hole = harmonic_fraction(&torus, Primal, field);
        assert!(without_hole < 1e-8, "harmonic part on a sphere: {without_hole}");
        assert!(with_hole > 1e-2, "harmonic part on a torus: {with_hole}");
    }

    #[test]
    fn symmetric_strategies_reject_nonsymmetric_operators() {
        // varying primal measures make star d star d nonsymmetric
        let grid = grid_complex([4, 4]);
        let mut complex = CubicalComplex::<2>::new();
        for dim in 0..=2 {
            for (i, cell) in grid.cells(dim, Primal).unwrap().iter().enumerate() {
                complex
                    .insert_with_measures(cell.positive(), 1. + 0.5 * (i % 3) as f64, 1.)
                    .unwrap();
            }
        }
        let op = shifted_laplacian(&complex, 0.01);
        let mut dirac = complex.new_zero_form(0, Dual).unwrap();
        dirac[5] = 1.;

        for strategy in SolverStrategy::ALL {
            let mut solver = Solver::new(strategy);
            if strategy.requires_symmetry() {
                let result = solver.compute(&op);
                assert!(
                    matches!(
                        result,
                        Err(DecError::Solver(SolverFailure::NotSymmetric { asymmetry }))
                            if asymmetry > 1e-3
                    ),
                    "{strategy}: {result:?}"
                );
                assert!(matches!(
                    solver.status(),
                    SolverStatus::Failed(SolverFailure::NotSymmetric { .. })
                ));
            } else {
                solver.compute(&op).unwrap();
                let x = solver.solve(&dirac).unwrap();
                let residual = op.apply(&x).unwrap().checked_sub(&dirac).unwrap().norm();
                assert!(residual <= 1e-8, "{strategy}: residual {residual}");
            }
        }

        // a looser tolerance lets the operator through
        let config = SolverConfig {
            symmetry_tolerance: f64::INFINITY,
            ..Default::default()
        };
        let mut lenient = Solver::with_config(SolverStrategy::Ldlt, config);
        assert!(lenient.compute(&op).is_ok());
    }

    #[test]
    fn strategy_names_respect_width() {
        assert_eq!(format!("{:>6}", SolverStrategy::Lu), "    LU");
        assert_eq!(format!("{:<5}|", SolverStrategy::Qr), "QR   |");
    }
}
