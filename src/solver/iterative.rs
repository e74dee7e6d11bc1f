//! Jacobi-preconditioned Krylov methods on CSR matrices.

use nalgebra as na;
use nalgebra_sparse as nas;

use super::SolverFailure;

/// Threshold below which BiCGSTAB's inner products are treated as a breakdown.
const BREAKDOWN: f64 = 1e-40;

/// A system matrix together with its inverse diagonal.
#[derive(Clone, Debug)]
pub(super) struct Preconditioned {
    mat: nas::CsrMatrix<f64>,
    inv_diag: na::DVector<f64>,
}

/// Result of a converged iterative solve.
pub(super) struct Convergence {
    pub solution: na::DVector<f64>,
    pub iterations: usize,
}

impl Preconditioned {
    pub fn new(mat: nas::CsrMatrix<f64>) -> Self {
        // rows without a usable diagonal entry are left unscaled
        let mut inv_diag = na::DVector::repeat(mat.nrows(), 1.);
        for (row_idx, row) in mat.row_iter().enumerate() {
            for (&col, &val) in row.col_indices().iter().zip(row.values()) {
                if col == row_idx && val != 0. {
                    inv_diag[row_idx] = 1. / val;
                }
            }
        }
        Self { mat, inv_diag }
    }

    #[inline]
    fn precondition(&self, v: &na::DVector<f64>) -> na::DVector<f64> {
        v.component_mul(&self.inv_diag)
    }

    /// Preconditioned conjugate gradient starting from zero.
    ///
    /// Converges when the residual norm drops below `tolerance * |b|`.
    pub fn conjugate_gradient(
        &self,
        b: &na::DVector<f64>,
        tolerance: f64,
        max_iterations: usize,
    ) -> Result<Convergence, SolverFailure> {
        let mut x = na::DVector::zeros(b.len());
        let b_norm = b.norm();
        if b_norm == 0. {
            return Ok(Convergence {
                solution: x,
                iterations: 0,
            });
        }
        let threshold = tolerance * b_norm;

        let mut residual = b.clone();
        let mut auxiliary = self.precondition(&residual);
        let mut search = auxiliary.clone();
        let mut sigma = auxiliary.dot(&residual);

        for iteration in 1..=max_iterations {
            auxiliary = &self.mat * &search;
            let curvature = auxiliary.dot(&search);
            if curvature <= 0. || !curvature.is_finite() {
                return Err(SolverFailure::Breakdown {
                    iterations: iteration - 1,
                });
            }
            let alpha = sigma / curvature;

            x.axpy(alpha, &search, 1.);
            residual.axpy(-alpha, &auxiliary, 1.);

            let residual_norm = residual.norm();
            log::trace!("cg iteration {iteration}: residual {residual_norm:e}");
            if residual_norm <= threshold {
                return Ok(Convergence {
                    solution: x,
                    iterations: iteration,
                });
            }

            auxiliary = self.precondition(&residual);
            let sigma_new = auxiliary.dot(&residual);
            let beta = sigma_new / sigma;
            search.axpy(1., &auxiliary, beta);
            sigma = sigma_new;
        }

        Err(SolverFailure::IterationLimit {
            iterations: max_iterations,
            residual: residual.norm() / b_norm,
        })
    }

    /// Right-preconditioned BiCGSTAB starting from zero.
    pub fn bicgstab(
        &self,
        b: &na::DVector<f64>,
        tolerance: f64,
        max_iterations: usize,
    ) -> Result<Convergence, SolverFailure> {
        let n = b.len();
        let mut x = na::DVector::zeros(n);
        let b_norm = b.norm();
        if b_norm == 0. {
            return Ok(Convergence {
                solution: x,
                iterations: 0,
            });
        }
        let threshold = tolerance * b_norm;

        let mut r = b.clone();
        let r_hat = r.clone();
        let mut rho = 1.;
        let mut alpha = 1.;
        let mut omega = 1.;
        let mut v = na::DVector::zeros(n);
        let mut p = na::DVector::zeros(n);

        for iteration in 1..=max_iterations {
            let breakdown = SolverFailure::Breakdown {
                iterations: iteration - 1,
            };

            let rho_new = r_hat.dot(&r);
            if rho_new.abs() < BREAKDOWN {
                return Err(breakdown);
            }
            let beta = (rho_new / rho) * (alpha / omega);

            // p = r + beta * (p - omega * v)
            p.axpy(-omega, &v, 1.);
            p.axpy(1., &r, beta);

            let p_hat = self.precondition(&p);
            v = &self.mat * &p_hat;
            let r_hat_v = r_hat.dot(&v);
            if r_hat_v.abs() < BREAKDOWN {
                return Err(breakdown);
            }
            alpha = rho_new / r_hat_v;

            // r becomes the intermediate residual s
            r.axpy(-alpha, &v, 1.);
            x.axpy(alpha, &p_hat, 1.);
            let s_norm = r.norm();
            if s_norm <= threshold {
                log::trace!("bicgstab iteration {iteration}: residual {s_norm:e}");
                return Ok(Convergence {
                    solution: x,
                    iterations: iteration,
                });
            }

            let s_hat = self.precondition(&r);
            let t = &self.mat * &s_hat;
            let t_t = t.dot(&t);
            if t_t < BREAKDOWN {
                return Err(breakdown);
            }
            omega = t.dot(&r) / t_t;
            if omega.abs() < BREAKDOWN {
                return Err(breakdown);
            }

            x.axpy(omega, &s_hat, 1.);
            r.axpy(-omega, &t, 1.);
            rho = rho_new;

            let residual_norm = r.norm();
            log::trace!("bicgstab iteration {iteration}: residual {residual_norm:e}");
            if residual_norm <= threshold {
                return Ok(Convergence {
                    solution: x,
                    iterations: iteration,
                });
            }
        }

        Err(SolverFailure::IterationLimit {
            iterations: max_iterations,
            residual: r.norm() / b_norm,
        })
    }
}
