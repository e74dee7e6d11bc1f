//! Forms, i.e. values assigned to the cells of one dimension and primality.

use nalgebra as na;

use crate::{complex::FormKind, DecError};

/// A vector of values corresponding to
/// the `k`-cells of a complex or its dual.
///
/// Forms can be constructed using
/// [`CubicalComplex::new_zero_form`][crate::CubicalComplex::new_zero_form]
/// and are produced by applying operators and solvers.
/// The kind and the length are fixed at construction;
/// combining forms of different kinds or lengths fails.
#[derive(Clone)]
pub struct Form {
    kind: FormKind,
    values: na::DVector<f64>,
}

impl Form {
    // constructors only exposed to crate
    // because forms are always based on a complex

    #[inline]
    pub(crate) fn from_values(kind: FormKind, values: na::DVector<f64>) -> Self {
        Self { kind, values }
    }

    #[inline]
    pub(crate) fn zeros(kind: FormKind, len: usize) -> Self {
        Self::from_values(kind, na::DVector::zeros(len))
    }

    /// The dimension and primality of the form.
    #[inline]
    pub fn kind(&self) -> FormKind {
        self.kind
    }

    /// Number of values.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the form has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The underlying vector of values.
    #[inline]
    pub fn values(&self) -> &na::DVector<f64> {
        &self.values
    }

    /// Mutable access to the values.
    ///
    /// This is a slice so that the length can't change.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        self.values.as_mut_slice()
    }

    /// Consume the form and return its values.
    #[inline]
    pub fn into_values(self) -> na::DVector<f64> {
        self.values
    }

    /// Check that `other` can be combined with `self`.
    pub(crate) fn check_compatible(&self, other: &Form) -> Result<(), DecError> {
        if other.kind != self.kind {
            return Err(DecError::KindMismatch {
                expected: self.kind,
                found: other.kind,
            });
        }
        if other.len() != self.len() {
            return Err(DecError::SizeMismatch {
                expected: self.len(),
                found: other.len(),
            });
        }
        Ok(())
    }

    /// Elementwise sum of two forms of the same kind.
    pub fn checked_add(&self, rhs: &Form) -> Result<Form, DecError> {
        self.check_compatible(rhs)?;
        Ok(Self::from_values(self.kind, &self.values + &rhs.values))
    }

    /// Elementwise difference of two forms of the same kind.
    pub fn checked_sub(&self, rhs: &Form) -> Result<Form, DecError> {
        self.check_compatible(rhs)?;
        Ok(Self::from_values(self.kind, &self.values - &rhs.values))
    }

    /// Compute `a * f + b * g`.
    pub fn linear_combination(a: f64, f: &Form, b: f64, g: &Form) -> Result<Form, DecError> {
        f.check_compatible(g)?;
        let mut values = f.values.clone();
        values.axpy(b, &g.values, a);
        Ok(Self::from_values(f.kind, values))
    }

    /// Multiply every value by a scalar.
    #[inline]
    pub fn scale(&self, s: f64) -> Form {
        Self::from_values(self.kind, &self.values * s)
    }

    /// Smallest value, or `None` for an empty form.
    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    /// Largest value, or `None` for an empty form.
    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    /// Euclidean norm of the values.
    #[inline]
    pub fn norm(&self) -> f64 {
        self.values.norm()
    }
}

impl std::fmt::Debug for Form {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, values {:?}", self.kind, self.values.as_slice())
    }
}

impl PartialEq for Form {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.values == other.values
    }
}

impl std::ops::Index<usize> for Form {
    type Output = f64;

    #[inline]
    fn index(&self, idx: usize) -> &Self::Output {
        &self.values[idx]
    }
}

impl std::ops::IndexMut<usize> for Form {
    #[inline]
    fn index_mut(&mut self, idx: usize) -> &mut Self::Output {
        &mut self.values[idx]
    }
}

impl std::ops::Neg for Form {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::from_values(self.kind, -self.values)
    }
}

impl std::ops::Neg for &Form {
    type Output = Form;

    fn neg(self) -> Self::Output {
        Form::from_values(self.kind, -&self.values)
    }
}

impl std::ops::Mul<Form> for f64 {
    type Output = Form;

    fn mul(self, rhs: Form) -> Self::Output {
        Form::from_values(rhs.kind, rhs.values * self)
    }
}

impl std::ops::Mul<&Form> for f64 {
    type Output = Form;

    fn mul(self, rhs: &Form) -> Self::Output {
        rhs.scale(self)
    }
}
