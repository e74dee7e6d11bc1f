//! Conversion between sampled vector fields and 1-forms.

use nalgebra as na;

use crate::{
    complex::{FormKind, Primality},
    CubicalComplex, DecError, Form,
};

/// A vector sampled at each 0-cell of one primality,
/// i.e. pointels for primal and spels for dual fields.
///
/// Construct with [`CubicalComplex::new_zero_vector_field`]
/// or [`CubicalComplex::sample_vector_field`].
#[derive(Clone, Debug, PartialEq)]
pub struct VectorField<const DIM: usize> {
    primality: Primality,
    /// One vector per 0-cell, in index order.
    ///
    /// Changing the length of this makes the field unusable
    /// with the complex it was created from.
    pub vectors: Vec<na::SVector<f64, DIM>>,
}

impl<const DIM: usize> VectorField<DIM> {
    /// Whether the vectors live on primal or dual 0-cells.
    #[inline]
    pub fn primality(&self) -> Primality {
        self.primality
    }
}

/// Axis, direction and length of a 1-cell.
struct EdgeGeometry {
    axis: usize,
    sign: f64,
    length: f64,
}

impl<const DIM: usize> CubicalComplex<DIM> {
    /// Create a vector field with a zero vector at every 0-cell of the given primality.
    pub fn new_zero_vector_field(&self, primality: Primality) -> VectorField<DIM> {
        let count = self.index_space(FormKind::new(0, primality)).len();
        VectorField {
            primality,
            vectors: vec![na::SVector::zeros(); count],
        }
    }

    /// Create a vector field by evaluating a function
    /// at the center of every 0-cell of the given primality.
    pub fn sample_vector_field(
        &self,
        primality: Primality,
        f: impl FnMut(na::SVector<f64, DIM>) -> na::SVector<f64, DIM>,
    ) -> VectorField<DIM> {
        VectorField {
            primality,
            vectors: self.vertices(primality).map(f).collect(),
        }
    }

    fn edge_geometry(&self, primality: Primality, edge_idx: usize) -> EdgeGeometry {
        let index = self.index_space(FormKind::new(1, primality));
        let cell = index.cells()[edge_idx];
        let orientation = if index.is_flipped(edge_idx) { -1. } else { 1. };
        match primality {
            Primality::Primal => EdgeGeometry {
                axis: cell.open_axes().next().unwrap_or(0),
                sign: orientation,
                length: index.weight(edge_idx).abs(),
            },
            Primality::Dual => {
                // the dual of a primal `DIM - 1`-cell crosses it along its closed axis,
                // with the direction the dual derivative assigns to it
                let axis = cell.closed_axes().next().unwrap_or(0);
                let dual_sign = if DIM % 2 == 1 { 1. } else { -1. };
                let axis_sign = if axis % 2 == 0 { -1. } else { 1. };
                EdgeGeometry {
                    axis,
                    sign: dual_sign * axis_sign * orientation,
                    length: index.dual_measure(edge_idx),
                }
            }
        }
    }

    /// Convert a vector field into a 1-form of the same primality.
    ///
    /// Each 1-cell gets the field's component along the cell,
    /// averaged over the cell's endpoints present in the complex,
    /// times the length of the cell.
    pub fn flat(&self, field: &VectorField<DIM>) -> Result<Form, DecError> {
        let primality = field.primality;
        let points = self.index_space(FormKind::new(0, primality));
        if field.vectors.len() != points.len() {
            return Err(DecError::SizeMismatch {
                expected: points.len(),
                found: field.vectors.len(),
            });
        }
        let edges = self.index_space(FormKind::new(1, primality));
        let mut form = Form::zeros(FormKind::new(1, primality), edges.len());

        for (edge_idx, edge) in edges.cells().iter().enumerate() {
            let geom = self.edge_geometry(primality, edge_idx);
            let mut sum = 0.;
            let mut count = 0;
            for end in [edge.offset(geom.axis, -1), edge.offset(geom.axis, 1)] {
                if let Some(point_idx) = points.index_of(&end) {
                    sum += field.vectors[point_idx][geom.axis];
                    count += 1;
                }
            }
            if count > 0 {
                form[edge_idx] = geom.sign * geom.length * sum / count as f64;
            }
        }

        Ok(form)
    }

    /// Convert a 1-form into a vector field of the same primality.
    ///
    /// Each component of the vector at a 0-cell is the average
    /// of the values per length of the incident 1-cells along that axis.
    /// 0-cells with no incident 1-cell along an axis get zero there.
    pub fn sharp(&self, form: &Form) -> Result<VectorField<DIM>, DecError> {
        let primality = form.kind().primality;
        let expected = FormKind::new(1, primality);
        if form.kind() != expected {
            return Err(DecError::KindMismatch {
                expected,
                found: form.kind(),
            });
        }
        let edges = self.index_space(expected);
        if form.len() != edges.len() {
            return Err(DecError::SizeMismatch {
                expected: edges.len(),
                found: form.len(),
            });
        }
        let points = self.index_space(FormKind::new(0, primality));
        let mut field = self.new_zero_vector_field(primality);

        for (point, vector) in points.cells().iter().zip(&mut field.vectors) {
            for axis in 0..DIM {
                let mut sum = 0.;
                let mut count = 0;
                for edge in [point.offset(axis, -1), point.offset(axis, 1)] {
                    if let Some(edge_idx) = edges.index_of(&edge) {
                        let geom = self.edge_geometry(primality, edge_idx);
                        sum += geom.sign * form[edge_idx] / geom.length;
                        count += 1;
                    }
                }
                if count > 0 {
                    vector[axis] = sum / count as f64;
                }
            }
        }

        Ok(field)
    }
}
