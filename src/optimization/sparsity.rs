use std::iter::Chain;
use std::ops::Range;

use nalgebra as na;

use crate::camera_model::CAMERA_PARAMS;

pub const POINT_PARAMS: usize = 3;

/// Block structure of the bundle adjustment Jacobian.
///
/// Observation `i` owns residual rows `2i` and `2i + 1`, which depend on
/// exactly the 13 columns of camera `camera_indices[i]` and the 3 columns of
/// point `point_indices[i]`. Every other entry is structurally zero.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianSparsity {
    pub n_cameras: usize,
    pub n_points: usize,
    pub camera_indices: Vec<usize>,
    pub point_indices: Vec<usize>,
}

impl JacobianSparsity {
    pub fn new(
        n_cameras: usize,
        n_points: usize,
        camera_indices: Vec<usize>,
        point_indices: Vec<usize>,
    ) -> JacobianSparsity {
        assert_eq!(camera_indices.len(), point_indices.len());
        JacobianSparsity {
            n_cameras,
            n_points,
            camera_indices,
            point_indices,
        }
    }

    pub fn n_observations(&self) -> usize {
        self.camera_indices.len()
    }

    pub fn n_rows(&self) -> usize {
        2 * self.n_observations()
    }

    pub fn n_cols(&self) -> usize {
        self.n_cameras * CAMERA_PARAMS + self.n_points * POINT_PARAMS
    }

    pub fn camera_columns(&self, cam: usize) -> Range<usize> {
        cam * CAMERA_PARAMS..(cam + 1) * CAMERA_PARAMS
    }

    pub fn point_columns(&self, point: usize) -> Range<usize> {
        let start = self.n_cameras * CAMERA_PARAMS + point * POINT_PARAMS;
        start..start + POINT_PARAMS
    }

    /// Columns residual `row` depends on: its camera block, then its point block.
    pub fn row_columns(&self, row: usize) -> Chain<Range<usize>, Range<usize>> {
        let obs = row / 2;
        self.camera_columns(self.camera_indices[obs])
            .chain(self.point_columns(self.point_indices[obs]))
    }

    pub fn is_set(&self, row: usize, col: usize) -> bool {
        let obs = row / 2;
        self.camera_columns(self.camera_indices[obs]).contains(&col)
            || self.point_columns(self.point_indices[obs]).contains(&col)
    }

    pub fn nnz(&self) -> usize {
        self.n_rows() * (CAMERA_PARAMS + POINT_PARAMS)
    }

    /// Number of observations of each camera.
    pub fn observations_per_camera(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_cameras];
        for &c in &self.camera_indices {
            counts[c] += 1;
        }
        counts
    }

    pub fn observations_per_point(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_points];
        for &p in &self.point_indices {
            counts[p] += 1;
        }
        counts
    }

    /// Materialized boolean pattern, `n_rows x n_cols`. Only sensible for small problems.
    pub fn to_dense(&self) -> na::DMatrix<bool> {
        let mut m = na::DMatrix::from_element(self.n_rows(), self.n_cols(), false);
        for row in 0..self.n_rows() {
            for col in self.row_columns(row) {
                m[(row, col)] = true;
            }
        }
        m
    }
}
