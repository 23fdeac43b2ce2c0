use std::collections::HashMap;

use nalgebra as na;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::solver::BlockResidualProblem;
use super::sparsity::{JacobianSparsity, POINT_PARAMS};
use crate::camera_model::{CAMERA_PARAMS, CameraGeometry, project_params};
use crate::config::BundleAdjustConfig;
use crate::detected_points::Points3d;
use crate::skeleton::SkeletonConfig;
use crate::triangulation::CameraView;

/// Frames used for bundle adjustment: all of them, or a seeded random subset
/// of `max_num_images` when there are more.
pub fn select_frames(n_frames: usize, max_num_images: usize, seed: u64) -> Vec<usize> {
    if n_frames > max_num_images {
        log::debug!(
            "There are too many ({}) frames for calibration. Selecting {} randomly.",
            n_frames,
            max_num_images
        );
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut frames = rand::seq::index::sample(&mut rng, n_frames, max_num_images).into_vec();
        frames.sort_unstable();
        frames
    } else {
        log::debug!("Using {} frames for calibration", n_frames);
        (0..n_frames).collect()
    }
}

/// Bundle adjustment over one camera subset, built fresh per call.
///
/// Cameras and points live in index arenas: `cam_ids[i]` is the camera owning
/// parameter block `i`, and `slot_of` routes every packed `(frame, joint)` to
/// its point block. Mirrored joints route to their counterpart's block.
#[derive(Debug, Clone)]
pub struct BundleProblem {
    cam_ids: Vec<usize>,
    initial_cameras: Vec<[f64; CAMERA_PARAMS]>,
    principals: Vec<(f64, f64)>,
    refine_intrinsics: bool,
    observations: Vec<na::Vector2<f64>>,
    sparsity: JacobianSparsity,
    point_sources: Vec<(usize, usize)>,
    slot_of: HashMap<(usize, usize), usize>,
    x0: na::DVector<f64>,
    merged_observations: usize,
}

impl BundleProblem {
    /// Collects every (frame, joint) with a triangulated point and at least two
    /// observing cameras, after the visibility and missing-observation filters.
    pub fn build(
        views: &[CameraView],
        points3d: &Points3d,
        skeleton: &SkeletonConfig,
        ignore_joints: &[usize],
        config: &BundleAdjustConfig,
    ) -> BundleProblem {
        let frames = select_frames(points3d.n_frames(), config.max_num_images, config.seed);

        let mut obs_view = Vec::new();
        let mut obs_slot = Vec::new();
        let mut observations = Vec::new();
        let mut sources: Vec<(usize, usize)> = Vec::new();
        let mut source_slot: HashMap<(usize, usize), usize> = HashMap::new();
        for &frame in &frames {
            for joint in 0..points3d.n_joints() {
                if ignore_joints.contains(&joint) || !points3d.is_set(frame, joint) {
                    continue;
                }
                let seen: Vec<(usize, na::Vector2<f64>)> = views
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !config.excluded_cameras.contains(&v.geometry.cam_id))
                    .filter(|(_, v)| skeleton.camera_sees_joint(v.geometry.cam_id, joint))
                    .filter_map(|(i, v)| v.points2d.observed(frame, joint).map(|p| (i, p)))
                    .collect();
                if seen.len() < 2 {
                    continue;
                }
                let slot = sources.len();
                sources.push((frame, joint));
                source_slot.insert((frame, joint), slot);
                for (i, p) in seen {
                    obs_view.push(i);
                    obs_slot.push(slot);
                    observations.push(p);
                }
            }
        }

        // route mirrored joints onto their counterpart's slot
        let mut target: Vec<usize> = (0..sources.len()).collect();
        let mut merged_observations = 0;
        if config.merge_mirrored {
            for (slot, &(frame, joint)) in sources.iter().enumerate() {
                if let Some(&mirror_slot) = skeleton
                    .mirror_of(joint)
                    .and_then(|m| source_slot.get(&(frame, m)))
                {
                    target[slot] = mirror_slot;
                }
            }
            merged_observations = obs_slot.iter().filter(|&&s| target[s] != s).count();
            log::debug!("Replaced {} points", merged_observations);
        }

        // compact the slots that still own a point block
        let mut compact = vec![usize::MAX; sources.len()];
        let mut point_sources = Vec::new();
        for slot in 0..sources.len() {
            if target[slot] == slot {
                compact[slot] = point_sources.len();
                point_sources.push(sources[slot]);
            }
        }
        let slot_of: HashMap<(usize, usize), usize> = sources
            .iter()
            .enumerate()
            .map(|(slot, &src)| (src, compact[target[slot]]))
            .collect();
        let point_indices: Vec<usize> = obs_slot.iter().map(|&s| compact[target[s]]).collect();

        // camera arena, sorted by id, only cameras that observe something
        let mut used: Vec<usize> = obs_view.clone();
        used.sort_by_key(|&i| views[i].geometry.cam_id);
        used.dedup();
        let view_to_block: HashMap<usize, usize> =
            used.iter().enumerate().map(|(block, &view)| (view, block)).collect();
        let camera_indices: Vec<usize> = obs_view.iter().map(|v| view_to_block[v]).collect();
        let geometries: Vec<&CameraGeometry> = used.iter().map(|&i| &views[i].geometry).collect();

        let n_cameras = geometries.len();
        let n_points = point_sources.len();
        let sparsity = JacobianSparsity::new(n_cameras, n_points, camera_indices, point_indices);
        let initial_cameras: Vec<[f64; CAMERA_PARAMS]> = geometries.iter().map(|g| g.to_params()).collect();
        let mut x0 = na::DVector::zeros(sparsity.n_cols());
        for (block, params) in initial_cameras.iter().enumerate() {
            x0.rows_mut(block * CAMERA_PARAMS, CAMERA_PARAMS)
                .copy_from_slice(params);
        }
        for (p, &(frame, joint)) in point_sources.iter().enumerate() {
            let start = sparsity.point_columns(p).start;
            x0.fixed_rows_mut::<POINT_PARAMS>(start)
                .copy_from(&points3d.raw(frame, joint));
        }

        BundleProblem {
            cam_ids: geometries.iter().map(|g| g.cam_id).collect(),
            initial_cameras,
            principals: geometries.iter().map(|g| g.principal()).collect(),
            refine_intrinsics: config.refine_intrinsics,
            observations,
            sparsity,
            point_sources,
            slot_of,
            x0,
            merged_observations,
        }
    }

    pub fn x0(&self) -> &na::DVector<f64> {
        &self.x0
    }

    pub fn cam_ids(&self) -> &[usize] {
        &self.cam_ids
    }

    pub fn n_points(&self) -> usize {
        self.sparsity.n_points
    }

    pub fn n_observations(&self) -> usize {
        self.sparsity.n_observations()
    }

    pub fn merged_observations(&self) -> usize {
        self.merged_observations
    }

    /// Point block routed to `(frame, joint)`, if that cell was packed.
    pub fn point_for(&self, frame: usize, joint: usize) -> Option<usize> {
        self.slot_of.get(&(frame, joint)).copied()
    }

    /// The `(frame, joint)` whose triangulation seeded point block `p`.
    pub fn point_source(&self, p: usize) -> (usize, usize) {
        self.point_sources[p]
    }

    pub fn camera_params<'x>(&self, x: &'x na::DVector<f64>, block: usize) -> &'x [f64] {
        &x.as_slice()[self.sparsity.camera_columns(block)]
    }

    pub fn point(&self, x: &na::DVector<f64>, p: usize) -> na::Vector3<f64> {
        x.fixed_rows::<POINT_PARAMS>(self.sparsity.point_columns(p).start)
            .into_owned()
    }

    /// Refined camera blocks, keyed by camera id.
    pub fn unpack_cameras(&self, x: &na::DVector<f64>) -> Vec<(usize, [f64; CAMERA_PARAMS])> {
        self.cam_ids
            .iter()
            .enumerate()
            .map(|(block, &cam_id)| {
                let mut params = [0.0; CAMERA_PARAMS];
                params.copy_from_slice(self.camera_params(x, block));
                (cam_id, params)
            })
            .collect()
    }

    pub fn refines_intrinsics(&self) -> bool {
        self.refine_intrinsics
    }
}

impl BlockResidualProblem for BundleProblem {
    fn sparsity(&self) -> &JacobianSparsity {
        &self.sparsity
    }

    fn residual_block<T: na::RealField>(&self, obs: usize, camera: &[T], point: &[T]) -> na::Vector2<T> {
        let block = self.sparsity.camera_indices[obs];
        let p = na::Vector3::new(point[0].clone(), point[1].clone(), point[2].clone());
        let observed: na::Vector2<T> = self.observations[obs].map(na::convert);
        let projected = if self.refine_intrinsics {
            project_params(camera, self.principals[block], &p)
        } else {
            let mut params: Vec<T> = camera.to_vec();
            for (k, v) in params.iter_mut().enumerate().skip(6) {
                *v = na::convert(self.initial_cameras[block][k]);
            }
            project_params(&params, self.principals[block], &p)
        };
        projected - observed
    }

    fn is_fixed(&self, col: usize) -> bool {
        !self.refine_intrinsics
            && col < self.sparsity.n_cameras * CAMERA_PARAMS
            && col % CAMERA_PARAMS >= 6
    }
}
