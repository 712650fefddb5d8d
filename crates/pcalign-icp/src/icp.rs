use pcalign_3d::pointcloud::PointCloud;
use serde::{Deserialize, Serialize};

use crate::correspondence::{find_correspondences, mean_distance, CorrespondenceParams};
use crate::error::IcpError;
use crate::estimator::estimate_transform;
pub use crate::estimator::IcpMode;
use crate::oracle::ClosestPointOracle;
use crate::transform::RigidTransform;

/// Parameters of the ICP iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpParams {
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Converge when the mean residual decreases by less than this fraction of
    /// the previous one.
    pub tolerance: f64,
    /// Converge when the mean residual falls below this distance.
    pub absolute_tolerance: f64,
    /// Converge when an iteration rotates by less than this angle, in radians,
    /// translates by less than `min_delta_translation` and changes the scale
    /// by less than `min_delta_scale`.
    pub min_delta_rotation: f64,
    /// Translation threshold of the small step criterion.
    pub min_delta_translation: f64,
    /// Threshold on `|s - 1|` of the incremental scale. Rigid steps have a
    /// scale of exactly one, so it only matters with `estimate_scale`.
    pub min_delta_scale: f64,
    /// Correspondence rejection rules.
    pub correspondence: CorrespondenceParams,
    /// Estimate a uniform scale along with the rigid motion.
    pub estimate_scale: bool,
    /// Error metric.
    pub mode: IcpMode,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            tolerance: 1e-6,
            absolute_tolerance: 1e-10,
            min_delta_rotation: 1e-6,
            min_delta_translation: 1e-6,
            min_delta_scale: 1e-6,
            correspondence: CorrespondenceParams::default(),
            estimate_scale: false,
            mode: IcpMode::PointToPoint,
        }
    }
}

impl IcpParams {
    /// Check that every parameter is in its valid range.
    pub fn validate(&self) -> Result<(), IcpError> {
        let non_negative = [
            ("tolerance", self.tolerance),
            ("absolute_tolerance", self.absolute_tolerance),
            ("min_delta_rotation", self.min_delta_rotation),
            ("min_delta_translation", self.min_delta_translation),
            ("min_delta_scale", self.min_delta_scale),
        ];
        for (name, value) in non_negative {
            if value.is_nan() || value < 0.0 {
                return Err(IcpError::InvalidParameter(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        if self.estimate_scale && self.mode == IcpMode::PointToPlane {
            return Err(IcpError::InvalidParameter(
                "scale estimation is only available in point-to-point mode".to_string(),
            ));
        }
        self.correspondence.validate()
    }
}

/// Criterion that ended a converged run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceCriterion {
    /// The mean residual fell below `absolute_tolerance`.
    AbsoluteResidual,
    /// The relative decrease of the mean residual fell below `tolerance`.
    RelativeDecrease,
    /// The last incremental transform was below the minimum step.
    SmallStep,
}

/// Why an ICP run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// A convergence criterion was met.
    Converged(ConvergenceCriterion),
    /// The iteration cap was reached first.
    MaxIterationsReached,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Converged(ConvergenceCriterion::AbsoluteResidual) => {
                write!(f, "converged (residual below absolute tolerance)")
            }
            TerminationReason::Converged(ConvergenceCriterion::RelativeDecrease) => {
                write!(f, "converged (relative improvement below tolerance)")
            }
            TerminationReason::Converged(ConvergenceCriterion::SmallStep) => {
                write!(f, "converged (incremental transform below threshold)")
            }
            TerminationReason::MaxIterationsReached => write!(f, "maximum iterations reached"),
        }
    }
}

/// Outcome of one [`IcpSolver::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcpStatus {
    /// More iterations are needed.
    Running,
    /// The run is over.
    Terminated(TerminationReason),
}

/// Result of the ICP algorithm.
///
/// The transform maps the source onto the target.
#[derive(Debug, Clone, PartialEq)]
pub struct IcpResult {
    /// Accumulated transform.
    pub transform: RigidTransform,
    /// Mean distance over the correspondences of the last iteration.
    pub mean_residual: f64,
    /// Number of iterations performed.
    pub num_iterations: usize,
    /// Why the run stopped.
    pub termination: TerminationReason,
    /// Mean residual of every iteration, in order.
    pub residuals: Vec<f64>,
    /// Number of correspondences used in the last iteration.
    pub num_correspondences: usize,
}

/// Iterative Closest Point solver advanced one iteration at a time.
///
/// The source positions are never modified: every iteration re-applies the
/// accumulated transform to them. Callers can stop between two calls to
/// [`IcpSolver::step`], e.g. on a wall-clock budget.
pub struct IcpSolver<'a, O: ClosestPointOracle + ?Sized> {
    source: &'a PointCloud,
    oracle: &'a O,
    params: IcpParams,
    transform: RigidTransform,
    moving: Vec<[f64; 3]>,
    moving_normals: Option<Vec<[f64; 3]>>,
    iteration: usize,
    residuals: Vec<f64>,
    num_correspondences: usize,
    termination: Option<TerminationReason>,
}

impl<'a, O: ClosestPointOracle + ?Sized> IcpSolver<'a, O> {
    /// Create a solver starting from `initial`.
    ///
    /// # Errors
    ///
    /// [`IcpError::EmptySource`] for an empty source and
    /// [`IcpError::InvalidParameter`] for out of range parameters.
    pub fn new(
        source: &'a PointCloud,
        oracle: &'a O,
        params: IcpParams,
        initial: RigidTransform,
    ) -> Result<Self, IcpError> {
        if source.is_empty() {
            return Err(IcpError::EmptySource);
        }
        params.validate()?;

        let mut solver = Self {
            source,
            oracle,
            params,
            transform: initial,
            moving: vec![[0.0; 3]; source.len()],
            moving_normals: source.normals().map(|n| vec![[0.0; 3]; n.len()]),
            iteration: 0,
            residuals: Vec::new(),
            num_correspondences: 0,
            termination: None,
        };
        solver.update_moving();
        Ok(solver)
    }

    fn update_moving(&mut self) {
        self.transform
            .apply_points(self.source.points(), &mut self.moving);
        if let (Some(src), Some(dst)) = (self.source.normals(), self.moving_normals.as_mut()) {
            self.transform.apply_normals(src, dst);
        }
    }

    fn fail(&self, error: IcpError) -> IcpError {
        log::debug!("ICP failed at iteration {}: {}", self.iteration, error);
        IcpError::Failed {
            iteration: self.iteration,
            transform: self.transform,
            source: Box::new(error),
        }
    }

    fn terminate(&mut self, reason: TerminationReason) -> IcpStatus {
        match reason {
            TerminationReason::Converged(_) => log::info!(
                "ICP {} after {} iterations with mean residual {}",
                reason,
                self.iteration,
                self.mean_residual()
            ),
            TerminationReason::MaxIterationsReached => log::warn!(
                "ICP stopped after {} iterations without converging, mean residual {}",
                self.iteration,
                self.mean_residual()
            ),
        }
        self.termination = Some(reason);
        IcpStatus::Terminated(reason)
    }

    /// Run one iteration.
    ///
    /// Returns [`IcpStatus::Terminated`] once a convergence criterion or the
    /// iteration cap is met; further calls are no-ops.
    ///
    /// # Errors
    ///
    /// [`IcpError::Failed`] wrapping the correspondence or estimation error.
    pub fn step(&mut self) -> Result<IcpStatus, IcpError> {
        if let Some(reason) = self.termination {
            return Ok(IcpStatus::Terminated(reason));
        }
        if self.iteration >= self.params.max_iterations {
            return Ok(self.terminate(TerminationReason::MaxIterationsReached));
        }

        let now = std::time::Instant::now();

        let correspondences = find_correspondences(
            &self.moving,
            self.moving_normals.as_deref(),
            self.oracle,
            &self.params.correspondence,
        )
        .map_err(|e| self.fail(e))?;

        let delta = estimate_transform(
            &self.moving,
            &correspondences,
            self.params.mode,
            self.params.estimate_scale,
        )
        .map_err(|e| self.fail(e))?;

        // the step is applied on top of the already moved points
        self.transform = delta.compose(&self.transform);
        self.update_moving();

        let residual = mean_distance(&correspondences);
        let previous = self.residuals.last().copied();
        self.residuals.push(residual);
        self.num_correspondences = correspondences.len();
        self.iteration += 1;

        log::debug!(
            "Iteration {}: {} correspondences, mean residual {:.6e}, step {:.3e} rad / {:.3e}, elapsed {:?}",
            self.iteration,
            correspondences.len(),
            residual,
            delta.rotation_angle(),
            delta.translation_norm(),
            now.elapsed()
        );

        let criterion = if residual < self.params.absolute_tolerance {
            Some(ConvergenceCriterion::AbsoluteResidual)
        } else if previous.is_some_and(|prev| prev - residual < self.params.tolerance * prev) {
            Some(ConvergenceCriterion::RelativeDecrease)
        } else if delta.rotation_angle() < self.params.min_delta_rotation
            && delta.translation_norm() < self.params.min_delta_translation
            && (delta.scale - 1.0).abs() < self.params.min_delta_scale
        {
            Some(ConvergenceCriterion::SmallStep)
        } else {
            None
        };

        if let Some(criterion) = criterion {
            return Ok(self.terminate(TerminationReason::Converged(criterion)));
        }
        if self.iteration >= self.params.max_iterations {
            return Ok(self.terminate(TerminationReason::MaxIterationsReached));
        }
        Ok(IcpStatus::Running)
    }

    /// Iterate until termination.
    pub fn run(mut self) -> Result<IcpResult, IcpError> {
        while let IcpStatus::Running = self.step()? {}
        Ok(self.into_result())
    }

    /// Current accumulated transform.
    pub fn transform(&self) -> &RigidTransform {
        &self.transform
    }

    /// Number of iterations performed so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Mean residual of every iteration so far.
    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    /// Mean residual of the last iteration, infinite before the first one.
    pub fn mean_residual(&self) -> f64 {
        self.residuals.last().copied().unwrap_or(f64::INFINITY)
    }

    /// The result so far; a run stopped before termination reports
    /// [`TerminationReason::MaxIterationsReached`].
    pub fn into_result(self) -> IcpResult {
        IcpResult {
            transform: self.transform,
            mean_residual: self.mean_residual(),
            num_iterations: self.iteration,
            termination: self
                .termination
                .unwrap_or(TerminationReason::MaxIterationsReached),
            residuals: self.residuals,
            num_correspondences: self.num_correspondences,
        }
    }
}

/// Iterative Closest Point registration of a point cloud onto a target.
///
/// # Arguments
///
/// * `source` - The moving point cloud; its normals are used for normal rejection.
/// * `oracle` - Closest point oracle over the fixed target.
/// * `params` - Iteration and rejection parameters.
/// * `initial` - Initial guess, identity when `None`.
///
/// # Returns
///
/// The transform from the source to the target frame and run diagnostics.
pub fn icp<O: ClosestPointOracle + ?Sized>(
    source: &PointCloud,
    oracle: &O,
    params: &IcpParams,
    initial: Option<RigidTransform>,
) -> Result<IcpResult, IcpError> {
    IcpSolver::new(source, oracle, params.clone(), initial.unwrap_or_default())?.run()
}
