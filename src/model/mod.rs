//! Trajectory predictor used by the attached-cluster decode.
//!
//! One predictor instance belongs to exactly one track: the decoder creates
//! it fresh, seeds it from the track's first cluster, then walks the
//! remaining clusters through `propagate` / `filter`. Any failure truncates
//! that track's decode and the instance is dropped.
//!
//! State lives in a sector-local frame: `radius` along the pad row normal,
//! `y` transverse, `z` longitudinal. `slope_y`/`slope_z` are derivatives
//! with respect to radius, and `curvature` bends `slope_y` linearly. The
//! filter is a scalar Kalman update per coordinate with an innovation gate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------
// 1. Failure modes
// ------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PredictError {
    #[error("state diverged during propagation")]
    Diverged,
    #[error("track direction unpropagatable after frame rotation")]
    BentOver,
    #[error("observation rejected by innovation gate (chi2 {0:.2})")]
    Rejected(f32),
}

// ------------------------------------------------------------------
// 2. Predictor contract
// ------------------------------------------------------------------
/// Stateful position predictor for one track.
///
/// The decoder only ever calls this interface; swapping the implementation
/// does not touch the decode passes.
pub trait TrackPredictor {
    /// Seed the state from the track's first decoded cluster.
    fn init(&mut self, radius: f32, y: f32, z: f32, angle: f32, curvature: f32);

    /// Extrapolate to a new row radius, rotating into a new sector frame
    /// when the reference angle changes.
    fn propagate(&mut self, radius: f32, angle: f32) -> Result<(), PredictError>;

    /// Reflect the state when the track changes leg. Self-inverse.
    fn mirror(&mut self) -> Result<(), PredictError>;

    /// Kalman-style update with an observed cluster position.
    fn filter(&mut self, y: f32, z: f32, row: u8) -> Result<(), PredictError>;

    /// Predicted transverse position.
    fn y(&self) -> f32;

    /// Predicted longitudinal position.
    fn z(&self) -> f32;
}

// ------------------------------------------------------------------
// 3. Curvature seed quantization
// ------------------------------------------------------------------
/// Packed-curvature LSB. Seeds are stored as one byte centred on 127.
pub const CURVATURE_LSB: f32 = 1.0 / 8192.0;

#[inline(always)]
pub fn unpack_curvature(raw: u8) -> f32 {
    (raw as f32 - 127.0) * CURVATURE_LSB
}

// ------------------------------------------------------------------
// 4. Reference implementation
// ------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Measurement variance, transverse.
    pub meas_var_y: f32,
    /// Measurement variance, longitudinal.
    pub meas_var_z: f32,
    /// State variance added per unit of propagated radius.
    pub process_noise: f32,
    /// Innovation gate: combined chi-square above this rejects the update.
    pub chi2_max: f32,
    /// Propagation aborts once the transverse slope exceeds this.
    pub max_slope: f32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            meas_var_y: 0.01,
            meas_var_z: 0.01,
            process_noise: 1e-3,
            chi2_max: 50.0,
            max_slope: 4.0,
        }
    }
}

/// Linear extrapolation with curvature, scalar covariance per coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearPredictor {
    cfg: PredictorConfig,
    radius: f32,
    y: f32,
    z: f32,
    slope_y: f32,
    slope_z: f32,
    curvature: f32,
    angle: f32,
    var_y: f32,
    var_z: f32,
}

impl LinearPredictor {
    const INITIAL_VAR: f32 = 10.0;
    const MIN_DIRECTION: f32 = 1e-3;

    pub fn new(cfg: PredictorConfig) -> Self {
        Self {
            cfg,
            radius: 0.0,
            y: 0.0,
            z: 0.0,
            slope_y: 0.0,
            slope_z: 0.0,
            curvature: 0.0,
            angle: 0.0,
            var_y: Self::INITIAL_VAR,
            var_z: Self::INITIAL_VAR,
        }
    }

    #[inline(always)]
    fn scalar_update(state: &mut f32, var: &mut f32, observed: f32, meas_var: f32) {
        let s = *var + meas_var;
        let gain = *var / s;
        *state += gain * (observed - *state);
        *var *= 1.0 - gain;
    }
}

impl Default for LinearPredictor {
    fn default() -> Self {
        Self::new(PredictorConfig::default())
    }
}

impl TrackPredictor for LinearPredictor {
    fn init(&mut self, radius: f32, y: f32, z: f32, angle: f32, curvature: f32) {
        self.radius = radius;
        self.y = y;
        self.z = z;
        self.slope_y = 0.0;
        self.slope_z = 0.0;
        self.curvature = curvature;
        self.angle = angle;
        self.var_y = Self::INITIAL_VAR;
        self.var_z = Self::INITIAL_VAR;
    }

    fn propagate(&mut self, radius: f32, angle: f32) -> Result<(), PredictError> {
        if angle != self.angle {
            // Rotate position and direction into the new sector frame.
            let d = angle - self.angle;
            let (sin, cos) = d.sin_cos();
            let r = self.radius * cos + self.y * sin;
            let y = -self.radius * sin + self.y * cos;
            let tx = cos + self.slope_y * sin;
            let ty = -sin + self.slope_y * cos;
            if tx.abs() < Self::MIN_DIRECTION {
                return Err(PredictError::BentOver);
            }
            self.radius = r;
            self.y = y;
            self.slope_y = ty / tx;
            self.angle = angle;
        }
        let dr = radius - self.radius;
        self.y += self.slope_y * dr + 0.5 * self.curvature * dr * dr;
        self.slope_y += self.curvature * dr;
        self.z += self.slope_z * dr;
        self.radius = radius;
        self.var_y += self.cfg.process_noise * dr.abs();
        self.var_z += self.cfg.process_noise * dr.abs();
        if !self.y.is_finite() || !self.z.is_finite() || self.slope_y.abs() > self.cfg.max_slope {
            return Err(PredictError::Diverged);
        }
        Ok(())
    }

    fn mirror(&mut self) -> Result<(), PredictError> {
        if !self.slope_y.is_finite() || !self.curvature.is_finite() {
            return Err(PredictError::Diverged);
        }
        self.slope_y = -self.slope_y;
        self.curvature = -self.curvature;
        Ok(())
    }

    fn filter(&mut self, y: f32, z: f32, _row: u8) -> Result<(), PredictError> {
        if !y.is_finite() || !z.is_finite() {
            return Err(PredictError::Diverged);
        }
        let s_y = self.var_y + self.cfg.meas_var_y;
        let s_z = self.var_z + self.cfg.meas_var_z;
        let res_y = y - self.y;
        let res_z = z - self.z;
        let chi2 = res_y * res_y / s_y + res_z * res_z / s_z;
        if chi2 > self.cfg.chi2_max {
            return Err(PredictError::Rejected(chi2));
        }
        Self::scalar_update(&mut self.y, &mut self.var_y, y, self.cfg.meas_var_y);
        Self::scalar_update(&mut self.z, &mut self.var_z, z, self.cfg.meas_var_z);
        Ok(())
    }

    #[inline(always)]
    fn y(&self) -> f32 {
        self.y
    }

    #[inline(always)]
    fn z(&self) -> f32 {
        self.z
    }
}
