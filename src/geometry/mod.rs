//! **Detector geometry service** for the pad-plane grid.
//!
//! Pure read-only lookups keyed by (sector, row): radial position of a pad
//! row, reference angle of a sector, and the linear conversions between the
//! quantized (time, pad) coordinates and physical (z, y) positions. The
//! decoder and the trajectory predictor both go through this module so that
//! every coordinate conversion lives in one place.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------
// 1. Grid constants
// ------------------------------------------------------------------
/// Number of azimuthal sectors (both detector sides).
pub const NSECTORS: usize = 36;
/// Number of pad rows per sector.
pub const NROWS: usize = 152;
/// Total number of (sector, row) partitions.
pub const NPARTITIONS: usize = NSECTORS * NROWS;

/// Quantization of the drift-time coordinate: packed units per time bin.
pub const TIME_PACK_SCALE: f32 = 64.0;
/// Quantization of the transverse coordinate: packed units per pad.
pub const PAD_PACK_SCALE: f32 = 8.0;

// ------------------------------------------------------------------
// 2. Errors
// ------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeometryError {
    #[error("geometry field {0} must be positive, got {1}")]
    NonPositive(&'static str, f32),
    #[error("pad count parameters yield zero pads on row {0}")]
    EmptyRow(usize),
}

// ------------------------------------------------------------------
// 3. Configuration
// ------------------------------------------------------------------
/// Linearized detector dimensions. Defaults describe a cylindrical TPC-like
/// volume; all lengths in centimetres, times in time bins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Radius of pad row 0.
    pub first_row_radius: f32,
    /// Radial spacing between adjacent pad rows.
    pub row_pitch: f32,
    /// Transverse pad width.
    pub pad_pitch: f32,
    /// Pads on row 0.
    pub base_pads: f32,
    /// Additional pads per row index.
    pub pads_per_row: f32,
    /// Full drift length along z.
    pub drift_length: f32,
    /// Drift distance covered per time bin.
    pub z_per_time_bin: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            first_row_radius: 85.2,
            row_pitch: 1.0,
            pad_pitch: 0.4,
            base_pads: 66.0,
            pads_per_row: 0.5,
            drift_length: 250.0,
            z_per_time_bin: 0.5,
        }
    }
}

impl GeometryConfig {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn row_pitch(mut self, pitch: f32) -> Self {
        self.row_pitch = pitch;
        self
    }

    #[inline(always)]
    pub fn pad_pitch(mut self, pitch: f32) -> Self {
        self.pad_pitch = pitch;
        self
    }

    #[inline(always)]
    pub fn drift(mut self, length: f32, z_per_time_bin: f32) -> Self {
        self.drift_length = length;
        self.z_per_time_bin = z_per_time_bin;
        self
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        let positive = [
            ("first_row_radius", self.first_row_radius),
            ("row_pitch", self.row_pitch),
            ("pad_pitch", self.pad_pitch),
            ("drift_length", self.drift_length),
            ("z_per_time_bin", self.z_per_time_bin),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(GeometryError::NonPositive(name, value));
            }
        }
        if self.base_pads < 1.0 {
            return Err(GeometryError::EmptyRow(0));
        }
        Ok(())
    }

    #[inline(always)]
    pub fn build(self) -> Result<Geometry, GeometryError> {
        Geometry::new(self)
    }
}

// ------------------------------------------------------------------
// 4. Geometry service
// ------------------------------------------------------------------
/// Validated geometry. Construction is the only fallible step; every lookup
/// afterwards is infallible and cheap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    cfg: GeometryConfig,
}

impl Geometry {
    pub fn new(cfg: GeometryConfig) -> Result<Self, GeometryError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    #[inline(always)]
    pub fn config(&self) -> &GeometryConfig {
        &self.cfg
    }

    /// Radial position of a pad row.
    #[inline(always)]
    pub fn row_radius(&self, row: u32) -> f32 {
        self.cfg.first_row_radius + row as f32 * self.cfg.row_pitch
    }

    /// Reference angle of a sector. Sectors 0..18 and 18..36 cover the two
    /// detector sides with identical azimuthal segmentation.
    #[inline(always)]
    pub fn sector_angle(&self, sector: u32) -> f32 {
        let half = (NSECTORS / 2) as u32;
        let seg = (sector % half) as f32;
        (seg + 0.5) * (2.0 * std::f32::consts::PI / half as f32)
    }

    /// Pads on a row, never zero for a validated config.
    #[inline(always)]
    pub fn pad_count(&self, row: u32) -> f32 {
        self.cfg.base_pads + row as f32 * self.cfg.pads_per_row
    }

    // ------------------------------------------------------------------
    // 5. Coordinate conversions
    // ------------------------------------------------------------------
    /// Longitudinal position of a (fractional) time bin. Sectors on the far
    /// side drift towards negative z.
    #[inline(always)]
    pub fn z_of_time(&self, sector: u32, time: f32) -> f32 {
        let z = self.cfg.drift_length - time * self.cfg.z_per_time_bin;
        if sector >= (NSECTORS / 2) as u32 {
            -z
        } else {
            z
        }
    }

    /// Inverse of [`z_of_time`](Self::z_of_time) for the same sector.
    #[inline(always)]
    pub fn time_of_z(&self, sector: u32, z: f32) -> f32 {
        let signed = if sector >= (NSECTORS / 2) as u32 { -z } else { z };
        (self.cfg.drift_length - signed) / self.cfg.z_per_time_bin
    }

    /// Transverse position of a (fractional) pad index, centred on the row.
    #[inline(always)]
    pub fn y_of_pad(&self, _sector: u32, row: u32, pad: f32) -> f32 {
        (pad - self.pad_count(row) * 0.5) * self.cfg.pad_pitch
    }

    /// Inverse of [`y_of_pad`](Self::y_of_pad).
    #[inline(always)]
    pub fn pad_of_y(&self, _sector: u32, row: u32, y: f32) -> f32 {
        y / self.cfg.pad_pitch + self.pad_count(row) * 0.5
    }

    // ------------------------------------------------------------------
    // 6. Quantization
    // ------------------------------------------------------------------
    /// Quantize a fractional time bin into the packed integer scale.
    #[inline(always)]
    pub fn pack_time(&self, time: f32) -> u32 {
        (time.max(0.0) * TIME_PACK_SCALE + 0.5) as u32
    }

    #[inline(always)]
    pub fn unpack_time(&self, packed: u32) -> f32 {
        packed as f32 / TIME_PACK_SCALE
    }

    /// Quantize a fractional pad index into the packed integer scale.
    #[inline(always)]
    pub fn pack_pad(&self, pad: f32) -> u16 {
        (pad.max(0.0) * PAD_PACK_SCALE + 0.5) as u16
    }

    #[inline(always)]
    pub fn unpack_pad(&self, packed: u16) -> f32 {
        packed as f32 / PAD_PACK_SCALE
    }
}

impl Default for Geometry {
    fn default() -> Self {
        // Default config is always valid.
        Self {
            cfg: GeometryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(GeometryConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_pitch() {
        let cfg = GeometryConfig::default().row_pitch(0.0);
        assert_eq!(
            cfg.validate(),
            Err(GeometryError::NonPositive("row_pitch", 0.0))
        );
    }

    #[test]
    fn time_z_conversions_invert() {
        let geo = Geometry::default();
        for sector in [0u32, 7, 18, 35] {
            for time in [0.0f32, 12.5, 440.0] {
                let z = geo.z_of_time(sector, time);
                let back = geo.time_of_z(sector, z);
                assert!((back - time).abs() < 1e-3, "sector {sector} time {time}");
            }
        }
    }

    #[test]
    fn pad_y_conversions_invert() {
        let geo = Geometry::default();
        for row in [0u32, 80, 151] {
            for pad in [0.0f32, 33.25, 100.0] {
                let y = geo.y_of_pad(4, row, pad);
                let back = geo.pad_of_y(4, row, y);
                assert!((back - pad).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn far_side_sectors_flip_z() {
        let geo = Geometry::default();
        let z_a = geo.z_of_time(0, 100.0);
        let z_c = geo.z_of_time(18, 100.0);
        assert_eq!(z_a, -z_c);
    }

    #[test]
    fn packing_rounds_to_nearest() {
        let geo = Geometry::default();
        assert_eq!(geo.pack_time(1.0), TIME_PACK_SCALE as u32);
        assert_eq!(geo.pack_pad(2.0), (2.0 * PAD_PACK_SCALE) as u16);
        let t = geo.unpack_time(geo.pack_time(7.25));
        assert!((t - 7.25).abs() < 1.0 / TIME_PACK_SCALE);
    }
}
