//! **Compressed container**: the column-oriented input format the engine
//! consumes, plus structural validation and checksummed byte round-trips.
//!
//! The layout is one array per field, one entry per logical unit. Attached
//! residual columns exclude each track's first cluster (that one rides in
//! the per-track absolute columns), while the shape and charge columns
//! cover every attached cluster; the decode passes keep separate cursors
//! for the two groups. Nothing here interprets the data: decoding semantics
//! live in [`crate::decompress`].

use crate::geometry::{NPARTITIONS, NROWS, NSECTORS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------
// 1. Errors
// ------------------------------------------------------------------
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("column {column} has length {found}, expected {expected}")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("declared {declared} {kind} clusters, columns account for {found}")]
    CountMismatch {
        kind: &'static str,
        declared: usize,
        found: usize,
    },
    #[error("track {track} declares zero clusters")]
    EmptyTrack { track: usize },
    #[error("track {track} starts in sector {sector}, valid range is 0..{}", NSECTORS)]
    SectorOutOfRange { track: usize, sector: u8 },
    #[error("track {track} starts on row {row}, valid range is 0..{}", NROWS)]
    RowOutOfRange { track: usize, row: u8 },
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Checksum { stored: u32, computed: u32 },
    #[error("byte stream truncated: {0} bytes is below the checksum trailer")]
    Truncated(usize),
}

impl From<bincode::Error> for ContainerError {
    fn from(err: bincode::Error) -> Self {
        ContainerError::Serialization(err.to_string())
    }
}

// ------------------------------------------------------------------
// 2. Column groups
// ------------------------------------------------------------------
/// Per-track columns: the absolute seed of each track's first cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackColumns {
    pub sector: Vec<u8>,
    pub row: Vec<u8>,
    pub time: Vec<u32>,
    pub pad: Vec<u16>,
    pub curvature: Vec<u8>,
    pub cluster_count: Vec<u16>,
}

/// Attached-cluster columns. The four residual columns have one entry per
/// attached cluster after its track's first; the rest cover all attached
/// clusters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachedColumns {
    pub leg_sector_diff: Vec<u8>,
    pub row_diff: Vec<u8>,
    pub time_res: Vec<u32>,
    pub pad_res: Vec<u16>,
    pub flags: Vec<u8>,
    pub sigma_time: Vec<u8>,
    pub sigma_pad: Vec<u8>,
    pub q_max: Vec<u16>,
    pub q_tot: Vec<u16>,
}

/// Unattached-cluster columns. `partition_count` spans the full grid in
/// (sector, row) enumeration order; the rest have one entry per unattached
/// cluster in the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnattachedColumns {
    pub partition_count: Vec<u32>,
    pub time_diff: Vec<u32>,
    pub pad_diff: Vec<u16>,
    pub flags: Vec<u8>,
    pub sigma_time: Vec<u8>,
    pub sigma_pad: Vec<u8>,
    pub q_max: Vec<u16>,
    pub q_tot: Vec<u16>,
}

impl Default for UnattachedColumns {
    fn default() -> Self {
        Self {
            partition_count: vec![0; NPARTITIONS],
            time_diff: Vec::new(),
            pad_diff: Vec::new(),
            flags: Vec::new(),
            sigma_time: Vec::new(),
            sigma_pad: Vec::new(),
            q_max: Vec::new(),
            q_tot: Vec::new(),
        }
    }
}

// ------------------------------------------------------------------
// 3. Container
// ------------------------------------------------------------------
/// Mode flag bit: successive values are deltas accumulated onto a running
/// value rather than stand-alone absolutes.
pub const MODE_DIFFERENTIAL: u8 = 0x02;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressedClusters {
    pub attached_count: u32,
    pub unattached_count: u32,
    /// Container-wide encoding flags; see [`MODE_DIFFERENTIAL`].
    pub mode: u8,
    pub tracks: TrackColumns,
    pub attached: AttachedColumns,
    pub unattached: UnattachedColumns,
}

impl CompressedClusters {
    #[inline(always)]
    pub fn track_count(&self) -> usize {
        self.tracks.cluster_count.len()
    }

    /// Whether both passes accumulate deltas instead of reading absolutes.
    #[inline(always)]
    pub fn is_differential(&self) -> bool {
        self.mode & MODE_DIFFERENTIAL != 0
    }

    #[inline(always)]
    pub fn total_clusters(&self) -> usize {
        self.attached_count as usize + self.unattached_count as usize
    }

    // ------------------------------------------------------------------
    // 4. Structural validation
    // ------------------------------------------------------------------
    /// Check every declared count against the column lengths. The decode
    /// passes index columns without further checks once this has passed.
    pub fn validate(&self) -> Result<(), ContainerError> {
        let n_tracks = self.track_count();
        let n_attached = self.attached_count as usize;
        let n_unattached = self.unattached_count as usize;

        let track_cols = [
            ("tracks.sector", self.tracks.sector.len()),
            ("tracks.row", self.tracks.row.len()),
            ("tracks.time", self.tracks.time.len()),
            ("tracks.pad", self.tracks.pad.len()),
            ("tracks.curvature", self.tracks.curvature.len()),
        ];
        for (column, found) in track_cols {
            if found != n_tracks {
                return Err(ContainerError::LengthMismatch {
                    column,
                    expected: n_tracks,
                    found,
                });
            }
        }

        let mut declared = 0usize;
        for (track, &count) in self.tracks.cluster_count.iter().enumerate() {
            if count == 0 {
                return Err(ContainerError::EmptyTrack { track });
            }
            declared += count as usize;
        }
        if declared != n_attached {
            return Err(ContainerError::CountMismatch {
                kind: "attached",
                declared: n_attached,
                found: declared,
            });
        }

        for (track, (&sector, &row)) in self
            .tracks
            .sector
            .iter()
            .zip(self.tracks.row.iter())
            .enumerate()
        {
            if sector as usize >= NSECTORS {
                return Err(ContainerError::SectorOutOfRange { track, sector });
            }
            if row as usize >= NROWS {
                return Err(ContainerError::RowOutOfRange { track, row });
            }
        }

        let n_residual = n_attached - n_tracks;
        let residual_cols = [
            ("attached.leg_sector_diff", self.attached.leg_sector_diff.len()),
            ("attached.row_diff", self.attached.row_diff.len()),
            ("attached.time_res", self.attached.time_res.len()),
            ("attached.pad_res", self.attached.pad_res.len()),
        ];
        for (column, found) in residual_cols {
            if found != n_residual {
                return Err(ContainerError::LengthMismatch {
                    column,
                    expected: n_residual,
                    found,
                });
            }
        }

        let attached_cols = [
            ("attached.flags", self.attached.flags.len()),
            ("attached.sigma_time", self.attached.sigma_time.len()),
            ("attached.sigma_pad", self.attached.sigma_pad.len()),
            ("attached.q_max", self.attached.q_max.len()),
            ("attached.q_tot", self.attached.q_tot.len()),
        ];
        for (column, found) in attached_cols {
            if found != n_attached {
                return Err(ContainerError::LengthMismatch {
                    column,
                    expected: n_attached,
                    found,
                });
            }
        }

        if self.unattached.partition_count.len() != NPARTITIONS {
            return Err(ContainerError::LengthMismatch {
                column: "unattached.partition_count",
                expected: NPARTITIONS,
                found: self.unattached.partition_count.len(),
            });
        }
        let per_partition: usize = self
            .unattached
            .partition_count
            .iter()
            .map(|&c| c as usize)
            .sum();
        if per_partition != n_unattached {
            return Err(ContainerError::CountMismatch {
                kind: "unattached",
                declared: n_unattached,
                found: per_partition,
            });
        }

        let unattached_cols = [
            ("unattached.time_diff", self.unattached.time_diff.len()),
            ("unattached.pad_diff", self.unattached.pad_diff.len()),
            ("unattached.flags", self.unattached.flags.len()),
            ("unattached.sigma_time", self.unattached.sigma_time.len()),
            ("unattached.sigma_pad", self.unattached.sigma_pad.len()),
            ("unattached.q_max", self.unattached.q_max.len()),
            ("unattached.q_tot", self.unattached.q_tot.len()),
        ];
        for (column, found) in unattached_cols {
            if found != n_unattached {
                return Err(ContainerError::LengthMismatch {
                    column,
                    expected: n_unattached,
                    found,
                });
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // 5. Byte round-trip
    // ------------------------------------------------------------------
    /// Serialize to a byte stream with a crc32 trailer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ContainerError> {
        let mut bytes = bincode::serialize(self)?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&bytes);
        bytes.extend_from_slice(&hasher.finalize().to_le_bytes());
        Ok(bytes)
    }

    /// Deserialize a stream produced by [`to_bytes`](Self::to_bytes),
    /// verifying the trailer before touching the body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.len() < 4 {
            return Err(ContainerError::Truncated(bytes.len()));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(body);
        let computed = hasher.finalize();
        if stored != computed {
            return Err(ContainerError::Checksum { stored, computed });
        }
        Ok(bincode::deserialize(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two unattached clusters in one partition, no tracks.
    fn small_container() -> CompressedClusters {
        let mut c = CompressedClusters {
            unattached_count: 2,
            ..Default::default()
        };
        c.unattached.partition_count[3] = 2;
        c.unattached.time_diff = vec![10, 20];
        c.unattached.pad_diff = vec![1, 2];
        c.unattached.flags = vec![0, 0];
        c.unattached.sigma_time = vec![0, 0];
        c.unattached.sigma_pad = vec![0, 0];
        c.unattached.q_max = vec![5, 6];
        c.unattached.q_tot = vec![50, 60];
        c
    }

    #[test]
    fn empty_container_validates() {
        assert!(CompressedClusters::default().validate().is_ok());
    }

    #[test]
    fn small_container_validates() {
        assert!(small_container().validate().is_ok());
    }

    #[test]
    fn detects_column_length_mismatch() {
        let mut c = small_container();
        c.unattached.q_tot.pop();
        let err = c.validate().unwrap_err();
        assert!(matches!(
            err,
            ContainerError::LengthMismatch {
                column: "unattached.q_tot",
                expected: 2,
                found: 1,
            }
        ));
    }

    #[test]
    fn detects_partition_count_mismatch() {
        let mut c = small_container();
        c.unattached.partition_count[3] = 1;
        assert!(matches!(
            c.validate().unwrap_err(),
            ContainerError::CountMismatch { kind: "unattached", .. }
        ));
    }

    #[test]
    fn detects_empty_track() {
        let mut c = CompressedClusters::default();
        c.tracks.sector = vec![0];
        c.tracks.row = vec![0];
        c.tracks.time = vec![0];
        c.tracks.pad = vec![0];
        c.tracks.curvature = vec![127];
        c.tracks.cluster_count = vec![0];
        assert!(matches!(
            c.validate().unwrap_err(),
            ContainerError::EmptyTrack { track: 0 }
        ));
    }

    #[test]
    fn detects_out_of_range_seed() {
        let mut c = CompressedClusters::default();
        c.attached_count = 1;
        c.tracks.sector = vec![NSECTORS as u8];
        c.tracks.row = vec![0];
        c.tracks.time = vec![0];
        c.tracks.pad = vec![0];
        c.tracks.curvature = vec![127];
        c.tracks.cluster_count = vec![1];
        c.attached.flags = vec![0];
        c.attached.sigma_time = vec![0];
        c.attached.sigma_pad = vec![0];
        c.attached.q_max = vec![0];
        c.attached.q_tot = vec![0];
        assert!(matches!(
            c.validate().unwrap_err(),
            ContainerError::SectorOutOfRange { track: 0, .. }
        ));
    }

    #[test]
    fn byte_round_trip() {
        let c = small_container();
        let bytes = c.to_bytes().unwrap();
        let back = CompressedClusters::from_bytes(&bytes).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn corrupted_stream_fails_checksum() {
        let c = small_container();
        let mut bytes = c.to_bytes().unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        assert!(matches!(
            CompressedClusters::from_bytes(&bytes).unwrap_err(),
            ContainerError::Checksum { .. }
        ));
    }

    #[test]
    fn truncated_stream_reports_length() {
        assert!(matches!(
            CompressedClusters::from_bytes(&[1, 2]).unwrap_err(),
            ContainerError::Truncated(2)
        ));
    }
}
