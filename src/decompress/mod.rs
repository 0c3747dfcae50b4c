//! **Decompression engine**: reconstitutes the full cluster set from the
//! compressed container, partitioned, indexed and canonically sorted.
//!
//! Two passes. The attached pass walks tracks in container order, replaying
//! the trajectory predictor to turn residuals back into absolute (time, pad)
//! coordinates. The unattached pass then walks the partition grid in
//! (sector, row) enumeration order, appending each partition's attached
//! clusters and decoding its unattached ones, before sorting the segment.
//!
//! A predictor failure mid-track truncates that track's remaining clusters.
//! This is a policy, not an error: one numerically degenerate trajectory
//! costs a few hits, never the event. Truncations are counted in
//! [`DecodeStats`] and logged at debug level; later tracks decode from
//! their declared column positions regardless.

use crate::cluster::{ClusterRecord, PartitionIndex, PartitionKey};
use crate::container::{CompressedClusters, ContainerError};
use crate::geometry::{Geometry, NPARTITIONS, NROWS, NSECTORS};
use crate::model::{unpack_curvature, LinearPredictor, TrackPredictor};
use crate::sort;
use thiserror::Error;
use tracing::{debug, instrument, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// ------------------------------------------------------------------
// 1. Sign correction
// ------------------------------------------------------------------
/// Threshold region of the 24-bit time residual marking a negative value.
/// The numeric value is load-bearing for format compatibility; treated as a
/// bit-23 mask and pinned by tests.
pub const TIME_RES_SIGN_REGION: u32 = 0x80_0000;

/// Widen a 24-bit time residual to 32 bits, OR-ing the top byte with 0xFF
/// when the sign region is set.
#[inline(always)]
pub(crate) fn widen_time_res(raw: u32) -> u32 {
    if raw & TIME_RES_SIGN_REGION != 0 {
        raw | 0xFF00_0000
    } else {
        raw
    }
}

// ------------------------------------------------------------------
// 2. Results
// ------------------------------------------------------------------
#[derive(Debug, Error)]
pub enum DecompressError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("decoded {produced} clusters, accounting expected {expected}")]
    Conservation { expected: usize, produced: usize },
}

/// Per-call counters. `attached_decoded` falls short of the declared count
/// exactly when tracks were truncated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub attached_declared: u32,
    pub attached_decoded: u32,
    pub unattached_decoded: u32,
    pub truncated_tracks: u32,
}

/// Owned result of a [`Decompressor::decompress`] call.
#[derive(Debug, Clone)]
pub struct DecodedClusters {
    pub buffer: Vec<ClusterRecord>,
    pub index: PartitionIndex,
    pub stats: DecodeStats,
}

// ------------------------------------------------------------------
// 3. Engine
// ------------------------------------------------------------------
/// The decompression engine. Holds the geometry service and a predictor
/// prototype cloned fresh for every track.
#[derive(Debug, Clone)]
pub struct Decompressor<P = LinearPredictor>
where
    P: TrackPredictor + Clone,
{
    geometry: Geometry,
    predictor: P,
}

impl Decompressor<LinearPredictor> {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            predictor: LinearPredictor::default(),
        }
    }
}

impl<P> Decompressor<P>
where
    P: TrackPredictor + Clone,
{
    pub fn with_predictor(geometry: Geometry, predictor: P) -> Self {
        Self {
            geometry,
            predictor,
        }
    }

    /// Decode into a freshly allocated buffer.
    pub fn decompress(
        &self,
        compressed: &CompressedClusters,
    ) -> Result<DecodedClusters, DecompressError> {
        let mut buffer = Vec::new();
        let (index, stats) = self.decompress_into(compressed, &mut buffer)?;
        Ok(DecodedClusters {
            buffer,
            index,
            stats,
        })
    }

    /// Decode into a caller-owned buffer, which is resized to the decoded
    /// total. Returns the partition index and the decode counters.
    #[instrument(skip_all, fields(tracks = compressed.track_count()))]
    pub fn decompress_into(
        &self,
        compressed: &CompressedClusters,
        buffer: &mut Vec<ClusterRecord>,
    ) -> Result<(PartitionIndex, DecodeStats), DecompressError> {
        compressed.validate()?;

        let (partitions, mut stats) = self.decode_attached(compressed);

        buffer.clear();
        let mut index = PartitionIndex::empty();
        #[cfg(feature = "parallel")]
        self.decode_unattached_parallel(compressed, partitions, buffer, &mut index);
        #[cfg(not(feature = "parallel"))]
        self.decode_unattached_sequential(compressed, partitions, buffer, &mut index);

        stats.unattached_decoded = compressed.unattached_count;
        let expected = stats.attached_decoded as usize + stats.unattached_decoded as usize;
        if buffer.len() != expected {
            return Err(DecompressError::Conservation {
                expected,
                produced: buffer.len(),
            });
        }
        trace!(
            attached = stats.attached_decoded,
            unattached = stats.unattached_decoded,
            truncated = stats.truncated_tracks,
            "decode complete"
        );
        Ok((index, stats))
    }

    // ------------------------------------------------------------------
    // 4. Attached pass
    // ------------------------------------------------------------------
    /// Decode every track's clusters into per-partition working lists.
    ///
    /// `offset` counts attached clusters across all tracks; the residual
    /// columns skip each track's first cluster, so their cursor runs
    /// `offset - track - 1`. A truncated track still advances `offset` past
    /// its declared range, keeping later tracks aligned with their columns.
    fn decode_attached(
        &self,
        compressed: &CompressedClusters,
    ) -> (Vec<Vec<ClusterRecord>>, DecodeStats) {
        let geo = &self.geometry;
        let tracks = &compressed.tracks;
        let attached = &compressed.attached;
        let differential = compressed.is_differential();

        let mut partitions: Vec<Vec<ClusterRecord>> = vec![Vec::new(); NPARTITIONS];
        let mut stats = DecodeStats {
            attached_declared: compressed.attached_count,
            ..Default::default()
        };

        let mut offset = 0usize;
        for track in 0..compressed.track_count() {
            let declared = tracks.cluster_count[track] as usize;
            let track_start = offset;
            let mut sector = tracks.sector[track] as u32;
            let mut row = tracks.row[track] as u32;
            let mut predictor = self.predictor.clone();

            for j in 0..declared {
                let time;
                let pad;
                if j > 0 {
                    let cursor = offset - track - 1;
                    let mut diff = attached.leg_sector_diff[cursor] as u32;
                    let change_leg = diff >= NSECTORS as u32;
                    if change_leg {
                        diff -= NSECTORS as u32;
                    }
                    if differential {
                        sector = (sector + diff) % NSECTORS as u32;
                        row = (row + attached.row_diff[cursor] as u32) % NROWS as u32;
                    } else {
                        sector = diff % NSECTORS as u32;
                        row = attached.row_diff[cursor] as u32 % NROWS as u32;
                    }
                    if change_leg {
                        if let Err(cause) = predictor.mirror() {
                            debug!(track, cluster = j, %cause, "track truncated on mirror");
                            offset = track_start + declared;
                            stats.truncated_tracks += 1;
                            break;
                        }
                    }
                    if let Err(cause) =
                        predictor.propagate(geo.row_radius(row), geo.sector_angle(sector))
                    {
                        debug!(track, cluster = j, %cause, "track truncated on propagation");
                        offset = track_start + declared;
                        stats.truncated_tracks += 1;
                        break;
                    }
                    let res = widen_time_res(attached.time_res[cursor]);
                    let predicted_time =
                        geo.pack_time(geo.time_of_z(sector, predictor.z()));
                    let predicted_pad =
                        geo.pack_pad(geo.pad_of_y(sector, row, predictor.y()));
                    time = res.wrapping_add(predicted_time);
                    pad = attached.pad_res[cursor].wrapping_add(predicted_pad);
                } else {
                    time = tracks.time[track];
                    pad = tracks.pad[track];
                }

                let record = ClusterRecord {
                    time,
                    pad,
                    flags: attached.flags[offset],
                    sigma_time: attached.sigma_time[offset],
                    sigma_pad: attached.sigma_pad[offset],
                    q_max: attached.q_max[offset],
                    q_tot: attached.q_tot[offset],
                };
                partitions[PartitionKey::new(sector as u8, row as u8).flat()].push(record);
                stats.attached_decoded += 1;

                let y = geo.y_of_pad(sector, row, geo.unpack_pad(pad));
                let z = geo.z_of_time(sector, geo.unpack_time(time));
                if j == 0 {
                    predictor.init(
                        geo.row_radius(row),
                        y,
                        z,
                        geo.sector_angle(sector),
                        unpack_curvature(tracks.curvature[track]),
                    );
                }
                if j + 1 < declared {
                    if let Err(cause) = predictor.filter(y, z, row as u8) {
                        debug!(track, cluster = j, %cause, "track truncated on filter");
                        offset = track_start + declared;
                        stats.truncated_tracks += 1;
                        break;
                    }
                }
                offset += 1;
            }
        }

        (partitions, stats)
    }

    // ------------------------------------------------------------------
    // 5. Unattached pass, sequential
    // ------------------------------------------------------------------
    /// Walk the grid in enumeration order, appending attached lists and
    /// decoding unattached clusters with running accumulators, then sort
    /// each partition segment in place.
    #[cfg_attr(feature = "parallel", allow(dead_code))]
    fn decode_unattached_sequential(
        &self,
        compressed: &CompressedClusters,
        partitions: Vec<Vec<ClusterRecord>>,
        buffer: &mut Vec<ClusterRecord>,
        index: &mut PartitionIndex,
    ) {
        let unattached = &compressed.unattached;
        let differential = compressed.is_differential();

        let mut cursor = 0usize;
        for (flat, attached_list) in partitions.into_iter().enumerate() {
            let start = buffer.len();
            let count_u = unattached.partition_count[flat] as usize;
            buffer.extend(attached_list);

            let mut time = 0u32;
            let mut pad = 0u16;
            for _ in 0..count_u {
                buffer.push(decode_unattached_step(
                    unattached,
                    cursor,
                    differential,
                    &mut time,
                    &mut pad,
                ));
                cursor += 1;
            }

            index.set(flat, start as u32, (buffer.len() - start) as u32);
            sort::sort_by(&mut buffer[start..], ClusterRecord::canonical_less);
        }
    }

    // ------------------------------------------------------------------
    // 6. Unattached pass, partition-parallel
    // ------------------------------------------------------------------
    /// Identical output to the sequential pass. Output offsets and input
    /// cursors both come from prefix sums over the partition counts, so no
    /// partition depends on its predecessors' decode order.
    #[cfg(feature = "parallel")]
    fn decode_unattached_parallel(
        &self,
        compressed: &CompressedClusters,
        partitions: Vec<Vec<ClusterRecord>>,
        buffer: &mut Vec<ClusterRecord>,
        index: &mut PartitionIndex,
    ) {
        let unattached = &compressed.unattached;
        let differential = compressed.is_differential();

        // Prefix sums: output offset and unattached input cursor per
        // partition.
        let mut cursors = vec![0usize; NPARTITIONS];
        let mut total = 0usize;
        let mut cursor = 0usize;
        for flat in 0..NPARTITIONS {
            let count_u = unattached.partition_count[flat] as usize;
            let len = partitions[flat].len() + count_u;
            index.set(flat, total as u32, len as u32);
            cursors[flat] = cursor;
            total += len;
            cursor += count_u;
        }

        buffer.resize(total, ClusterRecord::default());
        let mut segments: Vec<&mut [ClusterRecord]> = Vec::with_capacity(NPARTITIONS);
        let mut rest: &mut [ClusterRecord] = buffer.as_mut_slice();
        for flat in 0..NPARTITIONS {
            let (segment, tail) = rest.split_at_mut(index.count(PartitionKey::from_flat(flat)));
            segments.push(segment);
            rest = tail;
        }

        segments
            .into_par_iter()
            .zip(partitions.into_par_iter())
            .zip(cursors.into_par_iter())
            .for_each(|((segment, attached_list), mut cursor)| {
                let attached_len = attached_list.len();
                segment[..attached_len].copy_from_slice(&attached_list);

                let mut time = 0u32;
                let mut pad = 0u16;
                for slot in segment[attached_len..].iter_mut() {
                    *slot = decode_unattached_step(
                        unattached,
                        cursor,
                        differential,
                        &mut time,
                        &mut pad,
                    );
                    cursor += 1;
                }
                sort::sort_by(segment, ClusterRecord::canonical_less);
            });
    }
}

/// Decode one unattached cluster. The running accumulators implement
/// cumulative mode; absolute mode overwrites them.
#[inline(always)]
fn decode_unattached_step(
    unattached: &crate::container::UnattachedColumns,
    cursor: usize,
    differential: bool,
    time: &mut u32,
    pad: &mut u16,
) -> ClusterRecord {
    if differential {
        *time = time.wrapping_add(widen_time_res(unattached.time_diff[cursor]));
        *pad = pad.wrapping_add(unattached.pad_diff[cursor]);
    } else {
        *time = unattached.time_diff[cursor];
        *pad = unattached.pad_diff[cursor];
    }
    ClusterRecord {
        time: *time,
        pad: *pad,
        flags: unattached.flags[cursor],
        sigma_time: unattached.sigma_time[cursor],
        sigma_pad: unattached.sigma_pad[cursor],
        q_max: unattached.q_max[cursor],
        q_tot: unattached.q_tot[cursor],
    }
}
