//! **Output data model**: decoded cluster records, the canonical ordering,
//! and the per-partition index over the flat output buffer.

use crate::geometry::{NPARTITIONS, NROWS, NSECTORS};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Range;

// ------------------------------------------------------------------
// 1. Cluster record
// ------------------------------------------------------------------
/// One reconstructed detector hit.
///
/// `time` and `pad` are quantized coordinates on the packed integer scales
/// (see [`crate::geometry`]); the remaining fields carry shape and charge
/// information straight from the container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub time: u32,
    pub pad: u16,
    pub flags: u8,
    pub sigma_time: u8,
    pub sigma_pad: u8,
    pub q_max: u16,
    pub q_tot: u16,
}

impl ClusterRecord {
    /// Canonical ordering inside a partition: ascending time, ties broken
    /// by pad. Charge and shape fields do not participate.
    #[inline(always)]
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.pad.cmp(&other.pad))
    }

    /// Strict-less form of [`canonical_cmp`](Self::canonical_cmp), the shape
    /// the sort primitive's comparator variants take.
    #[inline(always)]
    pub fn canonical_less(a: &Self, b: &Self) -> bool {
        a.canonical_cmp(b) == Ordering::Less
    }
}

// ------------------------------------------------------------------
// 2. Partition key
// ------------------------------------------------------------------
/// A (sector, row) grid cell. Every cluster belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub sector: u8,
    pub row: u8,
}

impl PartitionKey {
    #[inline(always)]
    pub fn new(sector: u8, row: u8) -> Self {
        debug_assert!((sector as usize) < NSECTORS && (row as usize) < NROWS);
        Self { sector, row }
    }

    /// Flat index in (sector, row) enumeration order.
    #[inline(always)]
    pub fn flat(&self) -> usize {
        self.sector as usize * NROWS + self.row as usize
    }

    #[inline(always)]
    pub fn from_flat(flat: usize) -> Self {
        debug_assert!(flat < NPARTITIONS);
        Self {
            sector: (flat / NROWS) as u8,
            row: (flat % NROWS) as u8,
        }
    }
}

// ------------------------------------------------------------------
// 3. Partition index
// ------------------------------------------------------------------
/// Per-partition (offset, count) view over the flat output buffer. Covers
/// the full grid; empty partitions carry the offset of the following
/// segment and a count of zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionIndex {
    offsets: Vec<u32>,
    counts: Vec<u32>,
}

impl PartitionIndex {
    pub fn empty() -> Self {
        Self {
            offsets: vec![0; NPARTITIONS],
            counts: vec![0; NPARTITIONS],
        }
    }

    #[inline(always)]
    pub(crate) fn set(&mut self, flat: usize, offset: u32, count: u32) {
        self.offsets[flat] = offset;
        self.counts[flat] = count;
    }

    #[inline(always)]
    pub fn offset(&self, key: PartitionKey) -> usize {
        self.offsets[key.flat()] as usize
    }

    #[inline(always)]
    pub fn count(&self, key: PartitionKey) -> usize {
        self.counts[key.flat()] as usize
    }

    /// Byte-free range of the partition's segment in the flat buffer.
    #[inline(always)]
    pub fn range(&self, key: PartitionKey) -> Range<usize> {
        let start = self.offset(key);
        start..start + self.count(key)
    }

    /// Borrow the partition's segment out of the caller-owned buffer.
    #[inline(always)]
    pub fn segment<'a>(&self, buffer: &'a [ClusterRecord], key: PartitionKey) -> &'a [ClusterRecord] {
        &buffer[self.range(key)]
    }

    /// Total clusters covered by the index.
    pub fn total(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }

    /// Iterate all partitions in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (PartitionKey, Range<usize>)> + '_ {
        (0..NPARTITIONS).map(move |flat| {
            let key = PartitionKey::from_flat(flat);
            (key, self.range(key))
        })
    }
}

impl Default for PartitionIndex {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(time: u32, pad: u16) -> ClusterRecord {
        ClusterRecord {
            time,
            pad,
            ..Default::default()
        }
    }

    #[test]
    fn canonical_order_is_time_then_pad() {
        assert_eq!(rec(1, 9).canonical_cmp(&rec(2, 0)), Ordering::Less);
        assert_eq!(rec(2, 1).canonical_cmp(&rec(2, 3)), Ordering::Less);
        assert_eq!(rec(2, 3).canonical_cmp(&rec(2, 3)), Ordering::Equal);
        assert!(ClusterRecord::canonical_less(&rec(0, 1), &rec(0, 2)));
        assert!(!ClusterRecord::canonical_less(&rec(0, 2), &rec(0, 2)));
    }

    #[test]
    fn charge_fields_do_not_order() {
        let a = ClusterRecord {
            q_tot: 500,
            ..rec(4, 4)
        };
        let b = ClusterRecord {
            q_tot: 1,
            ..rec(4, 4)
        };
        assert_eq!(a.canonical_cmp(&b), Ordering::Equal);
    }

    #[test]
    fn flat_round_trip() {
        for flat in [0usize, 151, 152, NPARTITIONS - 1] {
            assert_eq!(PartitionKey::from_flat(flat).flat(), flat);
        }
    }

    #[test]
    fn index_segments() {
        let mut index = PartitionIndex::empty();
        let key = PartitionKey::new(1, 3);
        index.set(key.flat(), 5, 2);
        let buffer: Vec<ClusterRecord> = (0..10).map(|i| rec(i, 0)).collect();
        assert_eq!(index.range(key), 5..7);
        assert_eq!(index.segment(&buffer, key), &buffer[5..7]);
        assert_eq!(index.total(), 2);
    }
}
