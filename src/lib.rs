//! **padrow**: detector-hit cluster decompression for track
//! reconstruction pipelines.
//!
//! The crate turns a compact, differentially-encoded cluster container back
//! into per-partition sorted arrays of hit records. Attached clusters are
//! reconstructed by replaying a trajectory predictor along each track;
//! unattached clusters decode independently per (sector, row) partition.
//! The result is one flat buffer plus an index describing every partition's
//! segment, ready for a downstream tracker.
//!
//! ```
//! use padrow::{CompressedClusters, Decompressor, Geometry};
//!
//! let container = CompressedClusters::default();
//! let engine = Decompressor::new(Geometry::default());
//! let decoded = engine.decompress(&container).unwrap();
//! assert_eq!(decoded.buffer.len(), container.total_clusters());
//! ```

pub mod cluster;
pub mod container;
pub mod decompress;
pub mod geometry;
pub mod model;
pub mod sort;

pub use cluster::{ClusterRecord, PartitionIndex, PartitionKey};
pub use container::{CompressedClusters, ContainerError, MODE_DIFFERENTIAL};
pub use decompress::{
    DecodeStats, DecodedClusters, DecompressError, Decompressor, TIME_RES_SIGN_REGION,
};
pub use geometry::{Geometry, GeometryConfig, GeometryError, NPARTITIONS, NROWS, NSECTORS};
pub use model::{LinearPredictor, PredictError, PredictorConfig, TrackPredictor};
