//! Core domain types and traits shared by the SegLake coordinator and data nodes.

pub mod binlog;
pub mod cancel;
pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod schema;
pub mod segment;
pub mod traits;

pub use cancel::with_cancellation;
pub use config::{DataCoordConfig, DataNodeConfig, PkIndexConfig, SegLakeConfig};
pub use error::{CoreError, CoreResult};
pub use ids::{CollectionId, FieldId, NodeId, PartitionId, PlanId, SegmentId, Timestamp};
pub use metrics::{MetricsSink, NoopMetrics, PrometheusMetrics};
pub use schema::{CollectionSchema, DataType, FieldData, FieldSchema};
pub use segment::{
    Binlog, CheckPoint, CompactionResult, CompactionSegmentBinlogs, FieldBinlog, KeyDataPair,
    MsgPosition, SegmentInfo, SegmentStartPosition, SegmentState, SegmentStats,
};
pub use traits::{BlobStore, SchemaProvider, TxnKv};
