//! Central metrics registry and metric definitions
//!
//! Prometheus metrics for the coordinator catalog and the data node replicas.
//! Metrics are registered lazily on first access using once_cell::Lazy.
//! Components report through [`MetricsSink`] so tests can swap in [`NoopMetrics`].

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge, register_int_gauge_vec, IntCounterVec, IntGauge,
    IntGaugeVec,
};

use crate::ids::{CollectionId, NodeId};
use crate::segment::SegmentState;

// ===== Coordinator Metrics =====

/// Number of segments tracked by the coordinator, by state
pub static SEGMENT_STATE_COUNT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "seglake_datacoord_segments",
        "Number of segments by state",
        &["state"]
    )
    .expect("Failed to register segment state gauge")
});

/// Rows stored in flushed segments, per collection
pub static STORED_ROWS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "seglake_datacoord_stored_rows",
        "Number of rows stored in flushed segments",
        &["collection"]
    )
    .expect("Failed to register stored rows gauge")
});

/// Total rows ever flushed, per collection
pub static STORED_ROWS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "seglake_datacoord_stored_rows_total",
        "Total number of rows flushed",
        &["collection"]
    )
    .expect("Failed to register stored rows counter")
});

/// Number of collections known to the coordinator
pub static COLLECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "seglake_datacoord_collections",
        "Number of collections known to the coordinator"
    )
    .expect("Failed to register collections gauge")
});

// ===== Data Node Metrics =====

/// Unflushed segments held by each data node
pub static UNFLUSHED_SEGMENTS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "seglake_datanode_unflushed_segments",
        "Number of unflushed segments held by a data node",
        &["node_id"]
    )
    .expect("Failed to register unflushed segments gauge")
});

/// Observability hooks used by the catalog and replica.
pub trait MetricsSink: Send + Sync {
    /// Adjusts the population of `state` by `delta`.
    fn segment_state_changed(&self, state: SegmentState, delta: i64);

    /// Zeroes every state gauge, used on reload.
    fn reset_segment_states(&self);

    /// Adjusts the stored-row gauge; positive deltas also feed the counter.
    fn stored_rows_changed(&self, collection_id: CollectionId, delta: i64);

    /// Resets the stored-row gauge of a collection.
    fn reset_stored_rows(&self, collection_id: CollectionId);

    fn set_collection_count(&self, count: usize);

    fn unflushed_segments_changed(&self, node_id: NodeId, delta: i64);
}

/// Sink backed by the global Prometheus registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl MetricsSink for PrometheusMetrics {
    fn segment_state_changed(&self, state: SegmentState, delta: i64) {
        SEGMENT_STATE_COUNT
            .with_label_values(&[state.label()])
            .add(delta);
    }

    fn reset_segment_states(&self) {
        for state in SegmentState::ALL {
            SEGMENT_STATE_COUNT.with_label_values(&[state.label()]).set(0);
        }
    }

    fn stored_rows_changed(&self, collection_id: CollectionId, delta: i64) {
        let label = collection_id.to_string();
        STORED_ROWS.with_label_values(&[&label]).add(delta);
        if delta > 0 {
            STORED_ROWS_TOTAL
                .with_label_values(&[&label])
                .inc_by(delta as u64);
        }
    }

    fn reset_stored_rows(&self, collection_id: CollectionId) {
        STORED_ROWS
            .with_label_values(&[&collection_id.to_string()])
            .set(0);
    }

    fn set_collection_count(&self, count: usize) {
        COLLECTIONS.set(count as i64);
    }

    fn unflushed_segments_changed(&self, node_id: NodeId, delta: i64) {
        UNFLUSHED_SEGMENTS
            .with_label_values(&[&node_id.to_string()])
            .add(delta);
    }
}

/// Sink that drops every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn segment_state_changed(&self, _state: SegmentState, _delta: i64) {}

    fn reset_segment_states(&self) {}

    fn stored_rows_changed(&self, _collection_id: CollectionId, _delta: i64) {}

    fn reset_stored_rows(&self, _collection_id: CollectionId) {}

    fn set_collection_count(&self, _count: usize) {}

    fn unflushed_segments_changed(&self, _node_id: NodeId, _delta: i64) {}
}
