//! Derived time-series views feeding the monitoring charts.
//!
//! All transforms operate on a time-ascending slice of samples for a single
//! node (raw, delta, windowed-average-delta) or on the registry snapshot
//! (top-K ranking). They are pure and recomputed on demand; an empty input
//! always yields an empty output, never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Sample;
use crate::registry::NodeRegistry;

/// Chunk size of the windowed-average-delta transform.
pub const AVG_WINDOW: usize = 5;

/// How many most-tilted online nodes the ranking view returns.
pub const TOP_K: usize = 6;

/// Which derived view to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Raw,
    Delta,
    AvgDelta,
    TopK,
}

/// One point of a single-valued derived series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// One point of the raw view, both axes paired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPoint {
    pub timestamp: DateTime<Utc>,
    pub axis_x: f64,
    pub axis_y: f64,
}

/// Primary-axis history of one node, for joint charting of the ranked set.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSeries {
    pub door_num: u32,
    pub points: Vec<SeriesPoint>,
}

/// A chart-ready derived structure, recomputed whenever its inputs or
/// parameters change. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationView {
    Raw(Vec<RawPoint>),
    Delta(Vec<SeriesPoint>),
    AvgDelta(Vec<SeriesPoint>),
    /// The currently most-tilted online nodes, worst first, each paired
    /// with its primary-axis series over the selected window.
    TopK(Vec<NodeSeries>),
}

/// Passthrough view: one point per sample, both axes.
pub fn raw_series(samples: &[Sample]) -> Vec<RawPoint> {
    samples
        .iter()
        .map(|s| RawPoint {
            timestamp: s.timestamp,
            axis_x: s.axis_x,
            axis_y: s.axis_y,
        })
        .collect()
}

/// Primary-axis-only view of a sample slice, one point per sample. Feeds
/// the per-node series of the top-K joint chart.
pub fn axis_series(samples: &[Sample]) -> Vec<SeriesPoint> {
    samples
        .iter()
        .map(|s| SeriesPoint {
            timestamp: s.timestamp,
            value: s.axis_x,
        })
        .collect()
}

/// First-difference view over the primary axis.
///
/// Emits `value[i] - value[i-1]` keyed at `sample[i]`'s timestamp; the first
/// sample has no prior value to diff against and produces no point.
pub fn delta_series(samples: &[Sample]) -> Vec<SeriesPoint> {
    samples
        .windows(2)
        .map(|pair| SeriesPoint {
            timestamp: pair[1].timestamp,
            value: pair[1].axis_x - pair[0].axis_x,
        })
        .collect()
}

/// Chunk means over the primary axis, each anchored at its chunk's first
/// sample timestamp. The last chunk may be shorter than [`AVG_WINDOW`] but
/// is never dropped.
pub fn chunk_means(samples: &[Sample]) -> Vec<SeriesPoint> {
    samples
        .chunks(AVG_WINDOW)
        .map(|chunk| SeriesPoint {
            timestamp: chunk[0].timestamp,
            value: chunk.iter().map(|s| s.axis_x).sum::<f64>() / chunk.len() as f64,
        })
        .collect()
}

/// Windowed-average-delta view: first differences of consecutive chunk
/// means. Fewer than two chunks produce no points.
pub fn avg_delta_series(samples: &[Sample]) -> Vec<SeriesPoint> {
    chunk_means(samples)
        .windows(2)
        .map(|pair| SeriesPoint {
            timestamp: pair[1].timestamp,
            value: pair[1].value - pair[0].value,
        })
        .collect()
}

/// Rank the currently-online nodes by absolute primary-axis reading of
/// their latest known value and return the first [`TOP_K`] identities.
/// Ties in magnitude resolve by ascending node identity.
pub fn top_k(registry: &NodeRegistry) -> Vec<u32> {
    let mut ranked: Vec<(u32, f64)> = registry
        .nodes()
        .filter(|n| n.online)
        .map(|n| (n.door_num, n.axis_x.abs()))
        .collect();

    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(TOP_K);
    ranked.into_iter().map(|(door_num, _)| door_num).collect()
}
