//! tpxgate-algorithms: streaming stages of the acquisition gateway.
//!
//! - **Online clustering** - greedy, order-dependent grouping of a
//!   time-ordered hit stream into clusters with watermark-based flushing
//! - **Histogram accumulation** - 256×256 counters published and reset on a
//!   fixed period
//!
#![warn(missing_docs)]

mod cluster;
mod engine;
mod histogram;
mod rate;

pub use cluster::{Cluster, ClusterSettings};
pub use engine::{ClusterEngine, ClusteringStatistics};
pub use histogram::{HistogramAccumulator, HistogramSnapshot};
pub use rate::{RateCounter, RateReport};
