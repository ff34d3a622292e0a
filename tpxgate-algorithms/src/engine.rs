//! Online clustering of a time-ordered hit stream.
//!
//! The engine keeps a small set of open clusters in a dense arena. Each hit
//! is folded into the first open cluster whose box contains it; any further
//! containing clusters are merged into that first one. A hit no cluster
//! contains seeds a new cluster. Clusters are flushed once the stream has
//! moved more than `max_t_gap` past their `t_max`, which acts as a sliding
//! watermark because the input is time-ordered.
//!
//! This is a greedy, order-dependent approximation: it never revisits a
//! decision, so the partition it produces depends on arrival order and is
//! not a globally optimal spatio-temporal clustering.
//!
//! Complexity is O(hits × open clusters); the watermark keeps the open set
//! small for realistic hit rates.

use crate::cluster::{Cluster, ClusterSettings};
use tpxgate_core::{ClusterRecord, PixelHit};

const INITIAL_CAPACITY: usize = 10_000;

/// Counters describing the engine's work so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusteringStatistics {
    /// Hits folded, merged or used as seeds.
    pub hits_processed: u64,
    /// Clusters emitted by the watermark or by [`ClusterEngine::flush`].
    pub clusters_completed: u64,
    /// Pairwise merges triggered by hits matching several clusters.
    pub merges: u64,
    /// Clusters currently open.
    pub open_clusters: usize,
}

/// Single-threaded online clustering state.
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    settings: ClusterSettings,
    open: Vec<Cluster>,
    hits_processed: u64,
    clusters_completed: u64,
    merges: u64,
}

impl Default for ClusterEngine {
    fn default() -> Self {
        Self::new(ClusterSettings::default())
    }
}

impl ClusterEngine {
    /// Creates an engine with the given settings.
    #[must_use]
    pub fn new(settings: ClusterSettings) -> Self {
        Self {
            settings,
            open: Vec::with_capacity(INITIAL_CAPACITY),
            hits_processed: 0,
            clusters_completed: 0,
            merges: 0,
        }
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    /// Replaces the settings. Open clusters keep their boxes; the new
    /// windows apply from the next hit onward.
    pub fn set_settings(&mut self, settings: ClusterSettings) {
        self.settings = settings;
    }

    /// Clusters that can still receive hits, in arena order.
    #[must_use]
    pub fn open_clusters(&self) -> &[Cluster] {
        &self.open
    }

    /// Number of open clusters.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Processes one hit, appending any flushed records to `out`.
    ///
    /// Expired clusters are flushed before the hit is matched. A hit can
    /// never lie inside an expired cluster (it would need `t <= t_max`), so
    /// this yields the same partition as matching first.
    pub fn process_hit(&mut self, hit: &PixelHit, out: &mut Vec<ClusterRecord>) {
        self.hits_processed += 1;
        self.flush_expired(hit.toa, out);

        let mut first_match: Option<usize> = None;
        let mut ix = 0;
        while ix < self.open.len() {
            if !self.open[ix].contains(hit) {
                ix += 1;
                continue;
            }
            match first_match {
                None => {
                    self.open[ix].add_hit(hit, &self.settings);
                    first_match = Some(ix);
                    ix += 1;
                }
                Some(target) => {
                    // target < ix, so the swap cannot move it. The element
                    // swapped into ix has not been tested yet; stay on ix.
                    let absorbed = self.open.swap_remove(ix);
                    self.open[target].add_cluster(&absorbed);
                    self.merges += 1;
                }
            }
        }

        if first_match.is_none() {
            self.open.push(Cluster::from_hit(hit, &self.settings));
        }
    }

    /// Processes hits in order. Returns the number of records appended.
    pub fn process_hits<I>(&mut self, hits: I, out: &mut Vec<ClusterRecord>) -> usize
    where
        I: IntoIterator<Item = PixelHit>,
    {
        let before = out.len();
        for hit in hits {
            self.process_hit(&hit, out);
        }
        out.len() - before
    }

    /// Emits every open cluster and clears the open set.
    pub fn flush(&mut self, out: &mut Vec<ClusterRecord>) -> usize {
        let flushed = self.open.len();
        out.extend(self.open.drain(..).map(|cluster| cluster.record()));
        self.clusters_completed += flushed as u64;
        flushed
    }

    /// Counters so far.
    #[must_use]
    pub fn statistics(&self) -> ClusteringStatistics {
        ClusteringStatistics {
            hits_processed: self.hits_processed,
            clusters_completed: self.clusters_completed,
            merges: self.merges,
            open_clusters: self.open.len(),
        }
    }

    fn flush_expired(&mut self, t: u64, out: &mut Vec<ClusterRecord>) {
        // Reverse order: swap_remove only pulls in already-visited elements.
        for ix in (0..self.open.len()).rev() {
            if self.open[ix].is_expired(t, &self.settings) {
                out.push(self.open.swap_remove(ix).record());
                self.clusters_completed += 1;
            }
        }
    }
}
