//! Open clusters and the settings that shape them.

use tpxgate_core::{ClusterRecord, PixelHit};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Separation windows used when creating and growing clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClusterSettings {
    /// Spatial half-width (pixels) of the window around each hit.
    pub xy_separation: u32,
    /// Temporal half-width (ToA ticks) of the window around each hit.
    pub t_separation: u32,
    /// Ticks past a cluster's `tmax` after which it is flushed.
    pub max_t_gap: u32,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            xy_separation: 5,
            t_separation: 20,
            max_t_gap: 50_000,
        }
    }
}

impl ClusterSettings {
    /// Creates settings from explicit windows.
    #[must_use]
    pub fn new(xy_separation: u32, t_separation: u32, max_t_gap: u32) -> Self {
        Self {
            xy_separation,
            t_separation,
            max_t_gap,
        }
    }

    #[inline]
    fn xy(&self) -> i32 {
        i32::try_from(self.xy_separation).unwrap_or(i32::MAX / 2)
    }

    #[inline]
    fn t(&self) -> i64 {
        i64::from(self.t_separation)
    }
}

/// A cluster that may still receive hits.
///
/// The mean is tot-weighted; the bounding box is the union of the expanded
/// windows of every hit folded in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    /// Weighted mean column.
    pub x_mean: f64,
    /// Weighted mean row.
    pub y_mean: f64,
    /// Weighted mean time of arrival.
    pub t_mean: f64,
    /// Sum of tot over all hits.
    pub weight: f64,
    /// Lowest column covered (inclusive).
    pub x_min: i32,
    /// Highest column covered (inclusive).
    pub x_max: i32,
    /// Lowest row covered (inclusive).
    pub y_min: i32,
    /// Highest row covered (inclusive).
    pub y_max: i32,
    /// Earliest time covered (inclusive).
    pub t_min: i64,
    /// Latest time covered (inclusive).
    pub t_max: i64,
}

impl Cluster {
    /// Seeds a cluster from a single hit.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    pub fn from_hit(hit: &PixelHit, settings: &ClusterSettings) -> Self {
        let (x, y, t) = (i32::from(hit.x), i32::from(hit.y), hit.toa as i64);
        let (dxy, dt) = (settings.xy(), settings.t());
        Self {
            x_mean: f64::from(hit.x),
            y_mean: f64::from(hit.y),
            t_mean: hit.toa as f64,
            weight: f64::from(hit.tot),
            x_min: x - dxy,
            x_max: x + dxy,
            y_min: y - dxy,
            y_max: y + dxy,
            t_min: t - dt,
            t_max: t + dt,
        }
    }

    /// True if the hit lies inside the bounding box (inclusive on all edges).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn contains(&self, hit: &PixelHit) -> bool {
        let (x, y, t) = (i32::from(hit.x), i32::from(hit.y), hit.toa as i64);
        self.x_min <= x
            && x <= self.x_max
            && self.y_min <= y
            && y <= self.y_max
            && self.t_min <= t
            && t <= self.t_max
    }

    /// Folds a hit into the running mean and widens the box by its window.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    pub fn add_hit(&mut self, hit: &PixelHit, settings: &ClusterSettings) {
        let w = f64::from(hit.tot);
        self.fold_mean(f64::from(hit.x), f64::from(hit.y), hit.toa as f64, w);

        let (x, y, t) = (i32::from(hit.x), i32::from(hit.y), hit.toa as i64);
        let (dxy, dt) = (settings.xy(), settings.t());
        self.x_min = self.x_min.min(x - dxy);
        self.x_max = self.x_max.max(x + dxy);
        self.y_min = self.y_min.min(y - dxy);
        self.y_max = self.y_max.max(y + dxy);
        self.t_min = self.t_min.min(t - dt);
        self.t_max = self.t_max.max(t + dt);
    }

    /// Merges another cluster into this one (weighted mean, box union).
    pub fn add_cluster(&mut self, other: &Cluster) {
        self.fold_mean(other.x_mean, other.y_mean, other.t_mean, other.weight);
        self.x_min = self.x_min.min(other.x_min);
        self.x_max = self.x_max.max(other.x_max);
        self.y_min = self.y_min.min(other.y_min);
        self.y_max = self.y_max.max(other.y_max);
        self.t_min = self.t_min.min(other.t_min);
        self.t_max = self.t_max.max(other.t_max);
    }

    /// True once a hit at time `t` is more than `max_t_gap` past `t_max`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn is_expired(&self, t: u64, settings: &ClusterSettings) -> bool {
        t as i64 > self.t_max + i64::from(settings.max_t_gap)
    }

    /// The record emitted when this cluster is flushed.
    #[must_use]
    pub fn record(&self) -> ClusterRecord {
        ClusterRecord::new(self.x_mean, self.y_mean, self.t_mean, self.weight)
    }

    // Zero-tot hits carry no weight; a zero total keeps the previous mean
    // instead of dividing by zero.
    fn fold_mean(&mut self, x: f64, y: f64, t: f64, w: f64) {
        let total = self.weight + w;
        if total > 0.0 {
            self.x_mean = (self.x_mean * self.weight + x * w) / total;
            self.y_mean = (self.y_mean * self.weight + y * w) / total;
            self.t_mean = (self.t_mean * self.weight + t * w) / total;
        }
        self.weight = total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_seed_window() {
        let settings = ClusterSettings::new(5, 20, 100);
        let cluster = Cluster::from_hit(&PixelHit::new(2, 10, 100, 7), &settings);
        assert_eq!((cluster.x_min, cluster.x_max), (-3, 7));
        assert_eq!((cluster.y_min, cluster.y_max), (5, 15));
        assert_eq!((cluster.t_min, cluster.t_max), (80, 120));
        assert_relative_eq!(cluster.weight, 7.0);
    }

    #[test]
    fn test_contains_is_inclusive() {
        let settings = ClusterSettings::new(1, 1, 0);
        let cluster = Cluster::from_hit(&PixelHit::new(10, 10, 10, 1), &settings);
        assert!(cluster.contains(&PixelHit::new(11, 9, 11, 1)));
        assert!(!cluster.contains(&PixelHit::new(12, 10, 10, 1)));
        assert!(!cluster.contains(&PixelHit::new(10, 10, 12, 1)));
    }

    #[test]
    fn test_weighted_mean() {
        let settings = ClusterSettings::default();
        let mut cluster = Cluster::from_hit(&PixelHit::new(10, 10, 0, 1), &settings);
        cluster.add_hit(&PixelHit::new(14, 10, 4, 3), &settings);
        assert_relative_eq!(cluster.x_mean, 13.0);
        assert_relative_eq!(cluster.t_mean, 3.0);
        assert_relative_eq!(cluster.weight, 4.0);
    }

    #[test]
    fn test_zero_weight_keeps_mean() {
        let settings = ClusterSettings::default();
        let mut cluster = Cluster::from_hit(&PixelHit::new(10, 10, 0, 0), &settings);
        cluster.add_hit(&PixelHit::new(12, 10, 0, 0), &settings);
        assert_relative_eq!(cluster.x_mean, 10.0);
        assert_eq!(cluster.x_max, 17);
    }

    #[test]
    fn test_expiry_boundary() {
        let settings = ClusterSettings::new(0, 0, 20);
        let cluster = Cluster::from_hit(&PixelHit::new(0, 0, 100, 1), &settings);
        assert!(!cluster.is_expired(120, &settings));
        assert!(cluster.is_expired(121, &settings));
    }
}
