//! Daemon/stability/exclusion metrics: connected-component detection over
//! active cells (8-connectivity) plus a sliding-window stability measure.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

pub const STABILITY_WINDOW: usize = 20;
pub const DAEMON_THRESHOLD: f32 = 0.5;
pub const MIN_DAEMON_SIZE: usize = 3;

/// Result of one daemon-detection pass over a `width x height` grid.
#[derive(Debug, Clone)]
pub struct DaemonResult {
    pub count: usize,
    pub daemon_indices: HashSet<usize>,
    pub noise_indices: HashSet<usize>,
    pub sizes: Vec<usize>,
}

/// Flood-fills 8-connected clusters of cells above `threshold`. Clusters
/// with fewer than `min_size` members are noise, not daemons.
pub fn detect_daemons(values: &[f32], width: usize, height: usize, threshold: f32, min_size: usize) -> DaemonResult {
    let n = width * height;
    let active: Vec<bool> = values[..n.min(values.len())].iter().map(|&v| v > threshold).collect();
    let mut visited = vec![false; n];
    let mut daemon_indices = HashSet::new();
    let mut noise_indices = HashSet::new();
    let mut sizes = Vec::new();

    for idx in 0..n {
        if !active[idx] || visited[idx] {
            continue;
        }
        let mut queue = VecDeque::from([idx]);
        visited[idx] = true;
        let mut cluster = Vec::new();

        while let Some(cidx) = queue.pop_front() {
            cluster.push(cidx);
            let cx = (cidx % width) as i64;
            let cy = (cidx / width) as i64;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = cx + dx;
                    let ny = cy + dy;
                    if nx >= 0 && nx < width as i64 && ny >= 0 && ny < height as i64 {
                        let nidx = (ny as usize) * width + nx as usize;
                        if active[nidx] && !visited[nidx] {
                            visited[nidx] = true;
                            queue.push_back(nidx);
                        }
                    }
                }
            }
        }

        if cluster.len() >= min_size {
            daemon_indices.extend(cluster.iter().copied());
            sizes.push(cluster.len());
        } else {
            noise_indices.extend(cluster.iter().copied());
        }
    }

    DaemonResult {
        count: sizes.len(),
        daemon_indices,
        noise_indices,
        sizes,
    }
}

/// Rolling window of daemon counts, one append per generation, used to
/// compute the stability metric.
#[derive(Debug, Clone, Default)]
pub struct StabilityHistory {
    counts: VecDeque<usize>,
    last_recorded_generation: Option<u64>,
}

impl StabilityHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.last_recorded_generation = None;
    }

    /// Records `count` for `generation`, at most once per generation.
    pub fn record(&mut self, generation: u64, count: usize) {
        if self.last_recorded_generation == Some(generation) {
            return;
        }
        self.counts.push_back(count);
        if self.counts.len() > STABILITY_WINDOW {
            self.counts.pop_front();
        }
        self.last_recorded_generation = Some(generation);
    }

    /// `1 - coefficient_of_variation` over the window, clamped to `[0, 1]`.
    /// Needs at least two samples; otherwise `0.0`.
    pub fn stability(&self) -> f32 {
        if self.counts.len() < 2 {
            return 0.0;
        }
        let n = self.counts.len() as f32;
        let mean: f32 = self.counts.iter().map(|&c| c as f32).sum::<f32>() / n;
        if mean == 0.0 {
            return if self.counts.iter().all(|&c| c == 0) { 1.0 } else { 0.0 };
        }
        let variance: f32 = self.counts.iter().map(|&c| (c as f32 - mean).powi(2)).sum::<f32>() / n;
        let cv = variance.sqrt() / mean;
        (((1.0 - cv).clamp(0.0, 1.0)) * 1000.0).round() / 1000.0
    }
}

/// Daemon/stability/exclusion statistics for the current frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DaemonStats {
    pub active_cells: usize,
    pub generation: u64,
    pub daemon_count: usize,
    pub avg_daemon_size: f32,
    pub noise_cells: usize,
    pub stability: f32,
    pub exclusion: f32,
}

/// Computes daemon statistics for `values` over a `width x height` grid and
/// folds `generation`'s daemon count into `history`.
pub fn compute_stats(
    values: &[f32],
    width: usize,
    height: usize,
    generation: u64,
    history: &mut StabilityHistory,
) -> DaemonStats {
    let n = width * height;
    let result = detect_daemons(values, width, height, DAEMON_THRESHOLD, MIN_DAEMON_SIZE);

    let active = values[..n.min(values.len())].iter().filter(|&&v| v > DAEMON_THRESHOLD).count();
    let avg_size = if result.sizes.is_empty() {
        0.0
    } else {
        (result.sizes.iter().sum::<usize>() as f32 / result.sizes.len() as f32 * 10.0).round() / 10.0
    };

    let exclusion = if result.daemon_indices.is_empty() {
        0.0
    } else {
        let inside: Vec<f32> = (0..n).filter(|i| result.daemon_indices.contains(i)).map(|i| values[i]).collect();
        let outside: Vec<f32> = (0..n).filter(|i| !result.daemon_indices.contains(i)).map(|i| values[i]).collect();
        let inside_mean = inside.iter().sum::<f32>() / inside.len() as f32;
        let outside_mean = if outside.is_empty() { 0.0 } else { outside.iter().sum::<f32>() / outside.len() as f32 };
        ((inside_mean - outside_mean) * 1000.0).round() / 1000.0
    };

    history.record(generation, result.count);

    DaemonStats {
        active_cells: active,
        generation,
        daemon_count: result.count,
        avg_daemon_size: avg_size,
        noise_cells: result.noise_indices.len(),
        stability: history.stability(),
        exclusion,
    }
}
