// Copyright 2024, The Kaspa AIO Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Sliding-window sync-rate estimation and ETA formatting.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// History beyond this window is trimmed.
pub const HISTORY_WINDOW_SECS: i64 = 10 * 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncPoint {
    pub block_count: u64,
    pub header_count: u64,
    pub sampled_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SyncEstimator {
    samples: VecDeque<SyncPoint>,
}

impl SyncEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block_count: u64, header_count: u64) {
        self.push_at(block_count, header_count, Utc::now());
    }

    pub fn push_at(&mut self, block_count: u64, header_count: u64, sampled_at: DateTime<Utc>) {
        self.samples.push_back(SyncPoint {
            block_count,
            header_count,
            sampled_at,
        });
        let cutoff = sampled_at - Duration::seconds(HISTORY_WINDOW_SECS);
        while self.samples.front().map(|s| s.sampled_at < cutoff).unwrap_or(false) {
            self.samples.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&SyncPoint> {
        self.samples.back()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Blocks per second over the window. Needs at least two samples; a
    /// shrinking chain clamps to zero.
    pub fn rate(&self) -> Option<f64> {
        let (oldest, newest) = match (self.samples.front(), self.samples.back()) {
            (Some(a), Some(b)) if a.sampled_at < b.sampled_at => (a, b),
            _ => return None,
        };
        let elapsed = (newest.sampled_at - oldest.sampled_at).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            return None;
        }
        let gained = newest.block_count.saturating_sub(oldest.block_count) as f64;
        Some((gained / elapsed).max(0.0))
    }

    /// Seconds until the chain tip at the current rate; `None` means the
    /// estimate is not available yet ("Calculating…").
    pub fn eta_secs(&self) -> Option<u64> {
        let newest = self.samples.back()?;
        if newest.block_count >= newest.header_count {
            return None;
        }
        let rate = self.rate()?;
        if rate <= 0.0 {
            return None;
        }
        let behind = (newest.header_count - newest.block_count) as f64;
        Some((behind / rate).ceil() as u64)
    }

    /// Always in 0..=100.
    pub fn progress_pct(block_count: u64, header_count: u64) -> f64 {
        if header_count == 0 {
            return 0.0;
        }
        (block_count as f64 / header_count as f64 * 100.0).min(100.0)
    }
}

/// Largest significant units, two at most: "2d 4h", "41m 40s", "12s".
pub fn format_eta(secs: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if secs >= DAY {
        let days = secs / DAY;
        let hours = (secs % DAY) / HOUR;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    } else if secs >= HOUR {
        let hours = secs / HOUR;
        let minutes = (secs % HOUR) / MINUTE;
        if minutes > 0 {
            format!("{}h {}m", hours, minutes)
        } else {
            format!("{}h", hours)
        }
    } else if secs >= MINUTE {
        let minutes = secs / MINUTE;
        let seconds = secs % MINUTE;
        if seconds > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}m", minutes)
        }
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z").unwrap().with_timezone(&Utc) + Duration::seconds(secs)
    }

    #[test]
    fn rate_and_eta_from_a_block_jump() {
        // 12,000 blocks in 600 seconds, 50,000 headers behind.
        let mut estimator = SyncEstimator::new();
        estimator.push_at(100_000, 162_000, at(0));
        estimator.push_at(112_000, 162_000, at(600));

        let rate = estimator.rate().unwrap();
        assert!((rate - 20.0).abs() < 1e-9);
        assert_eq!(estimator.eta_secs(), Some(2_500));
    }

    #[test]
    fn one_sample_is_not_enough() {
        let mut estimator = SyncEstimator::new();
        estimator.push_at(1, 100, at(0));
        assert!(estimator.rate().is_none());
        assert!(estimator.eta_secs().is_none());
    }

    #[test]
    fn a_shrinking_chain_clamps_to_zero() {
        let mut estimator = SyncEstimator::new();
        estimator.push_at(1_000, 2_000, at(0));
        estimator.push_at(900, 2_000, at(60));
        assert_eq!(estimator.rate(), Some(0.0));
        assert!(estimator.eta_secs().is_none());
    }

    #[test]
    fn history_trims_to_the_window() {
        let mut estimator = SyncEstimator::new();
        estimator.push_at(0, 100, at(0));
        estimator.push_at(10, 100, at(300));
        estimator.push_at(20, 100, at(HISTORY_WINDOW_SECS + 301));
        assert_eq!(estimator.sample_count(), 2);
    }

    #[test]
    fn a_synced_node_has_no_eta() {
        let mut estimator = SyncEstimator::new();
        estimator.push_at(100, 100, at(0));
        estimator.push_at(120, 120, at(60));
        assert!(estimator.eta_secs().is_none());
    }

    #[test]
    fn progress_is_bounded() {
        assert_eq!(SyncEstimator::progress_pct(0, 0), 0.0);
        assert_eq!(SyncEstimator::progress_pct(50, 200), 25.0);
        assert_eq!(SyncEstimator::progress_pct(300, 200), 100.0);
    }

    #[test]
    fn eta_formatting_uses_the_largest_units() {
        assert_eq!(format_eta(12), "12s");
        assert_eq!(format_eta(2_500), "41m 40s");
        assert_eq!(format_eta(60), "1m");
        assert_eq!(format_eta(3_900), "1h 5m");
        assert_eq!(format_eta(2 * 86_400 + 4 * 3_600), "2d 4h");
        assert_eq!(format_eta(86_400), "1d");
    }
}
