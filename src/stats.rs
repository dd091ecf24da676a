use serde::{Deserialize, Serialize};

use crate::config::StatsBaseline;

/// Point-in-time view of the channel statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_view_time_recorded: f64,
    pub total_view_time_recorded_this_instance: f64,
    pub current_viewer_count: usize,
    pub max_viewer_count: usize,
    pub max_viewer_count_this_instance: usize,
    pub num_viewers_known: usize,
}

/// Viewer counts and view-time totals for the channel.
///
/// The current viewer count is kept equal to the number of joined non-bot
/// users by the caller, which must pair every qualifying join with exactly
/// one [`viewer_count_up`](Self::viewer_count_up) and every part with one
/// [`viewer_count_down`](Self::viewer_count_down).
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    total_view_time: f64,
    total_view_time_this_instance: f64,
    current_viewer_count: usize,
    max_viewer_count: usize,
    max_viewer_count_this_instance: usize,
    timer_start: Option<f64>,
}

impl StatsAccumulator {
    pub fn from_baseline(baseline: &StatsBaseline) -> Self {
        Self {
            total_view_time: baseline.total_view_time,
            max_viewer_count: baseline.max_viewer_count,
            ..Self::default()
        }
    }

    /// What survives a restart. Time not yet accrued is not included.
    pub fn baseline(&self) -> StatsBaseline {
        StatsBaseline {
            total_view_time: self.total_view_time,
            max_viewer_count: self.max_viewer_count,
        }
    }

    pub fn current_viewer_count(&self) -> usize {
        self.current_viewer_count
    }

    pub fn viewer_count_up(&mut self) {
        self.current_viewer_count += 1;
        self.max_viewer_count = self.max_viewer_count.max(self.current_viewer_count);
        self.max_viewer_count_this_instance = self.max_viewer_count_this_instance.max(self.current_viewer_count);
    }

    pub fn viewer_count_down(&mut self) {
        if self.current_viewer_count == 0 {
            log::warn!("Viewer count would go below zero");
            return;
        }
        self.current_viewer_count -= 1;
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer_start.is_some()
    }

    pub fn start_timer(&mut self, now: f64) {
        if self.timer_start.is_none() {
            self.timer_start = Some(now);
        }
    }

    pub fn stop_timer(&mut self) {
        self.timer_start = None;
    }

    /// Time a viewer whose accrual mark is `mark` has watched by `now` but
    /// which has not been recorded yet.
    pub fn pending(&self, mark: f64, now: f64) -> f64 {
        match self.timer_start {
            Some(start) => (now - mark.max(start)).max(0.0),
            None => 0.0,
        }
    }

    /// Records pending view time for one viewer and returns the amount added.
    pub fn accrue(&mut self, mark: f64, now: f64) -> f64 {
        let elapsed = self.pending(mark, now);
        self.total_view_time += elapsed;
        self.total_view_time_this_instance += elapsed;
        elapsed
    }

    /// `pending` is the sum of time not yet accrued across joined viewers.
    pub fn snapshot(&self, pending: f64, num_viewers_known: usize) -> Stats {
        Stats {
            total_view_time_recorded: self.total_view_time + pending,
            total_view_time_recorded_this_instance: self.total_view_time_this_instance + pending,
            current_viewer_count: self.current_viewer_count,
            max_viewer_count: self.max_viewer_count,
            max_viewer_count_this_instance: self.max_viewer_count_this_instance,
            num_viewers_known,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maxima_follow_the_current_count() {
        let mut stats = StatsAccumulator::from_baseline(&StatsBaseline {
            total_view_time: 0.0,
            max_viewer_count: 2,
        });
        stats.viewer_count_up();
        assert_eq!(stats.snapshot(0.0, 0).max_viewer_count, 2);
        assert_eq!(stats.snapshot(0.0, 0).max_viewer_count_this_instance, 1);
        stats.viewer_count_up();
        stats.viewer_count_up();
        stats.viewer_count_down();
        let snapshot = stats.snapshot(0.0, 5);
        assert_eq!(snapshot.current_viewer_count, 2);
        assert_eq!(snapshot.max_viewer_count, 3);
        assert_eq!(snapshot.max_viewer_count_this_instance, 3);
        assert_eq!(snapshot.num_viewers_known, 5);
    }

    #[test]
    fn viewer_count_never_goes_negative() {
        let mut stats = StatsAccumulator::default();
        stats.viewer_count_down();
        assert_eq!(stats.current_viewer_count(), 0);
    }

    #[test]
    fn time_only_accrues_while_the_timer_runs() {
        let mut stats = StatsAccumulator::default();
        assert_eq!(stats.accrue(100.0, 200.0), 0.0);
        stats.start_timer(150.0);
        assert_eq!(stats.pending(100.0, 200.0), 50.0);
        assert_eq!(stats.pending(180.0, 200.0), 20.0);
        assert_eq!(stats.accrue(100.0, 200.0), 50.0);
        stats.stop_timer();
        assert_eq!(stats.pending(200.0, 500.0), 0.0);
        let snapshot = stats.snapshot(0.0, 0);
        assert_eq!(snapshot.total_view_time_recorded, 50.0);
        assert_eq!(snapshot.total_view_time_recorded_this_instance, 50.0);
    }

    #[test]
    fn baseline_carries_lifetime_totals_only() {
        let mut stats = StatsAccumulator::from_baseline(&StatsBaseline {
            total_view_time: 1000.0,
            max_viewer_count: 4,
        });
        stats.start_timer(0.0);
        stats.accrue(0.0, 10.0);
        let snapshot = stats.snapshot(5.0, 0);
        assert_eq!(snapshot.total_view_time_recorded, 1015.0);
        assert_eq!(snapshot.total_view_time_recorded_this_instance, 15.0);
        assert_eq!(
            stats.baseline(),
            StatsBaseline {
                total_view_time: 1010.0,
                max_viewer_count: 4
            }
        );
    }
}
