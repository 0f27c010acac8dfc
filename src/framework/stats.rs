//! Progress statistics
//!
//! A [`Stats`] snapshot combines the HTTP client's counters with crawl and
//! audit progress.

use crate::framework::FrameworkStatus;
use crate::http::HttpStats;
use serde::Serialize;
use std::time::Duration;

/// Point-in-time view of a framework run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub status: FrameworkStatus,
    pub requests: u64,
    pub responses: u64,
    pub time_out_count: u64,
    /// Elapsed run time as `HH:MM:SS`
    pub time: String,
    /// Responses per second
    pub avg: f64,
    pub sitemap_size: usize,
    /// Pages audited so far
    pub auditmap_size: usize,
    /// Percentage of queued work done
    pub progress: f64,
    pub curr_res_time: f64,
    pub curr_res_cnt: u64,
    pub curr_avg: f64,
    pub average_res_time: f64,
    pub max_concurrency: usize,
    /// URL of the page most recently audited
    pub current_page: Option<String>,
    /// Estimated time remaining as `HH:MM:SS`
    pub eta: String,
}

/// Inputs for [`Stats::compute`] that do not come from the HTTP client
#[derive(Debug, Clone, Default)]
pub(crate) struct Progress {
    pub status: FrameworkStatus,
    pub elapsed: Duration,
    pub sitemap_size: usize,
    pub audited: usize,
    /// Queued items finished, including those skipped or failed
    pub processed: usize,
    /// Pages and URLs ever queued for auditing
    pub queued_total: usize,
    pub current_page: Option<String>,
}

impl Stats {
    pub(crate) fn compute(http: HttpStats, progress: Progress) -> Self {
        let secs = progress.elapsed.as_secs_f64();

        let pct = if progress.status.is_terminal() {
            100.0
        } else if progress.queued_total == 0 {
            0.0
        } else {
            (progress.processed as f64 / progress.queued_total as f64 * 100.0).min(100.0)
        };

        let eta = if pct > 0.0 && pct < 100.0 {
            Duration::from_secs_f64(secs / pct * (100.0 - pct))
        } else {
            Duration::ZERO
        };

        Self {
            status: progress.status,
            requests: http.requests,
            responses: http.responses,
            time_out_count: http.time_out_count,
            time: format_duration(progress.elapsed),
            avg: if secs > 0.0 {
                http.responses as f64 / secs
            } else {
                0.0
            },
            sitemap_size: progress.sitemap_size,
            auditmap_size: progress.audited,
            progress: (pct * 100.0).round() / 100.0,
            curr_res_time: http.curr_res_time,
            curr_res_cnt: http.curr_res_cnt,
            curr_avg: http.curr_avg(),
            average_res_time: http.average_res_time,
            max_concurrency: http.max_concurrency,
            current_page: progress.current_page,
            eta: format_duration(eta),
        }
    }
}

fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
