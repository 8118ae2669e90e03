//! Status page view model
//!
//! The view is built from an owned snapshot, so the status lock is never held
//! while the page is rendered.

use askama::Template;
use std::time::Duration;

use crate::status::{CheckRecord, DurabilityStatus};

const TIMESTAMP_FORMAT: &str = "%b %d, %Y %H:%M:%S UTC";

/// One row of the check table
#[derive(Debug, Clone)]
pub struct CheckRow {
    pub sequence: u64,
    pub timestamp: String,
    pub success: bool,
    pub error_detail: Option<String>,
}

impl From<&CheckRecord> for CheckRow {
    fn from(record: &CheckRecord) -> Self {
        Self {
            sequence: record.sequence,
            timestamp: record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            success: record.success,
            error_detail: record.error_detail.clone().filter(|detail| !detail.is_empty()),
        }
    }
}

/// View model for the status page
#[derive(Template)]
#[template(path = "status.html")]
pub struct StatusPageView {
    pub percentage: String,
    pub file_name: String,
    pub file_size: u64,
    pub check_interval: String,
    pub rows: Vec<CheckRow>,
}

impl From<&DurabilityStatus> for StatusPageView {
    fn from(status: &DurabilityStatus) -> Self {
        Self {
            percentage: format_percentage(status.success_percentage),
            file_name: status.file_name.clone(),
            file_size: status.file_size,
            check_interval: format_interval(status.check_interval),
            rows: status.records.values().map(CheckRow::from).collect(),
        }
    }
}

/// Render the status page for a snapshot
pub fn render_status_page(status: &DurabilityStatus) -> askama::Result<String> {
    StatusPageView::from(status).render()
}

/// Percentage with at most two decimals and no trailing zeros
pub fn format_percentage(value: f64) -> String {
    let text = format!("{:.2}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Interval in hours, minutes and seconds, e.g. `5m0s` or `1h0m30s`
pub fn format_interval(interval: Duration) -> String {
    let total = interval.as_secs();
    let millis = interval.subsec_millis();
    if total == 0 {
        return if millis == 0 { "0s".to_string() } else { format!("{}ms", millis) };
    }

    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let seconds = if millis == 0 {
        format!("{}s", seconds)
    } else {
        let fraction = format!("{:03}", millis);
        format!("{}.{}s", seconds, fraction.trim_end_matches('0'))
    };

    if hours > 0 {
        format!("{}h{}m{}", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}", minutes, seconds)
    } else {
        seconds
    }
}
