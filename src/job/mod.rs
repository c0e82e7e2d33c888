//! Mapping job records and lifecycle states.
//!
//! A mapping job wraps one theme-adapter discovery run as a long-lived,
//! observable, cancellable unit of work. The record here is pure data;
//! transitions are owned exclusively by the runner in [`runner`], and
//! pollers only ever see cloned snapshots.

pub mod runner;

use crate::adapter::{FieldType, ThemeAdapter};
use crate::discovery::scorer::DEFAULT_CONFIDENCE_FLOOR;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states. Transitions are one-directional:
/// `pending → processing → running → {completed | failed | cancelled}`,
/// with cancellation reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, queued, not yet started.
    Pending,
    /// Pre-flight: fetching the target page, resolving the fingerprint.
    Processing,
    /// Per-field scoring in progress.
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Scheduling priority requested by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Identifies the page a job analyzes. Exactly one form is given per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageTarget {
    /// A product handle, resolved against the shop domain.
    ProductHandle(String),
    /// A fully qualified page URL.
    ProductUrl(String),
    /// An opaque product GID. Requires the caller to have resolved it;
    /// unresolvable here, so jobs for bare GIDs fail in pre-flight.
    ProductGid(String),
}

impl PageTarget {
    /// Stable key for the at-most-one-active-job-per-target rule.
    pub fn dedupe_key(&self) -> String {
        match self {
            PageTarget::ProductHandle(h) => format!("handle:{h}"),
            PageTarget::ProductUrl(u) => format!("url:{u}"),
            PageTarget::ProductGid(g) => format!("gid:{g}"),
        }
    }

    /// Resolve to a fetchable URL, if possible.
    pub fn resolve_url(&self, shop_id: &str) -> Option<String> {
        match self {
            PageTarget::ProductUrl(u) => Some(u.clone()),
            PageTarget::ProductHandle(h) => Some(format!("https://{shop_id}/products/{h}")),
            PageTarget::ProductGid(_) => None,
        }
    }
}

/// Options narrowing one mapping job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    /// Field types to attempt; empty means all supported types.
    #[serde(default)]
    pub field_types: Vec<FieldType>,
    /// Confidence floor for low-confidence annotation.
    #[serde(default = "default_floor")]
    pub confidence_floor: f32,
    /// Skip adapter-store reuse and re-run discovery.
    #[serde(default)]
    pub refresh: bool,
}

fn default_floor() -> f32 {
    DEFAULT_CONFIDENCE_FLOOR
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            field_types: Vec::new(),
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            refresh: false,
        }
    }
}

/// One mapping job. Mutated only by the job runner; everything a poller
/// receives is a snapshot clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingJob {
    pub id: String,
    pub shop_id: String,
    pub target: PageTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<String>,
    pub priority: JobPriority,
    pub options: JobOptions,
    pub status: JobStatus,
    /// Percentage in 0..=100. Non-decreasing; 100 is reserved for the
    /// completed state.
    pub progress: u8,
    /// Human-readable cause, present only when `status == failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The produced adapter, present only when `status == completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ThemeAdapter>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MappingJob {
    pub fn new(
        shop_id: impl Into<String>,
        target: PageTarget,
        theme_id: Option<String>,
        priority: JobPriority,
        options: JobOptions,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            shop_id: shop_id.into(),
            target,
            theme_id,
            priority,
            options,
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Key under which this job holds the active slot for its target.
    pub fn active_key(&self) -> String {
        format!("{}:{}", self.shop_id, self.target.dedupe_key())
    }

    /// Terminal states are sticky: once reached, no later write from a
    /// racing task can re-enter the live states.
    pub(crate) fn set_status(&mut self, status: JobStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Raise progress; never lowers it, and caps at 99 while the job is
    /// still live so 100 stays exclusive to completion.
    pub(crate) fn raise_progress(&mut self, pct: u8) {
        if self.status.is_terminal() {
            return;
        }
        let capped = pct.min(99);
        if capped > self.progress {
            self.progress = capped;
            self.updated_at = Utc::now();
        }
    }

    pub(crate) fn complete(&mut self, adapter: ThemeAdapter) {
        if self.status.is_terminal() {
            return;
        }
        self.result = Some(adapter);
        self.progress = 100;
        self.set_status(JobStatus::Completed);
    }

    pub(crate) fn fail(&mut self, cause: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.error = Some(cause.into());
        self.result = None;
        self.set_status(JobStatus::Failed);
    }

    pub(crate) fn cancel(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.result = None;
        self.set_status(JobStatus::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> MappingJob {
        MappingJob::new(
            "shop.example.com",
            PageTarget::ProductHandle("trail-runner".into()),
            None,
            JobPriority::Normal,
            JobOptions::default(),
        )
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&JobStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!(
            serde_json::to_string(&JobStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_progress_is_monotonic_and_caps_below_completion() {
        let mut j = job();
        j.raise_progress(40);
        j.raise_progress(20);
        assert_eq!(j.progress, 40);
        j.raise_progress(100);
        assert_eq!(j.progress, 99);
        j.complete(ThemeAdapter::new("tf-x"));
        assert_eq!(j.progress, 100);
        assert_eq!(j.status, JobStatus::Completed);
    }

    #[test]
    fn test_fail_clears_result() {
        let mut j = job();
        j.fail("target page unreachable");
        assert_eq!(j.status, JobStatus::Failed);
        assert!(j.result.is_none());
        assert!(j.error.as_deref().unwrap().contains("unreachable"));
    }

    #[test]
    fn test_target_resolution() {
        assert_eq!(
            PageTarget::ProductHandle("shoe".into()).resolve_url("shop.example.com"),
            Some("https://shop.example.com/products/shoe".into())
        );
        assert_eq!(
            PageTarget::ProductUrl("https://x.test/p/1".into()).resolve_url("ignored"),
            Some("https://x.test/p/1".into())
        );
        assert_eq!(
            PageTarget::ProductGid("gid://shop/Product/1".into()).resolve_url("s"),
            None
        );
    }

    #[test]
    fn test_active_key_distinguishes_targets_within_shop() {
        let a = MappingJob::new(
            "s.test",
            PageTarget::ProductHandle("a".into()),
            None,
            JobPriority::Normal,
            JobOptions::default(),
        );
        let b = MappingJob::new(
            "s.test",
            PageTarget::ProductHandle("b".into()),
            None,
            JobPriority::Normal,
            JobOptions::default(),
        );
        assert_ne!(a.active_key(), b.active_key());
    }
}
