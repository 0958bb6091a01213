//! Prometheus metrics for the lifecycle engine.
//!
//! This module provides metrics for:
//! - Submissions (by branch taken)
//! - Approval decisions (by outcome)
//! - Status transitions and terminal outcomes
//! - Resolution time distribution

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Submission Metrics
// =============================================================================

/// Ticket submissions total by branch.
pub static SUBMISSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deskflow_submissions_total", "Total ticket submissions"),
        &["branch"], // "approval_chain", "direct"
    )
    .unwrap()
});

/// Tickets auto-assigned at submission.
pub static AUTO_ASSIGNMENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "deskflow_auto_assignments_total",
        "Total tickets auto-assigned to the least-loaded technician",
    )
    .unwrap()
});

// =============================================================================
// Approval Metrics
// =============================================================================

/// Approval decisions total by outcome.
pub static DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deskflow_decisions_total", "Total approval decisions"),
        &["outcome"], // "approved", "rejected"
    )
    .unwrap()
});

/// Approval chains completed (every level approved).
pub static CHAINS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "deskflow_approval_chains_completed_total",
        "Total approval chains that reached full approval",
    )
    .unwrap()
});

// =============================================================================
// Lifecycle Metrics
// =============================================================================

/// Status transitions total by target status.
pub static TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deskflow_transitions_total", "Total status transitions"),
        &["to_status"],
    )
    .unwrap()
});

/// State conflicts detected (stale concurrent writes rejected).
pub static STATE_CONFLICTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "deskflow_state_conflicts_total",
        "Total transitions rejected because the ticket state had moved",
    )
    .unwrap()
});

/// Tickets reopened from a terminal status.
pub static REOPENS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "deskflow_reopens_total",
        "Total tickets reopened by an administrator",
    )
    .unwrap()
});

/// Resolution time in hours, recorded when a ticket is solved.
pub static RESOLUTION_HOURS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "deskflow_resolution_hours",
            "Hours between ticket creation and resolution",
        )
        .buckets(vec![0.5, 1.0, 4.0, 8.0, 24.0, 48.0, 96.0, 168.0, 336.0]),
        &["priority"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Submissions
        Box::new(SUBMISSIONS_TOTAL.clone()),
        Box::new(AUTO_ASSIGNMENTS.clone()),
        // Approvals
        Box::new(DECISIONS_TOTAL.clone()),
        Box::new(CHAINS_COMPLETED.clone()),
        // Lifecycle
        Box::new(TRANSITIONS_TOTAL.clone()),
        Box::new(STATE_CONFLICTS.clone()),
        Box::new(REOPENS_TOTAL.clone()),
        Box::new(RESOLUTION_HOURS.clone()),
    ]
}
