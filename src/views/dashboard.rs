//! Dashboard summary: headline counts, refill analytics and recent activity.

use chrono::NaiveDate;
use serde::Serialize;

use super::history::{sort_newest_first, Shortcut};
use super::ViewContext;
use crate::error::ClientResult;
use crate::events::Subscription;
use crate::models::{HistoryEntry, Patient};
use crate::readiness::StatusCounts;
use crate::status::StatusBucket;

/// Entries shown under "Recent activity".
pub const RECENT_ACTIVITY_LIMIT: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_patients: usize,
    pub refill_decisions: usize,
    pub icd_predictions: usize,
    pub pending_reviews: usize,
    pub approved: usize,
    pub denied: usize,
    pub pending: usize,
    pub approved_pct: u32,
    pub denied_pct: u32,
    pub pending_pct: u32,
    /// 100 minus the pending percentage.
    pub finalized_pct: u32,
    /// Entries of any kind dated today in local time.
    pub today_decisions: usize,
    pub readiness: StatusCounts,
}

/// `count` as a rounded share of `total`, 0 when there is nothing to share.
fn percentage(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 * 100.0 / total as f64).round() as u32
}

impl DashboardStats {
    pub fn compute(patients: &[Patient], history: &[HistoryEntry], today: NaiveDate) -> Self {
        let mut stats = Self {
            total_patients: patients.len(),
            readiness: StatusCounts::tally(patients),
            ..Self::default()
        };

        for entry in history {
            if entry.local_date() == Some(today) {
                stats.today_decisions += 1;
            }
            if entry.is_icd() {
                stats.icd_predictions += 1;
            }
            if !entry.is_refill() {
                continue;
            }
            stats.refill_decisions += 1;
            match StatusBucket::of(&entry.status) {
                StatusBucket::Approved => stats.approved += 1,
                StatusBucket::Denied => stats.denied += 1,
                StatusBucket::Review => stats.pending += 1,
                StatusBucket::Other => {}
            }
        }

        stats.pending_reviews = stats.pending;
        stats.approved_pct = percentage(stats.approved, stats.refill_decisions);
        stats.denied_pct = percentage(stats.denied, stats.refill_decisions);
        stats.pending_pct = percentage(stats.pending, stats.refill_decisions);
        stats.finalized_pct = 100 - stats.pending_pct;
        stats
    }
}

pub struct Dashboard {
    ctx: ViewContext,
    events: Subscription,
    patients: Vec<Patient>,
    history: Vec<HistoryEntry>,
}

impl Dashboard {
    pub fn new(ctx: ViewContext) -> Self {
        let events = ctx.bus.subscribe();
        Self {
            ctx,
            events,
            patients: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Loads history and roster. History is required; a roster failure
    /// only zeroes the patient counts.
    pub fn load(&mut self) -> ClientResult<()> {
        let backend = self.ctx.backend();
        let mut history = backend.list_history(None)?;
        sort_newest_first(&mut history);
        self.history = history;
        self.patients = match backend.list_patients() {
            Ok(patients) => patients,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch patients for dashboard");
                Vec::new()
            }
        };
        Ok(())
    }

    /// Reloads on any patient or history change.
    pub fn sync(&mut self) -> ClientResult<()> {
        if !self.events.drain().is_empty() {
            self.load()?;
        }
        Ok(())
    }

    pub fn stats(&self, today: NaiveDate) -> DashboardStats {
        DashboardStats::compute(&self.patients, &self.history, today)
    }

    pub fn recent_activity(&self) -> &[HistoryEntry] {
        let end = self.history.len().min(RECENT_ACTIVITY_LIMIT);
        &self.history[..end]
    }

    /// Which timeline filter each headline card opens.
    pub fn card_shortcuts() -> [(&'static str, Shortcut); 4] {
        [
            ("Refill Decisions", Shortcut::Refill),
            ("ICD Predictions", Shortcut::Icd),
            ("Pending Reviews", Shortcut::Pending),
            ("Recent Activity", Shortcut::All),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Local, TimeZone};

    use super::*;
    use crate::backend::MockBackend;
    use crate::events::DashboardEvent;
    use crate::models::UserOut;
    use crate::readiness::tests::complete_patient;

    fn entry(action: &str, status: &str, ts: &str) -> HistoryEntry {
        HistoryEntry {
            action_type: action.into(),
            status: status.into(),
            timestamp: Some(ts.into()),
            ..HistoryEntry::default()
        }
    }

    fn refill(status: &str) -> HistoryEntry {
        entry("Prescription Refill", status, "2025-01-10T10:00:00Z")
    }

    #[test]
    fn percentages_round_and_finalized_complements_pending() {
        let history = vec![
            refill("approve"),
            refill("Approved"),
            refill("deny"),
            refill("escalate"),
            refill("pending"),
            refill("review required"),
            entry("ICD Prediction", "Found", "2025-01-10T10:00:00Z"),
        ];
        let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let stats = DashboardStats::compute(&[], &history, today);
        assert_eq!(stats.refill_decisions, 6);
        assert_eq!(stats.icd_predictions, 1);
        assert_eq!((stats.approved, stats.denied, stats.pending), (2, 1, 3));
        assert_eq!(stats.pending_reviews, 3);
        assert_eq!(stats.approved_pct, 33);
        assert_eq!(stats.denied_pct, 17);
        assert_eq!(stats.pending_pct, 50);
        assert_eq!(stats.finalized_pct, 50);
        assert_eq!(stats.today_decisions, 0);
    }

    #[test]
    fn empty_history_has_zero_percentages() {
        let stats = DashboardStats::compute(&[], &[], NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(stats.approved_pct, 0);
        assert_eq!(stats.pending_pct, 0);
        assert_eq!(stats.finalized_pct, 100);
    }

    #[test]
    fn today_uses_local_date() {
        let noon = Local.with_ymd_and_hms(2025, 4, 9, 12, 0, 0).unwrap();
        let history = vec![
            entry("ICD Prediction", "Found", &noon.to_rfc3339()),
            entry("Prescription Refill", "approve", &noon.to_rfc3339()),
            refill("deny"),
        ];
        let stats = DashboardStats::compute(&[], &history, noon.date_naive());
        assert_eq!(stats.today_decisions, 2);
    }

    #[test]
    fn view_loads_and_limits_recent_activity() {
        let ada = UserOut {
            id: 1,
            email: "a@b.c".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            is_active: true,
        };
        let history = (1..=6)
            .map(|d| entry("Prescription Refill", "approve", &format!("2025-01-0{d}T10:00:00Z")))
            .collect();
        let backend = Arc::new(
            MockBackend::new()
                .logged_in_as(ada)
                .with_patients(vec![complete_patient("P1"), complete_patient("P2")])
                .with_history(history),
        );
        let ctx = ViewContext::for_backend(backend.clone());
        let mut dashboard = Dashboard::new(ctx.clone());
        dashboard.load().unwrap();

        let stats = dashboard.stats(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
        assert_eq!(stats.total_patients, 2);
        assert_eq!(stats.readiness.ready, 2);
        assert_eq!(dashboard.recent_activity().len(), RECENT_ACTIVITY_LIMIT);
        assert_eq!(
            dashboard.recent_activity()[0].timestamp.as_deref(),
            Some("2025-01-06T10:00:00Z")
        );

        backend.fail_on("list_patients");
        ctx.bus.publish(DashboardEvent::PatientsUpdated);
        dashboard.sync().unwrap();
        assert_eq!(dashboard.stats(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()).total_patients, 0);

        backend.fail_on("list_history");
        assert!(dashboard.load().is_err());
    }
}
