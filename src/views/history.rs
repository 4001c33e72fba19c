//! History timeline with its two-level filter and the review dialog.

use std::cmp::Reverse;
use std::str::FromStr;

use super::ViewContext;
use crate::error::{ClientError, ClientResult};
use crate::events::{DashboardEvent, Subscription};
use crate::models::{ActionType, DecisionStatus, HistoryEntry, HistoryUpdate, IcdOutcome};
use crate::provenance;
use crate::status::{self, normalize_status_for_database, StatusBucket};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrimaryFilter {
    #[default]
    All,
    Action(ActionType),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecondaryFilter {
    #[default]
    All,
    Approved,
    Denied,
    Review,
    Found,
    NoCodes,
}

impl SecondaryFilter {
    /// The action type this filter belongs to; `None` for `All`.
    fn scope(&self) -> Option<ActionType> {
        match self {
            SecondaryFilter::All => None,
            SecondaryFilter::Approved | SecondaryFilter::Denied | SecondaryFilter::Review => {
                Some(ActionType::PrescriptionRefill)
            }
            SecondaryFilter::Found | SecondaryFilter::NoCodes => Some(ActionType::IcdPrediction),
        }
    }
}

impl FromStr for SecondaryFilter {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            "review" => Ok(Self::Review),
            "found" => Ok(Self::Found),
            "no-codes" => Ok(Self::NoCodes),
            other => Err(ClientError::Validation(format!(
                "Unknown status filter: {other}"
            ))),
        }
    }
}

/// Dashboard links that open the timeline pre-filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Pending,
    Refill,
    Icd,
    All,
}

impl Shortcut {
    pub fn filters(&self) -> (PrimaryFilter, SecondaryFilter) {
        match self {
            Shortcut::Pending => (
                PrimaryFilter::Action(ActionType::PrescriptionRefill),
                SecondaryFilter::Review,
            ),
            Shortcut::Refill => (
                PrimaryFilter::Action(ActionType::PrescriptionRefill),
                SecondaryFilter::All,
            ),
            Shortcut::Icd => (
                PrimaryFilter::Action(ActionType::IcdPrediction),
                SecondaryFilter::All,
            ),
            Shortcut::All => (PrimaryFilter::All, SecondaryFilter::All),
        }
    }
}

impl FromStr for Shortcut {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "refill" => Ok(Self::Refill),
            "icd" => Ok(Self::Icd),
            "all" => Ok(Self::All),
            other => Err(ClientError::Validation(format!("Unknown shortcut: {other}"))),
        }
    }
}

fn icd_outcome(entry: &HistoryEntry) -> Option<IcdOutcome> {
    let lower = entry.status.to_lowercase();
    [IcdOutcome::Found, IcdOutcome::NoCodesFound]
        .into_iter()
        .find(|o| o.as_str().to_lowercase() == lower)
}

fn matches_secondary(entry: &HistoryEntry, filter: SecondaryFilter) -> bool {
    match filter {
        SecondaryFilter::All => true,
        SecondaryFilter::Approved => StatusBucket::of(&entry.status) == StatusBucket::Approved,
        SecondaryFilter::Denied => StatusBucket::of(&entry.status) == StatusBucket::Denied,
        SecondaryFilter::Review => StatusBucket::of(&entry.status) == StatusBucket::Review,
        SecondaryFilter::Found => icd_outcome(entry) == Some(IcdOutcome::Found),
        SecondaryFilter::NoCodes => icd_outcome(entry) == Some(IcdOutcome::NoCodesFound),
    }
}

/// Newest first; entries without a readable timestamp go last.
pub fn sort_newest_first(entries: &mut [HistoryEntry]) {
    entries.sort_by_key(|e| Reverse(e.parsed_timestamp()));
}

/// Numbers shown on the filter chips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCounts {
    pub all: usize,
    pub refill: usize,
    pub icd: usize,
    pub approved: usize,
    pub denied: usize,
    pub review: usize,
    pub found: usize,
    pub no_codes: usize,
}

impl FilterCounts {
    pub fn tally(entries: &[HistoryEntry]) -> Self {
        let mut counts = Self {
            all: entries.len(),
            ..Self::default()
        };
        for entry in entries {
            if entry.is_refill() {
                counts.refill += 1;
                match StatusBucket::of(&entry.status) {
                    StatusBucket::Approved => counts.approved += 1,
                    StatusBucket::Denied => counts.denied += 1,
                    StatusBucket::Review => counts.review += 1,
                    StatusBucket::Other => {}
                }
            } else if entry.is_icd() {
                counts.icd += 1;
                match icd_outcome(entry) {
                    Some(IcdOutcome::Found) => counts.found += 1,
                    Some(IcdOutcome::NoCodesFound) => counts.no_codes += 1,
                    None => {}
                }
            }
        }
        counts
    }
}

pub struct HistoryTimeline {
    ctx: ViewContext,
    events: Subscription,
    patient_scope: Option<String>,
    entries: Vec<HistoryEntry>,
    primary: PrimaryFilter,
    secondary: SecondaryFilter,
}

impl HistoryTimeline {
    pub fn new(ctx: ViewContext) -> Self {
        let events = ctx.bus.subscribe();
        Self {
            ctx,
            events,
            patient_scope: None,
            entries: Vec::new(),
            primary: PrimaryFilter::All,
            secondary: SecondaryFilter::All,
        }
    }

    /// Timeline limited to one patient, as embedded in the profile.
    pub fn for_patient(ctx: ViewContext, patient_id: &str) -> Self {
        let mut timeline = Self::new(ctx);
        timeline.patient_scope = Some(patient_id.to_string());
        timeline
    }

    pub fn load(&mut self) -> ClientResult<()> {
        let scope = self.patient_scope.as_deref();
        let mut entries = self.ctx.backend().list_history(scope)?;
        if let Some(id) = scope {
            entries.retain(|e| e.patient_id.as_deref() == Some(id));
        }
        sort_newest_first(&mut entries);
        self.entries = entries;
        Ok(())
    }

    pub fn sync(&mut self) -> ClientResult<()> {
        if self.events.saw(DashboardEvent::HistoryUpdated) {
            self.load()?;
        }
        Ok(())
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn entry(&self, id: i64) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == Some(id))
    }

    pub fn filters(&self) -> (PrimaryFilter, SecondaryFilter) {
        (self.primary, self.secondary)
    }

    /// Selecting a primary filter resets the secondary one.
    pub fn set_primary(&mut self, primary: PrimaryFilter) {
        self.primary = primary;
        self.secondary = SecondaryFilter::All;
    }

    pub fn set_secondary(&mut self, secondary: SecondaryFilter) -> ClientResult<()> {
        match (secondary.scope(), self.primary) {
            (None, _) => {}
            (Some(scope), PrimaryFilter::Action(action)) if scope == action => {}
            _ => {
                return Err(ClientError::Validation(format!(
                    "{secondary:?} filter does not apply here"
                )))
            }
        }
        self.secondary = secondary;
        Ok(())
    }

    pub fn apply_shortcut(&mut self, shortcut: Shortcut) {
        let (primary, secondary) = shortcut.filters();
        self.primary = primary;
        self.secondary = secondary;
    }

    pub fn filtered(&self) -> Vec<&HistoryEntry> {
        self.entries
            .iter()
            .filter(|e| match self.primary {
                PrimaryFilter::All => true,
                PrimaryFilter::Action(action) => e.action() == Some(action),
            })
            .filter(|e| matches_secondary(e, self.secondary))
            .collect()
    }

    pub fn counts(&self) -> FilterCounts {
        FilterCounts::tally(&self.entries)
    }

    /// Opens the review dialog for an entry.
    pub fn review(&self, id: i64) -> ClientResult<ReviewDraft> {
        self.entry(id)
            .cloned()
            .map(ReviewDraft::new)
            .ok_or_else(|| ClientError::Validation(format!("Unknown history entry {id}")))
    }

    /// Saves a review, then reloads and notifies the other views.
    pub fn save_review(&mut self, draft: &ReviewDraft) -> ClientResult<()> {
        let reviewer = self.ctx.session.reviewer_name();
        let (id, update) = draft.to_update(&reviewer)?;
        self.ctx.backend().update_history(id, &update)?;
        tracing::info!(
            history_id = id,
            decision_by = %update.decision_by,
            "Saved decision review"
        );
        self.ctx.bus.publish(DashboardEvent::HistoryUpdated);
        // Our own publish is already reflected by the reload.
        self.events.drain();
        self.load()
    }
}

/// Editable copy of one history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDraft {
    entry: HistoryEntry,
    status: String,
    reasoning: String,
}

impl ReviewDraft {
    pub fn new(entry: HistoryEntry) -> Self {
        let status = normalize_status_for_database(&entry.status);
        let reasoning = entry.reasoning.clone().unwrap_or_default();
        Self {
            entry,
            status,
            reasoning,
        }
    }

    pub fn entry(&self) -> &HistoryEntry {
        &self.entry
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Only AI-originated refill decisions can be reviewed.
    pub fn is_editable(&self) -> bool {
        self.entry.is_refill() && provenance::is_ai_decision(self.entry.decision_by.as_deref())
    }

    pub fn set_status(&mut self, status: DecisionStatus) {
        self.status = status.as_str().to_string();
    }

    pub fn set_reasoning(&mut self, reasoning: &str) {
        self.reasoning = reasoning.to_string();
    }

    /// Restores the AI's original verdict and reasoning.
    pub fn revert_to_ai(&mut self) {
        self.status =
            normalize_status_for_database(self.entry.original_status.as_deref().unwrap_or(""));
        self.reasoning = self.entry.original_reasoning.clone().unwrap_or_default();
    }

    /// Drops unsaved edits.
    pub fn cancel(&mut self) {
        *self = Self::new(self.entry.clone());
    }

    /// Differs from what is stored now (not from the AI original).
    pub fn has_changes(&self) -> bool {
        self.status != normalize_status_for_database(&self.entry.status)
            || self.reasoning != self.entry.reasoning.as_deref().unwrap_or("")
    }

    pub fn can_save(&self) -> bool {
        self.is_editable() && self.has_changes()
    }

    /// Provenance the entry would get if saved now.
    pub fn decision_by_preview(&self, reviewer: &str) -> String {
        provenance::reviewed_decision_by(
            self.entry.original_status.as_deref().unwrap_or(""),
            self.entry.original_reasoning.as_deref(),
            &self.status,
            &self.reasoning,
            reviewer,
        )
    }

    /// Line shown under "Doctor Review" in the dialog.
    pub fn review_summary(&self) -> String {
        let original = self.entry.original_status.as_deref().unwrap_or("");
        let status_changed = normalize_status_for_database(original) != self.status;
        let reasoning_changed =
            self.entry.original_reasoning.as_deref().unwrap_or("") != self.reasoning;
        match (status_changed, reasoning_changed) {
            (true, true) => format!(
                "Status changed from {} to {} and reasoning modified",
                status::format_status_for_ui(original),
                status::format_status_for_ui(&self.status)
            ),
            (true, false) => format!(
                "Status changed from {} to {}",
                status::format_status_for_ui(original),
                status::format_status_for_ui(&self.status)
            ),
            (false, true) => "Reasoning modified".to_string(),
            (false, false) => "Decision reviewed".to_string(),
        }
    }

    /// PATCH body, or why the draft cannot be saved.
    pub fn to_update(&self, reviewer: &str) -> ClientResult<(i64, HistoryUpdate)> {
        if !self.is_editable() {
            return Err(ClientError::Validation(
                "Only AI refill decisions can be reviewed".into(),
            ));
        }
        if !self.has_changes() {
            return Err(ClientError::Validation("No changes to save".into()));
        }
        if status::canonical_status(&self.status).is_none() {
            return Err(ClientError::Validation(format!(
                "Status must be approve, deny or escalate, not \"{}\"",
                self.status
            )));
        }
        let id = self
            .entry
            .id
            .ok_or_else(|| ClientError::Validation("History entry has no id".into()))?;
        Ok((
            id,
            HistoryUpdate {
                status: self.status.clone(),
                reasoning: self.reasoning.clone(),
                decision_by: self.decision_by_preview(reviewer),
            },
        ))
    }
}
