//! Batch processing of selected patients through the combined
//! ICD + refill endpoint.

use std::thread;

use serde_json::Value;

use super::analysis::{icd_entry, refill_entry};
use super::{AnalysisState, ViewContext};
use crate::error::{ClientError, ClientResult};
use crate::events::{DashboardEvent, Subscription};
use crate::models::{CombinedRequest, CombinedResult, Patient, ReadinessStatus, UserOut};
use crate::readiness;

/// Result row shown after a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub patient: Patient,
    pub result: CombinedResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub history_recorded: usize,
    /// Patients whose `last_processed_request_date` update failed.
    pub failed_updates: Vec<String>,
}

pub struct BatchProcessing {
    ctx: ViewContext,
    events: Subscription,
    patients: Vec<Patient>,
    selected: Vec<String>,
    query: String,
    state: AnalysisState,
    results: Vec<BatchResult>,
}

impl BatchProcessing {
    pub fn new(ctx: ViewContext) -> Self {
        let events = ctx.bus.subscribe();
        Self {
            ctx,
            events,
            patients: Vec::new(),
            selected: Vec::new(),
            query: String::new(),
            state: AnalysisState::Idle,
            results: Vec::new(),
        }
    }

    /// Fetches the roster, ordered Ready > Incomplete > Up-to-date.
    pub fn load(&mut self) -> ClientResult<()> {
        let mut patients = self.ctx.backend().list_patients()?;
        readiness::sort_by_priority(&mut patients);
        self.patients = patients;
        Ok(())
    }

    pub fn sync(&mut self) -> ClientResult<()> {
        if self.events.saw(DashboardEvent::PatientsUpdated) {
            self.load()?;
        }
        Ok(())
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
    }

    /// Roster filtered by the search box.
    pub fn visible(&self) -> Vec<(&Patient, ReadinessStatus)> {
        self.patients
            .iter()
            .filter(|p| readiness::matches_query(p, &self.query))
            .map(|p| (p, readiness::patient_status(p)))
            .collect()
    }

    pub fn counts(&self) -> readiness::StatusCounts {
        readiness::StatusCounts::tally(&self.patients)
    }

    /// Adds or removes a patient from the selection. Returns whether the
    /// patient is selected afterwards.
    pub fn toggle(&mut self, patient_id: &str) -> bool {
        if let Some(pos) = self.selected.iter().position(|id| id == patient_id) {
            self.selected.remove(pos);
            false
        } else {
            self.selected.push(patient_id.to_string());
            true
        }
    }

    pub fn is_selected(&self, patient_id: &str) -> bool {
        self.selected.iter().any(|id| id == patient_id)
    }

    pub fn selection(&self) -> &[String] {
        &self.selected
    }

    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    pub fn results(&self) -> &[BatchResult] {
        &self.results
    }

    /// Processes the selection. On error the selection is kept so the user
    /// can try again.
    pub fn process(&mut self) -> ClientResult<BatchReport> {
        let selected: Vec<Patient> = self
            .selected
            .iter()
            .filter_map(|id| self.patients.iter().find(|p| &p.patient_id == id))
            .cloned()
            .collect();
        if selected.is_empty() {
            return Err(ClientError::Validation(
                "Select at least one patient to process".into(),
            ));
        }

        self.state = AnalysisState::Analyzing;
        self.results.clear();
        match process_patients(&self.ctx, &selected) {
            Ok((results, report)) => {
                self.results = results;
                self.state = AnalysisState::ResultsShown;
                if let Err(e) = self.load() {
                    tracing::warn!(error = %e, "Failed to refresh patient list");
                }
                self.selected.clear();
                Ok(report)
            }
            Err(e) => {
                self.state = AnalysisState::Error(e.user_message("process batch"));
                Err(e)
            }
        }
    }
}

/// Sends `patients` through `combined_icd_refill`, records two audit entries
/// per patient, and marks every patient processed for its current request.
///
/// Only the combined call can fail the run. History and patient updates are
/// best effort.
pub fn process_patients(
    ctx: &ViewContext,
    patients: &[Patient],
) -> ClientResult<(Vec<BatchResult>, BatchReport)> {
    let backend = ctx.backend();
    let response = backend.combined_icd_refill(&CombinedRequest::for_patients(patients))?;

    if response.results.len() != patients.len() {
        tracing::warn!(
            sent = patients.len(),
            received = response.results.len(),
            "Batch result count differs from patients sent"
        );
    }

    let results: Vec<BatchResult> = patients
        .iter()
        .zip(response.results)
        .map(|(patient, result)| BatchResult {
            patient: patient.clone(),
            result,
        })
        .collect();

    let mut report = BatchReport {
        processed: results.len(),
        ..BatchReport::default()
    };

    // Without a known user there is nobody to attribute history to.
    let Some(user) = ctx.session.current_user() else {
        tracing::warn!("No session user; skipping history and patient updates");
        return Ok((results, report));
    };

    let entries: Vec<_> = results
        .iter()
        .flat_map(|r| {
            let medication = r.patient.medication.clone().unwrap_or_default();
            let refill = r.result.refill_decision.clone().unwrap_or_default();
            let icd = r.result.icd_prediction.clone().unwrap_or_default();
            [
                refill_entry(
                    &user,
                    &r.patient.patient_id,
                    &medication,
                    &refill.raw_decision(),
                    refill.reason.clone(),
                ),
                icd_entry(&user, &r.patient.patient_id, &medication, &icd),
            ]
        })
        .collect();

    if !entries.is_empty() {
        match backend.record_history(&entries) {
            Ok(()) => {
                report.history_recorded = entries.len();
                ctx.bus.publish(DashboardEvent::HistoryUpdated);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to record batch history"),
        }
    }

    report.failed_updates = mark_processed(ctx, patients, &user);
    ctx.bus.publish(DashboardEvent::PatientsUpdated);

    tracing::info!(
        processed = report.processed,
        failed_updates = report.failed_updates.len(),
        "Batch processing complete"
    );
    Ok((results, report))
}

/// Issues one PUT per patient in parallel and returns the IDs that failed.
fn mark_processed(ctx: &ViewContext, patients: &[Patient], user: &UserOut) -> Vec<String> {
    let backend = ctx.backend();
    thread::scope(|scope| {
        let handles: Vec<_> = patients
            .iter()
            .map(|patient| {
                scope.spawn(move || {
                    let mut updated = patient.mark_processed();
                    updated
                        .extra
                        .insert("user_id".to_string(), Value::from(user.id));
                    match backend.update_patient(&updated) {
                        Ok(()) => None,
                        Err(e) => {
                            tracing::warn!(
                                patient_id = %patient.patient_id,
                                error = %e,
                                "Failed to update patient"
                            );
                            Some(patient.patient_id.clone())
                        }
                    }
                })
            })
            .collect();

        handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap_or(None))
            .collect()
    })
}
