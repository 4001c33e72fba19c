//! CSV import, export and template for the patient roster.
//!
//! The file schema is fixed: exactly the columns in [`CSV_COLUMNS`], with
//! the patient's name under `patient_name`.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::ViewContext;
use crate::config;
use crate::error::ClientError;
use crate::models::{lenient, Patient};

pub const CSV_COLUMNS: [&str; 15] = [
    "patient_id",
    "medication",
    "patient_name",
    "refill_request_date",
    "last_filled",
    "last_visit",
    "labs",
    "diagnosis",
    "refill_notes",
    "icd_notes",
    "age",
    "gender",
    "allergies",
    "comorbidities",
    "refill_history",
];

pub const TEMPLATE_FILE_NAME: &str = "patient-template.csv";

const TEMPLATE_ROWS: [[&str; 15]; 2] = [
    [
        "P001",
        "Levothyroxine 50mcg",
        "Jane Doe",
        "2025-05-25",
        "2025-04-22",
        "2024-02-24",
        "TSH = 2.4, T4 normal",
        "Hypothyroidism",
        "Routine refill, no recent adverse events, within visit window.",
        "Patient presents with vomiting. Symptoms started 2 days ago. Vitals stable. No prior history of this condition. Assessment: likely vomiting, unspecified.",
        "48",
        "Female",
        "Penicillin",
        "Obesity, Hyperlipidemia",
        "First time refill",
    ],
    [
        "P002",
        "Omeprazole 20mg",
        "John Smith",
        "2025-06-01",
        "2025-04-29",
        "2025-03-15",
        "No active GI symptoms",
        "GERD",
        "Labs outdated, unclear if condition is controlled.",
        "Patient presents with joint pain. Symptoms started 2 days ago. Vitals stable. No prior history of this condition. Assessment: likely pain in unspecified joint.",
        "45",
        "Male",
        "NSAIDs",
        "Obesity, Hyperlipidemia",
        "Missed last 2 refills",
    ],
];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Please upload a valid CSV file.")]
    NotCsv,
    #[error("Missing columns: {}. Found: {}", .missing.join(", "), found_list(.found))]
    MissingColumns {
        missing: Vec<String>,
        found: Vec<String>,
    },
    #[error("CSV Parse Error: {0}")]
    Parse(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Upload Error: {0}")]
    Upload(ClientError),
}

fn found_list(found: &[String]) -> String {
    if found.is_empty() {
        "none".to_string()
    } else {
        found.join(", ")
    }
}

/// Parses roster rows. Extra columns are ignored, empty lines skipped.
pub fn parse_patients<R: Read>(reader: R) -> Result<Vec<Patient>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    let missing: Vec<String> = CSV_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns {
            missing,
            found: headers.into_iter().filter(|h| !h.is_empty()).collect(),
        });
    }

    let index = |name: &str| headers.iter().position(|h| h == name);
    let columns: Vec<Option<usize>> = CSV_COLUMNS.iter().map(|c| index(c)).collect();

    let mut patients = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let cell = |col: usize| -> Option<String> {
            columns[col]
                .and_then(|i| record.get(i))
                .map(str::to_string)
        };
        patients.push(Patient {
            patient_id: cell(0).unwrap_or_default(),
            medication: cell(1),
            name: cell(2),
            refill_request_date: cell(3),
            last_filled: cell(4),
            last_visit: cell(5),
            labs: cell(6),
            diagnosis: cell(7),
            refill_notes: cell(8),
            icd_notes: cell(9),
            age: cell(10).and_then(|a| parse_age(&a)),
            gender: cell(11),
            allergies: cell(12),
            comorbidities: cell(13),
            refill_history: cell(14),
            ..Patient::default()
        });
    }
    Ok(patients)
}

/// Integer when the cell starts with one ("48 years" reads as 48), the
/// trimmed text otherwise. Blank is `None`.
fn parse_age(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match lenient::leading_integer(trimmed) {
        Some(age) => Some(Value::from(age)),
        None => {
            tracing::debug!(raw, "Keeping non-numeric age as text");
            Some(Value::String(trimmed.to_string()))
        }
    }
}

/// Reads `path`, uploads every row to `/patients/batch` and notifies views.
pub fn import_file(ctx: &ViewContext, path: &Path) -> Result<usize, ImportError> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(ImportError::NotCsv);
    }
    let patients = parse_patients(File::open(path)?)?;
    ctx.backend()
        .upload_patients(&patients)
        .map_err(ImportError::Upload)?;
    ctx.bus.publish_all();
    tracing::info!(count = patients.len(), path = %path.display(), "Imported patients");
    Ok(patients.len())
}

/// Writes the header and two sample rows.
pub fn write_template<W: Write>(writer: W) -> Result<(), ImportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_COLUMNS)?;
    for row in TEMPLATE_ROWS {
        csv_writer.write_record(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes `patients` in the import schema so the file can be re-imported.
pub fn export_patients<W: Write>(patients: &[Patient], writer: W) -> Result<(), ImportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_COLUMNS)?;
    for patient in patients {
        let row: Vec<String> = CSV_COLUMNS
            .iter()
            .map(|col| {
                let field = if *col == "patient_name" { "name" } else { col };
                patient.field_text(field).unwrap_or_default()
            })
            .collect();
        csv_writer.write_record(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// `path` if given, else `name` inside the default export directory.
pub fn output_path(path: Option<&Path>, name: &str) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| config::export_dir().join(name))
}

pub fn save_template(path: &Path) -> Result<(), ImportError> {
    write_template(File::create(path)?)?;
    tracing::info!(path = %path.display(), "Wrote import template");
    Ok(())
}

/// Fetches the roster and writes it to `path`.
pub fn export_roster(ctx: &ViewContext, path: &Path) -> Result<usize, ImportError> {
    let patients = ctx.backend().list_patients().map_err(ImportError::Upload)?;
    export_patients(&patients, File::create(path)?)?;
    tracing::info!(count = patients.len(), path = %path.display(), "Exported patients");
    Ok(patients.len())
}

impl From<ImportError> for ClientError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Upload(inner) => inner,
            ImportError::Io(io) => ClientError::Io(io),
            ImportError::Parse(e) => ClientError::Csv(e.to_string()),
            other => ClientError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::MockBackend;
    use crate::events::DashboardEvent;
    use crate::models::UserOut;
    use crate::readiness::{self, tests::complete_patient};

    fn ctx() -> (Arc<MockBackend>, ViewContext) {
        let user = UserOut {
            id: 1,
            email: "a@b.c".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            is_active: true,
        };
        let backend = Arc::new(MockBackend::new().logged_in_as(user));
        (backend.clone(), ViewContext::for_backend(backend))
    }

    fn template() -> String {
        let mut buf = Vec::new();
        write_template(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn template_parses_into_two_ready_patients() {
        let patients = parse_patients(template().as_bytes()).unwrap();
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0].name.as_deref(), Some("Jane Doe"));
        assert_eq!(patients[0].labs.as_deref(), Some("TSH = 2.4, T4 normal"));
        assert_eq!(patients[1].age_years(), Some(45));
        assert!(patients.iter().all(readiness::is_patient_ready));
    }

    #[test]
    fn missing_columns_are_named() {
        let csv = "patient_id,medication,age\nP1,X,40\n";
        let err = parse_patients(csv.as_bytes()).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Missing columns: patient_name, refill_request_date"));
        assert!(message.ends_with("Found: patient_id, medication, age"));
    }

    #[test]
    fn age_is_parsed_leniently() {
        assert_eq!(parse_age("48"), Some(Value::from(48)));
        assert_eq!(parse_age(" 61 years"), Some(Value::from(61)));
        assert_eq!(parse_age(""), None);
        assert_eq!(parse_age("unknown"), Some(Value::from("unknown")));
    }

    #[test]
    fn import_uploads_and_notifies() {
        let (backend, ctx) = ctx();
        let events = ctx.bus.subscribe();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        save_template(&path).unwrap();

        assert_eq!(import_file(&ctx, &path).unwrap(), 2);
        assert_eq!(backend.patients().len(), 2);
        let seen = events.drain();
        assert!(seen.contains(&DashboardEvent::PatientsUpdated));
        assert!(seen.contains(&DashboardEvent::HistoryUpdated));
    }

    #[test]
    fn non_csv_file_is_rejected() {
        let (backend, ctx) = ctx();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.txt");
        std::fs::write(&path, template()).unwrap();
        let err = import_file(&ctx, &path).unwrap_err();
        assert_eq!(err.to_string(), "Please upload a valid CSV file.");
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn upload_failure_is_reported() {
        let (backend, ctx) = ctx();
        backend.fail_on("upload_patients");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        save_template(&path).unwrap();
        let err = import_file(&ctx, &path).unwrap_err();
        assert_eq!(err.to_string(), "Upload Error: Backend returned 500: upload_patients failed");
    }

    #[test]
    fn export_round_trips_through_import() {
        let (_backend, ctx) = ctx();
        ctx.backend()
            .upload_patients(&[complete_patient("P9")])
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        assert_eq!(export_roster(&ctx, &path).unwrap(), 1);

        let back = parse_patients(File::open(&path).unwrap()).unwrap();
        assert_eq!(back[0].patient_id, "P9");
        assert_eq!(back[0].name.as_deref(), Some("Jane Doe"));
        assert_eq!(back[0].age_years(), Some(48));
    }

    #[test]
    fn output_path_defaults_to_export_dir() {
        let explicit = output_path(Some(Path::new("/tmp/x.csv")), TEMPLATE_FILE_NAME);
        assert_eq!(explicit, PathBuf::from("/tmp/x.csv"));
        let default = output_path(None, TEMPLATE_FILE_NAME);
        assert!(default.ends_with(TEMPLATE_FILE_NAME));
    }
}
