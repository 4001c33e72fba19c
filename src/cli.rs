//! Command-line front end.
//!
//! Every invocation is one user action against the backend. The session
//! cookie lives only as long as the process, so commands that need a
//! session log in first with `--email`/`--password`.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::backend::HttpBackend;
use crate::config::{self, ClientConfig};
use crate::error::{ClientError, ClientResult};
use crate::models::{ActionType, DecisionStatus, HistoryEntry, Patient, SignupCredentials};
use crate::status::{canonical_status, format_status_for_ui};
use crate::views::analysis::{AnalysisKinds, AnalysisOutcome, SinglePatientAnalysis};
use crate::views::batch::{BatchProcessing, BatchReport};
use crate::views::dashboard::Dashboard;
use crate::views::history::{HistoryTimeline, PrimaryFilter, SecondaryFilter, Shortcut};
use crate::views::import;
use crate::views::patients::PatientDirectory;
use crate::views::ViewContext;

#[derive(Debug, Parser)]
#[command(name = "clinidash", version, about = "Clinical decision-support dashboard client")]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Print JSON instead of text where supported.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Backend base URL.
    #[arg(long, env = config::API_BASE_ENV, default_value = config::DEFAULT_API_BASE, global = true)]
    pub api_base: String,

    /// Request timeout in seconds.
    #[arg(long, env = config::TIMEOUT_ENV, default_value_t = config::DEFAULT_TIMEOUT_SECS, global = true)]
    pub timeout: u64,

    #[arg(long, env = "CLINIDASH_EMAIL", global = true)]
    pub email: Option<String>,

    #[arg(long, env = "CLINIDASH_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the logged-in user.
    Whoami,
    /// Create an account.
    Signup {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long = "new-email")]
        new_email: String,
        #[arg(long = "new-password")]
        new_password: String,
    },
    ChangePassword {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    /// Send a password reset link.
    ForgotPassword { email: String },
    ResetPassword {
        token: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
    /// List patients with their readiness status.
    Patients {
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one patient with missing fields and history.
    Profile { patient_id: String },
    /// Create a patient from a JSON file.
    CreatePatient { file: PathBuf },
    /// Replace a patient with the contents of a JSON file.
    UpdatePatient { file: PathBuf },
    DeletePatient { patient_id: String },
    /// Run refill and/or ICD analysis for one patient.
    Analyze {
        patient_id: String,
        #[command(flatten)]
        kinds: KindArgs,
        /// Refuse unless the patient is ready.
        #[arg(long)]
        quick: bool,
    },
    /// Process several patients through the combined endpoint.
    Batch {
        #[arg(required = true)]
        patient_ids: Vec<String>,
    },
    History(HistoryArgs),
    /// Review an AI refill decision.
    Review {
        id: i64,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        reasoning: Option<String>,
        /// Restore the AI's original verdict and reasoning.
        #[arg(long, conflicts_with_all = ["status", "reasoning"])]
        revert: bool,
    },
    Dashboard,
    /// Upload patients from a CSV file.
    Import { file: PathBuf },
    /// Write the CSV import template.
    Template {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write the roster as CSV.
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct KindArgs {
    #[arg(long, conflicts_with = "icd_only")]
    pub refill_only: bool,
    #[arg(long)]
    pub icd_only: bool,
}

impl KindArgs {
    fn kinds(&self) -> AnalysisKinds {
        AnalysisKinds {
            refill: !self.icd_only,
            icd: !self.refill_only,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ActionArg {
    All,
    Refill,
    Icd,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(long)]
    pub patient: Option<String>,
    #[arg(long, value_enum, default_value_t = ActionArg::All)]
    pub action: ActionArg,
    /// approved | denied | review | found | no-codes
    #[arg(long)]
    pub status: Option<String>,
    /// pending | refill | icd | all; overrides --action and --status.
    #[arg(long)]
    pub shortcut: Option<String>,
}

impl Command {
    /// Verb used in "Please log in to ..." messages.
    fn action(&self) -> &'static str {
        match self {
            Command::Whoami => "view your account",
            Command::Signup { .. } => "sign up",
            Command::ChangePassword { .. } => "change your password",
            Command::ForgotPassword { .. } | Command::ResetPassword { .. } => "reset your password",
            Command::Patients { .. } | Command::Profile { .. } => "view patients",
            Command::CreatePatient { .. }
            | Command::UpdatePatient { .. }
            | Command::DeletePatient { .. } => "manage patients",
            Command::Analyze { .. } => "analyze patients",
            Command::Batch { .. } => "process batch",
            Command::History(_) | Command::Review { .. } => "view history",
            Command::Dashboard => "view the dashboard",
            Command::Import { .. } | Command::Export { .. } => "import patients",
            Command::Template { .. } => "download the template",
        }
    }

    fn needs_login(&self) -> bool {
        !matches!(
            self,
            Command::Signup { .. }
                | Command::ForgotPassword { .. }
                | Command::ResetPassword { .. }
                | Command::Template { .. }
        )
    }
}

/// Builds the HTTP context, runs the command and prints the result.
pub fn run(cli: Cli) -> std::process::ExitCode {
    let config = ClientConfig::new(&cli.connection.api_base, cli.connection.timeout);
    let backend = match HttpBackend::new(config) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            eprintln!("{e}");
            return std::process::ExitCode::FAILURE;
        }
    };
    let ctx = ViewContext::for_backend(backend);
    let action = cli.command.action();
    match execute(&cli, &ctx) {
        Ok(output) => {
            print!("{output}");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("{}", e.user_message(action));
            std::process::ExitCode::FAILURE
        }
    }
}

fn login(cli: &Cli, ctx: &ViewContext) -> ClientResult<()> {
    match (&cli.connection.email, &cli.connection.password) {
        (Some(email), Some(password)) => ctx.session.login(email, password).map(|_| ()),
        _ => ctx
            .session
            .check_session()
            .map(|_| ())
            .ok_or(ClientError::NotLoggedIn),
    }
}

/// Runs one command and returns what to print.
pub fn execute(cli: &Cli, ctx: &ViewContext) -> ClientResult<String> {
    if cli.command.needs_login() {
        login(cli, ctx)?;
    }
    let today = Local::now().date_naive();

    match &cli.command {
        Command::Whoami => {
            let user = ctx.session.require_user()?;
            Ok(format!("{} <{}>\n", user.full_name(), user.email))
        }
        Command::Signup {
            first_name,
            last_name,
            new_email,
            new_password,
        } => {
            let user = ctx.session.signup(&SignupCredentials {
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                email: new_email.clone(),
                password: new_password.clone(),
            })?;
            Ok(format!("Account created for {}. Please log in.\n", user.email))
        }
        Command::ChangePassword { current, new } => {
            ctx.session.change_password(current, new)?;
            Ok("Password changed.\n".into())
        }
        Command::ForgotPassword { email } => {
            ctx.session.forgot_password(email)?;
            Ok(format!("We've sent a password reset link to: {email}\n"))
        }
        Command::ResetPassword {
            token,
            password,
            confirm,
        } => {
            ctx.session.reset_password(token, password, confirm)?;
            Ok("Password reset. You can now log in with your new password.\n".into())
        }
        Command::Patients { search } => {
            let mut view = PatientDirectory::new(ctx.clone());
            view.load()?;
            if let Some(query) = search {
                view.set_query(query);
            }
            let rows = view.rows();
            if cli.json {
                return to_json(&rows);
            }
            let counts = view.counts();
            let mut out = format!(
                "{} patients: {} ready, {} incomplete, {} up-to-date\n",
                counts.total(),
                counts.ready,
                counts.incomplete,
                counts.up_to_date
            );
            for row in rows {
                let _ = writeln!(
                    out,
                    "{:<10} {:<24} {:<28} {}",
                    row.patient_id,
                    row.name,
                    row.medication,
                    row.status.as_str()
                );
            }
            Ok(out)
        }
        Command::Profile { patient_id } => {
            let view = PatientDirectory::new(ctx.clone());
            let profile = view.profile(patient_id)?;
            let mut out = format!(
                "{} ({})  {}\n",
                profile.patient.display_name(),
                profile.patient.patient_id,
                profile.status.as_str()
            );
            if !profile.missing_fields.is_empty() {
                let _ = writeln!(out, "Missing: {}", profile.missing_fields.join(", "));
            }
            out.push_str(&render_history(&profile.history.iter().collect::<Vec<_>>()));
            Ok(out)
        }
        Command::CreatePatient { file } => {
            let mut view = PatientDirectory::new(ctx.clone());
            let created = view.create(&read_patient(file)?)?;
            Ok(format!("Created patient {}\n", created.patient_id))
        }
        Command::UpdatePatient { file } => {
            let patient = read_patient(file)?;
            PatientDirectory::new(ctx.clone()).update(&patient)?;
            Ok(format!("Updated patient {}\n", patient.patient_id))
        }
        Command::DeletePatient { patient_id } => {
            PatientDirectory::new(ctx.clone()).delete(patient_id)?;
            Ok(format!("Deleted patient {patient_id}\n"))
        }
        Command::Analyze {
            patient_id,
            kinds,
            quick,
        } => {
            let outcome = if *quick {
                let mut view = PatientDirectory::new(ctx.clone());
                view.load()?;
                view.quick_analysis(patient_id, kinds.kinds(), today)?
            } else {
                let mut view = SinglePatientAnalysis::new(ctx.clone());
                view.load()?;
                view.select(patient_id)?;
                view.set_kinds(kinds.kinds());
                view.analyze(today)?.clone()
            };
            Ok(render_outcome(&outcome))
        }
        Command::Batch { patient_ids } => {
            let mut view = BatchProcessing::new(ctx.clone());
            view.load()?;
            for id in patient_ids {
                view.toggle(id);
            }
            let report = view.process()?;
            Ok(render_batch(&view, &report))
        }
        Command::History(args) => {
            let mut view = match &args.patient {
                Some(id) => HistoryTimeline::for_patient(ctx.clone(), id),
                None => HistoryTimeline::new(ctx.clone()),
            };
            view.load()?;
            match &args.shortcut {
                Some(shortcut) => view.apply_shortcut(shortcut.parse::<Shortcut>()?),
                None => {
                    view.set_primary(match args.action {
                        ActionArg::All => PrimaryFilter::All,
                        ActionArg::Refill => PrimaryFilter::Action(ActionType::PrescriptionRefill),
                        ActionArg::Icd => PrimaryFilter::Action(ActionType::IcdPrediction),
                    });
                    if let Some(status) = &args.status {
                        view.set_secondary(status.parse::<SecondaryFilter>()?)?;
                    }
                }
            }
            let entries = view.filtered();
            if cli.json {
                return to_json(&entries);
            }
            let c = view.counts();
            let mut out = format!(
                "All {} | Refill {} (approved {}, denied {}, review {}) | ICD {} (found {}, no codes {})\n",
                c.all, c.refill, c.approved, c.denied, c.review, c.icd, c.found, c.no_codes
            );
            out.push_str(&render_history(&entries));
            Ok(out)
        }
        Command::Review {
            id,
            status,
            reasoning,
            revert,
        } => {
            let status = status.as_deref().map(parse_decision).transpose()?;
            let mut view = HistoryTimeline::new(ctx.clone());
            view.load()?;
            let mut draft = view.review(*id)?;
            if *revert {
                draft.revert_to_ai();
            }
            if let Some(status) = status {
                draft.set_status(status);
            }
            if let Some(reasoning) = reasoning {
                draft.set_reasoning(reasoning);
            }
            let summary = draft.review_summary();
            let decision_by = draft.decision_by_preview(&ctx.session.reviewer_name());
            view.save_review(&draft)?;
            Ok(format!("{summary}. Decision by: {decision_by}\n"))
        }
        Command::Dashboard => {
            let mut view = Dashboard::new(ctx.clone());
            view.load()?;
            let stats = view.stats(today);
            if cli.json {
                return to_json(&stats);
            }
            let mut out = String::new();
            let _ = writeln!(out, "Total patients     {}", stats.total_patients);
            let _ = writeln!(out, "Refill decisions   {}", stats.refill_decisions);
            let _ = writeln!(out, "ICD predictions    {}", stats.icd_predictions);
            let _ = writeln!(out, "Pending reviews    {}", stats.pending_reviews);
            let _ = writeln!(
                out,
                "Approved {} ({}%)  Denied {} ({}%)  Pending {} ({}%)",
                stats.approved,
                stats.approved_pct,
                stats.denied,
                stats.denied_pct,
                stats.pending,
                stats.pending_pct
            );
            let _ = writeln!(
                out,
                "Finalized {}%  Decisions today {}",
                stats.finalized_pct, stats.today_decisions
            );
            out.push_str("Recent activity:\n");
            out.push_str(&render_history(&view.recent_activity().iter().collect::<Vec<_>>()));
            Ok(out)
        }
        Command::Import { file } => {
            let count = import::import_file(ctx, file)?;
            Ok(format!("Imported {count} patients\n"))
        }
        Command::Template { out } => {
            let path = import::output_path(out.as_deref(), import::TEMPLATE_FILE_NAME);
            import::save_template(&path)?;
            Ok(format!("Template written to {}\n", path.display()))
        }
        Command::Export { out } => {
            let path = import::output_path(out.as_deref(), "patients-export.csv");
            let count = import::export_roster(ctx, &path)?;
            Ok(format!("Exported {count} patients to {}\n", path.display()))
        }
    }
}

/// Accepts the canonical tokens and their display forms (`Approved`,
/// `Denied`, `Pending`).
fn parse_decision(raw: &str) -> ClientResult<DecisionStatus> {
    canonical_status(raw).ok_or_else(|| {
        ClientError::Validation(format!(
            "Unknown status \"{raw}\": use approve, deny or escalate"
        ))
    })
}

fn read_patient(path: &std::path::Path) -> ClientResult<Patient> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| ClientError::Validation(format!("Invalid patient JSON: {e}")))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> ClientResult<String> {
    serde_json::to_string_pretty(value)
        .map(|s| s + "\n")
        .map_err(|e| ClientError::ResponseParsing(e.to_string()))
}

fn render_history(entries: &[&HistoryEntry]) -> String {
    let mut out = String::new();
    for e in entries {
        let when = e
            .parsed_timestamp()
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        let status = if e.is_refill() {
            format_status_for_ui(&e.status)
        } else {
            e.status.clone()
        };
        let _ = writeln!(
            out,
            "#{:<5} {} {:<8} {:<20} {:<15} {}",
            e.id.map(|i| i.to_string()).unwrap_or_default(),
            when,
            e.patient_id.as_deref().unwrap_or("-"),
            e.action_type,
            status,
            e.decision_by.as_deref().unwrap_or("AI")
        );
    }
    out
}

fn render_outcome(outcome: &AnalysisOutcome) -> String {
    let mut out = format!("Patient {}\n", outcome.patient_id);
    if let Some(refill) = &outcome.refill {
        let status = outcome.refill_status().unwrap_or_default();
        let _ = writeln!(
            out,
            "Refill: {} - {}",
            format_status_for_ui(&status),
            refill.reasoning().unwrap_or_default()
        );
    }
    if let Some(icd) = &outcome.icd {
        for p in icd.predictions.iter().flatten() {
            let _ = writeln!(out, "ICD: {} - {}", p.icd_code, p.justification);
        }
        if !icd.has_codes() {
            out.push_str("ICD: No Codes Found\n");
        }
    }
    out
}

fn render_batch(view: &BatchProcessing, report: &BatchReport) -> String {
    let mut out = format!("Processed {} patients\n", report.processed);
    for r in view.results() {
        let decision = r
            .result
            .refill_decision
            .as_ref()
            .map(|d| format_status_for_ui(&d.raw_decision()))
            .unwrap_or_else(|| "-".into());
        let codes = r
            .result
            .icd_prediction
            .as_ref()
            .and_then(|p| p.joined_codes())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "No Codes Found".into());
        let _ = writeln!(out, "{:<10} {:<10} {}", r.patient.patient_id, decision, codes);
    }
    if !report.failed_updates.is_empty() {
        let _ = writeln!(
            out,
            "Could not mark as processed: {}",
            report.failed_updates.join(", ")
        );
    }
    out
}
