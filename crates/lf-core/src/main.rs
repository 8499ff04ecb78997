//! Link Fault Tracker Core - escalation lifecycle CLI
//!
//! The main entry point for lf-core, handling:
//! - Escalation creation, listing, close and delete
//! - Report stage transitions with photo uploads
//! - RCA submission and MTTR breach scans
//! - Notifications, analytics and site reference data

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use lf_common::{
    format_error_human, Actor, CauseOfFailure, Error, Escalation, EscalationId, EscalationStatus,
    LinkType, NotificationEntry, NotificationId, NotificationKind, OutputFormat, Profile, Provider,
    RcaRecord, Report, ReportId, Role, Site, StructuredError, UserId, SCHEMA_VERSION,
};
use lf_config::{load_config, ConfigSnapshot, LoadedConfig};
use lf_core::analytics::AnalyticsSummary;
use lf_core::blob::{FsObjectStore, ImageUpload};
use lf_core::engine::{
    BreachReport, NewEscalation, NewReport, ProgressUpdate, RcaFormMode, RcaSubmission, Resolution,
};
use lf_core::events::JsonlWriter;
use lf_core::exit_codes::ExitCode;
use lf_core::logging::{event_names, init_logging, LogConfig, LogContext, Stage};
use lf_core::schema::{available_schemas, format_schema, generate_all_schemas, generate_schema, SchemaFormat};
use lf_core::store::{media_root, resolve_data_dir, EscalationFilter, FileStore};
use lf_core::Engine;
use serde::Serialize;
use serde_json::Value;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Link Fault Tracker Core - escalation, report and RCA lifecycle
#[derive(Parser)]
#[command(name = "lf-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Acting user id
    #[arg(long, global = true, env = "LF_ACTOR")]
    actor: Option<String>,

    /// Role of the acting user; looked up in the profiles table when absent
    #[arg(long, global = true, env = "LF_ROLE", value_enum)]
    role: Option<Role>,

    /// Data directory holding the table file and media (or LINK_FAULT_DATA)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Lifecycle config file (or LF_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Write one JSONL change event per written row to stderr
    #[arg(long, global = true)]
    emit_changes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, list, inspect, close or delete escalations
    Escalation(EscalationArgs),

    /// Field report stages: create, progress, resolve
    Report(ReportArgs),

    /// Root-cause analysis forms
    Rca(RcaArgs),

    /// MTTR breach alerting
    Alerts(AlertsArgs),

    /// Notification inbox
    Notifications(NotificationsArgs),

    /// Roll-ups over escalations, reports and RCA records
    Analytics,

    /// Provider site reference data
    Sites(SitesArgs),

    /// User profiles (roles)
    Profile(ProfileArgs),

    /// Print JSON Schemas for persisted records
    Schema(SchemaArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct EscalationArgs {
    #[command(subcommand)]
    command: EscalationCommands,
}

#[derive(Subcommand, Debug)]
enum EscalationCommands {
    /// Open a new escalation
    Create {
        #[arg(long, value_enum)]
        provider: Provider,

        /// Site A id (non-MTN providers)
        #[arg(long)]
        site_a: Option<String>,

        /// Site B id (non-MTN providers)
        #[arg(long)]
        site_b: Option<String>,

        /// Segment (MTN)
        #[arg(long)]
        segment: Option<String>,

        /// MTTR budget in hours
        #[arg(long)]
        mttr: String,

        #[arg(long)]
        description: String,

        #[arg(long)]
        critical: bool,

        #[arg(long)]
        regional_manager: Option<String>,

        #[arg(long)]
        team_lead: Option<String>,
    },
    /// List escalations (runs a breach scan when permitted)
    List {
        #[arg(long, value_enum)]
        provider: Option<Provider>,

        #[arg(long, value_enum)]
        status: Option<EscalationStatus>,

        /// Only escalations created by the acting user
        #[arg(long)]
        mine: bool,

        /// Only pending or in-progress escalations
        #[arg(long)]
        open: bool,
    },
    /// Show one escalation with its reports and RCA
    Show { id: String },
    /// Close a resolved escalation once its RCA is on file
    Close { id: String },
    /// Delete an escalation and everything attached to it
    Delete { id: String },
}

#[derive(Args, Debug)]
struct ReportArgs {
    #[command(subcommand)]
    command: ReportCommands,
}

#[derive(Subcommand, Debug)]
enum ReportCommands {
    /// Attach the report to an escalation
    Create {
        #[arg(long)]
        escalation: String,

        #[arg(long)]
        issue: String,

        #[arg(long)]
        reported_by: String,

        #[arg(long)]
        contact: String,

        #[arg(long)]
        critical: bool,

        /// Photo to upload (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },
    /// Record an in-progress update
    Progress {
        #[arg(long)]
        report: String,

        #[arg(long)]
        notes: String,

        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },
    /// Mark the report resolved
    Resolve {
        #[arg(long)]
        report: String,

        #[arg(long)]
        notes: String,

        /// Cause of failure as observed in the field
        #[arg(long)]
        cof: String,

        /// Point of failure
        #[arg(long)]
        pof: String,

        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },
    /// Show one report
    Show { id: String },
}

#[derive(Args, Debug)]
struct RcaArgs {
    #[command(subcommand)]
    command: RcaCommands,
}

#[derive(Subcommand, Debug)]
enum RcaCommands {
    /// Submit (or resubmit) the RCA for an escalation
    Submit(RcaSubmitArgs),
    /// Show the RCA on file, or `create` when there is none
    Show {
        #[arg(long)]
        escalation: String,
    },
}

#[derive(Args, Debug)]
struct RcaSubmitArgs {
    #[arg(long)]
    escalation: String,

    #[arg(long, value_enum)]
    link_type: LinkType,

    /// Outage start (RFC 3339 or `YYYY-MM-DDTHH:MM`)
    #[arg(long)]
    start: String,

    /// Outage end
    #[arg(long)]
    end: String,

    #[arg(long, value_enum)]
    actual_cof: Option<CauseOfFailure>,

    #[arg(long, default_value = "")]
    detailed_cof: String,

    #[arg(long, default_value = "")]
    resolution: String,

    #[arg(long)]
    cof: Option<String>,

    #[arg(long)]
    pof: Option<String>,

    #[arg(long)]
    ofc: Option<String>,

    #[arg(long)]
    jc: Option<String>,

    #[arg(long)]
    cod: Option<String>,

    #[arg(long)]
    team_lead: Option<String>,

    #[arg(long)]
    team_manager: Option<String>,

    #[arg(long)]
    time_to_pof: Option<String>,

    #[arg(long)]
    time_to_test: Option<String>,

    #[arg(long)]
    tt_number: Option<String>,

    #[arg(long)]
    bottle_cassette_tray: Option<String>,

    #[arg(long)]
    segment: Option<String>,
}

#[derive(Args, Debug)]
struct AlertsArgs {
    #[command(subcommand)]
    command: AlertsCommands,
}

#[derive(Subcommand, Debug)]
enum AlertsCommands {
    /// Scan open escalations; exits 1 when any is urgent
    Scan,
}

#[derive(Args, Debug)]
struct NotificationsArgs {
    #[command(subcommand)]
    command: NotificationsCommands,
}

#[derive(Subcommand, Debug)]
enum NotificationsCommands {
    /// List notifications addressed to the acting user
    List {
        #[arg(long)]
        unread: bool,
    },
    /// Mark a notification read
    Read { id: String },
}

#[derive(Args, Debug)]
struct SitesArgs {
    #[command(subcommand)]
    command: SitesCommands,
}

#[derive(Subcommand, Debug)]
enum SitesCommands {
    /// Replace a provider's sites from a JSON array file
    Import {
        #[arg(long, value_enum)]
        provider: Provider,

        file: PathBuf,
    },
    /// List sites
    List {
        #[arg(long, value_enum)]
        provider: Option<Provider>,
    },
}

#[derive(Args, Debug)]
struct ProfileArgs {
    #[command(subcommand)]
    command: ProfileCommands,
}

#[derive(Subcommand, Debug)]
enum ProfileCommands {
    /// Create or update a profile row
    Set {
        id: String,

        #[arg(value_enum)]
        role_name: Role,

        #[arg(long)]
        display_name: Option<String>,
    },
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Record type to print
    name: Option<String>,

    /// List available schema types
    #[arg(long)]
    list: bool,

    /// Print every schema
    #[arg(long)]
    all: bool,

    /// Single-line JSON
    #[arg(long)]
    compact: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration and where it came from
    Show,
    /// Validate a config file (defaults to the resolved one)
    Validate { path: Option<PathBuf> },
}

// ============================================================================
// Entry point
// ============================================================================

/// A command result ready to print in any output format.
struct Rendered {
    command: &'static str,
    body: Value,
    summary: String,
    markdown: String,
    exit: ExitCode,
}

impl Rendered {
    fn new(command: &'static str, body: impl Serialize) -> lf_common::Result<Self> {
        Ok(Rendered {
            command,
            body: serde_json::to_value(body)?,
            summary: String::new(),
            markdown: String::new(),
            exit: ExitCode::Clean,
        })
    }

    fn summary(mut self, line: impl Into<String>) -> Self {
        self.summary = line.into();
        self
    }

    fn markdown(mut self, text: impl Into<String>) -> Self {
        self.markdown = text.into();
        self
    }

    fn exit(mut self, code: ExitCode) -> Self {
        self.exit = code;
        self
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Clean
            };
            std::process::exit(code.as_i32());
        }
    };

    let log_config =
        LogConfig::from_env().with_cli(cli.global.verbose, cli.global.quiet, cli.global.format);
    init_logging(&log_config);

    let ctx = LogContext::for_run(cli.global.actor.as_deref());
    let span = ctx.span();
    let _enter = span.enter();

    let command = command_name(&cli.command);
    tracing::debug!(
        target: event_names::RUN_STARTED,
        stage = %Stage::Init,
        command,
        "run started"
    );

    let exit_code = match dispatch(&cli) {
        Ok(Some(rendered)) => {
            let code = rendered.exit;
            print_rendered(&cli.global, &ctx, rendered);
            code
        }
        Ok(None) => ExitCode::Clean,
        Err(err) => output_error(&cli.global, &ctx, command, &err),
    };

    tracing::debug!(
        target: event_names::RUN_FINISHED,
        stage = %Stage::Init,
        command,
        exit_code = exit_code.as_i32(),
        "run finished"
    );
    std::process::exit(exit_code.as_i32());
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Escalation(args) => match args.command {
            EscalationCommands::Create { .. } => "escalation create",
            EscalationCommands::List { .. } => "escalation list",
            EscalationCommands::Show { .. } => "escalation show",
            EscalationCommands::Close { .. } => "escalation close",
            EscalationCommands::Delete { .. } => "escalation delete",
        },
        Commands::Report(args) => match args.command {
            ReportCommands::Create { .. } => "report create",
            ReportCommands::Progress { .. } => "report progress",
            ReportCommands::Resolve { .. } => "report resolve",
            ReportCommands::Show { .. } => "report show",
        },
        Commands::Rca(args) => match args.command {
            RcaCommands::Submit(_) => "rca submit",
            RcaCommands::Show { .. } => "rca show",
        },
        Commands::Alerts(_) => "alerts scan",
        Commands::Notifications(args) => match args.command {
            NotificationsCommands::List { .. } => "notifications list",
            NotificationsCommands::Read { .. } => "notifications read",
        },
        Commands::Analytics => "analytics",
        Commands::Sites(args) => match args.command {
            SitesCommands::Import { .. } => "sites import",
            SitesCommands::List { .. } => "sites list",
        },
        Commands::Profile(_) => "profile set",
        Commands::Schema(_) => "schema",
        Commands::Config(args) => match args.command {
            ConfigCommands::Show => "config show",
            ConfigCommands::Validate { .. } => "config validate",
        },
        Commands::Completions { .. } => "completions",
        Commands::Version => "version",
    }
}

/// Run the command. `None` means the command already wrote its own output.
fn dispatch(cli: &Cli) -> lf_common::Result<Option<Rendered>> {
    let global = &cli.global;
    let rendered = match &cli.command {
        Commands::Escalation(args) => run_escalation(global, &args.command)?,
        Commands::Report(args) => run_report(global, &args.command)?,
        Commands::Rca(args) => run_rca(global, &args.command)?,
        Commands::Alerts(args) => match args.command {
            AlertsCommands::Scan => run_alerts_scan(global)?,
        },
        Commands::Notifications(args) => run_notifications(global, &args.command)?,
        Commands::Analytics => run_analytics(global)?,
        Commands::Sites(args) => run_sites(global, &args.command)?,
        Commands::Profile(args) => run_profile(global, &args.command)?,
        Commands::Schema(args) => return run_schema(args),
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => run_config_show(global)?,
            ConfigCommands::Validate { path } => run_config_validate(global, path.as_deref())?,
        },
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "lf-core", &mut std::io::stdout());
            return Ok(None);
        }
        Commands::Version => version_info()?,
    };
    Ok(Some(rendered))
}

// ============================================================================
// Engine wiring
// ============================================================================

fn open_engine(global: &GlobalOpts) -> lf_common::Result<Engine> {
    let loaded = load_config(global.config.as_deref())?;
    log_config_source(&loaded);

    let data_dir = resolve_data_dir(global.data_dir.as_deref())?;
    let mut store = FileStore::open(&data_dir)?;
    if global.emit_changes {
        store = store.with_emitter(Arc::new(JsonlWriter::new(std::io::stderr())));
    }
    tracing::debug!(
        target: event_names::STORE_OPENED,
        stage = %Stage::Init,
        path = %store.path().display(),
        "store opened"
    );

    let media = FsObjectStore::new(media_root(&data_dir), loaded.config.public_base_url.clone());
    Ok(Engine::new(Arc::new(store), Arc::new(media), loaded.config))
}

fn log_config_source(loaded: &LoadedConfig) {
    match &loaded.paths.config {
        Some(path) => tracing::debug!(
            target: event_names::CONFIG_LOADED,
            stage = %Stage::Init,
            path = %path.display(),
            source = %loaded.paths.source,
            "config loaded"
        ),
        None => tracing::debug!(
            target: event_names::CONFIG_DEFAULT_USED,
            stage = %Stage::Init,
            "no config file found; using built-in defaults"
        ),
    }
}

/// The acting user: `--role` when given, otherwise the profiles table.
fn resolve_actor(global: &GlobalOpts, engine: &Engine) -> lf_common::Result<Actor> {
    let id = global
        .actor
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::missing("actor"))?;
    match global.role {
        Some(role) => Ok(Actor::new(id, role)),
        None => engine.actor_from_profile(&UserId::new(id)),
    }
}

fn parse_id<T>(field: &str, raw: &str, parse: fn(&str) -> Option<T>) -> lf_common::Result<T> {
    parse(raw).ok_or_else(|| Error::invalid(field, format!("not a valid id: {}", raw)))
}

fn load_images(paths: &[PathBuf]) -> lf_common::Result<Vec<ImageUpload>> {
    let images = paths
        .iter()
        .map(|p| ImageUpload::from_path(p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(images)
}

// ============================================================================
// Escalations
// ============================================================================

fn run_escalation(global: &GlobalOpts, command: &EscalationCommands) -> lf_common::Result<Rendered> {
    let engine = open_engine(global)?;
    match command {
        EscalationCommands::Create {
            provider,
            site_a,
            site_b,
            segment,
            mttr,
            description,
            critical,
            regional_manager,
            team_lead,
        } => {
            let actor = resolve_actor(global, &engine)?;
            let input = NewEscalation {
                provider: *provider,
                site_a: site_a.clone(),
                site_b: site_b.clone(),
                segment: segment.clone(),
                mttr_hours: mttr.clone(),
                description: description.clone(),
                is_critical: *critical,
                regional_manager: regional_manager.clone(),
                team_lead: team_lead.clone(),
            };
            let escalation = engine.create_escalation(&actor, &input)?;
            let summary = format!("created {}", escalation_line(&escalation));
            let markdown = escalation_md(&escalation, &[]);
            Ok(Rendered::new("escalation create", serde_json::json!({ "escalation": escalation }))?
                .summary(summary)
                .markdown(markdown))
        }
        EscalationCommands::List {
            provider,
            status,
            mine,
            open,
        } => {
            let actor = resolve_actor(global, &engine)?;
            let filter = EscalationFilter {
                provider: *provider,
                status: *status,
                created_by: mine.then(|| actor.id.clone()),
                open_only: *open,
            };
            let listing = engine.refresh_escalations(&actor, &filter)?;
            let labels = engine.link_labels(&listing.escalations)?;
            let urgent = listing
                .breaches
                .as_ref()
                .map(|b| b.urgent.len())
                .unwrap_or(0);

            let mut markdown = String::from("| Ticket | Provider | Link | Status | MTTR (h) | Urgent |\n");
            markdown.push_str("|---|---|---|---|---|---|\n");
            for (e, label) in listing.escalations.iter().zip(&labels) {
                let is_urgent = listing
                    .breaches
                    .as_ref()
                    .is_some_and(|b| b.is_urgent(&e.id));
                markdown.push_str(&format!(
                    "| {} | {} | {} | {} | {} | {} |\n",
                    e.ticket_id,
                    e.provider,
                    label.display.as_deref().unwrap_or(&e.link_id),
                    e.status.as_str(),
                    e.mttr_hours,
                    if is_urgent { "yes" } else { "" }
                ));
            }

            let summary = format!("{} escalations, {} urgent", listing.escalations.len(), urgent);
            Ok(Rendered::new(
                "escalation list",
                serde_json::json!({
                    "escalations": listing.escalations,
                    "labels": labels,
                    "breaches": listing.breaches,
                }),
            )?
            .summary(summary)
            .markdown(markdown))
        }
        EscalationCommands::Show { id } => {
            let id = parse_id("escalation_id", id, EscalationId::parse)?;
            let escalation = engine.get_escalation(&id)?;
            let reports = engine.reports_for(&id)?;
            let rca = engine.rca_form_mode(&id)?;
            let label = engine
                .link_labels(std::slice::from_ref(&escalation))?
                .into_iter()
                .next();
            let summary = format!("{} ({} reports)", escalation_line(&escalation), reports.len());
            let mut markdown = escalation_md(&escalation, &reports);
            if let RcaFormMode::View(record) = &rca {
                markdown.push('\n');
                markdown.push_str(&rca_md(record));
            }
            Ok(Rendered::new(
                "escalation show",
                serde_json::json!({
                    "escalation": escalation,
                    "label": label,
                    "reports": reports,
                    "rca": rca,
                }),
            )?
            .summary(summary)
            .markdown(markdown))
        }
        EscalationCommands::Close { id } => {
            let actor = resolve_actor(global, &engine)?;
            let id = parse_id("escalation_id", id, EscalationId::parse)?;
            let escalation = engine.close_escalation(&actor, &id)?;
            let summary = format!("closed {}", escalation_line(&escalation));
            let markdown = escalation_md(&escalation, &[]);
            Ok(Rendered::new("escalation close", serde_json::json!({ "escalation": escalation }))?
                .summary(summary)
                .markdown(markdown))
        }
        EscalationCommands::Delete { id } => {
            let actor = resolve_actor(global, &engine)?;
            let id = parse_id("escalation_id", id, EscalationId::parse)?;
            let rows = engine.delete_escalation(&actor, &id)?;
            Ok(Rendered::new(
                "escalation delete",
                serde_json::json!({ "escalation_id": id, "rows_deleted": rows }),
            )?
            .summary(format!("deleted {} ({} rows)", id, rows))
            .markdown(format!("Deleted escalation `{}` and {} row(s).\n", id, rows)))
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

fn run_report(global: &GlobalOpts, command: &ReportCommands) -> lf_common::Result<Rendered> {
    let engine = open_engine(global)?;
    let (name, report) = match command {
        ReportCommands::Create {
            escalation,
            issue,
            reported_by,
            contact,
            critical,
            images,
        } => {
            let actor = resolve_actor(global, &engine)?;
            let input = NewReport {
                escalation_id: parse_id("escalation_id", escalation, EscalationId::parse)?,
                issue_description: issue.clone(),
                reported_by: reported_by.clone(),
                contact_info: contact.clone(),
                is_critical: *critical,
                images: load_images(images)?,
            };
            ("report create", engine.create_report(&actor, &input)?)
        }
        ReportCommands::Progress {
            report,
            notes,
            images,
        } => {
            let actor = resolve_actor(global, &engine)?;
            let input = ProgressUpdate {
                report_id: parse_id("report_id", report, ReportId::parse)?,
                status_notes: notes.clone(),
                images: load_images(images)?,
            };
            ("report progress", engine.update_in_progress(&actor, &input)?)
        }
        ReportCommands::Resolve {
            report,
            notes,
            cof,
            pof,
            images,
        } => {
            let actor = resolve_actor(global, &engine)?;
            let input = Resolution {
                report_id: parse_id("report_id", report, ReportId::parse)?,
                resolution_notes: notes.clone(),
                cof: cof.clone(),
                pof: pof.clone(),
                images: load_images(images)?,
            };
            ("report resolve", engine.resolve_report(&actor, &input)?)
        }
        ReportCommands::Show { id } => {
            let id = parse_id("report_id", id, ReportId::parse)?;
            ("report show", engine.get_report(&id)?)
        }
    };

    let summary = format!(
        "report {} [{}] on {}",
        report.id,
        report.status.as_str(),
        report.escalation_id
    );
    let markdown = report_md(&report);
    Ok(Rendered::new(name, serde_json::json!({ "report": report }))?
        .summary(summary)
        .markdown(markdown))
}

// ============================================================================
// RCA
// ============================================================================

fn run_rca(global: &GlobalOpts, command: &RcaCommands) -> lf_common::Result<Rendered> {
    let engine = open_engine(global)?;
    match command {
        RcaCommands::Submit(args) => {
            let actor = resolve_actor(global, &engine)?;
            let input = RcaSubmission {
                escalation_id: parse_id("escalation_id", &args.escalation, EscalationId::parse)?,
                link_type: args.link_type,
                start_time: args.start.clone(),
                end_time: args.end.clone(),
                actual_cof: args.actual_cof,
                detailed_cof: args.detailed_cof.clone(),
                resolution: args.resolution.clone(),
                cof: args.cof.clone(),
                pof: args.pof.clone(),
                ofc: args.ofc.clone(),
                jc: args.jc.clone(),
                cod: args.cod.clone(),
                team_lead: args.team_lead.clone(),
                team_manager: args.team_manager.clone(),
                time_to_pof: args.time_to_pof.clone(),
                time_to_test: args.time_to_test.clone(),
                tt_number: args.tt_number.clone(),
                bottle_cassette_tray: args.bottle_cassette_tray.clone(),
                segment: args.segment.clone(),
            };
            let record = engine.submit_rca(&actor, &input)?;
            let summary = format!(
                "rca for {}: {}h used, {}",
                record.escalation_id, record.mttr_used, record.mttr_status
            );
            let markdown = rca_md(&record);
            Ok(Rendered::new("rca submit", serde_json::json!({ "rca": record }))?
                .summary(summary)
                .markdown(markdown))
        }
        RcaCommands::Show { escalation } => {
            let id = parse_id("escalation_id", escalation, EscalationId::parse)?;
            let mode = engine.rca_form_mode(&id)?;
            let (summary, markdown) = match &mode {
                RcaFormMode::Create => (
                    format!("no rca on file for {}", id),
                    "No RCA on file; the form opens blank.\n".to_string(),
                ),
                RcaFormMode::View(record) => (
                    format!("{}h used, {}", record.mttr_used, record.mttr_status),
                    rca_md(record),
                ),
            };
            Ok(Rendered::new("rca show", &mode)?
                .summary(summary)
                .markdown(markdown))
        }
    }
}

// ============================================================================
// Alerts, notifications, analytics
// ============================================================================

fn run_alerts_scan(global: &GlobalOpts) -> lf_common::Result<Rendered> {
    let engine = open_engine(global)?;
    let actor = resolve_actor(global, &engine)?;
    let report = engine.scan_breaches(&actor)?;
    let exit = if report.urgent.is_empty() {
        ExitCode::Clean
    } else {
        ExitCode::Urgent
    };
    let summary = format!(
        "scanned {}, {} urgent, {} notified",
        report.scanned,
        report.urgent.len(),
        report.notified.len()
    );
    let markdown = breach_md(&report);
    Ok(Rendered::new("alerts scan", &report)?
        .summary(summary)
        .markdown(markdown)
        .exit(exit))
}

fn run_notifications(
    global: &GlobalOpts,
    command: &NotificationsCommands,
) -> lf_common::Result<Rendered> {
    let engine = open_engine(global)?;
    let actor = resolve_actor(global, &engine)?;
    match command {
        NotificationsCommands::List { unread } => {
            let entries = engine.notifications(&actor, *unread)?;
            let unread_count = entries.iter().filter(|n| !n.is_read).count();
            let mut markdown = String::new();
            for n in &entries {
                markdown.push_str(&notification_line(n));
                markdown.push('\n');
            }
            Ok(Rendered::new(
                "notifications list",
                serde_json::json!({ "notifications": entries }),
            )?
            .summary(format!("{} notifications, {} unread", entries.len(), unread_count))
            .markdown(markdown))
        }
        NotificationsCommands::Read { id } => {
            let id = parse_id("notification_id", id, NotificationId::parse)?;
            let entry = engine.mark_notification_read(&actor, &id)?;
            let line = notification_line(&entry);
            Ok(Rendered::new(
                "notifications read",
                serde_json::json!({ "notification": entry }),
            )?
            .summary(format!("marked {} read", id))
            .markdown(line))
        }
    }
}

fn run_analytics(global: &GlobalOpts) -> lf_common::Result<Rendered> {
    let engine = open_engine(global)?;
    let actor = resolve_actor(global, &engine)?;
    let summary = engine.analytics(&actor)?;
    let line = format!(
        "{} escalations, {} open, {} urgent",
        summary.total_escalations, summary.open, summary.urgent
    );
    let markdown = analytics_md(&summary);
    Ok(Rendered::new("analytics", &summary)?
        .summary(line)
        .markdown(markdown))
}

// ============================================================================
// Sites and profiles
// ============================================================================

fn run_sites(global: &GlobalOpts, command: &SitesCommands) -> lf_common::Result<Rendered> {
    let engine = open_engine(global)?;
    match command {
        SitesCommands::Import { provider, file } => {
            let actor = resolve_actor(global, &engine)?;
            let sites = read_sites(file)?;
            let count = engine.import_sites(&actor, *provider, sites)?;
            Ok(Rendered::new(
                "sites import",
                serde_json::json!({ "provider": provider, "imported": count }),
            )?
            .summary(format!("imported {} {} sites", count, provider))
            .markdown(format!("Replaced {} sites with {} rows.\n", provider, count)))
        }
        SitesCommands::List { provider } => {
            let sites = engine.sites(*provider)?;
            let mut markdown = String::from("| Provider | Id | Name | Region |\n|---|---|---|---|\n");
            for s in &sites {
                markdown.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    s.provider,
                    s.id,
                    s.name,
                    s.region.as_deref().unwrap_or("")
                ));
            }
            Ok(Rendered::new("sites list", serde_json::json!({ "sites": sites }))?
                .summary(format!("{} sites", sites.len()))
                .markdown(markdown))
        }
    }
}

fn read_sites(path: &Path) -> lf_common::Result<Vec<Site>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn run_profile(global: &GlobalOpts, command: &ProfileCommands) -> lf_common::Result<Rendered> {
    let engine = open_engine(global)?;
    match command {
        ProfileCommands::Set {
            id,
            role_name,
            display_name,
        } => {
            let profile = engine.put_profile(Profile {
                id: UserId::new(id.trim()),
                role: *role_name,
                display_name: display_name.clone(),
            })?;
            let summary = format!("{} is {}", profile.id, profile.role);
            Ok(Rendered::new("profile set", serde_json::json!({ "profile": profile }))?
                .summary(summary.clone())
                .markdown(format!("{}\n", summary)))
        }
    }
}

// ============================================================================
// Schema, config, version
// ============================================================================

fn run_schema(args: &SchemaArgs) -> lf_common::Result<Option<Rendered>> {
    let format = if args.compact {
        SchemaFormat::JsonCompact
    } else {
        SchemaFormat::Json
    };

    if args.list {
        let schemas: Vec<Value> = available_schemas()
            .into_iter()
            .map(|(name, description)| serde_json::json!({ "name": name, "description": description }))
            .collect();
        let mut markdown = String::new();
        for (name, description) in available_schemas() {
            markdown.push_str(&format!("- `{}`: {}\n", name, description));
        }
        let summary = format!("{} schema types", schemas.len());
        return Ok(Some(
            Rendered::new("schema", serde_json::json!({ "schemas": schemas }))?
                .summary(summary)
                .markdown(markdown),
        ));
    }

    let value = if args.all {
        serde_json::to_value(generate_all_schemas())?
    } else {
        let name = args.name.as_deref().ok_or_else(|| Error::missing("name"))?;
        generate_schema(name)
            .ok_or_else(|| Error::invalid("name", format!("unknown schema type: {}", name)))?
    };
    println!("{}", format_schema(&value, format));
    Ok(None)
}

fn run_config_show(global: &GlobalOpts) -> lf_common::Result<Rendered> {
    let loaded = load_config(global.config.as_deref())?;
    log_config_source(&loaded);
    let snapshot = ConfigSnapshot::new(&loaded);

    let source = snapshot
        .config_path
        .clone()
        .unwrap_or_else(|| "built-in defaults".to_string());
    let config = &loaded.config;
    let markdown = format!(
        "Source: {}\nHash: {}\n\n- min_mttr_hours: {}\n- breach_ratio: {}\n- max_photos: {}\n- ticket_prefix: {}\n- ticket_retry_attempts: {}\n- public_base_url: {}\n",
        source,
        snapshot.short_id(),
        config.min_mttr_hours,
        config.breach_ratio,
        config.max_photos,
        config.ticket_prefix,
        config.ticket_retry_attempts,
        config.public_base_url,
    );
    let summary = format!("config: {} ({})", source, snapshot.short_id());
    Ok(Rendered::new(
        "config show",
        serde_json::json!({
            "snapshot": snapshot,
            "config": config,
            "capabilities": config.capability_table(),
        }),
    )?
    .summary(summary)
    .markdown(markdown))
}

fn run_config_validate(global: &GlobalOpts, path: Option<&Path>) -> lf_common::Result<Rendered> {
    let loaded = load_config(path.or(global.config.as_deref()))?;
    let source = loaded
        .paths
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());
    Ok(Rendered::new(
        "config validate",
        serde_json::json!({
            "valid": true,
            "path": loaded.paths.config.as_ref().map(|p| p.display().to_string()),
            "using_defaults": loaded.paths.config.is_none(),
            "schema_version": loaded.config.schema_version,
        }),
    )?
    .summary("config validate: OK")
    .markdown(format!("Status: ✓ Valid\nSource: {}\n", source)))
}

fn version_info() -> lf_common::Result<Rendered> {
    let version = env!("CARGO_PKG_VERSION");
    Ok(Rendered::new(
        "version",
        serde_json::json!({
            "lf_core_version": version,
            "rust_version": env!("CARGO_PKG_RUST_VERSION"),
        }),
    )?
    .summary(format!("lf-core {}", version))
    .markdown(format!("lf-core {}\nschema version: {}\n", version, SCHEMA_VERSION)))
}

// ============================================================================
// Output
// ============================================================================

fn envelope(ctx: &LogContext, command: &str, status: &str, body: Value) -> Value {
    let mut out = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "run_id": ctx.run_id,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "command": command,
        "status": status,
    });
    if let (Some(map), Value::Object(fields)) = (out.as_object_mut(), body) {
        map.extend(fields);
    }
    out
}

fn print_rendered(global: &GlobalOpts, ctx: &LogContext, rendered: Rendered) {
    match global.format {
        OutputFormat::Json => {
            let status = if rendered.exit == ExitCode::Urgent {
                "urgent"
            } else {
                "ok"
            };
            let out = envelope(ctx, rendered.command, status, rendered.body);
            println!(
                "{}",
                serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Summary => {
            println!("[{}] {}: {}", ctx.run_id, rendered.command, rendered.summary);
        }
        OutputFormat::Exitcode => {}
        OutputFormat::Md => {
            println!("# lf-core {}", rendered.command);
            println!();
            print!("{}", rendered.markdown);
        }
    }
}

/// Output an error in the appropriate format and map it to an exit code.
fn output_error(global: &GlobalOpts, ctx: &LogContext, command: &str, err: &Error) -> ExitCode {
    let exit_code = ExitCode::from(err);
    if exit_code.is_internal_error() {
        tracing::error!(
            target: event_names::INTERNAL_ERROR,
            stage = %Stage::Init,
            command,
            error = %err,
            "command failed"
        );
    }

    match global.format {
        OutputFormat::Json => {
            let structured = StructuredError::from(err);
            let out = envelope(
                ctx,
                command,
                "error",
                serde_json::json!({ "error": structured, "exit_code": exit_code.code_name() }),
            );
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&out).unwrap_or_else(|_| structured.to_json())
            );
        }
        OutputFormat::Summary => {
            eprintln!("[{}] {} error: {}", ctx.run_id, command, err);
        }
        OutputFormat::Exitcode => {}
        OutputFormat::Md => {
            let use_color = !global.no_color && std::io::stderr().is_terminal();
            eprintln!("{}", format_error_human(err, use_color));
        }
    }

    exit_code
}

fn escalation_line(e: &Escalation) -> String {
    format!(
        "{} {} {} [{}] mttr={}h",
        e.ticket_id,
        e.provider,
        e.link_id,
        e.status.as_str(),
        e.mttr_hours
    )
}

fn escalation_md(e: &Escalation, reports: &[Report]) -> String {
    let mut out = format!(
        "## {} ({})\n\n- Id: `{}`\n- Link: {}\n- Status: {}\n- MTTR budget: {}h\n- Critical: {}\n- Description: {}\n",
        e.ticket_id,
        e.provider,
        e.id,
        e.link_id,
        e.status.as_str(),
        e.mttr_hours,
        if e.is_critical { "yes" } else { "no" },
        e.description,
    );
    if let (Some(cof), Some(pof)) = (&e.cof, &e.pof) {
        out.push_str(&format!("- COF / POF: {} / {}\n", cof, pof));
    }
    for report in reports {
        out.push('\n');
        out.push_str(&report_md(report));
    }
    out
}

fn report_md(r: &Report) -> String {
    let mut out = format!(
        "### Report `{}` [{}]\n\n- Issue: {}\n- Reported by: {}\n- Photos: {} initial, {} progress, {} resolution\n",
        r.id,
        r.status.as_str(),
        r.issue_description,
        r.reported_by,
        r.initial_photos.len(),
        r.progress_photos.len(),
        r.resolution_photos.len(),
    );
    if let Some(notes) = &r.status_notes {
        out.push_str(&format!("- Progress: {}\n", notes));
    }
    if let Some(notes) = &r.resolution_notes {
        out.push_str(&format!("- Resolution: {}\n", notes));
    }
    out
}

fn rca_md(r: &RcaRecord) -> String {
    format!(
        "### RCA\n\n- Window: {} to {}\n- MTTR used: {}h ({})\n- Cause: {}\n- Detail: {}\n- Resolution: {}\n",
        r.start_time.to_rfc3339(),
        r.end_time.to_rfc3339(),
        r.mttr_used,
        r.mttr_status,
        r.actual_cof.as_str(),
        r.detailed_cof,
        r.resolution,
    )
}

fn breach_md(report: &BreachReport) -> String {
    if report.urgent.is_empty() {
        return format!("Scanned {} open escalations; none urgent.\n", report.scanned);
    }
    let mut out = String::from("| Ticket | Link | Elapsed (h) | Threshold (h) | Notified |\n");
    out.push_str("|---|---|---|---|---|\n");
    for b in &report.urgent {
        let notified = report
            .notified
            .iter()
            .any(|n| n.escalation_id == b.escalation_id);
        out.push_str(&format!(
            "| {} | {} | {:.1} | {:.1} | {} |\n",
            b.ticket_id,
            b.link_id,
            b.elapsed_hours,
            b.threshold_hours,
            if notified { "now" } else { "earlier" }
        ));
    }
    out
}

fn notification_line(n: &NotificationEntry) -> String {
    let kind = match n.kind {
        NotificationKind::MttrBreach => "mttr_breach",
        NotificationKind::ReportResolved => "report_resolved",
    };
    format!(
        "- [{}] {} `{}`: {}",
        if n.is_read { "x" } else { " " },
        kind,
        n.id,
        n.message
    )
}

fn analytics_md(s: &AnalyticsSummary) -> String {
    let mut out = format!(
        "- Escalations: {} ({} open, {} urgent)\n- RCA: {} within MTTR, {} exceeded\n",
        s.total_escalations, s.open, s.urgent, s.rca_within, s.rca_exceeded
    );
    if let Some(mean) = s.mean_mttr_used_hours {
        out.push_str(&format!("- Mean MTTR used: {:.1}h\n", mean));
    }
    if let Some(mean) = s.mean_time_to_resolve_hours {
        out.push_str(&format!("- Mean time to resolve: {:.1}h\n", mean));
    }
    out.push_str("\n| Provider | Total | Open | Urgent | Breach rate |\n|---|---|---|---|---|\n");
    for (provider, stats) in &s.by_provider {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {:.0}% |\n",
            provider,
            stats.total,
            stats.open,
            stats.urgent,
            stats.breach_rate * 100.0
        ));
    }
    out
}
