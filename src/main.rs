use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cohort_screen::config::{Config, ConfigOverrides};
use cohort_screen::criteria::loader::load_criteria_file;
use cohort_screen::criteria::{CriteriaStore, CriterionField};
use cohort_screen::output::csv::{
    eligible_to_csv, failures_to_csv, results_to_csv, terminal_cases_to_csv,
};
use cohort_screen::output::json::{render_json, write_json};
use cohort_screen::output::table::{
    render_criteria_table, render_dashboard, render_distribution_table, render_divergence_table,
    render_impact, render_results_table, render_warnings_table,
};
use cohort_screen::patients::ingest::load_dataset_file;
use cohort_screen::server::run_server;
use cohort_screen::session::ScreeningSession;
use cohort_screen::workflow::WorkflowState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "cohort-screen",
    about = "Screen a patient dataset against eligibility criteria"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    /// Compare categorical values ignoring case and surrounding whitespace.
    #[arg(long)]
    ignore_case: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args, Clone)]
struct InputArgs {
    #[arg(short, long)]
    patients: PathBuf,
    #[arg(long)]
    criteria: PathBuf,
    /// Criterion edit as NAME.FIELD=VALUE, e.g. `Age.min=50` or `Diagnosis.value=Diabetes`.
    #[arg(long = "set")]
    edits: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Evaluate {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        top: Option<usize>,
        /// Also list every patient's verdict.
        #[arg(long)]
        details: bool,
    },
    Review {
        #[arg(long)]
        criteria: PathBuf,
        #[arg(long)]
        patients: Option<PathBuf>,
        #[arg(long = "set")]
        edits: Vec<String>,
    },
    Export {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        eligible: Option<PathBuf>,
        #[arg(long)]
        failures: Option<PathBuf>,
        #[arg(long)]
        results: Option<PathBuf>,
        /// Ranked ineligible patients, as CSV.
        #[arg(long)]
        terminal: Option<PathBuf>,
    },
    Distribution {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        feature: String,
        #[arg(long)]
        bins: Option<usize>,
    },
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct EditArg {
    name: String,
    field: CriterionField,
    raw: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(config_path.as_path()))?;
    config.apply_overrides(ConfigOverrides {
        case_sensitive: cli.ignore_case.then_some(false),
        ..ConfigOverrides::default()
    });

    match &cli.command {
        Commands::Evaluate {
            input,
            top,
            details,
        } => {
            let session = run_session(&config, input)?;
            let limit = top.unwrap_or(config.report.terminal_case_limit);
            let report = session.dashboard(limit)?;
            let run = session
                .run()
                .ok_or_else(|| anyhow!("session finished without an evaluation run"))?;
            match cli.output {
                OutputFormat::Table => {
                    println!("{}", render_dashboard(&report));
                    if *details {
                        println!("\n{}", render_results_table(run));
                    }
                    if !run.warnings.is_empty() {
                        println!("\nWarnings\n{}", render_warnings_table(&run.warnings));
                    }
                }
                OutputFormat::Json => println!("{}", render_json(&report)?),
                OutputFormat::Csv => println!("{}", results_to_csv(run)?),
            }
        }
        Commands::Review {
            criteria,
            patients,
            edits,
        } => {
            let mut store = CriteriaStore::from_extracted(load_criteria_file(criteria)?)?;
            for edit in parse_edits(edits)? {
                store.set_field(&edit.name, edit.field, &edit.raw)?;
            }
            store.finalize()?;
            let divergences = store.diff();
            match cli.output {
                OutputFormat::Json => println!("{}", render_json(&divergences)?),
                OutputFormat::Table | OutputFormat::Csv => {
                    println!("{}", render_criteria_table(store.working()));
                    if divergences.is_empty() {
                        println!("Criteria match the extracted document.");
                    } else {
                        println!("{}", render_divergence_table(&divergences));
                    }
                }
            }
            if let Some(path) = patients {
                let mut session = ScreeningSession::new(config.match_policy());
                session.begin()?;
                session.load_dataset(load_dataset_file(path)?)?;
                session.load_criteria(store.original().clone())?;
                for edit in parse_edits(edits)? {
                    session.set_field(&edit.name, edit.field, &edit.raw)?;
                }
                let impact = session.divergence_impact()?;
                match cli.output {
                    OutputFormat::Json => println!("{}", render_json(&impact)?),
                    OutputFormat::Table | OutputFormat::Csv => println!("{}", render_impact(&impact)),
                }
            }
        }
        Commands::Export {
            input,
            eligible,
            failures,
            results,
            terminal,
        } => {
            let session = run_session(&config, input)?;
            let dataset = session
                .dataset()
                .ok_or_else(|| anyhow!("session has no dataset"))?;
            let run = session
                .run()
                .ok_or_else(|| anyhow!("session finished without an evaluation run"))?;
            if eligible.is_none() && failures.is_none() && results.is_none() && terminal.is_none()
            {
                warn!("no export target given; nothing written");
            }
            if let Some(path) = eligible {
                write_text(path, &eligible_to_csv(dataset, run)?)?;
            }
            let report = session.dashboard(config.report.terminal_case_limit)?;
            if let Some(path) = failures {
                write_text(path, &failures_to_csv(&report.failure_histogram)?)?;
            }
            if let Some(path) = terminal {
                write_text(path, &terminal_cases_to_csv(&report.terminal_cases)?)?;
            }
            if let Some(path) = results {
                if has_extension(path, "json") {
                    write_json(path, run)?;
                } else {
                    write_text(path, &results_to_csv(run)?)?;
                }
            }
        }
        Commands::Distribution {
            input,
            feature,
            bins,
        } => {
            let mut session = run_session(&config, input)?;
            let bins = bins.unwrap_or(config.report.histogram_bins).max(1);
            let distribution = session.view_distribution(feature, bins)?;
            match cli.output {
                OutputFormat::Json => println!("{}", render_json(&distribution)?),
                OutputFormat::Table | OutputFormat::Csv => {
                    println!("{}", render_distribution_table(&distribution))
                }
            }
        }
        Commands::Serve { host, port } => {
            let host = host.clone().unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            run_server(config, addr).await?;
        }
        Commands::Config { init, show } => {
            if *init {
                Config::write_template(&config_path)?;
                println!("Wrote config template to {}", config_path.display());
            }
            if *show || !*init {
                println!("{}", render_json(&config)?);
            }
        }
    }

    Ok(())
}

/// Walks the wizard non-interactively: load, edit, confirm and accept any edits.
fn run_session(config: &Config, input: &InputArgs) -> Result<ScreeningSession> {
    let edits = parse_edits(&input.edits)?;
    let mut session = ScreeningSession::new(config.match_policy());
    session.begin()?;
    session.load_dataset(load_dataset_file(&input.patients)?)?;
    session.load_criteria(load_criteria_file(&input.criteria)?)?;
    for edit in &edits {
        session.set_field(&edit.name, edit.field, &edit.raw)?;
    }
    if session.confirm()? == WorkflowState::ReviewingDivergence {
        let divergences = session.divergence()?;
        info!(edited = divergences.len(), "running with edited criteria");
        session.accept_edits()?;
    }
    Ok(session)
}

fn parse_edits(raw: &[String]) -> Result<Vec<EditArg>> {
    raw.iter().map(|entry| parse_edit(entry)).collect()
}

fn parse_edit(entry: &str) -> Result<EditArg> {
    let (target, value) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("edit {entry:?} must look like NAME.FIELD=VALUE"))?;
    let (name, field) = target
        .rsplit_once('.')
        .ok_or_else(|| anyhow!("edit {entry:?} must name a field, e.g. Age.min"))?;
    Ok(EditArg {
        name: name.trim().to_string(),
        field: CriterionField::from_str(field)?,
        raw: value.to_string(),
    })
}

fn write_text(path: &Path, data: &str) -> Result<()> {
    std::fs::write(path, data).with_context(|| format!("failed writing {}", path.display()))?;
    info!(path = %path.display(), "export written");
    Ok(())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}
