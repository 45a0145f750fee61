//! Command-line interface.
//!
//! ## Commands
//!
//! - `caddie submit` - Submit a batch of line items into the session's basket
//! - `caddie parse` - Preview which records of a file would be submitted
//!
//! ## Configuration
//!
//! Settings come from an optional JSON config file, overridden by flags or
//! environment variables:
//!
//! - `CADDIE_BASE_URL` - Basket service URL
//! - `CADDIE_MANAGER_ID` - Manager authorizing discounts
//! - `CADDIE_DEVICE_ID`, `CADDIE_WORKSTATION_ID` - Required device identity
//! - `CADDIE_COOKIE` - Session cookie

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::domain::identity::{
    HEADER_DEVICE_ID, HEADER_OPERATING_COMPANY, HEADER_STORE_CODE, HEADER_TENANT_ID,
    HEADER_WORKSTATION_ID, IdentityCapture, RequestIdentity,
};
use crate::domain::line_item::{DiscountKind, LineItem, demo_items};
use crate::domain::run::{RunSummary, TerminalDecision};
use crate::error::{CaddieError, Result};
use crate::http::ReqwestHttpClient;
use crate::ingest::{IngestConfig, IngestReport, read_line_items};
use crate::progress::TracingReporter;
use crate::submit::{BatchSubmitter, SubmitConfig};

/// Exit code when the run ended blocked on an inconsistent basket.
pub const EXIT_BLOCKING: i32 = 3;

/// Batch line items with discounts into a remote basket.
#[derive(Debug, Parser)]
#[command(name = "caddie")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON config file; flags override its values.
    #[arg(long, global = true, env = "CADDIE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Basket service URL.
    #[arg(long, global = true, env = "CADDIE_BASE_URL")]
    pub base_url: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Log debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a batch of line items.
    Submit(SubmitArgs),
    /// Parse a line-item file and show accepted and skipped records.
    Parse(ParseArgs),
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct IngestArgs {
    /// Field delimiter (detected when omitted).
    #[arg(long)]
    pub delimiter: Option<char>,

    /// The first record is a header row.
    #[arg(long)]
    pub has_headers: bool,

    /// Discount kind for values without a trailing `%` (amount or percent).
    #[arg(long, default_value = "percent")]
    pub default_kind: DiscountKind,
}

impl IngestArgs {
    /// # Errors
    /// Returns a validation error for a non-ASCII delimiter.
    pub fn to_config(&self) -> Result<IngestConfig> {
        let delimiter = match self.delimiter {
            Some(c) if c.is_ascii() => Some(c as u8),
            Some(c) => {
                return Err(CaddieError::Validation(format!(
                    "delimiter '{}' must be a single ASCII character",
                    c
                )));
            }
            None => None,
        };
        Ok(IngestConfig {
            delimiter,
            has_headers: self.has_headers,
            default_kind: self.default_kind,
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct IdentityArgs {
    /// Header dump (`Name: value` lines) to capture identity from.
    #[arg(long)]
    pub headers_file: Option<PathBuf>,

    #[arg(long, env = "CADDIE_DEVICE_ID")]
    pub device_id: Option<String>,

    #[arg(long, env = "CADDIE_WORKSTATION_ID")]
    pub workstation_id: Option<String>,

    #[arg(long, env = "CADDIE_STORE_CODE")]
    pub store_code: Option<String>,

    #[arg(long, env = "CADDIE_TENANT_ID")]
    pub tenant_id: Option<String>,

    #[arg(long, env = "CADDIE_OPERATING_COMPANY")]
    pub operating_company: Option<String>,

    /// Session cookie sent with every call.
    #[arg(long, env = "CADDIE_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,
}

impl IdentityArgs {
    /// Capture identity from the header dump first, then apply explicit flags.
    ///
    /// # Errors
    /// Returns an I/O error if the header dump cannot be read.
    pub fn capture(&self) -> Result<RequestIdentity> {
        let capture = IdentityCapture::new();
        if let Some(path) = &self.headers_file {
            let dump = std::fs::read_to_string(path)?;
            let captured = capture.observe_dump(&dump);
            tracing::info!(path = %path.display(), captured, "Read header dump");
        }

        let flags = [
            (HEADER_DEVICE_ID, &self.device_id),
            (HEADER_WORKSTATION_ID, &self.workstation_id),
            (HEADER_STORE_CODE, &self.store_code),
            (HEADER_TENANT_ID, &self.tenant_id),
            (HEADER_OPERATING_COMPANY, &self.operating_company),
        ];
        for (header, value) in flags {
            if let Some(value) = value {
                capture.observe(header, value);
            }
        }
        if let Some(cookie) = &self.cookie {
            capture.set_session(cookie.clone());
        }
        Ok(capture.snapshot())
    }
}

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    /// CSV file of `sku, quantity, discount` records.
    #[arg(long, conflicts_with = "demo", required_unless_present = "demo")]
    pub file: Option<PathBuf>,

    /// Submit the built-in demonstration items.
    #[arg(long)]
    pub demo: bool,

    /// Manager authorizing the discounts.
    #[arg(long, env = "CADDIE_MANAGER_ID")]
    pub manager_id: Option<String>,

    /// Reason code sent with each discount.
    #[arg(long)]
    pub discount_reason: Option<String>,

    /// Per-call timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    #[command(flatten)]
    pub ingest: IngestArgs,

    #[command(flatten)]
    pub identity: IdentityArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ParseArgs {
    /// CSV file of `sku, quantity, discount` records.
    #[arg(long)]
    pub file: PathBuf,

    #[command(flatten)]
    pub ingest: IngestArgs,
}

impl Cli {
    /// Effective submit configuration: config file, then global flags.
    ///
    /// # Errors
    /// Returns an error if the config file is unreadable or invalid.
    pub fn submit_config(&self) -> Result<SubmitConfig> {
        let mut config = match &self.config {
            Some(path) => SubmitConfig::from_json_file(path)?,
            None => SubmitConfig::default(),
        };
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        Ok(config)
    }
}

/// Execute the parsed command, returning the process exit code.
///
/// # Errors
/// Returns an error if inputs cannot be read or the run cannot start.
pub async fn execute(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::Submit(args) => submit(&cli, args).await,
        Commands::Parse(args) => parse(cli.format, args),
    }
}

fn load_items(args: &SubmitArgs) -> Result<Vec<LineItem>> {
    match &args.file {
        Some(path) => {
            let report = read_line_items(path, &args.ingest.to_config()?)?;
            for skipped in &report.skipped {
                tracing::warn!(line = skipped.line, reason = %skipped.reason, "Skipped record");
            }
            Ok(report.items)
        }
        None => Ok(demo_items()),
    }
}

async fn submit(cli: &Cli, args: &SubmitArgs) -> Result<i32> {
    let mut config = cli.submit_config()?;
    if let Some(manager_id) = &args.manager_id {
        config.manager_id = manager_id.clone();
    }
    if let Some(reason) = &args.discount_reason {
        config.discount_reason = reason.clone();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    let identity = args.identity.capture()?;
    let items = load_items(args)?;

    let http_client = ReqwestHttpClient::new(
        &config.base_url,
        config.timeout_ms,
        config.client_profile.clone(),
    )?;
    let submitter = BatchSubmitter::new(http_client, TracingReporter, config);
    let summary = submitter.submit_batch(&items, &identity).await?;
    let decision = summary.decision();

    match cli.format {
        OutputFormat::Json => {
            let output = SubmitOutput {
                summary: &summary,
                decision: &decision,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => print_summary(&summary, &decision),
    }

    Ok(if decision.is_blocking() { EXIT_BLOCKING } else { 0 })
}

#[derive(Serialize)]
struct SubmitOutput<'a> {
    summary: &'a RunSummary,
    decision: &'a TerminalDecision,
}

fn print_summary(summary: &RunSummary, decision: &TerminalDecision) {
    println!(
        "run {}: {} item(s), {} added, {}/{} discount(s) applied, {} conflict(s)",
        summary.run_id,
        summary.total_items,
        summary.items_added,
        summary.discount_successes,
        summary.discount_attempts,
        summary.discount_conflicts
    );
    match decision {
        TerminalDecision::Redirect { basket_id } => println!("open basket {}", basket_id),
        TerminalDecision::Blocking { stale_basket_id } => {
            let basket = stale_basket_id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "(unknown)".to_string());
            println!(
                "BLOCKED: every discount conflicted. Clear basket {} manually before retrying.",
                basket
            );
        }
        TerminalDecision::NoOp => println!("no basket established"),
    }
}

fn parse(format: OutputFormat, args: &ParseArgs) -> Result<i32> {
    let report = read_line_items(&args.file, &args.ingest.to_config()?)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(0)
}

fn print_report(report: &IngestReport) {
    for (index, item) in report.items.iter().enumerate() {
        println!(
            "{:>3}  {:<14}  qty {:<6}  {} {}",
            index + 1,
            item.sku,
            item.quantity,
            item.discount_value,
            item.discount_kind
        );
    }
    for skipped in &report.skipped {
        println!("skip line {}: {}", skipped.line, skipped.reason);
    }
    println!(
        "{} accepted, {} skipped",
        report.items.len(),
        report.skipped_count()
    );
}
