use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tally_core::{CategoryRegistry, Owner};
use tally_import::{
    parse_csv, parse_pdf, sniff, CategoryMatcher, CsvFormat, FormatId, ImportSummary,
    ParseResult, StatementPipeline,
};

mod ledger;
use ledger::CsvLedger;

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Import bank statements into a shared household ledger"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Enable debug logging.
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a statement file and append new transactions to the ledger.
    Import(ImportArgs),
    /// Show the category registry and its keywords.
    Categories {
        /// Category registry TOML (defaults to the built-in registry).
        #[arg(long)]
        categories: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ImportArgs {
    /// Statement file (.csv or .pdf).
    file: PathBuf,
    /// auto, chase, amex, discover, capital-one, generic, or a path to a
    /// CSV format descriptor TOML.
    #[arg(long, default_value = "auto")]
    format: String,
    /// Which user owns these transactions.
    #[arg(long, default_value = "user1")]
    user: Owner,
    /// Card label recorded on every imported transaction (e.g. "Chase Sapphire").
    #[arg(long, default_value = "")]
    card: String,
    /// Ledger CSV to dedup against and append to.
    #[arg(long, default_value = "ledger.csv")]
    ledger: PathBuf,
    /// Category registry TOML (defaults to the built-in registry).
    #[arg(long)]
    categories: Option<PathBuf>,
    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
    /// Parse and report without touching the ledger.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Command::Import(args) => import(args),
        Command::Categories { categories } => list_categories(categories),
    }
}

fn import(args: ImportArgs) -> Result<()> {
    let registry = load_registry(args.categories.as_deref())?;
    let matcher = CategoryMatcher::new(registry);
    let pipeline = StatementPipeline::new(&matcher);

    let data = std::fs::read(&args.file)
        .with_context(|| format!("read {}", args.file.display()))?;
    let parsed = parse_statement(&data, &args)?;

    // Store-side pre-filter: only the statement's date range is compared.
    let ledger = CsvLedger::new(&args.ledger);
    let dates = parsed.transactions.iter().map(|t| t.date);
    let window = match (dates.clone().min(), dates.max()) {
        (Some(start), Some(end)) => ledger.window(start, end)?,
        _ => Vec::new(),
    };

    let summary = pipeline.run(parsed, &window);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, &matcher);
    }

    if !args.dry_run {
        ledger.append(&summary.imported)?;
        tracing::info!(
            count = summary.imported.len(),
            ledger = %args.ledger.display(),
            "appended imported transactions"
        );
    }
    Ok(())
}

fn parse_statement(data: &[u8], args: &ImportArgs) -> Result<ParseResult> {
    let extension = args
        .file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if extension == "pdf" {
        let format = FormatId::from_str(&args.format).map_err(|e| anyhow!(e))?;
        return Ok(parse_pdf(data, format, args.user, &args.card)?);
    }

    let format = csv_format(data, &args.format)?;
    Ok(parse_csv(data, &format, args.user, &args.card)?)
}

fn csv_format(data: &[u8], requested: &str) -> Result<CsvFormat> {
    if requested == "auto" {
        return sniff(data).ok_or_else(|| {
            anyhow!("unrecognized CSV format; supported: Chase, Amex, Discover, Capital One")
        });
    }
    if requested.ends_with(".toml") {
        let content = std::fs::read_to_string(requested)
            .with_context(|| format!("read format descriptor {requested}"))?;
        return Ok(CsvFormat::from_toml(&content)?);
    }
    CsvFormat::builtin(requested)
        .ok_or_else(|| anyhow!("unknown CSV format '{requested}'"))
}

fn load_registry(path: Option<&Path>) -> Result<CategoryRegistry> {
    match path {
        Some(p) => {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("read category registry {}", p.display()))?;
            Ok(CategoryRegistry::from_toml(&content)?)
        }
        None => Ok(CategoryRegistry::default()),
    }
}

fn print_summary(summary: &ImportSummary, matcher: &CategoryMatcher) {
    for tx in &summary.imported {
        println!(
            "  {} {} {:<14} {:>10}  {}",
            tx.date,
            matcher.icon_for(&tx.category),
            tx.category,
            tx.amount.to_string(),
            tx.description
        );
    }
    for dup in &summary.duplicates {
        println!(
            "  skipped duplicate of {}: {} {} {}",
            dup.existing_id,
            dup.transaction.date,
            dup.transaction.amount,
            dup.transaction.description
        );
    }
    for err in &summary.errors {
        println!("  error at {err}");
    }
    for note in &summary.annotations {
        println!("  review {}: {}", note.transaction_id, note.note);
    }
    println!("{summary}");
}

fn list_categories(path: Option<PathBuf>) -> Result<()> {
    let registry = load_registry(path.as_deref())?;
    if registry.is_empty() {
        bail!("category registry is empty");
    }
    for category in registry.iter() {
        println!(
            "{} {:<14} {}",
            registry.icon_for(&category.name),
            category.name,
            category.keywords.join(", ")
        );
    }
    Ok(())
}
