use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use plaza_seed::{Pipeline, RunSummary};
use plaza_store::config::Settings;
use plaza_store::db::{reset_generated_data, verify_store, Database, VerificationReport};
use plaza_store::MemorySink;
use plaza_types::{GeneratorConfig, LoadStrategy, SamplingPolicy};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Plaza synthetic dataset generator
///
/// Populates the Plaza schema with a referentially consistent social graph
/// for load and benchmark testing.
#[derive(Parser, Debug)]
#[command(name = "plaza-seed")]
#[command(about = "Generate synthetic social-network data for load testing", long_about = None)]
struct Cli {
    /// Settings file (defaults to ./plaza.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialise the schema and run the six generation stages
    Generate(GenerateArgs),
    /// Check store-level invariants of a generated dataset
    Verify(DatabaseArgs),
    /// Delete all generated rows and reset id sequences
    Reset(ResetArgs),
}

#[derive(Args, Debug)]
struct DatabaseArgs {
    /// Path to the SQLite database file
    #[arg(short, long)]
    database: Option<String>,
}

#[derive(Args, Debug)]
struct ResetArgs {
    #[command(flatten)]
    db: DatabaseArgs,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,
}

#[derive(Args, Debug, Default)]
struct GenerateArgs {
    /// Path to the SQLite database file
    #[arg(short, long)]
    database: Option<String>,

    #[arg(long)]
    users: Option<usize>,

    /// Follows per user (upper bound)
    #[arg(long)]
    follows: Option<usize>,

    /// Posts per user
    #[arg(long)]
    posts: Option<usize>,

    /// Media items per post
    #[arg(long)]
    media: Option<usize>,

    /// Comments per user
    #[arg(long)]
    comments: Option<usize>,

    /// Likes per user as MIN..MAX
    #[arg(long, value_parser = parse_range)]
    likes: Option<(usize, usize)>,

    /// Replies per user as MIN..MAX
    #[arg(long, value_parser = parse_range)]
    replies: Option<(usize, usize)>,

    /// bulk or transactional
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<LoadStrategy>,

    /// bounded-retry or exact
    #[arg(long, value_parser = parse_sampling)]
    sampling: Option<SamplingPolicy>,

    #[arg(long)]
    seed: Option<u64>,

    /// Logical rows held in memory before a flush
    #[arg(long)]
    batch_size: Option<usize>,

    /// Keep integrity checks and durability on during bulk loading
    #[arg(long)]
    no_tune: bool,

    /// Delete previously generated rows first
    #[arg(long)]
    reset: bool,

    /// Generate into memory only, counting rows
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,
}

impl GenerateArgs {
    /// Flags override whatever the settings file and environment provided
    fn apply(&self, config: &mut GeneratorConfig) {
        if let Some(users) = self.users {
            config.user_count = users;
        }
        if let Some(follows) = self.follows {
            config.follows_per_user = follows;
        }
        if let Some(posts) = self.posts {
            config.posts_per_user = posts;
        }
        if let Some(media) = self.media {
            config.media_per_post = media;
        }
        if let Some(comments) = self.comments {
            config.comments_per_user = comments;
        }
        if let Some(likes) = self.likes {
            config.like_range = likes;
        }
        if let Some(replies) = self.replies {
            config.reply_range = replies;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(sampling) = self.sampling {
            config.sampling = sampling;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
    }
}

/// Parse `MIN..MAX` (or a single number for a fixed count)
fn parse_range(s: &str) -> Result<(usize, usize), String> {
    let parse = |part: &str| {
        part.trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid count '{}': {}", part.trim(), e))
    };
    match s.split_once("..") {
        Some((min, max)) => Ok((parse(min)?, parse(max.trim_start_matches('='))?)),
        None => {
            let n = parse(s)?;
            Ok((n, n))
        }
    }
}

fn parse_strategy(s: &str) -> Result<LoadStrategy, String> {
    LoadStrategy::parse(s).ok_or_else(|| format!("unknown strategy '{}' (bulk, transactional)", s))
}

fn parse_sampling(s: &str) -> Result<SamplingPolicy, String> {
    SamplingPolicy::parse(s).ok_or_else(|| format!("unknown sampling '{}' (bounded-retry, exact)", s))
}

/// Ask before a destructive step unless `--yes` was given
fn confirm(prompt: &str) -> Result<bool> {
    println!("{}", prompt);
    println!("Do you want to continue? (y/N): ");

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

/// Open an existing database file; verify and reset never create one
fn open_existing(path: &str) -> Result<Database> {
    if !Database::is_memory_path(path) && !Path::new(path).exists() {
        anyhow::bail!("Database file not found: {}", path);
    }
    let db = Database::new(path).context("Failed to open database connection")?;
    db.initialize()?;
    Ok(db)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", summary.to_json().context("Failed to serialize summary")?);
    } else {
        println!();
        print!("{}", summary.render_table());
    }
    Ok(())
}

fn display_verification(report: &VerificationReport) {
    println!();
    println!("Store Verification");
    println!("==================");
    println!();
    for (table, count) in &report.table_counts {
        println!("{:<16} {:>12}", table, count);
    }
    println!();
    for violation in &report.violations {
        let mark = if violation.count == 0 { "ok" } else { "FAIL" };
        println!("{:<24} {:>10}  {}", violation.check, violation.count, mark);
    }
}

fn generate(settings: &Settings, args: &GenerateArgs) -> Result<()> {
    let mut config = settings.generator.clone();
    args.apply(&mut config);
    let pipeline = Pipeline::new(config)?.tuning(settings.tuning.enabled && !args.no_tune);
    let now = Utc::now();

    if args.dry_run {
        tracing::info!("Dry run: rows are counted in memory, nothing is written");
        let mut sink = MemorySink::counting();
        let summary = pipeline.execute(&mut sink, now)?;
        return print_summary(&summary, args.json);
    }

    let path = args.database.as_deref().unwrap_or(&settings.database.path);
    tracing::info!("Database: {}", path);
    let db = Database::new(path).context("Failed to create database")?;
    db.initialize()?;

    if args.reset {
        if !args.yes && !confirm(&format!("This will delete all generated data in {}.", path))? {
            println!("Generation cancelled.");
            return Ok(());
        }
        let conn = db.connection()?;
        let deleted = reset_generated_data(&conn)?;
        tracing::info!("Deleted {} previously generated rows", deleted);
    }

    let mut loader = db.loader()?;
    let summary = pipeline.execute(&mut loader, now)?;
    print_summary(&summary, args.json)
}

fn verify(settings: &Settings, args: &DatabaseArgs) -> Result<()> {
    let path = args.database.as_deref().unwrap_or(&settings.database.path);
    let db = open_existing(path)?;
    let conn = db.connection()?;
    let report = verify_store(&conn, Utc::now())?;
    display_verification(&report);

    if !report.is_clean() {
        anyhow::bail!("Store verification found violations");
    }
    println!();
    println!("All checks passed.");
    Ok(())
}

fn reset(settings: &Settings, args: &ResetArgs) -> Result<()> {
    let path = args.db.database.as_deref().unwrap_or(&settings.database.path);
    let db = open_existing(path)?;

    if !args.yes && !confirm(&format!("This will delete all generated data in {}.", path))? {
        println!("Reset cancelled.");
        return Ok(());
    }

    let conn = db.connection()?;
    let deleted = reset_generated_data(&conn)?;
    println!("Deleted {} rows and reset id sequences.", deleted);
    Ok(())
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize tracing; stdout is kept for the summary
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plaza_seed=info,plaza_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match &cli.command {
        Command::Generate(args) => generate(&settings, args),
        Command::Verify(args) => verify(&settings, args),
        Command::Reset(args) => reset(&settings, args),
    }
}
