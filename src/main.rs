//! Binary entry point for graphrec.
//!
//! This binary provides the CLI interface for the graphrec recommendation engine.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use graphrec::cli::{self, App};
use graphrec::config::GraphrecConfig;
use graphrec::observability::{self, InitOptions};
use graphrec::services;
use graphrec::storage::CsvImporter;
use graphrec::{Algorithm, RecommendRequest, Recommendation, current_timestamp};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// graphrec - graph-based recommendations with collaborative filtering and personalized `PageRank`.
#[derive(Parser)]
#[command(name = "graphrec")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "GRAPHREC_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Import interactions and catalog items from CSV files.
    Import {
        /// Interactions CSV (`user_id,item_id[,rating][,timestamp]`).
        #[arg(long)]
        interactions: Option<PathBuf>,

        /// Items CSV (`id,title,category`).
        #[arg(long)]
        items: Option<PathBuf>,

        /// Field delimiter.
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        /// Only ratings at or above this value count as likes.
        #[arg(long)]
        min_rating: Option<f64>,
    },

    /// Rebuild the graph from stored rows and write a fresh snapshot.
    Rebuild,

    /// Write a snapshot of the current graph.
    Snapshot,

    /// Show graph statistics.
    Stats,

    /// Recommend items for a user.
    Recommend {
        /// Target user id.
        #[arg(allow_negative_numbers = true)]
        user: i64,

        /// Number of items.
        #[arg(short, long, default_value = "10", allow_negative_numbers = true)]
        k: i64,

        /// Ranking algorithm: bfs or ppr.
        #[arg(short, long, default_value = "bfs")]
        algorithm: String,

        /// PPR walk count override.
        #[arg(long)]
        walks: Option<usize>,

        /// PPR walk depth override.
        #[arg(long)]
        depth: Option<usize>,

        /// Items to exclude (comma-separated ids).
        #[arg(long)]
        seen: Option<String>,

        /// Preferred genres (comma-separated); defaults to stored preferences.
        #[arg(long)]
        genres: Option<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Record that a user likes an item.
    Like {
        /// User id.
        user: u64,
        /// Item id.
        item: u64,
        /// Seconds since the epoch (default: now).
        #[arg(long)]
        timestamp: Option<u64>,
    },

    /// Remove a like.
    Unlike {
        /// User id.
        user: u64,
        /// Item id.
        item: u64,
    },

    /// Tag an item with a genre.
    Genre {
        /// Item id.
        item: u64,
        /// Genre name.
        genre: String,
    },

    /// Replace a user's preferred genres.
    Prefs {
        /// User id.
        user: u64,
        /// Genres (comma-separated); empty clears them.
        #[arg(default_value = "")]
        genres: String,
    },

    /// Answer JSON commands read line by line from stdin.
    Run,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match GraphrecConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init(&config, InitOptions {
        verbose: cli.verbose,
    }) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: &GraphrecConfig) -> anyhow::Result<()> {
    match command {
        Commands::Import {
            interactions,
            items,
            delimiter,
            min_rating,
        } => cmd_import(
            config,
            interactions.as_deref(),
            items.as_deref(),
            delimiter,
            min_rating,
        ),

        Commands::Rebuild => cmd_rebuild(config),

        Commands::Snapshot => cmd_snapshot(config),

        Commands::Stats => cmd_stats(config),

        Commands::Recommend {
            user,
            k,
            algorithm,
            walks,
            depth,
            seen,
            genres,
            json,
        } => {
            let algorithm = Algorithm::parse(&algorithm)
                .with_context(|| format!("unknown algorithm '{algorithm}' (expected bfs or ppr)"))?;
            let mut request = RecommendRequest::from_raw(user, k)?.with_algorithm(algorithm);
            if let Some(seen) = seen {
                request = request.with_seen(cli::parse_id_list(&seen)?);
            }
            if let Some(genres) = genres {
                request = request.with_preferred_genres(cli::parse_genre_list(&genres)?);
            }
            if let Some(walks) = walks {
                request = request.with_walks(walks);
            }
            if let Some(depth) = depth {
                request = request.with_depth(depth);
            }
            cmd_recommend(config, &request, json)
        },

        Commands::Like {
            user,
            item,
            timestamp,
        } => {
            let app = App::open(config)?;
            let stored = app
                .engine()
                .record_edge(user, item, timestamp.unwrap_or_else(current_timestamp))?;
            println!("User {user} likes item {item} (since {stored})");
            app.close();
            Ok(())
        },

        Commands::Unlike { user, item } => {
            let app = App::open(config)?;
            if app.engine().remove_edge(user, item)? {
                println!("Removed like: user {user}, item {item}");
            } else {
                println!("No like recorded for user {user}, item {item}");
            }
            app.close();
            Ok(())
        },

        Commands::Genre { item, genre } => {
            let genre = cli::parse_genre(&genre)?;
            let app = App::open(config)?;
            app.engine().set_genre(item, genre)?;
            println!("Item {item} tagged {genre}");
            app.close();
            Ok(())
        },

        Commands::Prefs { user, genres } => {
            let genres = cli::parse_genre_list(&genres)?;
            let app = App::open(config)?;
            let changed = app.engine().set_preferences(user, genres)?;
            println!(
                "Preferences for user {user} {}",
                if changed { "updated" } else { "unchanged" }
            );
            app.close();
            Ok(())
        },

        Commands::Run => cmd_run(config),
    }
}

/// Import command.
fn cmd_import(
    config: &GraphrecConfig,
    interactions: Option<&Path>,
    items: Option<&Path>,
    delimiter: char,
    min_rating: Option<f64>,
) -> anyhow::Result<()> {
    if interactions.is_none() && items.is_none() {
        bail!("nothing to import: pass --interactions and/or --items");
    }
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| format!("delimiter must be a single ASCII character, got '{delimiter}'"))?;

    let mut importer = CsvImporter::new().with_delimiter(delimiter);
    if let Some(min) = min_rating {
        importer = importer.with_min_rating(min);
    }

    let app = App::open(config)?;
    if let Some(path) = items {
        let file = open_input(path)?;
        let stats = importer.import_items(file, app.rows())?;
        println!(
            "Items: {} read, {} imported, {} skipped",
            stats.read, stats.imported, stats.skipped
        );
    }
    if let Some(path) = interactions {
        let file = open_input(path)?;
        let stats = importer.import_interactions(file, app.rows())?;
        println!(
            "Interactions: {} read, {} imported, {} skipped",
            stats.read, stats.imported, stats.skipped
        );
    }

    let counts = app.rebuild()?;
    println!(
        "Graph: {} users, {} items, {} edges",
        counts.users, counts.items, counts.edges
    );
    Ok(())
}

fn open_input(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Rebuild command.
fn cmd_rebuild(config: &GraphrecConfig) -> anyhow::Result<()> {
    let app = App::open(config)?;
    let counts = app.rebuild()?;
    println!(
        "Rebuilt graph: {} users, {} items, {} edges",
        counts.users, counts.items, counts.edges
    );
    println!("Snapshot: {}", app.snapshots().path().display());
    Ok(())
}

/// Snapshot command.
fn cmd_snapshot(config: &GraphrecConfig) -> anyhow::Result<()> {
    let app = App::open(config)?;
    if !app.save_snapshot() {
        bail!(
            "could not write snapshot to {}",
            app.snapshots().path().display()
        );
    }
    println!("Snapshot written to {}", app.snapshots().path().display());
    Ok(())
}

/// Stats command.
fn cmd_stats(config: &GraphrecConfig) -> anyhow::Result<()> {
    let app = App::open(config)?;
    let counts = app.engine().stats();
    let boot = app.boot();

    println!("graphrec status");
    println!("===============");
    println!();
    println!("Graph:");
    println!("  Users: {}", counts.users);
    println!("  Items: {}", counts.items);
    println!("  Edges: {}", counts.edges);
    println!();
    println!("Storage:");
    match app.rows().db_path() {
        Some(path) => println!("  Database: {}", path.display()),
        None => println!("  Database: in-memory"),
    }
    println!("  Snapshot: {}", app.snapshots().path().display());
    println!("  Loaded from: {:?}", boot.source);
    if let Some(error) = &boot.snapshot_error {
        println!("  Snapshot rejected: {error}");
    }
    println!();
    println!("Cache: {}", app.engine().cache_backend());
    Ok(())
}

/// Recommend command.
fn cmd_recommend(
    config: &GraphrecConfig,
    request: &RecommendRequest,
    json: bool,
) -> anyhow::Result<()> {
    let app = App::open(config)?;
    let recommendation = app.engine().recommend(request)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recommendation)?);
    } else {
        print_recommendation(&recommendation);
    }
    Ok(())
}

fn print_recommendation(recommendation: &Recommendation) {
    println!(
        "Recommendations for user {} ({}, {}, {:.2}ms):",
        recommendation.user_id,
        recommendation.algorithm,
        recommendation.reason(),
        recommendation.latency_ms
    );
    if recommendation.items.is_empty() {
        println!("  (none)");
        return;
    }
    for (rank, item) in recommendation.items.iter().enumerate() {
        println!(
            "  {:>3}. [{}] {} ({})",
            rank + 1,
            item.id,
            item.title,
            item.category
        );
    }
}

/// Run command: JSON lines on stdin, one response per line on stdout.
fn cmd_run(config: &GraphrecConfig) -> anyhow::Result<()> {
    let app = App::open(config)?;

    let graph = Arc::clone(app.engine().graph());
    let snapshots = app.snapshots().clone();
    ctrlc::set_handler(move || {
        tracing::info!("Interrupted, saving snapshot before exit");
        let saved = services::shutdown(&graph, &snapshots);
        std::process::exit(if saved { 130 } else { 1 });
    })
    .context("installing Ctrl-C handler")?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let stats = cli::serve_lines(&app, stdin.lock(), stdout.lock())?;
    tracing::debug!(handled = stats.handled, failed = stats.failed, "Event loop finished");

    app.close();
    Ok(())
}
