//! CLI definition and command dispatch for Resonance.
//!
//! This module defines the command-line interface using `clap` and provides
//! the `run()` function that dispatches commands to the engine.
//!
//! ## Configuration Precedence
//!
//! Configuration is resolved with the following precedence (highest to lowest):
//! 1. CLI flags (e.g., `--database`, `--index-dir`)
//! 2. Environment variables (`RESONANCE_CONFIG`, `RESONANCE_DATABASE`, ...)
//! 3. Config file (`~/.resonance/config.yaml` or path from `--config`)
//! 4. Built-in defaults

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::ui::table::{self, IndexRow};
use crate::ui::{ColorMode, MessageType, Progress, ProgressMode, Style};

use resonance_core::{
    import_records, init_database, parse_recording_list, BuildProgress, DistanceType, IndexKey,
    RecordingRef, ResultForm, SimilarRecordings, SimilarityConfig, SimilarityEngine,
    SimilarityError,
};

// ============================================================================
// CLI Definition
// ============================================================================

/// Resonance – nearest-neighbour similarity over audio recording features
#[derive(Parser, Debug)]
#[command(name = "resonance")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "RESONANCE_VERBOSE")]
    pub verbose: bool,

    /// Suppress progress and informational messages
    #[arg(short, long, global = true, env = "RESONANCE_QUIET")]
    pub quiet: bool,

    /// Path to configuration file (default: ~/.resonance/config.yaml)
    #[arg(long, global = true, env = "RESONANCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite feature store (overrides `databasePath` from the config)
    #[arg(long, global = true, env = "RESONANCE_DATABASE")]
    pub database: Option<PathBuf>,

    /// Directory of persisted indices (overrides `indexDir` from the config)
    #[arg(long, global = true, env = "RESONANCE_INDEX_DIR")]
    pub index_dir: Option<PathBuf>,

    /// Color output mode: always, never, or auto (default: auto)
    #[arg(long, global = true, env = "RESONANCE_COLOR", default_value = "auto")]
    pub color: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the feature store and the index directory
    #[command(after_help = r#"EXAMPLES:
    # Create resonance.db and annoy_indices/ in the current directory
    resonance init

    # Typical first-time workflow
    resonance init && resonance import features.jsonl && resonance build-all
"#)]
    Init,

    /// Import submissions and feature vectors from a JSON Lines file
    #[command(after_help = r#"EXAMPLES:
    # Import one submission per line
    resonance import features.jsonl

    # Line format
    {"gid": "0dad432b-16cc-4bf0-8961-fd31d124b01b", "offset": 0, "features": {"mfccs": [1.0, 0.5]}}
"#)]
    Import {
        /// JSON Lines file to import
        file: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Build and save the index for one metric
    #[command(after_help = r#"EXAMPLES:
    # Build mfccs with the configured defaults
    resonance add-index mfccs

    # Build a manhattan index with 20 trees, 10000 rows per page
    resonance add-index bpm --distance manhattan --forest-size 20 -b 10000
"#)]
    AddIndex {
        /// Feature family to index (e.g., "mfccs", "bpm")
        metric: String,

        /// Feature rows fetched per page
        #[arg(short = 'b', long)]
        batch_size: Option<usize>,

        /// Number of trees
        #[arg(long)]
        forest_size: Option<usize>,

        /// Distance type (angular, euclidean, manhattan, hamming, dot)
        #[arg(long)]
        distance: Option<DistanceType>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Rebuild every base metric with angular and manhattan distance
    #[command(after_help = r#"EXAMPLES:
    # Rebuild everything with the configured forest size
    resonance build-all

    # Rebuild with 20 trees
    resonance build-all --forest-size 20
"#)]
    BuildAll {
        /// Number of trees
        #[arg(long)]
        forest_size: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete a persisted index
    #[command(after_help = r#"EXAMPLES:
    # Remove mfccs_angular_10
    resonance remove-index mfccs

    # Remove bpm_manhattan_20
    resonance remove-index bpm --distance manhattan --forest-size 20
"#)]
    RemoveIndex {
        /// Feature family of the index
        metric: String,

        /// Distance type of the index
        #[arg(long)]
        distance: Option<DistanceType>,

        /// Number of trees of the index
        #[arg(long)]
        forest_size: Option<usize>,
    },

    /// List persisted indices
    #[command(after_help = r#"EXAMPLES:
    # Show the index table
    resonance indices

    # As JSON
    resonance indices --json
"#)]
    Indices {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Find the recordings most similar to one recording
    #[command(after_help = r#"EXAMPLES:
    # 10 nearest recordings by mfccs
    resonance similar mfccs 0dad432b-16cc-4bf0-8961-fd31d124b01b -n 10

    # A specific submission, returning internal ids
    resonance similar bpm 0dad432b-16cc-4bf0-8961-fd31d124b01b:1 --distance manhattan --ids
"#)]
    Similar {
        /// Feature family to query
        metric: String,

        /// Recording as `gid` or `gid:offset`
        recording: String,

        /// Number of neighbours (falls back to the default when invalid)
        #[arg(short = 'n', long, allow_hyphen_values = true)]
        neighbours: Option<String>,

        /// Distance type (falls back to the default when unknown)
        #[arg(long)]
        distance: Option<String>,

        /// Number of trees (falls back to the default when invalid)
        #[arg(long, allow_hyphen_values = true)]
        forest_size: Option<String>,

        /// Return internal ids instead of recordings
        #[arg(long)]
        ids: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Find similar recordings for up to 25 recordings at once
    #[command(after_help = r#"EXAMPLES:
    # Two recordings, 5 neighbours each
    resonance similar-many mfccs --recording-ids "0dad432b-16cc-4bf0-8961-fd31d124b01b;7f27d7a9-27f0-4663-9d20-2c9c40200e6d:2" -n 5

    # Unknown or unindexed recordings are left out of the result
    resonance similar-many bpm --recording-ids "<gid>;<gid>:1" --json
"#)]
    SimilarMany {
        /// Feature family to query
        metric: String,

        /// `;`-separated recordings, each `gid` or `gid:offset`
        #[arg(long)]
        recording_ids: String,

        /// Number of neighbours (falls back to the default when invalid)
        #[arg(short = 'n', long, allow_hyphen_values = true)]
        neighbours: Option<String>,

        /// Distance type (falls back to the default when unknown)
        #[arg(long)]
        distance: Option<String>,

        /// Number of trees (falls back to the default when invalid)
        #[arg(long, allow_hyphen_values = true)]
        forest_size: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Distance between exactly two recordings
    #[command(after_help = r#"EXAMPLES:
    # mfccs distance between two recordings
    resonance between mfccs --recording-ids "0dad432b-16cc-4bf0-8961-fd31d124b01b;7f27d7a9-27f0-4663-9d20-2c9c40200e6d"

    # Manhattan distance on bpm, as JSON
    resonance between bpm --distance manhattan --recording-ids "<gid>:0;<gid>:1" --json
"#)]
    Between {
        /// Feature family to compare
        metric: String,

        /// Exactly two `;`-separated recordings
        #[arg(long)]
        recording_ids: String,

        /// Distance type (falls back to the default when unknown)
        #[arg(long)]
        distance: Option<String>,

        /// Number of trees (falls back to the default when invalid)
        #[arg(long, allow_hyphen_values = true)]
        forest_size: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

/// Parse arguments, run the command and map the outcome to an exit code.
///
/// Returns `ExitCode::SUCCESS` on success, or `ExitCode::FAILURE` on error.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Warnings always; debug only with --verbose
    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = format!(
        "resonance_core={},resonance_db={},resonance_cli={}",
        log_level, log_level, log_level
    );

    tracing_subscriber::fmt()
        .with_env_filter(&filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let color_mode = ColorMode::from_str(&cli.color).unwrap_or(ColorMode::Auto);
    let style = Style::new(color_mode);

    // Priority: --config flag > RESONANCE_CONFIG env > ~/.resonance/config.yaml
    let config = match &cli.config {
        Some(config_path) => SimilarityConfig::from_path(config_path),
        None => SimilarityConfig::load_default(),
    };

    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            let hint = if let Some(path) = &cli.config {
                format!("Check your config at {}", path.display())
            } else {
                "Check your global config at ~/.resonance/config.yaml".to_string()
            };
            eprintln!(
                "{}",
                style.error_with_context(
                    "Failed to load configuration",
                    Some(&e.to_string()),
                    Some(&hint),
                )
            );
            return ExitCode::FAILURE;
        }
    };

    if let Some(database) = cli.database {
        config = config.with_database_path(database);
    }
    if let Some(index_dir) = cli.index_dir {
        config = config.with_index_dir(index_dir);
    }

    let quiet = cli.quiet;
    let result = match cli.command {
        Command::Init => handle_init(&style, &config),
        Command::Import { file, json } => handle_import(&style, &config, file, quiet, json),
        command => {
            let engine = match open_engine(&style, config) {
                Some(engine) => engine,
                None => return ExitCode::FAILURE,
            };
            dispatch(&style, &engine, command, quiet)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", render_error(&style, &e));
            ExitCode::FAILURE
        }
    }
}

fn open_engine(style: &Style, config: SimilarityConfig) -> Option<SimilarityEngine> {
    if !config.database_path.exists() {
        eprintln!(
            "{}",
            style.error_with_context(
                "Feature store not found",
                Some(&config.database_path.display().to_string()),
                Some("Run `resonance init` and `resonance import <file>` first"),
            )
        );
        return None;
    }

    match SimilarityEngine::open(config) {
        Ok(engine) => Some(engine),
        Err(e) => {
            eprintln!(
                "{}",
                style.error_with_context(
                    "Failed to open feature store",
                    Some(&e.to_string()),
                    None,
                )
            );
            None
        }
    }
}

fn dispatch(
    style: &Style,
    engine: &SimilarityEngine,
    command: Command,
    quiet: bool,
) -> Result<(), SimilarityError> {
    match command {
        Command::AddIndex {
            metric,
            batch_size,
            forest_size,
            distance,
            json,
        } => handle_add_index(
            style,
            engine,
            &metric,
            batch_size,
            forest_size,
            distance,
            quiet,
            json,
        ),
        Command::BuildAll { forest_size, json } => {
            handle_build_all(style, engine, forest_size, quiet, json)
        }
        Command::RemoveIndex {
            metric,
            distance,
            forest_size,
        } => handle_remove_index(style, engine, metric, distance, forest_size),
        Command::Indices { json } => handle_indices(style, engine, json),
        Command::Similar {
            metric,
            recording,
            neighbours,
            distance,
            forest_size,
            ids,
            json,
        } => {
            let params = engine.query_params(
                &metric,
                distance.as_deref(),
                forest_size.as_deref(),
                neighbours.as_deref(),
            )?;
            let recording: RecordingRef = recording.parse()?;
            let form = if ids {
                ResultForm::Ids
            } else {
                ResultForm::Recordings
            };
            let similar = engine.nearest(&params, &recording, form)?;
            print_similar(style, &params.key(), &recording, &similar, json)
        }
        Command::SimilarMany {
            metric,
            recording_ids,
            neighbours,
            distance,
            forest_size,
            json,
        } => {
            let params = engine.query_params(
                &metric,
                distance.as_deref(),
                forest_size.as_deref(),
                neighbours.as_deref(),
            )?;
            let recordings = parse_recording_list(&recording_ids)?;
            let result = engine.nearest_many(&params, &recordings)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            if result.is_empty() {
                println!(
                    "{}",
                    style.message(MessageType::Skip, "None of the recordings are indexed")
                );
                return Ok(());
            }
            for (gid, offsets) in &result {
                for (offset, similar) in offsets {
                    let rows: Vec<String> = similar.iter().map(|r| r.to_string()).collect();
                    println!(
                        "{}",
                        style.section(&format!(
                            "{} ({})",
                            style.recording(&format!("{}:{}", gid, offset)),
                            params.key()
                        ))
                    );
                    println!("{}", table::render_neighbours_table(&rows));
                    println!();
                }
            }
            Ok(())
        }
        Command::Between {
            metric,
            recording_ids,
            distance,
            forest_size,
            json,
        } => {
            let params = engine.query_params(
                &metric,
                distance.as_deref(),
                forest_size.as_deref(),
                None,
            )?;
            let recordings = parse_recording_list(&recording_ids)?;
            let result = engine.similarity_between(&params, &recordings)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            if result.is_empty() {
                println!(
                    "{}",
                    style.message(
                        MessageType::Skip,
                        "One of the recordings is unknown or not indexed"
                    )
                );
                return Ok(());
            }
            for (metric, distance) in &result {
                println!("{}", style.key_value(metric, &style.distance(*distance)));
            }
            Ok(())
        }
        Command::Init | Command::Import { .. } => Ok(()),
    }
}

fn render_error(style: &Style, error: &SimilarityError) -> String {
    match error {
        SimilarityError::IndexNotFound { name, .. } => {
            let metric = name.split('_').next().unwrap_or(name);
            style.error_with_context(
                &error.to_string(),
                None,
                Some(&format!("Build it with `resonance add-index {}`", metric)),
            )
        }
        SimilarityError::UnknownMetric(_) => style.error_with_context(
            &error.to_string(),
            None,
            Some(&format!(
                "Known metrics: {}",
                resonance_core::BASE_METRICS.join(", ")
            )),
        ),
        _ => style.message(MessageType::Err, &error.to_string()),
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

fn handle_init(style: &Style, config: &SimilarityConfig) -> Result<(), SimilarityError> {
    init_database(&config.database_path)?;
    std::fs::create_dir_all(&config.index_dir)?;

    println!(
        "{}",
        style.message(MessageType::Ok, "Initialized Resonance feature store")
    );
    println!(
        "{}",
        style.message_detail(
            "Database",
            &style.file_path(&config.database_path.display().to_string())
        )
    );
    println!(
        "{}",
        style.message_detail(
            "Indices",
            &style.file_path(&config.index_dir.display().to_string())
        )
    );
    println!();
    println!(
        "{}",
        style.message(
            MessageType::Hint,
            "Load features with `resonance import <file.jsonl>`"
        )
    );
    Ok(())
}

fn handle_import(
    style: &Style,
    config: &SimilarityConfig,
    file: PathBuf,
    quiet: bool,
    json: bool,
) -> Result<(), SimilarityError> {
    let reader = BufReader::new(File::open(&file)?);
    let store = init_database(&config.database_path)?;

    let mode = ProgressMode::detect(quiet, json, style.color_mode());
    let progress = Progress::spinner(&format!("Importing {}...", file.display()), mode);
    let summary = import_records(&store, reader);
    progress.finish_clear();
    let summary = summary?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!("Imported {}", style.file_path(&file.display().to_string()))
        )
    );
    println!(
        "{}",
        style.message_detail("Submissions", &summary.submissions.to_string())
    );
    println!(
        "{}",
        style.message_detail("Vectors", &summary.vectors.to_string())
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_add_index(
    style: &Style,
    engine: &SimilarityEngine,
    metric: &str,
    batch_size: Option<usize>,
    forest_size: Option<usize>,
    distance: Option<DistanceType>,
    quiet: bool,
    json: bool,
) -> Result<(), SimilarityError> {
    let mut options = engine.build_options();
    if let Some(batch_size) = batch_size {
        options = options.with_batch_size(batch_size);
    }
    if let Some(forest_size) = forest_size {
        options = options.with_forest_size(forest_size);
    }
    if let Some(distance) = distance {
        options = options.with_distance(distance);
    }

    let name = options.key(metric).name();
    let mode = ProgressMode::detect(quiet, json, style.color_mode());
    let progress = Progress::bar(0, &name, mode);
    let result = engine.build_index(metric, &options, |p: &BuildProgress| {
        progress.set_length(p.total);
        progress.set_position(p.processed);
        progress.set_message(&format!("{} (page {})", name, p.pages));
    });
    progress.finish_clear();
    let summary = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{}",
        style.message(MessageType::Ok, &format!("Built index {}", summary.index))
    );
    println!(
        "{}",
        style.message_detail("Items", &summary.items.to_string())
    );
    println!(
        "{}",
        style.message_detail("Recordings", &summary.real.to_string())
    );
    println!(
        "{}",
        style.message_detail("Placeholders", &summary.placeholders.to_string())
    );
    println!(
        "{}",
        style.message_detail("Dimension", &summary.dimension.to_string())
    );
    println!(
        "{}",
        style.message_detail(
            "Path",
            &style.file_path(&summary.path.display().to_string())
        )
    );
    Ok(())
}

fn handle_build_all(
    style: &Style,
    engine: &SimilarityEngine,
    forest_size: Option<usize>,
    quiet: bool,
    json: bool,
) -> Result<(), SimilarityError> {
    let forest_size = forest_size.unwrap_or(engine.config().query.default_forest_size);

    let mode = ProgressMode::detect(quiet, json, style.color_mode());
    let progress = Progress::spinner("Building indices...", mode);
    let report = engine.build_all(forest_size, |key: &IndexKey, p: &BuildProgress| {
        progress.set_message(&format!("Building {} ({}/{})", key, p.processed, p.total));
    });
    progress.finish_clear();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for summary in &report.built {
        println!(
            "{}",
            style.list_item("+", &format!("{} ({} items)", summary.index, summary.items))
        );
    }
    for failure in &report.failed {
        println!(
            "{}",
            style.list_item("-", &format!("{}: {}", failure.index, failure.error))
        );
    }
    println!();
    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!("Built {} indices", report.built.len())
        )
    );
    if !report.failed.is_empty() {
        println!(
            "{}",
            style.message(
                MessageType::Warn,
                &format!(
                    "{} indices failed (metrics without stored vectors fail to build)",
                    report.failed.len()
                )
            )
        );
    }
    Ok(())
}

fn handle_remove_index(
    style: &Style,
    engine: &SimilarityEngine,
    metric: String,
    distance: Option<DistanceType>,
    forest_size: Option<usize>,
) -> Result<(), SimilarityError> {
    let defaults = &engine.config().query;
    let key = IndexKey::new(
        metric,
        distance.unwrap_or(defaults.default_distance),
        forest_size.unwrap_or(defaults.default_forest_size),
    );

    if engine.remove_index(&key)? {
        println!(
            "{}",
            style.message(MessageType::Ok, &format!("Removed index {}", key))
        );
    } else {
        println!(
            "{}",
            style.message(MessageType::Skip, &format!("No index named {}", key))
        );
    }
    Ok(())
}

fn handle_indices(
    style: &Style,
    engine: &SimilarityEngine,
    json: bool,
) -> Result<(), SimilarityError> {
    let indices = engine.list_indices()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&indices)?);
        return Ok(());
    }

    if indices.is_empty() {
        println!(
            "{}",
            style.message(
                MessageType::Info,
                &format!(
                    "No indices in {}",
                    style.file_path(&engine.config().index_dir.display().to_string())
                )
            )
        );
        println!(
            "{}",
            style.message(
                MessageType::Hint,
                "Build one with `resonance add-index <metric>`"
            )
        );
        return Ok(());
    }

    let rows: Vec<IndexRow> = indices
        .iter()
        .map(|index| IndexRow {
            name: index.key.name(),
            dimension: index.meta.as_ref().map(|m| m.dimension),
            items: index.meta.as_ref().map(|m| m.item_count as u64),
            placeholders: index.meta.as_ref().map(|m| m.placeholder_ids.len() as u64),
            size_bytes: index.size_bytes,
            built_at: index.meta.as_ref().map(|m| m.built_at),
        })
        .collect();

    println!("{}", table::render_indices_table(&rows));
    Ok(())
}

fn print_similar(
    style: &Style,
    key: &IndexKey,
    recording: &RecordingRef,
    similar: &SimilarRecordings,
    json: bool,
) -> Result<(), SimilarityError> {
    if json {
        println!("{}", serde_json::to_string_pretty(similar)?);
        return Ok(());
    }

    let rows: Vec<String> = match similar {
        SimilarRecordings::Recordings(recordings) => {
            recordings.iter().map(|r| r.to_string()).collect()
        }
        SimilarRecordings::Ids(ids) => ids.iter().map(|id| id.to_string()).collect(),
    };

    if rows.is_empty() {
        println!(
            "{}",
            style.message(
                MessageType::Skip,
                &format!("No similar recordings for {}", recording)
            )
        );
        return Ok(());
    }

    println!(
        "{}",
        style.section(&format!(
            "{} ({})",
            style.recording(&recording.to_string()),
            key
        ))
    );
    println!("{}", table::render_neighbours_table(&rows));
    Ok(())
}
