//! ndvimap CLI - per-field NDVI maps from Sentinel-2 scenes

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ndvimap_cloud::blocking::CatalogClientBlocking;
use ndvimap_core::io::read_geotiff;
use ndvimap_core::{Boundary, Raster};
use ndvimap_pipeline::search::CatalogSearcher;
use ndvimap_pipeline::{
    ArtifactLayout, ArtifactPolicy, CdseCatalog, FieldStore, JsonFieldStore, Pipeline,
    PipelineConfig,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ndvimap")]
#[command(author, version, about = "Per-field NDVI maps from Sentinel-2 scenes", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that take precedence over NDVIMAP_* variables and `.env`.
#[derive(Args)]
struct ConfigOverrides {
    /// Field store file
    #[arg(long, global = true)]
    fields_file: Option<PathBuf>,
    /// Directory receiving per-field artifacts
    #[arg(long, global = true)]
    artifact_dir: Option<PathBuf>,
    /// Scratch directory for downloads
    #[arg(long, global = true)]
    staging_dir: Option<PathBuf>,
    /// Days back from now to search for scenes
    #[arg(long, global = true)]
    window_days: Option<u32>,
    /// Maximum scene cloud cover in percent
    #[arg(long, global = true)]
    max_cloud: Option<f64>,
    /// What to do with leftover artifact directories: replace, fail
    #[arg(long, global = true)]
    policy: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every pending field
    Run,
    /// Manage field boundaries
    Fields {
        #[command(subcommand)]
        action: FieldCommands,
    },
    /// Show the scenes a field would be matched with, without downloading
    Search {
        /// Field id
        id: i64,
    },
    /// Print the preview image path of a processed field
    Preview {
        /// Field id
        id: i64,
    },
    /// Show information about an NDVI raster
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

#[derive(Subcommand)]
enum FieldCommands {
    /// Add a field from a GeoJSON file (Polygon, Feature or FeatureCollection)
    Add {
        /// Field name
        name: String,
        /// GeoJSON boundary in WGS84
        boundary: PathBuf,
    },
    /// List fields and their status
    List,
    /// Delete a field and its artifacts
    Delete {
        /// Field id
        id: i64,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_config(overrides: ConfigOverrides) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("Failed to read configuration")?;
    if let Some(v) = overrides.fields_file {
        config.fields_file = v;
    }
    if let Some(v) = overrides.artifact_dir {
        config.artifact_dir = v;
    }
    if let Some(v) = overrides.staging_dir {
        config.staging_dir = v;
    }
    if let Some(v) = overrides.window_days {
        config.date_window_days = v;
    }
    if let Some(v) = overrides.max_cloud {
        config.max_cloud_cover = v;
    }
    if let Some(v) = overrides.policy {
        config.artifact_policy = v.parse::<ArtifactPolicy>()?;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_store(config: &PipelineConfig) -> JsonFieldStore {
    JsonFieldStore::open(&config.fields_file)
        .with_artifacts(ArtifactLayout::new(&config.artifact_dir))
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let config = load_config(cli.overrides)?;

    match cli.command {
        // ── Run ──────────────────────────────────────────────────────
        Commands::Run => {
            let catalog = CdseCatalog::from_config(&config).context("Failed to create catalog client")?;
            let store = Arc::new(open_store(&config));
            let pipeline = Pipeline::new(config, Box::new(catalog), store)?;

            let pb = spinner("Processing fields...");
            let start = Instant::now();
            let result = pipeline.run();
            pb.finish_and_clear();
            let report = result.context("Pipeline run failed")?;

            println!("{}", report);
            for (id, reason) in &report.skipped {
                println!("  field {}: {}", id, reason);
            }
            println!("  Processing time: {:.2?}", start.elapsed());
        }

        // ── Fields ───────────────────────────────────────────────────
        Commands::Fields { action } => {
            let store = open_store(&config);
            match action {
                FieldCommands::Add { name, boundary } => {
                    let text = std::fs::read_to_string(&boundary)
                        .with_context(|| format!("Failed to read {}", boundary.display()))?;
                    let parsed: Boundary = text.parse().context("Invalid boundary GeoJSON")?;
                    let id = store.add_field(&name, parsed)?;
                    println!("Added field {} ({})", id, name);
                }
                FieldCommands::List => {
                    let fields = store.list_fields()?;
                    if fields.is_empty() {
                        println!("No fields");
                    }
                    for field in fields {
                        let status = if field.status { "done" } else { "pending" };
                        println!("{:>6}  {:<8}  {}", field.id, status, field.name);
                    }
                }
                FieldCommands::Delete { id } => {
                    store.delete_field(id)?;
                    println!("Deleted field {}", id);
                }
            }
        }

        // ── Search ───────────────────────────────────────────────────
        Commands::Search { id } => {
            let store = open_store(&config);
            let field = store
                .list_fields()?
                .into_iter()
                .find(|f| f.id == id)
                .with_context(|| format!("No field {}", id))?;

            let client = CatalogClientBlocking::new(config.endpoints(), config.client_options())?;
            let query = CatalogSearcher::new(&config).query(&field, Utc::now());
            info!(
                "Query length: {} (limit {})",
                client.query_length(&query)?,
                client.max_query_length()
            );

            let pb = spinner("Searching catalog...");
            let scenes = client.search(&query);
            pb.finish_and_clear();
            let scenes = scenes.context("Catalog search failed")?;

            if scenes.is_empty() {
                println!("No scene within {} days under {}% cloud", config.date_window_days, config.max_cloud_cover);
            }
            for scene in scenes {
                println!(
                    "{:>6.2}%  {}  {}",
                    scene.cloud_cover,
                    scene.acquisition_date.format("%Y-%m-%d"),
                    scene.filename
                );
            }
        }

        // ── Preview ──────────────────────────────────────────────────
        Commands::Preview { id } => {
            let layout = ArtifactLayout::new(&config.artifact_dir);
            let path = layout
                .preview_path(id)
                .with_context(|| format!("Field {} has no preview yet", id))?;
            println!("{}", path.display());
        }

        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let pb = spinner("Reading raster...");
            let raster: Raster<f32> = read_geotiff(&input, None).context("Failed to read raster")?;
            pb.finish_and_clear();

            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            match raster.valid_range() {
                Some((min, max, count)) => {
                    println!("\nStatistics:");
                    println!("  Min: {:.4}", min);
                    println!("  Max: {:.4}", max);
                    println!(
                        "  Valid cells: {} ({:.1}%)",
                        count,
                        100.0 * count as f64 / raster.len() as f64
                    );
                }
                None => println!("\nNo valid cells"),
            }
        }
    }

    Ok(())
}
