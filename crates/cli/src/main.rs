//! Sightline CLI - line-of-sight and radial visibility analysis

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use geo_types::Point;
use sightline_analysis::sector::{ring_sector_mask, RingSectorSpec};
use sightline_analysis::surface::RasterSurface;
use sightline_analysis::viewshed::{cumulative_radial_viewshed, RadialViewshedParams};
use sightline_analysis::visibility::{aggregate_visibility, AggregationParams};
use sightline_core::io::{read_geotiff, write_geotiff};
use sightline_core::{Error, Raster};

mod config;
use config::{AppConfig, CoordinateFormat};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "sightline")]
#[command(author, version, about = "Line-of-sight and radial visibility analysis", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration side-car file
    #[arg(long, global = true, default_value = "sightline.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a surface raster
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Aggregate line-of-sight visibility between observers and targets
    Los {
        /// Input surface (GeoTIFF)
        surface: PathBuf,
        /// Observer points file (JSON array of [x, y] pairs)
        observers: PathBuf,
        /// Target points file (JSON array of [x, y] pairs)
        targets: PathBuf,
        /// Observer height above the surface
        #[arg(long, default_value = "2.0")]
        observer_offset: f64,
        /// Target height above the surface
        #[arg(long, default_value = "0.0")]
        target_offset: f64,
        /// Disable Earth-curvature/refraction correction
        #[arg(long)]
        no_curvature: bool,
    },
    /// Compute a radial viewshed (observer counts) within a range fan
    Rlos {
        /// Input surface (GeoTIFF)
        surface: PathBuf,
        /// Observer points file (JSON array of [x, y] pairs)
        observers: PathBuf,
        /// Output viewshed raster (GeoTIFF)
        output: PathBuf,
        /// Minimum visible range in map units
        #[arg(long, default_value = "0.0")]
        inner_radius: f64,
        /// Maximum visible range in map units
        #[arg(long, default_value = "1000.0")]
        outer_radius: f64,
        /// Start of the bearing span in compass degrees
        #[arg(long, default_value = "0.0")]
        start_bearing: f64,
        /// End of the bearing span in compass degrees
        #[arg(long, default_value = "360.0")]
        end_bearing: f64,
        /// Observer height above the surface
        #[arg(long, default_value = "2.0")]
        observer_offset: f64,
        /// Disable Earth-curvature/refraction correction
        #[arg(long)]
        no_curvature: bool,
    },
    /// Build a ring-sector mask polygon
    Sector {
        /// Center X in map units
        x: f64,
        /// Center Y in map units
        y: f64,
        /// Inner radius in map units
        #[arg(long, default_value = "0.0")]
        inner_radius: f64,
        /// Outer radius in map units
        #[arg(long)]
        outer_radius: f64,
        /// Start of the bearing span in compass degrees
        #[arg(long, default_value = "0.0")]
        start_bearing: f64,
        /// End of the bearing span in compass degrees
        #[arg(long, default_value = "360.0")]
        end_bearing: f64,
        /// Output file (GeoJSON); stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show or change display settings
    Config {
        /// Coordinate format: decimal-degrees or degrees-minutes-seconds
        #[arg(long)]
        coordinate_format: Option<String>,
    },
}

// ─── Entry point ────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose)?;

    let app_config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Info { input } => run_info(&input, &app_config),
        Commands::Los {
            surface,
            observers,
            targets,
            observer_offset,
            target_offset,
            no_curvature,
        } => run_los(
            &surface,
            &observers,
            &targets,
            observer_offset,
            target_offset,
            !no_curvature,
            &app_config,
        ),
        Commands::Rlos {
            surface,
            observers,
            output,
            inner_radius,
            outer_radius,
            start_bearing,
            end_bearing,
            observer_offset,
            no_curvature,
        } => run_rlos(
            &surface,
            &observers,
            &output,
            RadialViewshedParams {
                inner_radius,
                outer_radius,
                start_bearing,
                end_bearing,
                observer_offset,
                curvature: !no_curvature,
                ..Default::default()
            },
        ),
        Commands::Sector {
            x,
            y,
            inner_radius,
            outer_radius,
            start_bearing,
            end_bearing,
            output,
        } => run_sector(
            RingSectorSpec {
                center: Point::new(x, y),
                inner_radius,
                outer_radius,
                start_bearing,
                end_bearing,
            },
            output.as_deref(),
        ),
        Commands::Config { coordinate_format } => {
            run_config(&cli.config, app_config, coordinate_format)
        }
    }
}

fn setup_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

// ─── Command handlers ───────────────────────────────────────────────────

fn run_info(input: &Path, app_config: &AppConfig) -> Result<()> {
    let raster: Raster<f64> = read_geotiff(input)
        .with_context(|| format!("reading surface {}", input.display()))?;

    let (rows, cols) = raster.shape();
    let (min_x, min_y, max_x, max_y) = raster.bounds();
    let stats = raster.statistics();

    println!("File:      {}", input.display());
    println!("Size:      {} rows x {} cols", rows, cols);
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Extent:    {} .. {}",
        app_config.format_point(min_x, min_y),
        app_config.format_point(max_x, max_y)
    );
    if let Some(crs) = raster.crs() {
        println!("CRS:       {}", crs);
    }
    match (stats.min, stats.max, stats.mean) {
        (Some(min), Some(max), Some(mean)) => {
            println!("Values:    min {:.3}, max {:.3}, mean {:.3}", min, max, mean);
        }
        _ => println!("Values:    no valid cells"),
    }
    println!(
        "Cells:     {} valid, {} void",
        stats.valid_count, stats.nodata_count
    );
    Ok(())
}

fn run_los(
    surface_path: &Path,
    observers_path: &Path,
    targets_path: &Path,
    observer_offset: f64,
    target_offset: f64,
    curvature: bool,
    app_config: &AppConfig,
) -> Result<()> {
    let dem = load_surface(surface_path)?;
    let observers = read_points(observers_path)?;
    let targets = read_points(targets_path)?;

    if observers.is_empty() {
        bail!("no observer points in {}", observers_path.display());
    }
    if targets.is_empty() {
        bail!("no target points in {}", targets_path.display());
    }

    let surface = RasterSurface::new(&dem)?.with_curvature(curvature);
    let params = AggregationParams {
        observer_offset,
        target_offset,
        record_sightlines: true,
    };

    let start = Instant::now();
    let spinner = spinner(format!(
        "Evaluating {} sightlines...",
        observers.len() * targets.len()
    ));
    let aggregate = aggregate_visibility(&surface, &observers, &targets, &params);
    spinner.finish_and_clear();
    info!("Aggregation finished in {:.2?}", start.elapsed());

    println!("Observers ({}):", observers.len());
    for (i, point) in observers.iter().enumerate() {
        let label = match aggregate.observer_sees.get(&i) {
            Some(true) => "sees at least one target",
            Some(false) => "sees no targets",
            None => "skipped (void elevation)",
        };
        println!(
            "  [{}] {}  {}",
            i,
            app_config.format_point(point.x(), point.y()),
            label
        );
    }

    println!("Targets ({}):", targets.len());
    for (i, point) in targets.iter().enumerate() {
        let label = if aggregate.skipped_targets.contains(&i) {
            "skipped (void elevation)".to_string()
        } else {
            let count = aggregate.target_observer_count.get(&i).copied().unwrap_or(0);
            format!("seen by {} observer(s)", count)
        };
        println!(
            "  [{}] {}  {}",
            i,
            app_config.format_point(point.x(), point.y()),
            label
        );
    }

    let blocked = aggregate
        .sightlines
        .iter()
        .filter(|record| !record.line.is_visible)
        .count();
    println!(
        "Sightlines: {} evaluated, {} obstructed",
        aggregate.sightlines.len(),
        blocked
    );

    if aggregate.skipped_count() > 0 {
        println!(
            "Warning: {} point(s) fell on void elevation and were skipped; coverage may be under-reported",
            aggregate.skipped_count()
        );
    }

    Ok(())
}

fn run_rlos(
    surface_path: &Path,
    observers_path: &Path,
    output: &Path,
    params: RadialViewshedParams,
) -> Result<()> {
    let dem = load_surface(surface_path)?;
    let observers = read_points(observers_path)?;
    if observers.is_empty() {
        bail!("no observer points in {}", observers_path.display());
    }

    let start = Instant::now();
    let spinner = spinner(format!("Computing viewshed for {} observer(s)...", observers.len()));
    let result = cumulative_radial_viewshed(&dem, &observers, &params)?;
    spinner.finish_and_clear();
    info!("Viewshed finished in {:.2?}", start.elapsed());

    if !result.skipped_observers.is_empty() {
        println!(
            "Warning: {} observer(s) off the surface or on void cells were skipped: {:?}",
            result.skipped_observers.len(),
            result.skipped_observers
        );
    }

    write_geotiff(&result.counts, output, None)
        .with_context(|| format!("writing viewshed {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn run_sector(spec: RingSectorSpec, output: Option<&Path>) -> Result<()> {
    let mask = ring_sector_mask(&spec);

    let coordinates: Vec<Vec<Vec<[f64; 2]>>> = mask
        .0
        .iter()
        .map(|polygon| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors().iter())
                .map(|ring| ring.0.iter().map(|c| [c.x, c.y]).collect())
                .collect()
        })
        .collect();

    let geojson = serde_json::json!({
        "type": "MultiPolygon",
        "coordinates": coordinates,
    });
    let rendered = serde_json::to_string_pretty(&geojson)?;

    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("writing mask {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn run_config(
    path: &Path,
    mut app_config: AppConfig,
    coordinate_format: Option<String>,
) -> Result<()> {
    match coordinate_format {
        Some(value) => {
            app_config.coordinate_format = match value.as_str() {
                "decimal-degrees" | "dd" => CoordinateFormat::DecimalDegrees,
                "degrees-minutes-seconds" | "dms" => CoordinateFormat::DegreesMinutesSeconds,
                other => bail!("unknown coordinate format '{other}'"),
            };
            app_config.save(path)?;
            println!("Saved {}", path.display());
        }
        None => {
            println!("coordinate_format: {:?}", app_config.coordinate_format);
        }
    }
    Ok(())
}

// ─── Shared helpers ─────────────────────────────────────────────────────

/// Load a surface and refuse geographic coordinate systems: line-of-sight
/// distances are meaningless in angular units.
fn load_surface(path: &Path) -> Result<Raster<f64>> {
    let dem: Raster<f64> =
        read_geotiff(path).with_context(|| format!("reading surface {}", path.display()))?;

    if let Some(crs) = dem.crs() {
        if crs.is_geographic() {
            return Err(Error::SurfaceNotProjected(crs.to_string()))
                .with_context(|| format!("surface {}", path.display()));
        }
    }
    Ok(dem)
}

/// Read a JSON array of [x, y] pairs as points.
fn read_points(path: &Path) -> Result<Vec<Point<f64>>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading points {}", path.display()))?;
    let pairs: Vec<[f64; 2]> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing points {}", path.display()))?;
    Ok(pairs.into_iter().map(|[x, y]| Point::new(x, y)).collect())
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
