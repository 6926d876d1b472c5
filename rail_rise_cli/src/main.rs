use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use nalgebra::Point3;
use ordered_float::OrderedFloat;
use plotters::coord::Shift;
use plotters::prelude::*;
use rail_rise::helix::HelixFrame;
use rail_rise::{
    build_rise_table, classify_rise, diagnose_profile, integer_rise_points, load_overrides,
    load_params, Params, RiseOverrides, RiseTable,
};
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Spiral handrail rise profile CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the rise table CSV/plots for one or more parameter files
    Table(TableArgs),
    /// Evaluate the rise at specific arc distances
    Query(QueryArgs),
    /// Report scaling diagnostics for parameter files
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct TableArgs {
    /// Handrail parameter JSON files
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output CSV path (`-` for stdout; single input only)
    #[arg(short, long, default_value = "rise.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output PNG figure path (defaults next to CSV)
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Disable plot generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Manual rise override JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    overrides: Option<PathBuf>,

    /// Arc sampling step (inches)
    #[arg(long, default_value_t = 0.5)]
    step: f64,

    /// Skip the integer-arc calculated fill between overrides
    #[arg(long, action = ArgAction::SetTrue)]
    no_fill: bool,

    /// Append helix centerline x/y/z columns
    #[arg(long, action = ArgAction::SetTrue)]
    centerline: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct QueryArgs {
    /// Handrail parameter JSON file
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Arc distances to evaluate (comma separated inches)
    #[arg(long, required = true)]
    at: String,

    /// Manual rise override JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    overrides: Option<PathBuf>,

    /// Skip the integer-arc calculated fill between overrides
    #[arg(long, action = ArgAction::SetTrue)]
    no_fill: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Handrail parameter JSON files
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Manual rise override JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    overrides: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Table(args) => args.verbose,
        Command::Query(args) => args.verbose,
        Command::Check(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Table(args) => handle_table(args),
        Command::Query(args) => handle_query(args),
        Command::Check(args) => handle_check(args),
    }
}

fn handle_table(args: TableArgs) -> Result<()> {
    let manual = load_manual(args.overrides.as_ref())?;

    let jobs: Vec<(PathBuf, Params)> = args
        .inputs
        .iter()
        .map(|path| {
            let params = load_params(path)
                .with_context(|| format!("failed to load parameters from {}", path.display()))?;
            Ok((path.clone(), params))
        })
        .collect::<Result<Vec<_>>>()?;

    let t_compute = Instant::now();
    let tables: Vec<(PathBuf, RiseTable)> = jobs
        .par_iter()
        .map(|(path, params)| {
            build_rise_table(params, &manual, args.step, !args.no_fill)
                .map(|table| (path.clone(), table))
                .map_err(|e| anyhow!("{}: {}", path.display(), e))
        })
        .collect::<Result<Vec<_>>>()?;
    if args.verbose {
        info!(
            "Compute stage: {:.1} ms ({} table(s))",
            t_compute.elapsed().as_secs_f64() * 1000.0,
            tables.len()
        );
    }

    let single = tables.len() == 1;
    for (input, table) in &tables {
        let centerline = if args.centerline {
            let frame = HelixFrame::for_params(&table.params)
                .map_err(|e| anyhow!("{}: {}", input.display(), e))?;
            Some(frame.centerline(&table.points))
        } else {
            None
        };

        info!(
            "Rise table for {}: {} points, end rise {:.3}\", {} manual override(s)",
            input.display(),
            table.points.len(),
            table.end_rise,
            table.manual_count
        );

        if single && args.output.as_os_str() == "-" {
            write_table_stdout(table, centerline.as_deref())?;
            if !args.no_plot {
                if let Some(path) = args.png.as_ref() {
                    render_chart_guard(table, &manual, path, ChartKind::Png);
                }
                if let Some(path) = args.svg.as_ref() {
                    render_chart_guard(table, &manual, path, ChartKind::Svg);
                }
            }
            continue;
        }

        let csv_path = if single {
            args.output.clone()
        } else {
            sibling_csv(input)
        };
        write_table_csv(table, centerline.as_deref(), &csv_path)?;
        info!("Wrote rise table CSV: {}", csv_path.display());

        if args.no_plot {
            continue;
        }
        let png_path = if single {
            args.png
                .clone()
                .unwrap_or_else(|| csv_path.with_extension("png"))
        } else {
            csv_path.with_extension("png")
        };
        render_chart_guard(table, &manual, &png_path, ChartKind::Png);
        if single {
            if let Some(path) = args.svg.as_ref() {
                render_chart_guard(table, &manual, path, ChartKind::Svg);
            }
        }
    }

    Ok(())
}

fn handle_query(args: QueryArgs) -> Result<()> {
    let params = load_params(&args.input)
        .with_context(|| format!("failed to load parameters from {}", args.input.display()))?;
    let manual = load_manual(args.overrides.as_ref())?;
    let calculated = if manual.is_empty() || args.no_fill {
        RiseOverrides::new()
    } else {
        integer_rise_points(&params)
    };

    let mut arcs = parse_arc_list(&args.at)?;
    arcs.sort_by_key(|a| OrderedFloat(*a));
    arcs.dedup_by_key(|a| OrderedFloat(*a));

    println!("{:>10}  {:>10}  source", "arc_in", "rise_in");
    for arc in arcs {
        let (rise, origin) = classify_rise(
            arc,
            &manual,
            &calculated,
            params.total_arc_distance,
            params.total_helical_rise,
            params.pitch_block,
        );
        println!("{arc:>10.3}  {rise:>10.4}  {origin}");
    }
    Ok(())
}

fn handle_check(args: CheckArgs) -> Result<()> {
    let manual = load_manual(args.overrides.as_ref())?;
    for input in &args.inputs {
        let params = load_params(input)
            .with_context(|| format!("failed to load parameters from {}", input.display()))?;
        let hash = params.params_hash_sha256().map_err(|e| anyhow!("{e}"))?;
        let diag = diagnose_profile(&params, &manual);
        println!("{}:", input.display());
        println!("  params hash        {hash}");
        println!("  arc scale          {:.6}", diag.arc_scale);
        println!("  rise scale         {:.6}", diag.rise_scale);
        println!("  pitch block offset {:+.4} in", diag.pitch_block_offset);
        println!("  extrapolation rate {:.6} in/in", diag.extrapolation_rate);
        println!("  start rise         {:.4} in", diag.start_rise);
        println!("  end rise           {:.4} in", diag.end_rise);
        println!("  monotonic          {}", if diag.monotonic { "yes" } else { "no" });
        println!(
            "  overrides          {} used, {} ignored",
            diag.overrides_used, diag.overrides_ignored
        );
        for warning in &diag.warnings {
            warn!("{}: {}", input.display(), warning);
        }
    }
    Ok(())
}

fn load_manual(path: Option<&PathBuf>) -> Result<RiseOverrides> {
    match path {
        Some(path) => {
            let overrides = load_overrides(path)
                .with_context(|| format!("failed to load overrides from {}", path.display()))?;
            info!(
                "Loaded {} manual override(s) from {}",
                overrides.len(),
                path.display()
            );
            Ok(overrides)
        }
        None => Ok(RiseOverrides::new()),
    }
}

fn parse_arc_list(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for token in text.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let value: f64 = token
            .parse()
            .with_context(|| format!("invalid arc distance '{token}'"))?;
        out.push(value);
    }
    if out.is_empty() {
        return Err(anyhow!("--at list was empty"));
    }
    Ok(out)
}

fn sibling_csv(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("rail");
    input.with_file_name(format!("{stem}_rise.csv"))
}

fn write_table_stdout(table: &RiseTable, centerline: Option<&[Point3<f64>]>) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_table_rows(table, centerline, &mut writer)
}

fn write_table_csv(
    table: &RiseTable,
    centerline: Option<&[Point3<f64>]>,
    path: &Path,
) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_table_rows(table, centerline, &mut writer)
}

fn write_table_rows<W: Write>(
    table: &RiseTable,
    centerline: Option<&[Point3<f64>]>,
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    match centerline {
        Some(points) => {
            writer.write_record(["arc_in", "rise_in", "x_in", "y_in", "z_in"])?;
            for (sample, point) in table.points.iter().zip(points.iter()) {
                writer.write_record([
                    format!("{:.4}", sample.arc),
                    format!("{:.4}", sample.rise),
                    format!("{:.4}", point.x),
                    format!("{:.4}", point.y),
                    format!("{:.4}", point.z),
                ])?;
            }
        }
        None => {
            writer.write_record(["arc_in", "rise_in"])?;
            for sample in &table.points {
                writer.write_record([
                    format!("{:.4}", sample.arc),
                    format!("{:.4}", sample.rise),
                ])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

#[derive(Copy, Clone, Debug)]
enum ChartKind {
    Png,
    Svg,
}

fn render_chart_guard(table: &RiseTable, manual: &RiseOverrides, path: &Path, kind: ChartKind) {
    match render_chart(table, manual, path, kind) {
        Ok(()) => info!("Wrote plot: {}", path.display()),
        Err(err) => warn!("Skipping plot render ({}): {}", path.display(), err),
    }
}

fn render_chart(
    table: &RiseTable,
    manual: &RiseOverrides,
    path: &Path,
    kind: ChartKind,
) -> Result<()> {
    let size = (960, 640);
    let result = match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, size).into_drawing_area();
            draw_rise_chart(&root, table, manual)
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, size).into_drawing_area();
            draw_rise_chart(&root, table, manual)
        }
    };
    result.map_err(|message| anyhow!("{message}"))
}

fn draw_rise_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    table: &RiseTable,
    manual: &RiseOverrides,
) -> Result<(), String> {
    root.fill(&WHITE).map_err(|e| e.to_string())?;

    let max_arc = table
        .points
        .last()
        .map(|p| p.arc)
        .unwrap_or(1.0)
        .max(1e-6);
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for p in &table.points {
        y_min = y_min.min(p.rise);
        y_max = y_max.max(p.rise);
    }
    if !y_min.is_finite() || !y_max.is_finite() {
        return Err("no finite rise values to plot".into());
    }
    let pad = ((y_max - y_min) * 0.05).max(0.25);

    let caption = format!(
        "Rise profile ({:.0} deg, {:.2} in arc)",
        table.params.total_degrees, table.params.total_arc_distance
    );
    let mut chart = ChartBuilder::on(root)
        .caption(caption, ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(44)
        .y_label_area_size(56)
        .build_cartesian_2d(0.0..max_arc * 1.02, (y_min - pad)..(y_max + pad))
        .map_err(|e| e.to_string())?;
    chart
        .configure_mesh()
        .x_desc("Arc distance (in)")
        .y_desc("Rise (in)")
        .draw()
        .map_err(|e| e.to_string())?;

    chart
        .draw_series(LineSeries::new(
            table.points.iter().map(|p| (p.arc, p.rise)),
            &BLUE,
        ))
        .map_err(|e| e.to_string())?
        .label("rise")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], BLUE));

    if !manual.is_empty() {
        let span = table.params.total_arc_distance;
        chart
            .draw_series(
                manual
                    .iter()
                    .filter(|(arc, _)| *arc <= span)
                    .map(|(arc, rise)| Circle::new((arc, rise), 4, RED.filled())),
            )
            .map_err(|e| e.to_string())?
            .label("manual override")
            .legend(|(x, y)| Circle::new((x + 9, y), 4, RED.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.85))
        .border_style(&BLACK)
        .draw()
        .map_err(|e| e.to_string())?;
    root.present().map_err(|e| e.to_string())?;
    Ok(())
}
