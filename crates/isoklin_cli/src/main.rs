mod config;
mod svg;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::{load_spec, parse_param, parse_range, parse_ratio_extremes, SpecOverrides};
use isoklin_core::equation_engine::parse_equation;
use isoklin_core::field::RatioExtremes;
use isoklin_core::implicit::{solve_for_derivative, RootPolicy, Solutions, Symbols};
use isoklin_core::plot::{build_plot, PlotSpec};
use isoklin_core::sink::SnapshotSink;
use std::fs;
use std::path::{Path, PathBuf};
use svg::SvgSink;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "isoklin")]
#[command(about = "Isoklin - slope fields and isoclines of first-order ODEs", long_about = None)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve an implicit equation F(x, y, dy) = 0 for dy
    Solve {
        /// Equation, e.g. "y*(dy + x) - 1 = 0"
        equation: String,
        /// Root to report as the chosen one
        #[arg(long, default_value_t = 0)]
        root: usize,
        #[arg(long, default_value = "x")]
        independent: String,
        #[arg(long, default_value = "y")]
        dependent: String,
        #[arg(long, default_value = "dy")]
        derivative: String,
    },
    /// Evaluate a slope field and write the plot
    Field(FieldArgs),
}

#[derive(clap::Args)]
struct FieldArgs {
    /// YAML plot spec; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Right-hand side f(x, y), or F(x, y, dy) with --implicit
    #[arg(short, long)]
    equation: Option<String>,
    /// Treat the equation as implicit in dy
    #[arg(long)]
    implicit: bool,
    /// Plot range as "min,max"
    #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
    x_range: Option<(f64, f64)>,
    #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
    y_range: Option<(f64, f64)>,
    /// Samples per axis
    #[arg(short, long)]
    resolution: Option<usize>,
    #[arg(short, long)]
    num_isoclines: Option<usize>,
    /// Hue offset in [0, 1)
    #[arg(long)]
    hue_shift: Option<f64>,
    /// finite_only or literal
    #[arg(long, value_parser = parse_ratio_extremes)]
    ratio_extremes: Option<RatioExtremes>,
    /// Equation parameter as name=value (repeatable)
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, f64)>,
    /// Index of the root to plot when the implicit equation has several
    #[arg(long)]
    root: Option<usize>,
    #[arg(long)]
    title: Option<String>,
    /// Do not label isocline contours
    #[arg(long)]
    no_labels: bool,
    /// SVG output path
    #[arg(long, default_value = "slope_field.svg")]
    svg: PathBuf,
    /// Skip the SVG output
    #[arg(long)]
    no_svg: bool,
    /// Also write the evaluated field as JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Solve {
            equation,
            root,
            independent,
            dependent,
            derivative,
        } => {
            let symbols = Symbols {
                independent,
                dependent,
                derivative,
            };
            cmd_solve(&equation, &symbols, root)
        }
        Commands::Field(args) => cmd_field(args),
    }
}

fn cmd_solve(text: &str, symbols: &Symbols, root: usize) -> Result<()> {
    let equation = parse_equation(text).context("failed to parse equation")?;
    println!("Equation: {equation}");

    match solve_for_derivative(&equation, symbols)? {
        Solutions::Empty(reason) => bail!("no solution for {}: {reason}", symbols.derivative),
        solutions @ Solutions::Roots(_) => {
            for (index, expr) in solutions.roots().iter().enumerate() {
                println!("  [{index}] {} = {expr}", symbols.derivative);
            }
            match solutions.select(RootPolicy::Index(root)) {
                Some(chosen) => println!("Chosen root [{root}]: {} = {chosen}", symbols.derivative),
                None => bail!(
                    "root index {root} out of range ({} roots)",
                    solutions.roots().len()
                ),
            }
        }
    }
    Ok(())
}

fn cmd_field(args: FieldArgs) -> Result<()> {
    let mut spec = match &args.config {
        Some(path) => load_spec(path)?,
        None => PlotSpec::default(),
    };
    SpecOverrides {
        equation: args.equation,
        implicit: args.implicit,
        x_range: args.x_range,
        y_range: args.y_range,
        resolution: args.resolution,
        num_isoclines: args.num_isoclines,
        hue_shift: args.hue_shift,
        ratio_extremes: args.ratio_extremes,
        params: args.params,
        root: args.root,
        title: args.title,
        no_labels: args.no_labels,
    }
    .apply(&mut spec);

    let plot = build_plot(&spec).with_context(|| format!("cannot plot '{}'", spec.equation))?;
    println!("dy/dx = {}", plot.derivative);
    println!("Isocline levels: {:?}", plot.field.levels);

    if !args.no_svg {
        let document = plot.render(&mut SvgSink::default())?;
        write_output(&args.svg, &document)?;
    }
    if let Some(path) = &args.json {
        let snapshot = plot.render(&mut SnapshotSink)?;
        let json = serde_json::to_string_pretty(&snapshot)?;
        write_output(path, &json)?;
    }
    Ok(())
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = contents.len(), "wrote output");
    println!("Wrote {}", path.display());
    Ok(())
}
