use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use influence_layout::analytics::{
    CategoryCount, CategoryKey, distribution_by_category, distribution_by_relation,
    network_stats, rank_by_connectivity, rank_by_influence,
};
use influence_layout::controller::{Controller, NodeFilter};
use influence_layout::engine::{EngineOptions, ForceConfigPatch};
use influence_layout::graph::{Dimensions, GraphData, parse_graph_json};
use influence_layout::placement::{DEFAULT_ERA_ORDER, PlacementOptions, place_radial_by_era};
use influence_layout::util::format_progress;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LayoutMode {
    /// Batched force simulation.
    Force,
    /// Nodes pinned on a circle in era order.
    Radial,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Category {
    Era,
    Community,
    School,
}

impl From<Category> for CategoryKey {
    fn from(category: Category) -> Self {
        match category {
            Category::Era => Self::Era,
            Category::Community => Self::Community,
            Category::School => Self::School,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Graph JSON with `nodes` and `links` (or `edges`).
    input: PathBuf,
    #[arg(long, default_value_t = 1000.0)]
    width: f64,
    #[arg(long, default_value_t = 800.0)]
    height: f64,
    #[arg(long, value_enum, default_value_t = LayoutMode::Force)]
    layout: LayoutMode,
    #[arg(long)]
    iterations: Option<usize>,
    #[arg(long, allow_hyphen_values = true)]
    charge_strength: Option<f64>,
    #[arg(long)]
    link_distance: Option<f64>,
    #[arg(long)]
    collision_padding: Option<f64>,
    #[arg(long, default_value_t = 10)]
    batch_size: usize,
    /// Place nodes without the per-id offset.
    #[arg(long)]
    no_jitter: bool,
    /// Lay out only nodes whose category value equals this.
    #[arg(long)]
    only: Option<String>,
    #[arg(long, default_value_t = 10)]
    top: usize,
    #[arg(long, value_enum, default_value_t = Category::Era)]
    category: Category,
    /// Where to write the positioned graph; stdout when omitted.
    #[arg(long, short)]
    output: Option<PathBuf>,
    #[arg(long, default_value_t = 5000)]
    stall_timeout_ms: u64,
}

impl Args {
    fn config(&self) -> ForceConfigPatch {
        ForceConfigPatch {
            charge_strength: self.charge_strength,
            link_distance: self.link_distance,
            collision_padding: self.collision_padding,
            iterations: self.iterations,
            ..ForceConfigPatch::default()
        }
    }

    fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            batch_size: self.batch_size,
            placement: if self.no_jitter {
                PlacementOptions::without_jitter()
            } else {
                PlacementOptions::default()
            },
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let data = parse_graph_json(&raw)
        .with_context(|| format!("failed to parse graph from {}", args.input.display()))?;
    let dimensions = Dimensions::new(args.width, args.height);

    let laid_out = match args.layout {
        LayoutMode::Force => run_force_layout(&args, data.clone(), dimensions)?,
        LayoutMode::Radial => {
            let mut nodes = data.nodes.clone();
            place_radial_by_era(&mut nodes, dimensions, &DEFAULT_ERA_ORDER);
            GraphData {
                nodes,
                links: data.links.clone(),
            }
        }
    };

    print_tables(&args, &data)?;
    write_graph(&laid_out, args.output.as_ref())
}

fn run_force_layout(args: &Args, data: GraphData, dimensions: Dimensions) -> Result<GraphData> {
    let mut controller = Controller::new(
        args.engine_options(),
        Duration::from_millis(args.stall_timeout_ms),
    )
    .context("failed to start layout engine")?;
    controller
        .load(data, dimensions, args.config())
        .context("failed to start layout")?;
    if let Some(value) = &args.only {
        controller
            .filter(NodeFilter::new(args.category.into(), value.clone()))
            .context("failed to apply filter")?;
    }

    let nodes = controller
        .wait_until_settled(|progress| info!("layout {}", format_progress(progress)))
        .context("layout did not settle")?
        .to_vec();
    Ok(GraphData {
        nodes,
        links: controller.view().links.clone(),
    })
}

fn print_counts(out: &mut impl Write, title: &str, counts: &[CategoryCount]) -> io::Result<()> {
    writeln!(out, "\n{title}")?;
    for entry in counts {
        writeln!(out, "  {:<32} {:>6}", entry.value, entry.count)?;
    }
    Ok(())
}

fn print_tables(args: &Args, data: &GraphData) -> Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    let stats = network_stats(&data.nodes, &data.links);
    writeln!(
        out,
        "{} nodes, {} links, density {:.4}",
        stats.node_count, stats.link_count, stats.density
    )?;

    writeln!(out, "\nmost influential")?;
    for (rank, entry) in rank_by_influence(&data.nodes, args.top).iter().enumerate() {
        writeln!(out, "  {:>3}. {:<32} {:>8.2}", rank + 1, entry.name, entry.score)?;
    }

    writeln!(out, "\nmost connected")?;
    for (rank, entry) in rank_by_connectivity(&data.nodes, &data.links, args.top)
        .iter()
        .enumerate()
    {
        writeln!(
            out,
            "  {:>3}. {:<32} {:>8}",
            rank + 1,
            entry.name,
            entry.connections
        )?;
    }

    let key = CategoryKey::from(args.category);
    print_counts(
        &mut out,
        &format!("by {}", key.label()),
        &distribution_by_category(&data.nodes, key, Some(args.top)),
    )?;
    print_counts(&mut out, "by relation", &distribution_by_relation(&data.links))?;
    Ok(())
}

fn write_graph(data: &GraphData, output: Option<&PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("failed to serialize positions")?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote {} nodes to {}", data.nodes.len(), path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            writeln!(out, "{json}").context("failed to write positions")?;
        }
    }
    Ok(())
}
