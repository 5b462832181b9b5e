use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use poasta_tools::plot::{run_plot, Colormap, PlotOpt, RenderOpt};
use poasta_tools::util::logging;

/// Plot A* search matrices from a POASTA debug output directory
#[derive(Parser, Debug)]
#[command(name = "poasta_plot", author, version, arg_required_else_help = true)]
struct Cli {
    /// Debug output directory, or a single visited-state TSV file
    input: PathBuf,

    /// Only plot these sequences (repeatable)
    #[arg(short = 's', long = "sequence")]
    sequences: Vec<String>,

    /// DOT graph used to order matrix rows (overrides graph_for_<seq>.dot)
    #[arg(short = 'g', long)]
    graph: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Also write an animated GIF with one frame per A* iteration
    #[arg(short, long)]
    animate: bool,

    /// Also write one PNG per A* iteration
    #[arg(long = "each-iteration")]
    each_iteration: bool,

    /// Delay between animation frames in milliseconds
    #[arg(long = "frame-delay", default_value_t = 250)]
    frame_delay: u32,

    /// Pixel size of one matrix cell
    #[arg(long = "cell-size", default_value_t = 4)]
    cell_size: u32,

    /// Maximum panel size in pixels; larger matrices are downsampled
    #[arg(long = "max-dim", default_value_t = 4096)]
    max_dim: u32,

    /// Colormap: viridis or magma
    #[arg(long, default_value = "viridis", value_parser = Colormap::parse)]
    colormap: Colormap,

    /// Render the sequence's graph to <seq>.graph.svg with graphviz
    #[arg(long = "graph-image")]
    graph_image: bool,

    /// Number of threads (default: all available cores)
    #[arg(short = 't', long = "threads", default_value_t = 0)]
    threads: usize,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let opt = PlotOpt {
        input: cli.input,
        sequences: cli.sequences,
        graph: cli.graph,
        output_dir: cli.output,
        animate: cli.animate,
        each_iteration: cli.each_iteration,
        frame_delay_ms: cli.frame_delay,
        graph_image: cli.graph_image,
        render: RenderOpt {
            cell_size: cli.cell_size,
            max_dim: cli.max_dim,
            colormap: cli.colormap,
            ..RenderOpt::default()
        },
        threads: cli.threads,
    };

    let summaries = run_plot(&opt)?;
    for s in &summaries {
        for path in &s.outputs {
            println!("{}", path.display());
        }
    }
    Ok(())
}
