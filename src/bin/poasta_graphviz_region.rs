use anyhow::{bail, Result};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use poasta_tools::io::fasta;
use poasta_tools::io::graphviz::OutputFormat;
use poasta_tools::region::{run_region, HighlightStyle, RegionOpt, RegionSpec};
use poasta_tools::util::logging;

/// Extract and highlight a region of a POA graph DOT file (as written by `poasta view -O dot`)
#[derive(Parser, Debug)]
#[command(name = "poasta_graphviz_region", author, version, arg_required_else_help = true)]
#[command(group(
    ArgGroup::new("region")
        .required(true)
        .args(["node", "ranks", "sequence", "fasta"])
))]
struct Cli {
    /// GraphViz DOT file
    graph: PathBuf,

    /// Center the region on this node id
    #[arg(short = 'n', long)]
    node: Option<String>,

    /// Topological rank window START-END (end exclusive)
    #[arg(short = 'r', long, value_parser = parse_rank_window)]
    ranks: Option<(usize, usize)>,

    /// Highlight the path that spells this sequence
    #[arg(short = 's', long)]
    sequence: Option<String>,

    /// Take the sequence region from a FASTA file (requires --seq-name)
    #[arg(long, requires = "seq_name")]
    fasta: Option<PathBuf>,

    /// Record id in the FASTA file
    #[arg(long = "seq-name")]
    seq_name: Option<String>,

    /// 0-based start in the FASTA record
    #[arg(long, default_value_t = 0, requires = "fasta")]
    start: usize,

    /// 0-based exclusive end in the FASTA record (default: record end)
    #[arg(long, requires = "fasta")]
    end: Option<usize>,

    /// Number of hops around the selected nodes to include
    #[arg(short = 'c', long, default_value_t = 5)]
    context: usize,

    /// Fill color for highlighted nodes
    #[arg(long = "fill-color", default_value = "#ffb000")]
    fill_color: String,

    /// Color for highlighted edges
    #[arg(long = "edge-color", default_value = "#d62728")]
    edge_color: String,

    /// Pen width for highlighted edges
    #[arg(long = "pen-width", default_value_t = 3.0)]
    pen_width: f32,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: dot, png, svg or pdf (default: from output extension)
    #[arg(short = 'T', long, value_parser = OutputFormat::parse)]
    format: Option<OutputFormat>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn parse_rank_window(s: &str) -> Result<(usize, usize), String> {
    let (a, b) = s
        .split_once("..")
        .or_else(|| s.split_once('-'))
        .ok_or_else(|| format!("expected START-END, got '{}'", s))?;
    let start = a.trim().parse::<usize>().map_err(|e| format!("bad start '{}': {}", a, e))?;
    let end = b.trim().parse::<usize>().map_err(|e| format!("bad end '{}': {}", b, e))?;
    if start >= end {
        return Err(format!("empty rank window {}..{}", start, end));
    }
    Ok((start, end))
}

fn build_spec(cli: &Cli) -> Result<RegionSpec> {
    let context = cli.context;
    if let Some(id) = &cli.node {
        return Ok(RegionSpec::Node { id: id.clone(), context });
    }
    if let Some((start, end)) = cli.ranks {
        return Ok(RegionSpec::Ranks { start, end, context });
    }
    if let Some(seq) = &cli.sequence {
        return Ok(RegionSpec::Sequence { seq: seq.trim().as_bytes().to_ascii_uppercase(), context });
    }
    if let (Some(path), Some(name)) = (&cli.fasta, &cli.seq_name) {
        let rec = fasta::read_named_record(path, name)?;
        let seq = rec.region(cli.start, cli.end)?.to_vec();
        log::info!("using {}[{}..{}] ({} bp)", rec.id, cli.start, cli.start + seq.len(), seq.len());
        return Ok(RegionSpec::Sequence { seq, context });
    }
    bail!("no region given")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let opt = RegionOpt {
        graph: cli.graph.clone(),
        spec: build_spec(&cli)?,
        style: HighlightStyle {
            fill_color: cli.fill_color.clone(),
            edge_color: cli.edge_color.clone(),
            pen_width: cli.pen_width,
        },
        output: cli.output.clone(),
        format: cli.format,
    };
    run_region(&opt)
}
