use anyhow::{bail, Result};
use std::io::Write;
use std::path::PathBuf;

use crate::graph::RefGraph;
use crate::io::dot::{self, DotGraph};
use crate::io::graphviz::{self, OutputFormat};

mod highlight;

pub use highlight::{extract_subgraph, HighlightStyle};

/// 区域的选取方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionSpec {
    /// 以某个节点为中心，向外扩展 context 跳
    Node { id: String, context: usize },
    /// 拓扑秩落在 [start, end) 的节点
    Ranks { start: usize, end: usize, context: usize },
    /// 图中拼出该序列的路径
    Sequence { seq: Vec<u8>, context: usize },
}

impl RegionSpec {
    pub fn describe(&self) -> String {
        match self {
            RegionSpec::Node { id, context } => format!("node {} (context {})", id, context),
            RegionSpec::Ranks { start, end, context } => {
                format!("ranks {}..{} (context {})", start, end, context)
            }
            RegionSpec::Sequence { seq, context } => {
                let shown = if seq.len() > 30 {
                    format!("{}...", String::from_utf8_lossy(&seq[..30]))
                } else {
                    String::from_utf8_lossy(seq).into_owned()
                };
                format!("sequence {} ({} bp, context {})", shown, seq.len(), context)
            }
        }
    }
}

/// 选中的区域，均为 DOT 节点下标
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    /// 需要高亮的节点
    pub core: Vec<usize>,
    /// 输出子图包含的全部节点（core 及其邻域），升序
    pub nodes: Vec<usize>,
    /// 序列区域对应的路径，其它区域为空
    pub path: Vec<usize>,
}

pub fn select_region(dot: &DotGraph, spec: &RegionSpec) -> Result<Region> {
    let graph = RefGraph::from_dot(dot);
    let (core, path, context) = match spec {
        RegionSpec::Node { id, context } => {
            let Some(ix) = dot.node_index(id) else {
                bail!("node '{}' not found in graph ({} nodes)", id, dot.nodes.len());
            };
            (vec![ix], Vec::new(), *context)
        }
        RegionSpec::Ranks { start, end, context } => {
            if start >= end {
                bail!("empty rank window {}..{}", start, end);
            }
            let ranks = graph.node_ranks();
            let core: Vec<usize> = (0..dot.nodes.len())
                .filter(|&ix| ranks[ix] >= *start && ranks[ix] < *end)
                .collect();
            if core.is_empty() {
                bail!(
                    "rank window {}..{} selects no nodes (graph has {} ranks)",
                    start,
                    end,
                    dot.nodes.len()
                );
            }
            (core, Vec::new(), *context)
        }
        RegionSpec::Sequence { seq, context } => {
            if seq.is_empty() {
                bail!("empty sequence region");
            }
            let Some(path) = graph.find_spelled_path(seq) else {
                bail!("no path in the graph spells the {} bp sequence", seq.len());
            };
            let mut core = path.clone();
            core.sort_unstable();
            core.dedup();
            (core, path, *context)
        }
    };

    let nodes = graph.neighbourhood(&core, context);
    log::info!(
        "region {}: {} highlighted node(s), {} node(s) in total",
        spec.describe(),
        core.len(),
        nodes.len()
    );
    Ok(Region { core, nodes, path })
}

/// 区域抽取的全部参数，对应命令行选项
#[derive(Debug, Clone)]
pub struct RegionOpt {
    pub graph: PathBuf,
    pub spec: RegionSpec,
    pub style: HighlightStyle,
    /// 为 None 时 DOT 写到 stdout
    pub output: Option<PathBuf>,
    /// 为 None 时由输出文件扩展名推断
    pub format: Option<OutputFormat>,
}

pub fn run_region(opt: &RegionOpt) -> Result<()> {
    let dot = dot::read_dot_file(&opt.graph)?;
    log::info!(
        "loaded {}: {} nodes, {} edges",
        opt.graph.display(),
        dot.nodes.len(),
        dot.edges.len()
    );

    let region = select_region(&dot, &opt.spec)?;
    let mut sub = extract_subgraph(&dot, &region, &opt.style);
    sub.comments.push(format!("region of {}: {}", opt.graph.display(), opt.spec.describe()));
    sub.comments.push(format!("extracted {}", chrono::Utc::now().to_rfc3339()));
    let text = dot::dot_to_string(&sub)?;

    match &opt.output {
        Some(path) => {
            let format = match opt.format {
                Some(f) => f,
                None => OutputFormat::from_path(path)?,
            };
            graphviz::render(&text, format, path)?;
            log::info!("region written to {}", path.display());
        }
        None => {
            if matches!(opt.format, Some(f) if f != OutputFormat::Dot) {
                bail!("rendered formats need an output file (-o)");
            }
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            out.write_all(text.as_bytes())?;
            out.flush()?;
        }
    }
    Ok(())
}
