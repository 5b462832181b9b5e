use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::io::debug::{sanitize_name, DebugLayout};
use crate::io::dot;
use crate::io::graphviz::{self, OutputFormat};
use crate::io::tsv::{self, VisitedRecord};

pub mod colormap;
pub mod matrix;
pub mod render;

pub use colormap::Colormap;
pub use matrix::{DpMatrix, MatrixBuilder, RowMapping};
pub use render::{render_matrix, GifWriter, Layout, RenderOpt};

#[derive(Debug, Clone)]
pub struct PlotOpt {
    /// 调试输出目录，或单个 visited TSV 文件
    pub input: PathBuf,
    /// 只绘制这些序列；为空时绘制全部
    pub sequences: Vec<String>,
    /// 覆盖调试目录中的 graph_for_<seq>.dot
    pub graph: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub animate: bool,
    pub each_iteration: bool,
    pub frame_delay_ms: u32,
    pub graph_image: bool,
    pub render: RenderOpt,
    /// 0 表示使用 rayon 默认线程数
    pub threads: usize,
}

impl Default for PlotOpt {
    fn default() -> Self {
        Self {
            input: PathBuf::from("."),
            sequences: Vec::new(),
            graph: None,
            output_dir: PathBuf::from("."),
            animate: false,
            each_iteration: false,
            frame_delay_ms: 250,
            graph_image: false,
            render: RenderOpt::default(),
            threads: 0,
        }
    }
}

/// 单条序列的绘图任务
#[derive(Debug, Clone)]
pub struct PlotJob {
    pub name: String,
    pub iterations: Vec<PathBuf>,
    pub graph: Option<PathBuf>,
    pub seq_len: Option<usize>,
    pub max_rank: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct PlotSummary {
    pub name: String,
    pub iterations: usize,
    pub rows: usize,
    pub cols: usize,
    pub visited: usize,
    pub skipped: usize,
    pub outputs: Vec<PathBuf>,
}

/// 根据输入收集任务：单个 TSV 文件，或调试目录中的每条序列
pub fn collect_jobs(opt: &PlotOpt) -> Result<Vec<PlotJob>> {
    if opt.input.is_file() {
        let name = opt
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "matrix".to_string());
        return Ok(vec![PlotJob {
            name,
            iterations: vec![opt.input.clone()],
            graph: opt.graph.clone(),
            seq_len: None,
            max_rank: None,
        }]);
    }

    let layout = DebugLayout::open(&opt.input)?;
    let mut infos = layout.sequences()?;
    if !opt.sequences.is_empty() {
        for wanted in &opt.sequences {
            let key = sanitize_name(wanted);
            if !infos.iter().any(|s| s.name == key) {
                bail!("sequence '{}' not found in '{}'", wanted, layout.root().display());
            }
        }
        let wanted: Vec<String> = opt.sequences.iter().map(|s| sanitize_name(s)).collect();
        infos.retain(|s| wanted.contains(&s.name));
    }

    let mut jobs = Vec::with_capacity(infos.len());
    for info in infos {
        let iterations = layout.iterations(&info.name)?;
        if iterations.is_empty() {
            log::warn!("sequence {} has no A* iteration files, skipped", info.name);
            continue;
        }
        let graph = match &opt.graph {
            Some(g) => Some(g.clone()),
            None => Some(layout.graph_path(&info.name)).filter(|p| p.is_file()),
        };
        jobs.push(PlotJob {
            name: info.name,
            iterations,
            graph,
            seq_len: info.length,
            max_rank: info.max_rank,
        });
    }
    if jobs.is_empty() {
        bail!("nothing to plot in '{}'", opt.input.display());
    }
    Ok(jobs)
}

pub fn plot_job(job: &PlotJob, opt: &PlotOpt) -> Result<PlotSummary> {
    let mapping = match &job.graph {
        Some(path) => RowMapping::from_graph(&dot::read_dot_file(path)?),
        None => {
            log::debug!("{}: no graph, rows are node ids", job.name);
            RowMapping::NodeIds
        }
    };

    let iterations: Vec<Vec<VisitedRecord>> = job
        .iterations
        .iter()
        .map(tsv::read_visited)
        .collect::<Result<_>>()?;

    let builder = MatrixBuilder::new(&mapping, &iterations, job.seq_len, job.max_rank)
        .with_context(|| format!("cannot plot sequence {}", job.name))?;
    let mut summary = PlotSummary {
        name: job.name.clone(),
        iterations: iterations.len(),
        rows: builder.rows(),
        cols: builder.cols(),
        skipped: builder.skipped(),
        ..Default::default()
    };
    if builder.rows() == 0 || builder.cols() == 0 {
        log::warn!("{}: no visited states, nothing plotted", job.name);
        return Ok(summary);
    }
    if summary.skipped > 0 {
        log::warn!("{}: {} record(s) refer to nodes missing from the graph", job.name, summary.skipped);
    }

    // 先求并集，确定所有帧共用的配色上限
    let union = builder.union(&iterations);
    summary.visited = union.visited();
    let max_score = union.max_score().unwrap_or(0);

    let final_path = opt.output_dir.join(format!("{}.matrix.png", job.name));
    render::save_png(&render_matrix(&union, max_score, &opt.render), &final_path)?;
    drop(union);
    summary.outputs.push(final_path);

    if opt.animate || opt.each_iteration {
        let gif_path = opt.output_dir.join(format!("{}.animation.gif", job.name));
        let mut gif = opt
            .animate
            .then(|| GifWriter::create(&gif_path, opt.frame_delay_ms))
            .transpose()?;
        let mut frame_paths = Vec::new();

        // 逐帧累积、渲染并立即写出，内存中只保留当前帧
        builder.for_each_frame(&iterations, |k, frame| {
            let img = render_matrix(frame, max_score, &opt.render);
            if opt.each_iteration {
                let path = opt.output_dir.join(format!("{}.iter{}.png", job.name, k));
                render::save_png(&img, &path)?;
                frame_paths.push(path);
            }
            if let Some(gif) = gif.as_mut() {
                gif.push(img)?;
            }
            Ok(())
        })?;

        summary.outputs.extend(frame_paths);
        if let Some(gif) = gif {
            log::debug!("{}: {} animation frame(s)", job.name, gif.frames());
            drop(gif);
            summary.outputs.push(gif_path);
        }
    }

    if opt.graph_image {
        match &job.graph {
            Some(graph) => {
                let path = opt.output_dir.join(format!("{}.graph.svg", job.name));
                match render_graph_image(graph, &path) {
                    Ok(()) => summary.outputs.push(path),
                    Err(e) => log::warn!("{}: graph image skipped: {:#}", job.name, e),
                }
            }
            None => log::warn!("{}: no graph available for --graph-image", job.name),
        }
    }

    Ok(summary)
}

fn render_graph_image(graph: &Path, out: &Path) -> Result<()> {
    let text = std::fs::read_to_string(graph)
        .with_context(|| format!("cannot read '{}'", graph.display()))?;
    graphviz::render(&text, OutputFormat::Svg, out)
}

pub fn run_plot(opt: &PlotOpt) -> Result<Vec<PlotSummary>> {
    std::fs::create_dir_all(&opt.output_dir)
        .with_context(|| format!("cannot create output directory '{}'", opt.output_dir.display()))?;
    let jobs = collect_jobs(opt)?;
    log::info!("plotting {} sequence(s) from {}", jobs.len(), opt.input.display());

    let pool = rayon::ThreadPoolBuilder::new().num_threads(opt.threads).build()?;
    let summaries: Vec<PlotSummary> =
        pool.install(|| jobs.par_iter().map(|job| plot_job(job, opt)).collect::<Result<_>>())?;

    for s in &summaries {
        log::info!(
            "{}: {} iteration(s), {}x{} matrix, {} visited cell(s), {} file(s) written",
            s.name,
            s.iterations,
            s.rows,
            s.cols,
            s.visited,
            s.outputs.len()
        );
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::debug::{DebugOutputMessage, DebugOutputWriter};

    fn write_debug_dir(dir: &Path) {
        let writer = DebugOutputWriter::init(dir);
        writer.log(DebugOutputMessage::NewSequence {
            seq_name: "seq1".into(),
            sequence: "AC".into(),
            max_rank: 3,
        });
        writer.log(DebugOutputMessage::IntermediateGraph {
            graph_dot: "digraph { s; a [label=\"A\"]; c [label=\"C\"]; e; s -> a -> c -> e; }".into(),
        });
        writer.log(DebugOutputMessage::AstarData {
            visited_tsv: "node_id\toffset\tmatrix\tscore\ns\t0\tStart\t0\na\t1\tMatch\t0\n".into(),
        });
        writer.log(DebugOutputMessage::AstarData {
            visited_tsv: "c\t2\tMatch\t0\nc\t1\tDeletion\t8\nghost\t0\tMatch\t0\n".into(),
        });
        writer.log(DebugOutputMessage::Terminate);
        writer.join().unwrap();
    }

    #[test]
    fn plots_debug_directory() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_debug_dir(input.path());

        let opt = PlotOpt {
            input: input.path().to_path_buf(),
            output_dir: output.path().to_path_buf(),
            animate: true,
            each_iteration: true,
            threads: 2,
            ..Default::default()
        };
        let summaries = run_plot(&opt).unwrap();
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.name, "seq1");
        assert_eq!(s.iterations, 2);
        assert_eq!((s.rows, s.cols), (4, 3));
        assert_eq!(s.visited, 4);
        assert_eq!(s.skipped, 1);
        for name in ["seq1.matrix.png", "seq1.iter0.png", "seq1.iter1.png", "seq1.animation.gif"] {
            assert!(output.path().join(name).is_file(), "{} missing", name);
        }
    }

    #[test]
    fn unknown_sequence_is_an_error() {
        let input = tempfile::tempdir().unwrap();
        write_debug_dir(input.path());
        let opt = PlotOpt {
            input: input.path().to_path_buf(),
            sequences: vec!["nope".into()],
            ..Default::default()
        };
        let err = collect_jobs(&opt).unwrap_err();
        assert!(err.to_string().contains("'nope' not found"));
    }

    #[test]
    fn single_file_job() {
        let dir = tempfile::tempdir().unwrap();
        let tsv = dir.path().join("run.iter3.tsv");
        std::fs::write(&tsv, "0\t0\tMatch\t0\n5\t2\tInsertion\t4\n").unwrap();
        let opt = PlotOpt {
            input: tsv,
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let jobs = collect_jobs(&opt).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "run.iter3");
        let s = plot_job(&jobs[0], &opt).unwrap();
        assert_eq!((s.rows, s.cols), (6, 3));
        assert!(dir.path().join("run.iter3.matrix.png").is_file());
    }

    #[test]
    fn static_plot_writes_only_the_union() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_debug_dir(input.path());
        let opt = PlotOpt {
            input: input.path().to_path_buf(),
            output_dir: output.path().to_path_buf(),
            ..Default::default()
        };
        let s = &run_plot(&opt).unwrap()[0];
        assert_eq!(s.outputs, vec![output.path().join("seq1.matrix.png")]);
        assert_eq!(s.visited, 4);
        assert!(!output.path().join("seq1.iter0.png").exists());
        assert!(!output.path().join("seq1.animation.gif").exists());
    }

    #[test]
    fn oversized_node_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tsv = dir.path().join("big.tsv");
        std::fs::write(&tsv, "0\t0\tMatch\t0\n4000000000\t0\tMatch\t0\n").unwrap();
        let opt = PlotOpt {
            input: tsv,
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let jobs = collect_jobs(&opt).unwrap();
        let err = format!("{:#}", plot_job(&jobs[0], &opt).unwrap_err());
        assert!(err.contains("cannot plot sequence big"), "{}", err);
        assert!(err.contains("line 2: node '4000000000'"), "{}", err);
        assert!(!dir.path().join("big.matrix.png").exists());
    }
}
