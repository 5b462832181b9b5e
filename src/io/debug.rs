//! 比对器调试输出目录的读写。
//!
//! 目录布局：
//!
//! ```text
//! <dir>/sequences.tsv                        name \t length \t max_rank
//! <dir>/graph_for_<seq>.dot                  该序列比对时所用的图
//! <dir>/astar_iterations/<seq>.iter<N>.tsv   A* 搜索访问过的状态
//! ```

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

pub const ITERATIONS_DIR: &str = "astar_iterations";
pub const SEQUENCES_FILE: &str = "sequences.tsv";

/// 序列名中的路径分隔符与空白替换为 `_`，保证可作为文件名
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '_' } else { c })
        .collect()
}

#[derive(Debug, Clone)]
pub enum DebugOutputMessage {
    NewSequence {
        seq_name: String,
        sequence: String,
        max_rank: usize,
    },
    IntermediateGraph {
        graph_dot: String,
    },
    AstarData {
        visited_tsv: String,
    },
    Terminate,
}

/// 后台写线程，比对过程中通过 channel 投递调试数据
pub struct DebugOutputWriter {
    sender: Sender<DebugOutputMessage>,
    handle: JoinHandle<Result<()>>,
}

impl DebugOutputWriter {
    pub fn init<P: AsRef<Path>>(debug_output: P) -> Self {
        let dir = debug_output.as_ref().to_path_buf();
        let (sender, receiver) = unbounded();
        let handle = std::thread::spawn(move || write_loop(&dir, &receiver));
        Self { sender, handle }
    }

    pub fn log(&self, msg: DebugOutputMessage) {
        if self.sender.send(msg).is_err() {
            log::warn!("debug writer already stopped, message dropped");
        }
    }

    /// 等待写线程结束；调用方需先发送 `Terminate`
    pub fn join(self) -> Result<()> {
        drop(self.sender);
        self.handle
            .join()
            .map_err(|_| anyhow!("debug writer thread panicked"))?
    }
}

fn write_loop(dir: &Path, receiver: &Receiver<DebugOutputMessage>) -> Result<()> {
    let iter_dir = dir.join(ITERATIONS_DIR);
    fs::create_dir_all(&iter_dir)
        .with_context(|| format!("cannot create debug output directory '{}'", iter_dir.display()))?;

    let mut current: Option<String> = None;
    let mut iteration = 0usize;

    // 发送端全部释放时 recv 返回 Err，与 Terminate 同样视为结束
    while let Ok(msg) = receiver.recv() {
        match msg {
            DebugOutputMessage::NewSequence { seq_name, sequence, max_rank } => {
                let name = sanitize_name(&seq_name);
                let path = dir.join(SEQUENCES_FILE);
                let mut f = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("cannot open '{}'", path.display()))?;
                writeln!(f, "{}\t{}\t{}", name, sequence.len(), max_rank)?;
                clear_previous_run(dir, &iter_dir, &name)?;
                log::debug!("debug output: new sequence {} ({} bp)", name, sequence.len());
                current = Some(name);
                iteration = 0;
            }
            DebugOutputMessage::IntermediateGraph { graph_dot } => {
                let Some(name) = &current else {
                    log::warn!("graph received before any sequence, skipped");
                    continue;
                };
                let path = dir.join(format!("graph_for_{}.dot", name));
                write_file(&path, &graph_dot)?;
            }
            DebugOutputMessage::AstarData { visited_tsv } => {
                let Some(name) = &current else {
                    log::warn!("A* data received before any sequence, skipped");
                    continue;
                };
                let path = iter_dir.join(format!("{}.iter{}.tsv", name, iteration));
                write_file(&path, &visited_tsv)?;
                iteration += 1;
            }
            DebugOutputMessage::Terminate => break,
        }
    }
    Ok(())
}

/// 目录被重复使用时，删除该序列上一次运行留下的图与迭代文件，
/// 否则编号更大的旧迭代会混入新的绘图
fn clear_previous_run(dir: &Path, iter_dir: &Path, name: &str) -> Result<()> {
    let graph = dir.join(format!("graph_for_{}.dot", name));
    if graph.is_file() {
        fs::remove_file(&graph).with_context(|| format!("cannot remove '{}'", graph.display()))?;
    }
    let mut removed = 0usize;
    for entry in fs::read_dir(iter_dir)? {
        let entry = entry?;
        let stale = matches!(
            split_iteration_name(&entry.file_name().to_string_lossy()),
            Some((seq, _)) if seq == name
        );
        if stale {
            fs::remove_file(entry.path())
                .with_context(|| format!("cannot remove '{}'", entry.path().display()))?;
            removed += 1;
        }
    }
    if removed > 0 {
        log::info!("debug output: removed {} stale iteration file(s) of {}", removed, name);
    }
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    let f = File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?;
    let mut w = BufWriter::new(f);
    w.write_all(contents.as_bytes())?;
    w.flush()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInfo {
    pub name: String,
    /// 仅在 sequences.tsv 存在时可知
    pub length: Option<usize>,
    pub max_rank: Option<usize>,
}

/// 只读视图：定位调试目录中的图与迭代文件
#[derive(Debug, Clone)]
pub struct DebugLayout {
    root: PathBuf,
}

impl DebugLayout {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() {
            anyhow::bail!("'{}' is not a directory", root.display());
        }
        if !root.join(ITERATIONS_DIR).is_dir() {
            anyhow::bail!(
                "'{}' has no {}/ subdirectory; is it a debug output directory?",
                root.display(),
                ITERATIONS_DIR
            );
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 序列列表：优先读 sequences.tsv（保持写入顺序），否则由迭代文件名推断并排序
    pub fn sequences(&self) -> Result<Vec<SequenceInfo>> {
        let seq_file = self.root.join(SEQUENCES_FILE);
        if seq_file.is_file() {
            let f = File::open(&seq_file)
                .with_context(|| format!("cannot open '{}'", seq_file.display()))?;
            let mut out: Vec<SequenceInfo> = Vec::new();
            for (i, line) in BufReader::new(f).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let mut fields = line.split('\t');
                let name = fields.next().unwrap_or("").to_string();
                let length = fields.next().map(str::parse::<usize>).transpose().map_err(|e| {
                    anyhow!("{}:{}: bad sequence length: {}", seq_file.display(), i + 1, e)
                })?;
                let max_rank = fields.next().map(str::parse::<usize>).transpose().map_err(|e| {
                    anyhow!("{}:{}: bad max rank: {}", seq_file.display(), i + 1, e)
                })?;
                // 同名序列以最后一次为准
                out.retain(|s| s.name != name);
                out.push(SequenceInfo { name, length, max_rank });
            }
            return Ok(out);
        }

        let mut names = BTreeSet::new();
        for entry in fs::read_dir(self.root.join(ITERATIONS_DIR))? {
            let file_name = entry?.file_name();
            if let Some((name, _)) = split_iteration_name(&file_name.to_string_lossy()) {
                names.insert(name.to_string());
            }
        }
        Ok(names
            .into_iter()
            .map(|name| SequenceInfo { name, length: None, max_rank: None })
            .collect())
    }

    pub fn graph_path(&self, seq_name: &str) -> PathBuf {
        self.root.join(format!("graph_for_{}.dot", sanitize_name(seq_name)))
    }

    /// 某序列的所有迭代文件，按迭代编号（数值）排序
    pub fn iterations(&self, seq_name: &str) -> Result<Vec<PathBuf>> {
        let wanted = sanitize_name(seq_name);
        let mut found: Vec<(usize, PathBuf)> = Vec::new();
        for entry in fs::read_dir(self.root.join(ITERATIONS_DIR))? {
            let entry = entry?;
            let file_name = entry.file_name();
            if let Some((name, iter)) = split_iteration_name(&file_name.to_string_lossy()) {
                if name == wanted {
                    found.push((iter, entry.path()));
                }
            }
        }
        found.sort_by_key(|(iter, _)| *iter);
        Ok(found.into_iter().map(|(_, p)| p).collect())
    }
}

/// `seq1.iter12.tsv` -> ("seq1", 12)
fn split_iteration_name(file_name: &str) -> Option<(&str, usize)> {
    let stem = file_name.strip_suffix(".tsv")?;
    let pos = stem.rfind(".iter")?;
    let iter = stem[pos + ".iter".len()..].parse().ok()?;
    Some((&stem[..pos], iter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_names() {
        assert_eq!(split_iteration_name("seq1.iter0.tsv"), Some(("seq1", 0)));
        assert_eq!(split_iteration_name("a.b.iter12.tsv"), Some(("a.b", 12)));
        assert_eq!(split_iteration_name("seq1.iterx.tsv"), None);
        assert_eq!(split_iteration_name("seq1.tsv"), None);
    }

    #[test]
    fn sanitize() {
        assert_eq!(sanitize_name("chr1/part a"), "chr1_part_a");
        assert_eq!(sanitize_name("plain"), "plain");
    }

    #[test]
    fn iterations_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        let iter_dir = dir.path().join(ITERATIONS_DIR);
        fs::create_dir_all(&iter_dir).unwrap();
        for i in [10, 2, 0, 1] {
            fs::write(iter_dir.join(format!("s.iter{}.tsv", i)), "").unwrap();
        }
        fs::write(iter_dir.join("t.iter0.tsv"), "").unwrap();

        let layout = DebugLayout::open(dir.path()).unwrap();
        let iters = layout.iterations("s").unwrap();
        let names: Vec<_> = iters
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["s.iter0.tsv", "s.iter1.tsv", "s.iter2.tsv", "s.iter10.tsv"]);

        let seqs = layout.sequences().unwrap();
        assert_eq!(seqs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["s", "t"]);
        assert!(seqs[0].length.is_none());
    }

    #[test]
    fn open_rejects_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DebugLayout::open(dir.path()).is_err());
        assert!(DebugLayout::open(dir.path().join("missing")).is_err());
    }
}
