use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::graph::RefGraph;
use crate::io::dot::DotGraph;
use crate::io::tsv::{Panel, VisitedRecord};

/// 未访问单元的哨兵值
pub const UNVISITED: u32 = u32::MAX;

/// 节点 id 到矩阵行号的映射
#[derive(Debug, Clone)]
pub enum RowMapping {
    /// 按图的拓扑秩排列
    Ranks(HashMap<String, usize>),
    /// 无图时直接把节点 id 解析为行号
    NodeIds,
}

impl RowMapping {
    pub fn from_graph(dot: &DotGraph) -> Self {
        let ranks = RefGraph::from_dot(dot).node_ranks();
        let map = dot
            .nodes
            .iter()
            .zip(ranks)
            .map(|(n, r)| (n.id.clone(), r))
            .collect();
        RowMapping::Ranks(map)
    }

    pub fn row(&self, node_id: &str) -> Option<usize> {
        match self {
            RowMapping::Ranks(map) => map.get(node_id).copied(),
            RowMapping::NodeIds => node_id.parse().ok(),
        }
    }

    /// 图已知时，即使部分节点未被访问，行数也至少覆盖整张图
    pub fn min_rows(&self) -> usize {
        match self {
            RowMapping::Ranks(map) => map.len(),
            RowMapping::NodeIds => 0,
        }
    }
}

/// 三个面板（匹配/删除/插入）的得分矩阵，行为图节点秩，列为 query 偏移。
/// 同一单元多次出现时保留最小得分。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<u32>,
}

impl DpMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols, cells: vec![UNVISITED; 3 * rows * cols] }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn idx(&self, panel: Panel, row: usize, col: usize) -> usize {
        (panel as usize * self.rows + row) * self.cols + col
    }

    pub fn get(&self, panel: Panel, row: usize, col: usize) -> Option<u32> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let v = self.cells[self.idx(panel, row, col)];
        (v != UNVISITED).then_some(v)
    }

    /// 越界返回 false
    pub fn record(&mut self, panel: Panel, row: usize, col: usize, score: u32) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        let i = self.idx(panel, row, col);
        self.cells[i] = self.cells[i].min(score);
        true
    }

    pub fn merge(&mut self, other: &DpMatrix) {
        assert_eq!((self.rows, self.cols), (other.rows, other.cols), "matrix shapes differ");
        for (a, &b) in self.cells.iter_mut().zip(&other.cells) {
            *a = (*a).min(b);
        }
    }

    pub fn visited(&self) -> usize {
        self.cells.iter().filter(|&&v| v != UNVISITED).count()
    }

    pub fn max_score(&self) -> Option<u32> {
        self.cells.iter().copied().filter(|&v| v != UNVISITED).max()
    }

    /// 按 bin×bin 合并单元（取最小得分），返回 (行数, 列数, 值)
    pub fn binned(&self, panel: Panel, bin: usize) -> (usize, usize, Vec<u32>) {
        let bin = bin.max(1);
        let brows = self.rows.div_ceil(bin);
        let bcols = self.cols.div_ceil(bin);
        let mut out = vec![UNVISITED; brows * bcols];
        for r in 0..self.rows {
            let base = self.idx(panel, r, 0);
            let row = &self.cells[base..base + self.cols];
            let orow = &mut out[(r / bin) * bcols..(r / bin + 1) * bcols];
            for (c, &v) in row.iter().enumerate() {
                let slot = &mut orow[c / bin];
                *slot = (*slot).min(v);
            }
        }
        (brows, bcols, out)
    }
}

/// 单个矩阵（三个面板合计）允许的最大单元数，约 1 GiB
pub const MAX_MATRIX_CELLS: usize = 1 << 28;

fn check_extent(rows: usize, cols: usize) -> bool {
    rows.checked_mul(cols)
        .and_then(|n| n.checked_mul(3))
        .is_some_and(|n| n <= MAX_MATRIX_CELLS)
}

/// 把一组迭代的记录映射到矩阵坐标
pub struct MatrixBuilder<'a> {
    mapping: &'a RowMapping,
    rows: usize,
    cols: usize,
    skipped: usize,
}

impl<'a> MatrixBuilder<'a> {
    /// 先扫描所有迭代确定统一的矩阵范围，保证动画各帧尺寸一致。
    /// `seq_len` 已知时列数至少为 seq_len + 1（偏移 0 表示尚未消耗 query），
    /// `max_rank` 已知时行数至少为 max_rank。
    /// 超过 [`MAX_MATRIX_CELLS`] 时报错并指出第一条越界的记录。
    pub fn new(
        mapping: &'a RowMapping,
        iterations: &[Vec<VisitedRecord>],
        seq_len: Option<usize>,
        max_rank: Option<usize>,
    ) -> Result<Self> {
        let mut rows = mapping.min_rows().max(max_rank.unwrap_or(0));
        let mut cols = seq_len.map(|l| l.saturating_add(1)).unwrap_or(0);
        if !check_extent(rows, cols) {
            bail!(
                "{} rows x {} columns exceed the limit of {} matrix cells",
                rows,
                cols,
                MAX_MATRIX_CELLS
            );
        }

        let mut skipped = 0;
        for (k, records) in iterations.iter().enumerate() {
            for rec in records {
                let Some(row) = mapping.row(&rec.node_id) else {
                    skipped += 1;
                    continue;
                };
                let extent = row
                    .checked_add(1)
                    .zip(rec.offset.checked_add(1))
                    .map(|(r, c)| (rows.max(r), cols.max(c)))
                    .filter(|&(r, c)| check_extent(r, c));
                match extent {
                    Some((r, c)) => (rows, cols) = (r, c),
                    None => bail!(
                        "iteration {}, line {}: node '{}' at offset {} is outside the plottable matrix \
                         (limit {} cells)",
                        k,
                        rec.line,
                        rec.node_id,
                        rec.offset,
                        MAX_MATRIX_CELLS
                    ),
                }
            }
        }
        Ok(Self { mapping, rows, cols, skipped })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// 无法映射的记录数
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn empty(&self) -> DpMatrix {
        DpMatrix::new(self.rows, self.cols)
    }

    pub fn add(&self, matrix: &mut DpMatrix, records: &[VisitedRecord]) {
        for rec in records {
            if let Some(row) = self.mapping.row(&rec.node_id) {
                matrix.record(rec.matrix.panel(), row, rec.offset, rec.score);
            }
        }
    }

    /// 全部迭代的并集
    pub fn union(&self, iterations: &[Vec<VisitedRecord>]) -> DpMatrix {
        let mut acc = self.empty();
        for records in iterations {
            self.add(&mut acc, records);
        }
        acc
    }

    /// 逐帧回调累积矩阵：第 k 帧为迭代 0..=k 的并集。只保留一份矩阵。
    pub fn for_each_frame<F>(&self, iterations: &[Vec<VisitedRecord>], mut f: F) -> Result<()>
    where
        F: FnMut(usize, &DpMatrix) -> Result<()>,
    {
        let mut acc = self.empty();
        for (k, records) in iterations.iter().enumerate() {
            self.add(&mut acc, records);
            f(k, &acc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::dot::parse_dot;
    use crate::io::tsv::{parse_visited, AlignState};

    fn rec(node: &str, offset: usize, matrix: AlignState, score: u32) -> VisitedRecord {
        VisitedRecord { node_id: node.to_string(), offset, matrix, score, line: 0 }
    }

    #[test]
    fn record_keeps_minimum() {
        let mut m = DpMatrix::new(2, 3);
        assert!(m.record(Panel::Match, 1, 2, 8));
        assert!(m.record(Panel::Match, 1, 2, 4));
        assert!(m.record(Panel::Match, 1, 2, 6));
        assert!(!m.record(Panel::Match, 2, 0, 1));
        assert_eq!(m.get(Panel::Match, 1, 2), Some(4));
        assert_eq!(m.get(Panel::Deletion, 1, 2), None);
        assert_eq!(m.visited(), 1);
        assert_eq!(m.max_score(), Some(4));
    }

    #[test]
    fn merge_takes_minimum() {
        let mut a = DpMatrix::new(1, 2);
        let mut b = DpMatrix::new(1, 2);
        a.record(Panel::Insertion, 0, 0, 3);
        b.record(Panel::Insertion, 0, 0, 1);
        b.record(Panel::Insertion, 0, 1, 9);
        a.merge(&b);
        assert_eq!(a.get(Panel::Insertion, 0, 0), Some(1));
        assert_eq!(a.get(Panel::Insertion, 0, 1), Some(9));
    }

    #[test]
    fn binning_uses_min_per_block() {
        let mut m = DpMatrix::new(3, 3);
        m.record(Panel::Match, 0, 0, 5);
        m.record(Panel::Match, 1, 1, 2);
        m.record(Panel::Match, 2, 2, 7);
        let (r, c, v) = m.binned(Panel::Match, 2);
        assert_eq!((r, c), (2, 2));
        assert_eq!(v, vec![2, UNVISITED, UNVISITED, 7]);
    }

    #[test]
    fn rows_follow_graph_ranks() {
        // 声明顺序与拓扑序不同
        let dot = parse_dot("digraph { b; a; a -> b; }").unwrap();
        let mapping = RowMapping::from_graph(&dot);
        assert_eq!(mapping.row("a"), Some(0));
        assert_eq!(mapping.row("b"), Some(1));
        assert_eq!(mapping.row("zz"), None);
        assert_eq!(RowMapping::NodeIds.row("17"), Some(17));
        assert_eq!(RowMapping::NodeIds.row("x"), None);
    }

    #[test]
    fn builder_extent_and_frames() {
        let mapping = RowMapping::NodeIds;
        let iterations = vec![
            vec![rec("0", 0, AlignState::Start, 0), rec("1", 1, AlignState::Match, 0)],
            vec![rec("2", 1, AlignState::Deletion, 6), rec("x", 0, AlignState::Match, 0)],
        ];
        let builder = MatrixBuilder::new(&mapping, &iterations, Some(4), None).unwrap();
        assert_eq!((builder.rows(), builder.cols()), (3, 5));
        assert_eq!(builder.skipped(), 1);

        let mut visited = Vec::new();
        builder
            .for_each_frame(&iterations, |k, m| {
                visited.push((k, m.visited()));
                Ok(())
            })
            .unwrap();
        assert_eq!(visited, vec![(0, 2), (1, 3)]);

        let all = builder.union(&iterations);
        assert_eq!(all.visited(), 3);
        assert_eq!(all.get(Panel::Deletion, 2, 1), Some(6));
    }

    #[test]
    fn max_rank_sets_minimum_rows() {
        let iterations = vec![vec![rec("1", 0, AlignState::Match, 0)]];
        let builder = MatrixBuilder::new(&RowMapping::NodeIds, &iterations, None, Some(8)).unwrap();
        assert_eq!((builder.rows(), builder.cols()), (8, 1));
    }

    #[test]
    fn huge_node_ids_are_rejected() {
        let recs = parse_visited("0\t0\tMatch\t0\n18446744073709551615\t0\tMatch\t0\n".as_bytes()).unwrap();
        let err = MatrixBuilder::new(&RowMapping::NodeIds, &[recs], None, None)
            .err()
            .unwrap()
            .to_string();
        assert!(err.contains("line 2"), "{}", err);
        assert!(err.contains("'18446744073709551615'"), "{}", err);

        let recs = parse_visited("4000000000\t0\tMatch\t0\n".as_bytes()).unwrap();
        let err = MatrixBuilder::new(&RowMapping::NodeIds, &[recs], Some(10), None)
            .err()
            .unwrap()
            .to_string();
        assert!(err.contains("node '4000000000'"), "{}", err);

        assert!(MatrixBuilder::new(&RowMapping::NodeIds, &[], Some(usize::MAX), Some(2)).is_err());
    }
}
