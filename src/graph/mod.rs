use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Outgoing;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet, VecDeque};

use crate::io::dot::{Attrs, DotGraph};

/// DOT 图上的参考图视图。
///
/// petgraph 节点下标与 DOT 节点下标一一对应（按声明顺序插入），
/// 边权为 DOT 边下标。
pub struct RefGraph<'a> {
    dot: &'a DotGraph,
    graph: DiGraph<usize, usize>,
}

/// 不参与排序约束的边：对齐节点之间的连线通常带 `constraint=false` 或 `dir=none`
fn is_ordering_edge(attrs: &Attrs) -> bool {
    let no_constraint = attrs
        .get("constraint")
        .map(|v| v.eq_ignore_ascii_case("false"))
        .unwrap_or(false);
    let undirected = attrs.get("dir").map(|v| v == "none").unwrap_or(false);
    !no_constraint && !undirected
}

impl<'a> RefGraph<'a> {
    pub fn from_dot(dot: &'a DotGraph) -> Self {
        let mut graph = DiGraph::with_capacity(dot.nodes.len(), dot.edges.len());
        for ix in 0..dot.nodes.len() {
            graph.add_node(ix);
        }
        for (eix, e) in dot.edges.iter().enumerate() {
            graph.add_edge(NodeIndex::new(e.source), NodeIndex::new(e.target), eix);
        }
        Self { dot, graph }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn ordering_successors(&self, ix: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph
            .edges_directed(NodeIndex::new(ix), Outgoing)
            .filter(|e| is_ordering_edge(&self.dot.edges[*e.weight()].attrs))
            .map(|e| e.target().index())
    }

    /// 稳定拓扑序：入度为 0 的候选中总是先取声明最早的节点（Kahn + 最小堆）。
    /// 返回每个节点的秩。若存在环，剩余节点按声明顺序追加。
    pub fn node_ranks(&self) -> Vec<usize> {
        let n = self.node_count();
        let mut indeg = vec![0usize; n];
        for ix in 0..n {
            for succ in self.ordering_successors(ix) {
                indeg[succ] += 1;
            }
        }

        let mut heap: BinaryHeap<Reverse<usize>> =
            (0..n).filter(|&ix| indeg[ix] == 0).map(Reverse).collect();
        let mut ranks = vec![usize::MAX; n];
        let mut next_rank = 0usize;
        while let Some(Reverse(ix)) = heap.pop() {
            ranks[ix] = next_rank;
            next_rank += 1;
            for succ in self.ordering_successors(ix) {
                indeg[succ] -= 1;
                if indeg[succ] == 0 {
                    heap.push(Reverse(succ));
                }
            }
        }

        if next_rank < n {
            log::warn!(
                "graph contains a cycle; {} node(s) ranked by declaration order",
                n - next_rank
            );
            for r in ranks.iter_mut().filter(|r| **r == usize::MAX) {
                *r = next_rank;
                next_rank += 1;
            }
        }
        ranks
    }

    /// 以 seeds 为中心、不考虑方向、`radius` 跳以内的所有节点（含 seeds）
    pub fn neighbourhood(&self, seeds: &[usize], radius: usize) -> Vec<usize> {
        let mut dist = vec![usize::MAX; self.node_count()];
        let mut queue = VecDeque::new();
        for &s in seeds {
            if dist[s] == usize::MAX {
                dist[s] = 0;
                queue.push_back(s);
            }
        }
        while let Some(ix) = queue.pop_front() {
            if dist[ix] == radius {
                continue;
            }
            for nb in self.graph.neighbors_undirected(NodeIndex::new(ix)) {
                let nb = nb.index();
                if dist[nb] == usize::MAX {
                    dist[nb] = dist[ix] + 1;
                    queue.push_back(nb);
                }
            }
        }
        (0..self.node_count()).filter(|&ix| dist[ix] != usize::MAX).collect()
    }

    /// 沿有向边寻找节点符号依次拼出 `sequence` 的路径（大小写不敏感）。
    /// 起点按声明顺序尝试，后继按边的声明顺序尝试，返回第一条命中的路径。
    ///
    /// 状态 (节点, 已匹配长度) 一旦回溯失败就记入 `dead`，之后不再进入，
    /// 搜索量因此以 V·L·出度 为上界。
    pub fn find_spelled_path(&self, sequence: &[u8]) -> Option<Vec<usize>> {
        let first = *sequence.first()?;
        let symbols: Vec<Option<char>> = (0..self.node_count()).map(|ix| self.dot.node_symbol(ix)).collect();
        let matches = |ix: usize, b: u8| symbols[ix] == Some(char::from(b.to_ascii_uppercase()));

        // 后继按边声明顺序；petgraph 的邻接表是逆序的。对齐连线不是序列边
        let successors: Vec<Vec<usize>> = (0..self.node_count())
            .map(|ix| {
                let mut succ: Vec<(usize, usize)> = self
                    .graph
                    .edges_directed(NodeIndex::new(ix), Outgoing)
                    .filter(|e| is_ordering_edge(&self.dot.edges[*e.weight()].attrs))
                    .map(|e| (*e.weight(), e.target().index()))
                    .collect();
                succ.sort_unstable();
                succ.into_iter().map(|(_, t)| t).collect()
            })
            .collect();

        // (节点, 深度)：从该节点出发匹配 sequence[深度..] 必然失败
        let mut dead: HashSet<(usize, usize)> = HashSet::new();
        for start in (0..self.node_count()).filter(|&ix| matches(ix, first)) {
            if dead.contains(&(start, 1)) {
                continue;
            }
            // 显式栈 DFS：(节点, 下一个待尝试的后继位置)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            while !stack.is_empty() {
                let depth = stack.len();
                if depth == sequence.len() {
                    return Some(stack.iter().map(|(n, _)| *n).collect());
                }
                let (ix, tried) = stack[depth - 1];
                let succ = &successors[ix];
                let next = (tried..succ.len()).find(|&k| {
                    matches(succ[k], sequence[depth]) && !dead.contains(&(succ[k], depth + 1))
                });
                match next {
                    Some(k) => {
                        stack[depth - 1].1 = k + 1;
                        stack.push((succ[k], 0));
                    }
                    None => {
                        dead.insert((ix, depth));
                        stack.pop();
                    }
                }
            }
        }
        None
    }
}
