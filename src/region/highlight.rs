use std::collections::{HashMap, HashSet};

use super::Region;
use crate::io::dot::DotGraph;

#[derive(Debug, Clone)]
pub struct HighlightStyle {
    pub fill_color: String,
    pub edge_color: String,
    pub pen_width: f32,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            fill_color: "#ffb000".to_string(),
            edge_color: "#d62728".to_string(),
            pen_width: 3.0,
        }
    }
}

/// 已有 style 时追加 filled，避免覆盖 rounded 之类的形状样式
fn add_filled(style: Option<&str>) -> String {
    match style {
        Some(s) if s.split(',').any(|p| p.trim() == "filled") => s.to_string(),
        Some(s) if !s.trim().is_empty() => format!("{},filled", s),
        _ => "filled".to_string(),
    }
}

/// 抽取区域子图：保留图级属性与默认属性，节点按原声明顺序，
/// 仅保留两端都在区域内的边，并对核心节点与路径边着色。
pub fn extract_subgraph(dot: &DotGraph, region: &Region, style: &HighlightStyle) -> DotGraph {
    let mut sub = dot.empty_like();
    let keep: HashSet<usize> = region.nodes.iter().copied().collect();
    let core: HashSet<usize> = region.core.iter().copied().collect();

    // 序列区域只高亮路径上的边，其它区域高亮核心节点之间的边
    let path_pairs: HashSet<(usize, usize)> =
        region.path.windows(2).map(|w| (w[0], w[1])).collect();

    let mut remap: HashMap<usize, usize> = HashMap::with_capacity(keep.len());
    for (ix, node) in dot.nodes.iter().enumerate() {
        if !keep.contains(&ix) {
            continue;
        }
        let new_ix = sub.add_node(&node.id);
        let mut attrs = node.attrs.clone();
        if core.contains(&ix) {
            attrs.set("style", add_filled(attrs.get("style")));
            attrs.set("fillcolor", style.fill_color.clone());
        }
        sub.nodes[new_ix].attrs = attrs;
        remap.insert(ix, new_ix);
    }

    let mut highlighted_pairs: HashSet<(usize, usize)> = HashSet::new();
    for e in &dot.edges {
        let (Some(&s), Some(&t)) = (remap.get(&e.source), remap.get(&e.target)) else {
            continue;
        };
        let mut attrs = e.attrs.clone();
        let on_path = if region.path.is_empty() {
            core.contains(&e.source) && core.contains(&e.target)
        } else {
            // 平行边只高亮第一条
            path_pairs.contains(&(e.source, e.target))
                && highlighted_pairs.insert((e.source, e.target))
        };
        if on_path {
            attrs.set("color", style.edge_color.clone());
            attrs.set("penwidth", format!("{}", style.pen_width));
        }
        sub.add_edge(s, t, attrs);
    }
    sub
}
