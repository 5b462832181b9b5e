//! # poasta-tools
//!
//! [POASTA](https://github.com/broadinstitute/poasta) 输出的辅助工具。
//!
//! 本 crate 提供两个命令行工具及其库接口：
//!
//! - **`poasta_graphviz_region`**：从 `poasta view` 生成的 GraphViz DOT 文件中
//!   抽取一个区域（节点邻域、拓扑秩窗口或某段序列对应的路径），高亮后输出子图
//! - **`poasta_plot`**：读取比对器的调试输出（A* 访问过的状态），
//!   绘制匹配/删除/插入三个 DP 矩阵的静态图与动画
//!
//! ## 快速示例
//!
//! ```rust
//! use poasta_tools::io::dot;
//! use poasta_tools::region::{extract_subgraph, select_region, HighlightStyle, RegionSpec};
//!
//! let graph = dot::parse_dot(r#"digraph {
//!     a [label="A"]; c [label="C"]; g [label="G"]; t [label="T"];
//!     a -> c -> t; a -> g -> t;
//! }"#).unwrap();
//!
//! let spec = RegionSpec::Sequence { seq: b"AGT".to_vec(), context: 0 };
//! let region = select_region(&graph, &spec).unwrap();
//! let sub = extract_subgraph(&graph, &region, &HighlightStyle::default());
//! assert_eq!(sub.nodes.len(), 3);
//! ```
//!
//! ## 模块说明
//!
//! - [`io`] — DOT 读写、visited TSV、调试输出目录、FASTA、graphviz 渲染
//! - [`graph`] — DOT 图上的拓扑秩、邻域与序列路径查找
//! - [`region`] — 区域选取与高亮子图抽取
//! - [`plot`] — DP 矩阵构建与栅格化
//! - [`util`] — 日志初始化

pub mod graph;
pub mod io;
pub mod plot;
pub mod region;
pub mod util;
