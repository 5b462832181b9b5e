use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// 比对状态（A* 搜索中的 DP 矩阵种类）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignState {
    Start,
    Match,
    Mismatch,
    Deletion,
    Insertion,
    Deletion2,
    Insertion2,
}

/// 绘图时的三个面板：匹配、删除、插入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Panel {
    Match = 0,
    Deletion = 1,
    Insertion = 2,
}

impl Panel {
    pub const ALL: [Panel; 3] = [Panel::Match, Panel::Deletion, Panel::Insertion];
}

impl AlignState {
    pub fn panel(self) -> Panel {
        match self {
            AlignState::Start | AlignState::Match | AlignState::Mismatch => Panel::Match,
            AlignState::Deletion | AlignState::Deletion2 => Panel::Deletion,
            AlignState::Insertion | AlignState::Insertion2 => Panel::Insertion,
        }
    }
}

impl FromStr for AlignState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let state = match s.to_ascii_lowercase().as_str() {
            "start" => AlignState::Start,
            "match" => AlignState::Match,
            "mismatch" => AlignState::Mismatch,
            "deletion" => AlignState::Deletion,
            "insertion" => AlignState::Insertion,
            "deletion2" => AlignState::Deletion2,
            "insertion2" => AlignState::Insertion2,
            _ => bail!("unknown alignment state '{}'", s),
        };
        Ok(state)
    }
}

impl fmt::Display for AlignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl<'de> Deserialize<'de> for AlignState {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// visited TSV 中的一行：node_id, offset, matrix, score
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VisitedRecord {
    pub node_id: String,
    pub offset: usize,
    pub matrix: AlignState,
    pub score: u32,
    /// 在源文件中的行号，仅用于报错
    #[serde(skip)]
    pub line: usize,
}

pub fn read_visited<P: AsRef<Path>>(path: P) -> Result<Vec<VisitedRecord>> {
    let path = path.as_ref();
    let f = std::fs::File::open(path)
        .map_err(|e| anyhow!("cannot open visited-state table '{}': {}", path.display(), e))?;
    parse_visited(std::io::BufReader::new(f)).map_err(|e| anyhow!("{}: {}", path.display(), e))
}

/// 解析 visited 表；首行以 `node_id` 开头时视为表头。
pub fn parse_visited<R: Read>(reader: R) -> Result<Vec<VisitedRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut out = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec?;
        if i == 0 && rec.get(0) == Some("node_id") {
            continue;
        }
        let line = rec.position().map(|p| p.line()).unwrap_or(0);
        if rec.len() != 4 {
            bail!("line {}: expected 4 columns (node_id, offset, matrix, score), found {}", line, rec.len());
        }
        let mut parsed: VisitedRecord = rec
            .deserialize(None)
            .map_err(|e| anyhow!("line {}: {}", line, e))?;
        parsed.line = line as usize;
        out.push(parsed);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_header() {
        let data = "node_id\toffset\tmatrix\tscore\n2\t0\tMatch\t0\n3\t1\tDeletion\t6\n";
        let recs = parse_visited(data.as_bytes()).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0], VisitedRecord { node_id: "2".into(), offset: 0, matrix: AlignState::Match, score: 0, line: 2 });
        assert_eq!(recs[1].matrix, AlignState::Deletion);
        assert_eq!(recs[1].score, 6);
    }

    #[test]
    fn parse_without_header_and_lowercase_states() {
        let data = "5\t2\tinsertion2\t10\n# comment\n6\t3\tSTART\t0\n";
        let recs = parse_visited(data.as_bytes()).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].matrix.panel(), Panel::Insertion);
        assert_eq!(recs[1].matrix, AlignState::Start);
        assert_eq!(recs[1].line, 3);
    }

    #[test]
    fn bad_rows_report_line() {
        let err = parse_visited("1\t0\tMatch\t0\n1\tx\tMatch\t0\n".as_bytes()).unwrap_err();
        assert!(err.to_string().starts_with("line 2:"), "{}", err);
        let err = parse_visited("1\t0\tBogus\t0\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("unknown alignment state"));
        assert!(parse_visited("1\t0\n".as_bytes()).is_err());
    }

    #[test]
    fn panels_group_states() {
        assert_eq!(AlignState::Mismatch.panel(), Panel::Match);
        assert_eq!(AlignState::Deletion2.panel(), Panel::Deletion);
        assert_eq!(AlignState::Insertion.panel(), Panel::Insertion);
    }
}
