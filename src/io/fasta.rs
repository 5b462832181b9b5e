use anyhow::{anyhow, bail, Result};
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

impl FastaRecord {
    /// 取 [start, end) 子序列；end 为 None 时取到序列末尾
    pub fn region(&self, start: usize, end: Option<usize>) -> Result<&[u8]> {
        let end = end.unwrap_or(self.seq.len());
        if start >= end || end > self.seq.len() {
            bail!(
                "region {}..{} is outside sequence '{}' (length {})",
                start,
                end,
                self.id,
                self.seq.len()
            );
        }
        Ok(&self.seq[start..end])
    }
}

pub struct FastaReader<R: BufRead> {
    reader: R,
    buf: String,
    done: bool,
    peek_header: Option<String>,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            done: false,
            peek_header: None,
        }
    }

    pub fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        if self.done {
            return Ok(None);
        }

        // 定位 header 行
        let header = if let Some(h) = self.peek_header.take() {
            h
        } else {
            loop {
                self.buf.clear();
                let n = self.reader.read_line(&mut self.buf)?;
                if n == 0 {
                    self.done = true;
                    return Ok(None);
                }
                if let Some(h) = self.buf.strip_prefix('>') {
                    break h.trim().to_string();
                }
            }
        };

        let mut parts = header.splitn(2, char::is_whitespace);
        let id = parts.next().unwrap_or("").to_string();
        let desc = parts
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        // 读取序列行直到下一个 header；图节点符号按大写比较，这里统一大写
        let mut seq: Vec<u8> = Vec::new();
        loop {
            self.buf.clear();
            let n = self.reader.read_line(&mut self.buf)?;
            if n == 0 {
                self.done = true;
                break;
            }
            if let Some(h) = self.buf.strip_prefix('>') {
                self.peek_header = Some(h.trim().to_string());
                break;
            }
            seq.extend(
                self.buf
                    .bytes()
                    .filter(|b| !b.is_ascii_whitespace())
                    .map(|b| b.to_ascii_uppercase()),
            );
        }

        Ok(Some(FastaRecord { id, desc, seq }))
    }
}

/// 按 id 查找记录；找不到时报错并列出文件中前几个 id
pub fn read_named_record<P: AsRef<Path>>(path: P, name: &str) -> Result<FastaRecord> {
    let path = path.as_ref();
    let fh = std::fs::File::open(path)
        .map_err(|e| anyhow!("cannot open FASTA '{}': {}", path.display(), e))?;
    let mut reader = FastaReader::new(std::io::BufReader::new(fh));

    let mut seen = Vec::new();
    while let Some(rec) = reader.next_record()? {
        if rec.id == name {
            return Ok(rec);
        }
        if seen.len() < 5 {
            seen.push(rec.id);
        }
    }
    if seen.is_empty() {
        bail!("FASTA file '{}' contains no sequences", path.display());
    }
    bail!(
        "sequence '{}' not found in '{}' (first ids: {})",
        name,
        path.display(),
        seen.join(", ")
    )
}
