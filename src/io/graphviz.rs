use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// 输出格式：DOT 文本直接写出，其余交给 graphviz 的 `dot` 渲染
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Dot,
    Png,
    Svg,
    Pdf,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dot" | "gv" => Ok(Self::Dot),
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            "pdf" => Ok(Self::Pdf),
            other => bail!("unsupported output format '{}' (expected dot, png, svg or pdf)", other),
        }
    }

    /// 由扩展名推断；无扩展名时按 DOT 处理
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => Self::parse(ext),
            None => Ok(Self::Dot),
        }
    }

    fn dot_flag(self) -> &'static str {
        match self {
            Self::Dot => "-Tdot",
            Self::Png => "-Tpng",
            Self::Svg => "-Tsvg",
            Self::Pdf => "-Tpdf",
        }
    }
}

/// 可执行文件名，可通过 POASTA_DOT 环境变量覆盖
fn dot_program() -> String {
    std::env::var("POASTA_DOT").unwrap_or_else(|_| "dot".to_string())
}

pub fn render(dot_text: &str, format: OutputFormat, out_path: &Path) -> Result<()> {
    if format == OutputFormat::Dot {
        std::fs::write(out_path, dot_text)
            .with_context(|| format!("cannot write '{}'", out_path.display()))?;
        return Ok(());
    }
    run_dot(&dot_program(), dot_text, format, out_path)
}

fn run_dot(program: &str, dot_text: &str, format: OutputFormat, out_path: &Path) -> Result<()> {
    log::debug!("running {} {} -o {}", program, format.dot_flag(), out_path.display());
    let mut child = Command::new(program)
        .arg(format.dot_flag())
        .arg("-o")
        .arg(out_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| anyhow!("cannot run graphviz '{}' (is graphviz installed?): {}", program, e))?;

    {
        let mut stdin = child.stdin.take().ok_or_else(|| anyhow!("graphviz stdin unavailable"))?;
        // 程序提前退出时管道已断开，错误原因以退出状态与 stderr 为准
        if let Err(e) = stdin.write_all(dot_text.as_bytes()) {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        bail!(
            "graphviz exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("a.dot")).unwrap(), OutputFormat::Dot);
        assert_eq!(OutputFormat::from_path(Path::new("a.GV")).unwrap(), OutputFormat::Dot);
        assert_eq!(OutputFormat::from_path(Path::new("out/a.svg")).unwrap(), OutputFormat::Svg);
        assert_eq!(OutputFormat::from_path(Path::new("region")).unwrap(), OutputFormat::Dot);
        assert!(OutputFormat::from_path(Path::new("a.jpg")).is_err());
    }

    #[test]
    fn dot_format_writes_text() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("g.dot");
        render("digraph { a -> b }\n", OutputFormat::Dot, &out).unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "digraph { a -> b }\n");
    }

    #[test]
    fn missing_program_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dot");
        let err = run_dot(missing.to_str().unwrap(), "digraph {}", OutputFormat::Svg, &dir.path().join("g.svg"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("cannot run graphviz"), "{}", err);
        assert!(err.contains("no-such-dot"), "{}", err);
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_reports_status_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("g.png");

        let err = run_dot("false", "digraph {}", OutputFormat::Png, &out).unwrap_err().to_string();
        assert!(err.starts_with("graphviz exited with"), "{}", err);

        // sh 不认识 -Tpng，会在 stderr 报告非法选项
        let err = run_dot("sh", "digraph {}", OutputFormat::Png, &out).unwrap_err().to_string();
        assert!(err.starts_with("graphviz exited with"), "{}", err);
        assert!(err.contains("option"), "{}", err);
    }
}
