use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// 有序属性表，保持输入中的出现顺序，便于输出与原文件对照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs(Vec<(String, String)>);

impl Attrs {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// 已存在则原位替换，否则追加
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.0.push((key.to_string(), value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(pos).1)
    }

    pub fn extend(&mut self, other: &Attrs) {
        for (k, v) in &other.0 {
            self.set(k, v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotNode {
    pub id: String,
    pub attrs: Attrs,
}

/// 边，端点为节点表中的下标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotEdge {
    pub source: usize,
    pub target: usize,
    pub attrs: Attrs,
}

/// 展平后的 DOT 图：子图内的节点与边并入顶层，子图自身属性丢弃。
#[derive(Debug, Clone, Default)]
pub struct DotGraph {
    pub strict: bool,
    pub directed: bool,
    pub name: Option<String>,
    /// 输出时写在图前的 `//` 注释行
    pub comments: Vec<String>,
    pub graph_attrs: Attrs,
    pub node_defaults: Attrs,
    pub edge_defaults: Attrs,
    pub nodes: Vec<DotNode>,
    pub edges: Vec<DotEdge>,
    index: HashMap<String, usize>,
}

impl DotGraph {
    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// 返回节点下标；节点不存在时新建
    pub fn add_node(&mut self, id: &str) -> usize {
        if let Some(&ix) = self.index.get(id) {
            return ix;
        }
        let ix = self.nodes.len();
        self.nodes.push(DotNode { id: id.to_string(), attrs: Attrs::new() });
        self.index.insert(id.to_string(), ix);
        ix
    }

    pub fn add_edge(&mut self, source: usize, target: usize, attrs: Attrs) -> usize {
        self.edges.push(DotEdge { source, target, attrs });
        self.edges.len() - 1
    }

    /// 节点对应的碱基/符号：优先取 label 的首字符，否则取 id 首字符，统一大写。
    pub fn node_symbol(&self, ix: usize) -> Option<char> {
        let node = &self.nodes[ix];
        let text = match node.attrs.get("label") {
            Some(l) if !is_html(l) && !l.is_empty() => l,
            _ => node.id.as_str(),
        };
        text.chars().next().map(|c| c.to_ascii_uppercase())
    }

    /// 复制图级信息（属性、默认属性、名称），不含节点与边
    pub fn empty_like(&self) -> Self {
        Self {
            strict: self.strict,
            directed: self.directed,
            name: self.name.clone(),
            comments: Vec::new(),
            graph_attrs: self.graph_attrs.clone(),
            node_defaults: self.node_defaults.clone(),
            edge_defaults: self.edge_defaults.clone(),
            nodes: Vec::new(),
            edges: Vec::new(),
            index: HashMap::new(),
        }
    }
}

pub fn read_dot_file<P: AsRef<Path>>(path: P) -> Result<DotGraph> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("cannot read DOT file '{}': {}", path.display(), e))?;
    parse_dot(&text).map_err(|e| anyhow!("{}: {}", path.display(), e))
}

pub fn parse_dot(text: &str) -> Result<DotGraph> {
    let toks = Lexer::new(text).tokenize()?;
    let mut p = Parser { toks, pos: 0, depth: 0, graph: DotGraph::default() };
    p.parse_graph()?;
    Ok(p.graph)
}

// ── 词法 ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    /// 标识符、数字、引号串或 HTML 串；`quoted` 为真时不可能是关键字
    Id { text: String, quoted: bool },
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Eq,
    Semi,
    Comma,
    Colon,
    DirEdge,
    UndirEdge,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
    col: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    fn new(text: &str) -> Self {
        Self { chars: text.chars().collect(), pos: 0, line: 1, col: 1 }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.peek(0), self.peek(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => self.skip_line(),
                // 行首的 # 为 C 预处理器输出，整行忽略
                (Some('#'), _) if self.at_line_start() => self.skip_line(),
                (Some('/'), Some('*')) => {
                    let (line, col) = (self.line, self.col);
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(0), self.peek(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => bail!("{}:{}: unterminated comment", line, col),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn at_line_start(&self) -> bool {
        self.chars[..self.pos]
            .iter()
            .rev()
            .take_while(|&&c| c != '\n')
            .all(|c| c.is_whitespace())
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia()?;
            let (line, col) = (self.line, self.col);
            let c = match self.peek(0) {
                Some(c) => c,
                None => {
                    out.push(Token { tok: Tok::Eof, line, col });
                    return Ok(out);
                }
            };
            let tok = match c {
                '{' => { self.bump(); Tok::LBrace }
                '}' => { self.bump(); Tok::RBrace }
                '[' => { self.bump(); Tok::LBracket }
                ']' => { self.bump(); Tok::RBracket }
                '=' => { self.bump(); Tok::Eq }
                ';' => { self.bump(); Tok::Semi }
                ',' => { self.bump(); Tok::Comma }
                ':' => { self.bump(); Tok::Colon }
                '-' if self.peek(1) == Some('>') => {
                    self.bump();
                    self.bump();
                    Tok::DirEdge
                }
                '-' if self.peek(1) == Some('-') => {
                    self.bump();
                    self.bump();
                    Tok::UndirEdge
                }
                '"' => Tok::Id { text: self.quoted_concat(line, col)?, quoted: true },
                '<' => Tok::Id { text: self.html(line, col)?, quoted: true },
                c if c == '-' || c == '.' || c.is_ascii_digit() => {
                    Tok::Id { text: self.numeral(line, col)?, quoted: false }
                }
                c if c == '_' || c.is_alphabetic() || !c.is_ascii() => {
                    Tok::Id { text: self.identifier(), quoted: false }
                }
                other => bail!("{}:{}: unexpected character '{}'", line, col, other),
            };
            out.push(Token { tok, line, col });
        }
    }

    fn identifier(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek(0) {
            if c == '_' || c.is_alphanumeric() || !c.is_ascii() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn numeral(&mut self, line: usize, col: usize) -> Result<String> {
        let mut s = String::new();
        if self.peek(0) == Some('-') {
            s.push('-');
            self.bump();
        }
        let mut seen_dot = false;
        let mut seen_digit = false;
        while let Some(c) = self.peek(0) {
            if c.is_ascii_digit() {
                seen_digit = true;
            } else if c == '.' && !seen_dot {
                seen_dot = true;
            } else {
                break;
            }
            s.push(c);
            self.bump();
        }
        if !seen_digit {
            bail!("{}:{}: malformed numeral '{}'", line, col, s);
        }
        Ok(s)
    }

    /// 引号串，支持 `"a" + "b"` 拼接
    fn quoted_concat(&mut self, line: usize, col: usize) -> Result<String> {
        let mut s = self.quoted(line, col)?;
        loop {
            let save = (self.pos, self.line, self.col);
            self.skip_trivia()?;
            if self.peek(0) == Some('+') {
                self.bump();
                self.skip_trivia()?;
                if self.peek(0) == Some('"') {
                    let (l, c) = (self.line, self.col);
                    s.push_str(&self.quoted(l, c)?);
                    continue;
                }
                bail!("{}:{}: expected quoted string after '+'", self.line, self.col);
            }
            (self.pos, self.line, self.col) = save;
            return Ok(s);
        }
    }

    fn quoted(&mut self, line: usize, col: usize) -> Result<String> {
        self.bump(); // 开引号
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(s),
                Some('\\') => match self.peek(0) {
                    Some('"') => {
                        self.bump();
                        s.push('"');
                    }
                    // 续行
                    Some('\n') => {
                        self.bump();
                    }
                    Some('\r') if self.peek(1) == Some('\n') => {
                        self.bump();
                        self.bump();
                    }
                    _ => s.push('\\'),
                },
                Some(c) => s.push(c),
                None => bail!("{}:{}: unterminated string", line, col),
            }
        }
    }

    fn html(&mut self, line: usize, col: usize) -> Result<String> {
        let mut depth = 0usize;
        let mut s = String::new();
        loop {
            let c = self.bump().ok_or_else(|| anyhow!("{}:{}: unterminated HTML string", line, col))?;
            s.push(c);
            match c {
                '<' => depth += 1,
                '>' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(s);
                    }
                }
                _ => {}
            }
        }
    }
}

fn is_keyword(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "node" | "edge" | "graph" | "digraph" | "subgraph" | "strict"
    )
}

fn is_html(s: &str) -> bool {
    s.starts_with('<') && s.ends_with('>')
}

// ── 语法 ──────────────────────────────────────────────

struct Parser {
    toks: Vec<Token>,
    pos: usize,
    /// 子图嵌套深度，0 为顶层
    depth: usize,
    graph: DotGraph,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.toks[self.pos].tok
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        let i = (self.pos + ahead).min(self.toks.len() - 1);
        &self.toks[i].tok
    }

    fn next(&mut self) -> Token {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn error<T>(&self, what: &str) -> Result<T> {
        let t = &self.toks[self.pos];
        let found = match &t.tok {
            Tok::Id { text, .. } => format!("'{}'", text),
            Tok::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        };
        bail!("{}:{}: expected {}, found {}", t.line, t.col, what, found)
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<()> {
        if *self.peek() == tok {
            self.next();
            Ok(())
        } else {
            self.error(what)
        }
    }

    fn is_kw(&self, kw: &str) -> bool {
        self.is_kw_at(0, kw)
    }

    fn is_kw_at(&self, ahead: usize, kw: &str) -> bool {
        matches!(self.peek_at(ahead), Tok::Id { text, quoted: false } if text.eq_ignore_ascii_case(kw))
    }

    fn id(&mut self, what: &str) -> Result<String> {
        match self.peek().clone() {
            Tok::Id { text, quoted } if quoted || !is_keyword(&text) => {
                self.next();
                Ok(text)
            }
            _ => self.error(what),
        }
    }

    fn parse_graph(&mut self) -> Result<()> {
        if self.is_kw("strict") {
            self.next();
            self.graph.strict = true;
        }
        if self.is_kw("digraph") {
            self.graph.directed = true;
        } else if !self.is_kw("graph") {
            return self.error("'graph' or 'digraph'");
        }
        self.next();
        if let Tok::Id { .. } = self.peek() {
            self.graph.name = Some(self.id("graph name")?);
        }
        self.expect(Tok::LBrace, "'{'")?;
        self.stmt_list()?;
        self.expect(Tok::RBrace, "'}'")?;
        if *self.peek() != Tok::Eof {
            return self.error("end of input");
        }
        Ok(())
    }

    /// 解析到 `}` 为止，返回块中出现过的节点（供子图作为边端点使用）
    fn stmt_list(&mut self) -> Result<Vec<usize>> {
        let mut mentioned = Vec::new();
        loop {
            match self.peek() {
                Tok::RBrace | Tok::Eof => return Ok(mentioned),
                Tok::Semi | Tok::Comma => {
                    self.next();
                }
                _ => self.stmt(&mut mentioned)?,
            }
        }
    }

    fn stmt(&mut self, mentioned: &mut Vec<usize>) -> Result<()> {
        // graph/node/edge 属性语句
        for kw in ["graph", "node", "edge"] {
            if self.is_kw(kw) && *self.peek_at(1) == Tok::LBracket {
                self.next();
                let attrs = self.attr_lists()?;
                if self.depth == 0 {
                    let target = match kw {
                        "graph" => &mut self.graph.graph_attrs,
                        "node" => &mut self.graph.node_defaults,
                        _ => &mut self.graph.edge_defaults,
                    };
                    target.extend(&attrs);
                }
                return Ok(());
            }
        }

        let first = if self.is_kw("subgraph") || *self.peek() == Tok::LBrace {
            self.subgraph()?
        } else {
            let id = self.id("node identifier")?;
            if *self.peek() == Tok::Eq {
                self.next();
                let value = self.id("attribute value")?;
                if self.depth == 0 {
                    self.graph.graph_attrs.set(&id, value);
                }
                return Ok(());
            }
            self.port()?;
            let ix = self.graph.add_node(&id);
            if !matches!(self.peek(), Tok::DirEdge | Tok::UndirEdge) {
                let attrs = self.attr_lists()?;
                self.graph.nodes[ix].attrs.extend(&attrs);
            }
            vec![ix]
        };
        mentioned.extend(first.iter().copied());

        if matches!(self.peek(), Tok::DirEdge | Tok::UndirEdge) {
            self.edge_chain(first, mentioned)?;
        }
        Ok(())
    }

    fn edge_chain(&mut self, first: Vec<usize>, mentioned: &mut Vec<usize>) -> Result<()> {
        let mut endpoints = vec![first];
        while matches!(self.peek(), Tok::DirEdge | Tok::UndirEdge) {
            let op = self.next();
            if (op.tok == Tok::UndirEdge) == self.graph.directed {
                let expected = if self.graph.directed { "->" } else { "--" };
                bail!("{}:{}: edge operator does not match graph type, expected '{}'", op.line, op.col, expected);
            }
            let group = if self.is_kw("subgraph") || *self.peek() == Tok::LBrace {
                self.subgraph()?
            } else {
                let id = self.id("node identifier")?;
                self.port()?;
                vec![self.graph.add_node(&id)]
            };
            mentioned.extend(group.iter().copied());
            endpoints.push(group);
        }
        let attrs = self.attr_lists()?;
        for pair in endpoints.windows(2) {
            for &s in &pair[0] {
                for &t in &pair[1] {
                    self.graph.add_edge(s, t, attrs.clone());
                }
            }
        }
        Ok(())
    }

    fn subgraph(&mut self) -> Result<Vec<usize>> {
        if self.is_kw("subgraph") {
            self.next();
            if let Tok::Id { .. } = self.peek() {
                self.id("subgraph name")?;
            }
        }
        self.expect(Tok::LBrace, "'{'")?;
        self.depth += 1;
        let nodes = self.stmt_list()?;
        self.depth -= 1;
        self.expect(Tok::RBrace, "'}'")?;
        Ok(nodes)
    }

    /// 端口（`node:port[:compass]`）只影响绘制，直接丢弃
    fn port(&mut self) -> Result<()> {
        for _ in 0..2 {
            if *self.peek() != Tok::Colon {
                break;
            }
            self.next();
            self.id("port")?;
        }
        Ok(())
    }

    fn attr_lists(&mut self) -> Result<Attrs> {
        let mut attrs = Attrs::new();
        while *self.peek() == Tok::LBracket {
            self.next();
            loop {
                match self.peek() {
                    Tok::RBracket => {
                        self.next();
                        break;
                    }
                    Tok::Semi | Tok::Comma => {
                        self.next();
                    }
                    Tok::Id { text, .. } => {
                        let key = text.clone();
                        self.next();
                        let value = if *self.peek() == Tok::Eq {
                            self.next();
                            match self.peek().clone() {
                                Tok::Id { text, .. } => {
                                    self.next();
                                    text
                                }
                                _ => return self.error("attribute value"),
                            }
                        } else {
                            "true".to_string()
                        };
                        attrs.set(&key, value);
                    }
                    _ => return self.error("attribute or ']'"),
                }
            }
        }
        Ok(attrs)
    }
}

// ── 输出 ──────────────────────────────────────────────

fn is_plain_id(s: &str) -> bool {
    let mut chars = s.chars();
    let plain_ident = match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            s.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    };
    let numeral = {
        let body = s.strip_prefix('-').unwrap_or(s);
        !body.is_empty()
            && body.chars().any(|c| c.is_ascii_digit())
            && body.chars().all(|c| c.is_ascii_digit() || c == '.')
            && body.matches('.').count() <= 1
    };
    (plain_ident && !is_keyword(s)) || numeral
}

fn fmt_id(s: &str) -> String {
    if is_plain_id(s) || is_html(s) {
        s.to_string()
    } else {
        quote(s)
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\\\""))
}

fn fmt_value(s: &str) -> String {
    if is_html(s) { s.to_string() } else { quote(s) }
}

fn fmt_attrs(attrs: &Attrs) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!("{}={}", fmt_id(k), fmt_value(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn write_dot<W: Write>(out: &mut W, graph: &DotGraph) -> Result<()> {
    for c in &graph.comments {
        writeln!(out, "// {}", c)?;
    }
    let kind = if graph.directed { "digraph" } else { "graph" };
    let strict = if graph.strict { "strict " } else { "" };
    match &graph.name {
        Some(name) => writeln!(out, "{}{} {} {{", strict, kind, fmt_id(name))?,
        None => writeln!(out, "{}{} {{", strict, kind)?,
    }
    for (label, attrs) in [
        ("graph", &graph.graph_attrs),
        ("node", &graph.node_defaults),
        ("edge", &graph.edge_defaults),
    ] {
        if !attrs.is_empty() {
            writeln!(out, "    {} [{}];", label, fmt_attrs(attrs))?;
        }
    }
    for node in &graph.nodes {
        if node.attrs.is_empty() {
            writeln!(out, "    {};", fmt_id(&node.id))?;
        } else {
            writeln!(out, "    {} [{}];", fmt_id(&node.id), fmt_attrs(&node.attrs))?;
        }
    }
    let op = if graph.directed { "->" } else { "--" };
    for e in &graph.edges {
        let s = fmt_id(&graph.nodes[e.source].id);
        let t = fmt_id(&graph.nodes[e.target].id);
        if e.attrs.is_empty() {
            writeln!(out, "    {} {} {};", s, op, t)?;
        } else {
            writeln!(out, "    {} {} {} [{}];", s, op, t, fmt_attrs(&e.attrs))?;
        }
    }
    writeln!(out, "}}")?;
    Ok(())
}

pub fn dot_to_string(graph: &DotGraph) -> Result<String> {
    let mut buf = Vec::new();
    write_dot(&mut buf, graph)?;
    Ok(String::from_utf8(buf)?)
}
