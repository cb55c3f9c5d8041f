//! # Trellis CSS Parser
//!
//! Stateless CSS grammar used by the Trellis CSSOM.
//!
//! The parser turns text into a plain AST: style rules, the common at-rules
//! (`@charset`, `@import`, `@namespace`, `@media`, `@supports`, `@font-face`,
//! `@page`), unknown at-rules and comments. It follows the CSS error recovery
//! model loosely: malformed rules are dropped, an unclosed block is closed at
//! end of input, and whole-sheet parsing never fails.

use thiserror::Error;

/// Errors that can occur while parsing a single rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("Invalid rule: {0}")]
    Invalid(String),
}

/// Grammar switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserOptions {
    /// Keep comments between rules as [`NodeAst::Comment`].
    pub keep_comments: bool,
    /// Keep unrecognized at-rules as [`RuleAst::Unknown`].
    pub include_unknown_rules: bool,
}

/// A parsed stylesheet AST.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StylesheetAst {
    pub nodes: Vec<NodeAst>,
}

impl StylesheetAst {
    /// Rules in source order, skipping comments.
    pub fn rules(&self) -> impl Iterator<Item = &RuleAst> {
        self.nodes.iter().filter_map(NodeAst::as_rule)
    }
}

/// Entry of a rule list.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeAst {
    Rule(RuleAst),
    Comment(String),
}

impl NodeAst {
    pub fn as_rule(&self) -> Option<&RuleAst> {
        match self {
            NodeAst::Rule(rule) => Some(rule),
            NodeAst::Comment(_) => None,
        }
    }
}

/// A parsed rule AST.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleAst {
    Style {
        selector: String,
        declarations: Vec<DeclarationAst>,
    },
    Charset {
        encoding: String,
    },
    Import {
        href: String,
        media: Vec<String>,
    },
    Namespace {
        prefix: Option<String>,
        uri: String,
    },
    Media {
        media: Vec<String>,
        rules: Vec<NodeAst>,
    },
    Supports {
        condition: String,
        rules: Vec<NodeAst>,
    },
    FontFace {
        declarations: Vec<DeclarationAst>,
    },
    Page {
        selector: String,
        declarations: Vec<DeclarationAst>,
    },
    Unknown {
        name: String,
        prelude: String,
        block: Option<String>,
    },
}

impl RuleAst {
    /// Whether this rule constrains later `@import`/`@namespace` rules.
    pub fn is_declarative(&self) -> bool {
        !matches!(
            self,
            RuleAst::Charset { .. } | RuleAst::Import { .. } | RuleAst::Namespace { .. }
        )
    }
}

/// A parsed declaration AST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationAst {
    pub property: String,
    pub value: String,
    pub important: bool,
}

/// Parse a stylesheet into an AST.
///
/// Top-level ordering follows CSS 2.1: `@charset` only as the first rule,
/// `@import` only before anything but `@charset`/`@import`, `@namespace` only
/// before declarative rules. Out-of-place rules are dropped.
pub fn parse_stylesheet(css: &str, options: ParserOptions) -> StylesheetAst {
    let nodes = Parser::new(css, options).rule_list();
    StylesheetAst {
        nodes: enforce_top_level_order(nodes),
    }
}

/// Parse exactly one rule, as `insertRule` does.
pub fn parse_rule(css: &str, options: ParserOptions) -> Result<RuleAst, ParseError> {
    let options = ParserOptions {
        keep_comments: false,
        ..options
    };
    let mut parser = Parser::new(css, options);
    parser.skip_trivia(&mut Vec::new());
    if parser.eof() {
        return Err(ParseError::UnexpectedEof);
    }
    let rule = parser
        .rule()
        .ok_or_else(|| ParseError::Invalid(css.trim().to_string()))?;
    parser.skip_trivia(&mut Vec::new());
    if !parser.eof() {
        return Err(ParseError::Invalid(format!(
            "trailing input after rule: {}",
            parser.rest().trim()
        )));
    }
    Ok(rule)
}

/// Parse the body of a declaration block (no braces, no selector).
pub fn parse_declarations(css: &str) -> Vec<DeclarationAst> {
    let mut out = Vec::new();
    let mut scanner = Scanner::new(css);
    while !scanner.eof() {
        let start = scanner.pos;
        let stop = scanner.scan_until(b";");
        let chunk = &css[start..scanner.pos];
        if let Some(decl) = declaration(chunk) {
            out.push(decl);
        }
        if stop.is_some() {
            scanner.pos += 1;
        }
    }
    out
}

/// Parse a comma-separated media query list.
pub fn parse_media_list(css: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut scanner = Scanner::new(css);
    while !scanner.eof() {
        let start = scanner.pos;
        let stop = scanner.scan_until(b",");
        let query = normalize_whitespace(&strip_comments(&css[start..scanner.pos]));
        if !query.is_empty() {
            out.push(query.to_ascii_lowercase());
        }
        if stop.is_some() {
            scanner.pos += 1;
        }
    }
    out
}

/// Split a trailing `!important` off a declaration value.
pub fn strip_important(value: &str) -> (&str, bool) {
    let trimmed = value.trim_end();
    let lower = trimmed.to_ascii_lowercase();
    if lower.ends_with("important") {
        let head = trimmed[..trimmed.len() - "important".len()].trim_end();
        if let Some(before) = head.strip_suffix('!') {
            return (before.trim_end(), true);
        }
    }
    (value, false)
}

fn declaration(chunk: &str) -> Option<DeclarationAst> {
    let chunk = strip_comments(chunk);
    let (property, value_raw) = chunk.split_once(':')?;
    let property = property.trim();
    let value_raw = value_raw.trim();
    if property.is_empty()
        || value_raw.is_empty()
        || property.chars().any(|c| c.is_whitespace() || c == '{' || c == '}')
    {
        return None;
    }
    let property = if property.starts_with("--") {
        property.to_string()
    } else {
        property.to_ascii_lowercase()
    };
    let (value, important) = strip_important(value_raw);
    if value.is_empty() {
        return None;
    }
    Some(DeclarationAst {
        property,
        value: value.to_string(),
        important,
    })
}

fn enforce_top_level_order(nodes: Vec<NodeAst>) -> Vec<NodeAst> {
    let mut out = Vec::with_capacity(nodes.len());
    let mut seen_rule = false;
    let mut seen_namespace = false;
    let mut seen_declarative = false;
    for node in nodes {
        let keep = match &node {
            NodeAst::Comment(_) => true,
            NodeAst::Rule(RuleAst::Charset { .. }) => !seen_rule,
            NodeAst::Rule(RuleAst::Import { .. }) => !seen_namespace && !seen_declarative,
            NodeAst::Rule(RuleAst::Namespace { .. }) => {
                let ok = !seen_declarative;
                seen_namespace |= ok;
                ok
            }
            NodeAst::Rule(_) => {
                seen_declarative = true;
                true
            }
        };
        if keep {
            if matches!(node, NodeAst::Rule(_)) {
                seen_rule = true;
            }
            out.push(node);
        }
    }
    out
}

struct Parser<'a> {
    scanner: Scanner<'a>,
    options: ParserOptions,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, options: ParserOptions) -> Self {
        Self {
            scanner: Scanner::new(src),
            options,
        }
    }

    fn eof(&self) -> bool {
        self.scanner.eof()
    }

    fn rest(&self) -> &'a str {
        &self.scanner.src[self.scanner.pos..]
    }

    /// Skip whitespace, CDO/CDC and comments, collecting comments if asked.
    fn skip_trivia(&mut self, comments: &mut Vec<NodeAst>) {
        loop {
            self.scanner.skip_whitespace();
            if self.scanner.starts_with("/*") {
                let text = self.scanner.comment();
                if self.options.keep_comments {
                    comments.push(NodeAst::Comment(text.to_string()));
                }
            } else if self.scanner.starts_with("<!--") {
                self.scanner.pos += 4;
            } else if self.scanner.starts_with("-->") {
                self.scanner.pos += 3;
            } else {
                return;
            }
        }
    }

    fn rule_list(&mut self) -> Vec<NodeAst> {
        let mut nodes = Vec::new();
        loop {
            self.skip_trivia(&mut nodes);
            match self.scanner.peek() {
                None => break,
                Some(b'}') | Some(b';') => self.scanner.pos += 1,
                Some(_) => {
                    if let Some(rule) = self.rule() {
                        nodes.push(NodeAst::Rule(rule));
                    }
                }
            }
        }
        nodes
    }

    fn rule(&mut self) -> Option<RuleAst> {
        if self.scanner.peek() == Some(b'@') {
            self.at_rule()
        } else {
            self.style_rule()
        }
    }

    fn style_rule(&mut self) -> Option<RuleAst> {
        let start = self.scanner.pos;
        self.scanner.scan_until(b"{")?;
        let prelude = &self.scanner.src[start..self.scanner.pos];
        let body = self.scanner.block();
        let selector = normalize_whitespace(&strip_comments(prelude));
        if selector.is_empty() || selector.contains(';') || selector.contains('}') {
            return None;
        }
        Some(RuleAst::Style {
            selector,
            declarations: parse_declarations(body),
        })
    }

    fn at_rule(&mut self) -> Option<RuleAst> {
        self.scanner.pos += 1;
        let name = self.scanner.ident().to_ascii_lowercase();
        let start = self.scanner.pos;
        let stop = self.scanner.scan_until(b";{");
        let prelude = strip_comments(&self.scanner.src[start..self.scanner.pos]);
        let prelude = prelude.trim();
        let block = match stop {
            Some(b'{') => Some(self.scanner.block()),
            Some(_) => {
                self.scanner.pos += 1;
                None
            }
            None => None,
        };

        match (name.as_str(), block) {
            ("charset", None) => {
                let (encoding, rest) = quoted(prelude)?;
                rest.trim().is_empty().then_some(RuleAst::Charset { encoding })
            }
            ("import", None) => {
                let (href, rest) = url_or_string(prelude)?;
                Some(RuleAst::Import {
                    href,
                    media: parse_media_list(rest),
                })
            }
            ("namespace", None) => namespace(prelude),
            ("media", Some(body)) => Some(RuleAst::Media {
                media: parse_media_list(prelude),
                rules: self.nested(body),
            }),
            ("supports", Some(body)) if !prelude.is_empty() => Some(RuleAst::Supports {
                condition: normalize_whitespace(prelude),
                rules: self.nested(body),
            }),
            ("font-face", Some(body)) => Some(RuleAst::FontFace {
                declarations: parse_declarations(body),
            }),
            ("page", Some(body)) => Some(RuleAst::Page {
                selector: normalize_whitespace(prelude),
                declarations: parse_declarations(body),
            }),
            ("charset" | "import" | "namespace" | "media" | "supports" | "font-face" | "page", _) => {
                None
            }
            (_, block) if self.options.include_unknown_rules && !name.is_empty() => {
                Some(RuleAst::Unknown {
                    name,
                    prelude: normalize_whitespace(prelude),
                    block: block.map(|b| b.trim().to_string()),
                })
            }
            _ => None,
        }
    }

    /// Rules inside a conditional group. Only declarative rules are allowed.
    fn nested(&self, body: &str) -> Vec<NodeAst> {
        Parser::new(body, self.options)
            .rule_list()
            .into_iter()
            .filter(|node| match node {
                NodeAst::Rule(rule) => rule.is_declarative(),
                NodeAst::Comment(_) => true,
            })
            .collect()
    }
}

fn namespace(prelude: &str) -> Option<RuleAst> {
    let prelude = prelude.trim();
    if let Some((uri, rest)) = url_or_string(prelude) {
        return rest
            .trim()
            .is_empty()
            .then_some(RuleAst::Namespace { prefix: None, uri });
    }
    let mut scanner = Scanner::new(prelude);
    let prefix = scanner.ident();
    if prefix.is_empty() {
        return None;
    }
    let (uri, rest) = url_or_string(scanner.rest().trim())?;
    rest.trim().is_empty().then(|| RuleAst::Namespace {
        prefix: Some(prefix.to_string()),
        uri,
    })
}

/// Read a leading `url(...)` or quoted string; return it and the remainder.
fn url_or_string(text: &str) -> Option<(String, &str)> {
    let text = text.trim_start();
    if text.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("url(")) {
        let close = text.find(')')?;
        let inner = text[4..close].trim();
        let value = match quoted(inner) {
            Some((value, _)) => value,
            None => inner.to_string(),
        };
        return Some((value, &text[close + 1..]));
    }
    quoted(text)
}

/// Read a leading quoted string, resolving simple escapes.
fn quoted(text: &str) -> Option<(String, &str)> {
    let text = text.trim_start();
    let mut chars = text.char_indices();
    let (_, quote) = chars.next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let mut value = String::new();
    let mut escaped = false;
    for (idx, c) in chars {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some((value, &text[idx + c.len_utf8()..]));
        } else {
            value.push(c);
        }
    }
    None
}

fn strip_comments(text: &str) -> String {
    if !text.contains("/*") {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut scanner = Scanner::new(text);
    let mut last = 0;
    while !scanner.eof() {
        match scanner.peek() {
            Some(b'"') | Some(b'\'') => scanner.string(),
            Some(b'/') if scanner.starts_with("/*") => {
                out.push_str(&text[last..scanner.pos]);
                scanner.comment();
                out.push(' ');
                last = scanner.pos;
            }
            _ => scanner.pos += 1,
        }
    }
    out.push_str(&text[last..]);
    out
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte cursor over CSS source.
///
/// Structural characters are all ASCII, so every position the scanner stops
/// at for slicing is a char boundary.
struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn starts_with(&self, s: &str) -> bool {
        self.bytes[self.pos.min(self.bytes.len())..].starts_with(s.as_bytes())
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Consume an identifier and return it.
    fn ident(&mut self) -> &'a str {
        let start = self.pos;
        let rest = &self.src[start..];
        let len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '-' || *c == '_' || !c.is_ascii()))
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        self.pos += len;
        &self.src[start..start + len]
    }

    /// Consume a comment at the cursor and return its text.
    fn comment(&mut self) -> &'a str {
        self.pos += 2;
        let start = self.pos;
        while !self.eof() {
            if self.starts_with("*/") {
                let text = &self.src[start..self.pos];
                self.pos += 2;
                return text;
            }
            self.pos += 1;
        }
        &self.src[start..]
    }

    /// Consume a string at the cursor. Newlines end a bad string.
    fn string(&mut self) {
        let quote = self.bytes[self.pos];
        self.pos += 1;
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'\\' => self.pos = (self.pos + 1).min(self.bytes.len()),
                b'\n' => return,
                _ if b == quote => return,
                _ => {}
            }
        }
    }

    /// Advance to the first of `stops` outside strings, comments and
    /// parentheses. Returns the stop found, or `None` at end of input.
    fn scan_until(&mut self, stops: &[u8]) -> Option<u8> {
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'"' | b'\'' => {
                    self.string();
                    continue;
                }
                b'/' if self.starts_with("/*") => {
                    self.comment();
                    continue;
                }
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                _ if depth == 0 && stops.contains(&b) => return Some(b),
                _ => {}
            }
            self.pos += 1;
        }
        None
    }

    /// Consume a `{...}` block at the cursor and return its inner text.
    /// End of input closes any open block.
    fn block(&mut self) -> &'a str {
        self.pos += 1;
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'"' | b'\'' => {
                    self.string();
                    continue;
                }
                b'/' if self.starts_with("/*") => {
                    self.comment();
                    continue;
                }
                b'{' => depth += 1,
                b'}' if depth == 0 => {
                    let inner = &self.src[start..self.pos];
                    self.pos += 1;
                    return inner;
                }
                b'}' => depth -= 1,
                _ => {}
            }
            self.pos += 1;
        }
        &self.src[start..]
    }
}
