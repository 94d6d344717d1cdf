//! Output file name templates.
//!
//! A template is literal text interleaved with `{placeholder}` tokens, e.g.
//! `{streamer_id}_{yyyyMMdd}_{HHmmss}`. Templates are parsed once when a
//! target is saved so unknown placeholders or unbalanced braces are rejected
//! up front; rendering a parsed template never fails.
//!
//! Every substituted value and the final name are sanitized so the result is
//! safe on common filesystems: unsafe characters become `_`, whitespace runs
//! collapse to a single `_`, reserved device names get a `_file` suffix and
//! the stem is capped at [`MAX_STEM_CHARS`] characters.

use chrono::NaiveDateTime;

use crate::error::{CoreError, Result};

pub const DEFAULT_TEMPLATE: &str = "{streamer_id}_{yyyyMMdd}_{HHmmss}";
pub const DEFAULT_EXTENSION: &str = "mp4";
pub const MAX_STEM_CHARS: usize = 200;

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    StreamerId,
    StreamerName,
    Platform,
    Title,
    Quality,
    Year,
    ShortYear,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Date,
    Time,
    DateTime,
}

impl Placeholder {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "streamer_id" => Self::StreamerId,
            "streamer_name" => Self::StreamerName,
            "platform" => Self::Platform,
            "title" => Self::Title,
            "quality" => Self::Quality,
            "yyyy" => Self::Year,
            "yy" => Self::ShortYear,
            "MM" => Self::Month,
            "dd" => Self::Day,
            "HH" => Self::Hour,
            "mm" => Self::Minute,
            "ss" => Self::Second,
            "yyyyMMdd" => Self::Date,
            "HHmmss" => Self::Time,
            "yyyyMMdd_HHmmss" => Self::DateTime,
            _ => return None,
        })
    }

    fn expand(self, vars: &TemplateVars) -> String {
        let ts = &vars.timestamp;
        match self {
            Self::StreamerId => sanitize_component(&vars.streamer_id),
            Self::StreamerName => sanitize_component(vars.display_name()),
            Self::Platform => sanitize_component(&vars.platform),
            Self::Title => sanitize_component(&vars.display_title()),
            Self::Quality => sanitize_component(&vars.quality),
            Self::Year => ts.format("%Y").to_string(),
            Self::ShortYear => ts.format("%y").to_string(),
            Self::Month => ts.format("%m").to_string(),
            Self::Day => ts.format("%d").to_string(),
            Self::Hour => ts.format("%H").to_string(),
            Self::Minute => ts.format("%M").to_string(),
            Self::Second => ts.format("%S").to_string(),
            Self::Date => ts.format("%Y%m%d").to_string(),
            Self::Time => ts.format("%H%M%S").to_string(),
            Self::DateTime => ts.format("%Y%m%d_%H%M%S").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(Placeholder),
}

/// Values substituted into a [`FilenameTemplate`].
#[derive(Debug, Clone)]
pub struct TemplateVars {
    pub streamer_id: String,
    /// Falls back to `streamer_id`.
    pub streamer_name: Option<String>,
    pub platform: String,
    /// Falls back to `"<streamer_name> Stream"`.
    pub title: Option<String>,
    pub quality: String,
    /// Wall-clock time the capture starts, in the operator's local zone.
    pub timestamp: NaiveDateTime,
    /// Without the leading dot; empty for no extension.
    pub extension: String,
}

impl TemplateVars {
    fn display_name(&self) -> &str {
        match self.streamer_name.as_deref() {
            Some(n) if !n.trim().is_empty() => n,
            _ => &self.streamer_id,
        }
    }

    fn display_title(&self) -> String {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => format!("{} Stream", self.display_name()),
        }
    }
}

/// A parsed, validated file name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl FilenameTemplate {
    /// Parse `source`, rejecting empty templates, unknown placeholders and
    /// unbalanced braces.
    pub fn parse(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(CoreError::InvalidTemplate("template must not be empty".into()));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => {
                                return Err(CoreError::InvalidTemplate(format!(
                                    "nested '{{' in {source:?}"
                                )))
                            }
                            c => name.push(c),
                        }
                    }
                    if !closed {
                        return Err(CoreError::InvalidTemplate(format!(
                            "unclosed '{{' in {source:?}"
                        )));
                    }
                    let var = Placeholder::from_name(&name).ok_or_else(|| {
                        CoreError::InvalidTemplate(format!("unsupported placeholder {{{name}}}"))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Var(var));
                }
                '}' => {
                    return Err(CoreError::InvalidTemplate(format!(
                        "unmatched '}}' in {source:?}"
                    )))
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Substitute `vars` and return a sanitized file name including extension.
    pub fn render(&self, vars: &TemplateVars) -> String {
        let raw: String = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Literal(text) => text.clone(),
                Segment::Var(p) => p.expand(vars),
            })
            .collect();

        let stem = sanitize_stem(&raw);
        let ext = vars.extension.trim_start_matches('.');
        if ext.is_empty() {
            stem
        } else {
            format!("{stem}.{ext}")
        }
    }
}

impl Default for FilenameTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
            segments: vec![
                Segment::Var(Placeholder::StreamerId),
                Segment::Literal("_".into()),
                Segment::Var(Placeholder::Date),
                Segment::Literal("_".into()),
                Segment::Var(Placeholder::Time),
            ],
        }
    }
}

fn is_unsafe(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '{' | '}') || c.is_control()
}

/// Replace unsafe characters, fold whitespace and underscore runs into one
/// `_`, trim leading/trailing `_`. Never returns an empty string.
pub fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut gap = false;
    for c in raw.chars() {
        let c = if is_unsafe(c) { '_' } else { c };
        if c == '_' || c.is_whitespace() {
            gap = true;
            continue;
        }
        if gap && !out.is_empty() {
            out.push('_');
        }
        gap = false;
        out.push(c);
    }
    if out.is_empty() {
        "unknown".to_string()
    } else {
        out
    }
}

fn sanitize_stem(raw: &str) -> String {
    let mut stem = sanitize_component(raw);
    let upper = stem.to_uppercase();
    if RESERVED_NAMES.contains(&upper.as_str()) {
        stem.push_str("_file");
    }
    if stem.chars().count() > MAX_STEM_CHARS {
        stem = stem.chars().take(MAX_STEM_CHARS).collect();
        tracing::warn!(stem = %stem, "file name truncated to {MAX_STEM_CHARS} characters");
    }
    if stem.is_empty() {
        stem = "recording".to_string();
    }
    stem
}
