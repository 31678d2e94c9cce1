//! Per-agent output parsers.
//!
//! Agent CLIs wrap their JSON answer in arbitrary noise: ANSI styling,
//! markdown fences, banners, token-usage footers. Each parser reduces raw
//! stdout to a string that should decode as a single JSON object. Parsers
//! are pure functions selected by name from a closed set; unknown names fall
//! back to [`default_extract`].

use std::sync::LazyLock;

use regex_lite::Regex;

pub type ParserFn = fn(&str) -> String;

/// Resolve a parser by the `response_parser` field of an agent descriptor.
pub fn parser_for(name: Option<&str>) -> ParserFn {
    match name {
        Some("codex") => codex_extract,
        Some("gemini") => gemini_extract,
        _ => default_extract,
    }
}

static CSI_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\x1b\[[0-9;:?]*[ -/]*[@-~]"));
static OSC_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)"));
static DCS_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\x1b[PX^_][^\x1b]*\x1b\\"));
static BARE_ESC_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\x1b[@-Z\x5C-\x5F]"));
static CODEX_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^\[\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\] codex$"));

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}

/// Remove CSI/OSC/DCS escape sequences.
pub fn strip_ansi(input: &str) -> String {
    let stripped = OSC_RE.replace_all(input, "");
    let stripped = DCS_RE.replace_all(&stripped, "");
    let stripped = CSI_RE.replace_all(&stripped, "");
    BARE_ESC_RE.replace_all(&stripped, "").into_owned()
}

fn decodes(candidate: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(candidate).is_ok()
}

/// Body of the first ```json fenced block, if any.
fn fenced_json_block(input: &str) -> Option<&str> {
    let open = input.find("```json")?;
    let body_start = input[open..].find('\n')? + open + 1;
    let body_len = input[body_start..].find("```")?;
    Some(input[body_start..body_start + body_len].trim())
}

/// Slice from the first `{` to the last `}`.
fn outer_brace_slice(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (start < end).then(|| &input[start..=end])
}

/// Default dialect: ANSI strip, then fenced block, then brace slice; if
/// nothing decodes, hand back the stripped trim unchanged and let the
/// caller's decode report the failure.
pub fn default_extract(stdout: &str) -> String {
    let stripped = strip_ansi(stdout);
    if let Some(block) = fenced_json_block(&stripped)
        && decodes(block)
    {
        return block.to_string();
    }
    if let Some(slice) = outer_brace_slice(&stripped)
        && decodes(slice)
    {
        return slice.to_string();
    }
    stripped.trim().to_string()
}

/// Codex-style dialect: the answer sits between a `codex` marker line
/// (optionally timestamped) and a `tokens used` footer line.
pub fn codex_extract(stdout: &str) -> String {
    let stripped = strip_ansi(stdout);
    let lines: Vec<&str> = stripped.lines().collect();
    let marker = lines
        .iter()
        .position(|line| line.trim() == "codex" || CODEX_MARKER_RE.is_match(line.trim()));

    if let Some(marker) = marker {
        let after = &lines[marker + 1..];
        let footer = after.iter().position(|line| line.contains("tokens used"));
        let body_lines = match footer {
            Some(footer) => &after[..footer],
            None => after,
        };
        let body = body_lines
            .iter()
            .filter(|line| !line.trim().is_empty())
            .copied()
            .collect::<Vec<&str>>()
            .join("\n");
        if decodes(&body) {
            return body;
        }
    }

    if let Some(slice) = outer_brace_slice(&stripped)
        && decodes(slice)
    {
        return slice.to_string();
    }
    stripped.trim().to_string()
}

/// Gemini-style dialect: prefer a ```json fence, then the outer braces.
pub fn gemini_extract(stdout: &str) -> String {
    let stripped = strip_ansi(stdout);
    if let Some(block) = fenced_json_block(&stripped)
        && decodes(block)
    {
        return block.to_string();
    }
    if let Some(slice) = outer_brace_slice(&stripped)
        && decodes(slice)
    {
        return slice.to_string();
    }
    stripped.trim().to_string()
}
