//! Post-processing: deterministic cleanup of vision-LLM text.
//!
//! Dedicated OCR services return text exactly as recognised and are never
//! touched. Vision LLMs, even when told to "provide only the extracted text",
//! occasionally wrap the answer in a code fence, announce it with a one-line
//! preamble, or emit `\r\n` and zero-width characters. These rules undo that
//! without touching the recognised content itself.
//!
//! ## Rule Order
//!
//! Invisible characters go first because a BOM can sit in front of a fence.
//! Fences are then stripped before line endings are normalised so the fence
//! regex sees the raw model output.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to raw vision-LLM output.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 2. Strip an outer code fence (```` ```text ````, ```` ```markdown ````, bare)
/// 3. Drop a leading "Here is the extracted text:" preamble line
/// 4. Normalise line endings (CRLF / CR → LF)
/// 5. Trim trailing whitespace per line
/// 6. Collapse 3+ consecutive blank lines down to 2
/// 7. Trim the whole text
///
/// An empty or whitespace-only response comes back as `""`: a page with no
/// detectable text is a valid result, not an error.
pub fn clean_llm_text(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = strip_code_fences(&s);
    let s = strip_preamble(&s);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 2: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:text|plaintext|plain|txt|markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$")
        .unwrap()
});

fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 3: Drop a conversational preamble ──────────────────────────────────

static RE_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:here\s+is|here's|below\s+is|sure[,!]?\s+here\s+is)\b[^\n]{0,80}\b(?:text|content|transcription)\b[^\n]{0,40}:[ \t]*\r?\n",
    )
    .unwrap()
});

fn strip_preamble(input: &str) -> String {
    RE_PREAMBLE.replace(input, "").to_string()
}

// ── Rule 4: Normalise line endings ──────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 5: Trim trailing whitespace per line ───────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Collapse excessive blank lines ──────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}
