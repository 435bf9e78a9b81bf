// Sanitization on both sides of the generative backend.
// Input: user text and context are cleaned of prompt-injection markers and
// invisible characters before they reach the prompt.
// Output: model-generated strings are stripped of markup the web client would execute.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum input length to send to the LLM (characters).
pub const MAX_INPUT_LENGTH: usize = 50_000;

/// Sanitize text for LLM consumption: strip invisible characters, drop
/// injection lines, normalize whitespace, and truncate.
pub fn sanitize_for_llm(raw: &str) -> String {
    sanitize_for_llm_with_audit(raw, None)
}

/// Sanitize with audit logging. Logs how many lines were removed and the
/// request id, never the content itself.
pub fn sanitize_for_llm_with_audit(raw: &str, request_id: Option<&str>) -> String {
    let cleaned = remove_invisible_chars(raw);
    let (no_injection, removed) = remove_injection_lines(&cleaned);

    if removed > 0 {
        tracing::warn!(
            request_id = request_id.unwrap_or("unknown"),
            removed_lines = removed,
            "Injection patterns detected and removed from request input"
        );
    }

    let normalized = normalize_whitespace(&no_injection);
    truncate_to_max_length(&normalized, MAX_INPUT_LENGTH)
}

/// Clean a single model-generated string: invisible characters, executable
/// markup and surrounding whitespace are removed. Idempotent.
pub fn clean_output_text(text: &str) -> String {
    let mut current = remove_invisible_chars(text);
    // Removing one tag can splice a new one together; run to a fixpoint.
    loop {
        let next = strip_markup(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current.trim().to_string()
}

/// Remove zero-width/bidi formatting characters and control characters.
/// Standard whitespace (space, newline, tab) is preserved.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t') {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2069}' | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

/// Line-level prompt-injection markers (matched on the lowercased, trimmed line).
fn is_injection_line(trimmed: &str) -> bool {
    static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        vec![
            // Role markers at line start
            Regex::new(r"^(?:system|assistant|model|user)\s*:").unwrap(),
            Regex::new(r"^\[/?(?:inst|system|assistant)\]").unwrap(),
            Regex::new(r"^<<sys>>").unwrap(),
            Regex::new(r"^</?(?:instruction|system|document)").unwrap(),
            Regex::new(r"^(?:note to ai|new instructions|system update)\s*:").unwrap(),
            // Override attempts anywhere on the line
            Regex::new(r"(?:ignore|disregard|forget)\s+(?:all\s+|the\s+|your\s+)?(?:previous|above|prior)?\s*instructions").unwrap(),
            Regex::new(r"you\s+are\s+now\s+(?:a|an)\s+").unwrap(),
            Regex::new(r"<\|im_(?:start|end)\|>").unwrap(),
        ]
    });
    PATTERNS.iter().any(|p| p.is_match(trimmed))
}

/// Drop lines carrying injection markers. Returns (cleaned, removed_line_count).
fn remove_injection_lines(text: &str) -> (String, usize) {
    let mut kept = Vec::new();
    let mut removed = 0usize;
    for line in text.lines() {
        if is_injection_line(&line.trim().to_lowercase()) {
            removed += 1;
        } else {
            kept.push(line);
        }
    }
    (kept.join("\n"), removed)
}

/// Collapse runs of blank lines, trim each line, trim leading/trailing blank lines.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut prev_blank = true;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_blank {
                lines.push("");
            }
            prev_blank = true;
        } else {
            lines.push(trimmed);
            prev_blank = false;
        }
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }

    lines.join("\n")
}

/// Truncate to at most `max_chars` characters, breaking at the last whitespace.
fn truncate_to_max_length(text: &str, max_chars: usize) -> String {
    let Some((byte_limit, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let truncated = &text[..byte_limit];
    match truncated.rfind(char::is_whitespace) {
        Some(pos) => format!("{}…[TRUNCATED]", &text[..pos]),
        None => format!("{truncated}…[TRUNCATED]"),
    }
}

/// One pass of markup removal.
fn strip_markup(text: &str) -> String {
    static BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(?:script|style)\s*>").unwrap()
    });
    static TAGS: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)</?(?:script|style|iframe|object|embed|applet|form|input|textarea|button|select|meta|link|base|svg|math|img|a)\b[^>]*>",
        )
        .unwrap()
    });
    static JS_URI: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)javascript\s*:").unwrap());

    let without_blocks = BLOCKS.replace_all(text, "");
    let without_tags = TAGS.replace_all(&without_blocks, "");
    JS_URI.replace_all(&without_tags, "").into_owned()
}
