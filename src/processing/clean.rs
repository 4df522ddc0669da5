//! Post-processing for model output that ignores formatting instructions.
//!
//! Only the edges of the text are touched: a leading code fence (optionally tagged with a
//! language), a trailing code fence, and a conversational opener such as `Sure, here is your
//! guide:` followed by a line break. Stripping repeats until nothing changes, which makes
//! [`clean_response`] idempotent.

use regex::Regex;
use std::sync::LazyLock;

const FENCE: &str = "```";

static LEADING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A```[\w+.#-]*[ \t]*(?:\r?\n)?").expect("leading fence pattern is valid")
});

// An interjection on its own (`Sure:`), an interjection leading into `here is ...`, or a bare
// `here is ...` clause. The line must end at the colon.
static PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\A(?:(?:sure|certainly|of course|absolutely|okay|ok)[!,.]*[ \t]*(?:here(?: is|'s| are)\b[^\n:]{0,80})?|here(?: is|'s| are)\b[^\n:]{0,80}):[ \t]*\r?\n",
    )
    .expect("preamble pattern is valid")
});

/// Strip code-fence wrappers and conversational openers from `raw`, then trim it.
pub fn clean_response(raw: &str) -> String {
    let mut current = raw.trim();
    loop {
        let next = strip_edges(current);
        if next.len() == current.len() {
            return next.to_string();
        }
        current = next;
    }
}

fn strip_edges(text: &str) -> &str {
    let mut text = text;
    if let Some(found) = LEADING_FENCE.find(text) {
        text = text[found.end()..].trim();
    }
    if let Some(rest) = text.strip_suffix(FENCE) {
        text = rest.trim();
    }
    if let Some(found) = PREAMBLE.find(text) {
        text = text[found.end()..].trim();
    }
    text
}
