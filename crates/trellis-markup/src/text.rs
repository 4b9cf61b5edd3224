//! Transforms applied to raw text between tags before it enters a document.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static CONDITIONAL_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\[if .+\]>.*<!\[endif\]$").expect("conditional comment pattern is valid")
});

static PRESERVE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<pre\b.*?</pre>").expect("preserve block pattern is valid"));

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("horizontal space pattern is valid"));

static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"( ?[\r\n] ?)+").expect("line break pattern is valid"));

/// Remove `<!-- ... -->` comments, keeping conditional comments
/// (`<!--[if IE]>...<![endif]-->`) untouched. An unterminated comment is left
/// as it is.
#[must_use]
pub fn strip_comments(text: &str) -> Cow<'_, str> {
    if !text.contains("<!--") {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<!--") {
        let body_start = start + 4;
        let Some(length) = rest[body_start..].find("-->") else {
            break;
        };
        let body_end = body_start + length;
        let end = body_end + 3;
        if CONDITIONAL_COMMENT.is_match(&rest[body_start..body_end]) {
            out.push_str(&rest[..end]);
        } else {
            out.push_str(&rest[..start]);
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Collapse runs of spaces and tabs to one space and runs of line breaks to
/// one newline. `<pre>` blocks pass through unchanged.
#[must_use]
pub fn compress_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for block in PRESERVE_BLOCK.find_iter(text) {
        out.push_str(&compress(&text[last..block.start()]));
        out.push_str(block.as_str());
        last = block.end();
    }
    out.push_str(&compress(&text[last..]));
    out
}

fn compress(text: &str) -> String {
    let spaces = HORIZONTAL_SPACE.replace_all(text, " ");
    LINE_BREAKS.replace_all(&spaces, "\n").into_owned()
}
