//! Placeholder repair for WordprocessingML parts.
//!
//! Word freely splits what the author typed as `{{ HoVaTen }}` into several
//! runs (`<w:r>`), for example when spell-check, revision tracking or a
//! formatting change touches part of the text:
//!
//! ```text
//! <w:t>{</w:t></w:r><w:r><w:t>{ HoVa</w:t></w:r><w:r><w:rPr>…</w:rPr><w:t>Ten }}</w:t>
//! ```
//!
//! tera only sees expressions that are contiguous in the XML, so before a
//! part is compiled the markup inside each expression is removed and its
//! text is merged into the run where the expression starts.
//!
//! ## Rule Order
//!
//! 1. Rejoin split delimiters (`{` + tags + `{` → `{{`, same for closers)
//! 2. Inside every `{{ … }}`, `{% … %}`, `{# … #}` span, drop the markup
//!    between the closing `</w:t>` of one run and the opening `<w:t>` of the
//!    next
//! 3. Decode the XML entities Word writes for quotes and ampersands inside
//!    expressions so tera sees the literal characters

use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use regex::{Captures, Regex};
use std::collections::BTreeSet;

/// Apply all repair rules to one XML part.
pub fn repair(xml: &str) -> String {
    let s = join_split_delimiters(xml);
    let s = merge_expression_runs(&s);
    unescape_expressions(&s)
}

// ── Rule 1: Rejoin split delimiters ──────────────────────────────────────────

static RE_SPLIT_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{((?:<[^>]*>)+)([{%#])").unwrap());
static RE_SPLIT_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([}%#])((?:<[^>]*>)+)\}").unwrap());

fn join_split_delimiters(xml: &str) -> String {
    let s = RE_SPLIT_OPEN.replace_all(xml, "{$2$1");
    // The tags are moved behind the completed delimiter so the run
    // structure stays balanced.
    RE_SPLIT_CLOSE.replace_all(&s, "$1}$2").into_owned()
}

// ── Rule 2: Merge runs inside expressions ────────────────────────────────────

static RE_EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}|\{#.*?#\}").unwrap());
static RE_RUN_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)</w:t>.*?<w:t(?:\s[^>]*)?>").unwrap());

fn merge_expression_runs(xml: &str) -> String {
    RE_EXPRESSION
        .replace_all(xml, |caps: &Captures| {
            RE_RUN_BREAK.replace_all(&caps[0], "").into_owned()
        })
        .into_owned()
}

// ── Rule 3: Unescape entities inside expressions ─────────────────────────────

fn unescape_expressions(xml: &str) -> String {
    RE_EXPRESSION
        .replace_all(xml, |caps: &Captures| {
            caps[0]
                .replace("&quot;", "\"")
                .replace("&apos;", "'")
                .replace("&#39;", "'")
                .replace("&gt;", ">")
                .replace("&lt;", "<")
                .replace("&amp;", "&")
                .replace(['\u{201C}', '\u{201D}'], "\"")
                .replace(['\u{2018}', '\u{2019}'], "'")
        })
        .into_owned()
}

// ── Inspection helpers ───────────────────────────────────────────────────────

static RE_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\|[^}]*)?\}\}").unwrap());

/// Names of the plain `{{ name }}` variables appearing in `text`.
///
/// Filters (`{{ name | upper }}`) are allowed; expressions that are not a
/// bare variable are ignored.
pub fn variables(text: &str) -> BTreeSet<String> {
    RE_VARIABLE
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Visible text of a WordprocessingML part, one line per paragraph.
///
/// `<w:tab/>` becomes a tab and `<w:br/>` a newline; everything else that
/// is not `<w:t>` content is dropped.
pub fn paragraph_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(false);

    let mut out = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" => out.push('\n'),
                _ => {}
            },
            Event::Text(e) if in_text => out.push_str(&e.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}
