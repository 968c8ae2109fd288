//! Best-effort conversion between Confluence-style wiki markup, HTML, and
//! plain text. Conversions never panic and never propagate errors: a failed
//! conversion hands back the original input tagged as unconverted so callers
//! can tell degraded output apart from converted output.

use std::sync::OnceLock;

use regex::Regex;

/// Outcome of a markup conversion: the converted text, or the original input
/// when conversion was not possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Converted(String),
    Unconverted(String),
}

impl Rendered {
    pub fn into_text(self) -> String {
        match self {
            Rendered::Converted(text) | Rendered::Unconverted(text) => text,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Rendered::Converted(text) | Rendered::Unconverted(text) => text,
        }
    }

    pub fn is_converted(&self) -> bool {
        matches!(self, Rendered::Converted(_))
    }
}

#[derive(Debug, thiserror::Error)]
enum MarkupError {
    #[error("invalid character reference: &#{0};")]
    BadCharacterReference(String),
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^h([1-6])\.\s*(.*)$").expect("static regex must compile"))
}

fn list_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\*+|#+|-)\s+(.*)$").expect("static regex must compile"))
}

fn mono_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^{}\n]+)\}\}").expect("static regex must compile"))
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[([^\[\]|\n]+)(?:\|([^\[\]\n]+))?\]").expect("static regex must compile")
    })
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*([^*\n]+)\*").expect("static regex must compile"))
}

fn italic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_([^_\n]+)_").expect("static regex must compile"))
}

fn block_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|<li[^>]*>|</(?:p|div|li|ul|ol|h[1-6]|tr|table|pre|blockquote)>")
            .expect("static regex must compile")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("static regex must compile"))
}

/// Converts wiki markup to an HTML fragment.
pub fn wiki_to_html(wiki: &str) -> Rendered {
    let source = wiki.replace("\r\n", "\n");
    let mut out = String::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut list_stack: Vec<&'static str> = Vec::new();
    let mut in_code = false;

    let flush_paragraph = |out: &mut String, paragraph: &mut Vec<String>| {
        if paragraph.is_empty() {
            return;
        }
        out.push_str("<p>");
        out.push_str(&paragraph.join("<br/>"));
        out.push_str("</p>");
        paragraph.clear();
    };
    let close_lists = |out: &mut String, list_stack: &mut Vec<&'static str>| {
        while let Some(tag) = list_stack.pop() {
            out.push_str(&format!("</{}>", tag));
        }
    };

    for line in source.lines() {
        let trimmed = line.trim_end();

        if trimmed.trim_start().starts_with("{code") && trimmed.trim_start().ends_with('}') {
            if in_code {
                out.push_str("</code></pre>");
            } else {
                flush_paragraph(&mut out, &mut paragraph);
                close_lists(&mut out, &mut list_stack);
                out.push_str("<pre><code>");
            }
            in_code = !in_code;
            continue;
        }
        if in_code {
            out.push_str(&escape_html(line));
            out.push('\n');
            continue;
        }

        if trimmed.is_empty() {
            flush_paragraph(&mut out, &mut paragraph);
            close_lists(&mut out, &mut list_stack);
            continue;
        }

        if let Some(caps) = heading_re().captures(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            close_lists(&mut out, &mut list_stack);
            let level = &caps[1];
            out.push_str(&format!(
                "<h{}>{}</h{}>",
                level,
                render_inline(&caps[2]),
                level
            ));
            continue;
        }

        if let Some(caps) = list_item_re().captures(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            let marker = &caps[1];
            let depth = if marker == "-" { 1 } else { marker.len() };
            let tag = if marker.starts_with('#') { "ol" } else { "ul" };

            while list_stack.len() > depth {
                let closed = list_stack.pop().expect("list stack checked non-empty");
                out.push_str(&format!("</{}>", closed));
            }
            if list_stack.len() == depth && list_stack.last() != Some(&tag) {
                let closed = list_stack.pop().expect("list stack checked non-empty");
                out.push_str(&format!("</{}>", closed));
            }
            while list_stack.len() < depth {
                list_stack.push(tag);
                out.push_str(&format!("<{}>", tag));
            }
            out.push_str(&format!("<li>{}</li>", render_inline(&caps[2])));
            continue;
        }

        close_lists(&mut out, &mut list_stack);
        paragraph.push(render_inline(trimmed));
    }

    flush_paragraph(&mut out, &mut paragraph);
    close_lists(&mut out, &mut list_stack);
    if in_code {
        out.push_str("</code></pre>");
    }
    Rendered::Converted(out)
}

/// Converts wiki markup to plain text by rendering HTML first and stripping
/// it back down.
pub fn wiki_to_text(wiki: &str) -> Rendered {
    let html = match wiki_to_html(wiki) {
        Rendered::Converted(html) => html,
        Rendered::Unconverted(_) => return Rendered::Unconverted(wiki.to_string()),
    };
    match strip_html(&html) {
        Ok(text) => Rendered::Converted(text),
        Err(_) => Rendered::Unconverted(wiki.to_string()),
    }
}

/// Reduces an HTML fragment to plain text: block boundaries become line
/// breaks, tags are dropped, entities are decoded.
pub fn html_to_text(html: &str) -> Rendered {
    match strip_html(html) {
        Ok(text) => Rendered::Converted(text),
        Err(err) => {
            crate::logging::debug(format!("html to text conversion failed: {}", err));
            Rendered::Unconverted(html.to_string())
        }
    }
}

/// The wiki representation accepted by JIRA for HTML input. Plain text is
/// valid wiki markup, so stripping the HTML is the closest lossless-enough
/// conversion available.
pub fn html_to_wiki(html: &str) -> Rendered {
    html_to_text(html)
}

/// Escapes plain text into an HTML fragment with `<br>` line breaks.
pub fn text_to_html(text: &str) -> Rendered {
    let escaped = escape_html(text).replace("\r\n", "<br>").replace('\n', "<br>");
    Rendered::Converted(escaped)
}

/// Plain text is already valid wiki markup.
pub fn text_to_wiki(text: &str) -> Rendered {
    Rendered::Converted(text.to_string())
}

fn render_inline(text: &str) -> String {
    let escaped = escape_html(text);

    // Monospace spans and links are lifted out before emphasis runs so that
    // underscores and asterisks inside them are left alone.
    let mut protected: Vec<String> = Vec::new();
    let with_mono = mono_re().replace_all(&escaped, |caps: &regex::Captures<'_>| {
        protected.push(format!("<code>{}</code>", &caps[1]));
        placeholder(protected.len() - 1)
    });
    let with_links = link_re().replace_all(&with_mono, |caps: &regex::Captures<'_>| {
        let rendered = match caps.get(2) {
            Some(url) => format!("<a href=\"{}\">{}</a>", url.as_str(), &caps[1]),
            None => format!("<a href=\"{}\">{}</a>", &caps[1], &caps[1]),
        };
        protected.push(rendered);
        placeholder(protected.len() - 1)
    });

    let with_bold = bold_re().replace_all(&with_links, "<strong>$1</strong>");
    let with_italic = italic_re().replace_all(&with_bold, "<em>$1</em>");

    let mut result = with_italic.into_owned();
    for (index, rendered) in protected.iter().enumerate() {
        result = result.replace(&placeholder(index), rendered);
    }
    result
}

fn placeholder(index: usize) -> String {
    format!("\u{1}{}\u{2}", index)
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn strip_html(html: &str) -> Result<String, MarkupError> {
    let normalized = html.replace("\r\n", "\n");
    let with_breaks = block_break_re().replace_all(&normalized, "\n");
    let without_tags = tag_re().replace_all(&with_breaks, "");
    let decoded = decode_entities(&without_tags)?;

    let lines: Vec<&str> = decoded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    Ok(lines.join("\n"))
}

fn decode_entities(input: &str) -> Result<String, MarkupError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';').filter(|&end| end <= 12) else {
            // no terminator nearby, keep the ampersand literally
            out.push('&');
            rest = &rest[start + 1..];
            continue;
        };
        let entity = &tail[1..end];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            "nbsp" => out.push(' '),
            _ if entity.starts_with('#') => {
                let code = &entity[1..];
                let value = if let Some(hex) = code.strip_prefix('x').or(code.strip_prefix('X')) {
                    u32::from_str_radix(hex, 16)
                } else {
                    code.parse::<u32>()
                }
                .map_err(|_| MarkupError::BadCharacterReference(code.to_string()))?;
                let c = char::from_u32(value)
                    .ok_or_else(|| MarkupError::BadCharacterReference(code.to_string()))?;
                out.push(c);
            }
            // unknown named entity, keep it verbatim
            _ => out.push_str(&tail[..end + 1]),
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
