//! Minimal line-oriented markdown to HTML.
//!
//! Supported: fenced code blocks, `-` list items, `#`..`###` headings,
//! paragraphs, and inline code, bold, italic and links. Everything is
//! HTML-escaped before any markup is produced.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```([\s\S]*?)```").expect("valid fence regex"));
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{CODEBLOCK_(\d+)\}\}").expect("valid placeholder regex"));
static PLACEHOLDER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{CODEBLOCK_\d+\}\}$").expect("valid placeholder regex"));
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-\s+").expect("valid list regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,3})\s+").expect("valid heading regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid code regex"));
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid bold regex"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("valid italic regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"));

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Inline markup on an already escaped line.
fn render_inline(text: &str) -> String {
    let text = INLINE_CODE.replace_all(text, "<code>${1}</code>");
    let text = BOLD.replace_all(&text, "<strong>${1}</strong>");
    let text = ITALIC.replace_all(&text, "<em>${1}</em>");
    LINK.replace_all(
        &text,
        r#"<a href="${2}" target="_blank" rel="noreferrer">${1}</a>"#,
    )
    .into_owned()
}

pub fn render_markdown(markdown: &str) -> String {
    let escaped = escape_html(markdown);

    let mut code_blocks: Vec<String> = Vec::new();
    let with_placeholders = CODE_FENCE.replace_all(&escaped, |caps: &Captures| {
        let token = format!("{{{{CODEBLOCK_{}}}}}", code_blocks.len());
        code_blocks.push(format!("<pre><code>{}</code></pre>", &caps[1]));
        token
    });

    let mut html: Vec<String> = Vec::new();
    let mut in_list = false;

    for line in with_placeholders.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let trimmed = line.trim();

        if PLACEHOLDER_LINE.is_match(trimmed) {
            if in_list {
                html.push("</ul>".into());
                in_list = false;
            }
            html.push(trimmed.to_string());
            continue;
        }

        if let Some(m) = LIST_ITEM.find(line) {
            if !in_list {
                html.push("<ul>".into());
                in_list = true;
            }
            html.push(format!("<li>{}</li>", render_inline(&line[m.end()..])));
            continue;
        }

        if in_list {
            html.push("</ul>".into());
            in_list = false;
        }

        if let Some(caps) = HEADING.captures(line) {
            let level = caps[1].len();
            let body = &line[caps[0].len()..];
            html.push(format!("<h{level}>{}</h{level}>", render_inline(body)));
        } else if trimmed.is_empty() {
            html.push("<br />".into());
        } else {
            html.push(format!("<p>{}</p>", render_inline(line)));
        }
    }

    if in_list {
        html.push("</ul>".into());
    }

    PLACEHOLDER
        .replace_all(&html.join("\n"), |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| code_blocks.get(i))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}
