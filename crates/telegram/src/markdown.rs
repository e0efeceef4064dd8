//! Markdown to Telegram HTML for streamed responses.
//!
//! Streamed text is rendered on every edit, so input is often cut off
//! mid-construct. Unclosed code fences are closed before rendering and
//! inline markers without a partner are kept as literal text.

use std::borrow::Cow;

/// Telegram message size limit.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Shown instead of an empty message, which Telegram rejects.
pub const EMPTY_TEXT_GLYPH: &str = "∅";

const FENCE: &str = "```";

/// Both renderings of one outbound text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// HTML rendering, absent when it would exceed the size limit.
    pub html: Option<String>,
    /// Plain fallback, truncated to the size limit.
    pub plain: String,
}

/// Prepare text for sending: substitute empty text, close fences, render
/// HTML and cap both forms at [`TELEGRAM_MAX_MESSAGE_LEN`].
pub fn render_message(text: &str) -> Rendered {
    if text.trim().is_empty() {
        return Rendered {
            html: Some(EMPTY_TEXT_GLYPH.to_string()),
            plain: EMPTY_TEXT_GLYPH.to_string(),
        };
    }
    let plain = truncate_at_char_boundary(text, TELEGRAM_MAX_MESSAGE_LEN).to_string();
    let html = markdown_to_telegram_html(&close_open_fence(text));
    Rendered {
        html: (html.len() <= TELEGRAM_MAX_MESSAGE_LEN).then_some(html),
        plain,
    }
}

/// Append a closing fence when the text has an odd number of fence lines.
pub fn close_open_fence(md: &str) -> Cow<'_, str> {
    let fences = md
        .lines()
        .filter(|line| line.trim_start().starts_with(FENCE))
        .count();
    if fences % 2 == 0 {
        return Cow::Borrowed(md);
    }
    let mut closed = md.to_string();
    if !closed.ends_with('\n') {
        closed.push('\n');
    }
    closed.push_str(FENCE);
    Cow::Owned(closed)
}

/// Render fenced code blocks, inline code, bold and italic as Telegram HTML.
///
/// Everything else is escaped and passed through. A fence left open at the
/// end of input is closed implicitly.
pub fn markdown_to_telegram_html(md: &str) -> String {
    let mut out = String::with_capacity(md.len() + 16);
    let mut prose: Vec<&str> = Vec::new();
    let mut code: Option<(String, Vec<&str>)> = None;

    for line in md.split('\n') {
        let fence = line.trim_start().strip_prefix(FENCE);
        match (&mut code, fence) {
            (None, Some(lang)) => {
                flush_prose(&mut out, &mut prose);
                code = Some((lang.trim().to_string(), Vec::new()));
            },
            (None, None) => prose.push(line),
            (Some(_), Some(_)) => {
                if let Some((lang, body)) = code.take() {
                    push_code_block(&mut out, &lang, &body);
                }
            },
            (Some((_, body)), None) => body.push(line),
        }
    }
    flush_prose(&mut out, &mut prose);
    if let Some((lang, body)) = code {
        push_code_block(&mut out, &lang, &body);
    }

    // the newline before a fence belongs to the block boundary
    while out.ends_with('\n') && !md.ends_with('\n') {
        out.pop();
    }
    out
}

fn flush_prose(out: &mut String, prose: &mut Vec<&str>) {
    if prose.is_empty() {
        return;
    }
    out.push_str(&render_inline(&prose.join("\n")));
    out.push('\n');
    prose.clear();
}

fn push_code_block(out: &mut String, lang: &str, body: &[&str]) {
    let code = escape_html(&body.join("\n"));
    if lang.is_empty() {
        out.push_str("<pre>");
        out.push_str(&code);
        out.push_str("</pre>");
    } else {
        out.push_str(&format!(
            "<pre><code class=\"language-{}\">{code}</code></pre>",
            escape_html(lang)
        ));
    }
    out.push('\n');
}

fn render_inline(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '`'
            && let Some(end) = find_marker(&chars, i + 1, &['`'])
        {
            out.push_str("<code>");
            out.push_str(&escape_html(&collect(&chars[i + 1..end])));
            out.push_str("</code>");
            i = end + 1;
            continue;
        }

        if chars[i..].starts_with(&['*', '*'])
            && let Some(end) = find_marker(&chars, i + 2, &['*', '*'])
            && end > i + 2
        {
            out.push_str("<b>");
            out.push_str(&render_inline(&collect(&chars[i + 2..end])));
            out.push_str("</b>");
            i = end + 2;
            continue;
        }

        if chars[i] == '*'
            && chars.get(i + 1).is_some_and(|c| !c.is_whitespace() && *c != '*')
            && let Some(end) = find_marker(&chars, i + 1, &['*'])
        {
            out.push_str("<i>");
            out.push_str(&render_inline(&collect(&chars[i + 1..end])));
            out.push_str("</i>");
            i = end + 1;
            continue;
        }

        push_escaped(&mut out, chars[i]);
        i += 1;
    }
    out
}

fn find_marker(chars: &[char], from: usize, marker: &[char]) -> Option<usize> {
    (from..chars.len()).find(|&j| chars[j..].starts_with(marker))
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        _ => out.push(c),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        push_escaped(&mut out, c);
    }
    out
}

/// Longest prefix of `text` that fits in `max_len` bytes without splitting a
/// character.
#[must_use]
pub fn truncate_at_char_boundary(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("**hello**", "<b>hello</b>")]
    #[case("*hello*", "<i>hello</i>")]
    #[case("`code`", "<code>code</code>")]
    #[case("a < b && c > d", "a &lt; b &amp;&amp; c &gt; d")]
    #[case("**bold *and italic***", "<b>bold <i>and italic</i></b>")]
    #[case("`**not bold**`", "<code>**not bold**</code>")]
    fn inline_markup(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(markdown_to_telegram_html(input), expected);
    }

    #[rstest]
    #[case("2 * 3 = 6")]
    #[case("half `open")]
    #[case("**unfinished")]
    #[case("snake_case_name")]
    fn unpaired_markers_stay_literal(#[case] input: &str) {
        assert_eq!(markdown_to_telegram_html(input), input);
    }

    #[test]
    fn fenced_block_with_language() {
        let html = markdown_to_telegram_html("Look:\n```rust\nfn main() {}\n```\ndone");
        assert_eq!(
            html,
            "Look:\n<pre><code class=\"language-rust\">fn main() {}</code></pre>\ndone"
        );
    }

    #[test]
    fn fenced_block_escapes_and_skips_inline_markup() {
        let html = markdown_to_telegram_html("```\nif a < b { **x** }\n```");
        assert_eq!(html, "<pre>if a &lt; b { **x** }</pre>");
    }

    #[test]
    fn open_fence_is_closed() {
        let partial = "Here:\n```python\nprint(1)";
        assert_eq!(close_open_fence(partial), "Here:\n```python\nprint(1)\n```");
        assert!(matches!(close_open_fence("no fences"), Cow::Borrowed(_)));

        let html = render_message(partial).html.unwrap();
        assert!(html.ends_with("</code></pre>"));
        assert_eq!(html.matches("<pre>").count(), html.matches("</pre>").count());
    }

    #[test]
    fn empty_text_uses_glyph() {
        let rendered = render_message("  ");
        assert_eq!(rendered.plain, EMPTY_TEXT_GLYPH);
        assert_eq!(rendered.html.as_deref(), Some(EMPTY_TEXT_GLYPH));
    }

    #[test]
    fn oversized_html_falls_back_to_plain() {
        let text = "<".repeat(2000);
        let rendered = render_message(&text);
        // escaping quadruples the size
        assert!(rendered.html.is_none());
        assert_eq!(rendered.plain, text);
    }

    #[test]
    fn plain_is_truncated_to_limit() {
        let text = "x".repeat(TELEGRAM_MAX_MESSAGE_LEN + 10);
        assert_eq!(render_message(&text).plain.len(), TELEGRAM_MAX_MESSAGE_LEN);
    }

    #[test]
    fn truncate_at_char_boundary_handles_utf8() {
        let text = format!("{}л{}", "a".repeat(4095), "z");
        let truncated = truncate_at_char_boundary(&text, 4096);
        assert_eq!(truncated.len(), 4095);
        assert!(truncated.chars().all(|c| c == 'a'));
        assert_eq!(truncate_at_char_boundary("short", 4096), "short");
    }
}
