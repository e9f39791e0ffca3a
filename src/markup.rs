//! Inline markup shared by the run compositor and the pagination engine.
//!
//! The vocabulary is small: `<b>`, `<i>`, `<u>`, `<font color="#RRGGBB">`,
//! `<font size="N">` and the `&amp;`/`&lt;`/`&gt;` entities.

use crate::model::Run;

pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Markup for one run; empty for an empty run.
pub fn compose_run(run: &Run) -> String {
    let mut rt = escape(&run.text);
    if rt.is_empty() {
        return rt;
    }
    if let Some([r, g, b]) = run.color {
        rt = format!("<font color=\"#{r:02X}{g:02X}{b:02X}\">{rt}</font>");
    }
    if let Some(size) = run.font_size.filter(|s| s.is_finite() && *s > 0.0) {
        rt = format!("<font size=\"{size:.1}\">{rt}</font>");
    }
    rt = match (run.bold, run.italic) {
        (true, true) => format!("<b><i>{rt}</i></b>"),
        (true, false) => format!("<b>{rt}</b>"),
        (false, true) => format!("<i>{rt}</i>"),
        (false, false) => rt,
    };
    if run.underline {
        rt = format!("<u>{rt}</u>");
    }
    rt
}

/// Markup for a paragraph's runs. When the runs compose to nothing, the
/// paragraph's stripped plain text is used instead so content is never lost.
pub fn compose_runs(runs: &[Run], plain_text: &str) -> String {
    let composed: String = runs.iter().map(compose_run).collect();
    if composed.is_empty() {
        escape(plain_text.trim())
    } else {
        composed
    }
}

/// Character styling in effect for a span of text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub size: Option<f32>,
    pub color: Option<[u8; 3]>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

/// Read markup back into styled spans. Unknown tags are dropped, unknown
/// entities and stray `<` are kept as literal text.
pub fn parse(markup: &str) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    let mut stack: Vec<SpanStyle> = vec![SpanStyle::default()];
    let mut text = String::new();
    let mut rest = markup;

    fn flush(text: &mut String, style: &SpanStyle, spans: &mut Vec<Span>) {
        if text.is_empty() {
            return;
        }
        match spans.last_mut() {
            Some(last) if last.style == *style => last.text.push_str(text),
            _ => spans.push(Span {
                text: text.clone(),
                style: style.clone(),
            }),
        }
        text.clear();
    }

    while let Some(ch) = rest.chars().next() {
        match ch {
            '<' => {
                let Some(end) = rest.find('>') else {
                    text.push_str(rest);
                    break;
                };
                let tag = &rest[1..end];
                rest = &rest[end + 1..];
                let current = stack.last().cloned().unwrap_or_default();
                flush(&mut text, &current, &mut spans);

                if tag.starts_with('/') {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                    continue;
                }
                let name = tag.split_whitespace().next().unwrap_or("");
                let mut next = current;
                match name {
                    "b" => next.bold = true,
                    "i" => next.italic = true,
                    "u" => next.underline = true,
                    "font" => {
                        if let Some(color) = tag_attr(tag, "color").and_then(parse_color) {
                            next.color = Some(color);
                        }
                        if let Some(size) = tag_attr(tag, "size")
                            .and_then(|v| v.parse::<f32>().ok())
                            .filter(|s| s.is_finite() && *s > 0.0)
                        {
                            next.size = Some(size);
                        }
                    }
                    other => log::debug!("ignoring unknown markup tag <{other}>"),
                }
                stack.push(next);
            }
            '&' => {
                let decoded = rest.find(';').filter(|&i| i <= 8).and_then(|semi| {
                    let c = match &rest[1..semi] {
                        "amp" => '&',
                        "lt" => '<',
                        "gt" => '>',
                        "quot" => '"',
                        "apos" => '\'',
                        _ => return None,
                    };
                    Some((c, semi + 1))
                });
                match decoded {
                    Some((c, len)) => {
                        text.push(c);
                        rest = &rest[len..];
                    }
                    None => {
                        text.push('&');
                        rest = &rest[1..];
                    }
                }
            }
            _ => {
                text.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }
    let current = stack.last().cloned().unwrap_or_default();
    flush(&mut text, &current, &mut spans);
    spans
}

fn tag_attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let pattern = format!("{name}=\"");
    let start = tag.find(&pattern)? + pattern.len();
    let len = tag[start..].find('"')?;
    Some(&tag[start..start + len])
}

fn parse_color(val: &str) -> Option<[u8; 3]> {
    let hex = val.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}
