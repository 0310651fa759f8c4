use crate::formatting::inline::{format_inline, Span, SpanKind};

/// Renders formatted text as an HTML fragment. Lines are joined with `<br>`.
pub fn render_html(text: &str) -> String {
    format_inline(text)
        .map(|line| render_line(&line))
        .collect::<Vec<_>>()
        .join("<br>")
}

fn render_line(spans: &[Span<'_>]) -> String {
    let mut html = String::new();
    for span in spans {
        let escaped = html_escape(span.text);
        match span.kind {
            SpanKind::Plain => html.push_str(&escaped),
            SpanKind::Bold => {
                html.push_str("<strong>");
                html.push_str(&escaped);
                html.push_str("</strong>");
            }
            SpanKind::Italic => {
                html.push_str("<em>");
                html.push_str(&escaped);
                html.push_str("</em>");
            }
            SpanKind::Underline => {
                html.push_str("<u>");
                html.push_str(&escaped);
                html.push_str("</u>");
            }
        }
    }
    html
}

pub fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_styles() {
        assert_eq!(
            render_html("**Hiring** *now*: <u>apply</u>"),
            "<strong>Hiring</strong> <em>now</em>: <u>apply</u>"
        );
    }

    #[test]
    fn test_render_joins_lines_with_br() {
        assert_eq!(render_html("one\ntwo"), "one<br>two");
        assert_eq!(render_html(""), "");
    }

    #[test]
    fn test_render_escapes_span_text() {
        assert_eq!(
            render_html("<script>x</script> & **<b>**"),
            "&lt;script&gt;x&lt;/script&gt; &amp; <strong>&lt;b&gt;</strong>"
        );
    }

    #[test]
    fn test_unmatched_underline_tag_is_escaped() {
        assert_eq!(render_html("<u>open"), "&lt;u&gt;open");
    }
}
