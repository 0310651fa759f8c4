//! Inline Formatter: lightweight markup to styled spans, one line at a time.
//!
//! Recognised markers, tried in this order at each position:
//!
//! 1. `**text**` → bold
//! 2. `__text__` → bold
//! 3. `*text*`   → italic, neither marker touching another `*`
//! 4. `_text_`   → italic, neither marker touching another `_`
//! 5. `<u>text</u>` → underline
//!
//! Matching is non-greedy and leftmost-first. After a match the scan resumes
//! right after the closing marker, so markers never nest. Anything that does
//! not complete a match stays in the surrounding plain span.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Plain,
    Bold,
    Italic,
    Underline,
}

/// A run of text with one style. `text` borrows from the formatted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span<'a> {
    pub kind: SpanKind,
    pub text: &'a str,
}

impl<'a> Span<'a> {
    pub fn plain(text: &'a str) -> Self {
        Self {
            kind: SpanKind::Plain,
            text,
        }
    }
}

/// Lazy iterator over the line-groups of a formatted string.
///
/// Cloning restarts nothing and shares nothing: each clone walks the same
/// input independently.
#[derive(Debug, Clone)]
pub struct Lines<'a> {
    inner: std::str::Split<'a, char>,
}

impl<'a> Iterator for Lines<'a> {
    type Item = Vec<Span<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(parse_line)
    }
}

/// Splits `text` on `\n` and formats each line independently.
///
/// Empty input yields a single line holding one empty plain span.
pub fn format_inline(text: &str) -> Lines<'_> {
    Lines {
        inner: text.split('\n'),
    }
}

/// Formats a single line (no `\n` expected).
pub fn parse_line(line: &str) -> Vec<Span<'_>> {
    let mut scanner = LineScanner::new(line.as_bytes());
    let mut spans = Vec::new();
    let mut plain_start = 0;
    let mut pos = 0;

    // Markers are ASCII, so every slice boundary below is a char boundary
    while pos < line.len() {
        match scanner.match_at(pos) {
            Some(found) => {
                if plain_start < pos {
                    spans.push(Span::plain(&line[plain_start..pos]));
                }
                spans.push(Span {
                    kind: found.kind,
                    text: &line[found.content_start..found.content_end],
                });
                pos = found.end;
                plain_start = pos;
            }
            None => pos += 1,
        }
    }

    if plain_start < line.len() || spans.is_empty() {
        spans.push(Span::plain(&line[plain_start..]));
    }
    spans
}

struct Match {
    kind: SpanKind,
    content_start: usize,
    content_end: usize,
    end: usize,
}

const UNDERLINE_OPEN: &[u8] = b"<u>";
const UNDERLINE_CLOSE: &[u8] = b"</u>";

/// Closing markers searched for by position, each with the lowest offset a
/// search has already failed from. A miss from `p` is a miss from every
/// offset after `p`, so each unmatched opener costs O(1) after the first.
#[derive(Clone, Copy)]
enum Closer {
    DoubleStar,
    DoubleUnderscore,
    Underline,
}

impl Closer {
    fn needle(self) -> &'static [u8] {
        match self {
            Closer::DoubleStar => b"**",
            Closer::DoubleUnderscore => b"__",
            Closer::Underline => UNDERLINE_CLOSE,
        }
    }
}

struct LineScanner<'a> {
    bytes: &'a [u8],
    missed_from: [usize; 3],
}

impl<'a> LineScanner<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            missed_from: [usize::MAX; 3],
        }
    }

    fn match_at(&mut self, pos: usize) -> Option<Match> {
        self.match_double(pos, Closer::DoubleStar)
            .or_else(|| self.match_double(pos, Closer::DoubleUnderscore))
            .or_else(|| self.match_single(pos, b'*'))
            .or_else(|| self.match_single(pos, b'_'))
            .or_else(|| self.match_underline(pos))
    }

    /// `**text**` / `__text__`: the first closing pair after at least one content byte.
    fn match_double(&mut self, pos: usize, closer: Closer) -> Option<Match> {
        if !self.bytes[pos..].starts_with(closer.needle()) {
            return None;
        }
        let content_start = pos + 2;
        let close = self.find_close(content_start + 1, closer)?;
        Some(Match {
            kind: SpanKind::Bold,
            content_start,
            content_end: close,
            end: close + 2,
        })
    }

    /// `*text*` / `_text_` where neither marker byte has a twin next to it.
    fn match_single(&self, pos: usize, marker: u8) -> Option<Match> {
        let bytes = self.bytes;
        if bytes[pos] != marker || !isolated(bytes, pos, marker) {
            return None;
        }
        let content_start = pos + 1;
        let close = (content_start + 1..bytes.len())
            .find(|&i| bytes[i] == marker && isolated(bytes, i, marker))?;
        Some(Match {
            kind: SpanKind::Italic,
            content_start,
            content_end: close,
            end: close + 1,
        })
    }

    fn match_underline(&mut self, pos: usize) -> Option<Match> {
        if !self.bytes[pos..].starts_with(UNDERLINE_OPEN) {
            return None;
        }
        let content_start = pos + UNDERLINE_OPEN.len();
        let close = self.find_close(content_start + 1, Closer::Underline)?;
        Some(Match {
            kind: SpanKind::Underline,
            content_start,
            content_end: close,
            end: close + UNDERLINE_CLOSE.len(),
        })
    }

    fn find_close(&mut self, from: usize, closer: Closer) -> Option<usize> {
        let slot = closer as usize;
        if from >= self.missed_from[slot] {
            return None;
        }
        let found = find_from(self.bytes, from, closer.needle());
        if found.is_none() {
            self.missed_from[slot] = from;
        }
        found
    }
}

fn isolated(bytes: &[u8], i: usize, marker: u8) -> bool {
    let before = i.checked_sub(1).map(|j| bytes[j]);
    let after = bytes.get(i + 1).copied();
    before != Some(marker) && after != Some(marker)
}

fn find_from(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| offset + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(line: &str) -> Vec<(SpanKind, &str)> {
        parse_line(line).into_iter().map(|s| (s.kind, s.text)).collect()
    }

    use SpanKind::{Bold, Italic, Plain, Underline};

    #[test]
    fn test_empty_input_is_one_empty_plain_span() {
        let lines: Vec<_> = format_inline("").collect();
        assert_eq!(lines, vec![vec![Span::plain("")]]);
    }

    #[test]
    fn test_plain_lines_pass_through() {
        let lines: Vec<_> = format_inline("plain\nsecond").collect();
        assert_eq!(lines, vec![vec![Span::plain("plain")], vec![Span::plain("second")]]);
    }

    #[test]
    fn test_blank_middle_line_kept() {
        let lines: Vec<_> = format_inline("a\n\nb").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], vec![Span::plain("")]);
    }

    #[test]
    fn test_double_star_bold() {
        assert_eq!(spans("**bold**"), vec![(Bold, "bold")]);
    }

    #[test]
    fn test_double_underscore_bold() {
        assert_eq!(spans("x __y__ z"), vec![(Plain, "x "), (Bold, "y"), (Plain, " z")]);
    }

    #[test]
    fn test_italics_separated_by_plain() {
        assert_eq!(
            spans("*a* and _b_"),
            vec![(Italic, "a"), (Plain, " and "), (Italic, "b")]
        );
    }

    #[test]
    fn test_underline_tag() {
        assert_eq!(
            spans("<u>a</u><u>b</u>"),
            vec![(Underline, "a"), (Underline, "b")]
        );
    }

    #[test]
    fn test_mixed_markers_in_one_line() {
        assert_eq!(
            spans("Apply **now** for the *senior* <u>remote</u> role"),
            vec![
                (Plain, "Apply "),
                (Bold, "now"),
                (Plain, " for the "),
                (Italic, "senior"),
                (Plain, " "),
                (Underline, "remote"),
                (Plain, " role"),
            ]
        );
    }

    #[test]
    fn test_non_greedy_bold() {
        assert_eq!(
            spans("**a** and **b**"),
            vec![(Bold, "a"), (Plain, " and "), (Bold, "b")]
        );
    }

    #[test]
    fn test_unterminated_markers_stay_literal() {
        assert_eq!(spans("**open"), vec![(Plain, "**open")]);
        assert_eq!(spans("<u>open"), vec![(Plain, "<u>open")]);
        assert_eq!(spans("a*b"), vec![(Plain, "a*b")]);
        assert_eq!(spans("****"), vec![(Plain, "****")]);
    }

    #[test]
    fn test_empty_content_does_not_match() {
        assert_eq!(spans("<u></u>"), vec![(Plain, "<u></u>")]);
        assert_eq!(spans("__"), vec![(Plain, "__")]);
    }

    #[test]
    fn test_single_star_next_to_double_is_not_italic() {
        // The closing `*` of `*a**` touches another `*`, so no italic
        assert_eq!(spans("*a**"), vec![(Plain, "*a**")]);
    }

    #[test]
    fn test_triple_star_observed_behavior() {
        // Bold wins at position 0 and swallows the third star
        assert_eq!(spans("***a**"), vec![(Bold, "*a")]);
    }

    #[test]
    fn test_nested_markers_are_not_parsed() {
        assert_eq!(spans("**a *b* c**"), vec![(Bold, "a *b* c")]);
        assert_eq!(spans("<u>**x**</u>"), vec![(Underline, "**x**")]);
    }

    #[test]
    fn test_lookbehind_sees_previous_match() {
        // After `**a**` the next `*` is preceded by a consumed `*`
        assert_eq!(spans("**a***b*"), vec![(Bold, "a"), (Plain, "*b*")]);
    }

    #[test]
    fn test_snake_case_identifier_observed_behavior() {
        assert_eq!(
            spans("snake_case_name"),
            vec![(Plain, "snake"), (Italic, "case"), (Plain, "name")]
        );
    }

    #[test]
    fn test_markers_do_not_span_lines() {
        let lines: Vec<_> = format_inline("**a\nb**").collect();
        assert_eq!(lines, vec![vec![Span::plain("**a")], vec![Span::plain("b**")]]);
    }

    #[test]
    fn test_multibyte_text() {
        assert_eq!(
            spans("**café** – _naïve_ ✓"),
            vec![(Bold, "café"), (Plain, " – "), (Italic, "naïve"), (Plain, " ✓")]
        );
    }

    #[test]
    fn test_span_texts_reproduce_unmarked_input() {
        for input in ["Senior Rust Engineer", "  leading spaces", "tabs\tand: punctuation!"] {
            let joined: String = parse_line(input).iter().map(|s| s.text).collect();
            assert_eq!(joined, input);
            assert_eq!(parse_line(input).len(), 1);
        }
    }

    #[test]
    fn test_unclosed_underline_openers_scan_in_linear_time() {
        let line = "<u>".repeat(40_000);
        let started = std::time::Instant::now();
        let parsed = parse_line(&line);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert_eq!(parsed, vec![Span::plain(line.as_str())]);
    }

    #[test]
    fn test_failed_close_search_does_not_hide_later_matches() {
        // The unclosed `<u>` must not suppress the bold that follows it
        assert_eq!(
            spans("<u>a __b__"),
            vec![(Plain, "<u>a "), (Bold, "b")]
        );
        assert_eq!(
            spans("**x <u>y</u> **"),
            vec![(Bold, "x <u>y</u> ")]
        );
    }

    #[test]
    fn test_lines_are_restartable() {
        let lines = format_inline("**a**\n_b_");
        let first: Vec<_> = lines.clone().collect();
        let second: Vec<_> = lines.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
