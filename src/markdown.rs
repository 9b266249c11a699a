use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use regex::Regex;

/// Fixed keyword table per language tag. Unknown tags get no keyword
/// highlighting but still get strings, comments and numbers.
fn keywords_for(language: &str) -> &'static [&'static str] {
    match language {
        "javascript" | "js" => &[
            "function", "const", "let", "var", "return", "if", "else", "for", "while", "class",
            "import", "export",
        ],
        "typescript" | "ts" => &[
            "function", "const", "let", "var", "return", "if", "else", "for", "while", "class",
            "interface", "type", "import", "export",
        ],
        "python" | "py" => &[
            "def", "return", "if", "else", "for", "while", "class", "import", "from", "as", "try",
            "except",
        ],
        "jsx" => &[
            "function", "const", "let", "return", "if", "else", "import", "export", "useState",
            "useEffect",
        ],
        "tsx" => &[
            "function", "const", "let", "return", "if", "else", "import", "export", "useState",
            "useEffect", "interface",
        ],
        "rust" | "rs" => &[
            "fn", "let", "mut", "pub", "use", "impl", "struct", "enum", "match", "if", "else",
            "for", "while", "return", "mod", "trait",
        ],
        _ => &[],
    }
}

fn string_style() -> Style {
    Style::default().fg(Color::Green)
}

fn comment_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

fn keyword_style() -> Style {
    Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD)
}

fn number_style() -> Style {
    Style::default().fg(Color::Yellow)
}

fn code_style() -> Style {
    Style::default().fg(Color::White)
}

fn inline_code_style() -> Style {
    Style::default().fg(Color::Yellow)
}

fn link_style() -> Style {
    Style::default()
        .fg(Color::Blue)
        .add_modifier(Modifier::UNDERLINED)
}

fn heading_style(depth: usize) -> Style {
    match depth {
        1 | 2 => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        3 | 4 => Style::default().add_modifier(Modifier::BOLD),
        _ => Style::default()
            .fg(Color::Gray)
            .add_modifier(Modifier::BOLD),
    }
}

/// Converts assistant markdown into styled terminal text: headings,
/// paragraphs, lists, bold/italic, inline code, blockquotes, links and
/// fenced code blocks with syntax highlighting.
pub fn render_markdown(content: &str) -> Text<'static> {
    let mut out: Vec<Line<'static>> = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        if let Some(fence) = line.trim_start().strip_prefix("```") {
            let language = fence.trim().to_lowercase();
            let mut code_lines: Vec<&str> = Vec::new();
            for code_line in lines.by_ref() {
                if code_line.trim_start().starts_with("```") {
                    break;
                }
                code_lines.push(code_line);
            }
            out.extend(render_code_block(&language, &code_lines));
            continue;
        }

        out.push(render_block_line(line));
    }

    Text::from(out)
}

fn render_block_line(line: &str) -> Line<'static> {
    let trimmed = line.trim_start();

    if trimmed.is_empty() {
        return Line::default();
    }

    // Headings: # through ######.
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes) && trimmed.chars().nth(hashes) == Some(' ') {
        let text = trimmed[hashes + 1..].to_string();
        return Line::from(Span::styled(text, heading_style(hashes)));
    }

    // Blockquotes.
    if let Some(rest) = trimmed.strip_prefix("> ").or_else(|| {
        (trimmed == ">").then_some("")
    }) {
        let mut spans = vec![Span::styled("│ ", comment_style())];
        spans.extend(inline_spans(
            rest,
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        ));
        return Line::from(spans);
    }

    let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();

    // Unordered list items.
    if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        let mut spans = vec![Span::raw(indent), Span::raw("• ")];
        spans.extend(inline_spans(rest, Style::default()));
        return Line::from(spans);
    }

    // Ordered list items keep their own numbering.
    if let Some(dot) = trimmed.find(". ") {
        if dot > 0 && trimmed[..dot].chars().all(|c| c.is_ascii_digit()) {
            let mut spans = vec![
                Span::raw(indent),
                Span::styled(trimmed[..dot + 2].to_string(), Style::default().add_modifier(Modifier::BOLD)),
            ];
            spans.extend(inline_spans(&trimmed[dot + 2..], Style::default()));
            return Line::from(spans);
        }
    }

    Line::from(inline_spans(line, Style::default()))
}

/// Parses `**bold**`, `*italic*`, `` `code` `` and `[text](url)` into
/// styled spans. Plain text takes `base`.
fn inline_spans(text: &str, base: Style) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current = String::new();

    let flush = |current: &mut String, spans: &mut Vec<Span<'static>>| {
        if !current.is_empty() {
            spans.push(Span::styled(std::mem::take(current), base));
        }
    };

    while let Some((i, c)) = chars.next() {
        match c {
            '*' if chars.peek().map(|(_, c)| *c) == Some('*') => {
                chars.next();
                if let Some(end) = text[i + 2..].find("**") {
                    flush(&mut current, &mut spans);
                    let inner = &text[i + 2..i + 2 + end];
                    spans.push(Span::styled(
                        inner.to_string(),
                        base.add_modifier(Modifier::BOLD),
                    ));
                    skip_to(&mut chars, i + 2 + end + 2);
                } else {
                    current.push_str("**");
                }
            }
            '*' => {
                if let Some(end) = text[i + 1..].find('*') {
                    flush(&mut current, &mut spans);
                    let inner = &text[i + 1..i + 1 + end];
                    spans.push(Span::styled(
                        inner.to_string(),
                        base.add_modifier(Modifier::ITALIC),
                    ));
                    skip_to(&mut chars, i + 1 + end + 1);
                } else {
                    current.push(c);
                }
            }
            '`' => {
                if let Some(end) = text[i + 1..].find('`') {
                    flush(&mut current, &mut spans);
                    let inner = &text[i + 1..i + 1 + end];
                    spans.push(Span::styled(inner.to_string(), inline_code_style()));
                    skip_to(&mut chars, i + 1 + end + 1);
                } else {
                    current.push(c);
                }
            }
            '[' => {
                // [text](url) keeps the target visible next to the label.
                if let Some((label, url, after)) = parse_link(&text[i..]) {
                    flush(&mut current, &mut spans);
                    spans.push(Span::styled(label, link_style()));
                    spans.push(Span::styled(format!(" ({})", url), comment_style()));
                    skip_to(&mut chars, i + after);
                } else {
                    current.push(c);
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        spans.push(Span::styled(current, base));
    }
    spans
}

/// Advances the char iterator to byte offset `target`.
fn skip_to(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, target: usize) {
    while let Some((i, _)) = chars.peek() {
        if *i >= target {
            break;
        }
        chars.next();
    }
}

/// Returns (label, url, bytes consumed) for a `[label](url)` prefix.
fn parse_link(text: &str) -> Option<(String, String, usize)> {
    let close = text.find(']')?;
    if !text[close + 1..].starts_with('(') {
        return None;
    }
    let end = text[close + 2..].find(')')?;
    let label = text[1..close].to_string();
    let url = text[close + 2..close + 2 + end].to_string();
    if label.is_empty() || url.is_empty() {
        return None;
    }
    Some((label, url, close + 2 + end + 1))
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TokenKind {
    Str,
    Comment,
    Keyword,
    Number,
}

fn token_style(kind: TokenKind) -> Style {
    match kind {
        TokenKind::Str => string_style(),
        TokenKind::Comment => comment_style(),
        TokenKind::Keyword => keyword_style(),
        TokenKind::Number => number_style(),
    }
}

struct Highlighter {
    string_re: Regex,
    comment_start_re: Regex,
    number_re: Regex,
    keyword_re: Option<Regex>,
    in_block_comment: bool,
}

impl Highlighter {
    fn new(language: &str) -> Self {
        let keywords = keywords_for(language);
        let keyword_re = if keywords.is_empty() {
            None
        } else {
            Some(
                Regex::new(&format!(r"\b(?:{})\b", keywords.join("|")))
                    .expect("keyword pattern is static"),
            )
        };

        Self {
            string_re: Regex::new(r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#)
                .expect("string pattern is static"),
            comment_start_re: Regex::new(r"//|/\*").expect("comment pattern is static"),
            number_re: Regex::new(r"\b\d+\b").expect("number pattern is static"),
            keyword_re,
            in_block_comment: false,
        }
    }

    /// Highlights one line of code. Strings and comments claim their
    /// ranges first; keyword and number passes only apply outside
    /// them, so `def` inside a string literal stays string-colored.
    fn line(&mut self, line: &str) -> Line<'static> {
        let mut tokens: Vec<(usize, usize, TokenKind)> = Vec::new();
        let mut scan_from = 0;

        if self.in_block_comment {
            match line.find("*/") {
                Some(end) => {
                    tokens.push((0, end + 2, TokenKind::Comment));
                    scan_from = end + 2;
                    self.in_block_comment = false;
                }
                None => {
                    tokens.push((0, line.len(), TokenKind::Comment));
                    scan_from = line.len();
                }
            }
        }

        // Strings before comments before keywords before numbers.
        let mut strings: Vec<(usize, usize)> = self
            .string_re
            .find_iter(&line[scan_from..])
            .map(|m| (scan_from + m.start(), scan_from + m.end()))
            .collect();

        let comment = self
            .comment_start_re
            .find_iter(&line[scan_from..])
            .map(|m| (scan_from + m.start(), m.as_str() == "//"))
            .find(|(start, _)| !strings.iter().any(|&(s, e)| *start >= s && *start < e));

        if let Some((start, is_line_comment)) = comment {
            let end = if is_line_comment {
                line.len()
            } else {
                match line[start + 2..].find("*/") {
                    Some(close) => start + 2 + close + 2,
                    None => {
                        self.in_block_comment = true;
                        line.len()
                    }
                }
            };
            strings.retain(|&(s, _)| s < start);
            tokens.push((start, end, TokenKind::Comment));
        }

        tokens.extend(strings.iter().map(|&(s, e)| (s, e, TokenKind::Str)));

        let protected: Vec<(usize, usize)> = tokens.iter().map(|&(s, e, _)| (s, e)).collect();
        let outside =
            |s: usize, e: usize| !protected.iter().any(|&(ps, pe)| s < pe && e > ps);

        if let Some(keyword_re) = &self.keyword_re {
            tokens.extend(
                keyword_re
                    .find_iter(line)
                    .filter(|m| m.start() >= scan_from && outside(m.start(), m.end()))
                    .map(|m| (m.start(), m.end(), TokenKind::Keyword)),
            );
        }

        tokens.extend(
            self.number_re
                .find_iter(line)
                .filter(|m| m.start() >= scan_from && outside(m.start(), m.end()))
                .map(|m| (m.start(), m.end(), TokenKind::Number)),
        );

        tokens.sort_by_key(|&(s, _, _)| s);

        let mut spans: Vec<Span<'static>> = Vec::new();
        let mut pos = 0;
        for (start, end, kind) in tokens {
            if start > pos {
                spans.push(Span::styled(line[pos..start].to_string(), code_style()));
            }
            spans.push(Span::styled(line[start..end].to_string(), token_style(kind)));
            pos = end;
        }
        if pos < line.len() {
            spans.push(Span::styled(line[pos..].to_string(), code_style()));
        }

        if spans.is_empty() {
            Line::default()
        } else {
            Line::from(spans)
        }
    }
}

/// A fenced code block: a language label line, then highlighted code.
fn render_code_block(language: &str, code_lines: &[&str]) -> Vec<Line<'static>> {
    let label = if language.is_empty() { "code" } else { language };

    let mut out = vec![Line::from(Span::styled(
        format!(" {} ", label.to_uppercase()),
        Style::default()
            .fg(Color::Gray)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    ))];

    let mut highlighter = Highlighter::new(language);
    out.extend(code_lines.iter().map(|line| highlighter.line(line)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(content: &str) -> Vec<Line<'static>> {
        render_markdown(content).lines
    }

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn find_line<'a>(lines: &'a [Line<'static>], needle: &str) -> &'a Line<'static> {
        lines
            .iter()
            .find(|l| line_text(l).contains(needle))
            .expect("line not found")
    }

    #[test]
    fn keyword_in_string_literal_is_not_highlighted() {
        let lines = rendered("```python\nx = \"a def inside\"\ndef foo():\n```");

        let def_line = find_line(&lines, "def foo");
        assert!(def_line
            .spans
            .iter()
            .any(|s| s.content.as_ref() == "def" && s.style == keyword_style()));

        let string_line = find_line(&lines, "a def inside");
        assert!(string_line
            .spans
            .iter()
            .any(|s| s.content.as_ref() == "\"a def inside\"" && s.style == string_style()));
        assert!(!string_line
            .spans
            .iter()
            .any(|s| s.content.as_ref().contains("def") && s.style == keyword_style()));
    }

    #[test]
    fn line_comment_swallows_keywords_and_numbers() {
        let lines = rendered("```javascript\n// for 42 iterations\n```");
        let comment_line = find_line(&lines, "for 42");
        assert_eq!(comment_line.spans.len(), 1);
        assert_eq!(comment_line.spans[0].style, comment_style());
    }

    #[test]
    fn block_comment_spans_lines() {
        let lines = rendered("```javascript\n/* const one\nconst two */\nconst three = 1\n```");
        let inside = find_line(&lines, "const two");
        assert!(inside.spans.iter().all(|s| s.style == comment_style()));

        let after = find_line(&lines, "const three");
        assert!(after
            .spans
            .iter()
            .any(|s| s.content.as_ref() == "const" && s.style == keyword_style()));
    }

    #[test]
    fn comment_marker_inside_string_is_text() {
        let lines = rendered("```javascript\nconst url = \"https://example.com\"\n```");
        let line = find_line(&lines, "example.com");
        assert!(line
            .spans
            .iter()
            .any(|s| s.content.as_ref() == "\"https://example.com\"" && s.style == string_style()));
        assert!(!line.spans.iter().any(|s| s.style == comment_style()));
    }

    #[test]
    fn numbers_are_highlighted_outside_strings() {
        let lines = rendered("```python\ncount = 42\n```");
        let line = find_line(&lines, "count");
        assert!(line
            .spans
            .iter()
            .any(|s| s.content.as_ref() == "42" && s.style == number_style()));
    }

    #[test]
    fn unknown_language_still_highlights_strings() {
        let lines = rendered("```brainfuck\n\"hello\"\n```");
        let line = find_line(&lines, "hello");
        assert!(line
            .spans
            .iter()
            .any(|s| s.content.as_ref() == "\"hello\"" && s.style == string_style()));
    }

    #[test]
    fn code_block_gets_uppercase_language_label() {
        let lines = rendered("```python\npass\n```");
        assert_eq!(line_text(&lines[0]), " PYTHON ");
    }

    #[test]
    fn headings_map_depth_to_style() {
        let lines = rendered("# Big\n###### Small");
        assert_eq!(lines[0].spans[0].style, heading_style(1));
        assert_eq!(line_text(&lines[0]), "Big");
        assert_eq!(lines[1].spans[0].style, heading_style(6));
    }

    #[test]
    fn bold_and_italic_and_inline_code() {
        let lines = rendered("some **bold** and *leaning* and `code` here");
        let line = &lines[0];
        assert!(line
            .spans
            .iter()
            .any(|s| s.content.as_ref() == "bold"
                && s.style.add_modifier.contains(Modifier::BOLD)));
        assert!(line
            .spans
            .iter()
            .any(|s| s.content.as_ref() == "leaning"
                && s.style.add_modifier.contains(Modifier::ITALIC)));
        assert!(line
            .spans
            .iter()
            .any(|s| s.content.as_ref() == "code" && s.style == inline_code_style()));
    }

    #[test]
    fn unclosed_bold_is_literal() {
        let lines = rendered("a ** dangling");
        assert_eq!(line_text(&lines[0]), "a ** dangling");
    }

    #[test]
    fn list_items_get_bullets() {
        let lines = rendered("- first\n* second\n2. third");
        assert_eq!(line_text(&lines[0]), "• first");
        assert_eq!(line_text(&lines[1]), "• second");
        assert_eq!(line_text(&lines[2]), "2. third");
    }

    #[test]
    fn blockquote_is_prefixed_and_dimmed() {
        let lines = rendered("> wisdom");
        let line = &lines[0];
        assert_eq!(line_text(line), "│ wisdom");
        assert!(line.spans.iter().any(|s| s.content.as_ref() == "wisdom"
            && s.style.add_modifier.contains(Modifier::ITALIC)));
    }

    #[test]
    fn links_keep_their_target_visible() {
        let lines = rendered("see [docs](https://example.com) now");
        let line = &lines[0];
        assert!(line
            .spans
            .iter()
            .any(|s| s.content.as_ref() == "docs" && s.style == link_style()));
        assert!(line
            .spans
            .iter()
            .any(|s| s.content.as_ref() == " (https://example.com)"));
    }

    #[test]
    fn unterminated_fence_renders_rest_as_code() {
        let lines = rendered("```python\ndef foo():");
        assert!(lines.len() >= 2);
        assert!(find_line(&lines, "def foo")
            .spans
            .iter()
            .any(|s| s.style == keyword_style()));
    }
}
