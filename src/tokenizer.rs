use indexmap::IndexMap;
use tracing::trace;

use crate::{
    error::{ParseError, ParseErrorKind},
    filter::{ElementSource, ParseContext},
    markup::MarkupElement,
    tag::{Position, Tag, TagKind, unescape_markup},
};

type ParseResult<T> = Result<T, ParseError>;

pub(crate) const SCRIPT: &str = "script";
pub(crate) const STYLE: &str = "style";

/// Pull tokenizer turning template text into raw markup elements.
///
/// Bodies of `<script>` and `<style>` elements are passed through as text
/// without looking for tags inside them.
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// The starting location of the current line
    line_start_pos: usize,
    /// Set after an open `<script>`/`<style>` tag; the body up to the
    /// matching close tag is returned verbatim.
    skip_until: Option<&'static str>,
    doctype: Option<String>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Tokenizer {
            input,
            pos: 0,
            line: 1,
            line_start_pos: 0,
            skip_until: None,
            doctype: None,
        }
    }

    /// The `<!DOCTYPE ...>` text seen so far, without the brackets.
    pub fn doctype(&self) -> Option<&str> {
        self.doctype.as_deref()
    }

    #[inline]
    fn current_column(&self) -> usize {
        self.pos.saturating_sub(self.line_start_pos) + 1
    }

    #[inline]
    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.current_column(),
            offset: self.pos,
        }
    }

    #[inline]
    fn make_error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::at(self.position(), kind)
    }

    /// Moves to `target`, counting the newlines passed over.
    fn advance_to(&mut self, target: usize) {
        let target = target.min(self.input.len());
        if let Some(consumed) = self.input.get(self.pos..target) {
            for (i, ch) in consumed.char_indices() {
                if ch == '\n' {
                    self.line += 1;
                    self.line_start_pos = self.pos + i + 1;
                }
            }
        }
        self.pos = target;
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn rest(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or_default()
    }

    fn slice(&self, from: usize, to: usize) -> &'a str {
        self.input.get(from..to).unwrap_or_default()
    }

    fn find_from(&self, from: usize, needle: &str) -> Option<usize> {
        self.input
            .get(from..)?
            .find(needle)
            .map(|index| index + from)
    }

    /// Finds `target` outside single or double quoted sections.
    fn find_out_of_quotes(&self, from: usize, target: u8) -> Option<usize> {
        let mut quote = None;
        let bytes = self.input.as_bytes().get(from..)?;
        for (offset, byte) in bytes.iter().enumerate() {
            match quote {
                Some(q) if q == *byte => quote = None,
                Some(_) => {}
                None if *byte == b'"' || *byte == b'\'' => quote = Some(*byte),
                None if *byte == target => return Some(from + offset),
                None => {}
            }
        }
        None
    }

    /// Returns the next raw element, or `None` once the input is exhausted.
    pub fn next_raw(&mut self) -> ParseResult<Option<MarkupElement>> {
        loop {
            if self.eof() {
                return Ok(None);
            }

            if let Some(raw_tag) = self.skip_until.take() {
                match self.skip_raw_body(raw_tag)? {
                    Some(body) => return Ok(Some(MarkupElement::Text(body))),
                    None => continue,
                }
            }

            if !self.rest().starts_with('<') {
                let end = self
                    .find_from(self.pos, "<")
                    .unwrap_or(self.input.len());
                let text = self.slice(self.pos, end).to_string();
                self.advance_to(end);
                return Ok(Some(MarkupElement::Text(text)));
            }

            return self.parse_markup().map(Some);
        }
    }

    fn parse_markup(&mut self) -> ParseResult<MarkupElement> {
        let start = self.pos;
        let position = self.position();

        match self.rest().chars().nth(1) {
            Some('!' | '?') => self.parse_special(start, position),
            Some(_) => self.parse_tag(start, position),
            None => Err(self.make_error(ParseErrorKind::UnclosedBracket)),
        }
    }

    fn parse_tag(&mut self, start: usize, position: Position) -> ParseResult<MarkupElement> {
        let close = self
            .find_out_of_quotes(start + 1, b'>')
            .ok_or_else(|| self.make_error(ParseErrorKind::UnclosedBracket))?;

        let inner = self.slice(start + 1, close);
        if inner.is_empty() {
            return Err(ParseError::at(position, ParseErrorKind::EmptyTag));
        }

        let (kind, text) = if let Some(text) = inner.strip_prefix('/') {
            (TagKind::Close, text)
        } else if let Some(text) = inner.strip_suffix('/') {
            (TagKind::OpenClose, text)
        } else {
            (TagKind::Open, inner)
        };

        let (namespace, name, attributes) =
            parse_tag_text(text).map_err(|kind| ParseError::at(position, kind))?;
        let source = self.slice(start, close + 1).to_string();
        self.advance_to(close + 1);

        if kind == TagKind::Open && namespace.is_none() {
            if name.eq_ignore_ascii_case(SCRIPT) && is_javascript(&attributes) {
                self.skip_until = Some(SCRIPT);
            } else if name.eq_ignore_ascii_case(STYLE) {
                self.skip_until = Some(STYLE);
            }
        }

        trace!(tag = %source, line = position.line, column = position.column, "tag");
        Ok(MarkupElement::Tag(Tag::from_source(
            name, namespace, kind, attributes, position, source,
        )))
    }

    /// Comments, conditional comments, CDATA, doctype and processing
    /// instructions.
    fn parse_special(&mut self, start: usize, position: Position) -> ParseResult<MarkupElement> {
        let rest = self.rest();

        if rest.starts_with("<!--") {
            if rest.starts_with("<!--[if ") {
                // Only the opener is consumed; what the condition guards is
                // ordinary markup.
                let close = self
                    .find_from(start, ">")
                    .ok_or_else(|| self.make_error(ParseErrorKind::UnclosedBracket))?;
                let mut end = close + 1;
                if self.slice(end, self.input.len()).starts_with("<!-->") {
                    end += "<!-->".len();
                }
                let text = self.slice(start, end).to_string();
                self.advance_to(end);
                return Ok(MarkupElement::Text(text));
            }

            let end = self
                .find_from(start + 4, "-->")
                .ok_or_else(|| {
                    ParseError::at(
                        position,
                        ParseErrorKind::UnclosedSection {
                            what: "comment".to_string(),
                        },
                    )
                })?
                + 3;
            let text = self.slice(start, end).to_string();
            self.advance_to(end);
            if text.contains("<![endif]") {
                return Ok(MarkupElement::Text(text));
            }
            return Ok(MarkupElement::Comment(text));
        }

        if starts_with_ignore_case(rest, "<![CDATA[") {
            let end = self
                .find_from(start + 9, "]]>")
                .ok_or_else(|| {
                    ParseError::at(
                        position,
                        ParseErrorKind::UnclosedSection {
                            what: "CDATA section".to_string(),
                        },
                    )
                })?
                + 3;
            let text = self.slice(start, end).to_string();
            self.advance_to(end);
            return Ok(MarkupElement::Text(text));
        }

        let close = self
            .find_from(start, ">")
            .ok_or_else(|| self.make_error(ParseErrorKind::UnclosedBracket))?;
        if starts_with_ignore_case(rest, "<!DOCTYPE") {
            self.doctype = Some(self.slice(start + 2, close).to_string());
        }
        let text = self.slice(start, close + 1).to_string();
        self.advance_to(close + 1);
        Ok(MarkupElement::Text(text))
    }

    /// Consumes everything up to the close tag of a raw-body element.
    fn skip_raw_body(&mut self, tag_name: &'static str) -> ParseResult<Option<String>> {
        let start = self.pos;
        let rest = self.rest();
        let found = rest.match_indices("</").map(|(i, _)| i).find(|&i| {
            rest.get(i + 2..i + 2 + tag_name.len())
                .is_some_and(|name| name.eq_ignore_ascii_case(tag_name))
        });

        let unclosed = || {
            self.make_error(ParseErrorKind::UnclosedRawBody {
                tag: tag_name.to_string(),
            })
        };
        let relative = found.ok_or_else(unclosed)?;
        if self.find_from(start + relative, ">").is_none() {
            return Err(unclosed());
        }

        let body = rest.get(..relative).unwrap_or_default().to_string();
        self.advance_to(start + relative);
        Ok((!body.is_empty()).then_some(body))
    }
}

impl ElementSource for Tokenizer<'_> {
    fn next_element(&mut self, _ctx: &mut ParseContext<'_>) -> ParseResult<Option<MarkupElement>> {
        self.next_raw()
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn is_javascript(attributes: &IndexMap<String, String>) -> bool {
    attributes
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("type"))
        .is_none_or(|(_, value)| {
            value
                .to_ascii_lowercase()
                .starts_with("text/javascript")
        })
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

type TagText = (Option<String>, String, IndexMap<String, String>);

/// Splits the text between `<` and `>` into namespace, name and attributes.
fn parse_tag_text(text: &str) -> Result<TagText, ParseErrorKind> {
    let text = text.trim_end();
    let name_end = text.find(char::is_whitespace).unwrap_or(text.len());
    let (qualified, mut rest) = text.split_at(name_end);

    if !is_valid_name(qualified) {
        return Err(ParseErrorKind::MalformedTag);
    }

    let (namespace, name) = match qualified.split_once(':') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() => {
            (Some(ns.to_string()), name.to_string())
        }
        Some(_) => return Err(ParseErrorKind::MalformedTag),
        None => (None, qualified.to_string()),
    };

    let mut attributes = IndexMap::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let key_end = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let (key, after_key) = rest.split_at(key_end);
        if key.is_empty() {
            return Err(ParseErrorKind::MalformedTag);
        }

        let value;
        match after_key.trim_start().strip_prefix('=') {
            Some(after_eq) => {
                let after_eq = after_eq.trim_start();
                match after_eq.chars().next() {
                    Some(quote @ ('"' | '\'')) => {
                        let body = after_eq.get(1..).unwrap_or_default();
                        let end = body.find(quote).ok_or(ParseErrorKind::MalformedTag)?;
                        value = body.get(..end).unwrap_or_default();
                        rest = body.get(end + 1..).unwrap_or_default();
                    }
                    Some(_) => {
                        let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                        let (unquoted, remainder) = after_eq.split_at(end);
                        value = unquoted;
                        rest = remainder;
                    }
                    None => {
                        value = "";
                        rest = "";
                    }
                }
            }
            None => {
                value = "";
                rest = after_key;
            }
        }

        if attributes.contains_key(key) {
            return Err(ParseErrorKind::DuplicateAttribute {
                key: key.to_string(),
            });
        }
        attributes.insert(key.to_string(), unescape_markup(value.trim()).into_owned());
    }

    Ok((namespace, name, attributes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(input: &str) -> ParseResult<Vec<MarkupElement>> {
        let mut tokenizer = Tokenizer::new(input);
        let mut elements = Vec::new();
        while let Some(element) = tokenizer.next_raw()? {
            elements.push(element);
        }
        Ok(elements)
    }

    fn tag_at(elements: &[MarkupElement], index: usize) -> &Tag {
        elements
            .get(index)
            .and_then(MarkupElement::as_tag)
            .expect("expected a tag")
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_empty_input() {
        assert_eq!(tokenize("").unwrap(), vec![]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_text_and_tags() {
        let elements = tokenize("Hello <b>world</b>!").unwrap();
        assert_eq!(elements.len(), 5);
        assert_eq!(elements[0], MarkupElement::Text("Hello ".to_string()));
        assert_eq!(tag_at(&elements, 1).kind(), TagKind::Open);
        assert_eq!(tag_at(&elements, 1).name(), "b");
        assert_eq!(elements[2], MarkupElement::Text("world".to_string()));
        assert_eq!(tag_at(&elements, 3).kind(), TagKind::Close);
        assert_eq!(elements[4], MarkupElement::Text("!".to_string()));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_attributes_in_all_forms() {
        let elements =
            tokenize(r#"<input type="text" name='q' size=10 disabled value=" a&amp;b "/>"#)
                .unwrap();
        let tag = tag_at(&elements, 0);
        assert_eq!(tag.kind(), TagKind::OpenClose);
        let attributes: Vec<(&str, &str)> = tag
            .attributes()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            attributes,
            vec![
                ("type", "text"),
                ("name", "q"),
                ("size", "10"),
                ("disabled", ""),
                ("value", "a&b"),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_gt_inside_quotes_does_not_end_tag() {
        let elements = tokenize(r#"<a title="a > b" href="x">y</a>"#).unwrap();
        assert_eq!(tag_at(&elements, 0).attribute("title"), Some("a > b"));
        assert_eq!(tag_at(&elements, 0).attribute("href"), Some("x"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_namespace_prefix() {
        let elements = tokenize("<wicket:panel>x</wicket:panel>").unwrap();
        let tag = tag_at(&elements, 0);
        assert_eq!(tag.namespace(), Some("wicket"));
        assert_eq!(tag.name(), "panel");
        assert_eq!(tag.qualified_name(), "wicket:panel");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_self_closing_with_space() {
        let elements = tokenize("<br />").unwrap();
        assert_eq!(tag_at(&elements, 0).kind(), TagKind::OpenClose);
        assert_eq!(tag_at(&elements, 0).name(), "br");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_duplicate_attribute_reports_position() {
        let err = tokenize("<p>\n  <span class=\"a\" class=\"b\">").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 3);
        assert_eq!(
            err.kind,
            ParseErrorKind::DuplicateAttribute {
                key: "class".to_string()
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_bracket() {
        let err = tokenize("text\n<div class=\"x\"").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnclosedBracket);
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 1);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_empty_tag() {
        let err = tokenize("a<>b").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::EmptyTag);
        assert_eq!(err.column, 2);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_malformed_tag_name() {
        let err = tokenize("<1abc>").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MalformedTag);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_comment_may_contain_gt() {
        let elements = tokenize("<!-- a > b --><p>").unwrap();
        assert_eq!(
            elements[0],
            MarkupElement::Comment("<!-- a > b -->".to_string())
        );
        assert_eq!(tag_at(&elements, 1).name(), "p");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_comment() {
        let err = tokenize("x <!-- never closed").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnclosedSection { ref what } if what == "comment"));
        assert_eq!(err.column, 3);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_conditional_comment_body_is_tokenized() {
        let elements = tokenize("<!--[if IE]><b>ie</b><![endif]-->").unwrap();
        assert_eq!(elements[0], MarkupElement::Text("<!--[if IE]>".to_string()));
        assert_eq!(tag_at(&elements, 1).name(), "b");
        assert_eq!(
            elements.last(),
            Some(&MarkupElement::Text("<![endif]-->".to_string()))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_cdata_doctype_and_processing_instruction() {
        let input = "<!DOCTYPE html><?php echo 1 ?><![CDATA[ <not-a-tag> ]]>";
        let mut tokenizer = Tokenizer::new(input);
        let mut texts = Vec::new();
        while let Some(element) = tokenizer.next_raw().unwrap() {
            texts.push(element);
        }
        assert_eq!(tokenizer.doctype(), Some("DOCTYPE html"));
        assert_eq!(
            texts,
            vec![
                MarkupElement::Text("<!DOCTYPE html>".to_string()),
                MarkupElement::Text("<?php echo 1 ?>".to_string()),
                MarkupElement::Text("<![CDATA[ <not-a-tag> ]]>".to_string()),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_script_body_is_not_tokenized() {
        let elements = tokenize("<script>if (a < b) { x = '<p>'; }</SCRIPT><p>").unwrap();
        assert_eq!(tag_at(&elements, 0).name(), "script");
        assert_eq!(
            elements[1],
            MarkupElement::Text("if (a < b) { x = '<p>'; }".to_string())
        );
        assert_eq!(tag_at(&elements, 2).name(), "SCRIPT");
        assert_eq!(tag_at(&elements, 3).name(), "p");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_template_script_is_tokenized() {
        let elements =
            tokenize(r#"<script type="text/x-template"><b>x</b></script>"#).unwrap();
        assert_eq!(tag_at(&elements, 1).name(), "b");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_style() {
        let err = tokenize("<style>p { color: red }").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::UnclosedRawBody {
                tag: "style".to_string()
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_positions_track_lines() {
        let elements = tokenize("<a>\n\n   <b>").unwrap();
        let tag = tag_at(&elements, 2);
        assert_eq!(tag.position().line, 3);
        assert_eq!(tag.position().column, 4);
        assert_eq!(tag.position().offset, 8);
    }
}
