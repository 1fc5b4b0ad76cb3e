use std::collections::VecDeque;

use crate::{
    error::{ParseError, ParseErrorKind},
    filter::{ElementSource, FilterResult, MarkupFilter, ParseContext},
    markup::MarkupElement,
    tag::{Tag, TagKind, TagOrigin},
};

/// Elements that never have a body.
const VOID: &[&str] = &[
    "br", "img", "input", "meta", "link", "hr", "area", "base", "col", "param", "embed", "source",
    "track", "wbr",
];

/// Elements whose close tag may be left out.
const OPTIONAL_CLOSE: &[&str] = &[
    "p", "li", "td", "th", "tr", "option", "dt", "dd", "thead", "tbody", "tfoot", "colgroup",
];

/// Block elements that end an open paragraph.
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "blockquote", "div", "dl", "fieldset", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "ol", "p", "pre", "table", "ul",
];

fn is_one_of(tag: &Tag, names: &[&str]) -> bool {
    tag.namespace().is_none() && names.iter().any(|name| tag.name().eq_ignore_ascii_case(name))
}

/// Open elements that the arrival of `name` implicitly closes, innermost
/// first.
fn implicitly_closed_by(name: &str) -> &'static [&'static str] {
    match name.to_ascii_lowercase().as_str() {
        "li" => &["li"],
        "option" => &["option"],
        "dt" | "dd" => &["dt", "dd"],
        "td" | "th" => &["td", "th"],
        "tr" => &["td", "th", "tr"],
        "thead" | "tbody" | "tfoot" => &["td", "th", "tr", "thead", "tbody", "tfoot", "colgroup"],
        other if CLOSES_PARAGRAPH.contains(&other) => &["p"],
        _ => &[],
    }
}

/// Checks that tags are balanced.
///
/// Void elements written without a close tag are flagged as having none, and
/// elements with an optional close tag get an [`TagOrigin::Implicit`] close
/// where the source leaves it out.
#[derive(Debug, Default)]
pub struct HtmlFilter {
    stack: Vec<Tag>,
    /// A void open tag waiting to see whether its close tag follows.
    held_void: Option<Tag>,
    ready: VecDeque<MarkupElement>,
    finished: bool,
}

impl HtmlFilter {
    fn accept(&mut self, element: MarkupElement) -> FilterResult<()> {
        if let Some(mut void) = self.held_void.take() {
            if let MarkupElement::Tag(tag) = &element {
                if tag.closes(&void) {
                    self.ready.push_back(MarkupElement::Tag(void));
                    self.ready.push_back(element);
                    return Ok(());
                }
            }
            void.set_no_close_tag(true);
            self.ready.push_back(MarkupElement::Tag(void));
        }

        match element {
            MarkupElement::Tag(tag) => self.accept_tag(tag),
            other @ (MarkupElement::Text(_) | MarkupElement::Comment(_)) => {
                self.ready.push_back(other);
                Ok(())
            }
        }
    }

    fn accept_tag(&mut self, tag: Tag) -> FilterResult<()> {
        match tag.kind() {
            TagKind::OpenClose => {
                self.ready.push_back(MarkupElement::Tag(tag));
            }
            TagKind::Open => {
                if is_one_of(&tag, VOID) {
                    self.held_void = Some(tag);
                    return Ok(());
                }
                if tag.namespace().is_none() {
                    self.close_implicitly(implicitly_closed_by(tag.name()));
                }
                self.stack.push(tag.clone());
                self.ready.push_back(MarkupElement::Tag(tag));
            }
            TagKind::Close => {
                let Some(index) = self.stack.iter().rposition(|open| tag.closes(open)) else {
                    return Err(ParseError::at(
                        tag.position(),
                        ParseErrorKind::UnmatchedCloseTag {
                            name: tag.qualified_name().into_owned(),
                        },
                    ));
                };
                while self.stack.len() > index + 1 {
                    let Some(inner) = self.stack.pop() else {
                        break;
                    };
                    if !is_one_of(&inner, OPTIONAL_CLOSE) {
                        return Err(missing_close(&inner));
                    }
                    self.ready
                        .push_back(MarkupElement::Tag(inner.closing(TagOrigin::Implicit)));
                }
                self.stack.pop();
                self.ready.push_back(MarkupElement::Tag(tag));
            }
        }
        Ok(())
    }

    fn close_implicitly(&mut self, names: &[&str]) {
        while let Some(top) = self.stack.last() {
            if !is_one_of(top, names) {
                break;
            }
            if let Some(open) = self.stack.pop() {
                self.ready
                    .push_back(MarkupElement::Tag(open.closing(TagOrigin::Implicit)));
            }
        }
    }

    fn finish(&mut self) -> FilterResult<()> {
        if let Some(mut void) = self.held_void.take() {
            void.set_no_close_tag(true);
            self.ready.push_back(MarkupElement::Tag(void));
        }
        while let Some(open) = self.stack.pop() {
            if !is_one_of(&open, OPTIONAL_CLOSE) {
                return Err(missing_close(&open));
            }
            self.ready
                .push_back(MarkupElement::Tag(open.closing(TagOrigin::Implicit)));
        }
        Ok(())
    }
}

fn missing_close(open: &Tag) -> ParseError {
    ParseError::at(
        open.position(),
        ParseErrorKind::MissingCloseTag {
            name: open.qualified_name().into_owned(),
        },
    )
}

impl MarkupFilter for HtmlFilter {
    fn name(&self) -> &'static str {
        super::HTML
    }

    fn next_element(
        &mut self,
        upstream: &mut dyn ElementSource,
        ctx: &mut ParseContext<'_>,
    ) -> FilterResult<Option<MarkupElement>> {
        loop {
            if let Some(element) = self.ready.pop_front() {
                return Ok(Some(element));
            }
            if self.finished {
                return Ok(None);
            }
            match upstream.next_element(ctx)? {
                Some(element) => self.accept(element)?,
                None => {
                    self.finished = true;
                    self.finish()?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        MarkletError, Markup, MarkupKey, MarkupParser, MarkupSettings, error::ParseErrorKind,
        tag::TagOrigin,
    };

    fn parse(text: &str) -> Result<Markup, MarkletError> {
        MarkupParser::new(MarkupSettings::default()).parse_str(MarkupKey::new("H.html"), text)
    }

    fn parse_error_kind(text: &str) -> ParseErrorKind {
        match parse(text) {
            Err(MarkletError::Parse { error, .. }) => error.kind,
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_void_elements_have_no_close_tag() {
        let markup = parse("<p>a<br>b<img src='/x.png'></p>").unwrap();
        assert!(markup.tag(2).unwrap().has_no_close_tag());
        assert!(markup.tag(4).unwrap().has_no_close_tag());
        assert_eq!(markup.close_index(0), Some(5));
        assert_eq!(markup.render_to_string(None), "<p>a<br>b<img src='/x.png'></p>");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_void_with_explicit_close() {
        let markup = parse("<br></br>").unwrap();
        assert!(!markup.tag(0).unwrap().has_no_close_tag());
        assert_eq!(markup.close_index(0), Some(1));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_optional_close_tags_are_implied() {
        let markup = parse("<ul><li>one<li>two</ul>").unwrap();
        assert_eq!(markup.render_to_string(None), "<ul><li>one<li>two</ul>");
        let implicit: Vec<usize> = (0..markup.len())
            .filter(|&i| markup.tag(i).is_some_and(|t| t.origin() == TagOrigin::Implicit))
            .collect();
        assert_eq!(implicit, vec![3, 6]);
        assert_eq!(markup.close_index(1), Some(3));
        assert_eq!(markup.close_index(4), Some(6));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_paragraph_closed_by_block_and_end_of_stream() {
        let markup = parse("<p>a<div>b</div><p>c").unwrap();
        assert_eq!(markup.render_to_string(None), "<p>a<div>b</div><p>c");
        assert_eq!(markup.close_index(0), Some(2));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unmatched_close_tag() {
        assert_eq!(
            parse_error_kind("<div>x</span></div>"),
            ParseErrorKind::UnmatchedCloseTag {
                name: "span".to_string()
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_missing_close_tag() {
        assert_eq!(
            parse_error_kind("<div><span>x</div>"),
            ParseErrorKind::MissingCloseTag {
                name: "span".to_string()
            }
        );
        assert_eq!(
            parse_error_kind("<div>never closed"),
            ParseErrorKind::MissingCloseTag {
                name: "div".to_string()
            }
        );
    }
}
