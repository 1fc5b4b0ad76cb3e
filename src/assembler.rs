use crate::{
    error::{MarkletError, MarkletResult, ParseError, ParseErrorKind},
    markup::{Markup, MarkupBuilder, MarkupElement},
    settings::MarkupSettings,
    tag::{Tag, TagKind},
};

/// Collects filtered elements into a [`MarkupBuilder`], pairing every open
/// tag with its close tag.
#[derive(Debug)]
pub struct FragmentAssembler<'s> {
    settings: &'s MarkupSettings,
    builder: MarkupBuilder,
    /// Indices of open tags waiting for their close tag.
    stack: Vec<usize>,
    pre_depth: usize,
}

fn is_pre(tag: &Tag) -> bool {
    tag.namespace().is_none() && tag.name().eq_ignore_ascii_case("pre")
}

/// Collapses runs of spaces and tabs into one space, and runs containing a
/// line break into one `\n`.
pub fn compress_whitespace(text: &str) -> String {
    let is_space = |c: char| matches!(c, ' ' | '\t' | '\r' | '\n');
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if !is_space(c) {
            out.push(c);
            continue;
        }
        let mut line_break = matches!(c, '\r' | '\n');
        while let Some(&next) = chars.peek() {
            if !is_space(next) {
                break;
            }
            line_break |= matches!(next, '\r' | '\n');
            chars.next();
        }
        out.push(if line_break { '\n' } else { ' ' });
    }
    out
}

impl<'s> FragmentAssembler<'s> {
    pub const fn new(builder: MarkupBuilder, settings: &'s MarkupSettings) -> Self {
        Self {
            settings,
            builder,
            stack: Vec::new(),
            pre_depth: 0,
        }
    }

    fn structural(&self, tag: &Tag, kind: ParseErrorKind) -> MarkletError {
        MarkletError::parse(self.builder.key(), ParseError::at(tag.position(), kind))
    }

    pub fn set_doctype(&mut self, doctype: Option<String>) {
        self.builder.set_doctype(doctype);
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.builder.set_namespace(namespace);
    }

    pub fn accept(&mut self, element: MarkupElement) -> MarkletResult<()> {
        match element {
            MarkupElement::Text(text) if text.is_empty() => Ok(()),
            MarkupElement::Text(text) => {
                if self.settings.compress_whitespace && self.pre_depth == 0 {
                    self.builder.push_text(&compress_whitespace(&text))
                } else {
                    self.builder.push_text(&text)
                }
            }
            MarkupElement::Comment(_) if self.settings.strip_comments => Ok(()),
            comment @ MarkupElement::Comment(_) => self.builder.push(comment).map(|_| ()),
            MarkupElement::Tag(tag) => self.accept_tag(tag),
        }
    }

    fn accept_tag(&mut self, tag: Tag) -> MarkletResult<()> {
        match tag.kind() {
            TagKind::OpenClose => {
                self.builder.push(MarkupElement::Tag(tag))?;
            }
            TagKind::Open => {
                let opens_body = tag.opens_body();
                let pre = is_pre(&tag);
                let index = self.builder.push(MarkupElement::Tag(tag))?;
                if opens_body {
                    self.stack.push(index);
                    if pre {
                        self.pre_depth += 1;
                    }
                }
            }
            TagKind::Close => {
                let Some(&open_index) = self.stack.last() else {
                    return Err(self.structural(
                        &tag,
                        ParseErrorKind::UnmatchedCloseTag {
                            name: tag.qualified_name().into_owned(),
                        },
                    ));
                };
                let (matches, expected, pre) = match self.builder.tag(open_index) {
                    Some(open) => (
                        tag.closes(open),
                        open.qualified_name().into_owned(),
                        is_pre(open),
                    ),
                    None => (false, String::new(), false),
                };
                if !matches {
                    return Err(self.structural(
                        &tag,
                        ParseErrorKind::MismatchedCloseTag {
                            expected,
                            found: tag.qualified_name().into_owned(),
                        },
                    ));
                }

                self.stack.pop();
                if pre {
                    self.pre_depth = self.pre_depth.saturating_sub(1);
                }
                let close_index = self.builder.push(MarkupElement::Tag(tag))?;
                self.builder.pair(open_index, close_index)?;
            }
        }
        Ok(())
    }

    /// Seals the markup.
    ///
    /// # Errors
    /// - [`MarkletError::Parse`] if an open tag was never closed.
    pub fn finish(mut self) -> MarkletResult<Markup> {
        if let Some(unclosed) = self.stack.last().and_then(|&index| self.builder.tag(index)) {
            return Err(self.structural(
                unclosed,
                ParseErrorKind::MissingCloseTag {
                    name: unclosed.qualified_name().into_owned(),
                },
            ));
        }
        Ok(self.builder.seal())
    }
}
