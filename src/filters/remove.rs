use tracing::debug;

use crate::{
    error::{ParseError, ParseErrorKind},
    filter::{ElementSource, FilterResult, MarkupFilter, ParseContext},
    markup::MarkupElement,
};

/// Drops `<ns:remove>` regions, which hold preview-only content.
#[derive(Debug, Default)]
pub struct RemoveFilter;

impl MarkupFilter for RemoveFilter {
    fn name(&self) -> &'static str {
        super::REMOVE
    }

    fn next_element(
        &mut self,
        upstream: &mut dyn ElementSource,
        ctx: &mut ParseContext<'_>,
    ) -> FilterResult<Option<MarkupElement>> {
        loop {
            let Some(element) = upstream.next_element(ctx)? else {
                return Ok(None);
            };
            let Some(open) = element
                .as_tag()
                .filter(|tag| tag.is_namespace_tag_named("remove") && !tag.is_close())
            else {
                return Ok(Some(element));
            };

            if open.is_open_close() {
                return Err(ParseError::at(
                    open.position(),
                    ParseErrorKind::Message(format!(
                        "<{}:remove> must have a body and a close tag",
                        ctx.namespace
                    )),
                ));
            }

            let position = open.position();
            let mut dropped = 0_usize;
            loop {
                let Some(inner) = upstream.next_element(ctx)? else {
                    return Err(ParseError::at(
                        position,
                        ParseErrorKind::MissingCloseTag {
                            name: format!("{}:remove", ctx.namespace),
                        },
                    ));
                };
                if let Some(tag) = inner.as_tag() {
                    if tag.is_namespace_tag_named("remove") {
                        if tag.is_close() {
                            break;
                        }
                        return Err(ParseError::at(
                            tag.position(),
                            ParseErrorKind::Message(format!(
                                "<{}:remove> tags must not be nested",
                                ctx.namespace
                            )),
                        ));
                    }
                }
                dropped += 1;
            }
            debug!(line = position.line, dropped, "removed preview region");
        }
    }
}
