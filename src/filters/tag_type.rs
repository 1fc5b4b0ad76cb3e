use crate::{
    filter::{ElementSource, FilterResult, MarkupFilter, ParseContext},
    markup::MarkupElement,
    tag::{TagKind, TagOrigin},
};

/// Elements browsers do not accept in `<x/>` form.
const REQUIRES_BODY: &[&str] = &[
    "script", "span", "div", "a", "textarea", "select", "iframe", "label", "b", "i", "u", "em",
    "strong", "p", "li", "ul", "ol", "td", "th", "tr", "table", "button", "option", "title", "h1",
    "h2", "h3", "h4", "h5", "h6",
];

/// Expands `<span/>` into `<span></span>` for elements that need a body.
#[derive(Debug, Default)]
pub struct TagTypeFilter {
    pending_close: Option<MarkupElement>,
}

impl MarkupFilter for TagTypeFilter {
    fn name(&self) -> &'static str {
        super::TAG_TYPE
    }

    fn next_element(
        &mut self,
        upstream: &mut dyn ElementSource,
        ctx: &mut ParseContext<'_>,
    ) -> FilterResult<Option<MarkupElement>> {
        if let Some(close) = self.pending_close.take() {
            return Ok(Some(close));
        }

        let Some(mut element) = upstream.next_element(ctx)? else {
            return Ok(None);
        };

        if let MarkupElement::Tag(tag) = &mut element {
            let expand = tag.is_open_close()
                && tag.namespace().is_none()
                && REQUIRES_BODY
                    .iter()
                    .any(|name| tag.name().eq_ignore_ascii_case(name));
            if expand {
                tag.set_kind(TagKind::Open);
                self.pending_close = Some(MarkupElement::Tag(tag.closing(TagOrigin::Injected)));
            }
        }

        Ok(Some(element))
    }
}

#[cfg(test)]
mod tests {
    use crate::{MarkupKey, MarkupParser, MarkupSettings, tag::TagOrigin};

    #[test]
    #[ntest::timeout(100)]
    fn test_open_close_span_is_expanded() {
        let markup = MarkupParser::new(MarkupSettings::default())
            .parse_str(MarkupKey::new("T.html"), r#"<div><span wicket:id="l"/><br/></div>"#)
            .unwrap();

        assert_eq!(
            markup.render_to_string(None),
            r#"<div><span wicket:id="l"></span><br/></div>"#
        );
        let close = markup.tag(2).unwrap();
        assert!(close.is_close());
        assert_eq!(close.origin(), TagOrigin::Injected);
        assert_eq!(close.id(), Some("l"));
        assert_eq!(markup.close_index(1), Some(2));
    }
}
