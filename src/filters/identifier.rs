use crate::{
    error::{ParseError, ParseErrorKind},
    filter::{ElementSource, FilterResult, MarkupFilter, ParseContext},
    markup::MarkupElement,
    tag::Tag,
};

/// Namespace tag names the filter chain and the renderer understand.
pub(crate) const KNOWN_TAGS: &[&str] = &[
    "panel",
    "border",
    "body",
    "child",
    "extend",
    "fragment",
    "head",
    "link",
    "remove",
    "message",
    "enclosure",
    "container",
    "header-items",
    "label",
];

/// Assigns component ids from `ns:id` attributes, marks namespace tags and
/// gives namespace tags without an explicit id an auto id `_ns_name`.
/// Close tags receive the id of their open tag.
#[derive(Debug, Default)]
pub struct TagIdentifierFilter {
    /// Lower-cased qualified name and id of every open tag not yet closed.
    open: Vec<(String, Option<String>)>,
}

impl TagIdentifierFilter {
    fn identify(&mut self, tag: &mut Tag, ctx: &ParseContext<'_>) -> FilterResult<()> {
        let namespace = ctx.namespace.as_str();
        let is_namespace_tag = ctx.is_namespace(tag.namespace());
        tag.set_namespace_tag(is_namespace_tag);

        if tag.is_close() {
            let name = tag.qualified_name().to_ascii_lowercase();
            if let Some(index) = self.open.iter().rposition(|(open, _)| *open == name) {
                if let Some((_, Some(id))) = self.open.get(index) {
                    tag.set_id(id.clone());
                }
                self.open.truncate(index);
            }
            return Ok(());
        }

        let id_attribute = format!("{namespace}:id");
        if let Some(id) = tag.attribute(&id_attribute) {
            let id = id.trim().to_string();
            if id.is_empty() {
                return Err(ParseError::at(
                    tag.position(),
                    ParseErrorKind::EmptyComponentId {
                        namespace: namespace.to_string(),
                    },
                ));
            }
            tag.set_id(id);
        }

        if is_namespace_tag {
            let name = tag.name().to_ascii_lowercase();
            if !KNOWN_TAGS.contains(&name.as_str()) {
                return Err(ParseError::at(
                    tag.position(),
                    ParseErrorKind::UnknownNamespaceTag {
                        namespace: namespace.to_string(),
                        name: tag.name().to_string(),
                    },
                ));
            }
            if tag.id().is_none() {
                tag.set_id(format!("_{namespace}_{name}"));
            }
        }

        if tag.is_open() {
            self.open.push((
                tag.qualified_name().to_ascii_lowercase(),
                tag.id().map(str::to_string),
            ));
        }
        Ok(())
    }
}

impl MarkupFilter for TagIdentifierFilter {
    fn name(&self) -> &'static str {
        super::TAG_IDENTIFIER
    }

    fn next_element(
        &mut self,
        upstream: &mut dyn ElementSource,
        ctx: &mut ParseContext<'_>,
    ) -> FilterResult<Option<MarkupElement>> {
        let Some(mut element) = upstream.next_element(ctx)? else {
            return Ok(None);
        };
        if let MarkupElement::Tag(tag) = &mut element {
            self.identify(tag, ctx)?;
        }
        Ok(Some(element))
    }
}
