use tracing::debug;

use crate::{
    filter::{ElementSource, FilterResult, MarkupFilter, ParseContext},
    markup::MarkupElement,
};

pub(crate) const NAMESPACE_URI: &str = "http://wicket.apache.org";

/// Switches the templating namespace when a tag declares
/// `xmlns:prefix="http://wicket.apache.org..."`. The declaration itself is
/// removed from the tag.
#[derive(Debug, Default)]
pub struct NamespaceFilter;

impl MarkupFilter for NamespaceFilter {
    fn name(&self) -> &'static str {
        super::NAMESPACE
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
            let declaration = tag.attributes().iter().find_map(|(key, value)| {
                key.strip_prefix("xmlns:")
                    .filter(|_| value.starts_with(NAMESPACE_URI))
                    .map(|prefix| (key.clone(), prefix.to_string()))
            });

            if let Some((key, prefix)) = declaration {
                debug!(namespace = %prefix, tag = %tag.name(), "templating namespace declared");
                tag.remove_attribute(&key);
                ctx.namespace = prefix;
            }
        }

        Ok(Some(element))
    }
}
