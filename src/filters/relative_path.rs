use crate::{
    filter::{ElementSource, FilterResult, MarkupFilter, ParseContext},
    markup::MarkupElement,
};

use super::is_relative_url;

const LINK_ATTRIBUTES: &[&str] = &["href", "src", "background", "action"];

/// Prefixes relative link attributes with the application context path.
#[derive(Debug, Default)]
pub struct RelativePathFilter {
    prefix: Option<String>,
}

impl RelativePathFilter {
    pub const fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }
}

pub(crate) fn join_path(prefix: &str, value: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        value.trim().trim_start_matches("./")
    )
}

impl MarkupFilter for RelativePathFilter {
    fn name(&self) -> &'static str {
        super::RELATIVE_PATH
    }

    fn next_element(
        &mut self,
        upstream: &mut dyn ElementSource,
        ctx: &mut ParseContext<'_>,
    ) -> FilterResult<Option<MarkupElement>> {
        let Some(mut element) = upstream.next_element(ctx)? else {
            return Ok(None);
        };
        let Some(prefix) = self.prefix.as_deref() else {
            return Ok(Some(element));
        };

        if let MarkupElement::Tag(tag) = &mut element {
            if !tag.is_close() && !tag.is_namespace_tag() && !tag.is_autolink() {
                for attribute in LINK_ATTRIBUTES {
                    let rewritten = tag
                        .attribute(attribute)
                        .filter(|value| is_relative_url(value))
                        .map(|value| join_path(prefix, value));
                    if let Some(value) = rewritten {
                        tag.set_attribute(*attribute, value);
                    }
                }
            }
        }
        Ok(Some(element))
    }
}
