use tracing::debug;

use super::is_relative_url;
use crate::{
    filter::{ElementSource, FilterResult, MarkupFilter, ParseContext},
    markup::MarkupElement,
    tag::Tag,
};

/// Id given to tags claimed by the autolink resolver.
pub const AUTOLINK_ID: &str = "_autolink_";

/// The attribute holding the link target of an element, if it is one the
/// autolink resolver handles.
pub(crate) fn link_attribute(tag: &Tag) -> Option<&'static str> {
    match tag.name().to_ascii_lowercase().as_str() {
        "a" | "link" => Some("href"),
        "img" | "script" => Some("src"),
        _ => None,
    }
}

/// Marks relative links inside `<ns:link>` (or everywhere, when configured)
/// so the renderer can resolve them.
#[derive(Debug, Default)]
pub struct AutoLinkFilter {
    all: bool,
    link_depth: usize,
}

impl AutoLinkFilter {
    pub const fn new(all: bool) -> Self {
        Self { all, link_depth: 0 }
    }
}

impl MarkupFilter for AutoLinkFilter {
    fn name(&self) -> &'static str {
        super::AUTOLINK
    }

    fn next_element(
        &mut self,
        upstream: &mut dyn ElementSource,
        ctx: &mut ParseContext<'_>,
    ) -> FilterResult<Option<MarkupElement>> {
        let Some(mut element) = upstream.next_element(ctx)? else {
            return Ok(None);
        };
        let MarkupElement::Tag(tag) = &mut element else {
            return Ok(Some(element));
        };

        if tag.is_namespace_tag_named("link") {
            if tag.is_open() {
                self.link_depth += 1;
            } else if tag.is_close() {
                self.link_depth = self.link_depth.saturating_sub(1);
            }
        } else if (self.all || self.link_depth > 0)
            && !tag.is_close()
            && tag.namespace().is_none()
            && tag.id().is_none()
        {
            let relative = link_attribute(tag)
                .and_then(|attribute| tag.attribute(attribute))
                .is_some_and(is_relative_url);
            if relative {
                debug!(tag = %tag.name(), line = tag.position().line, "autolink");
                tag.set_id(AUTOLINK_ID);
                tag.set_autolink(true);
            }
        }

        Ok(Some(element))
    }
}

#[cfg(test)]
mod tests {
    use crate::{MarkupKey, MarkupParser, MarkupSettings};

    #[test]
    #[ntest::timeout(100)]
    fn test_links_inside_link_region_are_marked() {
        let markup = MarkupParser::new(MarkupSettings::default())
            .parse_str(
                MarkupKey::new("A.html"),
                r#"<a href="a.html">no</a><wicket:link><a href="b.html">yes</a><a href="http://x.org/">no</a></wicket:link>"#,
            )
            .unwrap();

        let autolinks: Vec<usize> = (0..markup.len())
            .filter(|&i| markup.tag(i).is_some_and(|t| t.is_autolink()))
            .collect();
        assert_eq!(autolinks, vec![4]);
        assert_eq!(markup.tag(4).unwrap().id(), Some("_autolink_"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_auto_link_all() {
        let settings = MarkupSettings {
            auto_link_all: true,
            ..MarkupSettings::default()
        };
        let markup = MarkupParser::new(settings)
            .parse_str(MarkupKey::new("A.html"), r#"<img src="logo.png"><a wicket:id="own" href="x.html">x</a>"#)
            .unwrap();
        assert!(markup.tag(0).unwrap().is_autolink());
        assert!(!markup.tag(1).unwrap().is_autolink());
    }
}
