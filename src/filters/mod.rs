//! The standard filter stages.

mod autolink;
mod html;
mod identifier;
mod namespace;
mod relative_path;
mod remove;
mod tag_type;

pub(crate) use autolink::link_attribute;
pub use autolink::{AUTOLINK_ID, AutoLinkFilter};
pub use html::HtmlFilter;
pub use identifier::TagIdentifierFilter;
pub use namespace::NamespaceFilter;
pub(crate) use relative_path::join_path;
pub use relative_path::RelativePathFilter;
pub use remove::RemoveFilter;
pub use tag_type::TagTypeFilter;

pub const NAMESPACE: &str = "namespace";
pub const TAG_IDENTIFIER: &str = "tag-identifier";
pub const TAG_TYPE: &str = "tag-type";
pub const HTML: &str = "html";
pub const REMOVE: &str = "remove";
pub const AUTOLINK: &str = "autolink";
pub const RELATIVE_PATH: &str = "relative-path";

/// Whether a link value is relative to the current page.
///
/// Absolute paths, fragments, query-only links, `${...}` placeholders and
/// values with a scheme (`http:`, `mailto:`, ...) are not.
pub fn is_relative_url(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.starts_with(['/', '#', '?']) || value.starts_with("${") {
        return false;
    }
    match value.find(':') {
        Some(colon) => value.find('/').is_some_and(|slash| slash < colon),
        None => true,
    }
}
