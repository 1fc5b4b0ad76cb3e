//! Handlers for id-bearing tags that no component claims.
//!
//! Resolvers are asked in registration order and the first one to return a
//! [`Resolution`] wins. [`ResolverRegistry::standard`] registers the autolink,
//! enclosure and transparent resolvers in that order; anything registered
//! later only sees tags all of them decline.

use std::{collections::HashMap, sync::Arc};

use tracing::{debug, warn};

use crate::{
    error::{MarkletError, MarkletResult},
    filters::{join_path, link_attribute},
    markup::MarkupKey,
    settings::MarkupSettings,
    tag::Tag,
};

/// What a resolver can see while deciding.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub settings: &'a MarkupSettings,
    /// Template the tag was read from.
    pub markup_key: &'a MarkupKey,
    pub locale: Option<&'a str>,
    /// Path of the container whose markup is being walked.
    pub container_path: &'a str,
}

/// How the renderer should output a resolved tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Render the tag as written and walk its body in the current scope.
    Transparent,
    /// Like [`Resolution::Transparent`], writing `tag` in place of the open tag.
    Retag(Tag),
    /// Render `text` as the tag body. The original body follows the text
    /// when `keep_body` is set.
    Body { text: String, keep_body: bool },
    /// Render like [`Resolution::Transparent`] while the component at `child`
    /// (a path relative to the current container) is visible, and drop the
    /// whole element otherwise. Without `child` the first component tag in
    /// the body decides.
    Enclosure { child: Option<String> },
}

pub trait ComponentResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Claims `tag` by returning a resolution, or declines with `None`.
    fn resolve(&self, tag: &Tag, ctx: &ResolveContext<'_>) -> MarkletResult<Option<Resolution>>;
}

/// Claims links the autolink filter marked.
#[derive(Debug, Default)]
pub struct AutoLinkResolver;

impl ComponentResolver for AutoLinkResolver {
    fn name(&self) -> &'static str {
        "autolink"
    }

    fn resolve(&self, tag: &Tag, ctx: &ResolveContext<'_>) -> MarkletResult<Option<Resolution>> {
        if !tag.is_autolink() {
            return Ok(None);
        }
        let Some(prefix) = ctx.settings.context_path.as_deref() else {
            return Ok(Some(Resolution::Transparent));
        };

        let Some((attribute, value)) = link_attribute(tag)
            .and_then(|attribute| tag.attribute(attribute).map(|value| (attribute, value)))
        else {
            return Ok(Some(Resolution::Transparent));
        };
        let mut resolved = tag.clone();
        resolved.set_attribute(attribute, join_path(prefix, value));
        Ok(Some(Resolution::Retag(resolved)))
    }
}

/// Namespace tags with an auto id whose body simply belongs to the
/// surrounding container.
const TRANSPARENT_TAGS: &[&str] = &[
    "link",
    "head",
    "container",
    "extend",
    "child",
    "header-items",
    "label",
];

#[derive(Debug, Default)]
pub struct TransparentResolver;

impl ComponentResolver for TransparentResolver {
    fn name(&self) -> &'static str {
        "transparent"
    }

    fn resolve(&self, tag: &Tag, _ctx: &ResolveContext<'_>) -> MarkletResult<Option<Resolution>> {
        let claims = tag.is_namespace_tag()
            && tag.has_auto_id()
            && TRANSPARENT_TAGS
                .iter()
                .any(|name| tag.name().eq_ignore_ascii_case(name));
        Ok(claims.then_some(Resolution::Transparent))
    }
}

/// Claims `<ns:enclosure>`, optionally naming its controlling child with a
/// `child` attribute.
#[derive(Debug, Default)]
pub struct EnclosureResolver;

impl ComponentResolver for EnclosureResolver {
    fn name(&self) -> &'static str {
        "enclosure"
    }

    fn resolve(&self, tag: &Tag, _ctx: &ResolveContext<'_>) -> MarkletResult<Option<Resolution>> {
        if !tag.is_namespace_tag_named("enclosure") {
            return Ok(None);
        }
        let child = tag
            .attribute("child")
            .filter(|child| !child.is_empty())
            .map(str::to_string);
        Ok(Some(Resolution::Enclosure { child }))
    }
}

/// Localized strings looked up by `<ns:message key="...">`.
pub trait MessageSource: Send + Sync {
    fn message(&self, key: &str, locale: Option<&str>) -> Option<String>;
}

/// An in-memory [`MessageSource`] with locale fallback: `fr_CA` falls
/// back to `fr`, then to the messages registered without a locale.
#[derive(Debug, Clone, Default)]
pub struct MessageBundle {
    messages: HashMap<Option<String>, HashMap<String, String>>,
}

impl MessageBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        locale: Option<&str>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.messages
            .entry(locale.map(str::to_string))
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    fn lookup(&self, locale: Option<&str>, key: &str) -> Option<String> {
        self.messages
            .get(&locale.map(str::to_string))
            .and_then(|messages| messages.get(key))
            .cloned()
    }
}

impl MessageSource for MessageBundle {
    fn message(&self, key: &str, locale: Option<&str>) -> Option<String> {
        let mut candidate = locale;
        while let Some(current) = candidate {
            if let Some(value) = self.lookup(Some(current), key) {
                return Some(value);
            }
            candidate = current.rsplit_once('_').map(|(shorter, _)| shorter);
        }
        self.lookup(None, key)
    }
}

/// Claims `<ns:message key="...">` and renders the localized text as its body.
pub struct MessageResolver {
    source: Arc<dyn MessageSource>,
}

impl std::fmt::Debug for MessageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageResolver").finish_non_exhaustive()
    }
}

impl MessageResolver {
    pub fn new(source: Arc<dyn MessageSource>) -> Self {
        Self { source }
    }
}

impl ComponentResolver for MessageResolver {
    fn name(&self) -> &'static str {
        "message"
    }

    fn resolve(&self, tag: &Tag, ctx: &ResolveContext<'_>) -> MarkletResult<Option<Resolution>> {
        if !tag.is_namespace_tag_named("message") {
            return Ok(None);
        }
        let Some(key) = tag.attribute("key").filter(|key| !key.is_empty()) else {
            return Err(MarkletError::Markup {
                key: ctx.markup_key.to_string(),
                position: Some(tag.position()),
                message: format!("<{}> requires a 'key' attribute", tag.qualified_name()),
            });
        };

        if let Some(text) = self.source.message(key, ctx.locale) {
            debug!(key, locale = ?ctx.locale, "message resolved");
            return Ok(Some(Resolution::Body {
                text,
                keep_body: false,
            }));
        }

        if ctx.settings.throw_on_missing_message {
            return Err(MarkletError::MissingMessage {
                key: ctx.markup_key.to_string(),
                message_key: key.to_string(),
            });
        }
        warn!(key, markup = %ctx.markup_key, "message not found");
        Ok(Some(Resolution::Body {
            text: format!("[Warning: Property for '{key}' not found]"),
            keep_body: true,
        }))
    }
}

/// Ordered resolvers. The first resolver (in registration order) that
/// claims a tag decides how it renders.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: Vec<Arc<dyn ComponentResolver>>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ResolverRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Autolink, enclosure, then transparent.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register(Arc::new(AutoLinkResolver))
            .register(Arc::new(EnclosureResolver))
            .register(Arc::new(TransparentResolver));
        registry
    }

    /// The standard resolvers followed by a message resolver for `source`.
    pub fn with_messages(source: Arc<dyn MessageSource>) -> Self {
        let mut registry = Self::standard();
        registry.register(Arc::new(MessageResolver::new(source)));
        registry
    }

    pub fn register(&mut self, resolver: Arc<dyn ComponentResolver>) -> &mut Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|resolver| resolver.name()).collect()
    }

    /// Asks each resolver in turn; returns the first claim with the name of
    /// the resolver that made it.
    pub fn resolve(
        &self,
        tag: &Tag,
        ctx: &ResolveContext<'_>,
    ) -> MarkletResult<Option<(&'static str, Resolution)>> {
        for resolver in &self.resolvers {
            if let Some(resolution) = resolver.resolve(tag, ctx)? {
                return Ok(Some((resolver.name(), resolution)));
            }
        }
        Ok(None)
    }
}
