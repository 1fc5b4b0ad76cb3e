//! The markup-driven render walk.
//!
//! Markup is walked front to back. Every id-bearing tag is matched against
//! the children of the container whose scope it appears in, handed to the
//! resolvers when no child has that id, and reported as unmatched
//! otherwise. Once a scope has been walked, its children that never met their
//! tag are reported as well.

use std::cell::Cell;

use tracing::{debug, trace};

use crate::{
    component::{Component, ComponentKind, Page},
    error::{MarkletError, MarkletResult},
    markup::{Markup, MarkupElement},
    matcher::{MatchReport, MatchState, similar_names},
    resolver::{Resolution, ResolveContext, ResolverRegistry},
    settings::MarkupSettings,
    tag::{Tag, TagKind, TagOrigin, escape_markup},
};

fn join_id(prefix: &str, id: &str) -> String {
    if prefix.is_empty() {
        id.to_string()
    } else {
        format!("{prefix}:{id}")
    }
}

fn container_name(component: &Component, path: &str) -> String {
    format!("[{} {path}]", component.kind().name())
}

/// Renders pages and checks them against their markup.
#[derive(Debug, Clone)]
pub struct Renderer {
    settings: MarkupSettings,
    resolvers: ResolverRegistry,
    locale: Option<String>,
}

impl Renderer {
    /// A renderer with the standard resolvers.
    pub fn new(settings: MarkupSettings) -> Self {
        Self::with_resolvers(settings, ResolverRegistry::standard())
    }

    pub const fn with_resolvers(settings: MarkupSettings, resolvers: ResolverRegistry) -> Self {
        Self {
            settings,
            resolvers,
            locale: None,
        }
    }

    /// Locale handed to resolvers, e.g. for message lookup.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub const fn settings(&self) -> &MarkupSettings {
        &self.settings
    }

    pub const fn resolvers(&self) -> &ResolverRegistry {
        &self.resolvers
    }

    /// Renders `page`, stopping at the first component/markup mismatch.
    ///
    /// # Errors
    /// - [`MarkletError::UnmatchedTag`] for an id tag nothing claims.
    /// - [`MarkletError::MissingTag`] for a component without a tag.
    /// - [`MarkletError::Containment`] for a component outside its required
    ///   ancestor.
    /// - [`MarkletError::Markup`] when a panel, border or fragment section
    ///   cannot be found, and any error raised by a resolver.
    pub fn render(&self, page: &Page) -> MarkletResult<String> {
        let mut walk = Walk::new(self, false);
        walk.page(page)?;
        debug!(markup = %page.markup().key(), bytes = walk.out.len(), "page rendered");
        Ok(walk.out)
    }

    /// Walks `page` without stopping at failures and reports the state of
    /// every component and claimed tag.
    pub fn check(&self, page: &Page) -> MatchReport {
        let mut walk = Walk::new(self, true);
        if let Err(error) = walk.page(page) {
            walk.report.set("", MatchState::Failed(error));
        }
        walk.report
    }
}

/// The caller's tag body a border renders at `<ns:body>`.
struct BodySlot<'a> {
    markup: &'a Markup,
    start: usize,
    end: usize,
    children: &'a [Component],
}

/// A container's children being matched against a range of markup.
struct Scope<'a> {
    path: String,
    container: String,
    children: &'a [Component],
    matched: Vec<Cell<bool>>,
    /// Role of the component owning the scope.
    role: Option<&'a str>,
    markup: &'a Markup,
    parent: Option<&'a Scope<'a>>,
    body: Option<BodySlot<'a>>,
}

impl<'a> Scope<'a> {
    fn new(
        path: String,
        container: String,
        children: &'a [Component],
        role: Option<&'a str>,
        markup: &'a Markup,
        parent: Option<&'a Scope<'a>>,
    ) -> Self {
        Self {
            path,
            container,
            children,
            matched: children.iter().map(|_| Cell::new(false)).collect(),
            role,
            markup,
            parent,
            body: None,
        }
    }

    fn child_path(&self, id: &str) -> String {
        join_id(&self.path, id)
    }

    fn find_child(&self, id: &str) -> Option<(usize, &'a Component)> {
        self.children
            .iter()
            .enumerate()
            .find(|(_, child)| child.id() == id)
    }

    fn ancestors(&self) -> impl Iterator<Item = &Scope<'a>> {
        std::iter::successors(Some(self), |scope| scope.parent)
    }

    fn ancestor_with_role(&self, role: &str) -> Option<&Scope<'a>> {
        self.ancestors().find(|scope| scope.role == Some(role))
    }

    /// The nearest border scope whose own markup is `markup`; its body slot
    /// fills any `<ns:body>` met while walking that markup.
    fn border_owner(&self, markup: &Markup) -> Option<&Scope<'a>> {
        self.ancestors()
            .find(|scope| scope.body.is_some() && Markup::ptr_eq(scope.markup, markup))
    }
}

/// Looks below `children` for a component with `id` that requires an
/// ancestor role, returning its path, the role, and the path of the nearest
/// component in between that has the role.
fn find_requiring<'c>(
    children: &'c [Component],
    prefix: &str,
    id: &str,
    roles: &mut Vec<(&'c str, String)>,
) -> Option<(String, &'c str, Option<String>)> {
    for child in children {
        let path = join_id(prefix, child.id());
        if child.id() == id {
            if let Some(required) = child.required_ancestor() {
                let ancestor = roles
                    .iter()
                    .rev()
                    .find(|(role, _)| *role == required)
                    .map(|(_, path)| path.clone());
                return Some((path, required, ancestor));
            }
        }

        let pushed = child.role().map(|role| roles.push((role, path.clone()))).is_some();
        let body: &[Component] = match child.kind() {
            ComponentKind::Border { body, .. } => body,
            ComponentKind::Leaf { .. }
            | ComponentKind::Container { .. }
            | ComponentKind::Panel { .. }
            | ComponentKind::Fragment { .. }
            | ComponentKind::Repeater { .. } => &[],
        };
        let found = find_requiring(child.children(), &path, id, roles)
            .or_else(|| find_requiring(body, &path, id, roles));
        if pushed {
            roles.pop();
        }
        if found.is_some() {
            return found;
        }
    }
    None
}

fn missing_section(markup: &Markup, name: &str, path: &str) -> MarkletError {
    MarkletError::Markup {
        key: markup.key().to_string(),
        position: None,
        message: format!(
            "Expected to find <{}:{name}> in the markup of component '{path}'",
            markup.namespace()
        ),
    }
}

fn find_section(markup: &Markup, name: &str) -> Option<usize> {
    markup
        .root_fragment()
        .namespace_fragment(name)
        .map(|fragment| fragment.start())
}

struct Walk<'r> {
    renderer: &'r Renderer,
    out: String,
    report: MatchReport,
    /// Record failures and keep walking instead of returning them.
    collect: bool,
}

impl<'r> Walk<'r> {
    fn new(renderer: &'r Renderer, collect: bool) -> Self {
        Self {
            renderer,
            out: String::new(),
            report: MatchReport::default(),
            collect,
        }
    }

    fn fail(&mut self, path: &str, error: MarkletError) -> MarkletResult<()> {
        trace!(path, %error, "match failed");
        self.report.set(path, MatchState::Failed(error.clone()));
        if self.collect { Ok(()) } else { Err(error) }
    }

    fn page(&mut self, page: &Page) -> MarkletResult<()> {
        let markup = page.markup();
        let scope = Scope::new(
            String::new(),
            format!("[Page {}]", markup.key()),
            page.children(),
            None,
            markup,
            None,
        );
        self.render_range(markup, 0, markup.len(), &scope)?;
        self.finish_scope(&scope)
    }

    fn write_tag(&mut self, markup: &Markup, tag: &Tag) {
        let strip = self.renderer.settings.strip_wicket_tags;
        if strip && tag.is_namespace_tag() {
            return;
        }
        tag.write_to(&mut self.out, strip.then(|| markup.namespace()));
    }

    /// Writes `tag` as an open tag, even if it was written as `<x/>`.
    fn write_open(&mut self, markup: &Markup, tag: &Tag) {
        if !tag.is_open_close() {
            self.write_tag(markup, tag);
            return;
        }
        let strip = self.renderer.settings.strip_wicket_tags;
        if strip && tag.is_namespace_tag() {
            return;
        }
        tag.write_as(&mut self.out, TagKind::Open, strip.then(|| markup.namespace()));
    }

    /// Writes the close tag belonging to the open tag at `open_index`.
    fn write_close(&mut self, markup: &Markup, open_index: usize) {
        let Some(open) = markup.tag(open_index) else {
            return;
        };
        if let Some(close) = markup.close_index(open_index).and_then(|close| markup.tag(close)) {
            self.write_tag(markup, close);
        } else if open.is_open_close() {
            self.write_tag(markup, &open.closing(TagOrigin::Injected));
        }
    }

    fn render_range(
        &mut self,
        markup: &Markup,
        start: usize,
        end: usize,
        scope: &Scope<'_>,
    ) -> MarkletResult<()> {
        let mut index = start;
        while index < end {
            let Some(element) = markup.get(index) else {
                break;
            };
            let MarkupElement::Tag(tag) = element else {
                element.write_to(&mut self.out, None);
                index += 1;
                continue;
            };
            let element_end = markup.element_end(index).min(end);

            if tag.is_close() {
                self.write_tag(markup, tag);
                index += 1;
            } else if tag.is_namespace_tag_named("fragment") {
                index = element_end;
            } else if let Some(owner) = tag
                .is_namespace_tag_named("body")
                .then(|| scope.border_owner(markup))
                .flatten()
            {
                self.render_border_body(markup, index, owner, scope)?;
                index = element_end;
            } else if let Some(id) = tag.id() {
                index = self.render_id_tag(markup, index, element_end, id, tag, scope)?;
            } else {
                self.write_tag(markup, tag);
                index += 1;
            }
        }
        Ok(())
    }

    /// Renders an id-bearing tag and returns the index to continue at.
    fn render_id_tag(
        &mut self,
        markup: &Markup,
        index: usize,
        element_end: usize,
        id: &str,
        tag: &Tag,
        scope: &Scope<'_>,
    ) -> MarkletResult<usize> {
        let path = scope.child_path(id);

        if let Some((child_index, component)) = scope.find_child(id) {
            if let Some(matched) = scope.matched.get(child_index) {
                matched.set(true);
            }
            self.report.set(&path, MatchState::Matched);
            self.render_component(component, &path, markup, index, scope)?;
            return Ok(element_end);
        }

        let renderer = self.renderer;
        let ctx = ResolveContext {
            settings: &renderer.settings,
            markup_key: markup.key(),
            locale: renderer.locale.as_deref(),
            container_path: &scope.path,
        };
        let resolved = match renderer.resolvers.resolve(tag, &ctx) {
            Ok(resolved) => resolved,
            Err(error) => {
                self.fail(&path, error)?;
                return Ok(element_end);
            }
        };
        let Some((resolver, resolution)) = resolved else {
            let error = unmatched(markup, tag, id, scope);
            self.fail(&path, error)?;
            return Ok(element_end);
        };

        trace!(path = %path, resolver, "auto resolved");
        self.report.set(&path, MatchState::AutoResolved { resolver });
        match resolution {
            Resolution::Transparent => {
                self.write_tag(markup, tag);
                Ok(index + 1)
            }
            Resolution::Retag(replacement) => {
                self.write_tag(markup, &replacement);
                Ok(index + 1)
            }
            Resolution::Body { text, keep_body } => {
                self.write_open(markup, tag);
                self.out.push_str(&text);
                if keep_body {
                    if let Some(close) = markup.close_index(index) {
                        self.render_range(markup, index + 1, close, scope)?;
                    }
                }
                self.write_close(markup, index);
                Ok(element_end)
            }
            Resolution::Enclosure { child } => {
                self.render_enclosure(markup, index, element_end, &path, child.as_deref(), scope)
            }
        }
    }

    /// Renders an enclosure like a transparent tag while its controlling
    /// child is visible. Otherwise the element is skipped, and the
    /// children with tags inside it count as matched.
    fn render_enclosure(
        &mut self,
        markup: &Markup,
        index: usize,
        element_end: usize,
        path: &str,
        child: Option<&str>,
        scope: &Scope<'_>,
    ) -> MarkletResult<usize> {
        let Some(tag) = markup.tag(index) else {
            return Ok(element_end);
        };
        let body = index + 1..markup.close_index(index).unwrap_or(index + 1);
        let child = child.or_else(|| {
            body.clone()
                .filter_map(|inner| markup.tag(inner))
                .find(|inner| !inner.is_close() && !inner.has_auto_id() && inner.id().is_some())
                .and_then(Tag::id)
        });
        let controller = child.and_then(|child| {
            let mut segments = child.split(':');
            let (_, first) = scope.find_child(segments.next()?)?;
            segments.try_fold(first, |component, id| component.child(id))
        });

        let Some(controller) = controller else {
            let message = child.map_or_else(
                || format!("<{}> has no child component", tag.qualified_name()),
                |child| format!("Could not find child '{child}' of <{}>", tag.qualified_name()),
            );
            let error = MarkletError::Markup {
                key: markup.key().to_string(),
                position: Some(tag.position()),
                message,
            };
            self.fail(path, error)?;
            self.write_tag(markup, tag);
            return Ok(index + 1);
        };

        if controller.is_visible() {
            self.write_tag(markup, tag);
            return Ok(index + 1);
        }
        for inner in body.filter_map(|inner| markup.tag(inner)) {
            let found = inner.id().and_then(|id| scope.find_child(id));
            if let Some(matched) = found.and_then(|(n, _)| scope.matched.get(n)) {
                matched.set(true);
            }
        }
        debug!(path, child = controller.id(), "enclosure hidden");
        Ok(element_end)
    }

    fn render_component(
        &mut self,
        component: &Component,
        path: &str,
        markup: &Markup,
        index: usize,
        scope: &Scope<'_>,
    ) -> MarkletResult<()> {
        let Some(tag) = markup.tag(index) else {
            return Ok(());
        };

        if let Some(required) = component.required_ancestor() {
            if scope.ancestor_with_role(required).is_none() {
                let error = MarkletError::Containment {
                    key: markup.key().to_string(),
                    path: path.to_string(),
                    role: required.to_string(),
                    ancestor: None,
                };
                return self.fail(path, error);
            }
        }
        if !component.is_visible() {
            return Ok(());
        }

        let body_end = markup.close_index(index);
        let name = container_name(component, path);
        match component.kind() {
            ComponentKind::Leaf { body: Some(text) } => {
                if tag.opens_body() {
                    self.write_open(markup, tag);
                    self.out.push_str(&escape_markup(text));
                    self.write_close(markup, index);
                } else {
                    self.write_tag(markup, tag);
                }
            }
            ComponentKind::Leaf { body: None } => {
                self.write_tag(markup, tag);
                if let Some(close) = body_end {
                    let inner = Scope::new(path.to_string(), name, &[], None, markup, Some(scope));
                    self.render_range(markup, index + 1, close, &inner)?;
                    self.write_close(markup, index);
                }
            }
            ComponentKind::Container { children } => {
                self.write_open(markup, tag);
                let inner = Scope::new(
                    path.to_string(),
                    name,
                    children,
                    component.role(),
                    markup,
                    Some(scope),
                );
                if let Some(close) = body_end {
                    self.render_range(markup, index + 1, close, &inner)?;
                }
                self.finish_scope(&inner)?;
                self.write_close(markup, index);
            }
            ComponentKind::Panel {
                markup: own,
                children,
            } => {
                let Some(section) = find_section(own, "panel") else {
                    return self.fail(path, missing_section(own, "panel", path));
                };
                self.write_open(markup, tag);
                let inner = Scope::new(
                    path.to_string(),
                    name,
                    children,
                    component.role(),
                    own,
                    Some(scope),
                );
                self.render_section(own, section, &inner)?;
                self.finish_scope(&inner)?;
                self.write_close(markup, index);
            }
            ComponentKind::Border {
                markup: own,
                children,
                body,
            } => {
                let Some(section) = find_section(own, "border") else {
                    return self.fail(path, missing_section(own, "border", path));
                };
                self.write_open(markup, tag);
                let mut inner = Scope::new(
                    path.to_string(),
                    name,
                    children,
                    component.role(),
                    own,
                    Some(scope),
                );
                inner.body = Some(BodySlot {
                    markup,
                    start: index + 1,
                    end: body_end.unwrap_or(index + 1),
                    children: body,
                });
                self.render_section(own, section, &inner)?;
                self.finish_scope(&inner)?;
                self.write_close(markup, index);
            }
            ComponentKind::Fragment {
                markup_id,
                children,
            } => {
                let found = scope.ancestors().find_map(|candidate| {
                    candidate
                        .markup
                        .root_fragment()
                        .namespace_fragment_by_id("fragment", markup_id)
                        .map(|fragment| (candidate.markup, fragment.start()))
                });
                let Some((owner, open)) = found else {
                    let error = MarkletError::Markup {
                        key: markup.key().to_string(),
                        position: Some(tag.position()),
                        message: format!(
                            "No fragment with id '{markup_id}' found for component '{path}'"
                        ),
                    };
                    return self.fail(path, error);
                };
                self.write_open(markup, tag);
                let inner = Scope::new(
                    path.to_string(),
                    name,
                    children,
                    component.role(),
                    owner,
                    Some(scope),
                );
                if let Some(close) = owner.close_index(open) {
                    self.render_range(owner, open + 1, close, &inner)?;
                }
                self.finish_scope(&inner)?;
                self.write_close(markup, index);
            }
            ComponentKind::Repeater { items } => {
                for (n, item) in items.iter().enumerate() {
                    let item_path = format!("{path}:{n}");
                    self.report.set(&item_path, MatchState::Matched);
                    let item_name = format!("[Item {item_path}]");
                    self.write_open(markup, tag);
                    let inner = Scope::new(
                        item_path,
                        item_name,
                        item,
                        component.role(),
                        markup,
                        Some(scope),
                    );
                    if let Some(close) = body_end {
                        self.render_range(markup, index + 1, close, &inner)?;
                    }
                    self.finish_scope(&inner)?;
                    self.write_close(markup, index);
                }
            }
        }
        Ok(())
    }

    /// Renders the namespace section opened at `open` of a panel or border.
    fn render_section(&mut self, own: &Markup, open: usize, scope: &Scope<'_>) -> MarkletResult<()> {
        let Some(tag) = own.tag(open) else {
            return Ok(());
        };
        self.write_open(own, tag);
        if let Some(close) = own.close_index(open) {
            self.render_range(own, open + 1, close, scope)?;
        }
        self.write_close(own, open);
        Ok(())
    }

    /// Renders the caller's body in place of `<ns:body>` in border markup.
    /// Body children are addressed below `owner`, the border itself, even
    /// when the tag sits inside one of the border's own containers.
    fn render_border_body(
        &mut self,
        markup: &Markup,
        index: usize,
        owner: &Scope<'_>,
        scope: &Scope<'_>,
    ) -> MarkletResult<()> {
        let (Some(slot), Some(tag)) = (&owner.body, markup.tag(index)) else {
            return Ok(());
        };
        self.write_open(markup, tag);
        let inner = Scope::new(
            owner.path.clone(),
            owner.container.clone(),
            slot.children,
            None,
            slot.markup,
            Some(scope),
        );
        self.render_range(slot.markup, slot.start, slot.end, &inner)?;
        self.finish_scope(&inner)?;
        self.write_close(markup, index);
        Ok(())
    }

    /// Reports every visible child the walk of `scope` did not meet.
    fn finish_scope(&mut self, scope: &Scope<'_>) -> MarkletResult<()> {
        for (child, matched) in scope.children.iter().zip(&scope.matched) {
            if matched.get() || !child.is_visible() {
                continue;
            }
            let path = scope.child_path(child.id());
            let key = scope.markup.key().to_string();
            let error = match child.required_ancestor() {
                Some(required) => MarkletError::Containment {
                    key,
                    path: path.clone(),
                    role: required.to_string(),
                    ancestor: scope
                        .ancestor_with_role(required)
                        .map(|ancestor| ancestor.path.clone()),
                },
                None => MarkletError::MissingTag {
                    key,
                    path: path.clone(),
                    container: scope.container.clone(),
                },
            };
            self.fail(&path, error)?;
        }
        Ok(())
    }
}

/// The error for an id tag no component or resolver claimed.
fn unmatched(markup: &Markup, tag: &Tag, id: &str, scope: &Scope<'_>) -> MarkletError {
    let mut roles = Vec::new();
    if let Some((path, role, ancestor)) = find_requiring(scope.children, &scope.path, id, &mut roles) {
        return MarkletError::Containment {
            key: markup.key().to_string(),
            path,
            role: role.to_string(),
            ancestor,
        };
    }

    MarkletError::UnmatchedTag {
        key: markup.key().to_string(),
        id: id.to_string(),
        path: scope.child_path(id),
        container: scope.container.clone(),
        position: Some(tag.position()),
        similar: similar_names(id, scope.children.iter().map(Component::id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MarkupKey, MarkupParser};

    fn parse(name: &str, text: &str) -> Markup {
        MarkupParser::default()
            .parse_str(MarkupKey::new(name), text)
            .unwrap()
    }

    fn render(markup: Markup, children: Vec<Component>) -> MarkletResult<String> {
        Renderer::new(MarkupSettings::default()).render(&Page::new(markup, children))
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_label_replaces_body() {
        let markup = parse("P.html", r#"<p><span wicket:id="name">placeholder</span></p>"#);
        let out = render(markup, vec![Component::label("name", "<Ann>")]).unwrap();
        assert_eq!(out, r#"<p><span wicket:id="name">&lt;Ann&gt;</span></p>"#);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unmatched_tag_suggests_similar_ids() {
        let markup = parse("P.html", "<div>\n  <span wicket:id=\"lable\"></span></div>");
        let err = render(markup, vec![Component::label("label", "x")]).unwrap_err();
        let MarkletError::UnmatchedTag {
            id,
            similar,
            position,
            ..
        } = &err
        else {
            panic!("expected an unmatched tag, got {err:?}");
        };
        assert_eq!(id, "lable");
        assert_eq!(similar, &vec!["label".to_string()]);
        assert_eq!(position.map(|p| p.line), Some(2));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_component_without_tag() {
        let markup = parse("P.html", "<p>static</p>");
        let err = render(markup, vec![Component::leaf("ghost")]).unwrap_err();
        assert_eq!(
            err,
            MarkletError::MissingTag {
                key: "P.html".to_string(),
                path: "ghost".to_string(),
                container: "[Page P.html]".to_string(),
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_invisible_component_renders_nothing() {
        let markup = parse("P.html", r#"<p>a<b wicket:id="hidden">b</b>c</p>"#);
        let out = render(markup, vec![Component::leaf("hidden").with_visible(false)]).unwrap();
        assert_eq!(out, "<p>ac</p>");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_transparent_tags_keep_scope() {
        let markup = parse(
            "P.html",
            r#"<wicket:container><span wicket:id="x">?</span></wicket:container>"#,
        );
        let settings = MarkupSettings {
            strip_wicket_tags: true,
            ..MarkupSettings::default()
        };
        let renderer = Renderer::new(settings);
        let page = Page::new(markup, vec![Component::label("x", "1")]);
        assert_eq!(renderer.render(&page).unwrap(), "<span>1</span>");

        let report = renderer.check(&page);
        assert_eq!(report.state("x"), Some(&MatchState::Matched));
        assert_eq!(
            report.state("_wicket_container"),
            Some(&MatchState::AutoResolved {
                resolver: "transparent"
            })
        );
        assert!(report.is_ok());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_check_collects_every_failure() {
        let markup = parse("P.html", r#"<i wicket:id="a"></i><i wicket:id="b"></i>"#);
        let renderer = Renderer::new(MarkupSettings::default());
        let report = renderer.check(&Page::new(markup, vec![Component::leaf("c")]));
        assert_eq!(report.errors().count(), 3);
        assert!(matches!(report.state("c"), Some(MatchState::Failed(MarkletError::MissingTag { .. }))));
    }
}
