use std::sync::Arc;

use crate::{
    error::{MarkletError, MarkletResult},
    tag::{Tag, TagKind},
};

/// One item of a parsed template.
///
/// CDATA sections, doctypes, processing instructions and conditional
/// comments are carried as [`MarkupElement::Text`] and rendered verbatim.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupElement {
    Tag(Tag),
    Text(String),
    Comment(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ElementKind {
    OpenTag,
    CloseTag,
    OpenCloseTag,
    Text,
    Comment,
}

impl MarkupElement {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Tag(tag) => match tag.kind() {
                TagKind::Open => ElementKind::OpenTag,
                TagKind::Close => ElementKind::CloseTag,
                TagKind::OpenClose => ElementKind::OpenCloseTag,
            },
            Self::Text(_) => ElementKind::Text,
            Self::Comment(_) => ElementKind::Comment,
        }
    }

    pub const fn as_tag(&self) -> Option<&Tag> {
        match self {
            Self::Tag(tag) => Some(tag),
            Self::Text(_) | Self::Comment(_) => None,
        }
    }

    pub fn write_to(&self, out: &mut String, strip_namespace: Option<&str>) {
        match self {
            Self::Tag(tag) => tag.write_to(out, strip_namespace),
            Self::Text(text) | Self::Comment(text) => out.push_str(text),
        }
    }
}

/// Identity of a template: logical path plus optional locale and style.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkupKey {
    pub path: String,
    pub locale: Option<String>,
    pub style: Option<String>,
}

impl MarkupKey {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            locale: None,
            style: None,
        }
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }
}

impl std::fmt::Display for MarkupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)?;
        if let Some(style) = &self.style {
            write!(f, "_{style}")?;
        }
        if let Some(locale) = &self.locale {
            write!(f, "_{locale}")?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
struct MarkupData {
    key: MarkupKey,
    elements: Vec<MarkupElement>,
    /// For every open tag with a body, the index of its close tag.
    closing: Vec<Option<usize>>,
    encoding: Option<String>,
    doctype: Option<String>,
    xml_declaration: Option<String>,
    /// The templating namespace prefix in effect at the end of the parse.
    namespace: String,
    base: Option<MarkupKey>,
}

/// A sealed, immutable parsed template. Clones share the same data.
#[derive(Debug, Clone)]
pub struct Markup {
    inner: Arc<MarkupData>,
}

impl PartialEq for Markup {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl Eq for Markup {}

impl Markup {
    pub fn key(&self) -> &MarkupKey {
        &self.inner.key
    }

    pub fn elements(&self) -> &[MarkupElement] {
        &self.inner.elements
    }

    pub fn len(&self) -> usize {
        self.inner.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MarkupElement> {
        self.inner.elements.get(index)
    }

    pub fn tag(&self, index: usize) -> Option<&Tag> {
        self.get(index).and_then(MarkupElement::as_tag)
    }

    /// Index of the close tag paired with the open tag at `open`.
    pub fn close_index(&self, open: usize) -> Option<usize> {
        self.inner.closing.get(open).copied().flatten()
    }

    /// Exclusive end of the element starting at `index`, i.e. one past its
    /// close tag for open tags with a body.
    pub fn element_end(&self, index: usize) -> usize {
        self.close_index(index).map_or(index + 1, |close| close + 1)
    }

    pub fn encoding(&self) -> Option<&str> {
        self.inner.encoding.as_deref()
    }

    pub fn doctype(&self) -> Option<&str> {
        self.inner.doctype.as_deref()
    }

    pub fn xml_declaration(&self) -> Option<&str> {
        self.inner.xml_declaration.as_deref()
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Key of the base markup this one was merged with, if inherited.
    pub fn base_key(&self) -> Option<&MarkupKey> {
        self.inner.base.as_ref()
    }

    /// Whether both handles share one allocation.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// The whole template as a fragment.
    pub fn root_fragment(&self) -> MarkupFragment {
        MarkupFragment {
            markup: self.clone(),
            start: 0,
            end: self.len(),
            whole: true,
        }
    }

    /// The element at `index` including its body and close tag.
    pub fn element_fragment(&self, index: usize) -> MarkupFragment {
        MarkupFragment {
            markup: self.clone(),
            start: index.min(self.len()),
            end: self.element_end(index).min(self.len()),
            whole: false,
        }
    }

    pub fn render_to_string(&self, strip_namespace: Option<&str>) -> String {
        self.root_fragment().render_to_string(strip_namespace)
    }
}

/// Accumulates elements and seals them into a [`Markup`].
#[derive(Debug)]
pub struct MarkupBuilder {
    key: MarkupKey,
    elements: Vec<MarkupElement>,
    closing: Vec<Option<usize>>,
    encoding: Option<String>,
    doctype: Option<String>,
    xml_declaration: Option<String>,
    namespace: String,
    base: Option<MarkupKey>,
    sealed: Option<Markup>,
}

impl MarkupBuilder {
    pub fn new(key: MarkupKey) -> Self {
        Self {
            key,
            elements: Vec::new(),
            closing: Vec::new(),
            encoding: None,
            doctype: None,
            xml_declaration: None,
            namespace: "wicket".to_string(),
            base: None,
            sealed: None,
        }
    }

    pub const fn key(&self) -> &MarkupKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub const fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    fn check_open(&self) -> MarkletResult<()> {
        if self.sealed.is_some() {
            return Err(MarkletError::Sealed {
                key: self.key.to_string(),
            });
        }
        Ok(())
    }

    /// Appends an element, returning its index.
    pub fn push(&mut self, element: MarkupElement) -> MarkletResult<usize> {
        self.check_open()?;
        self.elements.push(element);
        self.closing.push(None);
        Ok(self.elements.len() - 1)
    }

    /// Appends text, merging it into a directly preceding text element.
    pub fn push_text(&mut self, text: &str) -> MarkletResult<()> {
        self.check_open()?;
        if let Some(MarkupElement::Text(previous)) = self.elements.last_mut() {
            previous.push_str(text);
            return Ok(());
        }
        self.push(MarkupElement::Text(text.to_string())).map(|_| ())
    }

    pub fn last(&self) -> Option<&MarkupElement> {
        self.elements.last()
    }

    pub fn tag(&self, index: usize) -> Option<&Tag> {
        self.elements.get(index).and_then(MarkupElement::as_tag)
    }

    /// Records that the tag at `close` closes the tag at `open`.
    pub fn pair(&mut self, open: usize, close: usize) -> MarkletResult<()> {
        self.check_open()?;
        if let Some(slot) = self.closing.get_mut(open) {
            *slot = Some(close);
        }
        Ok(())
    }

    pub fn set_encoding(&mut self, encoding: Option<String>) {
        self.encoding = encoding;
    }

    pub fn set_doctype(&mut self, doctype: Option<String>) {
        self.doctype = doctype;
    }

    pub fn set_xml_declaration(&mut self, declaration: Option<String>) {
        self.xml_declaration = declaration;
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
    }

    pub fn set_base(&mut self, base: Option<MarkupKey>) {
        self.base = base;
    }

    /// Produces the immutable markup. Sealing again returns the same value.
    pub fn seal(&mut self) -> Markup {
        if let Some(markup) = &self.sealed {
            return markup.clone();
        }

        let markup = Markup {
            inner: Arc::new(MarkupData {
                key: self.key.clone(),
                elements: std::mem::take(&mut self.elements),
                closing: std::mem::take(&mut self.closing),
                encoding: self.encoding.take(),
                doctype: self.doctype.take(),
                xml_declaration: self.xml_declaration.take(),
                namespace: std::mem::take(&mut self.namespace),
                base: self.base.take(),
            }),
        };
        self.sealed = Some(markup.clone());
        markup
    }
}

/// A contiguous `[start, end)` window on a [`Markup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupFragment {
    markup: Markup,
    start: usize,
    end: usize,
    /// Covers the whole markup rather than a single element.
    whole: bool,
}

impl MarkupFragment {
    pub const fn markup(&self) -> &Markup {
        &self.markup
    }

    pub const fn start(&self) -> usize {
        self.start
    }

    pub const fn end(&self) -> usize {
        self.end
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn elements(&self) -> &[MarkupElement] {
        self.markup
            .elements()
            .get(self.start..self.end)
            .unwrap_or_default()
    }

    /// Element at `index`, relative to the start of the fragment.
    pub fn get(&self, index: usize) -> Option<&MarkupElement> {
        self.elements().get(index)
    }

    /// Elements of `kind` at or after relative index `from`.
    pub fn iter_kind(
        &self,
        kind: ElementKind,
        from: usize,
    ) -> impl Iterator<Item = (usize, &MarkupElement)> + '_ {
        self.elements()
            .iter()
            .enumerate()
            .skip(from)
            .filter(move |(_, element)| element.kind() == kind)
    }

    /// Open and open-close tags at or after relative index `from`.
    pub fn tags_from(&self, from: usize) -> impl Iterator<Item = (usize, &Tag)> + '_ {
        self.elements()
            .iter()
            .enumerate()
            .skip(from)
            .filter_map(|(index, element)| element.as_tag().map(|tag| (index, tag)))
            .filter(|(_, tag)| !tag.is_close())
    }

    /// The tag the fragment starts with, if any.
    pub fn tag(&self) -> Option<&Tag> {
        self.get(0).and_then(MarkupElement::as_tag)
    }

    pub fn id(&self) -> Option<&str> {
        self.tag().and_then(Tag::id)
    }

    /// Absolute range between the fragment's own open and close tag, or the
    /// whole fragment when it does not start with a tag pair.
    fn body_range(&self) -> (usize, usize) {
        let paired = !self.whole
            && self
                .markup
                .close_index(self.start)
                .is_some_and(|close| close + 1 == self.end);
        if paired {
            (self.start + 1, self.end - 1)
        } else {
            (self.start, self.end)
        }
    }

    fn find_child(&self, id: &str) -> Option<Self> {
        let (mut index, end) = self.body_range();
        while index < end {
            let Some(tag) = self.markup.tag(index) else {
                index += 1;
                continue;
            };
            if tag.is_close() {
                index += 1;
                continue;
            }
            if tag.id() == Some(id) {
                return Some(self.markup.element_fragment(index));
            }
            // Bodies of other components belong to those components.
            if tag.id().is_some() && !tag.has_auto_id() {
                index = self.markup.element_end(index);
                continue;
            }
            index += 1;
        }
        None
    }

    /// Finds the tag for a component by id or colon separated path.
    /// Tags with auto-assigned ids are looked through.
    pub fn child_fragment(&self, path: &str) -> Option<Self> {
        path.split(':')
            .try_fold(self.clone(), |fragment, id| fragment.find_child(id))
    }

    /// First namespace tag `<ns:name>` inside the fragment.
    pub fn namespace_fragment(&self, name: &str) -> Option<Self> {
        self.tags_from(0)
            .find(|(_, tag)| tag.is_namespace_tag_named(name))
            .map(|(index, _)| self.markup.element_fragment(self.start + index))
    }

    /// First namespace tag `<ns:name>` whose id is `id`, e.g. a fragment
    /// declaration.
    pub fn namespace_fragment_by_id(&self, name: &str, id: &str) -> Option<Self> {
        self.tags_from(0)
            .find(|(_, tag)| tag.is_namespace_tag_named(name) && tag.id() == Some(id))
            .map(|(index, _)| self.markup.element_fragment(self.start + index))
    }

    pub fn render_to_string(&self, strip_namespace: Option<&str>) -> String {
        let mut out = String::new();
        for element in self.elements() {
            element.write_to(&mut out, strip_namespace);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MarkupParser, MarkupSettings};

    fn parse(text: &str) -> Markup {
        MarkupParser::new(MarkupSettings::default())
            .parse_str(MarkupKey::new("Test.html"), text)
            .unwrap()
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_key_display() {
        let key = MarkupKey::new("pages/Home")
            .with_style("dark")
            .with_locale("fr_CA");
        assert_eq!(key.to_string(), "pages/Home_dark_fr_CA");
        assert_eq!(MarkupKey::new("A").to_string(), "A");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_seal_twice_returns_same_markup() {
        let mut builder = MarkupBuilder::new(MarkupKey::new("A"));
        builder.push(MarkupElement::Text("x".to_string())).unwrap();
        let first = builder.seal();
        let second = builder.seal();
        assert!(Markup::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);

        let err = builder.push(MarkupElement::Text("y".to_string())).unwrap_err();
        assert_eq!(
            err,
            MarkletError::Sealed {
                key: "A".to_string()
            }
        );
        assert_eq!(builder.seal().len(), 1);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_push_text_merges() {
        let mut builder = MarkupBuilder::new(MarkupKey::new("A"));
        builder.push_text("a").unwrap();
        builder.push_text("b").unwrap();
        assert_eq!(builder.len(), 1);
        assert_eq!(builder.last(), Some(&MarkupElement::Text("ab".to_string())));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_child_fragment_by_path() {
        let markup = parse(
            r#"<form wicket:id="form"><div wicket:id="group"><input wicket:id="check"/></div></form>"#,
        );
        let root = markup.root_fragment();
        let group = root.child_fragment("form:group").unwrap();
        assert_eq!(group.id(), Some("group"));
        assert_eq!(group.len(), 3);
        assert!(root.child_fragment("form:group:check").is_some());
        // Not a direct child of the page.
        assert!(root.child_fragment("group").is_none());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_child_lookup_looks_through_auto_ids() {
        let markup = parse(r#"<wicket:container><span wicket:id="label">x</span></wicket:container>"#);
        let label = markup.root_fragment().child_fragment("label").unwrap();
        assert_eq!(label.render_to_string(None), r#"<span wicket:id="label">x</span>"#);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_iter_kind_from_index() {
        let markup = parse("<p>a<b>b</b>c</p>");
        let fragment = markup.root_fragment();
        let texts: Vec<usize> = fragment
            .iter_kind(ElementKind::Text, 2)
            .map(|(index, _)| index)
            .collect();
        assert_eq!(texts, vec![3, 5]);
        assert_eq!(fragment.iter_kind(ElementKind::CloseTag, 0).count(), 2);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_namespace_fragment() {
        let markup = parse("<html><body><wicket:panel>inside</wicket:panel></body></html>");
        let panel = markup.root_fragment().namespace_fragment("panel").unwrap();
        assert_eq!(panel.render_to_string(None), "<wicket:panel>inside</wicket:panel>");
        assert_eq!(panel.id(), Some("_wicket_panel"));
    }
}
