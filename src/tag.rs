use std::borrow::Cow;

use indexmap::IndexMap;

/// Location of an element in its template source.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    /// 1-indexed line.
    pub line: usize,
    /// 1-indexed column, counted in bytes from the start of the line.
    pub column: usize,
    /// Byte offset from the start of the (decoded) source.
    pub offset: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TagKind {
    Open,
    Close,
    OpenClose,
}

/// Where a tag came from.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TagOrigin {
    /// Read from the template source.
    Source,
    /// Synthesized by a filter and rendered like any other tag.
    Injected,
    /// Synthesized to close an element the source leaves implicitly closed.
    /// Renders as nothing.
    Implicit,
}

/// A single open, close or open-close tag.
///
/// Tags are only mutable while they travel through the filter chain; once the
/// assembler seals them into a [`crate::Markup`] they are reachable through
/// shared references only.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    name: String,
    namespace: Option<String>,
    kind: TagKind,
    attributes: IndexMap<String, String>,
    position: Position,
    id: Option<String>,
    namespace_tag: bool,
    origin: TagOrigin,
    modified: bool,
    autolink: bool,
    no_close_tag: bool,
    source: Option<String>,
}

impl Tag {
    pub(crate) fn from_source(
        name: String,
        namespace: Option<String>,
        kind: TagKind,
        attributes: IndexMap<String, String>,
        position: Position,
        source: String,
    ) -> Self {
        Self {
            name,
            namespace,
            kind,
            attributes,
            position,
            id: None,
            namespace_tag: false,
            origin: TagOrigin::Source,
            modified: false,
            autolink: false,
            no_close_tag: false,
            source: Some(source),
        }
    }

    /// Builds the close tag matching `self`, carrying over its id and position.
    pub(crate) fn closing(&self, origin: TagOrigin) -> Self {
        Self {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            kind: TagKind::Close,
            attributes: IndexMap::new(),
            position: self.position,
            id: self.id.clone(),
            namespace_tag: self.namespace_tag,
            origin,
            modified: false,
            autolink: self.autolink,
            no_close_tag: false,
            source: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// `prefix:name`, or just `name` without a namespace prefix.
    pub fn qualified_name(&self) -> Cow<'_, str> {
        match &self.namespace {
            Some(ns) => Cow::Owned(format!("{ns}:{}", self.name)),
            None => Cow::Borrowed(&self.name),
        }
    }

    pub const fn kind(&self) -> TagKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.kind == TagKind::Open
    }

    pub fn is_close(&self) -> bool {
        self.kind == TagKind::Close
    }

    pub fn is_open_close(&self) -> bool {
        self.kind == TagKind::OpenClose
    }

    pub const fn position(&self) -> Position {
        self.position
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Ids assigned by the filter chain rather than written by the author
    /// start with an underscore.
    pub fn has_auto_id(&self) -> bool {
        self.id.as_deref().is_some_and(|id| id.starts_with('_'))
    }

    /// Whether the tag is in the templating namespace, e.g. `<wicket:panel>`.
    pub const fn is_namespace_tag(&self) -> bool {
        self.namespace_tag
    }

    pub fn is_namespace_tag_named(&self, name: &str) -> bool {
        self.namespace_tag && self.name.eq_ignore_ascii_case(name)
    }

    pub const fn origin(&self) -> TagOrigin {
        self.origin
    }

    pub const fn is_modified(&self) -> bool {
        self.modified
    }

    pub const fn is_autolink(&self) -> bool {
        self.autolink
    }

    /// Set for open tags of void elements such as `<br>` that never get a
    /// close tag.
    pub const fn has_no_close_tag(&self) -> bool {
        self.no_close_tag
    }

    /// Open tags that start an element with a body, i.e. which will be
    /// followed by a matching close tag.
    pub fn opens_body(&self) -> bool {
        self.kind == TagKind::Open && !self.no_close_tag
    }

    /// Whether `self` is the close tag for `open`.
    pub fn closes(&self, open: &Self) -> bool {
        self.kind == TagKind::Close
            && open.kind == TagKind::Open
            && self.name.eq_ignore_ascii_case(&open.name)
            && match (&self.namespace, &open.namespace) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                (None, None) => true,
                (Some(_), None) | (None, Some(_)) => false,
            }
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
        self.modified = true;
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<String> {
        let removed = self.attributes.shift_remove(key);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    pub(crate) fn set_kind(&mut self, kind: TagKind) {
        if self.kind != kind {
            self.kind = kind;
            self.modified = true;
        }
    }

    pub(crate) fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub(crate) fn set_namespace_tag(&mut self, value: bool) {
        self.namespace_tag = value;
    }

    pub(crate) fn set_autolink(&mut self, value: bool) {
        self.autolink = value;
    }

    pub(crate) fn set_no_close_tag(&mut self, value: bool) {
        self.no_close_tag = value;
    }

    /// Writes the tag as markup.
    ///
    /// Unmodified source tags are written verbatim. When `strip_namespace`
    /// names a namespace, attributes in it (`wicket:id`, ...) are dropped.
    pub fn write_to(&self, out: &mut String, strip_namespace: Option<&str>) {
        if self.origin == TagOrigin::Implicit {
            return;
        }

        let strips_attributes = strip_namespace.is_some_and(|ns| {
            self.attributes
                .keys()
                .any(|key| in_namespace(key, ns))
        });

        if let Some(source) = &self.source {
            if !self.modified && !strips_attributes {
                out.push_str(source);
                return;
            }
        }

        self.write_as(out, self.kind, strip_namespace);
    }

    /// Regenerates the tag text with the given kind, ignoring the source text.
    pub fn write_as(&self, out: &mut String, kind: TagKind, strip_namespace: Option<&str>) {
        out.push('<');
        if kind == TagKind::Close {
            out.push('/');
        }
        out.push_str(&self.qualified_name());

        if kind != TagKind::Close {
            for (key, value) in &self.attributes {
                if strip_namespace.is_some_and(|ns| in_namespace(key, ns)) {
                    continue;
                }
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape_markup(value));
                out.push('"');
            }
        }

        if kind == TagKind::OpenClose {
            out.push_str("/>");
        } else {
            out.push('>');
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut text = String::new();
        self.write_as(&mut text, self.kind, None);
        write!(f, "'{}' ({})", text, self.position)
    }
}

fn in_namespace(key: &str, namespace: &str) -> bool {
    key.split_once(':')
        .is_some_and(|(prefix, _)| prefix.eq_ignore_ascii_case(namespace))
}

/// Escapes `& < > " '`, borrowing when nothing needs escaping.
pub fn escape_markup(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

/// Resolves the named and numeric character references found in attribute
/// values. Unknown references are kept as written.
pub fn unescape_markup(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        let (before, from_amp) = rest.split_at(amp);
        out.push_str(before);

        let decoded = from_amp.find(';').and_then(|semi| {
            let entity = from_amp.get(1..semi)?;
            decode_entity(entity).map(|ch| (ch, semi))
        });

        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = from_amp.get(semi + 1..).unwrap_or_default();
            }
            None => {
                out.push('&');
                rest = from_amp.get(1..).unwrap_or_default();
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
