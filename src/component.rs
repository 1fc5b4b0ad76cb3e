use crate::{
    error::MarkletResult,
    markup::Markup,
    paging::Pager,
};

/// The closed set of component shapes the renderer knows how to walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentKind {
    /// Replaces its tag body with `body`, when set.
    Leaf { body: Option<String> },
    /// Renders its tag body with its children.
    Container { children: Vec<Component> },
    /// Renders the `<ns:panel>` section of its own markup.
    Panel { markup: Markup, children: Vec<Component> },
    /// Renders the `<ns:border>` section of its own markup; `<ns:body>`
    /// inside it renders the caller's tag body with `body` as children.
    Border {
        markup: Markup,
        children: Vec<Component>,
        body: Vec<Component>,
    },
    /// Renders the `<ns:fragment>` with id `markup_id` from an enclosing
    /// markup.
    Fragment {
        markup_id: String,
        children: Vec<Component>,
    },
    /// Renders its tag once per item. Item `n` has path `id:n`.
    Repeater { items: Vec<Vec<Component>> },
}

impl ComponentKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Leaf { .. } => "Leaf",
            Self::Container { .. } => "Container",
            Self::Panel { .. } => "Panel",
            Self::Border { .. } => "Border",
            Self::Fragment { .. } => "Fragment",
            Self::Repeater { .. } => "Repeater",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    id: String,
    kind: ComponentKind,
    role: Option<String>,
    required_ancestor: Option<String>,
    visible: bool,
}

impl Component {
    pub fn new(id: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            id: id.into(),
            kind,
            role: None,
            required_ancestor: None,
            visible: true,
        }
    }

    pub fn leaf(id: impl Into<String>) -> Self {
        Self::new(id, ComponentKind::Leaf { body: None })
    }

    pub fn label(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            id,
            ComponentKind::Leaf {
                body: Some(text.into()),
            },
        )
    }

    pub fn container(id: impl Into<String>, children: Vec<Self>) -> Self {
        Self::new(id, ComponentKind::Container { children })
    }

    pub fn panel(id: impl Into<String>, markup: Markup, children: Vec<Self>) -> Self {
        Self::new(id, ComponentKind::Panel { markup, children })
    }

    pub fn border(
        id: impl Into<String>,
        markup: Markup,
        children: Vec<Self>,
        body: Vec<Self>,
    ) -> Self {
        Self::new(
            id,
            ComponentKind::Border {
                markup,
                children,
                body,
            },
        )
    }

    pub fn fragment(
        id: impl Into<String>,
        markup_id: impl Into<String>,
        children: Vec<Self>,
    ) -> Self {
        Self::new(
            id,
            ComponentKind::Fragment {
                markup_id: markup_id.into(),
                children,
            },
        )
    }

    pub fn repeater(id: impl Into<String>, items: Vec<Vec<Self>>) -> Self {
        Self::new(id, ComponentKind::Repeater { items })
    }

    /// A repeater showing the rows of one page.
    pub fn pageable(
        id: impl Into<String>,
        rows: &[Vec<Self>],
        rows_per_page: usize,
        page: usize,
    ) -> MarkletResult<Self> {
        let pager = Pager::new(rows.len(), rows_per_page)?;
        Ok(Self::repeater(id, pager.slice(rows, page).to_vec()))
    }

    /// Declares the role other components can require as an ancestor,
    /// e.g. `"CheckGroup"`.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Requires an ancestor with `role` both in the component tree and
    /// around the component's tag in the markup.
    #[must_use]
    pub fn requires_ancestor(mut self, role: impl Into<String>) -> Self {
        self.required_ancestor = Some(role.into());
        self
    }

    /// Invisible components are matched but render nothing.
    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn required_ancestor(&self) -> Option<&str> {
        self.required_ancestor.as_deref()
    }

    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Children matched against the component's own markup scope. Border
    /// body children and repeater items are not included.
    pub fn children(&self) -> &[Self] {
        match &self.kind {
            ComponentKind::Container { children }
            | ComponentKind::Panel { children, .. }
            | ComponentKind::Border { children, .. }
            | ComponentKind::Fragment { children, .. } => children,
            ComponentKind::Leaf { .. } | ComponentKind::Repeater { .. } => &[],
        }
    }

    pub fn child(&self, id: &str) -> Option<&Self> {
        self.children().iter().find(|child| child.id == id)
    }
}

/// The root of a component tree together with its markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    markup: Markup,
    children: Vec<Component>,
}

impl Page {
    pub const fn new(markup: Markup, children: Vec<Component>) -> Self {
        Self { markup, children }
    }

    pub const fn markup(&self) -> &Markup {
        &self.markup
    }

    pub fn children(&self) -> &[Component] {
        &self.children
    }

    pub fn child(&self, id: &str) -> Option<&Component> {
        self.children.iter().find(|child| child.id() == id)
    }

    /// Looks up a component by colon separated path, e.g. `form:group`.
    pub fn find(&self, path: &str) -> Option<&Component> {
        let mut segments = path.split(':');
        let first = self.child(segments.next()?)?;
        segments.try_fold(first, |component, id| component.child(id))
    }
}
