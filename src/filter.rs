//! The pull-based filter pipeline between the tokenizer and the assembler.
//!
//! Every stage asks the stage before it for elements and hands back whatever
//! should be visible downstream. A stage may pass an element through, change
//! it, drop it, or hold it back and return synthesized elements first.

use std::sync::Arc;

use crate::{
    error::ParseError,
    filters,
    markup::MarkupElement,
    settings::MarkupSettings,
};

pub type FilterResult<T> = Result<T, ParseError>;

/// Per-parse state shared by all stages.
#[derive(Debug)]
pub struct ParseContext<'s> {
    pub settings: &'s MarkupSettings,
    /// The active templating namespace prefix.
    pub namespace: String,
}

impl<'s> ParseContext<'s> {
    pub fn new(settings: &'s MarkupSettings) -> Self {
        Self {
            settings,
            namespace: settings.namespace.clone(),
        }
    }

    /// Whether `prefix` names the active templating namespace.
    pub fn is_namespace(&self, prefix: Option<&str>) -> bool {
        prefix.is_some_and(|prefix| prefix.eq_ignore_ascii_case(&self.namespace))
    }
}

/// Anything that yields markup elements on demand.
pub trait ElementSource {
    /// The next element, or `None` once the stream is exhausted.
    fn next_element(&mut self, ctx: &mut ParseContext<'_>) -> FilterResult<Option<MarkupElement>>;
}

pub trait MarkupFilter {
    fn name(&self) -> &'static str;

    /// Pulls from `upstream` until it has the next element to expose.
    fn next_element(
        &mut self,
        upstream: &mut dyn ElementSource,
        ctx: &mut ParseContext<'_>,
    ) -> FilterResult<Option<MarkupElement>>;

    /// Called once after the stream has been drained.
    fn post_process(&mut self, _ctx: &mut ParseContext<'_>) -> FilterResult<()> {
        Ok(())
    }
}

/// A source stacked with filters; the last filter is the outermost stage.
pub(crate) struct Pipeline<'p, 's> {
    head: &'p mut (dyn ElementSource + 's),
    filters: &'p mut [Box<dyn MarkupFilter>],
}

impl<'p, 's> Pipeline<'p, 's> {
    pub(crate) fn new(
        head: &'p mut (dyn ElementSource + 's),
        filters: &'p mut [Box<dyn MarkupFilter>],
    ) -> Self {
        Self { head, filters }
    }
}

impl ElementSource for Pipeline<'_, '_> {
    fn next_element(&mut self, ctx: &mut ParseContext<'_>) -> FilterResult<Option<MarkupElement>> {
        match self.filters.split_last_mut() {
            None => self.head.next_element(ctx),
            Some((outer, inner)) => {
                let mut upstream = Pipeline {
                    head: &mut *self.head,
                    filters: inner,
                };
                outer.next_element(&mut upstream, ctx)
            }
        }
    }
}

pub type FilterFactory = Arc<dyn Fn(&MarkupSettings) -> Box<dyn MarkupFilter> + Send + Sync>;

/// Ordered, named filter factories. Each parse instantiates fresh filters.
#[derive(Clone)]
pub struct FilterChain {
    stages: Vec<(String, FilterFactory)>,
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl FilterChain {
    pub const fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    /// The default stages, in order: namespace, tag-identifier, tag-type,
    /// html, remove, autolink, relative-path.
    pub fn standard() -> Self {
        let mut chain = Self::empty();
        chain
            .append(filters::NAMESPACE, |_| {
                Box::new(filters::NamespaceFilter::default())
            })
            .append(filters::TAG_IDENTIFIER, |_| {
                Box::new(filters::TagIdentifierFilter::default())
            })
            .append(filters::TAG_TYPE, |_| {
                Box::new(filters::TagTypeFilter::default())
            })
            .append(filters::HTML, |_| Box::new(filters::HtmlFilter::default()))
            .append(filters::REMOVE, |_| {
                Box::new(filters::RemoveFilter::default())
            })
            .append(filters::AUTOLINK, |settings| {
                Box::new(filters::AutoLinkFilter::new(settings.auto_link_all))
            })
            .append(filters::RELATIVE_PATH, |settings| {
                Box::new(filters::RelativePathFilter::new(settings.context_path.clone()))
            });
        chain
    }

    pub fn append<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&MarkupSettings) -> Box<dyn MarkupFilter> + Send + Sync + 'static,
    {
        self.stages.push((name.into(), Arc::new(factory)));
        self
    }

    /// Inserts a stage in front of the stage called `before`.
    ///
    /// Returns `false`, leaving the chain unchanged, if there is no such stage.
    pub fn insert_before<F>(&mut self, before: &str, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn(&MarkupSettings) -> Box<dyn MarkupFilter> + Send + Sync + 'static,
    {
        let Some(index) = self.stages.iter().position(|(stage, _)| stage == before) else {
            return false;
        };
        self.stages.insert(index, (name.into(), Arc::new(factory)));
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.stages.len();
        self.stages.retain(|(stage, _)| stage != name);
        self.stages.len() != before
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub(crate) fn instantiate(&self, settings: &MarkupSettings) -> Vec<Box<dyn MarkupFilter>> {
        self.stages
            .iter()
            .map(|(_, factory)| factory(settings))
            .collect()
    }
}
