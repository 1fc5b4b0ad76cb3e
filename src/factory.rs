use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    cache::{CacheEntry, MarkupCache},
    error::{MarkletError, MarkletResult},
    inheritance::merge_inherited,
    locator::ResourceLocator,
    markup::{Markup, MarkupKey},
    parser::MarkupParser,
};

/// Loads markup through a locator and a parser, caching the result.
///
/// Keys registered with [`MarkupFactory::inherited`] load as their base
/// markup merged with their own.
pub struct MarkupFactory {
    parser: MarkupParser,
    locator: Arc<dyn ResourceLocator>,
    cache: Arc<MarkupCache>,
    /// Derived key to base key.
    bases: RwLock<HashMap<MarkupKey, MarkupKey>>,
}

impl std::fmt::Debug for MarkupFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkupFactory")
            .field("parser", &self.parser)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl MarkupFactory {
    pub fn new(parser: MarkupParser, locator: Arc<dyn ResourceLocator>) -> Self {
        Self::with_cache(parser, locator, Arc::new(MarkupCache::new()))
    }

    pub fn with_cache(
        parser: MarkupParser,
        locator: Arc<dyn ResourceLocator>,
        cache: Arc<MarkupCache>,
    ) -> Self {
        Self {
            parser,
            locator,
            cache,
            bases: RwLock::new(HashMap::new()),
        }
    }

    pub const fn parser(&self) -> &MarkupParser {
        &self.parser
    }

    pub const fn cache(&self) -> &Arc<MarkupCache> {
        &self.cache
    }

    /// The markup for `key`.
    ///
    /// # Errors
    /// - [`MarkletError::ResourceNotFound`] if the locator has no template.
    /// - Any error from locating or parsing it.
    pub fn markup(&self, key: &MarkupKey) -> MarkletResult<Markup> {
        self.find_markup(key)?
            .ok_or_else(|| MarkletError::ResourceNotFound {
                key: key.to_string(),
            })
    }

    /// Like [`MarkupFactory::markup`], with a missing template as `None`.
    /// Missing templates are cached too.
    pub fn find_markup(&self, key: &MarkupKey) -> MarkletResult<Option<Markup>> {
        let entry = self.cache.get_or_load(key, || self.load(key))?;
        Ok(entry.into_markup())
    }

    fn load(&self, key: &MarkupKey) -> MarkletResult<CacheEntry> {
        let Some(bytes) = self.locator.locate(key)? else {
            debug!(%key, "markup not found");
            return Ok(CacheEntry::Missing);
        };
        let markup = self.parser.parse_bytes(key.clone(), &bytes)?;

        let base_key = self.bases.read().get(key).cloned();
        let Some(base_key) = base_key else {
            return Ok(CacheEntry::Found(markup));
        };
        let base = self.markup(&base_key)?;
        let merged = merge_inherited(&base, &markup, self.parser.settings())?;
        Ok(CacheEntry::Found(merged))
    }

    /// Drops `key` from the cache and loads it again.
    pub fn reload(&self, key: &MarkupKey) -> MarkletResult<Markup> {
        self.cache.remove(key);
        self.markup(key)
    }

    /// Drops `key` and any markup inheriting from it from the cache.
    pub fn invalidate(&self, key: &MarkupKey) -> bool {
        self.cache.remove(key)
    }

    /// Declares that `derived` extends `base` and returns the merged markup.
    ///
    /// The merged markup is cached under `derived`, and is evicted whenever
    /// `base` is.
    ///
    /// # Errors
    /// [`MarkletError::Markup`] if the declaration would make a markup extend
    /// itself, plus any error from loading either markup or merging them.
    pub fn inherited(&self, derived: &MarkupKey, base: &MarkupKey) -> MarkletResult<Markup> {
        {
            let mut bases = self.bases.write();
            let mut ancestor = Some(base);
            while let Some(current) = ancestor {
                if current == derived {
                    return Err(MarkletError::Markup {
                        key: derived.to_string(),
                        position: None,
                        message: format!("Markup cannot extend itself through {base}"),
                    });
                }
                ancestor = bases.get(current);
            }

            if bases.get(derived) != Some(base) {
                bases.insert(derived.clone(), base.clone());
                drop(bases);
                // Anything cached so far was loaded without the base.
                self.cache.remove(derived);
            }
        }
        self.markup(derived)
    }
}
