use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{
    error::{MarkletError, MarkletResult},
    markup::MarkupKey,
};

/// Finds the raw bytes of a template.
pub trait ResourceLocator: Send + Sync {
    /// The most specific template for `key`, or `None` if there is none.
    fn locate(&self, key: &MarkupKey) -> MarkletResult<Option<Vec<u8>>>;
}

/// Splits `dir/Page.html` into `("dir/Page", ".html")`.
fn split_extension(path: &str) -> (&str, &str) {
    let file_start = path.rfind('/').map_or(0, |slash| slash + 1);
    match path.get(file_start..).and_then(|file| file.rfind('.')) {
        Some(dot) if dot > 0 => path.split_at(file_start + dot),
        _ => (path, ""),
    }
}

/// Resource names to try for `key`, most specific first.
///
/// Styles are tried before locales are dropped. A key `a.html` with style
/// `b` and locale `fr_CA` yields `a_b_fr_CA.html`, `a_b_fr.html`,
/// `a_b.html`, `a_fr_CA.html`, `a_fr.html` and `a.html`.
pub fn candidate_names(key: &MarkupKey) -> Vec<String> {
    let (stem, extension) = split_extension(&key.path);

    let mut locales = Vec::new();
    let mut locale = key.locale.as_deref().filter(|locale| !locale.is_empty());
    while let Some(current) = locale {
        locales.push(Some(current));
        locale = current.rsplit_once('_').map(|(shorter, _)| shorter);
    }
    locales.push(None);

    let styles = [key.style.as_deref().filter(|style| !style.is_empty()), None];

    let mut names: Vec<String> = Vec::new();
    for style in styles {
        for locale in &locales {
            let mut name = stem.to_string();
            for suffix in [style, *locale].into_iter().flatten() {
                name.push('_');
                name.push_str(suffix);
            }
            name.push_str(extension);
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Templates held in memory, keyed by resource name.
#[derive(Debug, Default)]
pub struct MemoryLocator {
    resources: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the resource `name`, e.g. `Page_fr.html`.
    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.resources.write().insert(name.into(), bytes.into());
    }

    pub fn remove(&self, name: &str) -> bool {
        self.resources.write().remove(name).is_some()
    }
}

impl ResourceLocator for MemoryLocator {
    fn locate(&self, key: &MarkupKey) -> MarkletResult<Option<Vec<u8>>> {
        let resources = self.resources.read();
        let found = candidate_names(key)
            .into_iter()
            .find_map(|name| resources.get(&name).cloned());
        drop(resources);
        Ok(found)
    }
}

/// Templates read from files below a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    root: PathBuf,
}

impl DirectoryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceLocator for DirectoryLocator {
    fn locate(&self, key: &MarkupKey) -> MarkletResult<Option<Vec<u8>>> {
        for name in candidate_names(key) {
            let path = self.root.join(&name);
            match std::fs::read(&path) {
                Ok(bytes) => {
                    debug!(%key, path = %path.display(), "markup located");
                    return Ok(Some(bytes));
                }
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    trace!(path = %path.display(), "no markup");
                }
                Err(error) => {
                    return Err(MarkletError::Io {
                        key: key.to_string(),
                        message: format!("{}: {error}", path.display()),
                    });
                }
            }
        }
        Ok(None)
    }
}
