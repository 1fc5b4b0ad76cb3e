
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use fixtures::get_parser;
use marklet::{
    DirectoryLocator, Markup, MarkupFactory, MarkupKey, MarkletResult, MemoryLocator,
    ResourceLocator,
};

/// Counts how often the factory goes to the locator.
struct CountingLocator {
    inner: MemoryLocator,
    reads: AtomicUsize,
}

impl CountingLocator {
    fn new() -> Self {
        Self {
            inner: MemoryLocator::new(),
            reads: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ResourceLocator for CountingLocator {
    fn locate(&self, key: &MarkupKey) -> MarkletResult<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent first requests overlap.
        std::thread::sleep(std::time::Duration::from_millis(10));
        self.inner.locate(key)
    }
}

#[test]
#[ntest::timeout(2000)]
fn test_concurrent_first_access_parses_once() {
    let locator = Arc::new(CountingLocator::new());
    locator
        .inner
        .insert("Home.html", r#"<p wicket:id="greeting">hi</p>"#);
    let factory = MarkupFactory::new(
        get_parser(),
        Arc::<CountingLocator>::clone(&locator) as Arc<dyn ResourceLocator>,
    );
    let key = MarkupKey::new("Home.html");

    let results: Vec<Markup> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| factory.markup(&key).unwrap()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert_eq!(locator.reads(), 1, "only one thread should load the markup");
    let first = results.first().unwrap();
    assert!(results.iter().all(|markup| Markup::ptr_eq(markup, first)));
    assert_eq!(factory.cache().len(), 1);
}

#[test]
#[ntest::timeout(500)]
fn test_missing_markup_is_cached_until_reload() {
    let locator = Arc::new(CountingLocator::new());
    let factory = MarkupFactory::new(
        get_parser(),
        Arc::<CountingLocator>::clone(&locator) as Arc<dyn ResourceLocator>,
    );
    let key = MarkupKey::new("Late.html");

    assert_eq!(factory.find_markup(&key).unwrap(), None);
    locator.inner.insert("Late.html", "<p>late</p>");
    assert_eq!(factory.find_markup(&key).unwrap(), None);
    assert_eq!(locator.reads(), 1);

    let markup = factory.reload(&key).unwrap();
    assert_eq!(markup.render_to_string(None), "<p>late</p>");
    assert_eq!(locator.reads(), 2);
}

#[test]
#[ntest::timeout(500)]
fn test_parse_failure_is_not_cached() {
    let locator = Arc::new(MemoryLocator::new());
    locator.insert("Bad.html", "<div>");
    let factory = MarkupFactory::new(
        get_parser(),
        Arc::<MemoryLocator>::clone(&locator) as Arc<dyn ResourceLocator>,
    );
    let key = MarkupKey::new("Bad.html");

    assert!(factory.markup(&key).is_err());
    assert!(!factory.cache().contains(&key));

    locator.insert("Bad.html", "<div></div>");
    assert!(factory.markup(&key).is_ok());
}

#[test]
#[ntest::timeout(500)]
fn test_directory_locator_with_locale_fallback() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Home.html"), "<p>Hello</p>").unwrap();
    std::fs::write(dir.path().join("Home_fr.html"), "<p>Bonjour</p>").unwrap();

    let factory = MarkupFactory::new(
        get_parser(),
        Arc::new(DirectoryLocator::new(dir.path())),
    );

    let canadian = factory
        .markup(&MarkupKey::new("Home.html").with_locale("fr_CA"))
        .unwrap();
    assert_eq!(canadian.render_to_string(None), "<p>Bonjour</p>");

    let german = factory
        .markup(&MarkupKey::new("Home.html").with_locale("de"))
        .unwrap();
    assert_eq!(german.render_to_string(None), "<p>Hello</p>");

    assert!(factory.find_markup(&MarkupKey::new("Other.html")).unwrap().is_none());
    assert_eq!(factory.cache().len(), 3);
}

#[test]
#[ntest::timeout(500)]
fn test_inherited_markup_follows_its_base() {
    let locator = Arc::new(MemoryLocator::new());
    locator.insert("Base.html", "<body><h1>v1</h1><wicket:child/></body>");
    locator.insert(
        "Derived.html",
        "<body><wicket:extend><p>derived</p></wicket:extend></body>",
    );
    let factory = MarkupFactory::new(
        get_parser(),
        Arc::<MemoryLocator>::clone(&locator) as Arc<dyn ResourceLocator>,
    );
    let base = MarkupKey::new("Base.html");
    let derived = MarkupKey::new("Derived.html");

    let merged = factory.inherited(&derived, &base).unwrap();
    assert_eq!(
        merged.render_to_string(None),
        "<body><h1>v1</h1><wicket:child><wicket:extend><p>derived</p></wicket:extend></wicket:child></body>"
    );
    assert!(Markup::ptr_eq(&merged, &factory.markup(&derived).unwrap()));

    locator.insert("Base.html", "<body><h1>v2</h1><wicket:child/></body>");
    assert!(factory.invalidate(&base));
    assert!(!factory.cache().contains(&derived));

    let merged = factory.markup(&derived).unwrap();
    assert!(merged.render_to_string(None).contains("<h1>v2</h1>"));
    assert_eq!(merged.base_key(), Some(&base));
}

#[test]
#[ntest::timeout(500)]
fn test_three_level_inheritance_chain() {
    let locator = Arc::new(MemoryLocator::new());
    locator.insert("Site.html", "<body><h1>Site</h1><wicket:child/></body>");
    locator.insert(
        "Section.html",
        "<body><wicket:extend><h2>Section</h2><wicket:child/></wicket:extend></body>",
    );
    locator.insert(
        "Article.html",
        "<body><wicket:extend><p>Article</p></wicket:extend></body>",
    );
    let factory = MarkupFactory::new(
        get_parser(),
        Arc::<MemoryLocator>::clone(&locator) as Arc<dyn ResourceLocator>,
    );
    let site = MarkupKey::new("Site.html");
    let section = MarkupKey::new("Section.html");
    let article = MarkupKey::new("Article.html");

    factory.inherited(&section, &site).unwrap();
    let merged = factory.inherited(&article, &section).unwrap();
    assert_eq!(
        merged.render_to_string(None),
        concat!(
            "<body><h1>Site</h1><wicket:child><wicket:extend><h2>Section</h2>",
            "<wicket:child><wicket:extend><p>Article</p></wicket:extend></wicket:child>",
            "</wicket:extend></wicket:child></body>"
        )
    );
    assert_eq!(merged.base_key(), Some(&section));

    locator.insert("Site.html", "<body><h1>Site v2</h1><wicket:child/></body>");
    assert!(factory.invalidate(&site));
    assert!(!factory.cache().contains(&section));
    assert!(!factory.cache().contains(&article));
    assert!(
        factory
            .markup(&article)
            .unwrap()
            .render_to_string(None)
            .contains("<h1>Site v2</h1>")
    );
}
