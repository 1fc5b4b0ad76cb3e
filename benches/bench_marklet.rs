#![allow(
    clippy::tests_outside_test_module,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    reason = "benchmark"
)]

use std::{hint::black_box, sync::Arc};

use criterion::{Criterion, criterion_group, criterion_main};
use marklet::{
    Component, Markup, MarkupKey, MarkupParser, MarkupSettings, MessageBundle, Page, Renderer,
    ResolverRegistry,
};

mod utils;

const PROFILE: &str = include_str!("profile.html");

fn profile_page(markup: &Markup, profile: &utils::Profile) -> Page {
    let items = profile
        .items
        .iter()
        .map(|(name, value)| {
            vec![
                Component::label("item-name", name.clone()),
                Component::label("item-value", value.to_string()),
            ]
        })
        .collect();

    Page::new(
        markup.clone(),
        vec![
            Component::label("title", format!("{}'s profile", profile.name)),
            Component::container(
                "user",
                vec![
                    Component::label("name", profile.name.clone()),
                    Component::label("age", profile.age.to_string()),
                    Component::label("details", "Shown to members only")
                        .with_visible(profile.show_details),
                ],
            ),
            Component::repeater("items", items),
        ],
    )
}

fn marklet_benchmark(c: &mut Criterion) {
    let settings = MarkupSettings {
        context_path: Some("/app".to_string()),
        ..MarkupSettings::deployment()
    };
    let parser = MarkupParser::new(settings.clone());
    let key = MarkupKey::new("Profile.html");
    let markup = parser.parse_bytes(key.clone(), PROFILE.as_bytes()).unwrap();

    let mut bundle = MessageBundle::new();
    bundle.insert(None, "heading", "User profile");
    let renderer = Renderer::with_resolvers(settings, ResolverRegistry::with_messages(Arc::new(bundle)));

    // Generate 100 random profiles
    let pages: Vec<Page> = utils::generate_random_profiles(100)
        .iter()
        .map(|profile| profile_page(&markup, profile))
        .collect();

    // Print binary size information
    utils::print_binary_size();

    let mut group = c.benchmark_group("Markup");
    group.sample_size(50);

    group.bench_function("marklet_parse", |b| {
        b.iter(|| black_box(parser.parse_bytes(key.clone(), PROFILE.as_bytes()).unwrap()));
    });

    group.bench_function("marklet_render", |b| {
        b.iter(|| {
            for page in &pages {
                black_box(renderer.render(page).unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, marklet_benchmark);
criterion_main!(benches);
