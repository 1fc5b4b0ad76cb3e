use tracing::debug;

use crate::{
    assembler::FragmentAssembler,
    error::{MarkletError, MarkletResult},
    markup::{Markup, MarkupBuilder, MarkupElement, MarkupFragment},
    settings::MarkupSettings,
    tag::{TagKind, TagOrigin},
};

fn structure_error(markup: &Markup, message: String) -> MarkletError {
    MarkletError::Markup {
        key: markup.key().to_string(),
        position: None,
        message,
    }
}

/// Whether the `<ns:child>` opened at `index` already holds the extension of
/// an earlier merge.
fn is_filled_child(base: &Markup, index: usize) -> bool {
    let Some(close) = base.close_index(index) else {
        return false;
    };
    (index + 1..close).any(|inner| {
        base.tag(inner)
            .is_some_and(|tag| !tag.is_close() && tag.is_namespace_tag_named("extend"))
    })
}

/// Merges `derived` into `base`.
///
/// The body of `<ns:extend>` in `derived` replaces `<ns:child/>` in `base`,
/// and the `<ns:head>` sections of `derived` are placed before the closing
/// `</head>` of `base` (or at the very start if it has none). Everything
/// else in `derived` is dropped. The result is keyed as `derived` and
/// records `base` as its base.
///
/// `base` may itself be merged markup. Child tags filled by an earlier merge
/// are kept as they are, so hierarchies of any depth merge level by level.
///
/// # Errors
/// [`MarkletError::Markup`] unless `base` has exactly one `<ns:child>`
/// and `derived` has an `<ns:extend>`.
pub fn merge_inherited(
    base: &Markup,
    derived: &Markup,
    settings: &MarkupSettings,
) -> MarkletResult<Markup> {
    let children: Vec<usize> = base
        .elements()
        .iter()
        .enumerate()
        .filter(|(index, element)| {
            element
                .as_tag()
                .is_some_and(|tag| !tag.is_close() && tag.is_namespace_tag_named("child"))
                && !is_filled_child(base, *index)
        })
        .map(|(index, _)| index)
        .collect();
    let [child] = children.as_slice() else {
        return Err(structure_error(
            base,
            format!(
                "Expected exactly one <{}:child> in base markup, found {}",
                base.namespace(),
                children.len()
            ),
        ));
    };
    let child = *child;

    let Some(extend) = derived.root_fragment().namespace_fragment("extend") else {
        return Err(structure_error(
            derived,
            format!(
                "Expected to find <{}:extend> in markup extending {}",
                derived.namespace(),
                base.key()
            ),
        ));
    };

    let heads: Vec<MarkupFragment> = derived
        .elements()
        .iter()
        .enumerate()
        .filter(|(index, element)| {
            (*index < extend.start() || *index >= extend.end())
                && element
                    .as_tag()
                    .is_some_and(|tag| !tag.is_close() && tag.is_namespace_tag_named("head"))
        })
        .map(|(index, _)| derived.element_fragment(index))
        .collect();
    let head_close = base
        .elements()
        .iter()
        .position(|element| {
            element.as_tag().is_some_and(|tag| {
                tag.is_close() && !tag.is_namespace_tag() && tag.name().eq_ignore_ascii_case("head")
            })
        })
        .unwrap_or(0);

    let mut builder = MarkupBuilder::new(derived.key().clone());
    builder.set_namespace(base.namespace());
    builder.set_encoding(derived.encoding().or(base.encoding()).map(str::to_string));
    builder.set_xml_declaration(base.xml_declaration().map(str::to_string));
    builder.set_doctype(base.doctype().map(str::to_string));
    builder.set_base(Some(base.key().clone()));
    let mut assembler = FragmentAssembler::new(builder, settings);

    let child_end = base.element_end(child);
    for (index, element) in base.elements().iter().enumerate() {
        if index == head_close {
            for head in &heads {
                for element in head.elements() {
                    assembler.accept(element.clone())?;
                }
            }
        }

        if index == child {
            let Some(tag) = element.as_tag() else {
                continue;
            };
            let mut open = tag.clone();
            open.set_kind(TagKind::Open);
            let close = base
                .close_index(child)
                .and_then(|close| base.tag(close))
                .cloned()
                .unwrap_or_else(|| tag.closing(TagOrigin::Injected));

            assembler.accept(MarkupElement::Tag(open))?;
            for element in extend.elements() {
                assembler.accept(element.clone())?;
            }
            assembler.accept(MarkupElement::Tag(close))?;
        } else if index < child || index >= child_end {
            assembler.accept(element.clone())?;
        }
    }

    let merged = assembler.finish()?;
    debug!(
        key = %merged.key(),
        base = %base.key(),
        elements = merged.len(),
        "markup merged"
    );
    Ok(merged)
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

    #[test]
    #[ntest::timeout(100)]
    fn test_extend_replaces_child() {
        let base = parse(
            "Base.html",
            "<html><head><title>T</title></head><body><h1>Site</h1><wicket:child/></body></html>",
        );
        let derived = parse(
            "Derived.html",
            concat!(
                "<html><head><wicket:head><meta name=\"x\"></wicket:head></head>",
                "<body>preview<wicket:extend><p>Derived</p></wicket:extend></body></html>"
            ),
        );

        let merged = merge_inherited(&base, &derived, &MarkupSettings::default()).unwrap();
        assert_eq!(
            merged.render_to_string(None),
            concat!(
                "<html><head><title>T</title><wicket:head><meta name=\"x\"></wicket:head></head>",
                "<body><h1>Site</h1><wicket:child><wicket:extend><p>Derived</p></wicket:extend>",
                "</wicket:child></body></html>"
            )
        );
        assert_eq!(merged.key(), derived.key());
        assert_eq!(merged.base_key(), Some(base.key()));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_child_and_extend_are_required() {
        let settings = MarkupSettings::default();
        let plain = parse("Plain.html", "<p>x</p>");
        let derived = parse("Derived.html", "<wicket:extend>x</wicket:extend>");
        let err = merge_inherited(&plain, &derived, &settings).unwrap_err();
        assert!(err.to_string().contains("exactly one <wicket:child>"));

        let base = parse("Base.html", "<wicket:child></wicket:child>");
        let err = merge_inherited(&base, &plain, &settings).unwrap_err();
        assert!(err.to_string().contains("<wicket:extend>"));

        let twice = parse("Twice.html", "<wicket:child/><wicket:child/>");
        assert!(merge_inherited(&twice, &derived, &settings).is_err());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_merged_markup_can_be_extended_again() {
        let settings = MarkupSettings::default();
        let site = parse("Site.html", "<body><h1>Site</h1><wicket:child/></body>");
        let section = parse(
            "Section.html",
            "<wicket:extend><h2>Section</h2><wicket:child/></wicket:extend>",
        );
        let article = parse("Article.html", "<wicket:extend><p>Article</p></wicket:extend>");

        let section = merge_inherited(&site, &section, &settings).unwrap();
        let article = merge_inherited(&section, &article, &settings).unwrap();
        assert_eq!(
            article.render_to_string(None),
            concat!(
                "<body><h1>Site</h1><wicket:child><wicket:extend><h2>Section</h2>",
                "<wicket:child><wicket:extend><p>Article</p></wicket:extend></wicket:child>",
                "</wicket:extend></wicket:child></body>"
            )
        );
        assert_eq!(article.base_key(), Some(section.key()));

        // A leaf of the hierarchy has no open slot left.
        let more = parse("More.html", "<wicket:extend>x</wicket:extend>");
        let err = merge_inherited(&article, &more, &settings).unwrap_err();
        assert!(err.to_string().contains("found 0"), "{err}");
    }
}
