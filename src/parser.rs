use tracing::debug;

use crate::{
    assembler::FragmentAssembler,
    encoding::{self, split_xml_declaration},
    error::{MarkletError, MarkletResult},
    filter::{ElementSource, FilterChain, ParseContext, Pipeline},
    markup::{Markup, MarkupBuilder, MarkupKey},
    settings::MarkupSettings,
    tokenizer::Tokenizer,
};

/// Turns template sources into sealed [`Markup`].
///
/// Each call runs a fresh instance of every configured filter, so one parser
/// can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct MarkupParser {
    settings: MarkupSettings,
    filters: FilterChain,
}

impl MarkupParser {
    /// A parser running the standard filter chain.
    pub fn new(settings: MarkupSettings) -> Self {
        Self {
            settings,
            filters: FilterChain::standard(),
        }
    }

    pub const fn with_filters(settings: MarkupSettings, filters: FilterChain) -> Self {
        Self { settings, filters }
    }

    pub const fn settings(&self) -> &MarkupSettings {
        &self.settings
    }

    pub const fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterChain {
        &mut self.filters
    }

    /// Decodes and parses a raw template.
    ///
    /// # Errors
    /// - [`MarkletError::Encoding`] if the declared encoding is not supported.
    /// - [`MarkletError::Parse`] for malformed or unbalanced markup.
    pub fn parse_bytes(&self, key: MarkupKey, bytes: &[u8]) -> MarkletResult<Markup> {
        let key_name = key.to_string();
        let decoded = encoding::decode(bytes, &self.settings.default_encoding, &key_name)?;
        self.assemble(key, &decoded.text, Some(decoded.encoding), decoded.xml_declaration)
    }

    /// Parses already decoded template text.
    pub fn parse_str(&self, key: MarkupKey, text: &str) -> MarkletResult<Markup> {
        let (declaration, body) = split_xml_declaration(text);
        self.assemble(key, body, None, declaration.map(str::to_string))
    }

    fn assemble(
        &self,
        key: MarkupKey,
        text: &str,
        encoding: Option<String>,
        xml_declaration: Option<String>,
    ) -> MarkletResult<Markup> {
        let key_name = key.to_string();
        if xml_declaration.is_none() {
            if self.settings.throw_on_missing_xml_declaration {
                return Err(MarkletError::Markup {
                    key: key_name,
                    position: None,
                    message: "The markup must start with an XML declaration".to_string(),
                });
            }
            debug!(key = %key_name, "markup has no XML declaration");
        }

        let mut builder = MarkupBuilder::new(key);
        builder.set_namespace(self.settings.namespace.as_str());
        builder.set_encoding(encoding);
        builder.set_xml_declaration(xml_declaration);
        let mut assembler = FragmentAssembler::new(builder, &self.settings);

        let mut ctx = ParseContext::new(&self.settings);
        let mut filters = self.filters.instantiate(&self.settings);
        let mut tokenizer = Tokenizer::new(text);
        {
            let mut pipeline = Pipeline::new(&mut tokenizer, &mut filters);
            while let Some(element) = pipeline
                .next_element(&mut ctx)
                .map_err(|error| MarkletError::parse(&key_name, error))?
            {
                assembler.accept(element)?;
            }
        }
        for filter in &mut filters {
            filter
                .post_process(&mut ctx)
                .map_err(|error| MarkletError::parse(&key_name, error))?;
        }

        assembler.set_doctype(tokenizer.doctype().map(str::to_string));
        assembler.set_namespace(&ctx.namespace);
        let markup = assembler.finish()?;
        debug!(key = %key_name, elements = markup.len(), namespace = %ctx.namespace, "markup parsed");
        Ok(markup)
    }
}
