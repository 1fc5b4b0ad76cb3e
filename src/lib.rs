mod assembler;
mod cache;
mod component;
mod encoding;
mod error;
mod factory;
mod filter;
pub mod filters;
mod inheritance;
mod locator;
mod markup;
mod matcher;
mod paging;
mod parser;
mod render;
mod resolver;
mod settings;
mod tag;
mod tokenizer;

// Public exports.
pub use assembler::{FragmentAssembler, compress_whitespace};
pub use cache::{CacheEntry, MarkupCache, MarkupStore};
pub use component::{Component, ComponentKind, Page};
pub use encoding::{DecodedSource, READ_AHEAD_LIMIT, decode};
pub use error::{MarkletError, MarkletResult, ParseError, ParseErrorKind};
pub use factory::MarkupFactory;
pub use filter::{ElementSource, FilterChain, FilterFactory, FilterResult, MarkupFilter, ParseContext};
pub use inheritance::merge_inherited;
pub use locator::{DirectoryLocator, MemoryLocator, ResourceLocator, candidate_names};
pub use markup::{ElementKind, Markup, MarkupBuilder, MarkupElement, MarkupFragment, MarkupKey};
pub use matcher::{MatchReport, MatchState};
pub use paging::{PageWindow, Pager};
pub use parser::MarkupParser;
pub use render::Renderer;
pub use resolver::{
    AutoLinkResolver, ComponentResolver, EnclosureResolver, MessageBundle, MessageResolver,
    MessageSource, Resolution, ResolveContext, ResolverRegistry, TransparentResolver,
};
pub use settings::MarkupSettings;
pub use tag::{Position, Tag, TagKind, TagOrigin, escape_markup, unescape_markup};
pub use tokenizer::Tokenizer;
