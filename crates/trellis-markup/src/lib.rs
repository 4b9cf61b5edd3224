//! Markup acquisition: tokenizing, filtering, assembling and merging view
//! markup into immutable documents.
//!
//! ## Architecture
//!
//! 1. **Tokenizing**: [`XmlPullParser`] pulls [`ComponentTag`]s out of the
//!    decoded source, skipping comments, CDATA and script/style bodies
//! 2. **Filtering**: a [`FilterChain`] annotates tags on their way out:
//!    bindings, special roles, close tag pairing, link regions and so on
//! 3. **Assembling**: [`MarkupParser`] keeps accepted tags and turns the text
//!    between them into [`RawMarkup`], then freezes the [`Markup`]
//! 4. **Inheritance**: [`merge::merge`] splices a derived document's
//!    `<wicket:extend>` body into its base's `<wicket:child>` placeholder
//!
//! Frozen documents are shared as `Arc<Markup>` and read through a
//! [`MarkupStream`] cursor.
//!
//! ## Example
//!
//! ```ignore
//! use trellis_conf::MarkupSettings;
//! use trellis_markup::MarkupParser;
//!
//! let markup = MarkupParser::from_text("<p wicket:id=\"p\">x</p>", &MarkupSettings::default())
//!     .parse()?;
//! assert!(markup.is_immutable());
//! ```

mod element;
mod error;
pub mod filters;
mod markup;
pub mod merge;
mod parser;
mod stream;
mod tag;
pub mod text;
mod tokenizer;

pub use element::MarkupElement;
pub use element::RawMarkup;
pub use error::MarkupError;
pub use filters::FilterChain;
pub use filters::FilterRole;
pub use filters::MarkupFilter;
pub use filters::Upstream;
pub use markup::Markup;
pub use markup::MarkupResource;
pub use merge::merge;
pub use merge::requires_base_markup;
pub use parser::MarkupParser;
pub use stream::MarkupStream;
pub use tag::ComponentTag;
pub use tag::SpecialRole;
pub use tag::TagId;
pub use tag::TagKind;
pub use tokenizer::TagSource;
pub use tokenizer::XmlPullParser;
