use std::sync::Arc;

use trellis_conf::MarkupSettings;
use trellis_source::MarkupSource;

use crate::element::MarkupElement;
use crate::element::RawMarkup;
use crate::error::MarkupError;
use crate::filters::FilterChain;
use crate::filters::FilterRole;
use crate::filters::MarkupFilter;
use crate::markup::Markup;
use crate::markup::MarkupResource;
use crate::tag::ComponentTag;
use crate::text::compress_whitespace;
use crate::text::strip_comments;
use crate::tokenizer::XmlPullParser;

/// Turns one markup source into a frozen [`Markup`].
///
/// Tags come out of the filter chain; text between accepted tags is kept as
/// raw markup. A parser is single use.
pub struct MarkupParser {
    tokenizer: XmlPullParser,
    chain: FilterChain,
    settings: MarkupSettings,
    resource: MarkupResource,
}

impl MarkupParser {
    /// Parser for a source, decoded with the settings' default encoding
    /// unless the source declares its own.
    pub fn new(source: &MarkupSource, settings: &MarkupSettings) -> Result<Self, MarkupError> {
        let tokenizer = XmlPullParser::from_source(source, settings.encoding())?;
        let mut resource = MarkupResource::new(settings.namespace.clone());
        resource.source = Some(source.id().clone());
        Ok(Self::with_tokenizer(tokenizer, settings, resource))
    }

    #[must_use]
    pub fn from_text(text: impl Into<String>, settings: &MarkupSettings) -> Self {
        let resource = MarkupResource::new(settings.namespace.clone());
        Self::with_tokenizer(XmlPullParser::new(text), settings, resource)
    }

    fn with_tokenizer(
        tokenizer: XmlPullParser,
        settings: &MarkupSettings,
        resource: MarkupResource,
    ) -> Self {
        Self {
            tokenizer,
            chain: FilterChain::with_defaults(settings),
            settings: settings.clone(),
            resource,
        }
    }

    #[must_use]
    pub fn with_view_class(mut self, view_class: impl Into<String>) -> Self {
        self.resource.view_class = Some(view_class.into());
        self
    }

    #[must_use]
    pub fn with_cache_key(mut self, cache_key: Option<String>) -> Self {
        self.resource.cache_key = cache_key;
        self
    }

    pub fn filters_mut(&mut self) -> &mut FilterChain {
        &mut self.chain
    }

    /// Insert a filter in front of `anchor`, see [`FilterChain::insert_before`].
    pub fn add_filter(&mut self, filter: Box<dyn MarkupFilter>, anchor: Option<FilterRole>) {
        self.chain.insert_before(filter, anchor);
    }

    /// Assemble the whole input.
    ///
    /// Any error is returned as [`MarkupError::ParseFailure`] carrying the
    /// document assembled so far, with the unparsed rest as raw text.
    pub fn parse(mut self) -> Result<Markup, MarkupError> {
        let mut markup = Markup::new(self.resource.clone());

        match self.assemble(&mut markup) {
            Ok(()) => {
                markup.freeze();
                tracing::debug!(
                    source = ?markup.resource().source,
                    elements = markup.len(),
                    "Assembled markup"
                );
                Ok(markup)
            }
            Err(error) => {
                let rest = self.tokenizer.input_from_marker(None);
                if !rest.is_empty() {
                    if let Err(err) = markup.push(RawMarkup::new(rest).into()) {
                        tracing::debug!(error = %err, "Could not keep unparsed text");
                    }
                }
                markup.freeze();
                let position = self.tokenizer.position();
                tracing::debug!(position, error = %error, "Markup parse failed");
                Err(MarkupError::ParseFailure {
                    error: Box::new(error),
                    position,
                    partial: Arc::new(markup),
                })
            }
        }
    }

    fn assemble(&mut self, markup: &mut Markup) -> Result<(), MarkupError> {
        loop {
            let size = markup.len();
            let Some(tag) = self.chain.next_tag(&mut self.tokenizer, markup)? else {
                break;
            };

            let add = tag.is_bound() || closes_accepted(&tag, markup);
            if add || tag.is_modified() || markup.len() != size {
                let start = tag.span().start_usize();
                let text = self.tokenizer.input_from_marker(Some(start)).to_string();
                self.insert_text(markup, size, &text)?;
                self.tokenizer.mark_current();

                if add {
                    if !tag.is_ignored() {
                        markup.push(tag.into())?;
                    }
                } else if tag.is_modified() {
                    markup.push(RawMarkup::new(tag.to_string()).into())?;
                } else {
                    self.tokenizer.set_position_marker(start);
                }
            }
        }

        let tail = self.tokenizer.input_from_marker(None).to_string();
        let end = markup.len();
        self.insert_text(markup, end, &tail)?;
        self.tokenizer.mark_current();

        self.chain.post_process(markup)?;

        let encoding = self.tokenizer.encoding();
        let xml_declaration = self.tokenizer.xml_declaration().map(str::to_string);
        let doctype = self.tokenizer.doctype().map(str::to_string);
        if xml_declaration.is_none() {
            if self.settings.require_xml_declaration {
                return Err(MarkupError::InvalidMarkup {
                    span: None,
                    message: "Markup must start with an <?xml ...?> declaration".to_string(),
                });
            }
            tracing::debug!(source = ?self.resource.source, "Markup has no XML declaration");
        }

        let resource = markup.resource_mut()?;
        resource.encoding = Some(encoding);
        resource.xml_declaration = xml_declaration;
        resource.doctype = doctype;
        Ok(())
    }

    fn insert_text(&self, markup: &mut Markup, at: usize, text: &str) -> Result<(), MarkupError> {
        let mut text = if self.settings.strip_comments {
            strip_comments(text).into_owned()
        } else {
            text.to_string()
        };
        if self.settings.compress_whitespace {
            text = compress_whitespace(&text);
        }
        if text.is_empty() {
            return Ok(());
        }
        markup.insert(at, MarkupElement::Raw(RawMarkup::new(text)))
    }
}

/// A close tag whose open tag made it into the document.
fn closes_accepted(tag: &ComponentTag, markup: &Markup) -> bool {
    tag.is_close()
        && tag
            .open_tag()
            .is_some_and(|open| markup.contains_tag(open))
}
