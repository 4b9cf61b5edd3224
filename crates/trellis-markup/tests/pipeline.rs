use std::sync::Arc;

use trellis_conf::MarkupSettings;
use trellis_markup::merge;
use trellis_markup::requires_base_markup;
use trellis_markup::ComponentTag;
use trellis_markup::Markup;
use trellis_markup::MarkupElement;
use trellis_markup::MarkupError;
use trellis_markup::MarkupParser;
use trellis_markup::MarkupStream;
use trellis_markup::RawMarkup;
use trellis_markup::SpecialRole;
use trellis_source::MarkupSource;
use trellis_source::SourceId;

fn parse(input: &str) -> Markup {
    MarkupParser::from_text(input, &MarkupSettings::default())
        .parse()
        .unwrap()
}

fn tag(markup: &Markup, index: usize) -> &ComponentTag {
    markup.get(index).and_then(MarkupElement::as_tag).unwrap()
}

#[test]
fn unclosed_void_tag_inside_bound_paragraph() {
    let markup = parse("<p wicket:id=\"p\">a<br wicket:id=\"br\">b</p>");

    let kinds: Vec<_> = markup
        .iter()
        .map(|element| match element {
            MarkupElement::Raw(raw) => format!("raw {}", raw.as_str()),
            MarkupElement::Tag(tag) => format!("tag {}", tag.qualified_name()),
        })
        .collect();
    assert_eq!(kinds, ["tag p", "raw a", "tag br", "raw b", "tag p"]);
    assert!(tag(&markup, 2).has_no_close_tag());
    assert!(tag(&markup, 4).closes(tag(&markup, 0)));
}

#[test]
fn text_transforms_from_settings() {
    let settings = MarkupSettings {
        strip_comments: true,
        compress_whitespace: true,
        ..MarkupSettings::default()
    };
    let markup = MarkupParser::from_text("  <!--x-->  <pre>  a  </pre>  ", &settings)
        .parse()
        .unwrap();
    assert_eq!(markup.to_string(), " <pre>  a  </pre> ");
}

#[test]
fn source_with_declared_encoding() {
    let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><p wicket:id=\"p\">caf\xe9</p>".to_vec();
    let source = MarkupSource::new(SourceId::Named("page.html".to_string()), bytes);
    let markup = MarkupParser::new(&source, &MarkupSettings::default())
        .unwrap()
        .parse()
        .unwrap();
    assert!(markup.to_string().contains("café"));
    assert_eq!(
        markup.resource().encoding.map(|encoding| encoding.name()),
        Some("ISO-8859-1")
    );
}

#[test]
fn derived_page_is_spliced_into_base() {
    let base = parse("<html><body><h1>Site</h1><wicket:child/><footer>f</footer></body></html>");
    let derived = parse("<html><body><wicket:extend><span wicket:id=\"body\">content</span></wicket:extend></body></html>");

    let index = requires_base_markup(&derived).unwrap();
    let merged = merge(&derived, &base, index, Some("Base.html".to_string())).unwrap();

    assert_eq!(
        merged.to_string(),
        "<html><head></head><body><h1>Site</h1><span wicket:id=\"body\">content</span><footer>f</footer></body></html>"
    );
    assert!(merged.find_role(SpecialRole::Child, 0).is_none());
    assert!(merged.find_role(SpecialRole::Extend, 0).is_none());
}

#[test]
fn documents_are_frozen() {
    let base = parse("<div><wicket:child/></div>");
    let derived = parse("<wicket:extend><b wicket:id=\"b\">x</b></wicket:extend>");
    let mut merged = merge(&derived, &base, 0, None).unwrap();

    assert!(matches!(
        merged.push(MarkupElement::Raw(RawMarkup::new("x"))),
        Err(MarkupError::Immutable)
    ));
    let id = tag(&merged, 1).id();
    assert!(matches!(merged.tag_mut(id), Err(MarkupError::Immutable)));

    let mut copy = tag(&derived, 1).clone();
    assert!(matches!(copy.set_attribute("class", "x"), Err(MarkupError::Immutable)));
    assert!(copy.mutable().set_attribute("class", "x").is_ok());
}

#[test]
fn cursors_compare_structure() {
    let a = MarkupStream::new(Arc::new(parse("<b wicket:id=\"b\">x</b>")));
    let b = MarkupStream::new(Arc::new(parse("<b   wicket:id='b'>x</b>")));
    assert!(a.equal_to(&b));

    let mut c = b.clone();
    c.skip_component().unwrap();
    assert!(!c.has_more());
    assert!(!a.equal_to(&c));
}
