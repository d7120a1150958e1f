//! Choosing and rendering the representation of a bucket listing.

use crate::error::ServerResult;
use crate::listing::{escape_markup, render_html};

/// Listing formats the server can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Representation {
    Text,
    Json,
    Xml,
    Html,
}

impl Representation {
    /// Pick a representation from the raw `Accept` header.
    ///
    /// Matching is by prefix on the whole header. Anything unrecognized
    /// gets plain text rather than an empty response.
    pub fn from_accept(accept: Option<&str>) -> Self {
        let accept = accept.map(str::trim).unwrap_or_default();
        if accept.is_empty()
            || accept.starts_with("*/*")
            || accept.starts_with("text/*")
            || accept.starts_with("text/plain")
        {
            Self::Text
        } else if accept.starts_with("application/json") {
            Self::Json
        } else if accept.starts_with("application/xml") {
            Self::Xml
        } else if accept.starts_with("text/html") {
            Self::Html
        } else {
            Self::Text
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain; charset=utf-8",
            Self::Json => "application/json; charset=utf-8",
            Self::Xml => "application/xml; charset=utf-8",
            Self::Html => "text/html; charset=utf-8",
        }
    }

    /// Render `names`, the children of `base_path`, in this format.
    pub fn render(self, base_path: &str, names: &[String]) -> ServerResult<Vec<u8>> {
        Ok(match self {
            Self::Text => render_text(names).into_bytes(),
            Self::Json => {
                let mut body = serde_json::to_vec(names)?;
                body.push(b'\n');
                body
            }
            Self::Xml => render_xml(names).into_bytes(),
            Self::Html => render_html(base_path, names).into_bytes(),
        })
    }
}

fn render_text(names: &[String]) -> String {
    names.iter().map(|n| format!("{n}\n")).collect()
}

fn render_xml(names: &[String]) -> String {
    let mut doc = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<bucket>");
    if !names.is_empty() {
        doc.push('\n');
        for name in names {
            doc.push_str("  <key>");
            doc.push_str(&escape_markup(name));
            doc.push_str("</key>\n");
        }
    }
    doc.push_str("</bucket>");
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["bar".into(), "baz".into(), "foo".into()]
    }

    fn render(accept: Option<&str>) -> String {
        let repr = Representation::from_accept(accept);
        String::from_utf8(repr.render("/", &names()).unwrap()).unwrap()
    }

    #[test]
    fn text_variants() {
        for accept in [None, Some(""), Some("*/*"), Some("text/*"), Some("text/plain; q=1")] {
            assert_eq!(Representation::from_accept(accept), Representation::Text);
            assert_eq!(render(accept), "bar\nbaz\nfoo\n");
        }
    }

    #[test]
    fn json() {
        assert_eq!(render(Some("application/json")), "[\"bar\",\"baz\",\"foo\"]\n");
    }

    #[test]
    fn xml() {
        assert_eq!(
            render(Some("application/xml")),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<bucket>\n  <key>bar</key>\n  <key>baz</key>\n  <key>foo</key>\n</bucket>"
        );
        let empty = Representation::Xml.render("/", &[]).unwrap();
        assert_eq!(
            String::from_utf8(empty).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<bucket></bucket>"
        );
    }

    #[test]
    fn xml_escapes_names() {
        let body = Representation::Xml.render("/", &["a&b".into()]).unwrap();
        assert!(String::from_utf8(body).unwrap().contains("<key>a&amp;b</key>"));
    }

    #[test]
    fn html() {
        assert_eq!(
            Representation::from_accept(Some("text/html,application/xhtml+xml")),
            Representation::Html
        );
        assert!(render(Some("text/html")).contains("<a href=\"/bar\">bar</a>"));
    }

    #[test]
    fn unknown_accept_falls_back_to_text() {
        assert_eq!(
            Representation::from_accept(Some("image/png")),
            Representation::Text
        );
        assert_eq!(render(Some("image/png")), "bar\nbaz\nfoo\n");
    }

    #[test]
    fn empty_listing_has_empty_text_body() {
        assert!(Representation::Text.render("/", &[]).unwrap().is_empty());
        assert_eq!(Representation::Json.render("/", &[]).unwrap(), b"[]\n");
    }
}
