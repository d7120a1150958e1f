//! HTML page for bucket listings.

use std::fmt::Write;

/// Escape text for use in HTML or XML content and attributes.
pub(crate) fn escape_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// `base` and `name` joined with exactly one slash.
pub fn join_path(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

/// Render the listing of `base_path` with one link per name.
pub fn render_html(base_path: &str, names: &[String]) -> String {
    let title = escape_markup(base_path);
    let mut page = String::new();
    page.push_str("<html>\n\t<head>\n\t\t<meta charset=\"UTF-8\">\n");
    page.push_str(
        "\t\t<style>\n\t\t.body {\n\t\t\tpadding: 10px;\n\t\t\tfont-family: sans-serif;\n\t\t}\n\
         \t\th3 {\n\t\t\tfont-weight: normal;\n\t\t}\n\
         \t\t.item {\n\t\t\tlist-style: none;\n\t\t\tpadding: 2px;\n\t\t}\n\t\t</style>\n",
    );
    let _ = writeln!(page, "\t\t<title>{title}</title>");
    page.push_str("\t</head>\n\t<body>\n\t\t<div class=\"body\">\n");
    let _ = writeln!(page, "\t\t\t<div class=\"title\"><h3>{title}</h3></div>");
    if names.is_empty() {
        page.push_str("\t\t\t\t<div class=\"info\"><h3>Empty bucket.</h3></div>\n");
    } else {
        page.push_str("\t\t\t<ul>\n");
        for name in names {
            let _ = writeln!(
                page,
                "\t\t\t\t<div class=\"item\">\n\t\t\t\t\t<li><a href=\"{}\">{}</a></li>\n\t\t\t\t</div>",
                escape_markup(&join_path(base_path, name)),
                escape_markup(name),
            );
        }
        page.push_str("\t\t\t</ul>\n");
    }
    page.push_str("\t\t</div>\n\t</body>\n</html>");
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_root_and_nested() {
        assert_eq!(join_path("/", "foo"), "/foo");
        assert_eq!(join_path("/a/b", "c"), "/a/b/c");
        assert_eq!(join_path("/a/b/", "c"), "/a/b/c");
    }

    #[test]
    fn links_every_name() {
        let page = render_html("/foo", &["bar".to_string(), "baz".to_string()]);
        assert!(page.contains("<title>/foo</title>"));
        assert!(page.contains(r#"<a href="/foo/bar">bar</a>"#));
        assert!(page.contains(r#"<a href="/foo/baz">baz</a>"#));
        assert!(!page.contains("Empty bucket."));
    }

    #[test]
    fn empty_bucket_message() {
        let page = render_html("/", &[]);
        assert!(page.contains("Empty bucket."));
        assert!(!page.contains("<ul>"));
    }

    #[test]
    fn names_are_escaped() {
        let page = render_html("/", &["<b>&\"".to_string()]);
        assert!(page.contains("&lt;b&gt;&amp;&#34;"));
        assert!(!page.contains("<b>"));
    }
}
