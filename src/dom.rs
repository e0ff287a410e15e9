//! Mutable HTML document tree.
//!
//! Pages are parsed with `scraper` (html5ever) and copied into a tree the
//! crate owns, so text nodes can be split and translation markers inserted in
//! place. The tree serializes back to HTML.

use ego_tree::{NodeId, NodeMut, NodeRef, Tree};
use scraper::Html;

/// Elements without end tags
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose text is written out without escaping
pub const RAW_TEXT_ELEMENTS: [&str; 8] = [
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript", "plaintext",
];

/// Elements holding escaped text but never child elements
pub const ESCAPABLE_RAW_TEXT_ELEMENTS: [&str; 2] = ["textarea", "title"];

/// Elements whose first newline is swallowed by the parser
const LEADING_NEWLINE_ELEMENTS: [&str; 3] = ["pre", "textarea", "listing"];

/// Whether the element can only contain text, so markup put inside it
/// would be shown to the reader as source
pub fn is_text_only_element(name: &str) -> bool {
    RAW_TEXT_ELEMENTS.iter()
        .chain(ESCAPABLE_RAW_TEXT_ELEMENTS.iter())
        .any(|tag| tag.eq_ignore_ascii_case(name))
}

pub const ATTR_ORIGINAL: &str = "data-en";
pub const ATTR_TRANSLATION: &str = "data-jp";
pub const ATTR_TITLE: &str = "title";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub name: String,
    pub attrs: Vec<(String, String)>,
}

impl ElementData {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomNode {
    Document,
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
    Comment(String),
    Text(String),
    Element(ElementData),
}

/// A translation marker as currently present in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationMarker {
    pub id: NodeId,
    pub original: String,
    pub translation: String,
    pub showing_translation: bool,
}

pub struct Document {
    tree: Tree<DomNode>,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut tree = Tree::new(DomNode::Document);
        {
            let mut root = tree.root_mut();
            for child in parsed.tree.root().children() {
                copy_node(child, &mut root);
            }
        }
        Self { tree }
    }

    pub fn tree(&self) -> &Tree<DomNode> {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree<DomNode> {
        &mut self.tree
    }

    /// The `<body>` element, if the page has one
    pub fn body(&self) -> Option<NodeRef<'_, DomNode>> {
        self.tree.root().descendants().find(|node| {
            matches!(node.value(), DomNode::Element(el) if el.name == "body")
        })
    }

    /// Concatenated text below `<body>`
    pub fn body_text(&self) -> String {
        let mut text = String::new();
        if let Some(body) = self.body() {
            for node in body.descendants() {
                if let DomNode::Text(t) = node.value() {
                    text.push_str(t);
                }
            }
        }
        text
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in self.tree.root().children() {
            write_node(&mut out, child, false);
        }
        out
    }

    /// All markers carrying the given class, in document order
    pub fn markers(&self, marker_class: &str) -> Vec<TranslationMarker> {
        self.tree.root()
            .descendants()
            .filter_map(|node| marker_from_node(node, marker_class))
            .collect()
    }

    /// Swap the displayed text of a marker with the alternate kept in its
    /// title. Returns the marker's new state, or `None` if `id` is not a marker.
    pub fn toggle_marker(&mut self, id: NodeId, marker_class: &str) -> Option<TranslationMarker> {
        let node = self.tree.get(id)?;
        let current = marker_from_node(node, marker_class)?;
        let displayed = node_text(node);

        let mut node = self.tree.get_mut(id)?;
        let alternate = match node.value() {
            DomNode::Element(el) => {
                let alternate = el.attr(ATTR_TITLE).unwrap_or_default().to_string();
                el.set_attr(ATTR_TITLE, &displayed);
                alternate
            }
            _ => return None,
        };

        let children: Vec<NodeId> = self.tree.get(id)?.children().map(|c| c.id()).collect();
        for child in children {
            if let Some(mut child) = self.tree.get_mut(child) {
                child.detach();
            }
        }
        self.tree.get_mut(id)?.append(DomNode::Text(alternate.clone()));

        Some(TranslationMarker {
            showing_translation: alternate == current.translation,
            ..current
        })
    }
}

fn copy_node(src: NodeRef<'_, scraper::Node>, dst: &mut NodeMut<'_, DomNode>) {
    let value = match src.value() {
        scraper::Node::Doctype(doctype) => DomNode::Doctype {
            name: doctype.name().to_string(),
            public_id: doctype.public_id().to_string(),
            system_id: doctype.system_id().to_string(),
        },
        scraper::Node::Comment(comment) => DomNode::Comment(comment.to_string()),
        scraper::Node::Text(text) => DomNode::Text(text.to_string()),
        scraper::Node::Element(el) => DomNode::Element(ElementData {
            name: el.name().to_string(),
            attrs: el.attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }),
        // documents, fragments, processing instructions
        _ => return,
    };

    let mut copied = dst.append(value);
    for child in src.children() {
        copy_node(child, &mut copied);
    }
}

fn node_text(node: NodeRef<'_, DomNode>) -> String {
    node.descendants()
        .filter_map(|n| match n.value() {
            DomNode::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect()
}

fn marker_from_node(node: NodeRef<'_, DomNode>, marker_class: &str) -> Option<TranslationMarker> {
    let DomNode::Element(el) = node.value() else {
        return None;
    };
    if !el.has_class(marker_class) {
        return None;
    }

    let original = el.attr(ATTR_ORIGINAL)?.to_string();
    let translation = el.attr(ATTR_TRANSLATION)?.to_string();
    Some(TranslationMarker {
        id: node.id(),
        showing_translation: node_text(node) == translation,
        original,
        translation,
    })
}

fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn write_node(out: &mut String, node: NodeRef<'_, DomNode>, raw_text: bool) {
    match node.value() {
        DomNode::Document => {
            for child in node.children() {
                write_node(out, child, false);
            }
        }
        DomNode::Doctype { name, public_id, system_id } => {
            out.push_str("<!DOCTYPE ");
            out.push_str(name);
            if !public_id.is_empty() {
                out.push_str(" PUBLIC \"");
                out.push_str(public_id);
                out.push('"');
                if !system_id.is_empty() {
                    out.push_str(" \"");
                    out.push_str(system_id);
                    out.push('"');
                }
            } else if !system_id.is_empty() {
                out.push_str(" SYSTEM \"");
                out.push_str(system_id);
                out.push('"');
            }
            out.push('>');
        }
        DomNode::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        DomNode::Text(text) => {
            if raw_text {
                out.push_str(text);
            } else {
                escape_text(out, text);
            }
        }
        DomNode::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for (name, value) in &el.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_attr(out, value);
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&el.name.as_str()) {
                return;
            }

            if LEADING_NEWLINE_ELEMENTS.contains(&el.name.as_str()) {
                if let Some(DomNode::Text(text)) = node.first_child().map(|c| c.value()) {
                    if text.starts_with('\n') {
                        out.push('\n');
                    }
                }
            }

            let raw = RAW_TEXT_ELEMENTS.contains(&el.name.as_str());
            for child in node.children() {
                write_node(out, child, raw);
            }

            out.push_str("</");
            out.push_str(&el.name);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_serialize() {
        let doc = Document::parse(
            "<!DOCTYPE html><html><head><title>T</title></head>\
             <body><p class=\"x\">a &amp; b<br>c</p><!-- note --></body></html>",
        );
        let html = doc.to_html();
        assert!(html.starts_with("<!DOCTYPE html><html>"));
        assert!(html.contains("<p class=\"x\">a &amp; b<br>c</p>"));
        assert!(html.contains("<!-- note -->"));
        assert_eq!(doc.body_text(), "a & bc");
    }

    #[test]
    fn test_script_text_is_not_escaped() {
        let doc = Document::parse("<html><body><script>if (a < b && c) {}</script></body></html>");
        assert!(doc.to_html().contains("<script>if (a < b && c) {}</script>"));
    }

    #[test]
    fn test_attribute_escaping() {
        let doc = Document::parse(r#"<body><a title='say "hi" & go'>x</a></body>"#);
        assert!(doc.to_html().contains(r#"<a title="say &quot;hi&quot; &amp; go">x</a>"#));
    }

    #[test]
    fn test_leading_newline_survives_round_trip() {
        let source = "<html><head></head><body><pre>\n\ncode</pre><textarea>\n\nx</textarea>\
                      <listing>\n\nl</listing><pre>plain</pre></body></html>";
        let html = Document::parse(source).to_html();
        assert_eq!(html, source);
        assert_eq!(Document::parse(&html).to_html(), source);
    }

    #[test]
    fn test_legacy_doctype_is_kept() {
        let doc = Document::parse(
            "<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\" \
             \"http://www.w3.org/TR/html4/loose.dtd\"><html><body><p>x</p></body></html>",
        );
        assert!(doc.to_html().starts_with(
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\" \
             \"http://www.w3.org/TR/html4/loose.dtd\"><html>"
        ));

        let doc = Document::parse("<!DOCTYPE html SYSTEM \"about:legacy-compat\"><p>x</p>");
        assert!(doc.to_html().starts_with("<!DOCTYPE html SYSTEM \"about:legacy-compat\"><html>"));
    }

    #[test]
    fn test_text_only_elements() {
        for tag in ["script", "STYLE", "xmp", "iframe", "textarea", "title", "plaintext"] {
            assert!(is_text_only_element(tag), "{}", tag);
        }
        assert!(!is_text_only_element("pre"));
        assert!(!is_text_only_element("p"));
    }

    #[test]
    fn test_toggle_marker() {
        let mut doc = Document::parse(
            r#"<body><p><span class="wanikanified" title="fire" data-en="fire" data-jp="火">火</span></p></body>"#,
        );
        let markers = doc.markers("wanikanified");
        assert_eq!(markers.len(), 1);
        assert!(markers[0].showing_translation);

        let toggled = doc.toggle_marker(markers[0].id, "wanikanified").unwrap();
        assert!(!toggled.showing_translation);
        assert_eq!(doc.body_text(), "fire");
        assert!(doc.to_html().contains(r#"title="火""#));

        let back = doc.toggle_marker(markers[0].id, "wanikanified").unwrap();
        assert!(back.showing_translation);
        assert_eq!(doc.body_text(), "火");
        assert_eq!(back.original, "fire");
        assert_eq!(back.translation, "火");
    }

    #[test]
    fn test_toggle_ignores_plain_elements() {
        let mut doc = Document::parse("<body><p>fire</p></body>");
        let p = doc.tree().root().descendants()
            .find(|n| matches!(n.value(), DomNode::Element(el) if el.name == "p"))
            .unwrap()
            .id();
        assert!(doc.toggle_marker(p, "wanikanified").is_none());
        assert_eq!(doc.body_text(), "fire");
    }
}
