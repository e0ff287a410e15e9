//! Rewrites document text, replacing known vocabulary with translation markers.
//!
//! Each eligible text node is cut into segments. Passes run from the longest
//! phrase length down to single tokens, and every pass only looks at the
//! segments that are still literal text, so a span replaced by a longer
//! phrase is never split again. Phrases spread across several text nodes
//! (e.g. `to <b>go</b>`) are not matched.

use ego_tree::{NodeId, NodeRef};
use tracing::{debug, info};

use crate::config::SubstitutionConfig;
use crate::dom::{
    is_text_only_element, Document, DomNode, ElementData, ATTR_ORIGINAL, ATTR_TITLE,
    ATTR_TRANSLATION,
};
use crate::vocab::VocabMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Translated { original: String, translation: String },
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte ranges of the whitespace-separated tokens of `text`
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Byte range of a window of tokens, with punctuation trimmed off both ends
fn phrase_bounds(text: &str, window: &[(usize, usize)]) -> Option<(usize, usize)> {
    let &(first_start, first_end) = window.first()?;
    let &(last_start, last_end) = window.last()?;

    let (lead, _) = text[first_start..first_end]
        .char_indices()
        .find(|&(_, c)| is_word_char(c))?;
    let (trail, c) = text[last_start..last_end]
        .char_indices()
        .rev()
        .find(|&(_, c)| is_word_char(c))?;

    let start = first_start + lead;
    let end = last_start + trail + c.len_utf8();
    (start < end).then_some((start, end))
}

/// Replace every hit of exactly `n` tokens inside one literal, left to right
fn split_literal(text: &str, n: usize, map: &VocabMap) -> Vec<Segment> {
    let tokens = token_spans(text);
    let mut segments = Vec::new();
    let mut cursor = 0;
    let mut i = 0;

    while i + n <= tokens.len() {
        if let Some((start, end)) = phrase_bounds(text, &tokens[i..i + n]) {
            let surface = &text[start..end];
            if let Some(translation) = map.lookup(surface) {
                if start > cursor {
                    segments.push(Segment::Literal(text[cursor..start].to_string()));
                }
                segments.push(Segment::Translated {
                    original: surface.to_string(),
                    translation: translation.to_string(),
                });
                cursor = end;
                i += n;
                continue;
            }
        }
        i += 1;
    }

    if cursor < text.len() {
        segments.push(Segment::Literal(text[cursor..].to_string()));
    }
    segments
}

/// Cut `text` into literal and translated segments, longest phrases first
pub fn segment_text(text: &str, map: &VocabMap, max_tokens: usize) -> Vec<Segment> {
    let mut segments = vec![Segment::Literal(text.to_string())];
    for n in (1..=max_tokens).rev() {
        segments = segments
            .into_iter()
            .flat_map(|segment| match segment {
                Segment::Literal(literal) => split_literal(&literal, n, map),
                translated => vec![translated],
            })
            .collect();
    }
    segments
}

pub struct SubstitutionEngine {
    config: SubstitutionConfig,
}

impl SubstitutionEngine {
    pub fn new(config: SubstitutionConfig) -> Self {
        Self { config }
    }

    pub fn marker_class(&self) -> &str {
        &self.config.marker_class
    }

    /// Text-only containers are always skipped: a marker inside them would
    /// be shown as markup source.
    fn is_excluded(&self, el: &ElementData) -> bool {
        is_text_only_element(&el.name)
            || self.config.excluded_tags.iter().any(|tag| tag.eq_ignore_ascii_case(&el.name))
            || el.has_class(&self.config.marker_class)
    }

    /// Text nodes that may be rewritten: children of elements inside `<body>`,
    /// outside excluded containers and existing markers
    fn candidate_text_nodes(&self, document: &Document) -> Vec<NodeId> {
        let mut found = Vec::new();
        if let Some(body) = document.body() {
            for child in body.children() {
                self.collect_text_nodes(child, &mut found);
            }
        }
        found
    }

    fn collect_text_nodes(&self, node: NodeRef<'_, DomNode>, found: &mut Vec<NodeId>) {
        let DomNode::Element(el) = node.value() else {
            return;
        };
        if self.is_excluded(el) {
            return;
        }
        for child in node.children() {
            match child.value() {
                DomNode::Text(_) => found.push(child.id()),
                DomNode::Element(_) => self.collect_text_nodes(child, found),
                _ => {}
            }
        }
    }

    fn marker_element(&self, original: &str, translation: &str) -> DomNode {
        DomNode::Element(
            ElementData::new("span")
                .with_attr("class", &self.config.marker_class)
                .with_attr(ATTR_TITLE, original)
                .with_attr(ATTR_ORIGINAL, original)
                .with_attr(ATTR_TRANSLATION, translation),
        )
    }

    /// Rewrite the document in place. Returns the number of markers created.
    pub fn substitute(&self, document: &mut Document, map: &VocabMap) -> usize {
        if map.is_empty() {
            return 0;
        }
        info!("Replacing vocab...");

        let mut replaced = 0;
        for id in self.candidate_text_nodes(document) {
            let segments = match document.tree().get(id).map(|n| n.value()) {
                Some(DomNode::Text(text)) => segment_text(text, map, self.config.max_phrase_tokens),
                _ => continue,
            };
            if !segments.iter().any(|s| matches!(s, Segment::Translated { .. })) {
                continue;
            }

            let Some(mut node) = document.tree_mut().get_mut(id) else {
                continue;
            };
            for segment in segments {
                match segment {
                    Segment::Literal(text) => {
                        node.insert_before(DomNode::Text(text));
                    }
                    Segment::Translated { original, translation } => {
                        let mut marker = node.insert_before(self.marker_element(&original, &translation));
                        marker.append(DomNode::Text(translation));
                        replaced += 1;
                    }
                }
            }
            node.detach();
        }

        debug!("Created {} translation markers", replaced);
        info!("Vocab replaced!");
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{build_vocab_map, VocabEntry};

    fn map(pairs: &[(&str, &str)]) -> VocabMap {
        let mut map = VocabMap::new();
        for (k, v) in pairs {
            map.insert(k, v);
        }
        map
    }

    fn engine() -> SubstitutionEngine {
        SubstitutionEngine::new(SubstitutionConfig::default())
    }

    #[test]
    fn test_token_spans() {
        assert_eq!(token_spans("  ab c\n"), vec![(2, 4), (5, 6)]);
        assert!(token_spans(" \t").is_empty());
    }

    #[test]
    fn test_longest_phrase_wins() {
        let map = map(&[("to go", "X"), ("go", "Y")]);
        let segments = segment_text("I want to go home", &map, 4);
        assert_eq!(segments, vec![
            Segment::Literal("I want ".to_string()),
            Segment::Translated { original: "to go".to_string(), translation: "X".to_string() },
            Segment::Literal(" home".to_string()),
        ]);
    }

    #[test]
    fn test_punctuation_and_case() {
        let map = map(&[("fire", "火")]);
        let segments = segment_text("(Fire!) fire-fighter", &map, 4);
        assert_eq!(segments, vec![
            Segment::Literal("(".to_string()),
            Segment::Translated { original: "Fire".to_string(), translation: "火".to_string() },
            Segment::Literal("!) fire-fighter".to_string()),
        ]);
    }

    #[test]
    fn test_phrase_across_line_break() {
        let map = map(&[("big dog", "大犬")]);
        let segments = segment_text("a big\n  dog.", &map, 4);
        assert_eq!(segments[1], Segment::Translated {
            original: "big\n  dog".to_string(),
            translation: "大犬".to_string(),
        });
    }

    #[test]
    fn test_no_match_leaves_text() {
        let map = map(&[("fire", "火")]);
        assert_eq!(segment_text("water only", &map, 4), vec![Segment::Literal("water only".to_string())]);
    }

    #[test]
    fn test_document_substitution() {
        let map = map(&[("to go", "行く"), ("go", "碁"), ("home", "家")]);
        let mut doc = Document::parse(
            "<html><body><div><p>I want to go home.</p>\
             <script>var go = 1;</script><style>.home{}</style>\
             <noscript>go home</noscript><template><i>home</i></template></div></body></html>",
        );

        let created = engine().substitute(&mut doc, &map);
        assert_eq!(created, 2);

        let markers = doc.markers("wanikanified");
        let pairs: Vec<_> = markers.iter()
            .map(|m| (m.original.as_str(), m.translation.as_str()))
            .collect();
        assert_eq!(pairs, vec![("to go", "行く"), ("home", "家")]);

        let html = doc.to_html();
        assert!(html.contains(
            r#"<p>I want <span class="wanikanified" title="to go" data-en="to go" data-jp="行く">行く</span> <span class="wanikanified" title="home" data-en="home" data-jp="家">家</span>.</p>"#
        ));
        assert!(html.contains("<script>var go = 1;</script>"));
        assert!(html.contains("<style>.home{}</style>"));
    }

    #[test]
    fn test_text_only_containers_are_never_rewritten() {
        let map = map(&[("fire", "火")]);
        let mut config = SubstitutionConfig::default();
        config.excluded_tags.clear();
        let engine = SubstitutionEngine::new(config);

        for tag in [
            "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript", "textarea", "title",
        ] {
            let source = format!("<body><form><{tag}>fire</{tag}></form></body>");
            let mut doc = Document::parse(&source);
            assert_eq!(engine.substitute(&mut doc, &map), 0, "{}", tag);

            let html = doc.to_html();
            assert!(html.contains(&format!("<{tag}>fire</{tag}>")), "{}: {}", tag, html);
            assert!(!html.contains("wanikanified"), "{}", tag);
        }

        let mut doc = Document::parse("<body><div><plaintext>fire");
        assert_eq!(engine.substitute(&mut doc, &map), 0);
        assert!(doc.to_html().contains("<plaintext>fire</plaintext>"));
    }

    #[test]
    fn test_visible_text_next_to_textarea_is_still_rewritten() {
        let map = map(&[("fire", "火")]);
        let mut doc = Document::parse("<body><form><label>fire</label><textarea>fire</textarea></form></body>");
        assert_eq!(engine().substitute(&mut doc, &map), 1);
        assert!(doc.to_html().contains("<textarea>fire</textarea>"));
        assert_eq!(doc.markers("wanikanified").len(), 1);
    }

    #[test]
    fn test_unmatched_page_is_left_unmodified() {
        let map = map(&[("fire", "火")]);
        let source = "<html><head></head><body><pre>\n\nwater</pre><textarea>\n\nwater</textarea>\
                      <p>water</p></body></html>";
        let mut doc = Document::parse(source);
        assert_eq!(engine().substitute(&mut doc, &map), 0);
        assert_eq!(doc.to_html(), source);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let map = map(&[("to go", "X"), ("go", "Y"), ("x", "Z")]);
        let mut doc = Document::parse("<body><p>I want to go home</p></body>");
        let engine = engine();

        assert_eq!(engine.substitute(&mut doc, &map), 1);
        let first = doc.markers("wanikanified");
        let html = doc.to_html();

        assert_eq!(engine.substitute(&mut doc, &map), 0);
        let second = doc.markers("wanikanified");
        assert_eq!(first.len(), second.len());
        assert_eq!(second[0].original, "to go");
        assert_eq!(second[0].translation, "X");
        assert_eq!(doc.to_html(), html);
    }

    #[test]
    fn test_text_directly_in_body_is_left_alone() {
        let map = map(&[("fire", "火")]);
        let mut doc = Document::parse("<body>fire<p>fire</p></body>");
        assert_eq!(engine().substitute(&mut doc, &map), 1);
        assert_eq!(doc.body_text(), "fire火");
    }

    #[test]
    fn test_conjugated_forms_from_builder() {
        let map = build_vocab_map(&[VocabEntry::new("to eat, to consume", "食", true)]);
        let mut doc = Document::parse("<body><p>He is eating while she consumed it.</p></body>");
        assert_eq!(engine().substitute(&mut doc, &map), 2);
        assert_eq!(doc.body_text(), "He is 食 while she 食 it.");
    }

    #[test]
    fn test_shorter_max_phrase_length() {
        let map = map(&[("to go", "X"), ("go", "Y")]);
        let mut config = SubstitutionConfig::default();
        config.max_phrase_tokens = 1;
        let segments = segment_text("to go", &map, config.max_phrase_tokens);
        assert_eq!(segments, vec![
            Segment::Literal("to ".to_string()),
            Segment::Translated { original: "go".to_string(), translation: "Y".to_string() },
        ]);
    }
}
