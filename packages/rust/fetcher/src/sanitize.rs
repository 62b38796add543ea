//! HTML sanitizer that reduces a venue page to its main content markup.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

/// Elements dropped together with everything inside them.
const REMOVED_TAGS: &[&str] = &["script", "style", "nav", "header", "footer"];

/// Candidate content regions, highest priority first.
static REGION_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["main", "article", ".content, #content", "body"]
        .iter()
        .map(|s| Selector::parse(s).expect("valid region selector"))
        .collect()
});

/// Reduce a raw HTML document to the inner markup of its main content region.
///
/// Script, style, nav, header and footer elements are detached from the tree
/// along with comments. The region is the first of `main`, `article`,
/// `.content`/`#content`, `body` still attached to the document, and its
/// markup is cut at `max_chars` characters.
pub fn sanitize_html(html: &str, max_chars: usize) -> String {
    let mut doc = Html::parse_document(html);
    strip_nodes(&mut doc);

    let Some(region) = content_region(&doc) else {
        return String::new();
    };

    truncate_chars(region.inner_html().trim(), max_chars)
}

fn strip_nodes(doc: &mut Html) {
    let doomed: Vec<_> = doc
        .tree
        .nodes()
        .filter(|node| match node.value() {
            Node::Comment(_) => true,
            Node::Element(el) => REMOVED_TAGS.contains(&el.name()),
            _ => false,
        })
        .map(|node| node.id())
        .collect();

    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Searches from the root element, so detached subtrees are never candidates.
fn content_region(doc: &Html) -> Option<ElementRef<'_>> {
    let root = doc.root_element();
    REGION_SELECTORS
        .iter()
        .find_map(|sel| root.select(sel).next())
}

/// Keep at most `max_chars` characters.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
