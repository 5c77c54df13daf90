use std::ops::Range;

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd};
use serde::Serialize;
use tracing::debug;

use crate::index::ResolvedLink;
use crate::resolve::resolve;
use crate::tree::Tree;
use crate::wikilink::{self, LinkToken};

/// What the wiki-link renderer needs from the host: the corpus snapshot, the
/// canonical path of the document being rendered, and the document extension
/// appended to hrefs.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub tree: &'a Tree,
    pub doc_path: &'a str,
    pub extension: &'a str,
}

/// Rendered HTML plus the links that were turned into anchors, in render
/// order.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub html: String,
    pub links: Vec<ResolvedLink>,
}

/// Markup kinds recognized on top of the base inline stream, kept distinct
/// from the base markdown tags so a dedicated renderer can be attached to
/// each without open-ended dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    WikiLink,
}

type InlineRenderFn = fn(&LinkToken, &ResolvedLink, &RenderContext<'_>) -> String;

fn renderer_for(kind: InlineKind) -> InlineRenderFn {
    match kind {
        InlineKind::WikiLink => render_wiki_link,
    }
}

/// Anchor markup for one recognized link: the resolved path (with the
/// document extension) as both the navigable href and the host-visible data
/// attribute, the raw label as display text.
fn render_wiki_link(token: &LinkToken, resolved: &ResolvedLink, ctx: &RenderContext<'_>) -> String {
    let target = format!("{}.{}", resolved.canonical_path, ctx.extension);
    format!(
        r#"<a href="{href}" data-href="{href}">{label}</a>"#,
        href = escape_html(&target),
        label = escape_html(&token.raw_label),
    )
}

/// Render a document to HTML, rewriting recognized wiki-link spans into
/// anchors.
///
/// The base markdown stream is produced by pulldown-cmark with the usual
/// extension set. Spans come from the cursor-mode scanner over the raw
/// source and are matched against the byte offsets of each text event, so a
/// span survives the splits the inline parser makes at escapes and brackets.
/// Text inside code spans and code blocks is left alone, mirroring a
/// tokenizer where code rules run ahead of the link rule.
pub fn to_html(content: &str, ctx: &RenderContext<'_>) -> RenderedDocument {
    let tokens = wikilink::scan_links(content);
    let mut emitted = vec![false; tokens.len()];
    let mut links = Vec::new();

    let options =
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;

    let mut events: Vec<Event> = Vec::new();
    let mut code_block_depth = 0usize;

    for (event, range) in Parser::new_ext(content, options).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                code_block_depth += 1;
                events.push(Event::Start(Tag::CodeBlock(kind)));
            }
            Event::End(TagEnd::CodeBlock) => {
                code_block_depth -= 1;
                events.push(Event::End(TagEnd::CodeBlock));
            }
            Event::Text(text) if code_block_depth == 0 => {
                rewrite_text_event(
                    &text,
                    range,
                    &tokens,
                    &mut emitted,
                    ctx,
                    &mut events,
                    &mut links,
                );
            }
            other => events.push(other),
        }
    }

    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, events.into_iter());
    debug!(
        doc_path = ctx.doc_path,
        links = links.len(),
        "rendered document"
    );

    RenderedDocument { html, links }
}

/// Rewrite one text event: stretches outside a recognized span pass through,
/// the event covering a span's start emits the anchor, and later fragments
/// of the same span are dropped.
///
/// Escapes and brackets always split text events, so within one event the
/// stretches lying outside a span map one-to-one onto the source bytes; the
/// prefix/consume arithmetic below relies on that.
fn rewrite_text_event<'a>(
    text: &str,
    range: Range<usize>,
    tokens: &[LinkToken],
    emitted: &mut [bool],
    ctx: &RenderContext<'_>,
    events: &mut Vec<Event<'a>>,
    links: &mut Vec<ResolvedLink>,
) {
    let mut remaining = text;
    let mut raw_pos = range.start;

    for (index, token) in tokens.iter().enumerate() {
        let span = &token.range;
        if span.end <= raw_pos || span.start >= range.end {
            continue;
        }
        if !emitted[index] && span.start < range.start {
            // The span opened outside any text event (inside inline code or
            // similar); its tail here stays ordinary text.
            continue;
        }

        if span.start > raw_pos {
            let prefix_len = (span.start - raw_pos).min(remaining.len());
            let Some((prefix, rest)) = remaining.split_at_checked(prefix_len) else {
                break;
            };
            if !prefix.is_empty() {
                events.push(Event::Text(CowStr::from(prefix.to_string())));
            }
            remaining = rest;
            raw_pos = span.start;
        }

        if !emitted[index] {
            emitted[index] = true;
            let resolved = ResolvedLink {
                raw_label: token.raw_label.clone(),
                canonical_path: resolve(ctx.tree, &token.raw_label, ctx.doc_path),
            };
            let render = renderer_for(InlineKind::WikiLink);
            events.push(Event::Html(CowStr::from(render(token, &resolved, ctx))));
            links.push(resolved);
        }

        let consumed_end = span.end.min(range.end);
        let consumed = (consumed_end - raw_pos).min(remaining.len());
        remaining = remaining.get(consumed..).unwrap_or("");
        raw_pos = consumed_end;
    }

    if !remaining.is_empty() {
        events.push(Event::Text(CowStr::from(remaining.to_string())));
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use super::{RenderContext, to_html};
    use crate::tree::{Node, Tree};

    fn doc(name: &str) -> Node {
        Node::Document {
            name: name.to_string(),
            last_modified: UNIX_EPOCH,
        }
    }

    fn folder(name: &str, children: Vec<Node>) -> Node {
        Node::Folder {
            name: name.to_string(),
            children: Tree::new(children),
        }
    }

    fn ctx<'a>(tree: &'a Tree, doc_path: &'a str) -> RenderContext<'a> {
        RenderContext {
            tree,
            doc_path,
            extension: "md",
        }
    }

    #[test]
    fn renders_anchor_with_resolved_href() {
        let tree = Tree::new(vec![doc("Beta")]);
        let rendered = to_html("see [[Beta]] now", &ctx(&tree, "/Alpha"));
        assert!(
            rendered
                .html
                .contains(r#"<a href="/Beta.md" data-href="/Beta.md">Beta</a>"#)
        );
        assert!(rendered.html.contains("see "));
        assert!(rendered.html.contains(" now"));
        assert_eq!(rendered.links.len(), 1);
        assert_eq!(rendered.links[0].canonical_path, "/Beta");
    }

    #[test]
    fn resolves_relative_to_the_rendered_document() {
        let tree = Tree::new(vec![folder("Notes", vec![doc("Beta"), doc("Draft")])]);
        let rendered = to_html("[[Beta]]", &ctx(&tree, "/Notes/Draft"));
        assert!(rendered.html.contains(r#"href="/Notes/Beta.md""#));
    }

    #[test]
    fn dangling_links_render_as_ordinary_anchors() {
        let tree = Tree::default();
        let rendered = to_html("[[Ghost]]", &ctx(&tree, "/Alpha"));
        assert!(
            rendered
                .html
                .contains(r#"<a href="/Ghost.md" data-href="/Ghost.md">Ghost</a>"#)
        );
    }

    #[test]
    fn escaped_delimiters_stay_inside_the_label() {
        let tree = Tree::default();
        let rendered = to_html(r"go [[Foo\]\]Bar]] end", &ctx(&tree, "/Alpha"));
        assert!(
            rendered
                .html
                .contains(r#"<a href="/Foo]]Bar.md" data-href="/Foo]]Bar.md">Foo]]Bar</a>"#)
        );
        assert!(rendered.html.contains("go "));
        assert!(rendered.html.contains(" end"));
        assert_eq!(rendered.links.len(), 1);
        assert_eq!(rendered.links[0].raw_label, "Foo]]Bar");
    }

    #[test]
    fn labels_are_html_escaped() {
        let tree = Tree::default();
        let rendered = to_html("[[a<b&c]]", &ctx(&tree, "/Alpha"));
        assert!(rendered.html.contains(">a&lt;b&amp;c</a>"));
        assert!(rendered.html.contains(r#"href="/a&lt;b&amp;c.md""#));
    }

    #[test]
    fn single_brackets_and_unterminated_spans_stay_text() {
        let tree = Tree::new(vec![doc("Beta")]);
        let rendered = to_html("[Beta] and [[Beta with no close", &ctx(&tree, "/Alpha"));
        assert!(!rendered.html.contains("<a "));
        assert!(rendered.links.is_empty());
    }

    #[test]
    fn inline_code_is_not_linkified() {
        let tree = Tree::new(vec![doc("Beta")]);
        let rendered = to_html("use `[[Beta]]` here", &ctx(&tree, "/Alpha"));
        assert!(rendered.html.contains("<code>[[Beta]]</code>"));
        assert!(!rendered.html.contains("<a "));
        assert!(rendered.links.is_empty());
    }

    #[test]
    fn fenced_code_blocks_are_not_linkified() {
        let tree = Tree::new(vec![doc("Beta")]);
        let rendered = to_html("```\n[[Beta]]\n```\n", &ctx(&tree, "/Alpha"));
        assert!(rendered.html.contains("[[Beta]]"));
        assert!(!rendered.html.contains("<a "));
    }

    #[test]
    fn links_inside_emphasis_still_render() {
        let tree = Tree::new(vec![doc("Beta")]);
        let rendered = to_html("*[[Beta]]*", &ctx(&tree, "/Alpha"));
        assert!(rendered.html.contains("<em>"));
        assert!(rendered.html.contains(r#"href="/Beta.md""#));
    }

    #[test]
    fn multiple_links_on_one_line_each_render() {
        let tree = Tree::new(vec![doc("One"), doc("Two")]);
        let rendered = to_html("[[One]] between [[Two]]", &ctx(&tree, "/Alpha"));
        assert!(rendered.html.contains(r#"href="/One.md""#));
        assert!(rendered.html.contains(r#"href="/Two.md""#));
        assert!(rendered.html.contains(" between "));
        assert_eq!(rendered.links.len(), 2);
    }
}
