//! HTML to Markdown conversion
//!
//! Walks the parsed DOM and emits a GitHub-flavored dialect with
//! inline links. Block elements manage their own separation; inline
//! runs collapse whitespace the way a renderer would.

use ego_tree::NodeRef;
use scraper::{Html, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Unordered,
    Ordered,
}

#[derive(Default, Clone)]
struct RenderContext {
    list_stack: Vec<ListKind>,
    in_pre: bool,
}

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "head", "template", "iframe"];

fn collapse_inline_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

fn render_children(node: NodeRef<'_, Node>, ctx: &RenderContext) -> String {
    let mut out = String::new();
    for child in node.children() {
        out.push_str(&render_node(child, ctx));
    }
    out
}

fn attr(node: NodeRef<'_, Node>, name: &str) -> Option<String> {
    node.value()
        .as_element()
        .and_then(|el| el.attr(name))
        .map(str::to_string)
}

fn block(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n\n{trimmed}\n\n")
    }
}

fn heading(level: usize, node: NodeRef<'_, Node>, ctx: &RenderContext) -> String {
    let text = render_children(node, ctx);
    let text = text.trim();
    if text.is_empty() {
        String::new()
    } else {
        format!("\n\n{} {}\n\n", "#".repeat(level), text)
    }
}

fn code_fence_language(node: NodeRef<'_, Node>) -> String {
    // <pre><code class="language-rust"> is the GFM convention.
    for child in node.children() {
        if let Some(el) = child.value().as_element() {
            if el.name() == "code" {
                if let Some(class) = el.attr("class") {
                    for token in class.split_whitespace() {
                        if let Some(lang) = token.strip_prefix("language-") {
                            return lang.to_string();
                        }
                    }
                }
            }
        }
    }
    String::new()
}

fn raw_text(node: NodeRef<'_, Node>) -> String {
    let mut out = String::new();
    for descendant in node.descendants() {
        if let Some(text) = descendant.value().as_text() {
            out.push_str(text);
        }
    }
    out
}

fn render_list(node: NodeRef<'_, Node>, ctx: &RenderContext, kind: ListKind) -> String {
    let mut inner_ctx = ctx.clone();
    inner_ctx.list_stack.push(kind);
    let indent = "  ".repeat(ctx.list_stack.len());
    let mut out = String::new();
    let mut index = 0usize;
    for child in node.children() {
        let Some(el) = child.value().as_element() else {
            continue;
        };
        if el.name() != "li" {
            continue;
        }
        index += 1;
        let marker = match kind {
            ListKind::Unordered => "-".to_string(),
            ListKind::Ordered => format!("{index}."),
        };
        let item = render_node_children_for_li(child, &inner_ctx);
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        // Continuation lines align under the item text.
        let mut lines = item.lines();
        if let Some(first) = lines.next() {
            out.push_str(&format!("{indent}{marker} {first}\n"));
            for line in lines {
                if line.trim().is_empty() {
                    continue;
                }
                out.push_str(&format!("{indent}  {line}\n"));
            }
        }
    }
    if out.is_empty() {
        String::new()
    } else if ctx.list_stack.is_empty() {
        format!("\n\n{}\n", out.trim_end())
    } else {
        // Nested list stays attached to its parent item.
        format!("\n{}", out.trim_end())
    }
}

fn render_node_children_for_li(node: NodeRef<'_, Node>, ctx: &RenderContext) -> String {
    render_children(node, ctx)
        .trim()
        .to_string()
}

fn render_table(node: NodeRef<'_, Node>, ctx: &RenderContext) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut header_cells = 0usize;

    fn collect_rows(
        node: NodeRef<'_, Node>,
        ctx: &RenderContext,
        rows: &mut Vec<Vec<String>>,
        header_cells: &mut usize,
    ) {
        for child in node.children() {
            let Some(el) = child.value().as_element() else {
                continue;
            };
            match el.name() {
                "thead" | "tbody" | "tfoot" => collect_rows(child, ctx, rows, header_cells),
                "tr" => {
                    let mut cells = Vec::new();
                    let mut is_header = false;
                    for cell in child.children() {
                        if let Some(cell_el) = cell.value().as_element() {
                            if matches!(cell_el.name(), "td" | "th") {
                                if cell_el.name() == "th" {
                                    is_header = true;
                                }
                                let text = render_children(cell, ctx);
                                cells.push(
                                    collapse_inline_whitespace(text.trim()).replace('|', "\\|"),
                                );
                            }
                        }
                    }
                    if !cells.is_empty() {
                        if is_header && rows.is_empty() {
                            *header_cells = cells.len();
                        }
                        rows.push(cells);
                    }
                }
                _ => {}
            }
        }
    }

    collect_rows(node, ctx, &mut rows, &mut header_cells);
    if rows.is_empty() {
        return String::new();
    }

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        let mut padded = row.clone();
        padded.resize(width, String::new());
        out.push_str(&format!("| {} |\n", padded.join(" | ")));
        if i == 0 {
            out.push_str(&format!("|{}\n", " --- |".repeat(width)));
        }
    }
    block(&out)
}

fn render_node(node: NodeRef<'_, Node>, ctx: &RenderContext) -> String {
    match node.value() {
        Node::Text(text) => {
            let text: &str = text;
            if ctx.in_pre {
                text.to_string()
            } else {
                collapse_inline_whitespace(text)
            }
        }
        Node::Element(el) => {
            let tag = el.name();
            if SKIPPED_TAGS.contains(&tag) {
                return String::new();
            }
            match tag {
                "h1" => heading(1, node, ctx),
                "h2" => heading(2, node, ctx),
                "h3" => heading(3, node, ctx),
                "h4" => heading(4, node, ctx),
                "h5" => heading(5, node, ctx),
                "h6" => heading(6, node, ctx),
                "p" => block(&render_children(node, ctx)),
                "br" => "\n".to_string(),
                "hr" => "\n\n---\n\n".to_string(),
                "strong" | "b" => {
                    let inner = render_children(node, ctx);
                    let inner = inner.trim();
                    if inner.is_empty() {
                        String::new()
                    } else {
                        format!("**{inner}**")
                    }
                }
                "em" | "i" => {
                    let inner = render_children(node, ctx);
                    let inner = inner.trim();
                    if inner.is_empty() {
                        String::new()
                    } else {
                        format!("*{inner}*")
                    }
                }
                "del" | "s" | "strike" => {
                    let inner = render_children(node, ctx);
                    let inner = inner.trim();
                    if inner.is_empty() {
                        String::new()
                    } else {
                        format!("~~{inner}~~")
                    }
                }
                "code" if !ctx.in_pre => {
                    let inner = raw_text(node);
                    let inner = inner.trim();
                    if inner.is_empty() {
                        String::new()
                    } else {
                        format!("`{inner}`")
                    }
                }
                "pre" => {
                    let language = code_fence_language(node);
                    let body = raw_text(node);
                    let body = body.trim_matches('\n');
                    if body.trim().is_empty() {
                        String::new()
                    } else {
                        format!("\n\n```{language}\n{body}\n```\n\n")
                    }
                }
                "a" => {
                    let text = render_children(node, ctx);
                    let text = collapse_inline_whitespace(text.trim());
                    match attr(node, "href") {
                        Some(href) if !href.is_empty() && !href.starts_with("javascript:") => {
                            let label = if text.is_empty() { href.clone() } else { text };
                            format!("[{label}]({href})")
                        }
                        _ => text,
                    }
                }
                "img" => {
                    let alt = attr(node, "alt").unwrap_or_default();
                    match attr(node, "src") {
                        Some(src) if !src.is_empty() => format!("![{alt}]({src})"),
                        _ => String::new(),
                    }
                }
                "ul" => render_list(node, ctx, ListKind::Unordered),
                "ol" => render_list(node, ctx, ListKind::Ordered),
                "blockquote" => {
                    let inner = render_children(node, ctx);
                    let inner = inner.trim();
                    if inner.is_empty() {
                        return String::new();
                    }
                    let quoted: String = inner
                        .lines()
                        .map(|line| format!("> {line}\n"))
                        .collect();
                    block(&quoted)
                }
                "table" => render_table(node, ctx),
                "div" | "section" | "article" | "main" | "figure" | "figcaption" | "details"
                | "summary" => block(&render_children(node, ctx)),
                _ => render_children(node, ctx),
            }
        }
        _ => {
            if node.has_children() {
                render_children(node, ctx)
            } else {
                String::new()
            }
        }
    }
}

/// Convert an HTML body into GitHub-flavored Markdown.
#[must_use]
pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let rendered = render_children(document.tree.root(), &RenderContext::default());

    // Collapse runs of blank lines left by nested block elements.
    let mut out = String::with_capacity(rendered.len());
    let mut blank_run = 0usize;
    for line in rendered.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run <= 1 {
                out.push('\n');
            }
        } else {
            blank_run = 0;
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_and_paragraphs() {
        let md = html_to_markdown("<h1>Example</h1><p>Some <strong>bold</strong> text.</p>");
        assert!(md.starts_with("# Example"));
        assert!(md.contains("Some **bold** text."));
    }

    #[test]
    fn inline_links_are_preserved() {
        let md = html_to_markdown(r#"<p>Visit <a href="https://example.com/about">About</a>.</p>"#);
        assert!(md.contains("[About](https://example.com/about)"));
    }

    #[test]
    fn nested_lists_indent() {
        let html = "<ul><li>one<ul><li>one-a</li></ul></li><li>two</li></ul>";
        let md = html_to_markdown(html);
        assert!(md.contains("- one"));
        assert!(md.contains("  - one-a"));
        assert!(md.contains("- two"));
    }

    #[test]
    fn ordered_lists_number_items() {
        let md = html_to_markdown("<ol><li>first</li><li>second</li></ol>");
        assert!(md.contains("1. first"));
        assert!(md.contains("2. second"));
    }

    #[test]
    fn code_blocks_carry_language() {
        let html = r#"<pre><code class="language-rust">fn main() {}</code></pre>"#;
        let md = html_to_markdown(html);
        assert!(md.contains("```rust"));
        assert!(md.contains("fn main() {}"));
    }

    #[test]
    fn tables_render_as_gfm() {
        let html = "<table><thead><tr><th>Name</th><th>Value</th></tr></thead>
            <tbody><tr><td>a</td><td>1</td></tr></tbody></table>";
        let md = html_to_markdown(html);
        assert!(md.contains("| Name | Value |"));
        assert!(md.contains("| --- | --- |"));
        assert!(md.contains("| a | 1 |"));
    }

    #[test]
    fn blockquotes_are_prefixed() {
        let md = html_to_markdown("<blockquote><p>wise words</p></blockquote>");
        assert!(md.contains("> wise words"));
    }

    #[test]
    fn scripts_produce_nothing() {
        let md = html_to_markdown("<script>alert(1)</script><p>visible</p>");
        assert_eq!(md, "visible");
    }

    #[test]
    fn images_become_markdown_images() {
        let md = html_to_markdown(r#"<img src="https://example.com/a.png" alt="A chart">"#);
        assert!(md.contains("![A chart](https://example.com/a.png)"));
    }

    #[test]
    fn empty_input_yields_empty_markdown() {
        assert_eq!(html_to_markdown(""), "");
        assert_eq!(html_to_markdown("<div>   </div>"), "");
    }
}
