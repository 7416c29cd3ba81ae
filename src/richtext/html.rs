use std::fmt::Write;

use pulldown_cmark::escape::{escape_href, escape_html};
use url::Url;

use super::{Block, BlockKind, RichText, RichTextRenderer, Span, SpanKind};

/// 外部链接允许的协议
const LINK_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

/// HtmlRenderer 将富文本字段渲染为 HTML。
///
/// 连续的列表项会被合并到同一个 `<ul>` / `<ol>` 中，文档内链接通过 `document_base` 拼接 uid。
#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    document_base: String,
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new("/post")
    }
}

impl HtmlRenderer {
    pub fn new(document_base: impl Into<String>) -> Self {
        Self {
            document_base: document_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn render_block(&self, block: &Block, out: &mut String) {
        match block.kind {
            BlockKind::Paragraph => self.wrap(out, "p", block),
            BlockKind::Preformatted => self.wrap(out, "pre", block),
            BlockKind::ListItem | BlockKind::OrderedListItem => self.wrap(out, "li", block),
            BlockKind::Image => {
                let Some(url) = block.url.as_deref().filter(|u| allowed_url(u)) else {
                    return;
                };
                let _ = write!(
                    out,
                    r#"<p class="block-img"><img src="{}" alt="{}" /></p>"#,
                    href(url),
                    text(block.alt.as_deref().unwrap_or_default()),
                );
            }
            BlockKind::Embed => {
                let Some(embed) = &block.oembed else { return };
                let _ = write!(
                    out,
                    r#"<div data-oembed="{}" data-oembed-type="{}" data-oembed-provider="{}">{}</div>"#,
                    text(embed.embed_url.as_deref().unwrap_or_default()),
                    text(embed.kind.as_deref().unwrap_or_default()),
                    text(embed.provider_name.as_deref().unwrap_or_default()),
                    // oembed 的 html 由内容服务生成，原样输出
                    embed.html.as_deref().unwrap_or_default(),
                );
            }
            kind => {
                if let Some(level) = kind.heading_level() {
                    self.wrap(out, &format!("h{level}"), block);
                }
            }
        }
    }

    fn wrap(&self, out: &mut String, tag: &str, block: &Block) {
        let _ = write!(out, "<{tag}>");
        self.render_spans(&block.text, &block.spans, out);
        let _ = write!(out, "</{tag}>");
    }

    /// 按区间边界切分文本，维护一个已打开标签的栈。
    ///
    /// 每个片段的目标标签序列按 (start 升序, end 降序) 排列，与当前栈比较公共前缀后
    /// 关闭多余的标签、打开缺少的标签，因此交叉的区间也能输出合法嵌套的 HTML。
    fn render_spans(&self, text: &str, spans: &[Span], out: &mut String) {
        let len = utf16_len(text);

        let spans: Vec<(&Span, String)> = spans
            .iter()
            .filter(|s| s.start < s.end && s.start < len)
            .filter_map(|s| self.open_tag(s).map(|tag| (s, tag)))
            .collect();

        let mut bounds = vec![0, len];
        for (s, _) in &spans {
            bounds.push(s.start);
            bounds.push(s.end.min(len));
        }
        bounds.sort_unstable();
        bounds.dedup();

        let mut stack: Vec<usize> = Vec::new();

        for window in bounds.windows(2) {
            let (from, to) = (window[0], window[1]);

            let mut wanted: Vec<usize> = (0..spans.len())
                .filter(|&i| spans[i].0.start <= from && spans[i].0.end >= to)
                .collect();
            wanted.sort_by_key(|&i| (spans[i].0.start, std::cmp::Reverse(spans[i].0.end), i));

            let common = stack
                .iter()
                .zip(&wanted)
                .take_while(|(a, b)| a == b)
                .count();

            while stack.len() > common {
                if let Some(i) = stack.pop() {
                    out.push_str(close_tag(spans[i].0.kind));
                }
            }
            for &i in &wanted[common..] {
                out.push_str(&spans[i].1);
                stack.push(i);
            }

            let segment = &text[byte_offset(text, from)..byte_offset(text, to)];
            push_text(segment, out);
        }

        while let Some(i) = stack.pop() {
            out.push_str(close_tag(spans[i].0.kind));
        }
    }

    fn open_tag(&self, span: &Span) -> Option<String> {
        match span.kind {
            SpanKind::Strong => Some("<strong>".to_string()),
            SpanKind::Em => Some("<em>".to_string()),
            SpanKind::Label => {
                let label = span.data.as_ref()?.label.as_deref()?;
                Some(format!(r#"<span class="{}">"#, text(label)))
            }
            SpanKind::Hyperlink => {
                let data = span.data.as_ref()?;
                let link = match data.link_type.as_deref() {
                    Some("Document") => format!("{}/{}", self.document_base, data.uid.as_deref()?),
                    _ => data.url.clone().filter(|u| allowed_url(u))?,
                };
                let target = match data.target.as_deref() {
                    Some(t) => format!(r#" target="{}" rel="noopener noreferrer""#, text(t)),
                    None => String::new(),
                };
                Some(format!(r#"<a href="{}"{}>"#, href(&link), target))
            }
            SpanKind::Unknown => None,
        }
    }
}

impl RichTextRenderer for HtmlRenderer {
    fn render(&self, field: &RichText) -> String {
        let mut out = String::new();
        let mut open_list: Option<BlockKind> = None;

        for block in &field.0 {
            let list = match block.kind {
                BlockKind::ListItem | BlockKind::OrderedListItem => Some(block.kind),
                _ => None,
            };

            if open_list != list {
                if let Some(kind) = open_list {
                    out.push_str(list_tag(kind).1);
                }
                if let Some(kind) = list {
                    out.push_str(list_tag(kind).0);
                }
                open_list = list;
            }

            self.render_block(block, &mut out);
        }

        if let Some(kind) = open_list {
            out.push_str(list_tag(kind).1);
        }

        out
    }
}

fn list_tag(kind: BlockKind) -> (&'static str, &'static str) {
    match kind {
        BlockKind::OrderedListItem => ("<ol>", "</ol>"),
        _ => ("<ul>", "</ul>"),
    }
}

fn close_tag(kind: SpanKind) -> &'static str {
    match kind {
        SpanKind::Strong => "</strong>",
        SpanKind::Em => "</em>",
        SpanKind::Label => "</span>",
        SpanKind::Hyperlink => "</a>",
        SpanKind::Unknown => "",
    }
}

/// 转义后写入，换行转换为 `<br />`
fn push_text(segment: &str, out: &mut String) {
    let mut lines = segment.split('\n');
    if let Some(first) = lines.next() {
        let _ = escape_html(&mut *out, first);
    }
    for line in lines {
        out.push_str("<br />");
        let _ = escape_html(&mut *out, line);
    }
}

fn text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let _ = escape_html(&mut out, s);
    out
}

fn href(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let _ = escape_href(&mut out, url);
    out
}

/// 只输出 http、https 与 mailto 地址，`javascript:` 之类的链接按纯文本处理
fn allowed_url(url: &str) -> bool {
    Url::parse(url.trim()).is_ok_and(|u| LINK_SCHEMES.contains(&u.scheme()))
}

fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// UTF-16 偏移转换为字节偏移，落在代理对中间时向后对齐
fn byte_offset(text: &str, utf16: usize) -> usize {
    let mut units = 0;
    for (idx, c) in text.char_indices() {
        if units >= utf16 {
            return idx;
        }
        units += c.len_utf16();
    }
    text.len()
}
