mod html;

use serde::Deserialize;

pub use self::html::HtmlRenderer;

/// 富文本字段
///
/// 内容服务以块列表的形式返回结构化文本，每个块带有纯文本与样式区间（[`Span`]）。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct RichText(pub Vec<Block>);

impl RichText {
    /// 拼接所有块的纯文本，块之间以单个空格分隔，空块忽略
    pub fn as_text(&self) -> String {
        self.0
            .iter()
            .map(|b| b.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 富文本块
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub spans: Vec<Span>,
    /// 图片地址，仅 [`BlockKind::Image`] 使用
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
    /// 嵌入内容，仅 [`BlockKind::Embed`] 使用
    #[serde(default)]
    pub oembed: Option<Embed>,
}

impl Block {
    /// 构造一个不带样式的段落块
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::text(BlockKind::Paragraph, text)
    }

    pub fn text(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            spans: Vec::new(),
            url: None,
            alt: None,
            oembed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BlockKind {
    #[serde(rename = "paragraph")]
    Paragraph,
    #[serde(rename = "heading1")]
    Heading1,
    #[serde(rename = "heading2")]
    Heading2,
    #[serde(rename = "heading3")]
    Heading3,
    #[serde(rename = "heading4")]
    Heading4,
    #[serde(rename = "heading5")]
    Heading5,
    #[serde(rename = "heading6")]
    Heading6,
    #[serde(rename = "preformatted")]
    Preformatted,
    #[serde(rename = "list-item")]
    ListItem,
    #[serde(rename = "o-list-item")]
    OrderedListItem,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "embed")]
    Embed,
    #[serde(other)]
    Unknown,
}

impl BlockKind {
    fn heading_level(self) -> Option<u8> {
        match self {
            BlockKind::Heading1 => Some(1),
            BlockKind::Heading2 => Some(2),
            BlockKind::Heading3 => Some(3),
            BlockKind::Heading4 => Some(4),
            BlockKind::Heading5 => Some(5),
            BlockKind::Heading6 => Some(6),
            _ => None,
        }
    }
}

/// 样式区间
///
/// `start` 与 `end` 为 UTF-16 码元偏移，与内容服务保持一致。
#[derive(Debug, Clone, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub kind: SpanKind,
    #[serde(default)]
    pub data: Option<SpanData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SpanKind {
    #[serde(rename = "strong")]
    Strong,
    #[serde(rename = "em")]
    Em,
    #[serde(rename = "hyperlink")]
    Hyperlink,
    #[serde(rename = "label")]
    Label,
    #[serde(other)]
    Unknown,
}

/// 超链接与标签附带的数据
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpanData {
    /// `Web`、`Document`、`Media`
    #[serde(default)]
    pub link_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub embed_url: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
}

/// 富文本渲染器
///
/// 将 [`RichText`] 转换为 HTML 片段，以及用于字数统计的纯文本。
pub trait RichTextRenderer: Send + Sync {
    fn render(&self, field: &RichText) -> String;

    fn render_text(&self, field: &RichText) -> String {
        field.as_text()
    }
}
