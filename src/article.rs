use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use tracing::instrument;

use crate::{
    error::{Error, Result},
    prismic::{
        ContentService, POST_TYPE, Predicate, QueryOptions, RawDocument, SortOrder, required,
    },
    richtext::RichTextRenderer,
};

/// 阅读速度（词/分钟）
pub const WORDS_PER_MINUTE: usize = 200;

/// 一个词为一段连续的 `\w` 字符（Unicode）
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("invalid word regex"));

/// 文章查找方式
///
/// 预览引用与 slug 互斥：存在预览上下文时完全不按 slug 查找。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleLookup {
    /// 按 uid 查找已发布的文章
    BySlug(String),
    /// 按预览引用查找当前草稿
    ByPreviewReference(String),
}

impl ArticleLookup {
    /// 根据请求参数决定查找方式，预览引用优先
    pub fn new(slug: impl Into<String>, preview: Option<String>) -> Self {
        match preview.filter(|r| !r.is_empty()) {
            Some(reference) => ArticleLookup::ByPreviewReference(reference),
            None => ArticleLookup::BySlug(slug.into()),
        }
    }

    pub fn is_preview(&self) -> bool {
        matches!(self, ArticleLookup::ByPreviewReference(_))
    }
}

/// 正文中的一节
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub heading: String,
    pub body_html: String,
    /// 正文纯文本，用于统计字数
    pub body_text: String,
}

/// 文章详情
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleDetail {
    pub id: String,
    pub slug: Option<String>,
    pub published_at: Option<DateTime<Local>>,
    pub last_modified_at: Option<DateTime<Local>>,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    /// 可能为空字符串
    pub banner_url: String,
    /// 按渲染顺序排列，内容缺失时为空
    pub sections: Vec<Section>,
}

impl ArticleDetail {
    /// 规范化原始文档，正文每一组都通过 `renderer` 转换为 HTML 与纯文本
    pub fn from_raw<R: RichTextRenderer>(doc: RawDocument, renderer: &R) -> Result<Self> {
        let data = doc
            .data
            .ok_or_else(|| Error::Validation(format!("document {}: missing `data`", doc.id)))?;

        let sections = data
            .content
            .unwrap_or_default()
            .into_iter()
            .map(|group| Section {
                heading: group.heading.unwrap_or_default(),
                body_html: renderer.render(&group.body),
                body_text: renderer.render_text(&group.body),
            })
            .collect();

        Ok(Self {
            title: required(data.title, &doc.id, "title")?,
            subtitle: required(data.subtitle, &doc.id, "subtitle")?,
            author: required(data.author, &doc.id, "author")?,
            banner_url: data.banner.and_then(|b| b.url).unwrap_or_default(),
            sections,
            slug: doc.uid,
            published_at: doc.first_publication_date,
            last_modified_at: doc.last_publication_date,
            id: doc.id,
        })
    }

    /// 是否在首次发布后被编辑过
    pub fn is_edited(&self) -> bool {
        match (self.published_at, self.last_modified_at) {
            (Some(published), Some(modified)) => modified > published,
            _ => false,
        }
    }
}

/// 获取并规范化一篇文章
///
/// 找不到时返回 [`Error::NotFound`]，由调用方决定如何处理（通常重定向到首页）。
#[instrument(skip(service, renderer))]
pub async fn resolve_article<S, R>(
    service: &S,
    renderer: &R,
    lookup: &ArticleLookup,
) -> Result<ArticleDetail>
where
    S: ContentService,
    R: RichTextRenderer,
{
    let doc = match lookup {
        ArticleLookup::ByPreviewReference(reference) => {
            service.get_single_by_ref(POST_TYPE, reference).await?
        }
        ArticleLookup::BySlug(slug) => service.get_by_uid(POST_TYPE, slug).await?,
    };

    let doc = doc.ok_or(Error::NotFound)?;
    ArticleDetail::from_raw(doc, renderer)
}

/// 统计文本中的词数
pub fn count_words(text: &str) -> usize {
    WORD.find_iter(text).count()
}

/// 估算阅读时间（分钟，向上取整）
///
/// 每一节的小标题与正文纯文本词数之和除以 [`WORDS_PER_MINUTE`]，没有词时为 0。
pub fn reading_time_minutes(article: &ArticleDetail) -> u32 {
    let words: usize = article
        .sections
        .iter()
        .map(|s| count_words(&s.heading) + count_words(&s.body_text))
        .sum();

    words.div_ceil(WORDS_PER_MINUTE) as u32
}

/// 指向相邻文章的链接
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationLink {
    pub slug: String,
    pub title: String,
}

impl NavigationLink {
    fn from_raw(doc: RawDocument) -> Result<Self> {
        let title = doc.data.and_then(|d| d.title);
        Ok(Self {
            title: required(title, &doc.id, "title")?,
            slug: required(doc.uid, &doc.id, "uid")?,
        })
    }
}

/// 按首次发布时间排列的前后两篇文章
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjacentArticles {
    pub previous: Option<NavigationLink>,
    pub next: Option<NavigationLink>,
}

/// 查找发布时间上相邻的文章
///
/// 未发布的文章没有相邻文章，此时不会发起任何查询。两个方向的查询并发执行。
#[instrument(skip(service))]
pub async fn resolve_adjacent_articles<S: ContentService>(
    service: &S,
    published_at: Option<DateTime<Local>>,
) -> Result<AdjacentArticles> {
    let Some(at) = published_at else {
        return Ok(AdjacentArticles::default());
    };

    let (next, previous) = tokio::try_join!(
        neighbour(service, Predicate::PublishedAfter(at), SortOrder::FirstPublicationAsc),
        neighbour(service, Predicate::PublishedBefore(at), SortOrder::FirstPublicationDesc),
    )?;

    Ok(AdjacentArticles { previous, next })
}

async fn neighbour<S: ContentService>(
    service: &S,
    predicate: Predicate,
    order: SortOrder,
) -> Result<Option<NavigationLink>> {
    let options = QueryOptions::default()
        .fetch([format!("{POST_TYPE}.title")])
        .page_size(1)
        .order_by(order);

    let page = service
        .query(&[Predicate::document_type(POST_TYPE), predicate], &options)
        .await?;

    page.results
        .into_iter()
        .next()
        .map(NavigationLink::from_raw)
        .transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::{
        prismic::{MemoryService, RawContentGroup, RawImage, RawPostData},
        richtext::{Block, HtmlRenderer, RichText},
    };

    fn base() -> DateTime<Local> {
        Local.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap()
    }

    fn post(n: i64) -> RawDocument {
        let mut data = RawPostData::new(format!("Post {n}"), "subtitle", "Joseph Oliveira");
        data.banner = Some(RawImage {
            url: Some(format!("https://images.example/{n}.png")),
        });
        data.content = Some(vec![RawContentGroup {
            heading: Some("Proin et varius".to_string()),
            body: RichText(vec![
                Block::paragraph("Lorem ipsum dolor"),
                Block::paragraph("sit amet"),
            ]),
        }]);

        RawDocument::new(POST_TYPE, format!("id-{n}"))
            .with_uid(format!("post-{n}"))
            .published_at(base() + Duration::days(n))
            .with_data(data)
    }

    fn article_with_words(words: usize) -> ArticleDetail {
        ArticleDetail {
            id: "x".into(),
            slug: None,
            published_at: None,
            last_modified_at: None,
            title: String::new(),
            subtitle: String::new(),
            author: String::new(),
            banner_url: String::new(),
            sections: vec![Section {
                heading: String::new(),
                body_html: String::new(),
                body_text: vec!["word"; words].join(" "),
            }],
        }
    }

    #[test]
    fn test_lookup_prefers_preview() {
        assert_eq!(
            ArticleLookup::new("my-slug", Some("ref-123".into())),
            ArticleLookup::ByPreviewReference("ref-123".into())
        );
        assert_eq!(
            ArticleLookup::new("my-slug", Some(String::new())),
            ArticleLookup::BySlug("my-slug".into())
        );
        assert!(!ArticleLookup::new("my-slug", None).is_preview());
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("  ,.;  "), 0);
        assert_eq!(count_words("Hello, world! It's 2021."), 5);
        assert_eq!(count_words("sincronização em vez de ciclos"), 5);
    }

    #[test]
    fn test_reading_time_boundaries() {
        assert_eq!(reading_time_minutes(&article_with_words(0)), 0);
        assert_eq!(reading_time_minutes(&article_with_words(200)), 1);
        assert_eq!(reading_time_minutes(&article_with_words(201)), 2);

        let mut empty = article_with_words(0);
        empty.sections.clear();
        assert_eq!(reading_time_minutes(&empty), 0);
    }

    #[test]
    fn test_reading_time_counts_headings() {
        let mut article = article_with_words(199);
        article.sections[0].heading = "One more".to_string();
        assert_eq!(reading_time_minutes(&article), 2);
    }

    #[tokio::test]
    async fn test_resolve_article_by_slug() {
        let service = MemoryService::new(vec![post(1), post(2)]);
        let article = resolve_article(
            &service,
            &HtmlRenderer::default(),
            &ArticleLookup::BySlug("post-2".into()),
        )
        .await
        .expect("获取文章失败");

        assert_eq!(article.id, "id-2");
        assert_eq!(article.title, "Post 2");
        assert_eq!(article.banner_url, "https://images.example/2.png");
        assert_eq!(article.sections.len(), 1);
        assert_eq!(article.sections[0].heading, "Proin et varius");
        assert_eq!(
            article.sections[0].body_html,
            "<p>Lorem ipsum dolor</p><p>sit amet</p>"
        );
        assert_eq!(article.sections[0].body_text, "Lorem ipsum dolor sit amet");
        assert!(!article.is_edited());
    }

    #[tokio::test]
    async fn test_preview_ignores_slug() {
        let mut draft = post(9);
        draft.id = "draft".into();
        draft.first_publication_date = None;
        draft.last_publication_date = None;

        let service = MemoryService::new(vec![post(1).with_uid("my-slug")]).with_draft("ref-123", draft);

        let article = resolve_article(
            &service,
            &HtmlRenderer::default(),
            &ArticleLookup::new("my-slug", Some("ref-123".into())),
        )
        .await
        .expect("获取预览失败");

        assert_eq!(article.id, "draft");
        assert!(article.published_at.is_none());
        assert_eq!(service.calls(), vec!["get_single_by_ref:ref-123".to_string()]);
    }

    #[tokio::test]
    async fn test_not_found() {
        let service = MemoryService::new(vec![post(1)]);
        let renderer = HtmlRenderer::default();

        let by_slug =
            resolve_article(&service, &renderer, &ArticleLookup::BySlug("missing-slug".into()))
                .await;
        assert!(matches!(by_slug, Err(Error::NotFound)));

        let by_ref = resolve_article(
            &service,
            &renderer,
            &ArticleLookup::ByPreviewReference("expired".into()),
        )
        .await;
        assert!(matches!(by_ref, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_missing_data_is_validation_error() {
        let service = MemoryService::new(vec![RawDocument::new(POST_TYPE, "x").with_uid("empty")]);
        let result = resolve_article(
            &service,
            &HtmlRenderer::default(),
            &ArticleLookup::BySlug("empty".into()),
        )
        .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_missing_content_yields_empty_sections() {
        let mut doc = post(1);
        if let Some(data) = doc.data.as_mut() {
            data.content = None;
            data.banner = None;
        }
        let doc = doc.modified_at(base() + Duration::days(30));
        let article = ArticleDetail::from_raw(doc, &HtmlRenderer::default()).expect("规范化失败");

        assert!(article.sections.is_empty());
        assert_eq!(article.banner_url, "");
        assert!(article.is_edited());
    }

    #[tokio::test]
    async fn test_adjacent_articles() {
        let service = MemoryService::new((1..=4).map(post).collect());

        let middle = resolve_adjacent_articles(&service, post(2).first_publication_date)
            .await
            .expect("查询相邻文章失败");
        assert_eq!(
            middle.previous,
            Some(NavigationLink {
                slug: "post-1".into(),
                title: "Post 1".into()
            })
        );
        assert_eq!(middle.next.map(|n| n.slug), Some("post-3".to_string()));

        let first = resolve_adjacent_articles(&service, post(1).first_publication_date)
            .await
            .expect("查询相邻文章失败");
        assert!(first.previous.is_none());
        assert_eq!(first.next.map(|n| n.slug), Some("post-2".to_string()));

        let last = resolve_adjacent_articles(&service, post(4).first_publication_date)
            .await
            .expect("查询相邻文章失败");
        assert!(last.next.is_none());
        assert_eq!(last.previous.map(|n| n.slug), Some("post-3".to_string()));
    }

    #[tokio::test]
    async fn test_unpublished_has_no_neighbours() {
        let service = MemoryService::new((1..=3).map(post).collect());

        let adjacent = resolve_adjacent_articles(&service, None)
            .await
            .expect("查询相邻文章失败");
        assert_eq!(adjacent, AdjacentArticles::default());
        assert!(service.calls().is_empty(), "不应发起任何查询");
    }

    #[tokio::test]
    async fn test_adjacent_failure_propagates() {
        let service = MemoryService::new((1..=3).map(post).collect());
        service.fail_next(1);

        let result = resolve_adjacent_articles(&service, post(2).first_publication_date).await;
        assert!(result.is_err_and(|e| e.is_fetch()));
    }
}
