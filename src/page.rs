use chrono::{DateTime, Local, Locale};
use serde::Serialize;
use tracing::instrument;

use crate::{
    article::{
        self, ArticleDetail, ArticleLookup, NavigationLink, reading_time_minutes,
        resolve_adjacent_articles, resolve_article,
    },
    error::Result,
    listing::{self, ArticleSummary, Listing, ListingPage, fetch_initial_listing},
    prismic::{ContentService, PageToken},
    richtext::RichTextRenderer,
};

/// 按区域格式化日期
#[derive(Debug, Clone, Copy)]
pub struct DateFormatter {
    locale: Locale,
}

impl DateFormatter {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    /// `15 mar 2021`
    pub fn date(&self, at: &DateTime<Local>) -> String {
        at.format_localized("%d %b %Y", self.locale).to_string()
    }

    /// `* editado em 19 mar 2021, às 15:49`
    pub fn edited(&self, at: &DateTime<Local>) -> String {
        at.format_localized("* editado em %d %b %Y, às %H:%M", self.locale)
            .to_string()
    }
}

impl Default for DateFormatter {
    fn default() -> Self {
        Self::new(Locale::pt_BR)
    }
}

/// 首页卡片
#[derive(Debug, Serialize)]
pub struct PostCard {
    pub id: String,
    pub uid: Option<String>,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    /// 毫秒时间戳
    pub first_publication_date: Option<i64>,
    /// 格式化后的发布日期
    pub published: Option<String>,
}

impl PostCard {
    fn new(summary: ArticleSummary, dates: &DateFormatter) -> Self {
        Self {
            published: summary.published_at.as_ref().map(|at| dates.date(at)),
            first_publication_date: summary.published_at.map(|at| at.timestamp_millis()),
            id: summary.id,
            uid: summary.slug,
            title: summary.title,
            subtitle: summary.subtitle,
            author: summary.author,
        }
    }
}

/// 首页（或"加载更多"返回的一页）
#[derive(Debug, Serialize)]
pub struct HomePage {
    pub results: Vec<PostCard>,
    pub next_page: Option<String>,
}

impl HomePage {
    pub fn new(page: ListingPage, dates: &DateFormatter) -> Self {
        Self {
            results: page
                .results
                .into_iter()
                .map(|s| PostCard::new(s, dates))
                .collect(),
            next_page: page.next_page.map(|t| t.as_str().to_string()),
        }
    }
}

/// 首页第一页
pub async fn home_page<S: ContentService>(
    service: &S,
    page_size: u32,
    dates: &DateFormatter,
) -> Result<HomePage> {
    let page = fetch_initial_listing(service, page_size).await?;
    Ok(HomePage::new(page, dates))
}

/// "加载更多"：按游标获取下一页
pub async fn more_posts<S: ContentService>(
    service: &S,
    token: &PageToken,
    dates: &DateFormatter,
) -> Result<HomePage> {
    let page = listing::fetch_next_listing(service, token).await?;
    Ok(HomePage::new(page, dates))
}

#[derive(Debug, Serialize)]
pub struct SectionView {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct PostView {
    pub id: String,
    pub uid: Option<String>,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub banner_url: String,
    pub first_publication_date: Option<i64>,
    pub last_publication_date: Option<i64>,
    pub content: Vec<SectionView>,
}

/// 文章页
#[derive(Debug, Serialize)]
pub struct PostPage {
    pub post: PostView,
    /// 阅读时间（分钟）
    pub reading_time: u32,
    pub published: Option<String>,
    /// 编辑过的文章才有
    pub edited: Option<String>,
    pub previous: Option<NavigationLink>,
    pub next: Option<NavigationLink>,
    pub preview: bool,
}

impl PostPage {
    pub fn new(
        article: ArticleDetail,
        adjacent: article::AdjacentArticles,
        preview: bool,
        dates: &DateFormatter,
    ) -> Self {
        let reading_time = reading_time_minutes(&article);
        let published = article.published_at.as_ref().map(|at| dates.date(at));
        let edited = article
            .last_modified_at
            .as_ref()
            .filter(|_| article.is_edited())
            .map(|at| dates.edited(at));

        Self {
            post: PostView {
                first_publication_date: article.published_at.map(|at| at.timestamp_millis()),
                last_publication_date: article.last_modified_at.map(|at| at.timestamp_millis()),
                id: article.id,
                uid: article.slug,
                title: article.title,
                subtitle: article.subtitle,
                author: article.author,
                banner_url: article.banner_url,
                content: article
                    .sections
                    .into_iter()
                    .map(|s| SectionView {
                        heading: s.heading,
                        body: s.body_html,
                    })
                    .collect(),
            },
            reading_time,
            published,
            edited,
            previous: adjacent.previous,
            next: adjacent.next,
            preview,
        }
    }
}

/// 文章页：文章本身、阅读时间与前后文章
///
/// 相邻文章依赖文章的发布时间，因此在文章之后查询。
#[instrument(skip(service, renderer, dates))]
pub async fn post_page<S, R>(
    service: &S,
    renderer: &R,
    lookup: &ArticleLookup,
    dates: &DateFormatter,
) -> Result<PostPage>
where
    S: ContentService,
    R: RichTextRenderer,
{
    let article = resolve_article(service, renderer, lookup).await?;
    let adjacent = resolve_adjacent_articles(service, article.published_at).await?;
    Ok(PostPage::new(article, adjacent, lookup.is_preview(), dates))
}

/// 需要预先生成的所有文章路径
///
/// 沿分页游标一直读到最后一页，按 id 去重后返回 uid。
#[instrument(skip(service))]
pub async fn static_paths<S: ContentService>(service: &S, page_size: u32) -> Result<Vec<String>> {
    let mut listing = Listing::from(fetch_initial_listing(service, page_size).await?);
    listing.load_all(service).await?;

    Ok(listing
        .results
        .into_iter()
        .filter_map(|summary| summary.slug)
        .collect())
}
