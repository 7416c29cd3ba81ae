use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::Query;
use serde::Deserialize;

use super::{Error, Result};

use crate::{
    article::ArticleLookup,
    page::{self, HomePage, PostPage},
    prismic::{ContentService, PageToken},
    state::AppState,
};

/// 配置文章相关路由。
///
/// 路由包括：
/// - `GET /posts`：首页文章列表，带 `next_page` 时返回下一页
/// - `GET /posts/{slug}`：单篇文章，带 `preview` 时读取草稿
/// - `GET /paths`：所有文章的 uid
pub fn setup_route<S: ContentService + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route("/posts", get(posts_list::<S>))
        .route("/posts/{slug}", get(post::<S>))
        .route("/paths", get(paths::<S>))
}

/// 列表查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    /// 上一页返回的游标
    next_page: Option<String>,
}

/// 文章查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PostParams {
    /// 预览引用
    preview: Option<String>,
}

/// 获取首页文章列表。
///
/// 未指定游标时返回第一页，否则返回游标指向的下一页。
async fn posts_list<S: ContentService>(
    Query(params): Query<ListParams>,
    State(app): State<AppState<S>>,
) -> Result<Response> {
    let page: HomePage = match params.next_page.filter(|t| !t.is_empty()) {
        Some(token) => {
            page::more_posts(app.service(), &PageToken::new(token), app.dates()).await?
        }
        None => page::home_page(app.service(), app.config().page_size, app.dates()).await?,
    };

    Ok(cached(app.config().revalidate.listing_secs, Json(page)))
}

/// 获取单篇文章。
///
/// 文章不存在时重定向到首页。
async fn post<S: ContentService>(
    Path(slug): Path<String>,
    Query(params): Query<PostParams>,
    State(app): State<AppState<S>>,
) -> Result<Response> {
    let lookup = ArticleLookup::new(slug, params.preview);

    let page: PostPage =
        match page::post_page(app.service(), app.renderer(), &lookup, app.dates()).await {
            Ok(page) => page,
            Err(Error::NotFound) => {
                tracing::debug!(?lookup, "post not found, redirecting");
                return Ok(Redirect::temporary("/").into_response());
            }
            Err(e) => return Err(e),
        };

    if lookup.is_preview() {
        return Ok((
            [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
            Json(page),
        )
            .into_response());
    }

    Ok(cached(app.config().revalidate.article_secs, Json(page)))
}

/// 获取所有文章的 uid，用于预先生成文章页。
async fn paths<S: ContentService>(State(app): State<AppState<S>>) -> Result<Json<Vec<String>>> {
    page::static_paths(app.service(), app.config().page_size)
        .await
        .map(Json)
}

/// 附带按重新生成间隔计算的缓存头
fn cached(secs: u64, body: impl IntoResponse) -> Response {
    let value = format!("s-maxage={secs}, stale-while-revalidate");
    match HeaderValue::from_str(&value) {
        Ok(value) => ([(header::CACHE_CONTROL, value)], body).into_response(),
        Err(_) => body.into_response(),
    }
}
