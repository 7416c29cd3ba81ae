use axum::{
    Router,
    body::{Body, to_bytes},
    extract::Request,
    http::{Response, StatusCode, header},
};
use chrono::{Duration, Local, TimeZone};

use spacetravelling::{
    api,
    config::Config,
    prismic::{MemoryService, POST_TYPE, RawContentGroup, RawDocument, RawPostData},
    richtext::{Block, RichText},
    state::AppState,
};
use tower::util::ServiceExt;

struct TestApp {
    router: Router,
}

fn post(n: i64) -> RawDocument {
    let base = Local.with_ymd_and_hms(2021, 3, 15, 19, 25, 0).unwrap();
    let mut data = RawPostData::new(format!("Post {n}"), "subtitle", "Joseph Oliveira");
    data.content = Some(vec![RawContentGroup {
        heading: Some("Proin et varius".to_string()),
        body: RichText(vec![Block::paragraph("Lorem ipsum dolor sit amet")]),
    }]);

    RawDocument::new(POST_TYPE, format!("id-{n}"))
        .with_uid(format!("post-{n}"))
        .published_at(base + Duration::days(n))
        .with_data(data)
}

impl TestApp {
    fn new() -> Self {
        let mut draft = post(9);
        draft.id = "draft".to_string();
        draft.first_publication_date = None;
        draft.last_publication_date = None;

        let service = MemoryService::new((0..3).map(post).collect()).with_draft("ref-123", draft);

        let mut config = Config::default();
        config.prismic.endpoint = "memory://".to_string();

        let app = AppState::new(service, config).expect("初始化应用失败");
        Self {
            router: api::setup_route(app),
        }
    }

    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(req)
            .await
            .expect("oneshot fail")
    }

    async fn get(&self, uri: &str) -> Response<Body> {
        let req = Request::get(uri).body(Body::empty()).expect("请求失败");
        self.request(req).await
    }

    async fn get_json(&self, uri: &str, msg: &str) -> (Option<String>, serde_json::Value) {
        let resp = self.get(uri).await;
        assert_eq!(StatusCode::OK, resp.status(), "{}", msg);

        let cache = resp
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let data = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("读取数据失败");
        let json = serde_json::from_slice(&data).expect("反序列化失败");
        (cache, json)
    }
}

#[tokio::test]
async fn test_listing_and_load_more() {
    let app = TestApp::new();

    let (cache, first) = app.get_json("/api/posts", "获取首页").await;
    assert_eq!(cache.as_deref(), Some("s-maxage=60, stale-while-revalidate"));
    assert_eq!(first["results"].as_array().map(Vec::len), Some(2));
    assert_eq!(first["results"][0]["uid"], "post-0");
    assert_eq!(first["results"][0]["published"], "15 mar 2021");

    let token = first["next_page"].as_str().expect("应当有下一页");
    let (_, more) = app
        .get_json(&format!("/api/posts?next_page={token}"), "加载更多")
        .await;
    assert_eq!(more["results"].as_array().map(Vec::len), Some(1));
    assert_eq!(more["results"][0]["uid"], "post-2");
    assert!(more["next_page"].is_null());
}

#[tokio::test]
async fn test_post_page() {
    let app = TestApp::new();

    let (cache, page) = app.get_json("/api/posts/post-1", "获取文章").await;
    assert_eq!(
        cache.as_deref(),
        Some("s-maxage=3600, stale-while-revalidate")
    );
    assert_eq!(page["post"]["title"], "Post 1");
    assert_eq!(page["reading_time"], 1);
    assert_eq!(page["published"], "16 mar 2021");
    assert!(page["edited"].is_null());
    assert_eq!(page["previous"]["slug"], "post-0");
    assert_eq!(page["next"]["slug"], "post-2");
    assert_eq!(
        page["post"]["content"][0]["body"],
        "<p>Lorem ipsum dolor sit amet</p>"
    );
}

#[tokio::test]
async fn test_missing_post_redirects_home() {
    let app = TestApp::new();

    let resp = app.get("/api/posts/missing-slug").await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        resp.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/")
    );
}

#[tokio::test]
async fn test_preview_reads_draft() {
    let app = TestApp::new();

    let (cache, page) = app
        .get_json("/api/posts/post-1?preview=ref-123", "获取预览")
        .await;
    assert_eq!(cache.as_deref(), Some("no-store"));
    assert_eq!(page["post"]["id"], "draft");
    assert_eq!(page["preview"], true);
    assert!(page["previous"].is_null());
    assert!(page["next"].is_null());
}

#[tokio::test]
async fn test_static_paths() {
    let app = TestApp::new();

    let (_, paths) = app.get_json("/api/paths", "获取路径").await;
    assert_eq!(paths, serde_json::json!(["post-0", "post-1", "post-2"]));
}

#[tokio::test]
async fn test_foreign_page_token_is_rejected() {
    let app = TestApp::new();

    let resp = app
        .get("/api/posts?next_page=http%3A%2F%2F127.0.0.1%3A9%2Fsteal")
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}
