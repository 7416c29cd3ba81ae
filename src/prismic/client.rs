use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use url::Url;

use super::{
    ContentService, PageToken, Predicate, QueryOptions, RawDocument, RawPage, to_query_param,
};
use crate::{
    config::PrismicConfig,
    error::{Error, Result},
};

/// PrismicClient 通过 HTTP 访问内容服务的查询 API。
///
/// 每次查询前都会从 API 根地址读取当前的 master ref，不做缓存。
#[derive(Clone)]
pub struct PrismicClient {
    client: reqwest::Client,
    endpoint: Url,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct ApiRoot {
    refs: Vec<ApiRef>,
}

#[derive(Deserialize)]
struct ApiRef {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(default, rename = "isMasterRef")]
    is_master_ref: bool,
}

impl PrismicClient {
    /// 使用 [`PrismicConfig`] 创建客户端
    ///
    /// ```ignore
    /// let client = PrismicClient::new(&config.prismic)?;
    /// ```
    pub fn new(config: &PrismicConfig) -> Result<Self> {
        let endpoint = Url::parse(config.endpoint.trim())
            .map_err(|e| Error::Config(format!("invalid endpoint {}: {e}", config.endpoint)))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "invalid endpoint {}",
                config.endpoint
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .default_headers({
                let mut header = HeaderMap::new();
                header.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
                header
            })
            .build()?;

        Ok(Self {
            client,
            endpoint,
            access_token: config.access_token.clone(),
        })
    }

    /// 读取 API 根地址中的 master ref
    async fn master_ref(&self) -> Result<String> {
        let mut url = self.endpoint.clone();
        if let Some(token) = &self.access_token {
            url.query_pairs_mut().append_pair("access_token", token);
        }

        let root: ApiRoot = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        root.refs
            .into_iter()
            .find(|r| r.is_master_ref)
            .map(|r| r.reference)
            .ok_or_else(|| Error::Fetch("api root has no master ref".to_string()))
    }

    /// 不带查询参数的 `documents/search` 地址
    fn search_base(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.set_query(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["documents", "search"]);
        }
        url
    }

    /// 构造 `documents/search` 请求地址
    fn search_url(&self, reference: &str, predicates: &[Predicate], options: &QueryOptions) -> Url {
        let mut url = self.search_base();

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("ref", reference);
            if !predicates.is_empty() {
                query.append_pair("q", &to_query_param(predicates));
            }
            if let Some(page) = options.page {
                query.append_pair("page", &page.to_string());
            }
            if let Some(page_size) = options.page_size {
                query.append_pair("pageSize", &page_size.to_string());
            }
            if let Some(orderings) = options.orderings_param() {
                query.append_pair("orderings", &orderings);
            }
            if !options.fetch.is_empty() {
                query.append_pair("fetch", &options.fetch.join(","));
            }
            if let Some(token) = &self.access_token {
                query.append_pair("access_token", token);
            }
        }

        url
    }

    /// 解析分页游标
    ///
    /// 游标必须指向配置的内容服务的 `documents/search`，否则不会发起请求，
    /// access token 也只会附加到这样的地址上。
    fn page_url(&self, token: &PageToken) -> Result<Url> {
        let mut url = Url::parse(token.as_str())
            .map_err(|e| Error::Validation(format!("invalid page token: {e}")))?;

        let base = self.search_base();
        if url.origin() != base.origin() || url.path() != base.path() {
            return Err(Error::Validation(format!(
                "page token does not point at {base}: {token}"
            )));
        }

        if let Some(access_token) = &self.access_token {
            if !url.query_pairs().any(|(k, _)| k == "access_token") {
                url.query_pairs_mut().append_pair("access_token", access_token);
            }
        }

        Ok(url)
    }

    async fn search(&self, url: Url) -> Result<RawPage> {
        tracing::debug!(%url, "content query");

        let page = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(page)
    }
}

impl ContentService for PrismicClient {
    async fn query(&self, predicates: &[Predicate], options: &QueryOptions) -> Result<RawPage> {
        let reference = self.master_ref().await?;
        self.search(self.search_url(&reference, predicates, options))
            .await
    }

    async fn next_page(&self, token: &PageToken) -> Result<RawPage> {
        let url = self.page_url(token)?;
        self.search(url).await
    }

    async fn get_single_by_ref(&self, doc_type: &str, reference: &str) -> Result<Option<RawDocument>> {
        let url = self.search_url(
            reference,
            &[Predicate::document_type(doc_type)],
            &QueryOptions::default().page_size(1),
        );
        let page = self.search(url).await?;
        Ok(page.results.into_iter().next())
    }
}
