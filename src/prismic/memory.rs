use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use super::{
    ContentService, PageToken, Predicate, QueryOptions, RawDocument, RawPage, RawPostData,
    SortOrder,
};
use crate::error::{Error, Result};

/// 内容服务 Prismic 默认的每页条数
const DEFAULT_PAGE_SIZE: u32 = 20;

/// 保留的查询条数，更早查询的游标会失效
const QUERY_LOG_LIMIT: usize = 256;

type LoggedQuery = (Vec<Predicate>, QueryOptions);

/// 分页游标引用的查询记录，只保留最近 [`QUERY_LOG_LIMIT`] 条
#[derive(Default)]
struct QueryLog {
    evicted: usize,
    entries: VecDeque<LoggedQuery>,
}

impl QueryLog {
    /// 记录一次查询，返回其编号
    fn push(&mut self, query: LoggedQuery) -> usize {
        if self.entries.len() == QUERY_LOG_LIMIT {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(query);
        self.evicted + self.entries.len() - 1
    }

    fn get(&self, query_id: usize) -> Option<&LoggedQuery> {
        self.entries.get(query_id.checked_sub(self.evicted)?)
    }
}

/// 基于内存文档列表的 [`ContentService`] 实现
///
/// 按与远端相同的语义执行谓词、排序、字段裁剪与分页，仅用于本地夹具与测试。
/// 每次调用都会被记录，可通过 [`MemoryService::fail_next`] 让后续调用失败。
/// 分页游标只对最近的查询有效。
#[derive(Default)]
pub struct MemoryService {
    documents: Vec<RawDocument>,
    drafts: HashMap<String, RawDocument>,
    queries: Mutex<QueryLog>,
    calls: Mutex<Vec<String>>,
    failures: AtomicUsize,
}

impl MemoryService {
    pub fn new(documents: Vec<RawDocument>) -> Self {
        Self {
            documents,
            ..Default::default()
        }
    }

    /// 登记预览引用对应的草稿文档
    pub fn with_draft(mut self, reference: impl Into<String>, document: RawDocument) -> Self {
        self.drafts.insert(reference.into(), document);
        self
    }

    /// 让接下来的 `n` 次调用返回 [`Error::Fetch`]
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// 已发生的调用记录，如 `query`、`next_page`、`get_by_uid:slug`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.clone());
        }

        let pending = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match pending {
            Ok(_) => Err(Error::Fetch(format!("{call}: service unavailable"))),
            Err(_) => Ok(()),
        }
    }

    fn search(&self, query_id: usize, predicates: &[Predicate], options: &QueryOptions) -> RawPage {
        let mut matched: Vec<&RawDocument> = self
            .documents
            .iter()
            .filter(|doc| predicates.iter().all(|p| matches(p, doc)))
            .collect();

        for order in options.orderings.iter().rev() {
            match order {
                SortOrder::FirstPublicationAsc => {
                    matched.sort_by_key(|d| d.first_publication_date);
                }
                SortOrder::FirstPublicationDesc => {
                    matched.sort_by_key(|d| std::cmp::Reverse(d.first_publication_date));
                }
            }
        }

        let page = options.page.unwrap_or(1).max(1) as usize;
        let page_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1) as usize;

        let results = matched
            .iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .map(|doc| restrict((*doc).clone(), &options.fetch))
            .collect();

        let next_page =
            (page * page_size < matched.len()).then(|| encode_token(query_id, page + 1));

        RawPage { results, next_page }
    }
}

impl ContentService for MemoryService {
    async fn query(&self, predicates: &[Predicate], options: &QueryOptions) -> Result<RawPage> {
        self.record("query".to_string())?;

        let query_id = match self.queries.lock() {
            Ok(mut queries) => queries.push((predicates.to_vec(), options.clone())),
            Err(_) => return Err(Error::Fetch("query log poisoned".to_string())),
        };

        Ok(self.search(query_id, predicates, options))
    }

    async fn next_page(&self, token: &PageToken) -> Result<RawPage> {
        self.record("next_page".to_string())?;

        let (query_id, page) = decode_token(token)
            .ok_or_else(|| Error::Validation(format!("invalid page token: {token}")))?;

        let (predicates, options) = self
            .queries
            .lock()
            .ok()
            .and_then(|queries| queries.get(query_id).cloned())
            .ok_or_else(|| Error::Validation(format!("unknown page token: {token}")))?;

        Ok(self.search(query_id, &predicates, &options.page(page as u32)))
    }

    async fn get_by_uid(&self, doc_type: &str, uid: &str) -> Result<Option<RawDocument>> {
        self.record(format!("get_by_uid:{uid}"))?;

        let predicate = Predicate::uid(doc_type, uid);
        Ok(self
            .documents
            .iter()
            .find(|doc| matches(&predicate, doc))
            .cloned())
    }

    async fn get_single_by_ref(&self, doc_type: &str, reference: &str) -> Result<Option<RawDocument>> {
        self.record(format!("get_single_by_ref:{reference}"))?;

        Ok(self
            .drafts
            .get(reference)
            .filter(|doc| doc.doc_type == doc_type)
            .cloned())
    }
}

fn matches(predicate: &Predicate, doc: &RawDocument) -> bool {
    match predicate {
        Predicate::DocumentType(t) => &doc.doc_type == t,
        Predicate::Uid { doc_type, uid } => {
            &doc.doc_type == doc_type && doc.uid.as_deref() == Some(uid.as_str())
        }
        Predicate::PublishedAfter(at) => doc.first_publication_date.is_some_and(|d| d > *at),
        Predicate::PublishedBefore(at) => doc.first_publication_date.is_some_and(|d| d < *at),
    }
}

/// 按 `fetch` 字段裁剪 `data`，未指定时原样返回
fn restrict(mut doc: RawDocument, fetch: &[String]) -> RawDocument {
    if fetch.is_empty() {
        return doc;
    }

    let keep = |name: &str| fetch.iter().any(|f| f.rsplit('.').next() == Some(name));

    doc.data = doc.data.map(|data| RawPostData {
        title: data.title.filter(|_| keep("title")),
        subtitle: data.subtitle.filter(|_| keep("subtitle")),
        author: data.author.filter(|_| keep("author")),
        banner: data.banner.filter(|_| keep("banner")),
        content: data.content.filter(|_| keep("content")),
    });
    doc
}

fn encode_token(query_id: usize, page: usize) -> PageToken {
    PageToken::new(format!("memory:{query_id}:{page}"))
}

fn decode_token(token: &PageToken) -> Option<(usize, usize)> {
    let rest = token.as_str().strip_prefix("memory:")?;
    let (query_id, page) = rest.split_once(':')?;
    Some((query_id.parse().ok()?, page.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, TimeZone};

    use super::*;

    fn post(n: i64) -> RawDocument {
        let base = Local.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap();
        RawDocument::new("post", format!("id-{n}"))
            .with_uid(format!("post-{n}"))
            .published_at(base + Duration::days(n))
            .with_data(RawPostData::new(format!("Post {n}"), "sub", "author"))
    }

    #[tokio::test]
    async fn test_query_paginates_with_tokens() {
        let service = MemoryService::new((1..=5).map(post).collect());

        let first = service
            .query(
                &[Predicate::document_type("post")],
                &QueryOptions::default().page(1).page_size(2),
            )
            .await
            .expect("查询失败");
        assert_eq!(first.results.len(), 2);
        let token = first.next_page.expect("应当有下一页");

        let second = service.next_page(&token).await.expect("查询失败");
        assert_eq!(second.results[0].id, "id-3");

        let third = service
            .next_page(&second.next_page.expect("应当有下一页"))
            .await
            .expect("查询失败");
        assert_eq!(third.results.len(), 1);
        assert!(third.next_page.is_none());
    }

    #[tokio::test]
    async fn test_query_filters_and_orders_by_date() {
        let service = MemoryService::new((1..=5).map(post).collect());
        let pivot = post(3).first_publication_date.unwrap();

        let before = service
            .query(
                &[
                    Predicate::document_type("post"),
                    Predicate::PublishedBefore(pivot),
                ],
                &QueryOptions::default().order_by(SortOrder::FirstPublicationDesc),
            )
            .await
            .expect("查询失败");

        let ids: Vec<_> = before.results.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["id-2", "id-1"]);
    }

    #[tokio::test]
    async fn test_fetch_restricts_fields() {
        let mut doc = post(1);
        if let Some(data) = doc.data.as_mut() {
            data.content = Some(Vec::new());
        }
        let service = MemoryService::new(vec![doc]);

        let page = service
            .query(&[], &QueryOptions::default().fetch(["post.title"]))
            .await
            .expect("查询失败");
        let data = page.results[0].data.clone().expect("缺少 data");
        assert!(data.title.is_some());
        assert!(data.author.is_none());
        assert!(data.content.is_none());
    }

    #[tokio::test]
    async fn test_fail_next_and_calls() {
        let service = MemoryService::new(vec![post(1)]);
        service.fail_next(1);

        assert!(service.get_by_uid("post", "post-1").await.is_err());
        let doc = service.get_by_uid("post", "post-1").await.expect("查询失败");
        assert_eq!(doc.map(|d| d.id), Some("id-1".to_string()));
        assert_eq!(
            service.calls(),
            vec!["get_by_uid:post-1".to_string(), "get_by_uid:post-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_old_query_tokens_expire() {
        let service = MemoryService::new((1..=2).map(post).collect());
        let options = QueryOptions::default().page_size(1);

        let mut tokens = Vec::new();
        for _ in 0..=QUERY_LOG_LIMIT {
            let page = service.query(&[], &options).await.expect("查询失败");
            tokens.push(page.next_page.expect("应当有下一页"));
        }

        let expired = service.next_page(&tokens[0]).await;
        assert!(matches!(expired, Err(Error::Validation(_))));

        let latest = service
            .next_page(&tokens[QUERY_LOG_LIMIT])
            .await
            .expect("最近的游标应当有效");
        assert_eq!(latest.results[0].id, "id-2");
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let service = MemoryService::default();
        let result = service.next_page(&PageToken::new("memory:7:2")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
