//! Search engine client for the Elasticsearch/OpenSearch document API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::application::repos::SearchRequest;
use crate::domain::entities::ArticleRecord;
use crate::search::{SearchEngine, SearchEngineError, SearchHits};

const SEARCH_FIELDS: [&str; 3] = ["title^3", "excerpt^2", "body"];
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Clone, Debug)]
pub struct HttpSearchEngine {
    client: Client,
    base: Url,
    index: String,
}

impl HttpSearchEngine {
    pub fn new(url: &str, index: &str, timeout: Duration) -> Result<Self, SearchEngineError> {
        let mut base = Url::parse(url).map_err(SearchEngineError::transport)?;
        // keep any proxy path prefix; `join` replaces the last segment otherwise
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(SearchEngineError::transport)?;
        Ok(Self {
            client,
            base,
            index: index.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, SearchEngineError> {
        self.base
            .join(&format!("{}/{path}", self.index))
            .map_err(SearchEngineError::transport)
    }
}

#[async_trait]
impl SearchEngine for HttpSearchEngine {
    async fn health(&self) -> Result<(), SearchEngineError> {
        let response = self
            .client
            .get(self.base.clone())
            .send()
            .await
            .map_err(SearchEngineError::transport)?;
        ensure_success(response).await.map(|_| ())
    }

    async fn index(&self, article: &ArticleRecord) -> Result<(), SearchEngineError> {
        if article.is_deleted() {
            return self.remove(article.id).await;
        }

        let response = self
            .client
            .put(self.url(&format!("_doc/{}", article.id))?)
            .json(&document(article))
            .send()
            .await
            .map_err(SearchEngineError::transport)?;
        ensure_success(response).await.map(|_| ())
    }

    async fn remove(&self, id: Uuid) -> Result<(), SearchEngineError> {
        let response = self
            .client
            .delete(self.url(&format!("_doc/{id}"))?)
            .send()
            .await
            .map_err(SearchEngineError::transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await.map(|_| ())
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchHits, SearchEngineError> {
        let response = self
            .client
            .post(self.url("_search")?)
            .json(&search_body(request))
            .send()
            .await
            .map_err(SearchEngineError::transport)?;
        let response = ensure_success(response).await?;
        let body: Value = response.json().await.map_err(SearchEngineError::decode)?;
        parse_hits(body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SearchEngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(SearchEngineError::Status {
        status: status.as_u16(),
        body,
    })
}

fn document(article: &ArticleRecord) -> Value {
    json!({
        "slug": article.slug,
        "title": article.title,
        "excerpt": article.excerpt,
        "body": article.body,
        "status": article.status.as_str(),
        "author_id": article.author_id,
        "category_id": article.category_id,
        "tags": article.tags,
        "published_at": article.published_at.map(|at| at.unix_timestamp()),
    })
}

fn search_body(request: &SearchRequest) -> Value {
    let request = request.normalized();

    let mut filters = Vec::new();
    if let Some(status) = request.status {
        filters.push(json!({ "term": { "status": status.as_str() } }));
    }
    if let Some(category_id) = request.category_id {
        filters.push(json!({ "term": { "category_id": category_id } }));
    }
    if let Some(author_id) = request.author_id {
        filters.push(json!({ "term": { "author_id": author_id } }));
    }

    json!({
        "from": request.offset(),
        "size": request.page_size,
        "_source": false,
        "track_total_hits": true,
        "query": {
            "bool": {
                "must": [{
                    "multi_match": {
                        "query": request.term,
                        "fields": SEARCH_FIELDS,
                    }
                }],
                "filter": filters,
            }
        }
    })
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    total: TotalHits,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
}

fn parse_hits(body: Value) -> Result<SearchHits, SearchEngineError> {
    let response: SearchResponse =
        serde_json::from_value(body).map_err(SearchEngineError::decode)?;

    let mut ids = Vec::with_capacity(response.hits.hits.len());
    for hit in response.hits.hits {
        match Uuid::parse_str(&hit.id) {
            Ok(id) => ids.push(id),
            Err(_) => debug!(doc_id = %hit.id, "Ignoring search hit with foreign id"),
        }
    }

    Ok(SearchHits {
        ids,
        total: response.hits.total.value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ArticleStatus;

    #[test]
    fn search_body_weights_fields_and_pages() {
        let request = SearchRequest {
            term: "  write behind ".to_string(),
            page: 3,
            page_size: 10,
            status: Some(ArticleStatus::Published),
            ..Default::default()
        };

        let body = search_body(&request);
        assert_eq!(body["from"], 20);
        assert_eq!(body["size"], 10);
        let multi_match = &body["query"]["bool"]["must"][0]["multi_match"];
        assert_eq!(multi_match["query"], "write behind");
        assert_eq!(multi_match["fields"], json!(["title^3", "excerpt^2", "body"]));
        assert_eq!(
            body["query"]["bool"]["filter"][0]["term"]["status"],
            "published"
        );
    }

    #[test]
    fn hits_keep_engine_order_and_skip_foreign_ids() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let body = json!({
            "hits": {
                "total": { "value": 42, "relation": "eq" },
                "hits": [
                    { "_id": second.to_string(), "_score": 2.0 },
                    { "_id": "not-a-uuid", "_score": 1.5 },
                    { "_id": first.to_string(), "_score": 1.0 }
                ]
            }
        });

        let hits = parse_hits(body).expect("hits");
        assert_eq!(hits.ids, vec![second, first]);
        assert_eq!(hits.total, 42);
    }

    #[test]
    fn malformed_response_is_a_decode_error() {
        assert!(matches!(
            parse_hits(json!({ "error": "boom" })),
            Err(SearchEngineError::Decode(_))
        ));
    }

    #[test]
    fn index_urls_are_scoped_to_the_index() {
        let engine =
            HttpSearchEngine::new("http://localhost:9200", "articles", Duration::from_secs(1))
                .expect("engine");
        let url = engine.url("_search").expect("url");
        assert_eq!(url.as_str(), "http://localhost:9200/articles/_search");
    }

    #[test]
    fn proxy_path_prefixes_are_kept() {
        for configured in ["http://proxy/es", "http://proxy/es/"] {
            let engine = HttpSearchEngine::new(configured, "articles", Duration::from_secs(1))
                .expect("engine");
            let url = engine.url("_doc/1").expect("url");
            assert_eq!(url.as_str(), "http://proxy/es/articles/_doc/1");
        }
    }
}
