use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

const API_VERSION: &str = "2024-07-01";
const SEMANTIC_CONFIGURATION: &str = "default";
const VECTOR_NEIGHBORS: usize = 50;
const VECTOR_FIELD: &str = "text_vector";
const SELECT_FIELDS: [&str; 2] = ["chunk_id", "chunk"];
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRecord {
    pub id: String,
    pub content: String,
}

/// Retrieval backend used by the product information tool.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchRecord>>;
}

/// `[{id}]: {content}` blocks separated by `-----` lines; empty for no records.
#[must_use]
pub fn format_results(records: &[SearchRecord]) -> String {
    records
        .iter()
        .map(|r| format!("[{}]: {}\n-----\n", r.id, r.content))
        .collect()
}

/// Hybrid (semantic + vector) queries against an Azure AI Search index.
#[derive(Clone, Debug)]
pub struct AzureSearchBackend {
    client: Client,
    search_url: Url,
    api_key: HeaderValue,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    chunk_id: String,
    #[serde(default)]
    chunk: String,
}

impl AzureSearchBackend {
    /// # Errors
    /// Returns an error if the endpoint is not a valid URL, the key is not a
    /// valid header value, or the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(endpoint: &str, index: &str, api_key: &str) -> Result<Self> {
        let mut search_url = Url::parse(endpoint)?;
        let path = format!(
            "{}/indexes/{index}/docs/search",
            search_url.path().trim_end_matches('/')
        );
        search_url.set_path(&path);
        search_url.query_pairs_mut().clear().append_pair("api-version", API_VERSION);

        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        let mut api_key = HeaderValue::from_str(api_key)?;
        api_key.set_sensitive(true);

        Ok(Self { client, search_url, api_key })
    }

    #[must_use]
    pub const fn search_url(&self) -> &Url {
        &self.search_url
    }
}

fn request_body(query: &str, top: usize) -> Value {
    json!({
        "search": query,
        "queryType": "semantic",
        "semanticConfiguration": SEMANTIC_CONFIGURATION,
        "top": top,
        "select": SELECT_FIELDS.join(", "),
        "vectorQueries": [{
            "kind": "text",
            "text": query,
            "k": VECTOR_NEIGHBORS,
            "fields": VECTOR_FIELD,
        }],
    })
}

#[async_trait]
impl SearchBackend for AzureSearchBackend {
    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchRecord>> {
        tracing::debug!(query, top, "Querying search index");
        let res: SearchResponse = self
            .client
            .post(self.search_url.clone())
            .header("api-key", &self.api_key)
            .json(&request_body(query, top))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(res
            .value
            .into_iter()
            .take(top)
            .map(|hit| SearchRecord { id: hit.chunk_id, content: hit.chunk })
            .collect())
    }
}

/// Offline product catalog keyed by keyword.
#[derive(Debug, Clone)]
pub struct KeywordCatalog {
    entries: Vec<(String, String)>,
}

impl Default for KeywordCatalog {
    fn default() -> Self {
        Self::new([
            (
                "limite",
                "O limite do seu cartão de crédito pode variar conforme o uso e o perfil financeiro. Para mais detalhes, acesse o app PagBank.",
            ),
            (
                "benefícios",
                "Os benefícios do cartão incluem cashback, descontos em parceiros e programa de pontos. Consulte o app PagBank para mais informações.",
            ),
            (
                "taxas",
                "As taxas do cartão incluem anuidade, juros por atraso e tarifas de serviços. Detalhes completos estão disponíveis no app PagBank.",
            ),
        ])
    }
}

impl KeywordCatalog {
    /// Entries are matched in order; the first keyword found in the query wins.
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl SearchBackend for KeywordCatalog {
    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchRecord>> {
        let query = query.to_lowercase();
        Ok(self
            .entries
            .iter()
            .find(|(keyword, _)| query.contains(keyword.as_str()))
            .into_iter()
            .take(top)
            .map(|(keyword, content)| SearchRecord { id: keyword.clone(), content: content.clone() })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use tokio::net::TcpListener;

    #[test]
    fn results_are_concatenated_with_separators() {
        let records = vec![
            SearchRecord { id: "doc_1".to_string(), content: "primeiro".to_string() },
            SearchRecord { id: "doc_2".to_string(), content: "segundo".to_string() },
        ];
        assert_eq!(
            format_results(&records),
            "[doc_1]: primeiro\n-----\n[doc_2]: segundo\n-----\n"
        );
        assert_eq!(format_results(&[]), "");
    }

    #[test]
    fn hybrid_query_body() {
        let body = request_body("limite do cartão", 5);
        assert_eq!(body["search"], "limite do cartão");
        assert_eq!(body["queryType"], "semantic");
        assert_eq!(body["top"], 5);
        assert_eq!(body["select"], "chunk_id, chunk");
        assert_eq!(body["vectorQueries"][0]["k"], 50);
        assert_eq!(body["vectorQueries"][0]["fields"], "text_vector");
    }

    #[test]
    fn search_url_targets_index() {
        let backend = AzureSearchBackend::new("https://search.example.net/", "produtos", "k").unwrap();
        assert_eq!(
            backend.search_url().as_str(),
            "https://search.example.net/indexes/produtos/docs/search?api-version=2024-07-01"
        );
    }

    #[tokio::test]
    async fn catalog_matches_case_insensitively() {
        let catalog = KeywordCatalog::default();
        let hits = catalog.search("Quais são as TAXAS?", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "taxas");

        let hits = catalog.search("Quais são os Benefícios?", 5).await.unwrap();
        assert_eq!(hits[0].id, "benefícios");

        assert!(catalog.search("horário de atendimento", 5).await.unwrap().is_empty());
    }

    async fn fake_index(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if headers.get("api-key").and_then(|v| v.to_str().ok()) != Some("secret") {
            return (StatusCode::UNAUTHORIZED, Json(json!({})));
        }
        let query = body["search"].as_str().unwrap_or_default().to_string();
        (
            StatusCode::OK,
            Json(json!({
                "value": [
                    { "@search.score": 2.1, "chunk_id": "c1", "chunk": format!("sobre {query}") },
                    { "@search.score": 1.4, "chunk_id": "c2", "chunk": "outro" }
                ]
            })),
        )
    }

    async fn serve_fake_index() -> String {
        let app = axum::Router::new().route("/indexes/{index}/docs/search", post(fake_index));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn azure_backend_maps_hits() {
        let endpoint = serve_fake_index().await;
        let backend = AzureSearchBackend::new(&endpoint, "produtos", "secret").unwrap();
        let records = backend.search("limite", 5).await.unwrap();
        assert_eq!(
            records,
            vec![
                SearchRecord { id: "c1".to_string(), content: "sobre limite".to_string() },
                SearchRecord { id: "c2".to_string(), content: "outro".to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn azure_backend_surfaces_http_errors() {
        let endpoint = serve_fake_index().await;
        let backend = AzureSearchBackend::new(&endpoint, "produtos", "wrong").unwrap();
        let err = backend.search("limite", 5).await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
