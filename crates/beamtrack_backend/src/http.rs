use std::time::Duration;

use async_trait::async_trait;
use beamtrack_contract::{
    decode_collection, decode_document, encode_document, ApiError, AppInfo, Beam, BeamAlias,
    BeamCriteria, BeamFile, BeamId, CodecError, FileQuery, Issue, IssueId, PageRequest,
    PagedResult, StorageSummary, TagSummary, Tracker, TrackerId, User, UserId,
};
use beamtrack_transfer::NewBeamRequest;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::BeamBackend;

const JSON: &str = "application/json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            auth_token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid backend url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// REST client for the beam service.
#[derive(Debug, Clone)]
pub struct HttpBeamBackend {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpBeamBackend {
    pub fn new(config: &HttpBackendConfig) -> Result<Self, ClientBuildError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|err| ClientBuildError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: err.to_string(),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(ClientBuildError::Client)?;

        Ok(Self {
            client,
            base_url,
            auth_token: config
                .auth_token
                .clone()
                .filter(|token| !token.trim().is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header(reqwest::header::ACCEPT, JSON);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        let status = response.status();
        let url = response.url().path().to_string();
        let body = response
            .bytes()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;

        if !status.is_success() {
            warn!(%status, path = %url, "backend rejected request");
            return Err(ApiError::with_detail(status, error_detail(&body)));
        }

        debug!(%status, path = %url, bytes = body.len(), "backend request completed");
        Ok(body.to_vec())
    }

    async fn send_document(
        &self,
        builder: RequestBuilder,
        root: &str,
        payload: &impl Serialize,
    ) -> Result<Vec<u8>, ApiError> {
        let body = encode_document(root, payload).map_err(decode_error)?;
        self.send(builder.header(CONTENT_TYPE, JSON).body(body))
            .await
    }
}

fn decode_error(error: CodecError) -> ApiError {
    ApiError::Decode(error.to_string())
}

fn decode_plain<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::Decode(err.to_string()))
}

/// Pulls `detail` out of an error body, falling back to the raw text.
fn error_detail(body: &[u8]) -> String {
    if let Ok(Value::Object(document)) = serde_json::from_slice::<Value>(body) {
        if let Some(Value::String(detail)) = document.get("detail") {
            return detail.clone();
        }
    }
    String::from_utf8_lossy(body).trim().to_string()
}

#[derive(Serialize)]
struct PinRequest {
    beam_id: BeamId,
    should_pin: bool,
}

#[async_trait]
impl BeamBackend for HttpBeamBackend {
    async fn query_beams(
        &self,
        criteria: &BeamCriteria,
        request: PageRequest,
    ) -> Result<PagedResult<Beam>, ApiError> {
        let mut pairs = criteria.query_pairs();
        pairs.push(("page", request.page.to_string()));
        pairs.push(("per_page", request.per_page.to_string()));

        let body = self
            .send(self.request(Method::GET, "/beams").query(&pairs))
            .await?;
        let (items, meta) = decode_collection("beams", &body).map_err(decode_error)?;
        Ok(PagedResult {
            items,
            meta,
            request,
        })
    }

    async fn get_beam(&self, beam_id: BeamId) -> Result<Beam, ApiError> {
        let body = self
            .send(self.request(Method::GET, &format!("/beams/{beam_id}")))
            .await?;
        decode_document("beam", &body).map_err(decode_error)
    }

    async fn query_files(&self, query: &FileQuery) -> Result<PagedResult<BeamFile>, ApiError> {
        let mut pairs = vec![
            ("beam_id", query.beam_id.to_string()),
            ("offset", query.offset.to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(filter) = &query.filter {
            pairs.push(("filter", filter.clone()));
        }

        let body = self
            .send(self.request(Method::GET, "/files").query(&pairs))
            .await?;
        let (items, meta) = decode_collection("files", &body).map_err(decode_error)?;
        let per_page = query.limit.max(1);
        let page = u32::try_from(query.offset / u64::from(per_page))
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        Ok(PagedResult {
            items,
            meta,
            request: PageRequest::new(page, per_page),
        })
    }

    async fn create_beam(&self, request: &NewBeamRequest) -> Result<Beam, ApiError> {
        let body = self
            .send_document(self.request(Method::POST, "/beams"), "beam", request)
            .await?;
        decode_document("beam", &body).map_err(decode_error)
    }

    async fn update_tags(&self, beam_id: BeamId, tags: &[String]) -> Result<(), ApiError> {
        self.send_document(
            self.request(Method::PUT, &format!("/beams/{beam_id}")),
            "beam",
            &json!({ "tags": tags }),
        )
        .await
        .map(drop)
    }

    async fn update_comment(&self, beam_id: BeamId, comment: &str) -> Result<(), ApiError> {
        self.send_document(
            self.request(Method::PUT, &format!("/beams/{beam_id}")),
            "beam",
            &json!({ "comment": comment }),
        )
        .await
        .map(drop)
    }

    async fn set_pin(&self, beam_id: BeamId, should_pin: bool) -> Result<(), ApiError> {
        let pin = PinRequest {
            beam_id,
            should_pin,
        };
        self.send(self.request(Method::PUT, "/pin").json(&pin))
            .await
            .map(drop)
    }

    async fn create_issue(
        &self,
        tracker_id: TrackerId,
        id_in_tracker: &str,
    ) -> Result<Issue, ApiError> {
        let body = self
            .send_document(
                self.request(Method::POST, "/issues"),
                "issue",
                &json!({ "tracker": tracker_id, "id_in_tracker": id_in_tracker }),
            )
            .await?;
        decode_document("issue", &body).map_err(decode_error)
    }

    async fn attach_issue(&self, beam_id: BeamId, issue_id: IssueId) -> Result<(), ApiError> {
        self.send(self.request(
            Method::POST,
            &format!("/beams/{beam_id}/issues/{issue_id}"),
        ))
        .await
        .map(drop)
    }

    async fn detach_issue(&self, beam_id: BeamId, issue_id: IssueId) -> Result<(), ApiError> {
        self.send(self.request(
            Method::DELETE,
            &format!("/beams/{beam_id}/issues/{issue_id}"),
        ))
        .await
        .map(drop)
    }

    async fn get_user(&self, user_id: UserId) -> Result<User, ApiError> {
        let body = self
            .send(self.request(Method::GET, &format!("/users/{user_id}")))
            .await?;
        decode_document("user", &body).map_err(decode_error)
    }

    async fn list_trackers(&self) -> Result<Vec<Tracker>, ApiError> {
        let body = self.send(self.request(Method::GET, "/trackers")).await?;
        let (trackers, _) = decode_collection("trackers", &body).map_err(decode_error)?;
        Ok(trackers)
    }

    async fn list_tags(&self) -> Result<Vec<TagSummary>, ApiError> {
        let body = self.send(self.request(Method::GET, "/tags")).await?;
        let (tags, _) = decode_collection("tags", &body).map_err(decode_error)?;
        Ok(tags)
    }

    async fn resolve_alias(&self, alias: &str) -> Result<BeamId, ApiError> {
        let path = format!("/alias/{}", urlencoding::encode(alias));
        let body = self.send(self.request(Method::GET, &path)).await?;
        let resolved: BeamAlias = decode_plain(&body)?;
        Ok(resolved.beam_id)
    }

    async fn app_info(&self) -> Result<AppInfo, ApiError> {
        let body = self.send(self.request(Method::GET, "/info")).await?;
        decode_plain(&body)
    }

    async fn storage_summary(&self) -> Result<StorageSummary, ApiError> {
        let body = self.send(self.request(Method::GET, "/summary")).await?;
        decode_plain(&body)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{HttpBackendConfig, HttpBeamBackend};
    use crate::BeamBackend;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use beamtrack_contract::{ApiError, BeamCriteria, PageRequest};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}/api")
    }

    fn backend(base_url: String, token: Option<&str>) -> HttpBeamBackend {
        HttpBeamBackend::new(&HttpBackendConfig {
            base_url,
            auth_token: token.map(str::to_string),
            timeout_secs: 5,
        })
        .expect("client")
    }

    fn beam_json(id: u64) -> Value {
        json!({"id": id, "start": "2024-05-02T08:30:00Z", "host": "lab", "directory": "/tmp"})
    }

    #[tokio::test]
    async fn beam_query_sends_criteria_and_paging() {
        let router = Router::new().route(
            "/api/beams",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("tag").map(String::as_str), Some("urgent"));
                assert_eq!(params.get("page").map(String::as_str), Some("2"));
                assert_eq!(params.get("per_page").map(String::as_str), Some("50"));
                Json(json!({"beams": [beam_json(9)], "meta": {"total": 51}}))
            }),
        );
        let client = backend(serve(router).await, None);

        let result = client
            .query_beams(&BeamCriteria::Tag("urgent".to_string()), PageRequest::new(2, 50))
            .await
            .expect("query beams");
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].id, 9);
        assert_eq!(result.meta.page_count(50), 2);
        assert_eq!(result.request.page, 2);
    }

    #[tokio::test]
    async fn error_detail_is_surfaced() {
        let router = Router::new().route(
            "/api/beams/{id}",
            get(|Path(_id): Path<u64>| async move {
                (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."})))
            }),
        );
        let client = backend(serve(router).await, None);

        let err = client.get_beam(4).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.detail(), Some("Not found."));
    }

    #[tokio::test]
    async fn pin_request_carries_bearer_token() {
        let router = Router::new().route(
            "/api/pin",
            put(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                if auth.as_deref() != Some("Bearer secret") {
                    return StatusCode::FORBIDDEN;
                }
                assert_eq!(body, json!({"beam_id": 3, "should_pin": true}));
                StatusCode::NO_CONTENT
            }),
        );
        let base = serve(router).await;

        backend(base.clone(), Some("secret"))
            .set_pin(3, true)
            .await
            .expect("pin");
        let err = backend(base, None).set_pin(3, true).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn alias_is_percent_encoded() {
        let router = Router::new().route(
            "/api/alias/{alias}",
            get(|Path(alias): Path<String>| async move {
                assert_eq!(alias, "night build");
                Json(json!({"beam_id": 77}))
            }),
        );
        let client = backend(serve(router).await, None);
        assert_eq!(client.resolve_alias("night build").await.expect("alias"), 77);
    }

    #[tokio::test]
    async fn unreachable_backend_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let client = backend(format!("http://{addr}/api"), None);
        let err = client.app_info().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let config = HttpBackendConfig {
            base_url: "not a url".to_string(),
            ..HttpBackendConfig::default()
        };
        assert!(HttpBeamBackend::new(&config).is_err());
    }
}
