// src/extract.rs
//! Request extractors whose rejections go through `AppError`, so a bad body,
//! path or query string gets the same JSON envelope as every other error.
use crate::error::AppError;
use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

/// JSON request body.
pub struct JsonBody<T>(pub T);

/// Path parameters. A segment that does not parse is reported as a missing
/// resource.
pub struct PathParams<T>(pub T);

/// Query string parameters.
pub struct QueryParams<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!("⚠️ Rejected JSON body: {}", rejection.body_text());
        let message = match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                "Expected a JSON body with Content-Type: application/json".to_string()
            }
            JsonRejection::JsonSyntaxError(_) => "Invalid JSON body".to_string(),
            other => format!("Invalid request body: {}", other.body_text()),
        };
        AppError::BadRequest(message)
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(e) => {
                tracing::debug!("Unparsable path parameter: {}", e.body_text());
                AppError::NotFound("Not found".to_string())
            }
            other => AppError::Internal(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(format!("Invalid query string: {}", rejection.body_text()))
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(PathParams(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(QueryParams(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiResult;
    use axum::{
        body::Body,
        http::StatusCode,
        routing::{get, post},
        Router,
    };
    use http_body_util::BodyExt;
    use serde::Deserialize;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[derive(Deserialize)]
    struct Idea {
        prompt: String,
    }

    #[derive(Deserialize)]
    struct Page {
        page: Option<i64>,
    }

    async fn echo_idea(JsonBody(idea): JsonBody<Idea>) -> ApiResult<serde_json::Value> {
        Ok(axum::Json(serde_json::json!({ "prompt": idea.prompt })))
    }

    async fn echo_id(PathParams(id): PathParams<Uuid>) -> ApiResult<serde_json::Value> {
        Ok(axum::Json(serde_json::json!({ "id": id })))
    }

    async fn echo_page(QueryParams(page): QueryParams<Page>) -> ApiResult<serde_json::Value> {
        Ok(axum::Json(serde_json::json!({ "page": page.page })))
    }

    fn app() -> Router {
        Router::new()
            .route("/ideas", post(echo_idea))
            .route("/items/:id", get(echo_id))
            .route("/items", get(echo_page))
    }

    async fn send(request: Request) -> (StatusCode, serde_json::Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response.headers().get("content-type").cloned();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(content_type.unwrap(), "application/json");
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn json_post(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/ideas")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_json_gets_error_envelope() {
        let (status, body) = send(json_post("{oops")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid JSON body");
    }

    #[tokio::test]
    async fn test_wrongly_typed_json_is_bad_request() {
        let (status, body) = send(json_post(r#"{"prompt": 42}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn test_missing_content_type_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/ideas")
            .body(Body::from(r#"{"prompt":"bakery"}"#))
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_valid_json_passes_through() {
        let (status, body) = send(json_post(r#"{"prompt":"bakery"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prompt"], "bakery");
    }

    #[tokio::test]
    async fn test_unparsable_path_id_is_not_found() {
        let request = Request::builder().uri("/items/not-a-uuid").body(Body::empty()).unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn test_bad_query_string_is_bad_request() {
        let request = Request::builder().uri("/items?page=first").body(Body::empty()).unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid query string"));
    }
}
