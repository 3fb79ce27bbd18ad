// Submitter identity for match submissions.
//
// Identity management lives outside this service; a fronting proxy passes
// the authenticated name in `X-Submitter`. Requests without it are recorded
// as anonymous.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};

pub const SUBMITTER_HEADER: &str = "X-Submitter";
pub const ANONYMOUS: &str = "anonymous";

const MAX_SUBMITTER_LEN: usize = 64;

/// Extracts the submitter name from the request headers.
/// Usage: `Submitter(name)` in handler parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Submitter(pub String);

impl<S> FromRequestParts<S> for Submitter
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(SUBMITTER_HEADER) else {
            return Ok(Submitter(ANONYMOUS.to_string()));
        };

        let name = value.to_str().map(str::trim).map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "X-Submitter must be visible ASCII"})),
            )
        })?;

        if name.len() > MAX_SUBMITTER_LEN {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "X-Submitter is too long"})),
            ));
        }

        if name.is_empty() {
            Ok(Submitter(ANONYMOUS.to_string()))
        } else {
            Ok(Submitter(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<Submitter, StatusCode> {
        let mut builder = Request::builder().uri("/api/matches");
        if let Some(value) = header {
            builder = builder.header(SUBMITTER_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Submitter::from_request_parts(&mut parts, &())
            .await
            .map_err(|(status, _)| status)
    }

    #[tokio::test]
    async fn test_header_present() {
        assert_eq!(extract(Some(" alice ")).await.unwrap(), Submitter("alice".into()));
    }

    #[tokio::test]
    async fn test_missing_or_blank_is_anonymous() {
        assert_eq!(extract(None).await.unwrap().0, ANONYMOUS);
        assert_eq!(extract(Some("  ")).await.unwrap().0, ANONYMOUS);
    }

    #[tokio::test]
    async fn test_overlong_rejected() {
        let long = "x".repeat(MAX_SUBMITTER_LEN + 1);
        assert_eq!(extract(Some(&long)).await.unwrap_err(), StatusCode::BAD_REQUEST);
    }
}
