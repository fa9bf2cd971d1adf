use crate::server_security::BearerToken;
use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        Request, State,
    },
    http::{
        header::WWW_AUTHENTICATE,
        HeaderValue, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use docqa_service::{
    Answer, ClearReport, DeleteReport, ErrorKind, FileListing, IngestReport, RagService,
    ServiceError, ServiceStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Everything a request handler needs
#[derive(Clone)]
pub struct HttpState {
    pub service: Arc<RagService>,
    pub auth_token: Option<BearerToken>,
}

/// Build the HTTP API over one service.
///
/// ```text
/// GET    /health            liveness
/// GET    /status            store size and model info
/// POST   /upload            multipart field `file`
/// POST   /ask               { "question": ... }
/// GET    /files             indexed files
/// DELETE /files/*filename   drop one file
/// DELETE /clear             drop everything
/// ```
pub fn router(state: HttpState) -> Router {
    let max_upload_bytes = state.service.config().http.max_upload_bytes;
    let state = Arc::new(state);
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/ask", post(ask))
        .route("/files", get(files))
        .route("/files/*filename", delete(delete_file))
        .route("/clear", delete(clear))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn require_auth(
    State(state): State<Arc<HttpState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(token) = &state.auth_token {
        if !token.authorizes(request.headers()) {
            return ApiError::unauthorized().into_response();
        }
    }
    next.run(request).await
}

/// Error body: `{ "error": { "code", "message", "hint" } }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    hint: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorEnvelope<'a>,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    code: &'a str,
    message: &'a str,
    hint: Option<&'a str>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Missing or invalid Authorization header",
        )
        .with_hint(format!(
            "The server was started with an auth token; include Authorization: Bearer <token> (see {}).",
            crate::server_security::AUTH_TOKEN_ENV
        ))
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    fn from_multipart(err: MultipartError) -> Self {
        let status = err.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "payload_too_large"
        } else {
            "invalid_request"
        };
        Self::new(status, code, err.body_text())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let kind = err.kind();
        let (status, code) = match kind {
            ErrorKind::BadRequest => (StatusCode::BAD_REQUEST, "bad_request"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ErrorKind::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        match kind {
            ErrorKind::Internal => log::error!("Request failed: {err}"),
            ErrorKind::Unavailable => log::warn!("Request failed: {err}"),
            ErrorKind::BadRequest | ErrorKind::NotFound => log::debug!("Request rejected: {err}"),
        }
        Self {
            status,
            code,
            message: err.public_message(),
            hint: err.hint().map(str::to_string),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorEnvelope {
                code: self.code,
                message: &self.message,
                hint: self.hint.as_deref(),
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if self.status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Success body: a report plus a human-readable `message`
#[derive(Serialize)]
struct WithMessage<T> {
    message: String,
    #[serde(flatten)]
    report: T,
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
    #[serde(flatten)]
    service: ServiceStatus,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn status(State(state): State<Arc<HttpState>>) -> Json<StatusBody> {
    Json(StatusBody {
        status: "running",
        service: state.service.status().await,
    })
}

async fn upload(
    State(state): State<Arc<HttpState>>,
    mut multipart: Multipart,
) -> Result<Json<WithMessage<IngestReport>>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from_multipart)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(ApiError::from_multipart)?;
        let report = state.service.ingest(&filename, &bytes).await?;
        return Ok(Json(WithMessage {
            message: format!(
                "Document '{}' uploaded and processed successfully",
                report.filename
            ),
            report,
        }));
    }
    Err(ApiError::invalid_request("No file provided")
        .with_hint("Send the document as multipart field 'file'"))
}

async fn ask(
    State(state): State<Arc<HttpState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::invalid_request(rejection.body_text())
            .with_hint("Send a JSON body like {\"question\": \"...\"}")
    })?;
    Ok(Json(state.service.ask(&request.question).await?))
}

async fn files(State(state): State<Arc<HttpState>>) -> Json<FileListing> {
    Json(state.service.files().await)
}

async fn delete_file(
    State(state): State<Arc<HttpState>>,
    Path(filename): Path<String>,
) -> Result<Json<WithMessage<DeleteReport>>, ApiError> {
    let report = state.service.delete_file(&filename).await?;
    Ok(Json(WithMessage {
        message: format!("File '{filename}' deleted successfully"),
        report,
    }))
}

async fn clear(
    State(state): State<Arc<HttpState>>,
) -> Result<Json<WithMessage<ClearReport>>, ApiError> {
    let report = state.service.clear().await?;
    Ok(Json(WithMessage {
        message: "Vector database cleared successfully".to_string(),
        report,
    }))
}
