//! HTTP binding: routing, request validation, CORS and JSON responses.

use std::convert::Infallible;
use std::sync::Arc;

use breach_verifier::BreachIndex;
use bytes::Bytes;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, ALLOW, CONTENT_TYPE, HeaderMap, HeaderValue, ORIGIN, VARY,
};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::error::Category as JsonCategory;
use tracing::{debug, error};

use crate::error::ApiError;
use crate::handler::{self, CheckRequest, GenerateRequest};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 16 * 1024;

pub const ROOT_MESSAGE: &str = "Password Checker API is running!";

const PREFLIGHT_MAX_AGE: &str = "600";
const DEFAULT_ALLOW_METHODS: &str = "GET, POST, OPTIONS";

/// Shared, read-only state handed to every request.
pub struct AppState {
    pub index: BreachIndex,
    pub cors: Cors,
}

/// Origins allowed to call the API from a browser. `*` allows any origin.
#[derive(Debug, Clone)]
pub struct Cors {
    allowed: Vec<String>,
}

impl Cors {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { allowed: origins.into_iter().map(Into::into).collect() }
    }

    fn allows(&self, origin: &HeaderValue) -> bool {
        origin
            .to_str()
            .is_ok_and(|origin| self.allowed.iter().any(|a| a == "*" || a == origin))
    }

    fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        headers.append(VARY, HeaderValue::from_static("Origin"));
        if let Some(origin) = origin.filter(|o| self.allows(o)) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
    }
}

#[derive(Serialize)]
struct Message {
    message: &'static str,
}

#[derive(Serialize)]
struct Detail {
    detail: String,
}

/// Serves one request. Never fails: errors become JSON error responses.
pub async fn route<B>(state: Arc<AppState>, req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let origin = req.headers().get(ORIGIN).cloned();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let mut response = if method == Method::OPTIONS {
        preflight(&state.cors, req.headers())
    } else {
        dispatch(&state, req).await.unwrap_or_else(|e| error_response(&e))
    };
    state.cors.apply(origin.as_ref(), response.headers_mut());

    debug!(%method, path = %path, status = response.status().as_u16(), "handled request");
    Ok(response)
}

async fn dispatch<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    match (&method, path.as_str()) {
        (&Method::GET, "/") => Ok(json_response(StatusCode::OK, &Message { message: ROOT_MESSAGE })),
        (&Method::POST, "/check") => {
            let body = read_body(req.into_body()).await?;
            let request: CheckRequest = parse_json(&body)?;
            let response = handler::check(&state.index, &request.password).await?;
            Ok(json_response(StatusCode::OK, &response))
        }
        (&Method::GET, "/generate") => {
            let options = parse_query(req.uri().query())?.into_options()?;
            Ok(json_response(StatusCode::OK, &handler::generate(&options)))
        }
        (&Method::POST, "/generate") => {
            let body = read_body(req.into_body()).await?;
            let request = if body.iter().all(u8::is_ascii_whitespace) {
                GenerateRequest::default()
            } else {
                parse_json::<GenerateRequest>(&body)?
            };
            let options = request.into_options()?;
            Ok(json_response(StatusCode::OK, &handler::generate(&options)))
        }
        (_, "/") => Err(ApiError::MethodNotAllowed { allow: "GET, OPTIONS" }),
        (_, "/check") => Err(ApiError::MethodNotAllowed { allow: "POST, OPTIONS" }),
        (_, "/generate") => Err(ApiError::MethodNotAllowed { allow: DEFAULT_ALLOW_METHODS }),
        _ => Err(ApiError::NotFound),
    }
}

fn preflight(cors: &Cors, headers: &HeaderMap) -> Response<Full<Bytes>> {
    if let Some(origin) = headers.get(ORIGIN) {
        if !cors.allows(origin) {
            return error_response(&ApiError::BadRequest("Disallowed CORS origin".into()));
        }
    }

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let out = response.headers_mut();
    out.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        headers
            .get(ACCESS_CONTROL_REQUEST_METHOD)
            .cloned()
            .unwrap_or(HeaderValue::from_static(DEFAULT_ALLOW_METHODS)),
    );
    if let Some(requested) = headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
        out.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
    out.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(PREFLIGHT_MAX_AGE));
    response
}

async fn read_body<B>(body: B) -> Result<Bytes, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ApiError::PayloadTooLarge { limit: MAX_BODY_BYTES })
        }
        Err(e) => Err(ApiError::BadRequest(format!("Failed to read request body: {e}"))),
    }
}

/// Syntax errors are 400; well-formed JSON of the wrong shape is 422.
fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| match e.classify() {
        JsonCategory::Data => ApiError::Unprocessable(e.to_string()),
        JsonCategory::Io | JsonCategory::Syntax | JsonCategory::Eof => {
            ApiError::BadRequest(format!("Malformed JSON: {e}"))
        }
    })
}

/// Keys and values are percent-decoded (`+` is a space). Unknown keys are
/// ignored.
fn parse_query(query: Option<&str>) -> Result<GenerateRequest, ApiError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.unwrap_or_default())
        .map_err(|e| ApiError::BadRequest(format!("Malformed query string: {e}")))?;

    let mut request = GenerateRequest::default();
    for (key, value) in &pairs {
        let (key, value) = (key.as_str(), value.as_str());
        match key {
            "length" => {
                let length = value.parse().map_err(|_| {
                    ApiError::Unprocessable(format!("length: expected an integer, got {value:?}"))
                })?;
                request.length = Some(length);
            }
            "include_uppercase" => request.include_uppercase = Some(parse_bool(key, value)?),
            "include_lowercase" => request.include_lowercase = Some(parse_bool(key, value)?),
            "include_digits" => request.include_digits = Some(parse_bool(key, value)?),
            "include_special" => request.include_special = Some(parse_bool(key, value)?),
            _ => {}
        }
    }
    Ok(request)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ApiError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ApiError::Unprocessable(format!("{key}: expected a boolean, got {value:?}"))),
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            (StatusCode::INTERNAL_SERVER_ERROR, br#"{"detail":"Internal Server Error"}"#.to_vec())
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(e: &ApiError) -> Response<Full<Bytes>> {
    let mut response = json_response(e.status(), &Detail { detail: e.to_string() });
    if let ApiError::MethodNotAllowed { allow } = e {
        response.headers_mut().insert(ALLOW, HeaderValue::from_static(*allow));
    }
    response
}
