//! Verb dispatch.
//!
//! Every request runs at most one engine transaction, on a blocking worker.
//! The body is buffered before the transaction starts and the response is
//! built from owned data after it ends.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{ACCEPT, ALLOW, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LOCATION, RANGE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use http_body_util::LengthLimitError;
use tracing::{debug, info};

use bkt_store::Db;

use crate::conditional::{has_if_none_match, if_match_holds, not_modified};
use crate::error::{ServerError, ServerResult};
use crate::metadata::{self, MetadataRecord};
use crate::navigator::{
    get_or_create_container_chain, list_names, remove_value, resolve_container,
    resolve_container_or_value, Node,
};
use crate::negotiate::Representation;
use crate::path::ResourcePath;
use crate::range::{parse_range, read_spans};
use crate::router::AppState;

/// Value of the `Allow` header.
pub const ALLOWED_METHODS: &str = "GET,PUT,DELETE,HEAD";

/// Run `f` against the database on a blocking worker.
async fn blocking<T, F>(db: &Arc<Db>, f: F) -> ServerResult<T>
where
    F: FnOnce(&Db) -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| ServerError::Internal(format!("worker task failed: {e}")))?
}

/// Entry point for every request.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    let path = ResourcePath::parse(request.uri().path());
    info!(%method, path = %path, "request");

    let result = match method {
        Method::HEAD => head(&state, path).await,
        Method::OPTIONS => Ok(options()),
        Method::GET => {
            let headers = request.headers().clone();
            get(&state, path, headers).await
        }
        Method::PUT => put(&state, path, request).await,
        Method::DELETE => delete(&state, path, request.headers().clone()).await,
        other => Err(ServerError::MethodNotAllowed(other)),
    };
    result.unwrap_or_else(|e| e.into_response())
}

fn options() -> Response {
    (
        StatusCode::OK,
        [(ALLOW, HeaderValue::from_static(ALLOWED_METHODS))],
    )
        .into_response()
}

async fn head(state: &AppState, path: ResourcePath) -> ServerResult<Response> {
    let canonical = path.canonical().to_owned();
    let record = blocking(&state.db, move |db| {
        db.view(|tx| metadata::get(tx, &canonical))
    })
    .await?
    .ok_or_else(|| ServerError::NotFound(path.to_string()))?;

    let mut headers = HeaderMap::new();
    record.apply(&mut headers);
    Ok((StatusCode::OK, headers).into_response())
}

enum ReadOutcome {
    NotModified(Option<String>),
    Listing(Vec<String>),
    Value(Bytes, MetadataRecord),
}

fn read(db: &Db, path: &ResourcePath, request: &HeaderMap) -> ServerResult<ReadOutcome> {
    db.view(|tx| {
        let record = metadata::get(tx, path.canonical())?;
        if let Some(record) = &record {
            if not_modified(record, request) {
                return Ok(ReadOutcome::NotModified(record.etag.clone()));
            }
        }

        let container = resolve_container(tx, path.parent())?
            .ok_or_else(|| ServerError::NotFound(path.to_string()))?;
        if path.is_root() {
            return Ok(ReadOutcome::Listing(list_names(container)?));
        }
        match resolve_container_or_value(container, path.last()) {
            None => Err(ServerError::NotFound(path.to_string())),
            Some(Node::Container(bucket)) => Ok(ReadOutcome::Listing(list_names(bucket)?)),
            Some(Node::Value(value)) => {
                let record = record.ok_or_else(|| {
                    ServerError::Consistency(format!("no metadata for value at {path}"))
                })?;
                Ok(ReadOutcome::Value(value.clone(), record))
            }
        }
    })
}

async fn get(state: &AppState, path: ResourcePath, request: HeaderMap) -> ServerResult<Response> {
    let (path, request, outcome) = blocking(&state.db, move |db| {
        let outcome = read(db, &path, &request)?;
        Ok((path, request, outcome))
    })
    .await?;

    match outcome {
        ReadOutcome::NotModified(tag) => {
            let mut headers = HeaderMap::new();
            if let Some(tag) = tag.and_then(|t| HeaderValue::from_str(&t).ok()) {
                headers.insert(ETAG, tag);
            }
            Ok((StatusCode::NOT_MODIFIED, headers).into_response())
        }
        ReadOutcome::Listing(names) => {
            let accept = request.get(ACCEPT).and_then(|v| v.to_str().ok());
            let repr = Representation::from_accept(accept);
            let body = repr.render(path.canonical(), &names)?;
            Ok((
                StatusCode::OK,
                [(CONTENT_TYPE, HeaderValue::from_static(repr.content_type()))],
                body,
            )
                .into_response())
        }
        ReadOutcome::Value(value, record) => {
            let mut headers = HeaderMap::new();
            let Some(range) = request.get(RANGE) else {
                record.apply(&mut headers);
                return Ok((StatusCode::OK, headers, Body::from(value)).into_response());
            };
            let range = range
                .to_str()
                .map_err(|_| ServerError::BadRequest("Bad request."))?;
            let spans = parse_range(range, value.len())?;
            let body = read_spans(&value, &spans, value.len().max(state.max_body_size))?;
            record.for_partial().apply(&mut headers);
            Ok((StatusCode::PARTIAL_CONTENT, headers, body).into_response())
        }
    }
}

/// Size and `If-None-Match` checks shared by PUT and DELETE.
fn reject_unwritable(state: &AppState, request: &HeaderMap) -> ServerResult<Option<usize>> {
    let declared = match request.get(CONTENT_LENGTH) {
        None => None,
        Some(raw) => Some(
            raw.to_str()
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .ok_or(ServerError::BadRequest("Bad request."))?,
        ),
    };
    if declared.is_some_and(|len| len > state.max_body_size) {
        return Err(ServerError::BodyTooLarge {
            limit: state.max_body_size,
        });
    }
    if has_if_none_match(request) {
        return Err(ServerError::PreconditionFailed(
            "If-None-Match on a write".into(),
        ));
    }
    Ok(declared)
}

enum WriteOutcome {
    Container,
    Created(MetadataRecord),
    Replaced(MetadataRecord),
}

fn write_value(
    db: &Db,
    path: &ResourcePath,
    request: &HeaderMap,
    body: Bytes,
) -> ServerResult<WriteOutcome> {
    db.update(|tx| {
        let existing = metadata::get(tx, path.canonical())?;
        if !if_match_holds(existing.as_ref(), request) {
            return Err(ServerError::PreconditionFailed(path.to_string()));
        }
        if path.is_root() {
            return Err(ServerError::BadRequest(
                "Cannot PUT a value in the root bucket.",
            ));
        }
        let record = MetadataRecord::stamp(request, &body, Utc::now());
        get_or_create_container_chain(tx, path.parent())?.put(path.last(), body)?;
        metadata::put(tx, path.canonical(), &record)?;
        Ok(match existing {
            Some(_) => WriteOutcome::Replaced(record),
            None => WriteOutcome::Created(record),
        })
    })
}

fn write_container(db: &Db, path: &ResourcePath, request: &HeaderMap) -> ServerResult<WriteOutcome> {
    db.update(|tx| {
        let existing = metadata::get(tx, path.canonical())?;
        if !if_match_holds(existing.as_ref(), request) {
            return Err(ServerError::PreconditionFailed(path.to_string()));
        }
        get_or_create_container_chain(tx, path.segments())?;
        Ok(WriteOutcome::Container)
    })
}

/// `ETag` and `Last-Modified` of a freshly written value.
fn stamped_headers(record: &MetadataRecord) -> HeaderMap {
    let mut headers = HeaderMap::new();
    MetadataRecord {
        etag: record.etag.clone(),
        last_modified: record.last_modified.clone(),
        ..Default::default()
    }
    .apply(&mut headers);
    headers
}

/// Classify a failure to buffer a request body. Only hitting the size limit
/// is the client sending too much; anything else is a broken request.
fn body_error(err: &axum::Error, limit: usize) -> ServerError {
    let too_large = std::iter::successors(std::error::Error::source(err), |e| e.source())
        .any(|e| e.is::<LengthLimitError>());
    if too_large {
        ServerError::BodyTooLarge { limit }
    } else {
        debug!(error = %err, "request body unreadable");
        ServerError::BadRequest("Bad request.")
    }
}

async fn put(state: &AppState, path: ResourcePath, request: Request) -> ServerResult<Response> {
    let (parts, body) = request.into_parts();
    let declared = reject_unwritable(state, &parts.headers)?;
    let body = axum::body::to_bytes(body, state.max_body_size)
        .await
        .map_err(|e| body_error(&e, state.max_body_size))?;
    match declared {
        None if !body.is_empty() => return Err(ServerError::LengthRequired),
        Some(len) if len != body.len() => {
            return Err(ServerError::BadRequest("Bad request."));
        }
        _ => {}
    }

    let headers = parts.headers;
    let (path, outcome) = blocking(&state.db, move |db| {
        let outcome = if body.is_empty() {
            write_container(db, &path, &headers)?
        } else {
            write_value(db, &path, &headers, body)?
        };
        Ok((path, outcome))
    })
    .await?;

    Ok(match outcome {
        WriteOutcome::Container => StatusCode::OK.into_response(),
        WriteOutcome::Replaced(record) => {
            (StatusCode::NO_CONTENT, stamped_headers(&record)).into_response()
        }
        WriteOutcome::Created(record) => {
            let mut headers = stamped_headers(&record);
            if let Ok(location) = HeaderValue::from_str(path.canonical()) {
                headers.insert(LOCATION, location);
            }
            (StatusCode::CREATED, headers).into_response()
        }
    })
}

fn remove(db: &Db, path: &ResourcePath, request: &HeaderMap) -> ServerResult<()> {
    db.update(|tx| {
        let existing = metadata::get(tx, path.canonical())?;
        if !if_match_holds(existing.as_ref(), request) {
            return Err(ServerError::PreconditionFailed(path.to_string()));
        }
        if existing.is_none() {
            return Err(ServerError::NotFound(path.to_string()));
        }
        metadata::delete(tx, path.canonical())?;
        if !remove_value(tx, path)? {
            return Err(ServerError::Consistency(format!(
                "metadata record without value at {path}"
            )));
        }
        Ok(())
    })
}

async fn delete(state: &AppState, path: ResourcePath, request: HeaderMap) -> ServerResult<Response> {
    reject_unwritable(state, &request)?;
    if path.depth() < 2 {
        return Err(ServerError::BadRequest("Invalid path."));
    }
    blocking(&state.db, move |db| remove(db, &path, &request)).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
