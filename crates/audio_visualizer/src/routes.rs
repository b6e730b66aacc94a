use crate::{
    generate::{self, GenerateError},
    session,
    state::AppState,
    store::{safe_join, StoreError, RESULT_DIR},
};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::{
    body::{Frame, Incoming},
    header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, SET_COOKIE},
    Method, Request, Response, StatusCode,
};
use log::{debug, error};
use serde::Serialize;
use std::{io::Read, path::PathBuf, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, std::convert::Infallible>;

#[derive(Serialize)]
struct RedirectTarget {
    redirect_url: &'static str,
}

/// One row of the results page.
#[derive(Serialize)]
struct ResultRecord {
    name: String,
    original: String,
    url: String,
}

/// Where a request is headed.
#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Index,
    Upload,
    MediaWait,
    MediaResults,
    MediaFile(&'a str),
    StaticFile(&'a str),
    NotFound,
}

pub fn route<'a>(method: &Method, path: &'a str) -> Route<'a> {
    match (method, path) {
        (&Method::GET, "/") => Route::Index,
        (&Method::POST, "/upload") => Route::Upload,
        (&Method::GET, "/media/wait") => Route::MediaWait,
        (&Method::GET, "/media/results") => Route::MediaResults,
        (&Method::GET, path) if path.starts_with("/media/files/") => {
            Route::MediaFile(&path["/media/files/".len()..])
        }
        (&Method::GET, path) if path.starts_with("/static/") => {
            Route::StaticFile(&path["/static/".len()..])
        }
        _ => Route::NotFound,
    }
}

/// Top level request dispatch.
pub async fn handle(state: Arc<AppState>, req: Request<Incoming>) -> Response<BoxBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    debug!("{method} {path}");

    match route(&method, &path) {
        Route::Index => index(&state, &req),
        Route::Upload => upload(&state, req).await,
        Route::MediaWait => media_wait(&state, &req).await,
        Route::MediaResults => media_results(&state, &req),
        Route::MediaFile(rest) => match state.store.resolve_media_path(rest) {
            Some(path) => file_response(path).await,
            None => json_error(StatusCode::NOT_FOUND, "not_found", "No such file"),
        },
        Route::StaticFile(rest) => match safe_join(&state.static_dir, rest) {
            Some(path) => file_response(path).await,
            None => json_error(StatusCode::NOT_FOUND, "not_found", "No such file"),
        },
        Route::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "No such page"),
    }
}

/// GET / - Upload form. Establishes a session cookie on first visit.
fn index(state: &AppState, req: &Request<Incoming>) -> Response<BoxBody> {
    let page = match state.render("upload_form.html", minijinja::context! {}) {
        Ok(page) => page,
        Err(err) => return template_error_response(&err),
    };

    let mut response = html_response(StatusCode::OK, page);
    if session::session_from_headers(req.headers()).is_none() {
        let cookie = session::set_cookie_value(&session::new_session_id());
        // UUID cookie values are always valid header text.
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(SET_COOKIE, value);
        }
    }
    response
}

/// POST /upload - Replace the session's upload batch with the posted files.
async fn upload(state: &AppState, req: Request<Incoming>) -> Response<BoxBody> {
    let Some(session_id) = session::session_from_headers(req.headers()) else {
        return json_error(StatusCode::NOT_FOUND, "no_session", "No session_id cookie");
    };

    let boundary = match req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|content_type| multer::parse_boundary(content_type).ok())
    {
        Some(boundary) => boundary,
        None => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "invalid_content_type",
                "Expected multipart/form-data with boundary",
            );
        }
    };

    let batch = match state.store.begin_batch(&session_id) {
        Ok(batch) => batch,
        Err(err) => return store_error_response(&err),
    };

    let mut multipart = multer::Multipart::new(req.into_body().into_data_stream(), boundary);
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_multipart",
                    &format!("Failed to parse multipart field: {err}"),
                );
            }
        };

        let client_name = field.file_name().map(str::to_string);
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(err) => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_multipart",
                    &format!("Failed reading multipart field: {err}"),
                );
            }
        };

        // Parts without a filename are not file uploads. Ignore them.
        let Some(client_name) = client_name else {
            continue;
        };
        if let Err(err) = batch.store_file(&client_name, &data) {
            return store_error_response(&err);
        }
    }

    if let Err(err) = batch.commit() {
        return store_error_response(&err);
    }
    json_response(
        StatusCode::OK,
        &RedirectTarget {
            redirect_url: "/media/wait",
        },
    )
}

/// GET /media/wait - Synchronously generate all spectrograms for the
/// session's current batch, then send the client on to the results page.
async fn media_wait(state: &AppState, req: &Request<Incoming>) -> Response<BoxBody> {
    let Some(session_id) = session::session_from_headers(req.headers()) else {
        return json_error(StatusCode::NOT_FOUND, "no_session", "No session_id cookie");
    };

    let batch_dir = match state.store.current_batch(&session_id) {
        Ok(Some(dir)) => dir,
        // Nothing was ever uploaded for this session.
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "no_media", "No media found"),
        Err(err) => return store_error_response(&err),
    };

    let params = state.spectro;
    match tokio::task::spawn_blocking(move || generate::generate_batch(&batch_dir, params)).await {
        Ok(Ok(_)) => redirect_see_other("/media/results"),
        Ok(Err(err)) => generate_error_response(&err),
        Err(err) => {
            error!("generation task failed: {err}");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "generation_error",
                "Spectrogram generation failed",
            )
        }
    }
}

/// GET /media/results - List the generated images for the session.
fn media_results(state: &AppState, req: &Request<Incoming>) -> Response<BoxBody> {
    let Some(session_id) = session::session_from_headers(req.headers()) else {
        return json_error(StatusCode::NOT_FOUND, "no_session", "No session_id cookie");
    };

    let batch_dir = match state.store.current_batch(&session_id) {
        Ok(Some(dir)) => dir,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "no_media", "No media found"),
        Err(err) => return store_error_response(&err),
    };

    let manifest = match generate::read_manifest(&batch_dir.join(RESULT_DIR)) {
        Ok(Some(entries)) => entries,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "no_media", "No media found"),
        Err(err) => return generate_error_response(&err),
    };

    let batch_name = batch_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let records: Vec<ResultRecord> = manifest
        .into_iter()
        .map(|entry| ResultRecord {
            url: format!(
                "/media/files/{session_id}/{batch_name}/{RESULT_DIR}/{}",
                entry.image
            ),
            name: entry.image,
            original: entry.source,
        })
        .collect();

    let context = minijinja::context! { files => minijinja::Value::from_serialize(&records) };
    match state.render("results.html", context) {
        Ok(page) => html_response(StatusCode::OK, page),
        Err(err) => template_error_response(&err),
    }
}

/// Stream a file from disk. 404 when it does not exist.
async fn file_response(path: PathBuf) -> Response<BoxBody> {
    let content_type = content_type_for(&path);

    let opened = tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)?;
        let len = file.metadata()?.len();
        Ok::<_, std::io::Error>((file, len))
    })
    .await;

    let (mut file, len) = match opened {
        Ok(Ok(pair)) => pair,
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            return json_error(StatusCode::NOT_FOUND, "not_found", "No such file");
        }
        Ok(Err(err)) => {
            error!("could not open file for serving: {err}");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                "Could not read file",
            );
        }
        Err(err) => {
            error!("file open task failed: {err}");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                "Could not read file",
            );
        }
    };

    let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
    tokio::task::spawn_blocking(move || {
        const CHUNK_SIZE: usize = 64 * 1024;
        let mut buf = [0u8; CHUNK_SIZE];

        loop {
            match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    log::warn!("file stream read failed: {err}");
                    break;
                }
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx)
        .map(|chunk| Ok::<_, std::convert::Infallible>(Frame::data(chunk)));
    let body = StreamBody::new(stream).boxed();

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, len.to_string())
        .body(body)
        .unwrap()
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

fn html_response(status: StatusCode, body: String) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(body)).boxed())
        .unwrap()
}

fn redirect_see_other(location: &str) -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(LOCATION, location)
        .body(Full::new(Bytes::new()).boxed())
        .unwrap()
}

fn json_response<T: Serialize>(status: StatusCode, data: &T) -> Response<BoxBody> {
    let body = serde_json::to_vec(data).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)).boxed())
        .unwrap()
}

fn json_error(status: StatusCode, code: &str, message: &str) -> Response<BoxBody> {
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": message
        }
    });
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())).boxed())
        .unwrap()
}

fn store_error_response(err: &StoreError) -> Response<BoxBody> {
    error!("store failure: {err}");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "storage_error",
        "Media storage failed",
    )
}

fn generate_error_response(err: &GenerateError) -> Response<BoxBody> {
    error!("generation failure: {err}");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "generation_error",
        &err.to_string(),
    )
}

fn template_error_response(err: &minijinja::Error) -> Response<BoxBody> {
    error!("template failure: {err}");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "template_error",
        "Could not render page",
    )
}
