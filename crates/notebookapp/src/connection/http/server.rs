use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::wire::{status_for, ErrorBody, FileList, RootIds, MAX_BODY};
use crate::attr::NodeAttr;
use crate::connection::{FileMode, IndexQuery, NotebookConnection};
use crate::error::{NotebookError, Result};
use crate::paths::guess_file_mimetype;

type SharedConnection = Arc<Mutex<Box<dyn NotebookConnection>>>;

#[derive(Clone)]
struct AppState {
    conn: SharedConnection,
    shutdown: Arc<Notify>,
}

/// A [`NotebookError`] on its way out as an HTTP response.
struct ApiError(NotebookError);

impl From<NotebookError> for ApiError {
    fn from(err: NotebookError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %self.0, "request failed");
        } else {
            debug!(error = %self.0, %status, "request rejected");
        }
        (status, Json(ErrorBody::from_error(&self.0))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Runs `f` against the notebook on the blocking pool.
async fn with_conn<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn NotebookConnection) -> Result<T> + Send + 'static,
{
    let conn = Arc::clone(&state.conn);
    tokio::task::spawn_blocking(move || {
        let mut conn = conn.lock();
        f(&mut **conn)
    })
    .await
    .map_err(|e| ApiError(NotebookError::Connection(format!("worker failed: {}", e))))?
    .map_err(ApiError)
}

fn parse_attr(body: &[u8]) -> ApiResult<NodeAttr> {
    let value: Value = serde_json::from_slice(body).map_err(|e| ApiError(NotebookError::Parse(e.to_string())))?;
    Ok(NodeAttr::from_json(&value)?)
}

fn gen_router(state: AppState) -> Router {
    Router::new()
        .route("/notebook/", post(command))
        .route("/notebook/nodes/", get(read_root).post(create_new_node))
        .route(
            "/notebook/nodes/:nodeid",
            get(read_node)
                .post(create_or_move_node)
                .put(update_node)
                .delete(delete_node)
                .head(has_node),
        )
        .route(
            "/notebook/nodes/:nodeid/",
            get(list_node_dir).head(has_node_dir),
        )
        .route(
            "/notebook/nodes/:nodeid/*filename",
            get(read_file)
                .post(write_file)
                .put(write_file)
                .delete(delete_file)
                .head(has_file),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY))
        .with_state(state)
}

// Notebook commands

async fn command(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> ApiResult<Response> {
    if params.contains_key("save") {
        with_conn(&state, |conn| conn.save()).await?;
        return Ok(StatusCode::OK.into_response());
    }
    if params.contains_key("index") {
        let wire: Value = serde_json::from_slice(&body).map_err(|e| ApiError(NotebookError::Parse(e.to_string())))?;
        let query = IndexQuery::from_wire(&wire)?;
        let result = with_conn(&state, move |conn| conn.index(&query)).await?;
        return Ok(Json(result.to_wire()).into_response());
    }
    if params.contains_key("shutdown") {
        if !peer.ip().is_loopback() {
            return Ok(StatusCode::FORBIDDEN.into_response());
        }
        info!("shutdown requested");
        state.shutdown.notify_one();
        return Ok(StatusCode::OK.into_response());
    }
    Err(ApiError(NotebookError::Parse("unknown notebook command".into())))
}

// Nodes

async fn read_root(State(state): State<AppState>) -> ApiResult<Json<RootIds>> {
    let rootid = with_conn(&state, |conn| conn.get_rootid()).await?;
    Ok(Json(RootIds { rootids: vec![rootid] }))
}

async fn read_node(State(state): State<AppState>, Path(nodeid): Path<String>) -> ApiResult<Json<NodeAttr>> {
    let attr = with_conn(&state, move |conn| conn.read_node(&nodeid)).await?;
    Ok(Json(attr))
}

async fn create_new_node(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<NodeAttr>> {
    create(state, crate::new_nodeid(), &body).await
}

async fn create_or_move_node(
    State(state): State<AppState>,
    Path(nodeid): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> ApiResult<Response> {
    if let Some(parentid) = params.get("move").cloned() {
        let index = match params.get("index") {
            Some(text) => Some(
                text.parse::<usize>()
                    .map_err(|_| ApiError(NotebookError::Parse(format!("bad index {:?}", text))))?,
            ),
            None => None,
        };
        with_conn(&state, move |conn| conn.move_node(&nodeid, &parentid, index)).await?;
        return Ok(StatusCode::OK.into_response());
    }
    Ok(create(state, nodeid, &body).await?.into_response())
}

async fn create(state: AppState, nodeid: String, body: &[u8]) -> ApiResult<Json<NodeAttr>> {
    let mut attr = parse_attr(body)?;
    attr.insert("nodeid", nodeid.as_str());
    let stored = attr.clone();
    with_conn(&state, move |conn| conn.create_node(&nodeid, &stored)).await?;
    Ok(Json(attr))
}

async fn update_node(
    State(state): State<AppState>,
    Path(nodeid): Path<String>,
    body: Bytes,
) -> ApiResult<Json<NodeAttr>> {
    let attr = parse_attr(&body)?;
    let stored = attr.clone();
    with_conn(&state, move |conn| conn.update_node(&nodeid, &stored)).await?;
    Ok(Json(attr))
}

async fn delete_node(State(state): State<AppState>, Path(nodeid): Path<String>) -> ApiResult<StatusCode> {
    with_conn(&state, move |conn| conn.delete_node(&nodeid)).await?;
    Ok(StatusCode::OK)
}

async fn has_node(State(state): State<AppState>, Path(nodeid): Path<String>) -> ApiResult<StatusCode> {
    let found = with_conn(&state, move |conn| conn.has_node(&nodeid)).await?;
    Ok(if found { StatusCode::OK } else { StatusCode::NOT_FOUND })
}

// Files

async fn list_node_dir(State(state): State<AppState>, Path(nodeid): Path<String>) -> ApiResult<Json<FileList>> {
    let files = with_conn(&state, move |conn| conn.list_dir(&nodeid, "/")).await?;
    Ok(Json(FileList { files }))
}

async fn has_node_dir(State(state): State<AppState>, Path(nodeid): Path<String>) -> ApiResult<StatusCode> {
    has_node(State(state), Path(nodeid)).await
}

async fn read_file(
    State(state): State<AppState>,
    Path((nodeid, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    if filename.ends_with('/') {
        let files = with_conn(&state, move |conn| conn.list_dir(&nodeid, &filename)).await?;
        return Ok(Json(FileList { files }).into_response());
    }

    let mimetype = guess_file_mimetype(&filename);
    let data = with_conn(&state, move |conn| {
        conn.open_file(&nodeid, &filename, FileMode::Read)?.read_all()
    })
    .await?;
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mimetype));
    Ok((headers, data).into_response())
}

async fn write_file(
    State(state): State<AppState>,
    method: axum::http::Method,
    Path((nodeid, filename)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    if filename.ends_with('/') {
        if method != axum::http::Method::PUT {
            return Err(ApiError(NotebookError::Parse("invalid method on directory".into())));
        }
        with_conn(&state, move |conn| conn.create_dir(&nodeid, &filename)).await?;
        return Ok(StatusCode::OK);
    }

    let mode = match params.get("mode").map(String::as_str) {
        Some(mode) => FileMode::parse(mode)?,
        None => FileMode::Write,
    };
    with_conn(&state, move |conn| {
        let mut stream = conn.open_file(&nodeid, &filename, mode)?;
        if let Err(e) = std::io::Write::write_all(&mut stream, &body) {
            stream.discard()?;
            return Err(NotebookError::file(&nodeid, &filename, e));
        }
        stream.close()
    })
    .await?;
    Ok(StatusCode::OK)
}

async fn delete_file(
    State(state): State<AppState>,
    Path((nodeid, filename)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    with_conn(&state, move |conn| conn.delete_file(&nodeid, &filename)).await?;
    Ok(StatusCode::OK)
}

async fn has_file(
    State(state): State<AppState>,
    Path((nodeid, filename)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let found = with_conn(&state, move |conn| conn.has_file(&nodeid, &filename)).await?;
    Ok(if found { StatusCode::OK } else { StatusCode::NOT_FOUND })
}

/// Serves one notebook connection over HTTP from a background thread.
///
/// The notebook lives under `/notebook/` and nodes under
/// `/notebook/nodes/`. There is no authentication.
pub struct NotebookServer {
    addr: SocketAddr,
    shutdown: Arc<Notify>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl NotebookServer {
    /// Binds `host:port` (port 0 picks a free one) and starts serving.
    pub fn start(conn: Box<dyn NotebookConnection>, host: &str, port: u16) -> Result<NotebookServer> {
        let bind = format!("{}:{}", host, port);
        let shutdown = Arc::new(Notify::new());
        let state = AppState {
            conn: Arc::new(Mutex::new(conn)),
            shutdown: Arc::clone(&shutdown),
        };
        let (ready_tx, ready_rx) = mpsc::channel::<Result<SocketAddr>>();

        let thread = std::thread::Builder::new()
            .name("notebook-http".into())
            .spawn(move || serve(bind, state, ready_tx))?;

        let addr = ready_rx
            .recv()
            .map_err(|_| NotebookError::Connection("server thread exited before binding".into()))??;
        if !addr.ip().is_loopback() {
            warn!(%addr, "notebook server is reachable from other hosts and has no authentication");
        }
        info!(%addr, "notebook server started");
        Ok(NotebookServer {
            addr,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL to hand to [`super::HttpConnection`].
    pub fn url(&self) -> String {
        format!("http://{}/notebook/", self.addr)
    }

    /// Blocks until the server stops, e.g. after `POST /notebook/?shutdown`.
    pub fn wait(mut self) -> Result<()> {
        self.join()
    }

    /// Stops the server and closes the notebook.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown.notify_one();
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| NotebookError::Connection("server thread panicked".into()))?,
            None => Ok(()),
        }
    }
}

impl Drop for NotebookServer {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown.notify_one();
            if let Err(e) = self.join() {
                warn!(error = %e, "notebook server did not stop cleanly");
            }
        }
    }
}

fn serve(bind: String, state: AppState, ready: mpsc::Sender<Result<SocketAddr>>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let conn = Arc::clone(&state.conn);
    let shutdown = Arc::clone(&state.shutdown);

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::bind(bind.as_str()).await {
            Ok(listener) => listener,
            Err(e) => {
                let err = NotebookError::Connection(format!("cannot bind {}: {}", bind, e));
                let _ = ready.send(Err(NotebookError::Connection(err.to_string())));
                return Err(err);
            }
        };
        let _ = ready.send(listener.local_addr().map_err(NotebookError::from));

        let app = gen_router(state);
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await?;
        Ok::<(), NotebookError>(())
    })?;

    info!("notebook server stopped");
    let result = conn.lock().close();
    result
}
