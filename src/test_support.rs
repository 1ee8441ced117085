//! Local stand-in for the CoinGecko API, served by axum on an ephemeral port.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};

#[derive(Clone)]
pub struct Route {
    path: String,
    status: StatusCode,
    body: String,
}

impl Route {
    pub fn new(path: &str, status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            status,
            body: body.into(),
        }
    }

    pub fn ok(path: &str, body: impl Into<String>) -> Self {
        Self::new(path, StatusCode::OK, body)
    }
}

#[derive(Clone)]
struct MockState {
    routes: Arc<Vec<Route>>,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

pub struct MockUpstream {
    pub base_url: String,
    state: MockState,
}

impl MockUpstream {
    pub async fn start(routes: Vec<Route>) -> Self {
        let state = MockState {
            routes: Arc::new(routes),
            hits: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new().fallback(reply).with_state(state.clone());
        let base_url = serve(app).await;
        Self { base_url, state }
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Path and query of every request received, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn reply(State(st): State<MockState>, uri: Uri) -> Response {
    st.hits.fetch_add(1, Ordering::SeqCst);
    st.requests.lock().unwrap().push(uri.to_string());

    match st.routes.iter().find(|r| r.path == uri.path()) {
        Some(r) => (
            r.status,
            [(header::CONTENT_TYPE, "application/json")],
            r.body.clone(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"error":"Not Found"}"#.to_string(),
        )
            .into_response(),
    }
}

/// Bind `app` on 127.0.0.1:0 and return its base url.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
