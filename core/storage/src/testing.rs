//! In-process fakes of the remote store for tests.
//!
//! Both fakes share one [`FakeStore`]: a REST command endpoint served with
//! axum and a minimal RESP server on a raw TCP socket.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Bearer token the REST fake accepts.
pub const REST_TOKEN: &str = "letmein";

#[derive(Default)]
pub struct FakeStore {
    pub values: HashMap<String, String>,
    pub expiries: HashMap<String, u64>,
}

impl FakeStore {
    /// Apply one command and return its reply value.
    fn apply(&mut self, args: &[String]) -> std::result::Result<Option<String>, String> {
        let command = args.first().map(|c| c.to_uppercase()).unwrap_or_default();
        match (command.as_str(), args.len()) {
            ("GET", 2) => Ok(self.values.get(&args[1]).cloned()),
            ("SET", 3) | ("SET", 5) => {
                self.values.insert(args[1].clone(), args[2].clone());
                match args.get(4) {
                    Some(secs) => {
                        let secs = secs.parse().map_err(|_| "ERR value is not an integer")?;
                        self.expiries.insert(args[1].clone(), secs);
                    }
                    None => {
                        self.expiries.remove(&args[1]);
                    }
                }
                Ok(Some("OK".to_string()))
            }
            _ => Err(format!("ERR unknown command '{}'", command)),
        }
    }
}

pub type SharedStore = Arc<Mutex<FakeStore>>;

async fn rest_command(
    State(store): State<SharedStore>,
    headers: HeaderMap,
    Json(args): Json<Vec<Value>>,
) -> (StatusCode, Json<Value>) {
    let expected = format!("Bearer {}", REST_TOKEN);
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})));
    }

    let args: Vec<String> = args
        .iter()
        .map(|arg| match arg {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect();

    let reply = store.lock().unwrap().apply(&args);
    match reply {
        Ok(result) => (StatusCode::OK, Json(json!({ "result": result }))),
        Err(error) => (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))),
    }
}

/// Serve the REST command fake. Returns its URL and backing store.
pub async fn spawn_rest_store() -> (String, SharedStore) {
    let store: SharedStore = Arc::default();
    let app = Router::new()
        .route("/", post(rest_command))
        .with_state(store.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/", addr), store)
}

/// Read one RESP array of bulk strings. `None` on a closed connection.
async fn read_command(reader: &mut BufReader<TcpStream>) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data).await.ok()?;
        data.truncate(len);
        args.push(String::from_utf8_lossy(&data).into_owned());
    }
    Some(args)
}

async fn serve_resp(stream: TcpStream, store: SharedStore) {
    let mut reader = BufReader::new(stream);
    while let Some(args) = read_command(&mut reader).await {
        let command = args.first().map(|c| c.to_uppercase()).unwrap_or_default();
        let reply = if command == "GET" || command == "SET" {
            let result = store.lock().unwrap().apply(&args);
            match result {
                Ok(Some(text)) if command == "GET" => {
                    format!("${}\r\n{}\r\n", text.len(), text)
                }
                Ok(None) => "$-1\r\n".to_string(),
                Ok(Some(_)) => "+OK\r\n".to_string(),
                Err(error) => format!("-{}\r\n", error),
            }
        } else {
            // Connection setup (CLIENT SETINFO, AUTH, PING, ...)
            "+OK\r\n".to_string()
        };
        if reader.get_mut().write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Serve the RESP fake. Returns a `redis://` URL and the backing store.
pub async fn spawn_resp_store() -> (String, SharedStore) {
    let store: SharedStore = Arc::default();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept_store = store.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_resp(stream, accept_store.clone()));
        }
    });
    (format!("redis://{}/", addr), store)
}
