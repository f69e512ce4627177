//! Minimal HTTP/1.1 server on localhost for download tests.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

type Responses = HashMap<String, Vec<(u16, Vec<u8>)>>;
type Hits = Arc<Mutex<HashMap<String, usize>>>;

#[derive(Default)]
pub struct TestServer {
    routes: Responses,
}

pub struct RunningServer {
    base: String,
    hits: Hits,
}

impl TestServer {
    pub fn new() -> Self {
        TestServer::default()
    }

    /// Queue a response for `path`. The last one queued keeps being served.
    /// Unknown paths get 404.
    pub fn route<B: Into<Vec<u8>>>(mut self, path: &str, status: u16, body: B) -> Self {
        self.routes
            .entry(path.to_string())
            .or_default()
            .push((status, body.into()));
        self
    }

    pub async fn start(self) -> RunningServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let routes = Arc::new(self.routes);
        let hits: Hits = Arc::default();

        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, routes.clone(), counter.clone()));
            }
        });

        RunningServer { base, hits }
    }
}

impl RunningServer {
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Number of requests received for `path`
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

async fn serve(mut stream: TcpStream, routes: Arc<Responses>, hits: Hits) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }
    let path = String::from_utf8_lossy(&request)
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    let nth = {
        let mut hits = hits.lock().unwrap();
        let count = hits.entry(path.clone()).or_insert(0);
        *count += 1;
        *count - 1
    };
    let (status, body) = match routes.get(&path) {
        Some(responses) => responses[nth.min(responses.len() - 1)].clone(),
        None => (404, b"not found".to_vec()),
    };
    let reason = match status {
        200 => "OK",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Whatever",
    };

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.shutdown().await
}
