#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use previewar_core::llm::{ChatBackend, ChatRequest, ContentPart};
use previewar_core::scraper::{ClientOptions, ScraperHttpClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", name, e))
}

/// In-memory backend that answers with canned replies, in order.
pub struct FakeBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

impl ChatBackend for FakeBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, String> {
        let text: Vec<&str> = request
            .messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::ImageBase64 { .. } => None,
            })
            .collect();
        self.prompts.lock().unwrap().push(text.join("\n"));

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("fake backend ran out of replies".to_string()))
    }
}

type Routes = HashMap<String, VecDeque<(u16, String)>>;

/// Local HTTP/1.1 server answering each path from a script of
/// `(status, body)` pairs. The last response for a path repeats; unknown
/// paths get a 404.
pub struct ScriptedServer {
    addr: SocketAddr,
    routes: Arc<Mutex<Routes>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl ScriptedServer {
    pub async fn start(script: &[(&str, &[(u16, &str)])]) -> Self {
        let routes: Routes = script
            .iter()
            .map(|(path, responses)| {
                let queue = responses.iter().map(|(s, b)| (*s, b.to_string())).collect();
                (path.to_string(), queue)
            })
            .collect();
        let routes = Arc::new(Mutex::new(routes));
        let requested = Arc::new(Mutex::new(Vec::new()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (task_routes, task_requested) = (routes.clone(), requested.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(answer(stream, task_routes.clone(), task_requested.clone()));
            }
        });

        Self {
            addr,
            routes,
            requested,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// How many times `path` was requested.
    pub fn hits(&self, path: &str) -> usize {
        self.requested.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    pub fn add_route(&self, path: &str, responses: &[(u16, &str)]) {
        let queue = responses.iter().map(|(s, b)| (*s, b.to_string())).collect();
        self.routes.lock().unwrap().insert(path.to_string(), queue);
    }
}

async fn answer(mut stream: TcpStream, routes: Arc<Mutex<Routes>>, requested: Arc<Mutex<Vec<String>>>) {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&request);
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    requested.lock().unwrap().push(path.clone());

    let (status, body) = {
        let mut routes = routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or((404, String::new())),
            None => (404, String::new()),
        }
    };

    let response = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Client for [`ScriptedServer`]: no proxies and a short pacing gap.
pub fn local_client(respect_robots: bool) -> ScraperHttpClient {
    ScraperHttpClient::new(&ClientOptions {
        requests_per_second: 100.0,
        respect_robots,
        use_system_proxy: false,
        ..ClientOptions::default()
    })
    .unwrap()
}
