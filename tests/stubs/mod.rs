#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

pub struct StubResponse {
    pub status: u16,
    pub body: String,
    pub content_type: &'static str,
}

impl StubResponse {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: "text/html; charset=utf-8",
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            content_type: "application/json",
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_owned(),
            content_type: "text/plain",
        }
    }
}

type Handler = dyn Fn(&str, &str, &str) -> StubResponse + Send + 'static;

/// A tiny_http server running `handler(method, path, body)` on a background thread.
pub struct StubServer {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StubServer {
    pub fn spawn(handler: Box<Handler>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start stub server");
        let base_url = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let method = request.method().to_string();
                let url = request.url().to_string();
                let path = url.split('?').next().unwrap_or(&url).to_owned();
                let stub = handler(&method, &path, &body);

                let header = tiny_http::Header::from_bytes(
                    &b"Content-Type"[..],
                    stub.content_type.as_bytes(),
                )
                .expect("build header");
                let response = tiny_http::Response::from_string(stub.body)
                    .with_status_code(stub.status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Novel site serving `/works/1` and the given episodes at `/works/1/episodes/{id}`.
/// Each episode links to the next one in the slice. Ids in `broken` answer 500.
pub fn spawn_novel_site(episodes: &[(&str, &str, &str)], broken: &[&str]) -> StubServer {
    let mut pages: HashMap<String, String> = HashMap::new();
    let first = episodes.first().map(|(id, _, _)| id.to_string());

    let work_page = match first.as_deref() {
        Some(id) => format!(
            r#"<!doctype html><html><head><meta property="og:title" content="Stub Work"></head>
<body><a id="readFromFirstEpisode" href="/works/1/episodes/{id}">read</a></body></html>"#
        ),
        None => "<!doctype html><html><body>no episodes</body></html>".to_owned(),
    };
    pages.insert("/works/1".to_owned(), work_page);

    for (idx, (id, title, body)) in episodes.iter().enumerate() {
        let next = match episodes.get(idx + 1) {
            Some((next_id, _, _)) => format!(
                r#"<a class="widget-episode-navigation-next" href="/works/1/episodes/{next_id}">next</a>"#
            ),
            None => String::new(),
        };
        let paragraphs = body
            .lines()
            .map(|line| format!("<p>{line}</p>"))
            .collect::<String>();
        pages.insert(
            format!("/works/1/episodes/{id}"),
            format!(
                r#"<!doctype html><html><body>
<p class="widget-episodeTitle">{title}</p>
<div class="widget-episodeBody">{paragraphs}</div>
{next}
</body></html>"#
            ),
        );
    }

    let broken = broken
        .iter()
        .map(|id| format!("/works/1/episodes/{id}"))
        .collect::<Vec<_>>();

    StubServer::spawn(Box::new(move |_method, path, _body| {
        if broken.iter().any(|b| b == path) {
            return StubResponse::status(500, "upstream error");
        }
        match pages.get(path) {
            Some(html) => StubResponse::html(html.clone()),
            None => StubResponse::status(404, "not found"),
        }
    }))
}

pub struct FlakySite {
    pub server: StubServer,
    pub hits: Arc<AtomicUsize>,
}

impl FlakySite {
    pub fn work_url(&self) -> String {
        format!("{}/works/1", self.server.base_url)
    }

    pub fn episode_url(&self) -> String {
        format!("{}/works/1/episodes/7", self.server.base_url)
    }

    /// Requests made for the episode page (the work page is not counted).
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// One-episode site whose episode page answers `failure()` for the first `failures`
/// requests and the real page afterwards. `usize::MAX` never recovers.
pub fn spawn_flaky_episode(
    failures: usize,
    failure: impl Fn() -> StubResponse + Send + 'static,
) -> FlakySite {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let server = StubServer::spawn(Box::new(move |_method, path, _body| match path {
        "/works/1" => StubResponse::html(
            r#"<!doctype html><html><head><meta property="og:title" content="Flaky Work"></head>
<body><a id="readFromFirstEpisode" href="/works/1/episodes/7">read</a></body></html>"#,
        ),
        "/works/1/episodes/7" => {
            let seen = counter.fetch_add(1, Ordering::SeqCst);
            if seen < failures {
                return failure();
            }
            StubResponse::html(
                r#"<!doctype html><html><body>
<p class="widget-episodeTitle">第七話</p>
<div class="widget-episodeBody"><p>body</p></div>
</body></html>"#,
            )
        }
        _ => StubResponse::status(404, "not found"),
    }));

    FlakySite { server, hits }
}

/// Anti-bot interstitial: a 200 page with no episode body.
pub fn challenge_page() -> StubResponse {
    StubResponse::html("<!doctype html><html><body><p>Just a moment...</p></body></html>")
}

#[derive(Debug, Clone, Copy)]
pub enum GeminiBehavior {
    /// `TH:` + the text between the prompt markers.
    Echo,
    /// Every call ends with a SAFETY finish reason and no text.
    Blocked,
}

pub struct GeminiStub {
    pub server: StubServer,
    pub calls: Arc<AtomicUsize>,
}

impl GeminiStub {
    pub fn base_url(&self) -> String {
        format!("{}/v1beta", self.server.base_url)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn spawn_gemini(behavior: GeminiBehavior) -> GeminiStub {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let server = StubServer::spawn(Box::new(move |method, path, body| {
        if method != "POST" || !path.ends_with(":generateContent") {
            return StubResponse::status(404, "not found");
        }
        counter.fetch_add(1, Ordering::SeqCst);

        let parsed: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(_) => return StubResponse::status(400, "invalid json"),
        };
        let categories = parsed
            .get("safetySettings")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        if categories == 0 {
            return StubResponse::status(400, "missing safetySettings");
        }
        let Some(prompt) = parsed
            .pointer("/contents/0/parts/0/text")
            .and_then(|v| v.as_str())
        else {
            return StubResponse::status(400, "missing prompt");
        };

        match behavior {
            GeminiBehavior::Blocked => StubResponse::json(
                200,
                serde_json::json!({ "candidates": [ { "finishReason": "SAFETY" } ] }),
            ),
            GeminiBehavior::Echo => {
                let source = extract_between(prompt, "BEGIN_TEXT\n", "\nEND_TEXT")
                    .or_else(|| extract_between(prompt, "BEGIN_TITLE\n", "\nEND_TITLE"))
                    .unwrap_or("");
                StubResponse::json(
                    200,
                    serde_json::json!({
                        "candidates": [{
                            "content": { "role": "model", "parts": [ { "text": format!("TH:{source}") } ] },
                            "finishReason": "STOP"
                        }]
                    }),
                )
            }
        }
    }));

    GeminiStub { server, calls }
}

pub struct WebhookStub {
    pub server: StubServer,
    pub messages: Arc<Mutex<Vec<String>>>,
}

impl WebhookStub {
    pub fn url(&self) -> String {
        format!("{}/webhook", self.server.base_url)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("lock messages").clone()
    }
}

pub fn spawn_webhook() -> WebhookStub {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();

    let server = StubServer::spawn(Box::new(move |method, path, body| {
        if method != "POST" || path != "/webhook" {
            return StubResponse::status(404, "not found");
        }
        let content = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("content").and_then(|c| c.as_str()).map(str::to_owned));
        match content {
            Some(content) => {
                sink.lock().expect("lock messages").push(content);
                StubResponse::status(204, "")
            }
            None => StubResponse::status(400, "missing content"),
        }
    }));

    WebhookStub { server, messages }
}

fn extract_between<'a>(text: &'a str, begin: &str, end: &str) -> Option<&'a str> {
    let start = text.find(begin)? + begin.len();
    let rest = &text[start..];
    let end_rel = rest.find(end)?;
    Some(&rest[..end_rel])
}
