use serde_json::{Value, json};
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const PROXY_VARS: [&str; 6] = [
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
];

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    path: String,
    body: Value,
}

type Handler = dyn Fn(&str, &str) -> (u16, String) + Send + Sync;

/// Minimal HTTP/1.1 server answering one request per connection.
struct MockServer {
    url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    fn start(handler: Box<Handler>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        listener
            .set_nonblocking(true)
            .expect("nonblocking listener");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let recorded = Arc::clone(&requests);
        let stopped = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(30);
            while !stopped.load(Ordering::SeqCst) && Instant::now() < deadline {
                match listener.accept() {
                    Ok((stream, _)) => {
                        if let Some(request) = serve(stream, handler.as_ref()) {
                            recorded.lock().expect("requests lock").push(request);
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            url,
            requests,
            stop,
            handle: Some(handle),
        }
    }

    fn finish(mut self) -> Vec<RecordedRequest> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join().expect("mock server thread");
        }
        self.requests.lock().expect("requests lock").clone()
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

fn serve(mut stream: TcpStream, handler: &Handler) -> Option<RecordedRequest> {
    stream.set_nonblocking(false).ok()?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .ok()?;

    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    let header_end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        let read = stream.read(&mut chunk).ok()?;
        if read == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let read = stream.read(&mut chunk).ok()?;
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
    }
    let body_end = buf.len().min(body_start + content_length);
    let body = serde_json::from_slice(&buf[body_start..body_end]).unwrap_or(Value::Null);

    let (status, response_body) = handler(&method, &path);
    let response = format!(
        "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response_body}",
        response_body.len()
    );
    stream.write_all(response.as_bytes()).ok()?;
    stream.flush().ok()?;

    Some(RecordedRequest { method, path, body })
}

fn openai_handler(method: &str, path: &str) -> (u16, String) {
    match (method, path) {
        ("POST", "/v1/chat/completions") => (
            200,
            json!({
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Mock reply."},
                    "finish_reason": "stop"
                }],
                "usage": {"total_tokens": 21}
            })
            .to_string(),
        ),
        ("GET", "/v1/models") => (
            200,
            json!({
                "object": "list",
                "data": [
                    {"id": "gpt-4o", "created": 1715367049, "owned_by": "system"},
                    {"id": "gpt-4o-mini-tts", "created": 1742403959, "owned_by": "system"},
                    {"id": "text-embedding-3-small", "created": 1705948997, "owned_by": "system"}
                ]
            })
            .to_string(),
        ),
        _ => (404, json!({"error": {"message": "unknown route"}}).to_string()),
    }
}

struct Session {
    dir: tempfile::TempDir,
}

impl Session {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join(".chatconfig.json")
    }

    fn run(&self, server_url: &str, args: &[&str]) -> Output {
        run_ch(self.dir.path(), &self.config_path(), server_url, args)
    }

    fn stored(&self) -> Value {
        let raw = fs::read_to_string(self.config_path()).expect("config file should exist");
        serde_json::from_str(&raw).expect("config file should be JSON")
    }
}

fn run_ch(dir: &Path, config_path: &Path, server_url: &str, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ch"));
    cmd.args(args)
        .current_dir(dir)
        .env("CHAT_CONFIG_PATH", config_path)
        .env("OPENAI_API_KEY", "test-key")
        .env("OPENAI_BASE_URL", format!("{server_url}/v1"))
        .env("ANTHROPIC_BASE_URL", format!("{server_url}/anthropic/v1"))
        .env("NO_PROXY", "127.0.0.1,localhost")
        .env("NO_COLOR", "1")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("TOOLS_URL")
        .env_remove("CHAT_LOG_LEVEL")
        .env_remove("CHAT_LOG_OUTPUT");
    for var in PROXY_VARS {
        cmd.env_remove(var);
    }
    cmd.output().expect("failed to run ch binary")
}

fn chat_bodies(requests: &[RecordedRequest]) -> Vec<&Value> {
    requests
        .iter()
        .filter(|request| request.path == "/v1/chat/completions")
        .map(|request| &request.body)
        .collect()
}

#[test]
fn first_message_uses_and_persists_defaults() {
    let server = MockServer::start(Box::new(openai_handler));
    let session = Session::new();
    let output = session.run(&server.url, &["-m", "hello", "there"]);
    let requests = server.finish();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr:\n{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("MODEL RESPONSE:"), "{stdout}");
    assert!(stdout.contains("Mock reply."), "{stdout}");
    assert!(stdout.contains("Tokens used: 21"), "{stdout}");

    let bodies = chat_bodies(&requests);
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["model"], "gpt-3.5-turbo");
    assert_eq!(bodies[0]["temperature"], 0.0);
    assert_eq!(bodies[0]["messages"][0]["role"], "system");
    assert_eq!(
        bodies[0]["messages"][0]["content"],
        "You are a skilled Python programmer who writes tersely."
    );
    assert_eq!(bodies[0]["messages"][1]["content"], "hello there");

    let stored = session.stored();
    assert_eq!(stored["model"], "gpt-3.5-turbo");
    assert_eq!(stored["provider"], "openai");
    assert_eq!(
        stored["system"],
        "You are a skilled Python programmer who writes tersely."
    );
}

#[test]
fn system_override_persists_and_is_reused() {
    let server = MockServer::start(Box::new(openai_handler));
    let session = Session::new();
    let first = session.run(&server.url, &["-s", "Answer in French.", "-m", "hi"]);
    let second = session.run(&server.url, &["-m", "again"]);
    let requests = server.finish();

    assert!(first.status.success());
    assert!(second.status.success());
    let bodies = chat_bodies(&requests);
    assert_eq!(bodies.len(), 2);
    for body in bodies {
        assert_eq!(body["messages"][0]["content"], "Answer in French.");
    }
    assert_eq!(session.stored()["system"], "Answer in French.");
}

#[test]
fn conversation_over_two_invocations_stores_four_messages() {
    let server = MockServer::start(Box::new(openai_handler));
    let session = Session::new();
    assert!(session.run(&server.url, &["-c", "-m", "first"]).status.success());
    assert!(session.run(&server.url, &["-c", "-m", "second"]).status.success());
    let requests = server.finish();

    let stored = session.stored();
    let messages = stored["messages"].as_array().expect("messages array");
    let turns: Vec<(&str, &str)> = messages
        .iter()
        .map(|message| {
            (
                message["role"].as_str().unwrap_or_default(),
                message["content"].as_str().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(
        turns,
        vec![
            ("user", "first"),
            ("assistant", "Mock reply."),
            ("user", "second"),
            ("assistant", "Mock reply."),
        ]
    );

    let bodies = chat_bodies(&requests);
    assert_eq!(bodies[1]["messages"].as_array().map(Vec::len), Some(4));
}

#[test]
fn anthropic_without_api_key_fails_cleanly() {
    let server = MockServer::start(Box::new(openai_handler));
    let session = Session::new();
    let output = session.run(&server.url, &["-p", "anthropic", "-m", "hi"]);
    let requests = server.finish();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1), "stderr:\n{stderr}");
    assert!(stderr.contains("ANTHROPIC_API_KEY"), "{stderr}");
    assert!(!stderr.contains("panicked"), "{stderr}");
    assert!(requests.is_empty());
    assert_eq!(session.stored()["provider"], "anthropic");
}

#[test]
fn available_models_lists_without_chat_request() {
    let server = MockServer::start(Box::new(openai_handler));
    let session = Session::new();
    let output = session.run(&server.url, &["--available-models"]);
    let requests = server.finish();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr:\n{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("gpt-4o"), "{stdout}");
    assert!(!stdout.contains("text-embedding"), "{stdout}");
    assert!(!stdout.contains("gpt-4o-mini-tts"), "{stdout}");
    assert!(chat_bodies(&requests).is_empty());
    assert!(requests.iter().all(|request| request.method == "GET"));
}

#[test]
fn gpt_listing_includes_non_chat_gpt_models() {
    let server = MockServer::start(Box::new(openai_handler));
    let session = Session::new();
    let output = session.run(&server.url, &["--available-models-gpt"]);
    server.finish();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr:\n{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("gpt-4o-mini-tts"), "{stdout}");
    assert!(!stdout.contains("text-embedding"), "{stdout}");
    assert!(stdout.contains("Total GPT models shown: 2"), "{stdout}");
}

#[test]
fn no_arguments_prints_usage_and_fails() {
    let server = MockServer::start(Box::new(openai_handler));
    let session = Session::new();
    let output = session.run(&server.url, &[]);
    server.finish();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage: ch -m"));
}

#[test]
fn unknown_flag_is_rejected_by_argument_parser() {
    let session = Session::new();
    let output = session.run("http://127.0.0.1:9", &["--frobnicate"]);
    assert_eq!(output.status.code(), Some(2));
}
