//! In-process WebDriver server for tests.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

/// Scripted answers of the fake server.
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    /// Report the mermaid error element as present.
    pub reject: bool,
    /// Fail session creation.
    pub refuse_sessions: bool,
}

/// A WebDriver server answering on a loopback port.
pub(crate) struct FakeDriver {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeDriver {
    pub(crate) fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let script = script.clone();
                let log = Arc::clone(&log);
                std::thread::spawn(move || serve(stream, &script, &log));
            }
        });

        Self { url, requests }
    }

    /// `METHOD /path` of every request received so far.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn serve(stream: TcpStream, script: &Script, log: &Mutex<Vec<String>>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return;
    }
    let mut content_length = 0;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).unwrap();
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap();
        }
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let path = parts.next().unwrap_or_default().to_owned();
    log.lock().unwrap().push(format!("{method} {path}"));

    let (status, value) = respond(&method, &path, &body, script);
    let payload = json!({ "value": value }).to_string();
    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    )
    .unwrap();
    stream.flush().unwrap();
}

fn respond(method: &str, path: &str, body: &Value, script: &Script) -> (u16, Value) {
    let error = |status: u16, code: &str| (status, json!({ "error": code, "message": code }));

    match (method, path) {
        ("GET", "/status") => (200, json!({ "ready": true, "message": "ready" })),
        ("POST", "/session") if script.refuse_sessions => error(500, "session not created"),
        ("POST", "/session") => (200, json!({ "sessionId": "s1", "capabilities": {} })),
        ("DELETE", "/session/s1") => (200, Value::Null),
        ("POST", "/session/s1/url") => (200, Value::Null),
        ("POST", "/session/s1/execute/sync") => (200, json!([0, 0])),
        ("POST", "/session/s1/window/rect") => (200, body.clone()),
        ("POST", "/session/s1/element") => {
            let selector = body["value"].as_str().unwrap_or_default();
            if selector.contains("error") && !script.reject {
                error(404, "no such element")
            } else {
                (200, json!({ "element-6066-11e4-a52e-4f735466cecf": "e1" }))
            }
        }
        ("GET", "/session/s1/element/e1/displayed") => (200, json!(true)),
        ("GET", "/session/s1/element/e1/rect") => (
            200,
            json!({ "x": 20.0, "y": 20.0, "width": 300.0, "height": 200.0 }),
        ),
        ("GET", "/session/s1/element/e1/screenshot") => (200, json!(BASE64.encode(png(800, 600)))),
        _ => error(404, "unknown command"),
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec();
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[8, 6, 0, 0, 0]);
    data
}
