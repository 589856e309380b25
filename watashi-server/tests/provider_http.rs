//! The real `LlmService` against a local stand-in for the provider endpoint.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;
use watashi_server::{
    llm::LlmService,
    prompt::{PromptPolicy, TriggerKeywords, PROFILE_DOCUMENT},
    router, AppState,
};
use watashi_shared::{FrameDecoder, StreamChunk};

enum Upstream {
    /// Accept the connection and never answer.
    Silent,
    /// Answer every request with this raw HTTP response.
    Reply(String),
}

async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            return;
        }
    }
}

async fn spawn_upstream(behaviour: Upstream) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let behaviour = Arc::new(behaviour);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let behaviour = behaviour.clone();
            tokio::spawn(async move {
                read_request(&mut socket).await;
                match behaviour.as_ref() {
                    Upstream::Silent => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                    }
                    Upstream::Reply(response) => {
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                }
            });
        }
    });
    addr
}

fn app(upstream: SocketAddr, timeout: Duration) -> Router {
    let service = LlmService::new(
        "sk-test".to_string(),
        format!("http://{upstream}/v1"),
        "claude-3-haiku-20240307".to_string(),
        256,
    );
    router(AppState {
        provider: Arc::new(service),
        policy: Arc::new(PromptPolicy::classifier(TriggerKeywords::default(), PROFILE_DOCUMENT)),
        request_timeout: timeout,
    })
}

async fn post_hello(app: Router) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"messages":[{"role":"user","content":"hello"}]}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn silent_provider_is_a_500_timeout() {
    let upstream = spawn_upstream(Upstream::Silent).await;
    let (status, body) = post_hello(app(upstream, Duration::from_millis(300))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "Internal server error");
    assert!(json["message"].as_str().unwrap().contains("did not respond"));
}

#[tokio::test]
async fn provider_auth_failure_is_a_500() {
    let error = r#"{"error":{"message":"invalid x-api-key","type":"authentication_error","param":null,"code":null}}"#;
    let response = format!(
        "HTTP/1.1 401 Unauthorized\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        error.len(),
        error
    );
    let upstream = spawn_upstream(Upstream::Reply(response)).await;
    let (status, body) = post_hello(app(upstream, Duration::from_secs(30))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "Internal server error");
    assert!(!json["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn successful_provider_stream_is_relayed_from_first_token() {
    let event = |content: &str, finish: &str| {
        format!(
            "data: {{\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"m\",\
\"choices\":[{{\"index\":0,\"delta\":{{\"role\":\"assistant\",\"content\":\"{content}\"}},\"finish_reason\":{finish}}}]}}\n\n"
        )
    };
    let mut response = String::from(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
    );
    response.push_str(&event("Hel", "null"));
    response.push_str(&event("lo", "\"stop\""));
    response.push_str("data: [DONE]\n\n");

    let upstream = spawn_upstream(Upstream::Reply(response)).await;
    let (status, body) = post_hello(app(upstream, Duration::from_secs(30))).await;

    assert_eq!(status, StatusCode::OK);
    let mut decoder = FrameDecoder::new();
    let chunks: Vec<StreamChunk> = decoder.push(&body).into_iter().map(|c| c.unwrap()).collect();
    let text: String = chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::Text(delta) => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Hello");
    assert!(matches!(chunks.last(), Some(StreamChunk::Finish(_))));
}
