use std::time::Duration;

use kbqa_core::traits::ChatModel;
use kbqa_llm::{ChatClientError, OpenAiChatClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve exactly one HTTP response and hand back the raw request text.
async fn one_shot_server(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.expect("read");
            if n == 0 { break; }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0)))
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length { break; }
            }
        }
        let response = format!("{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}", body.len());
        socket.write_all(response.as_bytes()).await.expect("write");
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf).to_string()
    });
    (format!("http://{addr}/v1"), handle)
}

#[tokio::test]
async fn complete_sends_system_and_user_messages() {
    let (url, server) = one_shot_server("HTTP/1.1 200 OK", r#"{"choices":[{"message":{"role":"assistant","content":"{\"action\":\"rag\"}"}}]}"#).await;
    let client = OpenAiChatClient::new(&url, "gpt-4o-mini", 0.0, Some("sk-test".into()), Duration::from_secs(5)).expect("client");

    let reply = client.complete("be a router", "query: descale").await.expect("reply");
    assert_eq!(reply, r#"{"action":"rag"}"#);

    let request = server.await.expect("server");
    assert!(request.starts_with("POST /v1/chat/completions"));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
    assert!(request.contains(r#""role":"system""#));
    assert!(request.contains(r#""content":"query: descale""#));
}

#[tokio::test]
async fn non_success_status_is_api_error() {
    let (url, server) = one_shot_server("HTTP/1.1 500 Internal Server Error", r#"{"error":"boom"}"#).await;
    let client = OpenAiChatClient::new(&url, "m", 1.0, None, Duration::from_secs(5)).expect("client");

    let err = client.chat(vec![]).await.expect_err("500");
    assert!(matches!(err, ChatClientError::Api { status: 500, .. }), "got {err}");
    server.await.expect("server");
}

#[tokio::test]
async fn empty_choices_is_empty_response() {
    let (url, server) = one_shot_server("HTTP/1.1 200 OK", r#"{"choices":[]}"#).await;
    let client = OpenAiChatClient::new(&url, "m", 1.0, None, Duration::from_secs(5)).expect("client");

    let err = client.chat(vec![]).await.expect_err("no content");
    assert!(matches!(err, ChatClientError::EmptyResponse));
    server.await.expect("server");
}
