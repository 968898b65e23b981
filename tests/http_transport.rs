mod common;

use answer_stream::{ChannelSink, ChatStreamRequest, ClientConfig, StreamClient, StreamEvent};
use common::{collect_until_terminal, finished_frame, frame};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// How the loopback backend answers
enum Reply {
    /// Chunked event stream, one HTTP chunk per entry, then end of body
    Stream(Vec<String>),
    /// Chunked event stream that never ends
    StreamThenHang(Vec<String>),
    Status(u16, &'static str),
}

struct CapturedRequest {
    head: String,
    body: serde_json::Value,
}

/// Serve exactly one request on a loopback port
async fn serve_once(reply: Reply) -> (String, oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let captured = read_request(&mut socket).await;
        let _ = tx.send(captured);

        match reply {
            Reply::Stream(chunks) => {
                write_stream(&mut socket, &chunks).await;
                socket.write_all(b"0\r\n\r\n").await.unwrap();
                socket.flush().await.unwrap();
            }
            Reply::StreamThenHang(chunks) => {
                write_stream(&mut socket, &chunks).await;
                std::future::pending::<()>().await;
            }
            Reply::Status(code, body) => {
                let response = format!(
                    "HTTP/1.1 {} Error\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    code,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
            }
        }
    });

    (endpoint, rx)
}

async fn read_request(socket: &mut TcpStream) -> CapturedRequest {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];

    let header_end = loop {
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let content_length: usize = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())
                .flatten()
        })
        .unwrap_or(0);

    while raw.len() < header_end + content_length {
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending the body");
        raw.extend_from_slice(&buf[..n]);
    }

    let body = serde_json::from_slice(&raw[header_end..header_end + content_length]).unwrap();
    CapturedRequest { head, body }
}

async fn write_stream(socket: &mut TcpStream, chunks: &[String]) {
    socket
        .write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nTransfer-Encoding: chunked\r\n\r\n",
        )
        .await
        .unwrap();
    for chunk in chunks {
        let encoded = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
        socket.write_all(encoded.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
    }
}

fn config(endpoint: String) -> ClientConfig {
    ClientConfig {
        endpoint,
        connect_timeout_secs: 5,
        idle_timeout_secs: 10,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn test_streams_answer_over_http() {
    // Split the wire bytes away from frame boundaries
    let wire = [
        frame("[THINKING_START]"),
        frame("pondering"),
        frame("[THINKING_END]"),
        frame("[ANSWER_START]"),
        frame("forty-two"),
        finished_frame(),
    ]
    .concat();
    let chunks: Vec<String> = wire
        .as_bytes()
        .chunks(37)
        .map(|c| String::from_utf8(c.to_vec()).unwrap())
        .collect();

    let (endpoint, captured) = serve_once(Reply::Stream(chunks)).await;
    let mut config = config(endpoint);
    config
        .headers
        .insert("Authorization".to_string(), "Bearer secret".to_string());
    let client = StreamClient::with_http(config).unwrap();
    let (sink, mut rx) = ChannelSink::new();

    let request = ChatStreamRequest::new("What is the answer?")
        .with_model_type("deep")
        .with_max_tokens(256);
    let session = client.start(request, sink).unwrap();
    let events = collect_until_terminal(&mut rx).await;

    let thinking: String = events
        .iter()
        .filter_map(|e| match &e.event {
            StreamEvent::Thinking(u) => Some(u.delta.clone()),
            _ => None,
        })
        .collect();
    let answer: String = events
        .iter()
        .filter_map(|e| match &e.event {
            StreamEvent::Answer(u) => Some(u.delta.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(thinking, "pondering");
    assert_eq!(answer, "forty-two");
    assert!(matches!(events.last().unwrap().event, StreamEvent::Complete(_)));

    let request = captured.await.unwrap();
    let head = request.head.to_ascii_lowercase();
    assert!(head.starts_with("post /api/chat/stream "));
    assert!(head.contains("accept: text/event-stream"));
    assert!(head.contains("authorization: bearer secret"));
    assert_eq!(request.body["message"], "What is the answer?");
    assert_eq!(request.body["modelType"], "deep");
    assert_eq!(request.body["maxTokens"], 256);
    assert_eq!(request.body["enableThinkingMarkers"], true);
    assert!(request.body.get("temperature").is_none());

    session.wait().await;
    assert!(session.bytes_received() >= wire.len() as u64);
}

#[tokio::test]
async fn test_error_status_fails_session() {
    let (endpoint, _captured) = serve_once(Reply::Status(500, "model overloaded")).await;
    let client = StreamClient::with_http(config(endpoint)).unwrap();
    let (sink, mut rx) = ChannelSink::new();

    client.start(ChatStreamRequest::new("hi"), sink).unwrap();
    let events = collect_until_terminal(&mut rx).await;

    assert_eq!(events.len(), 1);
    match &events[0].event {
        StreamEvent::Error { message } => {
            assert!(message.contains("500"), "unexpected message: {}", message);
            assert!(message.contains("model overloaded"));
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_backend_fails_session() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = StreamClient::with_http(config(endpoint)).unwrap();
    let (sink, mut rx) = ChannelSink::new();

    client.start(ChatStreamRequest::new("hi"), sink).unwrap();
    let events = collect_until_terminal(&mut rx).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0].event, StreamEvent::Error { .. }));
}

#[tokio::test]
async fn test_cancel_interrupts_hanging_stream() {
    let (endpoint, _captured) =
        serve_once(Reply::StreamThenHang(vec![frame("[ANSWER_START]"), frame("part")])).await;
    let client = StreamClient::with_http(config(endpoint)).unwrap();
    let (sink, mut rx) = ChannelSink::new();

    let session = client.start(ChatStreamRequest::new("hi"), sink).unwrap();
    let first = rx.recv().await.unwrap();
    assert!(matches!(&first.event, StreamEvent::Answer(u) if u.delta == "part"));

    session.cancel();
    tokio::time::timeout(Duration::from_secs(2), session.wait())
        .await
        .expect("session did not stop after cancel");

    assert_eq!(rx.recv().await.unwrap().event, StreamEvent::Cancelled);
    assert!(rx.try_recv().is_err());
}
