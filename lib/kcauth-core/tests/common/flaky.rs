#![allow(dead_code, clippy::expect_used)]
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::debug;

const TOKEN_BODY: &str = r#"{"access_token":"T1","token_type":"Bearer","expires_in":60}"#;

/// Token endpoint closing the first connections without answering.
///
/// Works at the TCP level, since an HTTP server cannot drop a connection
/// from a handler.
#[derive(Debug)]
pub struct FlakyEndpoint {
    pub token_endpoint: String,
    accepted: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FlakyEndpoint {
    /// Drops `drops` connections, then answers every request with a token.
    pub async fn start(drops: usize) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if count <= drops {
                    debug!(count, "dropping connection");
                    drop(stream);
                    continue;
                }
                tokio::spawn(answer(stream));
            }
        });

        Ok(Self {
            token_endpoint: format!("http://{addr}/realms/Test/protocol/openid-connect/token"),
            accepted,
            handle,
        })
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for FlakyEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn answer(mut stream: TcpStream) {
    if read_request(&mut stream).await.is_err() {
        return;
    }
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{TOKEN_BODY}",
        TOKEN_BODY.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Reads the request head and its `content-length` body.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(chunk.get(..read).unwrap_or_default());

        let Some(head_end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(buffer.get(..head_end).unwrap_or_default())
            .to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buffer.len() >= head_end + 4 + length {
            return Ok(());
        }
    }
}
