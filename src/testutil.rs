//! Mock servers shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// Mock HTTP proxy that answers 200 only while at most `limit` requests
/// are in flight and 502 beyond that; `hold` keeps concurrent requests
/// overlapping so the limit is actually observable.
pub(crate) async fn concurrency_limited_proxy(limit: usize, hold: Duration) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    let active = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let active = active.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let mut pending: Vec<u8> = Vec::new();
                loop {
                    while !pending.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => pending.extend_from_slice(&buf[..n]),
                        }
                    }
                    pending.clear();
                    let in_flight = active.fetch_add(1, Ordering::SeqCst) + 1;
                    let response = if in_flight > limit {
                        "HTTP/1.1 502 Bad Gateway\r\ncontent-length: 0\r\n\r\n"
                    } else {
                        tokio::time::sleep(hold).await;
                        "HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok"
                    };
                    active.fetch_sub(1, Ordering::SeqCst);
                    if stream.write_all(response.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    url
}
