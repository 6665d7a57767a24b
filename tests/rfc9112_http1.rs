//! HTTP/1.1 exchange tests (RFC 9112) over in-memory pipes.

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;

use wraith::{Body, Error, H1Transport, Header, Method, Request};

/// Run a scripted peer on the server half of a duplex pipe.
fn script<F, Fut>(server: DuplexStream, peer: F) -> tokio::task::JoinHandle<Vec<u8>>
where
    F: FnOnce(DuplexStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Vec<u8>> + Send + 'static,
{
    tokio::spawn(peer(server))
}

/// Read from the server half until the request head terminator.
async fn read_request_head(server: &mut DuplexStream) -> String {
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    while !received.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = server.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before request head completed");
        received.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(received).unwrap()
}

#[tokio::test]
async fn get_with_known_length_response() {
    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        let head = read_request_head(&mut server).await;
        assert!(head.starts_with("GET /x HTTP/1.1\r\n"));
        assert!(head.contains("Host: example.com\r\n"));

        server
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
            .await
            .unwrap();
        Vec::new()
    });

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Get, "/x");
    req.authority = "example.com".into();
    tr.write_request(&cancel, &mut req, |_| {}).await.unwrap();

    let mut headers: Vec<Header> = Vec::new();
    tr.read_response(&cancel, |h| headers.push(h.clone())).await.unwrap();
    assert_eq!(headers[0], Header::new(":proto", "HTTP/1.1"));
    assert_eq!(headers[1], Header::new(":status", "200 OK"));
    assert_eq!(headers[2], Header::new("Content-Length", "5"));

    let mut body = Vec::new();
    tr.read_body(&cancel, &mut body).await.unwrap();
    assert_eq!(body, b"hello");

    peer.await.unwrap();
}

#[tokio::test]
async fn chunked_response_reassembles_and_has_no_trailers() {
    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        read_request_head(&mut server).await;
        server
            .write_all(
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                  5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
            )
            .await
            .unwrap();
        Vec::new()
    });

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Get, "/chunked");
    req.authority = "example.com".into();
    tr.write_request(&cancel, &mut req, |_| {}).await.unwrap();
    tr.read_response(&cancel, |_| {}).await.unwrap();

    let mut body = Vec::new();
    tr.read_body(&cancel, &mut body).await.unwrap();
    assert_eq!(body, b"hello world");

    let mut trailers: Vec<Header> = Vec::new();
    tr.read_trailers(&cancel, |h| trailers.push(h.clone())).await.unwrap();
    assert!(trailers.is_empty());

    peer.await.unwrap();
}

#[tokio::test]
async fn chunked_response_with_trailers() {
    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        read_request_head(&mut server).await;
        server
            .write_all(
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                  4\r\nbody\r\n0\r\nX-Checksum: abc123\r\n\r\n",
            )
            .await
            .unwrap();
        Vec::new()
    });

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Get, "/");
    tr.write_request(&cancel, &mut req, |_| {}).await.unwrap();
    tr.read_response(&cancel, |_| {}).await.unwrap();

    let mut body = Vec::new();
    tr.read_body(&cancel, &mut body).await.unwrap();
    assert_eq!(body, b"body");

    let mut trailers: Vec<Header> = Vec::new();
    tr.read_trailers(&cancel, |h| trailers.push(h.clone())).await.unwrap();
    assert_eq!(trailers, [Header::new("X-Checksum", "abc123")]);

    peer.await.unwrap();
}

#[tokio::test]
async fn post_with_unknown_length_is_chunked() {
    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while !received.windows(5).any(|w| w == b"0\r\n\r\n") {
            let n = server.read(&mut buf).await.unwrap();
            assert!(n > 0);
            received.extend_from_slice(&buf[..n]);
        }
        server
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        received
    });

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Post, "/upload");
    req.authority = "example.com".into();
    // A bare reader exposes no length, forcing chunked framing.
    req.body = Some(Body::from_reader(std::io::Cursor::new(b"abc".to_vec())));

    let mut traced: Vec<Header> = Vec::new();
    tr.write_request(&cancel, &mut req, |h| traced.push(h.clone())).await.unwrap();

    let wire_bytes = peer.await.unwrap();
    let text = String::from_utf8(wire_bytes).unwrap();
    assert!(text.contains("Transfer-Encoding: chunked\r\n"));
    assert!(text.ends_with("\r\n\r\n3\r\nabc\r\n0\r\n\r\n"));
    assert!(traced.iter().any(|h| h.name == "Transfer-Encoding" && h.value == "chunked"));

    tr.read_response(&cancel, |_| {}).await.unwrap();
    let mut body = Vec::new();
    tr.read_body(&cancel, &mut body).await.unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn known_length_body_uses_content_length_framing() {
    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        let head = read_request_head(&mut server).await;
        let body_start = head.find("\r\n\r\n").unwrap() + 4;
        let mut body = head[body_start..].as_bytes().to_vec();
        let mut buf = [0u8; 64];
        while body.len() < 5 {
            let n = server.read(&mut buf).await.unwrap();
            assert!(n > 0);
            body.extend_from_slice(&buf[..n]);
        }
        assert!(head.contains("Content-Length: 5\r\n"));
        assert!(!head.contains("Transfer-Encoding"));
        assert_eq!(&body, b"Hello");

        server
            .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        Vec::new()
    });

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Post, "/exact");
    req.authority = "example.com".into();
    req.headers.push("Content-Length", "5");
    req.body = Some(Body::from_bytes("Hello"));
    tr.write_request(&cancel, &mut req, |_| {}).await.unwrap();
    tr.read_response(&cancel, |_| {}).await.unwrap();

    peer.await.unwrap();
}

#[tokio::test]
async fn head_suppresses_response_body_read() {
    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        let head = read_request_head(&mut server).await;
        assert!(head.starts_with("HEAD / HTTP/1.1\r\n"));
        // Content-Length without a body, as HEAD responses do.
        server
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n")
            .await
            .unwrap();
        Vec::new()
    });

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Head, "/");
    tr.write_request(&cancel, &mut req, |_| {}).await.unwrap();
    tr.read_response(&cancel, |_| {}).await.unwrap();

    let mut body = Vec::new();
    tr.read_body(&cancel, &mut body).await.unwrap();
    assert!(body.is_empty());

    peer.await.unwrap();
}

#[tokio::test]
async fn status_line_without_space_is_malformed() {
    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        read_request_head(&mut server).await;
        server.write_all(b"HTTP/1.1-200-OK\r\n\r\n").await.unwrap();
        Vec::new()
    });

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Get, "/");
    tr.write_request(&cancel, &mut req, |_| {}).await.unwrap();
    let err = tr.read_response(&cancel, |_| {}).await.unwrap_err();
    assert!(matches!(err, Error::Wire(_)));

    peer.await.unwrap();
}

#[tokio::test]
async fn header_without_colon_is_malformed() {
    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        read_request_head(&mut server).await;
        server
            .write_all(b"HTTP/1.1 200 OK\r\nBadHeaderNoColon\r\n\r\n")
            .await
            .unwrap();
        Vec::new()
    });

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Get, "/");
    tr.write_request(&cancel, &mut req, |_| {}).await.unwrap();
    let err = tr.read_response(&cancel, |_| {}).await.unwrap_err();
    assert!(matches!(err, Error::Wire(_)));

    peer.await.unwrap();
}

#[tokio::test]
async fn oversized_chunk_size_is_malformed() {
    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        read_request_head(&mut server).await;
        // 17 hex digits exceeds the 16-digit bound.
        server
            .write_all(
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                  11112222333344445\r\n",
            )
            .await
            .unwrap();
        Vec::new()
    });

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Get, "/");
    tr.write_request(&cancel, &mut req, |_| {}).await.unwrap();
    tr.read_response(&cancel, |_| {}).await.unwrap();

    let mut body = Vec::new();
    let err = tr.read_body(&cancel, &mut body).await.unwrap_err();
    assert!(matches!(err, Error::Wire(_)));

    peer.await.unwrap();
}

#[tokio::test]
async fn conflicting_response_framing_is_malformed() {
    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        read_request_head(&mut server).await;
        server
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n",
            )
            .await
            .unwrap();
        Vec::new()
    });

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Get, "/");
    tr.write_request(&cancel, &mut req, |_| {}).await.unwrap();
    let err = tr.read_response(&cancel, |_| {}).await.unwrap_err();
    assert!(matches!(err, Error::Wire(_)));

    peer.await.unwrap();
}

#[tokio::test]
async fn cancellation_before_body_read_is_clean() {
    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        read_request_head(&mut server).await;
        server
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
            .await
            .unwrap();
        Vec::new()
    });

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Get, "/");
    tr.write_request(&cancel, &mut req, |_| {}).await.unwrap();
    tr.read_response(&cancel, |_| {}).await.unwrap();

    cancel.cancel();
    let mut body = Vec::new();
    let err = tr.read_body(&cancel, &mut body).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(body.is_empty());

    peer.await.unwrap();
}

#[tokio::test]
async fn body_release_hook_runs_after_write() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let (client, server) = tokio::io::duplex(65536);
    let peer = script(server, |mut server| async move {
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while !received.windows(5).any(|w| w == b"0\r\n\r\n") {
            let n = server.read(&mut buf).await.unwrap();
            assert!(n > 0);
            received.extend_from_slice(&buf[..n]);
        }
        Vec::new()
    });

    let released = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&released);

    let cancel = CancellationToken::new();
    let (r, w) = tokio::io::split(client);
    let mut tr = H1Transport::new(r, w);

    let mut req = Request::new(Method::Post, "/");
    req.body = Some(
        Body::from_reader(std::io::Cursor::new(b"payload".to_vec()))
            .with_release(move || flag.store(true, Ordering::SeqCst)),
    );
    tr.write_request(&cancel, &mut req, |_| {}).await.unwrap();

    assert!(released.load(Ordering::SeqCst));
    peer.await.unwrap();
}
