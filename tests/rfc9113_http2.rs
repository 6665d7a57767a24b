//! HTTP/2 exchange tests (RFC 9113) against a scripted peer on an
//! in-memory pipe.

mod helpers;

use helpers::*;
use tokio_util::sync::CancellationToken;

use wraith::transport::h2::hpack;
use wraith::{Body, Error, H2Transport, Header, Method, Request};

const TEN_MIB: u32 = 10 * 1024 * 1024;

#[tokio::test]
async fn happy_path_get_exchange() {
    let (client, mut server) = tokio::io::duplex(262144);
    let peer = tokio::spawn(async move {
        let increment = server_handshake(&mut server, &[(0x4, 65535), (0x3, 100)]).await;
        // Corrected preamble: top the connection window up to the
        // stream window, not past it.
        assert_eq!(increment, TEN_MIB - 65535);

        let headers = read_frame(&mut server).await;
        assert_eq!(headers.frame_type, TYPE_HEADERS);
        assert_eq!(headers.stream_id, 1);
        assert_eq!(
            headers.flags & (FLAG_END_HEADERS | FLAG_END_STREAM),
            FLAG_END_HEADERS | FLAG_END_STREAM,
        );

        let mut fields = Vec::new();
        hpack::Decoder::new()
            .decode(&headers.payload, |n, v| {
                fields.push((n.to_vec(), v.to_vec()));
            })
            .unwrap();
        assert_eq!(
            fields,
            [
                (b":authority".to_vec(), b"example.com".to_vec()),
                (b":method".to_vec(), b"GET".to_vec()),
                (b":path".to_vec(), b"/".to_vec()),
                (b":scheme".to_vec(), b"https".to_vec()),
                (b"user-agent".to_vec(), b"wraith-test".to_vec()),
            ]
        );

        // :status 200 is static index 8.
        write_frame(&mut server, TYPE_HEADERS, FLAG_END_HEADERS, 1, &[0x88]).await;
        write_frame(&mut server, TYPE_DATA, FLAG_END_STREAM, 1, b"ok").await;
    });

    let cancel = CancellationToken::new();
    let mut tr = H2Transport::new(client);

    let mut seen_settings = Vec::new();
    tr.start(&cancel, |s| seen_settings.push(*s)).await.unwrap();
    assert_eq!(seen_settings.len(), 2);
    assert_eq!(seen_settings[0].id, 0x4);
    assert_eq!(seen_settings[0].value, 65535);

    let mut req = Request::new(Method::Get, "/");
    req.authority = "example.com".into();
    // Uppercase on purpose: H2 must lowercase names on the wire.
    req.headers.push("User-Agent", "wraith-test");
    tr.write_request(&cancel, &mut req).await.unwrap();

    let mut headers: Vec<Header> = Vec::new();
    tr.read_response(&cancel, |h| headers.push(h.clone())).await.unwrap();
    assert_eq!(headers, [Header::new(":status", "200")]);

    let mut body = Vec::new();
    tr.read_body(&cancel, &mut body).await.unwrap();
    assert_eq!(body, b"ok");

    peer.await.unwrap();
}

#[tokio::test]
async fn request_body_ends_with_empty_end_stream_frame() {
    let (client, mut server) = tokio::io::duplex(262144);
    let peer = tokio::spawn(async move {
        server_handshake(&mut server, &[]).await;

        let headers = read_frame(&mut server).await;
        assert_eq!(headers.frame_type, TYPE_HEADERS);
        assert_eq!(headers.flags & FLAG_END_STREAM, 0);

        let data = read_frame(&mut server).await;
        assert_eq!(data.frame_type, TYPE_DATA);
        assert_eq!(data.payload, b"abc");
        assert_eq!(data.flags & FLAG_END_STREAM, 0);

        let fin = read_frame(&mut server).await;
        assert_eq!(fin.frame_type, TYPE_DATA);
        assert!(fin.payload.is_empty());
        assert_eq!(fin.flags & FLAG_END_STREAM, FLAG_END_STREAM);

        write_frame(&mut server, TYPE_HEADERS, FLAG_END_HEADERS | FLAG_END_STREAM, 1, &[0x88])
            .await;
    });

    let cancel = CancellationToken::new();
    let mut tr = H2Transport::new(client);
    tr.start(&cancel, |_| {}).await.unwrap();

    let mut req = Request::new(Method::Post, "/upload");
    req.authority = "example.com".into();
    req.body = Some(Body::from_bytes("abc"));
    tr.write_request(&cancel, &mut req).await.unwrap();
    tr.read_response(&cancel, |_| {}).await.unwrap();

    peer.await.unwrap();
}

#[tokio::test]
async fn head_request_sends_no_data_frames() {
    let (client, mut server) = tokio::io::duplex(262144);
    let peer = tokio::spawn(async move {
        server_handshake(&mut server, &[]).await;

        let headers = read_frame(&mut server).await;
        assert_eq!(headers.frame_type, TYPE_HEADERS);
        // No body follows a HEAD request, so HEADERS closes the stream.
        assert_eq!(headers.flags & FLAG_END_STREAM, FLAG_END_STREAM);

        write_frame(&mut server, TYPE_HEADERS, FLAG_END_HEADERS | FLAG_END_STREAM, 1, &[0x88])
            .await;
    });

    let cancel = CancellationToken::new();
    let mut tr = H2Transport::new(client);
    tr.start(&cancel, |_| {}).await.unwrap();

    let mut req = Request::new(Method::Head, "/");
    req.authority = "example.com".into();
    req.body = Some(Body::from_bytes("never sent"));
    tr.write_request(&cancel, &mut req).await.unwrap();

    peer.await.unwrap();
}

#[tokio::test]
async fn flow_control_replenishes_before_window_exhausts() {
    let (client, mut server) = tokio::io::duplex(262144);
    let total = TEN_MIB as usize + 1;

    let peer = tokio::spawn(async move {
        server_handshake(&mut server, &[]).await;
        let request = read_frame(&mut server).await;
        assert_eq!(request.frame_type, TYPE_HEADERS);

        write_frame(&mut server, TYPE_HEADERS, FLAG_END_HEADERS, 1, &[0x88]).await;

        let chunk = vec![0x61u8; 16384];
        let mut sent = 0usize;
        while sent < total {
            let n = chunk.len().min(total - sent);
            let last = sent + n == total;
            let flags = if last { FLAG_END_STREAM } else { 0 };
            write_frame(&mut server, TYPE_DATA, flags, 1, &chunk[..n]).await;
            sent += n;
        }

        // The client must have replenished both windows mid-stream.
        let first = read_frame(&mut server).await;
        assert_eq!(first.frame_type, TYPE_WINDOW_UPDATE);
        assert_eq!(first.stream_id, 0);
        let conn_increment =
            u32::from_be_bytes(first.payload[..4].try_into().unwrap()) & 0x7fff_ffff;
        assert!(conn_increment >= 7 * 1024 * 1024, "increment {conn_increment}");

        let second = read_frame(&mut server).await;
        assert_eq!(second.frame_type, TYPE_WINDOW_UPDATE);
        assert_eq!(second.stream_id, 1);
        let stream_increment =
            u32::from_be_bytes(second.payload[..4].try_into().unwrap()) & 0x7fff_ffff;
        assert_eq!(stream_increment, conn_increment);
    });

    let cancel = CancellationToken::new();
    let mut tr = H2Transport::new(client);
    tr.start(&cancel, |_| {}).await.unwrap();

    let mut req = Request::new(Method::Get, "/large");
    req.authority = "example.com".into();
    tr.write_request(&cancel, &mut req).await.unwrap();
    tr.read_response(&cancel, |_| {}).await.unwrap();

    let mut body = Vec::new();
    tr.read_body(&cancel, &mut body).await.unwrap();
    assert_eq!(body.len(), total);

    peer.await.unwrap();
}

#[tokio::test]
async fn goaway_while_awaiting_headers_is_protocol_violation() {
    let (client, mut server) = tokio::io::duplex(262144);
    let peer = tokio::spawn(async move {
        server_handshake(&mut server, &[]).await;
        read_frame(&mut server).await;

        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_be_bytes()); // last stream
        payload.extend_from_slice(&0x2u32.to_be_bytes()); // INTERNAL_ERROR
        payload.extend_from_slice(b"going away");
        write_frame(&mut server, TYPE_GOAWAY, 0, 0, &payload).await;
    });

    let cancel = CancellationToken::new();
    let mut tr = H2Transport::new(client);
    tr.start(&cancel, |_| {}).await.unwrap();

    let mut req = Request::new(Method::Get, "/");
    req.authority = "example.com".into();
    tr.write_request(&cancel, &mut req).await.unwrap();

    let err = tr.read_response(&cancel, |_| {}).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));

    peer.await.unwrap();
}

#[tokio::test]
async fn ping_is_echoed_during_body_read() {
    let (client, mut server) = tokio::io::duplex(262144);
    let ping_data = [1u8, 2, 3, 4, 5, 6, 7, 8];

    let peer = tokio::spawn(async move {
        server_handshake(&mut server, &[]).await;
        read_frame(&mut server).await;

        write_frame(&mut server, TYPE_HEADERS, FLAG_END_HEADERS, 1, &[0x88]).await;
        write_frame(&mut server, TYPE_PING, 0, 0, &ping_data).await;

        let echo = read_frame(&mut server).await;
        assert_eq!(echo.frame_type, TYPE_PING);
        assert_eq!(echo.flags & FLAG_ACK, FLAG_ACK);
        assert_eq!(echo.payload, ping_data);

        write_frame(&mut server, TYPE_DATA, FLAG_END_STREAM, 1, b"done").await;
    });

    let cancel = CancellationToken::new();
    let mut tr = H2Transport::new(client);
    tr.start(&cancel, |_| {}).await.unwrap();

    let mut req = Request::new(Method::Get, "/");
    req.authority = "example.com".into();
    tr.write_request(&cancel, &mut req).await.unwrap();
    tr.read_response(&cancel, |_| {}).await.unwrap();

    let mut body = Vec::new();
    tr.read_body(&cancel, &mut body).await.unwrap();
    assert_eq!(body, b"done");

    peer.await.unwrap();
}

#[tokio::test]
async fn cancellation_between_data_frames_reads_nothing_more() {
    let (client, mut server) = tokio::io::duplex(262144);
    let peer = tokio::spawn(async move {
        server_handshake(&mut server, &[]).await;
        read_frame(&mut server).await;

        write_frame(&mut server, TYPE_HEADERS, FLAG_END_HEADERS, 1, &[0x88]).await;
        write_frame(&mut server, TYPE_DATA, 0, 1, b"first").await;
        // More data exists, but the client cancels before reading it.
        write_frame(&mut server, TYPE_DATA, FLAG_END_STREAM, 1, b"second").await;
    });

    let cancel = CancellationToken::new();
    let mut tr = H2Transport::new(client);
    tr.start(&cancel, |_| {}).await.unwrap();

    let mut req = Request::new(Method::Get, "/");
    req.authority = "example.com".into();
    tr.write_request(&cancel, &mut req).await.unwrap();
    tr.read_response(&cancel, |_| {}).await.unwrap();

    cancel.cancel();
    let mut body = Vec::new();
    let err = tr.read_body(&cancel, &mut body).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(body.is_empty());

    peer.await.unwrap();
}

#[tokio::test]
async fn missing_authority_is_rejected() {
    let (client, mut server) = tokio::io::duplex(262144);
    let peer = tokio::spawn(async move {
        server_handshake(&mut server, &[]).await;
    });

    let cancel = CancellationToken::new();
    let mut tr = H2Transport::new(client);
    tr.start(&cancel, |_| {}).await.unwrap();

    let mut req = Request::new(Method::Get, "/");
    let err = tr.write_request(&cancel, &mut req).await.unwrap_err();
    assert!(matches!(err, Error::Usage(_)));

    peer.await.unwrap();
}
