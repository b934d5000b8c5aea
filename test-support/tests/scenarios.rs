//! End-to-end exchanges driven over an in-memory duplex, one per literal
//! scenario named in this workspace's spec. Each test sends raw wire bytes
//! in, runs a handler through the real dispatcher, and inspects the raw
//! wire bytes that come back — nothing here reaches into the dispatcher's
//! internals.

use bytes::Bytes;
use chan_http::{
    body::Chunk,
    h1::{Dispatcher, Stream},
    FramingError, HttpServiceConfig, Request, Response,
};
use chan_test::duplex;

async fn run_exchange<H>(handler: H, request: &[u8]) -> Vec<u8>
where
    H: chan_http::Handler + 'static,
{
    let (server_io, mut client_io) = duplex();
    client_io.write_now(request);

    let stream = Stream::<_, 1_048_576, 1_048_576>::new(server_io);
    let config = HttpServiceConfig::<64, 1_048_576, 1_048_576>::new();

    let join = tokio::spawn(async move {
        let mut dispatcher = Dispatcher::new(stream, &handler, config);
        let _ = dispatcher.run().await;
    });

    let response = client_io.read_to_close().await.unwrap();
    join.await.unwrap();
    response
}

fn dechunk(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut rest = body;
    loop {
        let line_end = rest.windows(2).position(|w| w == b"\r\n").unwrap();
        let size = usize::from_str_radix(std::str::from_utf8(&rest[..line_end]).unwrap().trim(), 16).unwrap();
        rest = &rest[line_end + 2..];
        if size == 0 {
            break;
        }
        out.extend_from_slice(&rest[..size]);
        rest = &rest[size + 2..];
    }
    out
}

async fn hello(_req: &Request, res: &mut Response) -> Result<bool, FramingError> {
    res.set_content_length(11)?;
    res.write(Bytes::from_static(b"Hello world"), true).await?;
    Ok(true)
}

#[tokio::test]
async fn scenario_1_simple_get() {
    let response = run_exchange(hello, b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    let text = String::from_utf8(response).unwrap();
    assert_eq!(
        text,
        "HTTP/1.1 200 OK\r\ncontent-length: 11\r\nconnection: close\r\n\r\nHello world"
    );
}

async fn echo(req: &Request, res: &mut Response) -> Result<bool, FramingError> {
    loop {
        match req.next_chunk().await {
            Some(Chunk::Data { bytes, .. }) => res.write(bytes, false).await?,
            Some(Chunk::Eof) | None => {
                res.write(Bytes::new(), true).await?;
                break;
            }
            Some(Chunk::Error(_)) => break,
            Some(Chunk::Trailers(_)) => {}
        }
    }
    Ok(true)
}

#[tokio::test]
async fn scenario_2_chunked_echo() {
    let request = b"POST /echo HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
        5\r\nECHO \r\n5\r\nEcho \r\n4\r\necho\r\n0\r\n\r\n";
    let response = run_exchange(echo, request).await;
    let text = String::from_utf8_lossy(&response);

    let head_end = text.find("\r\n\r\n").unwrap() + 4;
    assert!(text[..head_end].starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text[..head_end].contains("transfer-encoding: chunked\r\n"));

    let body = dechunk(response[head_end..].as_ref());
    assert_eq!(body, b"ECHO Echo echo");
}

async fn content_length_too_little(_req: &Request, res: &mut Response) -> Result<bool, FramingError> {
    res.set_content_length(10)?;
    res.write(Bytes::from_static(b"12345"), true).await?;
    Ok(true)
}

#[tokio::test]
async fn scenario_3_declared_length_too_big_fails_before_commit() {
    let response = run_exchange(content_length_too_little, b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    let text = String::from_utf8(response).unwrap();
    assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{text}");
    assert!(text.contains("content-length: 0\r\n"));
}

async fn content_length_shrunk_below_written(_req: &Request, res: &mut Response) -> Result<bool, FramingError> {
    res.write(Bytes::from_static(b"1234567890"), false).await?;
    res.set_content_length(5)?;
    Ok(true)
}

#[tokio::test]
async fn scenario_4_write_then_shrink_still_fails_pre_commit() {
    let response = run_exchange(content_length_shrunk_below_written, b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    let text = String::from_utf8(response).unwrap();
    // the first write is held back pending this call's own validation (see
    // `Response::write`), so the violation is still caught before anything
    // reaches the wire and a clean 500 is possible — not a half-sent 200.
    assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{text}");
}

async fn delayed_ok(_req: &Request, res: &mut Response) -> Result<bool, FramingError> {
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    res.set_content_length(2)?;
    res.write(Bytes::from_static(b"OK"), true).await?;
    Ok(true)
}

#[tokio::test]
async fn scenario_5_async_dispatched_completion() {
    let request = run_exchange(delayed_ok, b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");
    tokio::time::timeout(std::time::Duration::from_secs(10), request)
        .await
        .expect("exchange should complete inside the stop timeout");
}

async fn count_content_size(req: &Request, res: &mut Response) -> Result<bool, FramingError> {
    let mut total = 0usize;
    loop {
        match req.next_chunk().await {
            Some(Chunk::Data { bytes, .. }) => total += bytes.len(),
            Some(Chunk::Eof) | None => break,
            Some(Chunk::Error(_)) => break,
            Some(Chunk::Trailers(_)) => {}
        }
    }
    let body = format!("contentSize={total}");
    res.set_content_length(body.len() as u64)?;
    res.write(Bytes::from(body), true).await?;
    Ok(true)
}

#[tokio::test]
async fn scenario_6_large_chunk_count_no_stack_overflow() {
    let chunk_body = "abcd".repeat(100_000);
    let mut request = format!(
        "POST /count HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        chunk_body.len()
    )
    .into_bytes();
    request.extend_from_slice(chunk_body.as_bytes());

    let response = run_exchange(count_content_size, &request).await;
    let text = String::from_utf8(response).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with("contentSize=400000"), "{text}");
}
