use crate::{
    cache::ResponseCache,
    errors::ErrorKind,
    http::{
        request::{is_blank_line, LineReader, RequestLine},
        rewrite::build_origin_request,
        uri::RequestTarget,
    },
    limits::{CacheLimits, ConnLimits},
    server::server_impl::AllLimits,
};
use std::{io, sync::Arc};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::sleep,
};
use tracing::{debug, warn};

impl ConnLimits {
    #[inline]
    pub(crate) async fn write_bytes<S>(&self, stream: &mut S, bytes: &[u8]) -> io::Result<()>
    where
        S: AsyncWriteExt + Unpin,
    {
        match self.socket_write_timeout {
            None => stream.write_all(bytes).await,
            Some(time) => {
                tokio::select! {
                    biased;

                    result = stream.write_all(bytes) => result,
                    _ = sleep(time) => {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "write timeout"))
                    },
                }
            }
        }
    }
}

/// Per-worker request state, allocated once and reused for every connection
/// the worker serves.
pub(crate) struct ProxyConnection {
    cache: Arc<ResponseCache>,

    client_reader: LineReader,
    origin_reader: LineReader,
    line: Vec<u8>,
    headers: Vec<Vec<u8>>,
    capture: Vec<u8>,

    pub(crate) conn_limits: ConnLimits,
    cache_limits: CacheLimits,
}

impl ProxyConnection {
    #[inline]
    pub(crate) fn new(cache: Arc<ResponseCache>, limits: &AllLimits) -> Self {
        Self {
            cache,

            client_reader: LineReader::new(&limits.3),
            origin_reader: LineReader::new(&limits.3),
            line: Vec::new(),
            headers: Vec::new(),
            capture: Vec::with_capacity(limits.2.max_object_size),

            conn_limits: limits.1.clone(),
            cache_limits: limits.2.clone(),
        }
    }

    #[inline]
    fn reset(&mut self) {
        self.client_reader.reset();
        self.origin_reader.reset();
        self.headers.clear();
        self.capture.clear();
    }

    /// Serves exactly one request, rendering an error page when the protocol
    /// layer rejects it. I/O failures abort without a response: by the time
    /// they surface, the wire is no longer in a state to carry one.
    pub(crate) async fn run<S>(&mut self, stream: &mut S) -> Result<(), io::Error>
    where
        S: AsyncReadExt + AsyncWriteExt + Unpin,
    {
        self.reset();

        match self.serve(stream).await {
            Ok(()) => Ok(()),
            Err(ErrorKind::Io(error)) => {
                debug!("request aborted: {}", error.0);
                Err(error.0)
            }
            Err(error) => {
                debug!(status = error.status(), "request rejected");
                self.conn_limits.write_bytes(stream, &error.as_http()).await
            }
        }
    }

    async fn serve<S>(&mut self, client: &mut S) -> Result<(), ErrorKind>
    where
        S: AsyncReadExt + AsyncWriteExt + Unpin,
    {
        let read = self
            .client_reader
            .read_line(client, &self.conn_limits, &mut self.line)
            .await?;
        if read == 0 {
            // Connected and left without a word.
            return Ok(());
        }

        let request = RequestLine::split(&self.line)?;
        if !request.is_get() {
            return Err(ErrorKind::MethodNotImplemented(request.method));
        }

        if let Some(body) = self.cache.find(&request.target) {
            debug!(uri = %request.target, bytes = body.len(), "cache hit");
            self.conn_limits.write_bytes(client, &body).await?;
            return Ok(());
        }

        self.read_client_headers(client).await?;
        let target = self.resolve_target(&request)?;

        let mut origin = match TcpStream::connect((target.host.as_str(), target.port)).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(host = %target.host, port = target.port, %error, "origin connect failed");
                return Err(ErrorKind::OriginUnreachable(target.host));
            }
        };

        let upstream = build_origin_request(&target, &self.headers);
        self.conn_limits.write_bytes(&mut origin, &upstream).await?;

        self.relay_response(client, &mut origin, &request.target).await
        // `origin` drops here on success and on every error path above.
    }

    async fn read_client_headers<S>(&mut self, client: &mut S) -> Result<(), ErrorKind>
    where
        S: AsyncReadExt + Unpin,
    {
        loop {
            let read = self
                .client_reader
                .read_line(client, &self.conn_limits, &mut self.line)
                .await?;
            if read == 0 || is_blank_line(&self.line) {
                return Ok(());
            }
            self.headers.push(self.line.clone());
        }
    }

    /// Absolute targets carry their own authority; relative ones borrow it
    /// from the Host header.
    fn resolve_target(&self, request: &RequestLine) -> Result<RequestTarget, ErrorKind> {
        if !request.target.starts_with('/') {
            return Ok(RequestTarget::parse(&request.target));
        }

        let host_line = self
            .headers
            .iter()
            .find(|line| line.len() >= 5 && line[..5].eq_ignore_ascii_case(b"host:"))
            .ok_or(ErrorKind::MalformedRequest)?;
        let value = simdutf8::basic::from_utf8(&host_line[5..])
            .map_err(|_| ErrorKind::MalformedRequest)?
            .trim();

        Ok(RequestTarget::from_host_header(value, &request.target))
    }

    /// Streams the origin response through to the client as it arrives,
    /// capturing a copy for the cache while it still fits the object bound.
    async fn relay_response<S>(
        &mut self,
        client: &mut S,
        origin: &mut TcpStream,
        uri: &str,
    ) -> Result<(), ErrorKind>
    where
        S: AsyncWriteExt + Unpin,
    {
        let mut total = 0usize;

        loop {
            let read = self
                .origin_reader
                .read_chunk(origin, &self.conn_limits, &mut self.line)
                .await?;
            if read == 0 {
                break;
            }

            self.conn_limits.write_bytes(client, &self.line).await?;

            total += read;
            if total <= self.cache_limits.max_object_size {
                self.capture.extend_from_slice(&self.line);
            }
        }

        if total <= self.cache_limits.max_object_size {
            self.cache.insert(uri, &self.capture);
            debug!(uri = %uri, bytes = total, "response cached");
        } else {
            debug!(uri = %uri, bytes = total, "response exceeds object bound, not cached");
        }

        Ok(())
    }
}

#[cfg(test)]
mod serve_paths {
    use super::*;
    use crate::limits::{ReqLimits, ServerLimits};
    use tokio::io::duplex;

    fn connection(cache: Arc<ResponseCache>) -> ProxyConnection {
        let limits = (
            ServerLimits::default(),
            ConnLimits::default(),
            CacheLimits::default(),
            ReqLimits::default(),
        );
        ProxyConnection::new(cache, &limits)
    }

    async fn roundtrip(conn: &mut ProxyConnection, request: &[u8]) -> Vec<u8> {
        let (mut client, mut server) = duplex(64 * 1024);

        client.write_all(request).await.unwrap();
        client.shutdown().await.unwrap();

        conn.run(&mut server).await.unwrap();
        drop(server);

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn non_get_methods_get_501() {
        let cache = Arc::new(ResponseCache::new(CacheLimits::default()));
        let mut conn = connection(cache);

        let response =
            roundtrip(&mut conn, b"POST http://example.com/ HTTP/1.0\r\n\r\n").await;
        let text = String::from_utf8(response).unwrap();

        assert!(text.starts_with("HTTP/1.0 501 Not Implemented"));
        assert!(text.contains("POST"));
    }

    #[tokio::test]
    async fn cache_hit_answers_without_an_origin() {
        let cache = Arc::new(ResponseCache::new(CacheLimits::default()));
        let stored = b"HTTP/1.0 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        cache.insert("http://example.com/a", stored);

        let mut conn = connection(cache);
        let response =
            roundtrip(&mut conn, b"GET http://example.com/a HTTP/1.0\r\n\r\n").await;

        // Stored bytes verbatim: headers and body exactly as first received.
        assert_eq!(response, stored);
    }

    #[tokio::test]
    async fn unreachable_origin_gets_503() {
        let cache = Arc::new(ResponseCache::new(CacheLimits::default()));
        let mut conn = connection(cache);

        // A listener bound and dropped leaves a port that refuses connects.
        let refused = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let request = format!("GET http://127.0.0.1:{refused}/ HTTP/1.0\r\n\r\n");
        let response = roundtrip(&mut conn, request.as_bytes()).await;
        let text = String::from_utf8(response).unwrap();

        assert!(text.starts_with("HTTP/1.0 503 Service Unavailable"), "{text}");
        assert!(text.contains("127.0.0.1"));
    }

    #[tokio::test]
    async fn malformed_request_line_gets_400() {
        let cache = Arc::new(ResponseCache::new(CacheLimits::default()));
        let mut conn = connection(cache);

        let response = roundtrip(&mut conn, b"GET\r\n\r\n").await;
        let text = String::from_utf8(response).unwrap();

        assert!(text.starts_with("HTTP/1.0 400 Bad Request"));
    }

    #[tokio::test]
    async fn overlong_header_line_gets_500() {
        let cache = Arc::new(ResponseCache::new(CacheLimits::default()));
        let mut conn = connection(cache);

        let mut request = b"GET http://example.com/ HTTP/1.0\r\nX-Pad: ".to_vec();
        request.extend(std::iter::repeat(b'a').take(9000));
        request.extend_from_slice(b"\r\n\r\n");

        let response = roundtrip(&mut conn, &request).await;
        let text = String::from_utf8(response).unwrap();

        assert!(text.starts_with("HTTP/1.0 500 Internal Server Error"), "{text}");
    }

    #[tokio::test]
    async fn relative_target_without_host_gets_400() {
        let cache = Arc::new(ResponseCache::new(CacheLimits::default()));
        let mut conn = connection(cache);

        let response = roundtrip(&mut conn, b"GET /a HTTP/1.0\r\n\r\n").await;
        let text = String::from_utf8(response).unwrap();

        assert!(text.starts_with("HTTP/1.0 400 Bad Request"));
    }

    #[tokio::test]
    async fn silent_client_is_closed_without_a_response() {
        let cache = Arc::new(ResponseCache::new(CacheLimits::default()));
        let mut conn = connection(cache);

        let response = roundtrip(&mut conn, b"").await;
        assert!(response.is_empty());
    }
}
