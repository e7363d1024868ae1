use crate::{
    cache::ResponseCache,
    limits::{CacheLimits, ConnLimits, ReqLimits, ServerLimits},
    server::{queue::ConnQueue, worker::ProxyConnection},
};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

/// A forward proxy that accepts connections and serves one GET per client.
///
/// The server initializes the response cache and the handoff queue exactly
/// once, spawns a fixed pool of workers at build time, and then does nothing
/// but accept and enqueue. [`launch`](Self::launch) never returns.
///
/// # Examples
///
/// ```no_run
/// use keeper_proxy::Server;
/// use tokio::net::TcpListener;
///
/// #[tokio::main]
/// async fn main() {
///     Server::builder()
///         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
///         .build()
///         .launch()
///         .await
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    queue: Arc<ConnQueue<TcpStream>>,
    cache: Arc<ResponseCache>,
}

impl Server {
    /// Creates a new builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            listener: None,
            cache: None,

            server_limits: None,
            connection_limits: None,
            cache_limits: None,
            request_limits: None,
        }
    }

    /// Handle to the response cache shared with the worker pool.
    #[inline]
    pub fn cache(&self) -> Arc<ResponseCache> {
        self.cache.clone()
    }

    /// Starts accepting connections. Never returns.
    ///
    /// Each accepted connection is enqueued for the worker pool; when the
    /// queue is full the acceptor waits, it never rejects.
    pub async fn launch(self) {
        info!("proxy accepting connections");

        loop {
            let Ok((stream, _)) = self.listener.accept().await else {
                continue;
            };

            self.queue.push(stream).await;
        }
    }
}

//

/// Builder for configuring and creating [`Server`] instances.
pub struct ServerBuilder {
    listener: Option<TcpListener>,
    cache: Option<Arc<ResponseCache>>,

    server_limits: Option<ServerLimits>,
    connection_limits: Option<ConnLimits>,
    cache_limits: Option<CacheLimits>,
    request_limits: Option<ReqLimits>,
}

impl ServerBuilder {
    /// Sets the TCP listener that the server will use to accept connections.
    ///
    /// **This is a required component.**
    #[inline(always)]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Installs an externally constructed cache instead of building one.
    ///
    /// Lets several servers share one cache, and lets embedders keep a handle
    /// for inspection. When the injected cache was built with different
    /// bounds than [`cache_limits`](Self::cache_limits), the cache's own
    /// bounds win; the builder's `max_object_size` still controls how much of
    /// a response the workers are willing to capture.
    #[inline(always)]
    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Configures the worker pool and handoff queue.
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures optional socket deadlines.
    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    /// Configures the cache bounds.
    #[inline(always)]
    pub fn cache_limits(mut self, limits: CacheLimits) -> Self {
        self.cache_limits = Some(limits);
        self
    }

    /// Configures protocol line limits.
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Finalizes the builder, spawns the worker pool, and constructs a
    /// [`Server`] instance.
    ///
    /// # Panics
    ///
    /// Panics when the `listener` method was not called.
    #[inline]
    #[track_caller]
    pub fn build(self) -> Server {
        let listener = self
            .listener
            .expect("The `listener` method must be called to create");

        let limits: AllLimits = (
            self.server_limits.unwrap_or_default(),
            self.connection_limits.unwrap_or_default(),
            self.cache_limits.unwrap_or_default(),
            self.request_limits.unwrap_or_default(),
        );

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(ResponseCache::new(limits.2.clone())));
        let queue = Arc::new(ConnQueue::new(
            limits.0.queue_capacity,
            limits.0.wait_strategy.clone(),
        ));

        for _ in 0..limits.0.worker_count {
            Self::spawn_worker(&queue, &cache, &limits);
        }
        info!(workers = limits.0.worker_count, "worker pool started");

        Server {
            listener,
            queue,
            cache,
        }
    }

    #[inline]
    fn spawn_worker(queue: &Arc<ConnQueue<TcpStream>>, cache: &Arc<ResponseCache>, limits: &AllLimits) {
        let queue = queue.clone();
        let mut conn = ProxyConnection::new(cache.clone(), limits);

        tokio::spawn(async move {
            loop {
                let mut stream = queue.pop().await;
                let _ = conn.run(&mut stream).await;
                // Dropping the stream closes the client connection; the
                // protocol serves exactly one request per connection.
            }
        });
    }
}

pub(crate) type AllLimits = (ServerLimits, ConnLimits, CacheLimits, ReqLimits);

#[cfg(test)]
mod proxy_end_to_end {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Minimal origin: answers every connection with the same bytes after the
    /// request's blank line arrives, then closes.
    async fn stub_origin(response: Vec<u8>) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);

                let response = response.clone();
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    let mut buf = [0u8; 1024];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                seen.extend_from_slice(&buf[..n]);
                                if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                                    break;
                                }
                            }
                        }
                    }
                    let _ = stream.write_all(&response).await;
                });
            }
        });

        (port, hits)
    }

    async fn launch_proxy() -> (u16, Arc<ResponseCache>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = Server::builder().listener(listener).build();
        let cache = server.cache();
        tokio::spawn(server.launch());

        (port, cache)
    }

    async fn http_get(proxy: u16, target: &str) -> Vec<u8> {
        let mut stream = TcpStream::connect(("127.0.0.1", proxy)).await.unwrap();
        stream
            .write_all(format!("GET {target} HTTP/1.0\r\n\r\n").as_bytes())
            .await
            .unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn second_request_is_served_from_the_cache() {
        let origin_response = b"HTTP/1.0 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec();
        let (origin, hits) = stub_origin(origin_response.clone()).await;
        let (proxy, _) = launch_proxy().await;

        let target = format!("http://127.0.0.1:{origin}/a");
        let first = http_get(proxy, &target).await;

        assert_eq!(first, origin_response);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let second = http_get(proxy, &target).await;

        // Byte-identical replay, zero additional origin connections.
        assert_eq!(second, first);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn oversize_responses_stream_fully_but_are_not_cached() {
        let mut origin_response = b"HTTP/1.0 200 OK\r\nContent-Length: 200000\r\n\r\n".to_vec();
        origin_response.extend(vec![b'x'; 200_000]);
        let (origin, hits) = stub_origin(origin_response.clone()).await;
        let (proxy, cache) = launch_proxy().await;

        let target = format!("http://127.0.0.1:{origin}/big");
        let first = http_get(proxy, &target).await;
        assert_eq!(first, origin_response);

        let second = http_get(proxy, &target).await;
        assert_eq!(second, origin_response);

        // Both requests reached the origin: nothing was cached.
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(cache.total_size(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_clients_share_one_cached_entry() {
        let origin_response = b"HTTP/1.0 200 OK\r\nContent-Length: 4\r\n\r\nsame".to_vec();
        let (origin, hits) = stub_origin(origin_response.clone()).await;
        let (proxy, _) = launch_proxy().await;

        let target = format!("http://127.0.0.1:{origin}/shared");
        let warmup = http_get(proxy, &target).await;
        assert_eq!(warmup, origin_response);

        let clients: Vec<_> = (0..100)
            .map(|_| {
                let target = target.clone();
                tokio::spawn(async move { http_get(proxy, &target).await })
            })
            .collect();

        for client in clients {
            assert_eq!(client.await.unwrap(), origin_response);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn relative_targets_resolve_through_the_host_header() {
        let origin_response = b"HTTP/1.0 200 OK\r\nContent-Length: 3\r\n\r\nrel".to_vec();
        let (origin, hits) = stub_origin(origin_response.clone()).await;
        let (proxy, _) = launch_proxy().await;

        let mut stream = TcpStream::connect(("127.0.0.1", proxy)).await.unwrap();
        stream
            .write_all(
                format!("GET /page HTTP/1.0\r\nHost: 127.0.0.1:{origin}\r\n\r\n").as_bytes(),
            )
            .await
            .unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();

        assert_eq!(response, origin_response);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
