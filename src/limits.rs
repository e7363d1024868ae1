//! Proxy configuration limits and bounds
//!
//! # Defaults
//!
//! Default limits reproduce the classic small-proxy configuration: a pool of
//! four workers fed by a sixteen-slot handoff queue, a one-megabyte response
//! cache with a 100 KiB per-object ceiling, and 8 KiB protocol lines. They
//! are deliberately conservative; raise them only for workloads you have
//! measured.
//!
//! # Examples
//!
//! ```no_run
//! use keeper_proxy::{Server, limits::{CacheLimits, ServerLimits}};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .server_limits(ServerLimits {
//!             worker_count: 8, // More concurrent requests in flight
//!             ..ServerLimits::default()
//!         })
//!         .cache_limits(CacheLimits {
//!             max_cache_size: 8 * 1024 * 1024,
//!             ..CacheLimits::default()
//!         })
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```

use std::time::Duration;

/// Controls the worker pool and the acceptor-to-worker handoff queue.
///
/// # Connection management
/// ```text
///                [------------]
///                [ Tcp accept ]
///                [------------]
///                      ||
///                      || TCP_STREAM
///                      \/
///            /--------------------\   Full   [----------------]
///            | Slot in the queue? | =======> [ Acceptor waits ]
///            \--------------------/          [----------------]
///                      ||
///                      \/
///    [--------]  Yes  /----------------\   No   [------]
///    [ Worker ] <==== | Queued stream? | =====> [ Wait ]
///    [--------]       \----------------/        [------]
/// ```
///
/// The queue is a strict FIFO buffer between connection acceptance and
/// processing. Both sides poll it using the configured `wait_strategy`:
/// the acceptor when every slot is taken, the workers when none is filled.
///
/// # Worker
/// A worker is a continuously running asynchronous task, created once during
/// initialization (from [tokio::spawn]). It runs in an infinite loop, pulling
/// connections from the shared queue, serving exactly one request on each,
/// and closing the connection afterwards. This design eliminates the need to
/// create tasks per connection and keeps per-request buffers allocated once.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of concurrent worker tasks (default: `4`).
    ///
    /// When the server starts, exactly `worker_count` [workers](#worker) are
    /// created and used for the whole process lifetime.
    pub worker_count: usize,

    /// Capacity of the accepted-connection handoff queue (default: `16`).
    ///
    /// All accepted connections go through this queue. When it is full the
    /// acceptor stops accepting until a worker frees a slot; connections are
    /// never rejected, only delayed.
    pub queue_capacity: usize,

    /// Strategy for queue waiting behavior (default: `Sleep(50µs)`)
    ///
    /// Controls how the acceptor waits when the queue is full and how workers
    /// wait when it is empty. Affects latency, CPU usage, and throughput
    /// characteristics.
    pub wait_strategy: WaitStrategy,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 16,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),

            _priv: (),
        }
    }
}

/// Strategy for waiting on the handoff queue when no progress is possible
///
/// Different strategies optimize for different workload patterns.
/// Choose based on your latency requirements and resource constraints.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// While waiting, uses [`tokio::task::yield_now()`]
    ///
    /// # Note
    /// Busy-yielding keeps a runtime thread near 100% load while idle, so
    /// this option only pays off under sustained saturation.
    Yield,

    /// While waiting, uses [`tokio::time::sleep()`]
    Sleep(Duration),
}

/// Bounds of the in-memory response cache.
///
/// Both bounds are enforced strictly: an insert larger than
/// `max_object_size` is silently skipped, and an insert that would push the
/// total past `max_cache_size` first evicts the oldest entries until it fits.
#[derive(Debug, Clone)]
pub struct CacheLimits {
    /// Maximum total size in bytes of all cached bodies (default: `1_049_000`).
    pub max_cache_size: usize,

    /// Maximum size in bytes of a single cached body (default: `102_400`).
    ///
    /// Larger responses are still streamed to the client in full; they are
    /// simply never cached.
    pub max_object_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for CacheLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            max_cache_size: 1_049_000,
            max_object_size: 102_400,

            _priv: (),
        }
    }
}

/// Optional per-socket deadlines.
///
/// The proxy's baseline behavior has no timeouts at all: a slow origin can
/// hold a worker for as long as it likes. These fields opt into per-operation
/// deadlines without changing the default.
#[derive(Debug, Clone, Default)]
pub struct ConnLimits {
    /// Maximum duration of a single socket read (default: `None`).
    ///
    /// Applies to client and origin reads alike. When the deadline passes the
    /// request is aborted and the connection closed; no error response is
    /// sent mid-stream.
    pub socket_read_timeout: Option<Duration>,

    /// Maximum duration of a single socket write (default: `None`).
    pub socket_write_timeout: Option<Duration>,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

/// HTTP line parsing limits.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum length in bytes of one protocol line (default: `8192`).
    ///
    /// Request lines and header lines longer than this are rejected with a
    /// clean error response instead of being truncated. Origin response data
    /// is exempt: it is relayed in chunks of at most this size.
    pub line_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            line_size: 8192,

            _priv: (),
        }
    }
}
