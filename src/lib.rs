//! keeper_proxy - Concurrent caching HTTP/1.0 forward proxy
//!
//! A small forward proxy with an in-memory response cache. Clients issue a
//! GET, and the proxy either replays a cached response byte-for-byte or
//! contacts the origin, rewrites the request, streams the answer through,
//! and opportunistically caches it for the next client.
//!
//! # Features
//!
//! ## 🗃 Response cache
//! - **Strict bounds** - a total-size bound and a per-object bound, both
//!   enforced on every insert; oversize responses are streamed but never
//!   cached.
//! - **Insertion-order eviction** - the oldest *insert* is evicted first;
//!   lookups never reorder the recency list.
//! - **Reader/writer concurrency** - any number of lookups in flight at
//!   once; inserts and evictions are serialized behind a write lock.
//!
//! ## 🔀 Connection dispatch
//! - **Fixed worker pool** - workers are created once at startup and reused
//!   for every connection; no per-connection task spawning.
//! - **Bounded FIFO handoff** - the acceptor parks when all queue slots are
//!   taken; connections are delayed, never rejected.
//! - **Pre-allocated buffers** - each worker owns its line and capture
//!   buffers for the whole process lifetime.
//!
//! ## 🌐 Protocol
//! - **HTTP/1.0 upstream** - every origin request is rewritten to HTTP/1.0
//!   with `Connection: close`; absolute and Host-relative targets accepted.
//! - **GET only** - other methods answer `501 Not Implemented`; unreachable
//!   origins answer `503 Service Unavailable`.
//!
//! # Quick Start
//!
//! Run the binary with a listening port:
//!
//! ```bash
//! proxy 8080
//! ```
//!
//! Or embed the server:
//!
//! ```no_run
//! use keeper_proxy::Server;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```
//!
//! See [`limits`] for the tunable bounds and their defaults.
pub(crate) mod http {
    pub(crate) mod request;
    pub(crate) mod rewrite;
    pub(crate) mod uri;
}
pub(crate) mod server {
    pub(crate) mod queue;
    pub(crate) mod server_impl;
    pub(crate) mod worker;
}
pub(crate) mod cache;
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    cache::ResponseCache,
    http::uri::RequestTarget,
    server::server_impl::{Server, ServerBuilder},
};
