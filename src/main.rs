use keeper_proxy::Server;
use socket2::{Domain, Protocol, Socket, Type};
use std::{io, net::SocketAddr, process::exit};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "proxy".to_string());
    let (Some(port), None) = (args.next(), args.next()) else {
        eprintln!("usage: {program} <port>");
        exit(1);
    };

    let listener = match bind(&port) {
        Ok(listener) => listener,
        Err(error) => {
            eprintln!("{program}: failed to bind port {port}: {error}");
            exit(1);
        }
    };
    info!(%port, "listening");

    Server::builder().listener(listener).build().launch().await
}

fn bind(port: &str) -> io::Result<TcpListener> {
    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;

    TcpListener::from_std(socket.into())
}
