//! Client-to-origin request rewriting.

use crate::http::uri::RequestTarget;

/// The fixed identity every upstream request carries.
pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:10.0.3) Gecko/20120305 Firefox/10.0.3";

/// Hop-by-hop headers stripped from the client request before forwarding.
/// Matched against the start of the raw header line, case-insensitively.
const DROPPED: [&str; 3] = ["user-agent", "connection", "proxy-connection"];

/// Assembles the origin-bound request from the parsed target and the raw
/// client header lines (each still carrying its newline).
///
/// The upstream request always speaks HTTP/1.0 and always closes:
///
/// ```text
/// GET <path> HTTP/1.0
/// Host: <reused verbatim, or synthesized from the target>
/// <remaining client headers, order preserved>
/// User-Agent: Mozilla/5.0 (X11; ...) Firefox/10.0.3
/// Connection: close
/// Proxy-Connection: close
/// ```
pub(crate) fn build_origin_request(target: &RequestTarget, client_headers: &[Vec<u8>]) -> Vec<u8> {
    let mut request = Vec::with_capacity(1024);

    request.extend_from_slice(b"GET ");
    request.extend_from_slice(target.path.as_bytes());
    request.extend_from_slice(b" HTTP/1.0\r\n");

    match client_headers.iter().find(|line| line_starts_with(line, "host:")) {
        Some(host_line) => request.extend_from_slice(host_line),
        None => {
            request.extend_from_slice(b"Host: ");
            request.extend_from_slice(target.host.as_bytes());
            request.extend_from_slice(b"\r\n");
        }
    }

    for line in client_headers {
        if line_starts_with(line, "host:")
            || DROPPED.iter().any(|name| line_starts_with(line, name))
        {
            continue;
        }
        request.extend_from_slice(line);
    }

    request.extend_from_slice(b"User-Agent: ");
    request.extend_from_slice(USER_AGENT.as_bytes());
    request.extend_from_slice(b"\r\nConnection: close\r\nProxy-Connection: close\r\n\r\n");

    request
}

#[inline]
fn line_starts_with(line: &[u8], prefix: &str) -> bool {
    line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
