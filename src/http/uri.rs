//! Request-target decomposition for outbound connections.

use memchr::memchr;

/// A request target split into the parts needed to reach the origin.
///
/// Parsing is total: every input produces a result. Pathological targets
/// (empty hostname, non-numeric port) surface later as a failed origin
/// connection, never as a parse error.
///
/// # Examples
///
/// ```
/// use keeper_proxy::RequestTarget;
///
/// let target = RequestTarget::parse("http://example.com:8080/index.html");
/// assert_eq!(target.host, "example.com");
/// assert_eq!(target.port, 8080);
/// assert_eq!(target.path, "/index.html");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    /// Hostname or IP literal, exactly as it appeared in the target.
    pub host: String,
    /// Destination TCP port, `80` unless the target named one.
    pub port: u16,
    /// Origin-relative path, `/` unless the target named one.
    pub path: String,
}

impl RequestTarget {
    /// Splits an absolute (`http://host:port/path`) or schemeless
    /// (`host:port/path`, `host/path`, bare `host`) target.
    pub fn parse(target: &str) -> Self {
        let rest = match target.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("http://") => &target[7..],
            _ => target,
        };
        let bytes = rest.as_bytes();

        match memchr(b':', bytes) {
            Some(colon) => {
                let digits = bytes[colon + 1..]
                    .iter()
                    .take_while(|b| b.is_ascii_digit())
                    .count();
                let port = rest[colon + 1..colon + 1 + digits].parse().unwrap_or(0);

                Self {
                    host: rest[..colon].to_string(),
                    port,
                    path: Self::path_from(&rest[colon + 1 + digits..]),
                }
            }
            None => match memchr(b'/', bytes) {
                Some(slash) => Self {
                    host: rest[..slash].to_string(),
                    port: 80,
                    path: rest[slash..].to_string(),
                },
                None => Self {
                    host: rest.to_string(),
                    port: 80,
                    path: "/".to_string(),
                },
            },
        }
    }

    /// Resolves a relative target (`/path`) against a `Host` header value.
    ///
    /// The header carries `host[:port]`; the path comes from the request line.
    pub fn from_host_header(host_header: &str, path: &str) -> Self {
        let mut target = Self::parse(host_header);
        target.path = path.to_string();
        target
    }

    #[inline]
    fn path_from(rest: &str) -> String {
        match memchr(b'/', rest.as_bytes()) {
            Some(slash) => rest[slash..].to_string(),
            None => "/".to_string(),
        }
    }
}
