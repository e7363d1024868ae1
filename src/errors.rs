use std::{error, fmt, io};

#[derive(Debug, PartialEq)]
pub(crate) enum ErrorKind {
    MethodNotImplemented(String),
    OriginUnreachable(String),
    MalformedRequest,
    LineTooLong(usize),
    Io(IoError),
}

macro_rules! http_statuses {
    ($($name:ident: $status:literal => $brief:literal; )*) => {
        #[inline]
        pub(crate) const fn status(&self) -> &'static str {
            match self { $(
                Self::$name { .. } => $status,
            )* }
        }

        #[inline]
        const fn brief(&self) -> &'static str {
            match self { $(
                Self::$name { .. } => $brief,
            )* }
        }
    };
}

impl ErrorKind {
    http_statuses! {
        MethodNotImplemented: "501 Not Implemented"
            => "method is not supported";
        OriginUnreachable: "503 Service Unavailable"
            => "failed to reach the origin server";
        MalformedRequest: "400 Bad Request"
            => "could not parse the request";
        LineTooLong: "500 Internal Server Error"
            => "protocol line exceeds the limit";
        Io: "503 Service Unavailable"
            => "connection error";
    }

    fn cause(&self) -> String {
        match self {
            Self::MethodNotImplemented(method) => method.clone(),
            Self::OriginUnreachable(host) => host.clone(),
            Self::MalformedRequest => "request line".to_string(),
            Self::LineTooLong(limit) => format!("{limit} bytes"),
            Self::Io(err) => err.0.to_string(),
        }
    }

    /// Renders the full HTTP/1.0 error response, HTML body included.
    pub(crate) fn as_http(&self) -> Vec<u8> {
        let status = self.status();
        let body = format!(
            "<html><head><title>Proxy Error</title></head>\r\n\
             <body bgcolor=\"ffffff\">\r\n\
             {status}\r\n\
             <p>{}: {}</p>\r\n\
             <hr><em>The keeper_proxy server</em>\r\n\
             </body></html>\r\n",
            self.brief(),
            self.cause(),
        );

        format!(
            "HTTP/1.0 {status}\r\n\
             Content-type: text/html\r\n\
             Content-length: {}\r\n\r\n\
             {body}",
            body.len(),
        )
        .into_bytes()
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}
