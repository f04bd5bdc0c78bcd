//! Transport-level forward failures.

use thiserror::Error;

/// Why an outbound call produced no usable response.
///
/// A downstream 4xx/5xx is *not* a `ForwardError`; it is a successful
/// forward carrying an error status.
#[derive(Debug, Clone, Error)]
pub enum ForwardError {
    #[error("backend did not respond within {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("connection to backend failed: {cause}")]
    Connect { cause: String },

    #[error("invalid backend target: {cause}")]
    InvalidTarget { cause: String },

    #[error("transport error: {cause}")]
    Transport { cause: String },

    #[error("failed to read backend response: {cause}")]
    ResponseBody { cause: String, backend_status: u16 },
}

impl ForwardError {
    /// Human-readable cause, suitable for an error response `details` field.
    pub fn cause(&self) -> String {
        self.to_string()
    }

    /// Status the backend answered with, when it answered at all.
    pub fn backend_status(&self) -> Option<u16> {
        match self {
            ForwardError::ResponseBody { backend_status, .. } => Some(*backend_status),
            _ => None,
        }
    }

    /// Short machine-readable classification.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Timeout { .. } => "timeout",
            ForwardError::Connect { .. } => "connect",
            ForwardError::InvalidTarget { .. } => "invalid_target",
            ForwardError::Transport { .. } => "transport",
            ForwardError::ResponseBody { .. } => "response_body",
        }
    }
}

/// Render an error and its source chain on one line.
///
/// Sources whose text is already part of the rendering are skipped, since
/// hyper errors include their cause in `Display`.
pub(crate) fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_status_only_when_backend_answered() {
        let timeout = ForwardError::Timeout { after_ms: 10_000 };
        assert_eq!(timeout.backend_status(), None);
        assert_eq!(timeout.kind(), "timeout");
        assert_eq!(timeout.cause(), "backend did not respond within 10000 ms");

        let body = ForwardError::ResponseBody {
            cause: "connection reset".into(),
            backend_status: 502,
        };
        assert_eq!(body.backend_status(), Some(502));
    }

    #[test]
    fn test_describe_walks_source_chain() {
        #[derive(Debug, Error)]
        #[error("client error")]
        struct Wrapper(#[source] std::io::Error);

        let wrapped = Wrapper(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(describe(&wrapped), "client error: refused");
    }

    #[test]
    fn test_describe_skips_repeated_causes() {
        #[derive(Debug, Error)]
        #[error("error reading a body from connection: {0}")]
        struct Inner(#[source] std::io::Error);

        #[derive(Debug, Error)]
        #[error("{0}")]
        struct Outer(#[source] Inner);

        let err = Outer(Inner(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "unexpected end of file",
        )));
        let rendered = describe(&err);
        assert_eq!(
            rendered,
            "error reading a body from connection: unexpected end of file"
        );
        assert_eq!(rendered.matches("error reading a body").count(), 1);
    }
}
