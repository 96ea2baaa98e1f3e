use std::error::Error as StdError;
use std::fmt;
use std::io;

use thiserror::Error;

/// Transport-level failure classes, mirroring what the answer service client
/// can observe below HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    NotConnected,
    ConnectionLost,
    TimedOut,
    DnsFailure,
    CannotConnect,
    TlsFailure,
    InsecureTransport,
    Other,
}

impl NetworkErrorKind {
    /// Only these conditions are worth retrying before any content arrived.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            NetworkErrorKind::NotConnected
                | NetworkErrorKind::ConnectionLost
                | NetworkErrorKind::TimedOut
        )
    }

    /// Short localized hint shown to the user in front of the raw description.
    pub fn hint(self) -> &'static str {
        match self {
            NetworkErrorKind::NotConnected => "网络不可用(-1009)",
            NetworkErrorKind::ConnectionLost => "网络连接丢失(-1005)",
            NetworkErrorKind::TimedOut => "请求超时(-1001)",
            NetworkErrorKind::DnsFailure | NetworkErrorKind::CannotConnect => {
                "无法连接服务器(-1003/-1004)"
            }
            NetworkErrorKind::TlsFailure => "HTTPS证书异常",
            NetworkErrorKind::InsecureTransport => "ATS拦截(-1022)",
            NetworkErrorKind::Other => "连接中断",
        }
    }

    /// Classify a reqwest error by its flags and its source chain.
    pub fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return NetworkErrorKind::TimedOut;
        }

        let mut source: Option<&(dyn StdError + 'static)> = err.source();
        while let Some(cause) = source {
            if let Some(kind) = cause.downcast_ref::<io::Error>().and_then(Self::from_io) {
                return kind;
            }
            source = cause.source();
        }

        let chain = error_chain(err).to_lowercase();
        if chain.contains("dns error") || chain.contains("failed to lookup address") {
            NetworkErrorKind::DnsFailure
        } else if chain.contains("certificate")
            || chain.contains("tls")
            || chain.contains("ssl")
            || chain.contains("handshake")
        {
            NetworkErrorKind::TlsFailure
        } else if err.is_connect() {
            NetworkErrorKind::CannotConnect
        } else if err.is_body() || err.is_decode() {
            // body reads only fail once the response head was received
            NetworkErrorKind::ConnectionLost
        } else {
            NetworkErrorKind::Other
        }
    }
}

impl NetworkErrorKind {
    /// Classify an I/O cause. An unreachable network or a missing local
    /// address means the device is offline, which is worth retrying.
    pub fn from_io(err: &io::Error) -> Option<Self> {
        if is_offline(err) {
            return Some(NetworkErrorKind::NotConnected);
        }
        match err.kind() {
            io::ErrorKind::TimedOut => Some(NetworkErrorKind::TimedOut),
            io::ErrorKind::NotConnected | io::ErrorKind::AddrNotAvailable => {
                Some(NetworkErrorKind::NotConnected)
            }
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Some(NetworkErrorKind::ConnectionLost),
            _ => None,
        }
    }
}

// ENETUNREACH, EHOSTUNREACH, EADDRNOTAVAIL
#[cfg(target_os = "linux")]
const OFFLINE_OS_ERRORS: [i32; 3] = [101, 113, 99];
#[cfg(any(target_os = "macos", target_os = "ios"))]
const OFFLINE_OS_ERRORS: [i32; 3] = [51, 65, 49];
#[cfg(windows)]
const OFFLINE_OS_ERRORS: [i32; 3] = [10051, 10065, 10049];
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios", windows)))]
const OFFLINE_OS_ERRORS: [i32; 0] = [];

fn is_offline(err: &io::Error) -> bool {
    err.raw_os_error()
        .is_some_and(|code| OFFLINE_OS_ERRORS.contains(&code))
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkErrorKind::NotConnected => "not connected",
            NetworkErrorKind::ConnectionLost => "connection lost",
            NetworkErrorKind::TimedOut => "timed out",
            NetworkErrorKind::DnsFailure => "dns failure",
            NetworkErrorKind::CannotConnect => "cannot connect",
            NetworkErrorKind::TlsFailure => "tls failure",
            NetworkErrorKind::InsecureTransport => "insecure transport",
            NetworkErrorKind::Other => "transport error",
        };
        f.write_str(name)
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transient network failure ({kind}): {message}")]
    TransientNetwork {
        kind: NetworkErrorKind,
        message: String,
    },

    #[error("Network failure ({kind}): {message}")]
    TerminalNetwork {
        kind: NetworkErrorKind,
        message: String,
    },

    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl StreamError {
    /// Build a network error, picking the transient or terminal variant from the kind.
    pub fn network<S: Into<String>>(kind: NetworkErrorKind, message: S) -> Self {
        let message = message.into();
        if kind.is_transient() {
            StreamError::TransientNetwork { kind, message }
        } else {
            StreamError::TerminalNetwork { kind, message }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StreamError::TransientNetwork { .. })
    }

    pub fn network_kind(&self) -> Option<NetworkErrorKind> {
        match self {
            StreamError::TransientNetwork { kind, .. }
            | StreamError::TerminalNetwork { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The line appended to an assistant message when nothing was delivered.
    ///
    /// `read_payloads` logs and skips malformed lines, so the stream runner
    /// never reports `MalformedPayload`. Its text is for callers that run
    /// `decode_line` themselves and want to surface the failure.
    pub fn user_message(&self) -> String {
        match self {
            StreamError::HttpStatus(code) => format!("请求失败（HTTP {}）。", code),
            StreamError::TransientNetwork { kind, message }
            | StreamError::TerminalNetwork { kind, message } => {
                format!("\n[{}：{}]", kind.hint(), message)
            }
            StreamError::InvalidRequest(message) => format!("\n[请求地址无效：{}]", message),
            StreamError::MalformedPayload(_) => "请求失败：无效响应。".to_string(),
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        let kind = NetworkErrorKind::classify(&err);
        StreamError::network(kind, error_chain(&err))
    }
}

pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {env_var} must be set")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a configuration field name to the environment variable that sets it.
pub fn to_env_var(field: &str) -> String {
    format!("XIAOYOU_{}", field.to_uppercase().replace('.', "__"))
}
