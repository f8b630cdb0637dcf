//! SSRF gates
//!
//! Every inbound HTTP path, WebSocket upgrade path and outbound backend URL
//! passes through one of these validators before any bytes reach the backend.
//! Paths are normalized with the WHATWG URL algorithm (the `url` crate) against
//! a synthetic origin, so dot segments, `%2e%2e` segments and backslashes are
//! resolved exactly once before the allowlist is consulted.

use once_cell::sync::Lazy;
use url::Url;

pub const DEFAULT_HTTP_ROOT: &str = "/api";
pub const DEFAULT_WEBSOCKET_PATH: &str = "/ws";

pub const DEFAULT_ALLOWED_PATHS: &[&str] = &[
    "/chat",
    "/chat/stream",
    "/generate",
    "/generate/stream",
    "/call",
    "/mcp/client/tool/list",
];

const NORMALIZATION_BASE: &str = "http://localhost";

const MAX_DECODE_PASSES: usize = 4;

static NORMALIZATION_ORIGIN: Lazy<Option<Url>> = Lazy::new(|| Url::parse(NORMALIZATION_BASE).ok());

static DEFAULT_ALLOWLIST: Lazy<PathAllowlist> = Lazy::new(PathAllowlist::default);

static DEFAULT_WEBSOCKET_VALIDATOR: Lazy<WebSocketPathValidator> =
    Lazy::new(|| WebSocketPathValidator::new(DEFAULT_WEBSOCKET_PATH));

/// Outcome of a gate check. Rejections carry a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self { is_valid: true, error: None }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(reason.into()),
        }
    }
}

impl From<Result<ProxyHttpPath, String>> for ValidationResult {
    fn from(result: Result<ProxyHttpPath, String>) -> Self {
        match result {
            Ok(_) => Self::valid(),
            Err(reason) => Self::invalid(reason),
        }
    }
}

/// A path that passed [`PathAllowlist::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHttpPath {
    /// Normalized pathname, still carrying the HTTP root
    pub path: String,
    /// `path` with the HTTP root stripped
    pub backend_path: String,
    pub query: Option<String>,
}

impl ProxyHttpPath {
    /// Absolute backend URL for this path, query string included
    pub fn backend_target(&self, backend_url: &str) -> String {
        let base = backend_url.trim_end_matches('/');
        match &self.query {
            Some(q) => format!("{}{}?{}", base, self.backend_path, q),
            None => format!("{}{}", base, self.backend_path),
        }
    }
}

/// Static table of backend path prefixes the relay may forward to.
///
/// Immutable once built; shared process-wide behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PathAllowlist {
    root: String,
    entries: Vec<String>,
}

impl Default for PathAllowlist {
    fn default() -> Self {
        Self::new(
            DEFAULT_HTTP_ROOT,
            DEFAULT_ALLOWED_PATHS.iter().map(|p| p.to_string()).collect(),
        )
    }
}

impl PathAllowlist {
    pub fn new(root: impl Into<String>, entries: Vec<String>) -> Self {
        Self {
            root: root.into(),
            entries,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Exact match, or an entry followed by `/`
    pub fn permits(&self, backend_path: &str) -> bool {
        self.entries.iter().any(|allowed| {
            backend_path == allowed
                || backend_path
                    .strip_prefix(allowed.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// PathValidator contract: never panics, never errors, only reports.
    pub fn validate(&self, pathname: &str) -> ValidationResult {
        self.resolve(pathname).into()
    }

    /// Normalize `pathname` and check it against the table.
    pub fn resolve(&self, pathname: &str) -> Result<ProxyHttpPath, String> {
        if pathname.is_empty() {
            return Err("Path must be a non-empty string".to_string());
        }

        let normalized = normalize(pathname).ok_or_else(|| "Invalid or malformed path".to_string())?;

        let prefix = format!("{}/", self.root);
        if !normalized.path().starts_with(&prefix) {
            return Err(format!("Path must start with {}", prefix));
        }

        let backend_path = &normalized.path()[self.root.len()..];

        // URL normalization already resolved dot segments; anything left is hostile
        if contains_traversal(backend_path) {
            return Err("Path traversal is not allowed".to_string());
        }

        if !self.permits(backend_path) {
            return Err(format!("Backend path '{}' is not in allowed list", backend_path));
        }

        Ok(ProxyHttpPath {
            path: normalized.path().to_string(),
            backend_path: backend_path.to_string(),
            query: normalized.query().map(str::to_string),
        })
    }
}

/// `..` in the path itself or in any of its percent-decodings
/// (`%2e%2e%2f` inside a segment, `%252e%252e`, ...)
fn contains_traversal(path: &str) -> bool {
    let mut current = path.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        if current.contains("..") {
            return true;
        }
        let decoded = String::from_utf8_lossy(&urlencoding::decode_binary(current.as_bytes())).into_owned();
        if decoded == current {
            return false;
        }
        current = decoded;
    }
    // Still changing after every pass: refuse rather than guess
    true
}

/// Resolve against the synthetic origin; refuse anything that escapes it
/// (scheme-relative `//host/...`, absolute URLs, userinfo).
fn normalize(pathname: &str) -> Option<Url> {
    let base = NORMALIZATION_ORIGIN.as_ref()?;
    let url = base.join(pathname).ok()?;

    if url.origin() != base.origin() || !url.username().is_empty() || url.password().is_some() {
        return None;
    }
    Some(url)
}

/// Exact-match gate for the single WebSocket upgrade path
#[derive(Debug, Clone)]
pub struct WebSocketPathValidator {
    path: String,
}

impl WebSocketPathValidator {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn validate(&self, pathname: &str) -> ValidationResult {
        if pathname != self.path {
            return ValidationResult::invalid(format!(
                "WebSocket path '{}' is not allowed. Expected: {}",
                pathname, self.path
            ));
        }
        ValidationResult::valid()
    }
}

/// Validate an HTTP path against the built-in allowlist under `/api`
pub fn validate_proxy_http_path(pathname: &str) -> ValidationResult {
    DEFAULT_ALLOWLIST.validate(pathname)
}

/// Validate a WebSocket upgrade path against the built-in `/ws`
pub fn validate_proxy_websocket_path(pathname: &str) -> ValidationResult {
    DEFAULT_WEBSOCKET_VALIDATOR.validate(pathname)
}

/// Scheme and structure check for URLs the relay itself dials.
/// Host trust is left to deployment configuration.
pub fn validate_backend_url(url: &str) -> ValidationResult {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return ValidationResult::invalid("Invalid URL format"),
    };

    match parsed.scheme() {
        "http" | "https" => ValidationResult::valid(),
        other => ValidationResult::invalid(format!(
            "Protocol '{}:' is not allowed. Use http or https.",
            other
        )),
    }
}
