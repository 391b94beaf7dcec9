//! Filing policies: naming conventions from a request to a scenario file.
//!
//! A policy is pure. The same request always maps to the same identifier,
//! and the identifier is always relative (never escapes the storage root).

use crate::http::HttpRequest;
use serde::{Deserialize, Serialize};

/// Maps a request to the identifier of its scenario file.
pub trait FilingPolicy: Send + Sync {
    fn file_name(&self, request: &HttpRequest) -> String;
}

impl<F> FilingPolicy for F
where
    F: Fn(&HttpRequest) -> String + Send + Sync,
{
    fn file_name(&self, request: &HttpRequest) -> String {
        self(request)
    }
}

/// Named policies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingKind {
    /// `/users/42` -> `users/42.<ext>`
    MirrorPath,
    /// `GET /users/42` -> `get/users/42.<ext>`
    MethodPath,
}

impl FilingKind {
    pub fn policy(self, extension: &str) -> Box<dyn FilingPolicy> {
        match self {
            FilingKind::MirrorPath => Box::new(MirrorPathPolicy::new(extension)),
            FilingKind::MethodPath => Box::new(MethodPathPolicy::new(extension)),
        }
    }
}

/// Mirrors the request path. Used when no policy is registered.
#[derive(Debug, Clone)]
pub struct MirrorPathPolicy {
    extension: String,
}

impl MirrorPathPolicy {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl FilingPolicy for MirrorPathPolicy {
    fn file_name(&self, request: &HttpRequest) -> String {
        format!("{}.{}", path_stem(request.path()), self.extension)
    }
}

/// Files scenarios under a lowercase method directory.
#[derive(Debug, Clone)]
pub struct MethodPathPolicy {
    extension: String,
}

impl MethodPathPolicy {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl FilingPolicy for MethodPathPolicy {
    fn file_name(&self, request: &HttpRequest) -> String {
        format!(
            "{}/{}.{}",
            request.method.to_lowercase(),
            path_stem(request.path()),
            self.extension
        )
    }
}

/// Relative file stem for a URL path: dot segments dropped, directories
/// (trailing slash or root) mapped to `index`.
fn path_stem(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();

    if segments.is_empty() {
        return "index".to_string();
    }

    let stem = segments.join("/");
    if path.ends_with('/') {
        format!("{}/index", stem)
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_path() {
        let policy = MirrorPathPolicy::new("json");
        assert_eq!(
            policy.file_name(&HttpRequest::get("https://api.example.com/users/42?x=1")),
            "users/42.json"
        );
        assert_eq!(policy.file_name(&HttpRequest::get("https://api.example.com")), "index.json");
        assert_eq!(policy.file_name(&HttpRequest::get("/users/")), "users/index.json");
    }

    #[test]
    fn test_method_path() {
        let policy = MethodPathPolicy::new("yaml");
        assert_eq!(
            policy.file_name(&HttpRequest::post("/orders")),
            "post/orders.yaml"
        );
    }

    #[test]
    fn test_dot_segments_never_escape_root() {
        let policy = MirrorPathPolicy::new("json");
        assert_eq!(
            policy.file_name(&HttpRequest::get("/../../etc/./passwd")),
            "etc/passwd.json"
        );
    }

    #[test]
    fn test_closure_policy() {
        let policy = |request: &HttpRequest| format!("{}.json", request.method);
        assert_eq!(policy.file_name(&HttpRequest::get("/anything")), "GET.json");
    }

    #[test]
    fn test_kind_from_config() {
        let kind: FilingKind = serde_yaml::from_str("method_path").unwrap();
        let policy = kind.policy("json");
        assert_eq!(policy.file_name(&HttpRequest::get("/a")), "get/a.json");
    }
}
