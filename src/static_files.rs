//! Read-only file serving for the `/static` passthrough.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::error;

use crate::handler::Handler;
use crate::request::Request;
use crate::response::{ContentType, Response};
use crate::status::Status;

/// Serves regular files below `root`. Directories, `..` segments and
/// missing files are all plain 404s.
#[derive(Clone, Debug)]
pub struct StaticFiles {
    root: Arc<PathBuf>,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: Arc::new(root.into()) }
    }

    /// Handler suitable for [`Router::passthrough`](crate::Router::passthrough).
    pub fn handler(&self) -> impl Handler + use<> {
        let files = self.clone();
        move |req: Request| {
            let files = files.clone();
            async move { files.serve(req.path()).await }
        }
    }

    pub async fn serve(&self, path: &str) -> Response {
        let Some(relative) = sanitize(path) else {
            return not_found();
        };
        let full = self.root.join(relative);

        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return not_found(),
            Err(e) if e.kind() == ErrorKind::NotFound => return not_found(),
            Err(e) => return io_failure(&full, e),
        }
        match tokio::fs::read(&full).await {
            Ok(bytes) => Response::builder().bytes(content_type_for(&full), bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => not_found(),
            Err(e) => io_failure(&full, e),
        }
    }
}

fn not_found() -> Response {
    Response::builder().status(Status::NotFound).text("Not Found")
}

fn io_failure(path: &Path, e: std::io::Error) -> Response {
    error!(path = %path.display(), error = %e, "failed to read static file");
    Response::status(Status::InternalServerError)
}

/// Relative path for a request path, or `None` if it tries to escape the root.
fn sanitize(path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains(['\\', '\0']) => return None,
            s => out.push(s),
        }
    }
    if out.as_os_str().is_empty() { None } else { Some(out) }
}

fn content_type_for(path: &Path) -> ContentType {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("css") => ContentType::Css,
        Some("html" | "htm") => ContentType::Html,
        Some("ico") => ContentType::Ico,
        Some("js") => ContentType::Javascript,
        Some("jpg" | "jpeg") => ContentType::Jpeg,
        Some("json") => ContentType::Json,
        Some("png") => ContentType::Png,
        Some("svg") => ContentType::Svg,
        Some("txt") => ContentType::Text,
        _ => ContentType::OctetStream,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_refuses_traversal() {
        assert_eq!(sanitize("/css/main.css"), Some(PathBuf::from("css/main.css")));
        assert_eq!(sanitize("/../etc/passwd"), None);
        assert_eq!(sanitize("/a/../../b"), None);
        assert_eq!(sanitize("/"), None);
    }

    #[tokio::test]
    async fn serves_files_with_content_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("css/main.css"), "body{}").unwrap();
        let files = StaticFiles::new(dir.path());

        let res = files.serve("/css/main.css").await;
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.header("content-type"), Some("text/css; charset=utf-8"));
        assert_eq!(res.body(), b"body{}");

        assert_eq!(files.serve("/css").await.status_code(), 404);
        assert_eq!(files.serve("/css/missing.css").await.status_code(), 404);
        assert_eq!(files.serve("/../secret").await.status_code(), 404);
    }
}
