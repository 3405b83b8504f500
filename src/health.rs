//! Health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure means restart. |
//! | **Readiness** | `/readyz` | Can the database answer a query? Failure means no traffic. |
//!
//! Both bypass the session layer: probes must not mint cookies.

use sqlx::SqlitePool;
use tracing::warn;

use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Always `200 OK` with body `"ok"`. No dependencies.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// `200 OK` with body `"ready"` once the pool can run a trivial query,
/// `503` otherwise.
pub async fn readiness(pool: &SqlitePool) -> Response {
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => Response::text("ready"),
        Err(e) => {
            warn!(error = %e, "readiness check failed");
            Response::builder().status(Status::ServiceUnavailable).text("not ready")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::store;

    #[tokio::test]
    async fn liveness_is_unconditional() {
        let res = liveness(Request::new(Method::Get, "/healthz")).await;
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.body(), b"ok");
    }

    #[tokio::test]
    async fn readiness_follows_the_pool() {
        let pool = store::memory_pool().await.unwrap();
        assert_eq!(readiness(&pool).await.status_code(), 200);

        pool.close().await;
        assert_eq!(readiness(&pool).await.status_code(), 503);
    }
}
