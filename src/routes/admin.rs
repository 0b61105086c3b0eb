use std::convert::Infallible;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use log::info;
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, Reply};
use warp::Filter;

use super::response::SuccessResponse;
use crate::environment::Environment;

/// Reports the running build.
pub fn make_healthz_route(
    _environment: Environment,
) -> impl Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    warp::path("healthz")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            json(&SuccessResponse::Healthz {
                revision: info::REVISION,
                timestamp: info::BUILD_TIMESTAMP,
                version: info::VERSION,
            })
        })
}

type TerminationFuture = BoxFuture<'static, ()>;

pub type Terminator = Arc<dyn Fn() -> TerminationFuture + Send + Sync>;

/// Asks the servers to shut down gracefully.
pub fn make_termination_route(
    environment: Environment,
    terminate: Terminator,
) -> impl Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    let handler = move || -> BoxFuture<'static, Result<StatusCode, Infallible>> {
        let terminate = terminate.clone();
        let logger = environment.logger.clone();

        async move {
            info!(logger, "Termination requested");
            terminate().await;

            Ok(StatusCode::NO_CONTENT)
        }
        .boxed()
    };

    warp::path("terminate")
        .and(warp::path::end())
        .and(warp::post())
        .and_then(handler)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::future::FutureExt;
    use time::Duration;

    use super::*;
    use crate::db::memory::MemoryDb;
    use crate::environment::Config;
    use crate::mail::LogMailer;
    use crate::urls::Urls;

    fn environment() -> Environment {
        let logger = Arc::new(log::discard());

        Environment::new(
            logger.clone(),
            Arc::new(MemoryDb::new()),
            Arc::new(LogMailer::new(logger)),
            Arc::new(Urls::new("https://bank.example/").unwrap()),
            Config::new(Duration::hours(1), 4),
        )
    }

    #[tokio::test]
    async fn healthz_reports_the_version() {
        let response = warp::test::request()
            .method("GET")
            .path("/healthz")
            .reply(&make_healthz_route(environment()))
            .await;

        assert_eq!(response.status(), 200);

        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["version"], info::VERSION);
    }

    #[tokio::test]
    async fn terminate_runs_the_callback() {
        let calls = Arc::new(AtomicUsize::new(0));

        let terminate: Terminator = {
            let calls = calls.clone();

            Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {}.boxed()
            })
        };

        let route = make_termination_route(environment(), terminate);

        let response = warp::test::request()
            .method("POST")
            .path("/terminate")
            .reply(&route)
            .await;

        assert_eq!(response.status(), 204);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
