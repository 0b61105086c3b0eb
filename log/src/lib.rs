use std::sync::Mutex;

use slog::Drain;
use slog::Fuse;
use slog_async::Async;
use slog_json::Json;

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

/// Builds the root logger: JSON lines on stderr, written from a
/// background thread, tagged with the build information.
pub fn initialize_logger() -> Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);
    let drain = Async::new(drain).build().fuse();

    Logger::root(
        drain,
        o!("version" => info::VERSION, "revision" => info::REVISION, "build_timestamp" => info::BUILD_TIMESTAMP),
    )
}

/// Builds the root logger from `RUST_LOG` via `slog-envlogger`. The
/// returned guard must be kept alive for as long as logging is needed.
#[cfg(feature = "env_logging")]
pub fn initialize_env_logger(
) -> Result<(Logger, slog_scope::GlobalLoggerGuard), Box<dyn std::error::Error>> {
    let guard = slog_envlogger::init()?;

    let logger = slog_scope::logger().new(
        o!("version" => info::VERSION, "revision" => info::REVISION, "build_timestamp" => info::BUILD_TIMESTAMP),
    );

    Ok((logger, guard))
}

/// A logger that throws everything away, for tests and tools.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
