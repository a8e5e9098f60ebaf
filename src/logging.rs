use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FILE_LOG_PREFIX: &str = "selah-backend.log";

/// Keeps the non-blocking file writer's worker alive for the life of the
/// process; dropping it flushes and stops file logging.
pub struct LogGuard {
    _file: WorkerGuard,
}

/// Stdout logging always; daily-rolling file logs in addition when
/// `LOG_DIR` is set.
pub fn init_tracing(filter: &str) -> Option<LogGuard> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().compact().with_target(true);

    let file_writer = std::env::var("LOG_DIR").ok().and_then(|dir| {
        if let Err(err) = std::fs::create_dir_all(&dir) {
            eprintln!("failed to create log directory {dir}: {err}");
            return None;
        }
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, FILE_LOG_PREFIX);
        Some(tracing_appender::non_blocking(appender))
    });

    match file_writer {
        Some((writer, guard)) => {
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Some(LogGuard { _file: guard })
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .init();
            None
        }
    }
}
