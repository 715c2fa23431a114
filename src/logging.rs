use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::utils::logs_dir;

/// Stderr plus a daily rolling file under `<data_dir>/logs`. Keep the guard
/// alive for as long as logs should be flushed. A second call leaves the
/// first subscriber in place.
pub fn init_tracing(data_dir: &Path) -> Result<WorkerGuard> {
    let dir = logs_dir(data_dir);
    std::fs::create_dir_all(&dir).context("create logs dir")?;

    let appender = tracing_appender::rolling::daily(&dir, "image-fusion.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_logs_dir() {
        let dir = tempfile::tempdir().unwrap();
        let guard = init_tracing(dir.path()).unwrap();
        tracing::info!("logging ready");
        drop(guard);
        assert!(logs_dir(dir.path()).is_dir());
    }
}
