use crate::domain::settings::{LogFileSettings, LogRotation, LogSettings};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Flushes the file writer when dropped; hold it for the life of the process
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

fn filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn console_layer(settings: &LogSettings) -> BoxedLayer {
    fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(settings.ansi)
        .with_file(settings.source_location)
        .with_line_number(settings.source_location)
        .with_thread_ids(settings.thread_ids)
        .with_target(settings.target)
        .boxed()
}

fn file_layer(settings: &LogSettings, file: &LogFileSettings) -> (BoxedLayer, WorkerGuard) {
    let appender =
        RollingFileAppender::new(file.rotation.into(), &file.directory, &file.prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_file(settings.source_location)
        .with_line_number(settings.source_location)
        .with_thread_ids(settings.thread_ids)
        .with_target(settings.target)
        .boxed();
    (layer, guard)
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    if settings.console {
        layers.push(console_layer(settings));
    }

    let mut file_writer = None;
    if let Some(file) = &settings.file {
        let (layer, guard) = file_layer(settings, file);
        layers.push(layer);
        file_writer = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter(settings))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Logger already installed: {}", e))?;

    tracing::info!(
        "Logging at {:?} (file: {})",
        settings.level,
        settings
            .file
            .as_ref()
            .map_or_else(|| "off".to_string(), |f| f.directory.display().to_string())
    );

    Ok(LoggingGuard {
        _file_writer: file_writer,
    })
}
