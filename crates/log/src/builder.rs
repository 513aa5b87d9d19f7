//! Subscriber assembly

use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::{Config, DisplayConfig, Format};
use crate::error::{LogError, LogResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
    test_writer: bool,
}

/// Keeps the root span entered for as long as it lives
#[derive(Debug)]
pub struct LoggerGuard {
    _root_span: Option<tracing::span::EnteredSpan>,
}

/// Apply display options shared by every format, then box.
macro_rules! decorate {
    ($layer:expr, $display:expr, $test_writer:expr) => {{
        let layer = $layer
            .with_ansi($display.colors)
            .with_target($display.target)
            .with_file($display.source)
            .with_line_number($display.source);
        match ($display.time, $test_writer) {
            (true, false) => layer.boxed(),
            (true, true) => layer.with_test_writer().boxed(),
            (false, false) => layer.without_time().boxed(),
            (false, true) => layer.without_time().with_test_writer().boxed(),
        }
    }};
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            test_writer: false,
        }
    }

    /// Route output through the libtest capture
    #[must_use]
    pub fn with_test_writer(mut self) -> Self {
        self.test_writer = true;
        self
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// - [`LogError::Filter`] if `level` is not a valid `EnvFilter` directive
    /// - [`LogError::Init`] if a global subscriber is already set
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = EnvFilter::try_new(&self.config.level)
            .map_err(|e| LogError::Filter(format!("{}: {e}", self.config.level)))?;

        let fmt_layer = fmt_layer(self.config.format, &self.config.display, self.test_writer);

        Registry::default()
            .with(fmt_layer)
            .with(filter)
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))?;

        let root_span = self
            .config
            .service
            .as_deref()
            .map(|service| tracing::info_span!("app", service).entered());

        Ok(LoggerGuard {
            _root_span: root_span,
        })
    }
}

fn fmt_layer(format: Format, display: &DisplayConfig, test_writer: bool) -> BoxedLayer {
    match format {
        Format::Pretty => decorate!(fmt::layer().pretty(), display, test_writer),
        Format::Compact => decorate!(fmt::layer().compact(), display, test_writer),
        Format::Json => decorate!(
            fmt::layer().json().flatten_event(true),
            display,
            test_writer
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_filter_before_installing() {
        let err = LoggerBuilder::from_config(Config::default().with_level("credguard=loud"))
            .build()
            .unwrap_err();
        assert!(matches!(err, LogError::Filter(_)));
    }

    #[test]
    fn every_format_builds_a_layer() {
        for format in [Format::Pretty, Format::Compact, Format::Json] {
            let _ = fmt_layer(format, &DisplayConfig::default(), true);
        }
    }
}
