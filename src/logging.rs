//! Diagnostic output.
//!
//! Every diagnostic in the crate goes through `tracing`. Embedders that already own a
//! subscriber need nothing from this module; others call [`install`] once to get
//! prefixed stderr output filtered by `AQUEDUCT_LOG`.

use std::io::{self, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex, Once, OnceLock};

use tracing::Subscriber;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::layer::{Context, Filter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{ENV_LOG, SessionConfig};

const LOG_PREFIX: &str = "[aqueduct] ";
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::TRACE;

// ============================================================================
// Global State
// ============================================================================

static TRACING_INSTALLED: Once = Once::new();
static LOG_LEVEL: OnceLock<Arc<Mutex<LevelFilter>>> = OnceLock::new();

fn log_level_handle() -> Arc<Mutex<LevelFilter>> {
    LOG_LEVEL
        .get_or_init(|| Arc::new(Mutex::new(DEFAULT_LOG_LEVEL)))
        .clone()
}

/// Caps the installed output at `level` (`error`, `warn`, `info`, `debug`, `trace`
/// or `off`). Unknown names lift the cap.
pub fn set_log_level(level: &str) {
    let parsed = LevelFilter::from_str(level).unwrap_or(DEFAULT_LOG_LEVEL);
    if let Ok(mut guard) = log_level_handle().lock() {
        *guard = parsed;
    }
}

/// Returns the current runtime cap.
#[must_use]
pub fn log_level() -> LevelFilter {
    log_level_handle()
        .lock()
        .map_or(DEFAULT_LOG_LEVEL, |guard| *guard)
}

// ============================================================================
// Installation
// ============================================================================

/// Installs a global subscriber writing to stderr (idempotent).
///
/// The filter comes from `AQUEDUCT_LOG`, falling back to `default_filter`.
pub fn install(default_filter: &str) {
    TRACING_INSTALLED.call_once(|| {
        let filter = select_filter(std::env::var(ENV_LOG).ok().as_deref(), default_filter);

        let console = fmt::layer()
            .with_writer(PrefixedWriter)
            .with_ansi(false)
            .with_filter(filter)
            .with_filter(RuntimeLevel {
                level: log_level_handle(),
            });

        if tracing_subscriber::registry().with(console).try_init().is_err() {
            eprintln!("{LOG_PREFIX}a global tracing subscriber is already installed");
        }
    });
}

/// [`install`] with the filter configured in `config`.
pub fn install_from(config: &SessionConfig) {
    install(&config.log_filter);
}

fn select_filter(from_env: Option<&str>, configured: &str) -> EnvFilter {
    from_env
        .map_or_else(|| EnvFilter::try_new(configured), EnvFilter::try_new)
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Runtime cap adjusted through [`set_log_level`].
struct RuntimeLevel {
    level: Arc<Mutex<LevelFilter>>,
}

impl<S: Subscriber> Filter<S> for RuntimeLevel {
    fn enabled(&self, metadata: &tracing::Metadata<'_>, _ctx: &Context<'_, S>) -> bool {
        let cap = self.level.lock().map_or(DEFAULT_LOG_LEVEL, |guard| *guard);
        cap >= *metadata.level()
    }
}

// ============================================================================
// Console Output
// ============================================================================

#[derive(Clone, Default)]
struct PrefixedWriter;

impl<'a> MakeWriter<'a> for PrefixedWriter {
    type Writer = PrefixedWriterInner<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        PrefixedWriterInner {
            inner: io::stderr(),
            wrote_prefix: false,
        }
    }
}

struct PrefixedWriterInner<W> {
    inner: W,
    wrote_prefix: bool,
}

impl<W: Write> Write for PrefixedWriterInner<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.wrote_prefix {
            self.inner.write_all(LOG_PREFIX.as_bytes())?;
            self.wrote_prefix = true;
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
