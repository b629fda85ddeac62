//! Logging infrastructure - structured tracing for the bridge
//!
//! Uses `tracing` for structured, contextual logging:
//! - Level taken from config, environment or `RUST_LOG`
//! - Console output (human-readable or JSON)
//! - Optional file output through a non-blocking appender
//! - Span-based timing of hot operations via [`perf::track`]

use std::io;
use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub use tracing::{debug, error, info, trace, warn, Level};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the file writer thread alive for the life of the process.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
    /// Enable performance tracking
    pub track_performance: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
            track_performance: cfg!(debug_assertions),
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // HOSTBIND_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("HOSTBIND_LOG_LEVEL") {
            config.level = parse_level(&level);
        }

        if let Ok(path) = std::env::var("HOSTBIND_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("HOSTBIND_LOG_JSON").is_ok();
        config.show_spans = std::env::var("HOSTBIND_LOG_SPANS").is_ok();

        if let Ok(val) = std::env::var("HOSTBIND_LOG_PERF") {
            config.track_performance = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Minimal logging for benchmarks
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
            track_performance: false,
        }
    }

    /// Verbose logging into `hostbind.log`
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("hostbind.log".to_string()),
            json_format: false,
            show_spans: true,
            track_performance: true,
        }
    }
}

/// Parse a level name, falling back to INFO.
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber; later calls are no-ops.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("hostbind={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer = match config.log_path.as_deref().filter(|_| config.file_output) {
            Some(path) => file_layer(path, config.json_format, span_events),
            None => console_layer(config.json_format, span_events),
        };

        // Another subscriber may already be installed by the embedder.
        let _ = tracing_subscriber::registry()
            .with(layer)
            .with(env_filter)
            .try_init();
    });
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(json: bool, span_events: FmtSpan) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(io::stdout)
        .with_span_events(span_events)
        .with_target(true)
        .with_line_number(cfg!(debug_assertions));

    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

fn file_layer(path: &str, json: bool, span_events: FmtSpan) -> BoxedLayer {
    let path = Path::new(path);
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "hostbind.log".into());

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        directory, file_name,
    ));
    let _ = FILE_GUARD.set(guard);

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_span_events(span_events)
        .with_target(true);

    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Bridge-specific logging functions
// ============================================================================

/// Log creation of a runtime context
pub fn log_context_created(cache_wrappers: bool) {
    info!(
        event = "context_created",
        cache_wrappers = cache_wrappers,
        "Runtime context installed"
    );
}

/// Log teardown of a runtime context
pub fn log_context_teardown(live_wrappers: usize) {
    info!(
        event = "context_teardown",
        live_wrappers = live_wrappers,
        "Runtime context torn down"
    );
}

/// Log a fresh wrapper allocation
#[inline]
pub fn log_wrap(type_name: &str, address: usize, cached: bool, count: u32) {
    trace!(
        event = "wrap",
        type_name = type_name,
        address = format_args!("{:#x}", address),
        cached = cached,
        count = count,
        "Native object wrapped"
    );
}

/// Log a wrapper cache hit
#[inline]
pub fn log_cache_hit(type_name: &str, address: usize) {
    trace!(
        event = "cache_hit",
        type_name = type_name,
        address = format_args!("{:#x}", address),
        "Reusing live wrapper"
    );
}

/// Log a wrapper finalization
#[inline]
pub fn log_finalize(type_name: &str, address: usize, remaining: u32, owned: bool) {
    trace!(
        event = "finalize",
        type_name = type_name,
        address = format_args!("{:#x}", address),
        remaining = remaining,
        owned = owned,
        "Wrapper finalized"
    );
}

/// Log constructor materialization
pub fn log_class_defined(name: &str, parent: Option<&str>) {
    debug!(
        event = "class_defined",
        class = name,
        parent = parent.unwrap_or("-"),
        "Constructor materialized"
    );
}

/// Log an argument conversion failure
pub fn log_conversion_failure(message: &str) {
    debug!(
        event = "conversion_failure",
        error = message,
        "Argument conversion failed"
    );
}

/// Log a method call rejected because its receiver is already borrowed
pub fn log_receiver_in_use(type_name: &str) {
    debug!(
        event = "receiver_in_use",
        type_name = type_name,
        "Re-entrant call on an object already in use"
    );
}

/// Log a native panic caught at the invocation boundary
pub fn log_native_panic(message: &str) {
    error!(
        event = "native_panic",
        error = message,
        "Native callable panicked"
    );
}

/// Log an exception routed to the host's fatal channel
pub fn log_uncaught_exception(message: &str) {
    warn!(
        event = "uncaught_exception",
        error = message,
        "Host callback threw while called from native code"
    );
}

/// Log a collection cycle of the reference host
pub fn log_gc_cycle(marked: usize, freed: usize, pending: usize) {
    debug!(
        event = "gc_cycle",
        objects_marked = marked,
        objects_freed = freed,
        pending_finalizers = pending,
        "Collection cycle complete"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            debug!(
                operation = self.operation,
                duration_us = self.start.elapsed().as_micros() as u64,
                "operation completed"
            );
        }
    }
}
