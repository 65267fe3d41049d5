//! Diagnostics setup.
//!
//! Two sinks: operational logs go to stderr under `RUST_LOG` control, and
//! the read access log goes to its own file as one JSON object per line.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing::Subscriber;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Target of the per-read access events.
pub const ACCESS_TARGET: &str = "blokfs::access";

/// JSON layer that only lets access events through.
pub fn access_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(false)
        .with_writer(writer)
        .with_filter(filter_fn(|meta| meta.target() == ACCESS_TARGET))
}

fn console_filter(debug: bool) -> anyhow::Result<EnvFilter> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    Ok(filter.add_directive(format!("{}=off", ACCESS_TARGET).parse()?))
}

/// Opens the access log, emptying whatever a previous mount left in it.
fn open_access_log(log_file: &Path) -> anyhow::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(log_file)
        .with_context(|| format!("cannot open access log {}", log_file.display()))
}

/// Installs the global subscriber. The access log starts empty on every
/// mount.
pub fn init(log_file: &Path, debug: bool) -> anyhow::Result<()> {
    let file = open_access_log(log_file)?;

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter(debug)?);

    tracing_subscriber::registry()
        .with(console)
        .with(access_layer(Mutex::new(file)))
        .try_init()
        .context("tracing subscriber already installed")?;
    Ok(())
}
