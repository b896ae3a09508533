//! Logging setup
//!
//! Console output goes to stdout as JSON or plain text. A log file and a
//! remote syslog server can be added; both receive JSON records. `RUST_LOG`
//! overrides the default `info` filter.

use std::io;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{Level, Metadata};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{Error, Result};

/// syslog facility `user`
const FACILITY_USER: u8 = 1;

/// Console log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    #[default]
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Append JSON records to this file
    pub file: Option<PathBuf>,
    /// `host:port` of a syslog server reached over UDP
    pub syslog_server: Option<String>,
}

/// Keeps the file and syslog writer threads alive; drop it last
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
    _syslog: Option<WorkerGuard>,
}

/// Install the global tracing subscriber
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let console_layer = match config.format {
        LogFormat::Json => fmt::layer().with_target(true).json().boxed(),
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
    };

    let (file_layer, file_guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .json()
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let (syslog_layer, syslog_guard) = match &config.syslog_server {
        Some(server) => {
            let (writer, guard) = SyslogMakeWriter::connect(server, env!("CARGO_PKG_NAME"))?;
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .json()
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .with(syslog_layer)
        .try_init()
        .map_err(|e| Error::ConfigError(format!("failed to install logger: {}", e)))?;

    Ok(LoggingGuard {
        _file: file_guard,
        _syslog: syslog_guard,
    })
}

fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::ConfigError(format!("invalid log file {}", path.display())))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// syslog severity for a tracing level
fn severity(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        Level::DEBUG | Level::TRACE => 7,
    }
}

/// Writes every buffer it receives as one UDP datagram
struct UdpSink {
    socket: UdpSocket,
}

impl io::Write for UdpSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Formats each record as one RFC 3164 datagram
///
/// Sending happens on a `tracing-appender` worker thread, so an unreachable
/// server never blocks the caller.
#[derive(Clone)]
pub struct SyslogMakeWriter {
    sink: NonBlocking,
    hostname: String,
    tag: String,
}

impl SyslogMakeWriter {
    pub fn connect(server: &str, tag: &str) -> Result<(Self, WorkerGuard)> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(server)?;
        let hostname = hostname::get()?.to_string_lossy().into_owned();
        let (sink, guard) = tracing_appender::non_blocking(UdpSink { socket });
        Ok((
            Self {
                sink,
                hostname,
                tag: tag.to_string(),
            },
            guard,
        ))
    }
}

pub struct SyslogWriter<'a> {
    target: &'a SyslogMakeWriter,
    sink: NonBlocking,
    severity: u8,
}

impl<'a> MakeWriter<'a> for SyslogMakeWriter {
    type Writer = SyslogWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogWriter {
            target: self,
            sink: self.sink.clone(),
            severity: severity(&Level::INFO),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogWriter {
            target: self,
            sink: self.sink.clone(),
            severity: severity(meta.level()),
        }
    }
}

impl io::Write for SyslogWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let record = String::from_utf8_lossy(buf);
        let datagram = format!(
            "<{}>{} {} {}[{}]: {}",
            FACILITY_USER * 8 + self.severity,
            Local::now().format("%b %e %H:%M:%S"),
            self.target.hostname,
            self.target.tag,
            std::process::id(),
            record.trim_end()
        );
        io::Write::write_all(&mut self.sink, datagram.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
