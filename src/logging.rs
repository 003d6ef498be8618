//! Leveled console and file logging.
//!
//! Records are rendered as `<timestamp> - <name> - <LEVEL> - <message>`. The console sink wraps the
//! level name in ANSI colors, the optional file sink writes the same line without them.
//!
//! A [`LogService`] holds the settings and lazily builds the sinks the first time a [`Logger`] is
//! requested. Every logger handed out afterwards shares those sinks until [`LogService::configure`]
//! is called again. For code that cannot have a service passed in, [`configure`] and [`get_logger`]
//! operate on a process-wide service that is created on first use.

use std::{
    fmt::{self, Display},
    fs::{self, create_dir_all},
    env,
    io::{self, IsTerminal, Write as _},
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};

use anyhow::{bail, Context};
use chrono::Local;
use colored::Color;
use log::{
    kv::{Key, Source},
    LevelFilter, Log, Metadata, Record,
};
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Config, Root},
    encode::{self, Encode},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_FILE_PATH: &str = "logs/app.log";

/// Same shape as the classic `asctime` (milliseconds after a comma)
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Key-value carrying the level on a [`Record`], as `log` has no SUCCESS or CRITICAL
const LEVEL_KEY: &str = "level";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Level {
    #[default]
    Debug,
    Info,
    /// Between [`Level::Info`] and [`Level::Warning`]
    Success,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Success => "SUCCESS",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    /// Level name wrapped in SGR codes, whatever the terminal state of the process
    fn paint(&self) -> String {
        let (color, bold) = match self {
            Level::Debug => (Color::Cyan, false),
            Level::Info => (Color::Blue, false),
            Level::Success => (Color::Green, false),
            Level::Warning => (Color::Yellow, false),
            Level::Error => (Color::Red, false),
            Level::Critical => (Color::Magenta, true),
        };
        let bold = if bold { "1;" } else { "" };
        format!(
            "\u{1b}[{bold}{}m{}\u{1b}[0m",
            color.to_fg_str(),
            self.as_str()
        )
    }

    /// Closest level the `log` facade knows about
    fn as_log_level(&self) -> log::Level {
        match self {
            Level::Debug => log::Level::Debug,
            Level::Info | Level::Success => log::Level::Info,
            Level::Warning => log::Level::Warn,
            Level::Error | Level::Critical => log::Level::Error,
        }
    }

    fn of_record(record: &Record) -> Self {
        record
            .key_values()
            .get(Key::from_str(LEVEL_KEY))
            .and_then(|value| value.to_string().parse().ok())
            .unwrap_or_else(|| record.level().into())
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s.to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Level::Debug,
            "INFO" => Level::Info,
            "SUCCESS" => Level::Success,
            "WARNING" | "WARN" => Level::Warning,
            "ERROR" => Level::Error,
            "CRITICAL" => Level::Critical,
            _ => bail!("unknown log level: {s:?}"),
        };
        Ok(result)
    }
}

impl TryFrom<String> for Level {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, <Self as TryFrom<String>>::Error> {
        value.parse()
    }
}

impl From<log::Level> for Level {
    fn from(value: log::Level) -> Self {
        match value {
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warning,
            log::Level::Info => Level::Info,
            log::Level::Debug | log::Level::Trace => Level::Debug,
        }
    }
}

/// Settings applied the next time sinks are built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Also write records to `log_file_path`
    pub log_to_file: bool,

    /// Parent directories are created when missing
    pub log_file_path: PathBuf,

    /// Records below this level are dropped
    pub log_level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_to_file: true,
            log_file_path: PathBuf::from(DEFAULT_LOG_FILE_PATH),
            log_level: Level::Debug,
        }
    }
}

/// Renders one record. `colorize` only affects the level name.
fn format_line(
    timestamp: impl Display,
    name: &str,
    level: Level,
    message: impl Display,
    colorize: bool,
) -> String {
    if colorize {
        format!("{timestamp} - {name} - {} - {message}", level.paint())
    } else {
        format!("{timestamp} - {name} - {level} - {message}")
    }
}

/// Colors are used when stderr is a terminal, unless `NO_COLOR` or `CLICOLOR_FORCE` say otherwise
fn should_colorize(no_color: Option<String>, force: Option<String>, is_terminal: bool) -> bool {
    if no_color.is_some_and(|value| !value.is_empty()) {
        return false;
    }
    if force.is_some_and(|value| value != "0") {
        return true;
    }
    is_terminal
}

#[derive(Debug)]
struct LineEncoder {
    colorize: bool,
}

impl LineEncoder {
    /// Encoder for the stderr sink, colorized according to the stream it writes to
    fn console() -> Self {
        Self {
            colorize: should_colorize(
                env::var("NO_COLOR").ok(),
                env::var("CLICOLOR_FORCE").ok(),
                io::stderr().is_terminal(),
            ),
        }
    }
}

impl Encode for LineEncoder {
    fn encode(&self, w: &mut dyn encode::Write, record: &Record) -> anyhow::Result<()> {
        let line = format_line(
            Local::now().format(TIMESTAMP_FORMAT),
            record.target(),
            Level::of_record(record),
            record.args(),
            self.colorize,
        );
        writeln!(w, "{line}")?;
        Ok(())
    }
}

/// The appenders shared by every [`Logger`] handed out between two calls to `configure`
struct Sinks {
    level: Level,
    file_path: Option<PathBuf>,
    dispatch: log4rs::Logger,
}

impl Sinks {
    fn build(settings: &LogConfig) -> Self {
        let console = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(LineEncoder::console()))
            .build();

        let mut builder =
            Config::builder().appender(Appender::builder().build("console", Box::new(console)));
        let mut root = Root::builder().appender("console");

        let mut file_path = None;
        if settings.log_to_file {
            match open_file_sink(&settings.log_file_path) {
                Ok((path, file)) => {
                    println!("Log will be written to: {}", path.display());
                    builder = builder.appender(Appender::builder().build("file", Box::new(file)));
                    root = root.appender("file");
                    file_path = Some(path);
                }
                Err(e) => println!("ERROR setting up file logging: {e:#}"),
            }
        }

        // Thresholds are applied by `Logger` as `LevelFilter` cannot express SUCCESS
        let config = builder
            .build(root.build(LevelFilter::Trace))
            .expect("appender names are unique and all of them are registered");

        Self {
            level: settings.log_level,
            file_path,
            dispatch: log4rs::Logger::new(config),
        }
    }
}

fn open_file_sink(path: &Path) -> anyhow::Result<(PathBuf, FileAppender)> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        create_dir_all(dir).with_context(|| format!("Failed to create log directory {dir:?}"))?;
    }
    let appender = FileAppender::builder()
        .encoder(Box::new(LineEncoder { colorize: false }))
        .build(path)
        .with_context(|| format!("Failed to open log file {path:?}"))?;
    let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    Ok((path, appender))
}

/// Handle used to emit records. Cheap to clone, clones share the same sinks.
#[derive(Clone)]
pub struct Logger {
    name: String,
    sinks: Arc<Sinks>,
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        self.sinks.level
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.sinks.level
    }

    /// Absolute path of the log file, `None` when only the console is written to
    pub fn file_path(&self) -> Option<&Path> {
        self.sinks.file_path.as_deref()
    }

    /// True if both handles write to the same sinks
    pub fn shares_sinks_with(&self, other: &Logger) -> bool {
        Arc::ptr_eq(&self.sinks, &other.sinks)
    }

    pub fn emit(&self, level: Level, message: impl Display) {
        if !self.is_enabled(level) {
            return;
        }
        let kvs: &[(&str, &str)] = &[(LEVEL_KEY, level.as_str())];
        self.sinks.dispatch.log(
            &Record::builder()
                .args(format_args!("{message}"))
                .level(level.as_log_level())
                .target(&self.name)
                .key_values(&kvs)
                .build(),
        );
    }

    pub fn debug(&self, message: impl Display) {
        self.emit(Level::Debug, message)
    }

    pub fn info(&self, message: impl Display) {
        self.emit(Level::Info, message)
    }

    pub fn success(&self, message: impl Display) {
        self.emit(Level::Success, message)
    }

    pub fn warning(&self, message: impl Display) {
        self.emit(Level::Warning, message)
    }

    pub fn error(&self, message: impl Display) {
        self.emit(Level::Error, message)
    }

    pub fn critical(&self, message: impl Display) {
        self.emit(Level::Critical, message)
    }

    /// Routes the `log` macros (`log::info!` etc.) through this logger for the rest of the process
    pub fn install(&self) -> anyhow::Result<()> {
        log::set_boxed_logger(Box::new(self.clone())).context("Failed to install logger")?;
        log::set_max_level(LevelFilter::Trace);
        Ok(())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.sinks.level)
            .field("file_path", &self.sinks.file_path)
            .finish()
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.is_enabled(metadata.level().into())
    }

    fn log(&self, record: &Record) {
        if self.is_enabled(Level::of_record(record)) {
            self.sinks.dispatch.log(record);
        }
    }

    fn flush(&self) {
        self.sinks.dispatch.flush();
    }
}

/// Owns the logging settings and the sinks built from them
#[derive(Debug, Default)]
pub struct LogService {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    config: LogConfig,
    sinks: Option<Arc<Sinks>>,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("config", &self.config)
            .field("initialized", &self.sinks.is_some())
            .finish()
    }
}

impl LogService {
    pub fn new(config: LogConfig) -> Self {
        Self {
            state: Mutex::new(State {
                config,
                sinks: None,
            }),
        }
    }

    /// Replaces the settings. Sinks are rebuilt on the next [`LogService::get_logger`]; loggers
    /// obtained before this call keep writing to the old sinks.
    pub fn configure(&self, config: LogConfig) {
        let mut state = self.lock();
        state.config = config;
        state.sinks = None;
    }

    pub fn config(&self) -> LogConfig {
        self.lock().config.clone()
    }

    /// Returns a logger named `name`, building the sinks if this is the first request since the
    /// service was created or reconfigured
    pub fn get_logger(&self, name: &str) -> Logger {
        let mut state = self.lock();
        let sinks = match &state.sinks {
            Some(sinks) => Arc::clone(sinks),
            None => {
                let sinks = Arc::new(Sinks::build(&state.config));
                state.sinks = Some(Arc::clone(&sinks));
                sinks
            }
        };
        Logger {
            name: name.to_string(),
            sinks,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State is replaced wholesale so a poisoned lock still holds a usable value
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static GLOBAL: OnceLock<LogService> = OnceLock::new();

/// The process-wide service, created with [`LogConfig::default`] on first use
pub fn global() -> &'static LogService {
    GLOBAL.get_or_init(LogService::default)
}

/// Configures the process-wide service. Meant to be called once before the first [`get_logger`];
/// reconfiguring while other threads log is not supported.
pub fn configure(config: LogConfig) {
    global().configure(config)
}

pub fn get_logger(name: &str) -> Logger {
    global().get_logger(name)
}
