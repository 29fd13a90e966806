use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

struct Logger {
    filter: reload::Handle<EnvFilter, Registry>,
    path: PathBuf,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Installs the console and file subscribers. The file is
/// `<root>/log/smartafk-YYYY-MM-DD.log`, appended to across restarts.
pub fn init(root: &Path, debug: bool) -> Result<PathBuf, String> {
    if let Some(logger) = LOGGER.get() {
        set_debug(debug);
        return Ok(logger.path.clone());
    }
    let log_dir = root.join("log");
    std::fs::create_dir_all(&log_dir)
        .map_err(|err| format!("log directory create failed: {}", err))?;
    let path = log_dir.join(log_file_name(unix_timestamp()));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| format!("open log {} failed: {}", path.display(), err))?;

    let (filter, handle) = reload::Layer::new(level_filter(debug));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|err| format!("log system init failed: {}", err))?;

    LOGGER
        .set(Logger {
            filter: handle,
            path: path.clone(),
        })
        .map_err(|_| "log system already initialized".to_string())?;
    Ok(path)
}

/// Switches between `info` and `debug` without reinstalling the subscriber.
pub fn set_debug(debug: bool) {
    if let Some(logger) = LOGGER.get() {
        if let Err(err) = logger.filter.reload(level_filter(debug)) {
            tracing::warn!("log level reload failed: {}", err);
        }
    }
}

fn level_filter(debug: bool) -> EnvFilter {
    EnvFilter::new(if debug { "debug" } else { "info" })
}

fn log_file_name(ts: i64) -> String {
    let days = ts.max(0) / 86_400;
    let (year, month, day) = civil_from_days(days);
    format!("smartafk-{year:04}-{month:02}-{day:02}.log")
}

fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = mp + if mp < 10 { 3 } else { -9 };
    let year = (y + if m <= 2 { 1 } else { 0 }) as i32;
    (year, m as u32, d as u32)
}
