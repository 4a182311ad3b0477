//! Append-only log file that rolls over at UTC midnight.
//!
//! Files are named `YYYY-MM-DD.log` and live in one directory. Every write
//! goes straight to the file, so lines survive a crash.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub const LOG_DIR_NAME: &str = "logs";

/// `[2024-05-01T08:30:00.123Z] [INFO] message`
pub fn format_line(timestamp: DateTime<Utc>, level: log::Level, message: &str) -> String {
    format!(
        "[{}] [{}] {}",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        level,
        message
    )
}

/// `<data dir>/<identifier>/logs`, available before the tauri app is built.
pub fn log_dir(identifier: &str) -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(identifier).join(LOG_DIR_NAME))
}

pub fn file_name_for(date: NaiveDate) -> String {
    format!("{}.log", date.format("%Y-%m-%d"))
}

pub struct DailyLogFile {
    dir: PathBuf,
    clock: Clock,
    current: Option<(NaiveDate, File)>,
}

impl DailyLogFile {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, Utc::now)
    }

    pub fn with_clock<C>(dir: impl Into<PathBuf>, clock: C) -> Self
    where
        C: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            dir: dir.into(),
            clock: Box::new(clock),
            current: None,
        }
    }

    /// Formats and appends one line with the current time.
    #[cfg(test)]
    pub fn log(&mut self, level: log::Level, message: &str) -> io::Result<()> {
        let mut line = format_line((self.clock)(), level, message);
        line.push('\n');
        self.write_all(line.as_bytes())
    }

    fn file_for_today(&mut self) -> io::Result<&mut File> {
        let today = (self.clock)().date_naive();
        let stale = self
            .current
            .as_ref()
            .map_or(true, |(date, _)| *date != today);

        if stale {
            fs::create_dir_all(&self.dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(file_name_for(today)))?;
            self.current = Some((today, file));
        }

        match self.current.as_mut() {
            Some((_, file)) => Ok(file),
            None => Err(io::Error::new(io::ErrorKind::Other, "log file not open")),
        }
    }
}

impl Write for DailyLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file_for_today()?.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file_for_today()?.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.current.as_mut() {
            Some((_, file)) => file.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    fn at(h: u32, m: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, h, m, 0).unwrap()
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line(at(8, 30, 1), log::Level::Warn, "clipboard busy"),
            "[2024-03-01T08:30:00.000Z] [WARN] clipboard busy"
        );
    }

    #[test]
    fn test_lines_accumulate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = DailyLogFile::with_clock(dir.path(), || at(10, 0, 5));
        log.log(log::Level::Info, "one").unwrap();
        log.log(log::Level::Error, "two").unwrap();
        log.log(log::Level::Info, "three").unwrap();

        let lines = read_lines(&dir.path().join("2024-03-05.log"));
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("[INFO] one"));
        assert!(lines[1].ends_with("[ERROR] two"));
        assert!(lines[2].ends_with("[INFO] three"));
    }

    #[test]
    fn test_rolls_over_at_midnight() {
        let dir = tempfile::tempdir().unwrap();
        let now = Arc::new(Mutex::new(at(23, 59, 5)));
        let clock = Arc::clone(&now);
        let mut log = DailyLogFile::with_clock(dir.path(), move || *clock.lock().unwrap());

        log.log(log::Level::Info, "before").unwrap();
        *now.lock().unwrap() = at(0, 1, 6);
        log.log(log::Level::Info, "after").unwrap();

        let first = read_lines(&dir.path().join("2024-03-05.log"));
        let second = read_lines(&dir.path().join("2024-03-06.log"));
        assert_eq!(first.len(), 1);
        assert!(first[0].ends_with("before"));
        assert_eq!(second.len(), 1);
        assert!(second[0].ends_with("after"));
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("2024-03-05.log"), "earlier\n").unwrap();

        let mut log = DailyLogFile::with_clock(dir.path(), || at(9, 0, 5));
        log.log(log::Level::Info, "later").unwrap();

        let lines = read_lines(&dir.path().join("2024-03-05.log"));
        assert_eq!(lines[0], "earlier");
        assert!(lines[1].ends_with("later"));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("app").join(LOG_DIR_NAME);
        let mut log = DailyLogFile::with_clock(&nested, || at(9, 0, 5));
        log.log(log::Level::Debug, "x").unwrap();
        assert!(nested.join("2024-03-05.log").exists());
    }
}
