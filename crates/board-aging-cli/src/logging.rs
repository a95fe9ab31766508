//! Console + log file tracing setup.

use std::fs::File;
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// `board-aging_<YYYY-MM-DD>_<unix-ts>.log`
pub fn log_file_name(now: DateTime<Local>) -> String {
    format!(
        "board-aging_{}_{}.log",
        now.format("%Y-%m-%d"),
        now.timestamp()
    )
}

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("board_aging=debug,board_aging_cli=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("board_aging=info,board_aging_cli=info"))
    }
}

/// Install the global subscriber: colored console output on stderr plus a
/// plain-text copy in a fresh file under `log_dir`. Returns the log file path.
pub fn init(log_dir: &Path, verbose: bool) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_dir.join(log_file_name(Local::now()));
    let file = File::create(&path)?;

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .init();

    Ok(path)
}

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// Routes panics through `tracing` while alive, so a panicking case lands
/// in the log file instead of as a raw backtrace on stderr. The previous
/// hook is restored on drop.
pub struct PanicLogHook {
    previous: Option<PanicHook>,
}

impl PanicLogHook {
    pub fn install() -> Self {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(|info| {
            let message = info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            let location = info
                .location()
                .map_or_else(String::new, ToString::to_string);
            let thread = std::thread::current();
            tracing::error!(
                thread = thread.name().unwrap_or("<unnamed>"),
                location = %location,
                "Panic: {message}"
            );
        }));
        Self {
            previous: Some(previous),
        }
    }
}

impl Drop for PanicLogHook {
    fn drop(&mut self) {
        // set_hook panics on a panicking thread; leave ours in place then.
        if std::thread::panicking() {
            return;
        }
        if let Some(previous) = self.previous.take() {
            panic::set_hook(previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::{self, Write};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_panic_hook_logs_through_tracing() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let hook = PanicLogHook::install();
            let result = panic::catch_unwind(|| panic!("sampling thread died"));
            drop(hook);
            assert!(result.is_err());
        });

        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("Panic: sampling thread died"), "{text}");
        assert!(text.contains("logging.rs"), "{text}");
    }

    #[test]
    fn test_log_file_name() {
        let now = Local.timestamp_opt(1_700_000_000, 0).unwrap();
        let name = log_file_name(now);
        assert!(name.starts_with("board-aging_"), "{name}");
        assert!(name.ends_with("_1700000000.log"), "{name}");
        assert!(name.contains(&now.format("%Y-%m-%d").to_string()));
    }
}
