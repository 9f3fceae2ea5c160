use chrono::Local;
use std::{
    backtrace::Backtrace,
    fs::OpenOptions,
    io::Write,
    panic::{PanicHookInfo, take_hook},
    path::{Path, PathBuf},
    thread,
};

use crate::logging::TIMESTAMP_FORMAT;

/// Installs a panic hook that reports panics through `tracing`.
///
/// When `log_file` is set and the build aborts on panic, the record is also
/// appended to that file directly, since the non-blocking writer may not
/// flush before the process dies. The previous hook still runs afterwards.
pub fn install(log_file: Option<PathBuf>) {
    let previous_hook = take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let record = format_panic_record(panic_info);

            tracing::error!(target: "srec_supervisor::panic", "{record}");

            if cfg!(panic = "abort")
                && let Some(path) = &log_file
            {
                let _ = append_panic_record(path, &record);
            }
        }));

        previous_hook(panic_info);
    }));
}

fn append_panic_record(path: &Path, record: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "{} - ERROR - {record}",
        Local::now().format(TIMESTAMP_FORMAT)
    )?;
    file.flush()
}

fn format_panic_record(panic_info: &PanicHookInfo<'_>) -> String {
    let location = panic_info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
        .unwrap_or_else(|| "<unknown>".to_string());

    let thread_name = thread::current()
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| "<unnamed>".to_string());

    format!(
        "PANIC thread={thread_name} location={location} payload={}\nBacktrace:\n{}",
        panic_payload(panic_info),
        Backtrace::force_capture()
    )
}

fn panic_payload(panic_info: &PanicHookInfo<'_>) -> String {
    let payload = panic_info.payload();
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    panic_info.to_string()
}
