use ecs_tracing_format::{CallSite, EcsFormatter, LogEntry};
use std::io::{self, Write};
use tracing::Level;

/// Formats entries directly, without installing a subscriber, and renders
/// call sites with a custom hook.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let formatter = EcsFormatter::new()
        .with_pretty_print(true)
        .with_caller_formatter(|call_site: &CallSite| {
            let file = call_site.file.rsplit('/').next().unwrap_or_default();
            (call_site.function.clone(), format!("{}:{}", file, call_site.line))
        });

    let entry = LogEntry::new(Level::WARN, "disk almost full")
        .with_field("disk.free_bytes", 1024u64)
        .with_call_site(CallSite::new("storage::check", "src/storage/check.rs", 27));

    let out = formatter.format(&entry)?;
    io::stdout().write_all(&out)?;
    Ok(())
}
