//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `smartbook_core` linkage.
//! - Start file logging under the system temp directory.
//! - Walk one bookmark through sign-in, add, echo, search and stats against
//!   the in-memory gateway.
//!
//! # Invariants
//! - Output is deterministic apart from generated ids and timestamps.

use smartbook_core::{
    init_logging_with_config, BookmarkService, CoreConfig, LocalGateway, Session,
};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

const LOG_DIR_NAME: &str = "smartbook-logs";

fn main() -> Result<(), Box<dyn Error>> {
    println!("smartbook_core ping={}", smartbook_core::ping());
    println!("smartbook_core version={}", smartbook_core::core_version());

    let config = CoreConfig::default();
    let log_dir = std::env::temp_dir().join(LOG_DIR_NAME);
    start_logging(&config, &log_dir)?;
    println!("smartbook_core log_dir={}", log_dir.display());

    run_demo(config)
}

fn start_logging(config: &CoreConfig, log_dir: &Path) -> Result<(), Box<dyn Error>> {
    let log_dir = log_dir
        .to_str()
        .ok_or("log directory path is not valid UTF-8")?;
    init_logging_with_config(config, log_dir)?;
    Ok(())
}

fn run_demo(config: CoreConfig) -> Result<(), Box<dyn Error>> {
    let gateway = Arc::new(LocalGateway::open_in_memory()?);
    let mut service = BookmarkService::new(Arc::clone(&gateway), config)?;
    service.start()?;

    gateway.sign_in(Session::authenticated("demo-user", "demo@example.com"));
    service.pump()?;

    service.add_bookmark("Rust Book", "doc.rust-lang.org/book")?;
    service.add_bookmark("crates.io", "https://crates.io")?;
    let echoed = service.pump()?;
    println!(
        "demo bookmarks={} echoes_merged={}",
        service.bookmarks().len(),
        echoed
    );

    for record in service.search("rust") {
        println!("demo search term=rust url={}", record.url);
    }

    let stats = service.stats();
    let top = stats
        .top_domain
        .map(|entry| format!("{}:{}", entry.domain, entry.count))
        .unwrap_or_else(|| "none".to_string());
    println!(
        "demo stats total={} days={} top_domain={}",
        stats.total,
        stats.daily_counts.len(),
        top
    );

    service.sign_out()?;
    service.pump()?;
    println!("demo signed_out bookmarks={}", service.bookmarks().len());
    Ok(())
}
