//! Console logging bootstrap.
//!
//! The engine logs through the `log` facade (`trace!` for per-agent events,
//! `debug!` for per-tick summaries, `info!` for run milestones). Embedders
//! that already install a logger can skip this entirely.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Installs a console logger at the given level. Returns an error if a
/// global logger is already set.
pub fn init_logging(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {l} {t} - {m}{n}")))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}
