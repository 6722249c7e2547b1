use std::env;
use std::path::Path;

use anyhow::Result;

/// Log to the console and to `<datadir>/<who>.log`.
///
/// `RUST_LOG`, if set, overrides `level_arg`.
pub fn setup_logging<P: AsRef<Path>>(datadir: P, who: &str, level_arg: &str) -> Result<()> {
    use crate::log_utils::parse_log_level_filter;
    use fern::colors::{Color, ColoredLevelConfig};

    let level = parse_log_level_filter(&env::var("RUST_LOG").unwrap_or(level_arg.to_string()))?;

    // file
    let who_clone = who.to_string();
    let logfile = datadir.as_ref().join(format!("{}.log", who));
    let file_config = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {}/{} {}] {}",
                tstamp(),
                who_clone,
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(fern::log_file(logfile)?);

    // console
    let who_clone = who.to_string();
    let colors = ColoredLevelConfig::new().info(Color::Green).error(Color::Red).warn(Color::Yellow);
    let console_config = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {}/{} {}] {}",
                tstamp(),
                who_clone,
                record.target(),
                colors.color(record.level()),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    fern::Dispatch::new().chain(console_config).chain(file_config).apply()?;
    Ok(())
}

// Would prefer to use now_local but https://rustsec.org/advisories/RUSTSEC-2020-0071
pub fn tstamp() -> String {
    use time::{macros::format_description, OffsetDateTime};

    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
        ))
        .unwrap_or_default()
}
