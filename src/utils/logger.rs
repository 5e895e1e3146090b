use colored::Colorize;
use env_logger::Builder;
use log::Level;
use std::io::Write;

pub fn setup_logging(verbose: bool) {
    use log::LevelFilter;

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Tests may install a logger more than once.
    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn) // Default: only warnings from dependencies
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME");
            let line = match record.level() {
                Level::Error | Level::Warn => {
                    let level_str = if record.level() == Level::Warn {
                        "WARN".yellow()
                    } else {
                        "ERROR".red()
                    };
                    let target = record.target().to_string().white();
                    format!("[{} {} {}] {}", name.cyan(), level_str, target, record.args())
                }
                Level::Debug | Level::Trace => {
                    format!("[{} {}] {}", name.cyan(), "DEBUG".dimmed(), record.args())
                }
                Level::Info => format!("[{}] {}", name.cyan(), record.args()),
            };
            writeln!(buf, "{}", line)
        })
        .try_init();
}
