/*
 * Profile keeper: a store of named configuration profiles with exactly one
 * active profile, optional mirroring to a shared remote store, and a presenter
 * that keeps a rendered profile list consistent with the persisted one.
 *
 * `core` holds the platform-agnostic logic, `app_logic` the presenter.
 */
pub mod app_logic;
pub mod core;

use simplelog::{ConfigBuilder, LevelFilter};

/*
 * Installs the global logger. Safe to call more than once; only the first call
 * takes effect. Tests get `TestLogger` so output is captured per test.
 */
pub fn initialize_logging() {
    let config = ConfigBuilder::new()
        .set_time_offset(time::UtcOffset::UTC)
        .set_thread_level(LevelFilter::Debug)
        .build();

    #[cfg(test)]
    let result = simplelog::TestLogger::init(LevelFilter::Trace, config);

    #[cfg(not(test))]
    let result = simplelog::TermLogger::init(
        LevelFilter::Info,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    if result.is_err() {
        log::trace!("Logging: Logger already initialized.");
    }
}
