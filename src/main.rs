//! Command-line loader that flattens the embedded IANA time-zone database
//! into a relational interval table: one record per zone name, one link per
//! alias, one row per period of constant UTC offset, plus the release tag.

use crate::{config::Config, store::PgStore, tzdb::Snapshot};

mod config;
mod pipeline;
mod store;
mod tzdb;

fn usage<T>(err: &'static str) -> anyhow::Result<T> {
    let exe = std::env::args().next().unwrap_or_default();
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("Usage: {exe} [options]\n");
    println!("Options:");
    println!("    -c, --connection-string: PostgreSQL connection string of the");
    println!("                             database to update (or env TZLOAD_DATABASE_URL)");
    println!("    -v, --verbose: also log per-zone progress\n");
    Err(anyhow::Error::msg(err))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = pico_args::Arguments::from_env();
    let verbose = args.contains(["-v", "--verbose"]);
    let connection_string: String =
        if let Some(arg) = args.opt_value_from_str(["-c", "--connection-string"])? {
            arg
        } else if let Ok(var) = std::env::var("TZLOAD_DATABASE_URL") {
            var
        } else {
            return usage("Missing connection string argument");
        };
    if !args.finish().is_empty() {
        return usage("Unknown extra arguments passed");
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if verbose { "debug" } else { "info" }),
    )
    .init();

    let snapshot = Snapshot::current()?;
    let config = Config::new(connection_string);
    log::info!(
        "Loading tzdb {} ({} zone names) up to {}",
        snapshot.version(),
        snapshot.ids().len(),
        config.horizon,
    );

    // Credentials may be embedded in the URL; log only what follows them.
    log::debug!(
        "Updating {}",
        config.connection_string.rsplit('@').next().unwrap_or_default(),
    );

    let store = PgStore::new(&config.connection_string);
    let report = pipeline::run(&config, &snapshot, &store).await?;

    log::info!(
        "Wrote {} zones, {} links, and {} intervals; stamped version {}",
        report.zones,
        report.links,
        report.intervals,
        snapshot.version(),
    );
    if !report.warnings.is_empty() {
        log::warn!("{} non-fatal projection warnings", report.warnings.len());
    }

    Ok(())
}
