//! Run configuration.

use time::{Date, Month, PrimitiveDateTime, Time, UtcDateTime};

/// Configuration for one pipeline run, threaded explicitly through each
/// component entry point.
#[derive(Clone, Debug)]
pub(crate) struct Config {
    /// PostgreSQL connection string of the database to update.
    pub connection_string: String,
    /// Instant (naive UTC) past which interval derivation is truncated.
    pub horizon: PrimitiveDateTime,
}

impl Config {
    /// Creates a configuration with the default derivation horizon.
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            horizon: default_horizon(),
        }
    }
}

/// Midnight UTC on January 1st, ten years after the current UTC year.
///
/// This tracks the wall clock, so two runs on either side of a new year
/// truncate future intervals at different instants.
pub(crate) fn default_horizon() -> PrimitiveDateTime {
    let year = UtcDateTime::now().year() + 10;
    // Representable until the year 9990.
    let date = Date::from_calendar_date(year, Month::January, 1).expect("horizon year out of range");
    PrimitiveDateTime::new(date, Time::MIDNIGHT)
}
