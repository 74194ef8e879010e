//! Persistence for zones, links, intervals, and the version tag.
//!
//! The relational store is reached through four stored functions in the
//! `tzdb` schema (see `sql/tzdb.sql`). A [`Session`] wraps one connection,
//! used for one bounded unit of work and dropped before the next begins.

use time::PrimitiveDateTime;

/// The result type for store operations.
pub(crate) type Result<T, E = sqlx::Error> = core::result::Result<T, E>;

/// One persisted validity interval of a canonical zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct IntervalRow {
    /// Start of the interval in UTC (inclusive).
    pub utc_start: PrimitiveDateTime,
    /// End of the interval in UTC (exclusive).
    pub utc_end: PrimitiveDateTime,
    /// Start of the interval on the zone's wall clock.
    pub local_start: PrimitiveDateTime,
    /// End of the interval on the zone's wall clock.
    pub local_end: PrimitiveDateTime,
    /// UTC offset in whole minutes east of Greenwich.
    pub offset_minutes: i16,
    /// Display abbreviation, e.g. `CET` or `GMT-5`.
    pub abbreviation: String,
}

/// A factory for store sessions.
pub(crate) trait Store {
    /// The session type opened by this store.
    type Session<'a>: Session
    where
        Self: 'a;

    /// Opens a session for one bounded unit of work.
    async fn session(&self) -> Result<Self::Session<'_>>;
}

/// One open store session, shaped like the four stored functions.
pub(crate) trait Session {
    /// Registers a zone name and returns its stable surrogate id.
    async fn add_zone(&mut self, name: &str) -> Result<i32>;

    /// Records that the alias zone resolves to the canonical zone's rules.
    async fn add_link(&mut self, alias_id: i32, canonical_id: i32) -> Result<()>;

    /// Replaces the whole interval history of one zone in a single call.
    async fn set_intervals(&mut self, zone_id: i32, intervals: &[IntervalRow]) -> Result<()>;

    /// Overwrites the stored database version tag.
    async fn set_version(&mut self, version: &str) -> Result<()>;
}

/// The PostgreSQL store.
pub(crate) struct PgStore {
    /// Connection string used to open one connection per session.
    connection_string: String,
}

impl PgStore {
    /// Creates a store that connects to `connection_string`.
    pub fn new(connection_string: &str) -> Self {
        Self {
            connection_string: connection_string.to_string(),
        }
    }
}

impl Store for PgStore {
    type Session<'a>
        = PgSession
    where
        Self: 'a;

    async fn session(&self) -> Result<PgSession> {
        use sqlx::Connection;
        Ok(PgSession {
            connection: sqlx::PgConnection::connect(&self.connection_string).await?,
        })
    }
}

/// One open PostgreSQL connection.
pub(crate) struct PgSession {
    connection: sqlx::PgConnection,
}

impl Session for PgSession {
    async fn add_zone(&mut self, name: &str) -> Result<i32> {
        sqlx::query_scalar("SELECT tzdb.add_zone($1)")
            .bind(name)
            .fetch_one(&mut self.connection)
            .await
    }

    async fn add_link(&mut self, alias_id: i32, canonical_id: i32) -> Result<()> {
        sqlx::query("SELECT tzdb.add_link($1, $2)")
            .bind(alias_id)
            .bind(canonical_id)
            .execute(&mut self.connection)
            .await
            .map(|_| ())
    }

    async fn set_intervals(&mut self, zone_id: i32, intervals: &[IntervalRow]) -> Result<()> {
        // One structured payload per zone: parallel arrays that the stored
        // function unnests back into rows.
        let mut utc_starts = Vec::with_capacity(intervals.len());
        let mut utc_ends = Vec::with_capacity(intervals.len());
        let mut local_starts = Vec::with_capacity(intervals.len());
        let mut local_ends = Vec::with_capacity(intervals.len());
        let mut offsets = Vec::with_capacity(intervals.len());
        let mut abbreviations = Vec::with_capacity(intervals.len());
        for interval in intervals {
            utc_starts.push(interval.utc_start);
            utc_ends.push(interval.utc_end);
            local_starts.push(interval.local_start);
            local_ends.push(interval.local_end);
            offsets.push(interval.offset_minutes);
            abbreviations.push(interval.abbreviation.clone());
        }

        sqlx::query("SELECT tzdb.set_intervals($1, $2, $3, $4, $5, $6, $7)")
            .bind(zone_id)
            .bind(utc_starts)
            .bind(utc_ends)
            .bind(local_starts)
            .bind(local_ends)
            .bind(offsets)
            .bind(abbreviations)
            .execute(&mut self.connection)
            .await
            .map(|_| ())
    }

    async fn set_version(&mut self, version: &str) -> Result<()> {
        sqlx::query("SELECT tzdb.set_version($1)")
            .bind(version)
            .execute(&mut self.connection)
            .await
            .map(|_| ())
    }
}
