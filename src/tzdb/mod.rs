//! The embedded IANA time-zone database, presented as a snapshot of zone
//! identifiers, alias links, per-zone validity intervals, and a release tag.

use std::collections::BTreeMap;

pub(crate) use intervals::RawInterval;

mod intervals;
mod links;

/// The result type for snapshot operations.
pub(crate) type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors that may occur while reading the embedded time-zone database.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// A zone name has no rule data in the compiled database. The link table
    /// or the caller is out of step with [`tzdb_data::VERSION`].
    #[error("unknown time zone: {0}")]
    UnknownZone(String),

    /// Rule data exists for a zone but could not be evaluated.
    #[error("unusable rule data for {0}: {1}")]
    Rules(String, tz::Error),
}

/// A read-only snapshot of the embedded time-zone database.
pub(crate) struct Snapshot {
    /// Canonical zone name → alias names of that zone, each list sorted.
    aliases: BTreeMap<&'static str, Vec<&'static str>>,
}

impl Snapshot {
    /// Captures the database compiled into the binary.
    ///
    /// Every name in the link table is resolved against the compiled zone
    /// data up front, so skew between the two is caught before anything is
    /// persisted.
    pub fn current() -> Result<Self> {
        let mut aliases = BTreeMap::<&'static str, Vec<&'static str>>::new();
        for &(alias, canonical) in links::LINKS {
            if tzdb_data::find_tz(alias.as_bytes()).is_none() {
                return Err(Error::UnknownZone(alias.to_string()));
            }
            if tzdb_data::find_tz(canonical.as_bytes()).is_none() {
                return Err(Error::UnknownZone(canonical.to_string()));
            }
            // The link table is sorted by alias, so each group stays sorted.
            aliases.entry(canonical).or_default().push(alias);
        }
        Ok(Self { aliases })
    }

    /// Every known zone identifier, canonical and alias.
    pub fn ids(&self) -> &'static [&'static str] {
        tzdb_data::TZ_NAMES
    }

    /// The alias grouping: canonical zone name → sorted alias names.
    pub fn aliases(&self) -> &BTreeMap<&'static str, Vec<&'static str>> {
        &self.aliases
    }

    /// The IANA release tag of the compiled database, e.g. `2025b`.
    pub fn version(&self) -> &'static str {
        tzdb_data::VERSION
    }

    /// Enumerates the validity intervals of `id` from the unbounded past up
    /// to `horizon` (Unix seconds), in chronological order.
    pub fn intervals<'a>(&self, id: &'a str, horizon: i64) -> Result<Vec<RawInterval<'a>>> {
        let zone = tzdb_data::find_tz(id.as_bytes())
            .ok_or_else(|| Error::UnknownZone(id.to_string()))?;
        intervals::enumerate(id, *zone, horizon)
    }
}
