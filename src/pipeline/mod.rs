//! The load pipeline: register zones, link aliases, derive and persist
//! validity intervals, stamp the database version.
//!
//! The four steps run strictly in sequence, each finishing its writes before
//! the next begins. The first store failure aborts the rest of the run;
//! writes from completed steps stay committed.

use crate::{
    config::Config,
    store::{Session, Store},
    tzdb::Snapshot,
};
use std::collections::{HashMap, HashSet};

mod derive;

/// The result type for pipeline operations.
pub(crate) type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// The time-zone snapshot is unusable.
    #[error(transparent)]
    Snapshot(#[from] crate::tzdb::Error),

    /// A remote write or connection failure.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A finite interval bound does not fit the representable timestamp
    /// range.
    #[error("interval bound out of range: {0}")]
    Timestamp(#[from] time::error::ComponentRange),

    /// A zone name was not registered before it was needed.
    #[error("zone {0} has no surrogate id")]
    Unregistered(String),

    /// A UTC offset does not fit the persisted 16-bit minute column.
    #[error("offset of {0} minutes is out of range")]
    OffsetRange(i64),
}

/// Totals and non-fatal diagnostics from one pipeline run.
#[derive(Debug)]
pub(crate) struct RunReport {
    /// Number of zone records registered.
    pub zones: usize,
    /// Number of alias links persisted.
    pub links: usize,
    /// Number of interval rows persisted.
    pub intervals: usize,
    /// Non-fatal projection warnings, in occurrence order.
    pub warnings: Vec<String>,
}

/// Runs the whole pipeline against `store`.
pub(crate) async fn run<S: Store>(
    config: &Config,
    snapshot: &Snapshot,
    store: &S,
) -> Result<RunReport> {
    let zones = register_zones(snapshot, store).await?;
    log::debug!("Registered {} zones", zones.len());

    let links = write_links(snapshot, &zones, store).await?;
    log::debug!("Linked {links} aliases");

    let (intervals, warnings) = write_intervals(config, snapshot, &zones, store).await?;

    store.session().await?.set_version(snapshot.version()).await?;

    Ok(RunReport {
        zones: zones.len(),
        links,
        intervals,
        warnings,
    })
}

/// Registers every zone name, canonical and alias, and returns the
/// name → surrogate-id mapping covering each input exactly once.
async fn register_zones<S: Store>(
    snapshot: &Snapshot,
    store: &S,
) -> Result<HashMap<&'static str, i32>> {
    let mut session = store.session().await?;
    let mut zones = HashMap::with_capacity(snapshot.ids().len());
    for &id in snapshot.ids() {
        let surrogate = session.add_zone(id).await?;
        zones.insert(id, surrogate);
    }
    Ok(zones)
}

/// Persists one alias → canonical link per alias zone. The canonical id of
/// each group is resolved once; a canonical zone is never linked to itself
/// because it never appears among its own aliases.
async fn write_links<S: Store>(
    snapshot: &Snapshot,
    zones: &HashMap<&'static str, i32>,
    store: &S,
) -> Result<usize> {
    let mut session = store.session().await?;
    let mut links = 0;
    for (canonical, aliases) in snapshot.aliases() {
        let canonical_id = surrogate(zones, canonical)?;
        for alias in aliases {
            session.add_link(surrogate(zones, alias)?, canonical_id).await?;
            links += 1;
        }
    }
    Ok(links)
}

/// Derives and persists the interval history of every canonical zone, one
/// batch per zone, collecting non-fatal projection warnings.
async fn write_intervals<S: Store>(
    config: &Config,
    snapshot: &Snapshot,
    zones: &HashMap<&'static str, i32>,
    store: &S,
) -> Result<(usize, Vec<String>)> {
    let horizon = config.horizon.assume_utc().unix_timestamp();
    let aliases: HashSet<&str> = snapshot.aliases().values().flatten().copied().collect();

    let mut warnings = Vec::new();
    let mut total = 0;
    for &id in snapshot.ids() {
        if aliases.contains(id) {
            continue;
        }

        let raw = snapshot.intervals(id, horizon)?;
        let reported = warnings.len();
        let batch = derive::rows(id, &raw, &mut warnings)?;
        for warning in &warnings[reported..] {
            log::warn!("{warning}");
        }

        let mut session = store.session().await?;
        session.set_intervals(surrogate(zones, id)?, &batch).await?;
        total += batch.len();
        log::debug!("{id}: wrote {} intervals", batch.len());
    }

    Ok((total, warnings))
}

/// Looks up the surrogate id registered for a zone name.
fn surrogate(zones: &HashMap<&'static str, i32>, id: &str) -> Result<i32> {
    zones
        .get(id)
        .copied()
        .ok_or_else(|| Error::Unregistered(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{Call, MemoryStore};
    use time::macros::datetime;

    fn config() -> Config {
        Config {
            connection_string: "postgres://unused".to_string(),
            horizon: datetime!(2045-01-01 00:00),
        }
    }

    async fn completed_run(store: &MemoryStore) -> (Snapshot, RunReport) {
        let snapshot = Snapshot::current().unwrap();
        let report = run(&config(), &snapshot, store).await.unwrap();
        (snapshot, report)
    }

    #[tokio::test]
    async fn steps_run_in_order_and_stamp_the_version() {
        let store = MemoryStore::default();
        let (snapshot, report) = completed_run(&store).await;

        assert_eq!(report.zones, snapshot.ids().len());
        assert!(report.warnings.is_empty());

        let phase = |call: &Call| match call {
            Call::AddZone(_) => 0,
            Call::AddLink(..) => 1,
            Call::SetIntervals(..) => 2,
            Call::SetVersion(_) => 3,
        };
        let calls = store.calls();
        for pair in calls.windows(2) {
            assert!(
                phase(&pair[0]) <= phase(&pair[1]),
                "{:?} ran after {:?}",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(
            calls
                .iter()
                .filter(|call| matches!(call, Call::SetVersion(_)))
                .count(),
            1
        );
        assert!(calls.contains(&Call::SetVersion(snapshot.version().to_string())));
    }

    #[tokio::test]
    async fn aliases_are_linked_but_never_given_intervals() {
        let store = MemoryStore::default();
        let (snapshot, report) = completed_run(&store).await;

        let alias_ids: HashSet<i32> = snapshot
            .aliases()
            .values()
            .flatten()
            .map(|alias| store.id_of(alias).unwrap())
            .collect();
        assert_eq!(report.links, alias_ids.len());

        for call in store.calls() {
            if let Call::SetIntervals(zone_id, _) = call {
                assert!(
                    !alias_ids.contains(&zone_id),
                    "alias id {zone_id} received intervals"
                );
            }
        }

        // Spot check one link: the old name resolves to the renamed zone.
        let alias = store.id_of("US/Eastern").unwrap();
        let canonical = store.id_of("America/New_York").unwrap();
        assert!(store.calls().contains(&Call::AddLink(alias, canonical)));
    }

    #[tokio::test]
    async fn batches_are_contiguous_and_bounded() {
        let store = MemoryStore::default();
        completed_run(&store).await;

        let horizon = config().horizon;
        let mut batches = 0;
        for call in store.calls() {
            let Call::SetIntervals(_, rows) = call else {
                continue;
            };
            batches += 1;
            assert!(!rows.is_empty());
            assert_eq!(rows[0].utc_start, derive::MIN_TIMESTAMP);
            for pair in rows.windows(2) {
                assert_eq!(pair[0].utc_end, pair[1].utc_start);
            }
            let last = rows.last().unwrap();
            assert!(
                last.utc_end == derive::MAX_TIMESTAMP || last.utc_end == horizon,
                "unexpected final bound {:?}",
                last.utc_end
            );
            for row in &rows {
                // Everything ever observed on Earth, local mean time
                // included, fits within sixteen hours of Greenwich.
                assert!((-960..=960).contains(&row.offset_minutes), "{row:?}");
                assert_eq!(
                    derive::normalize_abbreviation(&row.abbreviation),
                    row.abbreviation,
                    "abbreviation was persisted unnormalized"
                );
            }
        }
        assert!(batches > 100, "only {batches} canonical zones derived");
    }

    #[tokio::test]
    async fn reruns_persist_identical_batches() {
        let first = MemoryStore::default();
        let second = MemoryStore::default();
        completed_run(&first).await;
        completed_run(&second).await;

        let intervals_only = |store: &MemoryStore| {
            store
                .calls()
                .into_iter()
                .filter(|call| matches!(call, Call::SetIntervals(..)))
                .collect::<Vec<_>>()
        };
        assert_eq!(intervals_only(&first), intervals_only(&second));
    }

    #[tokio::test]
    async fn store_failure_aborts_the_run() {
        let store = MemoryStore::fail_on_set_intervals();
        let snapshot = Snapshot::current().unwrap();
        let result = run(&config(), &snapshot, &store).await;
        assert!(matches!(result, Err(Error::Store(_))));

        // Zones and links were committed before the failure, one batch write
        // was attempted, and the version was never stamped.
        let calls = store.calls();
        assert!(calls.iter().any(|call| matches!(call, Call::AddZone(_))));
        assert!(calls.iter().any(|call| matches!(call, Call::AddLink(..))));
        assert_eq!(
            calls
                .iter()
                .filter(|call| matches!(call, Call::SetIntervals(..)))
                .count(),
            1
        );
        assert!(!calls.iter().any(|call| matches!(call, Call::SetVersion(_))));
    }
}
