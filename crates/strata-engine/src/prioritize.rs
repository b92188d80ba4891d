//! Eligibility filtering and deterministic candidate ordering.
//!
//! # Design
//! - The min-age floor gates on the NEWEST name: a fresh hardlink into an
//!   old group resets its clock, and nothing overrides the floor.
//! - The max-age ceiling gates on the OLDEST name and only reorders: forced
//!   groups jump the queue but still respect active playback and the floor.
//! - Ordering is total, so two iterations over identical state produce
//!   identical move sequences.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::enrich::Enrichment;
use crate::model::{EvictionCandidate, HardlinkGroup};

fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Filter ineligible groups and order the remainder for eviction.
///
/// Eviction order: forced (max-age exceeded) first, then fewest names,
/// then not-watched before watched-or-unknown, then oldest modification
/// time, then lexical first path as the final tiebreaker.
#[must_use]
pub fn prioritize(
    groups: Vec<HardlinkGroup>,
    enrichment: &Enrichment,
    min_age: Duration,
    max_age: Option<Duration>,
    now: DateTime<Utc>,
) -> Vec<EvictionCandidate> {
    let min_cutoff = now - delta(min_age);
    let max_cutoff = max_age.map(|age| now - delta(age));

    let mut candidates: Vec<EvictionCandidate> = groups
        .into_iter()
        .filter_map(|group| {
            let newest = group.newest_mtime()?;
            if newest > min_cutoff {
                debug!(group = %group.first_path().display(), "below min age, skipped");
                return None;
            }
            if enrichment.is_active(&group) {
                debug!(group = %group.first_path().display(), "active playback, skipped");
                return None;
            }
            let forced = match (max_cutoff, group.oldest_mtime()) {
                (Some(cutoff), Some(oldest)) => oldest < cutoff,
                _ => false,
            };
            let watched = enrichment.watched_for(&group);
            Some(EvictionCandidate {
                group,
                forced,
                watched,
            })
        })
        .collect();

    candidates.sort_by(candidate_order);
    candidates
}

fn candidate_order(a: &EvictionCandidate, b: &EvictionCandidate) -> Ordering {
    b.forced
        .cmp(&a.forced)
        .then_with(|| a.group.link_count().cmp(&b.group.link_count()))
        .then_with(|| a.watched.sort_rank().cmp(&b.watched.sort_rank()))
        .then_with(|| a.group.oldest_mtime().cmp(&b.group.oldest_mtime()))
        .then_with(|| a.group.first_path().cmp(b.group.first_path()))
}
