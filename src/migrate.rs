//! Versioned upgrades for loaded documents. A saved document may predate the
//! current schema; `migrate` brings it forward deterministically before the
//! store ever reads it.

use std::ops::RangeInclusive;

use tracing::info;

use crate::model::{
    default_month_for, default_site_month, default_year_for, AppState, MonthRecord, Segment,
    SitePageRegistryEntry, MONTHS_PER_YEAR,
};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Applies the numbered migration steps in sequence, then normalizes the
/// domain (every configured segment/year pair materialized, 12 records per
/// year). Running it twice is a no-op.
pub fn migrate(state: &mut AppState, years: RangeInclusive<i32>) {
    if state.schema_version < 2 {
        info!(
            target: "migrate",
            from = state.schema_version,
            "upgrading document to schema v2 (site segment + page registry)"
        );
        upgrade_v1_to_v2(state);
    }
    normalize_domain(state, years);
    state.schema_version = CURRENT_SCHEMA_VERSION;
}

/// v1 documents predate the Site segment: their `Site` years either do not
/// exist or hold funnel-shaped records, and there is no page registry. Month
/// records are rewritten to site defaults and registry entries are recovered
/// from whatever site pages already carry data.
fn upgrade_v1_to_v2(state: &mut AppState) {
    if let Some(by_year) = state.data.get_mut(&Segment::Site) {
        for months in by_year.values_mut() {
            for record in months.iter_mut() {
                if record.as_site().is_none() {
                    *record = MonthRecord::Site(default_site_month());
                }
            }
        }
    }
    recover_registry_entries(state);
}

fn recover_registry_entries(state: &mut AppState) {
    let mut orphaned: Vec<String> = Vec::new();
    if let Some(by_year) = state.data.get(&Segment::Site) {
        for months in by_year.values() {
            for record in months {
                if let Some(site) = record.as_site() {
                    for name in site.pages.keys() {
                        let known = state
                            .site_registry
                            .iter()
                            .any(|entry| entry.name == *name)
                            || orphaned.contains(name);
                        if !known {
                            orphaned.push(name.clone());
                        }
                    }
                }
            }
        }
    }
    for name in orphaned {
        info!(target: "migrate", page = %name, "recovered orphaned site page into registry");
        state.site_registry.push(SitePageRegistryEntry::new(name));
    }
}

fn normalize_domain(state: &mut AppState, years: RangeInclusive<i32>) {
    for segment in Segment::ALL {
        let by_year = state.data.entry(segment).or_default();
        for year in years.clone() {
            let months = by_year
                .entry(year)
                .or_insert_with(|| default_year_for(segment));
            months.truncate(MONTHS_PER_YEAR);
            while months.len() < MONTHS_PER_YEAR {
                months.push(default_month_for(segment));
            }
        }
    }
}
