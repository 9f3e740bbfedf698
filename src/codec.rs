//! Bidirectional mapping between the nested state tree and the flat
//! spreadsheet row layout: one row per leaf metric series,
//! `[segment, year, monthIndex, category, subcategory, item, metric,
//! week1..week5]`. The global site-page registry travels in the same table
//! under sentinel coordinates so one sheet round-trips the whole document.

use std::ops::RangeInclusive;

use tracing::debug;

use crate::model::{
    AppState, FunnelMonth, MonthKey, MonthRecord, PaidChannel, PipeData, Segment, SiteKpis,
    SiteMonth, SitePageRegistryEntry, SocialMonth, WeekSeries, WEEKS_PER_MONTH,
};
use crate::store::ensure_month;

/// Sentinel coordinates for rows that carry global registry entries rather
/// than month data.
pub const GLOBAL_SEGMENT: &str = "Global";
pub const GLOBAL_INDEX: i64 = -1;

const REGISTRY_CATEGORY: &str = "Registry";
const REGISTRY_SUBCATEGORY: &str = "Pages";
const REGISTRY_METRIC: &str = "isHidden";

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub segment: String,
    pub year: i64,
    pub month: i64,
    pub category: String,
    pub subcategory: String,
    pub item: String,
    pub metric: String,
    pub weeks: [f64; WEEKS_PER_MONTH],
}

impl SheetRow {
    fn month_row(
        key: MonthKey,
        category: &str,
        subcategory: &str,
        item: &str,
        metric: &str,
        weeks: [f64; WEEKS_PER_MONTH],
    ) -> Self {
        Self {
            segment: key.segment.as_str().to_string(),
            year: key.year as i64,
            month: key.month as i64,
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            item: item.to_string(),
            metric: metric.to_string(),
            weeks,
        }
    }

    fn registry_row(entry: &SitePageRegistryEntry) -> Self {
        let mut weeks = [0.0; WEEKS_PER_MONTH];
        weeks[0] = if entry.is_hidden { 1.0 } else { 0.0 };
        Self {
            segment: GLOBAL_SEGMENT.to_string(),
            year: GLOBAL_INDEX,
            month: GLOBAL_INDEX,
            category: REGISTRY_CATEGORY.to_string(),
            subcategory: REGISTRY_SUBCATEGORY.to_string(),
            item: entry.name.clone(),
            metric: REGISTRY_METRIC.to_string(),
            weeks,
        }
    }

    fn is_registry_row(&self) -> bool {
        self.segment == GLOBAL_SEGMENT
            && self.year == GLOBAL_INDEX
            && self.month == GLOBAL_INDEX
            && self.category == REGISTRY_CATEGORY
    }
}

/// Scalar monthly KPIs occupy week 1; weeks 2-5 are zero-filled.
fn scalar_row(value: f64) -> [f64; WEEKS_PER_MONTH] {
    let mut weeks = [0.0; WEEKS_PER_MONTH];
    weeks[0] = value;
    weeks
}

/// Serializes every materialized month into flat rows, numeric cells already
/// parsed. Registry entries are appended under the sentinel coordinates.
pub fn encode(state: &AppState) -> Vec<SheetRow> {
    let mut rows = Vec::new();

    for segment in Segment::ALL {
        let Some(by_year) = state.data.get(&segment) else {
            continue;
        };
        for (year, months) in by_year {
            for (month_index, record) in months.iter().enumerate() {
                let key = MonthKey::new(segment, *year, month_index);
                match record {
                    MonthRecord::Funnel(month) => encode_funnel(&mut rows, key, month),
                    MonthRecord::Social(month) => encode_social(&mut rows, key, month),
                    MonthRecord::Site(month) => encode_site(&mut rows, key, month),
                }
            }
        }
    }

    for entry in &state.site_registry {
        rows.push(SheetRow::registry_row(entry));
    }

    rows
}

fn encode_funnel(rows: &mut Vec<SheetRow>, key: MonthKey, month: &FunnelMonth) {
    for (source, series) in &month.organic.sources {
        rows.push(SheetRow::month_row(
            key,
            "Organic",
            "Sources",
            source,
            "leads",
            series.to_numbers(),
        ));
    }
    for (page, landing) in &month.organic.landing {
        rows.push(SheetRow::month_row(
            key,
            "Organic",
            "Landing",
            page,
            "leads",
            landing.leads.to_numbers(),
        ));
        rows.push(SheetRow::month_row(
            key,
            "Organic",
            "Landing",
            page,
            "views",
            landing.views.to_numbers(),
        ));
    }
    for metric in PaidChannel::METRICS {
        if let Some(series) = month.paid.meta.series(metric) {
            rows.push(SheetRow::month_row(
                key,
                "Paid",
                "Meta",
                "Meta Ads",
                metric,
                series.to_numbers(),
            ));
        }
    }
    for metric in PaidChannel::METRICS {
        if let Some(series) = month.paid.google.series(metric) {
            rows.push(SheetRow::month_row(
                key,
                "Paid",
                "Google",
                "Google Ads",
                metric,
                series.to_numbers(),
            ));
        }
    }
    for metric in PipeData::METRICS {
        if let Some(series) = month.pipe.series(metric) {
            rows.push(SheetRow::month_row(
                key,
                "Pipe",
                "Sales",
                "Pipeline",
                metric,
                series.to_numbers(),
            ));
        }
    }
}

fn encode_social(rows: &mut Vec<SheetRow>, key: MonthKey, month: &SocialMonth) {
    for (network, metrics) in &month.networks {
        for (metric, series) in metrics {
            rows.push(SheetRow::month_row(
                key,
                "Social",
                "Network",
                network,
                metric,
                series.to_numbers(),
            ));
        }
    }
}

fn encode_site(rows: &mut Vec<SheetRow>, key: MonthKey, month: &SiteMonth) {
    for metric in SiteKpis::METRICS {
        if let Some(value) = month.kpis.value(metric) {
            rows.push(SheetRow::month_row(
                key,
                "Site",
                "KPIs",
                "Geral",
                metric,
                scalar_row(value.as_number()),
            ));
        }
    }
    for (page, values) in &month.pages {
        rows.push(SheetRow::month_row(
            key,
            "Site",
            "Pages",
            page,
            "views",
            values.views.to_numbers(),
        ));
        rows.push(SheetRow::month_row(
            key,
            "Site",
            "Pages",
            page,
            "unique",
            values.unique.to_numbers(),
        ));
    }
    for (source, series) in &month.sources {
        rows.push(SheetRow::month_row(
            key,
            "Site",
            "Sources",
            source,
            "visits",
            series.to_numbers(),
        ));
    }
}

/// Reconstructs state from rows as a partial overlay on `current`: fields no
/// row mentions keep their prior values. Rows that fail domain validation
/// are skipped, never fatal.
pub fn decode(rows: &[SheetRow], current: &AppState, years: RangeInclusive<i32>) -> AppState {
    let mut state = current.clone();

    for row in rows {
        if row.is_registry_row() {
            apply_registry_row(&mut state, row);
            continue;
        }

        let Some(segment) = Segment::parse(&row.segment) else {
            debug!(target: "codec", segment = %row.segment, "skipping row with unknown segment");
            continue;
        };
        let year = row.year as i32;
        if !years.contains(&year) || row.month < 0 || row.month >= 12 {
            debug!(target: "codec", year = row.year, month = row.month, "skipping out-of-domain row");
            continue;
        }
        let key = MonthKey::new(segment, year, row.month as usize);
        ensure_month(&mut state, key);
        apply_month_row(&mut state, key, row);
    }

    state
}

fn apply_registry_row(state: &mut AppState, row: &SheetRow) {
    let hidden = row.weeks[0] != 0.0;
    match state
        .site_registry
        .iter_mut()
        .find(|entry| entry.name == row.item)
    {
        Some(entry) => entry.is_hidden = hidden,
        None => {
            let mut entry = SitePageRegistryEntry::new(row.item.clone());
            entry.is_hidden = hidden;
            state.site_registry.push(entry);
        }
    }
}

fn apply_month_row(state: &mut AppState, key: MonthKey, row: &SheetRow) {
    let series = WeekSeries::from_numbers(row.weeks);

    // Site page rows may predate the registry sentinel rows; recover the
    // entry implicitly so legacy exports stay importable.
    if key.segment == Segment::Site && row.category == "Site" && row.subcategory == "Pages" {
        let known = state
            .site_registry
            .iter()
            .any(|entry| entry.name == row.item);
        if !known {
            state
                .site_registry
                .push(SitePageRegistryEntry::new(row.item.clone()));
        }
    }

    let Some(record) = state.month_record_mut(key) else {
        return;
    };
    match record {
        MonthRecord::Funnel(month) => apply_funnel_row(month, row, series),
        MonthRecord::Social(month) => apply_social_row(month, row, series),
        MonthRecord::Site(month) => apply_site_row(month, row, series),
    }
}

fn apply_funnel_row(month: &mut FunnelMonth, row: &SheetRow, series: WeekSeries) {
    match (row.category.as_str(), row.subcategory.as_str()) {
        ("Organic", "Sources") => {
            month.organic.sources.insert(row.item.clone(), series);
        }
        ("Organic", "Landing") => {
            let landing = month.organic.landing.entry(row.item.clone()).or_default();
            match row.metric.as_str() {
                "leads" => landing.leads = series,
                "views" => landing.views = series,
                _ => {}
            }
        }
        ("Paid", "Meta") => {
            if let Some(slot) = month.paid.meta.series_mut(&row.metric) {
                *slot = series;
            }
        }
        ("Paid", "Google") => {
            if let Some(slot) = month.paid.google.series_mut(&row.metric) {
                *slot = series;
            }
        }
        ("Pipe", _) => {
            if let Some(slot) = month.pipe.series_mut(&row.metric) {
                *slot = series;
            }
        }
        _ => {}
    }
}

fn apply_social_row(month: &mut SocialMonth, row: &SheetRow, series: WeekSeries) {
    if row.category != "Social" {
        return;
    }
    let network = month.networks.entry(row.item.clone()).or_default();
    network.insert(row.metric.clone(), series);
    if !month.metrics.contains(&row.metric) {
        month.metrics.push(row.metric.clone());
    }
}

fn apply_site_row(month: &mut SiteMonth, row: &SheetRow, series: WeekSeries) {
    if row.category != "Site" {
        return;
    }
    match row.subcategory.as_str() {
        "KPIs" => {
            if let Some(value) = month.kpis.value_mut(&row.metric) {
                *value = row.weeks[0].into();
            }
        }
        "Pages" => {
            let values = month.pages.entry(row.item.clone()).or_default();
            match row.metric.as_str() {
                "views" => values.views = series,
                "unique" => values.unique = series,
                _ => {}
            }
        }
        "Sources" => {
            month.sources.insert(row.item.clone(), series);
        }
        _ => {}
    }
}
