use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::model::{
    default_month_for, default_year_for, AppState, CellValue, FunnelMonth, LandingPage, MonthKey,
    MonthRecord, Segment, SitePageRegistryEntry, ViewMode, WeekSeries, WEEKS_PER_MONTH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidChannelKind {
    Meta,
    Google,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingMetric {
    Leads,
    Views,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitePageMetric {
    Views,
    Unique,
}

/// Exclusive owner of the [`AppState`] document. Every nested change goes
/// through [`DashboardStore::mutate`], which clones the whole tree, patches
/// the clone and swaps the root; consumers only ever see snapshots.
pub struct DashboardStore {
    state: Mutex<AppState>,
    revision: watch::Sender<u64>,
}

impl DashboardStore {
    pub fn new(state: AppState) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Mutex::new(state),
            revision,
        }
    }

    /// Receiver for the mutation counter; the sync engine debounces on it.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Read snapshot with derived fields recomputed. `pipe.leads` is never
    /// stale in what consumers see.
    pub fn snapshot(&self) -> AppState {
        let mut state = self.state.lock().clone();
        recompute_derived(&mut state);
        state
    }

    /// Replaces the whole document (initial load, spreadsheet import).
    pub fn install(&self, mut state: AppState) {
        recompute_derived(&mut state);
        *self.state.lock() = state;
        self.bump();
    }

    /// Month key derived from the ambient UI selection, for callers that do
    /// not address a month explicitly.
    pub fn current_key(&self) -> MonthKey {
        let state = self.state.lock();
        MonthKey::new(state.segment, state.year, state.month)
    }

    pub fn select_year(&self, year: i32) {
        self.set_field(|state| state.year = year);
    }

    pub fn select_month(&self, month: usize) {
        if month >= crate::model::MONTHS_PER_YEAR {
            return;
        }
        self.set_field(|state| state.month = month);
    }

    pub fn select_segment(&self, segment: Segment) {
        self.set_field(|state| state.segment = segment);
    }

    pub fn toggle_view_mode(&self) {
        self.set_field(|state| state.mode = state.mode.toggled());
    }

    pub fn view_mode(&self) -> ViewMode {
        self.state.lock().mode
    }

    /// Clone-and-patch: deep-clones the state, applies `patch` to the clone,
    /// installs the result. The lock is held across the whole cycle so
    /// concurrent callers cannot interleave and drop each other's patch.
    /// Correctness over performance; the document is small.
    pub fn mutate(&self, patch: impl FnOnce(&mut AppState)) {
        let mut state = self.state.lock();
        let mut next = state.clone();
        patch(&mut next);
        *state = next;
        drop(state);
        self.bump();
    }

    pub fn update_organic_source(
        &self,
        key: MonthKey,
        source: &str,
        week: usize,
        value: CellValue,
    ) {
        self.with_funnel(key, |month| {
            if let Some(series) = month.organic.sources.get_mut(source) {
                series.set(week, value);
            }
        });
    }

    pub fn update_landing_page(
        &self,
        key: MonthKey,
        page: &str,
        metric: LandingMetric,
        week: usize,
        value: CellValue,
    ) {
        self.with_funnel(key, |month| {
            if let Some(landing) = month.organic.landing.get_mut(page) {
                let series = match metric {
                    LandingMetric::Leads => &mut landing.leads,
                    LandingMetric::Views => &mut landing.views,
                };
                series.set(week, value);
            }
        });
    }

    pub fn update_paid_metric(
        &self,
        key: MonthKey,
        channel: PaidChannelKind,
        metric: &str,
        week: usize,
        value: CellValue,
    ) {
        self.with_funnel(key, |month| {
            let channel = match channel {
                PaidChannelKind::Meta => &mut month.paid.meta,
                PaidChannelKind::Google => &mut month.paid.google,
            };
            if let Some(series) = channel.series_mut(metric) {
                series.set(week, value);
            }
        });
    }

    /// `pipe.leads` is derived; attempts to edit it are dropped.
    pub fn update_pipe_metric(&self, key: MonthKey, metric: &str, week: usize, value: CellValue) {
        if metric == "leads" {
            debug!(target: "store", "ignoring direct edit of derived pipe.leads");
            return;
        }
        self.with_funnel(key, |month| {
            if let Some(series) = month.pipe.series_mut(metric) {
                series.set(week, value);
            }
        });
    }

    pub fn set_active_weeks(&self, key: MonthKey, weeks: u8) {
        let weeks = weeks.min(WEEKS_PER_MONTH as u8);
        self.mutate(|state| {
            ensure_month(state, key);
            if let Some(record) = state.month_record_mut(key) {
                match record {
                    MonthRecord::Funnel(month) => month.weeks = weeks,
                    MonthRecord::Social(month) => month.weeks = weeks,
                    MonthRecord::Site(month) => month.weeks = weeks,
                }
            }
        });
    }

    pub fn add_traffic_source(&self, key: MonthKey, name: &str) {
        let name = name.trim().to_string();
        if name.is_empty() {
            return;
        }
        self.with_funnel(key, move |month| {
            month
                .organic
                .sources
                .entry(name)
                .or_insert_with(WeekSeries::zeros);
        });
    }

    pub fn remove_traffic_source(&self, key: MonthKey, name: &str) {
        self.with_funnel(key, |month| {
            month.organic.sources.remove(name);
        });
    }

    pub fn add_landing_page(&self, key: MonthKey, name: &str) {
        let name = name.trim().to_string();
        if name.is_empty() {
            return;
        }
        self.with_funnel(key, move |month| {
            month
                .organic
                .landing
                .entry(name)
                .or_insert_with(LandingPage::default);
        });
    }

    pub fn remove_landing_page(&self, key: MonthKey, name: &str) {
        self.with_funnel(key, |month| {
            month.organic.landing.remove(name);
        });
    }

    pub fn update_social_metric(
        &self,
        key: MonthKey,
        network: &str,
        metric: &str,
        week: usize,
        value: CellValue,
    ) {
        self.with_social(key, |month| {
            if let Some(series) = month
                .networks
                .get_mut(network)
                .and_then(|metrics| metrics.get_mut(metric))
            {
                series.set(week, value);
            }
        });
    }

    pub fn add_social_network(&self, key: MonthKey, name: &str) {
        let name = name.trim().to_string();
        if name.is_empty() {
            return;
        }
        self.with_social(key, move |month| {
            if month.networks.contains_key(&name) {
                return;
            }
            let series = month
                .metrics
                .iter()
                .map(|metric| (metric.clone(), WeekSeries::zeros()))
                .collect();
            month.networks.insert(name, series);
        });
    }

    pub fn remove_social_network(&self, key: MonthKey, name: &str) {
        self.with_social(key, |month| {
            month.networks.remove(name);
        });
    }

    /// Adding a metric backfills a zero series into every existing network
    /// within the same mutation.
    pub fn add_social_metric(&self, key: MonthKey, name: &str) {
        let name = name.trim().to_string();
        if name.is_empty() {
            return;
        }
        self.with_social(key, move |month| {
            if month.metrics.iter().any(|metric| *metric == name) {
                return;
            }
            month.metrics.push(name.clone());
            for network in month.networks.values_mut() {
                network.entry(name.clone()).or_insert_with(WeekSeries::zeros);
            }
        });
    }

    /// Removing a metric drops its series from every network atomically.
    pub fn remove_social_metric(&self, key: MonthKey, name: &str) {
        self.with_social(key, |month| {
            month.metrics.retain(|metric| metric != name);
            for network in month.networks.values_mut() {
                network.remove(name);
            }
        });
    }

    pub fn update_site_kpi(&self, key: MonthKey, metric: &str, value: CellValue) {
        self.with_site(key, |month, _| {
            if let Some(slot) = month.kpis.value_mut(metric) {
                *slot = value;
            }
        });
    }

    /// Per-month page series are created lazily; the page itself must be in
    /// the global registry (callers go through [`add_site_page`] first).
    pub fn update_site_page_metric(
        &self,
        key: MonthKey,
        page: &str,
        metric: SitePageMetric,
        week: usize,
        value: CellValue,
    ) {
        let page = page.to_string();
        self.with_site(key, move |month, _| {
            let values = month.pages.entry(page).or_default();
            let series = match metric {
                SitePageMetric::Views => &mut values.views,
                SitePageMetric::Unique => &mut values.unique,
            };
            series.set(week, value);
        });
    }

    pub fn update_site_source(&self, key: MonthKey, source: &str, week: usize, value: CellValue) {
        self.with_site(key, |month, _| {
            if let Some(series) = month.sources.get_mut(source) {
                series.set(week, value);
            }
        });
    }

    pub fn add_site_source(&self, key: MonthKey, name: &str) {
        let name = name.trim().to_string();
        if name.is_empty() {
            return;
        }
        self.with_site(key, move |month, _| {
            month.sources.entry(name).or_insert_with(WeekSeries::zeros);
        });
    }

    pub fn remove_site_source(&self, key: MonthKey, name: &str) {
        self.with_site(key, |month, _| {
            month.sources.remove(name);
        });
    }

    /// Registers the page globally and materializes its series in the given
    /// month. Duplicate names are a no-op.
    pub fn add_site_page(&self, key: MonthKey, name: &str) {
        let name = name.trim().to_string();
        if name.is_empty() {
            return;
        }
        self.with_site(key, move |month, registry| {
            if !registry.iter().any(|entry| entry.name == name) {
                registry.push(SitePageRegistryEntry::new(name.clone()));
            }
            month.pages.entry(name).or_default();
        });
    }

    /// Deletes the registry entry (hiding the page everywhere) and the data
    /// of the addressed month only. Other months keep their numbers under
    /// the now-orphaned name.
    pub fn remove_site_page(&self, key: MonthKey, name: &str) {
        self.with_site(key, |month, registry| {
            registry.retain(|entry| entry.name != name);
            month.pages.remove(name);
        });
    }

    /// Visibility is a registry-level property; toggling hides the page in
    /// every month without deleting data.
    pub fn toggle_site_page_visibility(&self, name: &str) {
        self.mutate(|state| {
            if let Some(entry) = state
                .site_registry
                .iter_mut()
                .find(|entry| entry.name == name)
            {
                entry.is_hidden = !entry.is_hidden;
            }
        });
    }

    fn set_field(&self, set: impl FnOnce(&mut AppState)) {
        set(&mut self.state.lock());
        self.bump();
    }

    fn with_funnel(&self, key: MonthKey, patch: impl FnOnce(&mut FunnelMonth)) {
        self.mutate(|state| {
            ensure_month(state, key);
            if let Some(month) = state.month_record_mut(key).and_then(MonthRecord::as_funnel_mut) {
                patch(month);
            }
        });
    }

    fn with_social(&self, key: MonthKey, patch: impl FnOnce(&mut crate::model::SocialMonth)) {
        self.mutate(|state| {
            ensure_month(state, key);
            if let Some(month) = state.month_record_mut(key).and_then(MonthRecord::as_social_mut) {
                patch(month);
            }
        });
    }

    fn with_site(
        &self,
        key: MonthKey,
        patch: impl FnOnce(&mut crate::model::SiteMonth, &mut Vec<SitePageRegistryEntry>),
    ) {
        self.mutate(|state| {
            ensure_month(state, key);
            let AppState {
                data,
                site_registry,
                ..
            } = state;
            let record = data
                .get_mut(&key.segment)
                .and_then(|by_year| by_year.get_mut(&key.year))
                .and_then(|months| months.get_mut(key.month));
            if let Some(month) = record.and_then(MonthRecord::as_site_mut) {
                patch(month, site_registry);
            }
        });
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// Materializes `data[segment][year]` with defaults before any read, keeping
/// the 12-records-per-year invariant.
pub fn ensure_month(state: &mut AppState, key: MonthKey) {
    let by_year = state.data.entry(key.segment).or_default();
    let months = by_year
        .entry(key.year)
        .or_insert_with(|| default_year_for(key.segment));
    while months.len() < crate::model::MONTHS_PER_YEAR {
        months.push(default_month_for(key.segment));
    }
}

/// Per-week leads pipeline input: every organic source, every landing page's
/// leads, and both paid channels.
pub fn compute_auto_leads(month: &FunnelMonth) -> WeekSeries {
    let mut weeks = [0.0; WEEKS_PER_MONTH];
    for series in month.organic.sources.values() {
        for (slot, value) in weeks.iter_mut().zip(series.to_numbers()) {
            *slot += value;
        }
    }
    for landing in month.organic.landing.values() {
        for (slot, value) in weeks.iter_mut().zip(landing.leads.to_numbers()) {
            *slot += value;
        }
    }
    for channel in [&month.paid.meta, &month.paid.google] {
        for (slot, value) in weeks.iter_mut().zip(channel.leads.to_numbers()) {
            *slot += value;
        }
    }
    WeekSeries::from_numbers(weeks)
}

pub fn recompute_derived(state: &mut AppState) {
    for by_year in state.data.values_mut() {
        for months in by_year.values_mut() {
            for record in months.iter_mut() {
                if let MonthRecord::Funnel(month) = record {
                    month.pipe.leads = compute_auto_leads(month);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::generate_initial_data;

    fn store() -> DashboardStore {
        let mut state = AppState::initial(2024..=2026);
        state.year = 2025;
        state.month = 0;
        DashboardStore::new(state)
    }

    fn funnel_key() -> MonthKey {
        MonthKey::new(Segment::Franquias, 2025, 0)
    }

    fn social_key() -> MonthKey {
        MonthKey::new(Segment::RedesSociais, 2025, 0)
    }

    fn site_key() -> MonthKey {
        MonthKey::new(Segment::Site, 2025, 0)
    }

    #[test]
    fn selection_ops_replace_single_fields() {
        let store = store();
        store.select_year(2026);
        store.select_month(5);
        store.select_segment(Segment::Site);
        store.toggle_view_mode();
        let state = store.snapshot();
        assert_eq!(state.year, 2026);
        assert_eq!(state.month, 5);
        assert_eq!(state.segment, Segment::Site);
        assert_eq!(state.mode, ViewMode::Annual);
        assert_eq!(store.current_key(), MonthKey::new(Segment::Site, 2026, 5));
    }

    #[test]
    fn out_of_range_month_selection_is_ignored() {
        let store = store();
        store.select_month(12);
        assert_eq!(store.snapshot().month, 0);
    }

    #[test]
    fn derived_pipe_leads_sums_all_lead_inputs() {
        let store = store();
        let key = funnel_key();
        store.update_organic_source(key, "Google", 0, CellValue::Number(1.0));
        store.update_organic_source(key, "Google", 1, CellValue::Number(2.0));
        store.update_landing_page(key, "LP Principal", LandingMetric::Leads, 2, 3.0.into());
        store.update_paid_metric(key, PaidChannelKind::Meta, "leads", 0, 1.0.into());
        store.update_paid_metric(key, PaidChannelKind::Google, "leads", 1, 1.0.into());

        let snapshot = store.snapshot();
        let month = snapshot.month_record(key).unwrap().as_funnel().unwrap();
        assert_eq!(month.pipe.leads.to_numbers(), [2.0, 3.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn derived_recomputation_is_idempotent() {
        let store = store();
        let key = funnel_key();
        store.update_organic_source(key, "Bing", 3, CellValue::Text("1.000".into()));
        let first = store.snapshot();
        let second = store.snapshot();
        let leads = |state: &AppState| {
            state
                .month_record(key)
                .unwrap()
                .as_funnel()
                .unwrap()
                .pipe
                .leads
                .clone()
        };
        assert_eq!(leads(&first), leads(&second));
    }

    #[test]
    fn direct_edit_of_derived_leads_is_dropped() {
        let store = store();
        let key = funnel_key();
        store.update_pipe_metric(key, "leads", 0, 99.0.into());
        let snapshot = store.snapshot();
        let month = snapshot.month_record(key).unwrap().as_funnel().unwrap();
        assert_eq!(month.pipe.leads.to_numbers(), [0.0; 5]);
    }

    #[test]
    fn duplicate_add_and_missing_remove_are_noops() {
        let store = store();
        let key = funnel_key();
        store.add_traffic_source(key, "Google");
        store.update_organic_source(key, "Google", 0, 7.0.into());
        store.add_traffic_source(key, "Google");
        store.remove_traffic_source(key, "Nunca Existiu");

        let snapshot = store.snapshot();
        let month = snapshot.month_record(key).unwrap().as_funnel().unwrap();
        assert_eq!(month.organic.sources["Google"].to_numbers()[0], 7.0);
        assert_eq!(month.organic.sources.len(), 3);
    }

    #[test]
    fn social_metric_add_backfills_every_network() {
        let store = store();
        let key = social_key();
        store.add_social_network(key, "TikTok");
        store.add_social_metric(key, "Seguidores");

        let snapshot = store.snapshot();
        let month = snapshot.month_record(key).unwrap().as_social().unwrap();
        assert!(month.metrics.contains(&"Seguidores".to_string()));
        for network in month.networks.values() {
            assert!(network.contains_key("Seguidores"));
        }

        store.remove_social_metric(key, "Seguidores");
        let snapshot = store.snapshot();
        let month = snapshot.month_record(key).unwrap().as_social().unwrap();
        assert!(!month.metrics.contains(&"Seguidores".to_string()));
        for network in month.networks.values() {
            assert!(!network.contains_key("Seguidores"));
        }
    }

    #[test]
    fn new_social_network_covers_current_metrics() {
        let store = store();
        let key = social_key();
        store.add_social_network(key, "LinkedIn");
        let snapshot = store.snapshot();
        let month = snapshot.month_record(key).unwrap().as_social().unwrap();
        let network = &month.networks["LinkedIn"];
        assert_eq!(network.len(), month.metrics.len());
    }

    #[test]
    fn site_page_registry_add_remove_round_trip() {
        let store = store();
        let key = site_key();
        store.add_site_page(key, "Pricing");
        store.update_site_page_metric(key, "Pricing", SitePageMetric::Views, 0, 10.0.into());

        let snapshot = store.snapshot();
        assert!(snapshot.site_registry.iter().any(|e| e.name == "Pricing"));
        let month = snapshot.month_record(key).unwrap().as_site().unwrap();
        assert!(month.pages.contains_key("Pricing"));

        store.remove_site_page(key, "Pricing");
        let snapshot = store.snapshot();
        assert!(!snapshot.site_registry.iter().any(|e| e.name == "Pricing"));
        let month = snapshot.month_record(key).unwrap().as_site().unwrap();
        assert!(!month.pages.contains_key("Pricing"));
    }

    #[test]
    fn removing_site_page_keeps_other_months_data() {
        let store = store();
        let january = site_key();
        let february = MonthKey::new(Segment::Site, 2025, 1);
        store.add_site_page(january, "Blog");
        store.update_site_page_metric(february, "Blog", SitePageMetric::Views, 0, 5.0.into());

        store.remove_site_page(january, "Blog");
        let snapshot = store.snapshot();
        let feb = snapshot.month_record(february).unwrap().as_site().unwrap();
        assert!(feb.pages.contains_key("Blog"));
    }

    #[test]
    fn visibility_toggle_is_registry_level() {
        let store = store();
        store.add_site_page(site_key(), "Home");
        store.toggle_site_page_visibility("Home");
        let snapshot = store.snapshot();
        let entry = snapshot
            .site_registry
            .iter()
            .find(|e| e.name == "Home")
            .unwrap();
        assert!(entry.is_hidden);
        let month = snapshot.month_record(site_key()).unwrap().as_site().unwrap();
        assert!(month.pages.contains_key("Home"));
    }

    #[test]
    fn mutations_materialize_missing_years_with_defaults() {
        let mut state = AppState::initial(2024..=2026);
        state.data = generate_initial_data(2024..=2024);
        let store = DashboardStore::new(state);
        let key = MonthKey::new(Segment::Franquias, 2026, 4);
        store.update_organic_source(key, "Google", 0, 3.0.into());

        let snapshot = store.snapshot();
        let months = &snapshot.data[&Segment::Franquias][&2026];
        assert_eq!(months.len(), crate::model::MONTHS_PER_YEAR);
        let month = snapshot.month_record(key).unwrap().as_funnel().unwrap();
        assert_eq!(month.organic.sources["Google"].to_numbers()[0], 3.0);
    }

    #[test]
    fn concurrent_mutations_are_never_lost() {
        let store = std::sync::Arc::new(store());
        let key = funnel_key();
        let threads: Vec<_> = ["A", "B"]
            .into_iter()
            .map(|prefix| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.add_traffic_source(key, &format!("{prefix}-{i}"));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let snapshot = store.snapshot();
        let month = snapshot.month_record(key).unwrap().as_funnel().unwrap();
        for prefix in ["A", "B"] {
            for i in 0..50 {
                assert!(month.organic.sources.contains_key(&format!("{prefix}-{i}")));
            }
        }
    }

    #[test]
    fn every_mutation_bumps_the_revision() {
        let store = store();
        let mut rx = store.subscribe();
        let before = *rx.borrow_and_update();
        store.select_year(2024);
        store.add_traffic_source(funnel_key(), "Direto");
        assert_eq!(*rx.borrow_and_update(), before + 2);
    }
}
