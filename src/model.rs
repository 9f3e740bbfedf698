use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::numeric;

pub const WEEKS_PER_MONTH: usize = 5;
pub const MONTHS_PER_YEAR: usize = 12;

pub const MONTH_NAMES: [&str; MONTHS_PER_YEAR] = [
    "Janeiro",
    "Fevereiro",
    "Março",
    "Abril",
    "Maio",
    "Junho",
    "Julho",
    "Agosto",
    "Setembro",
    "Outubro",
    "Novembro",
    "Dezembro",
];

/// One spreadsheet-style cell: either a raw number or locale-formatted text
/// still pending a parse. Matches the original documents on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn as_number(&self) -> f64 {
        numeric::parse_number(Some(self))
    }
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Number(0.0)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

/// Ordered weekly cells, always exactly 5 (week 1..5 of the month).
/// Shorter payloads are zero-padded on deserialization, longer ones cut.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WeekSeries(Vec<CellValue>);

impl WeekSeries {
    pub fn zeros() -> Self {
        Self(vec![CellValue::default(); WEEKS_PER_MONTH])
    }

    pub fn from_cells(mut cells: Vec<CellValue>) -> Self {
        cells.resize(WEEKS_PER_MONTH, CellValue::default());
        Self(cells)
    }

    pub fn from_numbers(values: [f64; WEEKS_PER_MONTH]) -> Self {
        Self(values.into_iter().map(CellValue::Number).collect())
    }

    pub fn cells(&self) -> &[CellValue] {
        &self.0
    }

    pub fn get(&self, week: usize) -> Option<&CellValue> {
        self.0.get(week)
    }

    /// Out-of-range weeks are ignored.
    pub fn set(&mut self, week: usize, value: CellValue) {
        if let Some(cell) = self.0.get_mut(week) {
            *cell = value;
        }
    }

    pub fn to_numbers(&self) -> [f64; WEEKS_PER_MONTH] {
        let mut out = [0.0; WEEKS_PER_MONTH];
        for (slot, cell) in out.iter_mut().zip(&self.0) {
            *slot = cell.as_number();
        }
        out
    }

    pub fn sum(&self) -> f64 {
        numeric::sum(&self.0)
    }
}

impl Default for WeekSeries {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<'de> Deserialize<'de> for WeekSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let cells = Vec::<CellValue>::deserialize(deserializer)?;
        Ok(Self::from_cells(cells))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "Franquias")]
    Franquias,
    #[serde(rename = "White Label")]
    WhiteLabel,
    #[serde(rename = "Redes Sociais")]
    RedesSociais,
    #[serde(rename = "Site")]
    Site,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Funnel,
    Social,
    Site,
}

impl Segment {
    pub const ALL: [Segment; 4] = [
        Segment::Franquias,
        Segment::WhiteLabel,
        Segment::RedesSociais,
        Segment::Site,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Franquias => "Franquias",
            Segment::WhiteLabel => "White Label",
            Segment::RedesSociais => "Redes Sociais",
            Segment::Site => "Site",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|segment| segment.as_str() == value.trim())
    }

    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::Franquias | Segment::WhiteLabel => SegmentKind::Funnel,
            Segment::RedesSociais => SegmentKind::Social,
            Segment::Site => SegmentKind::Site,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMode {
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "annual")]
    Annual,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Weekly => ViewMode::Annual,
            ViewMode::Annual => ViewMode::Weekly,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandingPage {
    pub leads: WeekSeries,
    pub views: WeekSeries,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganicData {
    pub sources: BTreeMap<String, WeekSeries>,
    pub landing: BTreeMap<String, LandingPage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaidChannel {
    #[serde(rename = "investimento")]
    pub investment: WeekSeries,
    #[serde(rename = "alcance")]
    pub reach: WeekSeries,
    #[serde(rename = "impressoes")]
    pub impressions: WeekSeries,
    #[serde(rename = "cliques")]
    pub clicks: WeekSeries,
    #[serde(rename = "leadsPlan")]
    pub planned_leads: WeekSeries,
    #[serde(rename = "leads")]
    pub leads: WeekSeries,
}

impl PaidChannel {
    /// Field order matches the original document layout.
    pub const METRICS: [&'static str; 6] = [
        "investimento",
        "alcance",
        "impressoes",
        "cliques",
        "leadsPlan",
        "leads",
    ];

    pub fn series(&self, metric: &str) -> Option<&WeekSeries> {
        match metric {
            "investimento" => Some(&self.investment),
            "alcance" => Some(&self.reach),
            "impressoes" => Some(&self.impressions),
            "cliques" => Some(&self.clicks),
            "leadsPlan" => Some(&self.planned_leads),
            "leads" => Some(&self.leads),
            _ => None,
        }
    }

    pub fn series_mut(&mut self, metric: &str) -> Option<&mut WeekSeries> {
        match metric {
            "investimento" => Some(&mut self.investment),
            "alcance" => Some(&mut self.reach),
            "impressoes" => Some(&mut self.impressions),
            "cliques" => Some(&mut self.clicks),
            "leadsPlan" => Some(&mut self.planned_leads),
            "leads" => Some(&mut self.leads),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaidData {
    pub meta: PaidChannel,
    pub google: PaidChannel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipeData {
    /// Derived per week from organic + landing + paid leads; never edited
    /// directly. The store recomputes it before every read.
    pub leads: WeekSeries,
    #[serde(rename = "oportunidades")]
    pub opportunities: WeekSeries,
    #[serde(rename = "noShow")]
    pub no_show: WeekSeries,
    #[serde(rename = "perdidos")]
    pub lost: WeekSeries,
    #[serde(rename = "vendas")]
    pub sales: WeekSeries,
}

impl PipeData {
    pub const METRICS: [&'static str; 5] = ["leads", "oportunidades", "noShow", "perdidos", "vendas"];

    pub fn series(&self, metric: &str) -> Option<&WeekSeries> {
        match metric {
            "leads" => Some(&self.leads),
            "oportunidades" => Some(&self.opportunities),
            "noShow" => Some(&self.no_show),
            "perdidos" => Some(&self.lost),
            "vendas" => Some(&self.sales),
            _ => None,
        }
    }

    pub fn series_mut(&mut self, metric: &str) -> Option<&mut WeekSeries> {
        match metric {
            "leads" => Some(&mut self.leads),
            "oportunidades" => Some(&mut self.opportunities),
            "noShow" => Some(&mut self.no_show),
            "perdidos" => Some(&mut self.lost),
            "vendas" => Some(&mut self.sales),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelMonth {
    pub weeks: u8,
    pub organic: OrganicData,
    pub paid: PaidData,
    pub pipe: PipeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialMonth {
    pub weeks: u8,
    /// Display order of the metric columns. Every network's keys are a
    /// subset of this list.
    pub metrics: Vec<String>,
    pub networks: BTreeMap<String, BTreeMap<String, WeekSeries>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteKpis {
    pub visitors: CellValue,
    pub unique: CellValue,
    #[serde(rename = "bounceRate")]
    pub bounce_rate: CellValue,
    #[serde(rename = "avgTime")]
    pub avg_time: CellValue,
}

impl SiteKpis {
    pub const METRICS: [&'static str; 4] = ["visitors", "unique", "bounceRate", "avgTime"];

    pub fn value(&self, metric: &str) -> Option<&CellValue> {
        match metric {
            "visitors" => Some(&self.visitors),
            "unique" => Some(&self.unique),
            "bounceRate" => Some(&self.bounce_rate),
            "avgTime" => Some(&self.avg_time),
            _ => None,
        }
    }

    pub fn value_mut(&mut self, metric: &str) -> Option<&mut CellValue> {
        match metric {
            "visitors" => Some(&mut self.visitors),
            "unique" => Some(&mut self.unique),
            "bounceRate" => Some(&mut self.bounce_rate),
            "avgTime" => Some(&mut self.avg_time),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SitePageValues {
    pub views: WeekSeries,
    pub unique: WeekSeries,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteMonth {
    pub weeks: u8,
    pub kpis: SiteKpis,
    /// Weekly metrics only; visibility lives in the global registry.
    pub pages: BTreeMap<String, SitePageValues>,
    pub sources: BTreeMap<String, WeekSeries>,
}

/// Tagged union over the three segment kinds. Untagged on the wire: the
/// required fields of each shape are disjoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MonthRecord {
    Funnel(FunnelMonth),
    Social(SocialMonth),
    Site(SiteMonth),
}

impl MonthRecord {
    pub fn as_funnel(&self) -> Option<&FunnelMonth> {
        match self {
            MonthRecord::Funnel(month) => Some(month),
            _ => None,
        }
    }

    pub fn as_funnel_mut(&mut self) -> Option<&mut FunnelMonth> {
        match self {
            MonthRecord::Funnel(month) => Some(month),
            _ => None,
        }
    }

    pub fn as_social(&self) -> Option<&SocialMonth> {
        match self {
            MonthRecord::Social(month) => Some(month),
            _ => None,
        }
    }

    pub fn as_social_mut(&mut self) -> Option<&mut SocialMonth> {
        match self {
            MonthRecord::Social(month) => Some(month),
            _ => None,
        }
    }

    pub fn as_site(&self) -> Option<&SiteMonth> {
        match self {
            MonthRecord::Site(month) => Some(month),
            _ => None,
        }
    }

    pub fn as_site_mut(&mut self) -> Option<&mut SiteMonth> {
        match self {
            MonthRecord::Site(month) => Some(month),
            _ => None,
        }
    }
}

/// Global (cross-month, cross-year) catalogue entry for a known site page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitePageRegistryEntry {
    pub name: String,
    #[serde(rename = "isHidden", default)]
    pub is_hidden: bool,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
}

impl SitePageRegistryEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_hidden: false,
            created_at: Some(Utc::now().to_rfc3339()),
        }
    }
}

/// Addresses one month record explicitly instead of through the ambient UI
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthKey {
    pub segment: Segment,
    pub year: i32,
    pub month: usize,
}

impl MonthKey {
    pub fn new(segment: Segment, year: i32, month: usize) -> Self {
        Self {
            segment,
            year,
            month,
        }
    }
}

pub type SegmentData = BTreeMap<Segment, BTreeMap<i32, Vec<MonthRecord>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub year: i32,
    pub month: usize,
    pub segment: Segment,
    pub mode: ViewMode,
    #[serde(default)]
    pub data: SegmentData,
    #[serde(rename = "siteRegistry", default)]
    pub site_registry: Vec<SitePageRegistryEntry>,
    #[serde(rename = "schemaVersion", default = "initial_schema_version")]
    pub schema_version: u32,
}

fn initial_schema_version() -> u32 {
    1
}

impl AppState {
    /// Fresh state with generated defaults for every configured year and
    /// segment, selection pointing at the current month (or the first
    /// configured year when today is out of range).
    pub fn initial(years: std::ops::RangeInclusive<i32>) -> Self {
        let now = Utc::now();
        let year = if years.contains(&now.year()) {
            now.year()
        } else {
            *years.start()
        };
        Self {
            year,
            month: now.month0() as usize,
            segment: Segment::Franquias,
            mode: ViewMode::Weekly,
            data: generate_initial_data(years),
            site_registry: Vec::new(),
            schema_version: crate::migrate::CURRENT_SCHEMA_VERSION,
        }
    }

    pub fn month_record(&self, key: MonthKey) -> Option<&MonthRecord> {
        self.data
            .get(&key.segment)?
            .get(&key.year)?
            .get(key.month)
    }

    pub fn month_record_mut(&mut self, key: MonthKey) -> Option<&mut MonthRecord> {
        self.data
            .get_mut(&key.segment)?
            .get_mut(&key.year)?
            .get_mut(key.month)
    }
}

pub fn default_funnel_month() -> FunnelMonth {
    let mut sources = BTreeMap::new();
    for name in ["Google", "Bing", "Site"] {
        sources.insert(name.to_string(), WeekSeries::zeros());
    }
    let mut landing = BTreeMap::new();
    landing.insert("LP Principal".to_string(), LandingPage::default());

    FunnelMonth {
        weeks: WEEKS_PER_MONTH as u8,
        organic: OrganicData { sources, landing },
        paid: PaidData::default(),
        pipe: PipeData::default(),
    }
}

pub fn default_social_month() -> SocialMonth {
    let metrics: Vec<String> = ["Alcance", "Impressões", "Cliques"]
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut networks = BTreeMap::new();
    for network in ["Instagram", "Facebook"] {
        let series: BTreeMap<String, WeekSeries> = metrics
            .iter()
            .map(|metric| (metric.clone(), WeekSeries::zeros()))
            .collect();
        networks.insert(network.to_string(), series);
    }
    SocialMonth {
        weeks: WEEKS_PER_MONTH as u8,
        metrics,
        networks,
    }
}

pub fn default_site_month() -> SiteMonth {
    SiteMonth {
        weeks: WEEKS_PER_MONTH as u8,
        kpis: SiteKpis::default(),
        pages: BTreeMap::new(),
        sources: BTreeMap::new(),
    }
}

pub fn default_month_for(segment: Segment) -> MonthRecord {
    match segment.kind() {
        SegmentKind::Funnel => MonthRecord::Funnel(default_funnel_month()),
        SegmentKind::Social => MonthRecord::Social(default_social_month()),
        SegmentKind::Site => MonthRecord::Site(default_site_month()),
    }
}

pub fn default_year_for(segment: Segment) -> Vec<MonthRecord> {
    (0..MONTHS_PER_YEAR)
        .map(|_| default_month_for(segment))
        .collect()
}

/// Populates every configured (segment, year) pair with 12 zeroed records.
/// Each series is freshly allocated; nothing is aliased across entries.
pub fn generate_initial_data(years: std::ops::RangeInclusive<i32>) -> SegmentData {
    let mut data = SegmentData::new();
    for segment in Segment::ALL {
        let mut by_year = BTreeMap::new();
        for year in years.clone() {
            by_year.insert(year, default_year_for(segment));
        }
        data.insert(segment, by_year);
    }
    data
}
