//! Derived ratios for the funnel views. Pure functions over a snapshot; all
//! divisions go through `safe_divide` so empty months never produce NaN.

use serde::Serialize;

use crate::model::{FunnelMonth, PaidChannel, WEEKS_PER_MONTH};
use crate::numeric::safe_divide;
use crate::store::compute_auto_leads;

#[derive(Debug, Clone, Serialize)]
pub struct ChannelKpis {
    pub investment: f64,
    pub leads: f64,
    /// Cost per lead.
    pub cpl: f64,
    /// Click-through rate, percent of impressions.
    pub ctr: f64,
    /// Click-to-lead conversion, percent.
    pub conversion_rate: f64,
    pub weekly_cpl: [f64; WEEKS_PER_MONTH],
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelSummary {
    pub total_investment: f64,
    pub total_leads: f64,
    pub opportunities: f64,
    pub sales: f64,
    /// Cost of acquisition: paid investment over closed sales.
    pub cac: f64,
    /// Cost per opportunity.
    pub cpo: f64,
    pub meta: ChannelKpis,
    pub google: ChannelKpis,
}

pub fn channel_kpis(channel: &PaidChannel) -> ChannelKpis {
    let investment = channel.investment.sum();
    let leads = channel.leads.sum();
    let clicks = channel.clicks.sum();
    let impressions = channel.impressions.sum();

    let invest_weeks = channel.investment.to_numbers();
    let lead_weeks = channel.leads.to_numbers();
    let mut weekly_cpl = [0.0; WEEKS_PER_MONTH];
    for ((slot, invested), week_leads) in weekly_cpl.iter_mut().zip(invest_weeks).zip(lead_weeks) {
        *slot = safe_divide(invested, week_leads);
    }

    ChannelKpis {
        investment,
        leads,
        cpl: safe_divide(investment, leads),
        ctr: safe_divide(clicks, impressions) * 100.0,
        conversion_rate: safe_divide(leads, clicks) * 100.0,
        weekly_cpl,
    }
}

pub fn funnel_summary(month: &FunnelMonth) -> FunnelSummary {
    let meta = channel_kpis(&month.paid.meta);
    let google = channel_kpis(&month.paid.google);
    let total_investment = meta.investment + google.investment;
    let total_leads = compute_auto_leads(month).sum();
    let opportunities = month.pipe.opportunities.sum();
    let sales = month.pipe.sales.sum();

    FunnelSummary {
        total_investment,
        total_leads,
        opportunities,
        sales,
        cac: safe_divide(total_investment, sales),
        cpo: safe_divide(total_investment, opportunities),
        meta,
        google,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{default_funnel_month, CellValue};

    fn sample_month() -> FunnelMonth {
        let mut month = default_funnel_month();
        month.paid.meta.investment.set(0, CellValue::Number(100.0));
        month.paid.meta.investment.set(1, CellValue::Number(100.0));
        month.paid.meta.leads.set(0, CellValue::Number(4.0));
        month.paid.meta.clicks.set(0, CellValue::Number(50.0));
        month.paid.meta.impressions.set(0, CellValue::Number(1000.0));
        month.pipe.sales.set(0, CellValue::Number(2.0));
        month.pipe.opportunities.set(0, CellValue::Number(8.0));
        month
    }

    #[test]
    fn channel_ratios_use_safe_division() {
        let month = sample_month();
        let kpis = channel_kpis(&month.paid.meta);
        assert_eq!(kpis.cpl, 50.0);
        assert_eq!(kpis.ctr, 5.0);
        assert_eq!(kpis.conversion_rate, 8.0);
        assert_eq!(kpis.weekly_cpl[0], 25.0);
        // No leads in week 2 despite investment: guarded to 0.
        assert_eq!(kpis.weekly_cpl[1], 0.0);

        let empty = channel_kpis(&PaidChannel::default());
        assert_eq!(empty.cpl, 0.0);
        assert_eq!(empty.ctr, 0.0);
    }

    #[test]
    fn summary_aggregates_both_channels() {
        let month = sample_month();
        let summary = funnel_summary(&month);
        assert_eq!(summary.total_investment, 200.0);
        assert_eq!(summary.cac, 100.0);
        assert_eq!(summary.cpo, 25.0);
        assert_eq!(summary.total_leads, 4.0);
    }
}
