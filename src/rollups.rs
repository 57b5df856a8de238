use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::dates::YearMonth;
use crate::earnings::{Amounts, entry_amounts};
use crate::fx::{Clock, ExchangeRateCache, FxError, RateSource};
use crate::hierarchy::{top_level_clients, top_level_of};
use crate::models::{Client, Relations};
use crate::visibility::TenantView;

/// Month and top-level client name selections. Empty sets match everything.
#[derive(Debug, Clone, Default)]
pub struct SummaryFilter {
    pub months: BTreeSet<YearMonth>,
    pub clients: BTreeSet<String>,
}

impl SummaryFilter {
    fn accepts_month(&self, month: &YearMonth) -> bool {
        self.months.is_empty() || self.months.contains(month)
    }

    fn accepts_client(&self, name: &str) -> bool {
        self.clients.is_empty() || self.clients.contains(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildSummary {
    pub client_id: String,
    pub client_name: String,
    pub totals: Amounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub month: YearMonth,
    pub parent_id: String,
    pub parent_name: String,
    pub own: Amounts,
    pub children: Vec<ChildSummary>,
    pub total: Amounts,
    pub pending: f64,
    /// Set when more was paid than earned for this month.
    pub overpaid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GrandTotals {
    pub earnings: f64,
    pub paid: f64,
    pub pending: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertedTotals {
    pub currency: String,
    pub rate: f64,
    pub earnings: f64,
    pub paid: f64,
    pub pending: f64,
    /// Set when the rate lookup failed and the figures are unconverted.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryResult {
    pub rows: Vec<MonthlySummary>,
    pub totals: GrandTotals,
    /// Every month with visible entries, newest first.
    pub months: Vec<YearMonth>,
    pub parent_names: Vec<String>,
}

type BucketKey<'a> = (YearMonth, &'a str);

pub fn compute_monthly_summary(
    tenant_id: &str,
    relations: &Relations,
    filter: &SummaryFilter,
) -> SummaryResult {
    let view = TenantView::new(relations, tenant_id);
    let buckets = bucket_entries(&view);

    let months: Vec<YearMonth> = buckets
        .keys()
        .map(|(month, _)| *month)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .rev()
        .collect();

    let mut parents = top_level_clients(&view);
    parents.sort_by(|a, b| (&a.name, &a.id).cmp(&(&b.name, &b.id)));
    let members = children_by_top_level(&view);

    let parent_names: Vec<String> = parents
        .iter()
        .map(|parent| parent.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut rows = Vec::new();
    for month in &months {
        if !filter.accepts_month(month) {
            continue;
        }
        for parent in &parents {
            if !filter.accepts_client(&parent.name) {
                continue;
            }
            let children = members.get(parent.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            rows.push(summarize_parent(*month, parent, children, &buckets));
        }
    }

    let totals = grand_totals(&rows);
    tracing::debug!(
        tenant_id,
        rows = rows.len(),
        earnings = totals.earnings,
        "Computed monthly summary"
    );

    SummaryResult {
        rows,
        totals,
        months,
        parent_names,
    }
}

fn bucket_entries<'a>(view: &TenantView<'a>) -> BTreeMap<BucketKey<'a>, Amounts> {
    let mut buckets: BTreeMap<BucketKey<'a>, Amounts> = BTreeMap::new();
    for joined in view.joined_entries() {
        let Some(date) = joined.entry.date else {
            tracing::debug!(entry_id = %joined.entry.id, "Skipping entry without a date");
            continue;
        };
        let key = (YearMonth::of(date), joined.client.id.as_str());
        *buckets.entry(key).or_default() += entry_amounts(joined.entry, joined.client);
    }
    buckets
}

fn children_by_top_level<'a>(view: &TenantView<'a>) -> HashMap<&'a str, Vec<&'a Client>> {
    let mut members: HashMap<&str, Vec<&Client>> = HashMap::new();
    for &client in view.clients() {
        let top = top_level_of(view, client);
        if top != client.id {
            members.entry(top).or_default().push(client);
        }
    }
    for children in members.values_mut() {
        children.sort_by(|a, b| (&a.name, &a.id).cmp(&(&b.name, &b.id)));
    }
    members
}

fn summarize_parent(
    month: YearMonth,
    parent: &Client,
    children: &[&Client],
    buckets: &BTreeMap<BucketKey<'_>, Amounts>,
) -> MonthlySummary {
    let own = buckets
        .get(&(month, parent.id.as_str()))
        .copied()
        .unwrap_or_default();

    let children: Vec<ChildSummary> = children
        .iter()
        .filter_map(|child| {
            let totals = buckets.get(&(month, child.id.as_str()))?;
            Some(ChildSummary {
                client_id: child.id.clone(),
                client_name: child.name.clone(),
                totals: *totals,
            })
        })
        .collect();

    let total = own + children.iter().map(|child| child.totals).sum::<Amounts>();
    let pending = total.pending();
    let overpaid = pending < 0.0;
    if overpaid {
        tracing::warn!(
            month = %month,
            parent_id = %parent.id,
            pending,
            "Paid amount exceeds earnings"
        );
    }

    MonthlySummary {
        month,
        parent_id: parent.id.clone(),
        parent_name: parent.name.clone(),
        own,
        children,
        total,
        pending,
        overpaid,
    }
}

fn grand_totals(rows: &[MonthlySummary]) -> GrandTotals {
    let earnings: f64 = rows.iter().map(|row| row.total.earnings).sum();
    let paid: f64 = rows.iter().map(|row| row.total.paid).sum();
    GrandTotals {
        earnings,
        paid,
        pending: earnings - paid,
    }
}

impl GrandTotals {
    /// Presents the totals in `currency`. A failed rate lookup leaves the
    /// figures in USD and marks the result as degraded.
    pub fn in_currency<S: RateSource, C: Clock>(
        &self,
        cache: &ExchangeRateCache<S, C>,
        currency: &str,
    ) -> ConvertedTotals {
        let (rate, err): (f64, Option<FxError>) = cache.rate_or_identity(currency);
        ConvertedTotals {
            currency: currency.trim().to_ascii_uppercase(),
            rate,
            earnings: self.earnings * rate,
            paid: self.paid * rate,
            pending: self.pending * rate,
            degraded: err.is_some(),
        }
    }
}
