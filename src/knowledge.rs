//! SEC filing domain knowledge
//!
//! Section-id tables, XBRL metric tags, and query analysis helpers used to
//! seed the planner prompt. The tables follow the section and item
//! identifiers used by the filing data services.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 10-K section IDs and their display names
pub static FORM_10K_SECTIONS: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("1", "Business"),
        ("1A", "Risk Factors"),
        ("1B", "Unresolved Staff Comments"),
        ("1C", "Cybersecurity"),
        ("2", "Properties"),
        ("3", "Legal Proceedings"),
        ("4", "Mine Safety Disclosures"),
        (
            "5",
            "Market for Registrant's Common Equity, Related Stockholder Matters and Issuer Purchases of Equity Securities",
        ),
        ("6", "Selected Financial Data"),
        (
            "7",
            "Management's Discussion and Analysis of Financial Condition and Results of Operations",
        ),
        (
            "7A",
            "Quantitative and Qualitative Disclosures about Market Risk",
        ),
        ("8", "Financial Statements and Supplementary Data"),
        (
            "9",
            "Changes in and Disagreements with Accountants on Accounting and Financial Disclosure",
        ),
        ("9A", "Controls and Procedures"),
        ("9B", "Other Information"),
        ("10", "Directors, Executive Officers and Corporate Governance"),
        ("11", "Executive Compensation"),
        (
            "12",
            "Security Ownership of Certain Beneficial Owners and Management and Related Stockholder Matters",
        ),
        (
            "13",
            "Certain Relationships and Related Transactions, and Director Independence",
        ),
        ("14", "Principal Accountant Fees and Services"),
    ])
});

/// 10-Q section IDs and their display names
pub static FORM_10Q_SECTIONS: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("part1item1", "Financial Statements"),
        (
            "part1item2",
            "Management's Discussion and Analysis of Financial Condition and Results of Operations",
        ),
        (
            "part1item3",
            "Quantitative and Qualitative Disclosures About Market Risk",
        ),
        ("part1item4", "Controls and Procedures"),
        ("part2item1", "Legal Proceedings"),
        ("part2item1a", "Risk Factors"),
        (
            "part2item2",
            "Unregistered Sales of Equity Securities and Use of Proceeds",
        ),
        ("part2item3", "Defaults Upon Senior Securities"),
        ("part2item4", "Mine Safety Disclosures"),
        ("part2item5", "Other Information"),
        ("part2item6", "Exhibits"),
    ])
});

/// XBRL metric keys mapped to candidate US-GAAP tag names, most specific first
pub static XBRL_METRICS: Lazy<BTreeMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "revenue",
            &[
                "RevenueFromContractWithCustomerExcludingAssessedTax",
                "Revenues",
                "SalesRevenueNet",
                "RevenueNet",
                "TotalRevenuesAndOtherIncome",
            ][..],
        ),
        (
            "net_income",
            &[
                "NetIncomeLoss",
                "ProfitLoss",
                "NetIncomeLossAvailableToCommonStockholdersBasic",
            ][..],
        ),
        (
            "assets",
            &["Assets", "AssetsCurrent", "AssetsNoncurrent", "TotalAssets"][..],
        ),
        (
            "liabilities",
            &[
                "Liabilities",
                "LiabilitiesCurrent",
                "LiabilitiesNoncurrent",
                "TotalLiabilities",
            ][..],
        ),
        (
            "cash",
            &[
                "CashAndCashEquivalentsAtCarryingValue",
                "CashAndCashEquivalentsPeriodIncreaseDecrease",
            ][..],
        ),
        ("eps", &["EarningsPerShareBasic", "EarningsPerShareDiluted"][..]),
        (
            "cash_flow",
            &[
                "NetCashProvidedByUsedInOperatingActivities",
                "NetCashProvidedByUsedInInvestingActivities",
                "NetCashProvidedByUsedInFinancingActivities",
            ][..],
        ),
    ])
});

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").expect("valid regex"));

static QUARTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(q[1-4]|first quarter|second quarter|third quarter|fourth quarter|1st quarter|2nd quarter|3rd quarter|4th quarter)\b(?:\s*of)?\s*(20\d{2})",
    )
    .expect("valid regex")
});

static TICKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{1,5}\b").expect("valid regex"));

static CIK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{10}\b").expect("valid regex"));

/// Kind of company identifier found in a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifierKind {
    /// Exchange ticker symbol, e.g. AAPL
    Ticker,
    /// SEC Central Index Key (10-digit)
    Cik,
    /// Free-form company name
    Name,
}

impl IdentifierKind {
    /// Wire name used in mapping API paths
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Ticker => "ticker",
            IdentifierKind::Cik => "cik",
            IdentifierKind::Name => "name",
        }
    }
}

/// Inclusive date range in YYYY-MM-DD form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Start of the range
    pub from: String,
    /// End of the range
    pub to: String,
}

/// Result of analyzing a query for planning hints
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnalysis {
    /// Most likely form type (10-K, 10-Q, 8-K)
    pub form_type: &'static str,
    /// Kind of company identifier the query uses
    pub identifier_kind: IdentifierKind,
    /// Date range inferred from years/quarters in the query
    pub date_range: Option<DateRange>,
    /// Whether the query asks for structured financial data
    pub requires_financial_data: bool,
    /// Whether the query asks for section text analysis
    pub requires_section_text: bool,
    /// Best-effort section id guess when section text is requested
    pub section_id: Option<&'static str>,
    /// Financial metric keys mentioned in the query
    pub metrics: Vec<&'static str>,
}

/// Determine which form type a query is most likely about
pub fn determine_form_type(query: &str) -> &'static str {
    let q = query.to_lowercase();

    if q.contains("10-k") || q.contains("annual report") || q.contains("yearly") {
        return "10-K";
    }
    if q.contains("10-q") || q.contains("quarter") {
        return "10-Q";
    }
    if q.contains("8-k") || q.contains("current report") || q.contains("material event") {
        return "8-K";
    }
    if q.contains("annual") || q.contains("fiscal year") {
        return "10-K";
    }

    // Most general queries are answered from the latest annual report
    "10-K"
}

/// Determine what kind of company identifier the query carries
pub fn identifier_kind(query: &str) -> IdentifierKind {
    if CIK_RE.is_match(query) {
        IdentifierKind::Cik
    } else if TICKER_RE.is_match(query) {
        IdentifierKind::Ticker
    } else {
        IdentifierKind::Name
    }
}

/// Extract a date range from year or quarter mentions in the query
pub fn extract_date_range(query: &str) -> Option<DateRange> {
    if let Some(caps) = QUARTER_RE.captures(query) {
        let quarter = caps.get(1)?.as_str().to_lowercase();
        let year = caps.get(2)?.as_str();
        let (from, to) = if quarter.contains("q1") || quarter.contains("first") || quarter.contains("1st") {
            (format!("{year}-01-01"), format!("{year}-03-31"))
        } else if quarter.contains("q2") || quarter.contains("second") || quarter.contains("2nd") {
            (format!("{year}-04-01"), format!("{year}-06-30"))
        } else if quarter.contains("q3") || quarter.contains("third") || quarter.contains("3rd") {
            (format!("{year}-07-01"), format!("{year}-09-30"))
        } else {
            (format!("{year}-10-01"), format!("{year}-12-31"))
        };
        return Some(DateRange { from, to });
    }

    YEAR_RE.captures(query).and_then(|caps| {
        caps.get(1).map(|m| {
            let year = m.as_str();
            DateRange {
                from: format!("{year}-01-01"),
                to: format!("{year}-12-31"),
            }
        })
    })
}

/// Whether a query asks for financial metrics (XBRL data)
pub fn is_financial_metric_query(query: &str) -> bool {
    const FINANCIAL_TERMS: &[&str] = &[
        "revenue",
        "income",
        "profit",
        "loss",
        "earnings",
        "eps",
        "per share",
        "assets",
        "liabilities",
        "cash",
        "sales",
        "margin",
        "balance sheet",
        "income statement",
        "cash flow",
        "financial data",
        "financial metrics",
        "financial statement",
    ];
    let q = query.to_lowercase();
    FINANCIAL_TERMS.iter().any(|term| q.contains(term))
}

/// Whether a query asks for textual analysis of filing sections
pub fn is_section_text_query(query: &str) -> bool {
    const ANALYSIS_TERMS: &[&str] = &[
        "risk factors",
        "business description",
        "management discussion",
        "md&a",
        "properties",
        "legal proceedings",
        "disclosure",
        "controls",
        "procedures",
        "directors",
        "officers",
        "executive compensation",
        "risk",
    ];
    let q = query.to_lowercase();
    ANALYSIS_TERMS.iter().any(|term| q.contains(term))
}

/// Look up the section id for a section name within a form type
pub fn section_id_for(form_type: &str, section_name: &str) -> Option<&'static str> {
    let needle = section_name.to_lowercase();
    let table = match form_type {
        "10-K" => &*FORM_10K_SECTIONS,
        "10-Q" => &*FORM_10Q_SECTIONS,
        _ => return None,
    };
    table
        .iter()
        .find(|(_, name)| name.to_lowercase().contains(&needle))
        .map(|(id, _)| *id)
}

/// Alternative phrasings for a financial metric key
fn metric_aliases(metric: &str) -> &'static [&'static str] {
    match metric {
        "revenue" => &["sales", "top line", "turnover"],
        "net_income" => &["profit", "bottom line", "earnings", "net profit"],
        "assets" => &["total assets", "asset base"],
        "liabilities" => &["debts", "obligations", "total liabilities"],
        "eps" => &["earnings per share", "profit per share"],
        "cash_flow" => &["cash flows", "cash position", "liquidity"],
        _ => &[],
    }
}

/// Analyze a query and produce planning hints
///
/// The analysis seeds the planner prompt with the form type, identifier
/// kind, date constraints, and which data services the question will need.
pub fn analyze_query(query: &str) -> QueryAnalysis {
    let form_type = determine_form_type(query);
    let requires_financial_data = is_financial_metric_query(query);
    let requires_section_text = is_section_text_query(query);
    let q = query.to_lowercase();

    let section_id = if requires_section_text {
        FORM_10K_SECTIONS
            .values()
            .chain(FORM_10Q_SECTIONS.values())
            .find(|name| q.contains(&name.to_lowercase()))
            .and_then(|name| section_id_for(form_type, name))
    } else {
        None
    };

    let metrics = if requires_financial_data {
        XBRL_METRICS
            .keys()
            .filter(|metric| {
                q.contains(&metric.replace('_', " "))
                    || metric_aliases(metric).iter().any(|alias| q.contains(alias))
            })
            .copied()
            .collect()
    } else {
        Vec::new()
    };

    QueryAnalysis {
        form_type,
        identifier_kind: identifier_kind(query),
        date_range: extract_date_range(query),
        requires_financial_data,
        requires_section_text,
        section_id,
        metrics,
    }
}
