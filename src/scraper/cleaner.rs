use crate::models::{ParsedListing, RawRow};
use regex::Regex;
use std::sync::LazyLock;

// ── Markers ───────────────────────────────────────────────────────────────────

/// Suffix that separates the name+code fragment from the rest of the cell.
const HK_MARKER: &str = ".HK";

/// Cell-1 content that identifies a non-data row.
const REJECT_MARKERS: [&str; 2] = ["延遲報價", "下一頁"];

/// Status flags the site appends to the company name.
const NAME_ANNOTATIONS: [&str; 2] = ["跌穿上市價", "認購不足"];

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{5}").expect("static regex"));

// ── Listing rows ──────────────────────────────────────────────────────────────

/// True when cell 1 looks like a listing: non-empty, has ".HK", carries no
/// pagination or delayed-quote marker.
pub fn is_listing_cell(cell: &str) -> bool {
    !cell.is_empty()
        && cell.contains(HK_MARKER)
        && !REJECT_MARKERS.iter().any(|m| cell.contains(m))
}

/// Split "示例公司A12345.HK跌穿上市價" into ("示例公司A", "12345").
pub fn split_name_code(cell: &str) -> Option<(String, String)> {
    let fragment = cell.split(HK_MARKER).next()?;
    let code = CODE_RE.find(fragment)?.as_str().to_string();

    let mut name = fragment.replace(&code, "");
    for annotation in NAME_ANNOTATIONS {
        name = name.replace(annotation, "");
    }

    Some((name.trim().to_string(), code))
}

/// Turn one candidate data row into a listing. Rows shorter than the column
/// set are padded with empty strings.
pub fn listing_row_to_record(row: &RawRow) -> Option<ParsedListing> {
    let cell = row.get(1)?;
    if !is_listing_cell(cell) {
        return None;
    }
    let (name, code) = split_name_code(cell)?;

    let field = |i: usize| row.get(i).cloned().unwrap_or_default();

    Some(ParsedListing {
        name,
        code,
        listing_date: field(2),
        lot_size: field(3),
        market_cap: field(4),
        offer_price: field(5),
        listing_price: field(6),
        oversubscription_ratio: field(7),
        allotment_lots: field(8),
        winning_rate: field(9),
        current_price: field(10),
        first_day_return: field(11),
        cumulative_return: field(12),
    })
}

pub fn clean_listing_rows<'a>(rows: impl IntoIterator<Item = &'a RawRow>) -> Vec<ParsedListing> {
    rows.into_iter().filter_map(listing_row_to_record).collect()
}

// ── Numbers ───────────────────────────────────────────────────────────────────

/// Parse a number out of display text: strip everything except digits, dot, minus.
/// "1,234.56" → 1234.56 | "NGN 610.00" → 610.0
pub fn parse_price(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" || s == "—" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// The PE table cell reads like "Oct 1, 2025\n 30.21 †"; the ratio is the last token.
pub fn parse_pe_ratio(cell: &str) -> Option<f64> {
    let cleaned = cell.replace('†', "");
    let token = cleaned.split_whitespace().last()?;
    parse_price(token)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
