use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Raw tokenized HTML ────────────────────────────────────────────────────────

/// One `<tr>` worth of trimmed cell texts.
pub type RawRow = Vec<String>;

/// One `<table>` from a page, tokenized into rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub index: usize,
    /// `id`/`class` look like an IPO/stock listing container.
    pub attr_hint: bool,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }
}

// ── IPO listing ───────────────────────────────────────────────────────────────

pub const COLUMN_COUNT: usize = 13;

/// Column labels as printed on the aastocks listing page.
pub const CHINESE_COLUMNS: [&str; COLUMN_COUNT] = [
    "名稱",
    "代號",
    "上市日期",
    "每手股數",
    "上市市值(億元)",
    "招股價",
    "上市價",
    "超額倍數",
    "穩中一手",
    "中籤率",
    "現價",
    "首日表現",
    "累積表現",
];

pub const ENGLISH_COLUMNS: [&str; COLUMN_COUNT] = [
    "name",
    "code",
    "listingDate",
    "lotSize",
    "marketCap",
    "offerPrice",
    "listingPrice",
    "oversubscriptionRatio",
    "allotmentLots",
    "winningRate",
    "currentPrice",
    "firstDayReturn",
    "cumulativeReturn",
];

/// One parsed IPO row. Values keep the site's own formatting ("10.5倍", "60手", "+17.1%").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParsedListing {
    pub name: String,
    pub code: String,
    pub listing_date: String,
    pub lot_size: String,
    pub market_cap: String,
    pub offer_price: String,
    pub listing_price: String,
    pub oversubscription_ratio: String,
    pub allotment_lots: String,
    pub winning_rate: String,
    pub current_price: String,
    pub first_day_return: String,
    pub cumulative_return: String,
}

impl ParsedListing {
    /// Fields in output column order.
    pub fn to_record(&self) -> [&str; COLUMN_COUNT] {
        [
            self.name.as_str(),
            self.code.as_str(),
            self.listing_date.as_str(),
            self.lot_size.as_str(),
            self.market_cap.as_str(),
            self.offer_price.as_str(),
            self.listing_price.as_str(),
            self.oversubscription_ratio.as_str(),
            self.allotment_lots.as_str(),
            self.winning_rate.as_str(),
            self.current_price.as_str(),
            self.first_day_return.as_str(),
            self.cumulative_return.as_str(),
        ]
    }
}

/// Listings accumulated across pages, in page-then-row order. Codes are not deduplicated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingTable {
    listings: Vec<ParsedListing>,
}

impl ListingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, listings: impl IntoIterator<Item = ParsedListing>) {
        self.listings.extend(listings);
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParsedListing> {
        self.listings.iter()
    }
}

impl FromIterator<ParsedListing> for ListingTable {
    fn from_iter<I: IntoIterator<Item = ParsedListing>>(iter: I) -> Self {
        Self {
            listings: iter.into_iter().collect(),
        }
    }
}

// ── Price history ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closes for one symbol, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}
