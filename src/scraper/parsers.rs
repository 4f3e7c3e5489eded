use crate::models::{RawRow, RawTable};
use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

static ATTR_HINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(ipo|new|stock)").expect("static regex"));

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow::anyhow!("{} selector: {:?}", s, e))
}

// ── Tokenizing ────────────────────────────────────────────────────────────────

/// Tokenize every `<table>` of a page into trimmed cell texts.
///
/// Each table owns only its own rows: `<tr>` children of the table or of its
/// `<thead>`/`<tbody>`/`<tfoot>`, with their `<td>`/`<th>` cells. A nested table
/// is listed separately and does not repeat its rows in the enclosing one.
/// Rows without any non-empty cell are dropped.
pub fn extract_tables(html: &str) -> Result<Vec<RawTable>> {
    let doc = Html::parse_document(html);
    let table_sel = selector("table")?;

    let tables = doc
        .select(&table_sel)
        .enumerate()
        .map(|(index, table)| {
            let rows = own_rows(table)
                .map(row_cells)
                .filter(|cells| cells.iter().any(|c| !c.is_empty()))
                .collect();

            RawTable {
                index,
                attr_hint: has_attr_hint(table),
                rows,
            }
        })
        .collect();

    Ok(tables)
}

fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.children().filter_map(ElementRef::wrap)
}

fn own_rows<'a>(table: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    child_elements(table).flat_map(|child| {
        let rows: Vec<ElementRef<'a>> = match child.value().name() {
            "tr" => vec![child],
            "thead" | "tbody" | "tfoot" => child_elements(child)
                .filter(|el| el.value().name() == "tr")
                .collect(),
            _ => Vec::new(),
        };
        rows
    })
}

fn row_cells(tr: ElementRef<'_>) -> RawRow {
    cell_texts(tr, &["td", "th"])
}

fn cell_texts(tr: ElementRef<'_>, tags: &[&str]) -> RawRow {
    child_elements(tr)
        .filter(|el| tags.contains(&el.value().name()))
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect()
}

fn has_attr_hint(table: ElementRef<'_>) -> bool {
    let el = table.value();
    [el.id(), el.attr("class")]
        .into_iter()
        .flatten()
        .any(|v| ATTR_HINT_RE.is_match(v))
}

/// `<title>` text, for diagnostics.
pub fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = selector("title").ok()?;
    let title = doc.select(&sel).next()?.text().collect::<String>();
    let title = title.trim();
    if title.is_empty() { None } else { Some(title.to_string()) }
}

// ── Table locator ─────────────────────────────────────────────────────────────

/// Ways of recognising the listing table, in the order they are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// A row whose second cell names both the "名稱" and "代號" columns.
    NameCodeHeader,
    /// `id`/`class` attributes mention ipo/new/stock. Reported only, never selects rows.
    AttributeHint,
}

pub const DETECTION_ORDER: [Detection; 2] = [Detection::NameCodeHeader, Detection::AttributeHint];

pub fn is_header_row(row: &RawRow) -> bool {
    row.len() > 1 && row[1].contains("名稱") && row[1].contains("代號")
}

/// Candidate rows found in one table.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedTable<'a> {
    pub table_index: usize,
    pub detected_by: Vec<Detection>,
    pub header: Option<&'a RawRow>,
    pub data_rows: &'a [RawRow],
}

impl Detection {
    fn applies(self, table: &RawTable) -> bool {
        match self {
            Detection::NameCodeHeader => table.rows.iter().any(is_header_row),
            Detection::AttributeHint => table.attr_hint,
        }
    }
}

/// Run the detection strategies over one table. Data rows are everything after
/// the first header row; a table without a header row contributes nothing.
pub fn locate_in_table(table: &RawTable) -> LocatedTable<'_> {
    let detected_by = DETECTION_ORDER
        .into_iter()
        .filter(|d| d.applies(table))
        .collect();

    let header_pos = table.rows.iter().position(is_header_row);

    let (header, data_rows) = match header_pos {
        Some(i) => (Some(&table.rows[i]), &table.rows[i + 1..]),
        None => (None, &table.rows[..0]),
    };

    LocatedTable {
        table_index: table.index,
        detected_by,
        header,
        data_rows,
    }
}

/// All candidate data rows of a page, in table-then-row order.
pub fn locate_data_rows(tables: &[RawTable]) -> Vec<&RawRow> {
    let mut rows = Vec::new();
    for table in tables {
        let located = locate_in_table(table);
        if !located.detected_by.is_empty() {
            debug!(
                "table #{}: detected by {:?}, discovered header {:?}, {} candidate rows",
                located.table_index,
                located.detected_by,
                located.header,
                located.data_rows.len()
            );
        }
        rows.extend(located.data_rows.iter());
    }
    rows
}

// ── Single-value tables ───────────────────────────────────────────────────────

/// Text of `cell` in the first body row of the first table, e.g. the latest
/// value of a by-month ratio table. Header rows (all `<th>`) are skipped.
pub fn first_table_cell(html: &str, cell: usize) -> Result<Option<String>> {
    let doc = Html::parse_document(html);
    let table_sel = selector("table")?;

    let Some(table) = doc.select(&table_sel).next() else {
        return Ok(None);
    };

    let value = own_rows(table)
        .map(|tr| cell_texts(tr, &["td"]))
        .find(|cells| !cells.is_empty())
        .and_then(|cells| cells.get(cell).cloned());

    Ok(value)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
