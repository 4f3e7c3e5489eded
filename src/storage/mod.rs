//! CSV output for scraped listings.
//!
//! Files are UTF-8 with a BOM so spreadsheet tools pick the right encoding for
//! the Chinese column labels.

use crate::config::{HeaderLanguage, OutputConfig};
use crate::models::{CHINESE_COLUMNS, COLUMN_COUNT, ENGLISH_COLUMNS, ListingTable, ParsedListing};
use anyhow::{Context, Result};
use chrono::Local;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Data,
    Sample,
}

pub struct CsvExporter {
    dir: PathBuf,
    file_prefix: String,
    sample_file: String,
    columns: [&'static str; COLUMN_COUNT],
}

impl CsvExporter {
    pub fn new(config: &OutputConfig) -> Self {
        let columns = match config.header_language {
            HeaderLanguage::Chinese => CHINESE_COLUMNS,
            HeaderLanguage::English => ENGLISH_COLUMNS,
        };
        Self {
            dir: config.dir.clone(),
            file_prefix: config.file_prefix.clone(),
            sample_file: config.sample_file.clone(),
            columns,
        }
    }

    /// Write the scraped table to `{prefix}_{YYYYmmdd_HHMMSS}.csv`.
    pub fn write_listings(&self, table: &ListingTable) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self.dir.join(format!("{}_{}.csv", self.file_prefix, stamp));

        write_csv(&path, &self.columns, table.iter())?;
        info!("Saved {} listings to {}", table.len(), path.display());
        self.log_summary(table);
        Ok(path)
    }

    /// Write placeholder rows with the real schema so consumers still find a file.
    pub fn write_sample(&self) -> Result<PathBuf> {
        let path = self.dir.join(&self.sample_file);
        let sample = sample_listings();
        write_csv(&path, &self.columns, sample.iter())?;
        info!("Sample file showing the expected format saved to {}", path.display());
        Ok(path)
    }

    fn log_summary(&self, table: &ListingTable) {
        info!("Records: {} | columns: {} | {:?}", table.len(), self.columns.len(), self.columns);
        for listing in table.iter().take(PREVIEW_ROWS) {
            info!("  {}", listing.to_record().join(" | "));
        }
    }
}

fn write_csv<'a>(
    path: &Path,
    columns: &[&str],
    listings: impl Iterator<Item = &'a ParsedListing>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }

    let mut file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(columns)?;
    for listing in listings {
        writer
            .write_record(listing.to_record())
            .with_context(|| format!("write listing {}", listing.code))?;
    }
    writer.flush()?;
    Ok(())
}

/// Two illustrative listings, mirroring what a real page produces.
pub fn sample_listings() -> Vec<ParsedListing> {
    let make = |f: [&str; COLUMN_COUNT]| ParsedListing {
        name: f[0].into(),
        code: f[1].into(),
        listing_date: f[2].into(),
        lot_size: f[3].into(),
        market_cap: f[4].into(),
        offer_price: f[5].into(),
        listing_price: f[6].into(),
        oversubscription_ratio: f[7].into(),
        allotment_lots: f[8].into(),
        winning_rate: f[9].into(),
        current_price: f[10].into(),
        first_day_return: f[11].into(),
        cumulative_return: f[12].into(),
    };

    vec![
        make([
            "示例公司A", "01234", "2023-01-15", "100", "50.5", "9.80", "10.50", "10.5倍", "60手",
            "15.0%", "12.30", "+17.1%", "+25.4%",
        ]),
        make([
            "示例公司B", "05678", "2023-02-20", "200", "120.8", "24.50", "25.80", "15.2倍", "120手",
            "8.5%", "22.50", "-12.8%", "-5.2%",
        ]),
    ]
}
