//! Pipeline orchestrator: ties retrieval → locator → parser → CSV together.
//!
//! ## Flow per run
//!
//! For every page in the configured closed range:
//!   1. Walk the retrieval chain (stateless → session → browser) until a tier
//!      returns tables.
//!   2. Locate the rows after the "名稱/代號" header and parse them into listings.
//!   3. Append to the run-wide table.
//!
//! Pages that fail every tier are logged and skipped; the run always visits the
//! whole range. At the end the table is written once, or the sample file is
//! written when nothing was scraped at all.

use crate::config::AppConfig;
use crate::models::ListingTable;
use crate::scraper::RetrievalChain;
use crate::scraper::cleaner::clean_listing_rows;
use crate::scraper::parsers::locate_data_rows;
use crate::storage::{CsvExporter, ExportKind};
use anyhow::{Context, Result};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use tracing::{info, warn};

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<PipelineStats> {
        let chain = RetrievalChain::standard(&self.config.scraper)
            .context("Failed to build retrieval chain")?;
        self.run_with(&chain).await
    }

    /// Scrape the configured pages through `chain` and write the output file.
    pub async fn run_with(&self, chain: &RetrievalChain) -> Result<PipelineStats> {
        info!("=== Scraping listing pages {:?} ===", self.config.pages());
        let (table, pages) = scrape_pages(chain, self.config.pages()).await;

        let exporter = CsvExporter::new(&self.config.output);
        let (path, kind) = if table.is_empty() {
            warn!("No listings obtained from any page; check network access to the listing site");
            (exporter.write_sample()?, ExportKind::Sample)
        } else {
            (exporter.write_listings(&table)?, ExportKind::Data)
        };

        let stats = PipelineStats {
            pages_attempted: pages.len(),
            pages_failed: pages.iter().filter(|p| p.tier.is_none()).count(),
            listings: table.len(),
            output: path,
            kind,
        };

        info!(
            "=== Done: {} pages ({} failed) | {} listings | {:?} written to {} ===",
            stats.pages_attempted,
            stats.pages_failed,
            stats.listings,
            stats.kind,
            stats.output.display(),
        );

        Ok(stats)
    }
}

/// What happened on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageReport {
    pub page: u32,
    /// `None` when every tier failed.
    pub tier: Option<&'static str>,
    pub candidate_rows: usize,
    pub listings: usize,
}

/// Visit every page once, in order, accumulating parsed listings.
pub async fn scrape_pages(
    chain: &RetrievalChain,
    pages: RangeInclusive<u32>,
) -> (ListingTable, Vec<PageReport>) {
    let mut table = ListingTable::new();
    let mut reports = Vec::new();

    for page in pages {
        info!("Fetching listing page {}", page);

        let Some(fetched) = chain.fetch_page(page).await else {
            warn!("Page {}: no data from any retrieval tier, skipping", page);
            reports.push(PageReport {
                page,
                tier: None,
                candidate_rows: 0,
                listings: 0,
            });
            continue;
        };

        let candidates = locate_data_rows(&fetched.tables);
        let listings = clean_listing_rows(candidates.iter().copied());
        info!(
            "  Page {}: {} candidate rows, {} listings",
            page,
            candidates.len(),
            listings.len()
        );

        reports.push(PageReport {
            page,
            tier: Some(fetched.tier),
            candidate_rows: candidates.len(),
            listings: listings.len(),
        });
        table.extend(listings);
    }

    info!("Total listings collected: {}", table.len());
    (table, reports)
}

#[derive(Debug)]
pub struct PipelineStats {
    pub pages_attempted: usize,
    pub pages_failed: usize,
    pub listings: usize,
    pub output: PathBuf,
    pub kind: ExportKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CHINESE_COLUMNS, COLUMN_COUNT};
    use crate::scraper::tests::{FakeTier, Shared};
    use std::path::Path;
    use std::sync::Arc;

    fn listing_page(rows: &[(&str, &str)]) -> String {
        let body: String = rows
            .iter()
            .enumerate()
            .map(|(i, (name_code, date))| {
                format!("<tr><td>{}</td><td>{}</td><td>{}</td></tr>", i + 1, name_code, date)
            })
            .collect();
        format!(
            "<html><body><table>\
             <tr><td>#</td><td>名稱/代號</td><td>上市日期</td></tr>{}\
             <tr><td></td><td>下一頁</td><td></td></tr>\
             </table></body></html>",
            body
        )
    }

    #[tokio::test]
    async fn test_every_page_is_visited_once_even_when_empty() {
        let tier = Arc::new(FakeTier::new(
            "stateless",
            vec![
                (
                    1,
                    listing_page(&[
                        ("甲公司01111.HK", "2024-01-02"),
                        ("乙公司02222.HK", "2024-01-03"),
                    ]),
                ),
                // page 2 missing → tier error
                (3, listing_page(&[])),
                (4, listing_page(&[("丙公司03333.HK跌穿上市價", "2024-02-01")])),
            ],
        ));
        let chain = RetrievalChain::new(vec![Box::new(Shared(tier.clone()))]);

        let (table, reports) = scrape_pages(&chain, 1..=4).await;

        assert_eq!(*tier.seen.lock().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[1].tier, None);
        assert_eq!(reports[2].listings, 0);
        assert_eq!(table.len(), reports.iter().map(|r| r.listings).sum::<usize>());

        let codes: Vec<&str> = table.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["01111", "02222", "03333"]);
        assert_eq!(table.iter().last().unwrap().name, "丙公司");
    }

    #[tokio::test]
    async fn test_duplicate_codes_across_pages_are_kept() {
        let page = listing_page(&[("甲公司01111.HK", "2024-01-02")]);
        let chain = RetrievalChain::new(vec![Box::new(FakeTier::new(
            "stateless",
            vec![(1, page.clone()), (2, page)],
        ))]);

        let (table, _) = scrape_pages(&chain, 1..=2).await;

        assert_eq!(table.len(), 2);
        assert!(table.iter().all(|l| l.code == "01111"));
    }

    #[tokio::test]
    async fn test_all_pages_failing_yields_empty_table() {
        let chain = RetrievalChain::new(vec![Box::new(FakeTier::new("stateless", vec![]))]);
        let (table, reports) = scrape_pages(&chain, 1..=3).await;
        assert!(table.is_empty());
        assert!(reports.iter().all(|r| r.tier.is_none()));
    }

    fn config_for(dir: &Path, last_page: u32) -> AppConfig {
        let mut config = AppConfig::default();
        config.scraper.last_page = last_page;
        config.output.dir = dir.to_path_buf();
        config
    }

    fn read_csv(path: &Path) -> Vec<Vec<String>> {
        let bytes = std::fs::read(path).unwrap();
        assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(&bytes[3..])
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_run_without_any_listing_writes_sample_file() {
        let dir = tempfile::tempdir().unwrap();
        let chain = RetrievalChain::new(vec![Box::new(FakeTier::new(
            "stateless",
            vec![(2, listing_page(&[]))],
        ))]);

        let stats = Pipeline::new(config_for(dir.path(), 3))
            .run_with(&chain)
            .await
            .unwrap();

        assert_eq!(stats.kind, ExportKind::Sample);
        assert_eq!(stats.pages_attempted, 3);
        assert_eq!(stats.pages_failed, 2);
        assert_eq!(stats.listings, 0);
        assert_eq!(stats.output, dir.path().join("hk_ipo_sample_format.csv"));

        let records = read_csv(&stats.output);
        assert_eq!(records[0], CHINESE_COLUMNS);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.len() == COLUMN_COUNT));
    }

    #[tokio::test]
    async fn test_run_writes_full_row_through_to_csv() {
        let cells = [
            "1",
            "示例公司A12345.HK",
            "2023-01-15",
            "100",
            "50.5",
            "9.80",
            "10.50",
            "10.5倍",
            "60手",
            "15.0%",
            "12.30",
            "+17.1%",
            "+25.4%",
        ];
        let row: String = cells.iter().map(|c| format!("<td>{}</td>", c)).collect();
        let html = format!(
            "<table><tr><th>#</th><th>名稱/代號</th></tr><tr>{}</tr></table>",
            row
        );
        let dir = tempfile::tempdir().unwrap();
        let chain =
            RetrievalChain::new(vec![Box::new(FakeTier::new("stateless", vec![(1, html)]))]);

        let stats = Pipeline::new(config_for(dir.path(), 1))
            .run_with(&chain)
            .await
            .unwrap();

        assert_eq!(stats.kind, ExportKind::Data);
        assert_eq!(stats.listings, 1);

        let records = read_csv(&stats.output);
        let mut expected = vec!["示例公司A", "12345"];
        expected.extend(&cells[2..]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], CHINESE_COLUMNS);
        assert_eq!(records[1], expected);
    }
}
