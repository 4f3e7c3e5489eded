//! Headless Chrome retrieval, the last resort when plain HTTP returns nothing usable.
//!
//! Compiled only with the `browser` feature. Without it every call reports the
//! automation tier as unavailable and the page moves on.

use super::http_client::RetrievalError;
use std::time::Duration;

/// Everything the blocking browser session needs, owned so it can move into `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct BrowserRequest {
    pub url: String,
    pub user_agent: String,
    pub wait: Duration,
}

/// Render `url` and return the live DOM as HTML once a `<table>` is present.
pub async fn render_page(request: BrowserRequest) -> Result<String, RetrievalError> {
    tokio::task::spawn_blocking(move || render_blocking(&request))
        .await
        .map_err(|e| RetrievalError::Browser(format!("browser task: {}", e)))?
}

#[cfg(feature = "browser")]
fn render_blocking(request: &BrowserRequest) -> Result<String, RetrievalError> {
    use headless_chrome::{Browser, LaunchOptions};
    use std::ffi::OsStr;
    use tracing::debug;

    let ua_arg = format!("--user-agent={}", request.user_agent);
    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .args(vec![OsStr::new("--disable-dev-shm-usage"), OsStr::new(&ua_arg)])
        .build()
        .map_err(|e| RetrievalError::BrowserUnavailable(e.to_string()))?;

    // Dropping `browser` at the end of this scope shuts Chrome down on every path.
    let browser =
        Browser::new(options).map_err(|e| RetrievalError::BrowserUnavailable(e.to_string()))?;
    let tab = browser
        .new_tab()
        .map_err(|e| RetrievalError::Browser(format!("new tab: {}", e)))?;

    debug!("browser: navigating to {}", request.url);
    tab.navigate_to(&request.url)
        .map_err(|e| RetrievalError::Browser(format!("navigate: {}", e)))?;

    tab.wait_for_element_with_custom_timeout("table", request.wait)
        .map_err(|e| {
            RetrievalError::Browser(format!("no table within {:?}: {}", request.wait, e))
        })?;

    tab.get_content()
        .map_err(|e| RetrievalError::Browser(format!("page content: {}", e)))
}

#[cfg(not(feature = "browser"))]
fn render_blocking(_request: &BrowserRequest) -> Result<String, RetrievalError> {
    Err(RetrievalError::BrowserUnavailable(
        "built without the `browser` feature".to_string(),
    ))
}
