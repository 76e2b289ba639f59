pub mod browser;

pub use browser::{
    Browser, BrowserContext, BrowserLauncher, GotoOptions, Page, ScreenshotOptions, WaitUntil,
};

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;

use crate::db::models::Viewport;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "visual_baseline::capture";

use crate::log_debug;

#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
}

/// Join a reference origin and a route path without doubling slashes.
pub fn route_url(base_url: &str, route: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = route.trim_start_matches('/');
    if path.is_empty() {
        format!("{base}/")
    } else {
        format!("{base}/{path}")
    }
}

/// Size the page, navigate, wait for network idle plus the settle delay,
/// then take a full-page screenshot.
pub async fn capture_route(
    page: &mut dyn Page,
    url: &str,
    viewport: Viewport,
    settings: &CaptureSettings,
) -> Result<Vec<u8>> {
    let started = Instant::now();

    page.set_viewport_size(viewport)
        .await
        .with_context(|| format!("failed to set viewport {viewport}"))?;
    page.goto(
        url,
        GotoOptions {
            wait_until: WaitUntil::NetworkIdle,
            timeout: settings.navigation_timeout,
        },
    )
    .await
    .with_context(|| format!("failed to navigate to {url}"))?;

    if !settings.settle_delay.is_zero() {
        tokio::time::sleep(settings.settle_delay).await;
    }

    let bytes = page
        .screenshot(ScreenshotOptions { full_page: true })
        .await
        .with_context(|| format!("failed to capture {url} at {viewport}"))?;

    log_debug!(
        "Captured {} at {} ({} bytes) in {}ms",
        url,
        viewport,
        bytes.len(),
        started.elapsed().as_millis()
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_routes_onto_reference_url() {
        assert_eq!(route_url("https://prod.example.com/", "/"), "https://prod.example.com/");
        assert_eq!(route_url("https://prod.example.com", ""), "https://prod.example.com/");
        assert_eq!(
            route_url("https://prod.example.com/", "/dashboard/settings"),
            "https://prod.example.com/dashboard/settings"
        );
        assert_eq!(
            route_url("https://prod.example.com", "about"),
            "https://prod.example.com/about"
        );
    }
}
