//! Headless-browser driver contract. Implementations live outside this crate.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GotoOptions {
    pub wait_until: WaitUntil,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotOptions {
    pub full_page: bool,
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Browser>>;
}

#[async_trait]
pub trait Browser: Send {
    async fn new_context(&mut self) -> Result<Box<dyn BrowserContext>>;

    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait BrowserContext: Send {
    async fn new_page(&mut self) -> Result<Box<dyn Page>>;
}

#[async_trait]
pub trait Page: Send {
    async fn set_viewport_size(&mut self, viewport: Viewport) -> Result<()>;

    async fn goto(&mut self, url: &str, options: GotoOptions) -> Result<()>;

    /// PNG bytes of the current page.
    async fn screenshot(&mut self, options: ScreenshotOptions) -> Result<Vec<u8>>;
}
