#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use visual_baseline::capture::{
    Browser, BrowserContext, BrowserLauncher, GotoOptions, Page, ScreenshotOptions,
};
use visual_baseline::diff::encode_png;
use visual_baseline::storage::{MemoryStorage, StorageBackend, StorageError, UploadOptions};
use visual_baseline::Viewport;

pub const PAGE_COLOR: [u8; 4] = [200, 200, 200, 255];

pub fn solid_image(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(color))
}

pub fn paint_block(image: &mut RgbaImage, x: u32, y: u32, size: u32, color: [u8; 4]) {
    for py in y..y + size {
        for px in x..x + size {
            image.put_pixel(px, py, Rgba(color));
        }
    }
}

pub fn png(image: &RgbaImage) -> Vec<u8> {
    encode_png(image).expect("encode test png")
}

pub fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    png(&solid_image(width, height, color))
}

/// Counters and navigation history shared by every object a launcher creates.
#[derive(Default)]
pub struct BrowserLog {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub screenshots: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
}

impl BrowserLog {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn screenshots(&self) -> usize {
        self.screenshots.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.launches() + self.closes() + self.screenshots() + self.navigations().len()
    }
}

/// Renders every page as a solid PNG of the viewport size. Navigation to a
/// URL ending in one of `failing_routes` fails; `fail_context` makes
/// `new_context` fail.
#[derive(Default)]
pub struct RecordingLauncher {
    pub log: Arc<BrowserLog>,
    pub failing_routes: Vec<String>,
    pub fail_context: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(routes: &[&str]) -> Self {
        Self {
            failing_routes: routes.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl BrowserLauncher for RecordingLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>> {
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingBrowser {
            log: Arc::clone(&self.log),
            failing_routes: self.failing_routes.clone(),
            fail_context: self.fail_context,
        }))
    }
}

struct RecordingBrowser {
    log: Arc<BrowserLog>,
    failing_routes: Vec<String>,
    fail_context: bool,
}

#[async_trait]
impl Browser for RecordingBrowser {
    async fn new_context(&mut self) -> Result<Box<dyn BrowserContext>> {
        if self.fail_context {
            bail!("context creation refused");
        }
        Ok(Box::new(RecordingContext {
            log: Arc::clone(&self.log),
            failing_routes: self.failing_routes.clone(),
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct RecordingContext {
    log: Arc<BrowserLog>,
    failing_routes: Vec<String>,
}

#[async_trait]
impl BrowserContext for RecordingContext {
    async fn new_page(&mut self) -> Result<Box<dyn Page>> {
        Ok(Box::new(RecordingPage {
            log: Arc::clone(&self.log),
            failing_routes: self.failing_routes.clone(),
            viewport: None,
        }))
    }
}

struct RecordingPage {
    log: Arc<BrowserLog>,
    failing_routes: Vec<String>,
    viewport: Option<Viewport>,
}

#[async_trait]
impl Page for RecordingPage {
    async fn set_viewport_size(&mut self, viewport: Viewport) -> Result<()> {
        self.viewport = Some(viewport);
        Ok(())
    }

    async fn goto(&mut self, url: &str, _options: GotoOptions) -> Result<()> {
        self.log.navigations.lock().unwrap().push(url.to_string());
        if self.failing_routes.iter().any(|route| url.ends_with(route.as_str())) {
            bail!("net::ERR_CONNECTION_REFUSED at {url}");
        }
        Ok(())
    }

    async fn screenshot(&mut self, _options: ScreenshotOptions) -> Result<Vec<u8>> {
        self.log.screenshots.fetch_add(1, Ordering::SeqCst);
        let viewport = self.viewport.unwrap_or(Viewport::new(100, 100));
        encode_png(&solid_image(viewport.width, viewport.height, PAGE_COLOR))
    }
}

/// In-memory storage whose individual operations can be made to fail with a
/// non-not-found backend error.
#[derive(Default)]
pub struct FailingStorage {
    pub inner: MemoryStorage,
    pub fail_uploads: bool,
    pub fail_downloads: bool,
    pub fail_listing: bool,
}

fn unavailable() -> StorageError {
    StorageError::Backend {
        status: Some(503),
        message: "service unavailable".into(),
    }
}

#[async_trait]
impl StorageBackend for FailingStorage {
    fn provider(&self) -> &str {
        "failing"
    }

    async fn upload_file(
        &self,
        path: &str,
        bytes: &[u8],
        options: UploadOptions,
    ) -> Result<String, StorageError> {
        if self.fail_uploads {
            return Err(unavailable());
        }
        self.inner.upload_file(path, bytes, options).await
    }

    async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        if self.fail_downloads {
            return Err(unavailable());
        }
        self.inner.download_file(path).await
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        if self.fail_listing {
            return Err(unavailable());
        }
        self.inner.list_files(prefix).await
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        self.inner.delete_file(path).await
    }
}
