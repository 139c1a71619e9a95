//! Built-in chromium browser adapter driven through chromiumoxide.

use crate::{
    BrowserAdapter, CaptureOptions, Config, Interaction, PageHandle, RunnerError, ScreenshotMeta,
    ScreenshotResult, Viewport,
};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

/// How long `wait-for` interaction steps poll for their selector.
const SELECTOR_WAIT_BUDGET: Duration = Duration::from_secs(10);
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub chrome_path: Option<String>,
    pub window: Viewport,
}

impl ChromiumOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            window: config
                .viewports
                .values()
                .next()
                .cloned()
                .unwrap_or_default(),
        }
    }
}

struct ChromiumState {
    browser: Browser,
    handler: tokio::task::JoinHandle<()>,
}

/// Chromium-family browser adapter. One headless Chrome process per
/// instance; the browser adapter pool ensures one instance per browser
/// name.
pub struct ChromiumAdapter {
    options: ChromiumOptions,
    state: Mutex<Option<ChromiumState>>,
}

impl ChromiumAdapter {
    pub fn new(options: ChromiumOptions) -> Self {
        Self {
            options,
            state: Mutex::new(None),
        }
    }

    fn chrome_args(window: &Viewport) -> Vec<String> {
        let unique_id = format!("{}-{}", std::process::id(), Uuid::new_v4());

        vec![
            "--headless".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--disable-background-timer-throttling".to_string(),
            "--disable-backgrounding-occluded-windows".to_string(),
            "--disable-renderer-backgrounding".to_string(),
            "--disable-extensions".to_string(),
            "--disable-default-apps".to_string(),
            "--disable-sync".to_string(),
            "--no-first-run".to_string(),
            "--hide-scrollbars".to_string(),
            format!("--window-size={},{}", window.width, window.height),
            // Unique user data directory so concurrent instances never
            // fight over the Chrome process singleton.
            format!("--user-data-dir=/tmp/vizdiff-chromium-{unique_id}"),
        ]
    }

    fn browser_config(&self, viewport: &Viewport) -> Result<BrowserConfig, RunnerError> {
        let mut builder = BrowserConfig::builder()
            .window_size(viewport.width, viewport.height)
            .args(Self::chrome_args(viewport));

        if let Some(chrome_path) = &self.options.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }

        builder.build().map_err(RunnerError::BrowserLaunchFailed)
    }

    async fn new_page(&self, url: &str) -> Result<Page, RunnerError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(RunnerError::BrowserUnavailable)?;
        state
            .browser
            .new_page(url)
            .await
            .map_err(|e| RunnerError::Page(e.to_string()))
    }

    async fn set_viewport(page: &Page, viewport: &Viewport) -> Result<(), RunnerError> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(viewport.device_scale_factor)
            .mobile(false)
            .build()
            .map_err(RunnerError::Page)?;

        page.execute(params)
            .await
            .map_err(|e| RunnerError::Page(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_selector(page: &Page, selector: &str) -> Result<(), RunnerError> {
        let deadline = Instant::now() + SELECTOR_WAIT_BUDGET;
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RunnerError::ElementNotFound(format!(
                    "'{selector}' did not appear within {SELECTOR_WAIT_BUDGET:?}"
                )));
            }
            sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn run_interactions(page: &Page, steps: &[Interaction]) -> Result<(), RunnerError> {
        for step in steps {
            match step {
                Interaction::Click { selector } => {
                    let element = page
                        .find_element(selector.as_str())
                        .await
                        .map_err(|_| RunnerError::ElementNotFound(selector.clone()))?;
                    element
                        .click()
                        .await
                        .map_err(|e| RunnerError::Page(e.to_string()))?;
                }
                Interaction::Hover { selector } => {
                    let element = page
                        .find_element(selector.as_str())
                        .await
                        .map_err(|_| RunnerError::ElementNotFound(selector.clone()))?;
                    element
                        .hover()
                        .await
                        .map_err(|e| RunnerError::Page(e.to_string()))?;
                }
                Interaction::Type { selector, text } => {
                    let element = page
                        .find_element(selector.as_str())
                        .await
                        .map_err(|_| RunnerError::ElementNotFound(selector.clone()))?;
                    element
                        .click()
                        .await
                        .map_err(|e| RunnerError::Page(e.to_string()))?;
                    element
                        .type_str(text.as_str())
                        .await
                        .map_err(|e| RunnerError::Page(e.to_string()))?;
                }
                Interaction::Wait { ms } => {
                    sleep(Duration::from_millis(*ms)).await;
                }
                Interaction::WaitFor { selector } => {
                    Self::wait_for_selector(page, selector).await?;
                }
            }
        }
        Ok(())
    }

    async fn mask_elements(page: &Page, selectors: &[String]) -> Result<(), RunnerError> {
        let css = selectors
            .iter()
            .map(|selector| format!("{selector} {{ visibility: hidden !important; }}"))
            .collect::<Vec<_>>()
            .join("\n");

        let script = format!(
            "(() => {{ const style = document.createElement('style'); \
             style.textContent = {}; document.head.appendChild(style); }})()",
            serde_json::to_string(&css)?
        );

        page.evaluate(script)
            .await
            .map_err(|e| RunnerError::Page(e.to_string()))?;
        Ok(())
    }

    async fn capture_on_page(page: &Page, opts: &CaptureOptions) -> Result<Vec<u8>, RunnerError> {
        if let Some(viewport) = &opts.viewport {
            Self::set_viewport(page, viewport).await?;
        }

        page.wait_for_navigation()
            .await
            .map_err(|e| RunnerError::Page(e.to_string()))?;

        Self::run_interactions(page, &opts.interactions).await?;

        if !opts.disable_css_injection && !opts.elements_to_mask.is_empty() {
            Self::mask_elements(page, &opts.elements_to_mask).await?;
        }

        if let Some(target) = &opts.screenshot_target {
            let element = page
                .find_element(target.as_str())
                .await
                .map_err(|_| RunnerError::ElementNotFound(target.clone()))?;
            element
                .screenshot(CaptureScreenshotFormat::Png)
                .await
                .map_err(|e| RunnerError::Capture(e.to_string()))
        } else {
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build();
            page.screenshot(params)
                .await
                .map_err(|e| RunnerError::Capture(e.to_string()))
        }
    }
}

#[async_trait]
impl BrowserAdapter for ChromiumAdapter {
    async fn init(&self, browser: &str, viewport: Option<&Viewport>) -> Result<(), RunnerError> {
        let window = viewport.cloned().unwrap_or_else(|| self.options.window.clone());
        let config = self.browser_config(&window)?;

        let (chrome, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RunnerError::BrowserLaunchFailed(e.to_string()))?;

        // The handler implements Stream and must be polled for the CDP
        // connection to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {e}");
                }
            }
        });

        let mut state = self.state.lock().await;
        *state = Some(ChromiumState {
            browser: chrome,
            handler: handler_task,
        });

        info!("Chromium launched for browser target '{browser}'");
        Ok(())
    }

    async fn open_page(&self, url: &str) -> Result<Box<dyn PageHandle>, RunnerError> {
        let page = self.new_page(url).await?;
        Ok(Box::new(ChromiumPage {
            url: url.to_string(),
            page,
        }))
    }

    async fn capture(&self, opts: &CaptureOptions) -> Result<ScreenshotResult, RunnerError> {
        url::Url::parse(&opts.url).map_err(|_| RunnerError::InvalidUrl(opts.url.clone()))?;

        let started = Instant::now();
        let page = self.new_page(&opts.url).await?;

        let captured = Self::capture_on_page(&page, opts).await;
        // The page is closed on every exit path.
        let _ = page.close().await;
        let buffer = captured?;

        Ok(ScreenshotResult {
            buffer,
            meta: ScreenshotMeta {
                id: opts.id.clone(),
                elapsed: started.elapsed(),
                viewport_key: opts.viewport_key.clone(),
            },
        })
    }

    async fn dispose(&self) -> Result<(), RunnerError> {
        let state = self.state.lock().await.take();
        if let Some(mut state) = state {
            let _ = state.browser.close().await;
            state.handler.abort();
        }
        Ok(())
    }
}

struct ChromiumPage {
    url: String,
    page: Page,
}

#[async_trait]
impl PageHandle for ChromiumPage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn close(&self) -> Result<(), RunnerError> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| RunnerError::Page(e.to_string()))?;
        Ok(())
    }
}
