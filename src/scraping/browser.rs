use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{BrowserSession, SessionError, SessionLauncher};

const CHROME_ARGS: [&str; 5] = [
    "--disable-gpu",
    "--disable-webgl",
    "--disable-software-rasterizer",
    "--disable-features=WebGPU",
    "--disable-dev-shm-usage",
];

/// Starts one headless Chrome per session.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    page_load_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(page_load_timeout: Duration) -> Self {
        Self { page_load_timeout }
    }
}

pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Option<Page>,
    page_load_timeout: Duration,
}

impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    async fn launch(&self) -> Result<ChromeSession, SessionError> {
        let mut builder = BrowserConfig::builder().no_sandbox();
        for arg in CHROME_ARGS {
            builder = builder.arg(arg);
        }
        let config = builder.build().map_err(SessionError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| SessionError::Launch(err.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!("browser handler stopped: {err}");
                    break;
                }
            }
        });

        Ok(ChromeSession {
            browser,
            handler,
            page: None,
            page_load_timeout: self.page_load_timeout,
        })
    }
}

impl BrowserSession for ChromeSession {
    async fn open(&mut self, url: &str) -> Result<(), SessionError> {
        let secs = self.page_load_timeout.as_secs();
        let navigation = async {
            let page = self.browser.new_page(url).await?;
            page.wait_for_navigation().await?;
            Ok::<Page, chromiumoxide::error::CdpError>(page)
        };

        let page = timeout(self.page_load_timeout, navigation)
            .await
            .map_err(|_| SessionError::Timeout {
                url: url.to_string(),
                secs,
            })?
            .map_err(|err| SessionError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            })?;

        self.page = Some(page);
        Ok(())
    }

    async fn scroll_by(&mut self, pixels: u32) -> Result<(), SessionError> {
        let page = self.page.as_ref().ok_or(SessionError::NoPage)?;
        page.evaluate(format!("window.scrollBy(0, {pixels});"))
            .await
            .map_err(|err| SessionError::Command(err.to_string()))?;
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        let page = self.page.as_ref().ok_or(SessionError::NoPage)?;
        page.content()
            .await
            .map_err(|err| SessionError::Command(err.to_string()))
    }

    async fn close(mut self) -> Result<(), SessionError> {
        let closed = self
            .browser
            .close()
            .await
            .map_err(|err| SessionError::Command(err.to_string()));
        if let Err(err) = self.browser.wait().await {
            warn!("browser process did not exit cleanly: {err}");
        }
        self.handler.abort();
        closed.map(|_| ())
    }
}
