use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::proxy::{ProbeOutcome, ProbeTask, ProxyPool};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

/// Everything a single browser launch needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    pub headless: bool,
    pub proxy: Option<String>,
    pub window_size: (u32, u32),
    pub user_agent: Option<String>,
    pub page_load_timeout: Duration,
}

/// Why a navigation did not yield a page
#[derive(Debug)]
pub enum RenderFailure {
    /// Navigation or the marker wait did not finish in time
    Timeout,
    Other(anyhow::Error),
}

/// One live browser, able to open a page and wait for a marker element
pub trait BrowserSession: Send + 'static {
    fn open(&mut self, url: &str, marker: &str, wait: Duration) -> Result<String, RenderFailure>;
}

/// Starts browser sessions; blocking, so probes run it on the blocking pool
pub trait SessionLauncher: Send + Sync + 'static {
    type Session: BrowserSession;

    fn launch(&self, settings: &LaunchSettings) -> Result<Self::Session>;
}

/// Headless Chrome via the DevTools protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeLauncher;

pub struct ChromeSession {
    // Dropping the browser kills the Chrome process.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    fn launch(&self, settings: &LaunchSettings) -> Result<ChromeSession> {
        info!(
            "Launching Chrome (headless: {}, proxy: {}, window: {}x{})",
            settings.headless,
            settings.proxy.as_deref().unwrap_or("direct"),
            settings.window_size.0,
            settings.window_size.1
        );

        let mut flags = vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        if let Some(user_agent) = &settings.user_agent {
            flags.push(format!("--user-agent={user_agent}"));
        }
        if let Some(proxy) = &settings.proxy {
            flags.push(format!("--proxy-server={proxy}"));
        }
        let args: Vec<&OsStr> = flags.iter().map(OsStr::new).collect();

        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .window_size(Some(settings.window_size))
            .idle_browser_timeout(Duration::from_secs(300))
            .args(args)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;
        tab.set_default_timeout(settings.page_load_timeout);

        Ok(ChromeSession {
            _browser: browser,
            tab,
        })
    }
}

impl BrowserSession for ChromeSession {
    fn open(&mut self, url: &str, marker: &str, wait: Duration) -> Result<String, RenderFailure> {
        if let Err(err) = self
            .tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
        {
            debug!("Navigation to {} stalled: {:#}", url, err);
            return Err(RenderFailure::Timeout);
        }

        if let Err(err) = self.tab.wait_for_element_with_custom_timeout(marker, wait) {
            debug!("Marker `{}` missing on {}: {:#}", marker, url, err);
            return Err(RenderFailure::Timeout);
        }

        self.tab.get_content().map_err(RenderFailure::Other)
    }
}

/// Knobs for a [`Driver`]
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub headless: bool,
    pub randomize_user_agent: bool,
    pub render_timeout: Duration,
    pub page_load_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_probe_attempts: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            headless: false,
            randomize_user_agent: true,
            render_timeout: Duration::from_secs(10),
            page_load_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(10),
            max_probe_attempts: 10,
        }
    }
}

/// Browser session owned by one scraping adapter.
///
/// A page that stalls triggers a full session restart and one more attempt;
/// a second stall is returned as [`ScrapeError::RenderTimeout`].
pub struct Driver<L: SessionLauncher = ChromeLauncher> {
    launcher: Arc<L>,
    options: DriverOptions,
    proxies: Option<ProxyPool>,
    session: Option<L::Session>,
    restarts: usize,
}

impl<L: SessionLauncher> Driver<L> {
    /// Launch the first session, vetting proxies first when a pool is given
    pub async fn start(
        launcher: L,
        options: DriverOptions,
        proxies: Option<ProxyPool>,
    ) -> ScrapeResult<Self> {
        let mut driver = Self {
            launcher: Arc::new(launcher),
            options,
            proxies,
            session: None,
            restarts: 0,
        };
        let session = driver.launch().await?;
        driver.session = Some(session);
        Ok(driver)
    }

    /// Number of session restarts caused by stalled pages
    pub fn restarts(&self) -> usize {
        self.restarts
    }

    /// Open `url` and return its HTML once `marker` is present
    pub async fn render(&mut self, url: &str, marker: &str) -> ScrapeResult<String> {
        debug!("Rendering {}", url);
        match self.open_in_session(url, marker) {
            Ok(html) => return Ok(html),
            Err(RenderFailure::Timeout) => {
                warn!("Timed out waiting for `{}` on {}, restarting browser", marker, url);
            }
            Err(RenderFailure::Other(err)) => return Err(ScrapeError::Browser(err)),
        }

        self.restart().await?;

        match self.open_in_session(url, marker) {
            Ok(html) => Ok(html),
            Err(RenderFailure::Timeout) => Err(ScrapeError::RenderTimeout {
                url: url.to_string(),
                marker: marker.to_string(),
                timeout: self.options.render_timeout,
            }),
            Err(RenderFailure::Other(err)) => Err(ScrapeError::Browser(err)),
        }
    }

    fn open_in_session(&mut self, url: &str, marker: &str) -> Result<String, RenderFailure> {
        let wait = self.options.render_timeout;
        match self.session.as_mut() {
            Some(session) => session.open(url, marker, wait),
            None => Err(RenderFailure::Other(anyhow::anyhow!(
                "no browser session is running"
            ))),
        }
    }

    async fn restart(&mut self) -> ScrapeResult<()> {
        self.session = None;
        self.restarts += 1;
        let session = self.launch().await?;
        self.session = Some(session);
        Ok(())
    }

    async fn launch(&mut self) -> ScrapeResult<L::Session> {
        let proxy = self.verified_proxy().await?;
        let settings = launch_settings(&self.options, proxy);
        self.launcher.launch(&settings).map_err(ScrapeError::Browser)
    }

    async fn verified_proxy(&mut self) -> ScrapeResult<Option<String>> {
        let attempts = self.options.max_probe_attempts;
        let Some(pool) = self.proxies.as_mut() else {
            return Ok(None);
        };

        for attempt in 1..=attempts {
            let candidate = pool.next_candidate();
            let settings = launch_settings(&self.options, Some(candidate.clone()));
            let probe = ProbeTask::spawn(Arc::clone(&self.launcher), settings);

            match probe.join(self.options.probe_timeout).await {
                ProbeOutcome::Verified => {
                    info!("✅ Proxy {} verified on attempt {}", candidate, attempt);
                    return Ok(Some(candidate));
                }
                ProbeOutcome::Failed(err) => {
                    warn!("Proxy {} failed ({}/{}): {:#}", candidate, attempt, attempts, err);
                }
                ProbeOutcome::TimedOut => {
                    warn!("Proxy {} timed out ({}/{})", candidate, attempt, attempts);
                }
            }
        }

        Err(ScrapeError::ProxyExhausted { attempts })
    }
}

/// Fresh viewport, and user agent when enabled, for every launch
fn launch_settings(options: &DriverOptions, proxy: Option<String>) -> LaunchSettings {
    let mut rng = rand::thread_rng();
    let window_size = (rng.gen_range(1000..2000), rng.gen_range(800..1200));
    let user_agent = if options.randomize_user_agent {
        USER_AGENTS.choose(&mut rng).map(|ua| ua.to_string())
    } else {
        None
    };

    LaunchSettings {
        headless: options.headless,
        proxy,
        window_size,
        user_agent,
        page_load_timeout: options.page_load_timeout,
    }
}
