//! Bounded, rotating browser pool.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::cdp::js_protocol::heap_profiler::CollectGarbageParams;
use chromiumoxide::Page;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::error::{BrowserError, BrowserResult};
use crate::launch::launch_browser;

/// Interval of the idle-rotation sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct Slot {
    browser: Browser,
    watcher: JoinHandle<()>,
    created_at: Instant,
    pages_served: u32,
    held_pages: HashSet<TargetId>,
    idle_pages: Vec<Page>,
}

impl Slot {
    fn needs_rotation(&self, config: &BrowserConfig) -> bool {
        self.created_at.elapsed() > config.browser_ttl
            || self.pages_served >= config.max_pages_per_browser
    }
}

struct PoolInner {
    slots: HashMap<u64, Slot>,
    page_owner: HashMap<TargetId, u64>,
}

/// A page on loan from the pool.
///
/// Return it with [`BrowserPool::release_page`] or
/// [`BrowserPool::destroy_page`]; the pool keeps the reverse mapping until
/// one of those runs.
pub struct LeasedPage {
    /// The page handle
    pub page: Page,
    pub(crate) browser_id: u64,
    pub(crate) target_id: TargetId,
}

/// Per-browser statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserStat {
    pub id: u64,
    pub age_secs: u64,
    pub pages_served: u32,
    pub held_pages: usize,
    pub idle_pages: usize,
}

/// Pool-wide statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub browsers: Vec<BrowserStat>,
    pub max_concurrency: usize,
    pub total_pages_served: u64,
}

/// Shared pool of long-lived Chromium instances.
///
/// Membership updates run under one pool-level lock; page interactions
/// happen on cloneable page handles outside it. Rotation is idempotent:
/// a rotated slot is fully removed before its replacement is inserted.
pub struct BrowserPool {
    config: BrowserConfig,
    inner: Mutex<PoolInner>,
    next_id: AtomicU64,
    total_pages_served: AtomicU64,
    disconnect_tx: mpsc::UnboundedSender<u64>,
    disconnect_rx: Mutex<Option<mpsc::UnboundedReceiver<u64>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl BrowserPool {
    /// Create a pool; call [`BrowserPool::start`] to begin sweeping.
    pub fn new(config: BrowserConfig) -> Arc<Self> {
        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            config,
            inner: Mutex::new(PoolInner {
                slots: HashMap::new(),
                page_owner: HashMap::new(),
            }),
            next_id: AtomicU64::new(0),
            total_pages_served: AtomicU64::new(0),
            disconnect_tx,
            disconnect_rx: Mutex::new(Some(disconnect_rx)),
            background: Mutex::new(Vec::new()),
        })
    }

    /// Pool configuration.
    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Start the disconnect janitor and the periodic rotation sweep.
    pub async fn start(self: &Arc<Self>) {
        let mut rx = self
            .disconnect_rx
            .lock()
            .await
            .take()
            .expect("pool already started");

        let pool = Arc::clone(self);
        let janitor = tokio::spawn(async move {
            while let Some(id) = rx.recv().await {
                pool.on_disconnected(id).await;
            }
        });

        let pool = Arc::clone(self);
        let sweeper = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await; // skip the immediate tick
            loop {
                interval.tick().await;
                pool.sweep().await;
            }
        });

        let mut background = self.background.lock().await;
        background.push(janitor);
        background.push(sweeper);
    }

    async fn launch_slot(&self) -> BrowserResult<(u64, Slot)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (browser, handler) = launch_browser(&self.config, &[]).await?;

        let tx = self.disconnect_tx.clone();
        let watcher = tokio::spawn(async move {
            let _ = handler.await;
            let _ = tx.send(id);
        });

        info!(browser_id = id, "launched browser");
        Ok((
            id,
            Slot {
                browser,
                watcher,
                created_at: Instant::now(),
                pages_served: 0,
                held_pages: HashSet::new(),
                idle_pages: Vec::new(),
            },
        ))
    }

    async fn close_slot(id: u64, mut slot: Slot) {
        slot.watcher.abort();
        if let Err(e) = slot.browser.close().await {
            warn!(browser_id = id, "graceful close failed ({}), killing", e);
            let _ = slot.browser.kill().await;
        }
        let _ = slot.browser.wait().await;
        debug!(browser_id = id, "browser closed");
    }

    /// Acquire a page, launching or rotating browsers as needed.
    ///
    /// Launch failures propagate to the caller and leave the pool usable.
    pub async fn acquire_page(&self) -> BrowserResult<LeasedPage> {
        let mut inner = self.inner.lock().await;

        // Launch a fresh browser while below the cap.
        let chosen = if inner.slots.len() < self.config.max_concurrency {
            let (id, slot) = self.launch_slot().await?;
            inner.slots.insert(id, slot);
            id
        } else {
            // Least-loaded existing browser.
            let id = inner
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.held_pages.len())
                .map(|(id, _)| *id)
                .ok_or_else(|| BrowserError::launch_failed("pool has zero capacity"))?;

            // Rotate before handing out a page from a stale slot.
            let rotate = inner
                .slots
                .get(&id)
                .map(|slot| slot.needs_rotation(&self.config))
                .unwrap_or(false);
            if rotate {
                debug!(browser_id = id, "rotating browser");
                if let Some(old) = inner.slots.remove(&id) {
                    for target in &old.held_pages {
                        inner.page_owner.remove(target);
                    }
                    for page in &old.idle_pages {
                        inner.page_owner.remove(page.target_id());
                    }
                    tokio::spawn(Self::close_slot(id, old));
                }
                match self.launch_slot().await {
                    Ok((new_id, slot)) => {
                        inner.slots.insert(new_id, slot);
                        new_id
                    }
                    Err(e) => {
                        // Rotation failure falls back to any surviving slot.
                        warn!("rotation relaunch failed: {}", e);
                        match inner.slots.keys().next().copied() {
                            Some(existing) => existing,
                            None => return Err(e),
                        }
                    }
                }
            } else {
                id
            }
        };

        let slot = inner
            .slots
            .get_mut(&chosen)
            .ok_or(BrowserError::UnknownBrowser(chosen))?;

        let page = match slot.idle_pages.pop() {
            Some(page) => page,
            None => slot
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::page_failed(e.to_string()))?,
        };

        let target_id = page.target_id().clone();
        slot.pages_served += 1;
        slot.held_pages.insert(target_id.clone());
        inner.page_owner.insert(target_id.clone(), chosen);
        self.total_pages_served.fetch_add(1, Ordering::Relaxed);

        Ok(LeasedPage {
            page,
            browser_id: chosen,
            target_id,
        })
    }

    /// Return a page to the idle set: blank it and reclaim memory. A page
    /// that fails the reset is destroyed instead.
    pub async fn release_page(&self, lease: LeasedPage) {
        let reset = async {
            lease.page.goto("about:blank").await?;
            lease.page.execute(CollectGarbageParams::default()).await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        match reset.await {
            Ok(()) => {
                let mut inner = self.inner.lock().await;
                if let Some(slot) = inner.slots.get_mut(&lease.browser_id) {
                    slot.held_pages.remove(&lease.target_id);
                    slot.idle_pages.push(lease.page);
                } else {
                    inner.page_owner.remove(&lease.target_id);
                }
            }
            Err(e) => {
                debug!("page reset failed ({}), destroying", e);
                self.destroy_page(lease).await;
            }
        }
    }

    /// Close a page and drop it from the reverse map.
    pub async fn destroy_page(&self, lease: LeasedPage) {
        {
            let mut inner = self.inner.lock().await;
            inner.page_owner.remove(&lease.target_id);
            if let Some(slot) = inner.slots.get_mut(&lease.browser_id) {
                slot.held_pages.remove(&lease.target_id);
            }
        }
        if let Err(e) = lease.page.close().await {
            debug!("page close failed: {}", e);
        }
    }

    /// Terminate one browser: graceful close, then forced kill.
    /// Returns false when the ID is unknown.
    pub async fn terminate(&self, browser_id: u64) -> bool {
        let slot = {
            let mut inner = self.inner.lock().await;
            let slot = inner.slots.remove(&browser_id);
            if slot.is_some() {
                inner.page_owner.retain(|_, owner| *owner != browser_id);
            }
            slot
        };
        match slot {
            Some(slot) => {
                Self::close_slot(browser_id, slot).await;
                true
            }
            None => false,
        }
    }

    /// Close every browser. Used at shutdown.
    pub async fn close_all(&self) {
        let slots: Vec<(u64, Slot)> = {
            let mut inner = self.inner.lock().await;
            inner.page_owner.clear();
            inner.slots.drain().collect()
        };
        for (id, slot) in slots {
            Self::close_slot(id, slot).await;
        }
        info!("browser pool closed");
    }

    /// Remove a browser whose process disconnected underneath us.
    async fn on_disconnected(&self, browser_id: u64) {
        let mut inner = self.inner.lock().await;
        if let Some(slot) = inner.slots.remove(&browser_id) {
            warn!(browser_id, held = slot.held_pages.len(), "browser disconnected");
            inner.page_owner.retain(|_, owner| *owner != browser_id);
            slot.watcher.abort();
        }
    }

    /// Rotate idle browsers that have outlived their TTL or page budget.
    pub async fn sweep(&self) {
        let expired: Vec<(u64, Slot)> = {
            let mut inner = self.inner.lock().await;
            let ids: Vec<u64> = inner
                .slots
                .iter()
                .filter(|(_, slot)| slot.held_pages.is_empty() && slot.needs_rotation(&self.config))
                .map(|(id, _)| *id)
                .collect();
            let mut expired = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(slot) = inner.slots.remove(&id) {
                    for page in &slot.idle_pages {
                        inner.page_owner.remove(page.target_id());
                    }
                    expired.push((id, slot));
                }
            }
            expired
        };

        for (id, slot) in expired {
            debug!(browser_id = id, "sweeping idle browser");
            Self::close_slot(id, slot).await;
        }
    }

    /// Current pool statistics.
    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        let mut browsers: Vec<BrowserStat> = inner
            .slots
            .iter()
            .map(|(id, slot)| BrowserStat {
                id: *id,
                age_secs: slot.created_at.elapsed().as_secs(),
                pages_served: slot.pages_served,
                held_pages: slot.held_pages.len(),
                idle_pages: slot.idle_pages.len(),
            })
            .collect();
        browsers.sort_by_key(|b| b.id);
        PoolStats {
            browsers,
            max_concurrency: self.config.max_concurrency,
            total_pages_served: self.total_pages_served.load(Ordering::Relaxed),
        }
    }

    /// Browser process information for diagnostics.
    pub async fn process_info(&self) -> Vec<serde_json::Value> {
        let inner = self.inner.lock().await;
        let mut info = Vec::new();
        for (id, slot) in inner.slots.iter() {
            let version = slot
                .browser
                .version()
                .await
                .map(|v| v.product)
                .unwrap_or_else(|_| "unreachable".to_string());
            info.push(serde_json::json!({
                "id": id,
                "product": version,
                "age_secs": slot.created_at.elapsed().as_secs(),
                "pages_served": slot.pages_served,
                "held_pages": slot.held_pages.len(),
            }));
        }
        info.sort_by_key(|v| v["id"].as_u64());
        info
    }

    /// Abort background tasks. Browsers themselves are closed by
    /// [`BrowserPool::close_all`].
    pub async fn stop_background(&self) {
        for task in self.background.lock().await.drain(..) {
            task.abort();
        }
    }
}
