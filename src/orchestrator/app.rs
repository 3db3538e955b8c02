//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **初始化**：连接浏览器、打开会话存储、编译 URL 模式
//! 2. **页面扫描**：定期列出浏览器标签页，为答题页面启动 `PageDriver`，
//!    为 AI 聊天页面启动 `BridgeDriver`
//! 3. **路由**：启动路由任务、api 目标和控制台命令读取
//! 4. **设置页面**：收到 openSettings 时打开设置地址
//!
//! 每个页面上下文是独立的任务，互不共享状态；任务结束后若页面仍在，下一次扫描会重新接管。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, Page};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser;
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::js_executor::JsExecutor;
use crate::infrastructure::store::{ConfigStore, TomlFileStore};
use crate::models::ai_service::AiService;
use crate::orchestrator::api_destination::spawn_api_destination;
use crate::orchestrator::bridge_driver::BridgeDriver;
use crate::orchestrator::control::run_console;
use crate::orchestrator::page_driver::PageDriver;
use crate::orchestrator::router_task::{run_router, RouterHandle};
use crate::services::notify_client::NotifyClient;
use crate::services::reporting_client::ReportingClient;
use crate::services::url_pattern::{matches_any, UrlPattern};
use crate::utils::logging::log_startup;
use crate::workflow::agent::Agent;
use crate::workflow::bridge_session::BridgeSession;
use crate::workflow::router::{ContextId, Router};

/// 驱动任务共享的依赖
struct DriverDeps {
    router: RouterHandle,
    notify: Arc<NotifyClient>,
    reporting: Arc<ReportingClient>,
    clock: SystemClock,
}

/// 应用主结构
pub struct App {
    config: Config,
    browser: Browser,
    store: Arc<dyn ConfigStore>,
    http: reqwest::Client,
    consumers: Vec<UrlPattern>,
    services: Vec<(AiService, UrlPattern)>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config);

        let consumers = UrlPattern::parse_all(&config.consumer_url_patterns)?;
        let services = AiService::page_services()
            .into_iter()
            .map(|service| Ok((service, UrlPattern::new(service.url_pattern())?)))
            .collect::<AppResult<Vec<_>>>()?;

        // 连接浏览器，没有答题页面时打开目标地址
        let (browser, page) = browser::connect_to_browser_and_page(
            config.browser_debug_port,
            &config.target_url,
            &consumers,
        )
        .await?;
        debug!("初始页面: {:?}", page.url().await.ok().flatten());

        let store: Arc<dyn ConfigStore> = Arc::new(TomlFileStore::open(&config.store_path)?);

        Ok(Self {
            config,
            browser,
            store,
            http: reqwest::Client::new(),
            consumers,
            services,
        })
    }

    /// 运行直到收到 Ctrl-C
    pub async fn run(self) -> AppResult<()> {
        let router = Router::new(self.store.clone(), self.consumers.clone())?;
        let (router_tx, router_rx) = mpsc::unbounded_channel();
        let (settings_tx, mut settings_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_router(router, router_rx, settings_tx));

        if self.config.has_llm_api() {
            spawn_api_destination(&self.config, router_tx.clone());
        }
        tokio::spawn(run_console(router_tx.clone()));

        let deps = DriverDeps {
            router: router_tx,
            notify: Arc::new(NotifyClient::new(self.http.clone(), &self.config.notify_host)),
            reporting: Arc::new(ReportingClient::new(
                self.http.clone(),
                &self.config.reporting_api_base,
                &self.config.reporting_origin,
            )),
            clock: SystemClock::new(),
        };

        let mut drivers: HashMap<ContextId, JoinHandle<()>> = HashMap::new();
        let mut scan = tokio::time::interval(Duration::from_millis(self.config.tab_scan_ms));

        loop {
            tokio::select! {
                _ = scan.tick() => {
                    if let Err(e) = self.scan_tabs(&mut drivers, &deps).await {
                        if e.is_context_invalidated() {
                            warn!("⚠️ 与浏览器的连接已断开: {}", e);
                            break;
                        }
                        warn!("⚠️ 扫描标签页失败: {}", e);
                    }
                }
                Some(()) = settings_rx.recv() => {
                    match browser::open_page(&self.browser, &self.config.settings_url).await {
                        Ok(_) => info!("⚙ 已打开设置页面"),
                        Err(e) => warn!("⚠️ 打开设置页面失败: {}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("👋 收到退出信号");
                    break;
                }
            }
        }

        for (_, handle) in drivers {
            handle.abort();
        }
        Ok(())
    }

    async fn scan_tabs(
        &self,
        drivers: &mut HashMap<ContextId, JoinHandle<()>>,
        deps: &DriverDeps,
    ) -> AppResult<()> {
        drivers.retain(|_, handle| !handle.is_finished());

        for page in self.browser.pages().await? {
            let id: ContextId = page.target_id().inner().clone();
            if drivers.contains_key(&id) {
                continue;
            }
            let Ok(Some(url)) = page.url().await else {
                continue;
            };
            if let Some(handle) = self.spawn_driver(id.clone(), &url, page, deps) {
                drivers.insert(id, handle);
            }
        }
        Ok(())
    }

    fn spawn_driver(
        &self,
        id: ContextId,
        url: &str,
        page: Page,
        deps: &DriverDeps,
    ) -> Option<JoinHandle<()>> {
        if matches_any(&self.consumers, url) {
            info!("🧩 接管答题页面 {}: {}", id, url);
            let settings = self.config.agent_settings();
            let profile = settings.locator.clone();
            let agent = Agent::new(
                settings,
                self.store.clone(),
                Arc::new(deps.clock.clone()),
                StdRng::from_os_rng(),
            );
            let (driver, feedback_rx) = PageDriver::new(
                id,
                JsExecutor::new(page),
                agent,
                profile,
                deps.clock.clone(),
                deps.notify.clone(),
                deps.reporting.clone(),
                deps.router.clone(),
            );
            return Some(tokio::spawn(driver.run(feedback_rx)));
        }

        let service = self
            .services
            .iter()
            .find(|(_, pattern)| pattern.matches(url))
            .map(|(service, _)| *service)?;
        let profile = service.page_profile()?;
        info!("🤖 接管 {} 页面 {}: {}", service, id, url);
        let session = BridgeSession::new(
            self.config.bridge_settings(service),
            Arc::new(deps.clock.clone()),
        );
        let driver = BridgeDriver::new(
            id,
            JsExecutor::new(page),
            session,
            profile,
            deps.clock.clone(),
            deps.router.clone(),
        );
        Some(tokio::spawn(driver.run()))
    }
}
