//! AI 页面驱动
//!
//! 在 ChatGPT / Gemini / DeepSeek 页面上运行 `BridgeSession`

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::js_executor::JsExecutor;
use crate::models::ai_service::PageProfile;
use crate::orchestrator::page_driver::sleep_until_deadline;
use crate::orchestrator::router_task::{RouterCommand, RouterHandle};
use crate::utils::logging::log_context_stopped;
use crate::workflow::bridge_session::{BridgeEffect, BridgeSession};
use crate::workflow::router::ContextId;

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

pub struct BridgeDriver {
    id: ContextId,
    executor: JsExecutor,
    session: BridgeSession,
    profile: &'static PageProfile,
    clock: SystemClock,
    router: RouterHandle,
}

impl BridgeDriver {
    pub fn new(
        id: ContextId,
        executor: JsExecutor,
        session: BridgeSession,
        profile: &'static PageProfile,
        clock: SystemClock,
        router: RouterHandle,
    ) -> Self {
        Self {
            id,
            executor,
            session,
            profile,
            clock,
            router,
        }
    }

    pub async fn run(mut self) {
        let reason = match self.drive().await {
            Ok(()) => "closed".to_string(),
            Err(e) if e.is_context_invalidated() => format!("context invalidated ({})", e),
            Err(e) => {
                error!("❌ {} 页面 {} 出错: {}", self.session.service(), self.id, e);
                e.to_string()
            }
        };
        let _ = self.router.send(RouterCommand::Unregister {
            id: self.id.clone(),
        });
        log_context_stopped(&format!("{} 页面 {}", self.session.service(), self.id), &reason);
    }

    async fn drive(&mut self) -> AppResult<()> {
        let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
        let url = self.executor.current_url().await?;
        self.router
            .send(RouterCommand::Register {
                id: self.id.clone(),
                url,
                inbox: inbox_tx,
            })
            .map_err(|_| AppError::ContextInvalidated("路由任务已结束".into()))?;

        loop {
            let deadline = self.session.next_deadline().map(|d| self.clock.instant_at(d));
            tokio::select! {
                message = inbox.recv() => match message {
                    Some(message) => {
                        self.session.receive(message);
                    }
                    None => return Ok(()),
                },
                _ = sleep_until_deadline(deadline) => {
                    if let Err(e) = self.fire().await {
                        if e.is_context_invalidated() {
                            return Err(e);
                        }
                        warn!("⚠️ {} 页面操作失败: {}", self.session.service(), e);
                        sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }
    }

    async fn fire(&mut self) -> AppResult<()> {
        let page = self.executor.bridge_snapshot(self.profile).await?;
        let _ = self.router.send(RouterCommand::UpdateUrl {
            id: self.id.clone(),
            url: page.url.clone(),
        });
        for effect in self.session.fire_due(&page) {
            match effect {
                BridgeEffect::FillPrompt(text) => {
                    if !self.executor.bridge_fill(self.profile, &text).await? {
                        warn!("⚠️ 填写提示词失败");
                    }
                }
                BridgeEffect::ClickSend => {
                    if !self.executor.bridge_send(self.profile).await? {
                        warn!("⚠️ 发送按钮不可用");
                    }
                }
                BridgeEffect::Reply(message) => {
                    debug!("回复路由器: {}", message.tag());
                    let _ = self.router.send(RouterCommand::Deliver {
                        from: self.id.clone(),
                        message,
                    });
                }
            }
        }
        Ok(())
    }
}
