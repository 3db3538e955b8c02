//! 答题页面驱动
//!
//! 每个答题页面一个 tokio 任务：把页面绑定推送的变更、路由器投递的消息和到期的
//! 定时器转换为 agent 输入，每次处理前重新读取页面快照，再执行 agent 返回的副作用。
//! 页面上下文失效时触发 kill switch，任务结束。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::js_protocol::runtime::EventBindingCalled;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::js_executor::JsExecutor;
use crate::infrastructure::scripts::MUTATION_BINDING;
use crate::models::message::Message;
use crate::models::snapshot::DomSnapshot;
use crate::orchestrator::router_task::{RouterCommand, RouterHandle};
use crate::services::element_locator::LocatorProfile;
use crate::services::notify_client::NotifyClient;
use crate::services::reporting_client::ReportingClient;
use crate::utils::logging::log_context_stopped;
use crate::workflow::agent::{Agent, Input};
use crate::workflow::change_observer::ChangeObserver;
use crate::workflow::effect::Effect;
use crate::workflow::router::ContextId;

/// 快照读取失败后的退避时间（页面正在导航）
const SNAPSHOT_BACKOFF: Duration = Duration::from_millis(200);
/// 处理一次输入最多读取快照的次数
const SNAPSHOT_ATTEMPTS: usize = 5;

pub struct PageDriver {
    id: ContextId,
    executor: JsExecutor,
    agent: Agent,
    profile: LocatorProfile,
    clock: SystemClock,
    notify: Arc<NotifyClient>,
    reporting: Arc<ReportingClient>,
    router: RouterHandle,
    /// 异步副作用的结果回到 agent
    feedback: mpsc::UnboundedSender<Input>,
    last_url: String,
}

impl PageDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ContextId,
        executor: JsExecutor,
        agent: Agent,
        profile: LocatorProfile,
        clock: SystemClock,
        notify: Arc<NotifyClient>,
        reporting: Arc<ReportingClient>,
        router: RouterHandle,
    ) -> (Self, mpsc::UnboundedReceiver<Input>) {
        let (feedback, feedback_rx) = mpsc::unbounded_channel();
        let driver = Self {
            id,
            executor,
            agent,
            profile,
            clock,
            notify,
            reporting,
            router,
            feedback,
            last_url: String::new(),
        };
        (driver, feedback_rx)
    }

    /// 运行直到页面关闭或上下文失效
    pub async fn run(mut self, feedback_rx: mpsc::UnboundedReceiver<Input>) {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let reason = match self.drive(inbox_tx, inbox, feedback_rx).await {
            Ok(()) => "closed".to_string(),
            Err(e) if e.is_context_invalidated() => {
                self.agent.kill();
                format!("context invalidated ({})", e)
            }
            Err(e) => {
                error!("❌ 答题页面 {} 出错: {}", self.id, e);
                self.agent.kill();
                e.to_string()
            }
        };
        let _ = self.router.send(RouterCommand::Unregister {
            id: self.id.clone(),
        });
        log_context_stopped(&format!("答题页面 {}", self.id), &reason);
    }

    async fn drive(
        &mut self,
        inbox_tx: mpsc::UnboundedSender<Message>,
        mut inbox: mpsc::UnboundedReceiver<Message>,
        mut feedback_rx: mpsc::UnboundedReceiver<Input>,
    ) -> AppResult<()> {
        self.executor.add_binding(MUTATION_BINDING).await?;
        let mut bindings = self
            .executor
            .page()
            .event_listener::<EventBindingCalled>()
            .await?;

        let dom = self.executor.snapshot(&self.profile).await?;
        self.last_url = dom.url.clone();
        self.router
            .send(RouterCommand::Register {
                id: self.id.clone(),
                url: dom.url.clone(),
                inbox: inbox_tx,
            })
            .map_err(|_| AppError::ContextInvalidated("路由任务已结束".into()))?;
        let effects = self.agent.handle(Input::Boot, &dom);
        self.execute(effects).await?;

        loop {
            let deadline = self.agent.next_deadline().map(|d| self.clock.instant_at(d));
            tokio::select! {
                event = bindings.next() => {
                    let Some(event) = event else {
                        return Err(AppError::ContextInvalidated("页面事件流已关闭".into()));
                    };
                    if event.name != MUTATION_BINDING {
                        continue;
                    }
                    let now_ms = self.clock.now().as_millis() as u64;
                    match ChangeObserver::normalize(&event.payload, now_ms) {
                        Ok(batch) if !batch.is_empty() => self.step(Input::Mutations(batch)).await?,
                        Ok(_) => {}
                        Err(e) => warn!("⚠️ 变更批次无法解析: {}", e),
                    }
                }
                message = inbox.recv() => match message {
                    Some(message) => self.step(Input::Message(message)).await?,
                    None => return Ok(()),
                },
                Some(input) = feedback_rx.recv() => self.step(input).await?,
                _ = sleep_until_deadline(deadline) => self.fire().await?,
            }
        }
    }

    /// 读取快照；页面导航中的脚本错误返回 None，上下文失效向上传递
    async fn read_snapshot(&self) -> AppResult<Option<DomSnapshot>> {
        match self.executor.snapshot(&self.profile).await {
            Ok(dom) => Ok(Some(dom)),
            Err(e) if e.is_context_invalidated() => Err(e),
            Err(e) => {
                debug!("读取页面快照失败: {}", e);
                Ok(None)
            }
        }
    }

    fn note_url(&mut self, dom: &DomSnapshot) {
        if dom.url != self.last_url {
            self.last_url = dom.url.clone();
            let _ = self.router.send(RouterCommand::UpdateUrl {
                id: self.id.clone(),
                url: dom.url.clone(),
            });
        }
    }

    /// 事件输入不能丢，快照读不到时退避重试
    async fn step(&mut self, input: Input) -> AppResult<()> {
        let this: &Self = self;
        let snapshot =
            retry_snapshot(SNAPSHOT_ATTEMPTS, SNAPSHOT_BACKOFF, move || this.read_snapshot())
                .await?;
        let Some(dom) = snapshot else {
            warn!("⚠️ 页面 {} 快照连续读取失败，丢弃输入 {:?}", self.id, input);
            return Ok(());
        };
        self.note_url(&dom);
        let effects = self.agent.handle(input, &dom);
        self.execute(effects).await
    }

    /// 定时器不出队，读不到快照时下一轮再试
    async fn fire(&mut self) -> AppResult<()> {
        let Some(dom) = self.read_snapshot().await? else {
            sleep(SNAPSHOT_BACKOFF).await;
            return Ok(());
        };
        self.note_url(&dom);
        let effects = self.agent.fire_due(&dom);
        self.execute(effects).await
    }

    async fn execute(&mut self, effects: Vec<Effect>) -> AppResult<()> {
        for effect in effects {
            if let Err(e) = self.apply(effect).await {
                if e.is_context_invalidated() {
                    return Err(e);
                }
                warn!("⚠️ 页面操作失败: {}", e);
            }
        }
        Ok(())
    }

    async fn apply(&mut self, effect: Effect) -> AppResult<()> {
        match effect {
            Effect::AttachObserver => {
                let attachment = self.executor.install_observer(&self.profile).await?;
                if !attachment.attached {
                    warn!("⚠️ 根容器 {} 不存在，观察器未挂载", self.profile.root_selector);
                }
            }
            Effect::DisconnectObserver => self.executor.disconnect_observer().await?,
            Effect::Click(element) => {
                if !self.executor.click(element).await? {
                    warn!("⚠️ 元素 #{} 已不在页面上", element);
                }
            }
            Effect::FillNumeric { element, value } => {
                if !self.executor.fill(element, &value).await? {
                    warn!("⚠️ 数值输入框 #{} 已不在页面上", element);
                }
            }
            Effect::Send(message) => {
                let _ = self.router.send(RouterCommand::Deliver {
                    from: self.id.clone(),
                    message,
                });
            }
            Effect::Notify {
                kind,
                email,
                img,
                then_reload,
            } => {
                let notify = self.notify.clone();
                let executor = self.executor.clone();
                tokio::spawn(async move {
                    notify.notify_best_effort(kind, &email, img.as_deref()).await;
                    if then_reload {
                        if let Err(e) = executor.reload().await {
                            debug!("刷新页面失败: {}", e);
                        }
                    }
                });
            }
            Effect::CaptureSession => {
                let creds = self.executor.read_credentials().await?;
                let _ = self.feedback.send(Input::SessionCaptured(creds));
            }
            Effect::ResolveActivity(creds) => {
                let reporting = self.reporting.clone();
                let feedback = self.feedback.clone();
                tokio::spawn(async move {
                    let activity = match reporting.resolve_activity(&creds).await {
                        Ok(activity) => activity,
                        Err(e) => {
                            warn!("⚠️ 查询活动编号失败: {}", e);
                            None
                        }
                    };
                    let _ = feedback.send(Input::ActivityResolved(activity));
                });
            }
            Effect::FetchMajority { creds, activity_id } => {
                let reporting = self.reporting.clone();
                let feedback = self.feedback.clone();
                tokio::spawn(async move {
                    let report = match reporting.majority_answer(&creds, &activity_id).await {
                        Ok(answer) => Some(answer),
                        Err(e) => {
                            debug!("查询多数人答案失败: {}", e);
                            None
                        }
                    };
                    let _ = feedback.send(Input::MajorityReport(report));
                });
            }
        }
        Ok(())
    }
}

/// 没有定时器时永远等待
pub(crate) async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// 反复读取直到拿到快照，两次读取之间等待 `backoff`；错误立即返回
pub(crate) async fn retry_snapshot<T, F, Fut>(
    attempts: usize,
    backoff: Duration,
    mut read: F,
) -> AppResult<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<Option<T>>>,
{
    for attempt in 0..attempts {
        if attempt > 0 {
            sleep(backoff).await;
        }
        if let Some(value) = read().await? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}
