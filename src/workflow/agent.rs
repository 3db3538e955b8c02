//! 答题页面 agent
//!
//! 一个答题页面上下文的全部状态都在这里：观察器订阅、题目检测、指纹锁、
//! 在途 AI 请求、命名定时器。agent 不直接接触页面，每次输入都带着一份
//! 最新的页面快照，返回需要执行的副作用列表。

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::clock::Clock;
use crate::infrastructure::scheduler::Scheduler;
use crate::infrastructure::store::ConfigStore;
use crate::models::ai_service::AiService;
use crate::models::message::{ControlCommand, Message};
use crate::models::page_event::{PageEvent, PageEventKind};
use crate::models::question::{Fingerprint, QuestionKind, QuestionSnapshot, LETTERS};
use crate::models::session::{SessionConfig, PREV_PAGE_COURSES, PREV_PAGE_POLL};
use crate::models::snapshot::{DomSnapshot, ElementRef};
use crate::services::element_locator::{ElementLocator, LocatorProfile};
use crate::services::fingerprint_gate::{FingerprintGate, GateDecision};
use crate::services::notify_client::{NotifyKind, DEFAULT_QUESTION_IMAGE};
use crate::services::reporting_client::{MajorityAnswer, SessionCredentials};
use crate::utils::logging::{log_context_stopped, truncate_text};
use crate::workflow::answer_dispatcher::{
    index_target, interpret_reply, letter_target, pick_letter, plan, DispatchPlan, ReplyAction,
};
use crate::workflow::change_observer::ChangeObserver;
use crate::workflow::credential_capture::CredentialCapture;
use crate::workflow::effect::Effect;
use crate::workflow::question_detector::{OverviewSignal, PageSection, QuestionDetector};

/// 节奏参数
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// 题目容器出现后等待 DOM 稳定
    pub question_settle: Duration,
    /// 新指纹上锁后到开始作答
    pub answer_delay: Duration,
    /// 直接选择前的等待
    pub select_delay: Duration,
    /// 文字匹配成功后的点击等待
    pub click_delay: Duration,
    /// 写入数值后到点击提交
    pub submit_delay: Duration,
    pub ai_timeout: Duration,
    pub url_watch: Duration,
    pub boot_resume: Duration,
    pub observer_retry: Duration,
    pub majority_poll: Duration,
    pub default_letter: char,
    pub follow_majority: bool,
    pub majority_default_index: usize,
    pub locator: LocatorProfile,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Config::default().agent_settings()
    }
}

/// agent 的命名定时器，同名定时器重新调度会替换旧的截止时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    QuestionSettle,
    AnswerDelay,
    SelectDelay,
    ClickDelay,
    SubmitDelay,
    AiTimeout,
    MajorityPoll,
    UrlWatch,
    BootResume,
    ObserverRetry,
}

/// 题目变化时作废的定时器
const QUESTION_TIMERS: [Timer; 6] = [
    Timer::QuestionSettle,
    Timer::AnswerDelay,
    Timer::SelectDelay,
    Timer::ClickDelay,
    Timer::SubmitDelay,
    Timer::MajorityPoll,
];

/// agent 的输入
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// 页面上下文刚建立
    Boot,
    /// 观察器推送的一批页面事件
    Mutations(Vec<PageEvent>),
    /// 路由器投递的消息
    Message(Message),
    SessionCaptured(SessionCredentials),
    ActivityResolved(Option<String>),
    /// 多数人答案；None 表示本次查询失败
    MajorityReport(Option<MajorityAnswer>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    /// 用户发出停止命令
    Manual,
    /// 从答题页回到概览页
    ClassEnded,
}

impl StopReason {
    fn as_str(self) -> &'static str {
        match self {
            StopReason::Manual => "manual",
            StopReason::ClassEnded => "default",
        }
    }
}

#[derive(Debug, Clone)]
struct AiRequest {
    fingerprint: Fingerprint,
    kind: QuestionKind,
}

pub struct Agent {
    settings: AgentSettings,
    session: SessionConfig,
    store: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    scheduler: Scheduler<Timer>,
    observer: ChangeObserver,
    detector: QuestionDetector,
    gate: FingerprintGate,
    locator: ElementLocator,
    credentials: CredentialCapture,
    /// 最多一个在途 AI 请求
    ai_request: Option<AiRequest>,
    pending_click: Option<ElementRef>,
    /// 正在轮询多数人答案
    following_majority: bool,
    /// 指纹锁每次加锁递增
    question_seq: u64,
    /// 已发送题目通知的序号
    notified_seq: u64,
    last_url: String,
    visible: bool,
    killed: bool,
}

impl Agent {
    pub fn new(
        settings: AgentSettings,
        store: Arc<dyn ConfigStore>,
        clock: Arc<dyn Clock>,
        rng: StdRng,
    ) -> Self {
        let session = SessionConfig::load(store.as_ref());
        let locator = ElementLocator::new(&settings.locator);
        let detector = QuestionDetector::new(settings.locator.question_container.clone());
        Self {
            settings,
            session,
            store,
            clock,
            rng,
            scheduler: Scheduler::new(),
            observer: ChangeObserver::new(),
            detector,
            gate: FingerprintGate::new(),
            locator,
            credentials: CredentialCapture::new(),
            ai_request: None,
            pending_click: None,
            following_majority: false,
            question_seq: 0,
            notified_seq: 0,
            last_url: String::new(),
            visible: true,
            killed: false,
        }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    pub fn observer_active(&self) -> bool {
        self.observer.is_active()
    }

    pub fn is_locked(&self) -> bool {
        self.gate.is_locked()
    }

    pub fn ai_in_flight(&self) -> bool {
        self.ai_request.is_some()
    }

    pub fn is_pending(&self, timer: Timer) -> bool {
        self.scheduler.is_pending(timer)
    }

    /// 最近一个定时器的截止时间（时钟读数）
    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    /// 页面上下文已失效：停止全部观察器和定时器，之后的输入一律忽略
    pub fn kill(&mut self) {
        if self.killed {
            return;
        }
        warn!("💀 页面上下文已失效，停止观察器和全部定时器");
        self.killed = true;
        self.scheduler.clear();
        self.observer.kill();
        self.ai_request = None;
        self.pending_click = None;
        self.following_majority = false;
        self.gate.reset();
    }

    pub fn handle(&mut self, input: Input, dom: &DomSnapshot) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.killed {
            return fx;
        }
        match input {
            Input::Boot => self.on_boot(dom, &mut fx),
            Input::Mutations(events) => self.on_mutations(&events, dom, &mut fx),
            Input::Message(message) => self.on_message(message, dom, &mut fx),
            Input::SessionCaptured(creds) => fx.extend(self.credentials.on_captured(creds)),
            Input::ActivityResolved(activity) => self.credentials.on_activity(activity),
            Input::MajorityReport(report) => self.on_majority(report, dom, &mut fx),
        }
        fx
    }

    /// 依次处理所有已到期的定时器
    pub fn fire_due(&mut self, dom: &DomSnapshot) -> Vec<Effect> {
        let mut fx = Vec::new();
        while !self.killed {
            let Some(timer) = self.scheduler.pop_due(self.clock.now()) else {
                break;
            };
            debug!("⏱ 定时器到期: {:?}", timer);
            self.on_timer(timer, dom, &mut fx);
        }
        fx
    }

    fn schedule(&mut self, timer: Timer, delay: Duration) {
        let now = self.clock.now();
        self.scheduler.schedule(timer, now, delay);
    }

    fn on_boot(&mut self, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        self.last_url = dom.url.clone();
        self.visible = dom.visible;
        self.detector.on_url(&dom.url);
        self.schedule(Timer::UrlWatch, self.settings.url_watch);
        fx.push(self.credentials.capture(false));
        if self.session.running {
            info!(
                "🔁 上次处于运行状态，{}ms 后自动恢复",
                self.settings.boot_resume.as_millis()
            );
            self.schedule(Timer::BootResume, self.settings.boot_resume);
        }
    }

    // ---------------------------------------------------------------
    // 观察器
    // ---------------------------------------------------------------

    fn start_observer(&mut self, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        let Some(effects) = self.observer.subscribe(dom) else {
            info!(
                "⏳ 未找到根容器 {}，{}ms 后重试",
                self.settings.locator.root_selector,
                self.settings.observer_retry.as_millis()
            );
            self.schedule(Timer::ObserverRetry, self.settings.observer_retry);
            return;
        };
        fx.extend(effects);
        self.scheduler.cancel(Timer::ObserverRetry);
        self.session.set_running(self.store.as_ref(), true);
        let page = if dom.url.contains("#/course") {
            PREV_PAGE_COURSES
        } else {
            PREV_PAGE_POLL
        };
        self.session.set_prev_page(self.store.as_ref(), page);
        self.last_url = dom.url.clone();
        self.detector.on_url(&dom.url);
    }

    fn stop_observer(&mut self, reason: StopReason, fx: &mut Vec<Effect>) {
        fx.extend(self.observer.disconnect());
        self.abandon_question();
        self.scheduler.cancel(Timer::ObserverRetry);
        self.scheduler.cancel(Timer::BootResume);
        log_context_stopped("观察器", reason.as_str());
        match reason {
            StopReason::ClassEnded => {
                self.session.clear_status(self.store.as_ref());
                if self.session.notify {
                    fx.push(self.notify(NotifyKind::ClassEnd, None, true));
                }
            }
            StopReason::Manual => self.session.set_running(self.store.as_ref(), false),
        }
    }

    /// 放弃当前题目：清锁、作废题目定时器；在途 AI 请求保留到回复或超时
    fn abandon_question(&mut self) {
        for timer in QUESTION_TIMERS {
            self.scheduler.cancel(timer);
        }
        self.gate.reset();
        self.pending_click = None;
        self.following_majority = false;
    }

    fn sync_url(&mut self, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        if dom.url == self.last_url {
            return;
        }
        info!("🔗 URL 变化: {}", dom.url);
        self.last_url = dom.url.clone();
        self.abandon_question();
        fx.push(self.credentials.capture(false));
        self.detector.on_url(&dom.url);
    }

    // ---------------------------------------------------------------
    // 页面事件
    // ---------------------------------------------------------------

    fn on_mutations(&mut self, events: &[PageEvent], dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        if !self.observer.is_active() {
            return;
        }
        self.sync_url(dom, fx);
        let section = PageSection::classify(&dom.url);
        let mut overview_handled = false;

        for event in events {
            match &event.kind {
                PageEventKind::NodeAdded if section == PageSection::Poll => {
                    self.session.set_prev_page(self.store.as_ref(), PREV_PAGE_POLL);
                    if self.credentials.needs_activity() {
                        fx.push(self.credentials.capture(true));
                    }
                    if let Some(container) = self.detector.on_node_added(&event.node) {
                        debug!(
                            "📦 题目容器 #{} 出现，{}ms 后提取",
                            container,
                            self.settings.question_settle.as_millis()
                        );
                        self.following_majority = false;
                        self.scheduler.cancel(Timer::MajorityPoll);
                        self.schedule(Timer::QuestionSettle, self.settings.question_settle);
                    }
                }
                PageEventKind::AttributeChanged { attribute } if !overview_handled => {
                    let prev_was_poll = self.session.prev_page.as_deref() == Some(PREV_PAGE_POLL);
                    if let Some(signal) = self.detector.on_attribute(attribute, dom, prev_was_poll) {
                        overview_handled = true;
                        self.on_overview(signal, dom, fx);
                        if !self.observer.is_active() {
                            return;
                        }
                    }
                }
                _ => {}
            }
        }

        if section == PageSection::Poll {
            self.observe_options(dom);
        }
    }

    fn on_overview(&mut self, signal: OverviewSignal, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        if signal.class_ended {
            info!("📴 已回到课程概览页，课堂结束");
            self.stop_observer(StopReason::ClassEnded, fx);
            return;
        }
        if signal.join_available && self.session.auto_join {
            self.join(dom, fx);
        }
    }

    fn join(&mut self, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        if self.session.notify {
            fx.push(self.notify(NotifyKind::ClassStart, None, false));
        }
        match dom.join_button.as_ref().filter(|b| b.is_interactive()) {
            Some(button) => {
                info!("🙋 点击加入课堂");
                fx.push(Effect::Click(button.element_ref));
            }
            None => debug!("加入卡片已展开，但没有可点击的加入按钮"),
        }
        fx.push(self.credentials.capture(true));
    }

    /// 用当前选项计算指纹交给指纹锁；数值题没有选项时保持原指纹
    fn observe_options(&mut self, dom: &DomSnapshot) {
        let options = self.locator.locate_or_empty(dom);
        let fingerprint = if options.len() >= 2 {
            Fingerprint::of(&options)
        } else if dom.numeric_input.is_some() {
            return;
        } else {
            Fingerprint::default()
        };
        self.gate_observe(fingerprint);
    }

    fn gate_observe(&mut self, fingerprint: Fingerprint) {
        match self.gate.observe(fingerprint) {
            GateDecision::Arm => {
                info!(
                    "🆕 检测到新题目，{}ms 后作答",
                    self.settings.answer_delay.as_millis()
                );
                for timer in [
                    Timer::SelectDelay,
                    Timer::ClickDelay,
                    Timer::SubmitDelay,
                    Timer::MajorityPoll,
                ] {
                    self.scheduler.cancel(timer);
                }
                self.pending_click = None;
                self.following_majority = false;
                self.credentials.reset_question();
                self.question_seq += 1;
                self.schedule(Timer::AnswerDelay, self.settings.answer_delay);
            }
            GateDecision::SelectionFeedback => debug!("选项已按下，作答已登记"),
            GateDecision::Unchanged => {}
        }
    }

    // ---------------------------------------------------------------
    // 消息
    // ---------------------------------------------------------------

    fn on_message(&mut self, message: Message, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        match message {
            Message::ProcessAiResponse { response } => self.on_ai_reply(&response, dom, fx),
            Message::AiFallback { reason } => {
                info!("↩️ AI 不可用: {}", reason);
                if let Some(request) = self.ai_request.take() {
                    self.scheduler.cancel(Timer::AiTimeout);
                    self.ai_fallback(request, dom);
                }
            }
            Message::Control { command } => self.on_control(command, dom, fx),
            other => debug!("答题页面忽略消息: {}", other.tag()),
        }
    }

    fn request_is_current(&self, request: &AiRequest) -> bool {
        self.gate.is_locked() && self.gate.current() == Some(&request.fingerprint)
    }

    fn on_ai_reply(&mut self, response: &str, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        let Some(request) = self.ai_request.take() else {
            debug!("没有在途的 AI 请求，忽略回复");
            return;
        };
        self.scheduler.cancel(Timer::AiTimeout);
        info!("🤖 AI 回复: {}", truncate_text(response, 80));

        if !self.request_is_current(&request) {
            warn!("⚠️ 题目已变化，丢弃过期的 AI 回复");
            self.observe_options(dom);
            return;
        }

        match interpret_reply(response, request.kind, dom) {
            ReplyAction::Fill(value) => {
                match dom.numeric_input {
                    Some(input) => {
                        info!("🔢 写入数值答案: {}", value);
                        fx.push(Effect::FillNumeric {
                            element: input,
                            value,
                        });
                        self.schedule(Timer::SubmitDelay, self.settings.submit_delay);
                        self.gate.mark_dispatched();
                    }
                    None => warn!("⚠️ 未找到数值输入框，放弃本题"),
                }
                self.gate.complete();
            }
            ReplyAction::ClickMatched(element) => {
                info!("✅ 选项文字匹配成功");
                self.pending_click = Some(element);
                self.schedule(Timer::ClickDelay, self.settings.click_delay);
                self.gate.mark_dispatched();
                self.gate.complete();
            }
            ReplyAction::ClickLetter(letter) => {
                info!("👆 按字母 {} 作答", letter);
                let options = self.locator.locate_or_empty(dom);
                let target = letter_target(dom, &self.settings.locator, &options, letter);
                self.click_and_finish(target, fx);
            }
            ReplyAction::Fallback => {
                warn!("⚠️ AI 回复无法解析，回退到直接选择");
                self.ai_fallback(request, dom);
            }
        }
    }

    /// AI 没有给出可用答案：选择题回退到直接选择，数值题不猜
    fn ai_fallback(&mut self, request: AiRequest, dom: &DomSnapshot) {
        if !self.request_is_current(&request) {
            self.observe_options(dom);
            return;
        }
        match request.kind {
            QuestionKind::MultipleChoice => {
                self.schedule(Timer::SelectDelay, self.settings.select_delay);
            }
            QuestionKind::Numeric => {
                info!("🔢 数值题没有 AI 答案，跳过");
                self.gate.complete();
            }
        }
    }

    fn on_control(&mut self, command: ControlCommand, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        let store = self.store.clone();
        match command {
            ControlCommand::Start => {
                info!("▶ 收到开始命令");
                let section = PageSection::classify(&dom.url);
                match section {
                    PageSection::Poll => {
                        self.abandon_question();
                        fx.push(self.credentials.capture(true));
                    }
                    PageSection::CourseOverview
                        if self.session.auto_join && dom.join_card_expanded =>
                    {
                        self.join(dom, fx);
                    }
                    _ => {}
                }
                self.start_observer(dom, fx);
                if section == PageSection::Poll && self.observer.is_active() {
                    self.answer_current_question(dom);
                }
            }
            ControlCommand::Stop => {
                info!("⏹ 收到停止命令");
                self.stop_observer(StopReason::Manual, fx);
            }
            ControlCommand::Random => {
                let on = self.session.toggle_random(store.as_ref());
                info!("🎲 随机选择: {}", on);
            }
            ControlCommand::AutoJoin => {
                let on = self.session.toggle_auto_join(store.as_ref());
                info!("🙋 自动加入: {}", on);
            }
            ControlCommand::Notify { email } => {
                let on = self.session.toggle_notify(store.as_ref(), email);
                info!("📧 通知: {} ({})", on, self.session.email.as_deref().unwrap_or("-"));
            }
            ControlCommand::UseAi => {
                let on = self.session.toggle_use_ai(store.as_ref());
                info!("🤖 AI 作答: {}", on);
            }
            ControlCommand::SelectModel { model } => match model.parse::<AiService>() {
                Ok(service) => {
                    self.session.select_model(store.as_ref(), service);
                    info!("🤖 AI 服务: {}", service.id());
                }
                Err(e) => warn!("⚠️ 无法选择 AI 服务 {}: {}", model, e),
            },
        }
    }

    /// 开始命令在答题页上：当前题目立即进入作答流程
    fn answer_current_question(&mut self, dom: &DomSnapshot) {
        let options = self.locator.locate_or_empty(dom);
        if options.len() >= 2 {
            let fingerprint = Fingerprint::of(&options);
            self.gate_observe(fingerprint);
        } else if dom.numeric_input.is_some() {
            self.gate_observe(Fingerprint::synthetic("numeric:start"));
        }
    }

    // ---------------------------------------------------------------
    // 多数人答案
    // ---------------------------------------------------------------

    fn start_majority(&mut self, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        if self.credentials.majority_request().is_some() {
            info!(
                "👥 跟随多数人答案，每 {}ms 查询一次",
                self.settings.majority_poll.as_millis()
            );
            self.following_majority = true;
            self.gate.mark_dispatched();
            self.gate.complete();
            self.schedule(Timer::MajorityPoll, self.settings.majority_poll);
            return;
        }
        debug!("会话凭据或活动编号未就绪，点击默认选项");
        let options = self.locator.locate_or_empty(dom);
        let target = index_target(dom, &options, self.settings.majority_default_index);
        self.click_and_finish(target, fx);
    }

    fn on_majority(&mut self, report: Option<MajorityAnswer>, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        if !self.following_majority {
            return;
        }
        let Some(answer) = report else {
            debug!("多数人答案查询失败，下次继续");
            return;
        };
        let default_letter = LETTERS
            .get(self.settings.majority_default_index)
            .copied()
            .unwrap_or(LETTERS[0]);
        let Some(letter) = self.credentials.follow(answer, default_letter) else {
            return;
        };
        let options = self.locator.locate_or_empty(dom);
        match letter_target(dom, &self.settings.locator, &options, letter) {
            Some(element) => {
                info!("👥 多数人答案: {}", letter);
                fx.push(Effect::Click(element));
            }
            None => warn!("⚠️ {}", AppError::LocatorMiss),
        }
    }

    // ---------------------------------------------------------------
    // 定时器
    // ---------------------------------------------------------------

    fn on_timer(&mut self, timer: Timer, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        match timer {
            Timer::QuestionSettle => self.on_question_settled(dom, fx),
            Timer::AnswerDelay => self.dispatch(dom, fx),
            Timer::SelectDelay => {
                if self.gate.is_locked() {
                    self.direct_select(dom, fx);
                }
            }
            Timer::ClickDelay => {
                if let Some(element) = self.pending_click.take() {
                    fx.push(Effect::Click(element));
                }
            }
            Timer::SubmitDelay => match dom.submit_button.as_ref().filter(|b| b.is_interactive()) {
                Some(button) => {
                    info!("📨 点击提交");
                    fx.push(Effect::Click(button.element_ref));
                }
                None => warn!("⚠️ 提交按钮不存在或不可用"),
            },
            Timer::AiTimeout => {
                if let Some(request) = self.ai_request.take() {
                    warn!(
                        "⏰ AI 回复超时 ({}ms)",
                        self.settings.ai_timeout.as_millis()
                    );
                    self.ai_fallback(request, dom);
                }
            }
            Timer::MajorityPoll => {
                if !self.following_majority {
                    return;
                }
                fx.extend(self.credentials.majority_request());
                self.schedule(Timer::MajorityPoll, self.settings.majority_poll);
            }
            Timer::UrlWatch => {
                self.sync_url(dom, fx);
                fx.extend(self.observer.ensure_attached(dom));
                if dom.visible
                    && !self.visible
                    && self.session.running
                    && !self.observer.is_active()
                {
                    info!("👀 页面重新可见，恢复观察器");
                    self.start_observer(dom, fx);
                }
                self.visible = dom.visible;
                self.schedule(Timer::UrlWatch, self.settings.url_watch);
            }
            Timer::BootResume => {
                if self.session.running && !self.observer.is_active() {
                    self.start_observer(dom, fx);
                }
            }
            Timer::ObserverRetry => self.start_observer(dom, fx),
        }
    }

    fn on_question_settled(&mut self, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        let options = self.locator.locate_or_empty(dom);
        let Some(question) = self.detector.on_settled(dom, &options) else {
            debug!("题目容器稳定后没有选项和输入框");
            return;
        };
        info!(
            "📋 题目 ({}): {}",
            question.kind.as_str(),
            truncate_text(&question.question_text, 60)
        );
        self.gate_observe(question.option_fingerprint);
        // 同一题目的容器重新渲染不重复通知
        if self.session.notify && self.question_seq > self.notified_seq {
            self.notified_seq = self.question_seq;
            let img = dom
                .question_image
                .clone()
                .unwrap_or_else(|| DEFAULT_QUESTION_IMAGE.to_string());
            fx.push(self.notify(NotifyKind::Question, Some(img), false));
        }
        fx.push(self.credentials.capture(false));
    }

    /// 作答延迟到期：重新确认页面上仍有题目，然后按计划分发
    fn dispatch(&mut self, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        if !self.gate.is_locked() {
            return;
        }
        let options = self.locator.locate_or_empty(dom);
        if options.is_empty() && dom.numeric_input.is_none() {
            debug!("{}，解锁等待下一次变化", AppError::LocatorMiss);
            self.gate.release();
            return;
        }
        let fingerprint = self.gate.current().cloned().unwrap_or_default();
        let question = QuestionSnapshot::capture(dom, &options, fingerprint);

        match plan(
            &question,
            self.session.use_ai,
            self.ai_request.is_some(),
            self.settings.follow_majority,
        ) {
            DispatchPlan::RequestAi(ai_question) => {
                info!(
                    "🤖 发送题目给 {}: {}",
                    self.session.selected_model.id(),
                    truncate_text(&ai_question.question, 60)
                );
                self.ai_request = Some(AiRequest {
                    fingerprint: question.option_fingerprint,
                    kind: question.kind,
                });
                fx.push(Effect::Send(Message::SendQuestionToAi {
                    question: ai_question,
                }));
                self.schedule(Timer::AiTimeout, self.settings.ai_timeout);
            }
            DispatchPlan::DirectSelect => {
                debug!("{}ms 后直接选择", self.settings.select_delay.as_millis());
                self.schedule(Timer::SelectDelay, self.settings.select_delay);
            }
            DispatchPlan::FollowMajority => self.start_majority(dom, fx),
            DispatchPlan::Skip => {
                info!("🔢 数值题且未启用 AI，跳过");
                self.gate.complete();
            }
            DispatchPlan::Reject => {
                warn!("⚠️ 上一个 AI 请求仍未完成，本题等待下一次变化");
                self.gate.release();
            }
        }
    }

    fn direct_select(&mut self, dom: &DomSnapshot, fx: &mut Vec<Effect>) {
        let options = self.locator.locate_or_empty(dom);
        let visible = if options.is_empty() {
            dom.option_labels.len()
        } else {
            options.len()
        };
        if visible == 0 {
            warn!("⚠️ {}", AppError::LocatorMiss);
            self.gate.release();
            return;
        }
        let letter = pick_letter(
            self.session.random,
            &mut self.rng,
            visible,
            self.settings.default_letter,
        );
        info!("👆 选择 {}", letter);
        let target = letter_target(dom, &self.settings.locator, &options, letter);
        self.click_and_finish(target, fx);
    }

    fn click_and_finish(&mut self, target: Option<ElementRef>, fx: &mut Vec<Effect>) {
        match target {
            Some(element) => {
                fx.push(Effect::Click(element));
                self.gate.mark_dispatched();
                self.gate.complete();
            }
            None => {
                warn!("⚠️ {}，解锁等待下一次变化", AppError::LocatorMiss);
                self.gate.release();
            }
        }
    }

    fn notify(&self, kind: NotifyKind, img: Option<String>, then_reload: bool) -> Effect {
        Effect::Notify {
            kind,
            email: self.session.email.clone().unwrap_or_default(),
            img,
            then_reload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::store::MemoryStore;
    use crate::models::snapshot::ElementInfo;
    use rand::SeedableRng;

    const POLL: &str = "https://student.iclicker.com/#/class/abc/poll";

    fn agent() -> (Agent, ManualClock) {
        let clock = ManualClock::new();
        let agent = Agent::new(
            AgentSettings::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
            StdRng::seed_from_u64(1),
        );
        (agent, clock)
    }

    fn question_dom() -> DomSnapshot {
        let mut dom = DomSnapshot::at(POLL);
        for (i, letter) in ['a', 'b', 'c', 'd'].iter().enumerate() {
            dom = dom.with_element(
                ElementInfo::new(i as u64 + 1)
                    .with_id(format!("multiple-choice-{}", letter))
                    .with_class("btn")
                    .inside("btn-container"),
            );
        }
        dom
    }

    #[test]
    fn killed_agent_ignores_everything() {
        let (mut agent, clock) = agent();
        let dom = question_dom();
        agent.handle(Input::Boot, &dom);
        agent.kill();
        assert!(agent.next_deadline().is_none());
        clock.advance(Duration::from_secs(5));
        assert!(agent.fire_due(&dom).is_empty());
        let start = Input::Message(Message::Control {
            command: ControlCommand::Start,
        });
        assert!(agent.handle(start, &dom).is_empty());
    }

    #[test]
    fn stop_disconnects_and_persists_status() {
        let (mut agent, _clock) = agent();
        let dom = question_dom();
        agent.handle(
            Input::Message(Message::Control {
                command: ControlCommand::Start,
            }),
            &dom,
        );
        assert!(agent.observer_active());
        assert!(agent.session().running);
        let fx = agent.handle(
            Input::Message(Message::Control {
                command: ControlCommand::Stop,
            }),
            &dom,
        );
        assert!(fx.contains(&Effect::DisconnectObserver));
        assert!(!agent.observer_active());
        assert!(!agent.session().running);
        assert!(!agent.is_pending(Timer::AnswerDelay));
    }

    #[test]
    fn missing_root_retries_later() {
        let (mut agent, clock) = agent();
        let mut dom = question_dom();
        dom.root_token = None;
        agent.handle(
            Input::Message(Message::Control {
                command: ControlCommand::Start,
            }),
            &dom,
        );
        assert!(!agent.observer_active());
        assert!(agent.is_pending(Timer::ObserverRetry));
        dom.root_token = Some(3);
        clock.advance(Duration::from_secs(1));
        let fx = agent.fire_due(&dom);
        assert!(fx.contains(&Effect::AttachObserver));
        assert!(agent.observer_active());
    }
}
