//! AI 页面桥接
//!
//! 在 AI 聊天页面上：填写提示词、点击发送、等待生成结束，
//! 再把最后一条回复提取成 `{"answer": ...}` 发回路由器。
//! 每个 AI 页面同一时间只处理一道题。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::infrastructure::clock::Clock;
use crate::infrastructure::scheduler::Scheduler;
use crate::models::ai_service::AiService;
use crate::models::message::Message;
use crate::models::snapshot::BridgeSnapshot;
use crate::services::answer_parser::extract_answer;
use crate::services::prompt::build_prompt;
use crate::utils::logging::truncate_text;

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub service: AiService,
    /// 收到题目到填写提示词
    pub compose_delay: Duration,
    /// 填写后到点击发送
    pub submit_delay: Duration,
    pub poll_interval: Duration,
    /// 生成指示器需要连续消失这么久才算生成结束
    pub quiet_period: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BridgeTimer {
    Compose,
    Submit,
    Poll,
}

/// 桥接页面上要执行的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEffect {
    FillPrompt(String),
    ClickSend,
    /// 发回路由器的回复；放弃本题时为 aiFallback
    Reply(Message),
}

#[derive(Debug)]
enum Phase {
    Idle,
    Composing { prompt: String },
    Sending,
    Waiting {
        started: Duration,
        quiet_since: Option<Duration>,
    },
}

pub struct BridgeSession {
    settings: BridgeSettings,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler<BridgeTimer>,
    phase: Phase,
}

impl BridgeSession {
    pub fn new(settings: BridgeSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            scheduler: Scheduler::new(),
            phase: Phase::Idle,
        }
    }

    pub fn service(&self) -> AiService {
        self.settings.service
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    /// 接收路由器投递的题目，正在处理上一题时拒绝
    pub fn receive(&mut self, message: Message) -> bool {
        let question = match message {
            Message::ReceiveQuestion { question } => question,
            other => {
                debug!("AI 页面忽略消息: {}", other.tag());
                return false;
            }
        };
        if self.is_busy() {
            warn!(
                "⚠️ {} 页面仍在处理上一题，丢弃: {}",
                self.settings.service,
                truncate_text(&question.question, 40)
            );
            return false;
        }
        info!(
            "📥 {} 收到题目: {}",
            self.settings.service,
            truncate_text(&question.question, 60)
        );
        self.phase = Phase::Composing {
            prompt: build_prompt(&question).combined(),
        };
        self.schedule(BridgeTimer::Compose, self.settings.compose_delay);
        true
    }

    pub fn fire_due(&mut self, page: &BridgeSnapshot) -> Vec<BridgeEffect> {
        let mut fx = Vec::new();
        while let Some(timer) = self.scheduler.pop_due(self.clock.now()) {
            self.on_timer(timer, page, &mut fx);
        }
        fx
    }

    fn schedule(&mut self, timer: BridgeTimer, delay: Duration) {
        let now = self.clock.now();
        self.scheduler.schedule(timer, now, delay);
    }

    fn on_timer(&mut self, timer: BridgeTimer, page: &BridgeSnapshot, fx: &mut Vec<BridgeEffect>) {
        let now = self.clock.now();
        match (timer, std::mem::replace(&mut self.phase, Phase::Idle)) {
            (BridgeTimer::Compose, Phase::Composing { prompt }) => {
                if !page.input_present {
                    warn!("⚠️ {} 页面上没有找到输入框", self.settings.service);
                    fx.push(self.give_up("input box not found"));
                    return;
                }
                fx.push(BridgeEffect::FillPrompt(prompt));
                self.phase = Phase::Sending;
                self.schedule(BridgeTimer::Submit, self.settings.submit_delay);
            }
            (BridgeTimer::Submit, Phase::Sending) => {
                if !page.send_ready {
                    warn!("⚠️ {} 的发送按钮不存在或不可用", self.settings.service);
                    fx.push(self.give_up("send button unavailable"));
                    return;
                }
                fx.push(BridgeEffect::ClickSend);
                self.phase = Phase::Waiting {
                    started: now,
                    quiet_since: None,
                };
                self.schedule(BridgeTimer::Poll, self.settings.poll_interval);
            }
            (
                BridgeTimer::Poll,
                Phase::Waiting {
                    started,
                    quiet_since,
                },
            ) => {
                let quiet_since = if page.generating {
                    None
                } else {
                    Some(quiet_since.unwrap_or(now))
                };
                let quiet = quiet_since
                    .map(|since| now.saturating_sub(since) >= self.settings.quiet_period)
                    .unwrap_or(false);
                let timed_out = now.saturating_sub(started) >= self.settings.timeout;
                if quiet || timed_out {
                    if timed_out && !quiet {
                        warn!("⏰ {} 生成超时，使用当前内容", self.settings.service);
                    }
                    let raw = page.last_message.as_deref().unwrap_or_default();
                    let answer = extract_answer(raw);
                    info!("📤 {} 回复: {}", self.settings.service, answer);
                    fx.push(BridgeEffect::Reply(self.settings.service.response(answer)));
                    return;
                }
                self.phase = Phase::Waiting {
                    started,
                    quiet_since,
                };
                self.schedule(BridgeTimer::Poll, self.settings.poll_interval);
            }
            (timer, phase) => {
                debug!("忽略过期的桥接定时器 {:?}", timer);
                self.phase = phase;
            }
        }
    }

    /// 放弃本题，让路由器通知提问的答题页面
    fn give_up(&self, what: &str) -> BridgeEffect {
        BridgeEffect::Reply(Message::AiFallback {
            reason: format!("{} {}.", self.settings.service.id(), what),
        })
    }
}
