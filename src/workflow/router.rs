//! 消息路由
//!
//! 答题页面和 AI 页面之间的中转：题目发往当前选中的 AI 页面，
//! AI 回复广播给所有答题页面。路由器只在每次投递时读取一次 aiModel；
//! 它唯一的状态是每个 AI 页面上正在处理的题目来自哪个答题页面。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, ConfigError};
use crate::infrastructure::store::ConfigStore;
use crate::models::ai_service::AiService;
use crate::models::message::{ControlCommand, Message};
use crate::models::session::{keys, SessionConfig};
use crate::services::url_pattern::{matches_any, UrlPattern};

/// 页面上下文编号（CDP target id）
pub type ContextId = String;

/// 一个打开的页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub id: ContextId,
    pub url: String,
}

impl ContextInfo {
    pub fn new(id: impl Into<ContextId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// 路由结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterOutput {
    Deliver { to: ContextId, message: Message },
    OpenSettings,
}

pub struct Router {
    store: Arc<dyn ConfigStore>,
    services: Vec<(AiService, UrlPattern)>,
    consumers: Vec<UrlPattern>,
    /// AI 页面 → 等待回复的答题页面
    in_flight: HashMap<ContextId, ContextId>,
}

impl Router {
    pub fn new(store: Arc<dyn ConfigStore>, consumers: Vec<UrlPattern>) -> Result<Self, ConfigError> {
        let services = [
            AiService::ChatGpt,
            AiService::Gemini,
            AiService::DeepSeek,
            AiService::Api,
        ]
        .into_iter()
        .map(|service| Ok((service, UrlPattern::new(service.url_pattern())?)))
        .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            store,
            services,
            consumers,
            in_flight: HashMap::new(),
        })
    }

    /// 当前选中的 AI 服务
    pub fn selected_service(&self) -> AiService {
        let stored = self.store.get(keys::AI_MODEL);
        AiService::from_stored(stored.as_ref().and_then(|v| v.as_str()))
    }

    /// 找到第一个匹配服务 URL 模式的页面
    pub fn resolve_destination<'a>(
        &self,
        service: AiService,
        open: &'a [ContextInfo],
    ) -> AppResult<&'a ContextInfo> {
        let pattern = self
            .services
            .iter()
            .find(|(s, _)| *s == service)
            .map(|(_, p)| p)
            .ok_or_else(|| AppError::DestinationMissing {
                service: service.id().to_string(),
            })?;
        open.iter()
            .find(|ctx| pattern.matches(&ctx.url))
            .ok_or_else(|| AppError::DestinationMissing {
                service: service.id().to_string(),
            })
    }

    /// 是否是接收 AI 回复的答题页面
    pub fn is_consumer(&self, url: &str) -> bool {
        matches_any(&self.consumers, url)
    }

    /// AI 页面是否正在处理题目
    pub fn is_busy(&self, destination: &str) -> bool {
        self.in_flight.contains_key(destination)
    }

    pub fn route(&mut self, from: &str, message: Message, open: &[ContextInfo]) -> Vec<RouterOutput> {
        match message {
            Message::SendQuestionToAi { question } => {
                let service = self.selected_service();
                let destination = match self.resolve_destination(service, open) {
                    Ok(destination) => destination,
                    Err(e) => {
                        warn!("⚠️ {}", e);
                        return vec![fallback(
                            from,
                            format!("No {} tab found. Open it to use AI answering.", service.id()),
                        )];
                    }
                };
                if let Some(waiting) = self.in_flight.get(&destination.id) {
                    warn!(
                        "⚠️ {} 仍在回答 {} 的题目，拒绝 {}",
                        destination.id, waiting, from
                    );
                    return vec![fallback(
                        from,
                        format!("{} is still answering another question.", service.id()),
                    )];
                }
                info!("📮 题目 → {} ({})", service.id(), destination.id);
                self.in_flight
                    .insert(destination.id.clone(), from.to_string());
                vec![RouterOutput::Deliver {
                    to: destination.id.clone(),
                    message: Message::ReceiveQuestion { question },
                }]
            }
            Message::AiFallback { reason } => match self.in_flight.remove(from) {
                // AI 页面放弃了本题
                Some(requester) => {
                    warn!("⚠️ {} 放弃: {}", from, reason);
                    vec![fallback(&requester, reason)]
                }
                None => {
                    debug!("忽略来自 {} 的 aiFallback", from);
                    Vec::new()
                }
            },
            Message::OpenSettings => vec![RouterOutput::OpenSettings],
            other => match other.ai_response() {
                Some(response) => {
                    self.in_flight.remove(from);
                    let outputs: Vec<RouterOutput> = open
                        .iter()
                        .filter(|ctx| self.is_consumer(&ctx.url))
                        .map(|ctx| RouterOutput::Deliver {
                            to: ctx.id.clone(),
                            message: Message::ProcessAiResponse {
                                response: response.to_string(),
                            },
                        })
                        .collect();
                    info!("📮 {} → {} 个答题页面", other.tag(), outputs.len());
                    outputs
                }
                None => {
                    debug!("路由器忽略消息: {}", other.tag());
                    Vec::new()
                }
            },
        }
    }

    /// 上下文关闭；关闭的是正在答题的 AI 页面时通知提问方
    pub fn forget(&mut self, id: &str) -> Vec<RouterOutput> {
        match self.in_flight.remove(id) {
            Some(requester) => vec![fallback(
                &requester,
                format!("{} tab closed before answering.", id),
            )],
            None => Vec::new(),
        }
    }

    /// 没有答题页面接收控制命令时由路由器写入存储
    pub fn persist_control(&self, command: &ControlCommand) {
        let store = self.store.as_ref();
        let mut session = SessionConfig::load(store);
        match command {
            ControlCommand::Start => session.set_running(store, true),
            ControlCommand::Stop => session.set_running(store, false),
            ControlCommand::Random => {
                session.toggle_random(store);
            }
            ControlCommand::AutoJoin => {
                session.toggle_auto_join(store);
            }
            ControlCommand::Notify { email } => {
                session.toggle_notify(store, email.clone());
            }
            ControlCommand::UseAi => {
                session.toggle_use_ai(store);
            }
            ControlCommand::SelectModel { model } => match model.parse::<AiService>() {
                Ok(service) => session.select_model(store, service),
                Err(e) => warn!("⚠️ 无法选择 AI 服务 {}: {}", model, e),
            },
        }
        debug!("控制命令已写入存储: {:?}", command);
    }
}

fn fallback(to: &str, reason: String) -> RouterOutput {
    RouterOutput::Deliver {
        to: to.to_string(),
        message: Message::AiFallback { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::MemoryStore;
    use crate::models::message::AiQuestion;
    use serde_json::json;

    fn router(store: Arc<MemoryStore>) -> Router {
        let consumers = vec![UrlPattern::new("https://student.iclicker.com/*").unwrap()];
        Router::new(store, consumers).unwrap()
    }

    fn tabs() -> Vec<ContextInfo> {
        vec![
            ContextInfo::new("quiz-1", "https://student.iclicker.com/#/class/1/poll"),
            ContextInfo::new("quiz-2", "https://student.iclicker.com/#/class/2/poll"),
            ContextInfo::new("gpt", "https://chatgpt.com/c/123"),
            ContextInfo::new("other", "https://example.com/"),
        ]
    }

    fn question() -> Message {
        Message::SendQuestionToAi {
            question: AiQuestion::multiple_choice("2+2?", vec!["3".into(), "4".into()]),
        }
    }

    #[test]
    fn question_goes_to_selected_service() {
        let store = Arc::new(MemoryStore::new());
        let out = router(store).route("quiz-1", question(), &tabs());
        assert_eq!(out.len(), 1);
        assert!(matches!(
            &out[0],
            RouterOutput::Deliver { to, message: Message::ReceiveQuestion { .. } } if to == "gpt"
        ));
    }

    #[test]
    fn missing_service_tab_falls_back_to_sender() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::AI_MODEL, json!("gemini")).unwrap();
        let out = router(store).route("quiz-1", question(), &tabs());
        assert_eq!(
            out,
            vec![RouterOutput::Deliver {
                to: "quiz-1".into(),
                message: Message::AiFallback {
                    reason: "No gemini tab found. Open it to use AI answering.".into()
                }
            }]
        );
    }

    #[test]
    fn replies_fan_out_to_every_consumer() {
        let store = Arc::new(MemoryStore::new());
        let reply = Message::ChatGptResponse {
            response: r#"{"answer":"B"}"#.into(),
        };
        let out = router(store).route("gpt", reply, &tabs());
        let targets: Vec<&str> = out
            .iter()
            .filter_map(|o| match o {
                RouterOutput::Deliver { to, .. } => Some(to.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(targets, vec!["quiz-1", "quiz-2"]);
    }

    #[test]
    fn api_destination_is_resolved_by_pattern() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::AI_MODEL, json!("api")).unwrap();
        let r = router(store);
        let mut open = tabs();
        open.push(ContextInfo::new("llm", "llm://api/chat"));
        assert_eq!(r.resolve_destination(AiService::Api, &open).unwrap().id, "llm");
        assert!(r.resolve_destination(AiService::DeepSeek, &open).is_err());
    }

    #[test]
    fn busy_destination_rejects_second_question_until_it_replies() {
        let mut r = router(Arc::new(MemoryStore::new()));
        let open = tabs();
        r.route("quiz-1", question(), &open);
        assert!(r.is_busy("gpt"));

        let out = r.route("quiz-2", question(), &open);
        assert_eq!(
            out,
            vec![RouterOutput::Deliver {
                to: "quiz-2".into(),
                message: Message::AiFallback {
                    reason: "chatgpt is still answering another question.".into()
                }
            }]
        );

        let reply = Message::ChatGptResponse {
            response: r#"{"answer":"B"}"#.into(),
        };
        assert_eq!(r.route("gpt", reply, &open).len(), 2);
        assert!(!r.is_busy("gpt"));
        assert!(matches!(
            &r.route("quiz-2", question(), &open)[..],
            [RouterOutput::Deliver { to, message: Message::ReceiveQuestion { .. } }] if to == "gpt"
        ));
    }

    #[test]
    fn abandoned_question_falls_back_to_requester() {
        let mut r = router(Arc::new(MemoryStore::new()));
        let open = tabs();
        r.route("quiz-2", question(), &open);
        let gave_up = Message::AiFallback {
            reason: "chatgpt input box not found.".into(),
        };
        assert_eq!(
            r.route("gpt", gave_up.clone(), &open),
            vec![RouterOutput::Deliver {
                to: "quiz-2".into(),
                message: gave_up
            }]
        );
        assert!(!r.is_busy("gpt"));
    }

    #[test]
    fn closing_busy_destination_releases_requester() {
        let mut r = router(Arc::new(MemoryStore::new()));
        r.route("quiz-1", question(), &tabs());
        let out = r.forget("gpt");
        assert!(matches!(
            &out[..],
            [RouterOutput::Deliver { to, message: Message::AiFallback { .. } }] if to == "quiz-1"
        ));
        assert!(r.forget("gpt").is_empty());
        assert!(r.forget("quiz-1").is_empty());
    }

    #[test]
    fn control_commands_persist_without_consumers() {
        let store = Arc::new(MemoryStore::new());
        let r = router(store.clone());
        r.persist_control(&ControlCommand::SelectModel {
            model: "gemini".into(),
        });
        r.persist_control(&ControlCommand::Notify {
            email: Some("me@school.edu".into()),
        });
        r.persist_control(&ControlCommand::UseAi);
        assert_eq!(store.get(keys::AI_MODEL), Some(json!("gemini")));
        assert_eq!(store.get(keys::NOTIFY), Some(json!(true)));
        assert_eq!(store.get(keys::EMAIL), Some(json!("me@school.edu")));
        assert_eq!(store.get(keys::USE_AI), Some(json!(true)));
        assert_eq!(r.selected_service(), AiService::Gemini);
    }

    #[test]
    fn settings_request_is_forwarded() {
        let store = Arc::new(MemoryStore::new());
        assert_eq!(
            router(store).route("quiz-1", Message::OpenSettings, &tabs()),
            vec![RouterOutput::OpenSettings]
        );
    }
}
