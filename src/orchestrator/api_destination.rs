//! api 目标
//!
//! 没有浏览器页面的 AI 目标：以 `llm://api/chat` 的地址注册到路由器，
//! 收到题目后直接调用 OpenAI 兼容接口。与页面目标一样一次只处理一道题。

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::ai_service::AiService;
use crate::models::message::Message;
use crate::orchestrator::router_task::{RouterCommand, RouterHandle};
use crate::services::answer_parser::extract_answer;
use crate::services::llm_service::LlmService;
use crate::utils::logging::truncate_text;

pub const API_CONTEXT_ID: &str = "llm-api";
pub const API_CONTEXT_URL: &str = "llm://api/chat";

/// 注册 api 目标并在后台处理题目
pub fn spawn_api_destination(config: &Config, router: RouterHandle) {
    let llm = Arc::new(LlmService::new(config));
    let (inbox_tx, inbox) = mpsc::unbounded_channel();
    if router
        .send(RouterCommand::Register {
            id: API_CONTEXT_ID.to_string(),
            url: API_CONTEXT_URL.to_string(),
            inbox: inbox_tx,
        })
        .is_err()
    {
        warn!("⚠️ 路由任务已结束，api 目标未注册");
        return;
    }
    info!("🔑 api 目标已就绪 (模型: {})", llm.model_name());
    tokio::spawn(run(llm, inbox, router));
}

async fn run(llm: Arc<LlmService>, mut inbox: mpsc::UnboundedReceiver<Message>, router: RouterHandle) {
    while let Some(message) = inbox.recv().await {
        let question = match message {
            Message::ReceiveQuestion { question } => question,
            other => {
                debug!("api 目标忽略消息: {}", other.tag());
                continue;
            }
        };
        info!("📥 api 收到题目: {}", truncate_text(&question.question, 60));
        let answer = match llm.answer(&question).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("⚠️ {}", e);
                extract_answer("")
            }
        };
        info!("📤 api 回复: {}", answer);
        let _ = router.send(RouterCommand::Deliver {
            from: API_CONTEXT_ID.to_string(),
            message: AiService::Api.response(answer),
        });
    }
}
