//! LLM 服务 - 业务能力层
//!
//! api 目标使用的"直接问模型"能力，与 AI 页面使用同样的提示词和答案提取
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型（兼容 OpenAI API 的服务）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppResult, NetworkError};
use crate::models::message::AiQuestion;
use crate::services::answer_parser::extract_answer;
use crate::services::prompt::build_prompt;

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API 回答单道题目
/// - 不关心题目从哪个页面来，也不关心回复发往哪里
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// 通用的 LLM 调用函数
    pub async fn send_to_llm(&self, user_message: &str, system_message: &str) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()
            .map_err(|e| self.llm_error(e))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| self.llm_error(e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(0.3)
            .max_tokens(256u32)
            .build()
            .map_err(|e| self.llm_error(e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            self.llm_error(e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| self.llm_error("LLM 返回内容为空"))?;

        Ok(content.trim().to_string())
    }

    /// 回答一道题目，返回 `{"answer":"…"}`
    pub async fn answer(&self, question: &AiQuestion) -> AppResult<String> {
        let prompt = build_prompt(question);
        let raw = self.send_to_llm(&prompt.user, prompt.system).await?;
        debug!("LLM 原始回复: {}", crate::utils::truncate_text(&raw, 120));
        Ok(extract_answer(&raw))
    }

    fn llm_error(&self, e: impl std::fmt::Display) -> NetworkError {
        NetworkError::Llm {
            model: self.model_name.clone(),
            message: e.to_string(),
        }
    }
}
