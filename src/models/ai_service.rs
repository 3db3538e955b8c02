//! AI 服务标识与 AI 页面选择器配置

use std::fmt;
use std::str::FromStr;

use phf::phf_map;

use crate::error::ConfigError;
use crate::models::message::Message;

/// 支持的 AI 服务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiService {
    ChatGpt,
    Gemini,
    DeepSeek,
    /// 不经过页面，直接调用兼容 OpenAI 的接口
    Api,
}

static SERVICES: phf::Map<&'static str, AiService> = phf_map! {
    "chatgpt" => AiService::ChatGpt,
    "gemini" => AiService::Gemini,
    "deepseek" => AiService::DeepSeek,
    "api" => AiService::Api,
};

/// AI 页面上的元素选择器，按优先级排列
#[derive(Debug, Clone, Copy)]
pub struct PageProfile {
    pub input: &'static [&'static str],
    pub send_button: &'static [&'static str],
    pub generating: &'static [&'static str],
    pub messages: &'static str,
}

const CHATGPT_PROFILE: PageProfile = PageProfile {
    input: &[
        "#prompt-textarea",
        "textarea[placeholder]",
        "[contenteditable=\"true\"][data-id]",
        "div[contenteditable=\"true\"]",
    ],
    send_button: &[
        "button[data-testid=\"send-button\"]",
        "button[aria-label=\"Send message\"]",
        "button[aria-label=\"Send prompt\"]",
        "form button[type=\"submit\"]",
    ],
    generating: &[
        "button[aria-label=\"Stop generating\"]",
        "button[data-testid=\"stop-button\"]",
    ],
    messages: "[data-message-author-role=\"assistant\"], .markdown, [class*=\"message\"]:not([class*=\"user\"])",
};

const GEMINI_PROFILE: PageProfile = PageProfile {
    input: &[
        "rich-textarea div[contenteditable=\"true\"]",
        "div.ql-editor[contenteditable=\"true\"]",
        "div[contenteditable=\"true\"]",
    ],
    send_button: &[
        "button.send-button",
        "button[aria-label=\"Send message\"]",
    ],
    generating: &[
        "button[aria-label=\"Stop response\"]",
        "button.stop",
    ],
    messages: "model-response message-content, message-content, .model-response-text",
};

const DEEPSEEK_PROFILE: PageProfile = PageProfile {
    input: &["textarea#chat-input", "textarea"],
    send_button: &[
        "div[role=\"button\"][aria-disabled=\"false\"]",
        "button[type=\"submit\"]",
    ],
    generating: &[
        "div[role=\"button\"] svg rect",
        "[class*=\"stop\"]",
    ],
    messages: ".ds-markdown, [class*=\"markdown\"]",
};

impl AiService {
    pub fn id(self) -> &'static str {
        match self {
            AiService::ChatGpt => "chatgpt",
            AiService::Gemini => "gemini",
            AiService::DeepSeek => "deepseek",
            AiService::Api => "api",
        }
    }

    /// 服务页面的 URL 模式
    pub fn url_pattern(self) -> &'static str {
        match self {
            AiService::ChatGpt => "https://chatgpt.com/*",
            AiService::Gemini => "https://gemini.google.com/*",
            AiService::DeepSeek => "https://chat.deepseek.com/*",
            AiService::Api => "llm://api/*",
        }
    }

    /// 有真实页面的服务
    pub fn page_services() -> [AiService; 3] {
        [AiService::ChatGpt, AiService::Gemini, AiService::DeepSeek]
    }

    /// 页面选择器，api 服务没有页面
    pub fn page_profile(self) -> Option<&'static PageProfile> {
        match self {
            AiService::ChatGpt => Some(&CHATGPT_PROFILE),
            AiService::Gemini => Some(&GEMINI_PROFILE),
            AiService::DeepSeek => Some(&DEEPSEEK_PROFILE),
            AiService::Api => None,
        }
    }

    /// 用本服务的回复标签包装答案
    pub fn response(self, response: String) -> Message {
        match self {
            AiService::ChatGpt => Message::ChatGptResponse { response },
            AiService::Gemini => Message::GeminiResponse { response },
            AiService::DeepSeek => Message::DeepseekResponse { response },
            AiService::Api => Message::ApiResponse { response },
        }
    }

    /// 解析存储中的服务标识，未知或为空时使用 chatgpt
    pub fn from_stored(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or(AiService::ChatGpt)
    }
}

impl FromStr for AiService {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SERVICES
            .get(s.trim().to_lowercase().as_str())
            .copied()
            .ok_or_else(|| ConfigError::UnknownService(s.to_string()))
    }
}

impl fmt::Display for AiService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_stored_model_defaults_to_chatgpt() {
        assert_eq!(AiService::from_stored(Some("gemini")), AiService::Gemini);
        assert_eq!(AiService::from_stored(Some("claude")), AiService::ChatGpt);
        assert_eq!(AiService::from_stored(None), AiService::ChatGpt);
    }

    #[test]
    fn response_uses_service_tag() {
        let msg = AiService::DeepSeek.response("{}".into());
        assert_eq!(msg.tag(), "deepseekResponse");
        assert!(AiService::Api.page_profile().is_none());
    }
}
