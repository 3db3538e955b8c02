//! 跨上下文消息
//!
//! 以字符串标签区分的类型化消息，由路由器（background）消费和转发

use serde::{Deserialize, Serialize};

/// 发送给 AI 的数值题附加说明
pub const NUMERIC_INSTRUCTION: &str = "This is a numeric free-response question. Reply ONLY with valid JSON like {\"answer\":\"42.5\"} where the value is the numeric answer as a string. No units unless part of the number, no explanation.";

/// 发送给 AI 的题目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiQuestion {
    #[serde(rename = "type")]
    pub kind: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub previous_correction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

impl AiQuestion {
    pub fn multiple_choice(question: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            kind: "multiple_choice".to_string(),
            question: question.into(),
            options,
            previous_correction: None,
            instruction: None,
        }
    }

    pub fn numeric(question: impl Into<String>) -> Self {
        Self {
            kind: "numeric".to_string(),
            question: question.into(),
            options: Vec::new(),
            previous_correction: None,
            instruction: Some(NUMERIC_INSTRUCTION.to_string()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == "numeric"
    }
}

/// 设置面板发来的控制命令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "camelCase")]
pub enum ControlCommand {
    Start,
    Stop,
    Random,
    AutoJoin,
    Notify {
        #[serde(default)]
        email: Option<String>,
    },
    #[serde(rename = "useAI")]
    UseAi,
    SelectModel {
        model: String,
    },
}

/// 消息信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// 打开设置页面
    #[serde(rename = "openSettings")]
    OpenSettings,
    /// 答题页面 → 路由器
    #[serde(rename = "sendQuestionToAI")]
    SendQuestionToAi { question: AiQuestion },
    /// 路由器 → AI 页面
    #[serde(rename = "receiveQuestion")]
    ReceiveQuestion { question: AiQuestion },
    /// AI 页面 → 路由器
    #[serde(rename = "chatGPTResponse")]
    ChatGptResponse { response: String },
    #[serde(rename = "geminiResponse")]
    GeminiResponse { response: String },
    #[serde(rename = "deepseekResponse")]
    DeepseekResponse { response: String },
    #[serde(rename = "apiResponse")]
    ApiResponse { response: String },
    /// 路由器 → 答题页面
    #[serde(rename = "processAIResponse")]
    ProcessAiResponse { response: String },
    /// 路由器 → 答题页面（没有 AI 页面）
    #[serde(rename = "aiFallback")]
    AiFallback { reason: String },
    /// 设置面板 → 答题页面
    #[serde(rename = "popup")]
    Control { command: ControlCommand },
}

impl Message {
    /// 消息标签
    pub fn tag(&self) -> &'static str {
        match self {
            Message::OpenSettings => "openSettings",
            Message::SendQuestionToAi { .. } => "sendQuestionToAI",
            Message::ReceiveQuestion { .. } => "receiveQuestion",
            Message::ChatGptResponse { .. } => "chatGPTResponse",
            Message::GeminiResponse { .. } => "geminiResponse",
            Message::DeepseekResponse { .. } => "deepseekResponse",
            Message::ApiResponse { .. } => "apiResponse",
            Message::ProcessAiResponse { .. } => "processAIResponse",
            Message::AiFallback { .. } => "aiFallback",
            Message::Control { .. } => "popup",
        }
    }

    /// AI 页面发出的回复内容
    pub fn ai_response(&self) -> Option<&str> {
        match self {
            Message::ChatGptResponse { response }
            | Message::GeminiResponse { response }
            | Message::DeepseekResponse { response }
            | Message::ApiResponse { response } => Some(response),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_use_string_tags() {
        let msg = Message::SendQuestionToAi {
            question: AiQuestion::multiple_choice("2+2?", vec!["3".into(), "4".into()]),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "sendQuestionToAI");
        assert_eq!(json["question"]["type"], "multiple_choice");
        assert_eq!(json["question"]["previousCorrection"], serde_json::Value::Null);

        let back: Message =
            serde_json::from_str(r#"{"type":"aiFallback","reason":"No chatgpt tab found."}"#)
                .unwrap();
        assert_eq!(back.tag(), "aiFallback");
    }

    #[test]
    fn only_destination_replies_carry_ai_response() {
        let reply = Message::GeminiResponse {
            response: r#"{"answer":"B"}"#.into(),
        };
        assert_eq!(reply.ai_response(), Some(r#"{"answer":"B"}"#));
        let forwarded = Message::ProcessAiResponse {
            response: "x".into(),
        };
        assert_eq!(forwarded.ai_response(), None);
    }

    #[test]
    fn control_commands_parse_from_popup_shape() {
        let msg: Message =
            serde_json::from_str(r#"{"type":"popup","command":{"msg":"notify","email":"a@b.c"}}"#)
                .unwrap();
        assert_eq!(
            msg,
            Message::Control {
                command: ControlCommand::Notify {
                    email: Some("a@b.c".into())
                }
            }
        );
    }
}
