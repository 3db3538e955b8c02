//! 发送给 AI 的提示词

use crate::models::message::AiQuestion;
use crate::models::question::LETTERS;

pub const MC_SYSTEM_PROMPT: &str = "You are answering a multiple-choice poll question. \
Reply ONLY with valid JSON like {\"answer\":\"B\"}: no explanation, no markdown, just the JSON object. \
Pick the single best letter answer.";

pub const NUMERIC_SYSTEM_PROMPT: &str = "You are answering a numeric free-response question from a physics/science class. \
Solve the problem and reply ONLY with valid JSON like {\"answer\":\"42.5\"}. \
The value should be the numeric answer as a plain number string (digits and decimal point only, no units). \
No explanation, no markdown, just the JSON object.";

/// 系统提示词与用户消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: &'static str,
    pub user: String,
}

impl Prompt {
    /// 页面上只有一个输入框，系统提示词与题目拼在一起
    pub fn combined(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

pub fn build_prompt(question: &AiQuestion) -> Prompt {
    if question.is_numeric() {
        let mut user = format!("Question:\n{}\n", question.question);
        if let Some(instruction) = &question.instruction {
            user.push('\n');
            user.push_str(instruction);
        }
        user.push_str("\n\nRespond with JSON only: {\"answer\":\"<number>\"}");
        return Prompt {
            system: NUMERIC_SYSTEM_PROMPT,
            user,
        };
    }

    let mut user = String::new();
    if !question.question.is_empty() {
        user.push_str(&format!("Question: {}\n", question.question));
    }
    for (i, option) in question.options.iter().enumerate() {
        let label = LETTERS
            .get(i)
            .map(|l| l.to_string())
            .unwrap_or_else(|| (i + 1).to_string());
        user.push_str(&format!("{}) {}\n", label, option));
    }
    if let Some(correction) = &question.previous_correction {
        user.push_str(&format!("Note: {}\n", correction));
    }
    user.push_str("\nRespond with JSON only: {\"answer\":\"<letter>\"}");
    Prompt {
        system: MC_SYSTEM_PROMPT,
        user,
    }
}
