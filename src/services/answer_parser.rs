//! AI 回复解析
//!
//! AI 页面一侧把任意文本整理成 `{"answer":"…"}`，答题页面一侧再把它解析成答案字符串

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::ParseError;

/// 兜底答案
pub const DEFAULT_ANSWER: &str = "A";

static JSON_ANSWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^}]*"answer"\s*:\s*"([^"]+)"[^}]*\}"#).expect("JSON answer pattern")
});
static NUMBER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d[\d.eE+\-]*)\b").expect("number pattern"));
static LETTER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-E])\b").expect("letter pattern"));

fn first_capture(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// 从 AI 页面最后一条消息中提取答案，总是返回 `{"answer":"…"}`
///
/// 依次尝试：带 answer 字段的 JSON → 第一个数字 → 独立的字母 A–E → 默认 A
pub fn extract_answer(raw: &str) -> String {
    let answer = first_capture(&JSON_ANSWER, raw)
        .or_else(|| first_capture(&NUMBER_TOKEN, raw))
        .or_else(|| first_capture(&LETTER_TOKEN, raw).map(|l| l.to_uppercase()))
        .unwrap_or_else(|| DEFAULT_ANSWER.to_string());
    json!({ "answer": answer }).to_string()
}

/// 解析转发给答题页面的回复，得到去掉首尾空白的答案
///
/// 允许 ```json 代码块包裹；answer 可以是字符串、数字或数组（取第一个）
pub fn parse_reply(response: &str) -> Result<String, ParseError> {
    let malformed = || ParseError::MalformedReply {
        raw: response.to_string(),
    };
    let cleaned = response.replace("```json", "").replace("```", "");
    let parsed: Value = serde_json::from_str(cleaned.trim()).map_err(|_| malformed())?;
    let raw = match parsed.get("answer") {
        Some(Value::Array(items)) => items.first().cloned().ok_or_else(malformed)?,
        Some(value) => value.clone(),
        None => return Err(malformed()),
    };
    let answer = match raw {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return Err(malformed()),
    };
    let answer = answer.trim().to_string();
    if answer.is_empty() {
        return Err(malformed());
    }
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_patterns_compile() {
        for pattern in [&JSON_ANSWER, &NUMBER_TOKEN, &LETTER_TOKEN] {
            assert!(!LazyLock::force(pattern).as_str().is_empty());
        }
    }

    #[test]
    fn extraction_prefers_embedded_json() {
        let raw = "Sure! Here you go: {\"answer\": \"C\"} because 3 > 2";
        assert_eq!(extract_answer(raw), r#"{"answer":"C"}"#);
    }

    #[test]
    fn extraction_falls_back_to_number_then_letter_then_default() {
        assert_eq!(extract_answer("The result is 968555.66 J"), r#"{"answer":"968555.66"}"#);
        assert_eq!(extract_answer("I would pick D here"), r#"{"answer":"D"}"#);
        assert_eq!(extract_answer("no idea, sorry"), r#"{"answer":"A"}"#);
    }

    #[test]
    fn reply_accepts_fences_numbers_and_arrays() {
        assert_eq!(parse_reply("```json\n{\"answer\":\" B \"}\n```").unwrap(), "B");
        assert_eq!(parse_reply(r#"{"answer":42.5}"#).unwrap(), "42.5");
        assert_eq!(parse_reply(r#"{"answer":["D","A"]}"#).unwrap(), "D");
    }

    #[test]
    fn reply_without_answer_is_malformed() {
        assert!(parse_reply("I think it's B").is_err());
        assert!(parse_reply(r#"{"result":"B"}"#).is_err());
        assert!(parse_reply(r#"{"answer":[]}"#).is_err());
    }
}
