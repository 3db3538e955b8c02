//! 答案分发决策
//!
//! 根据题型和会话开关决定怎样作答，并把 AI 回复解析为具体的点击目标

use rand::Rng;
use tracing::debug;

use crate::models::message::AiQuestion;
use crate::models::question::{letter_index, QuestionKind, QuestionSnapshot, LETTERS};
use crate::models::snapshot::{DomSnapshot, ElementInfo, ElementRef};
use crate::services::answer_parser::parse_reply;
use crate::services::element_locator::LocatorProfile;

/// 一道题的作答方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchPlan {
    /// 把题目发给 AI
    RequestAi(AiQuestion),
    /// 等待选择延迟后按默认 / 随机字母点击
    DirectSelect,
    /// 轮询多数人答案
    FollowMajority,
    /// 数值题且未启用 AI：不猜测，不写入
    Skip,
    /// 已有 AI 请求未完成，本次不分发
    Reject,
}

pub fn plan(
    question: &QuestionSnapshot,
    use_ai: bool,
    ai_in_flight: bool,
    follow_majority: bool,
) -> DispatchPlan {
    match (question.kind, use_ai) {
        (QuestionKind::Numeric, false) => DispatchPlan::Skip,
        (_, true) if ai_in_flight => DispatchPlan::Reject,
        (QuestionKind::Numeric, true) => match question.to_ai_question() {
            Some(q) => DispatchPlan::RequestAi(q),
            None => DispatchPlan::Skip,
        },
        (QuestionKind::MultipleChoice, true) => match question.to_ai_question() {
            Some(q) => DispatchPlan::RequestAi(q),
            None => DispatchPlan::DirectSelect,
        },
        (QuestionKind::MultipleChoice, false) if follow_majority => DispatchPlan::FollowMajority,
        (QuestionKind::MultipleChoice, false) => DispatchPlan::DirectSelect,
    }
}

/// AI 回复对应的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyAction {
    /// 选项文字匹配成功，点击延迟后点击
    ClickMatched(ElementRef),
    /// 按字母点击
    ClickLetter(char),
    /// 写入数值并提交
    Fill(String),
    /// 回复无法解析，回退到直接选择
    Fallback,
}

pub fn interpret_reply(response: &str, kind: QuestionKind, dom: &DomSnapshot) -> ReplyAction {
    let answer = match parse_reply(response) {
        Ok(answer) => answer,
        Err(e) => {
            debug!("{}", e);
            return ReplyAction::Fallback;
        }
    };
    if kind == QuestionKind::Numeric {
        // 不是数字就不写入，数值题不猜
        return match answer.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => ReplyAction::Fill(answer),
            _ => {
                debug!("数值题回复不是数字: {}", answer);
                ReplyAction::Fallback
            }
        };
    }

    let first = answer.chars().next().map(|c| c.to_ascii_uppercase()).unwrap_or('A');
    // 单个字母直接按字母处理，避免误匹配以该字母开头的选项文字
    if answer.chars().count() == 1 {
        return ReplyAction::ClickLetter(first);
    }

    let trimmed_answer = answer.trim_end_matches('.');
    let matched = dom.option_labels.iter().find(|label| {
        let text = label.text.trim();
        !text.is_empty()
            && (text == answer
                || text.trim_end_matches('.') == trimmed_answer
                || text.starts_with(answer.as_str()))
    });
    match matched {
        Some(label) => ReplyAction::ClickMatched(label.element_ref),
        None => ReplyAction::ClickLetter(first),
    }
}

/// 直接选择使用的字母：默认字母，或在可见选项中均匀随机（最多 5 个）
pub fn pick_letter<R: Rng>(
    random: bool,
    rng: &mut R,
    visible: usize,
    default: char,
) -> char {
    if !random {
        return default;
    }
    let count = if visible == 0 { 4 } else { visible.min(LETTERS.len()) };
    LETTERS[rng.random_range(0..count)]
}

/// 字母对应的点击目标
///
/// 依次尝试固定 id、定位到的第 N 个选项、第 N 个选项容器；非 A–E 的字母按 A 处理
pub fn letter_target(
    dom: &DomSnapshot,
    profile: &LocatorProfile,
    options: &[&ElementInfo],
    letter: char,
) -> Option<ElementRef> {
    if let Some(el) = dom
        .element_by_id(&profile.option_id(letter))
        .filter(|e| e.is_interactive())
    {
        return Some(el.element_ref);
    }
    index_target(dom, options, letter_index(letter).unwrap_or(0))
}

/// 按下标点击（多数人数据为空时使用）
pub fn index_target(dom: &DomSnapshot, options: &[&ElementInfo], index: usize) -> Option<ElementRef> {
    options
        .get(index)
        .map(|e| e.element_ref)
        .or_else(|| dom.option_labels.get(index).map(|l| l.element_ref))
}
