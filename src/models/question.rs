//! 题目快照与选项指纹

use std::fmt;

use phf::phf_map;

use crate::models::message::AiQuestion;
use crate::models::snapshot::{DomSnapshot, ElementInfo};

/// 选项字母 → 下标
pub static LETTER_TO_INDEX: phf::Map<char, usize> = phf_map! {
    'A' => 0,
    'B' => 1,
    'C' => 2,
    'D' => 3,
    'E' => 4,
};

/// 按顺序排列的选项字母
pub const LETTERS: [char; 5] = ['A', 'B', 'C', 'D', 'E'];

/// 字母对应的下标，非 A–E 返回 None
pub fn letter_index(letter: char) -> Option<usize> {
    LETTER_TO_INDEX.get(&letter.to_ascii_uppercase()).copied()
}

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    MultipleChoice,
    Numeric,
}

impl QuestionKind {
    /// 根据题型横幅和数值输入框判断题型
    pub fn detect(dom: &DomSnapshot) -> Self {
        if dom.type_banner.to_lowercase().contains("numeric") || dom.numeric_input.is_some() {
            QuestionKind::Numeric
        } else {
            QuestionKind::MultipleChoice
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::Numeric => "numeric",
        }
    }
}

/// 选项指纹
///
/// 由当前可见选项的身份和按下状态按顺序组成，用来判断是否出现了新题目
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    entries: Vec<(String, String)>,
}

impl Fingerprint {
    pub fn of(options: &[&ElementInfo]) -> Self {
        Self {
            entries: options
                .iter()
                .map(|e| (e.identity(), e.pressed.clone().unwrap_or_default()))
                .collect(),
        }
    }

    /// 没有选项按钮的题目（数值题）使用题目容器构造指纹
    pub fn synthetic(tag: impl Into<String>) -> Self {
        Self {
            entries: vec![(tag.into(), String::new())],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 选项身份集合相同（忽略按下状态）
    pub fn same_options(&self, other: &Fingerprint) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((a, _), (b, _))| a == b)
    }

    /// 是否有选项处于按下状态
    pub fn has_selection(&self) -> bool {
        self.entries.iter().any(|(_, pressed)| pressed == "true")
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(id, pressed)| format!("{}{}", id, pressed))
            .collect();
        write!(f, "{}", parts.join("|"))
    }
}

/// 题目快照，检测到题目时构造，分发后丢弃
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionSnapshot {
    pub option_fingerprint: Fingerprint,
    pub question_text: String,
    pub options: Vec<String>,
    pub kind: QuestionKind,
}

impl QuestionSnapshot {
    /// 从页面快照和定位到的选项构造题目快照
    pub fn capture(dom: &DomSnapshot, options: &[&ElementInfo], fingerprint: Fingerprint) -> Self {
        let kind = QuestionKind::detect(dom);
        match kind {
            QuestionKind::Numeric => {
                let body = dom.question_body.trim();
                let text = if body.is_empty() {
                    dom.question_text.trim()
                } else {
                    body
                };
                Self {
                    option_fingerprint: fingerprint,
                    question_text: text.to_string(),
                    options: Vec::new(),
                    kind,
                }
            }
            QuestionKind::MultipleChoice => {
                let labels: Vec<String> = if dom.option_labels.is_empty() {
                    options
                        .iter()
                        .enumerate()
                        .map(|(i, b)| {
                            let text = b.text.trim();
                            if !text.is_empty() {
                                text.to_string()
                            } else {
                                LETTERS
                                    .get(i)
                                    .map(|l| l.to_string())
                                    .unwrap_or_else(|| (i + 1).to_string())
                            }
                        })
                        .collect()
                } else {
                    dom.option_labels
                        .iter()
                        .map(|l| l.text.trim().to_string())
                        .collect()
                };
                Self {
                    option_fingerprint: fingerprint,
                    question_text: dom.question_text.trim().to_string(),
                    options: labels,
                    kind,
                }
            }
        }
    }

    /// 转换为发送给 AI 的题目，无法解析时返回 None
    pub fn to_ai_question(&self) -> Option<AiQuestion> {
        match self.kind {
            QuestionKind::Numeric => {
                if self.question_text.is_empty() {
                    return None;
                }
                Some(AiQuestion::numeric(&self.question_text))
            }
            QuestionKind::MultipleChoice => {
                if self.question_text.is_empty() && self.options.is_empty() {
                    return None;
                }
                let question = if self.question_text.is_empty() {
                    "Select the best answer.".to_string()
                } else {
                    self.question_text.clone()
                };
                Some(AiQuestion::multiple_choice(question, self.options.clone()))
            }
        }
    }
}
