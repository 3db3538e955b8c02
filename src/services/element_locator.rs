//! 选项元素定位 - 业务能力层
//!
//! 按优先级依次尝试多种定位策略，第一个找到至少两个可交互候选的策略胜出。
//! 每次分发都基于新的页面快照重新定位，结果不缓存（题目之间元素会被替换）。

use serde::Serialize;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::snapshot::{DomSnapshot, ElementInfo};

/// 胜出策略至少需要的候选数量
const MIN_CANDIDATES: usize = 2;

/// 页面上选项元素的命名约定
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatorProfile {
    /// 观察器挂载的根容器
    pub root_selector: String,
    /// 题目容器的 class
    pub question_container: String,
    /// 按字母固定的 id 前缀，如 `multiple-choice-`
    pub id_prefix: String,
    pub id_suffixes: Vec<String>,
    pub option_container: String,
    pub option_tag: String,
    pub option_class: String,
    pub structural_container: String,
    pub structural_tag: String,
}

impl Default for LocatorProfile {
    fn default() -> Self {
        Self {
            root_selector: "#wrapper".to_string(),
            question_container: "question-type-container".to_string(),
            id_prefix: "multiple-choice-".to_string(),
            id_suffixes: ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect(),
            option_container: "btn-container".to_string(),
            option_tag: "button".to_string(),
            option_class: "btn".to_string(),
            structural_container: "answer-controls-container".to_string(),
            structural_tag: "button".to_string(),
        }
    }
}

impl LocatorProfile {
    /// 字母对应的固定 id
    pub fn option_id(&self, letter: char) -> String {
        format!("{}{}", self.id_prefix, letter.to_ascii_lowercase())
    }
}

/// 定位策略
pub trait LocateStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 返回已过滤为启用且可见的候选，按页面顺序排列
    fn find<'a>(&self, dom: &'a DomSnapshot) -> Vec<&'a ElementInfo>;
}

/// 按字母固定 id 查找
pub struct IdConvention {
    ids: Vec<String>,
}

impl IdConvention {
    pub fn new(profile: &LocatorProfile) -> Self {
        Self {
            ids: profile
                .id_suffixes
                .iter()
                .map(|s| format!("{}{}", profile.id_prefix, s))
                .collect(),
        }
    }
}

impl LocateStrategy for IdConvention {
    fn name(&self) -> &'static str {
        "id"
    }

    fn find<'a>(&self, dom: &'a DomSnapshot) -> Vec<&'a ElementInfo> {
        self.ids
            .iter()
            .filter_map(|id| dom.element_by_id(id))
            .filter(|e| e.is_interactive())
            .collect()
    }
}

/// 已知容器内带指定 class 的元素
pub struct ClassInContainer {
    container: String,
    tag: String,
    class: String,
}

impl ClassInContainer {
    pub fn new(profile: &LocatorProfile) -> Self {
        Self {
            container: profile.option_container.clone(),
            tag: profile.option_tag.clone(),
            class: profile.option_class.clone(),
        }
    }
}

impl LocateStrategy for ClassInContainer {
    fn name(&self) -> &'static str {
        "class"
    }

    fn find<'a>(&self, dom: &'a DomSnapshot) -> Vec<&'a ElementInfo> {
        dom.elements
            .iter()
            .filter(|e| e.tag == self.tag && e.has_class(&self.class) && e.is_within(&self.container))
            .filter(|e| e.is_interactive())
            .collect()
    }
}

/// 已知祖先容器内的任意交互元素
pub struct StructuralFallback {
    container: String,
    tag: String,
}

impl StructuralFallback {
    pub fn new(profile: &LocatorProfile) -> Self {
        Self {
            container: profile.structural_container.clone(),
            tag: profile.structural_tag.clone(),
        }
    }
}

impl LocateStrategy for StructuralFallback {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn find<'a>(&self, dom: &'a DomSnapshot) -> Vec<&'a ElementInfo> {
        dom.elements
            .iter()
            .filter(|e| e.tag == self.tag && e.is_within(&self.container))
            .filter(|e| e.is_interactive())
            .collect()
    }
}

/// 多策略定位器
pub struct ElementLocator {
    strategies: Vec<Box<dyn LocateStrategy>>,
}

impl ElementLocator {
    /// 默认策略顺序：固定 id → class → 结构
    pub fn new(profile: &LocatorProfile) -> Self {
        Self::with_strategies(vec![
            Box::new(IdConvention::new(profile)),
            Box::new(ClassInContainer::new(profile)),
            Box::new(StructuralFallback::new(profile)),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn LocateStrategy>>) -> Self {
        Self { strategies }
    }

    /// 定位选项，没有策略满足时返回 `LocatorMiss`
    pub fn locate<'a>(&self, dom: &'a DomSnapshot) -> AppResult<Vec<&'a ElementInfo>> {
        for strategy in &self.strategies {
            let candidates = strategy.find(dom);
            if candidates.len() >= MIN_CANDIDATES {
                debug!("定位策略 {} 找到 {} 个选项", strategy.name(), candidates.len());
                return Ok(candidates);
            }
        }
        Err(AppError::LocatorMiss)
    }

    /// 定位选项，未命中时返回空列表
    pub fn locate_or_empty<'a>(&self, dom: &'a DomSnapshot) -> Vec<&'a ElementInfo> {
        self.locate(dom).unwrap_or_default()
    }
}
