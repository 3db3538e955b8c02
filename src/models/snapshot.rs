//! 页面快照
//!
//! 注入脚本一次求值返回的页面事实。核心逻辑只读快照，不直接接触页面。

use serde::Deserialize;

/// 页面内注入脚本给元素分配的稳定编号（同一元素多次快照编号不变）
pub type ElementRef = u64;

/// 候选交互元素
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementInfo {
    #[serde(rename = "ref")]
    pub element_ref: ElementRef,
    pub id: String,
    pub tag: String,
    pub classes: Vec<String>,
    /// 元素所在的标记容器（容器的 class 名）
    pub containers: Vec<String>,
    pub enabled: bool,
    /// 计算样式非隐藏且包围盒非零
    pub visible: bool,
    /// aria-pressed 属性原值
    pub pressed: Option<String>,
    pub text: String,
}

impl Default for ElementInfo {
    fn default() -> Self {
        Self {
            element_ref: 0,
            id: String::new(),
            tag: "button".to_string(),
            classes: Vec::new(),
            containers: Vec::new(),
            enabled: true,
            visible: true,
            pressed: None,
            text: String::new(),
        }
    }
}

impl ElementInfo {
    pub fn new(element_ref: ElementRef) -> Self {
        Self {
            element_ref,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn inside(mut self, container: impl Into<String>) -> Self {
        self.containers.push(container.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_pressed(mut self, pressed: bool) -> Self {
        self.pressed = Some(pressed.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn is_within(&self, container: &str) -> bool {
        self.containers.iter().any(|c| c == container)
    }

    /// 启用且可见
    pub fn is_interactive(&self) -> bool {
        self.enabled && self.visible
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed.as_deref() == Some("true")
    }

    /// 用于指纹的身份：优先使用 id，其次使用稳定编号
    pub fn identity(&self) -> String {
        if self.id.is_empty() {
            format!("#{}", self.element_ref)
        } else {
            self.id.clone()
        }
    }
}

/// `.btn-container` 中的选项文字
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionLabel {
    /// 点击目标（容器的第一个子元素，没有则为容器本身）
    #[serde(rename = "ref")]
    pub element_ref: ElementRef,
    pub text: String,
}

/// 答题页面快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomSnapshot {
    pub url: String,
    /// document.visibilityState == "visible"
    pub visible: bool,
    /// 当前根容器的身份
    pub root_token: Option<u64>,
    /// 页面内观察器是否仍然挂在根容器上
    pub observer_attached: bool,
    pub elements: Vec<ElementInfo>,
    pub option_labels: Vec<OptionLabel>,
    /// 选择题题干
    pub question_text: String,
    /// 题目区域全部文字（数值题使用）
    pub question_body: String,
    /// 题型横幅文字
    pub type_banner: String,
    pub numeric_input: Option<ElementRef>,
    pub submit_button: Option<ElementInfo>,
    pub join_card_expanded: bool,
    pub join_button: Option<ElementInfo>,
    pub question_image: Option<String>,
}

impl DomSnapshot {
    pub fn at(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            visible: true,
            root_token: Some(1),
            observer_attached: true,
            ..Default::default()
        }
    }

    pub fn with_element(mut self, element: ElementInfo) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_label(mut self, element_ref: ElementRef, text: impl Into<String>) -> Self {
        self.option_labels.push(OptionLabel {
            element_ref,
            text: text.into(),
        });
        self
    }

    pub fn element(&self, element_ref: ElementRef) -> Option<&ElementInfo> {
        self.elements.iter().find(|e| e.element_ref == element_ref)
    }

    pub fn element_by_id(&self, id: &str) -> Option<&ElementInfo> {
        self.elements.iter().find(|e| e.id == id)
    }
}

/// AI 页面快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSnapshot {
    pub url: String,
    pub input_present: bool,
    pub send_ready: bool,
    /// "正在生成" 指示器是否存在
    pub generating: bool,
    /// 最后一条助手消息
    pub last_message: Option<String>,
}
