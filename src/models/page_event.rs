//! 页面变更事件
//!
//! 由 ChangeObserver 产生，QuestionDetector 立即消费，不做保存

use serde::Deserialize;

/// 页面内注入脚本给节点分配的编号
pub type NodeRef = u64;

/// 页面事件类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEventKind {
    /// 新增节点
    NodeAdded,
    /// 属性变化
    AttributeChanged { attribute: String },
}

/// 受影响节点的摘要信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NodeSummary {
    #[serde(rename = "ref")]
    pub node_ref: NodeRef,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub classes: Vec<String>,
}

impl NodeSummary {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// 规范化后的页面事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEvent {
    pub kind: PageEventKind,
    /// 事件产生时的时钟读数（毫秒）
    pub timestamp_ms: u64,
    pub node: NodeSummary,
}

impl PageEvent {
    pub fn node_added(node: NodeSummary, timestamp_ms: u64) -> Self {
        Self {
            kind: PageEventKind::NodeAdded,
            timestamp_ms,
            node,
        }
    }

    pub fn attribute_changed(
        node: NodeSummary,
        attribute: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            kind: PageEventKind::AttributeChanged {
                attribute: attribute.into(),
            },
            timestamp_ms,
            node,
        }
    }
}
