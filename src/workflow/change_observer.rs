//! 页面变更观察
//!
//! 页面内的 MutationObserver 把变更批次推给绑定，这里负责订阅状态和事件规范化。
//! 是页面事件的唯一来源。

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ParseError;
use crate::models::page_event::{NodeSummary, PageEvent};
use crate::models::snapshot::DomSnapshot;
use crate::workflow::effect::Effect;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMutation {
    kind: String,
    #[serde(default)]
    attribute: Option<String>,
    node: NodeSummary,
}

#[derive(Debug, Default)]
pub struct ChangeObserver {
    active: bool,
    /// 当前订阅的根容器
    root: Option<u64>,
}

impl ChangeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn root(&self) -> Option<u64> {
        self.root
    }

    /// 订阅根容器，已订阅时先断开旧订阅；页面上没有根容器时返回 None
    pub fn subscribe(&mut self, dom: &DomSnapshot) -> Option<Vec<Effect>> {
        let root = dom.root_token?;
        let mut effects = Vec::new();
        if self.active {
            effects.push(Effect::DisconnectObserver);
        }
        effects.push(Effect::AttachObserver);
        self.active = true;
        self.root = Some(root);
        info!("▶ 观察器已启动: {}", dom.url);
        Some(effects)
    }

    /// 根容器被替换（或页面重新加载丢失了观察器）时重新订阅
    pub fn ensure_attached(&mut self, dom: &DomSnapshot) -> Vec<Effect> {
        if !self.active {
            return Vec::new();
        }
        let Some(root) = dom.root_token else {
            return Vec::new();
        };
        if self.root == Some(root) && dom.observer_attached {
            return Vec::new();
        }
        debug!("根容器已替换 ({:?} → {})，重新挂载观察器", self.root, root);
        self.root = Some(root);
        vec![Effect::DisconnectObserver, Effect::AttachObserver]
    }

    pub fn disconnect(&mut self) -> Vec<Effect> {
        self.root = None;
        if !self.active {
            return Vec::new();
        }
        self.active = false;
        vec![Effect::DisconnectObserver]
    }

    /// 页面上下文已丢失，不再向页面发出任何指令
    pub fn kill(&mut self) {
        self.active = false;
        self.root = None;
    }

    /// 把绑定收到的批次转换为页面事件，非元素节点与未知类型被丢弃
    pub fn normalize(payload: &str, timestamp_ms: u64) -> Result<Vec<PageEvent>, ParseError> {
        let batch: Vec<RawMutation> = serde_json::from_str(payload)?;
        Ok(batch
            .into_iter()
            .filter(|m| !m.node.tag.is_empty())
            .filter_map(|m| match (m.kind.as_str(), m.attribute) {
                ("nodeAdded", _) => Some(PageEvent::node_added(m.node, timestamp_ms)),
                ("attributeChanged", Some(attr)) => {
                    Some(PageEvent::attribute_changed(m.node, attr, timestamp_ms))
                }
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::page_event::PageEventKind;

    #[test]
    fn resubscribe_drops_old_subscription_first() {
        let mut observer = ChangeObserver::new();
        let dom = DomSnapshot::at("https://student.iclicker.com/#/class/1/poll");
        assert_eq!(observer.subscribe(&dom), Some(vec![Effect::AttachObserver]));
        assert_eq!(
            observer.subscribe(&dom),
            Some(vec![Effect::DisconnectObserver, Effect::AttachObserver])
        );
    }

    #[test]
    fn missing_root_is_not_subscribed() {
        let mut observer = ChangeObserver::new();
        let mut dom = DomSnapshot::at("https://x");
        dom.root_token = None;
        assert_eq!(observer.subscribe(&dom), None);
        assert!(!observer.is_active());
    }

    #[test]
    fn replaced_root_is_reattached() {
        let mut observer = ChangeObserver::new();
        let mut dom = DomSnapshot::at("https://x");
        observer.subscribe(&dom);
        assert!(observer.ensure_attached(&dom).is_empty());
        dom.root_token = Some(2);
        assert_eq!(
            observer.ensure_attached(&dom),
            vec![Effect::DisconnectObserver, Effect::AttachObserver]
        );
        assert_eq!(observer.root(), Some(2));
    }

    #[test]
    fn inactive_observer_ignores_root_changes() {
        let mut observer = ChangeObserver::new();
        let dom = DomSnapshot::at("https://x");
        assert!(observer.ensure_attached(&dom).is_empty());
        assert!(observer.disconnect().is_empty());
    }

    #[test]
    fn normalize_keeps_elements_only() {
        let payload = r#"[
            {"kind":"nodeAdded","node":{"ref":4,"tag":"div","id":"","classes":["question-type-container"]}},
            {"kind":"attributeChanged","attribute":"aria-hidden","node":{"ref":5,"tag":"div"}},
            {"kind":"nodeAdded","node":{"ref":6,"tag":""}},
            {"kind":"characterData","node":{"ref":7,"tag":"span"}}
        ]"#;
        let events = ChangeObserver::normalize(payload, 1200).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].node.has_class("question-type-container"));
        assert_eq!(
            events[1].kind,
            PageEventKind::AttributeChanged {
                attribute: "aria-hidden".into()
            }
        );
        assert_eq!(events[1].timestamp_ms, 1200);
        assert!(ChangeObserver::normalize("not json", 0).is_err());
    }
}
