//! 题目检测
//!
//! 把页面事件和 URL 所在区域归类为"出现题目"或"可以加入课堂"信号

use std::collections::HashSet;

use tracing::debug;

use crate::models::page_event::{NodeRef, NodeSummary};
use crate::models::question::{Fingerprint, QuestionKind, QuestionSnapshot};
use crate::models::snapshot::{DomSnapshot, ElementInfo};

const CLASS_MARKER: &str = "student.iclicker.com/#/class";
const COURSE_MARKER: &str = "student.iclicker.com/#/course";

/// URL 所在的页面区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSection {
    /// 课堂答题页
    Poll,
    /// 课程概览页（加入课堂 / 下课）
    CourseOverview,
    Other,
}

impl PageSection {
    pub fn classify(url: &str) -> Self {
        if url.contains(CLASS_MARKER) && (url.contains("/poll") || url.contains("/question/")) {
            PageSection::Poll
        } else if url.contains(COURSE_MARKER) && url.contains("/overview") {
            PageSection::CourseOverview
        } else {
            PageSection::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    AwaitingQuestion,
    QuestionVisible,
    AwaitingJoin,
}

/// 概览页上 aria-hidden 变化的含义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverviewSignal {
    /// 从答题页回到概览页：下课
    pub class_ended: bool,
    /// 加入卡片已展开
    pub join_available: bool,
}

pub struct QuestionDetector {
    state: DetectorState,
    container_class: String,
    /// 已经开始等待稳定的题目容器（同一容器的突发变更只触发一次）
    seen_containers: HashSet<NodeRef>,
    settling: Option<NodeRef>,
}

impl QuestionDetector {
    pub fn new(container_class: impl Into<String>) -> Self {
        Self {
            state: DetectorState::Idle,
            container_class: container_class.into(),
            seen_containers: HashSet::new(),
            settling: None,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// 进入新的 URL，返回所在区域
    pub fn on_url(&mut self, url: &str) -> PageSection {
        let section = PageSection::classify(url);
        let next = match section {
            PageSection::Poll => DetectorState::AwaitingQuestion,
            PageSection::CourseOverview => DetectorState::AwaitingJoin,
            PageSection::Other => DetectorState::Idle,
        };
        if next != self.state {
            debug!("检测状态 {:?} → {:?}", self.state, next);
        }
        self.state = next;
        self.seen_containers.clear();
        self.settling = None;
        section
    }

    /// 新增节点；是新的题目容器时返回容器编号，调用方据此启动稳定计时
    pub fn on_node_added(&mut self, node: &NodeSummary) -> Option<NodeRef> {
        if !matches!(
            self.state,
            DetectorState::AwaitingQuestion | DetectorState::QuestionVisible
        ) {
            return None;
        }
        if !node.has_class(&self.container_class) {
            return None;
        }
        if !self.seen_containers.insert(node.node_ref) {
            return None;
        }
        self.settling = Some(node.node_ref);
        Some(node.node_ref)
    }

    /// 稳定计时结束后构造题目快照，选项和数值输入框都不存在时返回 None
    pub fn on_settled(
        &mut self,
        dom: &DomSnapshot,
        options: &[&ElementInfo],
    ) -> Option<QuestionSnapshot> {
        let container = self.settling.take()?;
        if !matches!(
            self.state,
            DetectorState::AwaitingQuestion | DetectorState::QuestionVisible
        ) {
            return None;
        }
        let kind = QuestionKind::detect(dom);
        let fingerprint = if options.len() >= 2 {
            Fingerprint::of(options)
        } else if kind == QuestionKind::Numeric {
            Fingerprint::synthetic(format!("numeric:{}", container))
        } else {
            return None;
        };
        self.state = DetectorState::QuestionVisible;
        Some(QuestionSnapshot::capture(dom, options, fingerprint))
    }

    /// 属性变化；只有概览页上的 aria-hidden 有意义
    pub fn on_attribute(
        &self,
        attribute: &str,
        dom: &DomSnapshot,
        prev_page_was_poll: bool,
    ) -> Option<OverviewSignal> {
        if attribute != "aria-hidden" || self.state != DetectorState::AwaitingJoin {
            return None;
        }
        Some(OverviewSignal {
            class_ended: prev_page_was_poll,
            join_available: dom.join_card_expanded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: &str = "https://student.iclicker.com/#/class/abc/poll";
    const OVERVIEW: &str = "https://student.iclicker.com/#/course/abc/overview";

    fn container(r: u64) -> NodeSummary {
        NodeSummary {
            node_ref: r,
            tag: "div".into(),
            id: String::new(),
            classes: vec!["question-type-container".into()],
        }
    }

    #[test]
    fn sections_follow_url_shape() {
        assert_eq!(PageSection::classify(POLL), PageSection::Poll);
        assert_eq!(
            PageSection::classify("https://student.iclicker.com/#/class/abc/question/9"),
            PageSection::Poll
        );
        assert_eq!(PageSection::classify(OVERVIEW), PageSection::CourseOverview);
        assert_eq!(
            PageSection::classify("https://student.iclicker.com/#/courses"),
            PageSection::Other
        );
    }

    #[test]
    fn container_bursts_settle_once() {
        let mut detector = QuestionDetector::new("question-type-container");
        detector.on_url(POLL);
        assert_eq!(detector.on_node_added(&container(3)), Some(3));
        assert_eq!(detector.on_node_added(&container(3)), None);
        assert_eq!(detector.on_node_added(&container(4)), Some(4));
    }

    #[test]
    fn containers_ignored_outside_poll() {
        let mut detector = QuestionDetector::new("question-type-container");
        detector.on_url(OVERVIEW);
        assert_eq!(detector.on_node_added(&container(3)), None);
    }

    #[test]
    fn settled_numeric_question_gets_synthetic_fingerprint() {
        let mut detector = QuestionDetector::new("question-type-container");
        detector.on_url(POLL);
        detector.on_node_added(&container(8));
        let mut dom = DomSnapshot::at(POLL);
        dom.numeric_input = Some(20);
        dom.question_body = "How fast?".into();
        let q = detector.on_settled(&dom, &[]).unwrap();
        assert_eq!(q.kind, QuestionKind::Numeric);
        assert_eq!(q.option_fingerprint, Fingerprint::synthetic("numeric:8"));
        assert_eq!(detector.state(), DetectorState::QuestionVisible);
        assert!(detector.on_settled(&dom, &[]).is_none());
    }

    #[test]
    fn aria_hidden_on_overview_reports_join_and_class_end() {
        let mut detector = QuestionDetector::new("question-type-container");
        detector.on_url(OVERVIEW);
        let mut dom = DomSnapshot::at(OVERVIEW);
        dom.join_card_expanded = true;
        assert_eq!(
            detector.on_attribute("aria-hidden", &dom, false),
            Some(OverviewSignal {
                class_ended: false,
                join_available: true
            })
        );
        assert_eq!(detector.on_attribute("class", &dom, true), None);
    }
}
