//! 指纹闸门
//!
//! 保证每个不同的题目实例最多分发一次答案

use crate::models::question::Fingerprint;

/// 一次观测的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// 新题目：已加锁，应安排延迟分发
    Arm,
    /// 与上次相同或锁仍然有效，不做任何事
    Unchanged,
    /// 我们刚点击的选项变为按下状态（答案已登记），不是新题目
    SelectionFeedback,
}

#[derive(Debug, Default)]
pub struct FingerprintGate {
    last: Option<Fingerprint>,
    locked: bool,
    /// 当前题目已经由我们点击过
    dispatched: bool,
}

impl FingerprintGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一次页面变更后的指纹
    pub fn observe(&mut self, fingerprint: Fingerprint) -> GateDecision {
        if fingerprint.is_empty() {
            // 选项消失：忘掉上一题，下一次出现的选项一定按新题目处理
            if self.last.is_some() && !self.locked {
                self.last = None;
                self.dispatched = false;
            }
            return GateDecision::Unchanged;
        }

        if self.last.as_ref() == Some(&fingerprint) {
            return GateDecision::Unchanged;
        }

        let feedback = self.dispatched
            && fingerprint.has_selection()
            && self
                .last
                .as_ref()
                .map(|last| last.same_options(&fingerprint))
                .unwrap_or(false);
        if feedback {
            self.last = Some(fingerprint);
            return GateDecision::SelectionFeedback;
        }

        // 不同的指纹：旧锁作废，新题目立即加锁
        self.last = Some(fingerprint);
        self.locked = true;
        self.dispatched = false;
        GateDecision::Arm
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn current(&self) -> Option<&Fingerprint> {
        self.last.as_ref()
    }

    /// 分发前校验失败或请求被拒绝：释放锁并忘掉指纹，下一次变更会重试
    pub fn release(&mut self) {
        self.locked = false;
        self.last = None;
        self.dispatched = false;
    }

    /// 已经对当前题目执行了点击 / 填写
    pub fn mark_dispatched(&mut self) {
        self.dispatched = true;
    }

    /// 分发结束，保留指纹以便忽略同一题目的后续变更
    pub fn complete(&mut self) {
        self.locked = false;
    }

    /// URL 变化或停止运行
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snapshot::ElementInfo;

    fn fp(ids: &[&str], pressed: Option<usize>) -> Fingerprint {
        let elements: Vec<ElementInfo> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| ElementInfo::new(i as u64).with_id(*id).with_pressed(Some(i) == pressed))
            .collect();
        let refs: Vec<&ElementInfo> = elements.iter().collect();
        Fingerprint::of(&refs)
    }

    #[test]
    fn identical_fingerprints_arm_once() {
        let mut gate = FingerprintGate::new();
        let q = fp(&["a", "b", "c"], None);
        let arms = (0..50)
            .map(|_| gate.observe(q.clone()))
            .filter(|d| *d == GateDecision::Arm)
            .count();
        assert_eq!(arms, 1);
        assert!(gate.is_locked());
    }

    #[test]
    fn lock_set_at_most_once_per_distinct_value() {
        let mut gate = FingerprintGate::new();
        let a = fp(&["a", "b"], None);
        let b = fp(&["x", "y", "z"], None);
        let sequence = [&a, &a, &b, &b, &b, &a, &a];
        let decisions: Vec<_> = sequence.iter().map(|f| gate.observe((*f).clone())).collect();
        let arms: Vec<usize> = decisions
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == GateDecision::Arm)
            .map(|(i, _)| i)
            .collect();
        // 每段连续相同的值只在第一次加锁
        assert_eq!(arms, vec![0, 2, 5]);
    }

    #[test]
    fn own_selection_is_feedback_not_new_question() {
        let mut gate = FingerprintGate::new();
        assert_eq!(gate.observe(fp(&["a", "b"], None)), GateDecision::Arm);
        gate.mark_dispatched();
        gate.complete();
        assert_eq!(
            gate.observe(fp(&["a", "b"], Some(1))),
            GateDecision::SelectionFeedback
        );
        // 下一题：同样的 id，全部未按下
        assert_eq!(gate.observe(fp(&["a", "b"], None)), GateDecision::Arm);
    }

    #[test]
    fn release_forgets_fingerprint_for_retry() {
        let mut gate = FingerprintGate::new();
        let q = fp(&["a", "b"], None);
        assert_eq!(gate.observe(q.clone()), GateDecision::Arm);
        gate.release();
        assert!(!gate.is_locked());
        assert_eq!(gate.observe(q), GateDecision::Arm);
    }

    #[test]
    fn empty_fingerprint_clears_resolved_question() {
        let mut gate = FingerprintGate::new();
        let q = fp(&["a", "b"], None);
        gate.observe(q.clone());
        gate.complete();
        assert_eq!(gate.observe(Fingerprint::default()), GateDecision::Unchanged);
        assert_eq!(gate.observe(q), GateDecision::Arm);
    }
}
