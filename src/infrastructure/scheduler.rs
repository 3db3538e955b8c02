//! 命名定时器调度
//!
//! 每个逻辑定时器（settle、answerDelay、pollTimeout ...）同时最多挂起一个，
//! 重新调度会替换原截止时间。到期顺序按截止时间排列。

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// 命名定时器表
#[derive(Debug, Clone)]
pub struct Scheduler<K> {
    deadlines: HashMap<K, Duration>,
}

impl<K: Copy + Eq + Hash> Default for Scheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash> Scheduler<K> {
    pub fn new() -> Self {
        Self {
            deadlines: HashMap::new(),
        }
    }

    /// 在 `now + delay` 时触发 `timer`
    pub fn schedule(&mut self, timer: K, now: Duration, delay: Duration) {
        self.deadlines.insert(timer, now + delay);
    }

    pub fn cancel(&mut self, timer: K) -> bool {
        self.deadlines.remove(&timer).is_some()
    }

    pub fn is_pending(&self, timer: K) -> bool {
        self.deadlines.contains_key(&timer)
    }

    /// 清除全部定时器
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// 最近的截止时间
    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadlines.values().min().copied()
    }

    /// 取出最早到期的一个定时器
    ///
    /// 每次只取一个，前一个定时器的处理可以取消或重排后面的定时器
    pub fn pop_due(&mut self, now: Duration) -> Option<K> {
        let (timer, _) = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .min_by_key(|(_, at)| **at)
            .map(|(k, at)| (*k, *at))?;
        self.deadlines.remove(&timer);
        Some(timer)
    }
}
