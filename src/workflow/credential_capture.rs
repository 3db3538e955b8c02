//! 会话凭据采集与多数人答案轮询状态
//!
//! 尽力而为：失败只记录日志，下一次轮询照常进行

use tracing::{debug, warn};

use crate::services::reporting_client::{MajorityAnswer, SessionCredentials};
use crate::workflow::effect::Effect;

#[derive(Debug, Default)]
pub struct CredentialCapture {
    creds: Option<SessionCredentials>,
    activity_id: Option<String>,
    /// 凭据到达后需要查询活动编号
    want_activity: bool,
    resolving: bool,
    /// 当前题目已按多数人答案点击的字母
    followed: Option<char>,
}

impl CredentialCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activity_id(&self) -> Option<&str> {
        self.activity_id.as_deref()
    }

    /// 请求重新读取凭据；`resolve_activity` 表示读到后还要查询活动编号
    pub fn capture(&mut self, resolve_activity: bool) -> Effect {
        self.want_activity |= resolve_activity;
        Effect::CaptureSession
    }

    /// 还没有活动编号且没有查询在进行
    pub fn needs_activity(&self) -> bool {
        self.activity_id.is_none() && !self.resolving && !self.want_activity
    }

    pub fn on_captured(&mut self, creds: SessionCredentials) -> Option<Effect> {
        let complete = creds.is_complete();
        self.creds = Some(creds);
        if !complete {
            debug!("会话凭据不完整，暂不查询活动");
            self.want_activity = false;
            return None;
        }
        if !std::mem::take(&mut self.want_activity) || self.resolving {
            return None;
        }
        self.resolving = true;
        self.creds.clone().map(Effect::ResolveActivity)
    }

    pub fn on_activity(&mut self, activity: Option<String>) {
        self.resolving = false;
        match activity {
            Some(id) => {
                debug!("activityId: {}", id);
                self.activity_id = Some(id);
            }
            None => warn!("⚠️ 未能获取活动编号"),
        }
    }

    /// 凭据和活动编号都已就绪时的查询副作用
    pub fn majority_request(&self) -> Option<Effect> {
        let creds = self.creds.as_ref().filter(|c| c.is_complete())?;
        let activity_id = self.activity_id.clone()?;
        Some(Effect::FetchMajority {
            creds: creds.clone(),
            activity_id,
        })
    }

    /// 新题目开始：清除已跟随的答案
    pub fn reset_question(&mut self) {
        self.followed = None;
    }

    /// 返回本次需要点击的字母；与已点击的相同则返回 None
    pub fn follow(&mut self, answer: MajorityAnswer, default_letter: char) -> Option<char> {
        let letter = match answer {
            MajorityAnswer::Letter(letter) => letter,
            // 还没人作答：只在尚未点击时点击默认选项
            MajorityAnswer::NoData if self.followed.is_none() => default_letter,
            MajorityAnswer::NoData => return None,
        };
        if self.followed == Some(letter) {
            return None;
        }
        self.followed = Some(letter);
        Some(letter)
    }
}
