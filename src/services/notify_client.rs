//! 通知服务客户端
//!
//! 调用失败只记录日志，从不阻塞答题流程

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, NetworkError};

/// 题目图片缺失时使用的占位图
pub const DEFAULT_QUESTION_IMAGE: &str =
    "https://institutional-web-assets-share.s3.amazonaws.com/iClicker/student/images/image_hidden_2.png";

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    /// 出现新题目
    Question,
    /// 开始上课（即将加入）
    ClassStart,
    /// 下课
    ClassEnd,
}

impl NotifyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotifyKind::Question => "ques",
            NotifyKind::ClassStart => "classStart",
            NotifyKind::ClassEnd => "classEnd",
        }
    }
}

#[derive(Debug, Serialize)]
struct NotifyPayload<'a> {
    email: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    img: Option<&'a str>,
}

pub struct NotifyClient {
    http: reqwest::Client,
    endpoint: String,
}

impl NotifyClient {
    pub fn new(http: reqwest::Client, host: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/notify", host.trim_end_matches('/')),
        }
    }

    pub async fn notify(&self, kind: NotifyKind, email: &str, img: Option<&str>) -> AppResult<()> {
        let payload = NotifyPayload {
            email,
            kind: kind.as_str(),
            img,
        };
        debug!("发送通知 {} → {}", kind.as_str(), self.endpoint);
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::request_failed(&self.endpoint, e))?;
        if !resp.status().is_success() {
            return Err(NetworkError::BadStatus {
                endpoint: self.endpoint.clone(),
                status: resp.status().as_u16(),
            }
            .into());
        }
        Ok(())
    }

    /// 发送通知，失败只记录警告
    pub async fn notify_best_effort(&self, kind: NotifyKind, email: &str, img: Option<&str>) {
        if let Err(e) = self.notify(kind, email, img).await {
            warn!("⚠️ 通知发送失败 ({}): {}", kind.as_str(), e);
        }
    }
}
