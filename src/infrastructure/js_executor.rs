//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS"的能力

use chromiumoxide::cdp::js_protocol::runtime::AddBindingParams;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::scripts;
use crate::models::ai_service::PageProfile;
use crate::models::snapshot::{BridgeSnapshot, DomSnapshot, ElementRef};
use crate::services::element_locator::LocatorProfile;
use crate::services::reporting_client::SessionCredentials;

/// 观察器安装结果
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObserverAttachment {
    pub attached: bool,
    pub root_token: Option<u64>,
}

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 能力以及少量类型化的页面操作
/// - 不做答题决策
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 注册页面向 Rust 推送数据的绑定
    pub async fn add_binding(&self, name: &str) -> AppResult<()> {
        self.page
            .execute(AddBindingParams::new(name))
            .await
            .map_err(|e| {
                AppError::Browser(BrowserError::BindingFailed {
                    name: name.to_string(),
                    message: e.to_string(),
                })
            })?;
        debug!("已注册页面绑定: {}", name);
        Ok(())
    }

    /// 当前页面地址
    pub async fn current_url(&self) -> AppResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    // ========== 答题页面 ==========

    pub async fn snapshot(&self, profile: &LocatorProfile) -> AppResult<DomSnapshot> {
        self.eval_as(scripts::dom_snapshot(profile)).await
    }

    pub async fn install_observer(&self, profile: &LocatorProfile) -> AppResult<ObserverAttachment> {
        self.eval_as(scripts::install_observer(profile)).await
    }

    pub async fn disconnect_observer(&self) -> AppResult<()> {
        self.eval(scripts::disconnect_observer()).await?;
        Ok(())
    }

    /// 派发指针事件序列，元素已不在页面上时返回 false
    pub async fn click(&self, element: ElementRef) -> AppResult<bool> {
        self.eval_as(scripts::pointer_click(element)).await
    }

    pub async fn fill(&self, element: ElementRef, value: &str) -> AppResult<bool> {
        self.eval_as(scripts::fill_value(element, value)).await
    }

    pub async fn read_credentials(&self) -> AppResult<SessionCredentials> {
        self.eval_as(scripts::read_credentials()).await
    }

    pub async fn reload(&self) -> AppResult<()> {
        self.eval(scripts::reload()).await?;
        Ok(())
    }

    // ========== AI 页面 ==========

    pub async fn bridge_snapshot(&self, profile: &PageProfile) -> AppResult<BridgeSnapshot> {
        self.eval_as(scripts::bridge_snapshot(profile)).await
    }

    pub async fn bridge_fill(&self, profile: &PageProfile, prompt: &str) -> AppResult<bool> {
        self.eval_as(scripts::bridge_fill(profile, prompt)).await
    }

    pub async fn bridge_send(&self, profile: &PageProfile) -> AppResult<bool> {
        self.eval_as(scripts::bridge_send(profile)).await
    }
}
