use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult, BrowserError};
use crate::services::url_pattern::UrlPattern;

/// 连接到已开启远程调试的浏览器，事件处理在后台任务中运行
pub async fn connect_to_browser(port: u16) -> AppResult<Browser> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (mut browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            message: e.to_string(),
        })
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 连接前已经打开的标签页需要主动获取
    browser.fetch_targets().await?;
    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;
    Ok(browser)
}

/// 打开新页面并导航
pub async fn open_page(browser: &Browser, url: &str) -> AppResult<Page> {
    debug!("创建新页面并导航到: {}", url);
    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建新页面失败: {}", e);
        AppError::Browser(BrowserError::PageCreationFailed(e.to_string()))
    })?;
    page.goto(url).await.map_err(|e| {
        error!("导航到 {} 失败: {}", url, e);
        AppError::Browser(BrowserError::PageCreationFailed(e.to_string()))
    })?;
    info!("已导航到: {}", url);
    Ok(page)
}

/// 连接到浏览器并获取页面
///
/// 已有 URL 匹配 `wanted` 的页面时直接使用，否则打开 `target_url`
pub async fn connect_to_browser_and_page(
    port: u16,
    target_url: &str,
    wanted: &[UrlPattern],
) -> AppResult<(Browser, Page)> {
    let browser = connect_to_browser(port).await?;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());
    for page in pages {
        let Ok(Some(url)) = page.url().await else {
            continue;
        };
        debug!("检查页面: {}", url);
        if wanted.iter().any(|p| p.matches(&url)) {
            info!("✓ 找到目标页面: {}", url);
            return Ok((browser, page));
        }
    }

    debug!("未找到匹配的页面，将创建新页面");
    let page = open_page(&browser, target_url).await?;
    Ok((browser, page))
}
