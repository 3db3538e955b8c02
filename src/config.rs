use std::time::Duration;

use crate::models::ai_service::AiService;
use crate::services::element_locator::LocatorProfile;
use crate::workflow::agent::AgentSettings;
use crate::workflow::bridge_session::BridgeSettings;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 启动时若没有题目页面则打开的地址
    pub target_url: String,
    /// 接收 AI 回复的页面（答题页面）URL 模式
    pub consumer_url_patterns: Vec<String>,
    /// 会话配置存储文件
    pub store_path: String,
    /// 设置页面地址
    pub settings_url: String,
    /// 通知服务地址
    pub notify_host: String,
    /// 报表 / 活动查询 API 地址
    pub reporting_api_base: String,
    /// 请求 Origin 头
    pub reporting_origin: String,
    /// 页面扫描间隔（毫秒）
    pub tab_scan_ms: u64,
    // --- 答题节奏 ---
    pub question_settle_ms: u64,
    pub answer_delay_ms: u64,
    pub select_delay_ms: u64,
    pub click_delay_ms: u64,
    pub submit_delay_ms: u64,
    pub ai_timeout_ms: u64,
    pub url_watch_ms: u64,
    pub boot_resume_ms: u64,
    pub observer_retry_ms: u64,
    pub majority_poll_ms: u64,
    /// 默认选项字母
    pub default_letter: char,
    /// 是否跟随多数人答案
    pub follow_majority: bool,
    /// 多数人数据为空时点击的选项
    pub majority_default_index: usize,
    // --- AI 页面桥接 ---
    pub bridge_compose_ms: u64,
    pub bridge_submit_ms: u64,
    pub bridge_poll_ms: u64,
    pub bridge_quiet_ms: u64,
    pub bridge_timeout_ms: u64,
    // --- LLM 配置（api 目标） ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            target_url: "https://student.iclicker.com/#/courses".to_string(),
            consumer_url_patterns: vec![
                "https://student.iclicker.com/*".to_string(),
                "https://*.mheducation.com/*".to_string(),
            ],
            store_path: "session.toml".to_string(),
            settings_url: "about:blank#quiz-autopilot-settings".to_string(),
            notify_host: "https://bye-clicker-api.vercel.app".to_string(),
            reporting_api_base: "https://api.iclicker.com".to_string(),
            reporting_origin: "https://student.iclicker.com".to_string(),
            tab_scan_ms: 2000,
            question_settle_ms: 3000,
            answer_delay_ms: 2500,
            select_delay_ms: 5000,
            click_delay_ms: 500,
            submit_delay_ms: 400,
            ai_timeout_ms: 75_000,
            url_watch_ms: 500,
            boot_resume_ms: 500,
            observer_retry_ms: 1000,
            majority_poll_ms: 5000,
            default_letter: 'A',
            follow_majority: false,
            majority_default_index: 0,
            bridge_compose_ms: 500,
            bridge_submit_ms: 600,
            bridge_poll_ms: 800,
            bridge_quiet_ms: 2000,
            bridge_timeout_ms: 60_000,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", default.browser_debug_port),
            target_url: std::env::var("TARGET_URL").unwrap_or(default.target_url),
            consumer_url_patterns: std::env::var("CONSUMER_URL_PATTERNS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.consumer_url_patterns),
            store_path: std::env::var("STORE_PATH").unwrap_or(default.store_path),
            settings_url: std::env::var("SETTINGS_URL").unwrap_or(default.settings_url),
            notify_host: std::env::var("NOTIFY_HOST").unwrap_or(default.notify_host),
            reporting_api_base: std::env::var("REPORTING_API_BASE")
                .unwrap_or(default.reporting_api_base),
            reporting_origin: std::env::var("REPORTING_ORIGIN").unwrap_or(default.reporting_origin),
            tab_scan_ms: env_parse("TAB_SCAN_MS", default.tab_scan_ms),
            question_settle_ms: env_parse("QUESTION_SETTLE_MS", default.question_settle_ms),
            answer_delay_ms: env_parse("ANSWER_DELAY_MS", default.answer_delay_ms),
            select_delay_ms: env_parse("SELECT_DELAY_MS", default.select_delay_ms),
            click_delay_ms: env_parse("CLICK_DELAY_MS", default.click_delay_ms),
            submit_delay_ms: env_parse("SUBMIT_DELAY_MS", default.submit_delay_ms),
            ai_timeout_ms: env_parse("AI_TIMEOUT_MS", default.ai_timeout_ms),
            url_watch_ms: env_parse("URL_WATCH_MS", default.url_watch_ms),
            boot_resume_ms: env_parse("BOOT_RESUME_MS", default.boot_resume_ms),
            observer_retry_ms: env_parse("OBSERVER_RETRY_MS", default.observer_retry_ms),
            majority_poll_ms: env_parse("MAJORITY_POLL_MS", default.majority_poll_ms),
            default_letter: std::env::var("DEFAULT_LETTER")
                .ok()
                .and_then(|v| v.trim().chars().next())
                .map(|c| c.to_ascii_uppercase())
                .filter(|c| ('A'..='E').contains(c))
                .unwrap_or(default.default_letter),
            follow_majority: env_parse("FOLLOW_MAJORITY", default.follow_majority),
            majority_default_index: env_parse(
                "MAJORITY_DEFAULT_INDEX",
                default.majority_default_index,
            ),
            bridge_compose_ms: env_parse("BRIDGE_COMPOSE_MS", default.bridge_compose_ms),
            bridge_submit_ms: env_parse("BRIDGE_SUBMIT_MS", default.bridge_submit_ms),
            bridge_poll_ms: env_parse("BRIDGE_POLL_MS", default.bridge_poll_ms),
            bridge_quiet_ms: env_parse("BRIDGE_QUIET_MS", default.bridge_quiet_ms),
            bridge_timeout_ms: env_parse("BRIDGE_TIMEOUT_MS", default.bridge_timeout_ms),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
        }
    }

    /// 答题 agent 使用的节奏参数
    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            question_settle: Duration::from_millis(self.question_settle_ms),
            answer_delay: Duration::from_millis(self.answer_delay_ms),
            select_delay: Duration::from_millis(self.select_delay_ms),
            click_delay: Duration::from_millis(self.click_delay_ms),
            submit_delay: Duration::from_millis(self.submit_delay_ms),
            ai_timeout: Duration::from_millis(self.ai_timeout_ms),
            url_watch: Duration::from_millis(self.url_watch_ms),
            boot_resume: Duration::from_millis(self.boot_resume_ms),
            observer_retry: Duration::from_millis(self.observer_retry_ms),
            majority_poll: Duration::from_millis(self.majority_poll_ms),
            default_letter: self.default_letter,
            follow_majority: self.follow_majority,
            majority_default_index: self.majority_default_index,
            locator: LocatorProfile::default(),
        }
    }

    /// AI 页面桥接使用的节奏参数
    pub fn bridge_settings(&self, service: AiService) -> BridgeSettings {
        BridgeSettings {
            service,
            compose_delay: Duration::from_millis(self.bridge_compose_ms),
            submit_delay: Duration::from_millis(self.bridge_submit_ms),
            poll_interval: Duration::from_millis(self.bridge_poll_ms),
            quiet_period: Duration::from_millis(self.bridge_quiet_ms),
            timeout: Duration::from_millis(self.bridge_timeout_ms),
        }
    }

    /// 是否配置了 api 目标
    pub fn has_llm_api(&self) -> bool {
        !self.llm_api_key.is_empty()
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
