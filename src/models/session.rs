//! 会话配置
//!
//! 启动时从存储加载一次，只通过显式的开关命令修改，每次修改立即写回存储

use serde_json::{json, Value};
use tracing::warn;

use crate::infrastructure::store::ConfigStore;
use crate::models::ai_service::AiService;

/// 存储键
pub mod keys {
    pub const STATUS: &str = "status";
    pub const RANDOM: &str = "random";
    pub const AUTO_JOIN: &str = "autoJoin";
    pub const NOTIFY: &str = "notify";
    pub const EMAIL: &str = "email";
    pub const USE_AI: &str = "useAI";
    pub const AI_MODEL: &str = "aiModel";
    pub const PREV_PAGE: &str = "prevPage";
}

/// 上一次所在页面：题目页
pub const PREV_PAGE_POLL: &str = "poll";
/// 上一次所在页面：课程页
pub const PREV_PAGE_COURSES: &str = "courses";

/// 会话配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub running: bool,
    pub random: bool,
    pub auto_join: bool,
    pub notify: bool,
    pub email: Option<String>,
    pub use_ai: bool,
    pub selected_model: AiService,
    pub prev_page: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            running: false,
            random: false,
            auto_join: false,
            notify: false,
            email: None,
            use_ai: false,
            selected_model: AiService::ChatGpt,
            prev_page: None,
        }
    }
}

impl SessionConfig {
    /// 从存储加载
    pub fn load(store: &dyn ConfigStore) -> Self {
        let flag = |key: &str| store.get(key).and_then(|v| v.as_bool()).unwrap_or(false);
        let text = |key: &str| {
            store
                .get(key)
                .and_then(|v| v.as_str().map(str::to_string))
                .filter(|s| !s.is_empty())
        };
        Self {
            running: text(keys::STATUS).as_deref() == Some("started"),
            random: flag(keys::RANDOM),
            auto_join: flag(keys::AUTO_JOIN),
            notify: flag(keys::NOTIFY),
            email: text(keys::EMAIL),
            use_ai: flag(keys::USE_AI),
            selected_model: AiService::from_stored(text(keys::AI_MODEL).as_deref()),
            prev_page: text(keys::PREV_PAGE),
        }
    }

    pub fn set_running(&mut self, store: &dyn ConfigStore, running: bool) {
        self.running = running;
        let status = if running { "started" } else { "stopped" };
        persist(store, keys::STATUS, json!(status));
    }

    /// 下课后清除运行状态（下次加载页面时不会自动恢复）
    pub fn clear_status(&mut self, store: &dyn ConfigStore) {
        self.running = false;
        if let Err(e) = store.remove(keys::STATUS) {
            warn!("⚠️ 清除运行状态失败: {}", e);
        }
    }

    pub fn toggle_random(&mut self, store: &dyn ConfigStore) -> bool {
        self.random = !self.random;
        persist(store, keys::RANDOM, json!(self.random));
        self.random
    }

    pub fn toggle_auto_join(&mut self, store: &dyn ConfigStore) -> bool {
        self.auto_join = !self.auto_join;
        persist(store, keys::AUTO_JOIN, json!(self.auto_join));
        self.auto_join
    }

    pub fn toggle_notify(&mut self, store: &dyn ConfigStore, email: Option<String>) -> bool {
        self.notify = !self.notify;
        if email.is_some() {
            self.email = email;
        }
        persist(store, keys::EMAIL, json!(self.email.clone().unwrap_or_default()));
        persist(store, keys::NOTIFY, json!(self.notify));
        self.notify
    }

    pub fn toggle_use_ai(&mut self, store: &dyn ConfigStore) -> bool {
        self.use_ai = !self.use_ai;
        persist(store, keys::USE_AI, json!(self.use_ai));
        self.use_ai
    }

    pub fn select_model(&mut self, store: &dyn ConfigStore, service: AiService) {
        self.selected_model = service;
        persist(store, keys::AI_MODEL, json!(service.id()));
    }

    pub fn set_prev_page(&mut self, store: &dyn ConfigStore, page: &str) {
        if self.prev_page.as_deref() == Some(page) {
            return;
        }
        self.prev_page = Some(page.to_string());
        persist(store, keys::PREV_PAGE, json!(page));
    }
}

fn persist(store: &dyn ConfigStore, key: &str, value: Value) {
    if let Err(e) = store.set(key, value) {
        warn!("⚠️ 写入配置 {} 失败: {}", key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::MemoryStore;

    #[test]
    fn load_reads_every_persisted_key() {
        let store = MemoryStore::new();
        store.set(keys::STATUS, json!("started")).unwrap();
        store.set(keys::RANDOM, json!(true)).unwrap();
        store.set(keys::USE_AI, json!(true)).unwrap();
        store.set(keys::AI_MODEL, json!("deepseek")).unwrap();
        store.set(keys::PREV_PAGE, json!("poll")).unwrap();

        let config = SessionConfig::load(&store);
        assert!(config.running);
        assert!(config.random);
        assert!(!config.auto_join);
        assert!(config.use_ai);
        assert_eq!(config.selected_model, AiService::DeepSeek);
        assert_eq!(config.prev_page.as_deref(), Some("poll"));
    }

    #[test]
    fn toggles_write_through() {
        let store = MemoryStore::new();
        let mut config = SessionConfig::load(&store);
        assert!(config.toggle_notify(&store, Some("me@school.edu".into())));
        config.set_running(&store, true);

        let reloaded = SessionConfig::load(&store);
        assert!(reloaded.notify);
        assert!(reloaded.running);
        assert_eq!(reloaded.email.as_deref(), Some("me@school.edu"));

        config.clear_status(&store);
        assert!(!SessionConfig::load(&store).running);
    }
}
