//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层持有浏览器和全部异步任务，把纯逻辑的 workflow 接到真实页面上。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 连接浏览器、打开会话存储
//! - 定期扫描标签页，为每个页面上下文启动驱动任务
//!
//! ### `page_driver` - 答题页面驱动
//! - 注册变更绑定，监听页面推送的变更批次
//! - 每次输入前读取快照，执行 `Agent` 返回的副作用
//! - 上下文失效时 kill switch
//!
//! ### `bridge_driver` - AI 页面驱动
//! - 运行 `BridgeSession`：填写、发送、等待、回复
//!
//! ### `router_task` / `api_destination` / `control`
//! - 路由任务持有所有上下文的收件箱
//! - api 目标直接调用 LLM 接口
//! - 控制台命令代替设置面板
//!
//! ## 层次关系
//!
//! ```text
//! app (扫描标签页)
//!     ↓
//! page_driver / bridge_driver (每个页面一个任务)
//!     ↓
//! workflow::Agent / workflow::BridgeSession (纯逻辑，返回副作用)
//!     ↓
//! services (定位 / 指纹 / 通知 / 报表 / LLM)
//!     ↓
//! infrastructure (JsExecutor / Scheduler / Clock / ConfigStore)
//! ```

pub mod api_destination;
pub mod app;
pub mod bridge_driver;
pub mod control;
pub mod page_driver;
pub mod router_task;

// 重新导出主要类型
pub use app::App;
pub use router_task::{RouterCommand, RouterHandle};
