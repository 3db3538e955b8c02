//! # Quiz Autopilot
//!
//! 通过 Chrome DevTools 协议接管课堂答题页面，检测新题目并自动作答
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 和类型化的页面操作
//! - `Scheduler` / `Clock` - 命名定时器和可注入时钟
//! - `ConfigStore` - 会话开关的键值存储
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不持有页面
//! - `ElementLocator` - 按优先级尝试多种选项定位策略
//! - `FingerprintGate` - 每道题最多分发一次
//! - `LlmService` / `NotifyClient` / `ReportingClient` - 外部调用
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 纯逻辑状态机，输入事件 + 页面快照，输出副作用
//! - `Agent` - 一个答题页面的全部状态
//! - `BridgeSession` - 一个 AI 页面的问答流程
//! - `Router` - 消息去向
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 扫描标签页，为每个页面启动驱动任务
//! - `orchestrator/page_driver` / `bridge_driver` - 执行副作用
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::connect_to_browser_and_page;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use orchestrator::App;
pub use workflow::{Agent, BridgeSession, Router};
