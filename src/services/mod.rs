//! 业务能力层
//!
//! 描述"我能做什么"：定位选项、判重、解析回复、调用外部接口。
//! 不持有页面，不关心流程顺序。

pub mod answer_parser;
pub mod element_locator;
pub mod fingerprint_gate;
pub mod llm_service;
pub mod notify_client;
pub mod prompt;
pub mod reporting_client;
pub mod url_pattern;

pub use element_locator::{ElementLocator, LocateStrategy, LocatorProfile};
pub use fingerprint_gate::{FingerprintGate, GateDecision};
pub use llm_service::LlmService;
pub use notify_client::{NotifyClient, NotifyKind};
pub use reporting_client::{MajorityAnswer, ReportingClient, SessionCredentials};
pub use url_pattern::UrlPattern;
