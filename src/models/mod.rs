pub mod ai_service;
pub mod message;
pub mod page_event;
pub mod question;
pub mod session;
pub mod snapshot;

pub use ai_service::AiService;
pub use message::{AiQuestion, ControlCommand, Message};
pub use page_event::{NodeRef, NodeSummary, PageEvent, PageEventKind};
pub use question::{Fingerprint, QuestionKind, QuestionSnapshot};
pub use session::SessionConfig;
pub use snapshot::{BridgeSnapshot, DomSnapshot, ElementInfo, ElementRef, OptionLabel};
