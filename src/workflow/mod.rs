pub mod agent;
pub mod answer_dispatcher;
pub mod bridge_session;
pub mod change_observer;
pub mod credential_capture;
pub mod effect;
pub mod question_detector;
pub mod router;

pub use agent::{Agent, AgentSettings, Input, Timer};
pub use bridge_session::{BridgeEffect, BridgeSession, BridgeSettings};
pub use effect::Effect;
pub use router::{ContextId, ContextInfo, Router, RouterOutput};
