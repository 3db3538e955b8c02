//! 基础设施层
//!
//! 持有稀缺资源（Page、时钟、存储），只暴露能力

pub mod clock;
pub mod js_executor;
pub mod scheduler;
pub mod scripts;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use js_executor::JsExecutor;
pub use scheduler::Scheduler;
pub use store::{ConfigStore, MemoryStore, TomlFileStore};
