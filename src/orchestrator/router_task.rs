//! 路由任务
//!
//! 持有所有页面上下文的收件箱，把驱动任务发来的消息交给 `Router` 决定去向

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::message::{ControlCommand, Message};
use crate::workflow::router::{ContextId, ContextInfo, Router, RouterOutput};

/// 发往路由任务的命令
#[derive(Debug)]
pub enum RouterCommand {
    /// 新的页面上下文上线
    Register {
        id: ContextId,
        url: String,
        inbox: mpsc::UnboundedSender<Message>,
    },
    UpdateUrl { id: ContextId, url: String },
    Unregister { id: ContextId },
    /// 上下文发出的消息
    Deliver { from: ContextId, message: Message },
    /// 控制命令，发给所有答题页面
    Control(ControlCommand),
}

pub type RouterHandle = mpsc::UnboundedSender<RouterCommand>;

struct Registered {
    url: String,
    inbox: mpsc::UnboundedSender<Message>,
}

/// 运行路由任务，所有发送端关闭后结束；`settings` 收到打开设置页面的请求
pub async fn run_router(
    mut router: Router,
    mut commands: mpsc::UnboundedReceiver<RouterCommand>,
    settings: mpsc::UnboundedSender<()>,
) {
    let mut contexts: HashMap<ContextId, Registered> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            RouterCommand::Register { id, url, inbox } => {
                debug!("上下文上线: {} ({})", id, url);
                contexts.insert(id, Registered { url, inbox });
            }
            RouterCommand::UpdateUrl { id, url } => {
                if let Some(ctx) = contexts.get_mut(&id) {
                    ctx.url = url;
                }
            }
            RouterCommand::Unregister { id } => {
                debug!("上下文下线: {}", id);
                contexts.remove(&id);
                let outputs = router.forget(&id);
                deliver(&contexts, outputs, &settings);
            }
            RouterCommand::Control(command) => {
                let mut delivered = 0;
                for ctx in contexts.values().filter(|c| router.is_consumer(&c.url)) {
                    let message = Message::Control {
                        command: command.clone(),
                    };
                    if ctx.inbox.send(message).is_ok() {
                        delivered += 1;
                    }
                }
                info!("🎛 控制命令 {:?} → {} 个答题页面", command, delivered);
                if delivered == 0 {
                    router.persist_control(&command);
                }
            }
            RouterCommand::Deliver { from, message } => {
                let open: Vec<ContextInfo> = contexts
                    .iter()
                    .map(|(id, ctx)| ContextInfo::new(id.clone(), ctx.url.clone()))
                    .collect();
                let outputs = router.route(&from, message, &open);
                deliver(&contexts, outputs, &settings);
            }
        }
    }
    debug!("路由任务结束");
}

fn deliver(
    contexts: &HashMap<ContextId, Registered>,
    outputs: Vec<RouterOutput>,
    settings: &mpsc::UnboundedSender<()>,
) {
    for output in outputs {
        match output {
            RouterOutput::Deliver { to, message } => {
                let sent = contexts
                    .get(&to)
                    .map(|ctx| ctx.inbox.send(message).is_ok())
                    .unwrap_or(false);
                if !sent {
                    warn!("⚠️ 上下文 {} 已关闭，消息丢弃", to);
                }
            }
            RouterOutput::OpenSettings => {
                let _ = settings.send(());
            }
        }
    }
}
