//! 控制台命令
//!
//! 设置面板的替代：从标准输入逐行读取开关命令，交给路由任务

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::models::message::{ControlCommand, Message};
use crate::orchestrator::router_task::{RouterCommand, RouterHandle};

const HELP: &str =
    "可用命令: start | stop | random | autojoin | notify [email] | ai | model <chatgpt|gemini|deepseek|api> | settings";

/// 解析一行输入
pub fn parse_line(line: &str) -> Option<RouterCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?.to_lowercase();
    let arg = parts.next().map(str::to_string);
    let command = match verb.as_str() {
        "start" => ControlCommand::Start,
        "stop" => ControlCommand::Stop,
        "random" => ControlCommand::Random,
        "autojoin" => ControlCommand::AutoJoin,
        "notify" => ControlCommand::Notify { email: arg },
        "ai" => ControlCommand::UseAi,
        "model" => ControlCommand::SelectModel { model: arg? },
        "settings" => {
            return Some(RouterCommand::Deliver {
                from: "console".to_string(),
                message: Message::OpenSettings,
            })
        }
        _ => return None,
    };
    Some(RouterCommand::Control(command))
}

/// 读取标准输入直到 EOF
pub async fn run_console(router: RouterHandle) {
    info!("⌨ {}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("⚠️ 读取控制台输入失败: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some(command) => {
                if router.send(command).is_err() {
                    break;
                }
            }
            None => warn!("⚠️ 无法识别的命令: {}。{}", line.trim(), HELP),
        }
    }
    debug!("控制台输入结束");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(line: &str) -> Option<ControlCommand> {
        match parse_line(line)? {
            RouterCommand::Control(command) => Some(command),
            _ => None,
        }
    }

    #[test]
    fn toggles_parse_case_insensitively() {
        assert_eq!(control("START"), Some(ControlCommand::Start));
        assert_eq!(control("ai"), Some(ControlCommand::UseAi));
        assert_eq!(control("autojoin"), Some(ControlCommand::AutoJoin));
    }

    #[test]
    fn arguments_are_carried() {
        assert_eq!(
            control("notify me@school.edu"),
            Some(ControlCommand::Notify {
                email: Some("me@school.edu".into())
            })
        );
        assert_eq!(
            control("model gemini"),
            Some(ControlCommand::SelectModel {
                model: "gemini".into()
            })
        );
        assert_eq!(control("model"), None);
    }

    #[test]
    fn settings_opens_panel_and_junk_is_rejected() {
        assert!(matches!(
            parse_line("settings"),
            Some(RouterCommand::Deliver {
                message: Message::OpenSettings,
                ..
            })
        ));
        assert!(parse_line("dance").is_none());
    }
}
