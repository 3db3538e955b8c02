//! 答题页面上下文的副作用
//!
//! 流程层只产生副作用描述，由编排层的驱动任务执行

use crate::models::message::Message;
use crate::models::snapshot::ElementRef;
use crate::services::notify_client::NotifyKind;
use crate::services::reporting_client::SessionCredentials;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// 在根容器上安装页面内观察器
    AttachObserver,
    /// 断开页面内观察器
    DisconnectObserver,
    /// 对元素派发指针事件序列
    Click(ElementRef),
    /// 写入数值答案
    FillNumeric { element: ElementRef, value: String },
    /// 发往路由器的消息
    Send(Message),
    /// 发送通知（不等待结果），`then_reload` 表示发送后刷新页面
    Notify {
        kind: NotifyKind,
        email: String,
        img: Option<String>,
        then_reload: bool,
    },
    /// 从页面读取会话凭据，结果以 `Input::SessionCaptured` 返回
    CaptureSession,
    /// 查询活动编号，结果以 `Input::ActivityResolved` 返回
    ResolveActivity(SessionCredentials),
    /// 查询多数人答案，结果以 `Input::MajorityReport` 返回
    FetchMajority {
        creds: SessionCredentials,
        activity_id: String,
    },
}
