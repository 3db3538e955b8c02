use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 页面脚本执行失败（页面仍然存活）
    #[error("脚本执行失败: {0}")]
    Script(String),
    /// 与页面 / 浏览器的连接已失效，需要重新加载
    #[error("页面上下文已失效: {0}")]
    ContextInvalidated(String),
    /// 通知、报表等外部调用失败
    #[error("网络错误: {0}")]
    Network(#[from] NetworkError),
    /// AI 回复或页面数据无法解析
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),
    /// 配置存储读写失败
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 没有打开匹配 AI 服务的页面
    #[error("没有找到 AI 页面: {service}")]
    DestinationMissing { service: String },
    /// 没有找到可交互的选项元素
    #[error("未找到可点击的选项")]
    LocatorMiss,
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {message}")]
    ConnectionFailed { port: u16, message: String },
    /// 创建页面失败
    #[error("创建页面失败: {0}")]
    PageCreationFailed(String),
    /// 注册页面绑定失败
    #[error("注册页面绑定 {name} 失败: {message}")]
    BindingFailed { name: String, message: String },
}

/// 外部调用错误
#[derive(Debug, Error)]
pub enum NetworkError {
    /// 请求发送失败
    #[error("请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// 返回了非成功状态码
    #[error("响应状态异常 ({endpoint}): {status}")]
    BadStatus { endpoint: String, status: u16 },
    /// 响应结构不符合预期
    #[error("响应内容不符合预期 ({endpoint})")]
    UnexpectedBody { endpoint: String },
    /// LLM 接口调用失败
    #[error("LLM 调用失败 (模型: {model}): {message}")]
    Llm { model: String, message: String },
}

/// 解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    /// AI 回复不是合法的 JSON，或缺少 answer 字段
    #[error("无法解析 AI 回复: {raw}")]
    MalformedReply { raw: String },
    /// 页面快照数据结构不符合预期
    #[error("页面快照格式错误: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 读写存储文件失败
    #[error("读写存储文件失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 存储文件格式错误
    #[error("存储文件解析失败 ({path}): {message}")]
    Format { path: String, message: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 未知的 AI 服务标识
    #[error("未知的 AI 服务: {0}")]
    UnknownService(String),
    /// URL 模式无法编译
    #[error("无效的 URL 模式 {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

// ========== 从常见错误类型转换 ==========

/// CDP 报告目标或会话已不存在时的错误信息片段
const CONTEXT_GONE: [&str; 4] = [
    "No target with given id",
    "Session with given id not found",
    "Target closed",
    "Cannot find context with specified id",
];

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        use chromiumoxide::error::CdpError;
        match err {
            CdpError::Ws(_) | CdpError::NoResponse | CdpError::ChannelSendError(_) => {
                AppError::ContextInvalidated(err.to_string())
            }
            other => {
                let message = other.to_string();
                if CONTEXT_GONE.iter().any(|m| message.contains(m)) {
                    AppError::ContextInvalidated(message)
                } else {
                    AppError::Script(message)
                }
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(ParseError::Snapshot(err))
    }
}

impl AppError {
    /// 是否意味着页面上下文已经丢失（触发 kill switch）
    pub fn is_context_invalidated(&self) -> bool {
        matches!(self, AppError::ContextInvalidated(_))
    }

    /// 创建网络请求失败错误
    pub fn request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Network(NetworkError::RequestFailed {
            endpoint: endpoint.into(),
            source,
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
