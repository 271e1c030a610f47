//! User-facing error text, localized by the configured language.

use serde::{Deserialize, Serialize};

/// Language of the messages carried by `ErrorOccurred`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "zh-CN")]
    ZhCn,
}

/// Every fixed message the recorder can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    InvalidParameter,
    StartFailed,
    WindowCaptureCreateFailed,
    WindowNotFound,
    InitStartup,
    InitResetAudio,
    InitResetVideo,
    InitService,
    InitOutputs,
    InitScene,
    StreamBadPath,
    StreamConnectFailed,
    StreamInvalidStream,
    StreamError,
    StreamDisconnected,
    RecordingNoSpace,
    RecordingUnsupported,
}

impl Language {
    /// Locale tag passed to the engine at startup.
    pub fn locale(self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::ZhCn => "zh-CN",
        }
    }

    pub fn text(self, message: Message) -> &'static str {
        match self {
            Self::EnUs => english(message),
            Self::ZhCn => chinese(message),
        }
    }

    /// Fallback for stop codes without a dedicated message.
    pub fn unspecified_error(self, code: i32) -> String {
        match self {
            Self::EnUs => format!("unspecified error (code: {code})"),
            Self::ZhCn => format!("发生未指定的错误（代码：{code}）"),
        }
    }
}

fn english(message: Message) -> &'static str {
    match message {
        Message::InvalidParameter => "invalid parameter",
        Message::StartFailed => "start failed",
        Message::WindowCaptureCreateFailed => "failed to create window capture",
        Message::WindowNotFound => "application window not found",
        Message::InitStartup => "engine startup failed",
        Message::InitResetAudio => "audio reset failed",
        Message::InitResetVideo => "video reset failed",
        Message::InitService => "failed to initialize service",
        Message::InitOutputs => "failed to initialize outputs",
        Message::InitScene => "failed to initialize scene",
        Message::StreamBadPath => "invalid address",
        Message::StreamConnectFailed => "cannot connect to server",
        Message::StreamInvalidStream => "cannot access stream key or connect to server",
        Message::StreamError => "unexpected error connecting to server",
        Message::StreamDisconnected => "disconnected from server",
        Message::RecordingNoSpace => "insufficient disk space",
        Message::RecordingUnsupported => "format unsupported",
    }
}

fn chinese(message: Message) -> &'static str {
    match message {
        Message::InvalidParameter => "参数错误",
        Message::StartFailed => "启动失败",
        Message::WindowCaptureCreateFailed => "创建窗口捕获失败",
        Message::WindowNotFound => "未找到应用窗口",
        Message::InitStartup => "引擎启动失败",
        Message::InitResetAudio => "重置音频失败",
        Message::InitResetVideo => "重置视频失败",
        Message::InitService => "初始化服务失败",
        Message::InitOutputs => "初始化输出失败",
        Message::InitScene => "初始化场景失败",
        Message::StreamBadPath => "无效的地址",
        Message::StreamConnectFailed => "无法连接到服务器",
        Message::StreamInvalidStream => "无法访问串流密钥或连接服务器",
        Message::StreamError => "连接服务器时发生意外错误",
        Message::StreamDisconnected => "与服务器断开连接",
        Message::RecordingNoSpace => "磁盘空间不足",
        Message::RecordingUnsupported => "格式不受支持",
    }
}
