//! 轮询响应数据
//!
//! 调度器的业务回调产出 [`PollResponseData`]，完成流程调用 [`PollResponseData::apply`]
//! 把状态码、Content-Type 和附加头写到响应上，并得到最终的响应体字节。

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use hyper::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{PollError, PollResult};
use crate::server::config::PollServiceConfig;
use crate::utils::logger::warn;

use super::transport::PollHttpResponse;

/// 以文本形式传递时需要 base64 解码的二进制内容类型
const BINARY_CONTENT_MARKERS: &[&str] = &[
    "image",
    "x-shockwave-flash",
    "application/x-oar",
    "application/vnd.ll.mesh",
];

fn default_status() -> u16 {
    200
}

/// 调度器计算出的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponseData {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub content_type: Option<String>,
    /// 文本响应；二进制内容类型下按 base64 解码
    #[serde(default)]
    pub text: Option<String>,
    /// 原始二进制响应，优先于 `text`
    #[serde(skip)]
    pub binary: Option<Bytes>,
    #[serde(default)]
    pub keep_alive: Option<bool>,
    #[serde(default)]
    pub allow_origin: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for PollResponseData {
    fn default() -> Self {
        Self {
            status: default_status(),
            content_type: None,
            text: None,
            binary: None,
            keep_alive: None,
            allow_origin: None,
            headers: BTreeMap::new(),
        }
    }
}

impl PollResponseData {
    /// 200 + 二进制响应体
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            binary: Some(body.into()),
            ..Self::default()
        }
    }

    /// 200 + 文本响应体
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            status: 200,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// 空响应体
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status: status.as_u16(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status.as_u16();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn with_allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow_origin = Some(origin.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// 从 JSON 构造，业务回调常以松散的键值表给出结果
    pub fn from_json(value: serde_json::Value) -> PollResult<Self> {
        serde_json::from_value(value).map_err(|e| PollError::Config(format!("无效的轮询响应数据: {}", e)))
    }

    /// 状态码，非法值按 500 处理
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn is_binary_type(content_type: &str) -> bool {
        BINARY_CONTENT_MARKERS.iter().any(|m| content_type.contains(m))
    }

    /// 计算响应体字节
    ///
    /// 二进制内容类型的文本若不是合法 base64，退回原始 UTF-8 字节。
    pub fn body_bytes(&self, content_type: &str) -> Bytes {
        if let Some(binary) = &self.binary {
            return binary.clone();
        }
        let Some(text) = &self.text else {
            return Bytes::new();
        };
        if Self::is_binary_type(content_type) {
            match STANDARD.decode(text.trim()) {
                Ok(decoded) => return Bytes::from(decoded),
                Err(e) => warn!("⚠️ [轮询服务] {} 响应体 base64 解码失败，按文本发送: {}", content_type, e),
            }
        }
        Bytes::from(text.clone().into_bytes())
    }

    /// 写入状态码与头部，返回响应体
    pub fn apply<R: PollHttpResponse + ?Sized>(&self, response: &mut R, config: &PollServiceConfig) -> Bytes {
        let content_type = self
            .content_type
            .as_deref()
            .unwrap_or(config.default_content_type.as_str());

        response.set_status(self.status_code());
        response.set_content_type(content_type);
        if let Some(keep_alive) = self.keep_alive {
            response.set_keep_alive(keep_alive);
        }
        if let Some(origin) = &self.allow_origin {
            response.set_header("Access-Control-Allow-Origin", origin);
        }
        for (name, value) in &self.headers {
            response.set_header(name, value);
        }

        self.body_bytes(content_type)
    }
}
