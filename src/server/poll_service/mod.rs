//! 长轮询核心
//!
//! 指纹计算、挂起请求实体、关联器与完成协议。
//! 传输层通过 [`transport`] 中的 trait 注入。

pub mod completion;
pub mod correlator;
pub mod descriptor;
pub mod fingerprint;
pub mod payload;
pub mod request;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use completion::{CompletionReport, StopOutcome};
pub use correlator::{CorrelationKey, RequestCorrelator};
pub use descriptor::PollServiceDescriptor;
pub use fingerprint::{ConnectionFingerprint, RandomSource};
pub use payload::PollResponseData;
pub use request::PendingPollRequest;
pub use transport::{ContentEncoding, PollConnection, PollHttpRequest, PollHttpResponse};
