//! 单元测试用的内存传输层

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hyper::StatusCode;

use crate::error::{PollError, PollResult};

use super::transport::{ContentEncoding, PollConnection, PollHttpRequest, PollHttpResponse};

/// 响应上记录到的全部操作
#[derive(Debug, Default, Clone)]
pub struct ResponseLog {
    pub status: Option<StatusCode>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub encoding: Option<ContentEncoding>,
    pub chunked: Option<bool>,
    pub keep_alive: Option<bool>,
    pub reuse: Option<bool>,
    pub headers: Vec<(String, String)>,
    pub written: Vec<u8>,
    pub writes: usize,
    pub flushes: usize,
    pub sends: usize,
    pub responses_created: usize,
}

/// 注入的故障
#[derive(Debug, Default, Clone, Copy)]
pub struct FailurePlan {
    pub write: bool,
    pub flush: bool,
    pub send: bool,
}

#[derive(Debug, Default)]
pub struct MockConnection {
    log: Arc<Mutex<ResponseLog>>,
    failures: FailurePlan,
}

impl MockConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(failures: FailurePlan) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::default(),
            failures,
        })
    }

    pub fn log(&self) -> ResponseLog {
        self.log.lock().unwrap().clone()
    }
}

impl PollConnection for MockConnection {
    type Request = MockRequest;
    type Response = MockResponse;

    fn create_response(&self, _request: &mut MockRequest) -> MockResponse {
        self.log.lock().unwrap().responses_created += 1;
        MockResponse {
            log: self.log.clone(),
            failures: self.failures,
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// 请求体状态，完成后仍可观察
#[derive(Debug)]
pub struct BodyState {
    open: AtomicBool,
    closes: AtomicUsize,
}

impl BodyState {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MockRequest {
    headers: HashMap<String, String>,
    body: Arc<BodyState>,
}

impl MockRequest {
    pub fn new() -> Self {
        Self {
            headers: HashMap::new(),
            body: Arc::new(BodyState {
                open: AtomicBool::new(true),
                closes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn from_peer(addr: &str, port: &str) -> Self {
        Self::new().with_header("remote_addr", addr).with_header("remote_port", port)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_closed_body(self) -> Self {
        self.body.open.store(false, Ordering::SeqCst);
        self
    }

    pub fn body_state(&self) -> Arc<BodyState> {
        self.body.clone()
    }
}

impl PollHttpRequest for MockRequest {
    fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        self.headers.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }

    fn body_can_read(&self) -> bool {
        self.body.is_open()
    }

    fn close_body(&mut self) {
        self.body.open.store(false, Ordering::SeqCst);
        self.body.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockResponse {
    log: Arc<Mutex<ResponseLog>>,
    failures: FailurePlan,
}

fn broken_pipe() -> PollError {
    PollError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client went away"))
}

#[async_trait]
impl PollHttpResponse for MockResponse {
    fn set_status(&mut self, status: StatusCode) {
        self.log.lock().unwrap().status = Some(status);
    }

    fn set_content_type(&mut self, content_type: &str) {
        self.log.lock().unwrap().content_type = Some(content_type.to_string());
    }

    fn set_content_length(&mut self, length: u64) {
        self.log.lock().unwrap().content_length = Some(length);
    }

    fn set_content_encoding(&mut self, encoding: ContentEncoding) {
        self.log.lock().unwrap().encoding = Some(encoding);
    }

    fn set_send_chunked(&mut self, chunked: bool) {
        self.log.lock().unwrap().chunked = Some(chunked);
    }

    fn set_keep_alive(&mut self, keep_alive: bool) {
        self.log.lock().unwrap().keep_alive = Some(keep_alive);
    }

    fn set_reuse_context(&mut self, reuse: bool) {
        self.log.lock().unwrap().reuse = Some(reuse);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.log.lock().unwrap().headers.push((name.to_string(), value.to_string()));
    }

    async fn write(&mut self, buf: &[u8]) -> PollResult<()> {
        let mut log = self.log.lock().unwrap();
        log.writes += 1;
        if self.failures.write {
            return Err(broken_pipe());
        }
        log.written.extend_from_slice(buf);
        Ok(())
    }

    async fn flush(&mut self) -> PollResult<()> {
        let mut log = self.log.lock().unwrap();
        log.flushes += 1;
        if self.failures.flush {
            return Err(broken_pipe());
        }
        Ok(())
    }

    async fn send(&mut self) -> PollResult<()> {
        let mut log = self.log.lock().unwrap();
        log.sends += 1;
        if self.failures.send {
            return Err(PollError::ConnectionClosed("mock".to_string()));
        }
        Ok(())
    }
}
