//! 长轮询演示服务器
//!
//! 每个轮询请求挂起 `--delay-ms` 毫秒后返回一段 JSON；
//! 超过端点超时的请求以空事件列表完成；Ctrl+C 时以 503 终止所有挂起请求。
//!
//! ```text
//! cargo run --bin poll_demo -- --bind 127.0.0.1:9000 --delay-ms 2000
//! curl -i http://127.0.0.1:9000/events
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use rat_pollserve::server::http_server::HyperPollConnection;
use rat_pollserve::utils::logger::{debug, info};
use rat_pollserve::{
    PendingPollRegistry, PendingPollRequest, PollHttpServer, PollRequestHandler, PollResponseData,
    PollServiceConfig, PollServiceDescriptor, ServerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "poll_demo", about = "长轮询演示服务器")]
struct Args {
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:9000")]
    bind: SocketAddr,

    /// 轮询端点配置文件（TOML）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 每个请求挂起多久后返回数据
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,

    /// 关闭 HTTP keep-alive
    #[arg(long)]
    no_keep_alive: bool,
}

/// 演示调度器：延迟后完成，超时清扫，关闭时统一终止
struct DelayedResponder {
    descriptor: Arc<PollServiceDescriptor>,
    registry: Arc<PendingPollRegistry<HyperPollConnection>>,
    delay: Duration,
    sequence: AtomicU64,
}

impl DelayedResponder {
    fn new(config: PollServiceConfig, delay: Duration) -> Self {
        Self {
            descriptor: Arc::new(PollServiceDescriptor::new(config)),
            registry: Arc::new(PendingPollRegistry::new()),
            delay,
            sequence: AtomicU64::new(0),
        }
    }

    /// 周期性地以空事件列表完成超时请求
    async fn sweep_expired(registry: Arc<PendingPollRegistry<HyperPollConnection>>, timeout: Duration) {
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        loop {
            ticker.tick().await;
            for request in registry.take_expired(timeout) {
                let data = PollResponseData::text(json!({ "events": [] }).to_string())
                    .with_content_type("application/json");
                request.complete(&data).await;
            }
        }
    }
}

impl PollRequestHandler for DelayedResponder {
    fn descriptor(&self) -> Arc<PollServiceDescriptor> {
        self.descriptor.clone()
    }

    fn on_request(&self, request: PendingPollRequest<HyperPollConnection>) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let path = request.request().uri().path().to_string();
        let fingerprint = request.fingerprint();
        let request_id = self.registry.insert(request);
        debug!("📥 [演示] 挂起请求 #{} {} 指纹 {}", seq, path, fingerprint);

        let registry = self.registry.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // 超时清扫或关闭流程可能已经取走
            let Some(request) = registry.take(&request_id) else {
                return;
            };
            let data = PollResponseData::text(
                json!({
                    "seq": seq,
                    "path": path,
                    "fingerprint": fingerprint.to_string(),
                    "waited_ms": request.elapsed().as_millis() as u64,
                })
                .to_string(),
            )
            .with_content_type("application/json")
            .with_allow_origin("*");
            request.complete(&data).await;
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let poll_config = match &args.config {
        Some(path) => PollServiceConfig::from_file(path)
            .with_context(|| format!("加载轮询端点配置失败: {}", path.display()))?,
        None => PollServiceConfig::new().name("demo-events"),
    };
    let timeout = poll_config.timeout();
    let server_config = ServerConfig::new(args.bind).keep_alive(!args.no_keep_alive);

    let responder = Arc::new(DelayedResponder::new(poll_config, Duration::from_millis(args.delay_ms)));
    let registry = responder.registry.clone();
    let descriptor = responder.descriptor.clone();

    let server = PollHttpServer::bind(server_config, responder)
        .await
        .with_context(|| format!("绑定监听地址失败: {}", args.bind))?;
    let local_addr = server.local_addr()?;
    let shutdown = server.shutdown_handle();

    println!("🚀 长轮询演示服务器: http://{}", local_addr);
    println!("   端点: {} ({:?})", descriptor.name(), descriptor.service_type());
    println!("   延迟: {} ms, 超时: {} ms", args.delay_ms, timeout.as_millis());
    println!("   按 Ctrl+C 停止");

    let sweeper = tokio::spawn(DelayedResponder::sweep_expired(registry.clone(), timeout));
    let server_task = tokio::spawn(server.run());

    tokio::signal::ctrl_c().await.context("等待 Ctrl+C 信号失败")?;
    info!("🛑 [演示] 收到停止信号");

    shutdown.shutdown();
    sweeper.abort();
    let stopped = registry.stop_all().await;
    server_task.await.context("服务器任务异常退出")??;

    println!(
        "👋 已停止：强制终止 {} 个挂起请求，共处理 {} 个请求",
        stopped,
        descriptor.requests_handled()
    );
    Ok(())
}
