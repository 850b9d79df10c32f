/// 部署指标

use prometheus::{IntCounter, Registry};

pub struct Metrics {
    pub registry: Registry,
    pub deployments_started: IntCounter,
    pub deployments_committed: IntCounter,
    pub deployments_failed: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let deployments_started =
            IntCounter::new("deployments_started_total", "已受理的部署请求数")?;
        let deployments_committed =
            IntCounter::new("deployments_committed_total", "成功提交的部署数")?;
        let deployments_failed =
            IntCounter::new("deployments_failed_total", "失败（已补偿）的部署数")?;

        registry.register(Box::new(deployments_started.clone()))?;
        registry.register(Box::new(deployments_committed.clone()))?;
        registry.register(Box::new(deployments_failed.clone()))?;

        Ok(Self {
            registry,
            deployments_started,
            deployments_committed,
            deployments_failed,
        })
    }

    /// 按 Prometheus 文本格式导出
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buf = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::warn!("导出指标失败: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}
