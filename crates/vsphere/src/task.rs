/// 平台任务轮询
///
/// 克隆等长操作返回任务 ID，这里在限期内轮询完成状态，超时主动取消。

use std::time::Duration;

use common::{Error, Result};
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::client::VsphereClient;

/// 任务状态
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
    Cancelled,
}

/// 任务信息
#[derive(Debug, Clone, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub state: TaskState,
    /// 任务产物（克隆任务返回新虚拟机的 moref）
    pub result: Option<String>,
    pub error_message: Option<String>,
}

impl VsphereClient {
    pub async fn get_task(&self, task_id: &str) -> Result<TaskInfo> {
        self.get_json(&format!("/vcenter/task/{}", task_id), "查询任务").await
    }

    /// 取消任务；任务已结束时平台返回成功，调用是幂等的
    pub async fn cancel_task(&self, task_id: &str) -> Result<()> {
        self.post_action(&format!("/vcenter/task/{}?action=cancel", task_id), "取消任务")
            .await
    }

    /// 在限期内轮询任务完成；超时返回 `Timeout`，由调用方决定是否取消任务
    pub async fn wait_for_task(
        &self,
        task_id: &str,
        deadline: Duration,
        poll_interval: Duration,
    ) -> Result<TaskInfo> {
        let started = Instant::now();
        loop {
            let info = self.get_task(task_id).await?;
            match info.state {
                TaskState::Success => return Ok(info),
                TaskState::Error => {
                    return Err(Error::HypervisorUnavailable(format!(
                        "任务 {} 失败: {}",
                        task_id,
                        info.error_message.unwrap_or_else(|| "未知原因".to_string())
                    )))
                }
                TaskState::Cancelled => {
                    return Err(Error::HypervisorUnavailable(format!("任务 {} 已被取消", task_id)))
                }
                TaskState::Queued | TaskState::Running => {
                    debug!("任务 {} 仍在执行", task_id);
                }
            }

            if started.elapsed() >= deadline {
                warn!("任务 {} 超过限期 {:?}", task_id, deadline);
                return Err(Error::Timeout(format!("任务 {} 超过限期", task_id)));
            }
            sleep(poll_interval).await;
        }
    }
}
