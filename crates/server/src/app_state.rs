/// 应用全局状态

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use vsphere::VsphereClient;

use crate::auth::TokenDenyList;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::services::orchestrator::DeployGuard;

/// 应用状态
///
/// 启动时初始化一次，之后只读共享；可变部分（吊销表、部署互斥表）
/// 自带内部同步。
#[derive(Clone)]
pub struct AppState {
    /// SeaORM 数据库连接 - 虚拟机目录与客户数据
    pub sea_db: DatabaseConnection,
    /// 进程级虚拟化平台客户端
    pub vsphere: Arc<VsphereClient>,
    pub config: Arc<Config>,
    /// (客户, 虚拟机名) 维度的部署互斥
    pub deploy_guard: DeployGuard,
    /// 已登出令牌吊销表
    pub deny_list: TokenDenyList,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        sea_db: DatabaseConnection,
        vsphere: Arc<VsphereClient>,
        config: Config,
        metrics: Metrics,
    ) -> Self {
        Self {
            sea_db,
            vsphere,
            config: Arc::new(config),
            deploy_guard: DeployGuard::new(),
            deny_list: TokenDenyList::new(),
            metrics: Arc::new(metrics),
        }
    }

    /// 获取虚拟化平台客户端
    pub fn vsphere(&self) -> Arc<VsphereClient> {
        self.vsphere.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
