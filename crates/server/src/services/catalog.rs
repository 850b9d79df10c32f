/// 虚拟机目录 (C9)
///
/// 编排器与生命周期管理的所有写操作都走请求作用域的事务；
/// 唯一性冲突（IP、清单路径）映射为 `Conflict`。审计写入在
/// 被回滚的事务之外执行，保证失败记录一定落盘。

use chrono::{Duration, Utc};
use common::models::{Placement, RouteBinding, SshInfo, VmState};
use common::{Error, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use tracing::{error, info};

use crate::app_state::AppState;
use crate::db::models::deployment_audit;
use crate::db::models::route_binding::{self, Entity as RouteBindingEntity};
use crate::db::models::ssh_info::{self, Entity as SshInfoEntity};
use crate::db::models::virtual_machine::{
    ActiveModel as VmActiveModel, Column as VmColumn, Entity as VmEntity, Vm,
};

/// 失败部署的审计内容
pub struct AuditRecord {
    pub vm_id: Option<String>,
    pub customer_id: String,
    pub vm_name: String,
    pub state_reached: String,
    pub error: String,
    pub compensation_error: Option<String>,
    pub cancelled: bool,
}

pub struct VmCatalog {
    state: AppState,
}

impl VmCatalog {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 打开请求作用域的事务
    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        self.state
            .sea_db
            .begin()
            .await
            .map_err(map_db_err)
    }

    /// 以 provisioning 状态插入目录行并占住 IP
    pub async fn insert_provisioning<C: ConnectionTrait>(
        &self,
        conn: &C,
        vm_id: &str,
        owner_id: &str,
        name: &str,
        inventory_path: &str,
        placement: &Placement,
        network_ip: &str,
    ) -> Result<Vm> {
        // 预检让常见冲突拿到明确的错误文案；并发竞争兜底靠唯一索引
        let ip_taken = VmEntity::find()
            .filter(VmColumn::NetworkIp.eq(network_ip))
            .filter(VmColumn::State.ne(VmState::Destroyed.as_str()))
            .one(conn)
            .await
            .map_err(map_db_err)?;
        if ip_taken.is_some() {
            return Err(Error::Conflict(format!("IP {} 已被其他虚拟机占用", network_ip)));
        }

        let path_taken = VmEntity::find()
            .filter(VmColumn::InventoryPath.eq(inventory_path))
            .one(conn)
            .await
            .map_err(map_db_err)?;
        if path_taken.is_some() {
            return Err(Error::Conflict(format!("虚拟机名 {} 已存在", name)));
        }

        let now = Utc::now();
        let row = VmActiveModel {
            id: Set(vm_id.to_string()),
            owner_id: Set(owner_id.to_string()),
            name: Set(name.to_string()),
            inventory_path: Set(inventory_path.to_string()),
            vm_ref: Set(None),
            placement: Set(serde_json::to_value(placement)?),
            network_ip: Set(network_ip.to_string()),
            state: Set(VmState::Provisioning.as_str().to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        row.insert(conn).await.map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict(format!("虚拟机 {} 与现有记录冲突", name))
            } else {
                map_db_err(e)
            }
        })
    }

    /// 部署成功收尾：状态置 running，写入 SSH 信息与路由绑定
    pub async fn mark_running<C: ConnectionTrait>(
        &self,
        conn: &C,
        vm_id: &str,
        vm_ref: &str,
        info: &SshInfo,
        binding: &RouteBinding,
    ) -> Result<()> {
        let now = Utc::now();

        let vm = VmEntity::find_by_id(vm_id.to_string())
            .one(conn)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| Error::NotFound(format!("虚拟机 {} 不存在", vm_id)))?;

        let mut vm_active: VmActiveModel = vm.into();
        vm_active.state = Set(VmState::Running.as_str().to_string());
        vm_active.vm_ref = Set(Some(vm_ref.to_string()));
        vm_active.updated_at = Set(now.into());
        vm_active.update(conn).await.map_err(map_db_err)?;

        let (mode, username, password_hash, fingerprint, public_cert, private_key_encrypted) =
            ssh_info::columns_from(info);
        ssh_info::ActiveModel {
            vm_id: Set(vm_id.to_string()),
            mode: Set(mode),
            username: Set(username),
            password_hash: Set(password_hash),
            fingerprint: Set(fingerprint),
            public_cert: Set(public_cert),
            private_key_encrypted: Set(private_key_encrypted),
            created_at: Set(now.into()),
        }
        .insert(conn)
        .await
        .map_err(map_db_err)?;

        route_binding::ActiveModel {
            vm_id: Set(vm_id.to_string()),
            service_name: Set(binding.service_name.clone()),
            route_url: Set(binding.route_url.clone()),
            upstream_host: Set(binding.upstream_host.clone()),
            headers: Set(serde_json::to_value(&binding.headers)?),
            created_at: Set(now.into()),
        }
        .insert(conn)
        .await
        .map_err(map_db_err)?;

        Ok(())
    }

    /// 更新虚拟机状态
    pub async fn set_state<C: ConnectionTrait>(
        &self,
        conn: &C,
        vm_id: &str,
        state: VmState,
    ) -> Result<()> {
        let vm = VmEntity::find_by_id(vm_id.to_string())
            .one(conn)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| Error::NotFound(format!("虚拟机 {} 不存在", vm_id)))?;

        let mut vm_active: VmActiveModel = vm.into();
        vm_active.state = Set(state.as_str().to_string());
        vm_active.updated_at = Set(Utc::now().into());
        vm_active.update(conn).await.map_err(map_db_err)?;
        Ok(())
    }

    /// 按属主取虚拟机；不存在或属主不符都按未找到处理，不向租户泄露存在性
    pub async fn get_owned(&self, vm_id: &str, customer_id: &str) -> Result<Vm> {
        let vm = VmEntity::find_by_id(vm_id.to_string())
            .one(&self.state.sea_db)
            .await
            .map_err(map_db_err)?;

        match vm {
            Some(vm) if vm.owner_id == customer_id => Ok(vm),
            _ => Err(Error::NotFound(format!("虚拟机 {} 不存在", vm_id))),
        }
    }

    pub async fn ssh_info(&self, vm_id: &str) -> Result<Option<ssh_info::Model>> {
        SshInfoEntity::find_by_id(vm_id.to_string())
            .one(&self.state.sea_db)
            .await
            .map_err(map_db_err)
    }

    pub async fn route_binding(&self, vm_id: &str) -> Result<Option<route_binding::Model>> {
        RouteBindingEntity::find_by_id(vm_id.to_string())
            .one(&self.state.sea_db)
            .await
            .map_err(map_db_err)
    }

    /// 客户名下未销毁的虚拟机数量
    pub async fn count_active_vms(&self, customer_id: &str) -> Result<u64> {
        use sea_orm::PaginatorTrait;
        VmEntity::find()
            .filter(VmColumn::OwnerId.eq(customer_id))
            .filter(VmColumn::State.ne(VmState::Destroyed.as_str()))
            .count(&self.state.sea_db)
            .await
            .map_err(map_db_err)
    }

    /// 写审计行；与部署事务无关，失败只记日志不改变部署结果
    pub async fn write_audit(&self, record: AuditRecord) {
        let now = Utc::now();
        let ttl_days = self.state.config().audit_ttl_days;
        let expires_at = if ttl_days > 0 {
            Some((now + Duration::days(ttl_days as i64)).into())
        } else {
            None
        };

        let row = deployment_audit::ActiveModel {
            id: Set(common::utils::generate_id()),
            vm_id: Set(record.vm_id),
            customer_id: Set(record.customer_id),
            vm_name: Set(record.vm_name),
            state_reached: Set(record.state_reached),
            error: Set(record.error),
            compensation_error: Set(record.compensation_error),
            cancelled: Set(record.cancelled),
            created_at: Set(now.into()),
            expires_at: Set(expires_at),
        };

        match row.insert(&self.state.sea_db).await {
            Ok(_) => info!("部署审计记录已写入"),
            Err(e) => error!("写入部署审计记录失败: {}", e),
        }
    }
}

fn map_db_err(e: DbErr) -> Error {
    Error::Internal(format!("数据库错误: {}", e))
}

/// 唯一索引冲突的粗粒度识别，覆盖 Postgres 的报错文案
fn is_unique_violation(e: &DbErr) -> bool {
    let text = e.to_string();
    text.contains("duplicate key") || text.contains("unique constraint")
}
