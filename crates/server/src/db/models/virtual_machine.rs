/// 虚拟机目录数据模型

use common::models::VmState;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 虚拟机目录行
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "virtual_machines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    /// 平台清单路径，全局唯一
    pub inventory_path: String,
    /// 克隆完成后平台分配的对象引用
    pub vm_ref: Option<String>,
    /// 放置位置 (JSON)，选定后不再变化
    pub placement: JsonValue,
    pub network_ip: String,
    pub state: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub type Vm = Model;

impl Model {
    pub fn vm_state(&self) -> VmState {
        VmState::from(self.state.clone())
    }
}
