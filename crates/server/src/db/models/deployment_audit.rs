/// 部署审计数据模型
///
/// 失败或被取消的部署各留一条不可变记录，供事后排查；
/// 记录原始错误与补偿错误两份信息。

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deployment_audit")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub vm_id: Option<String>,
    pub customer_id: String,
    pub vm_name: String,
    /// 失败发生时流水线已到达的阶段
    pub state_reached: String,
    pub error: String,
    pub compensation_error: Option<String>,
    pub cancelled: bool,
    pub created_at: DateTimeWithTimeZone,
    /// 保留期限，空表示永久保留
    pub expires_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
