/// 客户数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 客户模型
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub username: String,
    pub email: String,
    /// 只保存自适应哈希摘要，绝不落盘明文
    pub password_hash: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub type Customer = Model;

/// 注册客户 DTO
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerDto {
    #[validate(length(min = 3, max = 32, message = "用户名长度必须在 3 到 32 之间"))]
    pub username: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(min = 8, message = "密码长度不能小于 8"))]
    pub password: String,
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginDto {
    pub username: String,
    pub password: String,
}

/// 客户响应 DTO
#[derive(Debug, Serialize)]
pub struct CustomerResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: String,
}

impl From<Customer> for CustomerResponse {
    fn from(c: Customer) -> Self {
        CustomerResponse {
            id: c.id,
            username: c.username,
            email: c.email,
            created_at: c.created_at.to_rfc3339(),
        }
    }
}
