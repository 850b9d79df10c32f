/// 客户管理服务

use chrono::Utc;
use common::{Error, Result};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use tracing::info;
use validator::Validate;

use crate::app_state::AppState;
use crate::auth::{self, Claims};
use crate::db::models::customer::{
    ActiveModel as CustomerActiveModel, Column as CustomerColumn, CreateCustomerDto,
    CustomerResponse, Entity as CustomerEntity, LoginDto,
};
use crate::services::catalog::VmCatalog;

pub struct CustomerService {
    state: AppState,
}

impl CustomerService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 注册新客户；用户名与邮箱都必须唯一
    pub async fn register(&self, dto: CreateCustomerDto) -> Result<CustomerResponse> {
        dto.validate()
            .map_err(|e| Error::InvalidSpec(format!("注册信息无效: {}", e)))?;

        let db = &self.state.sea_db;

        let username_taken = CustomerEntity::find()
            .filter(CustomerColumn::Username.eq(&dto.username))
            .one(db)
            .await
            .map_err(map_db_err)?;
        if username_taken.is_some() {
            return Err(Error::Conflict(format!("用户名 {} 已被占用", dto.username)));
        }

        let email_taken = CustomerEntity::find()
            .filter(CustomerColumn::Email.eq(&dto.email))
            .one(db)
            .await
            .map_err(map_db_err)?;
        if email_taken.is_some() {
            return Err(Error::Conflict(format!("邮箱 {} 已被占用", dto.email)));
        }

        let password_hash = bcrypt::hash(&dto.password, bcrypt::DEFAULT_COST)
            .map_err(|e| Error::Internal(format!("口令哈希失败: {}", e)))?;

        let customer = CustomerActiveModel {
            id: Set(common::utils::generate_id()),
            username: Set(dto.username.clone()),
            email: Set(dto.email.clone()),
            password_hash: Set(password_hash),
            created_at: Set(Utc::now().into()),
        }
        .insert(db)
        .await
        .map_err(map_db_err)?;

        info!("客户 {} 注册成功", customer.username);
        Ok(customer.into())
    }

    /// 登录并签发令牌；用户名不存在与口令错误不做区分
    pub async fn login(&self, dto: LoginDto) -> Result<String> {
        let customer = CustomerEntity::find()
            .filter(CustomerColumn::Username.eq(&dto.username))
            .one(&self.state.sea_db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| Error::AuthRequired("用户名或口令错误".to_string()))?;

        let verified = bcrypt::verify(&dto.password, &customer.password_hash)
            .map_err(|e| Error::Internal(format!("口令校验失败: {}", e)))?;
        if !verified {
            return Err(Error::AuthRequired("用户名或口令错误".to_string()));
        }

        let claims = auth::issue_token(&customer.id, &customer.username, &customer.email);
        let token = auth::encode_token(&self.state.config().jwt_secret_key, &claims)?;
        info!("客户 {} 登录成功", customer.username);
        Ok(token)
    }

    /// 登出：把令牌计入服务端吊销表，直至其自然过期
    pub async fn logout(&self, claims: &Claims) -> Result<()> {
        self.state.deny_list.revoke(&claims.jti, claims.exp).await;
        info!("客户 {} 已登出", claims.username);
        Ok(())
    }

    /// 删除客户；名下还有未销毁的虚拟机时拒绝
    pub async fn delete(&self, customer_id: &str) -> Result<()> {
        let customer = CustomerEntity::find_by_id(customer_id.to_string())
            .one(&self.state.sea_db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| Error::NotFound(format!("客户 {} 不存在", customer_id)))?;

        let active = VmCatalog::new(self.state.clone())
            .count_active_vms(customer_id)
            .await?;
        if active > 0 {
            return Err(Error::Conflict(format!(
                "客户 {} 名下还有 {} 台未销毁的虚拟机",
                customer.username, active
            )));
        }

        CustomerEntity::delete_by_id(customer_id.to_string())
            .exec(&self.state.sea_db)
            .await
            .map_err(map_db_err)?;

        info!("客户 {} 已删除", customer.username);
        Ok(())
    }
}

fn map_db_err(e: sea_orm::DbErr) -> Error {
    Error::Internal(format!("数据库错误: {}", e))
}
