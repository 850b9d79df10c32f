/// SSH 接入信息数据模型
///
/// 两种模式共用一张表，未用到的列留空；私钥列只存密文。

use common::models::SshInfo;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ssh_info")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub vm_id: String,
    pub mode: String,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub fingerprint: Option<String>,
    pub public_cert: Option<String>,
    pub private_key_encrypted: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// 还原为领域类型；列组合非法时返回 None（只应出现在人为改库之后）
    pub fn to_ssh_info(&self) -> Option<SshInfo> {
        match self.mode.as_str() {
            "rootPassword" => Some(SshInfo::RootPassword {
                username: self.username.clone()?,
                password_hash: self.password_hash.clone()?,
            }),
            "certificate" => Some(SshInfo::Certificate {
                fingerprint: self.fingerprint.clone()?,
                public_cert: self.public_cert.clone()?,
                private_key_encrypted: self.private_key_encrypted.clone()?,
            }),
            _ => None,
        }
    }
}

/// 由领域类型构造表行字段
pub fn columns_from(info: &SshInfo) -> (String, Option<String>, Option<String>, Option<String>, Option<String>, Option<String>) {
    match info {
        SshInfo::RootPassword { username, password_hash } => (
            "rootPassword".to_string(),
            Some(username.clone()),
            Some(password_hash.clone()),
            None,
            None,
            None,
        ),
        SshInfo::Certificate { fingerprint, public_cert, private_key_encrypted } => (
            "certificate".to_string(),
            None,
            None,
            Some(fingerprint.clone()),
            Some(public_cert.clone()),
            Some(private_key_encrypted.clone()),
        ),
    }
}
