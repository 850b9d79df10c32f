/// 认证：JWT 签发、校验与服务端吊销
///
/// 解码只做一次类型化反序列化；登出把令牌的 `jti` 记入吊销表，
/// 保留到令牌自身过期为止。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::{Error, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 令牌有效期：10000 分钟
const TOKEN_TTL_MINUTES: i64 = 10_000;

/// 令牌声明，单次类型化解码
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    /// 令牌唯一标识，吊销表的键
    pub jti: String,
}

/// 构造新令牌的声明
pub fn issue_token(user_id: &str, username: &str, email: &str) -> Claims {
    let iat = Utc::now().timestamp();
    Claims {
        user_id: user_id.to_string(),
        username: username.to_string(),
        email: email.to_string(),
        iat,
        exp: iat + TOKEN_TTL_MINUTES * 60,
        jti: common::utils::generate_id(),
    }
}

/// 把声明编码为令牌字符串
pub fn encode_token(secret: &str, claims: &Claims) -> Result<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("令牌签发失败: {}", e)))
}

/// 校验令牌并返回声明；签名或过期问题一律归为 `AuthRequired`
pub fn validate_token(secret: &str, token: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| Error::AuthRequired(format!("令牌无效: {}", e)))?;
    Ok(data.claims)
}

/// 进程内令牌吊销表
///
/// 键是 `jti`，值是令牌过期时间；过期条目在写入时顺带清理，
/// 表的大小由令牌有效期自然约束。
#[derive(Clone, Default)]
pub struct TokenDenyList {
    inner: Arc<RwLock<HashMap<String, i64>>>,
}

impl TokenDenyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// 吊销令牌直至其过期时间
    pub async fn revoke(&self, jti: &str, exp: i64) {
        let now = Utc::now().timestamp();
        let mut map = self.inner.write().await;
        map.retain(|_, e| *e > now);
        map.insert(jti.to_string(), exp);
    }

    pub async fn is_revoked(&self, jti: &str) -> bool {
        let now = Utc::now().timestamp();
        let map = self.inner.read().await;
        map.get(jti).is_some_and(|exp| *exp > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip() {
        let claims = issue_token("u-1", "alice", "alice@example.com");
        let token = encode_token(SECRET, &claims).unwrap();
        let recovered = validate_token(SECRET, &token).unwrap();

        assert_eq!(recovered.user_id, "u-1");
        assert_eq!(recovered.username, "alice");
        assert_eq!(recovered.email, "alice@example.com");
        assert_eq!(recovered.jti, claims.jti);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let claims = issue_token("u-1", "alice", "alice@example.com");
        let token = encode_token(SECRET, &claims).unwrap();

        // 篡改负载的任意一个字节
        let mut tampered = token.clone();
        let mid = token.len() / 2;
        tampered.replace_range(mid..mid + 1, if &token[mid..mid + 1] == "A" { "B" } else { "A" });

        assert!(matches!(
            validate_token(SECRET, &tampered),
            Err(Error::AuthRequired(_))
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let claims = issue_token("u-1", "alice", "alice@example.com");
        let token = encode_token(SECRET, &claims).unwrap();
        assert!(validate_token("other-secret", &token).is_err());
    }

    #[tokio::test]
    async fn test_deny_list_revocation() {
        let list = TokenDenyList::new();
        let exp = Utc::now().timestamp() + 3600;

        assert!(!list.is_revoked("jti-1").await);
        list.revoke("jti-1", exp).await;
        assert!(list.is_revoked("jti-1").await);

        // 已过期的吊销条目不再生效
        list.revoke("jti-2", Utc::now().timestamp() - 1).await;
        assert!(!list.is_revoked("jti-2").await);
    }
}
