/// vSphere REST 客户端
///
/// 进程级共享：会话在认证过期时由持锁的一方重新登录，其余调用方复用新会话。

use std::sync::Arc;
use std::time::Duration;

use common::{Error, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// REST 响应信封，平台把有效负载包在 `value` 字段里
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    pub value: T,
}

pub struct VsphereClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    session: Mutex<Option<String>>,
}

impl VsphereClient {
    /// 连接虚拟化平台并建立会话
    pub async fn connect(host: &str, username: &str, password: &str) -> Result<Arc<Self>> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::Internal(format!("构建 HTTP 客户端失败: {}", e)))?;

        let client = Arc::new(Self {
            http,
            base_url: format!("https://{}/rest", host),
            username: username.to_string(),
            password: password.to_string(),
            session: Mutex::new(None),
        });

        // 启动时立即验证凭据与可达性
        client.ensure_session().await?;
        info!("已连接到虚拟化平台 {}", host);

        Ok(client)
    }

    /// 登录并返回会话 ID
    async fn login(&self) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/com/vmware/cis/session", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| Error::HypervisorUnavailable(format!("登录请求失败: {}", e)))?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::HypervisorUnavailable("平台拒绝了登录凭据".to_string()));
        }
        if !resp.status().is_success() {
            return Err(Error::HypervisorUnavailable(format!(
                "登录失败，平台返回 {}",
                resp.status()
            )));
        }

        let envelope: ApiEnvelope<String> = resp
            .json()
            .await
            .map_err(|e| Error::HypervisorUnavailable(format!("解析会话响应失败: {}", e)))?;

        debug!("虚拟化平台会话已建立");
        Ok(envelope.value)
    }

    /// 取当前会话，没有则登录创建
    async fn ensure_session(&self) -> Result<String> {
        let mut guard = self.session.lock().await;
        if let Some(sid) = guard.as_ref() {
            return Ok(sid.clone());
        }
        let sid = self.login().await?;
        *guard = Some(sid.clone());
        Ok(sid)
    }

    /// 丢弃已过期的会话；只有仍持有旧值时才清除，避免覆盖别人刚建好的会话
    async fn invalidate_session(&self, stale: &str) {
        let mut guard = self.session.lock().await;
        if guard.as_deref() == Some(stale) {
            *guard = None;
        }
    }

    async fn execute(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        // 认证过期时重新登录一次后重试
        let mut retried = false;
        loop {
            let sid = self.ensure_session().await?;

            let mut req = self
                .http
                .request(method.clone(), format!("{}{}", self.base_url, path))
                .header("vmware-api-session-id", &sid);
            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| Error::HypervisorUnavailable(format!("平台请求失败: {}", e)))?;

            if resp.status() == StatusCode::UNAUTHORIZED && !retried {
                warn!("平台会话已过期，重新登录");
                self.invalidate_session(&sid).await;
                retried = true;
                continue;
            }

            return Ok(resp);
        }
    }

    /// 把非 2xx 响应映射为分类错误
    async fn check_status(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let detail = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("{}: {}", context, detail))),
            StatusCode::CONFLICT => Err(Error::Conflict(format!("{}: {}", context, detail))),
            _ => Err(Error::HypervisorUnavailable(format!(
                "{}: 平台返回 {} {}",
                context, status, detail
            ))),
        }
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<T> {
        let resp = self.execute(reqwest::Method::GET, path, None).await?;
        let resp = Self::check_status(resp, context).await?;
        let envelope: ApiEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| Error::HypervisorUnavailable(format!("{}: 解析响应失败: {}", context, e)))?;
        Ok(envelope.value)
    }

    pub(crate) async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        context: &str,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let resp = self.execute(reqwest::Method::POST, path, Some(&body)).await?;
        let resp = Self::check_status(resp, context).await?;
        let envelope: ApiEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| Error::HypervisorUnavailable(format!("{}: 解析响应失败: {}", context, e)))?;
        Ok(envelope.value)
    }

    /// 不关心响应体的 POST
    pub(crate) async fn post_action(&self, path: &str, context: &str) -> Result<()> {
        let resp = self.execute(reqwest::Method::POST, path, None).await?;
        Self::check_status(resp, context).await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, path: &str, context: &str) -> Result<()> {
        let resp = self.execute(reqwest::Method::DELETE, path, None).await?;
        Self::check_status(resp, context).await?;
        Ok(())
    }

    /// 注销会话（进程退出时调用，失败只记日志）
    pub async fn logout(&self) {
        let mut guard = self.session.lock().await;
        if let Some(sid) = guard.take() {
            let _ = self
                .http
                .delete(format!("{}/com/vmware/cis/session", self.base_url))
                .header("vmware-api-session-id", &sid)
                .send()
                .await;
        }
    }
}
