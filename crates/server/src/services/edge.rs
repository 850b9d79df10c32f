/// 边缘路由控制器 (C8)
///
/// 每台主机上有一个反向代理，管理接口经 Unix 域套接字暴露。
/// 注册即创建一个服务（名字由客户与虚拟机 ID 派生）：单上游
/// （客户机地址）加单条按主机名匹配的路由。注册与注销都幂等。

use std::collections::HashMap;
use std::time::Duration;

use common::models::RouteBinding;
use common::{Error, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::services::retry_with_backoff;

/// 单次边缘调用的限期
const EDGE_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// 服务名：<客户名>-<vmId>
pub fn derive_service_name(owner: &str, vm_id: &str) -> String {
    format!("{}-{}", owner, vm_id)
}

/// 由注册参数构造路由绑定
pub fn build_binding(
    owner: &str,
    vm_id: &str,
    upstream_host: &str,
    headers: HashMap<String, String>,
) -> RouteBinding {
    let service_name = derive_service_name(owner, vm_id);
    RouteBinding {
        route_url: format!("{}.edge.local", service_name),
        service_name,
        upstream_host: upstream_host.to_string(),
        headers,
    }
}

/// 代理管理接口的服务对象
fn service_payload(binding: &RouteBinding) -> Value {
    json!({
        "name": binding.service_name,
        "upstreams": [ binding.upstream_host ],
        "routes": [ { "host": binding.route_url } ],
        "headers": binding.headers,
    })
}

/// 现存服务与期望绑定是否等价（等价则重复注册直接复用）
fn service_matches(existing: &Value, binding: &RouteBinding) -> bool {
    let upstream_ok = existing["upstreams"]
        .as_array()
        .map(|u| u.len() == 1 && u[0] == json!(binding.upstream_host))
        .unwrap_or(false);
    let route_ok = existing["routes"]
        .as_array()
        .map(|r| r.len() == 1 && r[0]["host"] == json!(binding.route_url))
        .unwrap_or(false);
    upstream_ok && route_ok
}

pub struct EdgeRouterController {
    socket_path: String,
}

impl EdgeRouterController {
    pub fn new(socket_path: &str) -> Self {
        Self { socket_path: socket_path.to_string() }
    }

    /// 注册虚拟机为上游；重复注册返回既有绑定，参数不同返回冲突
    pub async fn register(
        &self,
        owner: &str,
        vm_id: &str,
        upstream_host: &str,
        headers: HashMap<String, String>,
    ) -> Result<RouteBinding> {
        let binding = build_binding(owner, vm_id, upstream_host, headers);

        retry_with_backoff("注册边缘路由", || {
            let binding = binding.clone();
            async move {
                let path = format!("/services/{}", binding.service_name);
                let (status, body) = self.send(Method::GET, &path, None).await?;

                if status == StatusCode::OK {
                    if service_matches(&body, &binding) {
                        debug!("服务 {} 已存在且配置一致，复用", binding.service_name);
                        return Ok(binding);
                    }
                    return Err(Error::Conflict(format!(
                        "边缘服务 {} 已存在且配置不同",
                        binding.service_name
                    )));
                }

                let (status, _) = self
                    .send(Method::POST, "/services", Some(service_payload(&binding)))
                    .await?;
                match status {
                    StatusCode::OK | StatusCode::CREATED => {
                        info!("边缘路由 {} -> {} 已注册", binding.route_url, binding.upstream_host);
                        Ok(binding)
                    }
                    StatusCode::CONFLICT => Err(Error::Conflict(format!(
                        "边缘服务 {} 注册冲突",
                        binding.service_name
                    ))),
                    other => Err(Error::EdgeUnavailable(format!("代理返回 {}", other))),
                }
            }
        })
        .await
    }

    /// 注销路由；不存在视为已完成
    pub async fn deregister(&self, service_name: &str) -> Result<()> {
        retry_with_backoff("注销边缘路由", || async move {
            let path = format!("/services/{}", service_name);
            let (status, _) = self.send(Method::DELETE, &path, None).await?;
            match status {
                StatusCode::OK | StatusCode::NO_CONTENT => {
                    info!("边缘服务 {} 已注销", service_name);
                    Ok(())
                }
                StatusCode::NOT_FOUND => {
                    debug!("边缘服务 {} 不存在，注销视为完成", service_name);
                    Ok(())
                }
                other => Err(Error::EdgeUnavailable(format!("代理返回 {}", other))),
            }
        })
        .await
    }

    /// 经 Unix 套接字发一次 HTTP/1 请求
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let fut = async {
            let stream = UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| Error::EdgeUnavailable(format!("连接代理套接字失败: {}", e)))?;

            let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
                .await
                .map_err(|e| Error::EdgeUnavailable(format!("HTTP 握手失败: {}", e)))?;
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let payload = match &body {
                Some(v) => Bytes::from(v.to_string()),
                None => Bytes::new(),
            };
            let request = Request::builder()
                .method(method)
                .uri(path)
                .header(hyper::header::HOST, "edge-admin")
                .header(hyper::header::CONTENT_TYPE, "application/json")
                .body(Full::new(payload))
                .map_err(|e| Error::Internal(format!("构造代理请求失败: {}", e)))?;

            let response = sender
                .send_request(request)
                .await
                .map_err(|e| Error::EdgeUnavailable(format!("代理请求失败: {}", e)))?;

            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| Error::EdgeUnavailable(format!("读取代理响应失败: {}", e)))?
                .to_bytes();

            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            Ok((status, value))
        };

        tokio::time::timeout(EDGE_CALL_TIMEOUT, fut)
            .await
            .map_err(|_| Error::EdgeUnavailable("代理调用超时".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_service_name() {
        assert_eq!(derive_service_name("alice", "vm-42"), "alice-vm-42");
    }

    #[test]
    fn test_build_binding_shape() {
        let binding = build_binding("alice", "vm-42", "10.0.0.42:80", HashMap::new());
        assert_eq!(binding.service_name, "alice-vm-42");
        assert_eq!(binding.route_url, "alice-vm-42.edge.local");
        assert_eq!(binding.upstream_host, "10.0.0.42:80");
    }

    #[test]
    fn test_service_payload_single_upstream_single_route() {
        let binding = build_binding("alice", "vm-42", "10.0.0.42:80", HashMap::new());
        let payload = service_payload(&binding);
        assert_eq!(payload["upstreams"].as_array().unwrap().len(), 1);
        assert_eq!(payload["routes"].as_array().unwrap().len(), 1);
        assert_eq!(payload["routes"][0]["host"], "alice-vm-42.edge.local");
    }

    #[test]
    fn test_service_matches_identical_config() {
        let binding = build_binding("alice", "vm-42", "10.0.0.42:80", HashMap::new());
        let existing = service_payload(&binding);
        assert!(service_matches(&existing, &binding));
    }

    #[test]
    fn test_service_matches_rejects_different_upstream() {
        let binding = build_binding("alice", "vm-42", "10.0.0.42:80", HashMap::new());
        let mut existing = service_payload(&binding);
        existing["upstreams"] = json!(["10.0.0.99:80"]);
        assert!(!service_matches(&existing, &binding));
    }
}
