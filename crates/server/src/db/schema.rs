/// 目录表结构引导
///
/// 启动时按幂等语句建表建索引；IP 唯一性只约束未销毁的虚拟机。

use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing::info;

const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS customers (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        email TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS virtual_machines (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL REFERENCES customers(id),
        name TEXT NOT NULL,
        inventory_path TEXT NOT NULL,
        vm_ref TEXT,
        placement JSONB NOT NULL,
        network_ip TEXT NOT NULL,
        state TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS ssh_info (
        vm_id TEXT PRIMARY KEY REFERENCES virtual_machines(id),
        mode TEXT NOT NULL,
        username TEXT,
        password_hash TEXT,
        fingerprint TEXT,
        public_cert TEXT,
        private_key_encrypted TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS route_bindings (
        vm_id TEXT PRIMARY KEY REFERENCES virtual_machines(id),
        service_name TEXT NOT NULL,
        route_url TEXT NOT NULL,
        upstream_host TEXT NOT NULL,
        headers JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS deployment_audit (
        id TEXT PRIMARY KEY,
        vm_id TEXT,
        customer_id TEXT NOT NULL,
        vm_name TEXT NOT NULL,
        state_reached TEXT NOT NULL,
        error TEXT NOT NULL,
        compensation_error TEXT,
        cancelled BOOLEAN NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ
    )",
];

const INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_customers_username ON customers (username)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_customers_email ON customers (email)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_vms_inventory_path ON virtual_machines (inventory_path)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_vms_network_ip ON virtual_machines (network_ip) \
     WHERE state <> 'destroyed'",
    "CREATE INDEX IF NOT EXISTS idx_vms_owner ON virtual_machines (owner_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_customer ON deployment_audit (customer_id)",
];

pub async fn init_schema(db: &DatabaseConnection) -> anyhow::Result<()> {
    for stmt in TABLES.iter().chain(INDEXES) {
        db.execute_unprepared(stmt).await?;
    }
    info!("目录表结构已就绪");
    Ok(())
}
