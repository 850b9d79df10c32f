/// 工具函数集合

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use uuid::Uuid;

/// 生成唯一 ID
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// 验证 IPv4 地址格式
pub fn validate_ipv4_address(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().is_ok()
}

/// 验证子网掩码（必须是连续的高位 1）
pub fn validate_netmask(mask: &str) -> bool {
    let Ok(addr) = mask.parse::<Ipv4Addr>() else {
        return false;
    };
    let bits = u32::from(addr);
    // 连续掩码取反加一后是 2 的幂
    bits != 0 && (!bits).wrapping_add(1).is_power_of_two()
}

/// 验证 DNS 标签（RFC 1123：字母数字与中划线，不以中划线开头结尾，最长 63）
pub fn validate_dns_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// 判断两个地址在给定掩码下是否属于同一子网
pub fn same_subnet(a: &str, b: &str, mask: &str) -> bool {
    let (Ok(a), Ok(b), Ok(mask)) = (
        a.parse::<Ipv4Addr>(),
        b.parse::<Ipv4Addr>(),
        mask.parse::<Ipv4Addr>(),
    ) else {
        return false;
    };
    let prefix = u32::from(mask).count_ones() as u8;
    match (Ipv4Network::new(a, prefix), Ipv4Network::new(b, prefix)) {
        (Ok(na), Ok(nb)) => na.network() == nb.network(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id1 = generate_id();
        let id2 = generate_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36); // UUID v4 格式
    }

    #[test]
    fn test_validate_ipv4_address() {
        assert!(validate_ipv4_address("192.168.1.1"));
        assert!(validate_ipv4_address("10.0.0.42"));
        assert!(!validate_ipv4_address("256.1.1.1"));
        assert!(!validate_ipv4_address("192.168.1"));
        assert!(!validate_ipv4_address("invalid"));
    }

    #[test]
    fn test_validate_netmask() {
        assert!(validate_netmask("255.255.255.0"));
        assert!(validate_netmask("255.255.0.0"));
        assert!(validate_netmask("255.255.255.252"));
        assert!(!validate_netmask("255.0.255.0"));
        assert!(!validate_netmask("0.0.0.0"));
        assert!(!validate_netmask("invalid"));
    }

    #[test]
    fn test_validate_dns_label() {
        assert!(validate_dns_label("web-01"));
        assert!(validate_dns_label("a"));
        assert!(!validate_dns_label(""));
        assert!(!validate_dns_label("-leading"));
        assert!(!validate_dns_label("trailing-"));
        assert!(!validate_dns_label("has.dot"));
        assert!(!validate_dns_label(&"x".repeat(64)));
    }

    #[test]
    fn test_same_subnet() {
        assert!(same_subnet("10.0.0.42", "10.0.0.1", "255.255.255.0"));
        assert!(!same_subnet("10.0.1.42", "10.0.0.1", "255.255.255.0"));
        assert!(same_subnet("10.0.1.42", "10.0.0.1", "255.255.0.0"));
        assert!(!same_subnet("bad", "10.0.0.1", "255.255.255.0"));
    }
}
