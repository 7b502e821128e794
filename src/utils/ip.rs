//! IP 地址处理工具
//!
//! - 客户端 IP 提取（可信代理 + X-Forwarded-For）
//! - CIDR 匹配
//! - 指纹用的网段归一化（IPv4 /24，IPv6 /48）

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use actix_web::HttpRequest;
use actix_web::http::header::HeaderMap;
use tracing::debug;

/// 检查 IP 是否为私有地址或 localhost
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7 ULA
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10 link-local
        }
    }
}

/// 解析 `ip` 或 `ip:port`
pub fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<SocketAddr>()
        .map(|s| s.ip())
        .or_else(|_| raw.parse::<IpAddr>())
        .ok()
}

/// 检查 IP 是否在可信代理列表中（单 IP 或 CIDR）
pub fn is_trusted_proxy(ip: &str, trusted_proxies: &[String]) -> bool {
    let Some(addr) = parse_ip(ip) else {
        return false;
    };

    trusted_proxies.iter().any(|proxy| {
        if proxy.contains('/') {
            ip_in_cidr(&addr, proxy)
        } else {
            proxy.parse::<IpAddr>().is_ok_and(|p| p == addr)
        }
    })
}

/// CIDR 检查
pub fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network, prefix_len)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(prefix_len) = prefix_len.parse::<u32>() else {
        return false;
    };
    let Ok(network) = network.parse::<IpAddr>() else {
        return false;
    };

    match (ip, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) if prefix_len <= 32 => {
            let mask = u32::MAX.checked_shl(32 - prefix_len).unwrap_or(0);
            (u32::from(*ip) & mask) == (u32::from(net) & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) if prefix_len <= 128 => {
            let mask = u128::MAX.checked_shl(128 - prefix_len).unwrap_or(0);
            (u128::from(*ip) & mask) == (u128::from(net) & mask)
        }
        _ => false,
    }
}

/// 归一化到网段：IPv4 取 /24，IPv6 取 /48
///
/// 同一 NAT/运营商出口下的地址轮换不会改变结果
pub fn network_prefix(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let masked = Ipv4Addr::from(u32::from(*v4) & 0xffff_ff00);
            format!("{}/24", masked)
        }
        IpAddr::V6(v6) => {
            // IPv4-mapped 地址按 IPv4 处理
            if let Some(v4) = v6.to_ipv4_mapped() {
                return network_prefix(&IpAddr::V4(v4));
            }
            let masked = Ipv6Addr::from(u128::from(*v6) & (u128::MAX << 80));
            format!("{}/48", masked)
        }
    }
}

/// 按可信代理规则决定客户端 IP
///
/// 1. 显式配置 trusted_proxies：peer 命中才信任转发头，否则用 peer
/// 2. 未配置：peer 为私有/回环地址时视为反向代理，使用转发头
/// 3. 默认使用 peer（公网直连，防止伪造）
pub fn resolve_client_ip(
    peer: Option<&str>,
    forwarded: Option<String>,
    trusted_proxies: &[String],
) -> Option<String> {
    let Some(peer) = peer else {
        return forwarded;
    };
    let peer_ip = parse_ip(peer);
    let peer_str = peer_ip.map(|ip| ip.to_string()).unwrap_or_else(|| peer.to_string());

    if !trusted_proxies.is_empty() {
        if is_trusted_proxy(peer, trusted_proxies) {
            let real = forwarded.unwrap_or_else(|| peer_str.clone());
            debug!("Trusted proxy (explicit): {} -> {}", peer_str, real);
            return Some(real);
        }
        return Some(peer_str);
    }

    if let Some(ip) = peer_ip
        && is_private_or_local(&ip)
        && let Some(real) = forwarded
    {
        debug!("Auto-detect proxy (private IP {}): {}", peer_str, real);
        return Some(real);
    }

    Some(peer_str)
}

/// 从 HttpRequest 提取真实客户端 IP
pub fn extract_client_ip(req: &HttpRequest, trusted_proxies: &[String]) -> Option<String> {
    let conn = req.connection_info();
    resolve_client_ip(
        conn.peer_addr(),
        extract_forwarded_ip_from_headers(req.headers()),
        trusted_proxies,
    )
}

/// X-Forwarded-For 第一个合法地址，其次 X-Real-IP
pub fn extract_forwarded_ip_from_headers(headers: &HeaderMap) -> Option<String> {
    let from_xff = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(parse_ip);

    from_xff
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .and_then(parse_ip)
        })
        .map(|ip| ip.to_string())
}
