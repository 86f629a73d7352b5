//! Private network classification of remote peers

use std::net::IpAddr;
use tlsgate_common::PolicyConfig;

/// Classify a remote as private for enforcement purposes.
///
/// A remote only counts as private when the policy enables
/// `bypass_for_private_networks` and its address is in a private range.
/// Private remotes are exempt from every enforcement rule.
pub fn is_private_remote(ip: IpAddr, policy: &PolicyConfig) -> bool {
    policy.bypass_for_private_networks && is_private_address(ip, policy)
}

/// Whether the address is internal: built-in ranges plus `private_networks`
pub fn is_private_address(ip: IpAddr, policy: &PolicyConfig) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        IpAddr::V4(_) => ip,
    };

    is_private_ip(&ip) || policy.private_networks.iter().any(|net| net.contains(&ip))
}

/// Check if an IP address is in a private/reserved range
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_loopback()              // 127.0.0.0/8
                || ipv4.is_private()         // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
                || ipv4.is_link_local()      // 169.254.0.0/16
                || ipv4.octets()[0] == 100 && (ipv4.octets()[1] & 0xC0) == 64  // 100.64.0.0/10 (CGNAT)
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()              // ::1
                // fc00::/7 (ULA)
                || (ipv6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 (link-local)
                || (ipv6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
