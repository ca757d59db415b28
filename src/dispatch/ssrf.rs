//! Egress guard against private address ranges
//!
//! Every outbound request first resolves its target host and checks
//! each candidate address. Anything outside globally-routable unicast
//! space (loopback, RFC1918, link-local, CGNAT, multicast, reserved,
//! ULA) is refused unless the allow-local policy is enabled.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::Url;

use crate::error::{EngineError, PipelineResult};

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    if ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
    {
        return false;
    }
    // CGNAT 100.64.0.0/10
    if octets[0] == 100 && (octets[1] & 0xc0) == 64 {
        return false;
    }
    // IETF protocol assignments 192.0.0.0/24
    if octets[0] == 192 && octets[1] == 0 && octets[2] == 0 {
        return false;
    }
    // Benchmarking 198.18.0.0/15
    if octets[0] == 198 && (octets[1] & 0xfe) == 18 {
        return false;
    }
    // Reserved 240.0.0.0/4
    if octets[0] >= 240 {
        return false;
    }
    true
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_public_v4(mapped);
    }
    if ip.is_unspecified() || ip.is_loopback() || ip.is_multicast() {
        return false;
    }
    let segments = ip.segments();
    // Unique-local fc00::/7
    if (segments[0] & 0xfe00) == 0xfc00 {
        return false;
    }
    // Link-local fe80::/10
    if (segments[0] & 0xffc0) == 0xfe80 {
        return false;
    }
    // Documentation 2001:db8::/32
    if segments[0] == 0x2001 && segments[1] == 0x0db8 {
        return false;
    }
    true
}

/// Whether an address lies in globally-routable unicast space.
#[must_use]
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

/// Resolve the URL's host and verify every candidate address is
/// public. IP-literal hosts are checked directly without a lookup.
pub async fn ensure_public_host(url: &Url, allow_local: bool) -> PipelineResult<()> {
    if allow_local {
        return Ok(());
    }

    let host = url
        .host_str()
        .ok_or_else(|| EngineError::Fetch(format!("URL has no host: {url}")))?;

    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        if !is_public_ip(ip) {
            return Err(EngineError::InsecureConnection(host.to_string()));
        }
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| EngineError::DnsResolution(host.to_string()))?;

    let mut any = false;
    for addr in addrs {
        any = true;
        if !is_public_ip(addr.ip()) {
            return Err(EngineError::InsecureConnection(host.to_string()));
        }
    }
    if !any {
        return Err(EngineError::DnsResolution(host.to_string()));
    }
    Ok(())
}
