//! Client identity resolution.
//!
//! The deduplication guard scopes request identifiers per client. The client
//! key is the IP address of the transport-level peer, taken from Axum's
//! [`ConnectInfo`] extension (the server must be started with
//! `into_make_service_with_connect_info::<SocketAddr>()`).
//!
//! # Behind a Reverse Proxy
//!
//! When every request arrives from the same proxy, all clients collapse onto
//! the proxy's address. Configure `TRUSTED_PROXIES` with the proxy's CIDR
//! ranges; for peers inside those ranges the client key is taken from
//! `X-Forwarded-For` (first entry) or `X-Real-IP` instead. The forwarded
//! value must parse as an IP address, optionally with a port; anything else
//! falls back to the peer address.
//!
//! Headers from peers **outside** the trusted ranges are ignored, so a direct
//! client cannot pick its own key by sending `X-Forwarded-For`.
//!
//! # Accepted Coarsening
//!
//! The key is not authenticated. Unrelated clients sharing one address (NAT,
//! an untrusted proxy) share one key. When no peer address is available at
//! all, every such request shares [`UNKNOWN_CLIENT`].
//!
//! # Internal Architecture
//!
//! ```text
//!   ConnectInfo<SocketAddr> ──► peer ip ──► trusted? ──no──► peer ip
//!                                              │
//!                                             yes
//!                                              ▼
//!                                  extract_ip_from_headers ──► XFF / X-Real-IP
//!                                              │ (NotFound)
//!                                              ▼
//!                                           peer ip
//! ```

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Fallback client key when no peer address can be determined.
///
/// Requests served without connect-info (e.g. in-process tests or a
/// misconfigured server) all share this key.
pub const UNKNOWN_CLIENT: &str = "unknown";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR notation string (e.g., "10.0.0.0/8" or "::1/128").
    ///
    /// A bare address is accepted as a single-host range. Returns `None` if
    /// the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();

        let Some((addr, prefix)) = cidr.split_once('/') else {
            let network: IpAddr = cidr.parse().ok()?;
            return Some(Self {
                prefix_len: max_prefix(&network),
                network,
            });
        };

        let network: IpAddr = addr.parse().ok()?;
        let prefix_len: u8 = prefix.parse().ok()?;
        if prefix_len > max_prefix(&network) {
            return None;
        }

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this CIDR range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix_len)
                };
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix_len)
                };
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Set of proxy networks allowed to supply forwarded client addresses.
///
/// Empty means no proxy is trusted and the peer address is always used.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings. Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy ranges configured");
        }

        Self { ranges }
    }

    /// Whether any proxy range is configured.
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether `ip` lies inside a trusted proxy range.
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }
}

// =============================================================================
// Header Extraction
// =============================================================================

/// Result of extracting a forwarded address from headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractedIp<'a> {
    /// First entry of `X-Forwarded-For`.
    FromXff(&'a str),
    /// `X-Real-IP`.
    FromRealIp(&'a str),
    NotFound,
}

#[inline]
fn extract_ip_from_headers<B>(req: &Request<B>) -> ExtractedIp<'_> {
    // Format: "client, proxy1, proxy2" - we want the first (client) IP
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first_ip) = value.split(',').next().map(str::trim)
        && !first_ip.is_empty()
    {
        return ExtractedIp::FromXff(first_ip);
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return ExtractedIp::FromRealIp(value.trim());
    }

    ExtractedIp::NotFound
}

/// Peer IP recorded by the server's connect-info layer, if any.
#[inline]
pub fn peer_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

// =============================================================================
// Public API
// =============================================================================

/// Derives the client key used to scope deduplication.
#[derive(Debug, Clone, Default)]
pub struct ClientResolver {
    trusted_proxies: TrustedProxyConfig,
}

impl ClientResolver {
    /// Create a resolver trusting forwarded headers only from `trusted_proxies`.
    pub fn new(trusted_proxies: TrustedProxyConfig) -> Self {
        Self { trusted_proxies }
    }

    /// Resolve the client key for `req`. Never fails.
    ///
    /// Returns `Cow::Borrowed(UNKNOWN_CLIENT)` when no peer address exists.
    pub fn resolve<B>(&self, req: &Request<B>) -> Cow<'static, str> {
        let Some(peer) = peer_ip(req) else {
            return Cow::Borrowed(UNKNOWN_CLIENT);
        };

        if !self.trusted_proxies.is_trusted(&peer) {
            return Cow::Owned(peer.to_string());
        }

        let (source, raw) = match extract_ip_from_headers(req) {
            ExtractedIp::FromXff(raw) => ("X-Forwarded-For", raw),
            ExtractedIp::FromRealIp(raw) => ("X-Real-IP", raw),
            ExtractedIp::NotFound => {
                debug!(peer = %peer, "Trusted proxy sent no forwarding headers");
                return Cow::Owned(peer.to_string());
            }
        };

        match parse_forwarded_ip(raw) {
            Some(ip) => {
                debug!(
                    peer = %peer,
                    client_ip = %ip,
                    source,
                    "Client key from forwarding header"
                );
                Cow::Owned(ip.to_string())
            }
            None => {
                warn!(
                    peer = %peer,
                    value = %raw,
                    source,
                    "Unparseable forwarded address, using peer"
                );
                Cow::Owned(peer.to_string())
            }
        }
    }
}

/// Parse a forwarded client address, accepting an optional port.
fn parse_forwarded_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}
