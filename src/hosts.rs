//! Best-effort host identities: DHCP lease names keyed by MAC and reverse
//! DNS names keyed by IP.

use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};

use crate::error::Result;

const RESOLVE_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostInfo {
    pub name: Option<String>,
    pub ip: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct HostDirectory {
    /// Upper-case MAC -> lease info.
    info: HashMap<String, HostInfo>,
    /// IP -> lease name, rebuilt on every lease refresh.
    lease_names: HashMap<String, String>,
    /// IP -> reverse DNS name.
    dns_names: HashMap<String, String>,
    /// IP -> earliest time a failed reverse lookup may be retried.
    retry_at: HashMap<String, Instant>,
}

impl HostDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, mac: &str) -> Option<&HostInfo> {
        self.info.get(&mac.to_uppercase())
    }

    pub fn name_for_mac(&self, mac: &str) -> Option<&str> {
        self.info(mac).and_then(|h| h.name.as_deref())
    }

    /// Lease name of `ip`, falling back to its reverse DNS name.
    pub fn name_for_ip(&self, ip: &str) -> Option<&str> {
        self.lease_names
            .get(ip)
            .or_else(|| self.dns_names.get(ip))
            .map(String::as_str)
    }

    pub fn insert_info(&mut self, mac: &str, info: HostInfo) {
        self.info.insert(mac.to_uppercase(), info);
    }

    /// Records a reverse DNS name.
    pub fn insert_name(&mut self, ip: impl Into<String>, name: impl Into<String>) {
        let ip = ip.into();
        self.retry_at.remove(&ip);
        self.dns_names.insert(ip, name.into());
    }

    /// Skips reverse lookups of `ip` until `retry_at`.
    pub fn mark_unresolved(&mut self, ip: impl Into<String>, retry_at: Instant) {
        self.retry_at.insert(ip.into(), retry_at);
    }

    /// Addresses out of `ips` that have no name yet and are not waiting out
    /// a failed lookup.
    pub fn unnamed<'a>(&self, ips: impl IntoIterator<Item = &'a str>) -> Vec<IpAddr> {
        let now = Instant::now();
        ips.into_iter()
            .filter(|ip| self.name_for_ip(ip).is_none())
            .filter(|ip| self.retry_at.get(*ip).map_or(true, |at| *at <= now))
            .filter_map(|ip| ip.parse().ok())
            .collect()
    }

    /// Replaces lease-derived info and names with the content of a dnsmasq
    /// lease file. Reverse DNS names are kept.
    pub fn apply_leases(&mut self, leases: &str) -> usize {
        self.info.clear();
        self.lease_names.clear();

        let mut count = 0;
        for lease in parse_leases(leases) {
            if let Some(name) = &lease.name {
                self.lease_names.insert(lease.ip.clone(), name.clone());
            }
            self.info.insert(
                lease.mac.to_uppercase(),
                HostInfo {
                    name: lease.name,
                    ip: Some(lease.ip),
                },
            );
            count += 1;
        }
        count
    }

    pub fn load_leases(&mut self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)?;
        let count = self.apply_leases(&content);
        tracing::debug!(path = %path.display(), leases = count, "host leases loaded");
        Ok(count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub mac: String,
    pub ip: String,
    pub name: Option<String>,
}

/// Parses dnsmasq's `<expiry> <mac> <ip> <name> <client-id>` lines.
/// A name of `*` means the client sent none.
pub fn parse_leases(content: &str) -> Vec<Lease> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _expiry = fields.next()?;
            let mac = fields.next()?;
            let ip = fields.next()?;
            let name = fields.next().filter(|n| *n != "*").map(str::to_string);

            // DHCPv6 lines carry a DUID instead of a MAC
            if mac.split(':').count() != 6 {
                return None;
            }

            Some(Lease {
                mac: mac.to_string(),
                ip: ip.to_string(),
                name,
            })
        })
        .collect()
}

/// Reverse-resolves `addrs` through the system resolver, stopping at
/// `timeout` in total or once `limit` names have been found.
pub async fn resolve_reverse(
    addrs: Vec<IpAddr>,
    timeout: Duration,
    limit: usize,
) -> HashMap<IpAddr, String> {
    resolve_with(addrs, timeout, limit, |addr| async move {
        tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr))
            .await
            .ok()
            .and_then(|r| r.ok())
    })
    .await
}

/// [`resolve_reverse`] over any `lookup` function.
pub async fn resolve_with<F, Fut>(
    addrs: Vec<IpAddr>,
    timeout: Duration,
    limit: usize,
    lookup: F,
) -> HashMap<IpAddr, String>
where
    F: Fn(IpAddr) -> Fut,
    Fut: Future<Output = Option<String>>,
{
    let deadline = Instant::now() + timeout;
    let mut found = HashMap::new();
    if addrs.is_empty() || limit == 0 {
        return found;
    }

    let mut lookups = stream::iter(addrs)
        .map(|addr| {
            let name = lookup(addr);
            async move { (addr, name.await) }
        })
        .buffer_unordered(RESOLVE_CONCURRENCY);

    loop {
        match timeout_at(deadline, lookups.next()).await {
            Ok(Some((addr, Some(name)))) => {
                // resolvers echo the address back when there is no PTR record
                if name != addr.to_string() {
                    found.insert(addr, name);
                    if found.len() >= limit {
                        break;
                    }
                }
            }
            Ok(Some((_, None))) => {}
            Ok(None) => break,
            Err(_) => {
                tracing::debug!(resolved = found.len(), "reverse lookup timed out");
                break;
            }
        }
    }

    found
}
