//! Hostfile parsing for distributed training launch.
//!
//! Every line must take one of six forms:
//!
//! ```text
//! 127.0.0.1
//! 127.0.0.1 slots=2
//! 127.0.0.1:2
//! hostname-example.com
//! hostname-example.com slots=2
//! hostname-example.com:2
//! ```

use crate::error::{TrainingError, TrainingResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, ToSocketAddrs};
use std::path::Path;
use tracing::debug;

const IP: &str = r"((25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])\.){3}(25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])";
const HOSTNAME: &str = r"(([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]*[a-zA-Z0-9])\.)*([A-Za-z0-9]|[A-Za-z0-9][A-Za-z0-9\-]*[A-Za-z0-9])";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineForm {
    Ip,
    IpWithSlots,
    IpWithColon,
    Hostname,
    HostnameWithSlots,
    HostnameWithColon,
}

impl LineForm {
    fn is_ip(self) -> bool {
        matches!(self, Self::Ip | Self::IpWithSlots | Self::IpWithColon)
    }
}

// IP forms come first: a dotted quad also matches the hostname grammar.
static LINE_FORMS: Lazy<Vec<(LineForm, Regex)>> = Lazy::new(|| {
    let form = |pattern: String| Regex::new(&pattern).expect("valid hostfile regex");
    vec![
        (LineForm::Ip, form(format!("^(?P<host>{IP})$"))),
        (LineForm::IpWithSlots, form(format!(r"^(?P<host>{IP}) slots=(?P<slots>[0-9]{{1,2}})$"))),
        (LineForm::IpWithColon, form(format!(r"^(?P<host>{IP}):(?P<slots>[0-9]{{1,2}})$"))),
        (LineForm::Hostname, form(format!("^(?P<host>{HOSTNAME})$"))),
        (LineForm::HostnameWithSlots, form(format!(r"^(?P<host>{HOSTNAME}) slots=(?P<slots>[0-9]{{1,2}})$"))),
        (LineForm::HostnameWithColon, form(format!(r"^(?P<host>{HOSTNAME}):(?P<slots>[0-9]{{1,2}})$"))),
    ]
});

/// One worker host and its slot count (0 when the line gives none).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostfileEntry {
    pub ip_address: String,
    pub slots: u32,
}

/// Resolves hostnames to IP addresses.
pub trait HostResolver {
    fn resolve(&self, hostname: &str) -> TrainingResult<String>;
}

/// Resolver backed by the system name service; prefers IPv4.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn resolve(&self, hostname: &str) -> TrainingResult<String> {
        let addrs: Vec<IpAddr> = (hostname, 0)
            .to_socket_addrs()
            .map_err(|e| TrainingError::NotFound(format!("Unable to resolve host '{hostname}': {e}")))?
            .map(|addr| addr.ip())
            .collect();

        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .map(ToString::to_string)
            .ok_or_else(|| TrainingError::NotFound(format!("No address found for host '{hostname}'")))
    }
}

/// Parse a hostfile from disk.
pub fn parse_hostfile(path: &Path, resolver: &dyn HostResolver) -> TrainingResult<Vec<HostfileEntry>> {
    let contents = std::fs::read_to_string(path)?;
    parse_hostfile_str(&contents, resolver)
}

/// Parse hostfile contents. Any line outside the accepted forms fails the whole parse.
pub fn parse_hostfile_str(contents: &str, resolver: &dyn HostResolver) -> TrainingResult<Vec<HostfileEntry>> {
    // Validate every line before resolving anything.
    let mut matched = Vec::new();
    for line in contents.lines().map(str::trim_end) {
        let Some((form, caps)) = LINE_FORMS.iter().find_map(|(form, re)| re.captures(line).map(|c| (*form, c)))
        else {
            return Err(TrainingError::InvalidValue(format!("Invalid line in the hostfile: {line}")));
        };

        let host = caps.name("host").map_or("", |m| m.as_str()).to_string();
        let slots = match caps.name("slots") {
            Some(m) => m
                .as_str()
                .parse::<u32>()
                .map_err(|_| TrainingError::InvalidValue(format!("Invalid line in the hostfile: {line}")))?,
            None => 0,
        };
        matched.push((form, host, slots));
    }

    let mut entries = Vec::with_capacity(matched.len());
    for (form, host, slots) in matched {
        let ip_address = if form.is_ip() { host } else { resolver.resolve(&host)? };
        debug!(ip = %ip_address, slots, "Parsed hostfile entry");
        entries.push(HostfileEntry { ip_address, slots });
    }
    Ok(entries)
}

/// Render entries as an `ip:slots,ip:slots` host list for a job launcher.
///
/// Entries without an explicit slot count are listed as a bare address.
#[must_use]
pub fn host_list(entries: &[HostfileEntry]) -> String {
    entries
        .iter()
        .map(|e| if e.slots == 0 { e.ip_address.clone() } else { format!("{}:{}", e.ip_address, e.slots) })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticResolver(HashMap<&'static str, &'static str>);

    impl HostResolver for StaticResolver {
        fn resolve(&self, hostname: &str) -> TrainingResult<String> {
            self.0
                .get(hostname)
                .map(|ip| (*ip).to_string())
                .ok_or_else(|| TrainingError::NotFound(hostname.to_string()))
        }
    }

    fn resolver() -> StaticResolver {
        StaticResolver(HashMap::from([("worker-1.cluster.local", "10.0.0.11"), ("node2", "10.0.0.12")]))
    }

    fn entry(ip: &str, slots: u32) -> HostfileEntry {
        HostfileEntry { ip_address: ip.to_string(), slots }
    }

    #[test]
    fn test_each_accepted_form() {
        let cases = [
            ("127.0.0.1", entry("127.0.0.1", 0)),
            ("192.168.1.20 slots=2", entry("192.168.1.20", 2)),
            ("10.1.1.1:16", entry("10.1.1.1", 16)),
            ("worker-1.cluster.local", entry("10.0.0.11", 0)),
            ("node2 slots=4", entry("10.0.0.12", 4)),
            ("node2:8", entry("10.0.0.12", 8)),
        ];
        for (line, expected) in cases {
            let parsed = parse_hostfile_str(line, &resolver()).unwrap();
            assert_eq!(parsed, vec![expected], "line: {line}");
        }
    }

    #[test]
    fn test_preserves_file_order_and_strips_trailing_space() {
        let contents = "10.0.0.2 slots=1  \nnode2:3\n127.0.0.1\n";
        let parsed = parse_hostfile_str(contents, &resolver()).unwrap();
        assert_eq!(parsed, vec![entry("10.0.0.2", 1), entry("10.0.0.12", 3), entry("127.0.0.1", 0)]);
        assert_eq!(host_list(&parsed), "10.0.0.2:1,10.0.0.12:3,127.0.0.1");
    }

    #[test]
    fn test_invalid_line_fails_whole_parse() {
        for bad in ["127.0.0.1 slots=123", "host name", "node2:", "-bad.host", "10.0.0.1 slots 2"] {
            let contents = format!("127.0.0.1\n{bad}\n");
            let err = parse_hostfile_str(&contents, &resolver()).unwrap_err();
            assert_eq!(err.to_string(), format!("invalid value: Invalid line in the hostfile: {bad}"));
        }
    }

    #[test]
    fn test_blank_line_is_invalid() {
        for contents in ["127.0.0.1\n\n10.0.0.2\n", "127.0.0.1\n   \n"] {
            let err = parse_hostfile_str(contents, &resolver()).unwrap_err();
            assert_eq!(err.to_string(), "invalid value: Invalid line in the hostfile: ");
        }
    }

    #[test]
    fn test_unresolvable_host_is_an_error() {
        let err = parse_hostfile_str("unknown-host", &resolver()).unwrap_err();
        assert!(matches!(err, TrainingError::NotFound(_)));
    }

    #[test]
    fn test_system_resolver_handles_localhost() {
        let ip = SystemResolver.resolve("localhost").unwrap();
        assert!(ip == "127.0.0.1" || ip == "::1");
    }
}
