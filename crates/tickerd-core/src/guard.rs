//! Loopback origin check for config-mutation endpoints.

use std::net::IpAddr;

/// True when the caller connects from the local machine.
///
/// Covers 127.0.0.0/8, `::1`, and IPv4-mapped loopback (`::ffff:127.0.0.1`),
/// which dual-stack listeners report for local IPv4 clients.
pub fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("127.0.0.1", true)]
    #[case("127.0.0.53", true)]
    #[case("::1", true)]
    #[case("::ffff:127.0.0.1", true)]
    #[case("192.168.1.10", false)]
    #[case("10.0.0.1", false)]
    #[case("2001:db8::1", false)]
    fn loopback_detection(#[case] addr: &str, #[case] local: bool) {
        let ip: IpAddr = addr.parse().unwrap();
        assert_eq!(is_loopback(ip), local);
    }
}
