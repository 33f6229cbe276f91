//! Local address discovery for the "share this address" greeting.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::debug;

/// Public address used only to select the outbound interface.
/// Connecting a UDP socket sends no packets.
const PROBE_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 9);

/// Best guess at this host's LAN IPv4 address.
///
/// Returns `0.0.0.0` when no non-loopback IPv4 route exists.
pub async fn local_ipv4() -> Ipv4Addr {
    match probe().await {
        Ok(Some(ip)) => ip,
        Ok(None) => Ipv4Addr::UNSPECIFIED,
        Err(error) => {
            debug!(%error, "local address discovery failed");
            Ipv4Addr::UNSPECIFIED
        }
    }
}

async fn probe() -> std::io::Result<Option<Ipv4Addr>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.connect(PROBE_ADDR).await?;
    Ok(usable(socket.local_addr()?.ip()))
}

/// Keep only non-loopback, specified IPv4 addresses.
fn usable(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn loopback_is_not_usable() {
        assert_eq!(usable(IpAddr::V4(Ipv4Addr::LOCALHOST)), None);
    }

    #[test]
    fn ipv6_is_not_usable() {
        assert_eq!(usable(IpAddr::V6(Ipv6Addr::LOCALHOST)), None);
    }

    #[test]
    fn lan_address_is_usable() {
        let ip = Ipv4Addr::new(192, 168, 1, 20);
        assert_eq!(usable(IpAddr::V4(ip)), Some(ip));
    }

    #[tokio::test]
    async fn discovery_never_returns_loopback() {
        // Offline hosts fall back to 0.0.0.0.
        assert!(!local_ipv4().await.is_loopback());
    }
}
