//! LAN address discovery

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use devport_core::prelude::*;

/// Supplies the address other devices on the network reach this machine by
pub trait AddressResolver: Send + Sync {
    fn lan_address(&self) -> String;
}

/// Uses the local address the OS routes outbound traffic from
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAddressResolver;

impl AddressResolver for SystemAddressResolver {
    fn lan_address(&self) -> String {
        match routed_local_address() {
            Some(ip) => ip.to_string(),
            None => {
                debug!("No routable LAN address, using loopback");
                Ipv4Addr::LOCALHOST.to_string()
            }
        }
    }
}

/// Connecting a UDP socket only selects a route; nothing is sent
fn routed_local_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// Always reports the same address
#[derive(Debug, Clone)]
pub struct FixedAddressResolver(pub String);

impl AddressResolver for FixedAddressResolver {
    fn lan_address(&self) -> String {
        self.0.clone()
    }
}
