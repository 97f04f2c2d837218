//! LIFX LAN backend. Only the SetColor message is implemented; addresses
//! come from configuration, not discovery.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use super::Light;
use crate::{ColorHsb, Result, SeeingSoundError};

/// UDP port LIFX bulbs listen on.
pub const LIFX_PORT: u16 = 56_700;

const HEADER_LEN: usize = 36;
const SET_COLOR_PAYLOAD_LEN: usize = 13;
const SET_COLOR_LEN: usize = HEADER_LEN + SET_COLOR_PAYLOAD_LEN;
const MSG_SET_COLOR: u16 = 102;
const PROTOCOL: u16 = 1024;
const ADDRESSABLE: u16 = 1 << 12;
const TAGGED: u16 = 1 << 13;

/// Builds a SetColor packet addressed to every device (zero target) with no
/// acknowledgement requested.
pub fn set_color_packet(
    source: u32,
    sequence: u8,
    color: &ColorHsb,
    kelvin: u16,
    duration_ms: u32,
) -> [u8; SET_COLOR_LEN] {
    let mut packet = [0u8; SET_COLOR_LEN];

    // Frame header
    packet[0..2].copy_from_slice(&(SET_COLOR_LEN as u16).to_le_bytes());
    packet[2..4].copy_from_slice(&(PROTOCOL | ADDRESSABLE | TAGGED).to_le_bytes());
    packet[4..8].copy_from_slice(&source.to_le_bytes());

    // Frame address: target (8) + reserved (6) zeroed, flags zero.
    packet[23] = sequence;

    // Protocol header: reserved (8), type, reserved (2).
    packet[32..34].copy_from_slice(&MSG_SET_COLOR.to_le_bytes());

    // Payload: reserved byte, HSBK, transition duration.
    packet[37..39].copy_from_slice(&color.hue.to_le_bytes());
    packet[39..41].copy_from_slice(&color.saturation.to_le_bytes());
    packet[41..43].copy_from_slice(&color.brightness.to_le_bytes());
    packet[43..45].copy_from_slice(&kelvin.to_le_bytes());
    packet[45..49].copy_from_slice(&duration_ms.to_le_bytes());

    packet
}

/// A single bulb reached by unicast UDP.
#[derive(Debug)]
pub struct LifxLight {
    socket: Arc<UdpSocket>,
    addr: SocketAddr,
    label: String,
    source: u32,
    sequence: u8,
}

impl LifxLight {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Light for LifxLight {
    fn label(&self) -> &str {
        &self.label
    }

    fn set_color(&mut self, color: &ColorHsb, kelvin: u16) -> Result<()> {
        let packet = set_color_packet(self.source, self.sequence, color, kelvin, 0);
        self.sequence = self.sequence.wrapping_add(1);

        self.socket
            .send_to(&packet, self.addr)
            .map_err(|err| SeeingSoundError::Light {
                light: self.label.clone(),
                reason: err.to_string(),
            })?;
        Ok(())
    }
}

/// Resolves each address (`ip`, `ip:port`, `host` or `host:port`) and
/// returns one light per address, all sharing one socket.
pub fn connect_lifx(addresses: &[String]) -> Result<Vec<Box<dyn Light>>> {
    let socket = Arc::new(UdpSocket::bind("0.0.0.0:0")?);
    let source = std::process::id().max(2);

    let mut lights: Vec<Box<dyn Light>> = Vec::with_capacity(addresses.len());
    for address in addresses {
        let addr = resolve(address)?;
        tracing::info!(light = %address, %addr, "LIFX light configured");
        lights.push(Box::new(LifxLight {
            socket: socket.clone(),
            addr,
            label: address.clone(),
            source,
            sequence: 0,
        }));
    }
    Ok(lights)
}

fn resolve(address: &str) -> Result<SocketAddr> {
    let address = address.trim();
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, LIFX_PORT));
    }

    let resolved = if address.contains(':') {
        address.to_socket_addrs()
    } else {
        (address, LIFX_PORT).to_socket_addrs()
    };
    resolved
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| {
            SeeingSoundError::invalid_config(format!("cannot resolve light address `{address}`"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_color_packet_layout() {
        let color = ColorHsb::new(0x1234, 0xABCD, 0x0102);
        let packet = set_color_packet(0xDEADBEEF, 7, &color, 3_500, 250);

        assert_eq!(packet.len(), 49);
        assert_eq!(u16::from_le_bytes([packet[0], packet[1]]), 49);
        // protocol 1024, addressable, tagged
        assert_eq!(u16::from_le_bytes([packet[2], packet[3]]), 0x3400);
        assert_eq!(u32::from_le_bytes(packet[4..8].try_into().unwrap()), 0xDEADBEEF);
        assert!(packet[8..22].iter().all(|b| *b == 0));
        assert_eq!(packet[22], 0, "no ack or response requested");
        assert_eq!(packet[23], 7);
        assert_eq!(u16::from_le_bytes([packet[32], packet[33]]), 102);
        assert_eq!(packet[36], 0);
        assert_eq!(u16::from_le_bytes([packet[37], packet[38]]), 0x1234);
        assert_eq!(u16::from_le_bytes([packet[39], packet[40]]), 0xABCD);
        assert_eq!(u16::from_le_bytes([packet[41], packet[42]]), 0x0102);
        assert_eq!(u16::from_le_bytes([packet[43], packet[44]]), 3_500);
        assert_eq!(u32::from_le_bytes(packet[45..49].try_into().unwrap()), 250);
    }

    #[test]
    fn resolves_bare_ip_to_default_port() {
        assert_eq!(
            resolve("192.168.1.20").unwrap(),
            "192.168.1.20:56700".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve(" 10.0.0.5:9000 ").unwrap(),
            "10.0.0.5:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn bulb_receives_set_color() {
        let bulb = UdpSocket::bind("127.0.0.1:0").unwrap();
        bulb.set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let address = bulb.local_addr().unwrap().to_string();

        let mut lights = connect_lifx(&[address]).unwrap();
        let color = ColorHsb::new(100, 200, 300);
        lights[0].set_color(&color, 3_500).unwrap();
        lights[0].set_color(&color, 3_500).unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = bulb.recv_from(&mut buf).unwrap();
        assert_eq!(len, 49);
        assert_eq!(buf[23], 0);
        let (_, _) = bulb.recv_from(&mut buf).unwrap();
        assert_eq!(buf[23], 1, "sequence advances per write");
    }
}
