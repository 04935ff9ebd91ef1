use crate::error::SessionError;
use crate::protocol::{AddressType, RSV, ReplyCode, Version};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Host is the DST.ADDR of a request: a domain name still to be
/// resolved, or a literal IP address. Domain names are kept as the raw
/// octets the client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Domain(Vec<u8>),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
}

/// TargetEndpoint represents the address and port a client asked
/// the proxy to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEndpoint {
    pub host: Host,
    pub port: u16,
}

impl TargetEndpoint {
    /// address_type returns the ATYP tag this endpoint was decoded from
    pub fn address_type(&self) -> AddressType {
        match self.host {
            Host::Domain(_) => AddressType::DomainName,
            Host::Ipv4(_) => AddressType::IPv4,
            Host::Ipv6(_) => AddressType::IPv6,
        }
    }
}

impl fmt::Display for TargetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Domain(name) => write!(f, "{}:{}", String::from_utf8_lossy(name), self.port),
            Host::Ipv4(ip) => write!(f, "{ip}:{}", self.port),
            Host::Ipv6(ip) => write!(f, "[{ip}]:{}", self.port),
        }
    }
}

/// encoded_len inspects a buffer starting at the ATYP byte and returns
/// the address type along with the total number of bytes the address
/// field occupies, ATYP and port included. Returns `Ok(None)` while the
/// buffer is too short to tell.
pub fn encoded_len(buf: &[u8]) -> Result<Option<(AddressType, usize)>, SessionError> {
    let Some(&atyp) = buf.first() else {
        return Ok(None);
    };

    let addr_type = AddressType::from_byte(atyp).ok_or_else(|| {
        SessionError::MalformedAddress(format!("unknown address type {atyp:#04x}"))
    })?;

    let len = match addr_type {
        // ATYP + 4 octets + port
        AddressType::IPv4 => 1 + 4 + 2,
        // ATYP + 16 octets + port
        AddressType::IPv6 => 1 + 16 + 2,
        // ATYP + length octet + name + port
        AddressType::DomainName => match buf.get(1) {
            Some(&name_len) => 1 + 1 + name_len as usize + 2,
            None => return Ok(None),
        },
    };

    Ok(Some((addr_type, len)))
}

/// decode parses an ATYP-tagged address followed by a big-endian port.
/// `buf` starts at the ATYP byte; the returned count includes it.
/// Domain names are not checked at all, not even for UTF-8; resolution
/// does that.
pub fn decode(buf: &[u8]) -> Result<(TargetEndpoint, usize), SessionError> {
    let (addr_type, needed) = encoded_len(buf)?
        .ok_or_else(|| SessionError::MalformedAddress("address field truncated".into()))?;

    if buf.len() < needed {
        return Err(SessionError::MalformedAddress(format!(
            "address field truncated: need {needed} bytes, have {}",
            buf.len()
        )));
    }

    // Address bytes sit between the header and the trailing port
    let port_start = needed - 2;

    let host = match addr_type {
        AddressType::IPv4 => {
            let octets: [u8; 4] = buf[1..port_start]
                .try_into()
                .map_err(|_| SessionError::MalformedAddress("invalid IPv4 bytes".into()))?;
            Host::Ipv4(Ipv4Addr::from(octets))
        }
        AddressType::IPv6 => {
            let octets: [u8; 16] = buf[1..port_start]
                .try_into()
                .map_err(|_| SessionError::MalformedAddress("invalid IPv6 bytes".into()))?;
            Host::Ipv6(Ipv6Addr::from(octets))
        }
        // Skip the length octet
        AddressType::DomainName => Host::Domain(buf[2..port_start].to_vec()),
    };

    // Grab port -> BigEndian (network order)
    let port = u16::from_be_bytes([buf[port_start], buf[port_start + 1]]);

    Ok((TargetEndpoint { host, port }, needed))
}

/// encode_reply builds a complete server reply carrying `bound` as
/// BND.ADDR/BND.PORT. IPv4 and IPv4-mapped IPv6 addresses use the fixed
/// IPv4 form; any other IPv6 address is sent with ATYP 0x04.
pub fn encode_reply(reply_code: ReplyCode, bound: SocketAddr) -> Vec<u8> {
    // Build initial reply vec
    let mut reply = Vec::with_capacity(22);
    reply.extend_from_slice(&[Version::SOCKS5 as u8, reply_code as u8, RSV]);

    let ip = match bound.ip() {
        IpAddr::V6(ip) => ip.to_ipv4_mapped().map_or(IpAddr::V6(ip), IpAddr::V4),
        ip => ip,
    };

    match ip {
        IpAddr::V4(ip) => {
            reply.push(AddressType::IPv4 as u8);
            reply.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            reply.push(AddressType::IPv6 as u8);
            reply.extend_from_slice(&ip.octets());
        }
    }

    reply.extend_from_slice(&bound.port().to_be_bytes());
    reply
}
