use std::convert::Infallible;
use std::str::FromStr;
use super::PacketRecord;

/// Display filter over decoded records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    Any,
    Protocol(String),
    SourceIp(String),
    DestIp(String),
    SourcePort(u16),
    DestPort(u16),
    Text(String),
}

impl Filter {
    pub fn matches(&self, rec: &PacketRecord) -> bool {
        match self {
            Filter::Any             => true,
            Filter::Protocol(p)     => contains(&rec.protocol, p),
            Filter::SourceIp(ip)    => rec.src_ip.contains(ip.as_str()),
            Filter::DestIp(ip)      => rec.dst_ip.contains(ip.as_str()),
            Filter::SourcePort(n)   => rec.src_port == *n,
            Filter::DestPort(n)     => rec.dst_port == *n,
            Filter::Text(s)         => {
                contains(&rec.protocol, s)
                    || contains(&rec.src_ip, s)
                    || contains(&rec.dst_ip, s)
                    || rec.src_port.to_string().contains(s.as_str())
                    || rec.dst_port.to_string().contains(s.as_str())
            }
        }
    }
}

fn contains(field: &str, needle: &str) -> bool {
    field.to_lowercase().contains(&needle.to_lowercase())
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Any
    }
}

impl FromStr for Filter {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let port = |v: &str, f: fn(u16) -> Filter| {
            v.trim().parse().map(f).unwrap_or(Filter::Any)
        };

        let (kind, value) = match s.split_once(':') {
            Some((kind, value)) => (kind, value.trim()),
            None                => ("", s),
        };

        Ok(match kind {
            _ if s.is_empty() => Filter::Any,
            "proto"           => Filter::Protocol(value.to_owned()),
            "src"             => Filter::SourceIp(value.to_owned()),
            "dst"             => Filter::DestIp(value.to_owned()),
            "sport"           => port(value, Filter::SourcePort),
            "dport"           => port(value, Filter::DestPort),
            _                 => Filter::Text(s.to_owned()),
        })
    }
}
