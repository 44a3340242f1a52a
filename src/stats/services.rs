/// Well-known service name for a destination port.
pub fn service(port: u16) -> Option<&'static str> {
    Some(match port {
        20      => "FTP-Data",
        21      => "FTP",
        22      => "SSH",
        23      => "Telnet",
        25      => "SMTP",
        53      => "DNS",
        67 | 68 => "DHCP",
        80      => "HTTP",
        110     => "POP3",
        123     => "NTP",
        143     => "IMAP",
        443     => "HTTPS",
        445     => "SMB",
        3306    => "MySQL",
        3389    => "RDP",
        5432    => "PostgreSQL",
        6379    => "Redis",
        8080    => "HTTP-Alt",
        _       => return None,
    })
}
