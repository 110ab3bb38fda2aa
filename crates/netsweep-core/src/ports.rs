//! TCP port lists

/// Ports probed when the caller gives none
pub const DEFAULT_PORTS: [u16; 15] = [
    21, 22, 23, 25, 53, 80, 110, 139, 143, 443, 445, 3306, 3389, 5432, 8080,
];

/// Parse a comma-separated port list such as `"22, 80,443"`.
///
/// Tokens that are not a valid TCP port are skipped rather than reported.
/// Input order is kept and duplicates are not removed.
pub fn parse_ports(spec: &str) -> Vec<u16> {
    spec.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse::<u16>().ok())
        .filter(|&port| port != 0)
        .collect()
}

/// Fall back to [`DEFAULT_PORTS`] for an empty or absent list
pub fn ports_or_default(ports: Option<Vec<u16>>) -> Vec<u16> {
    match ports {
        Some(ports) if !ports.is_empty() => ports,
        _ => DEFAULT_PORTS.to_vec(),
    }
}
