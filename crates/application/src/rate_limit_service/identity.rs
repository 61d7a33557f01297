use std::net::IpAddr;

/// Picks the identifier a request is rate limited under.
///
/// An authenticated principal wins. Otherwise the first entry of a
/// proxy-forwarded address list is used, then the peer address.
#[must_use]
pub fn resolve_rate_limit_identifier(
    principal: Option<&str>,
    forwarded_for: Option<&str>,
    peer_address: Option<IpAddr>,
) -> String {
    if let Some(principal) = principal.map(str::trim).filter(|value| !value.is_empty()) {
        return format!("user:{principal}");
    }

    let forwarded_address = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match (forwarded_address, peer_address) {
        (Some(address), _) => format!("ip:{address}"),
        (None, Some(address)) => format!("ip:{address}"),
        (None, None) => "ip:unknown".to_owned(),
    }
}
