//! Classification of cluster error replies.
//!
//! - `MOVED <slot> <host>:<port>` - slot now lives elsewhere
//! - `ASK <slot> <host>:<port>` - slot is migrating, ask once
//! - `CLUSTERDOWN ...` - cluster cannot serve the slot
//! - `CROSSSLOT ...` - keys hash to different slots

use crate::Error;

/// Turns an error reply into a typed [`Error`].
///
/// Unrecognised or malformed replies become [`Error::Server`].
pub(crate) fn parse_redis_error(error_msg: &[u8]) -> Error {
    let msg = String::from_utf8_lossy(error_msg);
    let msg = msg.trim();

    if let Some((slot, address)) = msg.strip_prefix("MOVED ").and_then(parse_redirect) {
        return Error::Moved { slot, address };
    }
    if let Some((slot, address)) = msg.strip_prefix("ASK ").and_then(parse_redirect) {
        return Error::Ask { slot, address };
    }
    if msg.starts_with("CLUSTERDOWN") {
        return Error::ClusterDown;
    }
    if msg.starts_with("CROSSSLOT") {
        return Error::CrossSlot;
    }

    Error::Server {
        message: msg.to_string(),
    }
}

/// Parses `"<slot> <host>:<port>"`.
fn parse_redirect(args: &str) -> Option<(u16, String)> {
    let mut parts = args.split_whitespace();
    let slot = parts.next()?.parse::<u16>().ok()?;
    let address = parts.next()?;
    if parts.next().is_some() || !address.contains(':') {
        return None;
    }
    Some((slot, address.to_string()))
}
