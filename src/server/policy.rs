//! Secure-transport policy
//!
//! Decides, from the `Host` and `X-Forwarded-Proto` header values and the
//! request target alone, whether a request is redirected to `https` or
//! served. The decision is total: empty strings stand in for absent headers.

/// `Strict-Transport-Security` value attached to served responses
pub const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains; preload";

/// Header carrying the scheme seen by the upstream TLS terminator
pub const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Host fragments that mark a development request
const LOCAL_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Outcome of the secure-transport policy for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Serve the resource with hardening headers
    ServeSecure,
    /// Answer 301 with this `Location`
    RedirectToHttps { location: String },
}

/// Whether the `Host` value names the local machine
///
/// Substring match, so `localhost:8000` and `127.0.0.1:3000` qualify.
pub fn is_local_host(host: &str) -> bool {
    LOCAL_HOSTS.iter().any(|local| host.contains(local))
}

/// Whether the upstream terminator saw plain http
pub fn is_forwarded_insecure(forwarded_proto: &str) -> bool {
    forwarded_proto == "http"
}

/// Apply the policy to one request
///
/// `target` is the path and query exactly as received; it is appended to the
/// redirect location unchanged.
pub fn decide(host: &str, forwarded_proto: &str, target: &str) -> Decision {
    if is_forwarded_insecure(forwarded_proto) || !is_local_host(host) {
        Decision::RedirectToHttps {
            location: format!("https://{}{}", host, target),
        }
    } else {
        Decision::ServeSecure
    }
}
