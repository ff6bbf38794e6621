//! Records kept on behalf of external collaborators.
//!
//! Plain keyed CRUD with one record per key, stored in backend collections
//! next to the element graph.

mod api_keys;
mod sniffer;

pub use sniffer::SnifferSession;

pub(crate) const SNIFFER_SESSIONS: &str = "sniffer_sessions";
pub(crate) const PUBLIC_API: &str = "public_api";
