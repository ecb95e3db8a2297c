//! API key validation (spec.md §4.11 step 5).
//!
//! Checked in order: `X-API-Key` header, then `Authorization: Bearer <key>`,
//! then `?api_key=` query parameter. A mismatch on one mechanism falls
//! through to the next rather than rejecting outright — a stale `X-API-Key`
//! alongside a valid bearer token or query key still authorizes. Routes with
//! `requires_auth == false` never call this; an empty configured key
//! disables enforcement entirely (handled by the caller in `mod.rs`, not
//! here).

use super::http::Request;

const BEARER_PREFIX: &str = "Bearer ";

pub fn is_authorized(request: &Request, api_key: &str) -> bool {
    if let Some(header_key) = request.header("x-api-key")
        && header_key == api_key
    {
        return true;
    }
    if let Some(auth_header) = request.header("authorization")
        && let Some(token) = auth_header.strip_prefix(BEARER_PREFIX)
        && token == api_key
    {
        return true;
    }
    if let Some(query_key) = request.query_param("api_key")
        && query_key == api_key
    {
        return true;
    }
    false
}
