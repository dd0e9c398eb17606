//! Identifier checks for externally assigned ids.

/// Prefix every thread id issued by the assistant service carries.
pub const THREAD_ID_PREFIX: &str = "thread_";

const MAX_RESOURCE_ID_LEN: usize = 128;

/// Returns true when `id` looks like a thread id issued by the service
/// (`thread_` followed by one or more ASCII alphanumerics).
pub fn is_thread_id(id: &str) -> bool {
    id.strip_prefix(THREAD_ID_PREFIX).is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric())
    })
}

/// Returns true when `id` is safe to splice into an upstream URL path.
pub fn is_resource_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_RESOURCE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
