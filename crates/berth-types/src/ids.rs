//! Prefixed unique ids.
//!
//! Ids are opaque strings with a short type prefix so log lines and wire
//! payloads stay self-describing.

use uuid::Uuid;

pub fn session_id() -> String {
    format!("session_{}", Uuid::new_v4().simple())
}

pub fn context_id() -> String {
    format!("ctx_{}", Uuid::new_v4().simple())
}

pub fn page_id() -> String {
    format!("page_{}", Uuid::new_v4().simple())
}

pub fn instance_id() -> String {
    format!("browser_{}", Uuid::new_v4().simple())
}

pub fn endpoint_id() -> String {
    format!("proxy_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = session_id();
        let b = session_id();
        assert!(a.starts_with("session_"));
        assert_ne!(a, b);
        assert!(context_id().starts_with("ctx_"));
        assert!(page_id().starts_with("page_"));
        assert!(instance_id().starts_with("browser_"));
        assert!(endpoint_id().starts_with("proxy_"));
    }
}
