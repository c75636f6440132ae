//! Username/password table for SOCKS5 `USERNAME_PASSWORD` authentication.
//!
//! Configured once at startup and never mutated afterwards — reads need
//! no locking.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct UserPass(HashMap<String, String>);

impl UserPass {
    pub fn new(entries: HashMap<String, String>) -> Self {
        UserPass(entries)
    }

    pub fn size(&self) -> usize {
        self.0.len()
    }

    pub fn verify(&self, user: &str, pass: &str) -> bool {
        self.0.get(user).map(|p| p == pass).unwrap_or(false)
    }

    /// Pick an arbitrary configured credential, for the client side's
    /// "offer the one set of creds we have" behavior.
    pub fn one(&self) -> Option<(&str, &str)> {
        self.0.iter().next().map(|(u, p)| (u.as_str(), p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_known_credential() {
        let up = UserPass::new(HashMap::from([("alice".to_string(), "wonderland".to_string())]));
        assert!(up.verify("alice", "wonderland"));
        assert!(!up.verify("alice", "wrong"));
        assert!(!up.verify("bob", "wonderland"));
    }

    #[test]
    fn empty_table_has_no_credentials() {
        let up = UserPass::default();
        assert_eq!(up.size(), 0);
        assert!(up.one().is_none());
    }
}
