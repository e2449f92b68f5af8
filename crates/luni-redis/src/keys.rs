// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key layout in the remote namespace.
//!
//! ```text
//! <ns>:sess:<client>:<channel>:<session>           session base
//! <ns>:sess:<client>:<channel>:<session>:ctx       session hash
//! <ns>:sess:<client>:<channel>:<session>:msgs      message list, newest first
//! <ns>:sess:<client>:<channel>:<session>:locks:<n> lock token
//! <ns>:client:<client>                             client -> session id
//! <ns>:sess:id:<session>                           session id -> base
//! <ns>:foco:<client>:ctx                           focus hash
//! ```

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
    channel: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            channel: channel.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn session_base(&self, client_id: &str, session_id: &str) -> String {
        format!(
            "{}:sess:{client_id}:{}:{session_id}",
            self.namespace, self.channel
        )
    }

    pub fn client_index(&self, client_id: &str) -> String {
        format!("{}:client:{client_id}", self.namespace)
    }

    pub fn session_index(&self, session_id: &str) -> String {
        format!("{}:sess:id:{session_id}", self.namespace)
    }

    pub fn focus(&self, client_id: &str) -> String {
        format!("{}:foco:{client_id}:ctx", self.namespace)
    }
}

pub fn ctx_key(base: &str) -> String {
    format!("{base}:ctx")
}

pub fn msgs_key(base: &str) -> String {
    format!("{base}:msgs")
}

pub fn lock_key(base: &str, name: &str) -> String {
    format!("{base}:locks:{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let keys = KeySpace::new("luni", "default");
        let base = keys.session_base("acme", "sess_1_abc");
        assert_eq!(base, "luni:sess:acme:default:sess_1_abc");
        assert_eq!(ctx_key(&base), "luni:sess:acme:default:sess_1_abc:ctx");
        assert_eq!(msgs_key(&base), "luni:sess:acme:default:sess_1_abc:msgs");
        assert_eq!(lock_key(&base, "reply"), "luni:sess:acme:default:sess_1_abc:locks:reply");
        assert_eq!(keys.client_index("acme"), "luni:client:acme");
        assert_eq!(keys.session_index("sess_1_abc"), "luni:sess:id:sess_1_abc");
        assert_eq!(keys.focus("acme"), "luni:foco:acme:ctx");
    }

    #[test]
    fn channel_and_namespace_are_configurable() {
        let keys = KeySpace::new("staging", "whatsapp");
        assert_eq!(keys.session_base("c", "s"), "staging:sess:c:whatsapp:s");
        assert_eq!(keys.namespace(), "staging");
    }
}
