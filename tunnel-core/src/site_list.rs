//! Byte trie used as a domain matcher, in one of three modes.
//!
//! `Direct` and `Tunnel` both normalize a hostname to its last two
//! dot-separated labels before inserting/looking up, so `www.a.com`,
//! `x.a.com`, and `a.com` all land on the same trie entry. `DirectSuffixes`
//! instead inserts patterns reversed and walks lookups right-to-left, so
//! `.cn` matches any host ending in `.cn`.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// Sites in the list don't use the tunnel.
    Direct,
    /// Hosts with these suffixes don't use the tunnel.
    DirectSuffixes,
    /// Sites in the list use the tunnel.
    Tunnel,
}

#[derive(Default)]
struct Node {
    children: Option<HashMap<u8, Node>>,
}

impl Node {
    fn is_terminal(&self) -> bool {
        self.children.is_none()
    }
}

pub struct SiteList {
    mode: ListMode,
    root: Node,
}

impl SiteList {
    pub fn new<I, S>(mode: ListMode, sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = SiteList {
            mode,
            root: Node::default(),
        };
        list.add(sites);
        list
    }

    pub fn add<I, S>(&mut self, sites: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for site in sites {
            let site = site.as_ref();
            match self.mode {
                ListMode::DirectSuffixes => self.add_suffix(site),
                ListMode::Direct | ListMode::Tunnel => {
                    let normalized = Self::exclude_subdomain(site);
                    Self::insert(&mut self.root, normalized.bytes());
                }
            }
        }
    }

    pub fn contains(&self, host: &str) -> bool {
        match self.mode {
            ListMode::DirectSuffixes => self.contains_suffix(host),
            ListMode::Direct | ListMode::Tunnel => {
                let normalized = Self::exclude_subdomain(host);
                Self::walk(&self.root, normalized.bytes())
            }
        }
    }

    /// Keep the substring after the second-to-last dot; if there are
    /// fewer than two dots, the host is returned unchanged.
    fn exclude_subdomain(site: &str) -> &str {
        let Some(last_dot) = site.rfind('.') else {
            return site;
        };
        match site[..last_dot].rfind('.') {
            Some(second_last) => &site[second_last + 1..],
            None => site,
        }
    }

    fn add_suffix(&mut self, suffix: &str) {
        Self::insert(&mut self.root, suffix.bytes().rev());
    }

    fn insert(mut curr: &mut Node, bytes: impl Iterator<Item = u8>) {
        for b in bytes {
            let children = curr.children.get_or_insert_with(HashMap::new);
            curr = children.entry(b).or_insert_with(Node::default);
        }
    }

    fn walk(mut curr: &Node, bytes: impl Iterator<Item = u8>) -> bool {
        for b in bytes {
            if curr.is_terminal() {
                return false;
            }
            match curr.children.as_ref().unwrap().get(&b) {
                Some(next) => curr = next,
                None => return false,
            }
        }
        curr.is_terminal()
    }

    fn contains_suffix(&self, site: &str) -> bool {
        let mut curr = &self.root;
        for b in site.bytes().rev() {
            if curr.is_terminal() {
                return true;
            }
            match curr.children.as_ref().unwrap().get(&b) {
                Some(next) => curr = next,
                None => return false,
            }
        }
        curr.is_terminal()
    }
}
