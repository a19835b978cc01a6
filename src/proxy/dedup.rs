//! Deduplication of subscription definitions
//!
//! Collapses a raw definition list to one entry per `server:port` and makes
//! every surviving `name` unique and non-empty.

use crate::proxy::models::ProxyDefinition;
use std::collections::{HashMap, HashSet};

/// Prefix for definitions that arrive without a usable name
pub const FALLBACK_NAME_PREFIX: &str = "节点_";

/// Collapse `proxies` to one entry per `server:port`.
///
/// A later definition with the same key replaces the earlier one in place,
/// so the output keeps first-appearance order but last-write contents.
/// Definitions without a `server` are dropped.
pub fn deduplicate(proxies: Vec<ProxyDefinition>) -> Vec<ProxyDefinition> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ProxyDefinition> = Vec::with_capacity(proxies.len());

    for proxy in proxies {
        let Some(key) = proxy.dedup_key() else {
            continue;
        };

        match positions.get(&key) {
            Some(&index) => unique[index] = proxy,
            None => {
                positions.insert(key, unique.len());
                unique.push(proxy);
            }
        }
    }

    assign_unique_names(&mut unique);
    unique
}

/// Give every definition a non-empty name that no other definition carries.
///
/// Colliding names get `_1`, `_2`, ... appended in order of appearance.
pub fn assign_unique_names(proxies: &mut [ProxyDefinition]) {
    let mut taken: HashSet<String> = HashSet::with_capacity(proxies.len());
    let mut suffixes: HashMap<String, usize> = HashMap::new();

    for (index, proxy) in proxies.iter_mut().enumerate() {
        let base = match proxy.name() {
            Some(name) => name.to_string(),
            None => format!("{}{}", FALLBACK_NAME_PREFIX, index),
        };

        let mut name = base.clone();
        while taken.contains(&name) {
            let counter = suffixes.entry(base.clone()).or_insert(0);
            *counter += 1;
            name = format!("{}_{}", base, counter);
        }

        if proxy.name() != Some(name.as_str()) {
            proxy.set_name(name.clone());
        }
        taken.insert(name);
    }
}
