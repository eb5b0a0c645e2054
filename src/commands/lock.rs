//! Lock table queries

use crate::config::{load_rule_set, Config};
use crate::types::{LockError, LockTable};

/// Load the lock table named by the configuration
pub fn load_lock_table(config: &Config) -> Result<LockTable, LockError> {
    let spec_path = config.locate_spec()?;
    Ok(load_rule_set(&spec_path)?.lock)
}

/// Value of one key, `None` when the key is not declared
pub fn get(config: &Config, key: &str) -> Result<Option<String>, LockError> {
    Ok(load_lock_table(config)?.get(key).map(str::to_string))
}

/// `KEY = value` lines sorted by key
///
/// Multi-line values are written escaped so every entry stays on one line.
pub fn format_list(table: &LockTable) -> String {
    table
        .iter()
        .map(|(key, value)| {
            if value.contains(['\n', '\r']) {
                format!("{} = {:?}\n", key, value)
            } else {
                format!("{} = {}\n", key, value)
            }
        })
        .collect()
}
