//! Typed access to sectioned key/value configuration.

/// Lookups return `default` when the key is missing or does not parse.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    fn has_key(&self, section: &str, key: &str) -> bool {
        self.get_string(section, key).is_some()
    }
}
