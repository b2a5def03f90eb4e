//! Configuration access port.
//!
//! Values are raw strings; typing and validation happen once in
//! [`crate::domain::config_validation`].

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
}
