//! Built-in device plugins
//!
//! Each submodule configures the core primitives for one device family.

pub mod adeunis;
pub mod decentlab;
pub mod gwf;

use crate::plugin::DecoderPlugin;

/// All built-in plugins, one per device type
pub fn builtin_plugins() -> Vec<Box<dyn DecoderPlugin>> {
    vec![
        Box::new(gwf::GwfCoder),
        Box::new(decentlab::Kl66),
        Box::new(decentlab::Pr26),
        Box::new(adeunis::Ftd2),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_device_types_are_unique() {
        let plugins = builtin_plugins();
        let types: HashSet<_> = plugins.iter().map(|p| p.device_type()).collect();
        assert_eq!(types.len(), plugins.len());
        assert!(types.contains("gwf-coder"));
        assert!(types.contains("adeunis-ftd2"));
    }
}
