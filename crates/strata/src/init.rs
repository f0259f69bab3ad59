//! Process-level setup.

/// Installs an `env_logger` logger configured from `RUST_LOG`.
///
/// Safe to call more than once; later calls keep the first logger. Returns
/// whether this call installed it.
pub fn init_logging() -> bool {
    let installed = env_logger::try_init().is_ok();
    if installed {
        log::debug!("strata logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        assert!(!init_logging());
    }
}
