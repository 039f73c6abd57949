uniffi::setup_scaffolding!();

pub use setwise;

/// Version of the bundled core library.
#[uniffi::export]
pub fn library_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_crate_version() {
        assert_eq!(library_version(), "0.1.0");
    }
}
