#[allow(dead_code)]
pub mod fake_device;

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Route the crate's log output to stderr at trace level.
///
/// Every test calls this, only the first call installs the logger.
pub fn setup_logger() {
    INIT_LOGGER.call_once(|| {
        let logger = flexi_logger::Logger::try_with_env_or_str("trace")
            .and_then(|logger| logger.log_to_stderr().start());
        match logger {
            Ok(handle) => std::mem::forget(handle),
            Err(err) => eprintln!("Unable to start the test logger: {}", err),
        }
    });
}
