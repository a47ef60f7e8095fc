//! Maps `Box<dyn Error>` from trait boundaries to typed `LockError`.
//!
//! The traits in `weighlock_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `weighlock_hardware::HwError` downcasting.

use crate::error::LockError;

/// Map a trait-boundary error to a typed `LockError`.
///
/// Known hardware error types are downcast first, then the message is
/// inspected as a fallback.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> LockError {
    #[cfg(feature = "hardware-errors")]
    {
        use weighlock_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::DataReadyTimeout => {
                    LockError::Timeout("load cell data")
                }
                other => LockError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        LockError::Timeout("hardware")
    } else {
        LockError::Hardware(s)
    }
}

/// Box-to-report bridge used at every trait call site.
pub(crate) fn hw_report(e: &(dyn std::error::Error + Send + Sync + 'static)) -> eyre::Report {
    eyre::Report::new(map_hw_error(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Plain(&'static str);

    impl std::fmt::Display for Plain {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for Plain {}

    #[test]
    fn message_fallback() {
        assert_eq!(
            map_hw_error(&Plain("GPIO read timeout")),
            LockError::Timeout("hardware")
        );
        assert_eq!(
            map_hw_error(&Plain("bus glitch")),
            LockError::Hardware("bus glitch".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hw_errors() {
        use weighlock_hardware::error::HwError;
        assert_eq!(
            map_hw_error(&HwError::DataReadyTimeout),
            LockError::Timeout("load cell data")
        );
        assert!(matches!(
            map_hw_error(&HwError::PoweredDown),
            LockError::HardwareFault(_)
        ));
    }
}
