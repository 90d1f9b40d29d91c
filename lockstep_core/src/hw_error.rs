//! Maps `Box<dyn Error>` from trait boundaries to typed `SyncError`.
//!
//! The traits in `lockstep_traits` use `Box<dyn Error + Send + Sync>` so any
//! peripheral can plug in; this module converts those errors to our typed
//! enum, with an optional feature-gated path for `lockstep_hardware::HwError`
//! downcasting.

use crate::error::SyncError;
use lockstep_traits::FrameError;

/// Map a trait-boundary error to a typed `SyncError`.
///
/// Known error types are downcast first, then string heuristics apply.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> SyncError {
    if let Some(frame) = e.downcast_ref::<FrameError>() {
        return SyncError::MalformedFrame(frame.to_string());
    }

    #[cfg(feature = "hardware-errors")]
    {
        use lockstep_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => SyncError::Timeout,
                HwError::Frame(msg) => SyncError::MalformedFrame(msg.clone()),
                other => SyncError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        SyncError::Timeout
    } else {
        SyncError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_traits::BoxError;

    #[test]
    fn frame_errors_are_malformed() {
        let e: BoxError = Box::new(FrameError::UnknownStatus(7));
        assert!(matches!(map_hw_error(&*e), SyncError::MalformedFrame(_)));
    }

    #[test]
    fn timeout_text_is_recognized() {
        let e: BoxError = "i2c read timed out".into();
        assert_eq!(map_hw_error(&*e), SyncError::Timeout);
    }

    #[test]
    fn other_text_is_generic_hardware() {
        let e: BoxError = "nack".into();
        assert_eq!(map_hw_error(&*e), SyncError::Hardware("nack".into()));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_timeout_downcasts() {
        let e: BoxError = Box::new(lockstep_hardware::error::HwError::Timeout);
        assert_eq!(map_hw_error(&*e), SyncError::Timeout);
    }
}
