use std::time::{Duration, Instant};

use weighlock_traits::Level;

use crate::error::{HwError, Result};

/// Poll `level` until it reports `want`, or fail once `timeout` expires.
/// Sleeps `poll_interval` between polls to avoid CPU spinning.
pub fn wait_for_level_with_timeout(
    mut level: impl FnMut() -> Level,
    want: Level,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while level() != want {
        if Instant::now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

/// Sign-extend a 24-bit two's complement HX711 conversion into an `i32`.
#[inline]
pub fn sign_extend_24(value: u32) -> i32 {
    let v = (value & 0x00FF_FFFF) as i32;
    if v & 0x0080_0000 != 0 {
        v | !0x00FF_FFFF
    } else {
        v
    }
}
