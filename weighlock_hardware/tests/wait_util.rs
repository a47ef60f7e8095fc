use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use rstest::rstest;
use weighlock_hardware::error::HwError;
use weighlock_hardware::util::wait_for_level_with_timeout;
use weighlock_traits::Level;

#[test]
fn wait_for_low_success_path() {
    let high = Arc::new(AtomicBool::new(true));
    let high_bg = high.clone();
    // DRDY drops after a short conversion time
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        high_bg.store(false, Ordering::Relaxed);
    });

    let res = wait_for_level_with_timeout(
        || Level::from(high.load(Ordering::Relaxed)),
        Level::Low,
        Duration::from_millis(50),
        Duration::from_micros(200),
    );
    assert!(res.is_ok(), "expected success, got {res:?}");
}

#[rstest]
#[case(Level::High)]
#[case(Level::Low)]
fn returns_immediately_when_already_at_level(#[case] level: Level) {
    let res = wait_for_level_with_timeout(
        || level,
        level,
        Duration::from_millis(1),
        Duration::from_micros(200),
    );
    assert!(res.is_ok());
}

#[test]
fn wait_for_low_timeout_path() {
    let err = wait_for_level_with_timeout(
        || Level::High,
        Level::Low,
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("expected timeout error");

    match err {
        HwError::DataReadyTimeout => {}
        other => panic!("unexpected error: {other:?}"),
    }
}
