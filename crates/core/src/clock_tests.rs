// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advances_monotonic_and_wall_time() {
    let clock = FakeClock::new();
    let start = clock.now();
    let ts = clock.timestamp();

    clock.advance(Duration::from_secs(90));

    assert_eq!(clock.now() - start, Duration::from_secs(90));
    assert_eq!(clock.timestamp() - ts, chrono::Duration::seconds(90));
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let clone = clock.clone();
    clock.advance(Duration::from_secs(5));
    assert_eq!(clock.now(), clone.now());
}

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}
