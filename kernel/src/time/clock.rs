/*
 * Copyright 2025 The Petrel developers
 *
 * This file is part of Petrel.
 *
 * Petrel is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Petrel is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Petrel. If not, see <https://www.gnu.org/licenses/>.
 */

//! The kernel's clocks.
//!
//! The monotonic clock advances on every preemption-timer expiry. It feeds the
//! scheduler's sleep queue; the wall clock only serves log timestamps.

use super::DateTime;
use core::sync::atomic::{
	AtomicU64,
	Ordering::{Relaxed, SeqCst},
};

/// Microseconds elapsed since boot.
static MONOTONIC_US: AtomicU64 = AtomicU64::new(0);
/// Unix timestamp of the boot, in seconds. Zero when no RTC was read.
static BOOT_EPOCH: AtomicU64 = AtomicU64::new(0);

/// Returns the microseconds elapsed since boot.
#[inline]
pub fn monotonic_us() -> u64 {
	MONOTONIC_US.load(SeqCst)
}

/// Advances the monotonic clock. Called from the timer interrupt.
pub(crate) fn advance_us(us: u64) {
	MONOTONIC_US.fetch_add(us, SeqCst);
}

/// Stores the wall-clock time of the boot, read from the RTC by the boot glue.
pub fn set_boot_time(epoch_secs: u64) {
	BOOT_EPOCH.store(epoch_secs, Relaxed);
}

/// Returns the current wall-clock time.
pub fn wall_clock() -> DateTime {
	let secs = BOOT_EPOCH.load(Relaxed) + monotonic_us() / 1_000_000;
	super::datetime_from_timestamp(secs)
}
