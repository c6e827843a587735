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

//! The kernel logger, plugged into the `log` facade.
//!
//! Two line formats are supported, selectable with [`set_format`]:
//! - [`LogFormat::Bracketed`] (the default): `[HH:MM:SS|LEVEL|COMPONENT] message`
//! - [`LogFormat::WallClock`]: `MMM dd HH:MM:SS LEVEL COMPONENT : message`, the
//!   month-name form using the wall-clock snapshot
//!
//! The component is the emitting module, upper-cased. Lines go to the serial
//! console.

use crate::{arch, sync::IntSpin, time, time::DateTime};
use core::fmt;
use core::fmt::Write;
use core::sync::atomic::{AtomicU8, Ordering::Relaxed};
use log::{Level, Log, Metadata, Record};

/// Serializes writes to the serial console.
static SERIAL_LOCK: IntSpin<()> = IntSpin::new(());

/// The line format of the kernel log.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogFormat {
	/// `[HH:MM:SS|LEVEL|COMPONENT] message`
	Bracketed,
	/// `MMM dd HH:MM:SS LEVEL COMPONENT : message`
	WallClock,
}

/// The selected line format.
static FORMAT: AtomicU8 = AtomicU8::new(0);

/// Selects the line format of the kernel log.
pub fn set_format(format: LogFormat) {
	FORMAT.store(format as u8, Relaxed);
}

fn current_format() -> LogFormat {
	match FORMAT.load(Relaxed) {
		1 => LogFormat::WallClock,
		_ => LogFormat::Bracketed,
	}
}

/// Month abbreviations of the wall-clock format.
const MONTH_NAMES: [&str; 12] = [
	"Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// `fmt::Write` sink on top of the serial console.
struct Serial;

impl Write for Serial {
	fn write_str(&mut self, s: &str) -> fmt::Result {
		arch::serial_write(s);
		Ok(())
	}
}

/// Short name of a log level.
fn level_name(level: Level) -> &'static str {
	match level {
		Level::Error => "ERROR",
		Level::Warn => "WARN",
		Level::Info => "INFO",
		Level::Debug => "DEBUG",
		Level::Trace => "TRACE",
	}
}

/// Writes `s` upper-cased.
fn write_upper<W: Write>(out: &mut W, s: &str) -> fmt::Result {
	for c in s.chars() {
		out.write_char(c.to_ascii_uppercase())?;
	}
	Ok(())
}

/// Writes one log line in the given format.
fn write_record<W: Write>(
	out: &mut W,
	format: LogFormat,
	now: DateTime,
	level: Level,
	component: &str,
	args: &fmt::Arguments<'_>,
) -> fmt::Result {
	match format {
		LogFormat::Bracketed => {
			write!(
				out,
				"[{:02}:{:02}:{:02}|{}|",
				now.hour,
				now.min,
				now.sec,
				level_name(level),
			)?;
			write_upper(out, component)?;
			writeln!(out, "] {args}")
		}
		LogFormat::WallClock => {
			let month = MONTH_NAMES
				.get((now.month as usize).wrapping_sub(1))
				.unwrap_or(&"???");
			write!(
				out,
				"{month} {:02} {:02}:{:02}:{:02} {} ",
				now.day,
				now.hour,
				now.min,
				now.sec,
				level_name(level),
			)?;
			write_upper(out, component)?;
			writeln!(out, " : {args}")
		}
	}
}

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
	fn enabled(&self, _metadata: &Metadata) -> bool {
		true
	}

	fn log(&self, record: &Record) {
		let now = time::clock::wall_clock();
		// The component defaults to the emitting module's name
		let component = record
			.target()
			.rsplit("::")
			.next()
			.unwrap_or("KERNEL");
		let _guard = SERIAL_LOCK.lock();
		let _ = write_record(
			&mut Serial,
			current_format(),
			now,
			record.level(),
			component,
			record.args(),
		);
	}

	fn flush(&self) {}
}

/// Installs the kernel logger.
pub(crate) fn init() {
	// Only the first initialization may take
	let _ = log::set_logger(&LOGGER);
	log::set_max_level(log::LevelFilter::Debug);
}

#[cfg(test)]
mod test {
	use super::*;

	fn now() -> DateTime {
		DateTime {
			year: 2025,
			month: 2,
			day: 7,
			hour: 13,
			min: 5,
			sec: 9,
		}
	}

	#[test]
	fn bracketed_format() {
		let mut out = String::new();
		write_record(
			&mut out,
			LogFormat::Bracketed,
			now(),
			Level::Info,
			"buddy",
			&format_args!("hello"),
		)
		.unwrap();
		assert_eq!(out, "[13:05:09|INFO|BUDDY] hello\n");
	}

	#[test]
	fn wall_clock_format() {
		let mut out = String::new();
		write_record(
			&mut out,
			LogFormat::WallClock,
			now(),
			Level::Warn,
			"vfs",
			&format_args!("x = {}", 3),
		)
		.unwrap();
		assert_eq!(out, "Feb 07 13:05:09 WARN VFS : x = 3\n");
	}

	#[test]
	fn format_selection() {
		assert_eq!(current_format(), LogFormat::Bracketed);
		set_format(LogFormat::WallClock);
		assert_eq!(current_format(), LogFormat::WallClock);
		set_format(LogFormat::Bracketed);
		assert_eq!(current_format(), LogFormat::Bracketed);
	}
}
