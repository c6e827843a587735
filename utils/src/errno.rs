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

//! Kernel error numbers.
//!
//! Fallible kernel functions return [`EResult`]. The inner [`Errno`] crosses the
//! syscall boundary unchanged.
//!
//! Allocation failures are kept apart as [`AllocResult`] and turn into [`ENOMEM`]
//! only where an errno is required.

use core::{
	alloc::AllocError,
	fmt,
	fmt::{Debug, Display, Formatter},
};

/// A kernel error number.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Errno(i32);

/// Result of a fallible kernel operation.
pub type EResult<T> = Result<T, Errno>;

/// Result of a fallible allocation.
pub type AllocResult<T> = Result<T, AllocError>;

macro_rules! errnos {
	($(#[doc = $doc:literal] $name:ident = $val:literal,)*) => {
		$(
			#[doc = $doc]
			pub const $name: Errno = Errno($val);
		)*

		impl Errno {
			/// Returns the name of the error.
			pub fn name(self) -> &'static str {
				match self.0 {
					$($val => stringify!($name),)*
					_ => "unknown",
				}
			}
		}
	};
}

errnos! {
	/// Success.
	EOK = 0,
	/// No such file or directory.
	ENOENT = 2,
	/// I/O error.
	EIO = 5,
	/// Bad file descriptor.
	EBADF = 9,
	/// Not enough memory.
	ENOMEM = 12,
	/// Bad address.
	EFAULT = 14,
	/// Device or resource busy.
	EBUSY = 16,
	/// File exists.
	EEXIST = 17,
	/// Not a directory.
	ENOTDIR = 20,
	/// Is a directory.
	EISDIR = 21,
	/// Invalid argument.
	EINVAL = 22,
	/// Too many open files.
	EMFILE = 24,
	/// Not a terminal.
	ETTY = 25,
	/// Invalid seek.
	ESPIPE = 29,
	/// Result too large.
	ERANGE = 34,
	/// Filename too long.
	ENAMETOOLONG = 36,
	/// Function not implemented.
	ENOSYS = 38,
	/// Directory not empty.
	ENOTEMPTY = 39,
	/// Value too large to be stored in data type.
	EOVERFLOW = 75,
	/// Operation not supported.
	ENOTSUP = 95,
}

impl Errno {
	/// Returns the raw error number.
	#[inline]
	pub fn as_int(self) -> i32 {
		self.0
	}
}

impl From<AllocError> for Errno {
	fn from(_: AllocError) -> Self {
		ENOMEM
	}
}

impl Display for Errno {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{} (errno: {})", self.name(), self.0)
	}
}

impl Debug for Errno {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		Display::fmt(self, f)
	}
}

/// Builds an [`Errno`] from its name.
#[macro_export]
macro_rules! errno {
	($name:ident) => {
		$crate::errno::$name
	};
}
