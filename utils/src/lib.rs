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

//! Utility features used by the kernel, not tied to any hardware.
//!
//! This crate is freestanding so that it can also be built and tested against the host's
//! standard library (feature `std`).

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![feature(allocator_api)]

extern crate alloc;

pub mod collections;
pub mod errno;
pub mod limits;
pub mod math;
