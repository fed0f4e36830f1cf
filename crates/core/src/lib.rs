// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Core foundational types and utilities for the barkit aggregation engine.
//!
//! The `barkit-core` crate is designed to be lightweight and to provide zero-cost
//! abstractions wherever possible. It supplies the essential building blocks used
//! across the barkit crates:
//!
//! - Nanosecond-resolution UNIX timestamp handling.
//! - Correctness validation functions.

pub mod correctness;
pub mod nanos;
pub mod parsing;

pub use nanos::{DurationNanos, UnixNanos};
