// Copyright (C) 2023 Entropy Cryptography Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Test tooling for threshold keysign: an in-memory relay, a local signing engine and fixtures
#[macro_use]
extern crate lazy_static;

pub mod constants;
pub mod engine;
pub mod helpers;
pub mod relay_server;

pub use engine::{FailingEngineFactory, LocalEngineFactory, StalledEngineFactory};
pub use helpers::*;
pub use relay_server::{spawn_relay, RelayState, TestRelay};
