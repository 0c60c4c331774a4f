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

use thiserror::Error;

/// An error talking to the relay
#[derive(Debug, Error)]
pub enum RelayErr {
    #[error("Http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Relay returned {status} for {url}")]
    UnexpectedStatus { url: String, status: reqwest::StatusCode },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}
