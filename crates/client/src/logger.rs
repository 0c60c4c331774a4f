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

//! Log output for binaries built on the client
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;

/// Logging options shared by the keysign binaries
#[derive(clap::Args, Debug, Default, Clone)]
pub struct Instrumentation {
    #[clap(
        long,
        default_value_t = Default::default(),
    )]
    pub logger: Logger,
}

impl Instrumentation {
    /// Configures and initializes the global `tracing` Subscriber.
    pub fn setup(&self) {
        // Only `INFO` or higher by default, otherwise the user's `RUST_LOG` settings
        let env_filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy();
        let registry = tracing_subscriber::registry().with(env_filter);

        match self.logger {
            Logger::Full => registry.with(tracing_subscriber::fmt::layer()).init(),
            Logger::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
            Logger::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        }
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Logger {
    #[default]
    Full,
    Pretty,
    Json,
}

impl std::fmt::Display for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let logger = match self {
            Logger::Full => "full",
            Logger::Pretty => "pretty",
            Logger::Json => "json",
        };
        write!(f, "{}", logger)
    }
}
