// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use super::{
    common::{print_config, read_config},
    HyperstackError,
};

#[derive(Parser, Debug)]
pub(super) struct VerifyConfigArgs {
    /// Path to the imaging configuration (toml or json) to be verified.
    #[clap(name = "CONFIG_FILE", parse(from_os_str))]
    config: PathBuf,
}

impl VerifyConfigArgs {
    pub(super) fn run(self) -> Result<(), HyperstackError> {
        let config = read_config(Some(&self.config))?;
        info!("{} is a valid imaging configuration", self.config.display());
        print_config(&config);
        Ok(())
    }
}
