// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Things shared between subcommands.

use std::{fs::File, io::Read, path::Path, str::FromStr};

use itertools::Itertools;
use log::{debug, info};
use serde::de::DeserializeOwned;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use super::HyperstackError;
use crate::config::ImagingConfig;

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref ARG_FILE_HELP: String =
        format!("All imaging settings may be specified in a file. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);
}

#[derive(Debug, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

/// Read an argument file, choosing the decoder from its extension.
pub(super) fn unpack_arg_file<T: DeserializeOwned>(arg_file: &Path) -> Result<T, HyperstackError> {
    debug!("Attempting to parse argument file {}", arg_file.display());

    let mut contents = String::new();
    let arg_file_type = arg_file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .and_then(|e| ArgFileTypes::from_str(&e).ok());

    match arg_file_type {
        Some(ArgFileTypes::Toml) => {
            debug!("Parsing toml file...");
            let mut fh = File::open(arg_file)?;
            fh.read_to_string(&mut contents)?;
            toml::from_str(&contents).map_err(|err| {
                HyperstackError::ArgFile(format!(
                    "Couldn't decode toml structure from {:?}:\n{err}",
                    arg_file
                ))
            })
        }

        Some(ArgFileTypes::Json) => {
            debug!("Parsing json file...");
            let mut fh = File::open(arg_file)?;
            fh.read_to_string(&mut contents)?;
            serde_json::from_str(&contents).map_err(|err| {
                HyperstackError::ArgFile(format!(
                    "Couldn't decode json structure from {:?}:\n{err}",
                    arg_file
                ))
            })
        }

        None => Err(HyperstackError::ArgFile(format!(
            "Argument file '{:?}' doesn't have a recognised file extension! Valid extensions are: {}",
            arg_file, *ARG_FILE_TYPES_COMMA_SEPARATED
        ))),
    }
}

/// Read and validate an imaging configuration. With no file, the defaults are
/// used.
pub(super) fn read_config(arg_file: Option<&Path>) -> Result<ImagingConfig, HyperstackError> {
    let config: ImagingConfig = match arg_file {
        Some(f) => unpack_arg_file(f)?,
        None => ImagingConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Log the settings of an imaging configuration.
pub(super) fn print_config(config: &ImagingConfig) {
    let w = match (config.wstack, config.vis_slices) {
        (Some(width), _) => format!("w slices {width} wavelengths wide"),
        (None, Some(count)) => format!("{count} w slices"),
        (None, None) => format!("w slices derived from wloss {}", config.wloss),
    };
    let partitioning = match (config.row_slices, config.timeslice) {
        (Some(count), _) => format!("{count} row slices"),
        (None, Some(width)) => format!("time slices {width} s wide"),
        (None, None) => "time slices derived from the data".to_string(),
    };
    let d = &config.deconvolution;
    info!("Imaging settings:");
    info!("  Partitioning:  {partitioning}");
    info!("  W stacking:    {w}");
    info!("  Facets:        {} x {}", config.facets, config.facets);
    info!("  Normalise:     {}", config.normalize);
    info!("  Make PSF:      {}", config.dopsf);
    info!("  W projection:  {}", config.w_projection);
    info!(
        "  CLEAN:         niter {}, gain {}, threshold {} Jy, fractional threshold {}",
        d.niter, d.gain, d.threshold, d.fractional_threshold
    );
    if !config.extra.is_empty() {
        info!(
            "  Ignored keys:  {}",
            config.extra.keys().map(|k| k.as_str()).join(", ")
        );
    }
}
