// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::Path;

use approx::assert_abs_diff_eq;
use indoc::indoc;
use serde_json::Value;
use tempfile::TempDir;

use crate::{get_cmd_output, hyperstack, make_file_in_dir};

const SMALL: [&str; 8] = [
    "--antennas",
    "6",
    "--npixel",
    "16",
    "--cellsize",
    "0.004",
    "--height",
    "30",
];

fn read_json(path: &Path) -> Value {
    let contents = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&contents).unwrap()
}

fn stat(json: &Value, image: &str, stat: &str) -> f64 {
    json[image][stat].as_f64().unwrap()
}

#[test]
fn test_simulate_writes_stats() {
    let tmp_dir = TempDir::new().unwrap();
    let config = make_file_in_dir(
        "imaging.toml",
        tmp_dir.path(),
        indoc! {r#"
            vis_slices = 3
            facets = 2
        "#},
    );
    let json = tmp_dir.path().join("stats.json");

    let cmd = hyperstack()
        .arg("simulate")
        .arg(&config)
        .args(SMALL)
        .arg("--json")
        .arg(&json)
        .ok();
    assert!(cmd.is_ok(), "simulate failed: {:?}", get_cmd_output(cmd));

    let json = read_json(&json);
    assert_eq!(json["vis_slices"], 3);
    assert_eq!(json["facets"], 2);
    // 6 antennas, 3 timesteps.
    assert_eq!(json["num_rows"], 45);
    assert!(json["model"].is_null());
    // The normalised PSF is exactly 1 at the phase centre, and nowhere
    // larger.
    assert_abs_diff_eq!(stat(&json, "psf", "max"), 1.0, epsilon = 1e-10);
    assert!(stat(&json, "dirty", "max") > 0.5);
    // Without a model, the residual is the dirty image.
    assert_abs_diff_eq!(
        stat(&json, "residual", "max"),
        stat(&json, "dirty", "max"),
        epsilon = 1e-10
    );
}

#[test]
fn test_simulate_with_clean() {
    let tmp_dir = TempDir::new().unwrap();
    let json = tmp_dir.path().join("stats.json");

    let cmd = hyperstack()
        .arg("simulate")
        .args(SMALL)
        .args(["--nmajor", "2", "--sequential", "--json"])
        .arg(&json)
        .ok();
    assert!(cmd.is_ok(), "simulate failed: {:?}", get_cmd_output(cmd));

    let json = read_json(&json);
    assert!(json["model"].is_object());
    assert!(stat(&json, "model", "max") > 0.0);
    assert!(stat(&json, "residual", "max") < stat(&json, "dirty", "max"));
}

#[test]
fn test_simulate_dry_run_does_nothing() {
    let tmp_dir = TempDir::new().unwrap();
    let json = tmp_dir.path().join("stats.json");

    let cmd = hyperstack()
        .arg("simulate")
        .args(SMALL)
        .arg("--json")
        .arg(&json)
        .arg("--dry-run")
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Dry run"), "{stdout}");
    assert!(!json.exists());
}

#[test]
fn test_simulate_uneven_facets_fail() {
    let tmp_dir = TempDir::new().unwrap();
    let config = make_file_in_dir("imaging.json", tmp_dir.path(), r#"{ "facets": 3 }"#);

    let cmd = hyperstack()
        .arg("simulate")
        .arg(&config)
        .args(SMALL)
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("scatter_image"), "{stderr}");
}
