// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use indoc::indoc;
use tempfile::TempDir;

use crate::{get_cmd_output, hyperstack, make_file_in_dir};

#[test]
fn test_verify_toml_config() {
    let tmp_dir = TempDir::new().unwrap();
    let config = make_file_in_dir(
        "imaging.toml",
        tmp_dir.path(),
        indoc! {r#"
            wstack = 15.0
            facets = 2
            kernel = "wprojection"

            [deconvolution]
            niter = 500
        "#},
    );

    let cmd = hyperstack().arg("verify-config").arg(&config).ok();
    assert!(
        cmd.is_ok(),
        "verify-config failed on a valid config: {:?}",
        get_cmd_output(cmd)
    );
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("is a valid imaging configuration"), "{stdout}");
    assert!(stdout.contains("w slices 15 wavelengths wide"), "{stdout}");
    assert!(stdout.contains("2 x 2"), "{stdout}");
    assert!(stdout.contains("niter 500"), "{stdout}");
    assert!(stdout.contains("Ignored keys:  kernel"), "{stdout}");
}

#[test]
fn test_verify_json_config() {
    let tmp_dir = TempDir::new().unwrap();
    let config = make_file_in_dir(
        "imaging.JSON",
        tmp_dir.path(),
        r#"{ "vis_slices": 7, "row_slices": 3 }"#,
    );

    let cmd = hyperstack().arg("verify-config").arg(&config).ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("7 w slices"), "{stdout}");
    assert!(stdout.contains("3 row slices"), "{stdout}");
}

#[test]
fn test_unrecognised_extension_fails() {
    let tmp_dir = TempDir::new().unwrap();
    let config = make_file_in_dir("imaging.yaml", tmp_dir.path(), "facets: 2\n");

    let cmd = hyperstack().arg("verify-config").arg(&config).ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(
        stderr.contains("Valid extensions are: toml, json"),
        "{stderr}"
    );
}

#[test]
fn test_malformed_toml_fails() {
    let tmp_dir = TempDir::new().unwrap();
    let config = make_file_in_dir("imaging.toml", tmp_dir.path(), "facets = \"two\"\n");

    let cmd = hyperstack().arg("verify-config").arg(&config).ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("Couldn't decode toml structure"), "{stderr}");
}

#[test]
fn test_invalid_values_fail() {
    let tmp_dir = TempDir::new().unwrap();
    let config = make_file_in_dir("imaging.toml", tmp_dir.path(), "facets = 0\n");

    let cmd = hyperstack().arg("verify-config").arg(&config).ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(
        stderr.contains("the number of facets must be positive"),
        "{stderr}"
    );
}

#[test]
fn test_missing_file_fails() {
    let tmp_dir = TempDir::new().unwrap();
    let cmd = hyperstack()
        .arg("verify-config")
        .arg(tmp_dir.path().join("nothing.toml"))
        .ok();
    assert!(cmd.is_err());
}
