use std::fs;
use std::os::unix::fs::PermissionsExt as _;

use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

#[test]
fn logging_does_not_panic_when_metronome_dir_not_writable() {
    let dir = TempDir::new().unwrap();
    let metronome_dir = dir.path().join("metronome-ro");
    fs::create_dir_all(&metronome_dir).unwrap();
    let mut perms = fs::metadata(&metronome_dir).unwrap().permissions();
    perms.set_mode(0o555);
    fs::set_permissions(&metronome_dir, perms).unwrap();

    let mut cmd = cargo_bin_cmd!("metronome");
    cmd.env("METRONOME_DIR", &metronome_dir);
    cmd.arg("-help");
    cmd.assert().success();
}
