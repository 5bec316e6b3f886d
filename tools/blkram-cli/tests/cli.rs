#![cfg(not(target_arch = "wasm32"))]

use assert_cmd::Command;

fn blkram() -> Command {
    let mut cmd = Command::cargo_bin("blkram").unwrap();
    cmd.env_remove("RUST_LOG").env("BLKRAM_LOG_LEVEL", "warn");
    cmd
}

#[test]
fn self_check_round_trips_on_small_device() {
    let output = blkram().args(["--capacity-mb", "1"]).output().unwrap();
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("/dev/blkram0: 2048 sectors (1 MiB)"));
    assert!(stdout.contains("Successfully wrote 4096 bytes to blkram0."));
    assert!(stdout.contains("Test passed!"));
    assert!(stdout.contains("bytes_written=4096"));
}

#[test]
fn write_at_last_block_succeeds() {
    let offset = (1024 * 1024 - 4096).to_string();
    blkram()
        .args(["--capacity-mb", "1", "--offset", &offset])
        .assert()
        .success();
}

#[test]
fn write_past_capacity_fails() {
    let offset = (1024 * 1024 - 4096 + 1).to_string();
    let output = blkram()
        .args(["--capacity-mb", "1", "--offset", &offset])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("out of bounds"), "{stderr}");
}

#[test]
fn huge_length_fails_cleanly() {
    let output = blkram()
        .args(["--capacity-mb", "1", "--len", &usize::MAX.to_string()])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("out of bounds"), "{stderr}");
    assert!(!stderr.contains("panicked"), "{stderr}");
}

#[test]
fn zero_capacity_is_rejected() {
    let output = blkram().args(["--capacity-mb", "0"]).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("bring up ram disk"), "{stderr}");
}

#[test]
fn memory_limit_reports_out_of_memory() {
    let output = blkram()
        .args(["--capacity-mb", "4", "--memory-limit-bytes", "1048576"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("out of memory"), "{stderr}");
}

#[test]
fn custom_name_is_used_for_the_device_path() {
    let output = blkram()
        .args(["--capacity-mb", "1", "--name", "scratch"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("/dev/scratch0"), "{stdout}");
}
