//! The forwarding helper must duplicate its stdin byte-for-byte to both its
//! stdout and the relay endpoint.

#![cfg(unix)]

use assert_cmd::Command;
use std::io::Read;
use std::os::unix::net::UnixListener;

#[test]
fn tee_duplicates_stdin_to_stdout_and_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = dir.path().join("tee.sock");
    let listener = UnixListener::bind(&endpoint).unwrap();

    let accepter = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received
    });

    let payload = b"abc\ndef\nno trailing newline";
    Command::cargo_bin("buildpulse")
        .unwrap()
        .arg("tee")
        .arg(&endpoint)
        .write_stdin(payload.as_slice())
        .assert()
        .success()
        .stdout(predicates::ord::eq(payload.as_slice()));

    assert_eq!(accepter.join().unwrap(), payload);
}

#[test]
fn tee_fails_cleanly_without_an_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = dir.path().join("missing.sock");

    Command::cargo_bin("buildpulse")
        .unwrap()
        .arg("tee")
        .arg(&endpoint)
        .write_stdin("data")
        .assert()
        .failure();
}
