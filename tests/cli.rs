use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn bin() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("filecrypt"))
}

/// A cipher invocation with cheap scrypt settings.
fn cipher(cmd: &str, password: &str, input: &Path, output: &Path) -> Command {
    let mut c = bin();
    c.env("FILECRYPT_PASSWORD", password)
        .env_remove("RUST_LOG")
        .arg(cmd)
        .arg("--salt")
        .arg("somesaltvalue")
        .arg("--scrypt-log-n")
        .arg("4")
        .arg(input)
        .arg(output);
    c
}

#[test]
fn encrypt_and_decrypt_roundtrip() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("plain.txt");
    let enc = dir.path().join("plain.enc");
    let dec = dir.path().join("plain.out");
    fs::write(&plain, b"attack at dawn").unwrap();

    cipher("encrypt", "pw", &plain, &enc)
        .assert()
        .success()
        .stdout(predicate::str::contains("encrypted"));

    let framed = fs::read(&enc).unwrap();
    assert_eq!(framed.len(), 16 + 16);

    cipher("decrypt", "pw", &enc, &dec)
        .assert()
        .success()
        .stdout(predicate::str::contains("decrypted"));

    assert_eq!(fs::read(&dec).unwrap(), b"attack at dawn");
}

#[test]
fn password_can_be_piped() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("plain.txt");
    let enc = dir.path().join("plain.enc");
    let dec = dir.path().join("plain.out");
    fs::write(&plain, b"piped").unwrap();

    cipher("encrypt", "", &plain, &enc)
        .env_remove("FILECRYPT_PASSWORD")
        .write_stdin("hunter2\n")
        .assert()
        .success();

    cipher("decrypt", "hunter2", &enc, &dec).assert().success();
    assert_eq!(fs::read(&dec).unwrap(), b"piped");
}

#[test]
fn wrong_password_fails_and_leaves_no_output() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("plain.txt");
    let enc = dir.path().join("plain.enc");
    let dec = dir.path().join("plain.out");
    fs::write(&plain, vec![7u8; 5000]).unwrap();

    cipher("encrypt", "pw", &plain, &enc).assert().success();

    let assert = cipher("decrypt", "wrong_pw", &enc, &dec).assert();
    if dec.exists() {
        // padding happened to validate; the output must still differ
        assert_ne!(fs::read(&dec).unwrap(), vec![7u8; 5000]);
    } else {
        assert
            .failure()
            .stderr(predicate::str::contains("invalid padding"));
    }
}

#[test]
fn truncated_input_is_reported() {
    let dir = tempdir().unwrap();
    let enc = dir.path().join("short.enc");
    let dec = dir.path().join("short.out");
    fs::write(&enc, b"tiny").unwrap();

    cipher("decrypt", "pw", &enc, &dec)
        .assert()
        .failure()
        .stderr(predicate::str::contains("too short"));

    assert!(!dec.exists());
}

#[test]
fn invalid_key_size_fails_without_touching_disk() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("plain.txt");
    let enc = dir.path().join("plain.enc");
    fs::write(&plain, b"data").unwrap();

    cipher("encrypt", "pw", &plain, &enc)
        .arg("--size")
        .arg("100")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid key size"));

    assert!(!enc.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn key_size_must_match_at_decrypt_time() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("plain.txt");
    let enc = dir.path().join("plain.enc");
    let dec = dir.path().join("plain.out");
    fs::write(&plain, b"sized").unwrap();

    cipher("encrypt", "pw", &plain, &enc)
        .arg("--size")
        .arg("128")
        .assert()
        .success();

    cipher("decrypt", "pw", &enc, &dec)
        .arg("--size")
        .arg("128")
        .assert()
        .success();
    assert_eq!(fs::read(&dec).unwrap(), b"sized");
}

#[test]
fn four_byte_salt_roundtrips() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("plain.txt");
    let enc = dir.path().join("plain.enc");
    let dec = dir.path().join("plain.out");
    fs::write(&plain, b"short salt").unwrap();

    for (cmd, input, output) in [("encrypt", &plain, &enc), ("decrypt", &enc, &dec)] {
        bin()
            .env("FILECRYPT_PASSWORD", "pw")
            .env("FILECRYPT_SALT", "salt")
            .arg(cmd)
            .arg("--scrypt-log-n")
            .arg("4")
            .arg(input)
            .arg(output)
            .assert()
            .success();
    }

    assert_eq!(fs::read(&dec).unwrap(), b"short salt");
}

#[test]
fn hash_of_empty_file() {
    let dir = tempdir().unwrap();
    let empty = dir.path().join("empty");
    fs::write(&empty, b"").unwrap();

    bin()
        .arg("hash")
        .arg(&empty)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        ));

    bin()
        .arg("hash")
        .arg("--algorithm")
        .arg("sha224")
        .arg(&empty)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "d14a028c2a3a2bc9476102bb288234c415a2b01f828ea62ac5b3e42f",
        ));
}

#[test]
fn legacy_and_sha3_algorithms_are_available() {
    let dir = tempdir().unwrap();
    let empty = dir.path().join("empty");
    fs::write(&empty, b"").unwrap();

    for (alg, expected) in [
        ("md5", "d41d8cd98f00b204e9800998ecf8427e"),
        ("sha1", "da39a3ee5e6b4b0d3255bfef95601890afd80709"),
        (
            "sha3-256",
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a",
        ),
    ] {
        bin()
            .arg("hash")
            .arg("-a")
            .arg(alg)
            .arg(&empty)
            .assert()
            .success()
            .stdout(predicate::str::contains(expected));
    }
}

#[test]
fn hmac_differs_per_key() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("data");
    fs::write(&file, b"").unwrap();

    let tag = |key: &str| {
        let out = bin()
            .arg("hmac")
            .arg("--key")
            .arg(key)
            .arg("--encoding")
            .arg("base64")
            .arg(&file)
            .output()
            .unwrap();
        assert!(out.status.success());
        String::from_utf8(out.stdout).unwrap()
    };

    assert_ne!(tag("one"), tag("two"));
}

#[test]
fn unknown_algorithm_is_rejected() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("data");
    fs::write(&file, b"x").unwrap();

    bin()
        .arg("hash")
        .arg("--algorithm")
        .arg("md4")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported digest algorithm"));
}
