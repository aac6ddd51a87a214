#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use quill::{Account, AuditContext, Quill, QuillConfig, SignupRequest};
use tempfile::TempDir;

pub const PASSWORD: &str = "correct-horse";

/// A Quill instance over a fresh file database and upload directory.
///
/// Keep the returned `TempDir` alive for the duration of the test.
pub async fn setup() -> (TempDir, Quill) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("quill=debug,quill_core=debug,quill_storage_sqlite=debug")
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let config = QuillConfig {
        database_url: format!("sqlite://{}", dir.path().join("quill.db").display()),
        upload_dir: dir.path().join("public"),
        ..QuillConfig::default()
    };
    config.validate().unwrap();

    let quill = Quill::new(config);
    quill.init().await.unwrap();
    (dir, quill)
}

/// Fixed instant `minutes` after the start of a test scenario.
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 11, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub async fn signup(quill: &Quill, username: &str) -> Account {
    quill
        .signup(
            &SignupRequest {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password: PASSWORD.to_string(),
                confirm_password: PASSWORD.to_string(),
                display_name: None,
            },
            &AuditContext::new("anonymous", at(0)),
        )
        .await
        .unwrap()
}

/// A tiny PNG payload; only the declared content type is checked.
pub fn png(name: &str) -> quill::IncomingFile {
    quill::IncomingFile::new(name, "image/png", b"\x89PNG\r\n\x1a\n".to_vec())
}
