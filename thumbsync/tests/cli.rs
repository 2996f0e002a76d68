use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use serial_test::serial;
use std::fs::write;
use std::io::{Cursor, Write};
use tempfile::{tempdir, NamedTempFile};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use thumbsync::cli::{run, Cli, Commands};
use thumbsync::load_config::TOKEN_ENV;

/// Writes a small CAD export archive: two conventional thumbnails, one odd name, one non-image.
fn create_archive() -> NamedTempFile {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in [
        ("thumbnails/001_PRT-1001_Bracket.png", &b"png-1"[..]),
        ("thumbnails/002_ASM-55_Frame.png", &b"png-2"[..]),
        ("badname.png", &b"png-3"[..]),
        ("bom.csv", &b"Item,Part Number"[..]),
    ] {
        writer.start_file(name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    let bytes = writer.finish().unwrap().into_inner();

    let archive = NamedTempFile::new().expect("Creating temp archive failed");
    write(archive.path(), bytes).expect("Writing temp archive failed");
    archive
}

fn create_config(server_uri: &str) -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    let yaml = format!(
        "airtable:\n  base_id: appBASE\n  table: Parts\n  key_field: Part Number\n  thumbnail_field: Thumbnail\n  api_url: {server_uri}\n  content_url: {server_uri}\npipeline:\n  min_call_interval_ms: 1\n  retry:\n    max_retries: 0\n"
    );
    write(config.path(), yaml).expect("Writing temp config failed");
    config
}

#[test]
fn inspect_lists_candidates_offline() {
    let archive = create_archive();

    let mut cmd = Command::cargo_bin("thumbsync").expect("Binary exists");
    cmd.arg("inspect").arg("--archive").arg(archive.path());

    cmd.assert()
        .success()
        .stdout(
            predicate::str::contains("3 candidate thumbnail(s) out of 4 entries")
                .and(predicate::str::contains("PRT-1001"))
                .and(predicate::str::contains("ASM-55"))
                .and(predicate::str::contains("pattern mismatch"))
                .and(predicate::str::contains("bom.csv").not()),
        );
}

#[test]
fn inspect_fails_on_corrupt_archive() {
    let archive = NamedTempFile::new().unwrap();
    write(archive.path(), b"not a zip").unwrap();

    let mut cmd = Command::cargo_bin("thumbsync").expect("Binary exists");
    cmd.arg("inspect").arg("--archive").arg(archive.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open archive"));
}

#[test]
fn upload_fails_without_token() {
    let archive = create_archive();
    let config = create_config("http://127.0.0.1:9");

    let mut cmd = Command::cargo_bin("thumbsync").expect("Binary exists");
    cmd.arg("upload")
        .arg("--config")
        .arg(config.path())
        .arg("--archive")
        .arg(archive.path())
        .env_remove(TOKEN_ENV);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains(TOKEN_ENV));
}

#[tokio::test]
#[serial]
async fn dry_run_upload_writes_report_without_uploading() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/meta/bases/appBASE/tables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tables": [{"id": "tblParts", "name": "Parts", "fields": [
                {"id": "fldKey", "name": "Part Number", "type": "singleLineText"},
                {"id": "fldThumb", "name": "Thumbnail", "type": "multipleAttachments"}
            ]}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/appBASE/Parts"))
        .and(query_param("filterByFormula", "{Part Number} = 'PRT-1001'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{"id": "recR1", "fields": {}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/appBASE/Parts"))
        .and(query_param("filterByFormula", "{Part Number} = 'ASM-55'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let archive = create_archive();
    let config = create_config(&server.uri());
    let out = tempdir().unwrap();
    let report_path = out.path().join("report.json");
    std::env::set_var(TOKEN_ENV, "pat-test");

    run(Cli {
        command: Commands::Upload {
            config: config.path().to_path_buf(),
            archive: archive.path().to_path_buf(),
            dry_run: true,
            report: Some(report_path.clone()),
        },
    })
    .await
    .expect("dry run should succeed");

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(
        report["summary"],
        json!({"total": 3, "uploaded": 0, "skipped": 2, "errors": 0, "no_match": 1})
    );
    assert_eq!(report["cancelled"], json!(false));
    let outcomes = report["outcomes"].as_array().unwrap();
    assert_eq!(outcomes[0]["status"], json!("skipped"));
    assert_eq!(outcomes[0]["reason"], json!("dry_run"));
    assert_eq!(outcomes[0]["record_id"], json!("recR1"));
    assert_eq!(outcomes[1]["status"], json!("no_match"));
    assert_eq!(outcomes[2]["reason"], json!("pattern_mismatch"));
}

#[tokio::test]
#[serial]
async fn upload_fails_when_thumbnail_field_is_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/meta/bases/appBASE/tables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tables": [{"id": "tblParts", "name": "Parts", "fields": [
                {"id": "fldKey", "name": "Part Number", "type": "singleLineText"}
            ]}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/appBASE/Parts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
        .expect(0)
        .mount(&server)
        .await;

    let archive = create_archive();
    let config = create_config(&server.uri());
    std::env::set_var(TOKEN_ENV, "pat-test");

    let err = run(Cli {
        command: Commands::Upload {
            config: config.path().to_path_buf(),
            archive: archive.path().to_path_buf(),
            dry_run: false,
            report: None,
        },
    })
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("Thumbnail"), "got: {err:#}");
}
