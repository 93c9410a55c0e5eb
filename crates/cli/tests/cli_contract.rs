use assert_cmd::cargo::cargo_bin_cmd;
use folio_render::build_blank_pdf;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn write_pdf(dir: &Path, name: &str, sizes: &[(u32, u32)]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, build_blank_pdf(sizes).expect("pdf should build")).expect("pdf should write");
    path
}

fn stdout_json(cmd: &mut assert_cmd::Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout should contain valid json")
}

#[test]
fn info_emits_stable_json_contract() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "small.pdf", &[(612, 792), (300, 400)]);

    let value = stdout_json(cargo_bin_cmd!("folio-cli").arg("info").arg(&pdf));

    assert_eq!(value["page_count"], 2);
    assert_eq!(value["first_page_size_pt"]["width"], 612.0);
    assert_eq!(value["first_page_size_pt"]["height"], 792.0);
    assert_eq!(value["outline_entries"], 0);
    assert!(value["path"].as_str().unwrap().ends_with("small.pdf"));
}

#[test]
fn info_fails_for_missing_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("folio-cli")
        .arg("info")
        .arg(temp.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("invalid.pdf");
    fs::write(&path, b"this is not a pdf").unwrap();

    cargo_bin_cmd!("folio-cli")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn info_fails_for_encrypted_marker_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("encrypted-marker.pdf");
    fs::write(&path, b"%PDF-1.4\n1 0 obj\n<< /Encrypt 2 0 R >>\nendobj\n%%EOF\n").unwrap();

    cargo_bin_cmd!("folio-cli")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("encrypted PDFs are not supported"));
}

#[test]
fn generate_writes_readable_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output = temp.path().join("out").join("blank.pdf");

    cargo_bin_cmd!("folio-cli")
        .arg("generate")
        .arg(&output)
        .args(["--pages", "5", "--width", "600", "--height", "800"])
        .assert()
        .success()
        .stdout(predicate::str::contains("blank.pdf"));

    let value = stdout_json(cargo_bin_cmd!("folio-cli").arg("info").arg(&output));
    assert_eq!(value["page_count"], 5);
    assert_eq!(value["first_page_size_pt"]["width"], 600.0);
}

#[test]
fn layout_fit_width_scales_pages_to_container() {
    let value = stdout_json(cargo_bin_cmd!("folio-cli").args([
        "layout",
        "--synthetic-pages",
        "10",
        "--page-width",
        "600",
        "--page-height",
        "800",
        "--fit",
        "fit-width",
        "--width",
        "640",
    ]));

    // 640 wide minus 40 padding leaves exactly the page width
    assert_eq!(value["page_count"], 10);
    let pages = value["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 10);
    assert_eq!(pages[0]["y_offset"], 12.0);
    assert_eq!(pages[0]["scale"], 1.0);
    assert_eq!(pages[1]["y_offset"], 824.0);
    assert_eq!(value["total_height"], 12.0 + 10.0 * 812.0);
}

#[test]
fn layout_reads_page_sizes_from_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "mixed.pdf", &[(200, 100), (400, 300)]);

    let value = stdout_json(
        cargo_bin_cmd!("folio-cli").arg("layout").arg(&pdf).args(["--fit", "fixed", "--scale", "2"]),
    );

    let pages = value["pages"].as_array().unwrap();
    assert_eq!(pages[0]["css_width"], 400.0);
    assert_eq!(pages[0]["css_height"], 200.0);
    assert_eq!(pages[1]["css_height"], 600.0);
    assert_eq!(pages[1]["y_offset"], 12.0 + 200.0 + 12.0);
}

#[test]
fn layout_requires_a_source() {
    cargo_bin_cmd!("folio-cli").arg("layout").assert().failure();
}

#[test]
fn layout_rejects_unknown_fit_mode() {
    cargo_bin_cmd!("folio-cli")
        .args(["layout", "--synthetic-pages", "3", "--fit", "sideways"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown fit mode"));
}

#[test]
fn simulate_renders_only_the_buffered_pages() {
    let value = stdout_json(cargo_bin_cmd!("folio-cli").args([
        "simulate",
        "--synthetic-pages",
        "200",
        "--fit",
        "fixed",
        "--scale",
        "1",
    ]));

    assert_eq!(value["page_count"], 200);
    assert_eq!(value["current_page"], 0);
    assert_eq!(value["range"]["visible_start"], 0);
    assert_eq!(value["range"]["buffer_start"], 0);

    let slots = value["live_slots"].as_array().unwrap();
    let buffer_end = value["range"]["buffer_end"].as_u64().unwrap();
    assert_eq!(slots.len() as u64, buffer_end + 1);
    assert_eq!(value["rendered_slots"], slots.len());
    assert_eq!(value["renders"]["completed"], slots.len());
}

#[test]
fn simulate_jump_keeps_slots_near_the_target() {
    let value = stdout_json(cargo_bin_cmd!("folio-cli").args([
        "simulate",
        "--synthetic-pages",
        "1000",
        "--page",
        "1000",
    ]));

    assert_eq!(value["current_page"], 999);
    assert_eq!(value["range"]["visible_end"], 999);
    for page in value["live_slots"].as_array().unwrap() {
        assert!(page.as_u64().unwrap() >= 990);
    }
}

#[test]
fn simulate_reports_failed_pages() {
    let value = stdout_json(cargo_bin_cmd!("folio-cli").args([
        "simulate",
        "--synthetic-pages",
        "5",
        "--fail-page",
        "1",
    ]));

    assert_eq!(value["failed_pages"], serde_json::json!([1]));
    assert_eq!(value["renders"]["failed"], 1);
}

#[test]
fn simulate_reads_config_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let config = temp.path().join("scroller.toml");
    fs::write(&config, "buffer_pages = 0\nfit_mode = \"fixed\"\nscale = 1.0\n").unwrap();

    let value = stdout_json(
        cargo_bin_cmd!("folio-cli")
            .args(["simulate", "--synthetic-pages", "50", "--config"])
            .arg(&config),
    );

    assert_eq!(value["policy"]["mode"], "fixed");
    assert_eq!(value["live_slots"], serde_json::json!([0]));
}

#[test]
fn simulate_rejects_page_past_the_end() {
    cargo_bin_cmd!("folio-cli")
        .args(["simulate", "--synthetic-pages", "4", "--page", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("past the last page"));
}

#[test]
fn version_prints_crate_version() {
    cargo_bin_cmd!("folio-cli")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
