use std::fs;

use assert_cmd::Command;
use tempfile::TempDir;

#[test]
fn validate_reports_layout_facts() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("plate_layout.tsv"), sheet_text()).unwrap();

    let mut cmd = Command::cargo_bin("agarqc").unwrap();
    cmd.args(["validate", "--input"]).arg(tmp.path());
    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("layout ok"));
    assert!(stdout.contains("experiment: demo_run"));
    assert!(stdout.contains("baseline plate: SC1-plate1"));
    assert!(stdout.contains("spots: 192"));
}

#[test]
fn validate_fails_without_a_layout_sheet() {
    let tmp = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("agarqc").unwrap();
    cmd.args(["validate", "--input"]).arg(tmp.path());
    cmd.assert().failure();
}

#[test]
fn validate_rejects_a_broken_sheet() {
    let tmp = TempDir::new().unwrap();
    let broken = sheet_text().replace("concentrations", "doses");
    fs::write(tmp.path().join("plate_layout.tsv"), broken).unwrap();

    let mut cmd = Command::cargo_bin("agarqc").unwrap();
    cmd.args(["validate", "--input"]).arg(tmp.path());
    cmd.assert().failure();
}

fn sheet_text() -> String {
    let mut text = String::from(
        "experiment\tdemo_run\n\
         \n\
         compounds\n\
         plate_batch\tplate1\tplate2\n\
         SC1\twater\tANIDULAFUNGIN\n\
         \n\
         concentrations\n\
         plate_batch\tplate1\tplate2\n\
         SC1\t0\t0.5\n\
         \n\
         bad spots\n\
         plate_batch\tplate\trow\tcolumn\n\
         \n\
         strains\n",
    );
    for letter in 'A'..='H' {
        text.push(letter);
        for c in 1..=12 {
            text.push_str(&format!("\tca_{}{}", letter, c));
        }
        text.push('\n');
    }
    text
}
