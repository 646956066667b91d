//! Output run tests driven by a stand-in `kicad-cli` shell script.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use kicad_outputs::config::{Config, Deliverables};
use kicad_outputs::error::OutputError;
use kicad_outputs::kicad::KicadError;
use kicad_outputs::outputs::OutputJob;
use tempfile::TempDir;

/// Creates a temporary directory inside `.tmp/` for test isolation.
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
///
/// Converts to an absolute path to avoid issues with parallel test execution.
fn test_temp_dir() -> TempDir {
    let tmp_root = Path::new(".tmp");
    fs::create_dir_all(tmp_root).expect("Failed to create .tmp directory");
    let tmp_root = tmp_root
        .canonicalize()
        .expect("Failed to canonicalize .tmp path");
    tempfile::tempdir_in(&tmp_root).expect("Failed to create temp dir")
}

/// Writes an executable script that mimics the `kicad-cli` exports by
/// creating whatever `--output` names. Gerber export fails when
/// `fail_gerbers` is set.
fn fake_kicad_cli(dir: &Path, fail_gerbers: bool) -> PathBuf {
    let gerbers = if fail_gerbers {
        "echo 'Board file is corrupt' >&2; exit 2"
    } else {
        "echo 'G04 fake*' > \"$out/amp-F_Cu.gbr\""
    };
    let script = format!(
        r#"#!/bin/sh
if [ "$1" = "--version" ]; then
    echo "9.0.0"
    exit 0
fi
out=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "--output" ]; then out="$arg"; fi
    prev="$arg"
done
case "$1 $2 $3" in
    "sch export python-bom")
        cat > "$out" <<'XML'
<export version="E">
  <components>
    <comp ref="R1"><value>10k</value><footprint>Resistor_SMD:R_0603</footprint></comp>
    <comp ref="R2"><value>10k</value><footprint>Resistor_SMD:R_0603</footprint></comp>
    <comp ref="D1"><value>LED</value><footprint>LED_SMD:LED_0603</footprint><property name="dnp"/></comp>
  </components>
</export>
XML
        ;;
    "pcb export gerbers")
        {gerbers}
        ;;
    "pcb export drill")
        echo "M48" > "${{out}}amp.drl"
        ;;
    *)
        echo "stub" > "$out"
        ;;
esac
"#
    );

    let path = dir.join("kicad-cli");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config(cli: PathBuf, output_dir: PathBuf) -> Config {
    let mut config = Config::default();
    config.kicad.cli_path = Some(cli);
    config.outputs.output_dir = output_dir;
    config.outputs.merge_pdfs = false;
    config.outputs.deliverables = Deliverables::SCHEMATIC
        | Deliverables::BOM
        | Deliverables::GERBERS
        | Deliverables::DRILL
        | Deliverables::POSITION
        | Deliverables::STEP
        | Deliverables::BUNDLE;
    config
}

// Both scenarios share one test so that only one thread writes and then
// executes a script at a time.
#[test]
fn output_run_with_stand_in_kicad_cli() {
    let dir = test_temp_dir();
    let out = dir.path().join("outputs");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("stale.txt"), "from a previous run").unwrap();

    let cli = fake_kicad_cli(dir.path(), false);
    let job = OutputJob::new(&dir.path().join("amp"), 2, config(cli, out.clone())).unwrap();
    let summary = job.run().unwrap();

    let produced: Vec<String> = summary
        .produced
        .iter()
        .map(|p| p.strip_prefix(&out).unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        produced,
        [
            "amp.pdf",
            "amp.assembly-front.pdf",
            "amp.assembly-back.pdf",
            "amp.csv",
            "Gerber",
            "NC Drill",
            "amp.pos",
            "amp.step",
        ]
    );
    assert_eq!(summary.not_fitted, ["D1"]);
    assert_eq!(summary.bundle, Some(out.join("amp.zip")));

    assert!(!out.join("stale.txt").exists());
    assert!(!out.join("amp.xml").exists());
    let csv = fs::read_to_string(out.join("amp.csv")).unwrap();
    assert!(csv.contains(r#"1,"10k","R1,R2",2,"R_0603""#));

    let archive = zip::ZipArchive::new(fs::File::open(out.join("amp.zip")).unwrap()).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"amp.csv"));
    assert!(names.contains(&"Gerber/amp-F_Cu.gbr"));
    assert!(names.contains(&"NC Drill/amp.drl"));
    assert!(!names.iter().any(|n| n.ends_with(".zip") || n.ends_with(".xml")));

    // A failing export aborts the run before later steps.
    let failing = test_temp_dir();
    let out = failing.path().join("outputs");
    let cli = fake_kicad_cli(failing.path(), true);
    let job = OutputJob::new(&failing.path().join("amp"), 4, config(cli, out.clone())).unwrap();
    let err = job.run().unwrap_err();
    match err {
        OutputError::Kicad(KicadError::Failed { status, stderr, .. }) => {
            assert_eq!(status, 2);
            assert_eq!(stderr, "Board file is corrupt");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(out.join("amp.csv").exists());
    assert!(!out.join("amp.pos").exists());
    assert!(!out.join("amp.zip").exists());
}
