use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn user_columns_survive_regeneration() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let disk = workspace.path().join("disk");
    fs::create_dir_all(&disk)?;
    fs::write(disk.join("a.csv"), "0,1\n")?;
    fs::write(disk.join("b.csv"), "0,2\n")?;
    init(workspace.path())?;
    cli(workspace.path())?
        .args(["import", "primary"])
        .arg(disk.join("a.csv"))
        .arg(disk.join("b.csv"))
        .assert()
        .success();

    cli(workspace.path())?
        .args(["manifest", "generate"])
        .assert()
        .success()
        .stdout(predicate::eq("primary: 2 rows\n"));
    cli(workspace.path())?
        .args(["manifest", "set", "primary", "a.csv", "description", "baseline"])
        .assert()
        .success();

    fs::write(disk.join("c.csv"), "0,3\n")?;
    cli(workspace.path())?
        .args(["import", "primary"])
        .arg(disk.join("c.csv"))
        .assert()
        .success();
    cli(workspace.path())?
        .args(["rm", "primary/b.csv"])
        .assert()
        .success();
    cli(workspace.path())?
        .args(["manifest", "generate"])
        .assert()
        .success();

    let shown = cli(workspace.path())?
        .args(["manifest", "show", "primary"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let shown = String::from_utf8(shown)?;
    let lines: Vec<&str> = shown.lines().collect();
    assert_eq!(
        lines[0],
        "filename\tfile type\ttimestamp\tdescription\tAdditional Metadata"
    );
    assert_eq!(lines.len(), 3);
    let a: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(a[0], "a.csv");
    assert_eq!(a[1], "csv");
    assert!(!a[2].is_empty(), "timestamp comes from the source file");
    assert_eq!(a[3], "baseline");
    assert!(lines[2].starts_with("c.csv\tcsv\t"));
    Ok(())
}

#[test]
fn rename_keeps_the_row_and_empty_classification_has_no_manifest() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let source = workspace.path().join("raw.csv");
    fs::write(&source, "0,1\n")?;
    init(workspace.path())?;
    cli(workspace.path())?
        .args(["import", "primary"])
        .arg(&source)
        .assert()
        .success();
    cli(workspace.path())?
        .args(["manifest", "generate"])
        .assert()
        .success();
    cli(workspace.path())?
        .args(["manifest", "set", "primary", "raw.csv", "Additional Metadata", "gain=2"])
        .assert()
        .success();
    cli(workspace.path())?
        .args(["rename", "primary/raw.csv", "trace.csv"])
        .assert()
        .success();
    cli(workspace.path())?
        .args(["manifest", "generate"])
        .assert()
        .success();
    cli(workspace.path())?
        .args(["manifest", "show", "primary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("trace.csv\tcsv\t").and(predicate::str::contains("gain=2")));

    cli(workspace.path())?
        .args(["manifest", "show", "code"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no manifest for code"));
    Ok(())
}

#[test]
fn unknown_cell_is_rejected() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let source = workspace.path().join("raw.csv");
    fs::write(&source, "0,1\n")?;
    init(workspace.path())?;
    cli(workspace.path())?
        .args(["import", "primary"])
        .arg(&source)
        .assert()
        .success();
    cli(workspace.path())?
        .args(["manifest", "generate"])
        .assert()
        .success();
    cli(workspace.path())?
        .args(["manifest", "set", "primary", "missing.csv", "description", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.csv"));
    Ok(())
}

fn init(workspace: &Path) -> Result<(), Box<dyn Error>> {
    cli(workspace)?
        .args(["init", "mouse-vagus", "-c", "primary", "-c", "code"])
        .assert()
        .success();
    Ok(())
}

fn cli(workspace: &Path) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("curator-cli")?;
    cmd.arg("--workspace").arg(workspace).env_remove("CURATOR_LOG");
    Ok(cmd)
}
