use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::path::Path;
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const SAM: &str = "I am Sam. Sam I am. I do not like this Sam I am.\r\n\
Do you like green eggs and ham?\r\n\
I do not like them, Sam-I-am.\r\n\
I do not like green eggs and ham.\r\n";

fn run(subcommand: &str,in_path: &Path,out_path: &Path) -> Result<assert_cmd::assert::Assert,Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("treehuff")?;
    Ok(cmd.arg(subcommand)
        .arg("-i").arg(in_path)
        .arg("-o").arg(out_path)
        .assert())
}

// Compress and expand through the binary, compare the end result with the start.
fn round_trip_test(dat: &[u8]) -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("original.txt");
    let cmp_path = temp_dir.path().join("original.huf");
    let out_path = temp_dir.path().join("expanded.txt");
    std::fs::write(&in_path,dat)?;
    run("compress",&in_path,&cmp_path)?
        .success()
        .stderr(predicate::str::contains(format!("compressed {} into",dat.len())));
    run("expand",&cmp_path,&out_path)?
        .success()
        .stderr(predicate::str::contains(format!("into {}",dat.len())));
    match (std::fs::read(cmp_path),std::fs::read(out_path)) {
        (Ok(v1),Ok(v2)) => {
            assert_eq!(v1,treehuff::tree_huff::compress_slice(dat,&treehuff::STD_OPTIONS)?);
            assert_eq!(v2,dat);
        },
        _ => panic!("unable to compare output with reference")
    }
    Ok(())
}

#[test]
fn text_round_trip() -> STDRESULT {
    round_trip_test(SAM.as_bytes())
}

#[test]
fn binary_round_trip() -> STDRESULT {
    let dat: Vec<u8> = (0..20000).map(|i: u32| ((i * i + 17 * i) % 253) as u8).collect();
    round_trip_test(&dat)
}

#[test]
fn empty_round_trip() -> STDRESULT {
    round_trip_test(&[])
}

#[test]
fn compressed_file_starts_with_magic() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("original.txt");
    let cmp_path = temp_dir.path().join("original.huf");
    std::fs::write(&in_path,SAM)?;
    run("compress",&in_path,&cmp_path)?.success();
    let compressed = std::fs::read(cmp_path)?;
    assert_eq!(compressed[0..4],hex::decode("FACE8201")?);
    Ok(())
}

#[test]
fn bad_header_fails() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("not_compressed.txt");
    let out_path = temp_dir.path().join("expanded.txt");
    std::fs::write(&in_path,SAM)?;
    run("expand",&in_path,&out_path)?
        .failure()
        .stderr(predicate::str::contains("BadHeader"));
    Ok(())
}

#[test]
fn truncated_body_fails() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("truncated.huf");
    let out_path = temp_dir.path().join("expanded.txt");
    let compressed = treehuff::tree_huff::compress_slice(SAM.as_bytes(),&treehuff::STD_OPTIONS)?;
    std::fs::write(&in_path,&compressed[0..compressed.len()-1])?;
    run("expand",&in_path,&out_path)?
        .failure()
        .stderr(predicate::str::contains("TruncatedBody"));
    Ok(())
}
