use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use silt::{
    merge_readers, merge_sorted_readers, sort_by_calculated_key, sort_reader, ContentReader,
    ContentWriter, Record, SortableRecord,
};

#[derive(Debug, Serialize, Deserialize)]
struct Artifact {
    path: String,
    sha: String,
}

impl SortableRecord for Artifact {
    fn sort_key(&self) -> String {
        self.path.clone()
    }
}

/// Writes `count` artifacts into a fresh container and returns a reader
/// owning it.
fn seed_reader(count: usize, prefix: &str) -> Result<ContentReader> {
    let mut writer = ContentWriter::new("results", true, false)?;
    for i in 0..count {
        writer.write(&json!({"path": format!("{prefix}{i:04}"), "sha": format!("{i:x}")}));
    }
    writer.close()?;
    Ok(ContentReader::new(
        writer.file_path().to_path_buf(),
        "results",
    ))
}

fn drain(reader: &ContentReader) -> Vec<Value> {
    let mut records = Vec::new();
    while let Ok(Some(record)) = reader.next_record::<Value>() {
        records.push(record);
    }
    records
}

#[test]
fn test_write_read_pipeline() -> Result<()> {
    let mut reader = seed_reader(1000, "libs/")?;
    assert_eq!(reader.length()?, 1000);

    let records = drain(&reader);
    assert_eq!(records.len(), 1000);
    assert_eq!(records[0]["path"], "libs/0000");
    assert_eq!(records[999]["path"], "libs/0999");

    let owned = reader.files_paths().to_vec();
    reader.close()?;
    for path in owned {
        assert!(!path.exists());
    }
    Ok(())
}

#[test]
fn test_concatenate_then_sort() -> Result<()> {
    let inputs = vec![seed_reader(10, "b/")?, seed_reader(10, "a/")?];

    let mut merged = merge_readers(&inputs, "results")?;
    assert_eq!(merged.length()?, 20);

    let mut sorted = sort_by_calculated_key(
        &mut merged,
        |record: &Record| {
            Ok(record
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string())
        },
        true,
    )?;
    let records = drain(&sorted);
    assert_eq!(records.len(), 20);
    let paths: Vec<&str> = records.iter().map(|r| r["path"].as_str().unwrap()).collect();
    let mut expected = paths.clone();
    expected.sort_unstable();
    assert_eq!(paths, expected);
    assert_eq!(paths[0], "a/0000");

    sorted.close()?;
    merged.close()?;
    for mut reader in inputs {
        reader.close()?;
    }
    Ok(())
}

#[test]
fn test_independent_sorts_then_sorted_merge() -> Result<()> {
    let mut first = seed_reader(8, "x/")?;
    let mut second = seed_reader(8, "y/")?;

    let sorted_first = sort_reader::<Artifact>(&mut first, true)?;
    let sorted_second = sort_reader::<Artifact>(&mut second, true)?;

    let inputs = vec![sorted_first, sorted_second];
    let mut merged = merge_sorted_readers::<Artifact>(&inputs, true)?;

    let mut paths = Vec::new();
    while let Ok(Some(artifact)) = merged.next_record::<Artifact>() {
        paths.push(artifact.path);
    }
    assert_eq!(paths.len(), 16);
    let mut expected = paths.clone();
    expected.sort_unstable();
    assert_eq!(paths, expected);

    merged.close()?;
    for mut reader in inputs {
        reader.close()?;
    }
    for mut reader in [first, second] {
        reader.close()?;
    }
    Ok(())
}

#[test]
fn test_compressed_container_end_to_end() -> Result<()> {
    let mut writer = ContentWriter::new("results", true, true)?;
    for i in 0..200 {
        writer.write(&json!({"path": format!("pkg/{i}"), "sha": "0"}));
    }
    writer.close()?;

    let mut reader = ContentReader::new(writer.file_path().to_path_buf(), "results");
    assert_eq!(reader.length()?, 200);
    reader.close()?;
    Ok(())
}
