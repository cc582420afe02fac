//! File-backed container behaviour: reopening, lazy loading, locks and modes.

use hdict::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn setup() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("data.hdc");
    (temp_dir, path)
}

fn write_ab(path: &PathBuf) -> Result<()> {
    let c = Container::create(path)?;
    c.set("a", 1)?;
    c.set("b", 2)?;
    c.close()
}

fn open_lazy(path: &PathBuf, mode: OpenMode) -> Result<Container> {
    Container::open(ContainerConfig::new(path, mode).lazy())
}

#[test]
fn test_set_save_reopen() -> Result<()> {
    let (_temp_dir, path) = setup();
    {
        let c = Container::create(&path)?;
        c.set("a", 5)?;
        c.set("name", "run 12")?;
        c.set("trace", vec![0.5, 1.5, 2.5])?;
        c.set(
            "meta",
            Value::from(serde_json::json!({"tags": ["x", 1], "ok": true})),
        )?;
        c.set("settings", Value::map([("gain", Value::Float(2.0))]))?;
        c.save()?;
    }

    let c = open_lazy(&path, OpenMode::Read)?;
    assert_eq!(c.get("a")?, Value::Int(5));
    assert_eq!(c.get("name")?, Value::from("run 12"));
    assert_eq!(c.get("trace")?, Value::from(vec![0.5, 1.5, 2.5]));
    assert_eq!(
        c.get("meta")?,
        Value::from(serde_json::json!({"tags": ["x", 1], "ok": true}))
    );
    assert_eq!(c.get("settings/gain")?, Value::Float(2.0));
    assert!(matches!(c.get("missing"), Err(HdictError::KeyNotFound(_))));
    Ok(())
}

#[test]
fn test_lazy_open_counts() -> Result<()> {
    let (_temp_dir, path) = setup();
    write_ab(&path)?;

    let c = open_lazy(&path, OpenMode::Read)?;
    assert_eq!(c.len(), 2);
    assert_eq!(c.keys_unloaded()?, vec!["a", "b"]);
    assert!(c.contains("b")?);

    assert_eq!(c.get("a")?, Value::Int(1));
    assert_eq!(c.keys_unloaded()?, vec!["b"]);
    let state = c.entry_state("a")?.unwrap();
    assert!(state.loaded && !state.dirty && !state.locked);
    assert_eq!(c.entry_state("b")?.map(|s| s.loaded), Some(false));
    assert_eq!(c.entry_state("zzz")?, None);
    Ok(())
}

#[test]
fn test_eager_open_loads_everything() -> Result<()> {
    let (_temp_dir, path) = setup();
    write_ab(&path)?;
    let c = Container::read(&path)?;
    assert!(c.keys_unloaded()?.is_empty());
    Ok(())
}

#[test]
fn test_nested_groups_load_sparsely() -> Result<()> {
    let (_temp_dir, path) = setup();
    {
        let c = Container::create(&path)?;
        c.set("g/x", 1)?;
        c.set("g/y", 2)?;
        c.set("g/inner/z", 3)?;
    }

    let c = open_lazy(&path, OpenMode::Read)?;
    assert_eq!(
        c.keys_tree()?,
        vec![KeyNode {
            name: "g".into(),
            children: None
        }]
    );
    assert_eq!(c.get("g/x")?, Value::Int(1));
    assert_eq!(c.keys_unloaded()?, vec!["g/y", "g/inner"]);
    assert_eq!(c.entry_state("g/inner/z")?.map(|s| s.loaded), Some(false));

    let g = c.get("g")?;
    assert_eq!(g.get("inner").and_then(|i| i.get("z")), Some(&Value::Int(3)));
    assert!(c.keys_unloaded()?.is_empty());
    Ok(())
}

#[test]
fn test_append_adds_keys() -> Result<()> {
    let (_temp_dir, path) = setup();
    {
        let c = Container::create(&path)?;
        c.set("a", 1)?;
    }
    {
        let c = Container::append(&path)?;
        c.set("b", 2)?;
        c.save()?;
    }
    let c = Container::read(&path)?;
    assert_eq!(c.keys()?, vec!["a", "b"]);
    assert_eq!(c.get("a")?, Value::Int(1));
    assert_eq!(c.get("b")?, Value::Int(2));
    Ok(())
}

#[test]
fn test_lock_rejects_and_keeps_value() -> Result<()> {
    let (_temp_dir, path) = setup();
    write_ab(&path)?;
    let c = Container::append(&path)?;

    c.lock_data(&["a"])?;
    let err = c.set("a", 99).unwrap_err();
    assert!(matches!(
        err,
        HdictError::ReadOnlyKey { ref key, action: "set" } if key == "a"
    ));
    assert_eq!(c.get("a")?, Value::Int(1));
    assert!(!c.has_unsaved_changes());

    c.unlock_data(&["a"])?;
    c.set("a", 99)?;
    assert_eq!(c.get("a")?, Value::Int(99));
    Ok(())
}

#[test]
fn test_lock_all() -> Result<()> {
    let (_temp_dir, path) = setup();
    write_ab(&path)?;
    let c = Container::append(&path)?;
    c.lock_all()?;
    assert!(matches!(
        c.set("a", 99),
        Err(HdictError::ReadOnlyKey { .. })
    ));
    assert!(matches!(c.remove("b"), Err(HdictError::ReadOnlyKey { .. })));
    // update checks every key before applying any
    assert!(c.update([("new", 1), ("a", 2)]).is_err());
    assert!(!c.contains("new")?);
    assert_eq!(c.get("a")?, Value::Int(1));
    assert_eq!(c.locked_keys(), vec!["a", "b"]);

    c.unlock_all()?;
    c.update([("new", 1), ("a", 2)])?;
    assert_eq!(c.get("a")?, Value::Int(2));
    Ok(())
}

#[test]
fn test_locked_array_rejects_element_writes() -> Result<()> {
    let c = Container::in_memory()?;
    c.set("arr", vec![1.0, 2.0])?;
    let mut arr = c.array("arr")?;
    c.lock_data(&["arr"])?;
    assert!(matches!(
        arr.set(&[0], 5.0),
        Err(HdictError::ReadOnlyKey { action: "write", .. })
    ));
    assert!(matches!(
        arr.reshape(vec![2, 1]),
        Err(HdictError::ReadOnlyKey { action: "reshape", .. })
    ));
    assert_eq!(arr.get(&[0])?, Scalar::Float(1.0));
    Ok(())
}

#[test]
fn test_read_mode_is_immutable() -> Result<()> {
    let (_temp_dir, path) = setup();
    write_ab(&path)?;
    let c = Container::read(&path)?;
    assert!(matches!(c.set("a", 2), Err(HdictError::ModeViolation(_))));
    assert!(matches!(c.remove("a"), Err(HdictError::ModeViolation(_))));
    assert!(matches!(c.lock_all(), Err(HdictError::ModeViolation(_))));
    assert!(matches!(
        c.array("a").and_then(|mut a| a.fill(0)),
        Err(HdictError::InvalidState(_))
    ));
    assert!(matches!(
        Container::open_str(&path, "r="),
        Err(HdictError::Config(_))
    ));
    Ok(())
}

#[test]
fn test_write_mode_refuses_existing_file() -> Result<()> {
    let (_temp_dir, path) = setup();
    write_ab(&path)?;
    assert!(matches!(
        Container::create(&path),
        Err(HdictError::FileExists(_))
    ));
    let c = Container::overwrite(&path)?;
    assert!(c.is_empty());
    Ok(())
}

#[test]
fn test_second_writer_is_locked_out() -> Result<()> {
    let (_temp_dir, path) = setup();
    let _first = Container::create(&path)?;
    let second = Container::open(
        ContainerConfig::new(&path, OpenMode::Append)
            .with_store(StoreConfig::default().with_lock_retries(0, 0)),
    );
    assert!(matches!(second, Err(HdictError::FileLocked(_))));
    Ok(())
}

#[test]
fn test_save_on_edit_patches_in_place() -> Result<()> {
    let (_temp_dir, path) = setup();
    let c = Container::open_str(&path, "w=")?;
    c.set("arr", vec![0.0; 1024])?;
    let len = std::fs::metadata(&path)?.len();

    let mut arr = c.array("arr")?;
    arr.set(&[10], 3.0)?;
    assert!(!c.has_unsaved_changes());
    assert_eq!(std::fs::metadata(&path)?.len(), len);
    drop(arr);
    c.close()?;

    let c = open_lazy(&path, OpenMode::Read)?;
    let arr = c.array("arr")?;
    assert_eq!(arr.get(&[10])?, Scalar::Float(3.0));
    assert_eq!(arr.get(&[11])?, Scalar::Float(0.0));
    Ok(())
}

#[test]
fn test_append_edits_existing_array_in_place() -> Result<()> {
    let (_temp_dir, path) = setup();
    {
        let c = Container::create(&path)?;
        c.set("arr", vec![0i64, 0, 0])?;
        c.set("a", 1)?;
    }
    let len = std::fs::metadata(&path)?.len();

    let c = Container::open_str(&path, "a=")?;
    c.array("arr")?.set(&[2], 7)?;
    assert!(!c.has_unsaved_changes());
    assert_eq!(std::fs::metadata(&path)?.len(), len);
    c.set("a", 2)?;
    c.close()?;

    let c = Container::read(&path)?;
    assert_eq!(c.get("arr")?, Value::from(vec![0i64, 0, 7]));
    assert_eq!(c.get("a")?, Value::Int(2));
    Ok(())
}

#[test]
fn test_unload_releases_clean_keys() -> Result<()> {
    let (_temp_dir, path) = setup();
    write_ab(&path)?;
    let c = Container::append(&path)?;
    c.unload(&["a"])?;
    assert_eq!(c.keys_unloaded()?, vec!["a"]);
    assert_eq!(c.get("a")?, Value::Int(1));

    c.set("b", 20)?;
    assert!(matches!(c.unload(&["b"]), Err(HdictError::InvalidState(_))));
    c.unload_all()?;
    assert_eq!(c.keys_unloaded()?, vec!["a"]);
    c.save()?;
    c.unload_all()?;
    assert_eq!(c.keys_unloaded()?, vec!["a", "b"]);
    c.load_all()?;
    assert_eq!(c.get("b")?, Value::Int(20));
    Ok(())
}

#[test]
fn test_summary_format() -> Result<()> {
    let (_temp_dir, path) = setup();
    write_ab(&path)?;
    let c = open_lazy(&path, OpenMode::Append)?;
    c.get("a")?;
    c.set("gain", 0.25)?;
    c.lock_data(&["a"])?;

    let text = c.to_string();
    assert!(text.starts_with("Container (a) (not saved):\n{\n"));
    assert!(text.contains("    \"a\" (r): \"1 (type: i64)\",\n"));
    assert!(text.contains("    \"gain\": \"0.250 (type: f64)\"\n"));
    assert!(text.ends_with("}\nUnloaded keys: {\"b\"}"));

    let empty = Container::in_memory()?;
    assert_eq!(empty.summary(), "Container (memory):\n{}\nUnloaded keys: {}");
    Ok(())
}

#[test]
fn test_attribute_access() -> Result<()> {
    let c = Container::in_memory()?;
    c.set_attr("gain", 2.0)?;
    c.set("7", "seven")?;
    assert_eq!(c.attr("gain")?, Value::Float(2.0));
    assert_eq!(c.attr("i7")?, Value::from("seven"));
    assert!(matches!(c.attr("i8"), Err(HdictError::KeyNotFound(_))));
    Ok(())
}
