//! Save behaviour observed through the in-memory store's write log.

use hdict::prelude::*;
use hdict::{Region, WriteOp};

fn open_on(store: &MemoryStore, config: ContainerConfig, mode: OpenMode) -> Result<Container> {
    Container::open_with_store(config, Box::new(store.reopen(mode)?))
}

fn read_back(store: &MemoryStore) -> Result<Container> {
    open_on(store, ContainerConfig::default(), OpenMode::Read)
}

#[test]
fn test_element_write_is_region_scoped() -> Result<()> {
    let store = MemoryStore::new();
    let c = open_on(
        &store,
        ContainerConfig::in_memory().with_save_on_edit(true),
        OpenMode::Append,
    )?;
    c.set("arr", vec![1.0, 2.0, 3.0, 4.0])?;
    assert_eq!(
        store.ops(),
        vec![WriteOp::Put {
            path: "arr".into()
        }]
    );
    store.clear_ops();

    let mut arr = c.array("arr")?;
    arr.set(&[2], 9.0)?;
    assert_eq!(
        store.ops(),
        vec![WriteOp::PutRegion {
            path: "arr".into(),
            region: Region::new(2, 3),
        }]
    );
    assert!(!c.has_unsaved_changes());

    let reader = read_back(&store)?;
    let stored = reader.get("arr")?;
    assert_eq!(
        stored.as_array().and_then(|a| a.as_f64()),
        Some(&[1.0, 2.0, 9.0, 4.0][..])
    );
    Ok(())
}

#[test]
fn test_regions_accumulate_until_save() -> Result<()> {
    let store = MemoryStore::new();
    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    c.set("arr", vec![0i64; 10])?;
    c.save()?;
    store.clear_ops();

    let mut arr = c.array("arr")?;
    arr.set_flat(1, 5)?;
    arr.set_flat(2, 6)?;
    arr.set_flat(8, 7)?;
    assert!(store.ops().is_empty());
    c.save()?;
    assert_eq!(
        store.ops(),
        vec![
            WriteOp::PutRegion {
                path: "arr".into(),
                region: Region::new(1, 3),
            },
            WriteOp::PutRegion {
                path: "arr".into(),
                region: Region::new(8, 9),
            },
        ]
    );
    Ok(())
}

#[test]
fn test_reshape_forces_full_rewrite() -> Result<()> {
    let store = MemoryStore::new();
    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    c.set("arr", vec![1.0, 2.0, 3.0, 4.0])?;
    c.save()?;
    store.clear_ops();

    let mut arr = c.array("arr")?;
    arr.set(&[0], 0.5)?;
    arr.reshape(vec![2, 2])?;
    c.save()?;
    assert_eq!(
        store.ops(),
        vec![WriteOp::Put {
            path: "arr".into()
        }]
    );
    assert_eq!(read_back(&store)?.array("arr")?.shape()?, vec![2, 2]);
    Ok(())
}

#[test]
fn test_unpatchable_region_widens_to_full_put() -> Result<()> {
    let store = MemoryStore::new();
    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    c.set("arr", vec![1i64, 2, 3])?;
    c.save()?;

    // the stored copy goes away behind the container's back
    store.reopen(OpenMode::Append)?.delete("arr")?;
    store.clear_ops();

    c.array("arr")?.set(&[0], 10)?;
    c.save()?;
    assert_eq!(
        store.ops(),
        vec![WriteOp::Put {
            path: "arr".into()
        }]
    );
    assert_eq!(read_back(&store)?.get("arr")?, Value::from(vec![10i64, 2, 3]));
    Ok(())
}

#[test]
fn test_second_save_writes_nothing() -> Result<()> {
    let store = MemoryStore::new();
    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    c.set("a", 5)?;
    c.set("g/x", "text")?;
    c.save()?;
    assert!(!store.ops().is_empty());

    store.clear_ops();
    let flushes = store.flush_count();
    c.save()?;
    assert!(store.ops().is_empty());
    assert_eq!(store.flush_count(), flushes);
    Ok(())
}

#[test]
fn test_partial_save_failure_keeps_failed_keys_dirty() -> Result<()> {
    let store = MemoryStore::new();
    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    c.set("a", 1)?;
    c.set("b", 2)?;
    c.set("c", 3)?;
    store.fail_on("b");

    let err = c.save().unwrap_err();
    assert!(matches!(err, HdictError::SaveFailed(_)));
    assert_eq!(err.failed_keys(), vec!["b"]);
    assert_eq!(c.dirty_keys(), vec!["b"]);

    store.clear_failures();
    c.save()?;
    assert!(!c.has_unsaved_changes());
    let mut keys = read_back(&store)?.keys()?;
    keys.sort();
    assert_eq!(keys, vec!["a", "b", "c"]);
    Ok(())
}

#[test]
fn test_deletions_are_replayed() -> Result<()> {
    let store = MemoryStore::new();
    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    c.set("keep", 1)?;
    c.set("drop", 2)?;
    c.save()?;
    store.clear_ops();

    c.remove("drop")?;
    c.save()?;
    assert_eq!(
        store.ops(),
        vec![WriteOp::Delete {
            path: "drop".into()
        }]
    );
    assert_eq!(read_back(&store)?.keys()?, vec!["keep"]);
    Ok(())
}

#[test]
fn test_save_keys_leaves_others_dirty() -> Result<()> {
    let store = MemoryStore::new();
    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    c.set("a", 1)?;
    c.set("g/x", 2)?;
    c.set("g/y", 3)?;
    c.save_keys(&["g/x"])?;
    assert_eq!(c.dirty_keys(), vec!["a"]);

    let mut arr = c.bind("arr", SyncArray::new(NdArray::from_vec(vec![1.0, 2.0])))?;
    arr.fill(0.0)?;
    arr.save()?;
    assert_eq!(c.dirty_keys(), vec!["a"]);
    Ok(())
}

#[test]
fn test_close_flushes_by_default() -> Result<()> {
    let store = MemoryStore::new();
    {
        let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
        c.set("a", 1)?;
        // dropped with unsaved changes
    }
    assert_eq!(read_back(&store)?.get("a")?, Value::Int(1));
    Ok(())
}

#[test]
fn test_close_with_warn_policy_discards() -> Result<()> {
    let store = MemoryStore::new();
    let c = open_on(
        &store,
        ContainerConfig::in_memory().with_close_policy(ClosePolicy::Warn),
        OpenMode::Append,
    )?;
    c.set("a", 1)?;
    c.close()?;
    assert!(store.ops().is_empty());
    assert!(!read_back(&store)?.contains("a")?);
    Ok(())
}

#[test]
fn test_close_reports_failed_flush_and_releases() -> Result<()> {
    let store = MemoryStore::new();
    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    c.set("a", 1)?;
    store.fail_on("a");
    assert!(matches!(c.close(), Err(HdictError::SaveFailed(_))));
    assert!(c.is_closed());
    assert!(matches!(c.get("a"), Err(HdictError::Closed)));
    Ok(())
}

#[test]
fn test_handles_fail_after_close() -> Result<()> {
    let store = MemoryStore::new();
    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    c.set("arr", vec![1.0, 2.0])?;
    let mut arr = c.array("arr")?;
    c.close()?;
    assert!(matches!(arr.set(&[0], 5.0), Err(HdictError::Closed)));
    assert!(matches!(arr.to_array(), Err(HdictError::Closed)));

    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    let mut arr = c.array("arr")?;
    drop(c);
    assert!(matches!(arr.fill(0.0), Err(HdictError::Closed)));
    Ok(())
}

#[test]
fn test_append_updates_existing_keys_by_default() -> Result<()> {
    let store = MemoryStore::new();
    {
        let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Write)?;
        c.set("a", 1)?;
        c.set("arr", vec![0.0, 0.0, 0.0])?;
        c.close()?;
    }

    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    c.set("a", 2)?;
    store.clear_ops();
    c.array("arr")?.set(&[1], 4.0)?;
    c.save()?;
    assert_eq!(
        store.ops(),
        vec![
            WriteOp::Put { path: "a".into() },
            WriteOp::PutRegion {
                path: "arr".into(),
                region: Region::new(1, 2),
            },
        ]
    );
    c.close()?;

    let reader = read_back(&store)?;
    assert_eq!(reader.get("a")?, Value::Int(2));
    assert_eq!(reader.get("arr")?, Value::from(vec![0.0, 4.0, 0.0]));
    Ok(())
}

#[test]
fn test_append_reject_policy_refuses_existing_keys() -> Result<()> {
    let store = MemoryStore::new();
    {
        let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Write)?;
        c.set("a", 1)?;
        c.set("arr", vec![1.0, 2.0])?;
        c.close()?;
    }

    let reject = ContainerConfig::in_memory().with_append_policy(AppendPolicy::Reject);
    let c = open_on(&store, reject, OpenMode::Append)?;
    assert!(matches!(c.set("a", 2), Err(HdictError::AppendConflict(_))));
    assert!(matches!(c.remove("a"), Err(HdictError::AppendConflict(_))));
    assert!(matches!(
        c.array("arr")?.set(&[0], 3.0),
        Err(HdictError::AppendConflict(_))
    ));
    c.set("b", 2)?;
    c.set("b", 3)?;
    assert_eq!(c.get("a")?, Value::Int(1));
    c.close()?;

    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Append)?;
    c.set("a", 10)?;
    c.save()?;
    assert_eq!(read_back(&store)?.get("a")?, Value::Int(10));
    Ok(())
}

#[test]
fn test_write_mode_refuses_existing_content() -> Result<()> {
    let store = MemoryStore::new();
    {
        let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Write)?;
        c.set("a", 1)?;
    }
    assert!(matches!(
        store.reopen(OpenMode::Write),
        Err(HdictError::FileExists(_))
    ));
    let c = open_on(&store, ContainerConfig::in_memory(), OpenMode::Overwrite)?;
    assert!(c.is_empty());
    Ok(())
}
