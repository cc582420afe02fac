//! Basic hdict Usage Example
//!
//! This example demonstrates:
//! - Creating a file and storing scalars, arrays and nested groups
//! - Reopening lazily and loading values on demand
//! - Patching array elements in place with save-on-edit
//! - Locking keys
//!
//! Run with: cargo run --example basic_usage

use hdict::prelude::*;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("hdict=debug,hdict_file=info")
        .init();

    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("run.hdc");

    // 1. Create and fill
    println!("Step 1: creating {}", path.display());
    {
        let data = Container::create(&path)?;
        data.set("gain", 2.5)?;
        data.set("label", "calibration run")?;
        data.set("trace", vec![0.0; 16])?;
        data.set("settings/filter/order", 4)?;
        data.set("settings/filter/cutoff", 1200.0)?;
        data.save()?;
        println!("{data}\n");
    }

    // 2. Lazy reopen
    println!("Step 2: lazy reopen");
    {
        let data = Container::open(ContainerConfig::new(&path, OpenMode::Read).lazy())?;
        println!("   unloaded: {:?}", data.keys_unloaded()?);
        println!("   gain = {:?}", data.get("gain")?);
        println!("   order = {:?}", data.get("settings/filter/order")?);
        println!("   unloaded: {:?}\n", data.keys_unloaded()?);
    }

    // 3. Save-on-edit with element patches
    println!("Step 3: save-on-edit");
    {
        let data = Container::open_str(&path, "a=")?;
        data.set("run", 7)?;
        data.bind("samples", SyncArray::new(NdArray::from_vec(vec![0i64; 8])))?;
        let mut samples = data.array("samples")?;
        for i in 0..8 {
            samples.set(&[i], (i * i) as i64)?;
        }
        println!("   samples = {:?}", samples.to_array()?.as_i64());
        println!("   unsaved changes: {}\n", data.has_unsaved_changes());
    }

    // 4. Locks
    println!("Step 4: locks");
    {
        let data = Container::append(&path)?;
        data.lock_data(&["gain"])?;
        match data.set("gain", 3.0) {
            Err(e) => println!("   rejected: {e}"),
            Ok(()) => println!("   unexpectedly accepted"),
        }
        data.unlock_all()?;
        data.set("gain", 3.0)?;
        println!("{data}");
    }

    Ok(())
}
