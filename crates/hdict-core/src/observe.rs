//! Optional metrics instrumentation for hdict.
//!
//! When the `observe` feature is enabled, loads and writes emit counters and
//! histograms via the [`metrics`] crate. A downstream application must install
//! a metrics recorder to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a lazy load of one key.
///
/// - `hdict.load.total` – counter
/// - `hdict.load.duration_seconds` – histogram
#[inline]
pub fn record_load(duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("hdict.load.total").increment(1);
        metrics::histogram!("hdict.load.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = duration;
    }
}

/// Record a save pass.
///
/// - `hdict.save.total` – counter with `outcome` label (`ok` / `fail`)
/// - `hdict.save.keys_written` – histogram of keys written per save
/// - `hdict.save.duration_seconds` – histogram
#[inline]
pub fn record_save(duration: std::time::Duration, keys_written: usize, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("hdict.save.total", "outcome" => outcome).increment(1);
        metrics::histogram!("hdict.save.keys_written").record(keys_written as f64);
        metrics::histogram!("hdict.save.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, keys_written, success);
    }
}

/// Record a region-scoped (in-place) write.
///
/// - `hdict.write.region_total` – counter
/// - `hdict.write.region_bytes` – histogram
#[inline]
pub fn record_region_write(bytes: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("hdict.write.region_total").increment(1);
        metrics::histogram!("hdict.write.region_bytes").record(bytes as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = bytes;
    }
}

/// Record a full-value write of one key.
///
/// - `hdict.write.full_total` – counter
#[inline]
pub fn record_full_write() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("hdict.write.full_total").increment(1);
    }
}

/// Record a region write that had to fall back to a full put.
///
/// - `hdict.write.widened_total` – counter
#[inline]
pub fn record_widened() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("hdict.write.widened_total").increment(1);
    }
}

/// Set the number of keys with unsaved changes.
///
/// - `hdict.dirty_keys` – gauge
#[inline]
pub fn set_dirty_keys(count: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("hdict.dirty_keys").set(count as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}
