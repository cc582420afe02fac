use crate::format::{
    decode_header, encode_header, upsert, FileIndex, Footer, IndexNode, FOOTER_LEN, HEADER_LEN,
    MAGIC,
};
use crate::lock::LockFile;
use hdict_core::{
    config::{OpenMode, StoreConfig},
    error::{HdictError, Result},
    traits::HierarchicalStore,
    types::{key, Dataset, NodeInfo, Region},
};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Size accounting for a file store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStoreStats {
    /// Current length of the file in bytes
    pub file_len: u64,

    /// Bytes of data blocks still referenced by the index
    pub live_bytes: u64,
}

impl FileStoreStats {
    /// Bytes a compaction would reclaim, roughly
    pub fn garbage_bytes(&self) -> u64 {
        self.file_len.saturating_sub(self.live_bytes + HEADER_LEN + FOOTER_LEN)
    }
}

/// Single-file hierarchical store
///
/// Dataset writes append a data block; the index is rewritten at the end of
/// the file on `flush`. Region writes patch an existing block in place.
pub struct FileStore {
    path: PathBuf,
    mode: OpenMode,
    config: StoreConfig,
    file: Option<File>,
    index: FileIndex,
    /// Where the next data block goes
    append_pos: u64,
    index_dirty: bool,
    data_dirty: bool,
    _lock: Option<LockFile>,
}

impl FileStore {
    /// Open or create a store file
    ///
    /// - `Read`: the file must exist; opened read-only without a lock
    /// - `Write`: creates the file, failing with `FileExists` if it exists
    /// - `Append`: opens the file, creating it if missing
    /// - `Overwrite`: creates the file, truncating any existing content
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if mode == OpenMode::Read {
            let mut file = File::open(&path)?;
            let (index, end) = read_index(&mut file, &path)?;
            info!("Opened {} for reading", path.display());
            return Ok(Self {
                path,
                mode,
                config,
                file: Some(file),
                index,
                append_pos: end,
                index_dirty: false,
                data_dirty: false,
                _lock: None,
            });
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let lock = if config.use_lock_file {
            Some(LockFile::acquire(
                &path,
                config.lock_retries,
                Duration::from_millis(config.lock_retry_delay_ms),
            )?)
        } else {
            None
        };

        let exists = path.exists();
        if exists && mode == OpenMode::Write {
            return Err(HdictError::FileExists(path));
        }

        let mut store = if exists && mode == OpenMode::Append {
            let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
            let (index, end) = read_index(&mut file, &path)?;
            if file.metadata()?.len() > end {
                // drop whatever followed the last valid footer
                file.set_len(end)?;
            }
            info!("Opened {} for appending", path.display());
            Self {
                path,
                mode,
                config,
                file: Some(file),
                index,
                append_pos: end,
                index_dirty: false,
                data_dirty: false,
                _lock: lock,
            }
        } else {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            file.write_all(&encode_header())?;
            info!("Created {}", path.display());
            Self {
                path,
                mode,
                config,
                file: Some(file),
                index: FileIndex::default(),
                append_pos: HEADER_LEN,
                index_dirty: true,
                data_dirty: true,
                _lock: lock,
            }
        };

        // a freshly created file is readable as soon as open returns
        if store.index_dirty {
            store.flush()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> Result<FileStoreStats> {
        Ok(FileStoreStats {
            file_len: self.handle()?.metadata()?.len(),
            live_bytes: self.index.live_bytes(),
        })
    }

    /// Creation timestamp recorded in the file
    pub fn created_at(&self) -> &str {
        &self.index.meta.created_at
    }

    /// Rewrite the file keeping only live data
    ///
    /// Live blocks are copied into a sibling temporary file which then
    /// replaces the original.
    pub fn compact(&mut self) -> Result<FileStoreStats> {
        self.check_writable("compact")?;
        let before = self.stats()?.file_len;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".compact");
        let tmp_path = PathBuf::from(tmp_name);

        let mut index = self.index.clone();
        let mut out = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        out.write_all(&encode_header())?;
        let mut pos = HEADER_LEN;
        {
            let source = self.handle()?;
            for node in index.datasets_mut() {
                if let IndexNode::Dataset { offset, len, .. } = node {
                    let block = read_block(source, *offset, *len)?;
                    out.write_all(&block)?;
                    *offset = pos;
                    pos += *len;
                }
            }
        }
        index.meta.touch();
        let end = write_index(&mut out, pos, &index)?;
        out.sync_all()?;
        drop(out);

        self.file = None;
        let renamed = std::fs::rename(&tmp_path, &self.path);
        self.file = Some(OpenOptions::new().read(true).write(true).open(&self.path)?);
        renamed?;
        self.index = index;
        self.append_pos = end;
        self.index_dirty = false;
        self.data_dirty = false;

        let stats = self.stats()?;
        info!(
            "Compacted {}: {} -> {} bytes",
            self.path.display(),
            before,
            stats.file_len
        );
        Ok(stats)
    }

    fn handle(&self) -> Result<&File> {
        self.file.as_ref().ok_or(HdictError::Closed)
    }

    fn check_writable(&self, action: &str) -> Result<()> {
        if self.file.is_none() {
            return Err(HdictError::Closed);
        }
        if !self.mode.is_writable() {
            return Err(HdictError::ModeViolation(action.to_string()));
        }
        Ok(())
    }
}

/// Read the index of an open file, recovering from a torn tail.
///
/// Returns the index and the offset just past its footer.
fn read_index(file: &mut File, path: &Path) -> Result<(FileIndex, u64)> {
    let len = file.metadata()?.len();
    if len < HEADER_LEN + FOOTER_LEN {
        return Err(HdictError::Corrupt(format!(
            "{} is too short to be an hdict file",
            path.display()
        )));
    }
    let mut header = [0u8; HEADER_LEN as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;
    decode_header(&header)?;

    let mut tail = [0u8; FOOTER_LEN as usize];
    file.seek(SeekFrom::Start(len - FOOTER_LEN))?;
    file.read_exact(&mut tail)?;
    if let Some(footer) = Footer::decode(&tail, len - FOOTER_LEN) {
        let bytes = read_block(file, footer.index_offset, footer.index_len as u64)?;
        if let Ok(index) = FileIndex::from_bytes(&bytes) {
            return Ok((index, len));
        }
    }

    // The last write did not complete. Fall back to the newest intact footer.
    let mut contents = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut contents)?;
    let min_end = (HEADER_LEN + FOOTER_LEN) as usize;
    let mut end = contents.len();
    while end >= min_end {
        if &contents[end - MAGIC.len()..end] == MAGIC {
            let footer_at = end - FOOTER_LEN as usize;
            if let Some(footer) = Footer::decode(&contents[footer_at..end], footer_at as u64) {
                let start = footer.index_offset as usize;
                if let Ok(index) = FileIndex::from_bytes(&contents[start..footer_at]) {
                    warn!(
                        "Recovered index of {}; discarding {} trailing bytes",
                        path.display(),
                        contents.len() - end
                    );
                    return Ok((index, end as u64));
                }
            }
        }
        end -= 1;
    }
    Err(HdictError::Corrupt(format!(
        "{} has no readable index",
        path.display()
    )))
}

fn read_block(mut file: &File, offset: u64, len: u64) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Write index and footer at `pos`, returning the offset past the footer.
fn write_index(mut file: &File, pos: u64, index: &FileIndex) -> Result<u64> {
    let bytes = index.to_bytes()?;
    let index_len = u32::try_from(bytes.len())
        .map_err(|_| HdictError::Serialization("index exceeds 4 GiB".into()))?;
    let footer = Footer {
        index_offset: pos,
        index_len,
    };
    file.seek(SeekFrom::Start(pos))?;
    file.write_all(&bytes)?;
    file.write_all(&footer.encode())?;
    Ok(pos + bytes.len() as u64 + FOOTER_LEN)
}

fn segments(path: &str) -> Result<Vec<&str>> {
    if path.trim_matches(key::SEPARATOR).is_empty() {
        Ok(Vec::new())
    } else {
        key::split(path)
    }
}

fn parent_conflict(path: &str) -> HdictError {
    HdictError::InvalidState(format!("a parent of '{path}' is a dataset"))
}

impl HierarchicalStore for FileStore {
    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn info(&self, path: &str) -> Result<Option<NodeInfo>> {
        self.handle()?;
        let segs = segments(path)?;
        if segs.is_empty() {
            return Ok(Some(NodeInfo::Group));
        }
        Ok(self.index.find(&segs).map(IndexNode::info))
    }

    fn get(&self, path: &str) -> Result<Dataset> {
        let file = self.handle()?;
        let segs = segments(path)?;
        match self.index.find(&segs) {
            Some(IndexNode::Dataset {
                dtype,
                shape,
                offset,
                len,
            }) => {
                debug!("Reading '{}' ({} bytes)", path, len);
                let data = read_block(file, *offset, *len)?;
                Dataset::new(*dtype, shape.clone(), data)
            }
            Some(IndexNode::Group { .. }) => Err(HdictError::InvalidState(format!(
                "'{path}' is a group, not a dataset"
            ))),
            None => Err(HdictError::KeyNotFound(path.to_string())),
        }
    }

    fn put(&mut self, path: &str, dataset: Dataset) -> Result<()> {
        self.check_writable(&format!("write '{path}'"))?;
        dataset.validate()?;
        let segs = key::split(path)?;
        let (last, parents) = segs
            .split_last()
            .ok_or_else(|| HdictError::InvalidKey("cannot put a dataset at the root".into()))?;
        if self.index.group_mut(parents, false).is_none() && self.index.find(parents).is_some() {
            return Err(parent_conflict(path));
        }

        let offset = self.append_pos;
        {
            let mut file = self.handle()?;
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&dataset.data)?;
        }
        self.append_pos += dataset.data.len() as u64;
        self.data_dirty = true;

        let group = self
            .index
            .group_mut(parents, true)
            .ok_or_else(|| parent_conflict(path))?;
        upsert(
            group,
            last,
            IndexNode::Dataset {
                dtype: dataset.dtype,
                shape: dataset.shape,
                offset,
                len: dataset.data.len() as u64,
            },
        );
        self.index_dirty = true;
        debug!("Wrote '{}' ({} bytes at {})", path, dataset.data.len(), offset);
        Ok(())
    }

    fn create_group(&mut self, path: &str) -> Result<()> {
        self.check_writable(&format!("create group '{path}'"))?;
        let segs = key::split(path)?;
        let (last, parents) = segs
            .split_last()
            .ok_or_else(|| HdictError::InvalidKey("the root group always exists".into()))?;
        let group = self
            .index
            .group_mut(parents, true)
            .ok_or_else(|| parent_conflict(path))?;
        let is_group = matches!(
            group.iter().find(|e| e.name == *last),
            Some(e) if matches!(e.node, IndexNode::Group { .. })
        );
        if !is_group {
            upsert(
                group,
                last,
                IndexNode::Group {
                    children: Vec::new(),
                },
            );
            self.index_dirty = true;
        }
        Ok(())
    }

    fn put_region(&mut self, path: &str, region: Region, bytes: &[u8]) -> Result<()> {
        self.check_writable(&format!("write '{path}'"))?;
        let unpatchable = |reason: &str| HdictError::Unpatchable {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        let segs = key::split(path)?;
        let (dtype, shape, offset) = match self.index.find(&segs) {
            Some(IndexNode::Dataset {
                dtype,
                shape,
                offset,
                ..
            }) => (*dtype, shape.clone(), *offset),
            _ => return Err(unpatchable("no such dataset")),
        };
        let size = dtype
            .element_size()
            .ok_or_else(|| unpatchable("text datasets cannot be patched"))?;
        let count: usize = shape.iter().product();
        if region.end > count {
            return Err(unpatchable("region exceeds the stored shape"));
        }
        if bytes.len() != region.len() * size {
            return Err(unpatchable("byte length does not match the region"));
        }

        let at = offset + (region.start * size) as u64;
        let mut file = self.handle()?;
        file.seek(SeekFrom::Start(at))?;
        file.write_all(bytes)?;
        self.data_dirty = true;
        debug!(
            "Patched '{}' elements {}..{} ({} bytes)",
            path,
            region.start,
            region.end,
            bytes.len()
        );
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<bool> {
        self.check_writable(&format!("delete '{path}'"))?;
        let segs = key::split(path)?;
        let Some((last, parents)) = segs.split_last() else {
            return Ok(false);
        };
        let Some(group) = self.index.group_mut(parents, false) else {
            return Ok(false);
        };
        let Some(pos) = group.iter().position(|e| e.name == *last) else {
            return Ok(false);
        };
        group.remove(pos);
        self.index_dirty = true;
        debug!("Deleted '{}'", path);
        Ok(true)
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>> {
        self.handle()?;
        let segs = segments(path)?;
        match self.index.children(&segs) {
            Some(children) => Ok(children.iter().map(|e| e.name.clone()).collect()),
            None if self.index.find(&segs).is_some() => Err(HdictError::InvalidState(format!(
                "'{path}' is not a group"
            ))),
            None => Err(HdictError::KeyNotFound(path.to_string())),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if !self.mode.is_writable() {
            return Ok(());
        }
        let file = self.file.as_ref().ok_or(HdictError::Closed)?;
        if self.index_dirty {
            self.index.meta.touch();
            self.append_pos = write_index(file, self.append_pos, &self.index)?;
        }
        if (self.index_dirty || self.data_dirty) && self.config.sync_on_flush {
            file.sync_data()?;
        }
        self.index_dirty = false;
        self.data_dirty = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        let result = self.flush();
        self.file = None;
        self._lock = None;
        info!("Closed {}", self.path.display());
        result
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to flush {} on drop: {}", self.path.display(), e);
        }
    }
}
