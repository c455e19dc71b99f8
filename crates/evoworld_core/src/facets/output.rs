//! Output manager facet: resolves output paths and tracks open files.

use crate::archive::Archive;
use crate::context::Context;
use crate::error::Result;
use crate::facet::{Facet, FacetType};
use evoworld_data::Update;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const OUTPUT_MANAGER_VERSION: u32 = 1;

pub const OUTPUT_MANAGER_TYPE: &str = "core.outputmanager";

/// A line-oriented output file owned by the output manager.
pub struct OutputFile {
    id: String,
    resumed: bool,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl OutputFile {
    /// Output id; the absolute path the file was opened at.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Opened for append onto a file that already had content.
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(writer) => writeln!(writer, "{line}"),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("output `{}` is closed", self.id),
            )),
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        match self
            .writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Flushes and releases the file handle. Further writes fail.
    fn close(&self) -> io::Result<()> {
        match self
            .writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

pub struct OutputManager {
    root: PathBuf,
    files: Mutex<BTreeMap<String, Arc<OutputFile>>>,
}

impl OutputManager {
    /// Creates a manager rooted at `root`, creating the directory. A relative
    /// root is made absolute against the working directory.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = absolute(root.as_ref())?;
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            files: Mutex::new(BTreeMap::new()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` to an output id (an absolute path).
    ///
    /// Paths are taken relative to the output root unless they are `.`, start
    /// with `./`, `../`, `.\`, or are absolute, in which case they are taken
    /// relative to the working directory. Intermediate directories are created.
    pub fn output_id_from_path(&self, path: &str) -> io::Result<String> {
        let path = path.trim();
        if path.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty output path",
            ));
        }
        let cwd_relative = path == "."
            || path.starts_with("..")
            || path.starts_with("./")
            || path.starts_with(".\\")
            || Path::new(path).is_absolute();
        let base = if cwd_relative {
            std::env::current_dir()?
        } else {
            self.root.clone()
        };

        let resolved = base.join(path);
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(resolved.to_string_lossy().into_owned())
    }

    /// Opens (truncating) the file at `path`, or returns the already-open
    /// handle for the same output id.
    pub fn open(&self, path: &str) -> io::Result<Arc<OutputFile>> {
        self.open_with(path, false)
    }

    /// Like [`OutputManager::open`] but appends to an existing file.
    pub fn open_append(&self, path: &str) -> io::Result<Arc<OutputFile>> {
        self.open_with(path, true)
    }

    fn open_with(&self, path: &str, append: bool) -> io::Result<Arc<OutputFile>> {
        let id = self.output_id_from_path(path)?;
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = files.get(&id) {
            return Ok(Arc::clone(existing));
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&id)?;
        let resumed = append && file.metadata()?.len() > 0;
        let handle = Arc::new(OutputFile {
            id: id.clone(),
            resumed,
            writer: Mutex::new(Some(BufWriter::new(file))),
        });
        tracing::debug!(output = %id, resumed, "opened output file");
        files.insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    #[must_use]
    pub fn is_open(&self, output_id: &str) -> bool {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(output_id)
    }

    /// Closes an output. Returns `Ok(false)` if it was not open.
    pub fn close(&self, output_id: &str) -> io::Result<bool> {
        let removed = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(output_id);
        match removed {
            Some(file) => file.close().map(|()| true),
            None => Ok(false),
        }
    }

    /// Flushes every open output, returning the first error after trying all.
    pub fn flush_all(&self) -> io::Result<()> {
        let files: Vec<Arc<OutputFile>> = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let mut first_err = None;
        for file in files {
            if let Err(err) = file.flush() {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn open_ids(&self) -> Vec<String> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

impl Facet for OutputManager {
    fn facet_type(&self) -> &str {
        OUTPUT_MANAGER_TYPE
    }

    fn perform_update(&self, ctx: &mut Context, update: Update) {
        if let Err(err) = self.flush_all() {
            ctx.feedback_mut()
                .warning(&format!("output flush failed at update {update}: {err}"));
        }
    }

    fn serialize(&self, archive: &mut dyn Archive) -> Result<()> {
        archive.set_version(OUTPUT_MANAGER_VERSION);
        archive.put("root", self.root.to_string_lossy().into_owned())
    }
}

impl FacetType for OutputManager {
    const TYPE_NAME: &'static str = OUTPUT_MANAGER_TYPE;

    /// Reopens nothing; recorders reopen their files when re-wired.
    fn restore(archive: &dyn Archive) -> Result<Self> {
        archive.expect_type(OUTPUT_MANAGER_TYPE, OUTPUT_MANAGER_VERSION)?;
        let root = archive.require_str("root")?;
        Ok(Self::new(root)?)
    }
}

impl Drop for OutputManager {
    fn drop(&mut self) {
        let _ = self.flush_all();
    }
}
