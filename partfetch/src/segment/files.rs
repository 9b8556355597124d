//! On-disk segment files and the asset directory.
//!
//! For a target named `dump.rar` the asset directory holds:
//!
//! ```text
//! dump-part-1.tmp    segment 1 while streaming
//! dump-part-1.rar    segment 1 once committed
//! dump-part-2.rar
//! dump.rar           merged output
//! .partfetch-target  URL of the artifact being downloaded
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::download::{DownloadError, DownloadResult};
use crate::naming;

/// Extension of segment files that are still being written.
pub const TEMP_EXTENSION: &str = "tmp";

/// Infix between the base name and the part number.
const PART_INFIX: &str = "-part-";

/// File in the asset directory recording the URL of the current target.
const TARGET_FILE: &str = ".partfetch-target";

/// A committed segment file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    /// 1-based part number parsed from the file name.
    pub part: u32,
    /// Full path.
    pub path: PathBuf,
    /// Size on disk.
    pub size: u64,
}

/// Naming scheme for the segment files of one target.
#[derive(Debug, Clone)]
pub struct SegmentLayout {
    dir: PathBuf,
    file_name: String,
    base_name: String,
    extension: Option<String>,
}

impl SegmentLayout {
    /// Layout for the output file `file_name` inside `dir`.
    pub fn new(dir: impl Into<PathBuf>, file_name: &str) -> Self {
        let (base, ext) = naming::split_extension(file_name);
        Self {
            dir: dir.into(),
            file_name: file_name.to_string(),
            base_name: base.to_string(),
            extension: ext.map(str::to_string),
        }
    }

    /// Directory holding segments and output.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Output file name without extension.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Path of the merged output.
    pub fn output_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Committed path of `part` (1-based).
    pub fn part_path(&self, part: u32) -> PathBuf {
        let name = match &self.extension {
            Some(ext) => format!("{}{}{}.{}", self.base_name, PART_INFIX, part, ext),
            None => format!("{}{}{}", self.base_name, PART_INFIX, part),
        };
        self.dir.join(name)
    }

    /// Temporary path of `part` (1-based) while it is being written.
    pub fn temp_path(&self, part: u32) -> PathBuf {
        self.dir.join(format!(
            "{}{}{}.{}",
            self.base_name, PART_INFIX, part, TEMP_EXTENSION
        ))
    }

    /// Part number of a committed segment file name, if it belongs to this
    /// layout.
    pub fn parse_part(&self, file_name: &str) -> Option<u32> {
        let rest = file_name
            .strip_prefix(self.base_name.as_str())?
            .strip_prefix(PART_INFIX)?;
        let number = match &self.extension {
            Some(ext) => rest.strip_suffix(ext.as_str())?.strip_suffix('.')?,
            None => rest,
        };
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        number.parse().ok()
    }

    /// All committed segment files of this layout, sorted by part number.
    pub fn discover(&self) -> DownloadResult<Vec<SegmentFile>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DownloadError::read(&self.dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DownloadError::read(&self.dir, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(part) = self.parse_part(&name) else {
                continue;
            };
            let meta = entry
                .metadata()
                .map_err(|e| DownloadError::read(entry.path(), e))?;
            if !meta.is_file() {
                continue;
            }
            files.push(SegmentFile {
                part,
                path: entry.path(),
                size: meta.len(),
            });
        }

        files.sort_by_key(|f| f.part);
        Ok(files)
    }

    /// Committed segment files in order, failing on any gap.
    ///
    /// With `expected` set, every part from 1 through `expected` must exist.
    pub fn sorted_parts(&self, expected: Option<u32>) -> DownloadResult<Vec<SegmentFile>> {
        let files = self.discover()?;
        let parts: Vec<u32> = files.iter().map(|f| f.part).collect();
        check_contiguous(&parts, expected)?;
        Ok(files)
    }

    /// Sum of the sizes of all committed segment files.
    pub fn committed_bytes(&self) -> DownloadResult<u64> {
        Ok(self.discover()?.iter().map(|f| f.size).sum())
    }

    /// Delete every committed and temporary segment file of this layout.
    ///
    /// Returns the number of files removed.
    pub fn remove_segments(&self) -> DownloadResult<usize> {
        let mut removed = 0;
        for file in self.discover()? {
            fs::remove_file(&file.path).map_err(|e| DownloadError::write(&file.path, e))?;
            removed += 1;
        }

        let temp_prefix = format!("{}{}", self.base_name, PART_INFIX);
        let temp_suffix = format!(".{}", TEMP_EXTENSION);
        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if name.starts_with(&temp_prefix) && name.ends_with(&temp_suffix) {
                    fs::remove_file(entry.path())
                        .map_err(|e| DownloadError::write(entry.path(), e))?;
                    removed += 1;
                }
            }
        }

        debug!(dir = %self.dir.display(), base = %self.base_name, removed, "Removed segment files");
        Ok(removed)
    }
}

/// Require `parts` (sorted ascending) to be an unbroken run starting at 1.
///
/// With `expected` set, the run must also reach `expected`.
pub fn check_contiguous(parts: &[u32], expected: Option<u32>) -> DownloadResult<()> {
    let mut next = 1;
    for &part in parts {
        if part != next {
            return Err(DownloadError::Gap { part: next });
        }
        next += 1;
    }
    if let Some(expected) = expected {
        if next <= expected {
            return Err(DownloadError::Gap { part: next });
        }
    }
    Ok(())
}

/// The directory holding every segment file and merged output of the
/// current target.
#[derive(Debug, Clone)]
pub struct AssetDirectory {
    root: PathBuf,
}

impl AssetDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the directory if needed.
    pub fn ensure(&self) -> DownloadResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| DownloadError::CreateDirFailed {
            path: self.root.clone(),
            source: e,
        })
    }

    /// Segment layout for the output file `file_name`.
    pub fn layout(&self, file_name: &str) -> SegmentLayout {
        SegmentLayout::new(&self.root, file_name)
    }

    /// Base names that have segment files (committed or temporary) in the
    /// directory, i.e. targets with work in progress.
    pub fn tracked_base_names(&self) -> DownloadResult<BTreeSet<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(DownloadError::read(&self.root, e)),
        };

        let mut names = BTreeSet::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(base) = segment_base_name(name) {
                names.insert(base.to_string());
            }
        }
        Ok(names)
    }

    /// URL recorded by [`record_target`](Self::record_target), if any.
    pub fn recorded_target(&self) -> DownloadResult<Option<String>> {
        let path = self.root.join(TARGET_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let url = contents.trim();
                Ok((!url.is_empty()).then(|| url.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DownloadError::read(path, e)),
        }
    }

    /// Record `url` as the artifact the directory's segments belong to.
    pub fn record_target(&self, url: &str) -> DownloadResult<()> {
        self.ensure()?;
        let path = self.root.join(TARGET_FILE);
        fs::write(&path, url).map_err(|e| DownloadError::write(path, e))
    }

    /// Remove everything inside the directory, keeping the directory itself.
    pub fn clear(&self) -> DownloadResult<()> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(DownloadError::read(&self.root, e)),
        };

        let mut removed = 0usize;
        for entry in entries {
            let entry = entry.map_err(|e| DownloadError::read(&self.root, e))?;
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove asset"),
            }
        }

        info!(dir = %self.root.display(), removed, "Cleared asset directory");
        Ok(())
    }
}

/// Base name of a segment file name such as `dump-part-3.rar`.
fn segment_base_name(file_name: &str) -> Option<&str> {
    let (stem, _) = naming::split_extension(file_name);
    let (base, number) = stem.rsplit_once(PART_INFIX)?;
    if base.is_empty() || number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, len: usize) {
        fs::write(dir.join(name), vec![0u8; len]).unwrap();
    }

    #[test]
    fn test_layout_paths() {
        let layout = SegmentLayout::new("/assets", "dump.rar");
        assert_eq!(layout.base_name(), "dump");
        assert_eq!(layout.output_path(), PathBuf::from("/assets/dump.rar"));
        assert_eq!(layout.part_path(3), PathBuf::from("/assets/dump-part-3.rar"));
        assert_eq!(layout.temp_path(3), PathBuf::from("/assets/dump-part-3.tmp"));
    }

    #[test]
    fn test_layout_without_extension() {
        let layout = SegmentLayout::new("/assets", "dump");
        assert_eq!(layout.part_path(1), PathBuf::from("/assets/dump-part-1"));
        assert_eq!(layout.parse_part("dump-part-12"), Some(12));
    }

    #[test]
    fn test_parse_part() {
        let layout = SegmentLayout::new("/assets", "libgen_2024.01.rar");
        assert_eq!(layout.parse_part("libgen_2024.01-part-7.rar"), Some(7));
        assert_eq!(layout.parse_part("libgen_2024.01-part-7.tmp"), None);
        assert_eq!(layout.parse_part("libgen_2024X01-part-7.rar"), None);
        assert_eq!(layout.parse_part("other-part-7.rar"), None);
        assert_eq!(layout.parse_part("libgen_2024.01.rar"), None);
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "dump-part-10.rar", 5);
        touch(temp.path(), "dump-part-2.rar", 3);
        touch(temp.path(), "dump-part-1.rar", 3);
        touch(temp.path(), "dump-part-3.tmp", 1);
        touch(temp.path(), "other-part-1.rar", 1);

        let layout = SegmentLayout::new(temp.path(), "dump.rar");
        let parts: Vec<u32> = layout.discover().unwrap().iter().map(|f| f.part).collect();
        assert_eq!(parts, vec![1, 2, 10]);
        assert_eq!(layout.committed_bytes().unwrap(), 11);
    }

    #[test]
    fn test_discover_missing_dir() {
        let temp = TempDir::new().unwrap();
        let layout = SegmentLayout::new(temp.path().join("absent"), "dump.rar");
        assert!(layout.discover().unwrap().is_empty());
    }

    #[test]
    fn test_check_contiguous() {
        assert!(check_contiguous(&[1, 2, 3, 4], Some(4)).is_ok());
        assert!(check_contiguous(&[1, 2, 3, 4], None).is_ok());
        assert!(check_contiguous(&[], None).is_ok());

        let err = check_contiguous(&[1, 2, 4], Some(4)).unwrap_err();
        assert!(matches!(err, DownloadError::Gap { part: 3 }));

        let err = check_contiguous(&[2, 3], None).unwrap_err();
        assert!(matches!(err, DownloadError::Gap { part: 1 }));

        let err = check_contiguous(&[1, 2, 3], Some(4)).unwrap_err();
        assert!(matches!(err, DownloadError::Gap { part: 4 }));
    }

    #[test]
    fn test_sorted_parts_reports_gap() {
        let temp = TempDir::new().unwrap();
        for name in ["dump-part-1.rar", "dump-part-2.rar", "dump-part-4.rar"] {
            touch(temp.path(), name, 1);
        }
        let layout = SegmentLayout::new(temp.path(), "dump.rar");

        let err = layout.sorted_parts(Some(4)).unwrap_err();
        assert_eq!(err.to_string(), "part 3 missing");

        touch(temp.path(), "dump-part-3.rar", 1);
        let parts = layout.sorted_parts(Some(4)).unwrap();
        assert_eq!(parts.iter().map(|f| f.part).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_remove_segments_keeps_output() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "dump-part-1.rar", 1);
        touch(temp.path(), "dump-part-2.tmp", 1);
        touch(temp.path(), "dump.rar", 2);

        let layout = SegmentLayout::new(temp.path(), "dump.rar");
        assert_eq!(layout.remove_segments().unwrap(), 2);
        assert!(layout.output_path().exists());
        assert!(!layout.part_path(1).exists());
        assert!(!layout.temp_path(2).exists());
    }

    #[test]
    fn test_tracked_base_names() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "libgen_2024-part-1.rar", 1);
        touch(temp.path(), "libgen_2024-part-2.tmp", 1);
        touch(temp.path(), "fiction_2023-part-9.tmp", 1);
        touch(temp.path(), "notes.txt", 1);

        let assets = AssetDirectory::new(temp.path());
        let names: Vec<String> = assets.tracked_base_names().unwrap().into_iter().collect();
        assert_eq!(names, vec!["fiction_2023".to_string(), "libgen_2024".to_string()]);
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let assets = AssetDirectory::new(temp.path().join("assets"));
        assets.ensure().unwrap();
        touch(assets.path(), "a-part-1.rar", 1);
        fs::create_dir(assets.path().join("nested")).unwrap();

        assets.clear().unwrap();

        assert!(assets.path().exists());
        assert_eq!(fs::read_dir(assets.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_record_target() {
        let temp = TempDir::new().unwrap();
        let assets = AssetDirectory::new(temp.path().join("assets"));
        assert_eq!(assets.recorded_target().unwrap(), None);

        assets.record_target("http://h/dump.rar").unwrap();
        assert_eq!(
            assets.recorded_target().unwrap().as_deref(),
            Some("http://h/dump.rar")
        );
        assert!(assets.tracked_base_names().unwrap().is_empty());

        assets.clear().unwrap();
        assert_eq!(assets.recorded_target().unwrap(), None);
    }
}
