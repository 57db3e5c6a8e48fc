use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use walkdir::WalkDir;

/// 目錄掃描得到的檔案資訊
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub extension: String,
}

impl FileEntry {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(FileEntry {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            size: metadata.len(),
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default(),
        })
    }
}

/// 非遞迴掃描目錄，依檔名排序以固定探索順序
pub fn scan_directory(dir: &Path) -> io::Result<Vec<FileEntry>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        match FileEntry::from_path(entry.path()) {
            Ok(file) => files.push(file),
            Err(e) => warn!("無法讀取檔案資訊 {}：{}", entry.path().display(), e),
        }
    }
    Ok(files)
}

/// 路徑已存在時，在主檔名後加上 `_1`、`_2`... 直到不重複
pub fn unique_path(candidate: PathBuf) -> PathBuf {
    if !candidate.exists() {
        return candidate;
    }
    let parent = candidate.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = candidate.extension().map(|e| e.to_string_lossy().to_string());
    let mut counter = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let path = parent.join(name);
        if !path.exists() {
            return path;
        }
        counter += 1;
    }
}

/// 以輸入主檔名加上新副檔名組出輸出路徑
pub fn output_file_path(source: &Path, directory: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    unique_path(directory.join(format!("{}.{}", stem, extension)))
}

/// 方便閱讀的顯示路徑（相對於目前目錄）
pub fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| pathdiff::diff_paths(path, cwd))
        .filter(|relative| !relative.as_os_str().is_empty() && !relative.starts_with(".."))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_is_flat_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "x\n1\n").unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.csv"), "x\n").unwrap();

        let files = scan_directory(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.json", "b.csv"]);
        assert_eq!(files[1].extension, "csv");
        assert_eq!(files[1].size, 4);
    }

    #[test]
    fn unique_path_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.json");
        assert_eq!(unique_path(target.clone()), target);
        fs::write(&target, "{}").unwrap();
        fs::write(dir.path().join("data_1.json"), "{}").unwrap();
        assert_eq!(unique_path(target), dir.path().join("data_2.json"));
    }

    #[test]
    fn output_path_swaps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_file_path(Path::new("/in/sales.CSV"), dir.path(), "parquet");
        assert_eq!(path, dir.path().join("sales.parquet"));
    }
}
