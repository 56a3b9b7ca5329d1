//! On-disk test definitions: a read-mostly bundled directory and a writable
//! custom directory, both holding `<id>.json` files.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use serde::Serialize;

use crate::{StoreCfg, TestFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestSource {
    Bundled,
    Custom,
}

/// Listing entry for one test file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestMeta {
    /// File stem.
    pub id: String,
    pub name: String,
    pub description: String,
    pub source: TestSource,
    pub file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TestStore {
    bundled_dir: PathBuf,
    custom_dir: PathBuf,
}

impl From<&StoreCfg> for TestStore {
    fn from(cfg: &StoreCfg) -> Self {
        Self::new(&cfg.bundled_dir, &cfg.custom_dir)
    }
}

impl TestStore {
    pub fn new(bundled_dir: impl Into<PathBuf>, custom_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundled_dir: bundled_dir.into(),
            custom_dir: custom_dir.into(),
        }
    }

    fn dirs(&self) -> [(&Path, TestSource); 2] {
        [
            (&self.bundled_dir, TestSource::Bundled),
            (&self.custom_dir, TestSource::Custom),
        ]
    }

    /// All readable tests, bundled first, each directory sorted by file name.
    /// Files that fail to parse are skipped.
    pub fn list(&self) -> eyre::Result<Vec<TestMeta>> {
        let mut out = Vec::new();
        for (dir, source) in self.dirs() {
            for path in json_files(dir)? {
                match read_test(&path) {
                    Ok(test) => out.push(TestMeta {
                        id: file_stem(&path),
                        name: test.name,
                        description: test.description,
                        source,
                        file: path,
                    }),
                    Err(e) => {
                        tracing::warn!(file = %path.display(), error = %e, "skipping invalid test file");
                    }
                }
            }
        }
        Ok(out)
    }

    /// Load by file stem, then by the `name` field. Bundled wins over custom.
    pub fn load(&self, name: &str) -> eyre::Result<TestFile> {
        if usable_as_file_name(name) {
            for (dir, _) in self.dirs() {
                let path = dir.join(format!("{name}.json"));
                if path.is_file() {
                    return read_test(&path);
                }
            }
        }
        for (dir, _) in self.dirs() {
            for path in json_files(dir)? {
                if let Ok(test) = read_test(&path)
                    && test.name == name
                {
                    return Ok(test);
                }
            }
        }
        eyre::bail!("test not found: {name}")
    }

    /// Validate and write `test` to `<custom_dir>/<name>.json`, replacing any
    /// previous file of that name.
    pub fn save(&self, test: &TestFile) -> eyre::Result<PathBuf> {
        test.validate()?;
        let id = test.name.trim();
        if !usable_as_file_name(id) {
            eyre::bail!("test name {id:?} cannot be used as a file name");
        }
        fs::create_dir_all(&self.custom_dir)
            .wrap_err_with(|| format!("create {}", self.custom_dir.display()))?;
        let path = self.custom_dir.join(format!("{id}.json"));
        let mut json = serde_json::to_string_pretty(test)?;
        json.push('\n');
        write_atomic(&path, json.as_bytes()).wrap_err_with(|| format!("write {}", path.display()))?;
        tracing::info!(file = %path.display(), "test saved");
        Ok(path)
    }
}

/// Stays inside its directory when joined as `<id>.json`.
fn usable_as_file_name(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && !id.starts_with('.')
}

fn json_files(dir: &Path) -> eyre::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).wrap_err_with(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "json") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_test(path: &Path) -> eyre::Result<TestFile> {
    let text = fs::read_to_string(path).wrap_err_with(|| format!("read {}", path.display()))?;
    TestFile::from_json(&text).wrap_err_with(|| format!("parse {}", path.display()))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}
