use std::{
    fs,
    io::Error,
    path::{Path, PathBuf},
};

pub mod builder;

/// A fresh directory under the system temp dir, unique to `test_name`.
pub fn scratch_dir(test_name: &str) -> Result<PathBuf, Error> {
    let dir = std::env::temp_dir()
        .join("classvm-tests")
        .join(format!("{}-{}", test_name, std::process::id()));

    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }

    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Write the class as `<dir>/<name>.class` and return the path.
pub fn write_class(dir: &Path, class: &builder::ClassBuilder) -> Result<PathBuf, Error> {
    write_bytes(dir, &class.name, &class.build())
}

pub fn write_bytes(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, Error> {
    let path = dir.join(format!("{}.class", name));
    fs::write(&path, bytes)?;
    Ok(path)
}
