use std::path::PathBuf;

/// Creates a new, empty directory under the system temp directory.
pub fn temp_dir() -> PathBuf {
    let path = std::env::temp_dir()
        .join("shardkv-tests")
        .join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&path).unwrap();
    path
}

/// Gets a unique file path under the system temp directory.
///
/// The file itself is not created.
pub fn temp_file(extension: &str) -> PathBuf {
    let name = format!("{}.{extension}", uuid::Uuid::new_v4());
    let path = std::env::temp_dir().join("shardkv-tests");
    std::fs::create_dir_all(&path).unwrap();
    path.join(name)
}
