//! Input file access

use crate::error::{AggregateError, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::BufReader;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Open `path` for buffered line reading
pub async fn open_input(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .await
        .map_err(|source| AggregateError::InputOpen {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(BufReader::with_capacity(READ_BUFFER_SIZE, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;

    #[tokio::test]
    async fn test_open_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "userId,amount\nu1,1\n").unwrap();

        let mut lines = open_input(&path).await.unwrap().lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("userId,amount"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("u1,1"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.csv");

        let err = open_input(&path).await.unwrap_err();
        assert!(matches!(err, AggregateError::InputOpen { ref path, .. } if path.ends_with("nope.csv")));
        assert_eq!(err.exit_code(), 5);
    }
}
