pub mod elf;

use std::path::Path;
use tokio::fs::{DirEntry, ReadDir};
use tokio::io;

/// Depth-first walk over one or more directory trees.
pub struct FileWalker {
    omit_directories: bool,
    stack: Vec<ReadDir>,
}

impl FileWalker {
    pub fn empty(with_directories: bool) -> Self {
        Self {
            omit_directories: !with_directories,
            stack: vec![],
        }
    }

    pub async fn push(&mut self, path: impl AsRef<Path>) -> io::Result<&mut Self> {
        self.stack.push(tokio::fs::read_dir(path).await?);

        Ok(self)
    }

    pub async fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(FileWalker {
            omit_directories: true,
            stack: vec![tokio::fs::read_dir(path).await?],
        })
    }

    pub async fn next(&mut self) -> io::Result<Option<DirEntry>> {
        loop {
            let next = {
                let top = if let Some(top) = self.stack.last_mut() {
                    top
                } else {
                    return Ok(None);
                };

                top.next_entry().await?
            };

            let next = if let Some(v) = next {
                v
            } else {
                self.stack.pop();
                continue;
            };

            if !next.file_type().await?.is_dir() {
                return Ok(Some(next));
            }

            self.stack.push(tokio::fs::read_dir(next.path()).await?);

            if !self.omit_directories {
                return Ok(Some(next));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn walks_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("bin"))
            .await
            .unwrap();
        tokio::fs::create_dir_all(dir.path().join("lib/sub"))
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("bin/gcc"), b"x")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("lib/sub/libc.a"), b"y")
            .await
            .unwrap();

        let mut walker = FileWalker::new(dir.path()).await.unwrap();
        let mut seen = HashSet::new();
        while let Some(entry) = walker.next().await.unwrap() {
            seen.insert(entry.file_name().to_string_lossy().to_string());
        }

        assert_eq!(
            seen,
            HashSet::from(["gcc".to_string(), "libc.a".to_string()])
        );
    }
}
