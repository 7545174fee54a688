use crate::engine::fetcher::FetchedArchive;
use crate::engine::folders::WorkFolders;
use anyhow::bail;
use async_compression::tokio::bufread::{BzDecoder, GzipDecoder, XzDecoder};
use std::ffi::OsStr;
use std::path::{Component, Path};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

/// Unpacks cached archives into a dependency's source folder.
#[derive(Debug)]
pub struct Extractor {
    folders: Arc<WorkFolders>,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
enum Archive {
    Zip,
    Tar,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
enum Compression {
    None,
    Gzip,
    Xz,
    Bz,
}

const GUESSES: &[(&str, Archive, Compression)] = &[
    (".tar.gz", Archive::Tar, Compression::Gzip),
    (".tar.xz", Archive::Tar, Compression::Xz),
    (".tar.bz2", Archive::Tar, Compression::Bz),
    (".tar.bz", Archive::Tar, Compression::Bz),
    (".tar", Archive::Tar, Compression::None),
    (".zip", Archive::Zip, Compression::None),
];

enum Decompressor<R: AsyncBufRead> {
    PassThrough(R),
    Xz(XzDecoder<R>),
    Gzip(GzipDecoder<R>),
    Bz(BzDecoder<R>),
}

impl<R: AsyncBufRead + Unpin> AsyncRead for Decompressor<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Decompressor::PassThrough(r) => AsyncRead::poll_read(Pin::new(r), cx, buf),
            Decompressor::Xz(r) => AsyncRead::poll_read(Pin::new(r), cx, buf),
            Decompressor::Gzip(r) => AsyncRead::poll_read(Pin::new(r), cx, buf),
            Decompressor::Bz(r) => AsyncRead::poll_read(Pin::new(r), cx, buf),
        }
    }
}

fn guess_format(file_name: &str) -> Option<(Archive, Compression)> {
    GUESSES
        .iter()
        .find(|(ext, _, _)| file_name.ends_with(*ext))
        .map(|(_, arch, comp)| (*arch, *comp))
}

impl Extractor {
    pub fn new(folders: Arc<WorkFolders>) -> Self {
        Extractor { folders }
    }

    pub async fn extract(&self, archive: &FetchedArchive<'_>) -> anyhow::Result<()> {
        let dest = self.folders.source_for(archive.dep);
        tokio::fs::create_dir_all(&dest).await?;

        let found = archive
            .path
            .file_name()
            .and_then(OsStr::to_str)
            .and_then(guess_format);

        let (arch, compr) = match found {
            None => {
                bail!(
                    "couldn't guess archive type of {}",
                    archive.source.file_name
                )
            }

            Some(x) => x,
        };

        let read = OpenOptions::new()
            .read(true)
            .write(false)
            .create(false)
            .open(&archive.path)
            .await?;

        let read = tokio::io::BufReader::new(read);
        let read = match compr {
            Compression::None => Decompressor::PassThrough(read),
            Compression::Gzip => Decompressor::Gzip(GzipDecoder::new(read)),
            Compression::Xz => Decompressor::Xz(XzDecoder::new(read)),
            Compression::Bz => Decompressor::Bz(BzDecoder::new(read)),
        };

        match arch {
            Archive::Zip => {
                let mut zip = async_zip::read::stream::ZipFileReader::new(read);
                while let Some(mut reader) = zip.entry_reader().await? {
                    let entry = reader.entry();
                    let child_path = safe_join(&dest, Path::new(entry.filename()))?;

                    if entry.filename().ends_with('/') {
                        tokio::fs::create_dir_all(&child_path).await?;
                        continue;
                    }

                    if let Some(p) = child_path.parent() {
                        tokio::fs::create_dir_all(p).await?;
                    }
                    let mut f = File::create(child_path).await?;
                    tokio::io::copy(&mut reader, &mut f).await?;
                    f.sync_all().await?;
                }
            }
            Archive::Tar => {
                let mut tar = tokio_tar::Archive::new(read);
                tar.unpack(dest).await?;
            }
        }

        Ok(())
    }
}

/// Joins an archive member path under `base`, rejecting absolute paths
/// and parent traversal.
fn safe_join(base: &Path, member: &Path) -> anyhow::Result<std::path::PathBuf> {
    let mut out = base.to_path_buf();

    for component in member.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => bail!("archive member escapes extraction root: {:?}", member),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_by_longest_suffix_first() {
        assert_eq!(
            guess_format("gcc-13.2.tar.xz"),
            Some((Archive::Tar, Compression::Xz))
        );
        assert_eq!(
            guess_format("libftdi1-1.5.tar.bz2"),
            Some((Archive::Tar, Compression::Bz))
        );
        assert_eq!(
            guess_format("hidapi-0.14.0.zip"),
            Some((Archive::Zip, Compression::None))
        );
        assert_eq!(guess_format("README.txt"), None);
    }

    #[test]
    fn safe_join_rejects_traversal() {
        let base = Path::new("/work/sources/hidapi");

        assert!(safe_join(base, Path::new("hidapi-0.14.0/README")).is_ok());
        assert!(safe_join(base, Path::new("../outside")).is_err());
        assert!(safe_join(base, Path::new("/etc/passwd")).is_err());
    }
}
