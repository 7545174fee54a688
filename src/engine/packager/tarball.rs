use crate::engine::build_state::TargetBuild;
use crate::engine::folders::WorkFolders;
use crate::engine::packager::{Packager, PackagerBuilder};
use async_compression::tokio::write::GzipEncoder;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

#[derive(Debug)]
pub struct Tarball {
    folders: Arc<WorkFolders>,
}

impl PackagerBuilder for Tarball {
    type Output = Tarball;

    fn build(folders: Arc<WorkFolders>) -> Self::Output {
        Tarball { folders }
    }
}

#[async_trait]
impl Packager for Tarball {
    async fn build_package(&self, build: &TargetBuild<'_>) -> anyhow::Result<PathBuf> {
        let install = self.folders.install_for(&build.target_id());
        let output = self.folders.output();

        tokio::fs::create_dir_all(&output).await?;

        let file_name = format!(
            "{}-{}-{}.tar.gz",
            build.product.name.to_lowercase(),
            build.release,
            build.target_id(),
        );
        let archive_path = output.join(&file_name);

        let file = File::create(&archive_path).await?;
        let encoder = GzipEncoder::new(file);

        let mut builder = tokio_tar::Builder::new(encoder);
        // everything unpacks below one versioned folder
        let prefix = format!("{}-{}", build.product.name.to_lowercase(), build.release);
        builder.append_dir_all(&prefix, &install).await?;

        let mut encoder = builder.into_inner().await?;
        encoder.shutdown().await?;

        write_checksum(&archive_path, &file_name).await?;

        Ok(archive_path)
    }
}

/// Writes a `sha256sum -c` compatible sidecar next to the archive.
async fn write_checksum(archive_path: &std::path::Path, file_name: &str) -> anyhow::Result<()> {
    let mut context = ring::digest::Context::new(&ring::digest::SHA256);
    let mut reader = BufReader::new(File::open(archive_path).await?);
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        context.update(&buffer[..n]);
    }

    let digest = context.finish();
    let line = format!("{}  {}\n", hex::encode(digest.as_ref()), file_name);

    tokio::fs::write(archive_path.with_extension("gz.sha256"), line).await?;

    Ok(())
}
