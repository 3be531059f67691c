//! Tarball sources: downloaded over HTTP(S) or read from disk.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tempfile::{NamedTempFile, TempDir};

use crate::core::{SourceSpec, SourceType};
use crate::sources::errors::FetchError;
use crate::sources::source::{FetchContext, FetchedSource, Fetcher};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Fetches `.tar`, `.tar.gz` and `.tgz` archives.
///
/// The archive is hashed while it is written, checked against
/// `source-checksum` when one is declared, and unpacked. An archive whose
/// entries all live under one top-level directory has that directory
/// stripped.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarFetcher;

impl TarFetcher {
    pub fn new() -> Self {
        TarFetcher
    }
}

impl Fetcher for TarFetcher {
    fn kind(&self) -> SourceType {
        SourceType::Tar
    }

    fn fetch(
        &self,
        source: &SourceSpec,
        dest: &Path,
        ctx: &FetchContext<'_>,
    ) -> Result<FetchedSource, FetchError> {
        let location = source.location.as_str();
        ctx.check_cancelled(location)?;

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| FetchError::io(parent.display(), e))?;
        let mut download =
            NamedTempFile::new_in(parent).map_err(|e| FetchError::io(parent.display(), e))?;

        let digest = {
            let mut writer = HashingWriter::new(download.as_file_mut());
            if is_remote(location) {
                download_to(location, ctx, &mut writer)?;
            } else {
                let path = ctx.resolve_local(location);
                let mut file = File::open(&path).map_err(|_| FetchError::MissingLocal {
                    path: path.clone(),
                })?;
                io::copy(&mut file, &mut writer)
                    .map_err(|e| FetchError::io(path.display(), e))?;
            }
            writer.finish()
        };

        if let Some(expected) = &source.checksum {
            if !expected.matches(&digest) {
                return Err(FetchError::ChecksumMismatch {
                    location: location.to_string(),
                    expected: expected.to_string(),
                    actual: format!("sha256/{}", digest),
                });
            }
        }
        ctx.check_cancelled(location)?;

        unpack(download.as_file_mut(), dest, parent).map_err(|e| FetchError::Archive {
            location: location.to_string(),
            message: e.to_string(),
        })?;

        Ok(FetchedSource {
            path: dest.to_path_buf(),
            revision: Some(format!("sha256/{}", digest)),
        })
    }
}

fn is_remote(location: &str) -> bool {
    url::Url::parse(location).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

fn download_to(
    location: &str,
    ctx: &FetchContext<'_>,
    out: &mut impl Write,
) -> Result<(), FetchError> {
    let network = |message: String, transient: bool| FetchError::Network {
        location: location.to_string(),
        message,
        transient,
    };

    let mut builder = reqwest::blocking::Client::builder();
    if let Some(timeout) = ctx.timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder
        .build()
        .map_err(|e| network(e.to_string(), false))?;

    tracing::info!("downloading {}", location);
    let mut response = client
        .get(location)
        .send()
        .map_err(|e| network(e.to_string(), e.is_timeout() || e.is_connect()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(network(format!("HTTP {}", status), status.is_server_error()));
    }

    let mut buf = [0u8; 64 * 1024];
    loop {
        ctx.check_cancelled(location)?;
        let n = response
            .read(&mut buf)
            .map_err(|e| network(e.to_string(), e.kind() == io::ErrorKind::TimedOut))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .map_err(|e| FetchError::io("failed to write download", e))?;
    }
    Ok(())
}

fn unpack(archive: &mut File, dest: &Path, scratch_parent: &Path) -> io::Result<()> {
    archive.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 2];
    let gzipped = archive.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC;
    archive.seek(SeekFrom::Start(0))?;

    let scratch = TempDir::new_in(scratch_parent)?;
    let reader = BufReader::new(archive);
    if gzipped {
        tar::Archive::new(GzDecoder::new(reader)).unpack(scratch.path())?;
    } else {
        tar::Archive::new(reader).unpack(scratch.path())?;
    }

    let entries: Vec<_> = std::fs::read_dir(scratch.path())?.collect::<Result<_, _>>()?;
    let single_dir = match entries.as_slice() {
        [only] => only.file_type()?.is_dir().then(|| only.path()),
        _ => None,
    };
    let root = single_dir.unwrap_or_else(|| scratch.path().to_path_buf());
    std::fs::rename(&root, dest)
}

struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        HashingWriter {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
