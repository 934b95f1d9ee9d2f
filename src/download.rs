//! Fetching and unpacking release archives into versioned directories.

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::github::ReleaseClient;
use crate::privilege::{is_writable, Privileged};
use flate2::read::GzDecoder;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tar::Archive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else {
            None
        }
    }

    /// Format of the asset behind `url`, judged by its last path segment.
    pub fn from_url(url: &str) -> Result<Self> {
        let name = url_file_name(url);
        Self::from_name(name).ok_or_else(|| Error::UnsupportedFormat(name.to_string()))
    }
}

/// Last path segment of `url`, without query or fragment.
pub fn url_file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

pub async fn download_file(http: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    let filename = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| url_file_name(url).to_string());
    tracing::info!("Downloading {}...", filename);

    let response = http
        .get(url)
        .header("User-Agent", concat!("toolset/", env!("CARGO_PKG_VERSION")))
        .send()
        .await
        .map_err(|e| Error::network(url, e))?;

    if !response.status().is_success() {
        return Err(Error::network(
            url,
            format!("download failed with status {}", response.status()),
        ));
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = ProgressBar::new(total_size);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Downloading {}", filename));

    let mut file = fs::File::create(dest)?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::network(url, e))?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }
    file.flush()?;

    pb.finish_with_message("Download complete");
    Ok(downloaded)
}

/// Normal path components of an archive entry, or `None` if the entry would
/// escape the extraction directory.
fn safe_components(path: &Path) -> Option<Vec<&OsStr>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts)
}

/// Destination-relative path of an entry after dropping `strip` leading
/// components. `None` when nothing is left.
fn stripped(parts: &[&OsStr], strip: usize) -> Option<PathBuf> {
    if parts.len() <= strip {
        return None;
    }
    Some(parts[strip..].iter().collect())
}

fn list_entries(archive: &Path, kind: ArchiveKind) -> Result<Vec<(PathBuf, bool)>> {
    match kind {
        ArchiveKind::TarGz => {
            let mut tar = Archive::new(GzDecoder::new(fs::File::open(archive)?));
            let mut entries = Vec::new();
            for entry in tar.entries()? {
                let entry = entry?;
                let is_dir = entry.header().entry_type().is_dir();
                entries.push((entry.path()?.into_owned(), is_dir));
            }
            Ok(entries)
        }
        ArchiveKind::Zip => {
            let zip = zip::ZipArchive::new(fs::File::open(archive)?)?;
            Ok(zip
                .file_names()
                .map(|name| (PathBuf::from(name), name.ends_with('/')))
                .collect())
        }
    }
}

/// 1 when every entry shares the same first path segment and no regular file
/// sits at the archive root, else 0.
fn strip_depth_for(entries: &[(PathBuf, bool)]) -> usize {
    let mut prefix: Option<&OsStr> = None;
    let mut seen = false;

    for (path, is_dir) in entries {
        let Some(parts) = safe_components(path) else {
            return 0;
        };
        let Some(first) = parts.first() else {
            continue;
        };
        if parts.len() == 1 && !is_dir {
            return 0;
        }
        match prefix {
            Some(existing) if existing != *first => return 0,
            Some(_) => {}
            None => prefix = Some(*first),
        }
        seen = true;
    }

    usize::from(seen)
}

/// How many leading path components to strip when extracting `archive`.
/// Listing failures yield 0.
pub fn detect_strip_depth(archive: &Path, kind: ArchiveKind) -> usize {
    match list_entries(archive, kind) {
        Ok(entries) => {
            let depth = strip_depth_for(&entries);
            tracing::debug!("Strip depth for {}: {}", archive.display(), depth);
            depth
        }
        Err(e) => {
            tracing::debug!("Could not list {}: {}", archive.display(), e);
            0
        }
    }
}

fn extract_tar_gz(archive: &Path, dest: &Path, strip: usize) -> Result<()> {
    let mut tar = Archive::new(GzDecoder::new(fs::File::open(archive)?));

    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(parts) = safe_components(&path) else {
            tracing::warn!("Skipping unsafe path in archive: {}", path.display());
            continue;
        };
        let Some(relative) = stripped(&parts, strip) else {
            continue;
        };

        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        if entry.header().entry_type().is_hard_link() {
            let source = entry.link_name()?.and_then(|name| {
                let parts = safe_components(&name)?;
                stripped(&parts, strip)
            });
            let Some(source) = source else {
                tracing::warn!("Skipping unsafe hard link in archive: {}", path.display());
                continue;
            };
            hard_link(&dest.join(source), &target)?;
            continue;
        }

        entry
            .unpack(&target)
            .map_err(|e| Error::from_fs("extract", &target, e))?;
    }
    Ok(())
}

/// Link names are archive paths, so they resolve against the extraction
/// root like any other entry.
fn hard_link(source: &Path, target: &Path) -> Result<()> {
    match fs::remove_file(target) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::from_fs("replace", target, e)),
    }
    fs::hard_link(source, target).map_err(|e| Error::from_fs("link", target, e))
}

fn extract_zip(archive: &Path, dest: &Path, strip: usize) -> Result<()> {
    let mut zip = zip::ZipArchive::new(fs::File::open(archive)?)?;

    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        let Some(enclosed) = file.enclosed_name().map(Path::to_path_buf) else {
            tracing::warn!("Skipping unsafe path in zip: {}", file.name());
            continue;
        };
        let Some(parts) = safe_components(&enclosed) else {
            tracing::warn!("Skipping unsafe path in zip: {}", file.name());
            continue;
        };
        let Some(relative) = stripped(&parts, strip) else {
            continue;
        };

        let outpath = dest.join(relative);
        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

fn extract_into(archive: &Path, kind: ArchiveKind, dir: &Path, strip: usize) -> Result<()> {
    match kind {
        ArchiveKind::TarGz => extract_tar_gz(archive, dir, strip),
        ArchiveKind::Zip => extract_zip(archive, dir, strip),
    }
}

/// Unpack `archive` into `dest`, dropping `strip` leading components.
///
/// Gzip-tar archives go straight into a writable destination. Zip archives,
/// and anything headed for a protected destination, are unpacked into a
/// scratch directory first and copied over item by item.
pub fn extract(
    archive: &Path,
    kind: ArchiveKind,
    dest: &Path,
    strip: usize,
    privileged: &Privileged,
) -> Result<()> {
    if kind == ArchiveKind::TarGz && is_writable(dest) {
        return extract_into(archive, kind, dest, strip);
    }

    let scratch = tempfile::tempdir()?;
    extract_into(archive, kind, scratch.path(), strip)?;

    for item in fs::read_dir(scratch.path())? {
        let item = item?;
        privileged.replace_with_copy(&item.path(), &dest.join(item.file_name()))?;
    }
    Ok(())
}

/// Downloads (or reuses) a release archive and unpacks it into a version
/// directory.
pub struct ArchiveInstaller<'a, C: ReleaseClient> {
    client: &'a C,
    cache: Option<&'a CacheStore>,
    privileged: &'a Privileged<'a>,
}

impl<'a, C: ReleaseClient> ArchiveInstaller<'a, C> {
    pub fn new(client: &'a C, cache: Option<&'a CacheStore>, privileged: &'a Privileged<'a>) -> Self {
        Self {
            client,
            cache,
            privileged,
        }
    }

    /// On error `dest` may hold a partial extraction and must not be treated
    /// as an installed version.
    pub async fn install(&self, version: &str, asset_url: &str, dest: &Path) -> Result<()> {
        let kind = ArchiveKind::from_url(asset_url)?;

        // Owns any fresh download; removed on drop whatever the outcome
        let scratch = tempfile::tempdir()?;
        let archive = self.obtain(asset_url, scratch.path()).await?;

        let strip = detect_strip_depth(&archive, kind);
        self.privileged.create_dir_all(dest)?;

        tracing::info!("Extracting version {} into {}", version, dest.display());
        extract(&archive, kind, dest, strip, self.privileged)
    }

    async fn obtain(&self, url: &str, scratch: &Path) -> Result<PathBuf> {
        if let Some(cached) = self.cache.and_then(|c| c.get_download(url)) {
            tracing::info!("Using cached download for {}", url_file_name(url));
            return Ok(cached);
        }

        let name = match url_file_name(url) {
            "" => "download",
            name => name,
        };
        let path = scratch.join(name);
        let bytes = self.client.download(url, &path).await?;
        tracing::debug!("Downloaded {} bytes to {}", bytes, path.display());

        if let Some(cache) = self.cache {
            if let Err(e) = cache.put_download(url, &path) {
                tracing::warn!("Failed to cache download {}: {}", url, e);
            }
        }
        Ok(path)
    }
}
