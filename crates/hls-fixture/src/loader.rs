//! Loads fixture streams from disk.
//!
//! Expected layout: `<base_dir>/<stream_name>/stream.m3u8`, whose variant URIs
//! point (relatively) at media playlists, whose segment URIs in turn point
//! at segment files.

use std::path::Path;

use futures::future::try_join_all;
use m3u8_rs::{MediaPlaylist, Playlist, parse_playlist_res};
use tracing::debug;

use crate::error::{FixtureError, Result};
use crate::model::{FixtureFile, FixtureMediaPlaylist, FixtureSegment, FixtureStream};
use crate::paths;

/// Parses `<base_dir>/<stream_name>/stream.m3u8` and every media playlist it
/// references.
pub async fn load_stream(base_dir: impl AsRef<Path>, stream_name: &str) -> Result<FixtureStream> {
    let base_dir = base_dir.as_ref();
    let manifest_rel = resolve_relative(&paths::manifest_path(stream_name))?;

    let master = match read_playlist(base_dir, &manifest_rel).await? {
        Playlist::MasterPlaylist(master) => master,
        Playlist::MediaPlaylist(_) => {
            return Err(FixtureError::parse(
                manifest_rel,
                "expected a multivariant playlist, found a media playlist",
            ));
        }
    };

    let variants = try_join_all(
        master
            .variants
            .iter()
            .map(|variant| load_media_playlist(base_dir, stream_name, &variant.uri)),
    )
    .await?;

    debug!(
        stream = %stream_name,
        variants = variants.len(),
        "Loaded fixture stream"
    );

    Ok(FixtureStream::new(
        stream_name,
        FixtureFile::new(manifest_rel),
        master,
        variants,
    ))
}

/// Parses the media playlist at `uri`, resolved against the stream
/// directory, and builds a segment entry for each of its segment URIs.
pub async fn load_media_playlist(
    base_dir: impl AsRef<Path>,
    stream_name: &str,
    uri: &str,
) -> Result<FixtureMediaPlaylist> {
    let base_dir = base_dir.as_ref();
    let playlist_rel = resolve_relative(&paths::join(&paths::stream_dir(stream_name), uri))?;

    let media = match read_playlist(base_dir, &playlist_rel).await? {
        Playlist::MediaPlaylist(media) => media,
        Playlist::MasterPlaylist(_) => {
            return Err(FixtureError::parse(
                playlist_rel,
                "expected a media playlist, found a multivariant playlist",
            ));
        }
    };

    let segments = segments_for(&playlist_rel, &media)?;
    debug!(
        playlist = %playlist_rel,
        segments = segments.len(),
        "Loaded fixture media playlist"
    );

    Ok(FixtureMediaPlaylist::new(
        FixtureFile::new(playlist_rel),
        media,
        segments,
    ))
}

fn segments_for(playlist_rel: &str, media: &MediaPlaylist) -> Result<Vec<FixtureSegment>> {
    let playlist_dir = paths::parent_dir(playlist_rel);
    media
        .segments
        .iter()
        .map(|segment| {
            let segment_rel = resolve_relative(&paths::join(playlist_dir, &segment.uri))?;
            Ok(FixtureSegment::new(
                FixtureFile::new(segment_rel),
                segment.clone(),
            ))
        })
        .collect()
}

async fn read_playlist(base_dir: &Path, relative_path: &str) -> Result<Playlist> {
    let path = base_dir.join(relative_path);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| FixtureError::file_read(path.display().to_string(), e))?;
    parse_playlist_res(&bytes)
        .map_err(|e| FixtureError::parse(relative_path, format!("not a valid playlist: {e}")))
}

fn resolve_relative(path: &str) -> Result<String> {
    if path.contains("://") {
        return Err(FixtureError::parse(
            path,
            "absolute URLs cannot be served from the fixture directory",
        ));
    }
    paths::normalize_relative(path)
        .ok_or_else(|| FixtureError::parse(path, "path escapes the fixture directory"))
}
