//! Path and route helpers.
//!
//! Fixture paths are always kept in forward-slash form relative to the
//! server's base directory, because they double as URL paths.

use std::path::{Component, Path};

/// Default file name of a stream's multivariant playlist.
pub const MANIFEST_FILE_NAME: &str = "stream.m3u8";

/// Default file name of a variant's media playlist.
pub const MEDIA_PLAYLIST_FILE_NAME: &str = "playlist.m3u8";

/// Relative directory holding a stream's fixture files.
pub fn stream_dir(stream_name: &str) -> String {
    stream_name.to_string()
}

/// Relative path of a stream's multivariant playlist.
pub fn manifest_path(stream_name: &str) -> String {
    join(&stream_dir(stream_name), MANIFEST_FILE_NAME)
}

/// Relative path of a variant's media playlist in the conventional layout.
pub fn media_playlist_path(stream_name: &str, variant_name: &str) -> String {
    format!(
        "{}/{variant_name}/{MEDIA_PLAYLIST_FILE_NAME}",
        stream_dir(stream_name)
    )
}

/// Relative path of a numbered segment in the conventional layout.
///
/// `extension` defaults to `ts` when `None`.
pub fn segment_path(
    stream_name: &str,
    variant_name: &str,
    segment_number: u64,
    extension: Option<&str>,
) -> String {
    format!(
        "{}/{variant_name}/{segment_number}.{}",
        stream_dir(stream_name),
        extension.unwrap_or("ts")
    )
}

/// Turns a relative path or a route into a route with exactly one leading `/`.
pub fn route_from_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    format!("/{}", path.trim_start_matches('/'))
}

/// Lexically resolves `.` and `..` and renders the result with `/`.
///
/// Returns `None` when the path climbs above its starting point or is
/// absolute; fixture paths must stay inside the base directory.
pub fn normalize_relative(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(&path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.join("/"))
}

/// Directory part of a forward-slash relative path, or `""` at the top level.
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Joins two forward-slash fragments, skipping an empty prefix.
pub fn join(dir: &str, path: &str) -> String {
    if dir.is_empty() {
        path.to_string()
    } else {
        format!("{dir}/{path}")
    }
}

/// Replaces the leading directory component of `relative_path` with
/// `new_root`, e.g. `live/v0/0.ts` → `alias/v0/0.ts`.
pub fn rebase(relative_path: &str, new_root: &str) -> String {
    let relative_path = relative_path.replace('\\', "/");
    match relative_path.split_once('/') {
        Some((_, rest)) => join(new_root, rest),
        None => new_root.to_string(),
    }
}

/// Renders a filesystem path relative to `base` in forward-slash form.
pub fn relative_to(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}
