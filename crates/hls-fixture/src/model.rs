//! In-memory model of a parsed fixture stream.
//!
//! A [`FixtureStream`] owns its variants, and each [`FixtureMediaPlaylist`]
//! owns its segments. Every node remembers the file it was parsed from so
//! tests can target rules at specific playlists or segments.

use m3u8_rs::{MasterPlaylist, MediaPlaylist, MediaSegment};

/// A file relative to the server's base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureFile {
    /// Forward-slash path relative to the base directory.
    pub relative_path: String,
    /// Route the file is served at once a handler has been registered.
    pub route: Option<String>,
}

impl FixtureFile {
    pub fn new(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            route: None,
        }
    }

    pub fn with_route(relative_path: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            route: Some(route.into()),
        }
    }

    /// The route this file is reachable at: the registered one, or the
    /// default route derived from its relative path.
    pub fn url_path(&self) -> String {
        self.route
            .clone()
            .unwrap_or_else(|| crate::paths::route_from_path(&self.relative_path))
    }
}

/// Root of a parsed multivariant playlist.
#[derive(Debug, Clone)]
pub struct FixtureStream {
    pub stream_name: String,
    pub playlist_file: FixtureFile,
    pub master_playlist: MasterPlaylist,
    /// Media playlists in manifest order.
    pub variants: Vec<FixtureMediaPlaylist>,
}

impl FixtureStream {
    pub fn new(
        stream_name: impl Into<String>,
        playlist_file: FixtureFile,
        master_playlist: MasterPlaylist,
        variants: Vec<FixtureMediaPlaylist>,
    ) -> Self {
        debug_assert_eq!(variants.len(), master_playlist.variants.len());
        Self {
            stream_name: stream_name.into(),
            playlist_file,
            master_playlist,
            variants,
        }
    }

    pub fn variant(&self, index: usize) -> Option<&FixtureMediaPlaylist> {
        self.variants.get(index)
    }
}

/// One rendition of a stream.
#[derive(Debug, Clone)]
pub struct FixtureMediaPlaylist {
    pub playlist_file: FixtureFile,
    pub media_playlist: MediaPlaylist,
    /// Segments in playlist order, one per parsed media segment.
    pub segments: Vec<FixtureSegment>,
}

impl FixtureMediaPlaylist {
    pub fn new(
        playlist_file: FixtureFile,
        media_playlist: MediaPlaylist,
        segments: Vec<FixtureSegment>,
    ) -> Self {
        debug_assert_eq!(segments.len(), media_playlist.segments.len());
        Self {
            playlist_file,
            media_playlist,
            segments,
        }
    }

    /// Playback time at which the first segment starts (`EXT-X-START`).
    pub fn start_offset(&self) -> f64 {
        self.media_playlist
            .start
            .as_ref()
            .map_or(0.0, |start| start.time_offset as f64)
    }

    /// End time of the last segment, start offset included.
    pub fn total_duration(&self) -> f64 {
        self.segments
            .iter()
            .fold(self.start_offset(), |acc, segment| acc + segment.duration())
    }

    /// Index of the segment playing at `seconds`.
    ///
    /// A timestamp on a boundary belongs to the segment that starts there.
    /// Returns `None` once `seconds` reaches the end of the last segment.
    pub fn segment_index(&self, seconds: f64) -> Option<usize> {
        let mut segment_start = self.start_offset();
        for (index, segment) in self.segments.iter().enumerate() {
            let duration = segment.duration();
            if seconds < segment_start + duration {
                return Some(index);
            }
            segment_start += duration;
        }
        None
    }

    pub fn segment_at_time(&self, seconds: f64) -> Option<&FixtureSegment> {
        self.segment_index(seconds)
            .map(|index| &self.segments[index])
    }

    /// Segments covering `[start_secs, end_secs)`.
    ///
    /// Returns `None` when `start_secs` lies past the end of the playlist.
    /// An end that is `None` or past the end selects through the last
    /// segment.
    pub fn segments_in_time_range(
        &self,
        start_secs: f64,
        end_secs: Option<f64>,
    ) -> Option<&[FixtureSegment]> {
        let start = self.segment_index(start_secs)?;
        let end = end_secs
            .and_then(|end| self.segment_index(end))
            .unwrap_or(self.segments.len());
        if end <= start {
            return Some(&[]);
        }
        Some(&self.segments[start..end])
    }
}

/// A single media segment and the file backing it.
#[derive(Debug, Clone)]
pub struct FixtureSegment {
    pub segment_file: FixtureFile,
    pub media_segment: MediaSegment,
}

impl FixtureSegment {
    pub fn new(segment_file: FixtureFile, media_segment: MediaSegment) -> Self {
        Self {
            segment_file,
            media_segment,
        }
    }

    /// `EXTINF` duration in seconds.
    pub fn duration(&self) -> f64 {
        (self.media_segment.duration as f64).max(0.0)
    }
}
