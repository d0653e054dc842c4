//! Stream cloning.
//!
//! A clone is the same tree under a different top-level directory. No files
//! are copied: each cloned route is an alias for the bytes the original route
//! serves.

use tracing::debug;

use super::FixtureServer;
use crate::model::{FixtureFile, FixtureMediaPlaylist, FixtureSegment, FixtureStream};
use crate::paths;

impl FixtureServer {
    /// Clone `original` as `new_stream_name`, registering a route for every
    /// manifest, media playlist and segment of the copy.
    pub fn clone_stream(&self, original: &FixtureStream, new_stream_name: &str) -> FixtureStream {
        let playlist_file = self.clone_file(&original.playlist_file, new_stream_name);
        let variants: Vec<_> = original
            .variants
            .iter()
            .map(|variant| self.clone_media_playlist(variant, new_stream_name))
            .collect();

        debug!(
            from = %original.stream_name,
            to = %new_stream_name,
            variants = variants.len(),
            "Cloned stream"
        );

        FixtureStream::new(
            new_stream_name,
            playlist_file,
            original.master_playlist.clone(),
            variants,
        )
    }

    pub fn clone_media_playlist(
        &self,
        original: &FixtureMediaPlaylist,
        new_stream_name: &str,
    ) -> FixtureMediaPlaylist {
        let segments = original
            .segments
            .iter()
            .map(|segment| self.clone_segment(segment, new_stream_name))
            .collect();
        FixtureMediaPlaylist::new(
            self.clone_file(&original.playlist_file, new_stream_name),
            original.media_playlist.clone(),
            segments,
        )
    }

    pub fn clone_segment(&self, original: &FixtureSegment, new_stream_name: &str) -> FixtureSegment {
        FixtureSegment::new(
            self.clone_file(&original.segment_file, new_stream_name),
            original.media_segment.clone(),
        )
    }

    fn clone_file(&self, original: &FixtureFile, new_stream_name: &str) -> FixtureFile {
        let relative_path = paths::rebase(&original.relative_path, new_stream_name);
        // Clones of clones point at the file on disk, not at a path that only
        // exists as a route.
        let source = self.resolve_source(&original.relative_path, original.route.as_deref());
        let route = self.routes().register_file(&relative_path, source);
        FixtureFile::with_route(relative_path, route)
    }
}
