//! HLS media playlist parsing and rendering.
//!
//! The engine writes a live (sliding window) media playlist; we read it back
//! to decide when output is playable and to count segments for stats.

use crate::{Error, Result};
use std::fmt::Write;

/// Media playlist for a single rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    /// Target duration in seconds.
    pub target_duration: u32,
    /// Media sequence number of the first listed segment.
    pub media_sequence: u64,
    /// Playlist type (VOD, EVENT, or live when absent).
    pub playlist_type: PlaylistType,
    /// Segment entries.
    pub segments: Vec<SegmentEntry>,
    /// Whether this is an ended playlist.
    pub ended: bool,
}

impl MediaPlaylist {
    /// Create an empty live playlist.
    pub fn live(target_duration: u32) -> Self {
        Self {
            target_duration,
            media_sequence: 0,
            playlist_type: PlaylistType::Live,
            segments: Vec::new(),
            ended: false,
        }
    }

    /// Parse an M3U8 media playlist.
    ///
    /// Unknown tags are ignored. A playlist that is being rewritten may be
    /// cut short; a trailing `#EXTINF` without its URI is dropped rather than
    /// treated as an error.
    pub fn parse(input: &str) -> Result<Self> {
        let mut lines = input.lines().map(str::trim).filter(|l| !l.is_empty());

        match lines.next() {
            Some("#EXTM3U") => {}
            _ => return Err(Error::Playlist("missing #EXTM3U header".to_string())),
        }

        let mut playlist = Self::live(0);
        let mut pending_duration: Option<f64> = None;
        let mut pending_title: Option<String> = None;
        let mut pending_discontinuity = false;

        for line in lines {
            if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                playlist.target_duration = value
                    .parse()
                    .map_err(|_| Error::Playlist(format!("bad target duration: {}", value)))?;
            } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                playlist.media_sequence = value
                    .parse()
                    .map_err(|_| Error::Playlist(format!("bad media sequence: {}", value)))?;
            } else if let Some(value) = line.strip_prefix("#EXT-X-PLAYLIST-TYPE:") {
                playlist.playlist_type = match value {
                    "VOD" => PlaylistType::Vod,
                    "EVENT" => PlaylistType::Event,
                    other => {
                        return Err(Error::Playlist(format!("unknown playlist type: {}", other)))
                    }
                };
            } else if let Some(value) = line.strip_prefix("#EXTINF:") {
                let (duration, title) = value.split_once(',').unwrap_or((value, ""));
                let duration = duration
                    .parse()
                    .map_err(|_| Error::Playlist(format!("bad segment duration: {}", duration)))?;
                pending_duration = Some(duration);
                pending_title = Some(title.to_string()).filter(|t| !t.is_empty());
            } else if line == "#EXT-X-DISCONTINUITY" {
                pending_discontinuity = true;
            } else if line == "#EXT-X-ENDLIST" {
                playlist.ended = true;
            } else if line.starts_with('#') {
                continue;
            } else if let Some(duration) = pending_duration.take() {
                playlist.segments.push(SegmentEntry {
                    duration,
                    uri: line.to_string(),
                    title: pending_title.take(),
                    discontinuity: std::mem::take(&mut pending_discontinuity),
                });
            }
        }

        Ok(playlist)
    }

    /// Total duration of the listed segments in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// Sequence number one past the last listed segment.
    ///
    /// For a sliding-window playlist this is the number of segments the
    /// engine has produced so far.
    pub fn produced_segments(&self) -> u64 {
        self.media_sequence + self.segments.len() as u64
    }

    /// Render to M3U8 string.
    pub fn render(&self) -> String {
        let mut out = String::new();

        // Writing to a String cannot fail.
        let _ = writeln!(out, "#EXTM3U");
        let _ = writeln!(out, "#EXT-X-VERSION:3");
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", self.target_duration);
        let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence);

        match self.playlist_type {
            PlaylistType::Vod => {
                let _ = writeln!(out, "#EXT-X-PLAYLIST-TYPE:VOD");
            }
            PlaylistType::Event => {
                let _ = writeln!(out, "#EXT-X-PLAYLIST-TYPE:EVENT");
            }
            PlaylistType::Live => {}
        }

        for segment in &self.segments {
            if segment.discontinuity {
                let _ = writeln!(out, "#EXT-X-DISCONTINUITY");
            }
            match segment.title {
                Some(ref title) => {
                    let _ = writeln!(out, "#EXTINF:{:.6},{}", segment.duration, title);
                }
                None => {
                    let _ = writeln!(out, "#EXTINF:{:.6},", segment.duration);
                }
            }
            let _ = writeln!(out, "{}", segment.uri);
        }

        if self.ended {
            let _ = writeln!(out, "#EXT-X-ENDLIST");
        }

        out
    }
}

/// Playlist type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Vod,
    Event,
    Live,
}

/// A segment entry in the playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEntry {
    /// Duration in seconds.
    pub duration: f64,
    /// Segment URI, relative to the playlist.
    pub uri: String,
    /// Optional title.
    pub title: Option<String>,
    /// Discontinuity before this segment.
    pub discontinuity: bool,
}
