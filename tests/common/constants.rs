//! Shared constants for end-to-end tests

#![allow(dead_code)]

// ============================================================================
// Artists and tracks
// ============================================================================

pub const ARTIST_1: &str = "The Test Band";
pub const ARTIST_2: &str = "Jazz Ensemble";

pub const TRACK_1: &str = "Opening Track";
pub const TRACK_2: &str = "Middle Track";
pub const TRACK_3: &str = "Smooth Jazz";

// ============================================================================
// Export file names
// ============================================================================

pub const HISTORY_0: &str = "StreamingHistory0.json";
pub const HISTORY_1: &str = "StreamingHistory1.json";
