use crate::models::AcademicTrack;
use anyhow::Context;
use std::path::Path;

const EMBEDDED_TRACKS: &str = include_str!("../data/academic_tracks.json");

/// Read-only academic track reference data, keyed by track id.
#[derive(Debug, Clone, Default)]
pub struct TrackCatalog {
    tracks: Vec<AcademicTrack>,
}

impl TrackCatalog {
    pub fn embedded() -> anyhow::Result<Self> {
        Self::from_json(EMBEDDED_TRACKS).context("embedded academic tracks are malformed")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read academic tracks {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("failed to parse academic tracks {}", path.display()))
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let tracks: Vec<AcademicTrack> = serde_json::from_str(text)?;
        Ok(Self { tracks })
    }

    pub fn get(&self, id: &str) -> Option<&AcademicTrack> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn all(&self) -> &[AcademicTrack] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }
}
