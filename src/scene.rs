use std::{fs::File, io::Read, path::Path};

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::{
    media::{MediaElement, MediaKind},
    memory::{MemoryDocument, MemoryMedia},
};

/// Initial document contents for the simulator.
#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct ContainerSpec {
    pub name: String,

    #[serde(default)]
    pub media: Vec<MediaSpec>,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct MediaSpec {
    pub name: String,
    pub kind: MediaKind,

    #[serde(default)]
    pub controls: bool,

    #[serde(default = "full_volume")]
    pub volume: f64,

    #[serde(default)]
    pub playing: bool,

    #[serde(default)]
    pub width: Option<f64>,

    #[serde(default)]
    pub height: Option<f64>,

    #[serde(default)]
    pub autoplay_blocked: bool,
}

fn full_volume() -> f64 {
    1.0
}

impl MediaSpec {
    fn to_media(&self) -> MemoryMedia {
        let mut media = MemoryMedia::new(self.name.clone(), self.kind)
            .with_controls(self.controls)
            .with_volume(self.volume);
        if self.width.is_some() || self.height.is_some() {
            let size = media.bounding_rect();
            media = media.with_size(
                self.width.unwrap_or(size.width),
                self.height.unwrap_or(size.height),
            );
        }
        media
    }
}

impl Scene {
    pub fn read(file: &mut impl Read) -> anyhow::Result<Self> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("Failed to read scene file")?;

        let scene = toml::from_str(&contents).context("Failed to parse scene file")?;
        Ok(scene)
    }

    pub fn read_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut file = File::open(path).context("Failed to open scene file")?;
        Self::read(&mut file)
    }

    /// Populates `doc` with the scene's containers and media.
    pub fn build(&self, doc: &MemoryDocument) -> anyhow::Result<()> {
        for container in &self.containers {
            if doc.container_named(&container.name).is_some() {
                return Err(anyhow!("Duplicate container `{}`", container.name));
            }
            let id = doc.add_container(container.name.clone());
            for spec in &container.media {
                if doc.find_media(&spec.name).is_some() {
                    return Err(anyhow!("Duplicate media element `{}`", spec.name));
                }
                let media = doc
                    .insert_media(id, spec.to_media())
                    .context("Container vanished while building the scene")?;
                if spec.playing {
                    media
                        .play()
                        .with_context(|| format!("Failed to start `{}`", spec.name))?;
                }
                media.block_playback(spec.autoplay_blocked);
            }
        }
        log::info!(
            "Built scene with {} container(s) and {} media element(s)",
            self.containers.len(),
            doc.all_media().len()
        );
        Ok(())
    }
}
