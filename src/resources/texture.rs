use std::{collections::HashMap, path::PathBuf};

use anyhow::Context as _;
use futures::future::join_all;

use crate::data_structures::texture::Texture;

/// Assets are resolved relative to `./assets`.
pub fn asset_path(file_name: &str) -> PathBuf {
    std::path::Path::new("./").join("assets").join(file_name)
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    let path = asset_path(file_name);
    tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    let path = asset_path(file_name);
    tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))
}

pub async fn load_texture(
    file_name: &str,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> anyhow::Result<Texture> {
    let data = load_binary(file_name).await?;
    Ok(Texture::from_bytes(device, queue, &data, file_name)?)
}

/// Textures by name. Lookups return `None` for anything that is not loaded; nothing
/// in here panics on a missing key.
#[derive(Debug, Default)]
pub struct TextureLibrary {
    textures: HashMap<String, Texture>,
}

impl TextureLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, texture: Texture) -> Option<Texture> {
        self.textures.insert(key.into(), texture)
    }

    pub fn get(&self, key: &str) -> Option<&Texture> {
        self.textures.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.textures.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Texture> {
        self.textures.remove(key)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Loads `(key, file name)` pairs concurrently. Failures are logged and leave the
    /// key absent; the number of loaded textures is returned.
    pub async fn load_all(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        entries: &[(&str, &str)],
    ) -> usize {
        let loads = entries
            .iter()
            .map(|(key, file)| async move { (*key, load_texture(file, device, queue).await) });
        let mut loaded = 0;
        for (key, result) in join_all(loads).await {
            match result {
                Ok(texture) => {
                    self.insert(key, texture);
                    loaded += 1;
                }
                Err(e) => log::warn!("texture '{}' could not be loaded: {:#}", key, e),
            }
        }
        loaded
    }
}
