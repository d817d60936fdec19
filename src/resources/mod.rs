use std::io::{BufReader, Cursor};

use anyhow::Context as _;

use crate::{
    data_structures::{geometry::Geometry, mesh::Mesh},
    resources::texture::{TextureLibrary, load_string},
};

/**
 * This module contains all logic for loading meshes/textures from external files and
 * for pooling transient GPU buffers.
 */
pub mod mesh;
pub mod pool;
pub mod texture;

/// Loads an `.obj` model from the asset directory into a [`Geometry`].
///
/// Diffuse textures referenced by its materials are loaded into `textures` under their
/// file name; the first one becomes the geometry's texture. A texture that fails to
/// load only leaves the geometry untextured.
pub async fn load_model_obj(
    file_name: &str,
    textures: &mut TextureLibrary,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> anyhow::Result<Geometry> {
    let obj_text = load_string(file_name).await?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));

    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| async move {
            match load_string(&p).await {
                Ok(mat_text) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mat_text))),
                Err(e) => {
                    log::warn!("material library of {} not loaded: {:#}", p, e);
                    Err(tobj::LoadError::OpenFileFailed)
                }
            }
        },
    )
    .await
    .with_context(|| format!("failed to parse '{}'", file_name))?;

    let materials = obj_materials.unwrap_or_else(|e| {
        log::warn!("{} is drawn without materials: {}", file_name, e);
        Vec::new()
    });

    let (model, elements) = mesh::to_model_mesh(file_name, &models, &materials);
    if model.sub_meshes.is_empty() {
        anyhow::bail!("'{}' contains no meshes", file_name);
    }

    let texture_files: Vec<String> = elements
        .iter()
        .filter_map(|element| element.material.diffuse_texture.clone())
        .filter(|file| !textures.contains(file))
        .collect();
    let entries: Vec<(&str, &str)> = texture_files
        .iter()
        .map(|file| (file.as_str(), file.as_str()))
        .collect();
    textures.load_all(device, queue, &entries).await;

    let mut geometry = Geometry::new(Mesh::Model(model));
    if let Some(texture) = elements
        .iter()
        .filter_map(|element| element.material.diffuse_texture.as_deref())
        .find(|file| textures.contains(file))
    {
        geometry.set_texture(texture);
    }
    geometry.elements = elements;
    Ok(geometry)
}
