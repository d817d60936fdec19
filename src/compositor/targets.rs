//! Offscreen textures the compositor keeps between frames.

use crate::{
    data_structures::texture::Texture,
    tracking::{CapturedImage, ImagePlane},
};

/// `true` when a texture of `current` size has to be replaced to hold `wanted`.
pub fn needs_realloc(current: Option<[u32; 2]>, wanted: [u32; 2]) -> bool {
    current != Some([wanted[0].max(1), wanted[1].max(1)])
}

/// Colour and depth attachment of the scene pass.
#[derive(Debug)]
pub struct SceneTargets {
    pub colour: Texture,
    pub depth: Texture,
}

impl SceneTargets {
    fn new(device: &wgpu::Device, size: [u32; 2]) -> Self {
        log::debug!("allocating scene targets {}x{}", size[0], size[1]);
        Self {
            colour: Texture::create_colour_target(
                device,
                size,
                Texture::SCENE_COLOUR_FORMAT,
                "scene_colour_target",
            ),
            depth: Texture::create_depth_texture(device, size, "scene_depth_target"),
        }
    }

    pub fn size(&self) -> [u32; 2] {
        self.colour.size()
    }
}

/// Scene targets sized to the presentable surface.
#[derive(Debug, Default)]
pub struct RenderTargets {
    scene: Option<SceneTargets>,
}

impl RenderTargets {
    /// (Re)allocates the targets when they are missing or the surface was resized,
    /// e.g. after a rotation.
    pub fn ensure(&mut self, device: &wgpu::Device, size: [u32; 2]) -> &SceneTargets {
        if needs_realloc(self.scene.as_ref().map(SceneTargets::size), size) {
            self.scene = None;
        }
        self.scene.get_or_insert_with(|| SceneTargets::new(device, size))
    }

    pub fn scene(&self) -> Option<&SceneTargets> {
        self.scene.as_ref()
    }
}

/// Matte of the current frame. Either texture may be missing, the composite pass
/// then binds a placeholder that disables occlusion.
#[derive(Debug, Default)]
pub struct MatteTextures {
    pub alpha: Option<Texture>,
    pub dilated_depth: Option<Texture>,
}

/// Luma and chroma textures of the captured camera image.
///
/// The textures are reused for as long as the planes keep their size, a new camera
/// image is written into them.
#[derive(Debug, Default)]
pub struct CameraTextures {
    luma: Option<Texture>,
    chroma: Option<Texture>,
}

impl CameraTextures {
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, image: &CapturedImage) {
        upload_plane(
            &mut self.luma,
            device,
            queue,
            &image.luma,
            Texture::LUMA_FORMAT,
            "camera_luma",
        );
        upload_plane(
            &mut self.chroma,
            device,
            queue,
            &image.chroma,
            Texture::CHROMA_FORMAT,
            "camera_chroma",
        );
    }

    pub fn clear(&mut self) {
        self.luma = None;
        self.chroma = None;
    }

    pub fn planes(&self) -> Option<(&Texture, &Texture)> {
        self.luma.as_ref().zip(self.chroma.as_ref())
    }
}

fn upload_plane(
    slot: &mut Option<Texture>,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    plane: &ImagePlane,
    format: wgpu::TextureFormat,
    label: &str,
) {
    let size = [plane.width, plane.height];
    let expected = plane.bytes_per_row as usize * plane.height as usize;
    let row_bytes = plane.width * format.block_copy_size(None).unwrap_or(1);
    if plane.width == 0
        || plane.height == 0
        || plane.bytes_per_row < row_bytes
        || plane.data.len() < expected
    {
        log::warn!(
            "{} plane of {}x{} has {} bytes, expected {}",
            label,
            plane.width,
            plane.height,
            plane.data.len(),
            expected
        );
        *slot = None;
        return;
    }
    if needs_realloc(slot.as_ref().map(Texture::size), size) {
        *slot = Some(Texture::create_plane(device, size, format, label));
    }
    if let Some(texture) = slot {
        texture.write_plane(queue, &plane.data[..expected], plane.bytes_per_row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realloc_only_on_size_change() {
        assert!(needs_realloc(None, [4, 4]));
        assert!(!needs_realloc(Some([4, 4]), [4, 4]));
        assert!(needs_realloc(Some([4, 4]), [4, 8]));
        // zero sized surfaces are clamped the same way textures are
        assert!(!needs_realloc(Some([1, 1]), [0, 0]));
    }
}
