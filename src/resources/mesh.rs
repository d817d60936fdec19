use crate::data_structures::{
    geometry::{GeometryElement, Material},
    mesh::{ModelMesh, SubMesh},
    vertex::BasicVertex,
};

/// Converts tobj output into a CPU-side [`ModelMesh`] in the basic vertex layout.
///
/// Vertex colours come from the file if present, otherwise from the diffuse colour of
/// the sub-mesh's material, otherwise white.
pub fn to_model_mesh(
    name: &str,
    models: &[tobj::Model],
    materials: &[tobj::Material],
) -> (ModelMesh, Vec<GeometryElement>) {
    let mut elements = Vec::with_capacity(models.len());
    let sub_meshes = models
        .iter()
        .map(|m| {
            let material = m.mesh.material_id.and_then(|id| materials.get(id));
            let fallback_colour = material
                .and_then(|mat| mat.diffuse)
                .map_or([1.0; 4], |[r, g, b]| [r, g, b, 1.0]);

            let vertices = (0..m.mesh.positions.len() / 3)
                .map(|i| BasicVertex {
                    position: [
                        m.mesh.positions[i * 3],
                        m.mesh.positions[i * 3 + 1],
                        m.mesh.positions[i * 3 + 2],
                    ],
                    colour: match m.mesh.vertex_color.get(i * 3..i * 3 + 3) {
                        Some(&[r, g, b]) => [r, g, b, 1.0],
                        _ => fallback_colour,
                    },
                    tex_coords: [
                        m.mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                        1.0 - m.mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
                    ],
                })
                .collect::<Vec<_>>();

            elements.push(GeometryElement {
                material: Material {
                    name: material.map_or_else(|| "default".to_string(), |mat| mat.name.clone()),
                    diffuse_texture: material.and_then(|mat| mat.diffuse_texture.clone()),
                },
                indices: 0..m.mesh.indices.len() as u32,
            });

            SubMesh::new(
                m.name.clone(),
                vertices,
                m.mesh.indices.clone(),
                m.mesh.material_id,
            )
        })
        .collect();

    (ModelMesh::new(name.to_string(), sub_meshes), elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_positions_and_flips_texture_v() {
        let model = tobj::Model {
            mesh: tobj::Mesh {
                positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                texcoords: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
                indices: vec![0, 1, 2],
                material_id: Some(0),
                ..Default::default()
            },
            name: "tri".to_string(),
        };
        let material = tobj::Material {
            name: "red".to_string(),
            diffuse: Some([1.0, 0.0, 0.0]),
            diffuse_texture: Some("red.png".to_string()),
            ..Default::default()
        };
        let (mesh, elements) = to_model_mesh("tri.obj", &[model], &[material]);
        let sub = &mesh.sub_meshes[0];
        assert_eq!(sub.vertices.len(), 3);
        assert_eq!(sub.vertices[2].tex_coords, [0.0, 0.0]);
        assert_eq!(sub.vertices[0].colour, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(elements[0].material.diffuse_texture.as_deref(), Some("red.png"));
        assert_eq!(elements[0].indices, 0..3);
    }
}
