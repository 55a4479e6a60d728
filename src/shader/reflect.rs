//! Uniform introspection and stage interface checks over validated naga modules.

use naga::valid::ModuleInfo;
use naga::{AddressSpace, ArraySize, Binding, Module, ScalarKind, TypeInner, VectorSize};

use super::source::unpacked_mat2_name;
use super::uniform::{UniformInfo, UniformTable, UniformType};
use crate::render_graph::CHANNEL_COUNT;

/// A compiled and validated stage.
#[derive(Debug, Clone)]
pub struct CompiledStage {
    pub module: Module,
    pub info: ModuleInfo,
}

/// Build the uniform table of a program from its two linked stages.
///
/// Every member of the generated block is active. A channel counts as active
/// only when one of the entry points actually samples it.
pub fn reflect_uniforms(vertex: &CompiledStage, fragment: &CompiledStage) -> UniformTable {
    let mut uniforms = Vec::new();
    let mut block_size = 0;

    if let Some((members, span)) = uniform_block(&fragment.module) {
        block_size = span;
        for member in members {
            let Some(name) = member.name.clone() else {
                continue;
            };
            let Some((ty, array_size, stride)) = classify(&fragment.module, member.ty) else {
                tracing::debug!(uniform = %name, "skipping uniform of unsupported type");
                continue;
            };
            let (name, ty) = match (ty, array_size, unpacked_mat2_name(&name)) {
                (UniformType::Vec4, None, Some(matrix)) => (matrix.to_string(), UniformType::Mat2),
                _ => (name, ty),
            };
            uniforms.push(UniformInfo {
                name,
                ty,
                array_size,
                location: member.offset,
                stride,
                store_offset: 0,
            });
        }
    }

    let mut channels: Vec<u32> = [vertex, fragment]
        .into_iter()
        .flat_map(used_channels)
        .collect();
    channels.sort_unstable();
    channels.dedup();
    uniforms.extend(channels.into_iter().map(|binding| UniformInfo {
        name: format!("iChannel{binding}"),
        ty: UniformType::Sampler2D,
        array_size: None,
        location: binding,
        stride: 0,
        store_offset: 0,
    }));

    UniformTable::new(uniforms, block_size)
}

fn uniform_block(module: &Module) -> Option<(&[naga::StructMember], u32)> {
    module.global_variables.iter().find_map(|(_, var)| {
        let binding = var.binding.as_ref()?;
        if var.space != AddressSpace::Uniform || binding.group != 0 || binding.binding != 0 {
            return None;
        }
        match &module.types[var.ty].inner {
            TypeInner::Struct { members, span } => Some((members.as_slice(), *span)),
            _ => None,
        }
    })
}

fn used_channels(stage: &CompiledStage) -> Vec<u32> {
    if stage.module.entry_points.is_empty() {
        return Vec::new();
    }
    let entry = stage.info.get_entry_point(0);
    stage
        .module
        .global_variables
        .iter()
        .filter_map(|(handle, var)| {
            let binding = var.binding.as_ref()?;
            let is_texture = matches!(stage.module.types[var.ty].inner, TypeInner::Image { .. });
            (is_texture
                && binding.group == 1
                && (binding.binding as usize) < CHANNEL_COUNT
                && !entry[handle].is_empty())
            .then_some(binding.binding)
        })
        .collect()
}

/// `(type, array size, array stride)` of a block member.
fn classify(
    module: &Module,
    ty: naga::Handle<naga::Type>,
) -> Option<(UniformType, Option<u32>, u32)> {
    match &module.types[ty].inner {
        TypeInner::Array {
            base,
            size: ArraySize::Constant(size),
            stride,
        } => {
            let element = scalar_type(&module.types[*base].inner)?;
            Some((element, Some(size.get()), *stride))
        }
        inner => Some((scalar_type(inner)?, None, 0)),
    }
}

fn scalar_type(inner: &TypeInner) -> Option<UniformType> {
    match *inner {
        TypeInner::Scalar(scalar) => match scalar.kind {
            ScalarKind::Float => Some(UniformType::Float),
            ScalarKind::Sint => Some(UniformType::Int),
            _ => None,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => Some(match size {
            VectorSize::Bi => UniformType::Vec2,
            VectorSize::Tri => UniformType::Vec3,
            VectorSize::Quad => UniformType::Vec4,
        }),
        TypeInner::Matrix { columns, rows, .. } if columns == rows => Some(match columns {
            VectorSize::Bi => UniformType::Mat2,
            VectorSize::Tri => UniformType::Mat3,
            VectorSize::Quad => UniformType::Mat4,
        }),
        _ => None,
    }
}

/// Check that every fragment input is fed by a matching vertex output.
pub fn check_interface(vertex: &Module, fragment: &Module) -> Result<(), String> {
    let outputs = vertex_outputs(vertex);
    for (location, inner) in fragment_inputs(fragment) {
        match outputs.iter().find(|(l, _)| *l == location) {
            None => {
                return Err(format!(
                    "ERROR: fragment input at location {location} is not written by the vertex shader"
                ));
            }
            Some((_, written)) if *written != inner => {
                return Err(format!(
                    "ERROR: fragment input at location {location} does not match the type written by the vertex shader"
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn vertex_outputs(module: &Module) -> Vec<(u32, TypeInner)> {
    let Some(entry) = module.entry_points.first() else {
        return Vec::new();
    };
    let Some(result) = &entry.function.result else {
        return Vec::new();
    };
    let mut out = Vec::new();
    collect_locations(module, result.ty, result.binding.as_ref(), &mut out);
    out
}

fn fragment_inputs(module: &Module) -> Vec<(u32, TypeInner)> {
    let Some(entry) = module.entry_points.first() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for argument in &entry.function.arguments {
        collect_locations(module, argument.ty, argument.binding.as_ref(), &mut out);
    }
    out
}

fn collect_locations(
    module: &Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut Vec<(u32, TypeInner)>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            out.push((*location, module.types[ty].inner.clone()));
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::source::{ScannedSource, Stage};

    fn compile(source: &str, stage: Stage) -> CompiledStage {
        let scanned = ScannedSource::scan(source);
        let (module, info) = scanned
            .generate(scanned.decls())
            .compile(stage)
            .expect("test shader compiles");
        CompiledStage { module, info }
    }

    const VERTEX: &str = "#version 450
layout(location = 0) in vec4 position;
layout(location = 1) in vec2 texcoord;
layout(location = 0) out vec2 uv;
void main() { uv = texcoord; gl_Position = position; }
";

    #[test]
    fn reflects_block_members_in_declaration_order() {
        let vertex = compile(VERTEX, Stage::Vertex);
        let fragment = compile(
            "#version 450
uniform float iTime;
uniform vec3 iResolution;
uniform mat4 view;
uniform sampler2D iChannel2;
uniform sampler2D iChannel3;
layout(location = 0) in vec2 uv;
layout(location = 0) out vec4 fragColor;
void main() { fragColor = texture(iChannel2, uv) * iTime + view[0] + vec4(iResolution, 0.0); }
",
            Stage::Fragment,
        );

        let table = reflect_uniforms(&vertex, &fragment);
        let names: Vec<&str> = table.iter().map(|u| u.name.as_str()).collect();
        // iChannel3 is declared but never sampled.
        assert_eq!(names, vec!["iTime", "iResolution", "view", "iChannel2"]);
        assert_eq!(table.get("iTime").unwrap().location, 0);
        assert_eq!(table.get("iResolution").unwrap().location, 16);
        assert_eq!(table.get("view").unwrap().location, 32);
        assert_eq!(table.get("iChannel2").unwrap().location, 2);
        assert_eq!(table.block_size(), 96);
    }

    #[test]
    fn reflects_array_stride() {
        let vertex = compile(VERTEX, Stage::Vertex);
        let fragment = compile(
            "#version 450
uniform float iChannelTime[16];
layout(location = 0) in vec2 uv;
layout(location = 0) out vec4 fragColor;
void main() { fragColor = vec4(iChannelTime[3]); }
",
            Stage::Fragment,
        );
        let table = reflect_uniforms(&vertex, &fragment);
        let times = table.get("iChannelTime").unwrap();
        assert_eq!(times.array_size, Some(16));
        assert_eq!(times.stride, 16);
    }

    #[test]
    fn packed_mat2_reflects_as_a_matrix() {
        let vertex = compile(VERTEX, Stage::Vertex);
        let fragment = compile(
            "#version 450
uniform float angle;
uniform mat2 rot;
layout(location = 0) in vec2 uv;
layout(location = 0) out vec4 fragColor;
void main() { fragColor = vec4(rot * uv, angle, 1.0); }
",
            Stage::Fragment,
        );
        let table = reflect_uniforms(&vertex, &fragment);
        let rot = table.get("rot").unwrap();
        assert_eq!(rot.ty, UniformType::Mat2);
        assert_eq!(rot.location, 16);
        assert!(table.get("rot_tincture_mat2").is_none());
    }

    #[test]
    fn interface_mismatch_is_reported() {
        let vertex = compile(VERTEX, Stage::Vertex);
        let fragment = compile(
            "#version 450
layout(location = 3) in vec2 missing;
layout(location = 0) out vec4 fragColor;
void main() { fragColor = vec4(missing, 0.0, 1.0); }
",
            Stage::Fragment,
        );
        let err = check_interface(&vertex.module, &fragment.module).unwrap_err();
        assert!(err.contains("location 3"), "{err}");
    }

    #[test]
    fn matching_interface_passes() {
        let vertex = compile(VERTEX, Stage::Vertex);
        let fragment = compile(
            "#version 450
layout(location = 0) in vec2 uv;
layout(location = 0) out vec4 fragColor;
void main() { fragColor = vec4(uv, 0.0, 1.0); }
",
            Stage::Fragment,
        );
        assert!(check_interface(&vertex.module, &fragment.module).is_ok());
    }
}
