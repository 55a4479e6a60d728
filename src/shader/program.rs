//! The CPU side of a shader program: attached stages, linking, the uniform
//! table and the value store that survives recompiles.

use super::reflect::{CompiledStage, check_interface, reflect_uniforms};
use super::source::{ScannedSource, Stage, merge_decls};
use super::uniform::{UniformInfo, UniformStore, UniformTable, UniformValue};
use crate::error::ShaderError;

/// A stage that compiled on its own.
#[derive(Debug, Clone)]
struct AttachedStage {
    source: String,
    scanned: ScannedSource,
}

/// Both stages compiled against the merged uniform block.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex: CompiledStage,
    pub fragment: CompiledStage,
    pub vertex_source: String,
    pub fragment_source: String,
}

/// The result of a link that has not been committed yet.
///
/// Lets the GPU side build its pipeline before the program swaps state, so
/// a pipeline failure can still leave the previous program in place.
#[derive(Debug, Clone)]
pub struct StagedLink {
    pub linked: LinkedProgram,
    pub uniforms: UniformTable,
}

/// A vertex + fragment program with introspected uniforms.
///
/// Compile and link failures never discard the last good state: the linked
/// program, its uniform table and the stored values stay as they were, and
/// only the validity flag drops.
///
/// ```ignore
/// use tincture::{ShaderProgram, Stage, UniformValue};
///
/// let mut program = ShaderProgram::new("Buffer A");
/// program.attach(Stage::Vertex, include_str!("../shaders/base.vert"))?;
/// program.attach(Stage::Fragment, "uniform float speed; /* ... */")?;
/// program.link()?;
/// program.set_uniform("speed", UniformValue::Float(2.0));
/// # Ok::<(), tincture::ShaderError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    name: String,
    vertex: Option<AttachedStage>,
    fragment: Option<AttachedStage>,
    linked: Option<LinkedProgram>,
    uniforms: UniformTable,
    store: UniformStore,
    valid: bool,
    generation: u64,
}

impl ShaderProgram {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex: None,
            fragment: None,
            linked: None,
            uniforms: UniformTable::default(),
            store: UniformStore::default(),
            valid: false,
            generation: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compile `source` as `stage` and keep it for the next link.
    ///
    /// The previously attached stage is dropped only when this one compiles.
    pub fn attach(&mut self, stage: Stage, source: &str) -> Result<(), ShaderError> {
        if source.trim().is_empty() {
            self.valid = false;
            return Err(ShaderError::EmptySource { stage });
        }

        let scanned = ScannedSource::scan(source);
        if let Err(log) = scanned.generate(scanned.decls()).compile(stage) {
            self.valid = false;
            return Err(ShaderError::Compile { stage, log });
        }

        let attached = AttachedStage {
            source: source.to_string(),
            scanned,
        };
        match stage {
            Stage::Vertex => self.vertex = Some(attached),
            Stage::Fragment => self.fragment = Some(attached),
        }
        Ok(())
    }

    /// Link the attached stages without touching the current state.
    ///
    /// On error the program is marked invalid; nothing else changes.
    pub fn stage_link(&mut self) -> Result<StagedLink, ShaderError> {
        let result = self.try_stage_link();
        if result.is_err() {
            self.valid = false;
        }
        result
    }

    fn try_stage_link(&self) -> Result<StagedLink, ShaderError> {
        let vertex = self.vertex.as_ref().ok_or(ShaderError::MissingStage {
            stage: Stage::Vertex,
        })?;
        let fragment = self.fragment.as_ref().ok_or(ShaderError::MissingStage {
            stage: Stage::Fragment,
        })?;

        let decls = merge_decls(vertex.scanned.decls(), fragment.scanned.decls()).map_err(
            |(first, second)| ShaderError::Link {
                log: format!(
                    "ERROR: 0:{}: uniform '{}' is declared as {} in the vertex shader and as {} here",
                    second.line, second.name, first.ty, second.ty
                ),
            },
        )?;

        let compile = |attached: &AttachedStage, stage: Stage| {
            attached
                .scanned
                .generate(&decls)
                .compile(stage)
                .map(|(module, info)| CompiledStage { module, info })
                .map_err(|log| ShaderError::Link { log })
        };
        let vertex_stage = compile(vertex, Stage::Vertex)?;
        let fragment_stage = compile(fragment, Stage::Fragment)?;

        check_interface(&vertex_stage.module, &fragment_stage.module)
            .map_err(|log| ShaderError::Link { log })?;

        let uniforms = reflect_uniforms(&vertex_stage, &fragment_stage);
        Ok(StagedLink {
            linked: LinkedProgram {
                vertex: vertex_stage,
                fragment: fragment_stage,
                vertex_source: vertex.source.clone(),
                fragment_source: fragment.source.clone(),
            },
            uniforms,
        })
    }

    /// Swap in a staged link, carrying over every value whose name, type and
    /// array size are unchanged. Everything else starts at zero.
    pub fn commit(&mut self, staged: StagedLink) -> &UniformTable {
        let StagedLink { linked, uniforms } = staged;
        let mut store = UniformStore::for_table(&uniforms);

        for info in uniforms.iter().filter(|u| !u.ty.is_sampler()) {
            match self.uniforms.get(&info.name) {
                Some(previous) if info.restorable_from(previous) => {
                    store
                        .uniform_mut(info)
                        .copy_from_slice(self.store.uniform(previous));
                }
                Some(previous) => {
                    tracing::debug!(
                        program = %self.name,
                        uniform = %info.name,
                        was = %previous.ty,
                        now = %info.ty,
                        "uniform changed shape, resetting to zero"
                    );
                }
                None => {}
            }
        }

        self.linked = Some(linked);
        self.uniforms = uniforms;
        self.store = store;
        self.valid = true;
        self.generation += 1;
        &self.uniforms
    }

    /// Link the attached stages and rebuild the uniform table.
    pub fn link(&mut self) -> Result<&UniformTable, ShaderError> {
        let staged = self.stage_link()?;
        Ok(self.commit(staged))
    }

    /// Mark the program unusable while keeping its last good state.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Bumped on every successful link.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn linked(&self) -> Option<&LinkedProgram> {
        self.linked.as_ref()
    }

    pub fn uniforms(&self) -> &UniformTable {
        &self.uniforms
    }

    /// Source of an attached stage (which may be newer than the linked one).
    pub fn source(&self, stage: Stage) -> Option<&str> {
        let attached = match stage {
            Stage::Vertex => self.vertex.as_ref(),
            Stage::Fragment => self.fragment.as_ref(),
        };
        attached.map(|a| a.source.as_str())
    }

    /// Set a uniform by name. Unknown names, type mismatches and invalid
    /// programs are ignored.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.set_uniform_array(name, &[value]);
    }

    /// Set the leading elements of an array uniform.
    pub fn set_uniform_array(&mut self, name: &str, values: &[UniformValue]) {
        let Some(info) = self.writable(name) else {
            return;
        };
        for (index, value) in values.iter().take(info.count()).enumerate() {
            if value.ty() == info.ty {
                value.write_bytes(self.store.element_mut(&info, index));
            }
        }
    }

    fn writable(&self, name: &str) -> Option<UniformInfo> {
        if !self.valid {
            return None;
        }
        self.uniforms
            .get(name)
            .filter(|info| !info.ty.is_sampler())
            .cloned()
    }

    /// Read back the first element of a uniform.
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniform_at(name, 0)
    }

    pub fn uniform_at(&self, name: &str, index: usize) -> Option<UniformValue> {
        let info = self.uniforms.get(name)?;
        if info.ty.is_sampler() || index >= info.count() {
            return None;
        }
        UniformValue::read_bytes(info.ty, self.store.element(info, index))
    }

    /// The std140 bytes of the uniform block, ready for upload.
    pub fn pack_block(&self) -> Vec<u8> {
        self.store.pack_std140(&self.uniforms)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};

    use super::*;
    use crate::shader::uniform::UniformType;

    const VERTEX: &str = include_str!("../shaders/base.vert");

    fn fragment(uniforms: &str, body: &str) -> String {
        format!(
            "#version 450
{uniforms}
layout(location = 0) in vec2 uv;
layout(location = 0) out vec4 fragColor;
void main() {{ {body} }}
"
        )
    }

    fn linked(frag: &str) -> ShaderProgram {
        let mut program = ShaderProgram::new("test");
        program.attach(Stage::Vertex, VERTEX).unwrap();
        program.attach(Stage::Fragment, frag).unwrap();
        program.link().unwrap();
        program
    }

    #[test]
    fn empty_source_is_rejected_before_compiling() {
        let mut program = linked(&fragment("", "fragColor = vec4(1.0);"));
        let err = program.attach(Stage::Fragment, "  \n\t").unwrap_err();
        assert_eq!(
            err,
            ShaderError::EmptySource {
                stage: Stage::Fragment
            }
        );
        assert!(!program.is_valid());
    }

    #[test]
    fn link_requires_both_stages() {
        let mut program = ShaderProgram::new("half");
        program
            .attach(Stage::Fragment, &fragment("", "fragColor = vec4(1.0);"))
            .unwrap();
        assert_eq!(
            program.link().unwrap_err(),
            ShaderError::MissingStage {
                stage: Stage::Vertex
            }
        );
        assert!(!program.is_valid());
    }

    #[test]
    fn values_survive_a_recompile() {
        let mut program = linked(&fragment(
            "uniform float speed;\nuniform vec2 offset;\nuniform float gone;",
            "fragColor = vec4(offset, speed, gone);",
        ));
        program.set_uniform("speed", UniformValue::Float(2.5));
        program.set_uniform("offset", UniformValue::Vec2(Vec2::new(1.0, -1.0)));
        program.set_uniform("gone", UniformValue::Float(9.0));

        program
            .attach(
                Stage::Fragment,
                &fragment(
                    "uniform vec2 offset;\nuniform float fresh;\nuniform float speed;",
                    "fragColor = vec4(offset, speed, fresh);",
                ),
            )
            .unwrap();
        program.link().unwrap();

        assert_eq!(program.uniform("speed"), Some(UniformValue::Float(2.5)));
        assert_eq!(
            program.uniform("offset"),
            Some(UniformValue::Vec2(Vec2::new(1.0, -1.0)))
        );
        assert_eq!(program.uniform("fresh"), Some(UniformValue::Float(0.0)));
        assert_eq!(program.uniform("gone"), None);
        assert_eq!(program.generation(), 2);
    }

    #[test]
    fn mat2_values_survive_a_recompile() {
        let rotation = glam::Mat2::from_angle(0.5);
        let mut program = linked(&fragment(
            "uniform mat2 rot;",
            "fragColor = vec4(rot * uv, 0.0, 1.0);",
        ));
        assert_eq!(program.uniforms().get("rot").unwrap().ty, UniformType::Mat2);
        program.set_uniform("rot", UniformValue::Mat2(rotation));

        program
            .attach(
                Stage::Fragment,
                &fragment(
                    "uniform float scale;\nuniform mat2 rot;",
                    "fragColor = vec4(rot * uv * scale, 0.0, 1.0);",
                ),
            )
            .unwrap();
        program.link().unwrap();

        assert_eq!(program.uniform("rot"), Some(UniformValue::Mat2(rotation)));
        assert_eq!(program.uniform("scale"), Some(UniformValue::Float(0.0)));
    }

    #[test]
    fn changed_type_resets_to_zero() {
        let mut program = linked(&fragment("uniform float tint;", "fragColor = vec4(tint);"));
        program.set_uniform("tint", UniformValue::Float(0.75));

        program
            .attach(
                Stage::Fragment,
                &fragment("uniform vec3 tint;", "fragColor = vec4(tint, 1.0);"),
            )
            .unwrap();
        program.link().unwrap();

        assert_eq!(
            program.uniform("tint"),
            Some(UniformValue::Vec3(Vec3::ZERO))
        );
    }

    #[test]
    fn failed_compile_keeps_the_last_good_state() {
        let mut program = linked(&fragment("uniform float speed;", "fragColor = vec4(speed);"));
        program.set_uniform("speed", UniformValue::Float(3.0));
        let table = program.uniforms().clone();

        let err = program
            .attach(
                Stage::Fragment,
                &fragment("uniform float speed;", "fragColor = vec4(nope);"),
            )
            .unwrap_err();
        assert!(matches!(err, ShaderError::Compile { stage: Stage::Fragment, .. }));
        assert!(err.log().unwrap().contains("ERROR: 0:"));
        assert!(!program.is_valid());
        assert_eq!(program.uniforms(), &table);
        assert_eq!(program.generation(), 1);
        assert!(program.linked().is_some());
        assert_eq!(program.uniform("speed"), Some(UniformValue::Float(3.0)));
    }

    #[test]
    fn setters_are_ignored_while_invalid() {
        let mut program = linked(&fragment("uniform float speed;", "fragColor = vec4(speed);"));
        program.invalidate();
        program.set_uniform("speed", UniformValue::Float(1.0));
        assert_eq!(program.uniform("speed"), Some(UniformValue::Float(0.0)));
    }

    #[test]
    fn setters_ignore_mismatched_types_and_unknown_names() {
        let mut program = linked(&fragment("uniform float speed;", "fragColor = vec4(speed);"));
        program.set_uniform("speed", UniformValue::Int(4));
        program.set_uniform("missing", UniformValue::Float(4.0));
        assert_eq!(program.uniform("speed"), Some(UniformValue::Float(0.0)));
    }

    #[test]
    fn array_uniforms_take_leading_elements() {
        let mut program = linked(&fragment(
            "uniform float weights[4];",
            "fragColor = vec4(weights[0], weights[1], weights[2], weights[3]);",
        ));
        program.set_uniform_array(
            "weights",
            &[UniformValue::Float(1.0), UniformValue::Float(2.0)],
        );
        assert_eq!(program.uniform_at("weights", 1), Some(UniformValue::Float(2.0)));
        assert_eq!(program.uniform_at("weights", 2), Some(UniformValue::Float(0.0)));
        assert_eq!(program.uniform_at("weights", 4), None);

        let block = program.pack_block();
        let info = program.uniforms().get("weights").unwrap();
        let second = info.location as usize + info.stride as usize;
        assert_eq!(
            bytemuck::pod_read_unaligned::<f32>(&block[second..second + 4]),
            2.0
        );
    }

    #[test]
    fn conflicting_stage_declarations_fail_to_link() {
        let mut program = ShaderProgram::new("conflict");
        program
            .attach(
                Stage::Vertex,
                "#version 450
uniform float scale;
layout(location = 0) in vec4 position;
layout(location = 1) in vec2 texcoord;
layout(location = 0) out vec2 uv;
void main() { uv = texcoord; gl_Position = position * scale; }
",
            )
            .unwrap();
        program
            .attach(
                Stage::Fragment,
                &fragment("uniform vec2 scale;", "fragColor = vec4(scale, 0.0, 1.0);"),
            )
            .unwrap();
        let err = program.link().unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }));
        assert!(err.log().unwrap().starts_with("ERROR: 0:2: "));
    }

    #[test]
    fn shared_uniforms_link_once() {
        let mut program = ShaderProgram::new("shared");
        program
            .attach(
                Stage::Vertex,
                "#version 450
uniform float scale;
layout(location = 0) in vec4 position;
layout(location = 1) in vec2 texcoord;
layout(location = 0) out vec2 uv;
void main() { uv = texcoord; gl_Position = vec4(position.xyz * scale, 1.0); }
",
            )
            .unwrap();
        program
            .attach(
                Stage::Fragment,
                &fragment("uniform float scale;", "fragColor = vec4(scale);"),
            )
            .unwrap();
        let table = program.link().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("scale").unwrap().ty, UniformType::Float);
    }
}
