//! Shader text handling: lifting loose uniforms into a block, injecting the
//! channel preamble, and compiling a stage with naga's GLSL front-end.
//!
//! User shaders are written against a GL-style surface:
//!
//! ```glsl
//! #version 450
//! uniform float iTime;
//! uniform vec3 iResolution;
//! uniform sampler2D iChannel0;
//! layout(location = 0) in vec2 uv;
//! layout(location = 0) out vec4 fragColor;
//! void main() { fragColor = texture(iChannel0, uv) * abs(sin(iTime)); }
//! ```
//!
//! Loose `uniform` lines are blanked (so line numbers survive) and re-declared
//! as members of one std140 block at `set = 0, binding = 0`. Channel samplers
//! become macros over separate textures in set 1 plus one shared sampler.
//!
//! A `mat2` cannot live in a std140 block as is, so it is stored as a `vec4`
//! member (`<name>_tincture_mat2`) and the user's name becomes a macro that
//! rebuilds the matrix from its two columns.

use std::fmt;

use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};

use super::uniform::UniformType;
use crate::render_graph::CHANNEL_COUNT;

/// Name of the generated uniform block.
pub const UNIFORM_BLOCK: &str = "TinctureUniforms";

/// Binding of the shared channel sampler inside set 1.
pub const CHANNEL_SAMPLER_BINDING: u32 = CHANNEL_COUNT as u32;

const PACKED_MAT2_SUFFIX: &str = "_tincture_mat2";

/// Block member name backing the `mat2` uniform `name`.
pub fn packed_mat2_name(name: &str) -> String {
    format!("{name}{PACKED_MAT2_SUFFIX}")
}

/// `rot_tincture_mat2` -> `Some("rot")`.
pub fn unpacked_mat2_name(member: &str) -> Option<&str> {
    member
        .strip_suffix(PACKED_MAT2_SUFFIX)
        .filter(|name| !name.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    pub fn naga(self) -> naga::ShaderStage {
        match self {
            Stage::Vertex => naga::ShaderStage::Vertex,
            Stage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => f.write_str("vertex"),
            Stage::Fragment => f.write_str("fragment"),
        }
    }
}

/// A loose `uniform` declaration lifted out of user source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub ty: UniformType,
    pub array_size: Option<u32>,
    /// 1-based line in the user's source.
    pub line: usize,
}

impl UniformDecl {
    fn member(&self) -> String {
        match (self.ty, self.array_size) {
            (UniformType::Mat2, None) => format!("    vec4 {};", packed_mat2_name(&self.name)),
            (_, Some(n)) => format!("    {} {}[{}];", self.ty, self.name, n),
            (_, None) => format!("    {} {};", self.ty, self.name),
        }
    }

    fn alias(&self) -> Option<String> {
        (self.ty == UniformType::Mat2 && self.array_size.is_none()).then(|| {
            let packed = packed_mat2_name(&self.name);
            format!("#define {} mat2({packed}.xy, {packed}.zw)", self.name)
        })
    }

    fn same_shape(&self, other: &UniformDecl) -> bool {
        self.ty == other.ty && self.array_size == other.array_size
    }
}

/// User source with its lifted declarations removed.
#[derive(Debug, Clone)]
pub struct ScannedSource {
    lines: Vec<String>,
    version_line: Option<usize>,
    decls: Vec<UniformDecl>,
    /// Log entries for declarations that cannot be lifted.
    rejected: Vec<String>,
}

impl ScannedSource {
    pub fn scan(source: &str) -> Self {
        let mut lines = Vec::new();
        let mut version_line = None;
        let mut decls = Vec::new();
        let mut rejected = Vec::new();

        for (index, line) in source.lines().enumerate() {
            if version_line.is_none() && line.trim_start().starts_with("#version") {
                version_line = Some(index);
            }
            match parse_uniform_line(line) {
                Some(Lifted::Value {
                    name,
                    ty: UniformType::Mat2,
                    array_size: Some(_),
                }) => {
                    rejected.push(format!(
                        "ERROR: 0:{}: '{name}' : arrays of mat2 are not supported as uniforms",
                        index + 1
                    ));
                    lines.push(String::new());
                }
                Some(Lifted::Value { name, ty, array_size }) => {
                    decls.push(UniformDecl {
                        name,
                        ty,
                        array_size,
                        line: index + 1,
                    });
                    lines.push(String::new());
                }
                Some(Lifted::Channel) => lines.push(String::new()),
                None => lines.push(line.to_string()),
            }
        }

        Self {
            lines,
            version_line,
            decls,
            rejected,
        }
    }

    pub fn decls(&self) -> &[UniformDecl] {
        &self.decls
    }

    /// Render the compilable text against a declaration list.
    pub fn generate(&self, decls: &[UniformDecl]) -> GeneratedSource {
        let preamble = preamble(decls);
        let mut out: Vec<&str> = Vec::with_capacity(self.lines.len() + preamble.len() + 1);

        let line_map = match self.version_line {
            Some(version) => {
                out.extend(self.lines[..=version].iter().map(String::as_str));
                out.extend(preamble.iter().map(String::as_str));
                out.extend(self.lines[version + 1..].iter().map(String::as_str));
                LineMap {
                    insert_after: version + 1,
                    inserted: preamble.len(),
                }
            }
            None => {
                out.push("#version 450");
                out.extend(preamble.iter().map(String::as_str));
                out.extend(self.lines.iter().map(String::as_str));
                LineMap {
                    insert_after: 0,
                    inserted: preamble.len() + 1,
                }
            }
        };

        let mut text = out.join("\n");
        text.push('\n');
        GeneratedSource {
            text,
            line_map,
            rejected: self.rejected.clone(),
        }
    }
}

/// Merge two declaration lists, first list wins on order.
///
/// A name declared in both with a different type or array size is reported
/// as `(first, second)`.
pub fn merge_decls(
    first: &[UniformDecl],
    second: &[UniformDecl],
) -> Result<Vec<UniformDecl>, (UniformDecl, UniformDecl)> {
    let mut merged: Vec<UniformDecl> = Vec::with_capacity(first.len() + second.len());
    for decl in first.iter().chain(second) {
        match merged.iter().find(|d| d.name == decl.name) {
            Some(existing) if existing.same_shape(decl) => {}
            Some(existing) => return Err((existing.clone(), decl.clone())),
            None => merged.push(decl.clone()),
        }
    }
    Ok(merged)
}

/// Maps lines of generated text back to the user's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMap {
    insert_after: usize,
    inserted: usize,
}

impl LineMap {
    /// Translate a 1-based generated line; `None` for preamble lines.
    pub fn to_user(&self, generated: usize) -> Option<usize> {
        if generated <= self.insert_after {
            Some(generated)
        } else if generated <= self.insert_after + self.inserted {
            None
        } else {
            Some(generated - self.inserted)
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedSource {
    pub text: String,
    pub line_map: LineMap,
    rejected: Vec<String>,
}

impl GeneratedSource {
    /// Compile this text as `stage`, producing a validated module.
    ///
    /// Failures come back as a driver-style log, one
    /// `ERROR: 0:<line>: <message>` entry per problem.
    pub fn compile(&self, stage: Stage) -> Result<(naga::Module, ModuleInfo), String> {
        if !self.rejected.is_empty() {
            return Err(self.rejected.join("\n"));
        }
        let mut frontend = Frontend::default();
        let module = frontend
            .parse(&Options::from(stage.naga()), &self.text)
            .map_err(|errors| {
                let entries: Vec<String> = errors
                    .errors
                    .iter()
                    .map(|e| self.log_entry(e.meta, &e.kind.to_string()))
                    .collect();
                entries.join("\n")
            })?;

        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|err| {
                let span = err
                    .spans()
                    .map(|(span, _)| *span)
                    .find(|span| span.is_defined())
                    .unwrap_or_default();
                self.log_entry(span, &error_chain(err.as_inner()))
            })?;

        Ok((module, info))
    }

    fn log_entry(&self, span: naga::Span, message: &str) -> String {
        let message = message.replace('\n', " ");
        let line = span
            .is_defined()
            .then(|| span.location(&self.text).line_number as usize)
            .and_then(|line| self.line_map.to_user(line));
        match line {
            Some(line) => format!("ERROR: 0:{line}: {message}"),
            None => format!("ERROR: {message}"),
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

enum Lifted {
    Value {
        name: String,
        ty: UniformType,
        array_size: Option<u32>,
    },
    Channel,
}

fn parse_uniform_line(line: &str) -> Option<Lifted> {
    let code = match line.find("//") {
        Some(comment) => &line[..comment],
        None => line,
    };
    let rest = code.trim().strip_prefix("uniform")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let body = rest.trim().strip_suffix(';')?.trim_end();

    let (mut keyword, mut rest) = split_word(body)?;
    if matches!(keyword, "lowp" | "mediump" | "highp") {
        (keyword, rest) = split_word(rest)?;
    }
    let ty = UniformType::from_glsl(keyword)?;

    let rest = rest.trim();
    let (name, array_size) = match rest.find('[') {
        Some(open) => {
            let size = rest[open + 1..].strip_suffix(']')?.trim().parse::<u32>().ok()?;
            if size == 0 {
                return None;
            }
            (rest[..open].trim_end(), Some(size))
        }
        None => (rest, None),
    };
    if !is_identifier(name) {
        return None;
    }

    if ty.is_sampler() {
        return (array_size.is_none() && channel_index(name).is_some()).then_some(Lifted::Channel);
    }
    Some(Lifted::Value {
        name: name.to_string(),
        ty,
        array_size,
    })
}

fn split_word(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    let end = s.find(char::is_whitespace)?;
    Some((&s[..end], &s[end..]))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `iChannel7` -> `Some(7)`.
pub fn channel_index(name: &str) -> Option<usize> {
    let index: usize = name.strip_prefix("iChannel")?.parse().ok()?;
    (index < CHANNEL_COUNT && name == format!("iChannel{index}")).then_some(index)
}

/// Name of the texture global backing channel `index`.
pub fn channel_texture_name(index: usize) -> String {
    format!("iChannel{index}_texture")
}

fn preamble(decls: &[UniformDecl]) -> Vec<String> {
    let mut lines = Vec::new();
    if !decls.is_empty() {
        lines.push(format!(
            "layout(set = 0, binding = 0, std140) uniform {UNIFORM_BLOCK} {{"
        ));
        lines.extend(decls.iter().map(UniformDecl::member));
        lines.push("};".to_string());
        lines.extend(decls.iter().filter_map(UniformDecl::alias));
    }
    for index in 0..CHANNEL_COUNT {
        lines.push(format!(
            "layout(set = 1, binding = {index}) uniform texture2D {};",
            channel_texture_name(index)
        ));
    }
    lines.push(format!(
        "layout(set = 1, binding = {CHANNEL_SAMPLER_BINDING}) uniform sampler iChannelSampler;"
    ));
    for index in 0..CHANNEL_COUNT {
        lines.push(format!(
            "#define iChannel{index} sampler2D({}, iChannelSampler)",
            channel_texture_name(index)
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT: &str = "#version 450
uniform float iTime;
uniform vec3 iChannelResolution[16]; // per channel
uniform sampler2D iChannel0;
layout(location = 0) in vec2 uv;
layout(location = 0) out vec4 fragColor;
void main() {
    fragColor = texture(iChannel0, uv) * iTime + vec4(iChannelResolution[0], 1.0);
}
";

    #[test]
    fn lifts_loose_uniforms_and_keeps_line_count() {
        let scanned = ScannedSource::scan(FRAGMENT);
        let names: Vec<&str> = scanned.decls().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["iTime", "iChannelResolution"]);
        assert_eq!(scanned.decls()[1].array_size, Some(16));
        assert_eq!(scanned.decls()[1].line, 3);
        assert_eq!(scanned.lines.len(), FRAGMENT.lines().count());
        assert!(scanned.lines[3].is_empty());
    }

    #[test]
    fn leaves_unrecognized_declarations_alone() {
        assert!(parse_uniform_line("uniform sampler2D shadowMap;").is_none());
        assert!(parse_uniform_line("uniform float a, b;").is_none());
        assert!(parse_uniform_line("uniform bool flag;").is_none());
        assert!(parse_uniform_line("uniformfloat x;").is_none());
        assert!(matches!(
            parse_uniform_line("  uniform highp vec2 iMouseDrag ;"),
            Some(Lifted::Value { ty: UniformType::Vec2, .. })
        ));
    }

    #[test]
    fn line_map_skips_the_preamble() {
        let scanned = ScannedSource::scan(FRAGMENT);
        let generated = scanned.generate(scanned.decls());
        let map = generated.line_map;
        assert_eq!(map.to_user(1), Some(1));
        assert_eq!(map.to_user(2), None);
        let main_line = generated
            .text
            .lines()
            .position(|l| l.starts_with("void main"))
            .unwrap()
            + 1;
        assert_eq!(map.to_user(main_line), Some(7));
    }

    #[test]
    fn prepends_version_when_missing() {
        let scanned = ScannedSource::scan("void main() {}\n");
        let generated = scanned.generate(&[]);
        assert!(generated.text.starts_with("#version 450\n"));
        let main_line = generated.text.lines().count();
        assert_eq!(generated.line_map.to_user(main_line), Some(1));
    }

    #[test]
    fn compiles_a_fragment_stage() {
        let scanned = ScannedSource::scan(FRAGMENT);
        let generated = scanned.generate(scanned.decls());
        let result = generated.compile(Stage::Fragment);
        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[test]
    fn compile_errors_point_at_user_lines() {
        let source = "#version 450
uniform float iTime;
layout(location = 0) out vec4 fragColor;
void main() {
    fragColor = vec4(undeclared_thing);
}
";
        let scanned = ScannedSource::scan(source);
        let log = scanned
            .generate(scanned.decls())
            .compile(Stage::Fragment)
            .unwrap_err();
        assert!(log.starts_with("ERROR: 0:5: "), "{log}");
    }

    #[test]
    fn conflicting_declarations_do_not_merge() {
        let a = ScannedSource::scan("uniform float x;\nuniform vec2 y;\n");
        let b = ScannedSource::scan("uniform vec2 y;\nuniform int x;\n");
        let (first, second) = merge_decls(a.decls(), b.decls()).unwrap_err();
        assert_eq!(first.ty, UniformType::Float);
        assert_eq!(second.line, 2);

        let c = ScannedSource::scan("uniform vec2 y;\nuniform float z;\n");
        let merged = merge_decls(a.decls(), c.decls()).unwrap();
        let names: Vec<&str> = merged.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn mat2_is_stored_as_a_vec4_member() {
        let source = "#version 450
uniform mat2 rot;
layout(location = 0) in vec2 uv;
layout(location = 0) out vec4 fragColor;
void main() { fragColor = vec4(rot * uv, 0.0, 1.0); }
";
        let scanned = ScannedSource::scan(source);
        let generated = scanned.generate(scanned.decls());
        assert!(generated.text.contains("    vec4 rot_tincture_mat2;"));
        assert!(generated.text.contains(
            "#define rot mat2(rot_tincture_mat2.xy, rot_tincture_mat2.zw)"
        ));
        let result = generated.compile(Stage::Fragment);
        assert!(result.is_ok(), "{:?}", result.err());
        assert_eq!(unpacked_mat2_name("rot_tincture_mat2"), Some("rot"));
        assert_eq!(unpacked_mat2_name("_tincture_mat2"), None);
    }

    #[test]
    fn mat2_arrays_are_reported_on_their_line() {
        let source = "#version 450
layout(location = 0) out vec4 fragColor;
uniform mat2 bones[4];
void main() { fragColor = vec4(1.0); }
";
        let scanned = ScannedSource::scan(source);
        assert!(scanned.decls().is_empty());
        let log = scanned
            .generate(scanned.decls())
            .compile(Stage::Fragment)
            .unwrap_err();
        assert!(log.starts_with("ERROR: 0:3: 'bones'"), "{log}");
    }

    #[test]
    fn channel_names() {
        assert_eq!(channel_index("iChannel0"), Some(0));
        assert_eq!(channel_index("iChannel15"), Some(15));
        assert_eq!(channel_index("iChannel16"), None);
        assert_eq!(channel_index("iChannel01"), None);
    }
}
