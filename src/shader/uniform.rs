//! Uniform types, values, the reflected uniform table and its backup store.

use std::fmt;

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

/// The uniform types a program can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
}

impl UniformType {
    /// Parse a GLSL type keyword.
    pub fn from_glsl(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "float" => UniformType::Float,
            "int" => UniformType::Int,
            "vec2" => UniformType::Vec2,
            "vec3" => UniformType::Vec3,
            "vec4" => UniformType::Vec4,
            "mat2" => UniformType::Mat2,
            "mat3" => UniformType::Mat3,
            "mat4" => UniformType::Mat4,
            "sampler2D" => UniformType::Sampler2D,
            _ => return None,
        })
    }

    pub fn glsl(self) -> &'static str {
        match self {
            UniformType::Float => "float",
            UniformType::Int => "int",
            UniformType::Vec2 => "vec2",
            UniformType::Vec3 => "vec3",
            UniformType::Vec4 => "vec4",
            UniformType::Mat2 => "mat2",
            UniformType::Mat3 => "mat3",
            UniformType::Mat4 => "mat4",
            UniformType::Sampler2D => "sampler2D",
        }
    }

    /// Bytes one element occupies in the backup store (tightly packed).
    ///
    /// Samplers take a pointer-sized slot; their value is never restored.
    pub fn byte_size(self) -> usize {
        match self {
            UniformType::Float | UniformType::Int => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat2 => 16,
            UniformType::Mat3 => 36,
            UniformType::Mat4 => 64,
            UniformType::Sampler2D => std::mem::size_of::<usize>(),
        }
    }

    /// `(columns, rows)` for matrix types.
    pub fn matrix_dims(self) -> Option<(usize, usize)> {
        match self {
            UniformType::Mat2 => Some((2, 2)),
            UniformType::Mat3 => Some((3, 3)),
            UniformType::Mat4 => Some((4, 4)),
            _ => None,
        }
    }

    pub fn is_sampler(self) -> bool {
        matches!(self, UniformType::Sampler2D)
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glsl())
    }
}

/// A single uniform value as set from the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat2(_) => UniformType::Mat2,
            UniformValue::Mat3(_) => UniformType::Mat3,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Write the tightly packed bytes of this value into `out`.
    ///
    /// `out` must be exactly `self.ty().byte_size()` long.
    pub fn write_bytes(&self, out: &mut [u8]) {
        match self {
            UniformValue::Float(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Int(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec2(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec3(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec4(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Mat2(m) => {
                out.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array()))
            }
            UniformValue::Mat3(m) => {
                out.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array()))
            }
            UniformValue::Mat4(m) => {
                out.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array()))
            }
        }
    }

    /// Decode a value of type `ty` from tightly packed bytes.
    pub fn read_bytes(ty: UniformType, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ty.byte_size() {
            return None;
        }
        let floats = |n: usize| -> Vec<f32> {
            (0..n)
                .map(|i| bytemuck::pod_read_unaligned::<f32>(&bytes[i * 4..i * 4 + 4]))
                .collect()
        };
        Some(match ty {
            UniformType::Float => UniformValue::Float(bytemuck::pod_read_unaligned(bytes)),
            UniformType::Int => UniformValue::Int(bytemuck::pod_read_unaligned(bytes)),
            UniformType::Vec2 => UniformValue::Vec2(Vec2::from_slice(&floats(2))),
            UniformType::Vec3 => UniformValue::Vec3(Vec3::from_slice(&floats(3))),
            UniformType::Vec4 => UniformValue::Vec4(Vec4::from_slice(&floats(4))),
            UniformType::Mat2 => UniformValue::Mat2(Mat2::from_cols_slice(&floats(4))),
            UniformType::Mat3 => UniformValue::Mat3(Mat3::from_cols_slice(&floats(9))),
            UniformType::Mat4 => UniformValue::Mat4(Mat4::from_cols_slice(&floats(16))),
            UniformType::Sampler2D => return None,
        })
    }
}

/// One active uniform of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    pub name: String,
    pub ty: UniformType,
    /// `None` for a plain declaration, `Some(n)` for `name[n]`.
    pub array_size: Option<u32>,
    /// Byte offset inside the uniform block, or the texture unit for samplers.
    pub location: u32,
    /// Distance between array elements inside the block.
    pub stride: u32,
    /// Byte offset inside the backup store.
    pub store_offset: usize,
}

impl UniformInfo {
    pub fn count(&self) -> usize {
        self.array_size.unwrap_or(1) as usize
    }

    /// Bytes this uniform takes in the backup store.
    pub fn store_size(&self) -> usize {
        self.ty.byte_size() * self.count()
    }

    /// Whether a value stored for `other` may be carried over to `self`.
    pub fn restorable_from(&self, other: &UniformInfo) -> bool {
        !self.ty.is_sampler()
            && self.name == other.name
            && self.ty == other.ty
            && self.array_size == other.array_size
    }
}

/// The ordered list of active uniforms, rebuilt on every successful link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformTable {
    uniforms: Vec<UniformInfo>,
    block_size: u32,
}

impl UniformTable {
    /// Build a table, assigning backup store offsets in order.
    pub fn new(mut uniforms: Vec<UniformInfo>, block_size: u32) -> Self {
        let mut offset = 0;
        for info in &mut uniforms {
            info.store_offset = offset;
            offset += info.store_size();
        }
        Self {
            uniforms,
            block_size,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &UniformInfo> {
        self.uniforms.iter()
    }

    pub fn len(&self) -> usize {
        self.uniforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uniforms.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    /// Size in bytes of the std140 uniform block.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Bytes needed to back every uniform in the table.
    pub fn store_size(&self) -> usize {
        self.uniforms.iter().map(UniformInfo::store_size).sum()
    }
}

/// Host-side copy of every uniform value, indexed through a [`UniformTable`].
///
/// Outlives recompiles so values can be carried over to the next table.
#[derive(Debug, Clone, Default)]
pub struct UniformStore {
    bytes: Vec<u8>,
}

impl UniformStore {
    pub fn for_table(table: &UniformTable) -> Self {
        Self {
            bytes: vec![0; table.store_size()],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn element(&self, info: &UniformInfo, index: usize) -> &[u8] {
        let size = info.ty.byte_size();
        let start = info.store_offset + index * size;
        &self.bytes[start..start + size]
    }

    pub fn element_mut(&mut self, info: &UniformInfo, index: usize) -> &mut [u8] {
        let size = info.ty.byte_size();
        let start = info.store_offset + index * size;
        &mut self.bytes[start..start + size]
    }

    pub fn uniform(&self, info: &UniformInfo) -> &[u8] {
        &self.bytes[info.store_offset..info.store_offset + info.store_size()]
    }

    pub fn uniform_mut(&mut self, info: &UniformInfo) -> &mut [u8] {
        let range = info.store_offset..info.store_offset + info.store_size();
        &mut self.bytes[range]
    }

    /// Lay the stored values out as a std140 block for upload.
    pub fn pack_std140(&self, table: &UniformTable) -> Vec<u8> {
        let mut block = vec![0u8; table.block_size() as usize];
        for info in table.iter().filter(|u| !u.ty.is_sampler()) {
            for index in 0..info.count() {
                let src = self.element(info, index);
                let base = info.location as usize + index * info.stride as usize;
                match info.ty.matrix_dims() {
                    // Columns are padded to a vec4 each.
                    Some((columns, rows)) if rows > 2 => {
                        let column_bytes = rows * 4;
                        for c in 0..columns {
                            let dst = base + c * 16;
                            block[dst..dst + column_bytes]
                                .copy_from_slice(&src[c * column_bytes..(c + 1) * column_bytes]);
                        }
                    }
                    // A mat2 lives in a single vec4 member, columns back to back.
                    _ => block[base..base + src.len()].copy_from_slice(src),
                }
            }
        }
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, ty: UniformType, array_size: Option<u32>, location: u32) -> UniformInfo {
        let stride = match array_size {
            Some(_) => 16,
            None => 0,
        };
        UniformInfo {
            name: name.into(),
            ty,
            array_size,
            location,
            stride,
            store_offset: 0,
        }
    }

    #[test]
    fn store_sizes_follow_types() {
        assert_eq!(UniformType::Float.byte_size(), 4);
        assert_eq!(UniformType::Vec3.byte_size(), 12);
        assert_eq!(UniformType::Mat3.byte_size(), 36);
        assert_eq!(UniformType::Mat4.byte_size(), 64);
        assert_eq!(
            UniformType::Sampler2D.byte_size(),
            std::mem::size_of::<usize>()
        );
    }

    #[test]
    fn table_assigns_store_offsets_in_order() {
        let table = UniformTable::new(
            vec![
                info("iTime", UniformType::Float, None, 0),
                info("iChannelTime", UniformType::Float, Some(16), 16),
                info("iResolution", UniformType::Vec3, None, 272),
            ],
            288,
        );
        let offsets: Vec<usize> = table.iter().map(|u| u.store_offset).collect();
        assert_eq!(offsets, vec![0, 4, 68]);
        assert_eq!(table.store_size(), 80);
    }

    #[test]
    fn values_read_back_what_was_written() {
        let value = UniformValue::Mat3(Mat3::from_cols_array(&[
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0,
        ]));
        let mut bytes = vec![0u8; 36];
        value.write_bytes(&mut bytes);
        assert_eq!(UniformValue::read_bytes(UniformType::Mat3, &bytes), Some(value));
        assert_eq!(UniformValue::read_bytes(UniformType::Mat3, &bytes[..8]), None);
    }

    #[test]
    fn std140_pads_mat3_columns_and_array_elements() {
        let table = UniformTable::new(
            vec![
                info("m", UniformType::Mat3, None, 0),
                info("a", UniformType::Float, Some(2), 48),
            ],
            80,
        );
        let mut store = UniformStore::for_table(&table);
        let m = table.get("m").unwrap().clone();
        UniformValue::Mat3(Mat3::from_cols_array(&[
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0,
        ]))
        .write_bytes(store.uniform_mut(&m));
        let a = table.get("a").unwrap().clone();
        UniformValue::Float(0.5).write_bytes(store.element_mut(&a, 1));

        let block = store.pack_std140(&table);
        let floats: Vec<f32> = block
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect();
        assert_eq!(&floats[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&floats[4..7], &[4.0, 5.0, 6.0]);
        assert_eq!(&floats[8..11], &[7.0, 8.0, 9.0]);
        assert_eq!(floats[12], 0.0);
        assert_eq!(floats[16], 0.5);
    }

    #[test]
    fn mat2_packs_into_one_vec4_slot() {
        let table = UniformTable::new(
            vec![
                info("rot", UniformType::Mat2, None, 0),
                info("after", UniformType::Float, None, 16),
            ],
            32,
        );
        let mut store = UniformStore::for_table(&table);
        let rot = table.get("rot").unwrap().clone();
        UniformValue::Mat2(Mat2::from_cols_array(&[1.0, 2.0, 3.0, 4.0]))
            .write_bytes(store.uniform_mut(&rot));
        let after = table.get("after").unwrap().clone();
        UniformValue::Float(5.0).write_bytes(store.uniform_mut(&after));

        let block = store.pack_std140(&table);
        let floats: Vec<f32> = block
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect();
        assert_eq!(&floats[0..5], &[1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn samplers_are_never_restorable() {
        let a = info("iChannel0", UniformType::Sampler2D, None, 0);
        assert!(!a.restorable_from(&a.clone()));
        let f = info("x", UniformType::Float, None, 0);
        assert!(f.restorable_from(&info("x", UniformType::Float, None, 32)));
        assert!(!f.restorable_from(&info("x", UniformType::Int, None, 0)));
        assert!(!f.restorable_from(&info("x", UniformType::Float, Some(2), 0)));
    }
}
