use super::PlyError;

/// Encoding of the PLY body.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PlyFormat {
    /// Whitespace separated text.
    Ascii,
    /// Little endian binary records.
    BinaryLittleEndian,
    /// Big endian binary records.
    BinaryBigEndian,
}

/// Scalar types allowed in a PLY header.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PlyDataType {
    /// 32 bit float.
    Float32,
    /// 64 bit float.
    Float64,
    /// Signed byte.
    Int8,
    /// Unsigned byte.
    UInt8,
    /// Signed 16 bit integer.
    Int16,
    /// Unsigned 16 bit integer.
    UInt16,
    /// Signed 32 bit integer.
    Int32,
    /// Unsigned 32 bit integer.
    UInt32,
}

impl PlyDataType {
    /// Parse a type name, accepting both the legacy and the sized spellings.
    pub fn parse(type_str: &str) -> Result<Self, PlyError> {
        match type_str {
            "float" | "float32" => Ok(PlyDataType::Float32),
            "double" | "float64" => Ok(PlyDataType::Float64),
            "char" | "int8" => Ok(PlyDataType::Int8),
            "uchar" | "uint8" => Ok(PlyDataType::UInt8),
            "short" | "int16" => Ok(PlyDataType::Int16),
            "ushort" | "uint16" => Ok(PlyDataType::UInt16),
            "int" | "int32" => Ok(PlyDataType::Int32),
            "uint" | "uint32" => Ok(PlyDataType::UInt32),
            _ => Err(PlyError::UnsupportedProperty(type_str.to_string())),
        }
    }

    /// Size in bytes of one value.
    pub fn size(&self) -> usize {
        match self {
            PlyDataType::Float32 | PlyDataType::Int32 | PlyDataType::UInt32 => 4,
            PlyDataType::Float64 => 8,
            PlyDataType::Int16 | PlyDataType::UInt16 => 2,
            PlyDataType::Int8 | PlyDataType::UInt8 => 1,
        }
    }

    /// Decode one value from its binary representation.
    ///
    /// PRECONDITION: `bytes` has exactly `self.size()` bytes.
    pub fn decode(&self, bytes: &[u8], format: PlyFormat) -> f64 {
        macro_rules! decode_as {
            ($t:ty) => {{
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                match format {
                    PlyFormat::BinaryBigEndian => <$t>::from_be_bytes(buf) as f64,
                    _ => <$t>::from_le_bytes(buf) as f64,
                }
            }};
        }
        match self {
            PlyDataType::Float32 => decode_as!(f32),
            PlyDataType::Float64 => decode_as!(f64),
            PlyDataType::Int8 => decode_as!(i8),
            PlyDataType::UInt8 => decode_as!(u8),
            PlyDataType::Int16 => decode_as!(i16),
            PlyDataType::UInt16 => decode_as!(u16),
            PlyDataType::Int32 => decode_as!(i32),
            PlyDataType::UInt32 => decode_as!(u32),
        }
    }
}

/// Shape of a property: a single scalar or a counted list.
#[derive(Debug, PartialEq, Clone)]
pub enum PlyPropertyKind {
    /// One scalar value.
    Scalar(PlyDataType),
    /// A list prefixed by its length.
    List {
        /// Type of the length prefix.
        count: PlyDataType,
        /// Type of the list items.
        item: PlyDataType,
    },
}

/// A named property of an element.
#[derive(Debug, PartialEq, Clone)]
pub struct PlyPropertyDefinition {
    /// The property name, e.g. `x` or `vertex_indices`.
    pub name: String,
    /// The property shape.
    pub kind: PlyPropertyKind,
}

/// An element declared in the header together with its properties.
#[derive(Debug, PartialEq, Clone)]
pub struct PlyElement {
    /// The element name, e.g. `vertex` or `face`.
    pub name: String,
    /// Number of records.
    pub count: usize,
    /// The record layout.
    pub properties: Vec<PlyPropertyDefinition>,
}

impl PlyElement {
    /// Index of a property by name.
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }
}
