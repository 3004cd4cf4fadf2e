use std::fmt;

/// 4-character resource type tag, stored exactly as it appears in the
/// archive directory (not null-terminated).
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
pub struct TypeTag(pub [u8; 4]);

impl TypeTag {
    pub fn as_str(&self) -> String {
        self.0.iter().map(|&b| printable(b)).collect()
    }
}

fn printable(b: u8) -> char {
    if b.is_ascii_graphic() || b == b' ' {
        b as char
    } else {
        '?'
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TypeTag({})", self.as_str())
    }
}

/// Resource classes the extractor knows how to materialize. Every other
/// type stays in the catalog but is skipped on extraction.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ResourceKind {
    Bitmap,
    Movie,
}

impl ResourceKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ResourceKind::Bitmap => "bmp",
            ResourceKind::Movie => "mov",
        }
    }
}

pub fn resource_kind(tag: TypeTag) -> Option<ResourceKind> {
    match &tag.0 {
        b"tBMP" => Some(ResourceKind::Bitmap),
        b"tMOV" => Some(ResourceKind::Movie),
        _ => None,
    }
}
