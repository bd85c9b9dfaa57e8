//! The face attribute set referenced by glyph face indices.

/// Index into the frame-global face table. Face 0 is the default face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FaceId(pub u16);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Face {
    pub foreground: Option<String>,
    pub background: Option<String>,
    pub font: Option<String>,
    pub underline: bool,
    pub stipple: Option<String>,
}

#[derive(Debug)]
pub struct FaceTable {
    faces: Vec<Face>,
}

impl Default for FaceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceTable {
    pub fn new() -> Self {
        Self {
            faces: vec![Face::default()],
        }
    }

    pub fn intern(&mut self, face: Face) -> FaceId {
        if let Some(i) = self.faces.iter().position(|f| *f == face) {
            return FaceId(i as u16);
        }
        let id = FaceId(self.faces.len() as u16);
        self.faces.push(face);
        id
    }

    pub fn get(&self, id: FaceId) -> &Face {
        &self.faces[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interns_and_dedupes() {
        let mut t = FaceTable::new();
        let bold_red = Face {
            foreground: Some("red".into()),
            underline: true,
            ..Face::default()
        };
        let a = t.intern(bold_red.clone());
        let b = t.intern(bold_red);
        assert_eq!(a, b);
        assert_ne!(a, FaceId(0));
        assert_eq!(t.get(FaceId(0)), &Face::default());
    }
}
