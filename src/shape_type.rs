use std::fmt;

/// The closed set of shape type tags that can appear in a record or file header.
///
/// The discriminants are the on-disk integer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Null = 0,
    Point = 1,
    PolyLine = 3,
    Polygon = 5,
    MultiPoint = 8,
    PointZ = 11,
    PolyLineZ = 13,
    PolygonZ = 15,
    MultiPointZ = 18,
    PointM = 21,
    PolyLineM = 23,
    PolygonM = 25,
    MultiPointM = 28,
    MultiPatch = 31,
}

impl ShapeType {
    /// Map a raw tag to a shape type, `None` for anything outside the closed set.
    pub fn from_i32(tag: i32) -> Option<Self> {
        let st = match tag {
            0 => ShapeType::Null,
            1 => ShapeType::Point,
            3 => ShapeType::PolyLine,
            5 => ShapeType::Polygon,
            8 => ShapeType::MultiPoint,
            11 => ShapeType::PointZ,
            13 => ShapeType::PolyLineZ,
            15 => ShapeType::PolygonZ,
            18 => ShapeType::MultiPointZ,
            21 => ShapeType::PointM,
            23 => ShapeType::PolyLineM,
            25 => ShapeType::PolygonM,
            28 => ShapeType::MultiPointM,
            31 => ShapeType::MultiPatch,
            _ => return None,
        };
        Some(st)
    }

    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// The 2D shape type this one extends.
    pub fn base_type(self) -> ShapeType {
        match self {
            ShapeType::PointZ | ShapeType::PointM => ShapeType::Point,
            ShapeType::PolyLineZ | ShapeType::PolyLineM => ShapeType::PolyLine,
            ShapeType::PolygonZ | ShapeType::PolygonM | ShapeType::MultiPatch => {
                ShapeType::Polygon
            }
            ShapeType::MultiPointZ | ShapeType::MultiPointM => ShapeType::MultiPoint,
            other => other,
        }
    }

    pub fn has_z(self) -> bool {
        matches!(
            self,
            ShapeType::PointZ
                | ShapeType::PolyLineZ
                | ShapeType::PolygonZ
                | ShapeType::MultiPointZ
                | ShapeType::MultiPatch
        )
    }

    /// Whether records of this type may carry measures.
    ///
    /// For Z types the M block is optional on disk.
    pub fn has_m(self) -> bool {
        self.has_z()
            || matches!(
                self,
                ShapeType::PointM
                    | ShapeType::PolyLineM
                    | ShapeType::PolygonM
                    | ShapeType::MultiPointM
            )
    }

    /// Whether the payload starts with a bounding box.
    pub fn has_bbox(self) -> bool {
        !matches!(
            self,
            ShapeType::Null | ShapeType::Point | ShapeType::PointZ | ShapeType::PointM
        )
    }
}

impl Default for ShapeType {
    fn default() -> Self {
        ShapeType::Null
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShapeType::Null => "Null",
            ShapeType::Point => "Point",
            ShapeType::PolyLine => "PolyLine",
            ShapeType::Polygon => "Polygon",
            ShapeType::MultiPoint => "MultiPoint",
            ShapeType::PointZ => "PointZ",
            ShapeType::PolyLineZ => "PolyLineZ",
            ShapeType::PolygonZ => "PolygonZ",
            ShapeType::MultiPointZ => "MultiPointZ",
            ShapeType::PointM => "PointM",
            ShapeType::PolyLineM => "PolyLineM",
            ShapeType::PolygonM => "PolygonM",
            ShapeType::MultiPointM => "MultiPointM",
            ShapeType::MultiPatch => "MultiPatch",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for tag in [0, 1, 3, 5, 8, 11, 13, 15, 18, 21, 23, 25, 28, 31] {
            let st = ShapeType::from_i32(tag).unwrap();
            assert_eq!(st.to_i32(), tag);
        }
    }

    #[test]
    fn rejects_unknown_tags() {
        for tag in [-1, 2, 4, 7, 9, 12, 30, 32, i32::MAX] {
            assert!(ShapeType::from_i32(tag).is_none());
        }
    }

    #[test]
    fn feature_flags() {
        assert!(ShapeType::MultiPatch.has_z());
        assert!(ShapeType::MultiPatch.has_bbox());
        assert!(!ShapeType::PointZ.has_bbox());
        assert!(ShapeType::PolyLineM.has_m());
        assert!(!ShapeType::PolyLineM.has_z());
        assert!(!ShapeType::Polygon.has_m());
        assert_eq!(ShapeType::MultiPointZ.base_type(), ShapeType::MultiPoint);
    }
}
