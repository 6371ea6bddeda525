//! Voxel data type

use std::fmt;
use std::str::FromStr;

use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Opaque identity assigned by the external store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoxelId(pub u64);

impl fmt::Display for VoxelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 8-bit sRGB color with alpha, written as `#rrggbb` or `#rrggbbaa` in config files
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoxelColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl VoxelColor {
    /// Accent color used when no color is specified
    pub const ACCENT: VoxelColor = VoxelColor::rgb(0x29, 0x8d, 0xe6);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    /// Normalized sRGB components for GPU upload
    pub fn to_array_f32(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

impl Default for VoxelColor {
    fn default() -> Self {
        Self::ACCENT
    }
}

impl fmt::Display for VoxelColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 0xff {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl FromStr for VoxelColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
            return Err(format!("expected #rrggbb or #rrggbbaa, got {:?}", s));
        }
        let byte = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("bad color {:?}: {}", s, e))
        };
        Ok(Self {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: if hex.len() == 8 { byte(6)? } else { 0xff },
        })
    }
}

impl TryFrom<String> for VoxelColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VoxelColor> for String {
    fn from(color: VoxelColor) -> Self {
        color.to_string()
    }
}

/// A unit cube at an integer lattice position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Voxel {
    /// Cell occupied; the cube spans `position..position + 1` on each axis
    pub position: IVec3,
    pub color: VoxelColor,
    /// Store identity, `None` until a local insert is confirmed
    pub id: Option<VoxelId>,
}

impl Voxel {
    pub fn new(position: IVec3, color: VoxelColor, id: Option<VoxelId>) -> Self {
        Self { position, color, id }
    }

    /// Not yet confirmed by the store
    pub fn is_pending(&self) -> bool {
        self.id.is_none()
    }
}

/// What a pick resolved to: the voxel's cell and, once known, its identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HoverTarget {
    pub position: IVec3,
    pub id: Option<VoxelId>,
}

impl From<&Voxel> for HoverTarget {
    fn from(voxel: &Voxel) -> Self {
        Self {
            position: voxel.position,
            id: voxel.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parse() {
        assert_eq!("#ff8000".parse::<VoxelColor>().unwrap(), VoxelColor::rgb(255, 128, 0));
        assert_eq!(
            "10203040".parse::<VoxelColor>().unwrap(),
            VoxelColor { r: 0x10, g: 0x20, b: 0x30, a: 0x40 }
        );
        assert!("#12345".parse::<VoxelColor>().is_err());
        assert!("#gg0000".parse::<VoxelColor>().is_err());
    }

    #[test]
    fn test_color_display() {
        assert_eq!(VoxelColor::rgb(1, 2, 255).to_string(), "#0102ff");
        let translucent = VoxelColor { a: 0x80, ..VoxelColor::rgb(0, 0, 0) };
        assert_eq!(translucent.to_string(), "#00000080");
    }

    #[test]
    fn test_color_serde() {
        let json = serde_json::to_string(&VoxelColor::ACCENT).unwrap();
        assert_eq!(json, "\"#298de6\"");
        let back: VoxelColor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, VoxelColor::ACCENT);
    }

    #[test]
    fn test_pending() {
        assert!(Voxel::new(IVec3::ZERO, VoxelColor::default(), None).is_pending());
        assert!(!Voxel::new(IVec3::ZERO, VoxelColor::default(), Some(VoxelId(7))).is_pending());
    }
}
