//! Color scales for rendered artifacts

use serde::{Serialize, Serializer};

/// Serializes as a `#rrggbb` string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

pub const COLOR_WEIGHT_LOW: [f32; 3] = [0.953, 0.949, 0.984];
pub const COLOR_WEIGHT_HIGH: [f32; 3] = [0.231, 0.102, 0.561];

/// Background behind causally masked cells
pub const COLOR_MASKED: Rgb = Rgb(0xf5, 0xf5, 0xf5);

/// Ranked tooltip entries, strongest first
pub const COLOR_RANK: [Rgb; 3] = [
    Rgb(0x63, 0x66, 0xf1),
    Rgb(0x8b, 0x5c, 0xf6),
    Rgb(0xa8, 0x55, 0xf7),
];

fn lerp(low: [f32; 3], high: [f32; 3], t: f32) -> Rgb {
    let channel = |i: usize| {
        let v = low[i] + (high[i] - low[i]) * t;
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };
    Rgb(channel(0), channel(1), channel(2))
}

/// Attention weight → color; 0 is pale, 1 is saturated and dark
pub fn weight_color(value: f32) -> Rgb {
    let t = if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    };
    lerp(COLOR_WEIGHT_LOW, COLOR_WEIGHT_HIGH, t)
}

/// Color for a ranked entry, cycling past the palette
pub fn rank_color(rank: usize) -> Rgb {
    COLOR_RANK[rank % COLOR_RANK.len()]
}

/// One distinct hue per head
pub fn head_color(head: usize, n_heads: usize) -> Rgb {
    let hue = (head as f32 / n_heads.max(1) as f32) * 280.0 + 200.0;
    hsl(hue % 360.0, 0.65, 0.55)
}

fn hsl(hue: f32, sat: f32, light: f32) -> Rgb {
    let c = (1.0 - (2.0 * light - 1.0).abs()) * sat;
    let h = hue / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = light - c / 2.0;
    let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb(to_u8(r), to_u8(g), to_u8(b))
}
