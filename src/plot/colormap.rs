use anyhow::{bail, Result};
use image::Rgb;

/// 锚点取自 matplotlib 同名色表的等距采样
const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [71, 44, 122],
    [59, 81, 139],
    [44, 113, 142],
    [33, 144, 141],
    [39, 173, 129],
    [92, 200, 99],
    [170, 220, 50],
    [253, 231, 37],
];

const MAGMA: [[u8; 3]; 9] = [
    [0, 0, 4],
    [28, 16, 68],
    [79, 18, 123],
    [129, 37, 129],
    [181, 54, 122],
    [229, 80, 100],
    [251, 135, 97],
    [254, 194, 135],
    [252, 253, 191],
];

pub const UNVISITED_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const BORDER_COLOR: Rgb<u8> = Rgb([160, 160, 160]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colormap {
    #[default]
    Viridis,
    Magma,
}

impl Colormap {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "viridis" => Ok(Self::Viridis),
            "magma" => Ok(Self::Magma),
            other => bail!("unknown colormap '{}' (expected viridis or magma)", other),
        }
    }

    fn anchors(self) -> &'static [[u8; 3]] {
        match self {
            Self::Viridis => &VIRIDIS,
            Self::Magma => &MAGMA,
        }
    }

    /// t 截断到 [0, 1]，锚点之间线性插值
    pub fn color(self, t: f32) -> Rgb<u8> {
        let anchors = self.anchors();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let pos = t * (anchors.len() - 1) as f32;
        let lo = (pos.floor() as usize).min(anchors.len() - 2);
        let frac = pos - lo as f32;
        let mut out = [0u8; 3];
        for (ch, o) in out.iter_mut().enumerate() {
            let a = anchors[lo][ch] as f32;
            let b = anchors[lo + 1][ch] as f32;
            *o = (a + (b - a) * frac).round() as u8;
        }
        Rgb(out)
    }

    /// 分数越低（越早被访问）颜色越深
    pub fn score_color(self, score: u32, max_score: u32) -> Rgb<u8> {
        if max_score == 0 {
            return self.color(0.0);
        }
        self.color(score as f32 / max_score as f32)
    }
}
