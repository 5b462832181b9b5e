use anyhow::{Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, Rgb, RgbImage};
use rayon::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use super::colormap::{Colormap, BORDER_COLOR, UNVISITED_COLOR};
use super::matrix::{DpMatrix, UNVISITED};
use crate::io::tsv::Panel;

#[derive(Debug, Clone, Copy)]
pub struct RenderOpt {
    /// 每个矩阵单元的像素边长
    pub cell_size: u32,
    /// 单个面板的最大像素边长，超出时先缩小单元，再合并单元
    pub max_dim: u32,
    /// 面板之间的间距
    pub gap: u32,
    pub colormap: Colormap,
}

impl Default for RenderOpt {
    fn default() -> Self {
        Self { cell_size: 4, max_dim: 4096, gap: 12, colormap: Colormap::Viridis }
    }
}

const MARGIN: u32 = 4;

/// 画布布局，由矩阵尺寸与 RenderOpt 决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub bin: usize,
    pub cell: u32,
    pub panel_rows: usize,
    pub panel_cols: usize,
    pub width: u32,
    pub height: u32,
    gap: u32,
}

impl Layout {
    pub fn new(rows: usize, cols: usize, opt: &RenderOpt) -> Self {
        let longest = rows.max(cols).max(1);
        let max_dim = opt.max_dim.max(1) as usize;
        let cell_size = opt.cell_size.max(1) as usize;

        let (bin, cell) = if longest * cell_size <= max_dim {
            (1, cell_size)
        } else if longest <= max_dim {
            (1, max_dim / longest)
        } else {
            (longest.div_ceil(max_dim), 1)
        };

        let panel_rows = rows.div_ceil(bin);
        let panel_cols = cols.div_ceil(bin);
        let panel_w = panel_cols as u32 * cell as u32;
        let panel_h = panel_rows as u32 * cell as u32;
        let width = 2 * MARGIN + 3 * (panel_w + 2) + 2 * opt.gap;
        let height = 2 * MARGIN + panel_h + 2;
        Self { bin, cell: cell as u32, panel_rows, panel_cols, width, height, gap: opt.gap }
    }

    /// 面板内容区左上角（不含 1 像素边框）
    pub fn panel_origin(&self, panel: Panel) -> (u32, u32) {
        let panel_w = self.panel_cols as u32 * self.cell;
        let x = MARGIN + 1 + panel as u32 * (panel_w + 2 + self.gap);
        (x, MARGIN + 1)
    }
}

/// 把矩阵画成三联面板图；`max_score` 由调用方给定，保证各帧配色一致
pub fn render_matrix(matrix: &DpMatrix, max_score: u32, opt: &RenderOpt) -> RgbImage {
    let layout = Layout::new(matrix.rows(), matrix.cols(), opt);
    let mut img = RgbImage::from_pixel(layout.width, layout.height, Rgb([255, 255, 255]));

    let panel_w = layout.panel_cols as u32 * layout.cell;
    let panel_h = layout.panel_rows as u32 * layout.cell;
    let width = layout.width as usize;

    for panel in Panel::ALL {
        let (brows, bcols, values) = matrix.binned(panel, layout.bin);
        let (x0, y0) = layout.panel_origin(panel);

        // 每个像素行独立着色，按行并行
        let raw: &mut [u8] = &mut img;
        raw.par_chunks_mut(width * 3)
            .enumerate()
            .skip(y0 as usize)
            .take(panel_h as usize)
            .for_each(|(y, line)| {
                let r = (y - y0 as usize) / layout.cell as usize;
                if r >= brows {
                    return;
                }
                for c in 0..bcols {
                    let v = values[r * bcols + c];
                    let color = if v == UNVISITED {
                        UNVISITED_COLOR
                    } else {
                        opt.colormap.score_color(v, max_score)
                    };
                    let px0 = x0 as usize + c * layout.cell as usize;
                    for px in px0..px0 + layout.cell as usize {
                        line[px * 3..px * 3 + 3].copy_from_slice(&color.0);
                    }
                }
            });

        draw_border(&mut img, x0 - 1, y0 - 1, panel_w + 2, panel_h + 2);
    }
    img
}

fn draw_border(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
    for dx in 0..w {
        img.put_pixel(x + dx, y, BORDER_COLOR);
        img.put_pixel(x + dx, y + h - 1, BORDER_COLOR);
    }
    for dy in 0..h {
        img.put_pixel(x, y + dy, BORDER_COLOR);
        img.put_pixel(x + w - 1, y + dy, BORDER_COLOR);
    }
}

pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    img.save(path)
        .with_context(|| format!("cannot write image '{}'", path.display()))
}

/// 逐帧写出的无限循环 GIF 动画，不在内存中保留已编码的帧
pub struct GifWriter {
    encoder: GifEncoder<BufWriter<File>>,
    delay: Delay,
    path: PathBuf,
    frames: usize,
}

impl GifWriter {
    pub fn create(path: &Path, delay_ms: u32) -> Result<Self> {
        let f = File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?;
        let mut encoder = GifEncoder::new_with_speed(BufWriter::new(f), 10);
        encoder.set_repeat(Repeat::Infinite)?;
        Ok(Self {
            encoder,
            delay: Delay::from_numer_denom_ms(delay_ms, 1),
            path: path.to_path_buf(),
            frames: 0,
        })
    }

    pub fn push(&mut self, img: RgbImage) -> Result<()> {
        let frame = Frame::from_parts(DynamicImage::ImageRgb8(img).into_rgba8(), 0, 0, self.delay);
        self.encoder
            .encode_frame(frame)
            .with_context(|| format!("cannot encode animation '{}'", self.path.display()))?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_scales_down_then_bins() {
        let opt = RenderOpt { cell_size: 4, max_dim: 100, gap: 10, colormap: Colormap::Viridis };
        let l = Layout::new(10, 20, &opt);
        assert_eq!((l.bin, l.cell), (1, 4));
        assert_eq!(l.width, 2 * MARGIN + 3 * (80 + 2) + 20);
        assert_eq!(l.height, 2 * MARGIN + 40 + 2);

        let l = Layout::new(50, 10, &opt);
        assert_eq!((l.bin, l.cell), (1, 2));

        let l = Layout::new(250, 10, &opt);
        assert_eq!((l.bin, l.cell), (3, 1));
        assert_eq!((l.panel_rows, l.panel_cols), (84, 4));
    }

    #[test]
    fn renders_cells_and_borders() {
        let opt = RenderOpt { cell_size: 2, max_dim: 64, gap: 3, colormap: Colormap::Viridis };
        let mut m = DpMatrix::new(2, 3);
        m.record(Panel::Match, 0, 0, 0);
        m.record(Panel::Insertion, 1, 2, 10);
        let img = render_matrix(&m, 10, &opt);
        let layout = Layout::new(2, 3, &opt);
        assert_eq!(img.dimensions(), (layout.width, layout.height));

        let (x, y) = layout.panel_origin(Panel::Match);
        assert_eq!(*img.get_pixel(x, y), opt.colormap.color(0.0));
        assert_eq!(*img.get_pixel(x + 1, y + 1), opt.colormap.color(0.0));
        assert_eq!(*img.get_pixel(x + 2, y), UNVISITED_COLOR);
        assert_eq!(*img.get_pixel(x - 1, y), BORDER_COLOR);

        let (x, y) = layout.panel_origin(Panel::Insertion);
        assert_eq!(*img.get_pixel(x + 4, y + 2), opt.colormap.color(1.0));
    }

    #[test]
    fn writes_png_and_gif() {
        let dir = tempfile::tempdir().unwrap();
        let opt = RenderOpt::default();
        let mut m = DpMatrix::new(3, 3);
        m.record(Panel::Match, 1, 1, 2);
        let a = render_matrix(&m, 2, &opt);
        let b = render_matrix(&DpMatrix::new(3, 3), 2, &opt);

        let png = dir.path().join("m.png");
        save_png(&a, &png).unwrap();
        assert!(std::fs::metadata(&png).unwrap().len() > 0);

        let gif = dir.path().join("m.gif");
        let mut writer = GifWriter::create(&gif, 100).unwrap();
        writer.push(b).unwrap();
        writer.push(a).unwrap();
        assert_eq!(writer.frames(), 2);
        drop(writer);
        let bytes = std::fs::read(&gif).unwrap();
        assert_eq!(&bytes[..6], b"GIF89a");
    }
}
