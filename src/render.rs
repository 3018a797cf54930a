//! 绘图表面
//!
//! 面板只依赖两种绘图原语：填充矩形与绘制文本。[`TerminalSurface`] 把像素窗口
//! 栅格化为字符网格输出到终端，[`RecordingSurface`] 记录绘图操作供测试使用。

use crate::format::FormatError;
use crate::geometry::{Point, Rect};
use std::io::{self, Write};

/// RGBA 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(0xff, 0xff, 0xff, 0xff);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 0xff);
    pub const GREY: Rgba = Rgba::new(0xaa, 0xaa, 0xaa, 0xff);
    pub const GREEN: Rgba = Rgba::new(0x80, 0xff, 0x80, 0xff);
    pub const YELLOW: Rgba = Rgba::new(0xef, 0xef, 0x40, 0xff);
    pub const RED: Rgba = Rgba::new(0xff, 0x80, 0x80, 0xff);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// 相对亮度 (0.0-1.0)，透明色视为背景
    pub fn luminance(self) -> f64 {
        if self.a == 0 {
            return 1.0;
        }
        // 整数权重之和恰为 10000，白色得到精确的 1.0
        let weighted = 2126 * self.r as u32 + 7152 * self.g as u32 + 722 * self.b as u32;
        weighted as f64 / (10_000.0 * 255.0)
    }
}

/// 面板配色
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    pub background: Rgba,
    pub foreground: Rgba,
    /// 电池外壳
    pub shell: Rgba,
    pub energy: Rgba,
    pub energy_charging: Rgba,
    pub energy_low: Rgba,
    /// 低于此电量比例时使用 `energy_low`
    pub low_threshold: f64,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: Rgba::WHITE,
            foreground: Rgba::BLACK,
            shell: Rgba::GREY,
            energy: Rgba::GREEN,
            energy_charging: Rgba::YELLOW,
            energy_low: Rgba::RED,
            low_threshold: 0.15,
        }
    }
}

/// 绘制错误类型
#[derive(Debug)]
pub enum RenderError {
    Format(FormatError),
    IoError(io::Error),
    EmptyLayout(&'static str),
    NoData,
}

impl From<FormatError> for RenderError {
    #[inline]
    fn from(error: FormatError) -> Self {
        RenderError::Format(error)
    }
}

impl From<io::Error> for RenderError {
    #[inline]
    fn from(error: io::Error) -> Self {
        RenderError::IoError(error)
    }
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Format(e) => write!(f, "格式化失败: {e}"),
            RenderError::IoError(e) => write!(f, "IO 错误: {e}"),
            RenderError::EmptyLayout(what) => write!(f, "{what} 区域为空"),
            RenderError::NoData => write!(f, "没有可绘制的数据"),
        }
    }
}

impl std::error::Error for RenderError {}

/// 绘图表面
pub trait Surface {
    /// 像素窗口范围
    fn bounds(&self) -> Rect;

    fn fill_rect(&mut self, rect: Rect, color: Rgba);

    /// 以 `at` 为左上角绘制一行文本
    fn draw_text(&mut self, at: Point, text: &str, color: Rgba);

    /// 文本的像素宽度
    fn text_width(&self, text: &str) -> i32;

    /// 文本行的像素高度
    fn text_height(&self) -> i32;

    /// 把本帧内容输出到屏幕
    fn flush(&mut self) -> io::Result<()>;
}

/// 记录下的绘图操作
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Fill { rect: Rect, color: Rgba },
    Text { at: Point, text: String, color: Rgba },
}

/// 记录绘图操作的表面
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    bounds: Rect,
    glyph: Point,
    /// 当前帧的操作
    pub ops: Vec<DrawOp>,
    /// 已输出的帧
    pub frames: Vec<Vec<DrawOp>>,
}

impl RecordingSurface {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            glyph: Point::new(7, 10),
            ops: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// 当前帧中所有绘制内容的外接矩形
    pub fn drawn(&self) -> Option<Rect> {
        self.ops
            .iter()
            .map(|op| match op {
                DrawOp::Fill { rect, .. } => *rect,
                DrawOp::Text { at, text, .. } => Rect {
                    min: *at,
                    max: at.add(Point::new(self.text_width(text), self.glyph.y)),
                },
            })
            .filter(|r| !r.is_empty())
            .reduce(|a, b| {
                Rect::new(
                    a.min.x.min(b.min.x),
                    a.min.y.min(b.min.y),
                    a.max.x.max(b.max.x),
                    a.max.y.max(b.max.y),
                )
            })
    }

    /// 当前帧中绘制的文本
    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        self.ops.push(DrawOp::Fill { rect, color });
    }

    fn draw_text(&mut self, at: Point, text: &str, color: Rgba) {
        self.ops.push(DrawOp::Text {
            at,
            text: text.to_string(),
            color,
        });
    }

    fn text_width(&self, text: &str) -> i32 {
        text.chars().count() as i32 * self.glyph.x
    }

    fn text_height(&self) -> i32 {
        self.glyph.y
    }

    fn flush(&mut self) -> io::Result<()> {
        self.frames.push(std::mem::take(&mut self.ops));
        Ok(())
    }
}

/// 字符网格终端表面
pub struct TerminalSurface<W: Write> {
    out: W,
    bounds: Rect,
    columns: usize,
    rows: usize,
    cells: Vec<char>,
    clear_screen: bool,
}

impl<W: Write> TerminalSurface<W> {
    /// 把 `bounds` 像素窗口映射到 `columns` x `rows` 的字符网格
    pub fn new(out: W, bounds: Rect, columns: usize, rows: usize) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        Self {
            out,
            bounds,
            columns,
            rows,
            cells: vec![' '; columns * rows],
            clear_screen: true,
        }
    }

    /// 每帧输出前是否清屏
    pub fn with_clear_screen(mut self, clear: bool) -> Self {
        self.clear_screen = clear;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    #[inline]
    fn cell_width(&self) -> f64 {
        self.bounds.dx().max(1) as f64 / self.columns as f64
    }

    #[inline]
    fn cell_height(&self) -> f64 {
        self.bounds.dy().max(1) as f64 / self.rows as f64
    }

    /// 按亮度选择填充字符
    fn shade(color: Rgba) -> char {
        match color.luminance() {
            l if l < 0.25 => '█',
            l if l < 0.5 => '▓',
            l if l < 0.75 => '▒',
            l if l < 0.95 => '░',
            _ => ' ',
        }
    }

    /// 当前网格内容，每行一个字符串
    pub fn lines(&self) -> Vec<String> {
        self.cells
            .chunks(self.columns)
            .map(|row| row.iter().collect())
            .collect()
    }
}

impl<W: Write> Surface for TerminalSurface<W> {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        let (cw, ch) = (self.cell_width(), self.cell_height());
        let fill = Self::shade(color);

        for row in 0..self.rows {
            let cy = self.bounds.min.y as f64 + (row as f64 + 0.5) * ch;
            if cy < rect.min.y as f64 || cy >= rect.max.y as f64 {
                continue;
            }
            for col in 0..self.columns {
                let cx = self.bounds.min.x as f64 + (col as f64 + 0.5) * cw;
                if cx >= rect.min.x as f64 && cx < rect.max.x as f64 {
                    self.cells[row * self.columns + col] = fill;
                }
            }
        }
    }

    fn draw_text(&mut self, at: Point, text: &str, _color: Rgba) {
        let col = ((at.x - self.bounds.min.x) as f64 / self.cell_width()).round();
        let row = ((at.y - self.bounds.min.y) as f64 / self.cell_height()).round();
        if row < 0.0 || row as usize >= self.rows {
            return;
        }

        let (row, start) = (row as usize, col as i64);
        for (i, c) in text.chars().enumerate() {
            let col = start + i as i64;
            if col < 0 {
                continue;
            }
            if col as usize >= self.columns {
                break;
            }
            self.cells[row * self.columns + col as usize] = c;
        }
    }

    fn text_width(&self, text: &str) -> i32 {
        (text.chars().count() as f64 * self.cell_width()).round() as i32
    }

    fn text_height(&self) -> i32 {
        self.cell_height().round() as i32
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.clear_screen {
            write!(self.out, "{}[2J{}[H", 27 as char, 27 as char)?;
        }
        for line in self.lines() {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()?;
        self.cells.fill(' ');
        Ok(())
    }
}
